//! Proposal status moves and the clock-derived view of a proposal.

use chrono::{DateTime, Utc};

use crate::error::{Result, ServiceError};
use crate::parser::{EffectiveStatus, Proposal, ProposalStatus};

pub fn effective_status(proposal: &Proposal, now: DateTime<Utc>) -> EffectiveStatus {
    match proposal.status {
        ProposalStatus::Draft => EffectiveStatus::Draft,
        ProposalStatus::Closed => EffectiveStatus::Closed,
        ProposalStatus::Cancelled => EffectiveStatus::Cancelled,
        ProposalStatus::Active if now >= proposal.end_date => EffectiveStatus::Closed,
        ProposalStatus::Active if now < proposal.start_date => EffectiveStatus::Pending,
        ProposalStatus::Active => EffectiveStatus::Active,
    }
}

pub fn transition(from: ProposalStatus, to: ProposalStatus) -> Result<()> {
    use ProposalStatus::*;
    match (from, to) {
        (Draft, Active) | (Active, Closed) | (Draft, Cancelled) | (Active, Cancelled) => Ok(()),
        _ => Err(ServiceError::validation(format!(
            "Cannot move proposal from {} to {}",
            from.as_str(),
            to.as_str()
        ))),
    }
}

/// Votes are accepted only for stored-active proposals inside their window.
pub fn ensure_voting_open(proposal: &Proposal, now: DateTime<Utc>) -> Result<()> {
    match effective_status(proposal, now) {
        EffectiveStatus::Active => Ok(()),
        EffectiveStatus::Pending => Err(ServiceError::validation("Voting has not started yet")),
        EffectiveStatus::Closed if proposal.status == ProposalStatus::Active => {
            Err(ServiceError::validation("Voting period has ended"))
        }
        _ => Err(ServiceError::validation("Proposal is not active")),
    }
}
