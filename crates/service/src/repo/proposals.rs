use voxen_database::typed::{get_json, put_json, remove, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::{Result, ServiceError};
use crate::parser::{Proposal, ProposalStatus};
use crate::repo::{discussions, votes};

pub fn get<D: SafeDatabase>(db: &D, id: &str) -> Result<Option<Proposal>> {
    Ok(get_json(db, tables::PROPOSALS, id)?)
}

pub fn require<D: SafeDatabase>(db: &D, id: &str) -> Result<Proposal> {
    get(db, id)?.ok_or_else(|| ServiceError::not_found("Proposal not found"))
}

pub fn save<D: SafeDatabase>(db: &D, proposal: &Proposal) -> Result<()> {
    Ok(put_json(db, tables::PROPOSALS, &proposal.id, proposal)?)
}

pub fn list_for_space<D: SafeDatabase>(db: &D, space_id: &str) -> Result<Vec<Proposal>> {
    list_filtered(db, space_id, None)
}

/// Newest first, optionally narrowed to one stored status.
pub fn list_filtered<D: SafeDatabase>(
    db: &D,
    space_id: &str,
    status: Option<ProposalStatus>,
) -> Result<Vec<Proposal>> {
    let all: Vec<Proposal> = scan_json(db, tables::PROPOSALS, "")?;
    let mut proposals: Vec<Proposal> = all
        .into_iter()
        .filter(|p| p.space_id == space_id)
        .filter(|p| status.map_or(true, |s| p.status == s))
        .collect();
    proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(proposals)
}

pub fn delete<D: SafeDatabase>(db: &D, id: &str) -> Result<()> {
    votes::delete_all(db, id)?;
    discussions::delete_all(db, id)?;
    remove(db, tables::PROPOSALS, id)?;
    Ok(())
}
