//! Visibility and membership checks shared by the resource handlers.

use serde::Deserialize;
use voxen_database::SafeDatabase;
use voxen_service::parser::{Proposal, ProposalStatus, Role, Space};
use voxen_service::repo::{members, proposals, spaces};
use voxen_service::rules::roles;

use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn bounds(&self) -> (usize, usize) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0))
    }
}

/// Loads a space the viewer may read: public spaces for anyone, private
/// ones for members only.
pub fn readable_space<D: SafeDatabase>(
    db: &D,
    id_or_username: &str,
    viewer: Option<&str>,
) -> Result<(Space, Option<Role>), ApiError> {
    let space = spaces::resolve(db, id_or_username)?;
    let role = match viewer {
        Some(address) => members::role_of(db, &space.id, address)?,
        None => None,
    };
    if !space.is_public() && role.is_none() {
        return Err(ApiError::forbidden("This space is private"));
    }
    Ok((space, role))
}

/// Drafts are only visible to their author and the space managers.
pub fn can_see_proposal(proposal: &Proposal, role: Option<Role>, viewer: Option<&str>) -> bool {
    proposal.status != ProposalStatus::Draft
        || viewer.map_or(false, |v| roles::can_manage_proposal(role, v, &proposal.author))
}

/// Loads a proposal the viewer may read. Hidden drafts look missing.
pub fn readable_proposal<D: SafeDatabase>(
    db: &D,
    proposal_id: &str,
    viewer: Option<&str>,
) -> Result<(Proposal, Space, Option<Role>), ApiError> {
    let proposal = proposals::require(db, proposal_id)?;
    let (space, role) = readable_space(db, &proposal.space_id, viewer)?;
    if !can_see_proposal(&proposal, role, viewer) {
        return Err(ApiError::not_found("Proposal not found"));
    }
    Ok((proposal, space, role))
}

/// Role of the caller in the space; non-members get 403.
pub fn member_of<D: SafeDatabase>(
    db: &D,
    space_id: &str,
    address: &str,
    action: &str,
) -> Result<Role, ApiError> {
    members::role_of(db, space_id, address)?
        .ok_or_else(|| ApiError::forbidden(format!("Only members can {}", action)))
}
