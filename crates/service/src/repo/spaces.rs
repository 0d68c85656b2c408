use tracing::debug;
use voxen_database::typed::{get_json, put_json, remove, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::{Result, ServiceError};
use crate::parser::Space;
use crate::repo::{members, proposals};

pub fn get<D: SafeDatabase>(db: &D, id: &str) -> Result<Option<Space>> {
    Ok(get_json(db, tables::SPACES, id)?)
}

/// Looks a space up by id first, then by its username.
pub fn resolve<D: SafeDatabase>(db: &D, id_or_username: &str) -> Result<Space> {
    if let Some(space) = get(db, id_or_username)? {
        return Ok(space);
    }
    let id: Option<String> = get_json(db, tables::SPACE_USERNAMES, &id_or_username.to_ascii_lowercase())?;
    match id {
        Some(id) => get(db, &id)?.ok_or_else(|| ServiceError::not_found("Space not found")),
        None => Err(ServiceError::not_found("Space not found")),
    }
}

pub fn username_taken<D: SafeDatabase>(db: &D, username: &str) -> Result<bool> {
    Ok(get_json::<D, String>(db, tables::SPACE_USERNAMES, username)?.is_some())
}

pub fn insert<D: SafeDatabase>(db: &D, space: &Space) -> Result<()> {
    if username_taken(db, &space.username)? {
        return Err(ServiceError::validation("Space username already taken"));
    }
    put_json(db, tables::SPACE_USERNAMES, &space.username, &space.id)?;
    save(db, space)
}

/// Moves the username index when the slug changes. The caller saves the space.
pub fn rename<D: SafeDatabase>(db: &D, space: &mut Space, username: &str) -> Result<()> {
    if space.username == username {
        return Ok(());
    }
    if username_taken(db, username)? {
        return Err(ServiceError::validation("Space username already taken"));
    }
    put_json(db, tables::SPACE_USERNAMES, username, &space.id)?;
    remove(db, tables::SPACE_USERNAMES, &space.username)?;
    space.username = username.to_string();
    Ok(())
}

pub fn save<D: SafeDatabase>(db: &D, space: &Space) -> Result<()> {
    Ok(put_json(db, tables::SPACES, &space.id, space)?)
}

pub fn list<D: SafeDatabase>(db: &D) -> Result<Vec<Space>> {
    Ok(scan_json(db, tables::SPACES, "")?)
}

/// Removes the space with its memberships, proposals, votes and messages.
/// Activity rows stay: the log is append-only.
pub fn delete<D: SafeDatabase>(db: &D, space: &Space) -> Result<()> {
    for membership in members::list(db, &space.id)? {
        members::remove(db, &space.id, &membership.address)?;
    }
    for proposal in proposals::list_for_space(db, &space.id)? {
        proposals::delete(db, &proposal.id)?;
    }
    remove(db, tables::SPACE_USERNAMES, &space.username)?;
    remove(db, tables::SPACES, &space.id)?;
    debug!(space = %space.id, "space removed");
    Ok(())
}
