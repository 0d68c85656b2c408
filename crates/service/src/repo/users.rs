use chrono::{DateTime, Utc};
use voxen_database::typed::{get_json, put_json, remove, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::{Result, ServiceError};
use crate::parser::{Avatar, NotificationPreferences, UserProfile};

pub fn get<D: SafeDatabase>(db: &D, address: &str) -> Result<Option<UserProfile>> {
    Ok(get_json(db, tables::USERS, address)?)
}

pub fn require<D: SafeDatabase>(db: &D, address: &str) -> Result<UserProfile> {
    get(db, address)?.ok_or_else(|| ServiceError::not_found("User not found"))
}

/// Returns the stored user, creating an empty profile on first sight.
pub fn get_or_create<D: SafeDatabase>(db: &D, address: &str, now: DateTime<Utc>) -> Result<(UserProfile, bool)> {
    if let Some(user) = get(db, address)? {
        return Ok((user, false));
    }
    let user = UserProfile::new(address, now);
    save(db, &user)?;
    Ok((user, true))
}

pub fn save<D: SafeDatabase>(db: &D, user: &UserProfile) -> Result<()> {
    Ok(put_json(db, tables::USERS, &user.address, user)?)
}

pub fn find_by_username<D: SafeDatabase>(db: &D, username: &str) -> Result<Option<String>> {
    Ok(get_json(db, tables::USERNAMES, username)?)
}

/// Claims `username` for `user`, releasing the previous one. The caller saves the profile.
pub fn claim_username<D: SafeDatabase>(db: &D, user: &mut UserProfile, username: &str) -> Result<()> {
    if user.username.as_deref() == Some(username) {
        return Ok(());
    }
    if let Some(owner) = find_by_username(db, username)? {
        if owner != user.address {
            return Err(ServiceError::validation("Username already taken"));
        }
    }
    put_json(db, tables::USERNAMES, username, &user.address)?;
    if let Some(previous) = user.username.take() {
        remove(db, tables::USERNAMES, &previous)?;
    }
    user.username = Some(username.to_string());
    Ok(())
}

/// Whether another user already verified `email`.
pub fn email_in_use<D: SafeDatabase>(db: &D, email: &str, except: &str) -> Result<bool> {
    let users: Vec<UserProfile> = scan_json(db, tables::USERS, "")?;
    Ok(users
        .iter()
        .any(|u| u.address != except && u.email_verified && u.email.as_deref() == Some(email)))
}

pub fn preferences<D: SafeDatabase>(db: &D, address: &str) -> Result<NotificationPreferences> {
    Ok(get_json(db, tables::PREFERENCES, address)?.unwrap_or_default())
}

pub fn save_preferences<D: SafeDatabase>(db: &D, address: &str, prefs: &NotificationPreferences) -> Result<()> {
    Ok(put_json(db, tables::PREFERENCES, address, prefs)?)
}

pub fn avatar<D: SafeDatabase>(db: &D, address: &str) -> Result<Option<Avatar>> {
    Ok(get_json(db, tables::AVATARS, address)?)
}

pub fn save_avatar<D: SafeDatabase>(db: &D, address: &str, avatar: &Avatar) -> Result<()> {
    Ok(put_json(db, tables::AVATARS, address, avatar)?)
}
