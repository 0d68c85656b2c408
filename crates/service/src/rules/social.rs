//! Twitter account linking. A user who disconnects may reconnect the same
//! handle at any time; a different handle waits out the cooldown window.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, ServiceError};
use crate::parser::UserProfile;
use crate::rules::cooldown;

pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_ascii_lowercase()
}

pub fn check_link(user: &UserProfile, handle: &str, now: DateTime<Utc>, window: Duration) -> Result<()> {
    if let Some(current) = user.twitter_handle.as_deref() {
        if current == handle {
            return Ok(());
        }
        return Err(ServiceError::validation(
            "Disconnect your current Twitter account before connecting another",
        ));
    }

    let (Some(disconnected_at), Some(last)) = (user.twitter_disconnected_at, user.last_twitter_handle.as_deref()) else {
        return Ok(());
    };
    if last == handle {
        return Ok(());
    }
    match cooldown::remaining(disconnected_at, now, window) {
        Some(left) => Err(ServiceError::validation(format!(
            "You can connect a different Twitter account in {}",
            cooldown::describe(left)
        ))),
        None => Ok(()),
    }
}

pub fn link(user: &mut UserProfile, handle: &str, now: DateTime<Utc>) {
    user.twitter_handle = Some(handle.to_string());
    user.twitter_connected_at = Some(now);
    user.updated_at = now;
}

pub fn unlink(user: &mut UserProfile, now: DateTime<Utc>) -> Result<()> {
    let handle = user
        .twitter_handle
        .take()
        .ok_or_else(|| ServiceError::validation("No Twitter account connected"))?;
    user.last_twitter_handle = Some(handle);
    user.twitter_connected_at = None;
    user.twitter_disconnected_at = Some(now);
    user.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserProfile {
        UserProfile::new("0xa", Utc::now())
    }

    #[test]
    fn test_normalize_handle() {
        assert_eq!(normalize_handle(" @Voxen_DAO "), "voxen_dao");
    }

    #[test]
    fn test_first_link_is_free() {
        let user = user();
        assert!(check_link(&user, "alice", Utc::now(), Duration::days(7)).is_ok());
    }

    #[test]
    fn test_reconnect_cooldown() {
        let now = Utc::now();
        let window = Duration::days(7);
        let mut user = user();
        link(&mut user, "alice", now - Duration::days(3));
        unlink(&mut user, now - Duration::days(2)).unwrap();

        // same handle skips the window
        assert!(check_link(&user, "alice", now, window).is_ok());

        let err = check_link(&user, "bob", now, window).unwrap_err();
        assert_eq!(err.to_string(), "You can connect a different Twitter account in 5 days");

        assert!(check_link(&user, "bob", now + Duration::days(5), window).is_ok());
    }

    #[test]
    fn test_connected_account_blocks_other_handle() {
        let now = Utc::now();
        let mut user = user();
        link(&mut user, "alice", now);
        assert!(check_link(&user, "alice", now, Duration::days(7)).is_ok());
        assert!(check_link(&user, "bob", now, Duration::days(7)).is_err());
    }

    #[test]
    fn test_unlink_without_account() {
        let mut user = user();
        assert!(unlink(&mut user, Utc::now()).is_err());
    }
}
