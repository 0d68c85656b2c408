//! Table names used by the store. One JSON value per key.

pub const USERS: &str = "users";
pub const USERNAMES: &str = "usernames";
pub const PREFERENCES: &str = "notification_preferences";
pub const AVATARS: &str = "avatars";

pub const SPACES: &str = "spaces";
pub const SPACE_USERNAMES: &str = "space_usernames";
pub const MEMBERS: &str = "members";

pub const PROPOSALS: &str = "proposals";
pub const VOTES: &str = "votes";
pub const ACTIVITIES: &str = "activities";
pub const DISCUSSIONS: &str = "discussions";
pub const DISCUSSION_INDEX: &str = "discussion_index";

pub const NONCES: &str = "login_nonces";
pub const OTPS: &str = "email_otps";
pub const OAUTH_STATES: &str = "oauth_states";

/// Builds a composite key. `_` never appears in uuids or hex addresses.
pub fn composite(parent: &str, child: &str) -> String {
    format!("{}_{}", parent, child)
}

pub fn prefix(parent: &str) -> String {
    format!("{}_", parent)
}
