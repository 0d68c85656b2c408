//! Table access per record type. Each function is one or a few store
//! transactions; nothing here spans a multi-table transaction.

pub mod activities;
pub mod auth_state;
pub mod discussions;
pub mod members;
pub mod proposals;
pub mod spaces;
pub mod users;
pub mod votes;

use chrono::{DateTime, Utc};

/// Key fragment that sorts chronologically.
pub(crate) fn time_key(at: DateTime<Utc>) -> String {
    format!("{:020}", at.timestamp_micros().max(0))
}
