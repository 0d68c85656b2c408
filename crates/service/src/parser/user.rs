use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub address: String,                // lowercase 0x wallet address, primary key
    pub username: Option<String>,
    pub display_name: String,
    pub bio: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub twitter_handle: Option<String>,
    pub twitter_connected_at: Option<DateTime<Utc>>,
    pub twitter_disconnected_at: Option<DateTime<Utc>>,
    /// Handle that was last disconnected; reconnecting it skips the cooldown.
    pub last_twitter_handle: Option<String>,
    pub has_avatar: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(address: &str, now: DateTime<Utc>) -> Self {
        Self {
            address: address.to_string(),
            username: None,
            display_name: String::new(),
            bio: String::new(),
            email: None,
            email_verified: false,
            twitter_handle: None,
            twitter_connected_at: None,
            twitter_disconnected_at: None,
            last_twitter_handle: None,
            has_avatar: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Address the mailer may use, if the user verified one.
    pub fn deliverable_email(&self) -> Option<&str> {
        if self.email_verified {
            self.email.as_deref()
        } else {
            None
        }
    }
}

/// Binary avatar stored apart from the profile so listings stay small.
#[derive(Clone, Serialize, Deserialize)]
pub struct Avatar {
    pub data: Vec<u8>,
    pub content_type: String,  // e.g. "image/png"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub new_proposal: bool,
    pub proposal_closed: bool,
    pub discussion_reply: bool,
    pub email_enabled: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            new_proposal: true,
            proposal_closed: true,
            discussion_reply: true,
            email_enabled: false,
        }
    }
}
