use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    SpaceCreated,
    SpaceUpdated,
    MemberJoined,
    MemberLeft,
    MemberRemoved,
    RoleChanged,
    ProposalCreated,
    ProposalClosed,
    ProposalCancelled,
    VoteCast,
    DiscussionPosted,
}

/// Append-only log row. Rows are written once and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub space_id: Option<String>,
    pub actor: String,
    pub kind: ActivityKind,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
