pub mod activity;
pub mod auth;
pub mod discussion;
pub mod proposal;
pub mod space;
pub mod user;

pub use activity::{Activity, ActivityKind};
pub use auth::{EmailOtp, LoginNonce, OAuthState};
pub use discussion::DiscussionMessage;
pub use proposal::{EffectiveStatus, Proposal, ProposalStatus, Vote, VotingType};
pub use space::{Membership, Role, Space, Visibility, VotingStrategy};
pub use user::{Avatar, NotificationPreferences, UserProfile};
