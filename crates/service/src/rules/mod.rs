pub mod avatar;
pub mod cooldown;
pub mod roles;
pub mod secrets;
pub mod social;
pub mod status;
pub mod tally;
pub mod validate;
