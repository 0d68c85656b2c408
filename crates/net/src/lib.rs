pub mod access;
pub mod activity;
pub mod auth;
pub mod config;
pub mod discussions;
pub mod email;
pub mod error;
pub mod extract;
pub mod mailer;
pub mod profile;
pub mod proposals;
pub mod relay;
pub mod router;
pub mod server;
pub mod session;
pub mod spaces;
pub mod state;
pub mod twitter;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use server::{build_app, build_server, ServerError};
