pub mod error;
pub mod parser;
pub mod repo;
pub mod rules;

pub use error::{Result, ServiceError};
