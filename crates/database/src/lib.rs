pub mod basic_db;
pub mod tables;
pub mod typed;

pub use basic_db::{InnerDatabase, SafeDatabase};
pub use typed::DbError;
