//! Entity models mapping database rows to Rust structs.

pub mod media_asset;
pub mod try_on_job;
pub mod user;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;
