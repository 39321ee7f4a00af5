//! Route definitions, grouped by resource.

pub mod health;
pub mod try_on;
pub mod users;
