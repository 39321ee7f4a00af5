//! Request handlers, grouped by resource.

pub mod try_on;
