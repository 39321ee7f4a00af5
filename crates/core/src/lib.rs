//! Shared domain types for the FitCheck try-on service.
//!
//! This crate holds everything the other crates agree on: ID and timestamp
//! aliases, the domain error type, the try-on job state machine, media
//! validation plus the on-disk media store, and the poll backoff policy.
//! It deliberately has no database or HTTP dependencies.

pub mod backoff;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod types;
