//! Completion notifications for try-on jobs.

pub mod email;

pub use email::{EmailConfig, EmailError, EmailNotifier, JobOutcome};
