//! The lifecycle coordinator: drives try-on jobs from `created` to a
//! terminal state and fires the completion notification.

pub mod config;
pub mod coordinator;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
