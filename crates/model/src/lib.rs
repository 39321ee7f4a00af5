//! Client for the external try-on image-generation service.
//!
//! [`api::GenerationApi`] is the HTTP implementation; the
//! [`client::ModelClient`] trait is the seam the lifecycle coordinator
//! depends on, so tests can substitute a scripted mock.

pub mod api;
pub mod client;

pub use api::{GenerationApi, ModelApiError, PollOutcome};
pub use client::{ImagePart, ModelClient};
