//! Route definitions for the `/try_on_outfit` resource.
//!
//! The path parameter is an email for submission and a job ID for
//! status and cancel; axum requires one capture name for the shared
//! segment, so handlers parse the value themselves.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::try_on;
use crate::state::AppState;

/// Routes mounted at `/try_on_outfit`.
///
/// ```text
/// POST   /{email}      -> submit_try_on
/// GET    /{id}         -> get_try_on
/// POST   /{id}/cancel  -> cancel_try_on
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", post(try_on::submit_try_on).get(try_on::get_try_on))
        .route("/{id}/cancel", post(try_on::cancel_try_on))
}
