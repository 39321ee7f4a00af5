//! Route definitions for the `/users` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::try_on;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// GET    /{email}/try_ons -> list_try_ons
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{email}/try_ons", get(try_on::list_try_ons))
}
