use std::sync::Arc;

use fitcheck_core::media::MediaStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: fitcheck_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Filesystem store for uploaded media.
    pub media: Arc<MediaStore>,
}
