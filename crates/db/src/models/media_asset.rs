use fitcheck_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `media_assets` table. Created once, never mutated.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MediaAsset {
    pub id: DbId,
    pub job_id: DbId,
    /// `"selfie"` or `"outfit"` (CHECK-constrained).
    pub role: String,
    /// Opaque reference into the media store.
    pub storage_ref: String,
    pub content_type: String,
    pub byte_size: i64,
    pub created_at: Timestamp,
}
