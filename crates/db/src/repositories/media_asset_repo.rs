//! Repository for the `media_assets` table.

use fitcheck_core::media::MediaRole;
use fitcheck_core::types::DbId;
use sqlx::PgPool;

use crate::models::media_asset::MediaAsset;

/// Column list shared across queries.
const COLUMNS: &str = "id, job_id, role, storage_ref, content_type, byte_size, created_at";

/// Provides create/read operations for uploaded media. Assets are
/// immutable; they disappear only when their owning job is deleted.
pub struct MediaAssetRepo;

impl MediaAssetRepo {
    /// Attach a stored asset to a job.
    ///
    /// The `(job_id, role)` unique constraint enforces exactly one selfie
    /// and one outfit per job. Takes any executor so the upload path can
    /// attach both assets inside the job-creating transaction.
    pub async fn attach(
        executor: impl sqlx::PgExecutor<'_>,
        job_id: DbId,
        role: MediaRole,
        storage_ref: &str,
        content_type: &str,
        byte_size: i64,
    ) -> Result<MediaAsset, sqlx::Error> {
        let query = format!(
            "INSERT INTO media_assets (job_id, role, storage_ref, content_type, byte_size) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MediaAsset>(&query)
            .bind(job_id)
            .bind(role.as_str())
            .bind(storage_ref)
            .bind(content_type)
            .bind(byte_size)
            .fetch_one(executor)
            .await
    }

    /// Load one of a job's two assets by role.
    pub async fn find_for_job(
        pool: &PgPool,
        job_id: DbId,
        role: MediaRole,
    ) -> Result<Option<MediaAsset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM media_assets WHERE job_id = $1 AND role = $2");
        sqlx::query_as::<_, MediaAsset>(&query)
            .bind(job_id)
            .bind(role.as_str())
            .fetch_optional(pool)
            .await
    }

    /// List all assets attached to a job.
    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<MediaAsset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM media_assets WHERE job_id = $1 ORDER BY role");
        sqlx::query_as::<_, MediaAsset>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
