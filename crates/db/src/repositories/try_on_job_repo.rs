//! Repository for the `try_on_jobs` table.
//!
//! Every status change is a compare-and-swap: an `UPDATE` guarded by the
//! expected current `status_id`, returning `false` when the guard misses.
//! That single discipline is what lets multiple coordinator workers race on
//! the same job without duplicate submissions or double-processing.
//! The result/error invariants (`result_ref` iff succeeded, `error_message`
//! iff failed/timed-out) hold because only the mutators here touch those
//! columns, each together with its status.

use fitcheck_core::lifecycle::JobState;
use fitcheck_core::types::DbId;
use sqlx::PgPool;

use crate::models::try_on_job::TryOnJob;

/// Column list for `try_on_jobs` queries.
const COLUMNS: &str = "\
    id, user_id, status_id, external_job_id, result_ref, error_message, \
    submitted_at, completed_at, created_at, updated_at";

/// Provides lifecycle operations for try-on jobs.
pub struct TryOnJobRepo;

impl TryOnJobRepo {
    /// Create a new job in `created` status.
    ///
    /// Takes any executor so callers can insert the job and its media
    /// assets in one transaction; the row is only claimable once that
    /// transaction commits.
    pub async fn create(
        executor: impl sqlx::PgExecutor<'_>,
        user_id: DbId,
    ) -> Result<TryOnJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO try_on_jobs (user_id, status_id) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TryOnJob>(&query)
            .bind(user_id)
            .bind(JobState::Created.id())
            .fetch_one(executor)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TryOnJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM try_on_jobs WHERE id = $1");
        sqlx::query_as::<_, TryOnJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's jobs, newest first.
    pub async fn list_by_user(pool: &PgPool, user_id: DbId) -> Result<Vec<TryOnJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM try_on_jobs WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, TryOnJob>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Atomically claim the oldest `created` job for submission, moving it
    /// to `submitted` and stamping `submitted_at`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent coordinator
    /// workers never claim (and therefore never submit) the same job twice.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<TryOnJob>, sqlx::Error> {
        let query = format!(
            "UPDATE try_on_jobs \
             SET status_id = $1, submitted_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM try_on_jobs \
                 WHERE status_id = $2 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TryOnJob>(&query)
            .bind(JobState::Submitted.id())
            .bind(JobState::Created.id())
            .fetch_optional(pool)
            .await
    }

    /// Generic guarded transition (compare-and-swap on `from`).
    ///
    /// Returns `false` if the stored status no longer matches `from`; the
    /// caller lost the race and must not assume the transition happened.
    pub async fn transition(
        pool: &PgPool,
        job_id: DbId,
        from: JobState,
        to: JobState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs SET status_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(from.id())
        .bind(to.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the external generation-service handle on a freshly
    /// submitted job.
    ///
    /// Guarded on `submitted` with no handle yet, so a cancelled or
    /// already-populated job is left untouched.
    pub async fn set_external_job_id(
        pool: &PgPool,
        job_id: DbId,
        external_job_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs SET external_job_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 AND external_job_id IS NULL",
        )
        .bind(job_id)
        .bind(JobState::Submitted.id())
        .bind(external_job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `submitted -> processing`, taken on the first pending poll.
    pub async fn mark_processing(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        Self::transition(pool, job_id, JobState::Submitted, JobState::Processing).await
    }

    /// `processing -> succeeded`, recording the result reference.
    pub async fn succeed(
        pool: &PgPool,
        job_id: DbId,
        result_ref: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs \
             SET status_id = $3, result_ref = $4, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(JobState::Processing.id())
        .bind(JobState::Succeeded.id())
        .bind(result_ref)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `{submitted, processing} -> failed`, recording the error.
    ///
    /// `from` is explicit because failure can happen both before the first
    /// pending poll (submit retry budget exhausted) and during processing.
    pub async fn fail(
        pool: &PgPool,
        job_id: DbId,
        from: JobState,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs \
             SET status_id = $3, error_message = $4, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(from.id())
        .bind(JobState::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `{submitted, processing} -> failed`, recording the error, without
    /// the caller knowing which of the two states the job is in.
    ///
    /// Used when the job driver itself hits an unrecoverable error
    /// mid-flight; a claimed job must never be left stranded in a
    /// non-terminal state with nothing recorded.
    pub async fn fail_in_flight(
        pool: &PgPool,
        job_id: DbId,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs \
             SET status_id = $4, error_message = $5, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($2, $3)",
        )
        .bind(job_id)
        .bind(JobState::Submitted.id())
        .bind(JobState::Processing.id())
        .bind(JobState::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `{submitted, processing} -> timed_out`, recording the reason.
    pub async fn time_out(pool: &PgPool, job_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs \
             SET status_id = $4, error_message = $5, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($2, $3)",
        )
        .bind(job_id)
        .bind(JobState::Submitted.id())
        .bind(JobState::Processing.id())
        .bind(JobState::TimedOut.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job if processing has not begun (`created` or `submitted`).
    ///
    /// Returns `false` if the job is already processing or terminal.
    pub async fn cancel(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE try_on_jobs \
             SET status_id = $4, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($2, $3)",
        )
        .bind(job_id)
        .bind(JobState::Created.id())
        .bind(JobState::Submitted.id())
        .bind(JobState::Cancelled.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Jobs stuck in `submitted` or `processing` (crash recovery at worker
    /// startup).
    pub async fn find_in_flight(pool: &PgPool) -> Result<Vec<TryOnJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM try_on_jobs \
             WHERE status_id IN ($1, $2) \
             ORDER BY submitted_at ASC"
        );
        sqlx::query_as::<_, TryOnJob>(&query)
            .bind(JobState::Submitted.id())
            .bind(JobState::Processing.id())
            .fetch_all(pool)
            .await
    }
}
