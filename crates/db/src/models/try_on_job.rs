//! Try-on job entity model.

use fitcheck_core::lifecycle::JobState;
use fitcheck_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::StatusId;

/// A row from the `try_on_jobs` table.
///
/// Invariants (enforced by the guarded repository mutators):
/// `result_ref` is set iff the job succeeded; `error_message` is set iff
/// the job failed or timed out.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TryOnJob {
    pub id: DbId,
    pub user_id: DbId,
    pub status_id: StatusId,
    /// Handle assigned by the external generation service once submitted.
    pub external_job_id: Option<String>,
    pub result_ref: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryOnJob {
    /// Decode the stored status into the shared [`JobState`] enum.
    ///
    /// The status column references the seeded `job_statuses` table, so an
    /// unknown ID indicates schema/enum drift and is reported as `None`.
    pub fn state(&self) -> Option<JobState> {
        JobState::from_id(self.status_id)
    }
}
