//! The job poller / lifecycle coordinator.
//!
//! Per job: `created --claim--> submitted --poll:pending--> processing`,
//! then `succeeded`/`failed`/`timed_out`. The claim (a compare-and-swap
//! `created -> submitted` with `FOR UPDATE SKIP LOCKED`) is the submission
//! permit: only the worker holding it talks to the generation service for
//! that job, so concurrent coordinators never duplicate a submission.
//! Every other mutation is equally guarded; a missed guard means another
//! worker (or a user cancellation) won the race, and the loser logs and
//! walks away.

use std::sync::Arc;

use fitcheck_core::backoff::poll_delay;
use fitcheck_core::error::CoreError;
use fitcheck_core::lifecycle::JobState;
use fitcheck_core::media::{MediaRole, MediaStore};
use fitcheck_core::types::DbId;
use fitcheck_db::models::try_on_job::TryOnJob;
use fitcheck_db::repositories::{MediaAssetRepo, TryOnJobRepo, UserRepo};
use fitcheck_model::{ImagePart, ModelApiError, ModelClient, PollOutcome};
use fitcheck_notify::{EmailNotifier, JobOutcome};
use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;

/// Errors that abort driving a single job.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Model API error: {0}")]
    Model(#[from] ModelApiError),
}

/// Drives claimed jobs to a terminal state and fires notifications.
pub struct Coordinator {
    pool: sqlx::PgPool,
    media: MediaStore,
    model: Arc<dyn ModelClient>,
    notifier: Option<EmailNotifier>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        pool: sqlx::PgPool,
        media: MediaStore,
        model: Arc<dyn ModelClient>,
        notifier: Option<EmailNotifier>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            pool,
            media,
            model,
            notifier,
            config,
        }
    }

    /// Claim-and-drive loop. Runs until the token is cancelled.
    ///
    /// Each claimed job is driven on its own spawned task so one slow
    /// generation never blocks the queue.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if let Err(e) = Arc::clone(&self).recover_in_flight().await {
            tracing::error!(error = %e, "In-flight job recovery failed");
        }

        loop {
            let claimed = match TryOnJobRepo::claim_next(&self.pool).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!(error = %e, "Claim query failed");
                    None
                }
            };

            match claimed {
                Some(job) => {
                    let coordinator = Arc::clone(&self);
                    tokio::spawn(async move {
                        coordinator.drive_and_record(&job).await;
                    });
                }
                None => {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            tracing::info!("Coordinator shutting down");
                            return;
                        }
                        () = tokio::time::sleep(self.config.claim_interval) => {}
                    }
                }
            }

            if cancel.is_cancelled() {
                tracing::info!("Coordinator shutting down");
                return;
            }
        }
    }

    /// Claim at most one job and drive it to a terminal state inline.
    ///
    /// Returns the driven job's ID, or `None` when the queue was empty.
    /// Used by tests and by the end-to-end suite; `run` is the production
    /// loop.
    pub async fn run_once(&self) -> Result<Option<DbId>, CoordinatorError> {
        match TryOnJobRepo::claim_next(&self.pool).await? {
            Some(job) => {
                let id = job.id;
                self.drive_and_record(&job).await;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Drive a claimed job, recording any driver error as a job failure.
    ///
    /// A claimed job must always reach a terminal state: an internal
    /// error (media missing, database hiccup) fails the job with the
    /// error recorded, never strands it in `submitted`/`processing`.
    async fn drive_and_record(&self, job: &TryOnJob) {
        if let Err(e) = self.drive_claimed(job).await {
            self.record_driver_failure(job.id, job.user_id, &e).await;
        }
    }

    /// Fail an in-flight job after its driver aborted, and notify.
    async fn record_driver_failure(&self, job_id: DbId, user_id: DbId, error: &CoordinatorError) {
        tracing::error!(job_id, error = %error, "Job driver aborted, failing job");
        match TryOnJobRepo::fail_in_flight(&self.pool, job_id, &format!("internal error: {error}"))
            .await
        {
            Ok(true) => {
                self.notify(
                    job_id,
                    user_id,
                    &JobOutcome::Failed {
                        reason: "an internal error interrupted the job".to_string(),
                    },
                )
                .await;
            }
            Ok(false) => {
                tracing::warn!(job_id, "Job already terminal, driver error not recorded");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record driver error");
            }
        }
    }

    // -----------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------

    /// Drive a freshly claimed (`submitted`, no external handle) job.
    async fn drive_claimed(&self, job: &TryOnJob) -> Result<(), CoordinatorError> {
        tracing::info!(job_id = job.id, user_id = job.user_id, "Job claimed");

        let (selfie, outfit) = self.load_media(job.id).await?;

        let external_id = match self.submit_with_retry(job.id, selfie, outfit).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Submission abandoned, failing job");
                let failed = TryOnJobRepo::fail(
                    &self.pool,
                    job.id,
                    JobState::Submitted,
                    &format!("generation service unavailable: {e}"),
                )
                .await?;
                if failed {
                    self.notify(
                        job.id,
                        job.user_id,
                        &JobOutcome::Failed {
                            reason: "the generation service could not be reached".to_string(),
                        },
                    )
                    .await;
                } else {
                    tracing::warn!(job_id = job.id, "Lost fail race (job no longer submitted)");
                }
                return Ok(());
            }
        };

        if !TryOnJobRepo::set_external_job_id(&self.pool, job.id, &external_id).await? {
            // The job left `submitted` while we were talking to the
            // service: the user cancelled. The external generation runs
            // unobserved; we never poll it.
            tracing::warn!(
                job_id = job.id,
                external_id = %external_id,
                "Job cancelled during submission, abandoning external generation",
            );
            return Ok(());
        }

        tracing::info!(job_id = job.id, external_id = %external_id, "Job submitted");

        // The deadline runs from the claim-stamped submitted_at, so time
        // spent in submit retries counts against it.
        let submitted_at = job.submitted_at.unwrap_or_else(chrono::Utc::now);
        self.poll_to_terminal(job.id, job.user_id, &external_id, submitted_at)
            .await
    }

    /// Load both image payloads for a job from the media store.
    async fn load_media(&self, job_id: DbId) -> Result<(ImagePart, ImagePart), CoordinatorError> {
        let selfie = self.load_part(job_id, MediaRole::Selfie).await?;
        let outfit = self.load_part(job_id, MediaRole::Outfit).await?;
        Ok((selfie, outfit))
    }

    /// Load a single role's asset row and bytes.
    async fn load_part(&self, job_id: DbId, role: MediaRole) -> Result<ImagePart, CoordinatorError> {
        let asset = MediaAssetRepo::find_for_job(&self.pool, job_id, role)
            .await?
            .ok_or_else(|| {
                CoreError::Internal(format!("Job {job_id} has no {} asset", role.as_str()))
            })?;
        let bytes = self.media.fetch(&asset.storage_ref).await?;
        // The storage ref's basename doubles as the upload filename.
        let file_name = asset
            .storage_ref
            .rsplit('/')
            .next()
            .unwrap_or(role.as_str())
            .to_string();
        Ok(ImagePart::new(file_name, asset.content_type, bytes))
    }

    /// Submit with bounded retries on connection-level failures.
    ///
    /// Only `ModelApiError::Request` (the service being unreachable) is
    /// retried; a definitive API rejection is returned immediately.
    async fn submit_with_retry(
        &self,
        job_id: DbId,
        selfie: ImagePart,
        outfit: ImagePart,
    ) -> Result<String, ModelApiError> {
        let mut last_err: Option<ModelApiError> = None;

        for attempt in 0..self.config.submit_retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.submit_retry_delay).await;
            }
            match self.model.submit(selfie.clone(), outfit.clone()).await {
                Ok(external_id) => return Ok(external_id),
                Err(e @ ModelApiError::Request(_)) => {
                    tracing::warn!(
                        job_id,
                        attempt,
                        error = %e,
                        "Generation service unavailable, will retry",
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ModelApiError::Protocol("submit retry budget was zero".to_string())
        }))
    }

    // -----------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------

    /// Poll a submitted job until it reaches a terminal state.
    ///
    /// Exponential backoff between polls; a bounded attempt budget and a
    /// wall-clock deadline both resolve to `timed_out`, so a service that
    /// answers `pending` forever cannot trap the worker in an infinite
    /// loop. Poll transport errors consume an attempt and are retried.
    async fn poll_to_terminal(
        &self,
        job_id: DbId,
        user_id: DbId,
        external_id: &str,
        submitted_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoordinatorError> {
        for attempt in 0..self.config.max_poll_attempts {
            let elapsed = (chrono::Utc::now() - submitted_at)
                .to_std()
                .unwrap_or_default();
            if elapsed > self.config.job_deadline {
                return self.time_out(job_id, user_id, "generation deadline exceeded").await;
            }

            tokio::time::sleep(poll_delay(attempt, self.config.poll_base, self.config.poll_cap))
                .await;

            match self.model.poll(external_id).await {
                Ok(PollOutcome::Pending) => {
                    if !self.ensure_processing(job_id).await? {
                        tracing::warn!(job_id, "Job left the pipeline mid-poll, abandoning");
                        return Ok(());
                    }
                }
                Ok(PollOutcome::Succeeded { result_ref }) => {
                    if !self.ensure_processing(job_id).await? {
                        tracing::warn!(job_id, "Job left the pipeline mid-poll, abandoning");
                        return Ok(());
                    }
                    if TryOnJobRepo::succeed(&self.pool, job_id, &result_ref).await? {
                        tracing::info!(job_id, result_ref = %result_ref, "Job succeeded");
                        self.notify(job_id, user_id, &JobOutcome::Succeeded { result_ref })
                            .await;
                    } else {
                        tracing::warn!(job_id, "Lost succeed race (job not processing)");
                    }
                    return Ok(());
                }
                Ok(PollOutcome::Failed { reason }) => {
                    if !self.ensure_processing(job_id).await? {
                        tracing::warn!(job_id, "Job left the pipeline mid-poll, abandoning");
                        return Ok(());
                    }
                    if TryOnJobRepo::fail(&self.pool, job_id, JobState::Processing, &reason)
                        .await?
                    {
                        tracing::info!(job_id, reason = %reason, "Job failed");
                        self.notify(job_id, user_id, &JobOutcome::Failed { reason }).await;
                    } else {
                        tracing::warn!(job_id, "Lost fail race (job not processing)");
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(job_id, attempt, error = %e, "Poll failed, will retry");
                }
            }
        }

        self.time_out(job_id, user_id, "poll budget exhausted while still pending")
            .await
    }

    /// Move a job to `processing` if it is still `submitted`.
    ///
    /// Returns `true` when the job is in `processing` afterwards (whether
    /// we moved it or it already was); `false` means the job was cancelled
    /// or otherwise taken out of the pipeline.
    async fn ensure_processing(&self, job_id: DbId) -> Result<bool, CoordinatorError> {
        if TryOnJobRepo::mark_processing(&self.pool, job_id).await? {
            return Ok(true);
        }
        let current = TryOnJobRepo::find_by_id(&self.pool, job_id)
            .await?
            .and_then(|j| j.state());
        Ok(current == Some(JobState::Processing))
    }

    /// Record a timeout and notify the user.
    async fn time_out(
        &self,
        job_id: DbId,
        user_id: DbId,
        reason: &str,
    ) -> Result<(), CoordinatorError> {
        if TryOnJobRepo::time_out(&self.pool, job_id, reason).await? {
            tracing::warn!(job_id, reason, "Job timed out");
            self.notify(
                job_id,
                user_id,
                &JobOutcome::TimedOut {
                    reason: reason.to_string(),
                },
            )
            .await;
        } else {
            tracing::warn!(job_id, "Lost timeout race (job already terminal)");
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------

    /// Resume jobs stranded by a worker restart.
    ///
    /// Each recovery runs on its own spawned task, like a freshly claimed
    /// job; a recovered job that stays pending for its whole deadline
    /// must not hold up the claim loop.
    async fn recover_in_flight(self: Arc<Self>) -> Result<(), CoordinatorError> {
        let stranded = TryOnJobRepo::find_in_flight(&self.pool).await?;
        for job in stranded {
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move {
                coordinator.recover_job(job).await;
            });
        }
        Ok(())
    }

    /// Drive one stranded job back to a terminal state.
    ///
    /// Jobs in `submitted`/`processing` with an external handle get a
    /// fresh poll loop; `submitted` jobs without one died mid-submit and
    /// are failed (we cannot know whether the service accepted them).
    async fn recover_job(&self, job: TryOnJob) {
        match (&job.external_job_id, job.state()) {
            (Some(external_id), _) => {
                tracing::info!(job_id = job.id, "Resuming in-flight job after restart");
                let submitted_at = job.submitted_at.unwrap_or_else(chrono::Utc::now);
                if let Err(e) = self
                    .poll_to_terminal(job.id, job.user_id, external_id, submitted_at)
                    .await
                {
                    self.record_driver_failure(job.id, job.user_id, &e).await;
                }
            }
            (None, Some(JobState::Submitted)) => {
                tracing::warn!(job_id = job.id, "Failing job interrupted mid-submission");
                match TryOnJobRepo::fail(
                    &self.pool,
                    job.id,
                    JobState::Submitted,
                    "submission interrupted by worker restart",
                )
                .await
                {
                    Ok(true) => {
                        self.notify(
                            job.id,
                            job.user_id,
                            &JobOutcome::Failed {
                                reason: "the service was interrupted; please try again"
                                    .to_string(),
                            },
                        )
                        .await;
                    }
                    Ok(false) => {
                        tracing::warn!(job_id = job.id, "Lost fail race during recovery");
                    }
                    Err(e) => {
                        tracing::error!(job_id = job.id, error = %e, "Recovery fail query error");
                    }
                }
            }
            (None, state) => {
                tracing::error!(job_id = job.id, ?state, "Unpollable in-flight job");
            }
        }
    }

    // -----------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------

    /// Deliver the terminal notification, with a small fixed retry count.
    ///
    /// A notification that still fails is logged and dropped; it never
    /// changes the job's state.
    async fn notify(&self, job_id: DbId, user_id: DbId, outcome: &JobOutcome) {
        let Some(notifier) = &self.notifier else {
            tracing::debug!(job_id, "Email delivery not configured, skipping notification");
            return;
        };

        let email = match UserRepo::find_by_id(&self.pool, user_id).await {
            Ok(Some(user)) => user.email,
            Ok(None) => {
                tracing::error!(job_id, user_id, "Job owner vanished, cannot notify");
                return;
            }
            Err(e) => {
                tracing::error!(job_id, user_id, error = %e, "User lookup failed, cannot notify");
                return;
            }
        };

        for attempt in 0..self.config.notify_retry_attempts {
            match notifier.deliver(&email, job_id, outcome).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(job_id, attempt, error = %e, "Notification delivery failed");
                }
            }
        }
        tracing::error!(
            job_id,
            attempts = self.config.notify_retry_attempts,
            "Giving up on notification delivery",
        );
    }
}
