//! Coordinator integration tests against a scripted generation service.
//!
//! The mock never touches the network (except one helper that provokes a
//! real connection error against a closed local port, to exercise the
//! retryable-error path the way production sees it).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fitcheck_core::lifecycle::JobState;
use fitcheck_core::media::{MediaRole, MediaStore};
use fitcheck_db::models::try_on_job::TryOnJob;
use fitcheck_db::repositories::{MediaAssetRepo, TryOnJobRepo, UserRepo};
use fitcheck_model::{ImagePart, ModelApiError, ModelClient, PollOutcome};
use fitcheck_worker::{Coordinator, CoordinatorConfig};
use sqlx::PgPool;

/// Magic bytes of a PNG file; enough for the media store's sniffing.
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// ---------------------------------------------------------------------------
// Scripted mock
// ---------------------------------------------------------------------------

/// What the mock should do on each `submit` call.
enum SubmitStep {
    Accept(&'static str),
    Unavailable,
}

/// A `ModelClient` that replays a scripted conversation.
///
/// `submit` pops from `submit_steps` (empty = accept as `"gen-1"`);
/// `poll` pops from `poll_steps` (empty = pending forever).
struct ScriptedModel {
    submit_steps: Mutex<VecDeque<SubmitStep>>,
    poll_steps: Mutex<VecDeque<PollOutcome>>,
    submissions: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    fn new(
        submit_steps: impl IntoIterator<Item = SubmitStep>,
        poll_steps: impl IntoIterator<Item = PollOutcome>,
    ) -> Arc<Self> {
        Arc::new(Self {
            submit_steps: Mutex::new(submit_steps.into_iter().collect()),
            poll_steps: Mutex::new(poll_steps.into_iter().collect()),
            submissions: Mutex::new(Vec::new()),
        })
    }

    /// Pending forever, submissions always accepted.
    fn pending_forever() -> Arc<Self> {
        Self::new([], [])
    }
}

/// Provoke a genuine connection-level `reqwest::Error` (the retryable
/// "model unavailable" case) by dialing a closed local port.
async fn connection_error() -> ModelApiError {
    let err = reqwest::Client::new()
        .get("http://127.0.0.1:1/v1/generations")
        .send()
        .await
        .expect_err("port 1 must refuse connections");
    ModelApiError::Request(err)
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    async fn submit(
        &self,
        selfie: ImagePart,
        outfit: ImagePart,
    ) -> Result<String, ModelApiError> {
        self.submissions
            .lock()
            .unwrap()
            .push((selfie.file_name.clone(), outfit.file_name.clone()));

        let step = self.submit_steps.lock().unwrap().pop_front();
        match step {
            None => Ok("gen-1".to_string()),
            Some(SubmitStep::Accept(id)) => Ok(id.to_string()),
            Some(SubmitStep::Unavailable) => Err(connection_error().await),
        }
    }

    async fn poll(&self, _external_job_id: &str) -> Result<PollOutcome, ModelApiError> {
        Ok(self
            .poll_steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PollOutcome::Pending))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Millisecond-scale config so tests finish quickly.
fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        claim_interval: Duration::from_millis(1),
        poll_base: Duration::ZERO,
        poll_cap: Duration::from_millis(1),
        max_poll_attempts: 5,
        job_deadline: Duration::from_secs(60),
        submit_retry_attempts: 2,
        submit_retry_delay: Duration::ZERO,
        notify_retry_attempts: 1,
    }
}

fn coordinator(
    pool: &PgPool,
    store: &MediaStore,
    model: Arc<ScriptedModel>,
    config: CoordinatorConfig,
) -> Coordinator {
    Coordinator::new(pool.clone(), store.clone(), model, None, config)
}

/// Create a user, a job, and both stored media assets.
async fn seed_job(pool: &PgPool, store: &MediaStore) -> TryOnJob {
    let user = UserRepo::create(pool, "a@x.com", Some("Ada")).await.unwrap();
    let job = TryOnJobRepo::create(pool, user.id).await.unwrap();
    for role in [MediaRole::Selfie, MediaRole::Outfit] {
        let reference = store
            .store(job.id, role, PNG_MAGIC, "image/png")
            .await
            .unwrap();
        MediaAssetRepo::attach(
            pool,
            job.id,
            role,
            &reference,
            "image/png",
            PNG_MAGIC.len() as i64,
        )
        .await
        .unwrap();
    }
    job
}

async fn fetch(pool: &PgPool, job_id: i64) -> TryOnJob {
    TryOnJobRepo::find_by_id(pool, job_id).await.unwrap().unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn pending_forever_reaches_timed_out(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let job = seed_job(&pool, &store).await;

    let model = ScriptedModel::pending_forever();
    let coord = coordinator(&pool, &store, Arc::clone(&model), fast_config());

    let driven = coord.run_once().await.unwrap();
    assert_eq!(driven, Some(job.id));

    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::TimedOut));
    assert!(row.error_message.unwrap().contains("poll budget"));
    assert!(row.result_ref.is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn deadline_exceeded_reaches_timed_out(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let job = seed_job(&pool, &store).await;

    let model = ScriptedModel::pending_forever();
    let mut config = fast_config();
    config.max_poll_attempts = u32::MAX; // only the deadline can stop us
    config.job_deadline = Duration::ZERO;
    let coord = coordinator(&pool, &store, model, config);

    coord.run_once().await.unwrap();

    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::TimedOut));
    assert!(row.error_message.unwrap().contains("deadline"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn pending_then_succeeded_records_the_result(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let job = seed_job(&pool, &store).await;

    let model = ScriptedModel::new(
        [SubmitStep::Accept("gen-77")],
        [
            PollOutcome::Pending,
            PollOutcome::Succeeded {
                result_ref: "https://cdn.example/outputs/gen-77.png".to_string(),
            },
        ],
    );
    let coord = coordinator(&pool, &store, Arc::clone(&model), fast_config());

    coord.run_once().await.unwrap();

    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::Succeeded));
    assert_eq!(row.external_job_id.as_deref(), Some("gen-77"));
    assert_eq!(
        row.result_ref.as_deref(),
        Some("https://cdn.example/outputs/gen-77.png")
    );
    assert!(row.error_message.is_none());
    assert!(row.completed_at.is_some());

    // The mock saw both image parts, named after their storage refs.
    let submissions = model.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0, "selfie.png");
    assert_eq!(submissions[0].1, "outfit.png");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn service_failure_records_the_reason(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let job = seed_job(&pool, &store).await;

    let model = ScriptedModel::new(
        [],
        [
            PollOutcome::Pending,
            PollOutcome::Failed {
                reason: "input images incompatible".to_string(),
            },
        ],
    );
    let coord = coordinator(&pool, &store, model, fast_config());

    coord.run_once().await.unwrap();

    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::Failed));
    assert_eq!(row.error_message.as_deref(), Some("input images incompatible"));
    assert!(row.result_ref.is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unreachable_service_fails_the_job_after_retries(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let job = seed_job(&pool, &store).await;

    let model = ScriptedModel::new(
        [SubmitStep::Unavailable, SubmitStep::Unavailable],
        [],
    );
    let coord = coordinator(&pool, &store, Arc::clone(&model), fast_config());

    coord.run_once().await.unwrap();

    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::Failed));
    assert!(row.error_message.unwrap().contains("unavailable"));

    // Both configured attempts were spent.
    assert_eq!(model.submissions.lock().unwrap().len(), 2);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn empty_queue_is_a_noop(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let model = ScriptedModel::pending_forever();
    let coord = coordinator(&pool, &store, model, fast_config());

    assert_eq!(coord.run_once().await.unwrap(), None);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_media_fails_the_job(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());

    // A job with no attached assets: the driver cannot load its media.
    let user = UserRepo::create(&pool, "a@x.com", Some("Ada")).await.unwrap();
    let job = TryOnJobRepo::create(&pool, user.id).await.unwrap();

    let model = ScriptedModel::pending_forever();
    let coord = coordinator(&pool, &store, Arc::clone(&model), fast_config());

    let driven = coord.run_once().await.unwrap();
    assert_eq!(driven, Some(job.id));

    // The driver error lands in the row, not just the logs.
    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::Failed));
    assert!(row.error_message.unwrap().contains("internal error"));
    assert!(row.result_ref.is_none());

    // Nothing was ever submitted.
    assert!(model.submissions.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn recovery_does_not_block_new_claims(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());

    // A job stranded in `processing` from before a restart, whose
    // generation will stay pending for the whole run.
    let stranded = seed_job(&pool, &store).await;
    TryOnJobRepo::claim_next(&pool).await.unwrap().unwrap();
    TryOnJobRepo::set_external_job_id(&pool, stranded.id, "gen-old")
        .await
        .unwrap();
    TryOnJobRepo::mark_processing(&pool, stranded.id).await.unwrap();

    // A fresh job waiting in the queue behind it.
    let fresh = TryOnJobRepo::create(&pool, stranded.user_id).await.unwrap();
    for role in [MediaRole::Selfie, MediaRole::Outfit] {
        let reference = store
            .store(fresh.id, role, PNG_MAGIC, "image/png")
            .await
            .unwrap();
        MediaAssetRepo::attach(
            &pool,
            fresh.id,
            role,
            &reference,
            "image/png",
            PNG_MAGIC.len() as i64,
        )
        .await
        .unwrap();
    }

    let model = ScriptedModel::pending_forever();
    let mut config = fast_config();
    config.poll_base = Duration::from_millis(50);
    config.poll_cap = Duration::from_millis(50);
    config.max_poll_attempts = u32::MAX;
    config.claim_interval = Duration::from_millis(5);
    let coord = Arc::new(coordinator(&pool, &store, model, config));

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&coord).run(cancel.clone()));

    // The fresh job must get claimed while the recovery is still
    // polling the stranded one.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let row = fetch(&pool, fresh.id).await;
    assert_ne!(row.state(), Some(JobState::Created));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("coordinator must stop on cancellation")
        .unwrap();
}

#[sqlx::test(migrations = "../db/migrations")]
async fn submit_retries_consume_the_deadline(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::new(dir.path());
    let job = seed_job(&pool, &store).await;

    // First submit attempt fails, the retry delay outlasts the whole
    // deadline, the second attempt is accepted.
    let model = ScriptedModel::new(
        [SubmitStep::Unavailable, SubmitStep::Accept("gen-9")],
        [],
    );
    let mut config = fast_config();
    config.submit_retry_delay = Duration::from_millis(50);
    config.job_deadline = Duration::from_millis(10);
    config.max_poll_attempts = u32::MAX;
    let coord = coordinator(&pool, &store, model, config);

    coord.run_once().await.unwrap();

    // The clock ran from the claim, so the retry delay already spent
    // the deadline before the first poll.
    let row = fetch(&pool, job.id).await;
    assert_eq!(row.state(), Some(JobState::TimedOut));
    assert!(row.error_message.unwrap().contains("deadline"));
}
