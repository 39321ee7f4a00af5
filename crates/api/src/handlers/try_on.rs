//! Handlers for the try-on workflow.
//!
//! Submission accepts a multipart upload with two image fields, `selfie`
//! and `outfit`. Both are validated before the job row is created so a
//! rejected upload leaves no trace; if a durable write fails after
//! creation, the job row and its media directory are rolled back.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fitcheck_core::media::{validate_upload, MediaRole};
use fitcheck_core::types::{DbId, Timestamp};
use fitcheck_db::models::try_on_job::TryOnJob;
use fitcheck_db::models::user::User;
use fitcheck_db::repositories::{MediaAssetRepo, TryOnJobRepo, UserRepo};
use serde::Serialize;
use validator::ValidateEmail;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// Public view of a try-on job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnJobView {
    pub job_id: DbId,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl TryOnJobView {
    fn from_job(job: TryOnJob) -> AppResult<Self> {
        let state = job
            .state()
            .ok_or_else(|| {
                AppError::Internal(format!("Job {} has unknown status {}", job.id, job.status_id))
            })?
            .as_str();

        Ok(Self {
            job_id: job.id,
            state,
            result_ref: job.result_ref,
            error: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An uploaded image field, buffered and pre-validated.
struct Upload {
    role: MediaRole,
    bytes: Vec<u8>,
    content_type: String,
}

/// Look up a user by email, validating the address shape first so a
/// malformed path segment reads as a 400 rather than a 404.
async fn find_user(pool: &sqlx::PgPool, email: &str) -> AppResult<User> {
    if !email.validate_email() {
        return Err(AppError::BadRequest(format!(
            "'{email}' is not a valid email address"
        )));
    }

    UserRepo::find_by_email(pool, email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {email}")))
}

/// Drain the multipart stream into the two expected image fields.
///
/// Unknown fields are rejected; both `selfie` and `outfit` must be
/// present exactly once.
async fn read_uploads(mut multipart: Multipart) -> AppResult<(Upload, Upload)> {
    let mut selfie: Option<Upload> = None;
    let mut outfit: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        let role = MediaRole::parse(&name).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Unexpected field '{name}': expected 'selfie' and 'outfit'"
            ))
        })?;

        let content_type = field.content_type().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
            .to_vec();

        let slot = match role {
            MediaRole::Selfie => &mut selfie,
            MediaRole::Outfit => &mut outfit,
        };
        if slot.is_some() {
            return Err(AppError::BadRequest(format!("Duplicate field '{name}'")));
        }
        *slot = Some(Upload {
            role,
            bytes,
            content_type,
        });
    }

    match (selfie, outfit) {
        (Some(s), Some(o)) => Ok((s, o)),
        (None, _) => Err(AppError::BadRequest("Missing 'selfie' field".into())),
        (_, None) => Err(AppError::BadRequest("Missing 'outfit' field".into())),
    }
}

/// Persist both uploads and attach them to the job inside the caller's
/// transaction.
async fn persist_uploads(
    state: &AppState,
    tx: &mut sqlx::PgConnection,
    job_id: DbId,
    uploads: [&Upload; 2],
) -> Result<(), AppError> {
    for upload in uploads {
        let reference = state
            .media
            .store(job_id, upload.role, &upload.bytes, &upload.content_type)
            .await?;
        MediaAssetRepo::attach(
            &mut *tx,
            job_id,
            upload.role,
            &reference,
            &upload.content_type,
            upload.bytes.len() as i64,
        )
        .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /try_on_outfit/{email}
///
/// Accept a selfie and an outfit image for the given user, create a job
/// in `created` status, and return its ID. The background coordinator
/// picks the job up from there.
pub async fn submit_try_on(
    State(state): State<AppState>,
    Path(email): Path<String>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let user = find_user(&state.pool, &email).await?;

    let (selfie, outfit) = read_uploads(multipart).await?;

    // Validate both images up front so nothing is persisted for a
    // rejected request.
    for upload in [&selfie, &outfit] {
        validate_upload(upload.role, &upload.bytes, &upload.content_type)?;
    }

    // Job row and both asset rows commit together: the job only becomes
    // visible to the worker's claim query once its media is durable.
    let mut tx = state.pool.begin().await?;
    let job = TryOnJobRepo::create(&mut *tx, user.id).await?;

    if let Err(err) = persist_uploads(&state, &mut tx, job.id, [&selfie, &outfit]).await {
        if let Err(cleanup) = tx.rollback().await {
            tracing::error!(job_id = job.id, error = %cleanup, "Rollback failed");
        }
        if let Err(cleanup) = state.media.remove_job_dir(job.id).await {
            tracing::error!(job_id = job.id, error = %cleanup, "Rollback media cleanup failed");
        }
        return Err(err);
    }

    if let Err(err) = tx.commit().await {
        if let Err(cleanup) = state.media.remove_job_dir(job.id).await {
            tracing::error!(job_id = job.id, error = %cleanup, "Rollback media cleanup failed");
        }
        return Err(err.into());
    }

    tracing::info!(job_id = job.id, user_id = user.id, "Try-on job accepted");

    Ok(Json(TryOnJobView::from_job(job)?))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /try_on_outfit/{id}
///
/// Current state of a job, with the result reference once succeeded and
/// the error message once failed or timed out.
pub async fn get_try_on(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id: DbId = raw_id
        .parse()
        .map_err(|_| AppError::NotFound(format!("job {raw_id}")))?;

    let job = TryOnJobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

    Ok(Json(TryOnJobView::from_job(job)?))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /try_on_outfit/{id}/cancel
///
/// Cancel a job that has not started processing. Returns 204 on success
/// and 409 once the job is processing or terminal.
pub async fn cancel_try_on(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    // Distinguish "no such job" from "too late to cancel".
    let job = TryOnJobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

    if !TryOnJobRepo::cancel(&state.pool, job_id).await? {
        let state_name = job.state().map(|s| s.as_str()).unwrap_or("unknown");
        return Err(AppError::Conflict(format!(
            "Job {job_id} can no longer be cancelled (state: {state_name})"
        )));
    }

    tracing::info!(job_id, "Try-on job cancelled");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /users/{email}/try_ons
///
/// All of a user's jobs, newest first.
pub async fn list_try_ons(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = find_user(&state.pool, &email).await?;

    let jobs = TryOnJobRepo::list_by_user(&state.pool, user.id).await?;
    let views = jobs
        .into_iter()
        .map(TryOnJobView::from_job)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(DataResponse { data: views }))
}
