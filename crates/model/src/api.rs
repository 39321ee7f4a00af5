//! REST client for the generation service's HTTP endpoints.
//!
//! Wraps the service's two-call contract (multipart submission, status
//! polling) using [`reqwest`]. Connection-level failures surface as
//! [`ModelApiError::Request`] so the coordinator can retry them with
//! backoff; non-2xx responses surface status and body for debugging.

use serde::Deserialize;

use crate::client::{ImagePart, ModelClient};

/// HTTP client for the generation service.
pub struct GenerationApi {
    client: reqwest::Client,
    base_url: String,
}

/// Response returned by `POST /v1/generations` after the service accepts
/// a generation request.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued generation.
    pub generation_id: String,
}

/// Raw status payload from `GET /v1/generations/{id}`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    result_url: Option<String>,
    error: Option<String>,
}

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Still queued or generating.
    Pending,
    /// Finished; `result_ref` points at the rendered image.
    Succeeded { result_ref: String },
    /// The generation failed on the service side.
    Failed { reason: String },
}

/// Errors from the generation service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ModelApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    /// This is the retryable "model unavailable" case.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Generation API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service answered 2xx but the payload made no sense.
    #[error("Unexpected generation API response: {0}")]
    Protocol(String),
}

impl GenerationApi {
    /// Create a new client for the service at `base_url`
    /// (e.g. `http://host:9030`).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (connection pooling across components).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Create a client from the `MODEL_API_URL` environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("MODEL_API_URL").ok().map(Self::new)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or capture status
    /// and body text in a [`ModelApiError::Api`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ModelApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ModelApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ModelApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Map a raw status payload to a [`PollOutcome`].
///
/// The service reports `queued`/`processing` while work is in flight,
/// `succeeded` with a `result_url`, or `failed` with an `error`.
fn interpret_status(raw: StatusResponse) -> Result<PollOutcome, ModelApiError> {
    match raw.status.as_str() {
        "queued" | "processing" => Ok(PollOutcome::Pending),
        "succeeded" => {
            let result_ref = raw.result_url.ok_or_else(|| {
                ModelApiError::Protocol("status 'succeeded' without result_url".to_string())
            })?;
            Ok(PollOutcome::Succeeded { result_ref })
        }
        "failed" => Ok(PollOutcome::Failed {
            reason: raw
                .error
                .unwrap_or_else(|| "generation failed with no reason given".to_string()),
        }),
        other => Err(ModelApiError::Protocol(format!(
            "unknown generation status '{other}'"
        ))),
    }
}

#[async_trait::async_trait]
impl ModelClient for GenerationApi {
    /// Submit a selfie/outfit pair for generation.
    ///
    /// Sends `POST /v1/generations` as multipart form data with a `selfie`
    /// and an `outfit` image part. Returns the server-assigned generation
    /// ID. The client does not dedupe repeated submissions; the
    /// coordinator's state guard owns that.
    async fn submit(
        &self,
        selfie: ImagePart,
        outfit: ImagePart,
    ) -> Result<String, ModelApiError> {
        let form = reqwest::multipart::Form::new()
            .part("selfie", selfie.into_part()?)
            .part("outfit", outfit.into_part()?);

        let response = self
            .client
            .post(format!("{}/v1/generations", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let submit: SubmitResponse = Self::parse_response(response).await?;
        Ok(submit.generation_id)
    }

    /// Poll the status of a previously submitted generation.
    ///
    /// Sends `GET /v1/generations/{id}`.
    async fn poll(&self, external_job_id: &str) -> Result<PollOutcome, ModelApiError> {
        let response = self
            .client
            .get(format!("{}/v1/generations/{external_job_id}", self.base_url))
            .send()
            .await?;

        let raw: StatusResponse = Self::parse_response(response).await?;
        interpret_status(raw)
    }
}
