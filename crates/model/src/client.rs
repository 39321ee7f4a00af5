//! The [`ModelClient`] trait: the seam between the lifecycle coordinator
//! and the generation service.

use crate::api::{ModelApiError, PollOutcome};

/// An image payload handed to the generation service.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePart {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Convert into a reqwest multipart part.
    pub(crate) fn into_part(self) -> Result<reqwest::multipart::Part, ModelApiError> {
        reqwest::multipart::Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.content_type)
            .map_err(|e| ModelApiError::Protocol(format!("invalid content type: {e}")))
    }
}

/// Narrow interface to the generation service.
///
/// Implemented by [`crate::GenerationApi`] for production and by scripted
/// mocks in coordinator tests.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Submit a selfie/outfit pair; returns the external job handle.
    async fn submit(&self, selfie: ImagePart, outfit: ImagePart)
        -> Result<String, ModelApiError>;

    /// Poll a previously submitted generation.
    async fn poll(&self, external_job_id: &str) -> Result<PollOutcome, ModelApiError>;
}
