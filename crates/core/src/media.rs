//! Media validation and the on-disk media store.
//!
//! Uploaded selfie/outfit images are validated (non-empty, declared
//! `image/*` content type, and bytes that actually sniff as a supported
//! image format) and written durably before a reference is handed out.
//! References are opaque relative paths of the form
//! `jobs/{job_id}/{role}.{ext}`; callers never touch the filesystem layout
//! directly.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::types::DbId;

/// Default media root when `MEDIA_ROOT` is not set.
pub const DEFAULT_MEDIA_ROOT: &str = "./media";

/// Upload size ceiling (16 MiB). Matches the API-side multipart limit.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// MediaRole
// ---------------------------------------------------------------------------

/// Which of the two per-job images an asset is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRole {
    Selfie,
    Outfit,
}

impl MediaRole {
    /// Database / multipart field name for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaRole::Selfie => "selfie",
            MediaRole::Outfit => "outfit",
        }
    }

    /// Parse from a field or column name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "selfie" => Some(MediaRole::Selfie),
            "outfit" => Some(MediaRole::Outfit),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an uploaded image and return the file extension to store it
/// under.
///
/// Rejects empty payloads, oversized payloads, declared content types
/// outside `image/*`, and bytes that do not sniff as PNG, JPEG, or WebP.
pub fn validate_upload(
    role: MediaRole,
    bytes: &[u8],
    content_type: &str,
) -> Result<&'static str, CoreError> {
    if bytes.is_empty() {
        return Err(CoreError::Validation(format!(
            "Uploaded {} is empty",
            role.as_str()
        )));
    }

    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(CoreError::Validation(format!(
            "Uploaded {} exceeds the {MAX_UPLOAD_BYTES}-byte limit",
            role.as_str()
        )));
    }

    if !content_type.starts_with("image/") {
        return Err(CoreError::Validation(format!(
            "Unsupported content type '{content_type}' for {}: must be image/*",
            role.as_str()
        )));
    }

    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Ok("png"),
        Ok(image::ImageFormat::Jpeg) => Ok("jpg"),
        Ok(image::ImageFormat::WebP) => Ok("webp"),
        Ok(other) => Err(CoreError::Validation(format!(
            "Unsupported image format {other:?} for {}: must be PNG, JPEG, or WebP",
            role.as_str()
        ))),
        Err(_) => Err(CoreError::Validation(format!(
            "Uploaded {} is not a recognisable image",
            role.as_str()
        ))),
    }
}

// ---------------------------------------------------------------------------
// MediaStore
// ---------------------------------------------------------------------------

/// Filesystem-backed store for uploaded media.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store from the `MEDIA_ROOT` environment variable
    /// (default `./media`).
    pub fn from_env() -> Self {
        let root = std::env::var("MEDIA_ROOT").unwrap_or_else(|_| DEFAULT_MEDIA_ROOT.to_string());
        Self::new(root)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and durably write an uploaded image, returning its opaque
    /// storage reference.
    ///
    /// The write completes (including directory creation) before the
    /// reference is returned; a reference therefore always points at
    /// readable bytes.
    pub async fn store(
        &self,
        job_id: DbId,
        role: MediaRole,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, CoreError> {
        let ext = validate_upload(role, bytes, content_type)?;
        let reference = format!("jobs/{job_id}/{}.{ext}", role.as_str());

        let dest = self.root.join(&reference);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Internal(format!("Failed to create media dir: {e}")))?;
        }
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to write media: {e}")))?;

        Ok(reference)
    }

    /// Read the bytes behind a storage reference.
    pub async fn fetch(&self, reference: &str) -> Result<Vec<u8>, CoreError> {
        Self::check_reference(reference)?;
        tokio::fs::read(self.root.join(reference))
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to read media '{reference}': {e}")))
    }

    /// Remove a job's media directory. Used when an upload is rolled back;
    /// missing directories are not an error.
    pub async fn remove_job_dir(&self, job_id: DbId) -> Result<(), CoreError> {
        let dir = self.root.join(format!("jobs/{job_id}"));
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Internal(format!(
                "Failed to remove media dir for job {job_id}: {e}"
            ))),
        }
    }

    /// References are store-generated relative paths; reject anything that
    /// could escape the root.
    fn check_reference(reference: &str) -> Result<(), CoreError> {
        if reference.is_empty()
            || reference.starts_with('/')
            || reference.split('/').any(|seg| seg == "..")
        {
            return Err(CoreError::Validation(format!(
                "Invalid media reference '{reference}'"
            )));
        }
        Ok(())
    }
}
