//! Shared helpers for API integration tests.
//!
//! Requests are driven through `tower::ServiceExt::oneshot` against the
//! same router (and middleware stack) the production binary builds.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use fitcheck_core::media::MediaStore;
use http_body_util::BodyExt;
use sqlx::PgPool;

use fitcheck_api::config::ServerConfig;
use fitcheck_api::router::build_app_router;
use fitcheck_api::state::AppState;
use tower::ServiceExt;

/// Magic bytes of a PNG file; enough for format sniffing.
pub const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Build the full application router with all middleware layers, backed
/// by the given pool and media root.
pub fn build_test_app(pool: PgPool, media_root: &Path) -> Router {
    let config = test_config();

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        media: Arc::new(MediaStore::new(media_root)),
    };

    build_app_router(state, &config)
}

/// Insert a user and return their ID.
pub async fn seed_user(pool: &PgPool, email: &str) -> i64 {
    fitcheck_db::repositories::UserRepo::create(pool, email, None)
        .await
        .expect("failed to seed user")
        .id
}

/// Send a GET request to the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a bodyless POST request to the app.
pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a multipart POST request to the app.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    boundary: &str,
    body: Vec<u8>,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Parse a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("response body was not valid JSON")
}

/// Build a multipart body containing the given image fields.
///
/// Each part is `(field_name, file_name, content_type, bytes)`.
pub fn multipart_body(boundary: &str, parts: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// Convenience: a well-formed selfie+outfit PNG upload body.
pub fn valid_upload_body(boundary: &str) -> Vec<u8> {
    multipart_body(
        boundary,
        &[
            ("selfie", "selfie.png", "image/png", PNG_MAGIC),
            ("outfit", "outfit.png", "image/png", PNG_MAGIC),
        ],
    )
}
