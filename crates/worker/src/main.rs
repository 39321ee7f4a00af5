//! `fitcheck-worker` -- the try-on lifecycle coordinator daemon.
//!
//! Claims created jobs, submits them to the generation service, polls to a
//! terminal state, and emails the user the outcome.
//!
//! # Environment variables
//!
//! | Variable        | Required | Description                              |
//! |-----------------|----------|------------------------------------------|
//! | `DATABASE_URL`  | yes      | Postgres connection string               |
//! | `MODEL_API_URL` | yes      | Generation service base URL              |
//! | `MEDIA_ROOT`    | no       | Media store root (default `./media`)     |
//! | `SMTP_HOST` ... | no       | Email delivery (unset disables emails)   |
//!
//! Plus the polling knobs documented on `CoordinatorConfig::from_env`.

use std::sync::Arc;

use fitcheck_core::media::MediaStore;
use fitcheck_model::GenerationApi;
use fitcheck_notify::{EmailConfig, EmailNotifier};
use fitcheck_worker::{Coordinator, CoordinatorConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitcheck_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = fitcheck_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    fitcheck_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    let model = GenerationApi::from_env().unwrap_or_else(|| {
        tracing::error!("MODEL_API_URL environment variable is required");
        std::process::exit(1);
    });

    let media = MediaStore::from_env();
    tracing::info!(root = %media.root().display(), "Media store ready");

    let notifier = match EmailConfig::from_env() {
        Some(config) => {
            tracing::info!(host = %config.smtp_host, "Email delivery configured");
            Some(EmailNotifier::new(config))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, completion emails disabled");
            None
        }
    };

    let config = CoordinatorConfig::from_env();
    tracing::info!(?config, "Coordinator configuration loaded");

    let coordinator = Arc::new(Coordinator::new(
        pool,
        media,
        Arc::new(model),
        notifier,
        config,
    ));

    let cancel = CancellationToken::new();
    let run_handle = tokio::spawn(Arc::clone(&coordinator).run(cancel.clone()));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping claim loop");
    cancel.cancel();
    let _ = run_handle.await;
    tracing::info!("Coordinator stopped");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
