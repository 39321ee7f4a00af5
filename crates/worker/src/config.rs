use std::time::Duration;

use fitcheck_core::backoff::{
    DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_BASE_SECS, DEFAULT_POLL_CAP_SECS,
};

/// Default delay between claim attempts when no work is waiting.
const DEFAULT_CLAIM_INTERVAL_SECS: u64 = 2;

/// Default wall-clock deadline for a job, measured from submission.
const DEFAULT_JOB_DEADLINE_SECS: u64 = 900;

/// Default number of submit attempts before a job is failed.
const DEFAULT_SUBMIT_RETRY_ATTEMPTS: u32 = 5;

/// Default delay between submit retries.
const DEFAULT_SUBMIT_RETRY_DELAY_SECS: u64 = 5;

/// Default number of notification delivery attempts.
const DEFAULT_NOTIFY_RETRY_ATTEMPTS: u32 = 3;

/// Coordinator configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; tests shrink
/// the durations to milliseconds directly.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay between claim attempts when the queue is empty.
    pub claim_interval: Duration,
    /// Delay before the first poll; doubles per attempt.
    pub poll_base: Duration,
    /// Ceiling on the inter-poll delay.
    pub poll_cap: Duration,
    /// Polls before a still-pending job is timed out.
    pub max_poll_attempts: u32,
    /// Wall-clock deadline from `submitted_at`; exceeding it times the
    /// job out regardless of remaining poll attempts.
    pub job_deadline: Duration,
    /// Submit attempts before the job is failed with `ModelUnavailable`.
    pub submit_retry_attempts: u32,
    /// Delay between submit retries.
    pub submit_retry_delay: Duration,
    /// Notification delivery attempts; failures beyond this are logged
    /// and dropped, never escalated to job failure.
    pub notify_retry_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            claim_interval: Duration::from_secs(DEFAULT_CLAIM_INTERVAL_SECS),
            poll_base: Duration::from_secs(DEFAULT_POLL_BASE_SECS),
            poll_cap: Duration::from_secs(DEFAULT_POLL_CAP_SECS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            job_deadline: Duration::from_secs(DEFAULT_JOB_DEADLINE_SECS),
            submit_retry_attempts: DEFAULT_SUBMIT_RETRY_ATTEMPTS,
            submit_retry_delay: Duration::from_secs(DEFAULT_SUBMIT_RETRY_DELAY_SECS),
            notify_retry_attempts: DEFAULT_NOTIFY_RETRY_ATTEMPTS,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `CLAIM_INTERVAL_SECS`     | `2`     |
    /// | `POLL_BASE_DELAY_SECS`    | `2`     |
    /// | `POLL_MAX_DELAY_SECS`     | `60`    |
    /// | `POLL_MAX_ATTEMPTS`       | `30`    |
    /// | `JOB_DEADLINE_SECS`       | `900`   |
    /// | `SUBMIT_RETRY_ATTEMPTS`   | `5`     |
    /// | `SUBMIT_RETRY_DELAY_SECS` | `5`     |
    /// | `NOTIFY_RETRY_ATTEMPTS`   | `3`     |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            claim_interval: env_secs("CLAIM_INTERVAL_SECS", defaults.claim_interval),
            poll_base: env_secs("POLL_BASE_DELAY_SECS", defaults.poll_base),
            poll_cap: env_secs("POLL_MAX_DELAY_SECS", defaults.poll_cap),
            max_poll_attempts: env_u32("POLL_MAX_ATTEMPTS", defaults.max_poll_attempts),
            job_deadline: env_secs("JOB_DEADLINE_SECS", defaults.job_deadline),
            submit_retry_attempts: env_u32(
                "SUBMIT_RETRY_ATTEMPTS",
                defaults.submit_retry_attempts,
            ),
            submit_retry_delay: env_secs("SUBMIT_RETRY_DELAY_SECS", defaults.submit_retry_delay),
            notify_retry_attempts: env_u32(
                "NOTIFY_RETRY_ATTEMPTS",
                defaults.notify_retry_attempts,
            ),
        }
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
