//! The try-on job state machine.
//!
//! A job moves through: `created --submit--> submitted --poll:pending-->
//! processing`, then to one of the terminal states `succeeded`, `failed`,
//! or `timed_out`. Cancellation is only possible before processing begins
//! (`created` or `submitted`). The legality matrix lives here so the API
//! and the worker cannot drift apart; the database enforces each step with
//! a compare-and-swap on the stored state.

use serde::Serialize;

/// Lifecycle state of a try-on job.
///
/// Discriminants match the seed order of the `job_statuses` lookup table
/// (1-based).
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created = 1,
    Submitted = 2,
    Processing = 3,
    Succeeded = 4,
    Failed = 5,
    TimedOut = 6,
    Cancelled = 7,
}

/// All states, in lookup-table order. Used by tests and random walks.
pub const ALL_STATES: [JobState; 7] = [
    JobState::Created,
    JobState::Submitted,
    JobState::Processing,
    JobState::Succeeded,
    JobState::Failed,
    JobState::TimedOut,
    JobState::Cancelled,
];

impl JobState {
    /// The database status ID for this state.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Look up a state from its database status ID.
    pub fn from_id(id: i16) -> Option<Self> {
        ALL_STATES.into_iter().find(|s| s.id() == id)
    }

    /// The wire name for this state (e.g. `"timed_out"`).
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Submitted => "submitted",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }

    /// Whether a user may still cancel a job in this state.
    ///
    /// Cancellation after processing has begun is unsupported; the workflow
    /// runs to a terminal state regardless.
    pub fn is_cancellable(self) -> bool {
        matches!(self, JobState::Created | JobState::Submitted)
    }

    /// Whether `result_ref` must be set in this state.
    ///
    /// Invariant: the result reference is set if and only if the job
    /// succeeded.
    pub fn carries_result(self) -> bool {
        self == JobState::Succeeded
    }

    /// Whether `error_message` must be set in this state.
    ///
    /// Invariant: error detail is set if and only if the job failed or
    /// timed out.
    pub fn carries_error(self) -> bool {
        matches!(self, JobState::Failed | JobState::TimedOut)
    }
}

/// Whether a transition `from -> to` is legal.
pub fn can_transition(from: JobState, to: JobState) -> bool {
    use JobState::*;
    matches!(
        (from, to),
        (Created, Submitted)
            | (Submitted, Processing)
            | (Submitted, TimedOut)
            | (Submitted, Failed)
            | (Processing, Succeeded)
            | (Processing, Failed)
            | (Processing, TimedOut)
            | (Created, Cancelled)
            | (Submitted, Cancelled)
    )
}
