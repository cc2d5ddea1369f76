//! Error and retry-policy types for the Scriptorium pipeline domain.
//!
//! [`PipelineError`] covers conditions that halt a chapter or the whole run.
//! [`AgentError`] is the failure surface of the agent gateway and
//! [`StoreError`] the failure surface of the persistence ports.
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].
//!
//! Revision exhaustion is not an error: it is a terminal gate decision,
//! reported as [`crate::ChapterFailure::RevisionExhausted`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ChapterNumber, Stage, TaskType};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`AgentError::retry_policy`] so the retrying gateway can decide
/// whether to re-invoke a call without escalating.
///
/// - `Retryable` errors: timeouts, malformed model output, transient upstream
///   failures (5xx, 408, 429, connection resets).
/// - `NonRetryable` errors: upstream rejections of the request itself (other 4xx).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried; the failure propagates immediately.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Agent gateway errors
// ---------------------------------------------------------------------------

/// Failure of a single agent call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum AgentError {
    /// The model did not answer within the resource policy's time limit.
    #[error("agent call timed out after {after:?}")]
    Timeout {
        /// The limit that was exceeded.
        after: Duration,
    },

    /// The model answered, but the answer did not match the task's schema.
    #[error("malformed output for task '{task}': {message}")]
    MalformedOutput {
        /// Task whose schema was violated.
        task: TaskType,
        /// What was missing or wrong.
        message: String,
    },

    /// The provider or transport reported an error.
    #[error("upstream error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        /// Human-readable description.
        message: String,
        /// HTTP status, when the failure came from an HTTP response.
        status: Option<u16>,
        /// Server-requested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The run was cancelled before the call could be issued or retried.
    #[error("agent call cancelled")]
    Cancelled,
}

impl AgentError {
    /// Convenience constructor for a malformed-output error.
    pub fn malformed(task: TaskType, message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            task,
            message: message.into(),
        }
    }

    /// Whether (and when) the failed call may be retried.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Timeout { .. } | Self::MalformedOutput { .. } => {
                RetryPolicy::Retryable { after: None }
            }
            Self::Upstream {
                status: Some(code),
                ..
            } if (400..500).contains(code) && *code != 408 && *code != 429 => {
                RetryPolicy::NonRetryable
            }
            Self::Upstream { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Cancelled => RetryPolicy::NonRetryable,
        }
    }

    /// Short machine-readable kind label, used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::Upstream { .. } => "upstream",
            Self::Cancelled => "cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

/// Failure reported by a persistence port.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// A record that must exist was not found.
    #[error("record not found: {what}")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors that halt a chapter or the whole run.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The pipeline configuration or the project's revision settings are invalid.
    ///
    /// Produced at run start; the run never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An agent call failed after exhausting its local retry budget.
    #[error("Agent call failed during {stage}: {source}")]
    Agent {
        /// Stage that issued the call.
        stage: Stage,
        /// The final error of the last attempt.
        #[source]
        source: AgentError,
    },

    /// A persistence port failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A summary was requested for a range that holds no chapter content.
    #[error("No chapter content in range {start}..={end}")]
    EmptySummaryRange {
        start: ChapterNumber,
        end: ChapterNumber,
    },

    /// A cancellation request was observed at a suspension point.
    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Wraps an agent failure with the stage that issued the call.
    pub fn agent(stage: Stage, source: AgentError) -> Self {
        Self::Agent { stage, source }
    }

    /// The stage at which a cancelled agent call was abandoned, if this error
    /// is one.
    pub fn cancelled_at(&self) -> Option<Stage> {
        match self {
            Self::Agent {
                stage,
                source: AgentError::Cancelled,
            } => Some(*stage),
            _ => None,
        }
    }
}
