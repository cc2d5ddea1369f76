//! Workflow stages, status events, and terminal outcomes.
//!
//! Events are fire-and-forget notifications for an external observability
//! layer. Outcomes and failure reasons are serialisable so a caller can store
//! or forward them without string parsing.

use serde::{Deserialize, Serialize};

use crate::{AgentError, AttemptIndex, ChapterNumber, ChapterStatus, EditPass, PipelineError};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// A state of the orchestrator's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Outlining,
    Assigning,
    Drafting,
    Editing(EditPass),
    Critiquing,
    Gate,
    Summarizing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => f.write_str("planning"),
            Self::Outlining => f.write_str("outlining"),
            Self::Assigning => f.write_str("assigning"),
            Self::Drafting => f.write_str("drafting"),
            Self::Editing(pass) => write!(f, "editing:{pass}"),
            Self::Critiquing => f.write_str("critiquing"),
            Self::Gate => f.write_str("gate"),
            Self::Summarizing => f.write_str("summarizing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure reasons
// ---------------------------------------------------------------------------

/// Why a chapter ended in status `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChapterFailure {
    /// The quality gate escalated and the escalation policy did not override it.
    RevisionExhausted {
        attempts: u32,
        best_score: f64,
    },
    /// An agent call failed after its retry budget was spent.
    AgentCallFailed {
        stage: Stage,
        error: AgentError,
    },
}

impl std::fmt::Display for ChapterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RevisionExhausted {
                attempts,
                best_score,
            } => write!(
                f,
                "revision budget exhausted after {attempts} attempts (best score {best_score:.2})"
            ),
            Self::AgentCallFailed { stage, error } => {
                write!(f, "agent call failed during {stage}: {error}")
            }
        }
    }
}

/// Why a run stopped before finishing every chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// A chapter failed and the failure policy is `halt`.
    ChapterFailed {
        chapter: ChapterNumber,
        failure: ChapterFailure,
    },
    /// Cancellation was observed before the next agent call.
    Cancelled {
        chapter: Option<ChapterNumber>,
        stage: Stage,
    },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChapterFailed { chapter, failure } => {
                write!(f, "chapter {chapter} failed: {failure}")
            }
            Self::Cancelled {
                chapter: Some(chapter),
                stage,
            } => write!(f, "cancelled before {stage} of chapter {chapter}"),
            Self::Cancelled {
                chapter: None,
                stage,
            } => write!(f, "cancelled before {stage}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Terminal outcome
// ---------------------------------------------------------------------------

/// How a workflow run ended.
///
/// Every variant carries the last successfully completed (accepted) chapter
/// so a caller can inspect or resume the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalOutcome {
    /// Every chapter reached a terminal status.
    Completed {
        accepted: u32,
        failed: u32,
        last_completed_chapter: Option<ChapterNumber>,
    },
    /// The chapter loop stopped early.
    Aborted {
        reason: AbortReason,
        last_completed_chapter: Option<ChapterNumber>,
    },
    /// A fatal error: invalid configuration, planning/outlining failure, or a
    /// persistence failure.
    Failed {
        error: PipelineError,
        last_completed_chapter: Option<ChapterNumber>,
    },
}

impl TerminalOutcome {
    pub fn last_completed_chapter(&self) -> Option<ChapterNumber> {
        match self {
            Self::Completed {
                last_completed_chapter,
                ..
            }
            | Self::Aborted {
                last_completed_chapter,
                ..
            }
            | Self::Failed {
                last_completed_chapter,
                ..
            } => *last_completed_chapter,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed {
                accepted, failed, ..
            } => write!(f, "completed ({accepted} accepted, {failed} failed)"),
            Self::Aborted { reason, .. } => write!(f, "aborted: {reason}"),
            Self::Failed { error, .. } => write!(f, "failed: {error}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Status notification emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageEntered {
        chapter: Option<ChapterNumber>,
        stage: Stage,
    },
    /// The gate returned `Revise`; `attempt` is the attempt about to start.
    RevisionTriggered {
        chapter: ChapterNumber,
        attempt: AttemptIndex,
        score: f64,
        reason: String,
    },
    /// A chapter reached `accepted` or `failed`. `failure` distinguishes
    /// revision exhaustion from infrastructure failure.
    ChapterFinalized {
        chapter: ChapterNumber,
        status: ChapterStatus,
        score: Option<f64>,
        failure: Option<ChapterFailure>,
    },
    RunTerminated {
        outcome: TerminalOutcome,
    },
}
