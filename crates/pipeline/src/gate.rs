//! Quality gate: the pure decision function behind the revision loop.
//!
//! The gate holds no state. The orchestrator owns the attempt counter and
//! calls [`decide`] once per critique.

use serde::{Deserialize, Serialize};

use crate::{AttemptIndex, QualityScore, RevisionConfig};

/// Outcome of evaluating one critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// The score meets the threshold; the chapter is finalized as accepted.
    Accept,
    /// Below threshold with attempts remaining; draft again with the feedback.
    Revise,
    /// Below threshold and the attempt budget is spent.
    Escalate,
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::Revise => "revise",
            Self::Escalate => "escalate",
        })
    }
}

/// Decides what happens after `attempt` produced `score`.
///
/// - `Accept` if the overall score is at least the threshold (ties accept).
/// - `Revise` if below threshold and `attempt < max_revision_iterations`.
/// - `Escalate` otherwise.
pub fn decide(score: &QualityScore, attempt: AttemptIndex, config: &RevisionConfig) -> GateDecision {
    decide_overall(score.overall(), attempt, config)
}

/// [`decide`] on a raw overall score.
pub fn decide_overall(overall: f64, attempt: AttemptIndex, config: &RevisionConfig) -> GateDecision {
    if overall >= config.quality_threshold {
        GateDecision::Accept
    } else if attempt.get() < config.max_revision_iterations {
        GateDecision::Revise
    } else {
        GateDecision::Escalate
    }
}
