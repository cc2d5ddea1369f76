//! Configuration surface consumed by the pipeline core.
//!
//! Every field has a default so a partial TOML document (or none at all)
//! yields a working configuration. [`PipelineConfig::validate`] is called
//! before a run starts; an invalid configuration means the run never starts.

use serde::{Deserialize, Serialize};

use crate::{ModelName, PipelineError, ScoreWeights};

// ---------------------------------------------------------------------------
// Revision loop
// ---------------------------------------------------------------------------

/// Quality gate and revision-loop settings carried on the project state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    /// Overall score (0–10) at or above which a chapter is accepted.
    pub quality_threshold: f64,
    /// Upper bound on draft → edit → critique attempts per chapter.
    pub max_revision_iterations: u32,
    /// Number of most recent chapters always included verbatim in context.
    pub recent_chapters_in_context: u32,
    /// Length the writer is asked to aim for.
    pub target_word_count: u32,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 7.0,
            max_revision_iterations: 3,
            recent_chapters_in_context: 2,
            target_word_count: 3000,
        }
    }
}

// ---------------------------------------------------------------------------
// Context budget
// ---------------------------------------------------------------------------

/// Token budget used by the context builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Size of the target model's context window, in tokens.
    pub context_window_tokens: u64,
    /// Fraction of the window the assembled context may occupy before older
    /// chapters are replaced with a summary.
    pub context_window_threshold: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window_tokens: 32_768,
            context_window_threshold: 0.8,
        }
    }
}

impl ContextConfig {
    /// Largest token estimate that still allows older chapters verbatim.
    pub fn budget_tokens(&self) -> u64 {
        (self.context_window_tokens as f64 * self.context_window_threshold).floor() as u64
    }
}

// ---------------------------------------------------------------------------
// Summary cache
// ---------------------------------------------------------------------------

/// Summary cache compression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Target input:output ratio requested from the summarizer (10 means 10:1).
    pub compression_ratio: u32,
    /// Chapters per tier-0 group. Ranges longer than this are summarized
    /// hierarchically, and no compression call ever receives more than this
    /// many lower-tier summaries.
    pub meta_summary_tier_size: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            compression_ratio: 10,
            meta_summary_tier_size: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent call retries
// ---------------------------------------------------------------------------

/// Local retry budget applied to every agent call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (so `2` means at most three calls).
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent retry.
    pub initial_backoff_ms: u64,
    /// Ceiling on the exponential back-off.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Run policies
// ---------------------------------------------------------------------------

/// What the orchestrator does after a chapter ends in `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterFailurePolicy {
    /// Stop the chapter loop and abort the run.
    #[default]
    Halt,
    /// Record the failure and move on to the next chapter.
    Continue,
}

/// How an `Escalate` decision from the quality gate is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    /// The chapter is marked `failed`.
    #[default]
    Fail,
    /// The highest-scoring attempt's content is restored and accepted.
    AcceptBest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicy {
    pub on_chapter_failure: ChapterFailurePolicy,
    pub on_escalation: EscalationPolicy,
}

// ---------------------------------------------------------------------------
// Agent dispatch
// ---------------------------------------------------------------------------

/// Writer flavour used for chapter drafting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterMode {
    #[default]
    Narrative,
    Dialogue,
    Description,
}

/// Model resource policy consumed by the agent gateway.
///
/// Replaces any notion of a single globally loaded model: the gateway bounds
/// concurrent calls and per-call latency according to this object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePolicy {
    pub model: String,
    pub max_concurrent_calls: usize,
    pub request_timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".to_string(),
            max_concurrent_calls: 1,
            request_timeout_secs: 120,
            max_output_tokens: 4096,
        }
    }
}

impl ResourcePolicy {
    /// The configured model as a domain identifier.
    pub fn model_name(&self) -> Result<ModelName, PipelineError> {
        ModelName::new(self.model.clone()).ok_or_else(|| PipelineError::Configuration {
            message: "resource.model must not be empty".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete configuration of the pipeline core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub revision: RevisionConfig,
    pub context: ContextConfig,
    pub summary: SummaryConfig,
    pub retry: RetryConfig,
    pub policy: RunPolicy,
    pub scoring: ScoringConfig,
    pub writer_mode: WriterMode,
    pub resource: ResourcePolicy,
}

/// Optional per-dimension weighting of critique scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
}

impl ScoringConfig {
    /// Weights to apply, or `None` for a plain arithmetic mean.
    pub fn weights(&self) -> Option<&ScoreWeights> {
        (!self.weights.is_empty()).then_some(&self.weights)
    }
}

impl PipelineConfig {
    /// Checks every bound the pipeline relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_revision(&self.revision)?;

        let ctx = &self.context;
        ensure(
            ctx.context_window_tokens > 0,
            "context.context_window_tokens must be positive",
        )?;
        ensure(
            ctx.context_window_threshold.is_finite()
                && ctx.context_window_threshold > 0.0
                && ctx.context_window_threshold <= 1.0,
            "context.context_window_threshold must be in (0, 1]",
        )?;

        ensure(
            self.summary.compression_ratio >= 1,
            "summary.compression_ratio must be at least 1",
        )?;
        ensure(
            self.summary.meta_summary_tier_size >= 2,
            "summary.meta_summary_tier_size must be at least 2",
        )?;

        ensure(
            self.retry.initial_backoff_ms <= self.retry.max_backoff_ms,
            "retry.initial_backoff_ms must not exceed retry.max_backoff_ms",
        )?;

        for (dimension, weight) in self.scoring.weights.iter() {
            if !(weight.is_finite() && weight > 0.0) {
                return Err(PipelineError::Configuration {
                    message: format!("scoring weight for '{dimension}' must be positive"),
                });
            }
        }

        ensure(
            self.resource.max_concurrent_calls >= 1,
            "resource.max_concurrent_calls must be at least 1",
        )?;
        ensure(
            self.resource.request_timeout_secs >= 1,
            "resource.request_timeout_secs must be at least 1",
        )?;
        self.resource.model_name()?;

        Ok(())
    }
}

/// Validates the revision settings carried on a project state.
pub fn validate_revision(revision: &RevisionConfig) -> Result<(), PipelineError> {
    ensure(
        revision.quality_threshold.is_finite()
            && (0.0..=10.0).contains(&revision.quality_threshold),
        "revision.quality_threshold must be within 0..=10",
    )?;
    ensure(
        revision.max_revision_iterations >= 1,
        "revision.max_revision_iterations must be at least 1",
    )
}

fn ensure(condition: bool, message: &str) -> Result<(), PipelineError> {
    if condition {
        Ok(())
    } else {
        Err(PipelineError::Configuration {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.revision.quality_threshold, 7.0);
        assert_eq!(config.revision.max_revision_iterations, 3);
        assert_eq!(config.revision.recent_chapters_in_context, 2);
        assert_eq!(config.context.context_window_threshold, 0.8);
        assert_eq!(config.summary.compression_ratio, 10);
    }

    #[test]
    fn test_budget_is_threshold_fraction_of_window() {
        let ctx = ContextConfig {
            context_window_tokens: 32_000,
            context_window_threshold: 0.8,
        };
        assert_eq!(ctx.budget_tokens(), 25_600);
    }

    #[test]
    fn test_invalid_bounds_are_configuration_errors() {
        let mut config = PipelineConfig::default();
        config.revision.max_revision_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration { .. })
        ));

        let mut config = PipelineConfig::default();
        config.revision.quality_threshold = 11.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.context.context_window_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.summary.meta_summary_tier_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"revision": {"quality_threshold": 8.5}, "policy": {"on_escalation": "accept_best"}}"#)
                .unwrap();
        assert_eq!(config.revision.quality_threshold, 8.5);
        assert_eq!(config.revision.max_revision_iterations, 3);
        assert_eq!(config.policy.on_escalation, EscalationPolicy::AcceptBest);
        assert_eq!(config.policy.on_chapter_failure, ChapterFailurePolicy::Halt);
    }
}
