//! Core domain for Scriptorium, a multi-agent book-writing pipeline.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type, the pure decision logic (quality gate, context budgeting, tiered
//! summarisation), and the port traits the orchestrator talks through.
//! Infrastructure crates implement the ports; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ProjectId`, `ChapterNumber`, `AttemptIndex`, etc.) |
//! | [`types`] | Shared value types (`TokenCount`, `QualityScore`, `Timestamp`) |
//! | [`model`] | Project state, chapter records, revision attempts, story bible, outline |
//! | [`config`] | Configuration surface and validation |
//! | [`agent`] | Agent roles, task descriptors and schema-checked outputs |
//! | [`gate`] | The quality gate decision function |
//! | [`context`] | Token estimation and context assembly |
//! | [`summary`] | Summary cache with tiered compression |
//! | [`events`] | Stages, status events, terminal outcomes |
//! | [`ports`] | Model, persistence and event-sink traits |
//! | [`memory`] | In-memory port implementations |
//! | [`errors`] | Error and retry-policy types |

pub mod agent;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod gate;
pub mod identifiers;
pub mod memory;
pub mod model;
pub mod ports;
pub mod summary;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use agent::{AgentOutput, AgentRole, AgentTask, EditPass, TaskType};
pub use config::{
    validate_revision, ChapterFailurePolicy, ContextConfig, EscalationPolicy, PipelineConfig,
    ResourcePolicy, RetryConfig, RevisionConfig, RunPolicy, ScoringConfig, SummaryConfig,
    WriterMode,
};
pub use context::{ContextBuilder, ContextBundle, TokenEstimator, WordRatioEstimator};
pub use errors::{AgentError, PipelineError, RetryPolicy, StoreError};
pub use events::{AbortReason, ChapterFailure, PipelineEvent, Stage, TerminalOutcome};
pub use gate::{decide, decide_overall, GateDecision};
pub use identifiers::{AttemptIndex, ChapterNumber, ContentHash, ModelName, ProjectId, RunId};
pub use memory::{InMemoryProjectStore, InMemorySummaryStore};
pub use model::{
    ChapterPlan, ChapterRecord, ChapterStatus, FactCategory, Outline, ProjectBrief, ProjectState,
    RevisionAttempt, RunPhase, StoryBible, StoryFact,
};
pub use ports::{
    AgentGateway, Completion, CompletionRequest, EventSink, LlmProvider, ProjectStore,
    SummaryStore,
};
pub use summary::{content_version_hash, SummaryCache, SummaryKey, SummaryRange, SummaryRecord};
pub use types::{ScoreError, ScoreWeights, QualityScore, Timestamp, TokenCount, MAX_DIMENSION_SCORE};
