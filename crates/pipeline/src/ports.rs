//! Port traits: everything the core needs from the outside world.
//!
//! Infrastructure crates implement these traits; the core never names a
//! concrete transport, database, or model runtime. Async ports use
//! `async-trait` so they remain dyn-compatible behind `Arc<dyn _>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    AgentError, AgentOutput, AgentTask, ChapterNumber, ChapterRecord, ModelName, PipelineEvent,
    ProjectId, ProjectState, QualityScore, RevisionAttempt, StoreError, SummaryKey, SummaryRange,
    SummaryRecord, TokenCount,
};

// ---------------------------------------------------------------------------
// Model access
// ---------------------------------------------------------------------------

/// A single text-completion request sent to a model provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: ModelName,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider to constrain output to a JSON object.
    pub json: bool,
}

/// The provider's answer to a [`CompletionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: Option<TokenCount>,
    pub completion_tokens: Option<TokenCount>,
}

/// Raw model access. Implemented by the `llm` crate.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider label used in logs (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Runs one completion. Timeouts map to [`AgentError::Timeout`], transport
    /// and HTTP failures to [`AgentError::Upstream`].
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError>;
}

/// Executes a named task against a model and returns schema-checked output.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn invoke(&self, task: &AgentTask) -> Result<AgentOutput, AgentError>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Durable storage of project state, chapters, attempts and scores.
///
/// The orchestrator calls this after every state transition; durability
/// guarantees are the implementation's concern.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn save_project(&self, state: &ProjectState) -> Result<(), StoreError>;

    async fn load_project(&self, project: &ProjectId) -> Result<Option<ProjectState>, StoreError>;

    /// Inserts or replaces the chapter with the same number.
    async fn save_chapter(
        &self,
        project: &ProjectId,
        chapter: &ChapterRecord,
    ) -> Result<(), StoreError>;

    async fn chapter(
        &self,
        project: &ProjectId,
        number: ChapterNumber,
    ) -> Result<Option<ChapterRecord>, StoreError>;

    /// Chapters with numbers in `start..=end`, ascending. Missing numbers are skipped.
    async fn chapters(
        &self,
        project: &ProjectId,
        start: ChapterNumber,
        end: ChapterNumber,
    ) -> Result<Vec<ChapterRecord>, StoreError>;

    /// Appends an attempt; attempts are never rewritten.
    async fn append_attempt(
        &self,
        project: &ProjectId,
        attempt: &RevisionAttempt,
    ) -> Result<(), StoreError>;

    async fn attempts(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<RevisionAttempt>, StoreError>;

    async fn save_score(&self, project: &ProjectId, score: &QualityScore)
        -> Result<(), StoreError>;

    async fn scores(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<QualityScore>, StoreError>;
}

/// Storage behind the summary cache.
///
/// Records are addressed by chapter range; the content version hash stored
/// on each record lets the cache detect staleness on read. Storing a record
/// for a range supersedes the previous one and everything built from it.
/// It also supersedes multi-chapter records of the same tier that start at
/// the same chapter and end earlier, so the store stays proportional to the
/// chapter count as the older range grows.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn put(&self, record: SummaryRecord) -> Result<(), StoreError>;

    async fn get(&self, range: &SummaryRange) -> Result<Option<SummaryRecord>, StoreError>;

    /// Removes every record covering `chapter` and every record built,
    /// directly or transitively, from a removed record. Returns the removed keys.
    async fn invalidate_covering(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<SummaryKey>, StoreError>;

    /// All records currently held for `project`, ordered by range.
    async fn records(&self, project: &ProjectId) -> Result<Vec<SummaryRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

/// Receives status events. Must not block; correctness never depends on a sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}
