//! Summary cache with hierarchical (tiered) compression.
//!
//! A [`SummaryRecord`] is valid only while its content version hash equals the
//! current hash of the chapters it covers. Reads recompute the hash and treat
//! a mismatch as a miss, so a stale record can never be served.
//!
//! Ranges longer than `meta_summary_tier_size` chapters are split into
//! fixed-size sub-ranges starting at the range's first chapter. Each sub-range
//! gets a tier-0 (direct) summary; those are then compressed again, at most
//! `meta_summary_tier_size` at a time, into tier-1 meta-summaries, and so on
//! until a single record spans the whole range. No compression call ever
//! receives more than `meta_summary_tier_size` inputs.
//!
//! Every meta-summary records the keys it was built from. The store uses those
//! edges to cascade invalidation: editing a chapter removes the direct
//! summaries covering it and every meta-summary built on them, while
//! summaries of disjoint ranges are untouched.
//!
//! The older range grows by one chapter per chapter written. Storing the
//! summary of a longer prefix drops the shorter ones of the same tier, so the
//! store does not accumulate every prefix ever requested.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::{
    AgentGateway, AgentRole, AgentTask, ChapterNumber, ChapterRecord, ContentHash, PipelineError,
    ProjectId, ProjectStore, Stage, SummaryConfig, SummaryStore, TaskType, Timestamp,
};

/// Floor on the requested summary length, so short chapters still get a
/// usable summary.
const MIN_TARGET_WORDS: usize = 50;

// ---------------------------------------------------------------------------
// Keys and records
// ---------------------------------------------------------------------------

/// An inclusive chapter range within a project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryRange {
    pub project: ProjectId,
    pub start: ChapterNumber,
    pub end: ChapterNumber,
}

impl SummaryRange {
    /// Returns `None` when `start > end`.
    pub fn new(project: ProjectId, start: ChapterNumber, end: ChapterNumber) -> Option<Self> {
        (start <= end).then_some(Self {
            project,
            start,
            end,
        })
    }

    pub fn covers(&self, chapter: ChapterNumber) -> bool {
        self.start <= chapter && chapter <= self.end
    }

    /// Number of chapters in the range.
    pub fn chapter_count(&self) -> u32 {
        self.end.get() - self.start.get() + 1
    }
}

impl std::fmt::Display for SummaryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}-{}]", self.project, self.start, self.end)
    }
}

/// Cache key: the range plus the content version hash it was built against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub range: SummaryRange,
    pub version_hash: ContentHash,
}

/// A compressed representation of a chapter range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub key: SummaryKey,
    pub text: String,
    /// 0 for a direct summary of chapter text, N for a summary of tier N-1 records.
    pub tier: u32,
    pub created_at: Timestamp,
    /// Keys of the lower-tier records this one was built from. Empty for tier 0.
    pub sources: Vec<SummaryKey>,
}

impl SummaryRecord {
    pub fn range(&self) -> &SummaryRange {
        &self.key.range
    }
}

// ---------------------------------------------------------------------------
// Version hashing
// ---------------------------------------------------------------------------

/// Stable digest over the current content of `chapters`, in the given order.
///
/// Chapter numbers and lengths are mixed in so that moving text between
/// chapters changes the hash.
pub fn content_version_hash(chapters: &[ChapterRecord]) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    for chapter in chapters {
        hasher.update(&chapter.number.get().to_le_bytes());
        hasher.update(&(chapter.content().len() as u64).to_le_bytes());
        hasher.update(chapter.content().as_bytes());
    }
    ContentHash::from_hex_digest(hasher.finalize().to_hex().to_string())
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Read-through cache of chapter-range summaries.
pub struct SummaryCache {
    gateway: Arc<dyn AgentGateway>,
    chapters: Arc<dyn ProjectStore>,
    store: Arc<dyn SummaryStore>,
    config: SummaryConfig,
}

impl SummaryCache {
    /// Compression calls go through `gateway` unchanged, so a retrying,
    /// cancellation-aware gateway covers them too.
    pub fn new(
        gateway: Arc<dyn AgentGateway>,
        chapters: Arc<dyn ProjectStore>,
        store: Arc<dyn SummaryStore>,
        config: SummaryConfig,
    ) -> Self {
        Self {
            gateway,
            chapters,
            store,
            config,
        }
    }

    /// Returns a fresh summary of chapters `start..=end`, creating (and
    /// caching) whatever is missing or stale.
    ///
    /// Calling this twice with no intervening chapter edits issues compression
    /// calls only the first time.
    #[instrument(skip(self), fields(project = %project, start = %start, end = %end))]
    pub async fn get_or_create_summary(
        &self,
        project: &ProjectId,
        start: ChapterNumber,
        end: ChapterNumber,
    ) -> Result<SummaryRecord, PipelineError> {
        let empty = || PipelineError::EmptySummaryRange { start, end };
        let range = SummaryRange::new(project.clone(), start, end).ok_or_else(empty)?;

        let chapters: Vec<ChapterRecord> = self
            .chapters
            .chapters(project, start, end)
            .await?
            .into_iter()
            .filter(ChapterRecord::has_content)
            .collect();
        if chapters.is_empty() {
            return Err(empty());
        }

        if range.chapter_count() <= self.config.meta_summary_tier_size {
            self.direct_summary(range, &chapters).await
        } else {
            self.tiered_summary(range, &chapters).await
        }
    }

    /// Drops every summary that covers `chapter`, cascading to meta-summaries
    /// built from them. Must be called after any out-of-band chapter edit.
    #[instrument(skip(self), fields(project = %project, chapter = %chapter))]
    pub async fn invalidate(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<SummaryKey>, PipelineError> {
        let removed = self.store.invalidate_covering(project, chapter).await?;
        info!(removed = removed.len(), "summary cache invalidated");
        Ok(removed)
    }

    async fn tiered_summary(
        &self,
        range: SummaryRange,
        chapters: &[ChapterRecord],
    ) -> Result<SummaryRecord, PipelineError> {
        let tier_size = self.config.meta_summary_tier_size.max(2);

        let mut level = Vec::new();
        for sub in partition(&range, tier_size) {
            let covered = chapters_in(chapters, &sub);
            if covered.is_empty() {
                continue;
            }
            level.push(self.direct_summary(sub, &covered).await?);
        }

        let mut tier = 0;
        while level.len() > 1 {
            tier += 1;
            let mut next = Vec::with_capacity(level.len().div_ceil(tier_size as usize));
            for group in level.chunks(tier_size as usize) {
                if let [single] = group {
                    next.push(single.clone());
                } else {
                    next.push(self.meta_summary(group, tier, chapters).await?);
                }
            }
            level = next;
        }

        level.pop().ok_or(PipelineError::EmptySummaryRange {
            start: range.start,
            end: range.end,
        })
    }

    async fn direct_summary(
        &self,
        range: SummaryRange,
        chapters: &[ChapterRecord],
    ) -> Result<SummaryRecord, PipelineError> {
        let hash = content_version_hash(chapters);
        if let Some(hit) = self.lookup(&range, &hash, 0).await? {
            return Ok(hit);
        }

        let text = render_chapters(chapters);
        let task = AgentTask::new(AgentRole::Summarizer, TaskType::SummarizeRange)
            .with("start_chapter", range.start.get())
            .with("end_chapter", range.end.get())
            .with("tier", 0)
            .with("target_words", self.target_words(&text))
            .with("text", text);

        self.compress(task, range, hash, 0, Vec::new()).await
    }

    async fn meta_summary(
        &self,
        children: &[SummaryRecord],
        tier: u32,
        chapters: &[ChapterRecord],
    ) -> Result<SummaryRecord, PipelineError> {
        let (Some(first), Some(last)) = (children.first(), children.last()) else {
            return Err(PipelineError::Configuration {
                message: "meta-summary requested over no children".to_string(),
            });
        };
        let range = SummaryRange {
            project: first.range().project.clone(),
            start: first.range().start,
            end: last.range().end,
        };

        let hash = content_version_hash(&chapters_in(chapters, &range));
        if let Some(hit) = self.lookup(&range, &hash, tier).await? {
            return Ok(hit);
        }

        let texts: Vec<&str> = children.iter().map(|c| c.text.as_str()).collect();
        let joined = texts.join("\n\n---\n\n");
        let task = AgentTask::new(AgentRole::Summarizer, TaskType::MetaSummarize)
            .with("start_chapter", range.start.get())
            .with("end_chapter", range.end.get())
            .with("tier", tier)
            .with("target_words", self.target_words(&joined))
            .with("summaries", json!(texts));

        let sources = children.iter().map(|c| c.key.clone()).collect();
        self.compress(task, range, hash, tier, sources).await
    }

    /// Returns the stored record for `range` if it is still fresh.
    async fn lookup(
        &self,
        range: &SummaryRange,
        hash: &ContentHash,
        tier: u32,
    ) -> Result<Option<SummaryRecord>, PipelineError> {
        match self.store.get(range).await? {
            Some(record) if record.key.version_hash == *hash && record.tier == tier => {
                debug!(range = %range, tier, "summary cache hit");
                Ok(Some(record))
            }
            Some(record) => {
                warn!(
                    range = %range,
                    stored_hash = %record.key.version_hash,
                    current_hash = %hash,
                    "stale summary record; recomputing"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn compress(
        &self,
        task: AgentTask,
        range: SummaryRange,
        version_hash: ContentHash,
        tier: u32,
        sources: Vec<SummaryKey>,
    ) -> Result<SummaryRecord, PipelineError> {
        debug!(range = %range, tier, "summary cache miss; compressing");
        let output = self
            .gateway
            .invoke(&task)
            .await
            .map_err(|e| PipelineError::agent(Stage::Summarizing, e))?;
        let text = output
            .text("summary")
            .map_err(|e| PipelineError::agent(Stage::Summarizing, e))?
            .to_string();

        let record = SummaryRecord {
            key: SummaryKey {
                range,
                version_hash,
            },
            text,
            tier,
            created_at: Timestamp::now(),
            sources,
        };
        self.store.put(record.clone()).await?;
        Ok(record)
    }

    fn target_words(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words / self.config.compression_ratio.max(1) as usize).max(MIN_TARGET_WORDS)
    }
}

/// Splits `range` into consecutive sub-ranges of `size` chapters, the last
/// one possibly shorter.
fn partition(range: &SummaryRange, size: u32) -> Vec<SummaryRange> {
    let mut out = Vec::new();
    let mut start = range.start.get();
    while start <= range.end.get() {
        let end = (start + size - 1).min(range.end.get());
        if let (Some(s), Some(e)) = (ChapterNumber::new(start), ChapterNumber::new(end)) {
            out.push(SummaryRange {
                project: range.project.clone(),
                start: s,
                end: e,
            });
        }
        start = end + 1;
    }
    out
}

fn chapters_in(chapters: &[ChapterRecord], range: &SummaryRange) -> Vec<ChapterRecord> {
    chapters
        .iter()
        .filter(|c| range.covers(c.number))
        .cloned()
        .collect()
}

fn render_chapters(chapters: &[ChapterRecord]) -> String {
    chapters
        .iter()
        .map(|c| format!("## Chapter {}: {}\n\n{}", c.number, c.title, c.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
