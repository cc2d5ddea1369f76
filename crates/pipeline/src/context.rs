//! Context assembly under a token budget.
//!
//! For chapter `n` with a rolling window of `w` chapters:
//!
//! - chapters `max(1, n-w) ..= n-1` are *recent* and always included verbatim;
//! - chapters `1 ..= max(1, n-w)-1` are *older*.
//!
//! The builder estimates the cost of the story bible, the task text, the
//! recent chapters and the older chapters. Older chapters are included
//! verbatim only when that total stays within
//! [`ContextConfig::budget_tokens`]; otherwise a single summary of the older
//! range, obtained from the [`SummaryCache`], replaces them.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::{
    ChapterNumber, ChapterRecord, ContextConfig, PipelineError, ProjectState, ProjectStore,
    SummaryCache, SummaryRecord, TokenCount,
};

// ---------------------------------------------------------------------------
// Token estimation
// ---------------------------------------------------------------------------

/// Deterministic length proxy used for budgeting.
///
/// Any monotonic estimate is acceptable as long as it is stable for the
/// lifetime of a run.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> TokenCount;
}

/// Estimates tokens as `floor(words * tokens_per_word)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordRatioEstimator {
    pub tokens_per_word: f64,
}

impl Default for WordRatioEstimator {
    fn default() -> Self {
        Self {
            tokens_per_word: 1.33,
        }
    }
}

impl TokenEstimator for WordRatioEstimator {
    fn estimate(&self, text: &str) -> TokenCount {
        let words = text.split_whitespace().count() as f64;
        TokenCount::new((words * self.tokens_per_word).floor() as u64)
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The materialized input handed to one agent call. Rebuilt per call and
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBundle {
    /// Chapter the context was built for.
    pub chapter: ChapterNumber,
    /// Rendered story bible facts.
    pub story_bible: String,
    /// Chapters included in full, ascending. Always contains the recent
    /// window; contains the older chapters too when no summary was needed.
    pub chapters: Vec<ChapterRecord>,
    /// Compressed stand-in for the older chapters, when the budget required one.
    pub summary: Option<SummaryRecord>,
    pub estimated_tokens: TokenCount,
}

impl ContextBundle {
    /// Renders the bundle as prompt text: bible, then the summary, then the
    /// verbatim chapters in narrative order.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        if !self.story_bible.is_empty() {
            sections.push(format!("## Story bible\n\n{}", self.story_bible.trim_end()));
        }
        if let Some(summary) = &self.summary {
            let range = summary.range();
            sections.push(format!(
                "## Summary of chapters {}-{}\n\n{}",
                range.start, range.end, summary.text
            ));
        }
        for chapter in &self.chapters {
            sections.push(format!(
                "## Chapter {}: {}\n\n{}",
                chapter.number,
                chapter.title,
                chapter.content()
            ));
        }
        sections.join("\n\n")
    }

    /// Numbers of the chapters present in full text.
    pub fn verbatim_chapters(&self) -> Vec<ChapterNumber> {
        self.chapters.iter().map(|c| c.number).collect()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct ContextBuilder {
    chapters: Arc<dyn ProjectStore>,
    summaries: Arc<SummaryCache>,
    estimator: Arc<dyn TokenEstimator>,
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(
        chapters: Arc<dyn ProjectStore>,
        summaries: Arc<SummaryCache>,
        estimator: Arc<dyn TokenEstimator>,
        config: ContextConfig,
    ) -> Self {
        Self {
            chapters,
            summaries,
            estimator,
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assembles the context for `chapter`.
    ///
    /// Reads chapters from the store and may populate the summary cache; has
    /// no other side effects.
    #[instrument(skip(self, project, task_text), fields(project = %project.id, chapter = %chapter))]
    pub async fn build_context(
        &self,
        project: &ProjectState,
        chapter: ChapterNumber,
        recent_window: u32,
        task_text: &str,
    ) -> Result<ContextBundle, PipelineError> {
        let story_bible = project.story_bible.render();

        let Some(previous) = chapter.checked_sub(1) else {
            let estimated_tokens =
                self.estimator.estimate(&story_bible) + self.estimator.estimate(task_text);
            return Ok(ContextBundle {
                chapter,
                story_bible,
                chapters: Vec::new(),
                summary: None,
                estimated_tokens,
            });
        };

        let recent_start = chapter
            .checked_sub(recent_window)
            .unwrap_or_else(ChapterNumber::first);

        let earlier: Vec<ChapterRecord> = self
            .chapters
            .chapters(&project.id, ChapterNumber::first(), previous)
            .await?
            .into_iter()
            .filter(ChapterRecord::has_content)
            .collect();
        let (older, recent): (Vec<_>, Vec<_>) =
            earlier.into_iter().partition(|c| c.number < recent_start);

        let fixed = self.estimator.estimate(&story_bible)
            + self.estimator.estimate(task_text)
            + self.cost_of(&recent);
        let full = fixed + self.cost_of(&older);
        let budget = self.config.budget_tokens();

        if older.is_empty() || full.as_u64() <= budget {
            debug!(estimated = %full, budget, older = older.len(), "older chapters fit verbatim");
            let mut chapters = older;
            chapters.extend(recent);
            return Ok(ContextBundle {
                chapter,
                story_bible,
                chapters,
                summary: None,
                estimated_tokens: full,
            });
        }

        // Over budget: compress the whole older range into one segment.
        let older_end = recent_start.checked_sub(1).unwrap_or_else(ChapterNumber::first);
        let summary = self
            .summaries
            .get_or_create_summary(&project.id, ChapterNumber::first(), older_end)
            .await?;
        let estimated_tokens = fixed + self.estimator.estimate(&summary.text);

        debug!(
            estimated_full = %full,
            estimated = %estimated_tokens,
            budget,
            summary_tier = summary.tier,
            "older chapters replaced by summary"
        );
        if estimated_tokens.as_u64() > budget {
            warn!(
                estimated = %estimated_tokens,
                budget,
                "context exceeds budget even with older chapters summarized"
            );
        }

        Ok(ContextBundle {
            chapter,
            story_bible,
            chapters: recent,
            summary: Some(summary),
            estimated_tokens,
        })
    }

    fn cost_of(&self, chapters: &[ChapterRecord]) -> TokenCount {
        chapters
            .iter()
            .map(|c| self.estimator.estimate(c.content()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::ports::SummaryStore;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        AgentError, AgentGateway, AgentOutput, AgentTask, InMemoryProjectStore,
        InMemorySummaryStore, ProjectBrief, ProjectId, RevisionConfig, StoryBible, SummaryConfig,
    };

    /// One token per word, so budgets in tests read as word counts.
    struct WordsAsTokens;

    impl TokenEstimator for WordsAsTokens {
        fn estimate(&self, text: &str) -> TokenCount {
            TokenCount::new(text.split_whitespace().count() as u64)
        }
    }

    #[derive(Default)]
    struct ShortSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AgentGateway for ShortSummarizer {
        async fn invoke(&self, task: &AgentTask) -> Result<AgentOutput, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AgentOutput::from_value(task.task_type, json!({"summary": "short recap"}))
        }
    }

    struct Fixture {
        builder: ContextBuilder,
        store: Arc<InMemoryProjectStore>,
        summaries: Arc<InMemorySummaryStore>,
        gateway: Arc<ShortSummarizer>,
        project: ProjectState,
    }

    fn ch(n: u32) -> ChapterNumber {
        ChapterNumber::new(n).unwrap()
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn fixture(window_tokens: u64, tier_size: u32) -> Fixture {
        let store = Arc::new(InMemoryProjectStore::new());
        let summaries = Arc::new(InMemorySummaryStore::new());
        let gateway = Arc::new(ShortSummarizer::default());
        let cache = Arc::new(SummaryCache::new(
            gateway.clone(),
            store.clone(),
            summaries.clone(),
            SummaryConfig {
                compression_ratio: 10,
                meta_summary_tier_size: tier_size,
            },
        ));
        let builder = ContextBuilder::new(
            store.clone(),
            cache,
            Arc::new(WordsAsTokens),
            ContextConfig {
                context_window_tokens: window_tokens,
                context_window_threshold: 0.8,
            },
        );
        let project = ProjectState::new(
            ProjectId::new("book").unwrap(),
            ProjectBrief {
                title: "T".into(),
                genre: "G".into(),
                premise: "P".into(),
            },
            25,
            StoryBible::default(),
            RevisionConfig::default(),
        );
        Fixture {
            builder,
            store,
            summaries,
            gateway,
            project,
        }
    }

    async fn write_chapter(f: &Fixture, n: u32, content: String) {
        let mut record = ChapterRecord::planned(ch(n), format!("Chapter {n}"));
        record.replace_content(content);
        f.store.save_chapter(&f.project.id, &record).await.unwrap();
    }

    #[test]
    fn test_word_ratio_estimate_is_floored() {
        let estimator = WordRatioEstimator::default();
        assert_eq!(estimator.estimate("one two three").as_u64(), 3); // 3.99
        assert_eq!(estimator.estimate(&words(100)).as_u64(), 133);
        assert!(estimator.estimate("").is_zero());
    }

    #[tokio::test]
    async fn test_first_chapter_has_no_prior_text() {
        let f = fixture(32_000, 10);
        let bundle = f
            .builder
            .build_context(&f.project, ch(1), 2, "write it")
            .await
            .unwrap();
        assert!(bundle.chapters.is_empty());
        assert!(bundle.summary.is_none());
        assert_eq!(bundle.estimated_tokens.as_u64(), 2);
    }

    #[tokio::test]
    async fn test_older_chapters_verbatim_at_exactly_the_budget() {
        // 32,000 * 0.8 = 25,600.
        let f = fixture(32_000, 10);
        for n in 1..=4 {
            write_chapter(&f, n, words(6_400)).await;
        }

        let bundle = f.builder.build_context(&f.project, ch(5), 2, "").await.unwrap();

        assert_eq!(bundle.estimated_tokens.as_u64(), 25_600);
        assert_eq!(bundle.verbatim_chapters(), vec![ch(1), ch(2), ch(3), ch(4)]);
        assert!(bundle.summary.is_none());
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_token_over_budget_substitutes_summary() {
        let f = fixture(32_000, 10);
        write_chapter(&f, 1, words(6_401)).await;
        for n in 2..=4 {
            write_chapter(&f, n, words(6_400)).await;
        }

        let bundle = f.builder.build_context(&f.project, ch(5), 2, "").await.unwrap();

        assert_eq!(bundle.verbatim_chapters(), vec![ch(3), ch(4)]);
        let summary = bundle.summary.as_ref().unwrap();
        assert_eq!((summary.range().start, summary.range().end), (ch(1), ch(2)));
        assert_eq!(bundle.estimated_tokens.as_u64(), 12_800 + 2);
        assert!(bundle.render().contains("## Summary of chapters 1-2"));
    }

    #[tokio::test]
    async fn test_recent_window_is_always_verbatim_even_when_alone_over_budget() {
        let f = fixture(100, 10);
        write_chapter(&f, 1, words(10)).await;
        write_chapter(&f, 2, words(500)).await;
        write_chapter(&f, 3, words(500)).await;

        let bundle = f.builder.build_context(&f.project, ch(4), 2, "").await.unwrap();

        assert_eq!(bundle.verbatim_chapters(), vec![ch(2), ch(3)]);
        assert!(bundle.summary.is_some());
    }

    #[tokio::test]
    async fn test_long_books_produce_tiered_summaries() {
        let f = fixture(10, 10);
        for n in 1..=25 {
            write_chapter(&f, n, words(20)).await;
        }

        for n in 21..=25 {
            f.builder.build_context(&f.project, ch(n), 2, "").await.unwrap();
        }

        let records: Vec<(u32, u32, u32)> = f
            .summaries
            .records(&f.project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.range().start.get(), r.range().end.get(), r.tier))
            .collect();
        assert!(records.contains(&(1, 10, 0)));
        assert!(records.contains(&(11, 20, 0)));
        assert!(records.contains(&(21, 22, 0)));
        // Chapter 25's older range is 1..=22; the earlier prefixes were dropped.
        assert!(records.contains(&(1, 22, 1)));
        assert!(!records.contains(&(1, 20, 1)));
    }

    #[tokio::test]
    async fn test_story_bible_and_task_count_toward_budget() {
        let mut f = fixture(100, 10);
        f.project.story_bible.facts.push(crate::StoryFact {
            category: crate::FactCategory::Character,
            name: "Mara".into(),
            description: words(40),
        });
        write_chapter(&f, 1, words(20)).await;
        write_chapter(&f, 2, words(5)).await;

        let roomy = f.builder.build_context(&f.project, ch(3), 1, "").await.unwrap();
        assert!(roomy.summary.is_none());

        let crowded = f
            .builder
            .build_context(&f.project, ch(3), 1, &words(30))
            .await
            .unwrap();
        assert!(crowded.summary.is_some());
        assert_eq!(crowded.verbatim_chapters(), vec![ch(2)]);
    }
}
