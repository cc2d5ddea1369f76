//! Book data model: project state, chapter records, revision attempts, the
//! story bible and the outline.
//!
//! [`ProjectState`] is owned exclusively by the orchestrator for the lifetime
//! of one workflow run. [`ChapterRecord`]s are created when the chapter loop
//! reaches a chapter and end in a terminal [`ChapterStatus`]. [`RevisionAttempt`]s
//! are append-only and never mutated after creation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AttemptIndex, ChapterNumber, GateDecision, ProjectId, RevisionConfig, Timestamp,
};

// ---------------------------------------------------------------------------
// Story bible
// ---------------------------------------------------------------------------

/// Kind of grounding fact held in the story bible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Character,
    Location,
    Rule,
    Theme,
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Character => "Character",
            Self::Location => "Location",
            Self::Rule => "Rule",
            Self::Theme => "Theme",
        };
        f.write_str(label)
    }
}

/// One grounding fact (a character, a location, a world rule, a theme).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFact {
    pub category: FactCategory,
    pub name: String,
    pub description: String,
}

/// The structured set of grounding facts included in every agent call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryBible {
    #[serde(default)]
    pub facts: Vec<StoryFact>,
}

impl StoryBible {
    /// Renders the bible as a compact bullet list grouped by category.
    ///
    /// The output is deterministic so token estimates are stable within a run.
    pub fn render(&self) -> String {
        let mut grouped: BTreeMap<FactCategory, Vec<&StoryFact>> = BTreeMap::new();
        for fact in &self.facts {
            grouped.entry(fact.category).or_default().push(fact);
        }

        let mut out = String::new();
        for (category, facts) in grouped {
            for fact in facts {
                out.push_str(&format!(
                    "- {category}: {}: {}\n",
                    fact.name, fact.description
                ));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// Planned title and synopsis of a single chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub title: String,
    pub synopsis: String,
}

/// The book outline produced during the `Outlining` stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Full outline text as returned by the director.
    pub text: String,
    /// Per-chapter plans, when the director returned them.
    #[serde(default)]
    pub chapters: BTreeMap<ChapterNumber, ChapterPlan>,
}

impl Outline {
    /// The slice of the outline relevant to `chapter`.
    ///
    /// Uses the per-chapter plan when one exists, otherwise the whole outline.
    pub fn slice_for(&self, chapter: ChapterNumber) -> String {
        match self.chapters.get(&chapter) {
            Some(plan) => format!("Chapter {chapter}: {}\n{}", plan.title, plan.synopsis),
            None => self.text.clone(),
        }
    }

    /// Planned title for `chapter`, falling back to `"Chapter N"`.
    pub fn title_for(&self, chapter: ChapterNumber) -> String {
        self.chapters
            .get(&chapter)
            .map(|p| p.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Chapter {chapter}"))
    }
}

// ---------------------------------------------------------------------------
// Project state
// ---------------------------------------------------------------------------

/// Caller-supplied description of the book to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub title: String,
    pub genre: String,
    pub premise: String,
}

/// Coarse phase of a workflow run, persisted with the project state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Outlining,
    Writing,
    Completed,
    Aborted,
    Failed,
}

/// Project-level state of one workflow run.
///
/// Mutated only by the orchestrator and persisted through
/// [`crate::ProjectStore::save_project`] after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub id: ProjectId,
    pub brief: ProjectBrief,
    pub target_chapters: u32,
    /// Chapter the loop is working on (or will start from on resume).
    pub current_chapter: ChapterNumber,
    pub story_bible: StoryBible,
    pub revision: RevisionConfig,
    pub phase: RunPhase,
    pub vision: Option<String>,
    pub outline: Option<Outline>,
    /// Highest chapter accepted so far.
    pub last_completed_chapter: Option<ChapterNumber>,
}

impl ProjectState {
    /// Creates the state for a fresh run starting at `Planning`.
    pub fn new(
        id: ProjectId,
        brief: ProjectBrief,
        target_chapters: u32,
        story_bible: StoryBible,
        revision: RevisionConfig,
    ) -> Self {
        Self {
            id,
            brief,
            target_chapters,
            current_chapter: ChapterNumber::first(),
            story_bible,
            revision,
            phase: RunPhase::Planning,
            vision: None,
            outline: None,
            last_completed_chapter: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------------

/// Lifecycle status of a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Planned,
    Drafted,
    Editing,
    Critiqued,
    Accepted,
    Failed,
}

impl ChapterStatus {
    /// `accepted` and `failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Failed)
    }
}

impl std::fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Planned => "planned",
            Self::Drafted => "drafted",
            Self::Editing => "editing",
            Self::Critiqued => "critiqued",
            Self::Accepted => "accepted",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A chapter of the book and its current content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub number: ChapterNumber,
    pub title: String,
    content: String,
    pub status: ChapterStatus,
    pub latest_score: Option<f64>,
    version: u32,
    pub updated_at: Timestamp,
}

impl ChapterRecord {
    /// Creates an empty chapter in status `planned` at version 0.
    pub fn planned(number: ChapterNumber, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            content: String::new(),
            status: ChapterStatus::Planned,
            latest_score: None,
            version: 0,
            updated_at: Timestamp::now(),
        }
    }

    /// Current chapter text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of content replacements so far.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// Replaces the chapter text and increments the version counter.
    pub fn replace_content(&mut self, content: impl Into<String>) -> u32 {
        self.content = content.into();
        self.version += 1;
        self.updated_at = Timestamp::now();
        self.version
    }

    pub fn set_status(&mut self, status: ChapterStatus) {
        self.status = status;
        self.updated_at = Timestamp::now();
    }

    /// Word count of the current content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------

/// Record of one pass through the draft → edit → critique → gate sub-loop.
///
/// Created once per iteration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionAttempt {
    pub chapter: ChapterNumber,
    pub attempt: AttemptIndex,
    pub feedback: String,
    pub score: f64,
    pub decision: GateDecision,
    /// Chapter content version that was scored.
    pub content_version: u32,
    pub created_at: Timestamp,
}
