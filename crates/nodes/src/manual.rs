//! Out-of-band chapter edits.
//!
//! Any edit made outside the chapter loop must invalidate the summary cache
//! for that chapter, or later contexts could be built from stale summaries.
//! [`apply_manual_edit`] does both in one step.

use pipeline::{
    ChapterNumber, ChapterRecord, PipelineError, ProjectId, ProjectStore, StoreError,
    SummaryCache, SummaryKey,
};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ManualEditError {
    #[error("chapter {chapter} does not exist in project {project}")]
    ChapterNotFound {
        project: ProjectId,
        chapter: ChapterNumber,
    },

    #[error("replacement content for chapter {chapter} is empty")]
    EmptyContent { chapter: ChapterNumber },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result of a successful manual edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEdit {
    pub chapter: ChapterRecord,
    /// Summaries dropped because they covered the edited chapter, directly
    /// or through a meta-summary.
    pub invalidated: Vec<SummaryKey>,
}

/// Replaces the content of `chapter`, bumps its version, persists it and
/// invalidates every cached summary that depends on it.
///
/// The chapter keeps its status. The caller is assumed to be the only writer
/// for the project while the edit runs.
#[instrument(skip(store, summaries, content), fields(project = %project, chapter = %chapter))]
pub async fn apply_manual_edit(
    store: &dyn ProjectStore,
    summaries: &SummaryCache,
    project: &ProjectId,
    chapter: ChapterNumber,
    content: impl Into<String>,
) -> Result<ManualEdit, ManualEditError> {
    let content = content.into();
    if content.trim().is_empty() {
        return Err(ManualEditError::EmptyContent { chapter });
    }

    let mut record = store
        .chapter(project, chapter)
        .await?
        .ok_or_else(|| ManualEditError::ChapterNotFound {
            project: project.clone(),
            chapter,
        })?;

    let version = record.replace_content(content);
    store.save_chapter(project, &record).await?;
    let invalidated = summaries.invalidate(project, chapter).await?;

    info!(version, invalidated = invalidated.len(), "manual edit applied");
    Ok(ManualEdit {
        chapter: record,
        invalidated,
    })
}
