//! Manuscript export: one Markdown file per accepted chapter plus a JSON
//! snapshot of the project.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pipeline::{ChapterNumber, ChapterRecord, ChapterStatus, ProjectState, ProjectStore, TerminalOutcome};
use serde::Serialize;
use tracing::info;

pub const SNAPSHOT_FILE: &str = "project.json";

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    project: &'a ProjectState,
    outcome: &'a TerminalOutcome,
    chapters: &'a [ChapterRecord],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub chapter_files: Vec<PathBuf>,
    pub snapshot: PathBuf,
}

pub fn chapter_file_name(number: ChapterNumber) -> String {
    format!("chapter-{:02}.md", number.get())
}

/// Writes the manuscript for `project` under `dir`, creating it if needed.
///
/// Every chapter goes into the snapshot; only accepted chapters get a
/// Markdown file.
pub async fn export_manuscript(
    store: &dyn ProjectStore,
    project: &ProjectState,
    outcome: &TerminalOutcome,
    dir: &Path,
) -> Result<ExportReport> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let chapters = match ChapterNumber::new(project.target_chapters) {
        Some(last) => store
            .chapters(&project.id, ChapterNumber::first(), last)
            .await
            .context("loading chapters for export")?,
        None => Vec::new(),
    };

    let mut chapter_files = Vec::new();
    for chapter in chapters
        .iter()
        .filter(|c| c.status == ChapterStatus::Accepted)
    {
        let path = dir.join(chapter_file_name(chapter.number));
        let body = format!("# {}\n\n{}\n", chapter.title, chapter.content().trim_end());
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        chapter_files.push(path);
    }

    let snapshot = dir.join(SNAPSHOT_FILE);
    let json = serde_json::to_string_pretty(&Snapshot {
        project,
        outcome,
        chapters: &chapters,
    })?;
    tokio::fs::write(&snapshot, json)
        .await
        .with_context(|| format!("writing {}", snapshot.display()))?;

    info!(
        dir = %dir.display(),
        chapters = chapter_files.len(),
        "manuscript exported"
    );
    Ok(ExportReport {
        chapter_files,
        snapshot,
    })
}
