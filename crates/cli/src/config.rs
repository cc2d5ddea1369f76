//! `scriptorium.toml` loading.
//!
//! ```toml
//! [pipeline.revision]
//! quality_threshold = 7.5
//!
//! [pipeline.resource]
//! model = "llama3.1:70b"
//!
//! [llm]
//! base_url = "http://gpu-box:11434"
//!
//! [observability]
//! log_format = "json"
//! otlp_endpoint = "http://localhost:4317"
//! ```
//!
//! Every section is optional.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use llm::OllamaConfig;
use pipeline::{PipelineConfig, StoryBible};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub pipeline: PipelineConfig,
    pub llm: OllamaConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// OTLP gRPC collector. Span export is off when unset.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            otlp_endpoint: None,
            service_name: "scriptorium".to_string(),
        }
    }
}

impl CliConfig {
    /// Reads `path`; a file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Loads a story bible from a TOML file of `[[facts]]` tables.
pub fn load_story_bible(path: &Path) -> Result<StoryBible> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading story bible {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing story bible {}", path.display()))
}

#[cfg(test)]
mod tests {
    use pipeline::{ChapterFailurePolicy, FactCategory};

    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = CliConfig::parse(
            r#"
            [pipeline.revision]
            quality_threshold = 7.5

            [pipeline.policy]
            on_chapter_failure = "continue"

            [llm]
            base_url = "http://gpu-box:11434"

            [observability]
            log_format = "json"
            otlp_endpoint = "http://localhost:4317"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.revision.quality_threshold, 7.5);
        assert_eq!(config.pipeline.revision.max_revision_iterations, 3);
        assert_eq!(
            config.pipeline.policy.on_chapter_failure,
            ChapterFailurePolicy::Continue
        );
        assert_eq!(config.llm.base_url, "http://gpu-box:11434");
        assert_eq!(config.llm.num_ctx, Some(32_768));
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(
            config.observability.otlp_endpoint.as_deref(),
            Some("http://localhost:4317")
        );
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(CliConfig::parse("[observability]\nlog_format = \"xml\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = CliConfig::load(Path::new("/nonexistent/scriptorium.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_story_bible_document() {
        let bible: StoryBible = toml::from_str(
            r#"
            [[facts]]
            category = "character"
            name = "Mara"
            description = "A cartographer."

            [[facts]]
            category = "location"
            name = "Vell"
            description = "A city that rearranges itself."
            "#,
        )
        .unwrap();
        assert_eq!(bible.facts.len(), 2);
        assert_eq!(bible.facts[1].category, FactCategory::Location);
    }
}
