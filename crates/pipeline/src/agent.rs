//! Agent task descriptors and structured outputs.
//!
//! Every agent flavour is expressed as a tagged [`AgentRole`] value carried on
//! an [`AgentTask`] and consumed uniformly by [`crate::AgentGateway`]. There is
//! no per-writer or per-editor type hierarchy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AgentError, WriterMode, MAX_DIMENSION_SCORE};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// One editing pass applied after drafting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPass {
    Grammar,
    Style,
    Continuity,
}

impl EditPass {
    /// The fixed order in which edit passes are applied. Each pass consumes the
    /// previous pass's output.
    pub const ORDER: [EditPass; 3] = [EditPass::Grammar, EditPass::Style, EditPass::Continuity];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grammar => "grammar",
            Self::Style => "style",
            Self::Continuity => "continuity",
        }
    }
}

impl std::fmt::Display for EditPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The agent an [`AgentTask`] is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "flavour", rename_all = "snake_case")]
pub enum AgentRole {
    /// Plans the project and writes the outline.
    Director,
    /// Drafts and revises chapters.
    Writer(WriterMode),
    /// Applies one editing pass.
    Editor(EditPass),
    /// Scores chapters.
    Critic,
    /// Compresses chapter ranges and lower-tier summaries.
    Summarizer,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Director => f.write_str("director"),
            Self::Writer(mode) => write!(f, "writer:{}", writer_mode_label(*mode)),
            Self::Editor(pass) => write!(f, "editor:{pass}"),
            Self::Critic => f.write_str("critic"),
            Self::Summarizer => f.write_str("summarizer"),
        }
    }
}

fn writer_mode_label(mode: WriterMode) -> &'static str {
    match mode {
        WriterMode::Narrative => "narrative",
        WriterMode::Dialogue => "dialogue",
        WriterMode::Description => "description",
    }
}

// ---------------------------------------------------------------------------
// Task types
// ---------------------------------------------------------------------------

/// The kind of work requested; determines the required output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    PlanProject,
    CreateOutline,
    WriteChapter,
    ReviseChapter,
    EditChapter,
    EvaluateChapter,
    SummarizeRange,
    MetaSummarize,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlanProject => "plan_project",
            Self::CreateOutline => "create_outline",
            Self::WriteChapter => "write_chapter",
            Self::ReviseChapter => "revise_chapter",
            Self::EditChapter => "edit_chapter",
            Self::EvaluateChapter => "evaluate_chapter",
            Self::SummarizeRange => "summarize_range",
            Self::MetaSummarize => "meta_summarize",
        }
    }

    /// Fields every response to this task must contain. All are non-blank
    /// strings except `scores`, which maps dimension names to integers 0–10.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::PlanProject => &["vision_document"],
            Self::CreateOutline => &["outline"],
            Self::WriteChapter | Self::ReviseChapter => &["content"],
            Self::EditChapter => &["edited_content"],
            Self::EvaluateChapter => &["scores", "feedback"],
            Self::SummarizeRange | Self::MetaSummarize => &["summary"],
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request to run one task on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub role: AgentRole,
    pub task_type: TaskType,
    pub payload: Map<String, Value>,
}

impl AgentTask {
    pub fn new(role: AgentRole, task_type: TaskType) -> Self {
        Self {
            role,
            task_type,
            payload: Map::new(),
        }
    }

    /// Adds a payload entry, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A structured agent response that has passed the task's schema check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    task: TaskType,
    fields: Map<String, Value>,
}

impl AgentOutput {
    /// Validates `value` against the full schema of `task`.
    ///
    /// Every check happens here, inside the gateway call, so a malformed
    /// answer is retried like any other transient failure. Missing or `null`
    /// fields, blank or non-string text fields, and an empty, fractional or
    /// out-of-range `scores` mapping are all [`AgentError::MalformedOutput`].
    pub fn from_value(task: TaskType, value: Value) -> Result<Self, AgentError> {
        let Value::Object(fields) = value else {
            return Err(AgentError::malformed(task, "response is not a JSON object"));
        };
        let output = Self { task, fields };

        for field in task.required_fields() {
            if matches!(output.fields.get(*field), None | Some(Value::Null)) {
                return Err(AgentError::malformed(
                    task,
                    format!("missing required field '{field}'"),
                ));
            }
            if *field == "scores" {
                output.check_scores(field)?;
            } else {
                output.text(field)?;
            }
        }

        Ok(output)
    }

    fn check_scores(&self, field: &str) -> Result<(), AgentError> {
        let scores = self.integer_map(field)?;
        if scores.is_empty() {
            return Err(AgentError::malformed(
                self.task,
                format!("field '{field}' has no dimensions"),
            ));
        }
        match scores
            .iter()
            .find(|(_, v)| !(0..=i64::from(MAX_DIMENSION_SCORE)).contains(*v))
        {
            Some((name, value)) => Err(AgentError::malformed(
                self.task,
                format!("dimension '{name}' scored {value}, expected 0..={MAX_DIMENSION_SCORE}"),
            )),
            None => Ok(()),
        }
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A required, non-blank string field.
    pub fn text(&self, field: &str) -> Result<&str, AgentError> {
        match self.fields.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            Some(Value::String(_)) => Err(AgentError::malformed(
                self.task,
                format!("field '{field}' is empty"),
            )),
            Some(_) => Err(AgentError::malformed(
                self.task,
                format!("field '{field}' is not a string"),
            )),
            None => Err(AgentError::malformed(
                self.task,
                format!("missing required field '{field}'"),
            )),
        }
    }

    /// An optional string field; blank strings count as absent.
    pub fn optional_text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// A required mapping of names to integers.
    pub fn integer_map(&self, field: &str) -> Result<BTreeMap<String, i64>, AgentError> {
        let Some(Value::Object(map)) = self.fields.get(field) else {
            return Err(AgentError::malformed(
                self.task,
                format!("field '{field}' is not a mapping"),
            ));
        };

        map.iter()
            .map(|(name, value)| {
                value
                    .as_i64()
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| {
                        AgentError::malformed(
                            self.task,
                            format!("'{field}.{name}' is not an integer"),
                        )
                    })
            })
            .collect()
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}
