//! Shared fixtures for orchestrator scenario tests.
//!
//! [`ScriptedGateway`] answers every task type with well-formed output,
//! takes critique scores from a per-chapter script, can be told to fail
//! specific calls, and records every call it receives.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use nodes::{ChannelEventSink, Orchestrator};
use parking_lot::Mutex;
use pipeline::{
    AgentError, AgentGateway, AgentOutput, AgentRole, AgentTask, InMemoryProjectStore,
    InMemorySummaryStore, PipelineConfig, PipelineEvent, ProjectBrief, ProjectId, ProjectState,
    RetryConfig, StoryBible, StoryFact, FactCategory, TaskType,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Overall score the critic gives when a chapter has no scripted scores.
pub const DEFAULT_SCORE: f64 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub role: AgentRole,
    pub task: TaskType,
    pub chapter: Option<u32>,
}

struct Failure {
    task: TaskType,
    chapter: Option<u32>,
    error: AgentError,
}

#[derive(Default)]
pub struct ScriptedGateway {
    scores: Mutex<HashMap<u32, VecDeque<f64>>>,
    failures: Mutex<Vec<Failure>>,
    cancel_on: Mutex<Option<(TaskType, u32, CancellationToken)>>,
    calls: Mutex<Vec<Call>>,
    drafts: Mutex<HashMap<u32, u32>>,
    words_per_draft: Mutex<usize>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Critique scores for successive attempts of `chapter`.
    pub fn score(&self, chapter: u32, overall: &[f64]) {
        self.scores
            .lock()
            .insert(chapter, overall.iter().copied().collect());
    }

    /// Every call of `task` (for `chapter`, or any chapter) fails with `error`.
    pub fn fail(&self, task: TaskType, chapter: Option<u32>, error: AgentError) {
        self.failures.lock().push(Failure {
            task,
            chapter,
            error,
        });
    }

    /// Cancels `token` while the first `task` call for `chapter` is in flight.
    pub fn cancel_during(&self, task: TaskType, chapter: u32, token: CancellationToken) {
        *self.cancel_on.lock() = Some((task, chapter, token));
    }

    /// Pads every draft to roughly `words` words.
    pub fn draft_length(&self, words: usize) {
        *self.words_per_draft.lock() = words;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, task: TaskType, chapter: u32) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.task == task && c.chapter == Some(chapter))
            .count()
    }

    pub fn count(&self, task: TaskType) -> usize {
        self.calls.lock().iter().filter(|c| c.task == task).count()
    }

    fn draft(&self, chapter: u32) -> String {
        let mut drafts = self.drafts.lock();
        let n = drafts.entry(chapter).or_insert(0);
        *n += 1;
        let padding = vec!["lorem"; *self.words_per_draft.lock()].join(" ");
        format!("Chapter {chapter} draft {n}. {padding}")
    }

    fn critique(&self, chapter: u32) -> Value {
        let overall = self
            .scores
            .lock()
            .get_mut(&chapter)
            .and_then(VecDeque::pop_front)
            .unwrap_or(DEFAULT_SCORE);
        json!({
            "scores": dimensions_for(overall),
            "feedback": format!("Scored {overall}"),
            "suggestions": ["Tighten the opening"],
        })
    }
}

/// Ten integer dimensions whose mean is `overall` (to one decimal place).
pub fn dimensions_for(overall: f64) -> Value {
    let total = (overall * 10.0).round() as i64;
    let (base, extra) = (total / 10, total % 10);
    let map: serde_json::Map<String, Value> = (0..10)
        .map(|i| {
            let value = if i < extra { base + 1 } else { base };
            (format!("d{i}"), json!(value))
        })
        .collect();
    Value::Object(map)
}

fn chapter_of(task: &AgentTask) -> Option<u32> {
    task.payload
        .get("chapter_number")
        .or_else(|| task.payload.get("start_chapter"))
        .and_then(Value::as_u64)
        .map(|n| n as u32)
}

#[async_trait]
impl AgentGateway for ScriptedGateway {
    async fn invoke(&self, task: &AgentTask) -> Result<AgentOutput, AgentError> {
        let chapter = chapter_of(task);
        self.calls.lock().push(Call {
            role: task.role,
            task: task.task_type,
            chapter,
        });

        let cancel = {
            let mut slot = self.cancel_on.lock();
            let due = matches!(
                slot.as_ref(),
                Some((t, c, _)) if *t == task.task_type && Some(*c) == chapter
            );
            if due {
                slot.take()
            } else {
                None
            }
        };
        if let Some((_, _, token)) = cancel {
            token.cancel();
        }

        if let Some(failure) = self
            .failures
            .lock()
            .iter()
            .find(|f| f.task == task.task_type && (f.chapter.is_none() || f.chapter == chapter))
        {
            return Err(failure.error.clone());
        }

        let reply = match task.task_type {
            TaskType::PlanProject => json!({"vision_document": "A quiet book about maps."}),
            TaskType::CreateOutline => {
                let target = task.payload["target_chapters"].as_u64().unwrap_or(1);
                let chapters: Vec<Value> = (1..=target)
                    .map(|n| json!({"number": n, "title": format!("Part {n}"), "synopsis": "Things happen."}))
                    .collect();
                json!({"outline": "The whole journey.", "chapters": chapters})
            }
            TaskType::WriteChapter | TaskType::ReviseChapter => {
                json!({"content": self.draft(chapter.unwrap_or(0))})
            }
            TaskType::EditChapter => json!({"edited_content": task.payload["content"].clone()}),
            TaskType::EvaluateChapter => self.critique(chapter.unwrap_or(0)),
            TaskType::SummarizeRange | TaskType::MetaSummarize => json!({
                "summary": format!(
                    "Summary of {}-{}",
                    task.payload["start_chapter"], task.payload["end_chapter"]
                )
            }),
        };
        AgentOutput::from_value(task.task_type, reply)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub gateway: Arc<ScriptedGateway>,
    pub store: Arc<InMemoryProjectStore>,
    pub summaries: Arc<InMemorySummaryStore>,
    pub events: UnboundedReceiver<PipelineEvent>,
    pub orchestrator: Orchestrator,
}

/// Default configuration with near-zero retry back-off.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..PipelineConfig::default()
    }
}

pub fn harness(config: PipelineConfig) -> Harness {
    with_stores(
        config,
        ScriptedGateway::new(),
        Arc::new(InMemoryProjectStore::new()),
        Arc::new(InMemorySummaryStore::new()),
    )
}

/// A harness over existing stores, for resuming a run.
pub fn with_stores(
    config: PipelineConfig,
    gateway: Arc<ScriptedGateway>,
    store: Arc<InMemoryProjectStore>,
    summaries: Arc<InMemorySummaryStore>,
) -> Harness {
    let (sink, events) = ChannelEventSink::new();
    let orchestrator = Orchestrator::new(
        gateway.clone(),
        store.clone(),
        summaries.clone(),
        Arc::new(sink),
        config,
    );
    Harness {
        gateway,
        store,
        summaries,
        events,
        orchestrator,
    }
}

pub fn project(target_chapters: u32, config: &PipelineConfig) -> ProjectState {
    ProjectState::new(
        ProjectId::new("atlas").unwrap(),
        ProjectBrief {
            title: "The Atlas".into(),
            genre: "literary fiction".into(),
            premise: "A cartographer maps a city that keeps changing.".into(),
        },
        target_chapters,
        StoryBible {
            facts: vec![StoryFact {
                category: FactCategory::Character,
                name: "Mara".into(),
                description: "A cartographer who distrusts her own maps.".into(),
            }],
        },
        config.revision.clone(),
    )
}

pub fn drain(events: &mut UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
