//! The pipeline orchestrator: the top-level state machine of one run.
//!
//! ```text
//! Planning → Outlining → for each chapter:
//!     Assigning → (Drafting → Editing[grammar, style, continuity] → Critiquing → Gate)+
//!     → Summarizing
//! ```
//!
//! Chapters are processed strictly in increasing order, one at a time. The
//! revision loop is a bounded counter driven by [`pipeline::decide`]. Every
//! agent call is a suspension point; cancellation is checked before each one,
//! so an in-flight call always completes but no new call starts once
//! cancellation has been requested. The project state and the current
//! chapter are persisted after every transition.

use std::sync::Arc;

use pipeline::{
    decide, validate_revision, AbortReason, AgentError, AgentGateway, AgentOutput, AgentRole,
    AgentTask, AttemptIndex, ChapterFailure, ChapterFailurePolicy, ChapterNumber, ChapterPlan,
    ChapterRecord, ChapterStatus, ContextBuilder, ContextBundle, EditPass, EscalationPolicy,
    EventSink, GateDecision, Outline, PipelineConfig, PipelineError, PipelineEvent, ProjectState,
    ProjectStore, QualityScore, RevisionAttempt, RunId, RunPhase, Stage, SummaryCache,
    SummaryStore, TaskType, TerminalOutcome, Timestamp, TokenEstimator, WordRatioEstimator,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::retry::RetryingGateway;

/// Score dimensions requested from the critic.
pub const CRITIQUE_DIMENSIONS: [&str; 5] = ["plot", "character", "prose", "pacing", "consistency"];

// ---------------------------------------------------------------------------
// Internal control flow
// ---------------------------------------------------------------------------

/// Why the run stopped early. Chapter failures are not interrupts; they are
/// ordinary results of [`Orchestrator::write_chapter`].
enum Interrupt {
    Cancelled {
        chapter: Option<ChapterNumber>,
        stage: Stage,
    },
    Fatal(PipelineError),
}

impl From<PipelineError> for Interrupt {
    fn from(error: PipelineError) -> Self {
        match error.cancelled_at() {
            Some(stage) => Self::Cancelled {
                chapter: None,
                stage,
            },
            None => Self::Fatal(error),
        }
    }
}

impl From<pipeline::StoreError> for Interrupt {
    fn from(error: pipeline::StoreError) -> Self {
        Self::Fatal(error.into())
    }
}

enum ChapterEnd {
    Accepted,
    Failed(ChapterFailure),
}

/// One entry of the optional `chapters` list returned with an outline.
#[derive(Debug, Deserialize)]
struct OutlineEntry {
    number: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    synopsis: String,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    gateway: Arc<dyn AgentGateway>,
    store: Arc<dyn ProjectStore>,
    summaries: Arc<SummaryCache>,
    context: ContextBuilder,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Wires an orchestrator. `gateway` is wrapped in a [`RetryingGateway`]
    /// configured from `config.retry`; summary compression shares it.
    pub fn new(
        gateway: Arc<dyn AgentGateway>,
        store: Arc<dyn ProjectStore>,
        summary_store: Arc<dyn SummaryStore>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_estimator(
            gateway,
            store,
            summary_store,
            events,
            config,
            Arc::new(WordRatioEstimator::default()),
        )
    }

    pub fn with_estimator(
        gateway: Arc<dyn AgentGateway>,
        store: Arc<dyn ProjectStore>,
        summary_store: Arc<dyn SummaryStore>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let gateway: Arc<dyn AgentGateway> = Arc::new(RetryingGateway::new(
            gateway,
            config.retry.clone(),
            cancel.clone(),
        ));
        let summaries = Arc::new(SummaryCache::new(
            gateway.clone(),
            store.clone(),
            summary_store,
            config.summary.clone(),
        ));
        let context = ContextBuilder::new(
            store.clone(),
            summaries.clone(),
            estimator,
            config.context.clone(),
        );
        Self {
            gateway,
            store,
            summaries,
            context,
            events,
            config,
            cancel,
        }
    }

    /// Token that cancels this orchestrator's runs at the next suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The cache used for context summaries; manual edits must invalidate it.
    pub fn summaries(&self) -> &Arc<SummaryCache> {
        &self.summaries
    }

    /// Drives `state` to a terminal outcome.
    ///
    /// Never panics and never returns an error: every way a run can end is a
    /// [`TerminalOutcome`] carrying the last accepted chapter.
    pub async fn run_project(&self, mut state: ProjectState) -> TerminalOutcome {
        let run_id = RunId::new_random();
        let span = info_span!("run_project", run_id = %run_id, project = %state.id);

        async {
            info!(target_chapters = state.target_chapters, "run started");
            let outcome = match self.drive(&mut state).await {
                Ok(outcome) => outcome,
                Err(Interrupt::Cancelled { chapter, stage }) => TerminalOutcome::Aborted {
                    reason: AbortReason::Cancelled { chapter, stage },
                    last_completed_chapter: state.last_completed_chapter,
                },
                Err(Interrupt::Fatal(error)) => TerminalOutcome::Failed {
                    error,
                    last_completed_chapter: state.last_completed_chapter,
                },
            };

            state.phase = match &outcome {
                TerminalOutcome::Completed { .. } => RunPhase::Completed,
                TerminalOutcome::Aborted { .. } => RunPhase::Aborted,
                TerminalOutcome::Failed { .. } => RunPhase::Failed,
            };
            if let Err(e) = self.store.save_project(&state).await {
                error!(error = %e, "failed to persist final project state");
            }

            self.events.emit(PipelineEvent::RunTerminated {
                outcome: outcome.clone(),
            });
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, state: &mut ProjectState) -> Result<TerminalOutcome, Interrupt> {
        self.config.validate()?;
        validate_revision(&state.revision)?;
        if state.target_chapters == 0 {
            return Err(Interrupt::Fatal(PipelineError::Configuration {
                message: "target_chapters must be at least 1".to_string(),
            }));
        }

        if state.outline.is_none() {
            self.plan(state).await?;
            self.outline(state).await?;
        } else {
            info!(current_chapter = %state.current_chapter, "resuming from existing outline");
        }

        state.phase = RunPhase::Writing;
        self.store.save_project(state).await?;

        let mut number = state.current_chapter;
        while number.get() <= state.target_chapters {
            state.current_chapter = number;
            self.store.save_project(state).await?;

            let existing = self.store.chapter(&state.id, number).await?;
            if existing
                .as_ref()
                .is_some_and(|c| c.status == ChapterStatus::Accepted)
            {
                debug!(chapter = %number, "chapter already accepted; skipping");
                number = number.next();
                continue;
            }

            match self.write_chapter(state, number, existing).await? {
                ChapterEnd::Accepted => {
                    state.last_completed_chapter = Some(number);
                    self.store.save_project(state).await?;
                }
                ChapterEnd::Failed(failure) => match self.config.policy.on_chapter_failure {
                    ChapterFailurePolicy::Halt => {
                        return Ok(TerminalOutcome::Aborted {
                            reason: AbortReason::ChapterFailed {
                                chapter: number,
                                failure,
                            },
                            last_completed_chapter: state.last_completed_chapter,
                        });
                    }
                    ChapterFailurePolicy::Continue => {
                        warn!(chapter = %number, failure = %failure, "chapter failed; continuing");
                    }
                },
            }

            self.summarize(state, number).await?;
            number = number.next();
        }

        let (accepted, failed) = self.tally(state).await?;
        Ok(TerminalOutcome::Completed {
            accepted,
            failed,
            last_completed_chapter: state.last_completed_chapter,
        })
    }

    // -----------------------------------------------------------------------
    // Planning and outlining
    // -----------------------------------------------------------------------

    async fn plan(&self, state: &mut ProjectState) -> Result<(), Interrupt> {
        if state.vision.is_some() {
            return Ok(());
        }
        state.phase = RunPhase::Planning;
        self.store.save_project(state).await?;
        self.enter(None, Stage::Planning)?;

        let task = AgentTask::new(AgentRole::Director, TaskType::PlanProject)
            .with("title", state.brief.title.as_str())
            .with("genre", state.brief.genre.as_str())
            .with("premise", state.brief.premise.as_str())
            .with("target_chapters", state.target_chapters)
            .with("story_bible", state.story_bible.render());
        let output = self
            .call(Stage::Planning, &task)
            .await
            .map_err(|e| PipelineError::agent(Stage::Planning, e))?;
        let vision = output
            .text("vision_document")
            .map_err(|e| PipelineError::agent(Stage::Planning, e))?;

        state.vision = Some(vision.to_string());
        self.store.save_project(state).await?;
        Ok(())
    }

    async fn outline(&self, state: &mut ProjectState) -> Result<(), Interrupt> {
        state.phase = RunPhase::Outlining;
        self.store.save_project(state).await?;
        self.enter(None, Stage::Outlining)?;

        let task = AgentTask::new(AgentRole::Director, TaskType::CreateOutline)
            .with("title", state.brief.title.as_str())
            .with("genre", state.brief.genre.as_str())
            .with("premise", state.brief.premise.as_str())
            .with("vision", state.vision.clone().unwrap_or_default())
            .with("target_chapters", state.target_chapters)
            .with("story_bible", state.story_bible.render());
        let output = self
            .call(Stage::Outlining, &task)
            .await
            .map_err(|e| PipelineError::agent(Stage::Outlining, e))?;

        let outline = parse_outline(&output, state.target_chapters)
            .map_err(|e| PipelineError::agent(Stage::Outlining, e))?;
        info!(planned_chapters = outline.chapters.len(), "outline created");

        state.outline = Some(outline);
        self.store.save_project(state).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chapter loop
    // -----------------------------------------------------------------------

    /// Runs one chapter to `accepted` or `failed`.
    ///
    /// A chapter left unfinished by an earlier run (`existing`) is restarted
    /// from a fresh draft; its version counter keeps counting.
    #[instrument(skip(self, state, number, existing), fields(chapter = %number))]
    async fn write_chapter(
        &self,
        state: &ProjectState,
        number: ChapterNumber,
        existing: Option<ChapterRecord>,
    ) -> Result<ChapterEnd, Interrupt> {
        let outline = state.outline.clone().unwrap_or_default();
        let outline_slice = outline.slice_for(number);

        // Assigning
        self.enter(Some(number), Stage::Assigning)?;
        let mut chapter = match existing {
            Some(mut previous) => {
                info!(status = %previous.status, "restarting unfinished chapter");
                previous.title = outline.title_for(number);
                previous.latest_score = None;
                previous.set_status(ChapterStatus::Planned);
                previous
            }
            None => ChapterRecord::planned(number, outline.title_for(number)),
        };
        self.store.save_chapter(&state.id, &chapter).await?;

        let task_text = format!("{}\n{}", state.brief.premise, outline_slice);
        let context = self
            .context
            .build_context(
                state,
                number,
                state.revision.recent_chapters_in_context,
                &task_text,
            )
            .await
            .map_err(|e| match e.cancelled_at() {
                Some(stage) => Interrupt::Cancelled {
                    chapter: Some(number),
                    stage,
                },
                None => Interrupt::Fatal(e),
            })?;
        debug!(
            estimated_tokens = %context.estimated_tokens,
            verbatim = context.chapters.len(),
            summarized = context.summary.is_some(),
            "context assembled"
        );
        let context_text = context.render();

        let mut attempt = AttemptIndex::first();
        let mut feedback: Option<String> = None;
        // (score, content) per attempt, in order.
        let mut scored: Vec<(f64, String)> = Vec::new();

        loop {
            // Drafting
            self.enter(Some(number), Stage::Drafting)?;
            let draft = self.draft_task(state, &chapter, &outline_slice, &context_text, feedback.as_deref());
            let output = match self.call(Stage::Drafting, &draft).await {
                Ok(output) => output,
                Err(error) => return self.fail_agent(state, &mut chapter, Stage::Drafting, error).await,
            };
            let content = match output.text("content") {
                Ok(content) => content.to_string(),
                Err(error) => return self.fail_agent(state, &mut chapter, Stage::Drafting, error).await,
            };
            chapter.replace_content(content);
            chapter.set_status(ChapterStatus::Drafted);
            self.store.save_chapter(&state.id, &chapter).await?;

            // Editing
            chapter.set_status(ChapterStatus::Editing);
            self.store.save_chapter(&state.id, &chapter).await?;
            for pass in EditPass::ORDER {
                let stage = Stage::Editing(pass);
                self.enter(Some(number), stage)?;
                let task = AgentTask::new(AgentRole::Editor(pass), TaskType::EditChapter)
                    .with("pass", pass.as_str())
                    .with("chapter_number", number.get())
                    .with("content", chapter.content())
                    .with("story_bible", context.story_bible.as_str())
                    .with("context", context_text.as_str());
                let edited = match self.call(stage, &task).await {
                    Ok(output) => output.text("edited_content").map(str::to_string),
                    Err(error) => Err(error),
                };
                match edited {
                    Ok(edited) => {
                        chapter.replace_content(edited);
                        self.store.save_chapter(&state.id, &chapter).await?;
                    }
                    Err(error) => return self.fail_agent(state, &mut chapter, stage, error).await,
                }
            }

            // Critiquing
            self.enter(Some(number), Stage::Critiquing)?;
            let score = match self.critique(&chapter, attempt, &outline_slice, &context).await {
                Ok(score) => score,
                Err(error) => {
                    return self.fail_agent(state, &mut chapter, Stage::Critiquing, error).await
                }
            };
            chapter.latest_score = Some(score.overall());
            chapter.set_status(ChapterStatus::Critiqued);
            self.store.save_chapter(&state.id, &chapter).await?;
            self.store.save_score(&state.id, &score).await?;
            scored.push((score.overall(), chapter.content().to_string()));

            // Gate
            self.events.emit(PipelineEvent::StageEntered {
                chapter: Some(number),
                stage: Stage::Gate,
            });
            let decision = decide(&score, attempt, &state.revision);
            info!(
                attempt = attempt.get(),
                score = score.overall(),
                threshold = state.revision.quality_threshold,
                decision = %decision,
                "quality gate"
            );
            self.store
                .append_attempt(
                    &state.id,
                    &RevisionAttempt {
                        chapter: number,
                        attempt,
                        feedback: score.feedback().to_string(),
                        score: score.overall(),
                        decision,
                        content_version: chapter.version(),
                        created_at: Timestamp::now(),
                    },
                )
                .await?;

            match decision {
                GateDecision::Accept => {
                    return self.accept(state, &mut chapter).await;
                }
                GateDecision::Revise => {
                    attempt = attempt.next();
                    feedback = Some(score.feedback().to_string());
                    self.events.emit(PipelineEvent::RevisionTriggered {
                        chapter: number,
                        attempt,
                        score: score.overall(),
                        reason: score.feedback().to_string(),
                    });
                }
                GateDecision::Escalate => {
                    let Some((best_index, best_score)) = best_attempt(&scored) else {
                        return self.fail_exhausted(state, &mut chapter, attempt, 0.0).await;
                    };
                    return match self.config.policy.on_escalation {
                        EscalationPolicy::Fail => {
                            self.fail_exhausted(state, &mut chapter, attempt, best_score).await
                        }
                        EscalationPolicy::AcceptBest => {
                            let (_, best_content) = &scored[best_index];
                            if best_content != chapter.content() {
                                chapter.replace_content(best_content.clone());
                            }
                            chapter.latest_score = Some(best_score);
                            info!(
                                best_attempt = best_index + 1,
                                best_score, "revision budget exhausted; accepting best attempt"
                            );
                            self.accept(state, &mut chapter).await
                        }
                    };
                }
            }
        }
    }

    fn draft_task(
        &self,
        state: &ProjectState,
        chapter: &ChapterRecord,
        outline_slice: &str,
        context_text: &str,
        feedback: Option<&str>,
    ) -> AgentTask {
        let task_type = match feedback {
            Some(_) => TaskType::ReviseChapter,
            None => TaskType::WriteChapter,
        };
        let mut task = AgentTask::new(AgentRole::Writer(self.config.writer_mode), task_type)
            .with("title", state.brief.title.as_str())
            .with("genre", state.brief.genre.as_str())
            .with("vision", state.vision.clone().unwrap_or_default())
            .with("chapter_number", chapter.number.get())
            .with("chapter_title", chapter.title.as_str())
            .with("outline", outline_slice)
            .with("context", context_text)
            .with("target_word_count", state.revision.target_word_count);
        if let Some(feedback) = feedback {
            task = task
                .with("previous_content", chapter.content())
                .with("feedback", feedback);
        }
        task
    }

    async fn critique(
        &self,
        chapter: &ChapterRecord,
        attempt: AttemptIndex,
        outline_slice: &str,
        context: &ContextBundle,
    ) -> Result<QualityScore, AgentError> {
        let task = AgentTask::new(AgentRole::Critic, TaskType::EvaluateChapter)
            .with("chapter_number", chapter.number.get())
            .with("outline", outline_slice)
            .with("story_bible", context.story_bible.as_str())
            .with("dimensions", json!(CRITIQUE_DIMENSIONS))
            .with("content", chapter.content());
        let output = self.call(Stage::Critiquing, &task).await?;

        let scores = output.integer_map("scores")?;
        let mut feedback = output.text("feedback")?.to_string();
        if let Some(suggestions) = suggestions(&output) {
            feedback.push_str("\n\nSuggestions:\n");
            feedback.push_str(&suggestions);
        }

        QualityScore::new(
            chapter.number,
            attempt,
            scores,
            feedback,
            self.config.scoring.weights(),
        )
        .map_err(|e| AgentError::malformed(TaskType::EvaluateChapter, e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Chapter finalization
    // -----------------------------------------------------------------------

    async fn accept(
        &self,
        state: &ProjectState,
        chapter: &mut ChapterRecord,
    ) -> Result<ChapterEnd, Interrupt> {
        chapter.set_status(ChapterStatus::Accepted);
        self.store.save_chapter(&state.id, chapter).await?;
        self.events.emit(PipelineEvent::ChapterFinalized {
            chapter: chapter.number,
            status: ChapterStatus::Accepted,
            score: chapter.latest_score,
            failure: None,
        });
        Ok(ChapterEnd::Accepted)
    }

    async fn fail_exhausted(
        &self,
        state: &ProjectState,
        chapter: &mut ChapterRecord,
        attempt: AttemptIndex,
        best_score: f64,
    ) -> Result<ChapterEnd, Interrupt> {
        let failure = ChapterFailure::RevisionExhausted {
            attempts: attempt.get(),
            best_score,
        };
        self.fail(state, chapter, failure).await
    }

    async fn fail_agent(
        &self,
        state: &ProjectState,
        chapter: &mut ChapterRecord,
        stage: Stage,
        error: AgentError,
    ) -> Result<ChapterEnd, Interrupt> {
        if error == AgentError::Cancelled {
            // The chapter keeps its last recorded status for a later resume.
            info!(chapter = %chapter.number, stage = %stage, status = %chapter.status, "cancelled mid-call");
            return Err(Interrupt::Cancelled {
                chapter: Some(chapter.number),
                stage,
            });
        }
        error!(chapter = %chapter.number, stage = %stage, error = %error, "agent call failed");
        self.fail(state, chapter, ChapterFailure::AgentCallFailed { stage, error })
            .await
    }

    async fn fail(
        &self,
        state: &ProjectState,
        chapter: &mut ChapterRecord,
        failure: ChapterFailure,
    ) -> Result<ChapterEnd, Interrupt> {
        chapter.set_status(ChapterStatus::Failed);
        self.store.save_chapter(&state.id, chapter).await?;
        self.events.emit(PipelineEvent::ChapterFinalized {
            chapter: chapter.number,
            status: ChapterStatus::Failed,
            score: chapter.latest_score,
            failure: Some(failure.clone()),
        });
        Ok(ChapterEnd::Failed(failure))
    }

    /// Ensures a fresh direct summary of the finalized chapter. Failures are
    /// logged; the next context build recomputes whatever is missing.
    async fn summarize(&self, state: &ProjectState, number: ChapterNumber) -> Result<(), Interrupt> {
        let has_content = self
            .store
            .chapter(&state.id, number)
            .await?
            .is_some_and(|c| c.has_content());
        if !has_content {
            return Ok(());
        }

        self.enter(Some(number), Stage::Summarizing)?;
        match self
            .summaries
            .get_or_create_summary(&state.id, number, number)
            .await
        {
            Ok(record) => debug!(chapter = %number, hash = %record.key.version_hash, "chapter summary ready"),
            Err(e) if e.cancelled_at().is_some() => {
                return Err(Interrupt::Cancelled {
                    chapter: Some(number),
                    stage: Stage::Summarizing,
                });
            }
            Err(e) => warn!(chapter = %number, error = %e, "chapter summary failed; continuing"),
        }
        Ok(())
    }

    async fn tally(&self, state: &ProjectState) -> Result<(u32, u32), Interrupt> {
        let Some(last) = ChapterNumber::new(state.target_chapters) else {
            return Ok((0, 0));
        };
        let chapters = self
            .store
            .chapters(&state.id, ChapterNumber::first(), last)
            .await?;
        let count = |status: ChapterStatus| chapters.iter().filter(|c| c.status == status).count() as u32;
        Ok((count(ChapterStatus::Accepted), count(ChapterStatus::Failed)))
    }

    // -----------------------------------------------------------------------
    // Suspension points
    // -----------------------------------------------------------------------

    /// Checks for cancellation, then announces `stage`.
    fn enter(&self, chapter: Option<ChapterNumber>, stage: Stage) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            info!(chapter = chapter.map(|c| c.get()), stage = %stage, "cancellation observed");
            return Err(Interrupt::Cancelled { chapter, stage });
        }
        self.events.emit(PipelineEvent::StageEntered { chapter, stage });
        Ok(())
    }

    async fn call(&self, stage: Stage, task: &AgentTask) -> Result<AgentOutput, AgentError> {
        debug!(stage = %stage, role = %task.role, task = %task.task_type, "invoking agent");
        self.gateway.invoke(task).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Index and score of the highest-scoring attempt; ties keep the earliest.
fn best_attempt(scored: &[(f64, String)]) -> Option<(usize, f64)> {
    scored
        .iter()
        .enumerate()
        .fold(None, |best, (index, (score, _))| match best {
            Some((_, best_score)) if *score <= best_score => best,
            _ => Some((index, *score)),
        })
}

fn suggestions(output: &AgentOutput) -> Option<String> {
    let items: Vec<String> = output
        .get("suggestions")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("- {s}"))
        .collect();
    (!items.is_empty()).then(|| items.join("\n"))
}

fn parse_outline(output: &AgentOutput, target_chapters: u32) -> Result<Outline, AgentError> {
    let text = output.text("outline")?.to_string();
    let mut outline = Outline {
        text,
        chapters: Default::default(),
    };

    let Some(entries) = output.get("chapters") else {
        return Ok(outline);
    };
    match serde_json::from_value::<Vec<OutlineEntry>>(entries.clone()) {
        Ok(entries) => {
            for entry in entries {
                let Some(number) = ChapterNumber::new(entry.number) else {
                    continue;
                };
                if number.get() > target_chapters {
                    continue;
                }
                outline.chapters.insert(
                    number,
                    ChapterPlan {
                        title: entry.title,
                        synopsis: entry.synopsis,
                    },
                );
            }
        }
        Err(e) => warn!(error = %e, "ignoring malformed outline chapter list"),
    }
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use pipeline::TaskType;

    use super::*;

    #[test]
    fn test_best_attempt_ties_keep_earliest() {
        let scored = vec![
            (6.0, "a".to_string()),
            (6.5, "b".to_string()),
            (6.5, "c".to_string()),
        ];
        assert_eq!(best_attempt(&scored), Some((1, 6.5)));
        assert_eq!(best_attempt(&[]), None);
    }

    #[test]
    fn test_outline_chapter_list_is_optional_and_bounded() {
        let output = AgentOutput::from_value(
            TaskType::CreateOutline,
            json!({
                "outline": "A long road.",
                "chapters": [
                    {"number": 1, "title": "Departure", "synopsis": "They leave."},
                    {"number": 9, "title": "Beyond", "synopsis": "Out of range."},
                    {"number": 0, "title": "Zero"}
                ]
            }),
        )
        .unwrap();
        let outline = parse_outline(&output, 3).unwrap();
        assert_eq!(outline.chapters.len(), 1);
        assert_eq!(outline.title_for(ChapterNumber::first()), "Departure");

        let bare =
            AgentOutput::from_value(TaskType::CreateOutline, json!({"outline": "x"})).unwrap();
        assert!(parse_outline(&bare, 3).unwrap().chapters.is_empty());
    }

    #[test]
    fn test_suggestions_are_rendered_as_bullets() {
        let output = AgentOutput::from_value(
            TaskType::EvaluateChapter,
            json!({"scores": {"plot": 7}, "feedback": "f", "suggestions": ["Cut the prologue", " "]}),
        )
        .unwrap();
        assert_eq!(suggestions(&output).unwrap(), "- Cut the prologue");
    }
}
