//! Failure policies, cancellation, resume and configuration errors.

mod common;

use std::time::Duration;

use common::{drain, fast_config, harness, project, with_stores};
use pipeline::{
    AbortReason, AgentError, ChapterFailure, ChapterFailurePolicy, ChapterNumber, ChapterStatus,
    EditPass, EscalationPolicy, GateDecision, PipelineError, PipelineEvent, ProjectStore, RunPhase,
    Stage, TaskType, TerminalOutcome,
};

fn ch(n: u32) -> ChapterNumber {
    ChapterNumber::new(n).unwrap()
}

fn server_error() -> AgentError {
    AgentError::Upstream {
        message: "model crashed".into(),
        status: Some(500),
        retry_after: None,
    }
}

#[tokio::test]
async fn test_agent_failure_is_retried_then_halts_the_run() {
    let config = fast_config();
    let h = harness(config.clone());
    h.gateway.fail(TaskType::WriteChapter, Some(2), server_error());
    let state = project(3, &config);
    let id = state.id.clone();

    let outcome = h.orchestrator.run_project(state).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Aborted {
            reason: AbortReason::ChapterFailed {
                chapter: ch(2),
                failure: ChapterFailure::AgentCallFailed {
                    stage: Stage::Drafting,
                    error: server_error(),
                },
            },
            last_completed_chapter: Some(ch(1)),
        }
    );
    // One call plus two retries.
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 2), 3);
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 3), 0);
    assert_eq!(
        h.store.chapter(&id, ch(2)).await.unwrap().unwrap().status,
        ChapterStatus::Failed
    );
    assert_eq!(
        h.store.load_project(&id).await.unwrap().unwrap().phase,
        RunPhase::Aborted
    );
}

#[tokio::test]
async fn test_continue_policy_records_failure_and_moves_on() {
    let mut config = fast_config();
    config.policy.on_chapter_failure = ChapterFailurePolicy::Continue;
    let h = harness(config.clone());
    h.gateway.fail(TaskType::WriteChapter, Some(2), server_error());

    let outcome = h.orchestrator.run_project(project(3, &config)).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Completed {
            accepted: 2,
            failed: 1,
            last_completed_chapter: Some(ch(3)),
        }
    );
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 3), 1);
}

#[tokio::test]
async fn test_non_retryable_error_fails_immediately() {
    let config = fast_config();
    let h = harness(config.clone());
    let rejected = AgentError::Upstream {
        message: "prompt too long".into(),
        status: Some(400),
        retry_after: None,
    };
    h.gateway.fail(TaskType::EvaluateChapter, Some(1), rejected.clone());

    let outcome = h.orchestrator.run_project(project(2, &config)).await;

    assert_eq!(h.gateway.calls_for(TaskType::EvaluateChapter, 1), 1);
    assert_eq!(
        outcome,
        TerminalOutcome::Aborted {
            reason: AbortReason::ChapterFailed {
                chapter: ch(1),
                failure: ChapterFailure::AgentCallFailed {
                    stage: Stage::Critiquing,
                    error: rejected,
                },
            },
            last_completed_chapter: None,
        }
    );
}

#[tokio::test]
async fn test_malformed_critique_is_retried_like_a_transient_failure() {
    let config = fast_config();
    let h = harness(config.clone());
    h.gateway.score(1, &[11.0, 8.0]);
    let state = project(1, &config);
    let id = state.id.clone();

    let outcome = h.orchestrator.run_project(state).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Completed {
            accepted: 1,
            failed: 0,
            last_completed_chapter: Some(ch(1)),
        }
    );
    assert_eq!(h.gateway.calls_for(TaskType::EvaluateChapter, 1), 2);
    // The rejected critique never reached the gate.
    let attempts = h.store.attempts(&id, ch(1)).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].score, 8.0);
}

#[tokio::test]
async fn test_persistently_out_of_range_critique_fails_the_chapter() {
    let config = fast_config();
    let h = harness(config.clone());
    h.gateway.score(1, &[11.0, 12.0, 11.0]);

    let outcome = h.orchestrator.run_project(project(1, &config)).await;

    assert_eq!(h.gateway.calls_for(TaskType::EvaluateChapter, 1), 3);
    match outcome {
        TerminalOutcome::Aborted {
            reason:
                AbortReason::ChapterFailed {
                    failure:
                        ChapterFailure::AgentCallFailed {
                            stage: Stage::Critiquing,
                            error: AgentError::MalformedOutput { .. },
                        },
                    ..
                },
            ..
        } => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_accept_best_restores_highest_scoring_draft() {
    let mut config = fast_config();
    config.policy.on_escalation = EscalationPolicy::AcceptBest;
    let h = harness(config.clone());
    h.gateway.score(1, &[6.0, 6.5, 6.2]);
    let state = project(1, &config);
    let id = state.id.clone();

    let outcome = h.orchestrator.run_project(state).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Completed {
            accepted: 1,
            failed: 0,
            last_completed_chapter: Some(ch(1)),
        }
    );
    let chapter = h.store.chapter(&id, ch(1)).await.unwrap().unwrap();
    assert!(chapter.content().starts_with("Chapter 1 draft 2."));
    assert_eq!(chapter.latest_score, Some(6.5));

    let decisions: Vec<GateDecision> = h
        .store
        .attempts(&id, ch(1))
        .await
        .unwrap()
        .iter()
        .map(|a| a.decision)
        .collect();
    assert_eq!(
        decisions,
        vec![GateDecision::Revise, GateDecision::Revise, GateDecision::Escalate]
    );
}

#[tokio::test]
async fn test_invalid_configuration_never_starts_the_run() {
    let mut config = fast_config();
    config.revision.max_revision_iterations = 0;
    let mut h = harness(config.clone());

    let outcome = h.orchestrator.run_project(project(3, &config)).await;

    assert!(matches!(
        outcome,
        TerminalOutcome::Failed {
            error: PipelineError::Configuration { .. },
            last_completed_chapter: None,
        }
    ));
    assert!(h.gateway.calls().is_empty());
    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PipelineEvent::RunTerminated { .. }));
}

#[tokio::test]
async fn test_planning_failure_is_fatal() {
    let config = fast_config();
    let h = harness(config.clone());
    h.gateway.fail(TaskType::PlanProject, None, server_error());

    let outcome = h.orchestrator.run_project(project(3, &config)).await;

    assert!(matches!(
        outcome,
        TerminalOutcome::Failed {
            error: PipelineError::Agent {
                stage: Stage::Planning,
                ..
            },
            ..
        }
    ));
    assert_eq!(h.gateway.count(TaskType::PlanProject), 3);
    assert_eq!(h.gateway.count(TaskType::CreateOutline), 0);
}

#[tokio::test]
async fn test_cancellation_stops_before_next_call_and_run_resumes() {
    let config = fast_config();
    let h = harness(config.clone());
    h.gateway.cancel_during(
        TaskType::WriteChapter,
        2,
        h.orchestrator.cancellation_token(),
    );
    let state = project(3, &config);
    let id = state.id.clone();

    let outcome = h.orchestrator.run_project(state).await;

    // The in-flight draft completes; the first edit pass is never issued.
    assert_eq!(
        outcome,
        TerminalOutcome::Aborted {
            reason: AbortReason::Cancelled {
                chapter: Some(ch(2)),
                stage: Stage::Editing(EditPass::Grammar),
            },
            last_completed_chapter: Some(ch(1)),
        }
    );
    let interrupted = h.store.chapter(&id, ch(2)).await.unwrap().unwrap();
    assert_eq!(interrupted.status, ChapterStatus::Editing);
    assert!(interrupted.has_content());
    assert_eq!(h.gateway.calls_for(TaskType::EditChapter, 2), 0);

    // Resume with a fresh orchestrator over the same stores.
    let saved = h.store.load_project(&id).await.unwrap().unwrap();
    assert_eq!(saved.current_chapter, ch(2));
    let resumed = with_stores(
        config,
        h.gateway.clone(),
        h.store.clone(),
        h.summaries.clone(),
    );

    let outcome = resumed.orchestrator.run_project(saved).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Completed {
            accepted: 3,
            failed: 0,
            last_completed_chapter: Some(ch(3)),
        }
    );
    assert_eq!(h.gateway.count(TaskType::PlanProject), 1);
    assert_eq!(h.gateway.count(TaskType::CreateOutline), 1);
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 1), 1);
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 2), 2);

    let resumed_chapter = h.store.chapter(&id, ch(2)).await.unwrap().unwrap();
    assert_eq!(resumed_chapter.status, ChapterStatus::Accepted);
    // One interrupted draft, then a fresh draft and three edits.
    assert_eq!(resumed_chapter.version(), 5);
}

#[tokio::test]
async fn test_cancellation_during_failing_call_stops_retries() {
    let config = fast_config();
    let mut h = harness(config.clone());
    h.gateway.cancel_during(
        TaskType::WriteChapter,
        1,
        h.orchestrator.cancellation_token(),
    );
    h.gateway.fail(
        TaskType::WriteChapter,
        Some(1),
        AgentError::Timeout {
            after: Duration::from_secs(1),
        },
    );
    let state = project(2, &config);
    let id = state.id.clone();

    let outcome = h.orchestrator.run_project(state).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Aborted {
            reason: AbortReason::Cancelled {
                chapter: Some(ch(1)),
                stage: Stage::Drafting,
            },
            last_completed_chapter: None,
        }
    );
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 1), 1);
    assert_eq!(
        h.store.chapter(&id, ch(1)).await.unwrap().unwrap().status,
        ChapterStatus::Planned
    );
    assert!(!drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, PipelineEvent::ChapterFinalized { .. })));
}

#[tokio::test]
async fn test_cancellation_during_failing_summary_stops_compression() {
    let config = fast_config();
    let h = harness(config.clone());
    h.gateway.cancel_during(
        TaskType::SummarizeRange,
        1,
        h.orchestrator.cancellation_token(),
    );
    h.gateway.fail(TaskType::SummarizeRange, Some(1), server_error());
    let state = project(2, &config);
    let id = state.id.clone();

    let outcome = h.orchestrator.run_project(state).await;

    assert_eq!(
        outcome,
        TerminalOutcome::Aborted {
            reason: AbortReason::Cancelled {
                chapter: Some(ch(1)),
                stage: Stage::Summarizing,
            },
            last_completed_chapter: Some(ch(1)),
        }
    );
    assert_eq!(h.gateway.calls_for(TaskType::SummarizeRange, 1), 1);
    assert_eq!(h.gateway.calls_for(TaskType::WriteChapter, 2), 0);
    assert_eq!(
        h.store.chapter(&id, ch(1)).await.unwrap().unwrap().status,
        ChapterStatus::Accepted
    );
}
