//! [`EventSink`] implementations.
//!
//! Sinks are fire-and-forget: `emit` never blocks and never fails, so the
//! orchestrator behaves the same with or without observers attached.

use std::sync::Arc;

use pipeline::{EventSink, PipelineEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Writes every event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageEntered { chapter, stage } => {
                info!(chapter = chapter.map(|c| c.get()), stage = %stage, "stage entered");
            }
            PipelineEvent::RevisionTriggered {
                chapter,
                attempt,
                score,
                reason,
            } => {
                info!(
                    chapter = chapter.get(),
                    attempt = attempt.get(),
                    score,
                    reason = %reason,
                    "revision triggered"
                );
            }
            PipelineEvent::ChapterFinalized {
                chapter,
                status,
                score,
                failure: None,
            } => {
                info!(chapter = chapter.get(), status = %status, score, "chapter finalized");
            }
            PipelineEvent::ChapterFinalized {
                chapter,
                status,
                score,
                failure: Some(failure),
            } => {
                warn!(
                    chapter = chapter.get(),
                    status = %status,
                    score,
                    failure = %failure,
                    "chapter finalized"
                );
            }
            PipelineEvent::RunTerminated { outcome } => {
                info!(
                    outcome = %outcome,
                    last_completed_chapter = outcome.last_completed_chapter().map(|c| c.get()),
                    "run terminated"
                );
            }
        }
    }
}

/// Forwards events to an unbounded channel.
///
/// A dropped receiver is not an error; events are simply discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Delivers each event to every wrapped sink, in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: PipelineEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
