//! Scriptorium orchestration: the pipeline orchestrator, the LLM-backed agent
//! gateway, call retries, event sinks and manual chapter edits.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** This crate sequences calls between the business
//! logic in the [`pipeline`] crate and the infrastructure traits it defines
//! (model provider, project store, summary store). It adds no domain rules of
//! its own: gate decisions, context budgeting and summary tiering all live in
//! [`pipeline`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`orchestrator`] | `Orchestrator::run_project`, the top-level state machine |
//! | [`gateway`] | `LlmGateway`, an `AgentGateway` over an `LlmProvider` with a resource policy |
//! | [`retry`] | `RetryingGateway`, bounded local retries with back-off |
//! | [`prompts`] | Role system prompts and task prompt rendering |
//! | [`events`] | Event sinks: tracing, channel, fan-out, null |
//! | [`manual`] | Out-of-band chapter edits with cache invalidation |

pub mod events;
pub mod gateway;
pub mod manual;
pub mod orchestrator;
pub mod prompts;
pub mod retry;

pub use events::{ChannelEventSink, FanoutEventSink, NullEventSink, TracingEventSink};
pub use gateway::LlmGateway;
pub use manual::{apply_manual_edit, ManualEdit, ManualEditError};
pub use orchestrator::{Orchestrator, CRITIQUE_DIMENSIONS};
pub use retry::RetryingGateway;
