//! Model provider adapters for Scriptorium.
//!
//! ## Architectural Layer
//!
//! **Infrastructure layer.** Implements [`pipeline::LlmProvider`] against a
//! concrete model server. Nothing in here knows about chapters, stages or
//! gates; the gateway in `nodes` shapes prompts and parses the replies.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`ollama`] | `OllamaProvider` over the Ollama HTTP API, `OllamaConfig` |

pub mod ollama;

pub use ollama::{OllamaConfig, OllamaProvider};
