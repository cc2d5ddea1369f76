//! [`AgentGateway`] over a raw [`LlmProvider`].
//!
//! The gateway owns the [`ResourcePolicy`]: a semaphore sized by
//! `max_concurrent_calls` serialises access to the model, and every call is
//! bounded by `request_timeout_secs`. Model output is parsed as a JSON object
//! and checked against the task's required fields.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    AgentError, AgentGateway, AgentOutput, AgentTask, CompletionRequest, LlmProvider, ModelName,
    PipelineError, ResourcePolicy,
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::prompts;

pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    model: ModelName,
    policy: ResourcePolicy,
    permits: Semaphore,
}

impl LlmGateway {
    /// Fails when the policy names no model.
    pub fn new(provider: Arc<dyn LlmProvider>, policy: ResourcePolicy) -> Result<Self, PipelineError> {
        let model = policy.model_name()?;
        let permits = Semaphore::new(policy.max_concurrent_calls.max(1));
        Ok(Self {
            provider,
            model,
            policy,
            permits,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.policy.request_timeout_secs)
    }
}

#[async_trait]
impl AgentGateway for LlmGateway {
    #[instrument(
        skip(self, task),
        fields(provider = self.provider.name(), role = %task.role, task = %task.task_type)
    )]
    async fn invoke(&self, task: &AgentTask) -> Result<AgentOutput, AgentError> {
        let prompt = prompts::render(task);
        let request = CompletionRequest {
            model: self.model.clone(),
            system: prompt.system,
            prompt: prompt.user,
            temperature: prompts::temperature(task.role),
            max_tokens: self.policy.max_output_tokens,
            json: true,
        };

        let _permit = self.permits.acquire().await.map_err(|_| AgentError::Upstream {
            message: "gateway is shut down".to_string(),
            status: None,
            retry_after: None,
        })?;

        let limit = self.timeout();
        let completion = tokio::time::timeout(limit, self.provider.complete(&request))
            .await
            .map_err(|_| AgentError::Timeout { after: limit })??;

        debug!(
            prompt_tokens = completion.prompt_tokens.map(|t| t.as_u64()),
            completion_tokens = completion.completion_tokens.map(|t| t.as_u64()),
            "completion received"
        );

        let value = parse_json_object(&completion.text).ok_or_else(|| {
            AgentError::malformed(task.task_type, "response is not a JSON object")
        })?;
        AgentOutput::from_value(task.task_type, value)
    }
}

/// Parses `text` as a JSON object, tolerating code fences or prose around it.
fn parse_json_object(text: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
