//! Ollama provider: `POST /api/generate` with streaming disabled.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{AgentError, Completion, CompletionRequest, LlmProvider, TokenCount};
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Connection settings for an Ollama server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Transport-level timeout. The gateway applies its own per-call limit on
    /// top of this.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Context window requested from the model (`options.num_ctx`).
    pub num_ctx: Option<u32>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 300,
            connect_timeout_secs: 10,
            num_ctx: Some(32_768),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    num_ctx: Option<u32>,
    http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| upstream(format!("failed to build HTTP client: {e}"), None))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            num_ctx: config.num_ctx,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Lists the models the server has pulled. Fails when the server is unreachable.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn list_models(&self) -> Result<Vec<String>, AgentError> {
        let response = self
            .http
            .get(self.endpoint("/api/tags"))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let tags: TagsResponse = response.json().await.map_err(transport_error)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model, json = request.json))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError> {
        let body = GenerateRequest {
            model: request.model.as_str(),
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
            format: request.json.then_some("json"),
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                num_ctx: self.num_ctx,
            },
        };

        let response = self
            .http
            .post(self.endpoint("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let generated: GenerateResponse = response.json().await.map_err(transport_error)?;

        debug!(
            prompt_tokens = generated.prompt_eval_count,
            completion_tokens = generated.eval_count,
            "generation finished"
        );
        Ok(Completion {
            text: generated.response,
            prompt_tokens: generated.prompt_eval_count.map(TokenCount::new),
            completion_tokens: generated.eval_count.map(TokenCount::new),
        })
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn upstream(message: String, status: Option<u16>) -> AgentError {
    AgentError::Upstream {
        message,
        status,
        retry_after: None,
    }
}

fn transport_error(error: reqwest::Error) -> AgentError {
    if error.is_timeout() {
        // reqwest does not report the configured limit; the gateway's own
        // timeout normally fires first.
        return AgentError::Timeout {
            after: Duration::ZERO,
        };
    }
    upstream(error.to_string(), error.status().map(|s| s.as_u16()))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Upstream {
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
        status: Some(status.as_u16()),
        retry_after,
    })
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}
