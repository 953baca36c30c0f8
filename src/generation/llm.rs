use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    config::LlmConfig,
    upstream::{ensure_success, json_body, RetryPolicy, UpstreamError},
};

/// A language model that answers a prompt with a JSON object.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(&self, prompt: &str) -> Result<Value, UpstreamError>;
}

/// OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(http: reqwest::Client, config: LlmConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            config,
            retry,
        }
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.1,
            "max_tokens": 1000,
            "response_format": { "type": "json_object" },
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete_json(&self, prompt: &str) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = self.payload(prompt);
        let (url, payload) = (&url, &payload);

        let body: Value = self
            .retry
            .run("llm", move || async move {
                let mut req = self.http.post(url).json(payload);
                if let Some(key) = &self.config.api_key {
                    req = req.bearer_auth(key);
                }
                let resp = ensure_success(req.send().await?).await?;
                json_body(resp).await
            })
            .await?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::Format("no message content in completion".into()))?;
        parse_content(content)
    }
}

/// Models sometimes wrap the object in a Markdown code fence.
fn parse_content(content: &str) -> Result<Value, UpstreamError> {
    let text = strip_code_fence(content);
    let value: Value = serde_json::from_str(text)
        .map_err(|e| UpstreamError::Format(format!("model did not return JSON: {e}")))?;
    if !value.is_object() {
        return Err(UpstreamError::Format("model did not return a JSON object".into()));
    }
    Ok(value)
}

fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
