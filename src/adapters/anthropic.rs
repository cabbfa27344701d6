//! Anthropic Messages API 适配器（reqwest 直连）

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::http::{build_client, post_json};
use crate::adapters::{AdapterError, AdapterErrorKind, AdapterPort, ChamberRequest};
use crate::core::{AdapterIdentity, TurnRecord};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const CLAUDE_SONNET: &str = "claude-sonnet-4-5-20250929";

pub struct AnthropicAdapter {
    identity: AdapterIdentity,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl AnthropicAdapter {
    pub fn new(identity: AdapterIdentity, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            identity,
            client: build_client(timeout),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// 取出所有 text 块；stop_reason 为 refusal 时视为内容拒绝
fn extract_text(body: &Value) -> Result<String, AdapterError> {
    if body.get("stop_reason").and_then(Value::as_str) == Some("refusal") {
        return Err(AdapterError::new(
            AdapterErrorKind::ContentRejected,
            "model refused the prompt",
        ));
    }
    let text = body
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    Ok(text)
}

#[async_trait]
impl AdapterPort for AnthropicAdapter {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "max_tokens": request.prompt.max_tokens,
            "system": request.prompt.system,
            "messages": [{"role": "user", "content": request.prompt.user}],
        });
        let builder = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);

        let response = post_json(builder, &body).await?;
        let content = extract_text(&response)?;
        TurnRecord::new(
            self.identity.clone(),
            request.chamber,
            request.turn_index,
            content,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_blocks() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Living Scroll: "},
                {"type": "text", "text": "rings"}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(extract_text(&body).unwrap(), "Living Scroll: rings");
    }

    #[test]
    fn test_refusal_is_content_rejected() {
        let body = json!({"content": [], "stop_reason": "refusal"});
        assert_eq!(
            extract_text(&body).unwrap_err().kind,
            AdapterErrorKind::ContentRejected
        );
    }
}
