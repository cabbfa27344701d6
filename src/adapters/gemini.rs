//! Google Gemini generateContent 适配器（reqwest 直连）
//!
//! Gemini 不区分 system 消息，系统提示与 Chamber 提示拼接为一段文本发送。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::http::{build_client, post_json};
use crate::adapters::{AdapterError, AdapterErrorKind, AdapterPort, ChamberRequest};
use crate::core::{AdapterIdentity, TurnRecord};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_FLASH_LITE: &str = "gemini-2.5-flash-lite";

pub struct GeminiAdapter {
    identity: AdapterIdentity,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(identity: AdapterIdentity, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            identity,
            client: build_client(timeout),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }
}

/// 拼接首个候选的所有 text 片段；被安全过滤拦截时返回 ContentRejected
fn extract_text(body: &Value) -> Result<String, AdapterError> {
    if let Some(reason) = body
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(AdapterError::new(
            AdapterErrorKind::ContentRejected,
            format!("prompt blocked: {reason}"),
        ));
    }
    let candidate = body.pointer("/candidates/0");
    if candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        == Some("SAFETY")
    {
        return Err(AdapterError::new(
            AdapterErrorKind::ContentRejected,
            "response stopped by safety filter",
        ));
    }
    let text = candidate
        .and_then(|c| c.pointer("/content/parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    Ok(text)
}

#[async_trait]
impl AdapterPort for GeminiAdapter {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let prompt = format!("{}\n\n{}", request.prompt.system, request.prompt.user);
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"maxOutputTokens": request.prompt.max_tokens},
        });
        let builder = self.client.post(url).query(&[("key", self.api_key.as_str())]);

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
    fn test_extract_candidate_parts() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "a luminous "}, {"text": "core"}]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_text(&body).unwrap(), "a luminous core");
    }

    #[test]
    fn test_blocked_prompt() {
        let body = json!({"promptFeedback": {"blockReason": "OTHER"}});
        assert_eq!(
            extract_text(&body).unwrap_err().kind,
            AdapterErrorKind::ContentRejected
        );
        let body = json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert_eq!(
            extract_text(&body).unwrap_err().kind,
            AdapterErrorKind::ContentRejected
        );
    }
}
