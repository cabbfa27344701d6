//! 本地 Ollama 适配器（盲对照镜像），调用 /api/generate 非流式接口

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapters::http::{build_client, post_json};
use crate::adapters::{AdapterError, AdapterPort, ChamberRequest};
use crate::core::{AdapterIdentity, TurnRecord};

pub const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "qwen3:1.7b";

pub struct OllamaAdapter {
    identity: AdapterIdentity,
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: Duration,
}

impl OllamaAdapter {
    /// host 为空时依次使用 OLLAMA_HOST 环境变量与默认地址
    pub fn new(identity: AdapterIdentity, model: &str, host: Option<&str>, timeout: Duration) -> Self {
        let host = host
            .map(String::from)
            .or_else(|| std::env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| OLLAMA_DEFAULT_HOST.to_string());
        Self {
            identity,
            client: build_client(timeout),
            host,
            model: model.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl AdapterPort for OllamaAdapter {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
        let url = format!("{}/api/generate", self.host.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", request.prompt.system, request.prompt.user),
            "stream": false,
            "options": {"num_predict": request.prompt.max_tokens},
        });

        let response = post_json(self.client.post(url), &body).await?;
        let content = response
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
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
    fn test_identity_is_caller_supplied() {
        let adapter = OllamaAdapter::new(
            AdapterIdentity::new("local/qwen"),
            "qwen3:1.7b",
            Some("http://127.0.0.1:11434"),
            Duration::from_secs(5),
        );
        assert_eq!(adapter.identity().as_str(), "local/qwen");
        assert_eq!(adapter.model, "qwen3:1.7b");
        assert_eq!(adapter.timeout(), Duration::from_secs(5));
    }
}
