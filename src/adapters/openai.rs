//! OpenAI 兼容 API 适配器
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；OpenAI、xAI Grok、DeepSeek 共用此实现。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoff;

use crate::adapters::{AdapterError, AdapterErrorKind, AdapterPort, ChamberRequest};
use crate::core::{AdapterIdentity, TurnRecord};

/// xAI 端点与默认模型
pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";
pub const XAI_GROK_FAST: &str = "grok-4-fast-reasoning";

/// OpenAI 默认模型
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// 关闭 async_openai 内置的 429 / 5xx 重试，错误原样交给 RetryingAdapter 分类
fn no_retry_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::ZERO),
        ..Default::default()
    }
}

/// OpenAI 兼容适配器：持有 Client 与 model 名，调用时拼装 system + user 两条消息并取首条 content
pub struct OpenAiAdapter {
    identity: AdapterIdentity,
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiAdapter {
    pub fn new(
        identity: AdapterIdentity,
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            identity,
            client: Client::with_config(config).with_backoff(no_retry_backoff()),
            model: model.to_string(),
            timeout,
        }
    }

    fn to_openai_messages(
        &self,
        request: &ChamberRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, AdapterError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.prompt.system.clone())
            .build()
            .map_err(|e| AdapterError::new(AdapterErrorKind::Transport, e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.user.clone())
            .build()
            .map_err(|e| AdapterError::new(AdapterErrorKind::Transport, e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl AdapterPort for OpenAiAdapter {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(request)?)
            .max_completion_tokens(request.prompt.max_tokens)
            .build()
            .map_err(|e| AdapterError::new(AdapterErrorKind::Transport, e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| AdapterError::classified(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        TurnRecord::new(
            self.identity.clone(),
            request.chamber,
            request.turn_index,
            content,
        )
    }
}
