//! 镜像工厂：解析镜像描述、按环境变量自动发现、构建 AdapterPort

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::anthropic::{AnthropicAdapter, CLAUDE_SONNET};
use crate::adapters::deepseek::{create_deepseek_adapter, DEEPSEEK_CHAT};
use crate::adapters::gemini::{GeminiAdapter, GEMINI_FLASH_LITE};
use crate::adapters::ollama::{OllamaAdapter, OLLAMA_DEFAULT_MODEL};
use crate::adapters::openai::{OPENAI_DEFAULT_MODEL, XAI_BASE_URL, XAI_GROK_FAST};
use crate::adapters::{AdapterPort, MockAdapter, OpenAiAdapter, RetryConfig, RetryingAdapter};
use crate::config::AdaptersSection;
use crate::core::{AdapterIdentity, IrisError};

/// 支持的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Anthropic,
    OpenAi,
    Xai,
    #[serde(alias = "google")]
    Gemini,
    DeepSeek,
    Ollama,
    Mock,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Anthropic => "anthropic",
            AdapterKind::OpenAi => "openai",
            AdapterKind::Xai => "xai",
            AdapterKind::Gemini => "google",
            AdapterKind::DeepSeek => "deepseek",
            AdapterKind::Ollama => "ollama",
            AdapterKind::Mock => "mock",
        }
    }

    /// API Key 所在环境变量；本地后端无需 Key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            AdapterKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            AdapterKind::OpenAi => Some("OPENAI_API_KEY"),
            AdapterKind::Xai => Some("XAI_API_KEY"),
            AdapterKind::Gemini => Some("GOOGLE_API_KEY"),
            AdapterKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            AdapterKind::Ollama | AdapterKind::Mock => None,
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            AdapterKind::Anthropic => CLAUDE_SONNET,
            AdapterKind::OpenAi => OPENAI_DEFAULT_MODEL,
            AdapterKind::Xai => XAI_GROK_FAST,
            AdapterKind::Gemini => GEMINI_FLASH_LITE,
            AdapterKind::DeepSeek => DEEPSEEK_CHAT,
            AdapterKind::Ollama => OLLAMA_DEFAULT_MODEL,
            AdapterKind::Mock => "echo",
        }
    }

    /// 默认模型对应的简短身份名
    fn default_label(&self) -> &'static str {
        match self {
            AdapterKind::Anthropic => "claude-sonnet-4.5",
            AdapterKind::Xai => "grok-4-fast",
            other => other.default_model(),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(AdapterKind::Anthropic),
            "openai" | "gpt" => Ok(AdapterKind::OpenAi),
            "xai" | "grok" => Ok(AdapterKind::Xai),
            "google" | "gemini" => Ok(AdapterKind::Gemini),
            "deepseek" => Ok(AdapterKind::DeepSeek),
            "ollama" => Ok(AdapterKind::Ollama),
            "mock" => Ok(AdapterKind::Mock),
            other => Err(IrisError::Config(format!("unknown adapter kind: {other}"))),
        }
    }
}

/// 镜像描述：计划文件或命令行中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSpec {
    /// 计划内的镜像 id（用于变体查找）
    pub id: String,
    pub adapter: AdapterKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// 覆盖默认身份
    #[serde(default)]
    pub identity: Option<String>,
}

impl MirrorSpec {
    pub fn new(adapter: AdapterKind, model: Option<&str>) -> Self {
        let mut spec = Self {
            id: String::new(),
            adapter,
            model: model.map(String::from),
            group: None,
            identity: None,
        };
        spec.id = spec.identity().to_string();
        spec
    }

    /// 解析 `kind[:model]`，如 `anthropic`、`ollama:qwen3:1.7b`
    pub fn parse(s: &str) -> Result<Self, IrisError> {
        let s = s.trim();
        let (kind, model) = match s.split_once(':') {
            Some((kind, model)) if !model.trim().is_empty() => (kind, Some(model.trim())),
            Some((kind, _)) => (kind, None),
            None => (s, None),
        };
        Ok(Self::new(kind.parse()?, model))
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.adapter.default_model())
    }

    pub fn identity(&self) -> AdapterIdentity {
        if let Some(id) = &self.identity {
            return AdapterIdentity::new(id.clone());
        }
        let label = match &self.model {
            Some(m) => m.as_str(),
            None => self.adapter.default_label(),
        };
        AdapterIdentity::new(format!("{}/{}", self.adapter, label))
    }
}

/// 按已设置的 API Key 自动发现镜像，顺序固定
pub fn detect_mirrors() -> Vec<MirrorSpec> {
    [
        AdapterKind::Anthropic,
        AdapterKind::OpenAi,
        AdapterKind::Xai,
        AdapterKind::Gemini,
        AdapterKind::DeepSeek,
    ]
    .into_iter()
    .filter(|kind| {
        kind.api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .is_some_and(|v| !v.trim().is_empty())
    })
    .map(|kind| MirrorSpec::new(kind, None))
    .collect()
}

fn api_key(kind: AdapterKind) -> Result<String, IrisError> {
    let Some(var) = kind.api_key_env() else {
        return Ok(String::new());
    };
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| IrisError::Config(format!("{kind} mirror requires {var}")))
}

/// 构建镜像适配器；max_retries > 0 时包一层 RetryingAdapter
pub fn create_adapter(
    spec: &MirrorSpec,
    settings: &AdaptersSection,
) -> Result<Arc<dyn AdapterPort>, IrisError> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    let identity = spec.identity();
    let model = spec.model();
    let key = api_key(spec.adapter)?;

    let adapter: Arc<dyn AdapterPort> = match spec.adapter {
        AdapterKind::Anthropic => {
            Arc::new(AnthropicAdapter::new(identity, model, &key, timeout))
        }
        AdapterKind::OpenAi => Arc::new(OpenAiAdapter::new(identity, None, model, &key, timeout)),
        AdapterKind::Xai => Arc::new(OpenAiAdapter::new(
            identity,
            Some(XAI_BASE_URL),
            model,
            &key,
            timeout,
        )),
        AdapterKind::Gemini => Arc::new(GeminiAdapter::new(identity, model, &key, timeout)),
        AdapterKind::DeepSeek => Arc::new(create_deepseek_adapter(
            Some(identity),
            Some(model),
            &key,
            timeout,
        )),
        AdapterKind::Ollama => Arc::new(OllamaAdapter::new(
            identity,
            model,
            settings.ollama_host.as_deref(),
            timeout,
        )),
        AdapterKind::Mock => Arc::new(
            MockAdapter::new(identity.as_str()).with_timeout(timeout),
        ),
    };

    tracing::info!(adapter = %adapter.identity(), model, "mirror registered");

    if settings.max_retries == 0 {
        return Ok(adapter);
    }
    Ok(Arc::new(RetryingAdapter::new(
        adapter,
        RetryConfig {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
        },
    )))
}
