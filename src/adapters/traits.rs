//! 镜像适配器抽象
//!
//! 所有模型接入（Anthropic / OpenAI 兼容 / Gemini / Ollama / Mock）实现 AdapterPort：
//! 给定 Chamber 与回合号，要么返回完整的 TurnRecord，要么返回带类型的 AdapterError，不存在部分记录。
//! 适配器之间不共享状态，也不得修改协调器状态。

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chamber::{ChamberId, ResolvedPrompt};
use crate::core::{AdapterIdentity, TurnRecord};

/// 适配器失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// AdapterTimeout
    Timeout,
    /// AdapterAuthError
    Auth,
    /// AdapterRateLimited
    RateLimited,
    /// AdapterTransportError
    Transport,
    /// AdapterContentRejected
    ContentRejected,
}

impl AdapterErrorKind {
    /// 会话内可恢复：超时、限流、传输错误；鉴权与内容拒绝在本会话内不会自愈
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdapterErrorKind::Timeout | AdapterErrorKind::RateLimited | AdapterErrorKind::Transport
        )
    }

    /// 按错误消息归类（SDK 只给出字符串时使用）
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("timeout") || m.contains("timed out") {
            AdapterErrorKind::Timeout
        } else if m.contains("rate limit") || m.contains("429") || m.contains("quota") {
            AdapterErrorKind::RateLimited
        } else if m.contains("auth")
            || m.contains("api key")
            || m.contains("401")
            || m.contains("403")
        {
            AdapterErrorKind::Auth
        } else if (m.contains("content") && (m.contains("policy") || m.contains("filter")))
            || m.contains("safety")
        {
            AdapterErrorKind::ContentRejected
        } else {
            AdapterErrorKind::Transport
        }
    }

    /// 按 HTTP 状态码归类
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => AdapterErrorKind::Auth,
            408 | 504 => AdapterErrorKind::Timeout,
            429 => AdapterErrorKind::RateLimited,
            _ => AdapterErrorKind::Transport,
        }
    }
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterErrorKind::Timeout => "AdapterTimeout",
            AdapterErrorKind::Auth => "AdapterAuthError",
            AdapterErrorKind::RateLimited => "AdapterRateLimited",
            AdapterErrorKind::Transport => "AdapterTransportError",
            AdapterErrorKind::ContentRejected => "AdapterContentRejected",
        };
        f.write_str(s)
    }
}

/// 带类型的适配器错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 由错误消息推断类型
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: AdapterErrorKind::classify(&message),
            message,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            AdapterErrorKind::Timeout,
            format!("no response within {}s", after.as_secs_f32()),
        )
    }
}

/// 一次 Chamber 调用的输入
#[derive(Debug, Clone)]
pub struct ChamberRequest {
    pub chamber: ChamberId,
    pub turn_index: u32,
    pub prompt: ResolvedPrompt,
}

/// 镜像适配器能力接口
#[async_trait]
pub trait AdapterPort: Send + Sync {
    /// 会话内唯一的镜像身份
    fn identity(&self) -> &AdapterIdentity;

    /// 单次调用的超时上限；协调器以此为每个任务设置截止时间
    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }

    /// 发送 Chamber 提示并返回已封印的回合记录
    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            AdapterErrorKind::classify("request timed out after 30s"),
            AdapterErrorKind::Timeout
        );
        assert_eq!(
            AdapterErrorKind::classify("HTTP 429 Too Many Requests"),
            AdapterErrorKind::RateLimited
        );
        assert_eq!(
            AdapterErrorKind::classify("invalid api key provided"),
            AdapterErrorKind::Auth
        );
        assert_eq!(
            AdapterErrorKind::classify("blocked by content policy"),
            AdapterErrorKind::ContentRejected
        );
        assert_eq!(
            AdapterErrorKind::classify("connection reset by peer"),
            AdapterErrorKind::Transport
        );
    }

    #[test]
    fn test_status_mapping_and_recoverability() {
        assert_eq!(AdapterErrorKind::from_status(401), AdapterErrorKind::Auth);
        assert_eq!(AdapterErrorKind::from_status(429), AdapterErrorKind::RateLimited);
        assert_eq!(AdapterErrorKind::from_status(502), AdapterErrorKind::Transport);
        assert!(AdapterErrorKind::Timeout.is_recoverable());
        assert!(!AdapterErrorKind::Auth.is_recoverable());
        assert!(!AdapterErrorKind::ContentRejected.is_recoverable());
    }

    #[test]
    fn test_error_display_names_kind() {
        let err = AdapterError::timeout(Duration::from_secs(30));
        assert!(err.to_string().starts_with("AdapterTimeout"));
    }
}
