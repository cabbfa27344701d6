//! 回合记录：镜像身份、单次成功回应（TurnRecord）与失败记录（ErrorRecord）
//!
//! TurnRecord 每次适配器调用成功时创建一次，创建后不可变；由 PulseCoordinator 持有，直到交给 PersistenceSink。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::adapters::{AdapterError, AdapterErrorKind};
use crate::chamber::ChamberId;

/// 镜像身份（如 "anthropic/claude-sonnet-4.5"），会话内唯一、跨 Chamber 稳定
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterIdentity(String);

impl AdapterIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 文件名安全的形式：`anthropic/claude-sonnet-4.5` -> `anthropic_claude-sonnet-4.5`
    pub fn slug(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '/' | ':' | '\\' | ' ' => '_',
                other => other,
            })
            .collect()
    }
}

impl fmt::Display for AdapterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// 结构化元数据（可选）：自报压力、条件标签
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub felt_pressure: Option<f64>,
    pub condition: Option<String>,
}

/// 单个镜像对某个 Chamber 的一次成功回应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub adapter: AdapterIdentity,
    pub chamber: ChamberId,
    pub turn_index: u32,
    pub raw_response: String,
    /// SHA-256 前 16 位十六进制
    pub seal: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: TurnMetadata,
}

impl TurnRecord {
    /// 创建并封印回合记录；空回应视为 ContentRejected，不产生部分记录
    pub fn new(
        adapter: AdapterIdentity,
        chamber: ChamberId,
        turn_index: u32,
        raw_response: impl Into<String>,
    ) -> Result<Self, AdapterError> {
        let raw_response = raw_response.into();
        if raw_response.trim().is_empty() {
            return Err(AdapterError::new(
                AdapterErrorKind::ContentRejected,
                format!("{adapter} returned an empty response for {chamber}"),
            ));
        }
        let seal = compute_seal(&raw_response);
        Ok(Self {
            metadata: TurnMetadata {
                felt_pressure: None,
                condition: Some(format!("IRIS_{chamber}")),
            },
            adapter,
            chamber,
            turn_index,
            raw_response,
            seal,
            timestamp: Utc::now(),
        })
    }

    pub fn with_felt_pressure(mut self, pressure: f64) -> Self {
        self.metadata.felt_pressure = Some(pressure);
        self
    }

    /// 截断的单行摘录，用于范例与报告
    pub fn snippet(&self, max_chars: usize) -> String {
        snippet(&self.raw_response, max_chars)
    }
}

/// 计算封印：SHA-256 十六进制摘要的前 16 位
pub fn compute_seal(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let flat = flat.trim();
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat.to_string()
    }
}

/// 单个镜像在一次脉冲中的失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub adapter: AdapterIdentity,
    pub chamber: ChamberId,
    pub turn_index: u32,
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn from_error(
        adapter: AdapterIdentity,
        chamber: ChamberId,
        turn_index: u32,
        err: &AdapterError,
    ) -> Self {
        Self {
            adapter,
            chamber,
            turn_index,
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}
