//! 适配器失败恢复策略
//!
//! 根据 AdapterErrorKind 给出严重级别与 RecoveryAction：瞬时错误按指数退避重试，限流只重试一次，
//! 鉴权失败与内容拒绝从不重试（留给操作员从诊断日志中发现）。

use std::time::Duration;

use crate::adapters::{AdapterError, AdapterErrorKind, RetryConfig};

/// 失败严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSeverity {
    /// 重试大概率成功（超时、传输错误）
    Transient,
    /// 可以继续但受限（限流）
    Degraded,
    /// 本会话内无法自愈（鉴权、内容拒绝）
    Critical,
}

/// 恢复动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 等待后重试
    RetryAfter(Duration),
    /// 放弃，本次脉冲记为 ErrorRecord
    GiveUp,
}

/// 失败恢复引擎
#[derive(Debug, Clone, Default)]
pub struct RecoveryEngine {
    config: RetryConfig,
}

impl RecoveryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn severity(kind: AdapterErrorKind) -> FailureSeverity {
        match kind {
            AdapterErrorKind::Timeout | AdapterErrorKind::Transport => FailureSeverity::Transient,
            AdapterErrorKind::RateLimited => FailureSeverity::Degraded,
            AdapterErrorKind::Auth | AdapterErrorKind::ContentRejected => FailureSeverity::Critical,
        }
    }

    /// attempt 从 0 开始计数（0 = 首次调用失败）
    pub fn handle(&self, err: &AdapterError, attempt: u32) -> RecoveryAction {
        let allowed = match Self::severity(err.kind) {
            FailureSeverity::Transient => attempt < self.config.max_retries,
            FailureSeverity::Degraded => attempt < self.config.max_retries.min(1),
            FailureSeverity::Critical => false,
        };
        if allowed {
            RecoveryAction::RetryAfter(self.backoff_delay(attempt, err.kind))
        } else {
            RecoveryAction::GiveUp
        }
    }

    /// base * 2^attempt，乘以确定性抖动与类型系数，封顶 max_delay
    pub fn backoff_delay(&self, attempt: u32, kind: AdapterErrorKind) -> Duration {
        let base = self.config.base_delay.as_millis().max(1) as f64;
        let max = self.config.max_delay.as_millis().max(1) as f64;
        let jitter = 0.9 + f64::from(attempt % 3) * 0.05;
        let factor = match kind {
            AdapterErrorKind::RateLimited => 2.0,
            AdapterErrorKind::Timeout => 1.5,
            _ => 1.0,
        };
        let exp = 2f64.powi(attempt.min(16) as i32);
        Duration::from_millis((base * exp * jitter * factor).min(max) as u64)
    }
}
