//! 重试包装：对任意 AdapterPort 施加「按尝试超时 + 退避重试」
//!
//! 重试决策交给 RecoveryEngine；对外报告的 timeout 覆盖全部尝试与退避时间，
//! 协调器以此作为整个调用的截止时间。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::{AdapterError, AdapterPort, ChamberRequest};
use crate::core::{AdapterIdentity, RecoveryAction, RecoveryEngine, TurnRecord};

/// 重试配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// 带重试的适配器
pub struct RetryingAdapter {
    inner: Arc<dyn AdapterPort>,
    recovery: RecoveryEngine,
    config: RetryConfig,
}

impl RetryingAdapter {
    pub fn new(inner: Arc<dyn AdapterPort>, config: RetryConfig) -> Self {
        Self {
            inner,
            recovery: RecoveryEngine::new(config.clone()),
            config,
        }
    }
}

#[async_trait]
impl AdapterPort for RetryingAdapter {
    fn identity(&self) -> &AdapterIdentity {
        self.inner.identity()
    }

    fn timeout(&self) -> Duration {
        let attempts = self.config.max_retries + 1;
        self.inner.timeout() * attempts + self.config.max_delay * self.config.max_retries
    }

    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
        let per_attempt = self.inner.timeout();
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(per_attempt, self.inner.respond(request)).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::timeout(per_attempt)),
            };
            let err = match result {
                Ok(record) => return Ok(record),
                Err(err) => err,
            };
            match self.recovery.handle(&err, attempt) {
                RecoveryAction::RetryAfter(delay) => {
                    tracing::warn!(
                        adapter = %self.identity(),
                        chamber = %request.chamber,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "adapter call failed ({}), retrying",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RecoveryAction::GiveUp => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::adapters::{AdapterErrorKind, MockAdapter};
    use crate::chamber::{ChamberId, ResolvedPrompt};

    /// 前 n 次失败、之后成功
    struct Flaky {
        identity: AdapterIdentity,
        failures: u32,
        kind: AdapterErrorKind,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AdapterPort for Flaky {
        fn identity(&self) -> &AdapterIdentity {
            &self.identity
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(AdapterError::new(self.kind, "flaky"))
            } else {
                TurnRecord::new(self.identity.clone(), request.chamber, request.turn_index, "ok")
            }
        }
    }

    fn request() -> ChamberRequest {
        ChamberRequest {
            chamber: ChamberId::S1,
            turn_index: 1,
            prompt: ResolvedPrompt {
                system: String::new(),
                user: "p".into(),
                max_tokens: 10,
            },
        }
    }

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let flaky = Arc::new(Flaky {
            identity: "mock/flaky".into(),
            failures: 2,
            kind: AdapterErrorKind::Transport,
            calls: AtomicU32::new(0),
        });
        let adapter = RetryingAdapter::new(flaky.clone(), config(3));
        let record = adapter.respond(&request()).await.unwrap();
        assert_eq!(record.raw_response, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let mock = Arc::new(MockAdapter::failing("mock/auth", AdapterErrorKind::Auth));
        let adapter = RetryingAdapter::new(mock.clone(), config(3));
        let err = adapter.respond(&request()).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Auth);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_becomes_timeout_error() {
        let slow = Arc::new(
            MockAdapter::replying("mock/slow", "late")
                .with_delay(Duration::from_millis(200))
                .with_timeout(Duration::from_millis(20)),
        );
        let adapter = RetryingAdapter::new(slow.clone(), config(1));
        let err = adapter.respond(&request()).await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Timeout);
        assert_eq!(slow.calls(), 2);
    }
}
