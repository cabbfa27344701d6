//! Mock 适配器（用于测试与离线演练，无需 API）
//!
//! 按 Chamber 返回预设文本，或按预设类型失败；可选人为延迟与结构化 felt_pressure。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::{AdapterError, AdapterErrorKind, AdapterPort, ChamberRequest};
use crate::chamber::ChamberId;
use crate::core::{AdapterIdentity, TurnRecord};

/// 脚本化行为
#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(AdapterErrorKind),
}

/// Mock 适配器：默认回显 Chamber 提示
#[derive(Debug)]
pub struct MockAdapter {
    identity: AdapterIdentity,
    default: Option<Script>,
    per_chamber: HashMap<ChamberId, Script>,
    delay: Option<Duration>,
    timeout: Duration,
    felt_pressure: Option<f64>,
    calls: AtomicU32,
}

impl MockAdapter {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: AdapterIdentity::new(identity),
            default: None,
            per_chamber: HashMap::new(),
            delay: None,
            timeout: Duration::from_secs(5),
            felt_pressure: None,
            calls: AtomicU32::new(0),
        }
    }

    /// 所有 Chamber 都返回同一段文本
    pub fn replying(identity: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(identity).with_reply(text)
    }

    /// 所有 Chamber 都以指定类型失败
    pub fn failing(identity: impl Into<String>, kind: AdapterErrorKind) -> Self {
        let mut mock = Self::new(identity);
        mock.default = Some(Script::Fail(kind));
        mock
    }

    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.default = Some(Script::Reply(text.into()));
        self
    }

    pub fn with_chamber_reply(mut self, chamber: ChamberId, text: impl Into<String>) -> Self {
        self.per_chamber.insert(chamber, Script::Reply(text.into()));
        self
    }

    pub fn with_chamber_failure(mut self, chamber: ChamberId, kind: AdapterErrorKind) -> Self {
        self.per_chamber.insert(chamber, Script::Fail(kind));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_felt_pressure(mut self, pressure: f64) -> Self {
        self.felt_pressure = Some(pressure);
        self
    }

    /// 已被调用次数
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdapterPort for MockAdapter {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn respond(&self, request: &ChamberRequest) -> Result<TurnRecord, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let script = self
            .per_chamber
            .get(&request.chamber)
            .or(self.default.as_ref())
            .cloned()
            .unwrap_or_else(|| Script::Reply(format!("Echo from Mock: {}", request.prompt.user)));

        match script {
            Script::Reply(text) => {
                let record = TurnRecord::new(
                    self.identity.clone(),
                    request.chamber,
                    request.turn_index,
                    text,
                )?;
                Ok(match self.felt_pressure {
                    Some(p) => record.with_felt_pressure(p),
                    None => record,
                })
            }
            Script::Fail(kind) => Err(AdapterError::new(
                kind,
                format!("mock failure for {}", request.chamber),
            )),
        }
    }
}
