//! 内存 sink（测试与演练用）

use std::sync::Mutex;

use async_trait::async_trait;

use crate::chamber::ChamberId;
use crate::core::{AdapterIdentity, SessionState, TurnRecord};
use crate::vault::PersistenceSink;

#[derive(Debug, Default)]
pub struct InMemorySink {
    turns: Mutex<Vec<TurnRecord>>,
    summaries: Mutex<Vec<SessionState>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> Vec<TurnRecord> {
        self.turns.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// 按写入顺序的全部会话摘要
    pub fn summaries(&self) -> Vec<SessionState> {
        self.summaries.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn write_turn(
        &self,
        _adapter: &AdapterIdentity,
        _chamber: ChamberId,
        record: &TurnRecord,
    ) -> anyhow::Result<()> {
        self.turns
            .lock()
            .map_err(|e| anyhow::anyhow!("turn buffer poisoned: {e}"))?
            .push(record.clone());
        Ok(())
    }

    async fn write_session_summary(&self, state: &SessionState) -> anyhow::Result<()> {
        self.summaries
            .lock()
            .map_err(|e| anyhow::anyhow!("summary buffer poisoned: {e}"))?
            .push(state.clone());
        Ok(())
    }
}
