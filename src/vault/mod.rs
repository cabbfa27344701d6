//! 持久化：PersistenceSink 写入契约与实现（文件 vault / 内存）
//!
//! 核心只调用 sink，不读取其格式；写入失败只记日志，不中断会话。
//! write_turn 会在各镜像任务中并发调用，实现方须支持并发追加写。

pub mod memory;
pub mod report;
pub mod store;

use async_trait::async_trait;

use crate::chamber::ChamberId;
use crate::core::{AdapterIdentity, SessionState, TurnRecord};

pub use memory::InMemorySink;
pub use report::render_report;
pub use store::{load_session, VaultSink};

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn write_turn(
        &self,
        adapter: &AdapterIdentity,
        chamber: ChamberId,
        record: &TurnRecord,
    ) -> anyhow::Result<()>;

    async fn write_session_summary(&self, state: &SessionState) -> anyhow::Result<()>;
}
