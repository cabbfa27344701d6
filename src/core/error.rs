//! 核心错误类型
//!
//! 只有配置错误与脉冲级致命错误会浮到 SessionDriver 的调用方；适配器错误在 PulseCoordinator 内被隔离，
//! 门控失败不是错误而是正常结果。

use thiserror::Error;

use crate::chamber::ChamberId;

/// 会话启动前即可发现的错误（阈值越界、未知 Chamber、重复镜像等）
#[derive(Error, Debug)]
pub enum IrisError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown chamber: {0}")]
    UnknownChamber(String),

    #[error("Duplicate adapter identity: {0}")]
    DuplicateAdapter(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Session cannot be resumed from status {0}")]
    NotResumable(String),
}

/// 脉冲在等待屏障期间被进程中断（Ctrl+C / SIGTERM）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Pulse aborted during {chamber} (turn {turn_index})")]
pub struct PulseAborted {
    pub chamber: ChamberId,
    pub turn_index: u32,
}
