//! 核心编排层：回合记录、脉冲协调、压力、会话状态机、恢复与关闭

pub mod error;
pub mod pressure;
pub mod pulse;
pub mod recovery;
pub mod session;
pub mod shutdown;
pub mod state;
pub mod turn;

pub use error::{IrisError, PulseAborted};
pub use pressure::PressureMonitor;
pub use pulse::{AdapterOutcome, PulseCoordinator, PulseResult};
pub use recovery::{FailureSeverity, RecoveryAction, RecoveryEngine};
pub use session::{new_session_id, SessionDriver};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{SessionFailure, SessionState, SessionStatus};
pub use turn::{compute_seal, AdapterIdentity, ErrorRecord, TurnMetadata, TurnRecord};
pub(crate) use turn::snippet;
