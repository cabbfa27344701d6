//! 会话状态：状态机与已做出的门控决策
//!
//! 状态只能单向迁移：Pending -> Running -> {Completed | Paused | Failed}。
//! Paused 只能通过外部重新调用（SessionDriver::resume）继续，此时生成新的 SessionState。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::GateDecision;
use crate::chamber::ChamberId;
use crate::core::{AdapterIdentity, ErrorRecord};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Paused,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Paused | SessionStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Pending, SessionStatus::Failed)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Paused)
                | (SessionStatus::Running, SessionStatus::Failed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Paused => "paused",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 会话失败原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionFailure {
    PulseAborted { chamber: ChamberId, turn_index: u32 },
    NoAdapters,
    AdapterExhaustion { chamber: ChamberId },
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::PulseAborted { chamber, turn_index } => {
                write!(f, "pulse aborted during {chamber} (turn {turn_index})")
            }
            SessionFailure::NoAdapters => f.write_str("no adapters registered"),
            SessionFailure::AdapterExhaustion { chamber } => {
                write!(f, "every adapter failed non-recoverably in {chamber}")
            }
        }
    }
}

/// 会话状态（可序列化为 session_<id>.json）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub chambers: Vec<ChamberId>,
    pub adapters: Vec<AdapterIdentity>,
    pub decisions: Vec<GateDecision>,
    pub pressure: f64,
    /// 每个 Chamber 脉冲结束时的压力（报告用）
    #[serde(default)]
    pub pressure_trail: BTreeMap<ChamberId, f64>,
    pub status: SessionStatus,
    pub failure: Option<SessionFailure>,
    #[serde(default)]
    pub adapter_errors: Vec<ErrorRecord>,
    /// 已分配的最后一个回合号
    #[serde(default)]
    pub turn_counter: u32,
    /// 第几次调用（resume 递增）
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

fn default_attempt() -> u32 {
    1
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, chambers: Vec<ChamberId>, adapters: Vec<AdapterIdentity>) -> Self {
        Self {
            session_id: session_id.into(),
            chambers,
            adapters,
            decisions: Vec::new(),
            pressure: 0.0,
            pressure_trail: BTreeMap::new(),
            status: SessionStatus::Pending,
            failure: None,
            adapter_errors: Vec::new(),
            turn_counter: 0,
            attempt: 1,
            started_at: None,
            finished_at: None,
        }
    }

    /// 状态迁移；非法迁移被拒绝并返回 false
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(from = %self.status, to = %next, "illegal session transition ignored");
            return false;
        }
        tracing::info!(session = %self.session_id, from = %self.status, to = %next, "session transition");
        self.status = next;
        match next {
            SessionStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        true
    }

    pub fn fail(&mut self, failure: SessionFailure) {
        if self.transition(SessionStatus::Failed) {
            tracing::error!(session = %self.session_id, "session failed: {}", failure);
            self.failure = Some(failure);
        }
    }

    /// 最后一个失败门控所在的 Chamber
    pub fn failed_chamber(&self) -> Option<ChamberId> {
        self.decisions.iter().rev().find(|d| !d.pass).map(|d| d.chamber)
    }

    pub fn decision_for(&self, chamber: ChamberId) -> Option<&GateDecision> {
        self.decisions.iter().rev().find(|d| d.chamber == chamber)
    }

    pub fn next_turn(&mut self) -> u32 {
        self.turn_counter += 1;
        self.turn_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_monotonic() {
        let mut s = SessionState::new("IRIS_test", vec![ChamberId::S1], vec!["mock/a".into()]);
        assert!(!s.transition(SessionStatus::Completed));
        assert!(s.transition(SessionStatus::Running));
        assert!(s.started_at.is_some());
        assert!(s.transition(SessionStatus::Paused));
        assert!(!s.transition(SessionStatus::Running));
        assert!(!s.transition(SessionStatus::Completed));
        assert_eq!(s.status, SessionStatus::Paused);
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn test_fail_records_cause() {
        let mut s = SessionState::new("IRIS_test", vec![], vec![]);
        s.fail(SessionFailure::NoAdapters);
        assert_eq!(s.status, SessionStatus::Failed);
        assert_eq!(s.failure, Some(SessionFailure::NoAdapters));
    }

    #[test]
    fn test_turn_counter() {
        let mut s = SessionState::new("IRIS_test", vec![], vec![]);
        assert_eq!(s.next_turn(), 1);
        assert_eq!(s.next_turn(), 2);
    }
}
