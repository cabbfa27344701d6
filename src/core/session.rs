//! 会话驱动：按顺序执行 Chamber，逐层门控
//!
//! 每个 Chamber：脉冲 -> 压力成本 -> 收敛评分 -> 门控评估 -> 压力检查 -> 前进 / 暂停。
//! Chamber n+1 只在 Chamber n 的门控决策产生后才派发。暂停后不会自动重试，只能由调用方 resume。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::adapters::AdapterPort;
use crate::analysis::{evaluate, ConvergenceScorer, GateConfig};
use crate::chamber::{ChamberId, PromptBook};
use crate::config::{AppConfig, GateOverride};
use crate::core::{
    AdapterIdentity, IrisError, PressureMonitor, PulseCoordinator, SessionFailure, SessionState,
    SessionStatus,
};
use crate::vault::PersistenceSink;

/// 生成会话 id：`<prefix>_<UTC 时间戳>`
pub fn new_session_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Utc::now().format("%Y%m%d_%H%M%S"))
}

/// 会话驱动
pub struct SessionDriver {
    config: AppConfig,
    adapters: Vec<Arc<dyn AdapterPort>>,
    prompts: Option<Arc<PromptBook>>,
    sink: Option<Arc<dyn PersistenceSink>>,
    gate_overrides: HashMap<ChamberId, GateOverride>,
    cancel: CancellationToken,
}

impl SessionDriver {
    pub fn new(config: AppConfig, adapters: Vec<Arc<dyn AdapterPort>>) -> Self {
        Self {
            config,
            adapters,
            prompts: None,
            sink: None,
            gate_overrides: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// 使用预先解析好的提示簿（计划文件）；未设置时按内置种子构建
    pub fn with_prompts(mut self, prompts: Arc<PromptBook>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_gate_overrides(mut self, overrides: HashMap<ChamberId, GateOverride>) -> Self {
        self.gate_overrides = overrides;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn identities(&self) -> Vec<AdapterIdentity> {
        self.adapters.iter().map(|a| a.identity().clone()).collect()
    }

    fn gate_for(&self, chambers: &[ChamberId], chamber: ChamberId) -> GateConfig {
        let terminal = chambers.last() == Some(&chamber);
        self.config.gate.resolve(
            self.adapters.len(),
            terminal,
            self.gate_overrides.get(&chamber),
            self.config.convergence.max_exemplars,
        )
    }

    /// 启动前校验；任何问题都在调用镜像之前返回
    fn validate(&self, chambers: &[ChamberId]) -> Result<Arc<PromptBook>, IrisError> {
        self.config.validate()?;
        if chambers.is_empty() {
            return Err(IrisError::Config("chamber sequence is empty".into()));
        }
        let mut seen_chambers = HashSet::new();
        if let Some(repeated) = chambers.iter().find(|c| !seen_chambers.insert(**c)) {
            return Err(IrisError::Config(format!(
                "chamber {repeated} appears more than once in the sequence"
            )));
        }
        let ids = self.identities();
        let mut seen = HashSet::new();
        for id in &ids {
            if !seen.insert(id.clone()) {
                return Err(IrisError::DuplicateAdapter(id.to_string()));
            }
        }
        if !self.adapters.is_empty() {
            for chamber in chambers {
                self.gate_for(chambers, *chamber).validate(self.adapters.len())?;
            }
        }

        let book = match &self.prompts {
            Some(book) => Arc::clone(book),
            None => Arc::new(PromptBook::builtin(
                chambers,
                &ids,
                self.config.adapters.max_tokens,
            )?),
        };
        for chamber in chambers {
            if !book.contains(*chamber) {
                return Err(IrisError::UnknownChamber(chamber.to_string()));
            }
            // 每个注册镜像都必须有提示，否则身份与提示簿对不上
            if let Some(id) = ids.iter().find(|id| book.get(*chamber, id).is_none()) {
                return Err(IrisError::Config(format!("no prompt for {id} in {chamber}")));
            }
        }
        Ok(book)
    }

    /// 按配置中的 Chamber 序列启动
    pub async fn run(&self, session_id: &str) -> Result<SessionState, IrisError> {
        let chambers = self.config.session.chambers.clone();
        self.start(session_id, &chambers).await
    }

    /// 启动新会话；配置错误返回 Err，其余结局（完成 / 暂停 / 失败）体现在返回的 SessionState 中
    pub async fn start(
        &self,
        session_id: &str,
        chambers: &[ChamberId],
    ) -> Result<SessionState, IrisError> {
        let prompts = self.validate(chambers)?;
        let state = SessionState::new(session_id, chambers.to_vec(), self.identities());
        Ok(self.drive(state, 0, PressureMonitor::new(), prompts).await)
    }

    /// 重新调用已暂停的会话：从门控失败的 Chamber 重新开始，保留之前的决策与压力
    pub async fn resume(&self, paused: &SessionState) -> Result<SessionState, IrisError> {
        if paused.status != SessionStatus::Paused {
            return Err(IrisError::NotResumable(paused.status.to_string()));
        }
        let prompts = self.validate(&paused.chambers)?;
        let current: HashSet<&AdapterIdentity> = self.adapters.iter().map(|a| a.identity()).collect();
        let previous: HashSet<&AdapterIdentity> = paused.adapters.iter().collect();
        if current != previous {
            tracing::warn!(
                session = %paused.session_id,
                previous = ?paused.adapters,
                current = ?self.identities(),
                "mirror set changed since the session was paused"
            );
        }

        let start_idx = match paused.decisions.last() {
            Some(last) if !last.pass => paused.chambers.iter().position(|c| *c == last.chamber),
            Some(last) => paused
                .chambers
                .iter()
                .position(|c| *c == last.chamber)
                .map(|i| i + 1),
            None => Some(0),
        }
        .ok_or_else(|| IrisError::Config("paused session references an unknown chamber".into()))?;

        let mut state = SessionState::new(
            paused.session_id.clone(),
            paused.chambers.clone(),
            self.identities(),
        );
        let kept: HashSet<ChamberId> = paused.chambers[..start_idx].iter().copied().collect();
        state.decisions = paused
            .decisions
            .iter()
            .filter(|d| kept.contains(&d.chamber))
            .cloned()
            .collect();
        state.pressure_trail = paused.pressure_trail.clone();
        state.adapter_errors = paused.adapter_errors.clone();
        state.turn_counter = paused.turn_counter;
        state.attempt = paused.attempt + 1;
        state.pressure = paused.pressure;

        tracing::info!(
            session = %state.session_id,
            attempt = state.attempt,
            from = %paused.chambers.get(start_idx).map(|c| c.as_str()).unwrap_or("end"),
            "resuming session"
        );
        let monitor = PressureMonitor::with_pressure(paused.pressure);
        Ok(self.drive(state, start_idx, monitor, prompts).await)
    }

    async fn drive(
        &self,
        mut state: SessionState,
        start_idx: usize,
        mut monitor: PressureMonitor,
        prompts: Arc<PromptBook>,
    ) -> SessionState {
        state.transition(SessionStatus::Running);

        if self.adapters.is_empty() {
            state.fail(SessionFailure::NoAdapters);
            self.persist(&state).await;
            return state;
        }

        let mut coordinator = PulseCoordinator::new(self.adapters.clone(), prompts);
        if let Some(sink) = &self.sink {
            coordinator = coordinator.with_sink(Arc::clone(sink));
        }
        let scorer = ConvergenceScorer::new(
            self.config.convergence.scorer_config(),
            self.config.signals.clone(),
        );
        let costs = &self.config.pressure;
        let chambers = state.chambers.clone();

        for &chamber in &chambers[start_idx..] {
            let terminal = chambers.last() == Some(&chamber);
            let turn = state.next_turn();
            let pulse = match coordinator.pulse(chamber, turn, &self.cancel).await {
                Ok(pulse) => pulse,
                Err(aborted) => {
                    state.pressure = monitor.current();
                    state.fail(SessionFailure::PulseAborted {
                        chamber: aborted.chamber,
                        turn_index: aborted.turn_index,
                    });
                    break;
                }
            };
            state.adapter_errors.extend(pulse.failures().cloned());

            if pulse.is_exhausted() {
                state.pressure = monitor.current();
                state.fail(SessionFailure::AdapterExhaustion { chamber });
                break;
            }

            monitor.record_operation(
                costs.pulse_cost + costs.adapter_failure_cost * pulse.failure_count() as f64,
            );
            let diagnostic = scorer.score(&pulse, monitor.current());
            let gate = self.gate_for(&chambers, chamber);
            let decision = evaluate(&diagnostic, &gate);
            let passed = decision.pass;
            state.decisions.push(decision);

            if passed {
                if costs.reset_on_gate_pass {
                    monitor.reset();
                }
            } else {
                monitor.record_operation(costs.gate_failure_cost);
            }
            state.pressure = monitor.current();
            state.pressure_trail.insert(chamber, monitor.current());

            if !passed {
                if self.config.session.pause_on_gate_failure {
                    tracing::warn!(session = %state.session_id, %chamber, "gate failed, pausing session");
                    state.transition(SessionStatus::Paused);
                    break;
                }
                tracing::warn!(%chamber, "gate failed, continuing in best-effort mode");
            }

            // 最后一个 Chamber 已处理完，不再因压力暂停
            if !terminal && !monitor.check_gate(gate.max_pressure) && costs.auto_pause {
                tracing::warn!(session = %state.session_id, %chamber, "pressure over limit, pausing session");
                state.transition(SessionStatus::Paused);
                break;
            }
        }

        if state.status == SessionStatus::Running {
            state.transition(SessionStatus::Completed);
        }
        tracing::info!(
            session = %state.session_id,
            status = %state.status,
            decisions = state.decisions.len(),
            "session finished"
        );
        self.persist(&state).await;
        state
    }

    async fn persist(&self, state: &SessionState) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write_session_summary(state).await {
                tracing::warn!(session = %state.session_id, "writing session summary failed: {:#}", e);
            }
        }
    }
}
