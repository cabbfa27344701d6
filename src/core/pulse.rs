//! 脉冲协调器：一次 Chamber 脉冲 = 向所有镜像并发派发同一回合，并等待全部结束
//!
//! 每个镜像一个 tokio 任务，带各自超时；单个镜像失败只写入自己的 ErrorRecord，不影响兄弟任务。
//! 等待屏障与取消 token 竞争：收到关闭信号时中止全部任务并返回 PulseAborted。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::adapters::{AdapterError, AdapterErrorKind, AdapterPort, ChamberRequest};
use crate::chamber::{ChamberId, PromptBook};
use crate::core::{AdapterIdentity, ErrorRecord, PulseAborted, TurnRecord};
use crate::vault::PersistenceSink;

/// 单个镜像在一次脉冲中的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutcome {
    Success(TurnRecord),
    Failure(ErrorRecord),
}

/// 一次脉冲的结果：每个注册镜像恰好一项
#[derive(Debug, Clone)]
pub struct PulseResult {
    pub chamber: ChamberId,
    pub turn_index: u32,
    pub elapsed: Duration,
    pub outcomes: BTreeMap<AdapterIdentity, AdapterOutcome>,
}

impl PulseResult {
    pub fn successes(&self) -> impl Iterator<Item = &TurnRecord> {
        self.outcomes.values().filter_map(|o| match o {
            AdapterOutcome::Success(r) => Some(r),
            AdapterOutcome::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.outcomes.values().filter_map(|o| match o {
            AdapterOutcome::Failure(e) => Some(e),
            AdapterOutcome::Success(_) => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// 没有成功回应，且所有失败都不可在会话内恢复
    pub fn is_exhausted(&self) -> bool {
        self.successes().next().is_none()
            && self.failures().all(|e| !e.kind.is_recoverable())
    }
}

/// 脉冲协调器
pub struct PulseCoordinator {
    adapters: Vec<Arc<dyn AdapterPort>>,
    prompts: Arc<PromptBook>,
    sink: Option<Arc<dyn PersistenceSink>>,
}

impl PulseCoordinator {
    pub fn new(adapters: Vec<Arc<dyn AdapterPort>>, prompts: Arc<PromptBook>) -> Self {
        Self {
            adapters,
            prompts,
            sink: None,
        }
    }

    /// 每条成功记录完成后立即写入 sink（在镜像任务内，可并发）
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub async fn pulse(
        &self,
        chamber: ChamberId,
        turn_index: u32,
        cancel: &CancellationToken,
    ) -> Result<PulseResult, PulseAborted> {
        let start = Instant::now();
        tracing::info!(%chamber, turn_index, adapters = self.adapters.len(), "pulse started");

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let prompt = self.prompts.get(chamber, adapter.identity()).cloned();
                let sink = self.sink.clone();
                let identity = adapter.identity().clone();
                let handle = tokio::spawn(async move {
                    run_adapter(adapter, chamber, turn_index, prompt, sink).await
                });
                (identity, handle)
            })
            .collect();

        let identities: Vec<AdapterIdentity> = handles.iter().map(|(id, _)| id.clone()).collect();
        let abort_handles: Vec<_> = handles.iter().map(|(_, h)| h.abort_handle()).collect();
        let barrier = join_all(handles.into_iter().map(|(_, h)| h));

        let joined = tokio::select! {
            joined = barrier => joined,
            _ = cancel.cancelled() => {
                abort_handles.iter().for_each(|h| h.abort());
                tracing::warn!(%chamber, turn_index, "pulse aborted by shutdown");
                return Err(PulseAborted { chamber, turn_index });
            }
        };

        let outcomes = identities
            .into_iter()
            .zip(joined)
            .map(|(identity, joined)| {
                let outcome = match joined {
                    Ok(Ok(record)) => AdapterOutcome::Success(record),
                    Ok(Err(err)) => AdapterOutcome::Failure(ErrorRecord::from_error(
                        identity.clone(),
                        chamber,
                        turn_index,
                        &err,
                    )),
                    Err(join_err) => AdapterOutcome::Failure(ErrorRecord::from_error(
                        identity.clone(),
                        chamber,
                        turn_index,
                        &AdapterError::new(
                            AdapterErrorKind::Transport,
                            format!("adapter task failed: {join_err}"),
                        ),
                    )),
                };
                (identity, outcome)
            })
            .collect();

        let result = PulseResult {
            chamber,
            turn_index,
            elapsed: start.elapsed(),
            outcomes,
        };
        tracing::info!(
            %chamber,
            turn_index,
            ok = result.successes().count(),
            failed = result.failure_count(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "pulse finished"
        );
        Ok(result)
    }
}

/// 单个镜像任务：超时包装、审计日志、成功后写 sink
async fn run_adapter(
    adapter: Arc<dyn AdapterPort>,
    chamber: ChamberId,
    turn_index: u32,
    prompt: Option<crate::chamber::ResolvedPrompt>,
    sink: Option<Arc<dyn PersistenceSink>>,
) -> Result<TurnRecord, AdapterError> {
    let identity = adapter.identity().clone();
    let Some(prompt) = prompt else {
        return Err(AdapterError::new(
            AdapterErrorKind::ContentRejected,
            format!("no prompt resolved for {identity} in {chamber}"),
        ));
    };
    let request = ChamberRequest {
        chamber,
        turn_index,
        prompt,
    };

    let start = Instant::now();
    let timeout = adapter.timeout();
    let result = match tokio::time::timeout(timeout, adapter.respond(&request)).await {
        Ok(r) => r,
        Err(_) => Err(AdapterError::timeout(timeout)),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.kind == AdapterErrorKind::Timeout => "timeout",
        Err(_) => "error",
    };
    let audit = serde_json::json!({
        "event": "adapter_audit",
        "adapter": identity.as_str(),
        "chamber": chamber.as_str(),
        "turn": turn_index,
        "outcome": outcome,
        "duration_ms": duration_ms,
    });
    tracing::info!(target: "adapter_audit", "{}", audit);

    match &result {
        Ok(record) => {
            if let Some(sink) = sink {
                if let Err(e) = sink.write_turn(&identity, chamber, record).await {
                    tracing::warn!(adapter = %identity, %chamber, "persisting turn failed: {:#}", e);
                }
            }
        }
        Err(e) => tracing::warn!(adapter = %identity, %chamber, "adapter failed: {}", e),
    }
    result
}
