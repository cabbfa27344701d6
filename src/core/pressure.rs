//! 会话压力：由操作成本累积的非负标量
//!
//! 只由 SessionDriver 在脉冲之间单线程更新，不跨任务共享。

/// 压力监视器
#[derive(Debug, Clone, Default)]
pub struct PressureMonitor {
    pressure: f64,
}

impl PressureMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有值恢复（resume 使用），负值按 0 处理
    pub fn with_pressure(pressure: f64) -> Self {
        Self {
            pressure: pressure.max(0.0),
        }
    }

    pub fn current(&self) -> f64 {
        self.pressure
    }

    /// 累加成本；delta 可为负，下限为 0
    pub fn record_operation(&mut self, delta: f64) {
        self.pressure = (self.pressure + delta).max(0.0);
        tracing::debug!(delta, pressure = self.pressure, "pressure updated");
    }

    /// 压力 <= max_pressure 时为 true；超限时记录警告
    pub fn check_gate(&self, max_pressure: f64) -> bool {
        let ok = self.pressure <= max_pressure;
        if !ok {
            tracing::warn!(
                pressure = self.pressure,
                max_pressure,
                "pressure exceeds limit"
            );
        }
        ok
    }

    pub fn reset(&mut self) {
        self.pressure = 0.0;
    }
}
