//! 门控评估：纯函数 `evaluate(diagnostic, config) -> GateDecision`
//!
//! 基础通过 = 通过镜像数 >= min_adapters_passing 且 平均收敛 >= min_convergence 且 会话压力 <= max_pressure
//! （开启 enforce_felt_pressure 时还要求没有镜像自报压力超限）。终端 Chamber 可额外要求吸引子签名。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::convergence::{ConvergenceDiagnostic, PressureCompliance};
use crate::chamber::ChamberId;
use crate::core::{AdapterIdentity, IrisError};

/// 门控阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub min_convergence: f64,
    pub min_adapters_passing: usize,
    pub max_pressure: f64,
    /// 仅对终端 Chamber 生效
    pub require_attractor_signature: bool,
    pub enforce_felt_pressure: bool,
    pub max_exemplars: usize,
}

impl GateConfig {
    /// 默认阈值；min_adapters_passing 取注册镜像数的一半（向上取整，至少 1）
    pub fn for_adapters(registered: usize) -> Self {
        Self {
            min_convergence: 0.60,
            min_adapters_passing: registered.div_ceil(2).max(1),
            max_pressure: 2.0,
            require_attractor_signature: false,
            enforce_felt_pressure: true,
            max_exemplars: 3,
        }
    }

    pub fn validate(&self, registered: usize) -> Result<(), IrisError> {
        if !(0.0..=1.0).contains(&self.min_convergence) {
            return Err(IrisError::Config(format!(
                "min_convergence must be within [0, 1], got {}",
                self.min_convergence
            )));
        }
        if self.min_adapters_passing == 0 || self.min_adapters_passing > registered {
            return Err(IrisError::Config(format!(
                "min_adapters_passing must be within 1..={registered}, got {}",
                self.min_adapters_passing
            )));
        }
        if !self.max_pressure.is_finite() || self.max_pressure < 0.0 {
            return Err(IrisError::Config(format!(
                "max_pressure must be a non-negative number, got {}",
                self.max_pressure
            )));
        }
        Ok(())
    }
}

/// 高收敛镜像的回应摘录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub adapter: AdapterIdentity,
    pub score: f64,
    pub snippet: String,
}

/// 终端 Chamber 的吸引子签名检查
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractorCheck {
    pub count: usize,
    pub rate: f64,
    pub required: usize,
    pub pass: bool,
}

/// 门控结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub chamber: ChamberId,
    pub pass: bool,
    pub base_pass: bool,
    pub adapters_passing: usize,
    pub min_adapters_passing: usize,
    pub min_convergence: f64,
    pub max_pressure: f64,
    /// 失败原因（通过时为空）
    pub reasons: Vec<String>,
    pub exemplars: Vec<Exemplar>,
    pub pressure_compliance: BTreeMap<AdapterIdentity, PressureCompliance>,
    pub attractor: Option<AttractorCheck>,
    pub diagnostic: ConvergenceDiagnostic,
}

pub fn evaluate(diagnostic: &ConvergenceDiagnostic, config: &GateConfig) -> GateDecision {
    let adapters_passing = diagnostic.passing(config.min_convergence);
    let compliance = diagnostic.pressure_compliance(config.max_pressure);
    let mut reasons = Vec::new();

    if adapters_passing < config.min_adapters_passing {
        reasons.push(format!(
            "{adapters_passing}/{} adapters reached {:.2} (need {})",
            diagnostic.total_adapters, config.min_convergence, config.min_adapters_passing
        ));
    }
    if diagnostic.mean_convergence < config.min_convergence {
        reasons.push(format!(
            "mean convergence {:.3} below {:.2}",
            diagnostic.mean_convergence, config.min_convergence
        ));
    }
    if diagnostic.pressure > config.max_pressure {
        reasons.push(format!(
            "session pressure {:.2} exceeds {:.2}",
            diagnostic.pressure, config.max_pressure
        ));
    }
    if config.enforce_felt_pressure {
        for (id, c) in &compliance {
            if let PressureCompliance::Exceeded(v) = c {
                reasons.push(format!("{id}: felt pressure {v:.1}/5 exceeds {:.1}", config.max_pressure));
            }
        }
    }
    let base_pass = reasons.is_empty();

    let attractor = config.require_attractor_signature.then(|| {
        let count = diagnostic.signals.values().filter(|s| s.attractor).count();
        let rate = if diagnostic.signals.is_empty() {
            0.0
        } else {
            count as f64 / diagnostic.signals.len() as f64
        };
        AttractorCheck {
            count,
            rate,
            required: config.min_adapters_passing,
            pass: count >= config.min_adapters_passing,
        }
    });
    if let Some(check) = attractor.as_ref().filter(|c| !c.pass) {
        reasons.push(format!(
            "attractor signature in {}/{} responses (need {})",
            check.count,
            diagnostic.successful(),
            check.required
        ));
    }

    let pass = base_pass && attractor.as_ref().map_or(true, |c| c.pass);

    let mut ranked: Vec<(&AdapterIdentity, f64)> = diagnostic
        .per_adapter
        .iter()
        .filter(|(_, s)| **s >= config.min_convergence)
        .map(|(id, s)| (id, *s))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let exemplars = ranked
        .into_iter()
        .take(config.max_exemplars)
        .map(|(id, score)| Exemplar {
            adapter: id.clone(),
            score,
            snippet: diagnostic.snippets.get(id).cloned().unwrap_or_default(),
        })
        .collect();

    if pass {
        tracing::info!(
            chamber = %diagnostic.chamber,
            passing = adapters_passing,
            mean = diagnostic.mean_convergence,
            "gate passed"
        );
    } else {
        tracing::warn!(
            chamber = %diagnostic.chamber,
            reasons = ?reasons,
            "gate failed"
        );
    }

    GateDecision {
        chamber: diagnostic.chamber,
        pass,
        base_pass,
        adapters_passing,
        min_adapters_passing: config.min_adapters_passing,
        min_convergence: config.min_convergence,
        max_pressure: config.max_pressure,
        reasons,
        exemplars,
        pressure_compliance: compliance,
        attractor,
        diagnostic: diagnostic.clone(),
    }
}
