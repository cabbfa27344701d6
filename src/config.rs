//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `IRIS__*` 覆盖（双下划线表示嵌套，如 `IRIS__GATE__MIN_CONVERGENCE=0.7`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::analysis::{GateConfig, KeywordFamilies, ScorerConfig, TfidfConfig};
use crate::chamber::ChamberId;
use crate::core::IrisError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub session: SessionSection,
    pub gate: GateSection,
    pub pressure: PressureSection,
    pub adapters: AdaptersSection,
    pub convergence: ConvergenceSection,
    pub signals: KeywordFamilies,
}

/// [app] 段：vault 目录与会话 id 前缀
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub vault_dir: PathBuf,
    pub session_prefix: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            vault_dir: PathBuf::from("./iris_vault"),
            session_prefix: "IRIS".to_string(),
        }
    }
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub chambers: Vec<ChamberId>,
    pub pause_on_gate_failure: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            chambers: vec![ChamberId::S1, ChamberId::S2, ChamberId::S3, ChamberId::S4],
            pause_on_gate_failure: true,
        }
    }
}

/// 单个 Chamber 的门控覆盖（`[gate.terminal]` 或计划文件中的 `[chambers.gate]`）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GateOverride {
    pub min_convergence: Option<f64>,
    pub min_adapters_passing: Option<usize>,
}

/// [gate] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateSection {
    pub min_convergence: f64,
    /// 未设置时取注册镜像数的一半（向上取整）
    pub min_adapters_passing: Option<usize>,
    pub max_pressure: f64,
    /// 仅对终端 Chamber 生效
    pub require_attractor_signature: bool,
    pub enforce_felt_pressure: bool,
    pub terminal: GateOverride,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            min_convergence: 0.60,
            min_adapters_passing: None,
            max_pressure: 2.0,
            require_attractor_signature: true,
            enforce_felt_pressure: true,
            terminal: GateOverride::default(),
        }
    }
}

impl GateSection {
    /// 组装某个 Chamber 的门控阈值：全局 -> 终端覆盖 -> Chamber 覆盖
    pub fn resolve(
        &self,
        registered: usize,
        terminal: bool,
        chamber_override: Option<&GateOverride>,
        max_exemplars: usize,
    ) -> GateConfig {
        let mut gate = GateConfig::for_adapters(registered);
        gate.min_convergence = self.min_convergence;
        if let Some(n) = self.min_adapters_passing {
            gate.min_adapters_passing = n;
        }
        gate.max_pressure = self.max_pressure;
        gate.enforce_felt_pressure = self.enforce_felt_pressure;
        gate.max_exemplars = max_exemplars;

        let mut overrides = Vec::new();
        if terminal {
            gate.require_attractor_signature = self.require_attractor_signature;
            overrides.push(&self.terminal);
        }
        overrides.extend(chamber_override);
        for o in overrides {
            if let Some(v) = o.min_convergence {
                gate.min_convergence = v;
            }
            if let Some(n) = o.min_adapters_passing {
                gate.min_adapters_passing = n;
            }
        }
        gate
    }
}

/// [pressure] 段：各类操作的压力成本
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PressureSection {
    pub auto_pause: bool,
    pub reset_on_gate_pass: bool,
    pub pulse_cost: f64,
    pub adapter_failure_cost: f64,
    pub gate_failure_cost: f64,
}

impl Default for PressureSection {
    fn default() -> Self {
        Self {
            auto_pause: true,
            reset_on_gate_pass: true,
            pulse_cost: 0.1,
            adapter_failure_cost: 0.25,
            gate_failure_cost: 0.5,
        }
    }
}

/// [adapters] 段：超时、Token、重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptersSection {
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub ollama_host: Option<String>,
}

impl Default for AdaptersSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            max_tokens: 2000,
            max_retries: 0,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            ollama_host: None,
        }
    }
}

/// [convergence] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvergenceSection {
    pub max_features: usize,
    pub ngram_max: usize,
    pub remove_stop_words: bool,
    pub outlier_sigma: f64,
    pub snippet_chars: usize,
    pub max_exemplars: usize,
}

impl Default for ConvergenceSection {
    fn default() -> Self {
        Self {
            max_features: 500,
            ngram_max: 2,
            remove_stop_words: true,
            outlier_sigma: 2.0,
            snippet_chars: 150,
            max_exemplars: 3,
        }
    }
}

impl ConvergenceSection {
    pub fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            tfidf: TfidfConfig {
                max_features: self.max_features,
                ngram_max: self.ngram_max,
                remove_stop_words: self.remove_stop_words,
            },
            outlier_sigma: self.outlier_sigma,
            snippet_chars: self.snippet_chars,
        }
    }
}

impl AppConfig {
    /// 与镜像数无关的检查；门控阈值在 SessionDriver::start 时按注册数再校验
    pub fn validate(&self) -> Result<(), IrisError> {
        let p = &self.pressure;
        for (name, v) in [
            ("pulse_cost", p.pulse_cost),
            ("adapter_failure_cost", p.adapter_failure_cost),
            ("gate_failure_cost", p.gate_failure_cost),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(IrisError::Config(format!("pressure.{name} must be >= 0, got {v}")));
            }
        }
        if self.convergence.ngram_max == 0 {
            return Err(IrisError::Config("convergence.ngram_max must be >= 1".into()));
        }
        if self.adapters.request_timeout_secs == 0 {
            return Err(IrisError::Config("adapters.request_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 IRIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 IRIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("IRIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.gate.min_convergence, 0.60);
        assert_eq!(cfg.gate.max_pressure, 2.0);
        assert!(cfg.session.pause_on_gate_failure);
        assert_eq!(cfg.session.chambers.len(), 4);
        assert_eq!(cfg.convergence.max_features, 500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_sections() {
        let raw = r#"
            [session]
            chambers = ["S1", "S2"]
            pause_on_gate_failure = false

            [gate]
            min_convergence = 0.7
            min_adapters_passing = 2

            [gate.terminal]
            min_convergence = 0.75

            [signals]
            geometry = ["spiral"]
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.session.chambers, vec![ChamberId::S1, ChamberId::S2]);
        assert!(!cfg.session.pause_on_gate_failure);
        assert_eq!(cfg.gate.min_adapters_passing, Some(2));
        assert_eq!(cfg.gate.terminal.min_convergence, Some(0.75));
        assert_eq!(cfg.signals.geometry, vec!["spiral".to_string()]);
        assert!(!cfg.signals.motion.is_empty());
        assert_eq!(cfg.pressure.pulse_cost, 0.1);
    }

    #[test]
    fn test_gate_resolution_layers() {
        let section = GateSection {
            terminal: GateOverride {
                min_convergence: Some(0.75),
                min_adapters_passing: None,
            },
            ..GateSection::default()
        };
        let tier = section.resolve(5, false, None, 3);
        assert_eq!(tier.min_convergence, 0.60);
        assert_eq!(tier.min_adapters_passing, 3);
        assert!(!tier.require_attractor_signature);

        let terminal = section.resolve(5, true, None, 3);
        assert_eq!(terminal.min_convergence, 0.75);
        assert!(terminal.require_attractor_signature);

        let chamber = GateOverride {
            min_convergence: None,
            min_adapters_passing: Some(4),
        };
        let custom = section.resolve(5, true, Some(&chamber), 3);
        assert_eq!(custom.min_adapters_passing, 4);
        assert_eq!(custom.min_convergence, 0.75);
    }

    #[test]
    fn test_negative_cost_rejected() {
        let mut cfg = AppConfig::default();
        cfg.pressure.gate_failure_cost = -1.0;
        assert!(matches!(cfg.validate(), Err(IrisError::Config(_))));
    }
}
