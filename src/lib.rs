//! IRIS Gate - 多镜像 LLM 脉冲执行与收敛门控引擎
//!
//! 模块划分：
//! - **adapters**: 镜像适配器接口与各模型后端（Anthropic / OpenAI 兼容 / Gemini / Ollama / Mock）
//! - **analysis**: 信号提取、TF-IDF、收敛评分、门控评估
//! - **chamber**: Chamber 标识、种子提示与会话级提示簿
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合记录、脉冲协调、压力、会话状态机、恢复与关闭
//! - **plan**: TOML 会话计划
//! - **vault**: 持久化 sink（文件 vault / 内存）与分层报告

pub mod adapters;
pub mod analysis;
pub mod chamber;
pub mod config;
pub mod core;
pub mod observability;
pub mod plan;
pub mod vault;

pub use adapters::{AdapterError, AdapterErrorKind, AdapterPort, MockAdapter};
pub use analysis::{evaluate, ConvergenceDiagnostic, ConvergenceScorer, GateConfig, GateDecision};
pub use chamber::{ChamberId, PromptBook};
pub use core::{SessionDriver, SessionState, SessionStatus, TurnRecord};
