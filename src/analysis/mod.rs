//! 分析层：信号提取、TF-IDF、收敛评分、门控评估（均为纯计算，无 I/O）

pub mod convergence;
pub mod gate;
pub mod signals;
pub mod tfidf;

pub use convergence::{
    ConvergenceDiagnostic, ConvergenceScorer, PressureCompliance, ScorerConfig, ScoringMethod,
};
pub use gate::{evaluate, AttractorCheck, Exemplar, GateConfig, GateDecision};
pub use signals::{extract_pressure, extract_signals, KeywordFamilies, SignalSet};
pub use tfidf::{TfidfConfig, TfidfVectorizer, VectorizeError};
