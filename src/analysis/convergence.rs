//! 收敛评分
//!
//! 主算法：TF-IDF + 余弦相似度，每个镜像的分数为它与其余镜像相似度的均值，整体收敛为各镜像分数的均值。
//! 向量化失败时退回信号重叠（SignalSet 真值键的 Jaccard）。出错的镜像不参与评分，但计入 total_adapters。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analysis::signals::{extract_pressure, KeywordFamilies, SignalSet};
use crate::analysis::tfidf::{similarity_matrix, TfidfConfig, TfidfVectorizer};
use crate::chamber::ChamberId;
use crate::core::{snippet, AdapterIdentity, PulseResult, TurnRecord};

/// 实际使用的评分方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Tfidf,
    SignalOverlap,
    /// 少于 2 条回应，按约定记 1.0
    Trivial,
    /// 没有任何成功回应
    Empty,
}

/// 单个镜像的自报压力合规性
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum PressureCompliance {
    NotReported,
    Within(f64),
    Exceeded(f64),
}

/// 评分器参数
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    pub tfidf: TfidfConfig,
    pub outlier_sigma: f64,
    pub snippet_chars: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            tfidf: TfidfConfig::default(),
            outlier_sigma: 2.0,
            snippet_chars: 150,
        }
    }
}

/// 单次脉冲的收敛诊断（只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceDiagnostic {
    pub chamber: ChamberId,
    pub turn_index: u32,
    pub mean_convergence: f64,
    pub per_adapter: BTreeMap<AdapterIdentity, f64>,
    /// 含出错镜像
    pub total_adapters: usize,
    pub errored: Vec<AdapterIdentity>,
    pub method: ScoringMethod,
    pub std_dev: f64,
    /// 低于均值 outlier_sigma 个标准差的镜像
    pub outliers: Vec<AdapterIdentity>,
    /// 会话当前累积压力
    pub pressure: f64,
    pub felt_pressure: BTreeMap<AdapterIdentity, Option<f64>>,
    pub signals: BTreeMap<AdapterIdentity, SignalSet>,
    pub snippets: BTreeMap<AdapterIdentity, String>,
}

impl ConvergenceDiagnostic {
    /// 分数 >= threshold 的镜像数
    pub fn passing(&self, threshold: f64) -> usize {
        self.per_adapter.values().filter(|s| **s >= threshold).count()
    }

    pub fn successful(&self) -> usize {
        self.per_adapter.len()
    }

    pub fn pressure_compliance(&self, max_pressure: f64) -> BTreeMap<AdapterIdentity, PressureCompliance> {
        self.felt_pressure
            .iter()
            .map(|(id, p)| {
                let c = match p {
                    None => PressureCompliance::NotReported,
                    Some(v) if *v > max_pressure => PressureCompliance::Exceeded(*v),
                    Some(v) => PressureCompliance::Within(*v),
                };
                (id.clone(), c)
            })
            .collect()
    }
}

/// 收敛评分器
#[derive(Debug, Clone, Default)]
pub struct ConvergenceScorer {
    config: ScorerConfig,
    families: KeywordFamilies,
}

impl ConvergenceScorer {
    pub fn new(config: ScorerConfig, families: KeywordFamilies) -> Self {
        Self { config, families }
    }

    /// 对一次脉冲结果评分；pressure 为评估时刻的会话压力
    pub fn score(&self, pulse: &PulseResult, pressure: f64) -> ConvergenceDiagnostic {
        let records: Vec<&TurnRecord> = pulse.successes().collect();
        let errored = pulse.failures().map(|e| e.adapter.clone()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.raw_response.as_str()).collect();
        let (scores, method) = self.score_texts(&texts);

        let per_adapter: BTreeMap<AdapterIdentity, f64> = records
            .iter()
            .zip(&scores)
            .map(|(r, s)| (r.adapter.clone(), *s))
            .collect();
        let mean = mean(&scores);
        let std_dev = std_dev(&scores, mean);
        let outliers = if std_dev > 0.0 {
            let floor = mean - self.config.outlier_sigma * std_dev;
            per_adapter
                .iter()
                .filter(|(_, s)| **s < floor)
                .map(|(id, _)| id.clone())
                .collect()
        } else {
            Vec::new()
        };

        let diagnostic = ConvergenceDiagnostic {
            chamber: pulse.chamber,
            turn_index: pulse.turn_index,
            mean_convergence: mean,
            total_adapters: pulse.outcomes.len(),
            errored,
            method,
            std_dev,
            outliers,
            pressure,
            felt_pressure: records
                .iter()
                .map(|r| (r.adapter.clone(), extract_pressure(r)))
                .collect(),
            signals: records
                .iter()
                .map(|r| (r.adapter.clone(), self.families.extract(&r.raw_response)))
                .collect(),
            snippets: records
                .iter()
                .map(|r| (r.adapter.clone(), snippet(&r.raw_response, self.config.snippet_chars)))
                .collect(),
            per_adapter,
        };
        tracing::info!(
            chamber = %diagnostic.chamber,
            mean = diagnostic.mean_convergence,
            method = ?diagnostic.method,
            successful = diagnostic.successful(),
            total = diagnostic.total_adapters,
            "convergence scored"
        );
        diagnostic
    }

    /// 按输入顺序返回每段文本的分数，均在 [0, 1]
    pub fn score_texts(&self, texts: &[&str]) -> (Vec<f64>, ScoringMethod) {
        match texts.len() {
            0 => return (Vec::new(), ScoringMethod::Empty),
            1 => return (vec![1.0], ScoringMethod::Trivial),
            _ => {}
        }

        let vectorizer = TfidfVectorizer::new(self.config.tfidf.clone());
        match vectorizer.fit_transform(texts) {
            Ok(vectors) => {
                let m = similarity_matrix(&vectors);
                tracing::debug!(?m, "similarity matrix");
                (mean_of_others(&m), ScoringMethod::Tfidf)
            }
            Err(e) => {
                tracing::warn!("TF-IDF failed ({}), using signal-overlap fallback", e);
                (self.signal_overlap(texts), ScoringMethod::SignalOverlap)
            }
        }
    }

    fn signal_overlap(&self, texts: &[&str]) -> Vec<f64> {
        let keys: Vec<BTreeSet<&'static str>> = texts
            .iter()
            .map(|t| self.families.extract(t).true_keys())
            .collect();
        (0..keys.len())
            .map(|i| {
                let shared: Vec<f64> = (0..keys.len())
                    .filter(|j| *j != i)
                    .filter_map(|j| {
                        let union = keys[i].union(&keys[j]).count();
                        (union > 0)
                            .then(|| keys[i].intersection(&keys[j]).count() as f64 / union as f64)
                    })
                    .collect();
                mean(&shared)
            })
            .collect()
    }
}

fn mean_of_others(m: &[Vec<f64>]) -> Vec<f64> {
    let n = m.len();
    (0..n)
        .map(|i| {
            let others: Vec<f64> = (0..n).filter(|j| *j != i).map(|j| m[i][j]).collect();
            mean(&others)
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
