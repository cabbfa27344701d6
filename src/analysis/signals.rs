//! 信号提取：几何 / 运动 / 吸引子关键词族与自报压力
//!
//! 纯函数，无 I/O。关键词族是数据而非逻辑，可由配置 `[signals]` 覆盖；
//! 判定规则只有「小写化后子串包含」一种。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::TurnRecord;

/// 关键词族（可配置）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordFamilies {
    pub geometry: Vec<String>,
    pub motion: Vec<String>,
    pub rhythm: Vec<String>,
    pub center: Vec<String>,
    pub aperture: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordFamilies {
    fn default() -> Self {
        Self {
            geometry: words(&[
                "ring", "concentric", "aperture", "iris", "circle", "well", "opening", "oval",
                "core", "center",
            ]),
            motion: words(&[
                "pulse", "pulsing", "ripple", "breathe", "dilate", "dilation", "contract",
                "contraction", "wave", "thrum", "expand", "reciprocal",
            ]),
            rhythm: words(&[
                "rhythm", "pulsing", "reciprocal", "pulse", "waves", "thrum", "steady pulse",
                "ripples",
            ]),
            center: words(&[
                "luminous", "core", "center", "steady", "anchor", "still point", "beacon",
                "glow", "holds",
            ]),
            aperture: words(&[
                "aperture", "opening", "widening", "soften", "inviting", "bloom",
                "breathing open", "dilate", "expansion", "pull",
            ]),
        }
    }
}

impl KeywordFamilies {
    /// 对一段文本求信号集
    pub fn extract(&self, text: &str) -> SignalSet {
        let t = text.to_lowercase();
        let any = |family: &[String]| family.iter().any(|k| t.contains(&k.to_lowercase()));

        let attractor_rhythm = any(&self.rhythm);
        let attractor_center = any(&self.center);
        let attractor_aperture = any(&self.aperture);
        SignalSet {
            geometry: any(&self.geometry),
            motion: any(&self.motion),
            attractor_rhythm,
            attractor_center,
            attractor_aperture,
            attractor: attractor_rhythm && attractor_center && attractor_aperture,
        }
    }
}

/// 单条回应的信号标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    pub geometry: bool,
    pub motion: bool,
    pub attractor_rhythm: bool,
    pub attractor_center: bool,
    pub attractor_aperture: bool,
    /// rhythm && center && aperture
    pub attractor: bool,
}

impl SignalSet {
    /// 为真的标志名集合（Jaccard 回退使用）
    pub fn true_keys(&self) -> BTreeSet<&'static str> {
        [
            ("geometry", self.geometry),
            ("motion", self.motion),
            ("attractor_rhythm", self.attractor_rhythm),
            ("attractor_center", self.attractor_center),
            ("attractor_aperture", self.attractor_aperture),
            ("attractor", self.attractor),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.then_some(k))
        .collect()
    }
}

fn default_families() -> &'static KeywordFamilies {
    static FAMILIES: OnceLock<KeywordFamilies> = OnceLock::new();
    FAMILIES.get_or_init(KeywordFamilies::default)
}

/// 用内置关键词族提取信号
pub fn extract_signals(text: &str) -> SignalSet {
    default_families().extract(text)
}

fn pressure_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)felt_pressure[:\s]+(\d+\.?\d*)").ok())
        .as_ref()
}

/// 从正文中解析 `felt_pressure: 1.5`；数值按原样返回，不做缩放
pub fn extract_pressure_from_text(text: &str) -> Option<f64> {
    pressure_regex()?
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 自报压力：结构化元数据优先，其次正文；都没有时为 None
pub fn extract_pressure(record: &TurnRecord) -> Option<f64> {
    record
        .metadata
        .felt_pressure
        .or_else(|| extract_pressure_from_text(&record.raw_response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chamber::ChamberId;

    #[test]
    fn test_attractor_requires_all_three() {
        let s = extract_signals("The aperture widens with a steady pulsing rhythm from the luminous core");
        assert!(s.geometry);
        assert!(s.motion);
        assert!(s.attractor_rhythm && s.attractor_center && s.attractor_aperture);
        assert!(s.attractor);

        let s = extract_signals("A RHYTHM around a luminous center");
        assert!(s.attractor_rhythm && s.attractor_center);
        assert!(!s.attractor_aperture);
        assert!(!s.attractor);
    }

    #[test]
    fn test_no_signals() {
        let s = extract_signals("My favorite color is purple");
        assert_eq!(s, SignalSet::default());
        assert!(s.true_keys().is_empty());
    }

    #[test]
    fn test_custom_families() {
        let families = KeywordFamilies {
            geometry: vec!["Spiral".into()],
            ..KeywordFamilies::default()
        };
        assert!(families.extract("a slow spiral").geometry);
        assert!(!families.extract("a ring").geometry);
    }

    #[test]
    fn test_pressure_from_text_is_not_rescaled() {
        assert_eq!(extract_pressure_from_text("Felt_Pressure: 1.5/5"), Some(1.5));
        assert_eq!(extract_pressure_from_text("felt_pressure 7"), Some(7.0));
        assert_eq!(extract_pressure_from_text("pressure was low"), None);
    }

    #[test]
    fn test_metadata_pressure_preferred() {
        let record = TurnRecord::new("mock/a".into(), ChamberId::S1, 1, "felt_pressure: 4")
            .unwrap()
            .with_felt_pressure(1.0);
        assert_eq!(extract_pressure(&record), Some(1.0));

        let record = TurnRecord::new("mock/a".into(), ChamberId::S1, 1, "felt_pressure: 4").unwrap();
        assert_eq!(extract_pressure(&record), Some(4.0));
    }
}
