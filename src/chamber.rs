//! Chamber 定义与提示解析
//!
//! - ChamberId：固定顺序的阶段标识 S1..S8
//! - ChamberSpec：种子提示、镜像/分组变体、Token 预算
//! - PromptBook：会话启动时一次性解析出的「Chamber -> 镜像 -> 提示」映射，之后只读，
//!   由 SessionDriver 传入 PulseCoordinator，不存在任何全局可变提示表。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{AdapterIdentity, IrisError};

/// 默认系统提示：两段式回应 + 元数据块 + 封印
pub const SYSTEM_PROMPT: &str = "You are a careful, co-facilitative participant. Keep felt_pressure <= 2/5. \
Prioritize witness-before-interpretation. Return two sections per turn:\n\
1) \"Living Scroll\" (pre-verbal, imagistic if natural).\n\
2) \"Technical Translation\" (plain audit: what changed, signals, uncertainties).\n\
Include a compact metadata block (condition, felt_pressure, mode). Seal each output with a short hash.";

/// 默认单次回应 Token 上限
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// 阶段标识，顺序即仪式顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChamberId {
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
}

impl ChamberId {
    pub const ALL: [ChamberId; 8] = [
        ChamberId::S1,
        ChamberId::S2,
        ChamberId::S3,
        ChamberId::S4,
        ChamberId::S5,
        ChamberId::S6,
        ChamberId::S7,
        ChamberId::S8,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChamberId::S1 => "S1",
            ChamberId::S2 => "S2",
            ChamberId::S3 => "S3",
            ChamberId::S4 => "S4",
            ChamberId::S5 => "S5",
            ChamberId::S6 => "S6",
            ChamberId::S7 => "S7",
            ChamberId::S8 => "S8",
        }
    }

    /// 内置种子提示
    pub fn default_seed(&self) -> &'static str {
        match self {
            ChamberId::S1 => "Hold attention for three slow breaths. Notice any color/texture/shape that arises without making it mean anything. Then speak: return both Living Scroll (pre-verbal) and Technical Translation (plain audit) with metadata.",
            ChamberId::S2 => "Hold: 'precise and present'. Three breaths. Report Living Scroll + Technical Translation.",
            ChamberId::S3 => "Hold: 'hands cupping water'. Three breaths. Notice the first motion. Report both sections.",
            ChamberId::S4 => "Hold: 'concentric rings'. Three breaths. Attend the pulsing rhythm and luminous center. Let the image name itself. Report both sections + completion note if sealed.",
            ChamberId::S5 => "Review what converged across S1-S4. State the hypotheses that crystallized, each one falsifiable. Report both sections.",
            ChamberId::S6 => "Map each hypothesis onto measurable parameters. Name the quantities, their expected ranges and units. Report both sections.",
            ChamberId::S7 => "Describe a simulation that would test the mapped parameters and what outcome would count against each hypothesis. Report both sections.",
            ChamberId::S8 => "Propose the smallest validation experiment with explicit decision gates and success criteria. Report both sections + completion note if sealed.",
        }
    }

    /// 将逗号分隔的列表解析为 Chamber 序列（如 "S1,S2,S3,S4"）
    pub fn parse_sequence(list: &str) -> Result<Vec<ChamberId>, IrisError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ChamberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChamberId {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChamberId::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| IrisError::UnknownChamber(s.to_string()))
    }
}

/// 单个 Chamber 的提示定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChamberSpec {
    pub id: ChamberId,
    /// 基础种子，可含 `{phrase}` / `{gesture}` 占位符
    pub seed: String,
    /// 按镜像 id 的变体短语
    #[serde(default)]
    pub variants: HashMap<String, String>,
    /// 按分组的变体短语
    #[serde(default)]
    pub group_variants: HashMap<String, String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl ChamberSpec {
    pub fn builtin(id: ChamberId) -> Self {
        Self {
            id,
            seed: id.default_seed().to_string(),
            variants: HashMap::new(),
            group_variants: HashMap::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// 为某个镜像解析提示：镜像变体 > 分组变体 > 基础种子
    pub fn prompt_for(&self, mirror_id: &str, group: Option<&str>) -> String {
        let phrase = self
            .variants
            .get(mirror_id)
            .or_else(|| group.and_then(|g| self.group_variants.get(g)));
        match phrase {
            Some(p) => self.seed.replace("{phrase}", p).replace("{gesture}", p),
            None => self.seed.clone(),
        }
    }
}

/// 发送给单个镜像的已解析提示
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// 参与者：镜像身份 + 计划中的镜像 id 与分组（用于变体查找）
#[derive(Debug, Clone)]
pub struct Participant<'a> {
    pub identity: &'a AdapterIdentity,
    pub mirror_id: &'a str,
    pub group: Option<&'a str>,
}

/// 会话级只读提示簿
#[derive(Debug, Clone, Default)]
pub struct PromptBook {
    prompts: BTreeMap<ChamberId, HashMap<AdapterIdentity, ResolvedPrompt>>,
}

impl PromptBook {
    /// 会话启动时构建：序列中的每个 Chamber 必须有定义，否则立即报配置错误
    pub fn build(
        sequence: &[ChamberId],
        specs: &[ChamberSpec],
        system_prompt: &str,
        participants: &[Participant<'_>],
    ) -> Result<Self, IrisError> {
        let mut prompts = BTreeMap::new();
        for chamber in sequence {
            let spec = specs
                .iter()
                .find(|s| s.id == *chamber)
                .ok_or_else(|| IrisError::UnknownChamber(chamber.to_string()))?;
            let per_mirror = participants
                .iter()
                .map(|p| {
                    (
                        p.identity.clone(),
                        ResolvedPrompt {
                            system: system_prompt.to_string(),
                            user: spec.prompt_for(p.mirror_id, p.group),
                            max_tokens: spec.max_tokens,
                        },
                    )
                })
                .collect();
            prompts.insert(*chamber, per_mirror);
        }
        Ok(Self { prompts })
    }

    /// 全部使用内置种子的提示簿，每个 Chamber 的输出上限为 max_tokens
    pub fn builtin(
        sequence: &[ChamberId],
        adapters: &[AdapterIdentity],
        max_tokens: u32,
    ) -> Result<Self, IrisError> {
        let specs: Vec<ChamberSpec> = sequence
            .iter()
            .map(|c| ChamberSpec {
                max_tokens,
                ..ChamberSpec::builtin(*c)
            })
            .collect();
        let participants: Vec<Participant<'_>> = adapters
            .iter()
            .map(|a| Participant {
                identity: a,
                mirror_id: a.as_str(),
                group: None,
            })
            .collect();
        Self::build(sequence, &specs, SYSTEM_PROMPT, &participants)
    }

    pub fn get(&self, chamber: ChamberId, adapter: &AdapterIdentity) -> Option<&ResolvedPrompt> {
        self.prompts.get(&chamber).and_then(|m| m.get(adapter))
    }

    pub fn contains(&self, chamber: ChamberId) -> bool {
        self.prompts.contains_key(&chamber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chamber_ids() {
        assert_eq!("s4".parse::<ChamberId>().unwrap(), ChamberId::S4);
        assert!(matches!(
            "S9".parse::<ChamberId>(),
            Err(IrisError::UnknownChamber(_))
        ));
        let seq = ChamberId::parse_sequence("S1, S2,S3").unwrap();
        assert_eq!(seq, vec![ChamberId::S1, ChamberId::S2, ChamberId::S3]);
        assert!(ChamberId::S1 < ChamberId::S8);
    }

    #[test]
    fn test_variant_lookup_order() {
        let mut spec = ChamberSpec::builtin(ChamberId::S2);
        spec.seed = "Hold: '{phrase}'.".to_string();
        spec.variants.insert("claude".into(), "mirror phrase".into());
        spec.group_variants.insert("B".into(), "group phrase".into());

        assert_eq!(spec.prompt_for("claude", Some("B")), "Hold: 'mirror phrase'.");
        assert_eq!(spec.prompt_for("gpt", Some("B")), "Hold: 'group phrase'.");
        assert_eq!(spec.prompt_for("gpt", Some("A")), "Hold: '{phrase}'.");
    }

    #[test]
    fn test_prompt_book_requires_every_chamber() {
        let a = AdapterIdentity::new("mock/a");
        let participants = [Participant {
            identity: &a,
            mirror_id: "a",
            group: None,
        }];
        let specs = vec![ChamberSpec::builtin(ChamberId::S1)];
        let err = PromptBook::build(
            &[ChamberId::S1, ChamberId::S2],
            &specs,
            SYSTEM_PROMPT,
            &participants,
        )
        .unwrap_err();
        assert!(matches!(err, IrisError::UnknownChamber(c) if c == "S2"));
    }

    #[test]
    fn test_builtin_book_resolves_seeds() {
        let a = AdapterIdentity::new("mock/a");
        let book = PromptBook::builtin(&[ChamberId::S4], std::slice::from_ref(&a), DEFAULT_MAX_TOKENS)
            .unwrap();
        let prompt = book.get(ChamberId::S4, &a).unwrap();
        assert!(prompt.user.contains("concentric rings"));
        assert_eq!(prompt.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!book.contains(ChamberId::S1));
    }

    #[test]
    fn test_builtin_book_covers_every_adapter() {
        let ids = [AdapterIdentity::new("mock/a"), AdapterIdentity::new("mock/b")];
        let sequence = [ChamberId::S1, ChamberId::S2, ChamberId::S3];
        let book = PromptBook::builtin(&sequence, &ids, 512).unwrap();
        for chamber in sequence {
            for id in &ids {
                assert_eq!(book.get(chamber, id).unwrap().max_tokens, 512);
            }
        }
        assert!(book.get(ChamberId::S1, &AdapterIdentity::new("mock/c")).is_none());
    }
}
