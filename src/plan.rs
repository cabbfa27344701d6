//! 会话计划文件（TOML）
//!
//! ```toml
//! session_id = "IRIS_RINGS_001"
//!
//! [[mirrors]]
//! id = "claude"
//! adapter = "anthropic"
//! group = "A"
//!
//! [[chambers]]
//! id = "S2"
//! seed = "Hold: '{phrase}'. Three breaths."
//! [chambers.variants]
//! claude = "precise and present"
//! [chambers.group_variants]
//! B = "quiet and exact"
//! [chambers.gate]
//! min_convergence = 0.7
//! ```
//!
//! Chamber 顺序即计划中的书写顺序；省略 seed 时使用内置种子。

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::adapters::MirrorSpec;
use crate::chamber::{ChamberId, ChamberSpec, Participant, PromptBook, SYSTEM_PROMPT};
use crate::config::GateOverride;
use crate::core::{AdapterIdentity, IrisError};

/// 计划中的单个 Chamber
#[derive(Debug, Clone, Deserialize)]
pub struct PlanChamber {
    pub id: ChamberId,
    pub seed: Option<String>,
    #[serde(default)]
    pub variants: HashMap<String, String>,
    #[serde(default)]
    pub group_variants: HashMap<String, String>,
    pub max_tokens: Option<u32>,
    pub gate: Option<GateOverride>,
}

/// 会话计划
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPlan {
    pub session_id: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<MirrorSpec>,
    #[serde(default)]
    pub chambers: Vec<PlanChamber>,
}

impl SessionPlan {
    pub fn load(path: &Path) -> Result<Self, IrisError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IrisError::Plan(format!("reading {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, IrisError> {
        let plan: SessionPlan =
            toml::from_str(raw).map_err(|e| IrisError::Plan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), IrisError> {
        let mut chambers = HashSet::new();
        for c in &self.chambers {
            if !chambers.insert(c.id) {
                return Err(IrisError::Plan(format!("chamber {} listed twice", c.id)));
            }
        }
        let mut mirrors = HashSet::new();
        for m in &self.mirrors {
            if !mirrors.insert(m.id.as_str()) {
                return Err(IrisError::Plan(format!("mirror id {} listed twice", m.id)));
            }
        }
        Ok(())
    }

    /// 计划定义的 Chamber 序列；为空表示沿用配置
    pub fn sequence(&self) -> Vec<ChamberId> {
        self.chambers.iter().map(|c| c.id).collect()
    }

    pub fn chamber_specs(&self, default_max_tokens: u32) -> Vec<ChamberSpec> {
        self.chambers
            .iter()
            .map(|c| ChamberSpec {
                id: c.id,
                seed: c
                    .seed
                    .clone()
                    .unwrap_or_else(|| c.id.default_seed().to_string()),
                variants: c.variants.clone(),
                group_variants: c.group_variants.clone(),
                max_tokens: c.max_tokens.unwrap_or(default_max_tokens),
            })
            .collect()
    }

    pub fn gate_overrides(&self) -> HashMap<ChamberId, GateOverride> {
        self.chambers
            .iter()
            .filter_map(|c| c.gate.clone().map(|g| (c.id, g)))
            .collect()
    }

    /// 为给定镜像解析提示簿；sequence 中不在计划里的 Chamber 使用内置种子
    pub fn prompt_book(
        &self,
        mirrors: &[MirrorSpec],
        sequence: &[ChamberId],
        default_max_tokens: u32,
    ) -> Result<PromptBook, IrisError> {
        let mut specs = self.chamber_specs(default_max_tokens);
        for id in sequence {
            if !specs.iter().any(|s| s.id == *id) {
                specs.push(ChamberSpec {
                    max_tokens: default_max_tokens,
                    ..ChamberSpec::builtin(*id)
                });
            }
        }
        let identities: Vec<AdapterIdentity> = mirrors.iter().map(|m| m.identity()).collect();
        let participants: Vec<Participant<'_>> = mirrors
            .iter()
            .zip(&identities)
            .map(|(m, id)| Participant {
                identity: id,
                mirror_id: m.id.as_str(),
                group: m.group.as_deref(),
            })
            .collect();
        PromptBook::build(
            sequence,
            &specs,
            self.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT),
            &participants,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterKind, AdapterPort};

    const PLAN: &str = r#"
        session_id = "IRIS_PLAN"

        [[mirrors]]
        id = "claude"
        adapter = "mock"
        identity = "mock/claude"
        group = "A"

        [[mirrors]]
        id = "gpt"
        adapter = "mock"
        identity = "mock/gpt"
        group = "B"

        [[chambers]]
        id = "S1"

        [[chambers]]
        id = "S2"
        seed = "Hold: '{phrase}'."
        max_tokens = 900
        [chambers.variants]
        claude = "precise and present"
        [chambers.group_variants]
        B = "quiet and exact"
        [chambers.gate]
        min_convergence = 0.7
    "#;

    #[test]
    fn test_parse_plan() {
        let plan = SessionPlan::parse(PLAN).unwrap();
        assert_eq!(plan.session_id.as_deref(), Some("IRIS_PLAN"));
        assert_eq!(plan.mirrors[0].adapter, AdapterKind::Mock);
        assert_eq!(plan.sequence(), vec![ChamberId::S1, ChamberId::S2]);
        let overrides = plan.gate_overrides();
        assert_eq!(overrides[&ChamberId::S2].min_convergence, Some(0.7));
        assert!(!overrides.contains_key(&ChamberId::S1));
    }

    #[test]
    fn test_plan_prompt_variants() {
        let plan = SessionPlan::parse(PLAN).unwrap();
        let book = plan.prompt_book(&plan.mirrors, &plan.sequence(), 2000).unwrap();
        let claude = book.get(ChamberId::S2, &"mock/claude".into()).unwrap();
        assert_eq!(claude.user, "Hold: 'precise and present'.");
        assert_eq!(claude.max_tokens, 900);
        let gpt = book.get(ChamberId::S2, &"mock/gpt".into()).unwrap();
        assert_eq!(gpt.user, "Hold: 'quiet and exact'.");
        let s1 = book.get(ChamberId::S1, &"mock/gpt".into()).unwrap();
        assert_eq!(s1.user, ChamberId::S1.default_seed());
    }

    #[test]
    fn test_duplicate_chamber_rejected() {
        let raw = r#"
            [[chambers]]
            id = "S1"
            [[chambers]]
            id = "S1"
        "#;
        assert!(matches!(SessionPlan::parse(raw), Err(IrisError::Plan(_))));
    }

    #[test]
    fn test_overridden_identity_gets_prompts() {
        let raw = r#"
            [[mirrors]]
            id = "local"
            adapter = "ollama"
            model = "qwen3:1.7b"
            identity = "local/qwen"
            group = "B"

            [[chambers]]
            id = "S1"
        "#;
        let plan = SessionPlan::parse(raw).unwrap();
        let settings = crate::config::AdaptersSection {
            max_retries: 0,
            ollama_host: Some("http://127.0.0.1:11434".into()),
            ..Default::default()
        };
        let adapter = crate::adapters::create_adapter(&plan.mirrors[0], &settings).unwrap();
        assert_eq!(adapter.identity().as_str(), "local/qwen");

        let book = plan.prompt_book(&plan.mirrors, &plan.sequence(), 2000).unwrap();
        assert!(book.get(ChamberId::S1, adapter.identity()).is_some());
        assert!(book.get(ChamberId::S1, &"ollama/qwen3:1.7b".into()).is_none());
    }
}
