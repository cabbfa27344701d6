//! 文件 vault
//!
//! 布局：
//! - `scrolls/<session>/<adapter-slug>/<chamber>.md`：头信息 + 原始回应
//! - `meta/<session>_<adapter-slug>_<chamber>.json`：完整 TurnRecord
//! - `session_<session>.json`：SessionState
//! - `report_<session>.md`：分层报告

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs;

use crate::chamber::ChamberId;
use crate::core::{AdapterIdentity, SessionState, TurnRecord};
use crate::vault::{render_report, PersistenceSink};

pub struct VaultSink {
    root: PathBuf,
    session_id: String,
}

impl VaultSink {
    pub fn new(root: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            session_id: session_id.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scroll_path(&self, adapter: &AdapterIdentity, chamber: ChamberId) -> PathBuf {
        self.root
            .join("scrolls")
            .join(&self.session_id)
            .join(adapter.slug())
            .join(format!("{chamber}.md"))
    }

    pub fn meta_path(&self, adapter: &AdapterIdentity, chamber: ChamberId) -> PathBuf {
        self.root.join("meta").join(format!(
            "{}_{}_{}.json",
            self.session_id,
            adapter.slug(),
            chamber
        ))
    }

    pub fn session_path(&self) -> PathBuf {
        session_file(&self.root, &self.session_id)
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(format!("report_{}.md", self.session_id))
    }
}

fn session_file(root: &Path, session_id: &str) -> PathBuf {
    root.join(format!("session_{session_id}.json"))
}

async fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

fn render_scroll(record: &TurnRecord) -> String {
    let mut out = format!(
        "# {} · {} · turn {}\n\n",
        record.adapter, record.chamber, record.turn_index
    );
    out.push_str(&format!("- seal: `{}`\n", record.seal));
    out.push_str(&format!("- timestamp: {}\n", record.timestamp.to_rfc3339()));
    if let Some(condition) = &record.metadata.condition {
        out.push_str(&format!("- condition: {condition}\n"));
    }
    if let Some(p) = record.metadata.felt_pressure {
        out.push_str(&format!("- felt_pressure: {p}\n"));
    }
    out.push_str("\n---\n\n");
    out.push_str(record.raw_response.trim());
    out.push('\n');
    out
}

#[async_trait]
impl PersistenceSink for VaultSink {
    async fn write_turn(
        &self,
        adapter: &AdapterIdentity,
        chamber: ChamberId,
        record: &TurnRecord,
    ) -> anyhow::Result<()> {
        write_file(&self.scroll_path(adapter, chamber), &render_scroll(record)).await?;
        let meta = serde_json::to_string_pretty(record)?;
        write_file(&self.meta_path(adapter, chamber), &meta).await?;
        tracing::debug!(%adapter, %chamber, "turn persisted");
        Ok(())
    }

    async fn write_session_summary(&self, state: &SessionState) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_file(&self.session_path(), &json).await?;
        write_file(&self.report_path(), &render_report(state)).await?;
        tracing::info!(
            session = %state.session_id,
            path = %self.session_path().display(),
            "session summary written"
        );
        Ok(())
    }
}

/// 读取已保存的会话（用于 resume）
pub async fn load_session(root: &Path, session_id: &str) -> anyhow::Result<SessionState> {
    let path = session_file(root, session_id);
    let raw = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
