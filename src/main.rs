//! IRIS Gate 命令行入口
//!
//! 加载配置与计划、注册镜像、运行（或恢复）会话；completed / paused 退出码 0，failed 退出码 1。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use iris_gate::adapters::{create_adapter, detect_mirrors, AdapterKind, AdapterPort, MirrorSpec};
use iris_gate::chamber::ChamberId;
use iris_gate::config::load_config;
use iris_gate::core::{new_session_id, SessionDriver, SessionState, SessionStatus, ShutdownManager};
use iris_gate::observability;
use iris_gate::plan::SessionPlan;
use iris_gate::vault::{load_session, VaultSink};

const USAGE: &str = "usage: iris [--config <path>] [--plan <path>] [--chambers S1,S2,...] \
[--mirrors anthropic,ollama:qwen3:1.7b,...] [--vault <dir>] [--session <id>] [--resume <id>] [--mock]";

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    plan: Option<PathBuf>,
    chambers: Option<Vec<ChamberId>>,
    mirrors: Option<Vec<MirrorSpec>>,
    vault: Option<PathBuf>,
    session: Option<String>,
    resume: Option<String>,
    mock: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| anyhow!("missing value for {name}"))
        };
        match arg.as_str() {
            "--config" => cli.config = Some(PathBuf::from(value("--config")?)),
            "--plan" => cli.plan = Some(PathBuf::from(value("--plan")?)),
            "--chambers" => cli.chambers = Some(ChamberId::parse_sequence(&value("--chambers")?)?),
            "--mirrors" => {
                let list = value("--mirrors")?;
                cli.mirrors = Some(
                    list.split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(MirrorSpec::parse)
                        .collect::<Result<_, _>>()?,
                );
            }
            "--vault" => cli.vault = Some(PathBuf::from(value("--vault")?)),
            "--session" => cli.session = Some(value("--session")?),
            "--resume" => cli.resume = Some(value("--resume")?),
            "--mock" => cli.mock = true,
            other => return Err(anyhow!("unknown argument: {other}. {USAGE}")),
        }
    }
    Ok(cli)
}

fn mock_mirrors() -> Vec<MirrorSpec> {
    ["mock/alpha", "mock/beta", "mock/gamma"]
        .into_iter()
        .map(|id| {
            let mut spec = MirrorSpec::new(AdapterKind::Mock, None);
            spec.id = id.to_string();
            spec.identity = Some(id.to_string());
            spec
        })
        .collect()
}

fn print_summary(state: &SessionState) {
    println!("session {} -> {}", state.session_id, state.status);
    for d in &state.decisions {
        println!(
            "  {} {} mean={:.3} passing={}/{}",
            d.chamber,
            if d.pass { "PASS" } else { "FAIL" },
            d.diagnostic.mean_convergence,
            d.adapters_passing,
            d.diagnostic.total_adapters
        );
        for reason in &d.reasons {
            println!("      - {reason}");
        }
    }
    if let Some(failure) = &state.failure {
        println!("  failure: {failure}");
    }
}

async fn run() -> Result<SessionState> {
    let cli = parse_args(std::env::args().skip(1))?;
    let config = load_config(cli.config.clone()).context("Failed to load config")?;
    let plan = cli
        .plan
        .as_deref()
        .map(SessionPlan::load)
        .transpose()
        .context("Failed to load plan")?;

    let chambers = cli
        .chambers
        .clone()
        .or_else(|| plan.as_ref().map(|p| p.sequence()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| config.session.chambers.clone());

    let mirrors = if cli.mock {
        mock_mirrors()
    } else if let Some(m) = cli.mirrors.clone() {
        m
    } else if let Some(p) = plan.as_ref().filter(|p| !p.mirrors.is_empty()) {
        p.mirrors.clone()
    } else {
        detect_mirrors()
    };
    if mirrors.is_empty() {
        tracing::warn!("no mirrors configured and no API keys found");
    }

    let adapters: Vec<Arc<dyn AdapterPort>> = mirrors
        .iter()
        .map(|m| create_adapter(m, &config.adapters))
        .collect::<Result<_, _>>()?;

    let session_id = cli
        .resume
        .clone()
        .or_else(|| cli.session.clone())
        .or_else(|| plan.as_ref().and_then(|p| p.session_id.clone()))
        .unwrap_or_else(|| new_session_id(&config.app.session_prefix));
    let vault_dir = cli.vault.clone().unwrap_or_else(|| config.app.vault_dir.clone());
    let sink = Arc::new(VaultSink::new(&vault_dir, &session_id));

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut driver = SessionDriver::new(config.clone(), adapters)
        .with_sink(sink)
        .with_cancellation(shutdown.token());
    if let Some(plan) = &plan {
        let book = plan.prompt_book(&mirrors, &chambers, config.adapters.max_tokens)?;
        driver = driver
            .with_prompts(Arc::new(book))
            .with_gate_overrides(plan.gate_overrides());
    }

    let state = match &cli.resume {
        Some(id) => {
            let paused = load_session(&vault_dir, id).await?;
            driver.resume(&paused).await?
        }
        None => {
            tracing::info!(session = %session_id, chambers = ?chambers, mirrors = mirrors.len(), "starting session");
            driver.start(&session_id, &chambers).await?
        }
    };
    if let Some(reason) = shutdown.reason() {
        eprintln!("session {reason}");
    }
    Ok(state)
}

#[tokio::main]
async fn main() -> ExitCode {
    observability::init();

    match run().await {
        Ok(state) => {
            print_summary(&state);
            match state.status {
                SessionStatus::Failed => ExitCode::from(1),
                _ => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let cli = parse_args(args(&[
            "--chambers",
            "S1,S4",
            "--mirrors",
            "anthropic,ollama:qwen3:1.7b",
            "--vault",
            "/tmp/v",
        ]))
        .unwrap();
        assert_eq!(cli.chambers, Some(vec![ChamberId::S1, ChamberId::S4]));
        let mirrors = cli.mirrors.unwrap();
        assert_eq!(mirrors[1].model(), "qwen3:1.7b");
        assert_eq!(cli.vault, Some(PathBuf::from("/tmp/v")));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&["--plan"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["--chambers", "S9"])).is_err());
    }

    #[test]
    fn test_mock_mirrors_are_distinct() {
        let ids: Vec<String> = mock_mirrors().iter().map(|m| m.identity().to_string()).collect();
        assert_eq!(ids, vec!["mock/alpha", "mock/beta", "mock/gamma"]);
    }
}
