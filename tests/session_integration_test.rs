//! 会话集成测试：脉冲 -> 评分 -> 门控 -> 暂停 / 恢复 -> vault

use std::sync::Arc;
use std::time::Duration;

use iris_gate::adapters::{AdapterErrorKind, AdapterPort, MockAdapter};
use iris_gate::analysis::ScoringMethod;
use iris_gate::chamber::{ChamberId, PromptBook, DEFAULT_MAX_TOKENS};
use iris_gate::config::AppConfig;
use iris_gate::core::{
    AdapterIdentity, PulseCoordinator, SessionDriver, SessionFailure, SessionStatus,
};
use iris_gate::vault::{load_session, InMemorySink, VaultSink};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ALIGNED: &str = "The aperture widens with a steady pulsing rhythm from the luminous core";
const PURPLE: &str = "My favorite color is purple";
const TAXES: &str = "Tax forms are due in April";

fn mocks(texts: &[&str]) -> Vec<Arc<dyn AdapterPort>> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Arc::new(MockAdapter::replying(format!("mock/{i}"), *t)) as Arc<dyn AdapterPort>)
        .collect()
}

#[tokio::test]
async fn test_divergent_mirror_lowers_convergence() {
    let sink = Arc::new(InMemorySink::new());
    let driver = SessionDriver::new(AppConfig::default(), mocks(&[ALIGNED, ALIGNED, ALIGNED]))
        .with_sink(sink.clone());
    let aligned = driver.start("IRIS_aligned", &[ChamberId::S1]).await.unwrap();

    let mut config = AppConfig::default();
    config.session.pause_on_gate_failure = false;
    let driver = SessionDriver::new(config, mocks(&[ALIGNED, ALIGNED, PURPLE]));
    let mixed = driver.start("IRIS_mixed", &[ChamberId::S1]).await.unwrap();

    let a = &aligned.decisions[0].diagnostic;
    let m = &mixed.decisions[0].diagnostic;
    assert!(a.mean_convergence > 0.8);
    assert_eq!(a.method, ScoringMethod::Tfidf);
    assert!(m.mean_convergence < a.mean_convergence);

    let odd = m.per_adapter[&AdapterIdentity::new("mock/2")];
    assert!(odd < m.per_adapter[&AdapterIdentity::new("mock/0")]);
    assert!(odd < m.per_adapter[&AdapterIdentity::new("mock/1")]);

    for score in a.per_adapter.values().chain(m.per_adapter.values()) {
        assert!((0.0..=1.0).contains(score));
    }
    assert_eq!(sink.turns().len(), 3);
}

#[tokio::test]
async fn test_pause_stops_further_chambers() {
    let sink = Arc::new(InMemorySink::new());
    let driver = SessionDriver::new(AppConfig::default(), mocks(&[ALIGNED, PURPLE, TAXES]))
        .with_sink(sink.clone());
    let state = driver.run("IRIS_paused").await.unwrap();

    assert_eq!(state.status, SessionStatus::Paused);
    assert_eq!(state.decisions.len(), 1);
    assert!(!state.decisions[0].pass);
    assert!(!state.decisions[0].reasons.is_empty());
    assert!(sink.turns().iter().all(|t| t.chamber == ChamberId::S1));
    assert_eq!(sink.turns().len(), 3);

    let summaries = sink.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, SessionStatus::Paused);
}

#[tokio::test]
async fn test_timed_out_mirror_is_counted_but_not_scored() {
    let adapters: Vec<Arc<dyn AdapterPort>> = vec![
        Arc::new(MockAdapter::replying("mock/a", ALIGNED)),
        Arc::new(MockAdapter::replying("mock/b", ALIGNED)),
        Arc::new(
            MockAdapter::replying("mock/slow", ALIGNED)
                .with_delay(Duration::from_millis(500))
                .with_timeout(Duration::from_millis(20)),
        ),
    ];
    let state = SessionDriver::new(AppConfig::default(), adapters)
        .start("IRIS_timeout", &[ChamberId::S1])
        .await
        .unwrap();

    assert_eq!(state.status, SessionStatus::Completed);
    let decision = &state.decisions[0];
    assert!(decision.pass);
    let diag = &decision.diagnostic;
    assert_eq!(diag.total_adapters, 3);
    assert_eq!(diag.successful(), 2);
    assert_eq!(diag.errored, vec![AdapterIdentity::new("mock/slow")]);
    assert!(!diag.per_adapter.contains_key(&AdapterIdentity::new("mock/slow")));

    assert_eq!(state.adapter_errors.len(), 1);
    assert_eq!(state.adapter_errors[0].kind, AdapterErrorKind::Timeout);
}

#[tokio::test]
async fn test_pulse_has_one_outcome_per_mirror() {
    let adapters: Vec<Arc<dyn AdapterPort>> = vec![
        Arc::new(MockAdapter::replying("mock/a", ALIGNED)),
        Arc::new(MockAdapter::failing("mock/b", AdapterErrorKind::RateLimited)),
        Arc::new(MockAdapter::failing("mock/c", AdapterErrorKind::Auth)),
    ];
    let ids: Vec<AdapterIdentity> = adapters.iter().map(|a| a.identity().clone()).collect();
    let book = Arc::new(PromptBook::builtin(&[ChamberId::S3], &ids, DEFAULT_MAX_TOKENS).unwrap());
    let coordinator = PulseCoordinator::new(adapters, book);

    let result = coordinator
        .pulse(ChamberId::S3, 1, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.successes().count(), 1);
    assert_eq!(result.failure_count(), 2);
    assert!(!result.is_exhausted());
}

#[tokio::test]
async fn test_resume_continues_from_failed_chamber() {
    let first = SessionDriver::new(AppConfig::default(), mocks(&[ALIGNED, PURPLE, TAXES]));
    let paused = first.run("IRIS_resume").await.unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);
    assert!(paused.pressure > 0.0);

    let sink = Arc::new(InMemorySink::new());
    let second = SessionDriver::new(AppConfig::default(), mocks(&[ALIGNED, ALIGNED, ALIGNED]))
        .with_sink(sink.clone());
    let resumed = second.resume(&paused).await.unwrap();

    assert_eq!(resumed.status, SessionStatus::Completed);
    assert_eq!(resumed.attempt, paused.attempt + 1);
    assert_eq!(resumed.decisions.len(), 4);
    assert_eq!(resumed.decisions[0].chamber, ChamberId::S1);
    assert!(resumed.decisions.iter().all(|d| d.pass));
    assert_eq!(resumed.turn_counter, paused.turn_counter + 4);
    assert_eq!(sink.turns().len(), 12);
}

#[tokio::test]
async fn test_vault_round_trip_and_resume() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(VaultSink::new(dir.path(), "IRIS_vault"));
    let driver = SessionDriver::new(AppConfig::default(), mocks(&[ALIGNED, PURPLE, TAXES]))
        .with_sink(sink.clone());
    let paused = driver.run("IRIS_vault").await.unwrap();
    assert_eq!(paused.status, SessionStatus::Paused);

    let scroll = sink.scroll_path(&AdapterIdentity::new("mock/1"), ChamberId::S1);
    assert!(std::fs::read_to_string(scroll).unwrap().contains(PURPLE));

    let loaded = load_session(dir.path(), "IRIS_vault").await.unwrap();
    assert_eq!(loaded.status, SessionStatus::Paused);
    assert_eq!(loaded.decisions.len(), 1);

    let driver = SessionDriver::new(AppConfig::default(), mocks(&[ALIGNED, ALIGNED, ALIGNED]))
        .with_sink(sink.clone());
    let done = driver.resume(&loaded).await.unwrap();
    assert_eq!(done.status, SessionStatus::Completed);

    let reloaded = load_session(dir.path(), "IRIS_vault").await.unwrap();
    assert_eq!(reloaded.status, SessionStatus::Completed);
    let report = std::fs::read_to_string(sink.report_path()).unwrap();
    assert!(report.contains("S4"));
}

#[tokio::test]
async fn test_cancellation_fails_with_aborted_pulse() {
    let adapters: Vec<Arc<dyn AdapterPort>> = (0..2)
        .map(|i| {
            Arc::new(
                MockAdapter::replying(format!("mock/{i}"), ALIGNED)
                    .with_delay(Duration::from_secs(5))
                    .with_timeout(Duration::from_secs(10)),
            ) as Arc<dyn AdapterPort>
        })
        .collect();
    let token = CancellationToken::new();
    let driver = SessionDriver::new(AppConfig::default(), adapters).with_cancellation(token.clone());

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let state = driver.start("IRIS_cancel", &[ChamberId::S1, ChamberId::S2]).await.unwrap();
    assert_eq!(state.status, SessionStatus::Failed);
    assert_eq!(
        state.failure,
        Some(SessionFailure::PulseAborted {
            chamber: ChamberId::S1,
            turn_index: 1,
        })
    );
    assert!(state.decisions.is_empty());
}

#[tokio::test]
async fn test_pressure_over_limit_pauses() {
    let mut config = AppConfig::default();
    config.session.pause_on_gate_failure = false;
    config.gate.max_pressure = 0.4;
    let state = SessionDriver::new(config, mocks(&[ALIGNED, PURPLE, TAXES]))
        .run("IRIS_pressure")
        .await
        .unwrap();

    assert_eq!(state.status, SessionStatus::Paused);
    assert_eq!(state.decisions.len(), 1);
    assert!(state.pressure > 0.4);
    assert_eq!(state.pressure_trail[&ChamberId::S1], state.pressure);
}
