//! 分层 Markdown 报告：每个 Chamber 的门控状态、分数、压力、信号覆盖、范例与失败原因

use std::fmt::Write;

use crate::analysis::PressureCompliance;
use crate::core::SessionState;

pub fn render_report(state: &SessionState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Session {}\n", state.session_id);
    let _ = writeln!(out, "- status: **{}**", state.status);
    if let Some(failure) = &state.failure {
        let _ = writeln!(out, "- failure: {failure}");
    }
    let _ = writeln!(out, "- attempt: {}", state.attempt);
    let _ = writeln!(
        out,
        "- chambers: {}",
        state.chambers.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" → ")
    );
    let _ = writeln!(
        out,
        "- mirrors: {}",
        state.adapters.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
    );
    let _ = writeln!(out, "- pressure: {:.2}\n", state.pressure);

    let _ = writeln!(out, "## Gate summary\n");
    let _ = writeln!(out, "| Chamber | Gate | Mean | Passing | Method |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    for d in &state.decisions {
        let _ = writeln!(
            out,
            "| {} | {} | {:.3} | {}/{} | {:?} |",
            d.chamber,
            if d.pass { "PASS" } else { "FAIL" },
            d.diagnostic.mean_convergence,
            d.adapters_passing,
            d.diagnostic.total_adapters,
            d.diagnostic.method
        );
    }

    if !state.pressure_trail.is_empty() {
        let _ = writeln!(out, "\n## Pressure\n");
        let _ = writeln!(out, "| Chamber | Pressure |");
        let _ = writeln!(out, "|---|---|");
        for (chamber, p) in &state.pressure_trail {
            let _ = writeln!(out, "| {chamber} | {p:.2} |");
        }
    }

    for d in &state.decisions {
        let _ = writeln!(out, "\n## {} ({})\n", d.chamber, if d.pass { "pass" } else { "fail" });
        let _ = writeln!(out, "| Mirror | Score | Felt pressure | Geometry | Motion | Attractor |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for (id, score) in &d.diagnostic.per_adapter {
            let felt = match d.pressure_compliance.get(id) {
                Some(PressureCompliance::Within(v)) => format!("{v:.1}"),
                Some(PressureCompliance::Exceeded(v)) => format!("{v:.1} ⚠"),
                _ => "-".to_string(),
            };
            let s = d.diagnostic.signals.get(id).copied().unwrap_or_default();
            let mark = |b: bool| if b { "✓" } else { "" };
            let _ = writeln!(
                out,
                "| {id} | {score:.3} | {felt} | {} | {} | {} |",
                mark(s.geometry),
                mark(s.motion),
                mark(s.attractor)
            );
        }
        for id in &d.diagnostic.errored {
            let _ = writeln!(out, "| {id} | error | - | | | |");
        }
        if let Some(a) = &d.attractor {
            let _ = writeln!(
                out,
                "\nAttractor signature: {}/{} ({:.0}%), need {}",
                a.count,
                d.diagnostic.successful(),
                a.rate * 100.0,
                a.required
            );
        }
        if !d.diagnostic.outliers.is_empty() {
            let names: Vec<&str> = d.diagnostic.outliers.iter().map(|o| o.as_str()).collect();
            let _ = writeln!(out, "\nOutliers: {}", names.join(", "));
        }
        if !d.exemplars.is_empty() {
            let _ = writeln!(out, "\nExemplars:\n");
            for e in &d.exemplars {
                let _ = writeln!(out, "- {} ({:.2}): {}", e.adapter, e.score, e.snippet);
            }
        }
        if !d.reasons.is_empty() {
            let _ = writeln!(out, "\nReasons:\n");
            for r in &d.reasons {
                let _ = writeln!(out, "- {r}");
            }
        }
    }

    if !state.adapter_errors.is_empty() {
        let _ = writeln!(out, "\n## Adapter errors\n");
        for e in &state.adapter_errors {
            let _ = writeln!(out, "- {} {} turn {}: {} ({})", e.chamber, e.adapter, e.turn_index, e.kind, e.message);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chamber::ChamberId;
    use crate::core::{SessionFailure, SessionStatus};

    #[test]
    fn test_report_mentions_status_and_failure() {
        let mut state = SessionState::new("IRIS_r", vec![ChamberId::S1], vec!["mock/a".into()]);
        state.transition(SessionStatus::Running);
        state.fail(SessionFailure::NoAdapters);
        let report = render_report(&state);
        assert!(report.contains("# Session IRIS_r"));
        assert!(report.contains("**failed**"));
        assert!(report.contains("no adapters registered"));
    }
}
