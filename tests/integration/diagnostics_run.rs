//! End-to-end fleet diagnostics scenarios.
//!
//! A scripted engine stands in for the fleet tool; every scenario runs the
//! real resolver, dispatcher, and normalizer underneath the facade.

use std::sync::Arc;
use std::time::Duration;

use drover::diagnostics::{HostStatus, RunStatus, Severity};
use drover::engine::EngineAction;
use drover::facade::DiagnosticsRequest;
use drover::Error;

use crate::fixtures::{findings_payload, ScriptedEngine, TestFleet};

fn request(pattern: &str) -> DiagnosticsRequest {
    DiagnosticsRequest {
        pattern: pattern.to_string(),
        ..DiagnosticsRequest::default()
    }
}

/// Test: happy path
/// Given three healthy hosts with findings of mixed severity
/// When diagnostics run across 'all'
/// Then the summary is Completed with per-host entries in target order
#[tokio::test]
async fn test_fleet_diagnostics_happy_path() {
    let fleet = TestFleet::new();
    let engine = Arc::new(
        ScriptedEngine::new()
            .stdout(
                "web1",
                &findings_payload(4, &[("disk/root", "major", "root nearly full")]),
            )
            .stdout("web2", &findings_payload(6, &[]))
            .stdout(
                "db1",
                &findings_payload(3, &[("db/replica", "warning", "replica lagging")]),
            ),
    );
    let orchestrator = fleet.orchestrator(engine.clone());

    let summary = orchestrator.run_diagnostics(request("all")).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    let hosts: Vec<&str> = summary.per_host.iter().map(|h| h.host.as_str()).collect();
    assert_eq!(hosts, vec!["web1", "web2", "db1"]);
    assert_eq!(summary.totals.success, 3);
    assert_eq!(summary.severity_totals[&Severity::Major], 1);
    assert_eq!(summary.severity_totals[&Severity::Warning], 1);
    assert_eq!(engine.call_count(), 3);
}

/// Test: failure isolation
/// Given one host whose engine call errors
/// When diagnostics run across 'all'
/// Then only that host fails and its error text survives verbatim
#[tokio::test]
async fn test_failure_isolated_to_one_host() {
    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new().failing("web2", "connection refused"));
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator.run_diagnostics(request("all")).await.unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.per_host[0].status, HostStatus::Success);
    let failed = &summary.per_host[1];
    assert_eq!(failed.status, HostStatus::Failure);
    assert!(failed.error.as_deref().unwrap().contains("connection refused"));
    assert_eq!(summary.per_host[2].status, HostStatus::Success);
}

/// Test: timeout classification
/// Given one host that answers slower than the per-host timeout
/// When diagnostics run
/// Then that host is recorded as Timeout, not Failure
#[tokio::test]
async fn test_timeout_distinct_from_failure() {
    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new().slow("db1", Duration::from_millis(1_400)));
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator
        .run_diagnostics(DiagnosticsRequest {
            pattern: "all".to_string(),
            timeout_secs: Some(1),
            ..DiagnosticsRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.per_host[2].host, "db1");
    assert_eq!(summary.per_host[2].status, HostStatus::Timeout);
    assert_eq!(summary.totals.timeout, 1);
    assert_eq!(summary.totals.success, 2);
}

/// Test: malformed payload
/// Given a host whose probe output is not valid JSON
/// When diagnostics run
/// Then the host is downgraded to Failure with the parse error captured
#[tokio::test]
async fn test_malformed_payload_downgraded_to_failure() {
    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new().stdout("web1", "segfault in probe"));
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator.run_diagnostics(request("web1")).await.unwrap();

    let host = &summary.per_host[0];
    assert_eq!(host.status, HostStatus::Failure);
    assert!(host
        .error
        .as_deref()
        .unwrap()
        .contains("invalid diagnostics payload"));
}

/// Test: plugin filter plumbing
/// Given a run narrowed to one plugin family
/// When the engine is invoked
/// Then every request carries the filter
#[tokio::test]
async fn test_plugin_filter_reaches_engine() {
    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new());
    let orchestrator = fleet.orchestrator(engine.clone());

    orchestrator
        .run_diagnostics(DiagnosticsRequest {
            pattern: "web".to_string(),
            plugin_filter: Some("network".to_string()),
            ..DiagnosticsRequest::default()
        })
        .await
        .unwrap();

    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        match &call.action {
            EngineAction::Diagnostics { plugin_filter } => {
                assert_eq!(plugin_filter.as_deref(), Some("network"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }
}

/// Test: effective variables plumbing
/// Given hosts with host-line, group, and inherited variables
/// When the engine is invoked
/// Then each request carries that host's merged variables
#[tokio::test]
async fn test_host_variables_reach_engine() {
    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new());
    let orchestrator = fleet.orchestrator(engine.clone());

    orchestrator.run_diagnostics(request("web1")).await.unwrap();

    let calls = engine.calls();
    let vars = &calls[0].variables;
    assert_eq!(vars.get("ansible_user").unwrap(), "deploy");
    assert_eq!(vars.get("ansible_port").unwrap(), "2202");
    assert_eq!(vars.get("environment").unwrap(), "staging");
    assert_eq!(calls[0].inventory, fleet.inventory);
}

/// Test: zero-host match
/// Given a pattern that matches nothing
/// When diagnostics run
/// Then the summary is NoMatch with zero totals and nothing dispatched
#[tokio::test]
async fn test_no_match_runs_nothing() {
    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new());
    let orchestrator = fleet.orchestrator(engine.clone());

    let summary = orchestrator
        .run_diagnostics(request("ghost*"))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::NoMatch);
    assert!(summary.per_host.is_empty());
    assert_eq!(summary.totals.total(), 0);
    assert_eq!(engine.call_count(), 0);
}

/// Test: findings bound
/// Given a host reporting more findings than the per-host cap
/// When diagnostics run
/// Then the list is cut, the flags are set, and the full count survives
#[tokio::test]
async fn test_truncation_flag_propagates() {
    let findings: Vec<(String, String, String)> = (0..30)
        .map(|i| {
            (
                format!("check/{}", i),
                "minor".to_string(),
                format!("issue {}", i),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &str, &str)> = findings
        .iter()
        .map(|(id, sev, msg)| (id.as_str(), sev.as_str(), msg.as_str()))
        .collect();

    let fleet = TestFleet::new();
    let engine = Arc::new(ScriptedEngine::new().stdout("web1", &findings_payload(0, &borrowed)));
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator.run_diagnostics(request("web1")).await.unwrap();

    let host = &summary.per_host[0];
    assert_eq!(host.findings.len(), 25);
    assert_eq!(host.failed, 30);
    assert!(host.truncated);
    assert!(summary.truncated);
    assert_eq!(summary.severity_totals[&Severity::Minor], 30);
}

/// Test: cancellation
/// Given slow hosts and a cancellation shortly after dispatch
/// When the run is cancelled
/// Then the call errors and no partial summary is produced
#[tokio::test]
async fn test_cancellation_discards_partial_results() {
    let fleet = TestFleet::new();
    let engine = Arc::new(
        ScriptedEngine::new()
            .slow("web1", Duration::from_millis(500))
            .slow("web2", Duration::from_millis(500))
            .slow("db1", Duration::from_millis(500)),
    );
    let orchestrator = fleet.orchestrator(engine);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
    });

    let result = orchestrator.run_diagnostics(request("all")).await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

/// Test: determinism
/// Given identical engine behavior across two runs
/// When both summaries are serialized
/// Then the bytes are identical
#[tokio::test]
async fn test_repeated_runs_byte_identical() {
    let fleet = TestFleet::new();
    let engine = Arc::new(
        ScriptedEngine::new()
            .stdout(
                "web1",
                &findings_payload(2, &[("net/mtu", "warning", "mtu mismatch")]),
            )
            .failing("db1", "no route to host"),
    );
    let orchestrator = fleet.orchestrator(engine);

    let first = orchestrator.run_diagnostics(request("all")).await.unwrap();
    let second = orchestrator.run_diagnostics(request("all")).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
