//! End-to-end remediation playbook scenarios.
//!
//! Covers catalog resolution, recap aggregation, check mode, and the
//! unknown-playbook guard that fires before any job is dispatched.

use std::sync::Arc;
use std::time::Duration;

use drover::diagnostics::{HostStatus, RunStatus};
use drover::engine::EngineAction;
use drover::facade::PlaybookRequest;
use drover::inventory::VarMap;
use drover::Error;

use crate::fixtures::{recap_stdout, HostScript, ScriptedEngine, TestFleet};

fn request(playbook: &str, pattern: &str) -> PlaybookRequest {
    PlaybookRequest {
        playbook: playbook.to_string(),
        pattern: pattern.to_string(),
        ..PlaybookRequest::default()
    }
}

/// Test: unknown playbook guard
/// Given a catalog with one playbook
/// When an unknown name is requested
/// Then the call fails with the available names and nothing is dispatched
#[tokio::test]
async fn test_unknown_playbook_rejected_before_dispatch() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(ScriptedEngine::new());
    let orchestrator = fleet.orchestrator(engine.clone());

    let result = orchestrator
        .run_playbook(request("rotate-certs", "all"))
        .await;

    match result {
        Err(Error::UnknownPlaybook { name, available }) => {
            assert_eq!(name, "rotate-certs");
            assert_eq!(available, vec!["fix-web.yml".to_string()]);
        }
        other => panic!("expected UnknownPlaybook, got {:?}", other),
    }
    assert_eq!(engine.call_count(), 0);
}

/// Test: happy path
/// Given two hosts that each report a clean recap
/// When the playbook runs on the 'web' group
/// Then recap stats aggregate and every host succeeds
#[tokio::test]
async fn test_playbook_recap_aggregation() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(
        ScriptedEngine::new()
            .stdout("web1", &recap_stdout("web1", 5, 2, 0))
            .stdout("web2", &recap_stdout("web2", 5, 1, 0)),
    );
    let orchestrator = fleet.orchestrator(engine.clone());

    let summary = orchestrator
        .run_playbook(request("fix-web.yml", "web"))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.playbook, "fix-web.yml");
    let hosts: Vec<&str> = summary.per_host.iter().map(|h| h.host.as_str()).collect();
    assert_eq!(hosts, vec!["web1", "web2"]);
    assert_eq!(summary.task_totals.ok, 10);
    assert_eq!(summary.task_totals.changed, 3);
    assert_eq!(summary.task_totals.failed, 0);
    assert_eq!(engine.call_count(), 2);
}

/// Test: check mode and extra vars plumbing
/// Given a dry run with extra variables
/// When the engine is invoked
/// Then the playbook action carries the flag and the variables
#[tokio::test]
async fn test_check_mode_and_extra_vars_reach_engine() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(ScriptedEngine::new().stdout("db1", &recap_stdout("db1", 2, 0, 0)));
    let orchestrator = fleet.orchestrator(engine.clone());

    let mut extra_vars = VarMap::new();
    extra_vars.insert("mode".to_string(), "restart".to_string());

    let summary = orchestrator
        .run_playbook(PlaybookRequest {
            playbook: "fix-web.yml".to_string(),
            pattern: "db1".to_string(),
            extra_vars,
            check: true,
            ..PlaybookRequest::default()
        })
        .await
        .unwrap();

    assert!(summary.check_mode);
    let calls = engine.calls();
    match &calls[0].action {
        EngineAction::Playbook {
            path,
            extra_vars,
            check,
        } => {
            assert!(*check);
            assert_eq!(extra_vars.get("mode").map(String::as_str), Some("restart"));
            assert!(path.ends_with("fix-web.yml"));
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

/// Test: extension-less resolution
/// Given a catalog entry named fix-web.yml
/// When the playbook is requested as 'fix-web'
/// Then the name resolves to the catalog file
#[tokio::test]
async fn test_playbook_name_resolves_without_extension() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(ScriptedEngine::new().stdout("db1", &recap_stdout("db1", 1, 0, 0)));
    let orchestrator = fleet.orchestrator(engine.clone());

    let summary = orchestrator
        .run_playbook(request("fix-web", "db1"))
        .await
        .unwrap();

    assert_eq!(summary.playbook, "fix-web");
    let calls = engine.calls();
    match &calls[0].action {
        EngineAction::Playbook { path, .. } => {
            assert_eq!(
                path.file_name().and_then(|n| n.to_str()),
                Some("fix-web.yml")
            );
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

/// Test: failed host keeps its recap
/// Given one host whose engine exits 2 but still prints a recap
/// When the playbook runs
/// Then that host is a Failure with stats retained and totals still merge
#[tokio::test]
async fn test_failed_host_keeps_recap_stats() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(
        ScriptedEngine::new()
            .script(
                "web1",
                HostScript {
                    exit_code: 2,
                    stdout: recap_stdout("web1", 3, 1, 1),
                    ..HostScript::default()
                },
            )
            .stdout("web2", &recap_stdout("web2", 4, 0, 0)),
    );
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator
        .run_playbook(request("fix-web.yml", "web"))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    let failed = &summary.per_host[0];
    assert_eq!(failed.status, HostStatus::Failure);
    assert!(failed.error.as_deref().unwrap().contains("exited with code 2"));
    let stats = failed.stats.as_ref().unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(summary.task_totals.ok, 7);
    assert_eq!(summary.task_totals.failed, 1);
}

/// Test: slow host times out
/// Given one host that never answers within the per-host timeout
/// When the playbook runs
/// Then the host is a Timeout with no recap stats
#[tokio::test]
async fn test_playbook_timeout_host_has_no_stats() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(
        ScriptedEngine::new()
            .stdout("web1", &recap_stdout("web1", 2, 0, 0))
            .slow("web2", Duration::from_millis(1_400)),
    );
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator
        .run_playbook(PlaybookRequest {
            playbook: "fix-web.yml".to_string(),
            pattern: "web".to_string(),
            timeout_secs: Some(1),
            ..PlaybookRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Partial);
    let timed_out = &summary.per_host[1];
    assert_eq!(timed_out.status, HostStatus::Timeout);
    assert!(timed_out.stats.is_none());
    assert_eq!(summary.totals.timeout, 1);
}

/// Test: zero-host match
/// Given a pattern that matches nothing
/// When the playbook runs
/// Then the summary is NoMatch and nothing is dispatched
#[tokio::test]
async fn test_playbook_no_match_runs_nothing() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(ScriptedEngine::new());
    let orchestrator = fleet.orchestrator(engine.clone());

    let summary = orchestrator
        .run_playbook(request("fix-web.yml", "ghost*"))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::NoMatch);
    assert!(summary.per_host.is_empty());
    assert_eq!(summary.task_totals.ok, 0);
    assert_eq!(engine.call_count(), 0);
}

/// Test: absolute path escape hatch
/// Given a playbook file outside the catalog directory
/// When it is requested by absolute path
/// Then it runs without being listed in the catalog
#[tokio::test]
async fn test_absolute_playbook_path_accepted() {
    let fleet = TestFleet::new();
    let adhoc = fleet.temp_dir.path().join("adhoc.yml");
    std::fs::write(&adhoc, "---\n- hosts: all\n  tasks: []\n").unwrap();
    let engine = Arc::new(ScriptedEngine::new().stdout("db1", &recap_stdout("db1", 1, 0, 0)));
    let orchestrator = fleet.orchestrator(engine.clone());

    let summary = orchestrator
        .run_playbook(request(&adhoc.display().to_string(), "db1"))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    match &engine.calls()[0].action {
        EngineAction::Playbook { path, .. } => assert_eq!(path, &adhoc),
        other => panic!("unexpected action: {:?}", other),
    }
}

/// Test: output excerpt
/// Given hosts with multi-line playbook output
/// When the playbook runs
/// Then the excerpt carries the tail of the combined output in host order
#[tokio::test]
async fn test_excerpt_spans_hosts_in_order() {
    let fleet = TestFleet::new();
    fleet.add_playbook("fix-web.yml");
    let engine = Arc::new(
        ScriptedEngine::new()
            .stdout("web1", &recap_stdout("web1", 1, 0, 0))
            .stdout("web2", &recap_stdout("web2", 1, 0, 0)),
    );
    let orchestrator = fleet.orchestrator(engine);

    let summary = orchestrator
        .run_playbook(request("fix-web.yml", "web"))
        .await
        .unwrap();

    let text = summary.excerpt.join("\n");
    let first = text.find("PLAY [web1]").unwrap();
    let second = text.find("PLAY [web2]").unwrap();
    assert!(first < second);
    assert!(!summary.truncated);
}
