//! Plain-text rendering of orchestrator results.
//!
//! The CLI prints these when `--json` is not given. Rendering is purely a
//! view over the summary structs; nothing here recomputes counts.

use crate::diagnostics::{DiagnosticsSummary, HostStatus};
use crate::inventory::{InventoryOverview, ResolvedTargets};
use crate::playbook::{PlaybookCatalog, PlaybookSummary};

pub fn format_overview(overview: &InventoryOverview) -> String {
    let mut out = format!(
        "Inventory {} ({} host{})\n",
        overview.inventory,
        overview.total_hosts,
        plural(overview.total_hosts)
    );
    for (name, members) in &overview.groups {
        // `all` is synthetic and just repeats the host list
        if name == "all" {
            continue;
        }
        out.push_str(&format!("\n[{}] ({})\n", name, members.len()));
        for member in members {
            out.push_str(&format!("  {}\n", member));
        }
    }
    out
}

pub fn format_targets(targets: &ResolvedTargets) -> String {
    let mut out = format!(
        "Pattern '{}' matched {} host{}\n",
        targets.pattern,
        targets.hosts.len(),
        plural(targets.hosts.len())
    );
    for host in &targets.hosts {
        out.push_str(&format!("  {}\n", host));
    }
    if !targets.unmatched.is_empty() {
        out.push_str(&format!(
            "Unmatched tokens: {}\n",
            targets.unmatched.join(", ")
        ));
    }
    out
}

pub fn format_catalog(catalog: &PlaybookCatalog) -> String {
    if catalog.playbooks.is_empty() {
        return format!("No playbooks in {}\n", catalog.dir.display());
    }
    let mut out = format!(
        "Playbooks in {} ({})\n",
        catalog.dir.display(),
        catalog.playbooks.len()
    );
    for name in &catalog.playbooks {
        out.push_str(&format!("  {}\n", name));
    }
    out
}

pub fn format_diagnostics(summary: &DiagnosticsSummary) -> String {
    let mut out = format!(
        "Diagnostics '{}': {} ({} ok, {} failed, {} timed out)\n",
        summary.pattern,
        summary.status.as_str(),
        summary.totals.success,
        summary.totals.failure,
        summary.totals.timeout
    );
    if summary.per_host.is_empty() {
        out.push_str("No hosts matched.\n");
        return out;
    }

    for host in &summary.per_host {
        match host.status {
            HostStatus::Success => {
                out.push_str(&format!(
                    "\n{}: {} passed, {} failed, {} skipped\n",
                    host.host, host.passed, host.failed, host.skipped
                ));
                for finding in &host.findings {
                    out.push_str(&format!(
                        "  [{}] {}: {}\n",
                        finding.severity.as_str(),
                        finding.id,
                        finding.message
                    ));
                }
                if host.truncated {
                    out.push_str("  ... more findings not shown\n");
                }
            }
            HostStatus::Failure => out.push_str(&format!(
                "\n{}: FAILED: {}\n",
                host.host,
                host.error.as_deref().unwrap_or("unknown error")
            )),
            HostStatus::Timeout => out.push_str(&format!(
                "\n{}: TIMED OUT: {}\n",
                host.host,
                host.error.as_deref().unwrap_or("no detail")
            )),
        }
    }

    if !summary.severity_totals.is_empty() {
        // most severe first
        let parts: Vec<String> = summary
            .severity_totals
            .iter()
            .rev()
            .map(|(severity, count)| format!("{}={}", severity.as_str(), count))
            .collect();
        out.push_str(&format!("\nSeverity totals: {}\n", parts.join(" ")));
    }
    out
}

pub fn format_playbook(summary: &PlaybookSummary) -> String {
    let mut out = format!(
        "Playbook '{}' on '{}': {}{}\n",
        summary.playbook,
        summary.pattern,
        summary.status.as_str(),
        if summary.check_mode { " (check mode)" } else { "" }
    );
    if summary.per_host.is_empty() {
        out.push_str("No hosts matched.\n");
        return out;
    }

    out.push_str(&format!(
        "Hosts: {} ok, {} failed, {} timed out\n",
        summary.totals.success, summary.totals.failure, summary.totals.timeout
    ));
    let totals = &summary.task_totals;
    out.push_str(&format!(
        "Tasks: ok={} changed={} failed={} skipped={} unreachable={}\n",
        totals.ok, totals.changed, totals.failed, totals.skipped, totals.unreachable
    ));

    for host in &summary.per_host {
        let stats = match &host.stats {
            Some(stats) => format!(
                "ok={} changed={} failed={} skipped={} unreachable={}",
                stats.ok, stats.changed, stats.failed, stats.skipped, stats.unreachable
            ),
            None => "no recap".to_string(),
        };
        match host.status {
            HostStatus::Success => out.push_str(&format!("\n{}: {}\n", host.host, stats)),
            HostStatus::Failure => out.push_str(&format!(
                "\n{}: FAILED ({})\n  {}\n",
                host.host,
                stats,
                host.error.as_deref().unwrap_or("unknown error")
            )),
            HostStatus::Timeout => out.push_str(&format!(
                "\n{}: TIMED OUT\n  {}\n",
                host.host,
                host.error.as_deref().unwrap_or("no detail")
            )),
        }
    }

    if !summary.excerpt.is_empty() {
        out.push_str("\n--- output tail ---\n");
        for line in &summary.excerpt {
            out.push_str(line);
            out.push('\n');
        }
        if summary.truncated {
            out.push_str("(output truncated)\n");
        }
    }
    out
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
