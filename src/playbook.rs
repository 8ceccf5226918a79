//! Remediation playbook catalog and result normalization.
//!
//! Playbooks are plain `.yml`/`.yaml` files in a configured directory.
//! The catalog enumerates and resolves them by name; the normalizer turns
//! per-host engine output into recap statistics plus a bounded stdout
//! excerpt. Like the diagnostics side, normalization is pure and
//! deterministic.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::diagnostics::{cap_message, HostStatus, OutcomeTotals, RunStatus};
use crate::dispatch::{JobOutcome, JobResult};
use crate::{Error, Result};

/// Raw stdout lines considered for the excerpt.
pub const MAX_RAW_LINES: usize = 400;

/// Collapsed lines kept in the excerpt.
pub const MAX_EXCERPT_LINES: usize = 40;

// Per-host recap line, e.g.
// `web1 : ok=3 changed=1 unreachable=0 failed=0 skipped=0 rescued=0 ignored=0`.
static RECAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(\S+)\s*:\s*ok=(\d+)\s+changed=(\d+)\s+unreachable=(\d+)\s+failed=(\d+)\s+skipped=(\d+)",
    )
    .unwrap()
});

/// Task counters from one host's recap line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub ok: u64,
    pub changed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub unreachable: u64,
}

impl TaskStats {
    pub fn merge(&mut self, other: &TaskStats) {
        self.ok += other.ok;
        self.changed += other.changed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.unreachable += other.unreachable;
    }
}

/// One host's slot in a remediation summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRecap {
    pub host: String,
    pub status: HostStatus,
    /// Recap counters when the engine output carried a recap line. A failed
    /// host keeps its parseable stats.
    pub stats: Option<TaskStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fleet-wide remediation result, one entry per targeted host in target
/// order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybookSummary {
    pub status: RunStatus,
    pub playbook: String,
    pub pattern: String,
    pub check_mode: bool,
    pub per_host: Vec<HostRecap>,
    pub totals: OutcomeTotals,
    pub task_totals: TaskStats,
    pub excerpt: Vec<String>,
    pub truncated: bool,
}

/// Available remediation playbooks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybookCatalog {
    pub dir: PathBuf,
    pub playbooks: Vec<String>,
}

impl PlaybookCatalog {
    /// Enumerate `.yml`/`.yaml` files in `dir`, sorted by file name.
    ///
    /// A missing directory yields an empty catalog rather than an error so
    /// listing works on a fresh setup.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut playbooks = Vec::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                if matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                ) {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        playbooks.push(name.to_string());
                    }
                }
            }
        }
        playbooks.sort();
        Ok(Self {
            dir: dir.to_path_buf(),
            playbooks,
        })
    }

    /// Resolve a requested name to a playbook path.
    ///
    /// An absolute path passes through when the file exists. Otherwise the
    /// name is tried verbatim, then with `.yml` and `.yaml` appended,
    /// against the catalog directory.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlaybook` listing the available names when nothing
    /// matches.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let requested = Path::new(name);
        if requested.is_absolute() {
            if requested.is_file() {
                return Ok(requested.to_path_buf());
            }
            return Err(self.unknown(name));
        }
        for candidate in [
            name.to_string(),
            format!("{}.yml", name),
            format!("{}.yaml", name),
        ] {
            let path = self.dir.join(&candidate);
            if path.is_file() {
                return Ok(path);
            }
        }
        Err(self.unknown(name))
    }

    fn unknown(&self, name: &str) -> Error {
        Error::UnknownPlaybook {
            name: name.to_string(),
            available: self.playbooks.clone(),
        }
    }
}

/// Find `host`'s recap line in raw engine output.
fn parse_recap(stdout: &str, host: &str) -> Option<TaskStats> {
    for caps in RECAP_RE.captures_iter(stdout) {
        if &caps[1] != host {
            continue;
        }
        return Some(TaskStats {
            ok: caps[2].parse().unwrap_or(0),
            changed: caps[3].parse().unwrap_or(0),
            unreachable: caps[4].parse().unwrap_or(0),
            failed: caps[5].parse().unwrap_or(0),
            skipped: caps[6].parse().unwrap_or(0),
        });
    }
    None
}

/// Bound raw output to a short excerpt: keep the last [`MAX_RAW_LINES`]
/// lines, collapse consecutive repeats to `line (repeated N times)`, keep
/// the last [`MAX_EXCERPT_LINES`] collapsed lines. The flag reports whether
/// either cap was hit.
fn excerpt_lines(raw: &str) -> (Vec<String>, bool) {
    let lines: Vec<&str> = raw.lines().collect();
    let mut truncated = false;
    let tail = if lines.len() > MAX_RAW_LINES {
        truncated = true;
        &lines[lines.len() - MAX_RAW_LINES..]
    } else {
        &lines[..]
    };

    let mut collapsed: Vec<String> = Vec::new();
    let mut current: Option<(String, usize)> = None;
    for line in tail {
        match current.as_mut() {
            Some((text, count)) if text.as_str() == *line => *count += 1,
            _ => {
                if let Some((text, count)) = current.take() {
                    collapsed.push(render_run(&text, count));
                }
                current = Some((line.to_string(), 1));
            }
        }
    }
    if let Some((text, count)) = current {
        collapsed.push(render_run(&text, count));
    }

    if collapsed.len() > MAX_EXCERPT_LINES {
        truncated = true;
        collapsed.drain(..collapsed.len() - MAX_EXCERPT_LINES);
    }
    (collapsed, truncated)
}

fn render_run(line: &str, count: usize) -> String {
    if count > 1 {
        format!("{} (repeated {} times)", line, count)
    } else {
        line.to_string()
    }
}

/// Reduce a batch of per-host results to a remediation summary.
///
/// `results` must already be in target order; the summary preserves it.
pub fn normalize(
    playbook: &str,
    pattern: &str,
    check_mode: bool,
    results: &[JobResult],
) -> PlaybookSummary {
    let mut per_host = Vec::with_capacity(results.len());
    let mut totals = OutcomeTotals::default();
    let mut task_totals = TaskStats::default();
    let mut raw = String::new();

    for result in results {
        let (status, stats, error) = match &result.outcome {
            JobOutcome::Completed(output) => {
                let stats = parse_recap(&output.stdout, &result.host);
                if !output.stdout.is_empty() {
                    raw.push_str(&output.stdout);
                    if !output.stdout.ends_with('\n') {
                        raw.push('\n');
                    }
                }
                if output.exit_code == 0 {
                    (HostStatus::Success, stats, None)
                } else {
                    let detail = if output.stderr.trim().is_empty() {
                        output.stdout.trim()
                    } else {
                        output.stderr.trim()
                    };
                    (
                        HostStatus::Failure,
                        stats,
                        Some(format!(
                            "engine exited with code {}: {}",
                            output.exit_code,
                            cap_message(detail)
                        )),
                    )
                }
            }
            JobOutcome::Failed { message } => (HostStatus::Failure, None, Some(message.clone())),
            JobOutcome::TimedOut { after } => (
                HostStatus::Timeout,
                None,
                Some(format!("timed out after {:?}", after)),
            ),
        };

        totals.record(status);
        if let Some(stats) = &stats {
            task_totals.merge(stats);
        }
        per_host.push(HostRecap {
            host: result.host.clone(),
            status,
            stats,
            error,
        });
    }

    let (excerpt, truncated) = excerpt_lines(&raw);
    PlaybookSummary {
        status: RunStatus::from_totals(&totals, results.len()),
        playbook: playbook.to_string(),
        pattern: pattern.to_string(),
        check_mode,
        per_host,
        totals,
        task_totals,
        excerpt,
        truncated,
    }
}
