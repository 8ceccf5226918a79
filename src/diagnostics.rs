//! Diagnostics result normalization.
//!
//! Reduces raw per-host engine output to a stable summary shape: the probe's
//! JSON payload becomes a bounded findings list plus check counts, and hosts
//! that failed keep their error detail verbatim. Normalization is pure and
//! never reads the clock, so identical inputs serialize byte-identically.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dispatch::{JobOutcome, JobResult};

/// Findings kept per host before the list is cut.
pub const MAX_FINDINGS_PER_HOST: usize = 25;

/// Longest finding message carried into a summary, suffix included.
pub const MAX_MESSAGE_CHARS: usize = 400;

/// Severity ladder for findings, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Minor,
    Warning,
    Major,
    Critical,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "minor" => Some(Self::Minor),
            "warning" => Some(Self::Warning),
            "major" => Some(Self::Major),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Severity implied by a probe plugin's return code.
    pub fn from_rc(rc: i64) -> Self {
        if rc >= 20 {
            Self::Critical
        } else if rc >= 10 {
            Self::Major
        } else if rc >= 5 {
            Self::Warning
        } else if rc == 0 {
            Self::Info
        } else {
            Self::Minor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Minor => "minor",
            Self::Warning => "warning",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

/// Terminal classification of one host's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Success,
    Failure,
    Timeout,
}

/// Outcome counts across a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTotals {
    pub success: usize,
    pub failure: usize,
    pub timeout: usize,
}

impl OutcomeTotals {
    pub fn record(&mut self, status: HostStatus) {
        match status {
            HostStatus::Success => self.success += 1,
            HostStatus::Failure => self.failure += 1,
            HostStatus::Timeout => self.timeout += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failure + self.timeout
    }
}

/// Aggregate state of one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
    NoMatch,
}

impl RunStatus {
    /// Classify a finished batch from its outcome counts.
    pub fn from_totals(totals: &OutcomeTotals, host_count: usize) -> Self {
        if host_count == 0 {
            Self::NoMatch
        } else if totals.failure == 0 && totals.timeout == 0 {
            Self::Completed
        } else if totals.success > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::NoMatch => "no_match",
        }
    }
}

/// One normalized diagnostic result item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
}

/// One host's slot in a diagnostics summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostDiagnostics {
    pub host: String,
    pub status: HostStatus,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub findings: Vec<Finding>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fleet-wide diagnostics result, one entry per targeted host in target
/// order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsSummary {
    pub status: RunStatus,
    pub pattern: String,
    pub per_host: Vec<HostDiagnostics>,
    pub totals: OutcomeTotals,
    pub severity_totals: BTreeMap<Severity, u64>,
    pub truncated: bool,
}

// ========== Payload Parsing ==========

#[derive(Debug, serde::Deserialize)]
struct RawPayload {
    findings: Vec<RawFinding>,
    #[serde(default)]
    passed: u64,
    #[serde(default)]
    skipped: u64,
}

#[derive(Debug, serde::Deserialize)]
struct RawFinding {
    id: String,
    message: String,
    severity: Option<String>,
    rc: Option<i64>,
    name: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
}

struct ParsedHost {
    passed: u64,
    skipped: u64,
    findings: Vec<Finding>,
}

/// Pull the JSON document out of the fleet tool's one-line wrapper
/// (`host | SUCCESS | rc=0 | stdout='...'`), undoing its quoting. Output
/// without the wrapper is treated as the payload itself.
fn extract_payload(stdout: &str) -> String {
    if let Some(start) = stdout.find("stdout='") {
        let quoted = &stdout[start + "stdout='".len()..];
        if let Some(end) = quoted.rfind('\'') {
            return quoted[..end].replace("\\n", "\n").replace("\\'", "'");
        }
    }
    stdout.trim().to_string()
}

pub(crate) fn cap_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_MESSAGE_CHARS {
        trimmed.to_string()
    } else {
        let mut capped: String = trimmed.chars().take(MAX_MESSAGE_CHARS - 3).collect();
        capped.push_str("...");
        capped
    }
}

fn parse_payload(stdout: &str) -> std::result::Result<ParsedHost, String> {
    let payload = extract_payload(stdout);
    let raw: RawPayload = serde_json::from_str(&payload)
        .map_err(|error| format!("invalid diagnostics payload: {}", error))?;

    let mut findings = Vec::with_capacity(raw.findings.len());
    for finding in raw.findings {
        let severity = match (&finding.severity, finding.rc) {
            (Some(label), _) => Severity::parse(label).ok_or_else(|| {
                format!("finding '{}': unknown severity '{}'", finding.id, label)
            })?,
            (None, Some(rc)) => Severity::from_rc(rc),
            (None, None) => {
                return Err(format!(
                    "finding '{}': neither severity nor rc present",
                    finding.id
                ))
            }
        };
        findings.push(Finding {
            id: finding.id,
            severity,
            message: cap_message(&finding.message),
            name: finding.name,
            category: finding.category,
            subcategory: finding.subcategory,
        });
    }

    Ok(ParsedHost {
        passed: raw.passed,
        skipped: raw.skipped,
        findings,
    })
}

// ========== Normalization ==========

/// Reduce a batch of per-host results to a diagnostics summary.
///
/// `results` must already be in target order; the summary preserves it. A
/// payload that fails to parse downgrades its host to `Failure` with the
/// parse error carried verbatim, never dropped.
pub fn normalize(pattern: &str, results: &[JobResult]) -> DiagnosticsSummary {
    let mut per_host = Vec::with_capacity(results.len());
    let mut totals = OutcomeTotals::default();
    let mut severity_totals: BTreeMap<Severity, u64> = BTreeMap::new();
    let mut truncated = false;

    for result in results {
        let (status, parsed, error) = match &result.outcome {
            JobOutcome::Completed(output) if output.exit_code != 0 => {
                let detail = if output.stderr.trim().is_empty() {
                    output.stdout.trim()
                } else {
                    output.stderr.trim()
                };
                (
                    HostStatus::Failure,
                    None,
                    Some(format!(
                        "engine exited with code {}: {}",
                        output.exit_code,
                        cap_message(detail)
                    )),
                )
            }
            JobOutcome::Completed(output) => match parse_payload(&output.stdout) {
                Ok(parsed) => (HostStatus::Success, Some(parsed), None),
                Err(parse_error) => (HostStatus::Failure, None, Some(parse_error)),
            },
            JobOutcome::Failed { message } => (HostStatus::Failure, None, Some(message.clone())),
            JobOutcome::TimedOut { after } => (
                HostStatus::Timeout,
                None,
                Some(format!("timed out after {:?}", after)),
            ),
        };

        totals.record(status);
        let (passed, skipped, all_findings) = match parsed {
            Some(parsed) => (parsed.passed, parsed.skipped, parsed.findings),
            None => (0, 0, Vec::new()),
        };
        for finding in &all_findings {
            *severity_totals.entry(finding.severity).or_insert(0) += 1;
        }

        let failed = all_findings.len() as u64;
        let host_truncated = all_findings.len() > MAX_FINDINGS_PER_HOST;
        truncated |= host_truncated;
        let mut findings = all_findings;
        if host_truncated {
            findings.truncate(MAX_FINDINGS_PER_HOST);
        }

        per_host.push(HostDiagnostics {
            host: result.host.clone(),
            status,
            passed,
            failed,
            skipped,
            findings,
            truncated: host_truncated,
            error,
        });
    }

    DiagnosticsSummary {
        status: RunStatus::from_totals(&totals, results.len()),
        pattern: pattern.to_string(),
        per_host,
        totals,
        severity_totals,
        truncated,
    }
}
