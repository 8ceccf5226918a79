//! Host pattern resolution.
//!
//! A pattern is a comma (or colon) separated list of tokens. Each token
//! selects hosts: a literal host name, a group name, `all`, or a glob
//! (`*`, `?`) matched against host names. A leading `!` removes the
//! token's expansion from the working set instead. Tokens apply left to
//! right, so an include after an exclude re-adds hosts, and a pattern made
//! only of excludes starts from every host.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use crate::{dlog_warn, Error, Result};

use super::parse::Inventory;

/// The outcome of expanding a pattern against an inventory.
///
/// `hosts` is deduplicated and preserves first-seen order. Zero hosts is a
/// legitimate, reportable outcome, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTargets {
    pub pattern: String,
    pub hosts: Vec<String>,
    /// Include tokens that expanded to nothing.
    pub unmatched: Vec<String>,
}

impl ResolvedTargets {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }
}

/// Expand `pattern` against `inventory`.
///
/// # Errors
///
/// Returns `Error::Pattern` for syntactically invalid patterns: an empty
/// pattern, or a `!` with nothing after it. A valid pattern that matches
/// nothing is not an error.
pub fn resolve(pattern: &str, inventory: &Inventory) -> Result<ResolvedTargets> {
    let tokens: Vec<&str> = pattern
        .split([',', ':'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(Error::Pattern(format!(
            "empty pattern '{}' selects nothing; use 'all' to target every host",
            pattern
        )));
    }

    let mut selected: Vec<String> = Vec::new();
    let mut index: HashSet<String> = HashSet::new();
    let mut unmatched: Vec<String> = Vec::new();

    // Excludes-only patterns subtract from the full fleet
    if tokens.iter().all(|t| t.starts_with('!')) {
        for host in inventory.hosts() {
            if index.insert(host.clone()) {
                selected.push(host.clone());
            }
        }
    }

    for token in tokens {
        if let Some(name) = token.strip_prefix('!') {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Pattern(
                    "'!' must be followed by a host, group, or glob".to_string(),
                ));
            }
            let removed: HashSet<String> = expand_token(name, inventory)?.into_iter().collect();
            for host in &removed {
                index.remove(host);
            }
            selected.retain(|h| !removed.contains(h));
        } else {
            let expansion = expand_token(token, inventory)?;
            if expansion.is_empty() {
                unmatched.push(token.to_string());
                continue;
            }
            for host in expansion {
                if index.insert(host.clone()) {
                    selected.push(host);
                }
            }
        }
    }

    if !unmatched.is_empty() {
        dlog_warn!(
            "pattern '{}': unmatched tokens: {}",
            pattern,
            unmatched.join(", ")
        );
    }

    Ok(ResolvedTargets {
        pattern: pattern.to_string(),
        hosts: selected,
        unmatched,
    })
}

fn expand_token(token: &str, inventory: &Inventory) -> Result<Vec<String>> {
    if token == "all" {
        return Ok(inventory.hosts().to_vec());
    }
    if let Some(group) = inventory.group(token) {
        return Ok(group.members.clone());
    }
    if inventory.contains_host(token) {
        return Ok(vec![token.to_string()]);
    }
    if token.contains('*') || token.contains('?') {
        let re = glob_to_regex(token)?;
        return Ok(inventory
            .hosts()
            .iter()
            .filter(|h| re.is_match(h))
            .cloned()
            .collect());
    }
    Ok(Vec::new())
}

/// Translate a shell-style glob into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let escaped = regex::escape(glob);
    let pattern = format!("^{}$", escaped.replace(r"\*", ".*").replace(r"\?", "."));
    Regex::new(&pattern).map_err(|e| Error::Pattern(format!("invalid glob '{}': {}", glob, e)))
}
