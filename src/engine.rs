//! External execution engine.
//!
//! The orchestrator never opens connections itself. Each per-host job is a
//! single opaque call into an [`ExecutionEngine`], which returns raw
//! stdout/stderr and an exit status. [`ProcessEngine`] is the production
//! implementation: it shells out to the fleet tool, one process per host,
//! passing the host's effective connection variables on the command line.
//! Tests inject scripted engines through the same trait.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;

use crate::config::Config;
use crate::inventory::VarMap;
use crate::{dlog_trace, Error, Result};

/// What to run on a target host.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Run the diagnostic probe, optionally narrowed to specific plugins.
    Diagnostics { plugin_filter: Option<String> },
    /// Apply a remediation playbook.
    Playbook {
        path: PathBuf,
        extra_vars: VarMap,
        check: bool,
    },
}

/// One per-host engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub host: String,
    pub variables: VarMap,
    pub inventory: PathBuf,
    pub action: EngineAction,
}

/// Raw outcome of an engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Per-host execution backend.
///
/// Futures are boxed so the facade can hold the engine as a trait object
/// and the dispatcher can move each call into a spawned task.
pub trait ExecutionEngine: Send + Sync {
    fn run(&self, request: EngineRequest) -> BoxFuture<'static, Result<EngineOutput>>;
}

/// Engine that shells out to the fleet tool.
///
/// Diagnostics run as an ad-hoc shell module call that executes the probe
/// remotely and emits its JSON result file on stdout. Playbooks run through
/// the playbook binary limited to one host per call so the dispatcher keeps
/// per-host isolation and ordering.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    ansible: PathBuf,
    playbook: PathBuf,
    probe: String,
}

impl ProcessEngine {
    /// Locate the fleet tool binaries named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `EngineBinaryNotFound` when a binary is not on PATH.
    pub fn new(config: &Config) -> Result<Self> {
        let ansible = which::which(config.effective_ansible_binary())
            .map_err(|_| Error::EngineBinaryNotFound(config.effective_ansible_binary().to_string()))?;
        let playbook = which::which(config.effective_playbook_binary())
            .map_err(|_| Error::EngineBinaryNotFound(config.effective_playbook_binary().to_string()))?;
        Ok(Self {
            ansible,
            playbook,
            probe: config.effective_probe_command().to_string(),
        })
    }

    /// Build an engine with explicit binary paths, skipping PATH lookup.
    pub fn with_binaries(ansible: PathBuf, playbook: PathBuf, probe: String) -> Self {
        Self {
            ansible,
            playbook,
            probe,
        }
    }

    pub fn ansible_binary(&self) -> &Path {
        &self.ansible
    }

    pub fn playbook_binary(&self) -> &Path {
        &self.playbook
    }

    fn command_for(&self, request: &EngineRequest) -> (PathBuf, Vec<String>) {
        match &request.action {
            EngineAction::Diagnostics { plugin_filter } => {
                let script = self.probe_script(plugin_filter.as_deref());
                let mut args = vec![
                    request.host.clone(),
                    "-m".to_string(),
                    "shell".to_string(),
                    "-a".to_string(),
                    script,
                    "-o".to_string(),
                    "-i".to_string(),
                    request.inventory.display().to_string(),
                ];
                args.extend(connection_args(&request.host, &request.variables));
                (self.ansible.clone(), args)
            }
            EngineAction::Playbook {
                path,
                extra_vars,
                check,
            } => {
                let mut args = vec![
                    path.display().to_string(),
                    "-i".to_string(),
                    request.inventory.display().to_string(),
                    "--limit".to_string(),
                    request.host.clone(),
                ];
                if *check {
                    args.push("-C".to_string());
                }
                for (key, value) in extra_vars {
                    args.push("-e".to_string());
                    args.push(format!("{}={}", key, value));
                }
                (self.playbook.clone(), args)
            }
        }
    }

    /// Remote shell snippet that runs the probe and prints its JSON output.
    fn probe_script(&self, plugin_filter: Option<&str>) -> String {
        let mut probe = format!("{} -l --numproc 1", self.probe);
        if let Some(filter) = plugin_filter {
            probe.push_str(&format!(" -i {}", shell_quote(filter)));
        }
        format!(
            "set -euo pipefail; tmp=\"$(mktemp /tmp/probe-XXXX.json)\"; \
             {} --output \"$tmp\" > /tmp/probe-cli.log 2>&1; cat \"$tmp\"; rm -f \"$tmp\"",
            probe
        )
    }
}

impl ExecutionEngine for ProcessEngine {
    fn run(&self, request: EngineRequest) -> BoxFuture<'static, Result<EngineOutput>> {
        let engine = self.clone();
        async move {
            let (program, args) = engine.command_for(&request);
            dlog_trace!(
                "engine exec host={} program={} args={:?}",
                request.host,
                program.display(),
                args
            );
            let output = Command::new(&program)
                .args(&args)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(Error::Io)?;
            Ok(EngineOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        .boxed()
    }
}

/// Per-host connection arguments derived from effective variables.
fn connection_args(host: &str, vars: &VarMap) -> Vec<String> {
    let mut args = Vec::new();

    let is_local = host == "localhost" || host == "127.0.0.1";
    match vars.get("ansible_connection") {
        Some(connection) => {
            args.push("-c".to_string());
            args.push(connection.clone());
        }
        None if is_local => {
            args.push("-c".to_string());
            args.push("local".to_string());
        }
        None => {}
    }

    if let Some(user) = vars.get("ansible_user").or_else(|| vars.get("ansible_ssh_user")) {
        args.push("-u".to_string());
        args.push(user.clone());
    }
    if let Some(port) = vars.get("ansible_port") {
        args.push("--ssh-extra-args".to_string());
        args.push(format!("-p {}", port));
    }
    if let Some(key_file) = vars.get("ansible_ssh_private_key_file") {
        args.push("--private-key".to_string());
        args.push(key_file.clone());
    }
    if vars.get("ansible_become").map(|v| is_truthy(v)).unwrap_or(false) {
        args.push("-b".to_string());
        if let Some(method) = vars.get("ansible_become_method") {
            args.push("--become-method".to_string());
            args.push(method.clone());
        }
        if let Some(become_user) = vars.get("ansible_become_user") {
            args.push("--become-user".to_string());
            args.push(become_user.clone());
        }
    }
    args
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
