use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::dispatch::{DEFAULT_FORKS, DEFAULT_TIMEOUT_SECS};
use crate::{dlog_debug, Error, Result};

/// Orchestrator configuration.
///
/// Loaded from `~/.drover/drover.toml` when present; every field is optional
/// and falls back through the `effective_*` accessors. The struct is passed
/// into [`crate::facade::Orchestrator`] at construction so nothing below the
/// facade reads ambient process state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path to the inventory file. Defaults to `inventory/hosts`.
    pub inventory: Option<String>,
    /// Directory holding remediation playbooks. Defaults to `playbooks`.
    pub playbook_dir: Option<String>,
    /// Concurrent per-host jobs per dispatch.
    pub forks: Option<usize>,
    /// Per-host job timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Fleet tool used for ad-hoc per-host commands.
    pub ansible_binary: Option<String>,
    /// Fleet tool used for playbook runs.
    pub playbook_binary: Option<String>,
    /// Diagnostic probe invoked on each host.
    pub probe_command: Option<String>,
}

impl Config {
    pub fn drover_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".drover"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::drover_dir()?.join("drover.toml"))
    }

    pub fn effective_inventory(&self) -> PathBuf {
        match &self.inventory {
            Some(path) => expand_tilde(path),
            None => PathBuf::from("inventory/hosts"),
        }
    }

    pub fn effective_playbook_dir(&self) -> PathBuf {
        match &self.playbook_dir {
            Some(dir) => expand_tilde(dir),
            None => PathBuf::from("playbooks"),
        }
    }

    pub fn effective_forks(&self) -> usize {
        self.forks.unwrap_or(DEFAULT_FORKS).max(1)
    }

    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1)
    }

    pub fn effective_ansible_binary(&self) -> &str {
        self.ansible_binary.as_deref().unwrap_or("ansible")
    }

    pub fn effective_playbook_binary(&self) -> &str {
        self.playbook_binary.as_deref().unwrap_or("ansible-playbook")
    }

    pub fn effective_probe_command(&self) -> &str {
        self.probe_command.as_deref().unwrap_or("risu")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        dlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            dlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        dlog_debug!(
            "Config loaded: inventory={:?}, playbook_dir={:?}, forks={:?}",
            config.inventory,
            config.playbook_dir,
            config.forks
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let drover_dir = Self::drover_dir()?;
        dlog_debug!("Config::save drover_dir={}", drover_dir.display());
        if !drover_dir.exists() {
            fs::create_dir_all(&drover_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        dlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
