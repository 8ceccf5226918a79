//! Orchestration facade.
//!
//! The single entry point the boundary layer calls. Each operation composes
//! resolver, dispatcher, and normalizer and returns one aggregate value per
//! call. The inventory file is re-read on every operation so edits between
//! calls are always picked up; nothing is cached across calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::diagnostics::{self, DiagnosticsSummary};
use crate::dispatch::{Dispatcher, JobSpec};
use crate::engine::{EngineAction, ExecutionEngine, ProcessEngine};
use crate::inventory::{self, Inventory, InventoryOverview, ResolvedTargets, VarMap};
use crate::playbook::{self, PlaybookCatalog, PlaybookSummary};
use crate::{dlog, Result};

/// Parameters for one diagnostics run.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsRequest {
    /// Host pattern to target.
    pub pattern: String,
    /// Narrow the probe to matching plugins.
    pub plugin_filter: Option<String>,
    /// Inventory override for this call.
    pub inventory: Option<PathBuf>,
    /// Parallelism override for this call.
    pub limit: Option<usize>,
    /// Per-host timeout override for this call, in seconds.
    pub timeout_secs: Option<u64>,
}

/// Parameters for one remediation run.
#[derive(Debug, Clone, Default)]
pub struct PlaybookRequest {
    /// Playbook name, with or without extension, or an absolute path.
    pub playbook: String,
    /// Host pattern to target.
    pub pattern: String,
    /// Inventory override for this call.
    pub inventory: Option<PathBuf>,
    /// Extra variables handed to every host's run.
    pub extra_vars: VarMap,
    /// Dry-run mode: report what would change without changing it.
    pub check: bool,
    /// Parallelism override for this call.
    pub limit: Option<usize>,
    /// Per-host timeout override for this call, in seconds.
    pub timeout_secs: Option<u64>,
}

/// Composes the resolver, dispatcher, and normalizers behind one surface.
pub struct Orchestrator {
    config: Config,
    engine: Mutex<Option<Arc<dyn ExecutionEngine>>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Build an orchestrator backed by the process engine.
    ///
    /// The engine binaries are located on first dispatch, not here, so
    /// read-only operations work without the fleet tool installed.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Build an orchestrator with an injected engine.
    pub fn with_engine(config: Config, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            config,
            engine: Mutex::new(Some(engine)),
            cancel: CancellationToken::new(),
        }
    }

    /// Locate the process engine, keeping it for later runs.
    ///
    /// # Errors
    ///
    /// Returns `EngineBinaryNotFound` when the fleet tool binaries are not
    /// on PATH.
    fn engine(&self) -> Result<Arc<dyn ExecutionEngine>> {
        let mut slot = self
            .engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }
        let engine: Arc<dyn ExecutionEngine> = Arc::new(ProcessEngine::new(&self.config)?);
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Token that aborts in-flight runs when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn inventory_path(&self, requested: Option<&Path>) -> PathBuf {
        match requested {
            Some(path) => path.to_path_buf(),
            None => self.config.effective_inventory(),
        }
    }

    /// Host and group structure for display.
    pub fn list_inventory(&self, inventory: Option<&Path>) -> Result<InventoryOverview> {
        let inventory = Inventory::load(&self.inventory_path(inventory))?;
        Ok(inventory.overview())
    }

    /// Expand a pattern against the inventory without dispatching anything.
    pub fn resolve_hosts(
        &self,
        pattern: &str,
        inventory: Option<&Path>,
    ) -> Result<ResolvedTargets> {
        let inventory = Inventory::load(&self.inventory_path(inventory))?;
        inventory::resolve(pattern, &inventory)
    }

    /// Run the diagnostic probe across every host the pattern matches.
    ///
    /// Zero matched hosts is not an error: the summary comes back with
    /// `NoMatch` status, no per-host entries, and zero totals.
    pub async fn run_diagnostics(
        &self,
        request: DiagnosticsRequest,
    ) -> Result<DiagnosticsSummary> {
        let inventory_path = self.inventory_path(request.inventory.as_deref());
        let inventory = Inventory::load(&inventory_path)?;
        let targets = inventory::resolve(&request.pattern, &inventory)?;
        dlog!(
            "diagnostics '{}': {} host(s) matched",
            request.pattern,
            targets.len()
        );
        if targets.is_empty() {
            return Ok(diagnostics::normalize(&request.pattern, &[]));
        }

        let spec = JobSpec::new(
            EngineAction::Diagnostics {
                plugin_filter: request.plugin_filter.clone(),
            },
            inventory_path,
            request
                .timeout_secs
                .unwrap_or_else(|| self.config.effective_timeout_secs()),
        );
        let results = self
            .dispatch(&inventory, &targets.hosts, &spec, request.limit)
            .await?;
        Ok(diagnostics::normalize(&request.pattern, &results))
    }

    /// Names of the available remediation playbooks.
    pub fn list_playbooks(&self) -> Result<PlaybookCatalog> {
        PlaybookCatalog::load(&self.config.effective_playbook_dir())
    }

    /// Apply a remediation playbook across every host the pattern matches.
    ///
    /// An unknown playbook name fails before the inventory is read or any
    /// job dispatched. Zero matched hosts returns a `NoMatch` summary.
    pub async fn run_playbook(&self, request: PlaybookRequest) -> Result<PlaybookSummary> {
        let catalog = self.list_playbooks()?;
        let path = catalog.resolve(&request.playbook)?;

        let inventory_path = self.inventory_path(request.inventory.as_deref());
        let inventory = Inventory::load(&inventory_path)?;
        let targets = inventory::resolve(&request.pattern, &inventory)?;
        dlog!(
            "playbook '{}' on '{}': {} host(s) matched, check={}",
            request.playbook,
            request.pattern,
            targets.len(),
            request.check
        );
        if targets.is_empty() {
            return Ok(playbook::normalize(
                &request.playbook,
                &request.pattern,
                request.check,
                &[],
            ));
        }

        let spec = JobSpec::new(
            EngineAction::Playbook {
                path,
                extra_vars: request.extra_vars.clone(),
                check: request.check,
            },
            inventory_path,
            request
                .timeout_secs
                .unwrap_or_else(|| self.config.effective_timeout_secs()),
        );
        let results = self
            .dispatch(&inventory, &targets.hosts, &spec, request.limit)
            .await?;
        Ok(playbook::normalize(
            &request.playbook,
            &request.pattern,
            request.check,
            &results,
        ))
    }

    async fn dispatch(
        &self,
        inventory: &Inventory,
        hosts: &[String],
        spec: &JobSpec,
        limit: Option<usize>,
    ) -> Result<Vec<crate::dispatch::JobResult>> {
        let vars: HashMap<String, VarMap> = hosts
            .iter()
            .map(|host| (host.clone(), inventory.host_variables(host)))
            .collect();
        let dispatcher = Dispatcher::new(
            self.engine()?,
            limit.unwrap_or_else(|| self.config.effective_forks()),
        );
        dispatcher.dispatch(hosts, &vars, spec, &self.cancel).await
    }
}
