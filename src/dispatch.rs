//! Bounded parallel job dispatch.
//!
//! One job template fans out across a target list. Each host gets its own
//! spawned task gated by a semaphore, so at most `limit` engine calls are in
//! flight at once. Results land in a pre-sized slot vector indexed by target
//! position, which keeps output order equal to target order no matter how
//! completion interleaves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::{EngineAction, EngineOutput, EngineRequest, ExecutionEngine};
use crate::inventory::VarMap;
use crate::{dlog, dlog_debug, dlog_warn, Error, Result};

/// Default parallel job limit, matching the fleet tool's own forks default.
pub const DEFAULT_FORKS: usize = 5;

/// Default per-host job deadline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Template for one batch of per-host jobs.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub action: EngineAction,
    pub inventory: PathBuf,
    pub timeout: Duration,
}

impl JobSpec {
    pub fn new(action: EngineAction, inventory: PathBuf, timeout_secs: u64) -> Self {
        Self {
            action,
            inventory,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }
}

/// Terminal state of one per-host job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The engine call ran to completion. A non-zero exit still lands here;
    /// interpreting the exit status is the normalizer's job.
    Completed(EngineOutput),
    /// The engine call itself failed before producing output.
    Failed { message: String },
    /// The job exceeded its deadline and was abandoned.
    TimedOut { after: Duration },
}

/// One host's slot in a batch result.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub host: String,
    pub outcome: JobOutcome,
    pub duration: Duration,
}

impl JobResult {
    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, JobOutcome::TimedOut { .. })
    }
}

/// Fans one [`JobSpec`] out across a target list with bounded parallelism.
pub struct Dispatcher {
    engine: Arc<dyn ExecutionEngine>,
    limit: usize,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn ExecutionEngine>, forks: usize) -> Self {
        Self {
            engine,
            limit: forks.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `spec` once per target host.
    ///
    /// `vars` supplies each host's effective variables; hosts absent from the
    /// map run with none. The returned vector has exactly one entry per
    /// target, in target order. Cancellation abandons the whole batch and
    /// returns `Error::Cancelled`; partially completed jobs are discarded,
    /// not reported.
    pub async fn dispatch(
        &self,
        targets: &[String],
        vars: &HashMap<String, VarMap>,
        spec: &JobSpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<JobResult>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let run_id = short_run_id();
        dlog!(
            "dispatch {}: {} host(s), limit {}, timeout {:?}",
            run_id,
            targets.len(),
            self.limit,
            spec.timeout
        );

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut handles = Vec::with_capacity(targets.len());
        for (index, host) in targets.iter().enumerate() {
            let request = EngineRequest {
                host: host.clone(),
                variables: vars.get(host).cloned().unwrap_or_default(),
                inventory: spec.inventory.clone(),
                action: spec.action.clone(),
            };
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let timeout = spec.timeout;
            let cancel = cancel.clone();
            let run_id = run_id.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, None),
                };
                if cancel.is_cancelled() {
                    return (index, None);
                }

                let host = request.host.clone();
                let started = Instant::now();
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return (index, None),
                    ran = tokio::time::timeout(timeout, engine.run(request)) => match ran {
                        Ok(Ok(output)) => JobOutcome::Completed(output),
                        Ok(Err(error)) => JobOutcome::Failed {
                            message: error.to_string(),
                        },
                        Err(_) => JobOutcome::TimedOut { after: timeout },
                    },
                };
                let duration = started.elapsed();

                match &outcome {
                    JobOutcome::Completed(output) => dlog_debug!(
                        "dispatch {}: {} exited {} in {:?}",
                        run_id,
                        host,
                        output.exit_code,
                        duration
                    ),
                    JobOutcome::Failed { message } => {
                        dlog_warn!("dispatch {}: {} failed: {}", run_id, host, message)
                    }
                    JobOutcome::TimedOut { after } => {
                        dlog_warn!("dispatch {}: {} timed out after {:?}", run_id, host, after)
                    }
                }

                (
                    index,
                    Some(JobResult {
                        host,
                        outcome,
                        duration,
                    }),
                )
            }));
        }

        let mut slots: Vec<Option<JobResult>> = Vec::with_capacity(targets.len());
        slots.resize_with(targets.len(), || None);
        for (spawn_order, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok((index, Some(result))) => slots[index] = Some(result),
                Ok((_, None)) => {}
                Err(join_error) => {
                    // Spawn order equals target order, so the panicked task's
                    // slot is recoverable even though its index is lost.
                    dlog_warn!(
                        "dispatch {}: task for {} panicked: {}",
                        run_id,
                        targets[spawn_order],
                        join_error
                    );
                    slots[spawn_order] = Some(JobResult {
                        host: targets[spawn_order].clone(),
                        outcome: JobOutcome::Failed {
                            message: format!("task join error: {}", join_error),
                        },
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            dlog_warn!("dispatch {}: cancelled, discarding partial results", run_id);
            return Err(Error::Cancelled);
        }

        let mut results = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(result) => results.push(result),
                // Only reachable if a task bailed without the token being
                // cancelled, which the checks above rule out.
                None => results.push(JobResult {
                    host: targets[index].clone(),
                    outcome: JobOutcome::Failed {
                        message: "job did not complete".to_string(),
                    },
                    duration: Duration::ZERO,
                }),
            }
        }
        dlog!("dispatch {}: batch complete", run_id);
        Ok(results)
    }
}

fn short_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
