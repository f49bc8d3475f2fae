//! Startup preload: run independent top-level fetches concurrently under
//! one overall deadline and report whatever finished.
//!
//! Fetches are spawned as tasks, so ones still running at the deadline keep
//! going in the background (and still populate the cache through the
//! coordinator) after [`PreloadOrchestrator::preload`] has returned.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::models::{Resource, ResourceClass};

/// One fetch to run during preload.
pub struct PreloadSpec {
    pub class: ResourceClass,
    pub label: String,
    fetch: BoxFuture<'static, SyncResult<Resource>>,
}

impl PreloadSpec {
    pub fn new(
        class: ResourceClass,
        label: impl Into<String>,
        fetch: impl Future<Output = SyncResult<Resource>> + Send + 'static,
    ) -> Self {
        Self {
            class,
            label: label.into(),
            fetch: fetch.boxed(),
        }
    }
}

impl std::fmt::Debug for PreloadSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadSpec")
            .field("class", &self.class)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreloadOutcome {
    Loaded(Resource),
    Failed(SyncError),
    /// Still running when the deadline passed.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreloadEntry {
    pub class: ResourceClass,
    pub label: String,
    pub outcome: PreloadOutcome,
}

impl PreloadEntry {
    /// The outcome as a result; an incomplete fetch becomes
    /// [`SyncError::Timeout`].
    pub fn into_result(self) -> SyncResult<Resource> {
        match self.outcome {
            PreloadOutcome::Loaded(resource) => Ok(resource),
            PreloadOutcome::Failed(err) => Err(err),
            PreloadOutcome::Incomplete => Err(SyncError::Timeout(self.label)),
        }
    }
}

/// Partial results, in the order the specs were given.
#[derive(Debug, Clone)]
pub struct PreloadReport {
    pub entries: Vec<PreloadEntry>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl PreloadReport {
    pub fn get(&self, label: &str) -> Option<&PreloadOutcome> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| &e.outcome)
    }

    pub fn loaded(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::Loaded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::Failed(_)))
    }

    pub fn incomplete(&self) -> usize {
        self.count(|o| matches!(o, PreloadOutcome::Incomplete))
    }

    fn count(&self, pred: impl Fn(&PreloadOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.timed_out && self.failed() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PreloadOrchestrator {
    overall_timeout: Duration,
}

impl PreloadOrchestrator {
    pub fn new(overall_timeout: Duration) -> Self {
        Self { overall_timeout }
    }

    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    /// Run every fetch concurrently. Returns when all have finished or the
    /// overall timeout elapses, whichever is first. Never fails as a whole.
    /// A timeout too large to represent as an instant means no deadline.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn preload(&self, specs: Vec<PreloadSpec>) -> PreloadReport {
        let started = Instant::now();
        let deadline = started.checked_add(self.overall_timeout);
        info!(count = specs.len(), timeout = ?self.overall_timeout, "Preload starting");

        let mut entries: Vec<PreloadEntry> = Vec::with_capacity(specs.len());
        let mut running = FuturesUnordered::new();
        for (index, spec) in specs.into_iter().enumerate() {
            entries.push(PreloadEntry {
                class: spec.class,
                label: spec.label,
                outcome: PreloadOutcome::Incomplete,
            });
            let handle = tokio::spawn(spec.fetch);
            running.push(handle.map(move |joined| (index, joined)));
        }

        let timed_out = loop {
            let next = match deadline {
                Some(deadline) => timeout_at(deadline, running.next()).await,
                None => Ok(running.next().await),
            };
            match next {
                Ok(Some((index, joined))) => {
                    let entry = &mut entries[index];
                    entry.outcome = match joined {
                        Ok(Ok(resource)) => PreloadOutcome::Loaded(resource),
                        Ok(Err(err)) => {
                            warn!(label = %entry.label, error = %err, "Preload fetch failed");
                            PreloadOutcome::Failed(err)
                        }
                        Err(join_err) => {
                            error!(label = %entry.label, error = %join_err, "Preload task panicked");
                            PreloadOutcome::Failed(SyncError::Task(join_err.to_string()))
                        }
                    };
                }
                Ok(None) => break false,
                Err(_) => break true,
            }
        };
        // Dropping the join handles detaches the tasks that are still running.
        drop(running);

        let report = PreloadReport {
            entries,
            timed_out,
            elapsed: started.elapsed(),
        };
        info!(
            loaded = report.loaded(),
            failed = report.failed(),
            incomplete = report.incomplete(),
            timed_out,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Preload finished"
        );
        report
    }
}
