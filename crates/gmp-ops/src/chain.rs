//! Poll loop for a single chain.
//!
//! One `ChainRelayer` owns all mutable state of its chain: nothing else
//! writes its checkpoint, and tasks are processed strictly one at a time in
//! the order the task source returns them.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use gmp_planner::plan_task;
use gmp_store::CheckpointStore;
use gmp_sync::TaskSource;
use gmp_tx::{ChainSubmitter, Submission};
use gmp_types::{ChainConfig, CompletionCallbacks, RelayError, Result, Task, TaskId};

use crate::status::{RelayerState, StatusRegistry};
use crate::{RelayEvent, RelayEventHandler};

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Tasks returned by the source.
    pub fetched: usize,
    /// Tasks submitted and confirmed during this cycle.
    pub confirmed: usize,
    /// Tasks confirmed in an earlier cycle whose checkpoint was still pending.
    pub already_confirmed: usize,
    pub unsupported: usize,
    pub failed: usize,
    /// Checkpoint after the cycle.
    pub checkpoint: Option<TaskId>,
}

/// Relays the tasks of one chain.
pub struct ChainRelayer {
    chain: ChainConfig,
    source: Arc<dyn TaskSource>,
    store: Arc<dyn CheckpointStore>,
    submitter: ChainSubmitter,
    callbacks: Arc<dyn CompletionCallbacks>,
    status: StatusRegistry,
    on_event: Option<RelayEventHandler>,
    /// Confirmed tasks the checkpoint could not move to yet, because an
    /// earlier task in the same batch failed.
    confirmed_ahead: Vec<TaskId>,
}

impl ChainRelayer {
    pub fn new(
        chain: ChainConfig,
        source: Arc<dyn TaskSource>,
        store: Arc<dyn CheckpointStore>,
        submitter: ChainSubmitter,
        callbacks: Arc<dyn CompletionCallbacks>,
    ) -> Self {
        let status = StatusRegistry::new();
        status.register(&chain.name, submitter.is_dry_run());
        Self {
            chain,
            source,
            store,
            submitter,
            callbacks,
            status,
            on_event: None,
            confirmed_ahead: Vec::new(),
        }
    }

    /// Report into a shared registry instead of a private one.
    pub fn with_status(mut self, status: StatusRegistry) -> Self {
        status.register(&self.chain.name, self.submitter.is_dry_run());
        self.status = status;
        self
    }

    pub fn with_event_handler(mut self, handler: RelayEventHandler) -> Self {
        self.on_event = Some(handler);
        self
    }

    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(ref handler) = self.on_event {
            handler(event);
        }
    }

    fn set_state(&self, state: RelayerState) {
        self.status.set_state(&self.chain.name, state);
    }

    /// Checkpoint to resume from. An unreadable checkpoint counts as absent.
    async fn load_checkpoint(&self) -> Option<TaskId> {
        match self.store.load(&self.chain.name).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(
                    chain = %self.chain.name,
                    error = %e,
                    "failed to load checkpoint, polling from the beginning"
                );
                None
            }
        }
    }

    async fn advance(&self, task_id: &TaskId) -> Result<()> {
        self.set_state(RelayerState::Advancing);
        let saved = self.store.save(&self.chain.name, task_id).await;
        self.set_state(RelayerState::Processing);
        saved
    }

    /// Decode, classify and submit one task.
    async fn process_task(&self, task: &Task) -> Result<Submission> {
        let action = plan_task(&self.chain, task)?;
        info!(
            chain = %self.chain.name,
            task_id = %task.id,
            kind = %task.kind,
            destination = action.destination(),
            message_id = task.message_id().unwrap_or_default(),
            "processing task"
        );

        let callbacks = self.callbacks.as_ref();
        self.submitter
            .submit(action.destination(), action.payload(), || action.notify(callbacks))
            .await
    }

    fn record_failure(&self, task: &Task, err: &RelayError) {
        error!(
            chain = %self.chain.name,
            task_id = %task.id,
            error = %err,
            "task failed, will retry next poll"
        );
        self.status
            .update(&self.chain.name, |s| s.last_error = Some(err.to_string()));
        self.emit(RelayEvent::TaskFailed {
            chain: self.chain.name.clone(),
            task_id: task.id.clone(),
            message: err.to_string(),
        });
    }

    /// Run one poll cycle: fetch, then process each task in order.
    ///
    /// Never fails. Per-task errors are logged and the task is retried on a
    /// later cycle; the checkpoint only ever moves to a confirmed task whose
    /// predecessors in the batch are all confirmed or unsupported.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let chain = self.chain.name.clone();
        self.emit(RelayEvent::CycleStarted { chain: chain.clone() });
        self.set_state(RelayerState::Fetching);

        let checkpoint = self.load_checkpoint().await;
        let tasks = self.source.fetch_tasks_since(&self.chain, checkpoint.as_ref()).await;

        let mut report = CycleReport {
            fetched: tasks.len(),
            checkpoint,
            ..Default::default()
        };

        if tasks.is_empty() {
            debug!(chain = %chain, "no new tasks");
            return self.finish_cycle(report);
        }

        self.set_state(RelayerState::Processing);
        // Set once a retryable failure leaves a gap; the checkpoint must not
        // move past it for the rest of this batch.
        let mut frozen = false;

        for task in &tasks {
            if let Some(pos) = self.confirmed_ahead.iter().position(|id| *id == task.id) {
                report.already_confirmed += 1;
                if frozen {
                    continue;
                }
                match self.advance(&task.id).await {
                    Ok(()) => {
                        self.confirmed_ahead.remove(pos);
                        report.checkpoint = Some(task.id.clone());
                    }
                    Err(e) => {
                        report.failed += 1;
                        frozen = true;
                        self.record_failure(task, &e);
                    }
                }
                continue;
            }

            match self.process_task(task).await {
                Ok(submission) => {
                    self.emit(RelayEvent::TaskConfirmed {
                        chain: chain.clone(),
                        task_id: task.id.clone(),
                        tx_hash: submission.tx_hash().map(str::to_string),
                    });

                    if frozen {
                        debug!(
                            chain = %chain,
                            task_id = %task.id,
                            "confirmed behind a failed task, checkpoint deferred"
                        );
                        report.confirmed += 1;
                        self.confirmed_ahead.push(task.id.clone());
                        continue;
                    }

                    match self.advance(&task.id).await {
                        Ok(()) => {
                            info!(chain = %chain, task_id = %task.id, "task processed");
                            report.confirmed += 1;
                            report.checkpoint = Some(task.id.clone());
                        }
                        Err(e) => {
                            // Submitted but not durable: the task is not done.
                            // Remember it so the next cycle retries only the
                            // checkpoint write.
                            report.failed += 1;
                            frozen = true;
                            self.confirmed_ahead.push(task.id.clone());
                            self.record_failure(task, &e);
                        }
                    }
                }
                Err(e) if !e.is_retryable() => {
                    warn!(
                        chain = %chain,
                        task_id = %task.id,
                        kind = %task.kind,
                        reason = %e,
                        "task cannot be relayed, skipping"
                    );
                    report.unsupported += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    frozen = true;
                    self.record_failure(task, &e);
                }
            }
        }

        self.confirmed_ahead
            .retain(|id| tasks.iter().any(|t| t.id == *id));

        info!(
            chain = %chain,
            fetched = report.fetched,
            confirmed = report.confirmed,
            failed = report.failed,
            unsupported = report.unsupported,
            checkpoint = ?report.checkpoint,
            "poll cycle finished"
        );
        self.finish_cycle(report)
    }

    fn finish_cycle(&self, report: CycleReport) -> CycleReport {
        self.status.update(&self.chain.name, |s| {
            s.state = RelayerState::Idle;
            s.cycles += 1;
            s.confirmed += report.confirmed as u64;
            s.failed += report.failed as u64;
            s.unsupported += report.unsupported as u64;
            if report.checkpoint.is_some() {
                s.checkpoint = report.checkpoint.clone();
            }
        });
        self.emit(RelayEvent::CycleFinished {
            chain: self.chain.name.clone(),
            report: report.clone(),
        });
        report
    }

    /// Poll on a fixed interval until `shutdown` flips to `true`.
    ///
    /// The next tick is only awaited after the current cycle completes, and
    /// ticks missed meanwhile are skipped, so cycles never overlap.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.chain.poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            chain = %self.chain.name,
            interval_ms = self.chain.poll_interval_ms,
            dry_run = self.submitter.is_dry_run(),
            "starting poll loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            self.run_cycle().await;
        }

        self.set_state(RelayerState::Stopped);
        info!(chain = %self.chain.name, "poll loop stopped");
    }
}
