//! Relay orchestration: one checkpointed poll loop per chain.
//!
//! Each chain loop fetches tasks after its checkpoint, plans and submits
//! them in order, fires the completion callbacks and advances the
//! checkpoint. Loops share nothing but the status registry and the event
//! handler.

pub mod chain;
pub mod status;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use gmp_types::TaskId;

pub use chain::{ChainRelayer, CycleReport};
pub use status::{ChainStatus, RelayerState, StatusRegistry};

/// Relay event for progress reporting.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    CycleStarted { chain: String },
    TaskConfirmed { chain: String, task_id: TaskId, tx_hash: Option<String> },
    TaskFailed { chain: String, task_id: TaskId, message: String },
    CycleFinished { chain: String, report: CycleReport },
}

/// Callback type for relay events. Shared by every chain loop.
pub type RelayEventHandler = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Collects chain relayers and starts them together.
#[derive(Default)]
pub struct Relayer {
    chains: Vec<ChainRelayer>,
    status: StatusRegistry,
    on_event: Option<RelayEventHandler>,
}

impl Relayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_handler(mut self, handler: RelayEventHandler) -> Self {
        self.on_event = Some(handler);
        self
    }

    pub fn add_chain(&mut self, relayer: ChainRelayer) {
        let mut relayer = relayer.with_status(self.status.clone());
        if let Some(ref handler) = self.on_event {
            relayer = relayer.with_event_handler(handler.clone());
        }
        self.chains.push(relayer);
    }

    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }

    /// Spawn one tokio task per chain.
    pub fn spawn(self) -> RelayerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = self
            .chains
            .into_iter()
            .map(|relayer| tokio::spawn(relayer.run(shutdown_rx.clone())))
            .collect::<Vec<_>>();
        info!(chains = joins.len(), "relayer started");
        RelayerHandle { shutdown_tx, joins, status: self.status }
    }
}

/// Handle to running chain loops.
pub struct RelayerHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    status: StatusRegistry,
}

impl RelayerHandle {
    /// Ask every loop to stop after its in-flight cycle.
    pub fn request_shutdown(&self) {
        // Loops that already exited have dropped their receivers.
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
        info!("relayer stopped");
    }

    pub fn status(&self) -> Vec<ChainStatus> {
        self.status.snapshot()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use gmp_store::{CheckpointStore, MemoryStore};
    use gmp_tx::ChainSubmitter;
    use gmp_types::{ChainConfig, Task};
    use std::sync::Mutex;
    use std::time::Duration;

    fn relayer_for(name: &str, store: Arc<MemoryStore>, tasks: Vec<Task>) -> ChainRelayer {
        let mut chain = ChainConfig::new(
            name,
            "http://localhost:8545",
            "0x4F4495243837681061C4743b74B3eEdf548D56A5",
        );
        chain.poll_interval_ms = 500;
        ChainRelayer::new(
            chain.clone(),
            Arc::new(ScriptedSource::new(tasks)),
            store,
            ChainSubmitter::dry_run(&chain),
            Arc::new(CountingCallbacks::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_chains_run_independently() {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut relayer = Relayer::new()
            .with_event_handler(Arc::new(move |e: RelayEvent| sink.lock().unwrap().push(e)));
        relayer.add_chain(relayer_for("avalanche", store.clone(), vec![gateway_task("3", "qw==")]));
        relayer.add_chain(relayer_for(
            "fantom",
            store.clone(),
            vec![execute_task("9", "zQ==", "0xdead"), unsupported_task("10")],
        ));

        let handle = relayer.spawn();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let running = handle.status();
        handle.shutdown_and_join().await;

        assert_eq!(store.load("avalanche").await.unwrap(), Some(TaskId::new("3")));
        assert_eq!(store.load("fantom").await.unwrap(), Some(TaskId::new("9")));

        assert_eq!(running.len(), 2);
        assert_eq!(running[0].chain, "avalanche");
        assert_eq!(running[1].unsupported, 3);
        assert!(running.iter().all(|s| s.cycles == 3));

        let confirmed = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, RelayEvent::TaskConfirmed { .. }))
            .count();
        assert_eq!(confirmed, 2);
    }

    #[tokio::test]
    async fn test_shutdown_marks_chains_stopped() {
        let mut relayer = Relayer::new();
        relayer.add_chain(relayer_for("polygon", Arc::new(MemoryStore::new()), vec![]));
        let status = relayer.status().clone();

        relayer.spawn().shutdown_and_join().await;

        assert_eq!(status.get("polygon").unwrap().state, RelayerState::Stopped);
    }
}
