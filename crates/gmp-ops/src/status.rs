//! Per-chain relayer status, shared across chain loops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use gmp_types::TaskId;

/// Where a chain loop currently is in its poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayerState {
    Idle,
    Fetching,
    Processing,
    Advancing,
    Stopped,
}

/// Status snapshot for a single chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub chain: String,
    pub state: RelayerState,
    pub dry_run: bool,
    pub checkpoint: Option<TaskId>,
    pub cycles: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub unsupported: u64,
    pub last_error: Option<String>,
}

impl ChainStatus {
    pub fn new(chain: &str, dry_run: bool) -> Self {
        Self {
            chain: chain.to_string(),
            state: RelayerState::Idle,
            dry_run,
            checkpoint: None,
            cycles: 0,
            confirmed: 0,
            failed: 0,
            unsupported: 0,
            last_error: None,
        }
    }
}

/// Registry of chain statuses. Cheap to clone; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    chains: Arc<Mutex<HashMap<String, ChainStatus>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, chain: &str, dry_run: bool) {
        if let Ok(mut chains) = self.chains.lock() {
            chains
                .entry(chain.to_string())
                .or_insert_with(|| ChainStatus::new(chain, dry_run));
        }
    }

    /// Apply `f` to the status of `chain`, registering it if needed.
    pub fn update<F>(&self, chain: &str, f: F)
    where
        F: FnOnce(&mut ChainStatus),
    {
        // Status is best effort; a poisoned lock is ignored.
        if let Ok(mut chains) = self.chains.lock() {
            let status = chains
                .entry(chain.to_string())
                .or_insert_with(|| ChainStatus::new(chain, true));
            f(status);
        }
    }

    pub fn set_state(&self, chain: &str, state: RelayerState) {
        self.update(chain, |s| s.state = state);
    }

    pub fn get(&self, chain: &str) -> Option<ChainStatus> {
        self.chains.lock().ok()?.get(chain).cloned()
    }

    /// All chain statuses, sorted by chain name.
    pub fn snapshot(&self) -> Vec<ChainStatus> {
        let mut statuses: Vec<ChainStatus> = match self.chains.lock() {
            Ok(chains) => chains.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        statuses.sort_by(|a, b| a.chain.cmp(&b.chain));
        statuses
    }
}
