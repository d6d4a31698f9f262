//! Checkpoint storage for the GMP relayer.
//!
//! Defines the `CheckpointStore` trait: one record per chain name holding the
//! id of the last task whose submission was confirmed. Provides a
//! `MemoryStore` for testing and a `FileStore` for durable local use.

use async_trait::async_trait;
use gmp_types::{Result, TaskId};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key-value checkpoint persistence, keyed by chain name.
///
/// All methods are async to support both in-memory and persistent backends.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    // --- Lifecycle ---
    async fn init(&self) -> Result<()> { Ok(()) }
    async fn close(&self) -> Result<()> { Ok(()) }

    // --- Checkpoints ---

    /// Last confirmed task for `chain`, or `None` to start from the beginning.
    async fn load(&self, chain: &str) -> Result<Option<TaskId>>;

    /// Record `task_id` as the last confirmed task. Saving the same value
    /// twice is a no-op.
    async fn save(&self, chain: &str, task_id: &TaskId) -> Result<()>;
}
