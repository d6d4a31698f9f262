//! File-backed checkpoint store.
//!
//! Layout: one `latestTask-{chain}.json` file per chain inside a directory,
//! holding the task id as a JSON string.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::CheckpointStore;
use gmp_types::{RelayError, Result, TaskId};

/// Checkpoint store writing one JSON file per chain.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the checkpoint file for `chain`.
    pub fn path_for(&self, chain: &str) -> Result<PathBuf> {
        if chain.is_empty() || chain.contains(['/', '\\']) || chain.starts_with('.') {
            return Err(RelayError::Store(format!("invalid chain name: {:?}", chain)));
        }
        Ok(self.dir.join(format!("latestTask-{}.json", chain)))
    }
}

fn parse_checkpoint(content: &str) -> Result<Option<TaskId>> {
    let content = content.trim();
    if content.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| RelayError::Store(format!("corrupt checkpoint: {}", e)))?;

    match value {
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => Ok(Some(TaskId::new(s))),
        serde_json::Value::Number(n) => Ok(Some(TaskId::new(n.to_string()))),
        serde_json::Value::Null => Ok(None),
        other => Err(RelayError::Store(format!(
            "unexpected checkpoint value: {}",
            other
        ))),
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            RelayError::Store(format!(
                "failed to create checkpoint dir {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    async fn load(&self, chain: &str) -> Result<Option<TaskId>> {
        let path = self.path_for(chain)?;
        match fs::read_to_string(&path).await {
            Ok(content) => parse_checkpoint(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelayError::Store(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, chain: &str, task_id: &TaskId) -> Result<()> {
        let path = self.path_for(chain)?;
        let tmp = self.dir.join(format!(".latestTask-{}.json.tmp", chain));
        let body = serde_json::to_vec(task_id.as_str())
            .map_err(|e| RelayError::Store(e.to_string()))?;

        let write = async {
            fs::create_dir_all(&self.dir).await?;
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await
        };
        write.await.map_err(|e: std::io::Error| {
            RelayError::Store(format!("failed to write {}: {}", path.display(), e))
        })?;

        debug!(chain, task_id = %task_id, path = %path.display(), "checkpoint saved");
        Ok(())
    }
}
