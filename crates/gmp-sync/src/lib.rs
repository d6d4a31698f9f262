//! Task source for the GMP relayer.
//!
//! Polls the GMP API for tasks newer than a chain's checkpoint. Fetching is
//! fail-soft: any network or API failure is logged and yields an empty batch,
//! so a flaky API never takes the relayer down.

pub mod task_client;

use async_trait::async_trait;
use tracing::{debug, error, info};

use gmp_types::{ChainConfig, Result, Task, TaskId};
use task_client::GmpApiClient;

pub use task_client::{parse_tasks, ClientTls, TasksResponse};

/// Task source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    /// Optional `limit` query parameter; `None` lets the API choose.
    pub page_size: Option<u32>,
    pub request_timeout_ms: u64,
    pub tls: Option<ClientTls>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_size: None,
            request_timeout_ms: 20_000,
            tls: None,
        }
    }
}

/// An ordered, possibly-flaky event source of relay tasks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Tasks strictly after `after` (or the whole history when `None`), in
    /// the order they must be processed. Never fails: errors yield an empty
    /// batch.
    async fn fetch_tasks_since(&self, chain: &ChainConfig, after: Option<&TaskId>) -> Vec<Task>;
}

/// `TaskSource` backed by the GMP HTTP API.
pub struct GmpTaskSource {
    client: GmpApiClient,
    page_size: Option<u32>,
}

impl GmpTaskSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = GmpApiClient::new(
            &config.base_url,
            config.tls.as_ref(),
            Some(config.request_timeout_ms),
        )?;
        Ok(Self { client, page_size: config.page_size })
    }
}

#[async_trait]
impl TaskSource for GmpTaskSource {
    async fn fetch_tasks_since(&self, chain: &ChainConfig, after: Option<&TaskId>) -> Vec<Task> {
        let tasks = match self.client.list_tasks(&chain.name, after, self.page_size).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(chain = %chain.name, error = %e, "failed to poll tasks");
                return Vec::new();
            }
        };

        let tasks = exclude_seen(tasks, after);
        if tasks.is_empty() {
            debug!(chain = %chain.name, "no new tasks");
        } else {
            info!(chain = %chain.name, count = tasks.len(), "fetched tasks");
        }
        tasks
    }
}

/// Drop the cursor task and repeated ids, keeping API order.
pub fn exclude_seen(tasks: Vec<Task>, after: Option<&TaskId>) -> Vec<Task> {
    let mut seen = std::collections::HashSet::new();
    tasks
        .into_iter()
        .filter(|t| after != Some(&t.id))
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chain() -> ChainConfig {
        ChainConfig::new(
            "ethereum",
            "http://localhost:8545",
            "0x4F4495243837681061C4743b74B3eEdf548D56A5",
        )
    }

    fn source(uri: &str) -> GmpTaskSource {
        GmpTaskSource::new(&SourceConfig {
            base_url: uri.to_string(),
            request_timeout_ms: 2_000,
            ..Default::default()
        })
        .unwrap()
    }

    fn task(id: &str) -> Task {
        serde_json::from_value(serde_json::json!({ "id": id, "type": "GATEWAY_TX" })).unwrap()
    }

    #[test]
    fn test_exclude_seen() {
        let tasks = vec![task("6"), task("7"), task("7"), task("8")];
        let ids: Vec<_> = exclude_seen(tasks, Some(&TaskId::new("6")))
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["7", "8"]);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tasks = source(&server.uri()).fetch_tasks_since(&chain(), None).await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_yields_empty_batch() {
        // Nothing listens on the discard port.
        let tasks = source("http://127.0.0.1:9").fetch_tasks_since(&chain(), None).await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_fetch_without_new_tasks_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chains/ethereum/tasks"))
            .and(query_param("after", "6"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tasks": [] })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let source = source(&server.uri());
        let cursor = TaskId::new("6");
        assert!(source.fetch_tasks_since(&chain(), Some(&cursor)).await.is_empty());
        assert!(source.fetch_tasks_since(&chain(), Some(&cursor)).await.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_task_echoed_by_server_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("after", "6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tasks": [
                    { "id": "6", "type": "GATEWAY_TX" },
                    { "id": "7", "type": "GATEWAY_TX" }
                ]
            })))
            .mount(&server)
            .await;

        let tasks = source(&server.uri())
            .fetch_tasks_since(&chain(), Some(&TaskId::new("6")))
            .await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, TaskId::new("7"));
    }
}
