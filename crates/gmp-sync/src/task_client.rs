//! HTTP client for the GMP task API.
//!
//! Endpoints:
//! - GET /chains/{chain}/tasks[?after=<task id>][&limit=<n>]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use gmp_types::{RelayError, Result, Task, TaskId};

/// Client certificate material for mutual TLS.
#[derive(Clone)]
pub struct ClientTls {
    /// PEM-encoded client certificate chain.
    pub cert_pem: Vec<u8>,
    /// PEM-encoded private key for `cert_pem`.
    pub key_pem: Vec<u8>,
    /// Skip server certificate verification.
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for ClientTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTls")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Task list response body. Entries stay raw until [`parse_tasks`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksResponse {
    #[serde(default)]
    pub tasks: Vec<serde_json::Value>,
}

/// Convert raw entries one by one, dropping those that are not tasks at all
/// (no usable `id` or `type`). Order is preserved.
pub fn parse_tasks(chain: &str, entries: Vec<serde_json::Value>) -> Vec<Task> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Task>(entry) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(chain, index, error = %e, "dropping malformed task entry");
                None
            }
        })
        .collect()
}

/// GMP API client.
pub struct GmpApiClient {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl GmpApiClient {
    pub fn new(base_url: &str, tls: Option<&ClientTls>, timeout_ms: Option<u64>) -> Result<Self> {
        let timeout_ms = timeout_ms.unwrap_or(20_000);
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| RelayError::Config(format!("invalid GMP API url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::Config(format!("GMP API url {} cannot be a base", base_url)));
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(timeout_ms));
        if let Some(tls) = tls {
            let mut pem = tls.cert_pem.clone();
            pem.push(b'\n');
            pem.extend_from_slice(&tls.key_pem);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| RelayError::Config(format!("invalid client certificate: {}", e)))?;
            builder = builder
                .identity(identity)
                .danger_accept_invalid_certs(tls.accept_invalid_certs);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// URL for the task list of `chain`, with the cursor appended only when
    /// one exists.
    pub fn tasks_url(&self, chain: &str, after: Option<&TaskId>, limit: Option<u32>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["chains", chain, "tasks"]);
        }
        if after.is_some() || limit.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(after) = after {
                query.append_pair("after", after.as_str());
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        url
    }

    /// Fetch tasks newer than `after`, in API order.
    pub async fn list_tasks(
        &self,
        chain: &str,
        after: Option<&TaskId>,
        limit: Option<u32>,
    ) -> Result<Vec<Task>> {
        let url = self.tasks_url(chain, after, limit);
        debug!(chain, url = %url, "polling tasks");

        let resp = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RelayError::Source(format!("task request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Source(format!(
                "GMP API returned status {}: {}",
                status, body
            )));
        }

        let body: TasksResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Source(format!("failed to parse task response: {}", e)))?;

        Ok(parse_tasks(chain, body.tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tasks_body() -> serde_json::Value {
        serde_json::json!({
            "tasks": [
                { "id": "5", "type": "GATEWAY_TX", "task": { "executeData": "qw==" } },
                { "id": "6", "type": "EXECUTE", "task": {
                    "payload": "zQ==",
                    "message": { "destinationAddress": "0xdead" }
                } }
            ]
        })
    }

    #[test]
    fn test_tasks_url() {
        let client = GmpApiClient::new("https://gmp.example/api/", None, None).unwrap();
        assert_eq!(
            client.tasks_url("ethereum", None, None).as_str(),
            "https://gmp.example/api/chains/ethereum/tasks"
        );
        assert_eq!(
            client
                .tasks_url("ethereum", Some(&TaskId::new("5")), Some(10))
                .as_str(),
            "https://gmp.example/api/chains/ethereum/tasks?after=5&limit=10"
        );
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            GmpApiClient::new("not a url", None, None),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_bad_identity() {
        let tls = ClientTls {
            cert_pem: b"garbage".to_vec(),
            key_pem: b"garbage".to_vec(),
            accept_invalid_certs: false,
        };
        assert!(GmpApiClient::new("https://gmp.example", Some(&tls), None).is_err());
    }

    #[test]
    fn test_accepts_pem_identity() {
        let tls = ClientTls {
            cert_pem: include_bytes!("../../../tests/vectors/client.crt").to_vec(),
            key_pem: include_bytes!("../../../tests/vectors/client.key").to_vec(),
            accept_invalid_certs: false,
        };
        GmpApiClient::new("https://gmp.example", Some(&tls), None).unwrap();

        let insecure = ClientTls { accept_invalid_certs: true, ..tls };
        GmpApiClient::new("https://gmp.example", Some(&insecure), Some(1_000)).unwrap();
    }

    #[tokio::test]
    async fn test_odd_entries_do_not_fail_the_batch() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "tasks": [
                { "id": "5", "type": "GATEWAY_TX", "task": { "executeData": "qw==" } },
                { "id": "7", "type": "REFUND", "task": null },
                { "id": 8, "type": "EXECUTE", "timestamp": 1700000000, "task": {
                    "payload": "zQ==",
                    "message": { "destinationAddress": "0xdead" }
                } },
                { "id": "9", "type": "REFUND", "task": { "payload": { "amount": "1" } } },
                { "type": "EXECUTE", "task": {} },
                "garbage"
            ]
        });
        Mock::given(method("GET"))
            .and(path("/chains/ethereum/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = GmpApiClient::new(&server.uri(), None, Some(2_000)).unwrap();
        let tasks = client.list_tasks("ethereum", None, None).await.unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["5", "7", "8", "9"]);
        assert_eq!(tasks[2].destination_hint(), Some("0xdead"));
    }

    #[tokio::test]
    async fn test_list_tasks_from_beginning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chains/ethereum/tasks"))
            .and(query_param_is_missing("after"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tasks_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = GmpApiClient::new(&server.uri(), None, Some(2_000)).unwrap();
        let tasks = client.list_tasks("ethereum", None, None).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, TaskId::new("5"));
        assert_eq!(tasks[1].destination_hint(), Some("0xdead"));
    }

    #[tokio::test]
    async fn test_list_tasks_after_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chains/ethereum/tasks"))
            .and(query_param("after", "6"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tasks": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GmpApiClient::new(&server.uri(), None, Some(2_000)).unwrap();
        let tasks = client
            .list_tasks("ethereum", Some(&TaskId::new("6")), None)
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = GmpApiClient::new(&server.uri(), None, Some(2_000)).unwrap();
        let err = client.list_tasks("ethereum", None, None).await.unwrap_err();
        assert!(matches!(err, RelayError::Source(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_malformed_body_is_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = GmpApiClient::new(&server.uri(), None, Some(2_000)).unwrap();
        assert!(client.list_tasks("ethereum", None, None).await.is_err());
    }
}
