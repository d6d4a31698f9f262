//! Shared types for the GMP relayer: tasks, chain configuration, errors,
//! completion callbacks and the payload transport encoding.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// 0x-prefixed hex string (e.g. "0x1234...").
pub type Hex = String;

/// Relayer error types.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid payload encoding: {0}")]
    InvalidPayload(String),

    #[error("task is missing field `{0}`")]
    MissingField(&'static str),

    #[error("unsupported task type: {0}")]
    UnsupportedTask(String),

    #[error("task source error: {0}")]
    Source(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("checkpoint store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether the failed task should be attempted again on the next poll.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RelayError::UnsupportedTask(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Opaque task identifier assigned by the GMP API.
///
/// Doubles as the checkpoint value. Ordering is defined by the API, so no
/// `Ord` impl is provided.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl<'de> Deserialize<'de> for TaskId {
    /// Accepts a JSON string or number; numbers keep their textual form.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Number(n) => Self(n.to_string()),
        })
    }
}

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Declared task type. Anything the relayer does not handle is kept as
/// `Unknown` so that a single odd task never fails a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    GatewayTx,
    Execute,
    Unknown(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::GatewayTx => "GATEWAY_TX",
            TaskKind::Execute => "EXECUTE",
            TaskKind::Unknown(other) => other,
        }
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "GATEWAY_TX" => TaskKind::GatewayTx,
            "EXECUTE" => TaskKind::Execute,
            _ => TaskKind::Unknown(s),
        }
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-chain message metadata attached to EXECUTE tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmpMessage {
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<Hex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
}

/// Type-specific task body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    /// Base64 execute data (GATEWAY_TX).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_data: Option<String>,
    /// Base64 message payload (EXECUTE).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<GmpMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_gas_balance: Option<serde_json::Value>,
}

/// A unit of relay work returned by the GMP API.
///
/// The body stays untyped until a known kind needs it, so tasks of kinds the
/// relayer does not handle can carry any shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub task: serde_json::Value,
}

impl Task {
    /// Typed view of the body. A missing or `null` body is empty.
    pub fn body(&self) -> Result<TaskBody> {
        if self.task.is_null() {
            return Ok(TaskBody::default());
        }
        serde_json::from_value(self.task.clone())
            .map_err(|e| RelayError::InvalidPayload(format!("malformed task body: {}", e)))
    }

    /// Destination hint carried by EXECUTE tasks.
    pub fn destination_hint(&self) -> Option<&str> {
        self.task
            .pointer("/message/destinationAddress")
            .and_then(serde_json::Value::as_str)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.task
            .pointer("/message/messageID")
            .and_then(serde_json::Value::as_str)
    }
}

/// Static per-chain configuration, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    pub gateway_address: Hex,
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Receipt lookups before a submission is considered unconfirmed.
    #[serde(default = "default_confirmation_attempts")]
    pub confirmation_attempts: u32,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_confirmation_attempts() -> u32 {
    60
}

fn default_confirmation_poll_ms() -> u64 {
    2_000
}

impl ChainConfig {
    pub fn new(name: &str, rpc_url: &str, gateway_address: &str) -> Self {
        Self {
            name: name.to_string(),
            rpc_url: rpc_url.to_string(),
            gateway_address: gateway_address.to_string(),
            poll_interval_ms: default_poll_interval_ms(),
            confirmation_attempts: default_confirmation_attempts(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
        }
    }
}

/// Downstream effects fired once per confirmed task.
///
/// `on_approve` follows a GATEWAY_TX task, `on_execute` an EXECUTE task.
pub trait CompletionCallbacks: Send + Sync {
    fn on_approve(&self);
    fn on_execute(&self);
}

/// Callbacks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl CompletionCallbacks for NoopCallbacks {
    fn on_approve(&self) {}
    fn on_execute(&self) {}
}

/// Adapts a pair of closures to [`CompletionCallbacks`].
pub struct FnCallbacks<A, E> {
    approve: A,
    execute: E,
}

impl<A, E> FnCallbacks<A, E>
where
    A: Fn() + Send + Sync,
    E: Fn() + Send + Sync,
{
    pub fn new(approve: A, execute: E) -> Self {
        Self { approve, execute }
    }
}

impl<A, E> CompletionCallbacks for FnCallbacks<A, E>
where
    A: Fn() + Send + Sync,
    E: Fn() + Send + Sync,
{
    fn on_approve(&self) {
        (self.approve)()
    }

    fn on_execute(&self) {
        (self.execute)()
    }
}

/// Decode a transport-encoded (standard base64) task payload.
pub fn decode_payload(raw: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(raw.trim())
        .map_err(|e| RelayError::InvalidPayload(e.to_string()))
}

/// Encode bytes with the payload transport encoding.
pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Convert bytes to a 0x-prefixed hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
