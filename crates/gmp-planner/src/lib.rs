//! Task classification and relay planning.
//!
//! - GATEWAY_TX: decode `executeData`, send to the chain's gateway contract
//! - EXECUTE: decode `payload`, send to the message's destination address
//! - anything else: unsupported, never submitted

use std::fmt;

use gmp_types::{
    bytes_to_hex, decode_payload, ChainConfig, CompletionCallbacks, Hex, RelayError, Result,
    Task, TaskBody, TaskKind,
};

/// A classified task, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Gateway approval; confirmation fires `on_approve`.
    GatewayTx { destination: Hex, payload: Vec<u8> },
    /// Destination contract execution; confirmation fires `on_execute`.
    Execute { destination: Hex, payload: Vec<u8> },
}

impl RelayAction {
    pub fn destination(&self) -> &str {
        match self {
            RelayAction::GatewayTx { destination, .. }
            | RelayAction::Execute { destination, .. } => destination,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            RelayAction::GatewayTx { payload, .. }
            | RelayAction::Execute { payload, .. } => payload,
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            RelayAction::GatewayTx { .. } => TaskKind::GatewayTx,
            RelayAction::Execute { .. } => TaskKind::Execute,
        }
    }

    /// Fire the completion callback bound to this action's task type.
    pub fn notify(&self, callbacks: &dyn CompletionCallbacks) {
        match self {
            RelayAction::GatewayTx { .. } => callbacks.on_approve(),
            RelayAction::Execute { .. } => callbacks.on_execute(),
        }
    }
}

impl fmt::Display for RelayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} ({})",
            self.kind(),
            self.destination(),
            bytes_to_hex(self.payload())
        )
    }
}

/// Transport-encoded payload field of `body`, chosen by the task type.
pub fn raw_payload<'a>(kind: &TaskKind, body: &'a TaskBody) -> Result<&'a str> {
    match kind {
        TaskKind::GatewayTx => body
            .execute_data
            .as_deref()
            .ok_or(RelayError::MissingField("task.executeData")),
        TaskKind::Execute => body
            .payload
            .as_deref()
            .ok_or(RelayError::MissingField("task.payload")),
        TaskKind::Unknown(other) => Err(RelayError::UnsupportedTask(other.clone())),
    }
}

/// Classify `task` and decode its payload.
///
/// Unsupported types fail with `RelayError::UnsupportedTask` whatever their
/// body looks like; a missing or malformed payload fails with a retryable
/// error.
pub fn plan_task(chain: &ChainConfig, task: &Task) -> Result<RelayAction> {
    if let TaskKind::Unknown(ref other) = task.kind {
        return Err(RelayError::UnsupportedTask(other.clone()));
    }

    let body = task.body()?;
    let payload = decode_payload(raw_payload(&task.kind, &body)?)?;

    match task.kind {
        TaskKind::GatewayTx => Ok(RelayAction::GatewayTx {
            destination: chain.gateway_address.clone(),
            payload,
        }),
        TaskKind::Execute => {
            let destination = body
                .message
                .and_then(|m| m.destination_address)
                .filter(|d| !d.is_empty())
                .ok_or(RelayError::MissingField("task.message.destinationAddress"))?;
            Ok(RelayAction::Execute { destination, payload })
        }
        TaskKind::Unknown(ref other) => Err(RelayError::UnsupportedTask(other.clone())),
    }
}
