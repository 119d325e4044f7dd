use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure kinds produced by the request bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("MCP server not connected")]
    NotReady,
    #[error("request timed out after {}s without a plugin response", waited.as_secs())]
    Timeout { waited: Duration },
    #[error("request cancelled: {reason}")]
    Disconnected { reason: String },
    #[error("plugin reported an error: {message}")]
    Remote { message: String },
    #[error("no pending request with id {id}")]
    UnknownCorrelation { id: Uuid },
    #[error("request was dropped before completion")]
    Abandoned,
}

impl BridgeError {
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }
}
