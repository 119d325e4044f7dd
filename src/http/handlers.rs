//! Axum handlers for the plugin-facing endpoints

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::{tracker::StatusReport, BridgeError};
use crate::{errors::AppError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

impl AckResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Serialize)]
pub struct PolledRequest {
    pub endpoint: String,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<PolledRequest>,
    pub mcp_connected: bool,
    pub plugin_connected: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadyRequest {
    pub timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResponse {
    pub request_id: String,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub error: Option<Value>,
}

impl PluginResponse {
    fn into_result(self) -> Result<Value, BridgeError> {
        match self.error {
            None | Some(Value::Null) => Ok(self.response),
            Some(Value::String(message)) if message.trim().is_empty() => Ok(self.response),
            Some(Value::String(message)) => Err(BridgeError::Remote { message }),
            Some(other) => Err(BridgeError::Remote {
                message: other.to_string(),
            }),
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.bridge.status().await)
}

pub async fn ready(State(state): State<AppState>, body: Bytes) -> Json<AckResponse> {
    let request: ReadyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            if !body.is_empty() {
                debug!(error = %err, body_bytes = body.len(), "ignoring malformed ready body");
            }
            ReadyRequest::default()
        }
    };
    state.bridge.mark_remote_ready().await;
    info!(timestamp = ?request.timestamp, "Studio plugin reported ready");
    AckResponse::ok()
}

pub async fn disconnect(State(state): State<AppState>) -> Json<AckResponse> {
    let cancelled = state.bridge.disconnect_remote().await;
    info!(cancelled, "Studio plugin disconnected, pending requests cleared");
    AckResponse::ok()
}

pub async fn poll(State(state): State<AppState>) -> Result<Json<PollResponse>, AppError> {
    let next = state.bridge.poll().await?;

    let (request_id, request) = match next {
        Some(call) => (
            Some(call.id),
            Some(PolledRequest {
                endpoint: call.endpoint,
                payload: call.payload,
            }),
        ),
        None => (None, None),
    };

    Ok(Json(PollResponse {
        request_id,
        request,
        mcp_connected: true,
        plugin_connected: true,
    }))
}

pub async fn response(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AckResponse>, AppError> {
    let delivered: PluginResponse = serde_json::from_slice(&body).map_err(|err| {
        AppError::bad_request("invalid_response_body", format!("invalid response body: {err}"))
    })?;

    let Ok(id) = Uuid::parse_str(delivered.request_id.trim()) else {
        warn!(request_id = %delivered.request_id, "response carried a malformed request id");
        return Ok(AckResponse::ok());
    };

    match state.bridge.deliver_response(id, delivered.into_result()).await {
        Ok(()) => debug!(request_id = %id, "plugin response delivered"),
        Err(err) => warn!(request_id = %id, error = %err, "discarding plugin response"),
    }

    Ok(AckResponse::ok())
}
