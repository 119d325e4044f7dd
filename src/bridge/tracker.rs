//! Readiness flags for both sides of the bridge.
//!
//! The three signals are kept separate so an operator can tell "nothing
//! attached yet" apart from "waiting for the plugin".

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ConnectionTracker {
    transport_listening: bool,
    tool_protocol_active: bool,
    remote_connected: bool,
    last_seen: Option<Instant>,
    last_seen_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub transport_listening: bool,
    pub tool_protocol_active: bool,
    pub remote_connected: bool,
    pub last_seen_utc: Option<DateTime<Utc>>,
}

impl ConnectionSnapshot {
    pub fn fully_connected(&self) -> bool {
        self.tool_protocol_active && self.remote_connected
    }

    /// Operator-facing description, `None` once both sides are attached.
    pub fn waiting_message(&self) -> Option<&'static str> {
        match (self.remote_connected, self.tool_protocol_active) {
            (true, true) => None,
            (true, false) => Some("Studio plugin connected, but MCP server inactive"),
            (false, true) => Some("MCP server active, waiting for Studio plugin..."),
            (false, false) => Some("Waiting for connections..."),
        }
    }
}

/// Wire shape of `GET /status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub plugin_connected: bool,
    pub mcp_server_active: bool,
    pub http_server_listening: bool,
    pub fully_connected: bool,
    pub pending_requests: usize,
    pub last_plugin_activity: Option<String>,
}

impl StatusReport {
    pub fn new(snapshot: ConnectionSnapshot, pending_requests: usize) -> Self {
        Self {
            plugin_connected: snapshot.remote_connected,
            mcp_server_active: snapshot.tool_protocol_active,
            http_server_listening: snapshot.transport_listening,
            fully_connected: snapshot.fully_connected(),
            pending_requests,
            last_plugin_activity: snapshot
                .last_seen_utc
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_transport_listening(&mut self) {
        if !self.transport_listening {
            self.transport_listening = true;
            info!("http transport listening");
        }
    }

    pub fn mark_tool_protocol_active(&mut self) {
        if !self.tool_protocol_active {
            self.tool_protocol_active = true;
            info!("MCP server marked as active");
        }
    }

    pub fn is_tool_protocol_active(&self) -> bool {
        self.tool_protocol_active
    }

    pub fn mark_remote_seen(&mut self) {
        if !self.remote_connected {
            info!(reason = "plugin_contact", "Studio plugin connected");
        }
        self.remote_connected = true;
        self.last_seen = Some(Instant::now());
        self.last_seen_utc = Some(Utc::now());
    }

    pub fn mark_remote_disconnected(&mut self, reason: &'static str) {
        if self.remote_connected {
            info!(reason, "Studio plugin disconnected");
        }
        self.remote_connected = false;
    }

    /// Flips `remote_connected` off when the plugin has been silent for longer
    /// than `idle`. Returns true when the flag changed.
    pub fn expire_idle_remote(&mut self, idle: Duration) -> bool {
        let Some(last_seen) = self.last_seen else {
            return false;
        };

        if !self.remote_connected || last_seen.elapsed() <= idle {
            return false;
        }

        warn!(
            reason = "idle_timeout",
            idle_secs = last_seen.elapsed().as_secs(),
            "Studio plugin marked disconnected after inactivity"
        );
        self.remote_connected = false;
        true
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            transport_listening: self.transport_listening,
            tool_protocol_active: self.tool_protocol_active,
            remote_connected: self.remote_connected,
            last_seen_utc: self.last_seen_utc,
        }
    }
}
