//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides JSON-RPC validation and formatting, method routing, and the stdio
//! transport the MCP client attaches through.

use std::sync::Arc;

use crate::bridge::RequestSender;

pub mod rpc;
pub mod server;
pub mod stdio;

/// Everything MCP request handling needs; tool calls go out through `sender`.
#[derive(Clone)]
pub struct McpState {
    pub sender: Arc<dyn RequestSender>,
}

impl McpState {
    pub fn new(sender: Arc<dyn RequestSender>) -> Self {
        Self { sender }
    }
}
