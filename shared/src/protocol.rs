//! JSON protocol types for FigBridge communication.
//!
//! Every HTTP body is an [`ApiResponse`] envelope. Commands travel to the
//! plugin as [`QueuedCommand`]s and come back as [`CommandResult`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default port the relay listens on
pub const DEFAULT_PORT: u16 = 3055;

/// Environment variable holding the Figma personal access token
pub const FIGMA_TOKEN_ENV: &str = "FIGMA_API_TOKEN";

/// Standard response envelope: `{success, data?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Outcome of executing a tool, as reported by whoever executed it
pub type ToolOutcome = ApiResponse<Value>;

/// Kind of command sitting in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandType {
    /// Generic tool invocation forwarded to the plugin
    ToolCall,
    /// Node creation request from the `/create-node` endpoint
    CreateNode,
}

/// A command waiting to be picked up by the plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Result posted back by the plugin for a command id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command_id: String,
    pub result: ToolOutcome,
}

/// Tool invocation submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
}

/// Returned instead of a tool result when the call was queued for the plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedReceipt {
    pub command_id: String,
    pub status: CommandStatus,
}

/// Batch returned by a poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollResponse {
    pub commands: Vec<QueuedCommand>,
}

/// Acknowledgement of a recorded result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckReceipt {
    pub command_id: String,
    /// A caller was waiting on this id
    pub matched: bool,
}

/// Catalog entry for `GET /tools`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// Answered by the bridge itself instead of the plugin
    pub local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub uptime_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_url: Option<String>,
    pub queue_depth: usize,
    pub pending_results: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub connected: bool,
    pub local_url: String,
}

/// Body of `PUT /tunnel`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelUpdate {
    #[serde(default)]
    pub url: Option<String>,
}

/// Frames exchanged on the WebSocket push channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PushMessage {
    /// Server -> plugin: freshly drained commands
    Commands { commands: Vec<QueuedCommand> },
    /// Plugin -> server: a command result
    Result(CommandResult),
    /// Server -> plugin: a frame could not be handled
    Error { message: String },
}
