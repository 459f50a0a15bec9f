//! Tool dispatch
//!
//! A handful of tools are answered by the bridge itself. Every other
//! name, known or not, is queued for the plugin, which owns the real
//! catalog.

use chrono::Utc;
use figbridge_shared::protocol::{CommandType, ToolCallRequest, ToolInfo};
use figbridge_shared::{Error, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::figma::{extract_file_key, is_file_key};
use crate::state::AppState;
use crate::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTool {
    Ping,
    GetStatus,
    GetTunnelInfo,
    GetQueueStatus,
    GetFigmaFile,
}

impl LocalTool {
    pub const ALL: [LocalTool; 5] = [
        LocalTool::Ping,
        LocalTool::GetStatus,
        LocalTool::GetTunnelInfo,
        LocalTool::GetQueueStatus,
        LocalTool::GetFigmaFile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LocalTool::Ping => "ping",
            LocalTool::GetStatus => "get_status",
            LocalTool::GetTunnelInfo => "get_tunnel_info",
            LocalTool::GetQueueStatus => "get_queue_status",
            LocalTool::GetFigmaFile => "get_figma_file",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            LocalTool::Ping => "Check that the bridge is reachable",
            LocalTool::GetStatus => "Bridge uptime, tunnel URL and queue depth",
            LocalTool::GetTunnelInfo => "Public tunnel URL of the bridge",
            LocalTool::GetQueueStatus => "Commands waiting for the plugin and uncollected results",
            LocalTool::GetFigmaFile => "Read a file through the Figma REST API (fileKey or url, optional depth)",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

/// Tools the plugin is known to implement, listed for discovery only
const PLUGIN_TOOLS: &[(&str, &str)] = &[
    ("get_document_info", "Pages and top-level nodes of the open document"),
    ("get_selection", "Nodes currently selected in the editor"),
    ("get_node_info", "Properties of a node by id"),
    ("create_frame", "Create a frame"),
    ("create_rectangle", "Create a rectangle"),
    ("create_text", "Create a text node"),
    ("set_fill_color", "Set the fill color of a node"),
    ("move_node", "Move a node to x/y"),
    ("resize_node", "Resize a node"),
    ("delete_node", "Delete a node"),
    ("export_node_as_image", "Export a node as PNG, JPG or SVG"),
];

pub fn catalog() -> Vec<ToolInfo> {
    let local = LocalTool::ALL.iter().map(|tool| ToolInfo {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        local: true,
    });
    let plugin = PLUGIN_TOOLS.iter().map(|(name, description)| ToolInfo {
        name: name.to_string(),
        description: description.to_string(),
        local: false,
    });
    local.chain(plugin).collect()
}

/// Per-tool metrics bucket: catalog names as-is, everything else folded
pub fn metric_label(tool: &str) -> &str {
    let known = LocalTool::from_name(tool).is_some()
        || PLUGIN_TOOLS.iter().any(|(name, _)| *name == tool);
    if known {
        tool
    } else {
        "other"
    }
}

/// What happened to a submitted tool call
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Answered by the bridge
    Immediate(Value),
    /// Queued for the plugin under this command id
    Queued(String),
}

pub async fn call_tool(state: &AppState, request: ToolCallRequest) -> Result<Dispatch> {
    let tool = request.tool.trim();
    if tool.is_empty() {
        return Err(Error::InvalidRequest("tool name is required".into()));
    }

    let arguments = match request.arguments {
        Value::Null => json!({}),
        args @ Value::Object(_) => args,
        _ => return Err(Error::InvalidRequest("arguments must be a JSON object".into())),
    };

    let Some(local) = LocalTool::from_name(tool) else {
        let id = state.enqueue(CommandType::ToolCall, Some(tool.to_string()), arguments);
        state.metrics.record_call(metric_label(tool), false).await;
        return Ok(Dispatch::Queued(id));
    };

    debug!(tool = %tool, "answering tool locally");
    state.metrics.local_call();
    let output = run_local(state, local, &arguments).await;
    state.metrics.record_call(local.name(), output.is_err()).await;
    output.map(Dispatch::Immediate)
}

async fn run_local(state: &AppState, tool: LocalTool, arguments: &Value) -> Result<Value> {
    let value = match tool {
        LocalTool::Ping => json!({"pong": true, "timestamp": Utc::now()}),
        LocalTool::GetStatus => serde_json::to_value(status::status(state).await)?,
        LocalTool::GetTunnelInfo => serde_json::to_value(status::tunnel_info(state).await)?,
        LocalTool::GetQueueStatus => json!({
            "queueDepth": state.queue.len(),
            "pendingResults": state.results.pending(),
        }),
        LocalTool::GetFigmaFile => {
            let file_key = figma_file_key(arguments)?;
            let depth = match arguments.get("depth") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    v.as_u64()
                        .and_then(|d| u32::try_from(d).ok())
                        .ok_or_else(|| Error::InvalidRequest("depth must be a positive integer".into()))?,
                ),
            };
            state.figma.get_file(&file_key, depth).await?
        }
    };
    Ok(value)
}

fn figma_file_key(arguments: &Value) -> Result<String> {
    if let Some(key) = arguments.get("fileKey").and_then(Value::as_str) {
        let key = key.trim();
        if !key.is_empty() {
            if !is_file_key(key) {
                return Err(Error::InvalidRequest(format!("invalid Figma file key: {}", key)));
            }
            return Ok(key.to_string());
        }
    }
    if let Some(url) = arguments.get("url").and_then(Value::as_str) {
        return extract_file_key(url)
            .ok_or_else(|| Error::InvalidRequest(format!("not a Figma file URL: {}", url)));
    }
    Err(Error::InvalidRequest("get_figma_file needs fileKey or url".into()))
}
