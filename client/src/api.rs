//! HTTP client for the bridge endpoints

use anyhow::{anyhow, Context, Result};
use figbridge_shared::protocol::{
    AckReceipt, ApiResponse, CommandResult, HealthResponse, PollResponse, QueuedCommand,
    QueuedReceipt, StatusResponse, ToolCallRequest, TunnelInfo, TunnelUpdate,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct BridgeClient {
    http: Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// WebSocket address of the push channel
    pub fn subscribe_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/commands/subscribe", ws_base)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}", path);
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        read_envelope(resp).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("{} {}", method, path);
        let resp = self
            .http
            .request(method.clone(), self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, path))?;
        read_envelope(resp).await
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        let request = ToolCallRequest {
            tool: tool.to_string(),
            arguments,
        };
        self.send_json(reqwest::Method::POST, "/tools", &request).await
    }

    pub async fn create_node(&self, payload: &Value) -> Result<QueuedReceipt> {
        self.send_json(reqwest::Method::POST, "/create-node", payload).await
    }

    pub async fn poll(&self) -> Result<Vec<QueuedCommand>> {
        let batch: PollResponse = self.get("/commands").await?;
        Ok(batch.commands)
    }

    pub async fn ack(&self, result: &CommandResult) -> Result<AckReceipt> {
        self.send_json(reqwest::Method::POST, "/results", result).await
    }

    pub async fn result(&self, command_id: &str, wait: bool) -> Result<CommandResult> {
        let path = if wait {
            format!("/results/{}/wait", command_id)
        } else {
            format!("/results/{}", command_id)
        };
        self.get(&path).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("/status").await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    pub async fn set_tunnel(&self, url: Option<String>) -> Result<TunnelInfo> {
        self.send_json(reqwest::Method::PUT, "/tunnel", &TunnelUpdate { url })
            .await
    }
}

/// Error envelopes come with 4xx/5xx codes, so the status is not checked first
async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let envelope: ApiResponse<T> = resp
        .json()
        .await
        .with_context(|| format!("bridge returned a non-JSON body (HTTP {})", status))?;
    unwrap_envelope(envelope)
}

fn unwrap_envelope<T>(envelope: ApiResponse<T>) -> Result<T> {
    if !envelope.success {
        return Err(anyhow!(
            "bridge error: {}",
            envelope.error.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    envelope
        .data
        .ok_or_else(|| anyhow!("bridge response has no data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_url() {
        assert_eq!(
            BridgeClient::new("http://localhost:3055/").subscribe_url(),
            "ws://localhost:3055/commands/subscribe"
        );
        assert_eq!(
            BridgeClient::new("https://figbridge.ngrok.app").subscribe_url(),
            "wss://figbridge.ngrok.app/commands/subscribe"
        );
    }

    #[test]
    fn test_unwrap_envelope() {
        let ok: ApiResponse<Value> = serde_json::from_value(json!({"success": true, "data": 7})).unwrap();
        assert_eq!(unwrap_envelope(ok).unwrap(), json!(7));

        let err: ApiResponse<Value> =
            serde_json::from_value(json!({"success": false, "error": "no such result"})).unwrap();
        let message = unwrap_envelope(err).unwrap_err().to_string();
        assert!(message.contains("no such result"));
    }
}
