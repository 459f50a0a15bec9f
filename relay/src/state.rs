//! Shared state handed to every handler
//!
//! One `AppState` per server; tests build their own instead of sharing
//! process-wide globals.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use figbridge_shared::protocol::{AckReceipt, CommandResult, CommandType, QueuedCommand};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::figma::FigmaClient;
use crate::metrics::Metrics;
use crate::queue::CommandQueue;
use crate::results::ResultStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub queue: CommandQueue,
    pub results: ResultStore,
    pub metrics: Metrics,
    pub figma: FigmaClient,
    tunnel_url: Arc<RwLock<Option<String>>>,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> Self {
        let figma = FigmaClient::new(config.figma_api_base.clone(), config.figma_token.clone());
        Self {
            tunnel_url: Arc::new(RwLock::new(config.tunnel_url.clone())),
            config: Arc::new(config),
            queue: CommandQueue::new(),
            results: ResultStore::new(),
            metrics: Metrics::new(),
            figma,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    pub async fn tunnel_url(&self) -> Option<String> {
        self.tunnel_url.read().await.clone()
    }

    pub async fn set_tunnel_url(&self, url: Option<String>) {
        info!(tunnel_url = ?url, "tunnel URL updated");
        *self.tunnel_url.write().await = url;
    }

    /// Queue a command for the plugin
    pub fn enqueue(&self, kind: CommandType, tool: Option<String>, payload: Value) -> String {
        let id = self.queue.enqueue(kind, tool.clone(), payload);
        self.metrics.command_enqueued(&id);
        info!(command_id = %id, kind = ?kind, tool = ?tool, "command queued");
        id
    }

    /// Hand every queued command to a poller
    pub fn drain(&self) -> Vec<QueuedCommand> {
        let batch = self.queue.drain();
        if !batch.is_empty() {
            self.metrics.commands_delivered(batch.len());
            debug!(count = batch.len(), "commands delivered");
        }
        batch
    }

    /// Store a plugin result; unknown ids are accepted
    pub async fn record_result(&self, result: CommandResult) -> AckReceipt {
        let command_id = result.command_id.clone();
        let success = result.result.success;
        self.metrics.result_recorded(&command_id, success).await;
        let matched = self.results.record(result);
        info!(command_id = %command_id, success, matched, "result recorded");
        AckReceipt { command_id, matched }
    }
}
