//! Health and status snapshots, recomputed on every request

use chrono::Utc;
use figbridge_shared::protocol::{HealthResponse, StatusResponse, TunnelInfo};

use crate::state::AppState;

pub fn health(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
        timestamp: Utc::now(),
    }
}

pub async fn status(state: &AppState) -> StatusResponse {
    StatusResponse {
        status: "running".to_string(),
        uptime_secs: state.uptime_secs(),
        tunnel_url: state.tunnel_url().await,
        queue_depth: state.queue.len(),
        pending_results: state.results.pending(),
        timestamp: Utc::now(),
    }
}

pub async fn tunnel_info(state: &AppState) -> TunnelInfo {
    let url = state.tunnel_url().await;
    TunnelInfo {
        connected: url.is_some(),
        url,
        local_url: state.config.local_url(),
    }
}
