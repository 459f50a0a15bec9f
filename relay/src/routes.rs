//! HTTP surface of the relay
//!
//! Every handler answers with the `{success, data|error}` envelope,
//! including malformed-body rejections.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use figbridge_shared::protocol::{
    AckReceipt, ApiResponse, CommandResult, CommandStatus, CommandType, HealthResponse,
    PollResponse, QueuedReceipt, StatusResponse, ToolCallRequest, ToolInfo, TunnelInfo,
    TunnelUpdate,
};
use figbridge_shared::Error;
use serde_json::Value;
use tracing::warn;

use crate::config::validate_tunnel_url;
use crate::push;
use crate::state::AppState;
use crate::status;
use crate::tools::{self, Dispatch};

/// Bridge error rendered as an error envelope
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::ResultNotFound(_) => StatusCode::NOT_FOUND,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::<Value>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tools", get(list_tools).post(call_tool))
        .route("/api/mcp/tools/call", post(call_tool))
        .route("/create-node", post(create_node))
        .route("/commands", get(poll_commands))
        .route("/commands/subscribe", get(push::subscribe_handler))
        .route("/results", post(submit_result))
        .route("/results/:id", get(get_result))
        .route("/results/:id/wait", get(wait_result))
        .route("/health", get(health))
        .route("/status", get(status_handler))
        .route("/tunnel", get(get_tunnel).put(put_tunnel))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn list_tools() -> ApiResult<Vec<ToolInfo>> {
    ok(tools::catalog())
}

async fn call_tool(
    State(state): State<AppState>,
    body: Result<Json<ToolCallRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = body?;
    match tools::call_tool(&state, request).await? {
        Dispatch::Immediate(value) => ok(value),
        Dispatch::Queued(command_id) => ok(serde_json::to_value(QueuedReceipt {
            command_id,
            status: CommandStatus::Queued,
        })
        .map_err(Error::from)?),
    }
}

async fn create_node(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<QueuedReceipt> {
    let Json(payload) = body?;
    if !payload.is_object() {
        return Err(Error::InvalidRequest("node description must be a JSON object".into()).into());
    }
    let command_id = state.enqueue(CommandType::CreateNode, None, payload);
    ok(QueuedReceipt {
        command_id,
        status: CommandStatus::Queued,
    })
}

async fn poll_commands(State(state): State<AppState>) -> ApiResult<PollResponse> {
    ok(PollResponse {
        commands: state.drain(),
    })
}

async fn submit_result(
    State(state): State<AppState>,
    body: Result<Json<CommandResult>, JsonRejection>,
) -> ApiResult<AckReceipt> {
    let Json(result) = body?;
    ok(state.record_result(result).await)
}

async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CommandResult> {
    let outcome = state
        .results
        .take(&id)
        .ok_or_else(|| Error::ResultNotFound(id.clone()))?;
    ok(CommandResult {
        command_id: id,
        result: outcome,
    })
}

async fn wait_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CommandResult> {
    let outcome = state.results.wait(&id).await?;
    ok(CommandResult {
        command_id: id,
        result: outcome,
    })
}

async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    ok(status::health(&state))
}

async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    ok(status::status(&state).await)
}

async fn get_tunnel(State(state): State<AppState>) -> ApiResult<TunnelInfo> {
    ok(status::tunnel_info(&state).await)
}

async fn put_tunnel(
    State(state): State<AppState>,
    body: Result<Json<TunnelUpdate>, JsonRejection>,
) -> ApiResult<TunnelInfo> {
    let Json(update) = body?;
    let url = update
        .url
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty());
    if let Some(url) = &url {
        validate_tunnel_url(url)?;
    }
    state.set_tunnel_url(url).await;
    ok(status::tunnel_info(&state).await)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus().await,
    )
}
