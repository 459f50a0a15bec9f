//! WebSocket push channel
//!
//! A subscribed plugin receives queued commands as soon as they are
//! enqueued and may post results back on the same socket. Delivery
//! removes commands from the queue exactly like a poll does.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use figbridge_shared::protocol::{PushMessage, QueuedCommand};
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt::Display;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub async fn subscribe_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    state.metrics.subscriber_connected();
    info!("Plugin subscribed");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_frame(&state, &text).await {
                            if sender.send(reply).await.is_err() { break; }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Subscriber socket error: {}", e);
                        break;
                    }
                    // Pings are answered by the socket itself
                    _ => {}
                }
            }
            batch = state.queue.drain_when_ready() => {
                if !deliver(&mut sender, &state, batch).await {
                    break;
                }
            }
        }
    }

    state.metrics.subscriber_disconnected();
    info!("Plugin unsubscribed");
}

/// Push one drained batch. On failure the batch goes back to the head of
/// the queue for the next poller or subscriber.
async fn deliver<S>(sink: &mut S, state: &AppState, batch: Vec<QueuedCommand>) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let count = batch.len();
    let frame = match serde_json::to_string(&PushMessage::Commands { commands: batch.clone() }) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to encode {} commands: {}", count, e);
            state.queue.requeue_front(batch);
            return false;
        }
    };
    if let Err(e) = sink.send(Message::Text(frame)).await {
        warn!("Subscriber gone, requeueing {} commands: {}", count, e);
        state.queue.requeue_front(batch);
        return false;
    }
    state.metrics.commands_delivered(count);
    debug!(count, "commands pushed");
    true
}

/// Handle one text frame from the plugin, returning an optional reply
async fn handle_frame(state: &AppState, text: &str) -> Option<Message> {
    let reply = match serde_json::from_str::<PushMessage>(text) {
        Ok(PushMessage::Result(result)) => {
            state.record_result(result).await;
            return None;
        }
        Ok(other) => PushMessage::Error {
            message: format!("unexpected frame from plugin: {}", frame_kind(&other)),
        },
        Err(e) => PushMessage::Error {
            message: format!("invalid frame: {}", e),
        },
    };
    serde_json::to_string(&reply).ok().map(Message::Text)
}

fn frame_kind(msg: &PushMessage) -> &'static str {
    match msg {
        PushMessage::Commands { .. } => "commands",
        PushMessage::Result(_) => "result",
        PushMessage::Error { .. } => "error",
    }
}
