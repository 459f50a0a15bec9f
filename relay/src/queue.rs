//! Command queue for FigBridge Relay
//!
//! Unbounded FIFO of commands waiting for the plugin. Every mutation
//! happens under a short lock that is never held across an await, so
//! an enqueue and a drain never interleave.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use figbridge_shared::protocol::{CommandType, QueuedCommand};
use serde_json::Value;
use tokio::sync::Notify;

/// Shared command queue
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    commands: Mutex<VecDeque<QueuedCommand>>,
    /// Process-wide sequence for id generation
    sequence: AtomicU64,
    /// Stable prefix so ids from different runs don't collide in logs
    epoch: String,
    /// Woken on every enqueue
    enqueued: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                commands: Mutex::new(VecDeque::new()),
                sequence: AtomicU64::new(0),
                epoch: format!("{:x}", Utc::now().timestamp_millis()),
                enqueued: Notify::new(),
            }),
        }
    }

    fn commands(&self) -> MutexGuard<'_, VecDeque<QueuedCommand>> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self) -> String {
        let seq = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("cmd-{}-{}", self.inner.epoch, seq)
    }

    /// Append a command and return its id
    pub fn enqueue(&self, kind: CommandType, tool: Option<String>, payload: Value) -> String {
        let id = self.next_id();
        let command = QueuedCommand {
            id: id.clone(),
            kind,
            tool,
            payload,
            timestamp: Utc::now(),
        };
        self.commands().push_back(command);
        self.inner.enqueued.notify_waiters();
        id
    }

    /// Remove and return every queued command, oldest first
    pub fn drain(&self) -> Vec<QueuedCommand> {
        self.commands().drain(..).collect()
    }

    /// Put an undelivered batch back at the head of the queue.
    ///
    /// Everything in a drained batch predates whatever was enqueued since,
    /// so the queue stays in enqueue order.
    pub fn requeue_front(&self, batch: Vec<QueuedCommand>) {
        if batch.is_empty() {
            return;
        }
        {
            let mut commands = self.commands();
            for command in batch.into_iter().rev() {
                commands.push_front(command);
            }
        }
        self.inner.enqueued.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.commands().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain, waiting for at least one command if the queue is empty
    pub async fn drain_when_ready(&self) -> Vec<QueuedCommand> {
        loop {
            // Register before checking so an enqueue in between is not missed
            let notified = self.inner.enqueued.notified();
            let batch = self.drain();
            if !batch.is_empty() {
                return batch;
            }
            notified.await;
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let queue = CommandQueue::new();
        let a = queue.enqueue(CommandType::ToolCall, Some("a".into()), json!({}));
        let b = queue.enqueue(CommandType::CreateNode, None, json!({"name": "b"}));
        let c = queue.enqueue(CommandType::ToolCall, Some("c".into()), json!({}));

        let drained: Vec<String> = queue.drain().into_iter().map(|cmd| cmd.id).collect();
        assert_eq!(drained, vec![a, b, c]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let queue = CommandQueue::new();
        let ids: HashSet<String> = (0..1000)
            .map(|_| queue.enqueue(CommandType::ToolCall, None, Value::Null))
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_command_fields_are_kept() {
        let queue = CommandQueue::new();
        queue.enqueue(
            CommandType::ToolCall,
            Some("set_fill".into()),
            json!({"nodeId": "1:2", "color": "#ff0000"}),
        );
        let cmd = queue.drain().remove(0);
        assert_eq!(cmd.kind, CommandType::ToolCall);
        assert_eq!(cmd.tool.as_deref(), Some("set_fill"));
        assert_eq!(cmd.payload["nodeId"], "1:2");
    }

    #[test]
    fn test_requeued_batch_goes_ahead_of_newer_commands() {
        let queue = CommandQueue::new();
        let a = queue.enqueue(CommandType::ToolCall, Some("a".into()), json!({}));
        let b = queue.enqueue(CommandType::ToolCall, Some("b".into()), json!({}));
        let batch = queue.drain();
        let c = queue.enqueue(CommandType::ToolCall, Some("c".into()), json!({}));

        queue.requeue_front(batch);
        let drained: Vec<String> = queue.drain().into_iter().map(|cmd| cmd.id).collect();
        assert_eq!(drained, vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_drain_when_ready_wakes_on_enqueue() {
        let queue = CommandQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain_when_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = queue.enqueue(CommandType::ToolCall, Some("ping_plugin".into()), Value::Null);

        let batch = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert!(queue.is_empty());
    }
}
