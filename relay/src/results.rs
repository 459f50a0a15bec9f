//! Result store for FigBridge Relay
//!
//! Results posted by the plugin are matched to callers by command id.
//! A result either goes straight to a waiting caller or is parked until
//! somebody asks for it. Ids are never checked against the queue.
//!
//! Parked results are bounded: past `MAX_PARKED_RESULTS`, results older
//! than `PARKED_RESULT_TTL` are dropped first, then the oldest ones.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use figbridge_shared::protocol::{CommandResult, ToolOutcome};
use figbridge_shared::{Error, Result};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const MAX_PARKED_RESULTS: usize = 10_000;
pub const PARKED_RESULT_TTL: Duration = Duration::from_secs(60 * 60);

struct Parked {
    outcome: ToolOutcome,
    parked_at: Instant,
}

#[derive(Clone)]
pub struct ResultStore {
    /// Recorded results nobody has collected yet
    results: Arc<DashMap<String, Parked>>,
    /// Callers blocked on an id
    waiters: Arc<DashMap<String, Vec<oneshot::Sender<ToolOutcome>>>>,
    capacity: usize,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PARKED_RESULTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Arc::new(DashMap::new()),
            waiters: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Store a result. Returns true if it was handed to a waiting caller.
    pub fn record(&self, result: CommandResult) -> bool {
        let CommandResult { command_id, result } = result;

        let mut matched = false;
        if let Some((_, senders)) = self.waiters.remove(&command_id) {
            for tx in senders {
                matched |= tx.send(result.clone()).is_ok();
            }
        }

        if matched {
            debug!(command_id = %command_id, "result delivered to waiting caller");
        } else {
            debug!(command_id = %command_id, "result parked");
            if !self.results.contains_key(&command_id) {
                let dropped = prune_oldest(&self.results, self.capacity, PARKED_RESULT_TTL, |p| p.parked_at);
                if dropped > 0 {
                    warn!(dropped, "parked results over capacity, oldest dropped");
                }
            }
            self.results.insert(
                command_id,
                Parked {
                    outcome: result,
                    parked_at: Instant::now(),
                },
            );
        }
        matched
    }

    /// Remove and return a parked result
    pub fn take(&self, command_id: &str) -> Option<ToolOutcome> {
        self.results.remove(command_id).map(|(_, parked)| parked.outcome)
    }

    /// Wait until a result for `command_id` is recorded, then take it.
    ///
    /// There is no timeout; dropping the future abandons the wait.
    pub async fn wait(&self, command_id: &str) -> Result<ToolOutcome> {
        if let Some(outcome) = self.take(command_id) {
            return Ok(outcome);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut senders = self.waiters.entry(command_id.to_string()).or_default();
            senders.retain(|tx| !tx.is_closed());
            senders.push(tx);
        }

        // A record may have landed between the first take and registration
        if let Some(outcome) = self.take(command_id) {
            return Ok(outcome);
        }

        rx.await
            .map_err(|_| Error::Connection(format!("result store dropped waiter for {}", command_id)))
    }

    /// Results recorded but not yet collected
    pub fn pending(&self) -> usize {
        self.results.len()
    }

    /// Ids with at least one live waiter
    pub fn waiting(&self) -> usize {
        self.waiters
            .iter()
            .filter(|entry| entry.value().iter().any(|tx| !tx.is_closed()))
            .count()
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Make room for one more entry in a map holding at most `capacity`.
///
/// Entries older than `ttl` go first; if that is not enough the oldest
/// tenth is dropped so a saturated map is not rescanned on every insert.
/// Returns how many entries were removed.
pub(crate) fn prune_oldest<V>(
    map: &DashMap<String, V>,
    capacity: usize,
    ttl: Duration,
    age: impl Fn(&V) -> Instant,
) -> usize {
    if map.len() < capacity {
        return 0;
    }
    let before = map.len();
    map.retain(|_, value| age(value).elapsed() < ttl);
    if map.len() >= capacity {
        let mut entries: Vec<(Instant, String)> = map
            .iter()
            .map(|entry| (age(entry.value()), entry.key().clone()))
            .collect();
        entries.sort_unstable();
        let excess = map.len() + 1 - capacity;
        let count = excess.max(capacity / 10).min(entries.len());
        for (_, key) in entries.into_iter().take(count) {
            map.remove(&key);
        }
    }
    before.saturating_sub(map.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn result(id: &str, data: serde_json::Value) -> CommandResult {
        CommandResult {
            command_id: id.to_string(),
            result: ToolOutcome::ok(data),
        }
    }

    #[test]
    fn test_unknown_id_is_parked_without_error() {
        let store = ResultStore::new();
        assert!(!store.record(result("never-enqueued", json!(1))));
        assert_eq!(store.pending(), 1);
        assert_eq!(store.take("never-enqueued").unwrap().data, Some(json!(1)));
        assert!(store.take("never-enqueued").is_none());
    }

    #[test]
    fn test_later_result_replaces_earlier() {
        let store = ResultStore::new();
        store.record(result("cmd-1", json!("first")));
        store.record(result("cmd-1", json!("second")));
        assert_eq!(store.pending(), 1);
        assert_eq!(store.take("cmd-1").unwrap().data, Some(json!("second")));
    }

    #[tokio::test]
    async fn test_wait_returns_parked_result() {
        let store = ResultStore::new();
        store.record(result("cmd-2", json!({"ok": true})));
        let outcome = store.wait("cmd-2").await.unwrap();
        assert!(outcome.success);
        assert_eq!(store.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_is_released_by_record() {
        let store = ResultStore::new();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait("cmd-3").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.waiting(), 1);
        assert!(store.record(result("cmd-3", json!("done"))));

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome.data, Some(json!("done")));
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn test_parked_results_are_bounded() {
        let store = ResultStore::with_capacity(10);
        for i in 0..1000 {
            store.record(result(&format!("orphan-{}", i), json!(i)));
        }
        assert!(store.pending() <= 10);
        // The newest result always survives
        assert_eq!(store.take("orphan-999").unwrap().data, Some(json!(999)));
        assert!(store.take("orphan-0").is_none());
    }

    #[test]
    fn test_replacing_a_result_at_capacity_keeps_the_others() {
        let store = ResultStore::with_capacity(2);
        store.record(result("a", json!(1)));
        store.record(result("b", json!(2)));
        store.record(result("b", json!(3)));
        assert_eq!(store.pending(), 2);
        assert_eq!(store.take("a").unwrap().data, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_swallow_result() {
        let store = ResultStore::new();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait("cmd-4").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        assert!(!store.record(result("cmd-4", json!("late"))));
        assert_eq!(store.take("cmd-4").unwrap().data, Some(json!("late")));
    }
}
