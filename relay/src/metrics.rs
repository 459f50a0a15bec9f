//! Metrics Collection for FigBridge Relay
//!
//! Atomic counters for the command lifecycle, a round-trip latency
//! histogram (enqueue to result), and a Prometheus-compatible
//! /metrics endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::results::prune_oldest;

/// Commands tracked for round-trip latency at once
pub const MAX_IN_FLIGHT: usize = 10_000;
/// Commands never acked within this window stop being tracked
pub const IN_FLIGHT_TTL: Duration = Duration::from_secs(60 * 60);

/// Relay-wide metrics
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    commands_enqueued: AtomicU64,
    commands_delivered: AtomicU64,
    results_recorded: AtomicU64,
    /// Results whose id had no in-flight command
    results_unmatched: AtomicU64,
    local_calls: AtomicU64,
    tool_errors: AtomicU64,
    active_subscribers: AtomicU64,
    /// Enqueue time of commands still waiting for a result
    in_flight: DashMap<String, Instant>,
    in_flight_cap: usize,
    latencies: Mutex<LatencyHistogram>,
    per_tool: Mutex<HashMap<String, ToolMetrics>>,
}

/// Ring buffer of recent round-trip latencies
struct LatencyHistogram {
    /// Recent latencies (microseconds)
    values: Vec<u64>,
    /// Next slot to overwrite
    pos: usize,
    /// Samples ever recorded, not just the ones still buffered
    count: u64,
    /// Sum of every sample, for the average
    sum: u64,
}

impl LatencyHistogram {
    fn new(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity],
            pos: 0,
            count: 0,
            sum: 0,
        }
    }

    /// Overwrite the oldest slot once the buffer is full
    fn record(&mut self, latency_us: u64) {
        self.values[self.pos] = latency_us;
        self.pos = (self.pos + 1) % self.values.len();
        self.count += 1;
        self.sum += latency_us;
    }

    /// Percentile over the buffered window only
    fn percentile(&self, p: f64) -> u64 {
        let count = self.count.min(self.values.len() as u64) as usize;
        if count == 0 {
            return 0;
        }

        let mut sorted = self.values[..count].to_vec();
        sorted.sort_unstable();

        let idx = ((count as f64 * p / 100.0) as usize).min(count - 1);
        sorted[idx]
    }

    /// Lifetime average
    fn average(&self) -> u64 {
        if self.count == 0 { 0 } else { self.sum / self.count }
    }
}

/// Per-tool call counts
#[derive(Debug, Clone, Default)]
pub struct ToolMetrics {
    pub calls: u64,
    pub errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_in_flight_cap(MAX_IN_FLIGHT)
    }

    pub fn with_in_flight_cap(in_flight_cap: usize) -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                commands_enqueued: AtomicU64::new(0),
                commands_delivered: AtomicU64::new(0),
                results_recorded: AtomicU64::new(0),
                results_unmatched: AtomicU64::new(0),
                local_calls: AtomicU64::new(0),
                tool_errors: AtomicU64::new(0),
                active_subscribers: AtomicU64::new(0),
                in_flight: DashMap::new(),
                in_flight_cap: in_flight_cap.max(1),
                latencies: Mutex::new(LatencyHistogram::new(10000)),
                per_tool: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// A tool call arrived, local or queued. Queued calls count as ok.
    ///
    /// `tool` becomes a label value, so callers pass a catalog name or a
    /// catch-all rather than whatever the client sent.
    pub async fn record_call(&self, tool: &str, failed: bool) {
        if failed {
            self.inner.tool_errors.fetch_add(1, Ordering::Relaxed);
        }
        let mut tools = self.inner.per_tool.lock().await;
        let entry = tools.entry(tool.to_string()).or_default();
        entry.calls += 1;
        if failed {
            entry.errors += 1;
        }
    }

    pub fn local_call(&self) {
        self.inner.local_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_enqueued(&self, id: &str) {
        self.inner.commands_enqueued.fetch_add(1, Ordering::Relaxed);
        let dropped = prune_oldest(&self.inner.in_flight, self.inner.in_flight_cap, IN_FLIGHT_TTL, |t| *t);
        if dropped > 0 {
            debug!(dropped, "stopped tracking unacknowledged commands");
        }
        self.inner.in_flight.insert(id.to_string(), Instant::now());
    }

    pub fn commands_delivered(&self, count: usize) {
        self.inner.commands_delivered.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// A result arrived; closes the round trip if the id is in flight
    pub async fn result_recorded(&self, id: &str, success: bool) {
        self.inner.results_recorded.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.tool_errors.fetch_add(1, Ordering::Relaxed);
        }
        match self.inner.in_flight.remove(id) {
            Some((_, started)) => {
                let latency_us = started.elapsed().as_micros() as u64;
                self.inner.latencies.lock().await.record(latency_us);
            }
            None => {
                self.inner.results_unmatched.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn subscriber_connected(&self) {
        self.inner.active_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_disconnected(&self) {
        self.inner.active_subscribers.fetch_sub(1, Ordering::Relaxed);
    }

    pub async fn tool_metrics(&self, tool: &str) -> Option<ToolMetrics> {
        self.inner.per_tool.lock().await.get(tool).cloned()
    }

    /// Generate Prometheus-format metrics text
    pub async fn to_prometheus(&self) -> String {
        let lat = self.inner.latencies.lock().await;
        let p50 = lat.percentile(50.0);
        let p95 = lat.percentile(95.0);
        let p99 = lat.percentile(99.0);
        let avg = lat.average();
        drop(lat);

        let mut out = format!(
r#"# HELP figbridge_commands_enqueued_total Commands queued for the plugin
# TYPE figbridge_commands_enqueued_total counter
figbridge_commands_enqueued_total {}

# HELP figbridge_commands_delivered_total Commands handed to a poller or subscriber
# TYPE figbridge_commands_delivered_total counter
figbridge_commands_delivered_total {}

# HELP figbridge_results_total Results posted back by the plugin
# TYPE figbridge_results_total counter
figbridge_results_total{{command="known"}} {}
figbridge_results_total{{command="unknown"}} {}

# HELP figbridge_local_calls_total Tool calls answered by the bridge itself
# TYPE figbridge_local_calls_total counter
figbridge_local_calls_total {}

# HELP figbridge_tool_errors_total Failed tool calls
# TYPE figbridge_tool_errors_total counter
figbridge_tool_errors_total {}

# HELP figbridge_active_subscribers Connected push subscribers
# TYPE figbridge_active_subscribers gauge
figbridge_active_subscribers {}

# HELP figbridge_in_flight_commands Commands awaiting a result
# TYPE figbridge_in_flight_commands gauge
figbridge_in_flight_commands {}

# HELP figbridge_round_trip_us Enqueue-to-result latency in microseconds
# TYPE figbridge_round_trip_us summary
figbridge_round_trip_us{{quantile="0.5"}} {}
figbridge_round_trip_us{{quantile="0.95"}} {}
figbridge_round_trip_us{{quantile="0.99"}} {}
figbridge_round_trip_us_avg {}
"#,
            self.inner.commands_enqueued.load(Ordering::Relaxed),
            self.inner.commands_delivered.load(Ordering::Relaxed),
            self.inner.results_recorded.load(Ordering::Relaxed)
                .saturating_sub(self.inner.results_unmatched.load(Ordering::Relaxed)),
            self.inner.results_unmatched.load(Ordering::Relaxed),
            self.inner.local_calls.load(Ordering::Relaxed),
            self.inner.tool_errors.load(Ordering::Relaxed),
            self.inner.active_subscribers.load(Ordering::Relaxed),
            self.inner.in_flight.len(),
            p50, p95, p99, avg,
        );

        let tools = self.inner.per_tool.lock().await;
        if !tools.is_empty() {
            let mut names: Vec<&String> = tools.keys().collect();
            names.sort();
            out.push_str("\n# HELP figbridge_tool_calls_total Calls per tool\n");
            out.push_str("# TYPE figbridge_tool_calls_total counter\n");
            for name in names {
                let m = &tools[name];
                out.push_str(&format!(
                    "figbridge_tool_calls_total{{tool=\"{}\",outcome=\"ok\"}} {}\n",
                    escape_label(name),
                    m.calls - m.errors
                ));
                out.push_str(&format!(
                    "figbridge_tool_calls_total{{tool=\"{}\",outcome=\"error\"}} {}\n",
                    escape_label(name),
                    m.errors
                ));
            }
        }

        out
    }
}

/// Escape a label value for the text exposition format
fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let mut hist = LatencyHistogram::new(100);
        for v in 1..=100 {
            hist.record(v);
        }
        assert_eq!(hist.percentile(50.0), 51);
        assert_eq!(hist.percentile(99.0), 100);
        assert_eq!(hist.average(), 50);
    }

    #[test]
    fn test_empty_histogram() {
        let hist = LatencyHistogram::new(10);
        assert_eq!(hist.percentile(95.0), 0);
        assert_eq!(hist.average(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_accounting() {
        let metrics = Metrics::new();
        metrics.command_enqueued("cmd-1");
        metrics.commands_delivered(1);
        metrics.result_recorded("cmd-1", true).await;
        metrics.result_recorded("cmd-unknown", false).await;

        let text = metrics.to_prometheus().await;
        assert!(text.contains("figbridge_commands_enqueued_total 1"));
        assert!(text.contains("figbridge_results_total{command=\"known\"} 1"));
        assert!(text.contains("figbridge_results_total{command=\"unknown\"} 1"));
        assert!(text.contains("figbridge_in_flight_commands 0"));
        assert!(text.contains("figbridge_tool_errors_total 1"));
    }

    #[tokio::test]
    async fn test_per_tool_counts() {
        let metrics = Metrics::new();
        metrics.record_call("ping", false).await;
        metrics.record_call("ping", false).await;
        metrics.record_call("get_figma_file", true).await;

        assert_eq!(metrics.tool_metrics("ping").await.unwrap().calls, 2);
        assert_eq!(metrics.tool_metrics("get_figma_file").await.unwrap().errors, 1);
        let text = metrics.to_prometheus().await;
        assert!(text.contains("figbridge_tool_calls_total{tool=\"ping\",outcome=\"ok\"} 2"));
    }

    #[test]
    fn test_escape_label() {
        assert_eq!(escape_label("ping"), "ping");
        assert_eq!(escape_label(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_label(r"a\b"), r"a\\b");
        assert_eq!(escape_label("a\nb"), r"a\nb");
    }

    #[tokio::test]
    async fn test_label_values_cannot_add_lines() {
        let metrics = Metrics::new();
        metrics.record_call("x\"} 1\nfake_metric 999\n#", false).await;
        let text = metrics.to_prometheus().await;
        assert!(!text.lines().any(|line| line.starts_with("fake_metric")));
        assert!(text.contains(r#"tool="x\"} 1\nfake_metric 999\n#""#));
    }

    #[tokio::test]
    async fn test_in_flight_is_bounded() {
        let metrics = Metrics::with_in_flight_cap(100);
        for i in 0..1000 {
            metrics.command_enqueued(&format!("cmd-{}", i));
        }
        assert!(metrics.inner.in_flight.len() <= 100);
        let text = metrics.to_prometheus().await;
        assert!(!text.contains("figbridge_in_flight_commands 1000"));

        // Recent commands are still timed
        metrics.result_recorded("cmd-999", true).await;
        let text = metrics.to_prometheus().await;
        assert!(text.contains("figbridge_results_total{command=\"known\"} 1"));
    }
}
