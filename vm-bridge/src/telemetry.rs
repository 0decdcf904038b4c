//! TelemetryStore (§4.9): a bounded ring of completed-task events plus
//! cumulative counters kept per proxy, the way `metrics.snapshot(proxies)` /
//! `metrics.reset(proxies)` / `metrics.snapshotAndReset(proxy)` read and
//! zero them independently per endpoint. Summaries (percentiles, bucket
//! distribution, top-k slowest, per-message rollup, health score) are
//! derived on demand from the ring, never stored pre-computed, the same
//! "compute views over a retained event log rather than maintaining
//! parallel running aggregates" shape the teacher uses for its gas/exec-trace
//! accounting; `metrics.summary(proxies)` aggregates across whichever
//! proxies are named.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use vm_shared::TraceContext;

/// One completed dispatch, as recorded by a worker thread.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub proxy_id: String,
    pub message_name: String,
    pub duration: Duration,
    pub success: bool,
    pub error_class: Option<String>,
    pub trace_context: TraceContext,
    pub queued_for: Duration,
}

#[derive(Debug, Clone)]
struct Entry {
    recorded_at: Instant,
    event: TaskEvent,
}

/// Cumulative counters for one proxy since its last `reset`/`snapshot_and_reset`.
#[derive(Debug, Clone, Copy, Default)]
struct Cumulative {
    invocations: u64,
    failures: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl Cumulative {
    fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if !success {
            self.failures += 1;
        }
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |m| m.min(duration)));
        self.max = Some(self.max.map_or(duration, |m| m.max(duration)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub invocations: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl MetricsSnapshot {
    fn from_cumulative(c: &Cumulative) -> Self {
        let mean = if c.invocations == 0 { Duration::ZERO } else { c.total / c.invocations as u32 };
        let success_rate = if c.invocations == 0 { 1.0 } else { (c.invocations - c.failures) as f64 / c.invocations as f64 };
        Self {
            invocations: c.invocations,
            failures: c.failures,
            success_rate,
            mean,
            min: c.min.unwrap_or(Duration::ZERO),
            max: c.max.unwrap_or(Duration::ZERO),
        }
    }
}

/// A named upper bound in milliseconds; events fall into the first bucket
/// whose bound they don't exceed.
const BUCKET_BOUNDS_MS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub upper_bound_ms: Option<u64>,
    pub count: u64,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRollup {
    pub count: u64,
    pub failures: u64,
    pub mean: Duration,
}

#[derive(Debug, Clone)]
pub struct SlowEntry {
    pub proxy_id: String,
    pub message_name: String,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub invocations: u64,
    pub failures: u64,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub buckets: Vec<Bucket>,
    pub top_slowest: Vec<SlowEntry>,
    pub per_message: BTreeMap<String, MessageRollup>,
    /// In `[0, 1]`: a blend of success rate and tail latency, not a spec'd
    /// formula, just a single number an operator can alarm on.
    pub health_score: f64,
}

pub struct TelemetryStore {
    capacity: usize,
    ring: std::collections::VecDeque<Entry>,
    /// Dispatch counters kept separately per proxy (§4.8: "Per-proxy
    /// dispatch counters"), so resetting one proxy never disturbs another's.
    cumulative: BTreeMap<String, Cumulative>,
    summary_history: std::collections::VecDeque<Summary>,
    summary_history_capacity: usize,
    top_k: usize,
}

impl TelemetryStore {
    pub fn new(capacity: usize, summary_history_capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: std::collections::VecDeque::new(),
            cumulative: BTreeMap::new(),
            summary_history: std::collections::VecDeque::new(),
            summary_history_capacity: summary_history_capacity.max(1),
            top_k: 5,
        }
    }

    pub fn record(&mut self, event: TaskEvent) {
        self.cumulative.entry(event.proxy_id.clone()).or_default().record(event.duration, event.success);
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(Entry { recorded_at: Instant::now(), event });
    }

    /// Proxies named explicitly are looked up (absent ones report a zeroed
    /// snapshot); an empty slice means "every proxy seen so far."
    fn resolve_proxies(&self, proxies: &[String]) -> Vec<String> {
        if proxies.is_empty() {
            self.cumulative.keys().cloned().collect()
        } else {
            proxies.to_vec()
        }
    }

    fn proxy_snapshot(&self, proxy_id: &str) -> MetricsSnapshot {
        self.cumulative.get(proxy_id).map(MetricsSnapshot::from_cumulative).unwrap_or_else(|| MetricsSnapshot::from_cumulative(&Cumulative::default()))
    }

    pub fn snapshot(&self, proxies: &[String]) -> BTreeMap<String, MetricsSnapshot> {
        self.resolve_proxies(proxies).into_iter().map(|id| { let snap = self.proxy_snapshot(&id); (id, snap) }).collect()
    }

    pub fn reset(&mut self, proxies: &[String]) {
        for id in self.resolve_proxies(proxies) {
            self.cumulative.insert(id, Cumulative::default());
        }
    }

    pub fn snapshot_and_reset(&mut self, proxy: &str) -> MetricsSnapshot {
        let snapshot = self.proxy_snapshot(proxy);
        self.cumulative.insert(proxy.to_string(), Cumulative::default());
        snapshot
    }

    /// Computes a `Summary` aggregated across the given proxies (empty means
    /// every proxy) over the retained ring, and appends it to the bounded
    /// summary-history ring.
    pub fn summary(&mut self, proxies: &[String]) -> Summary {
        let selected: Option<std::collections::HashSet<&str>> =
            if proxies.is_empty() { None } else { Some(proxies.iter().map(String::as_str).collect()) };
        let in_scope = |e: &Entry| selected.as_ref().map_or(true, |s| s.contains(e.event.proxy_id.as_str()));

        let mut durations: Vec<Duration> = self.ring.iter().filter(|e| in_scope(e)).map(|e| e.event.duration).collect();
        durations.sort();

        let percentile = |p: f64| -> Duration {
            if durations.is_empty() {
                return Duration::ZERO;
            }
            let idx = ((durations.len() as f64 - 1.0) * p).round() as usize;
            durations[idx.min(durations.len() - 1)]
        };

        let mut bucket_counts = vec![0u64; BUCKET_BOUNDS_MS.len() + 1];
        for d in &durations {
            let ms = d.as_millis() as u64;
            let slot = BUCKET_BOUNDS_MS.iter().position(|&bound| ms <= bound).unwrap_or(BUCKET_BOUNDS_MS.len());
            bucket_counts[slot] += 1;
        }
        let total = durations.len().max(1) as f64;
        let mut buckets = Vec::with_capacity(bucket_counts.len());
        for (i, count) in bucket_counts.iter().enumerate() {
            let upper_bound_ms = BUCKET_BOUNDS_MS.get(i).copied();
            buckets.push(Bucket { upper_bound_ms, count: *count, fraction: *count as f64 / total });
        }

        let mut sorted_by_duration: Vec<&Entry> = self.ring.iter().filter(|e| in_scope(e)).collect();
        sorted_by_duration.sort_by(|a, b| b.event.duration.cmp(&a.event.duration));
        let top_slowest = sorted_by_duration
            .iter()
            .take(self.top_k)
            .map(|e| SlowEntry {
                proxy_id: e.event.proxy_id.clone(),
                message_name: e.event.message_name.clone(),
                duration: e.event.duration,
            })
            .collect();

        let mut per_message: BTreeMap<String, (u64, u64, Duration)> = BTreeMap::new();
        for entry in self.ring.iter().filter(|e| in_scope(e)) {
            let slot = per_message.entry(entry.event.message_name.clone()).or_insert((0, 0, Duration::ZERO));
            slot.0 += 1;
            if !entry.event.success {
                slot.1 += 1;
            }
            slot.2 += entry.event.duration;
        }
        let per_message = per_message
            .into_iter()
            .map(|(name, (count, failures, total))| {
                let mean = if count == 0 { Duration::ZERO } else { total / count as u32 };
                (name, MessageRollup { count, failures, mean })
            })
            .collect();

        let in_scope_count = self.ring.iter().filter(|e| in_scope(e)).count();
        let success_rate = if in_scope_count == 0 {
            1.0
        } else {
            self.ring.iter().filter(|e| in_scope(e) && e.event.success).count() as f64 / in_scope_count as f64
        };
        let p95_ms = percentile(0.95).as_millis() as f64;
        let health_score = (success_rate * (1.0 / (1.0 + p95_ms / 1000.0))).clamp(0.0, 1.0);

        let summary = Summary {
            invocations: in_scope_count as u64,
            failures: self.ring.iter().filter(|e| in_scope(e) && !e.event.success).count() as u64,
            p50: percentile(0.50),
            p90: percentile(0.90),
            p95: percentile(0.95),
            buckets,
            top_slowest,
            per_message,
            health_score,
        };

        if self.summary_history.len() >= self.summary_history_capacity {
            self.summary_history.pop_front();
        }
        self.summary_history.push_back(summary.clone());
        summary
    }

    pub fn summary_history(&self) -> Vec<Summary> {
        self.summary_history.iter().cloned().collect()
    }

    pub fn configure_summary_history(&mut self, capacity: usize) {
        self.summary_history_capacity = capacity.max(1);
        while self.summary_history.len() > self.summary_history_capacity {
            self.summary_history.pop_front();
        }
    }

    pub fn clear_summary_history(&mut self) {
        self.summary_history.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
