//! Per-query timing, kept in injected state rather than a global so tests
//! and future multi-instance setups each get their own monitor.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(1);
const SLOW_QUERY_SAMPLES: usize = 10;

#[derive(Debug, Default, Clone)]
struct QueryStats {
    count: u64,
    total: Duration,
    max: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowQuerySample {
    pub name: String,
    pub duration_ms: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryStatsView {
    pub name: String,
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub queries: Vec<QueryStatsView>,
    pub slow_queries: Vec<SlowQuerySample>,
}

#[derive(Default)]
struct MonitorInner {
    stats: HashMap<String, QueryStats>,
    slow: VecDeque<SlowQuerySample>,
}

#[derive(Default)]
pub struct QueryPerformanceMonitor {
    inner: Mutex<MonitorInner>,
}

impl QueryPerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let stats = inner.stats.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.total += duration;
        stats.max = stats.max.max(duration);

        if duration > SLOW_QUERY_THRESHOLD {
            if inner.slow.len() == SLOW_QUERY_SAMPLES {
                inner.slow.pop_front();
            }
            inner.slow.push_back(SlowQuerySample {
                name: name.to_string(),
                duration_ms: duration.as_millis() as u64,
                at: Utc::now(),
            });
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut queries: Vec<QueryStatsView> = inner
            .stats
            .iter()
            .map(|(name, s)| QueryStatsView {
                name: name.clone(),
                count: s.count,
                total_ms: s.total.as_millis() as u64,
                avg_ms: (s.total.as_millis() as u64) / s.count.max(1),
                max_ms: s.max.as_millis() as u64,
            })
            .collect();
        queries.sort_by(|a, b| b.total_ms.cmp(&a.total_ms));

        MonitorSnapshot {
            queries,
            slow_queries: inner.slow.iter().cloned().collect(),
        }
    }
}

/// Awaits `fut` and records its wall time under `name`.
pub async fn timed<T, F>(monitor: &QueryPerformanceMonitor, name: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let out = fut.await;
    monitor.record(name, started.elapsed());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_per_name() {
        let monitor = QueryPerformanceMonitor::new();
        monitor.record("users.list", Duration::from_millis(40));
        monitor.record("users.list", Duration::from_millis(60));
        monitor.record("users.count", Duration::from_millis(10));

        let snap = monitor.snapshot();
        let list = snap
            .queries
            .iter()
            .find(|q| q.name == "users.list")
            .unwrap();
        assert_eq!(list.count, 2);
        assert_eq!(list.total_ms, 100);
        assert_eq!(list.avg_ms, 50);
        assert_eq!(list.max_ms, 60);
        assert!(snap.slow_queries.is_empty());
    }

    #[test]
    fn slow_queries_are_sampled_and_capped() {
        let monitor = QueryPerformanceMonitor::new();
        for i in 0..15 {
            monitor.record(&format!("q{i}"), Duration::from_millis(1500));
        }
        let snap = monitor.snapshot();
        assert_eq!(snap.slow_queries.len(), SLOW_QUERY_SAMPLES);
        // Ring keeps the newest samples.
        assert_eq!(snap.slow_queries.first().unwrap().name, "q5");
        assert_eq!(snap.slow_queries.last().unwrap().name, "q14");
    }

    #[test]
    fn sub_threshold_queries_are_not_sampled() {
        let monitor = QueryPerformanceMonitor::new();
        monitor.record("fast", Duration::from_millis(999));
        assert!(monitor.snapshot().slow_queries.is_empty());
    }

    #[tokio::test]
    async fn timed_records_and_passes_through() {
        let monitor = QueryPerformanceMonitor::new();
        let value = timed(&monitor, "probe", async { 7 }).await;
        assert_eq!(value, 7);
        let snap = monitor.snapshot();
        assert_eq!(snap.queries.len(), 1);
        assert_eq!(snap.queries[0].count, 1);
    }
}
