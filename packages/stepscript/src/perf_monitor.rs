//! Performance sampling for editor operations.
//!
//! This module provides:
//! - [`PerformanceMonitor`], a bounded ring buffer of timing samples
//! - Per-operation aggregates (count, average, max)
//! - Optional `[PERF]` log lines for every measured operation
//!
//! A monitor belongs to one editor session; there is no global instance.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Default number of samples retained.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 1000;

/// One timed operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub operation_name: String,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Aggregate over all retained samples of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub count: usize,
    pub average: Duration,
    pub max: Duration,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
    log_samples: bool,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl PerformanceMonitor {
    /// Create a monitor keeping at most `capacity` samples (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            log_samples: false,
        }
    }

    /// Emit a `[PERF]` info line for every recorded sample.
    pub fn set_logging_enabled(&mut self, enabled: bool) {
        self.log_samples = enabled;
        if enabled {
            log::info!("Performance logging ENABLED");
        } else {
            log::info!("Performance logging DISABLED");
        }
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.log_samples
    }

    /// Store a sample, evicting the oldest when full.
    pub fn record(&mut self, operation_name: &str, duration: Duration, metadata: Option<Value>) {
        if self.log_samples {
            log::info!(
                "[PERF] {}: {:.2}ms",
                operation_name,
                duration.as_secs_f64() * 1000.0
            );
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(PerformanceSample {
            operation_name: operation_name.to_string(),
            duration,
            timestamp: Utc::now(),
            metadata,
        });
    }

    /// Time a closure and record it. Returns the closure's result.
    pub fn measure<T, F: FnOnce() -> T>(&mut self, operation_name: &str, f: F) -> T {
        self.measure_with(operation_name, None, f)
    }

    /// Like [`measure`](Self::measure), attaching metadata to the sample.
    pub fn measure_with<T, F: FnOnce() -> T>(
        &mut self,
        operation_name: &str,
        metadata: Option<Value>,
        f: F,
    ) -> T {
        let start = Instant::now();
        let result = f();
        self.record(operation_name, start.elapsed(), metadata);
        result
    }

    /// Time a future from first poll to completion and record it.
    pub async fn measure_async<T, Fut>(&mut self, operation_name: &str, fut: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.record(operation_name, start.elapsed(), None);
        result
    }

    /// Mean duration of the named operation, or `None` if never sampled.
    pub fn get_average_duration(&self, operation_name: &str) -> Option<Duration> {
        let (count, total) = self
            .samples
            .iter()
            .filter(|s| s.operation_name == operation_name)
            .fold((0u32, Duration::ZERO), |(n, total), s| (n + 1, total + s.duration));
        if count == 0 {
            None
        } else {
            Some(total / count)
        }
    }

    /// Count/average/max per operation name, sorted by name.
    pub fn get_summary(&self) -> BTreeMap<String, OperationSummary> {
        let mut totals: BTreeMap<String, (u32, Duration, Duration)> = BTreeMap::new();
        for sample in &self.samples {
            let entry = totals
                .entry(sample.operation_name.clone())
                .or_insert((0, Duration::ZERO, Duration::ZERO));
            entry.0 += 1;
            entry.1 += sample.duration;
            entry.2 = entry.2.max(sample.duration);
        }
        totals
            .into_iter()
            .map(|(name, (count, total, max))| {
                (
                    name,
                    OperationSummary {
                        count: count as usize,
                        average: total / count,
                        max,
                    },
                )
            })
            .collect()
    }

    pub fn samples(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Time a block against a monitor.
/// Usage: `perf_time!(monitor, "label", { expensive_operation() })`
#[macro_export]
macro_rules! perf_time {
    ($monitor:expr, $label:expr, $body:expr) => {
        $monitor.measure($label, || $body)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut monitor = PerformanceMonitor::new(3);
        for i in 0..5 {
            monitor.record(&format!("op{}", i), ms(i), None);
        }
        let names: Vec<&str> = monitor.samples().map(|s| s.operation_name.as_str()).collect();
        assert_eq!(names, vec!["op2", "op3", "op4"]);
    }

    #[test]
    fn test_average_and_summary() {
        let mut monitor = PerformanceMonitor::default();
        monitor.record("render", ms(10), None);
        monitor.record("render", ms(30), None);
        monitor.record("edit", ms(5), Some(serde_json::json!({ "actionId": "a1" })));

        assert_eq!(monitor.get_average_duration("render"), Some(ms(20)));
        assert_eq!(monitor.get_average_duration("missing"), None);

        let summary = monitor.get_summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(
            summary["render"],
            OperationSummary { count: 2, average: ms(20), max: ms(30) }
        );
        assert_eq!(summary["edit"].count, 1);
    }

    #[test]
    fn test_measure_returns_result() {
        let mut monitor = PerformanceMonitor::default();
        let value = monitor.measure("sum", || (1..=10).sum::<u32>());
        assert_eq!(value, 55);
        assert_eq!(monitor.len(), 1);

        let doubled = perf_time!(monitor, "double", { value * 2 });
        assert_eq!(doubled, 110);
        assert_eq!(monitor.get_summary()["double"].count, 1);
    }

    #[test]
    fn test_measure_async() {
        let mut monitor = PerformanceMonitor::default();
        let value = pollster::block_on(monitor.measure_async("load", async { 7 }));
        assert_eq!(value, 7);
        assert_eq!(monitor.get_summary()["load"].count, 1);
    }

    #[test]
    fn test_clear() {
        let mut monitor = PerformanceMonitor::new(0);
        assert_eq!(monitor.capacity(), 1);
        monitor.record("a", ms(1), None);
        monitor.clear();
        assert!(monitor.is_empty());
    }
}
