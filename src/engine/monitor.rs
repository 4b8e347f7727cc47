// ── Performance Monitor ────────────────────────────────────────────────────
//
// Wraps engine operations transparently:
//
//   let span = monitor.start("context_manager", "process_message", input_len);
//   ... do the work ...
//   monitor.finish(span, OperationOutcome { output_size, .. });
//
// Keeps a FIFO-bounded metric history, raises threshold alerts (slow
// operation and high memory on record; error rate and cache hit rate when a
// report is built), derives prioritized recommendations, and exports the
// history as JSON or CSV.
//
// Interior mutability (parking_lot) so a shared `&PerformanceMonitor` can be
// handed to any caller, like the daily token tracker in engine state.

use crate::atoms::config::MonitorConfig;
use crate::atoms::constants::{MAX_ALERTS, METRICS_CSV_HEADER};
use crate::atoms::error::EngineResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Instant;

// ═════════════════════════════════════════════════════════════════════════════
// Types
// ═════════════════════════════════════════════════════════════════════════════

/// One timed operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetric {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub duration_ms: f64,
    pub memory_usage: u64,
    pub input_size: usize,
    pub output_size: usize,
    /// `None` when the operation never consulted a cache.
    pub cache_hit: Option<bool>,
    pub error_occurred: bool,
}

/// An in-flight measurement returned by `start`.
#[derive(Debug)]
pub struct OperationSpan {
    service: String,
    operation: String,
    input_size: usize,
    started: Instant,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OperationOutcome {
    pub output_size: usize,
    pub memory_usage: u64,
    pub cache_hit: Option<bool>,
    pub error_occurred: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SlowOperation,
    HighMemory,
    HighErrorRate,
    LowCacheHitRate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceAlert {
    pub kind: AlertKind,
    pub service: String,
    pub operation: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregates for one (service, operation) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationStats {
    pub service: String,
    pub operation: String,
    pub count: usize,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub error_rate: f32,
    /// Over metrics that reported a cache outcome; `None` if none did.
    pub cache_hit_rate: Option<f32>,
    pub avg_memory_bytes: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub service: String,
    pub operation: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub total_operations: usize,
    pub avg_duration_ms: f64,
    pub error_rate: f32,
    pub operations: Vec<OperationStats>,
    pub alerts: Vec<PerformanceAlert>,
    pub recommendations: Vec<Recommendation>,
}

// ═════════════════════════════════════════════════════════════════════════════
// Monitor
// ═════════════════════════════════════════════════════════════════════════════

pub struct PerformanceMonitor {
    config: MonitorConfig,
    history_limit: usize,
    metrics: Mutex<VecDeque<PerformanceMetric>>,
    alerts: Mutex<VecDeque<PerformanceAlert>>,
    /// Report-time conditions currently in breach, keyed by (kind, service, operation).
    breaches: Mutex<HashSet<(AlertKind, String, String)>>,
}

impl PerformanceMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            config: config.clone(),
            history_limit: config.history_limit.max(1) as usize,
            metrics: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(VecDeque::new()),
            breaches: Mutex::new(HashSet::new()),
        }
    }

    pub fn start(
        &self,
        service: impl Into<String>,
        operation: impl Into<String>,
        input_size: usize,
    ) -> OperationSpan {
        OperationSpan {
            service: service.into(),
            operation: operation.into(),
            input_size,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Close a span and record the measured metric.
    pub fn finish(&self, span: OperationSpan, outcome: OperationOutcome) -> PerformanceMetric {
        let metric = PerformanceMetric {
            timestamp: span.started_at,
            service: span.service,
            operation: span.operation,
            duration_ms: span.started.elapsed().as_secs_f64() * 1000.0,
            memory_usage: outcome.memory_usage,
            input_size: span.input_size,
            output_size: outcome.output_size,
            cache_hit: outcome.cache_hit,
            error_occurred: outcome.error_occurred,
        };
        self.record(metric.clone());
        metric
    }

    /// Record an externally timed metric.
    pub fn record(&self, metric: PerformanceMetric) {
        if metric.duration_ms > self.config.slow_operation_ms {
            self.raise(PerformanceAlert {
                kind: AlertKind::SlowOperation,
                service: metric.service.clone(),
                operation: metric.operation.clone(),
                message: format!(
                    "{}.{} took {:.1}ms",
                    metric.service, metric.operation, metric.duration_ms
                ),
                value: metric.duration_ms,
                threshold: self.config.slow_operation_ms,
                timestamp: Utc::now(),
            });
        }
        if metric.memory_usage > self.config.max_memory_bytes {
            self.raise(PerformanceAlert {
                kind: AlertKind::HighMemory,
                service: metric.service.clone(),
                operation: metric.operation.clone(),
                message: format!(
                    "{}.{} used {} bytes",
                    metric.service, metric.operation, metric.memory_usage
                ),
                value: metric.memory_usage as f64,
                threshold: self.config.max_memory_bytes as f64,
                timestamp: Utc::now(),
            });
        }

        let mut metrics = self.metrics.lock();
        metrics.push_back(metric);
        while metrics.len() > self.history_limit {
            metrics.pop_front();
        }
    }

    fn raise(&self, alert: PerformanceAlert) {
        tracing::warn!(
            kind = ?alert.kind,
            service = %alert.service,
            operation = %alert.operation,
            value = alert.value,
            threshold = alert.threshold,
            "performance alert: {}",
            alert.message
        );
        let mut alerts = self.alerts.lock();
        alerts.push_back(alert);
        while alerts.len() > MAX_ALERTS {
            alerts.pop_front();
        }
    }

    pub fn metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.lock().iter().cloned().collect()
    }

    pub fn alerts(&self) -> Vec<PerformanceAlert> {
        self.alerts.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    // ── Statistics ─────────────────────────────────────────────────────

    /// Per (service, operation) aggregates, sorted by service then operation.
    pub fn operation_stats(&self) -> Vec<OperationStats> {
        let metrics = self.metrics.lock();
        let mut groups: BTreeMap<(&str, &str), Vec<&PerformanceMetric>> = BTreeMap::new();
        for m in metrics.iter() {
            groups
                .entry((m.service.as_str(), m.operation.as_str()))
                .or_default()
                .push(m);
        }

        groups
            .into_iter()
            .map(|((service, operation), group)| summarize(service, operation, &group))
            .collect()
    }

    /// Prioritized (high → low) advice derived from the current statistics.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        recommend(&self.config, &self.operation_stats())
    }

    /// Build a report. Rate-based alerts are evaluated here.
    pub fn report(&self) -> PerformanceReport {
        let operations = self.operation_stats();

        for op in &operations {
            let failing = op.error_rate > self.config.max_error_rate;
            if self.breach(AlertKind::HighErrorRate, op, failing) {
                self.raise(PerformanceAlert {
                    kind: AlertKind::HighErrorRate,
                    service: op.service.clone(),
                    operation: op.operation.clone(),
                    message: format!(
                        "{}.{} error rate {:.0}%",
                        op.service,
                        op.operation,
                        op.error_rate * 100.0
                    ),
                    value: op.error_rate as f64,
                    threshold: self.config.max_error_rate as f64,
                    timestamp: Utc::now(),
                });
            }
            if let Some(rate) = op.cache_hit_rate {
                let cold = rate < self.config.min_cache_hit_rate;
                if self.breach(AlertKind::LowCacheHitRate, op, cold) {
                    self.raise(PerformanceAlert {
                        kind: AlertKind::LowCacheHitRate,
                        service: op.service.clone(),
                        operation: op.operation.clone(),
                        message: format!(
                            "{}.{} cache hit rate {:.0}%",
                            op.service,
                            op.operation,
                            rate * 100.0
                        ),
                        value: rate as f64,
                        threshold: self.config.min_cache_hit_rate as f64,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        let total: usize = operations.iter().map(|o| o.count).sum();
        let (duration_sum, errors) = operations.iter().fold((0.0, 0.0), |(d, e), o| {
            (d + o.avg_duration_ms * o.count as f64, e + o.error_rate as f64 * o.count as f64)
        });

        PerformanceReport {
            generated_at: Utc::now(),
            total_operations: total,
            avg_duration_ms: if total == 0 { 0.0 } else { duration_sum / total as f64 },
            error_rate: if total == 0 { 0.0 } else { (errors / total as f64) as f32 },
            recommendations: recommend(&self.config, &operations),
            operations,
            alerts: self.alerts(),
        }
    }

    /// Track a report-time condition; true only when it newly enters breach.
    fn breach(&self, kind: AlertKind, op: &OperationStats, breached: bool) -> bool {
        let key = (kind, op.service.clone(), op.operation.clone());
        let mut breaches = self.breaches.lock();
        if breached {
            breaches.insert(key)
        } else {
            breaches.remove(&key);
            false
        }
    }

    // ── Export ─────────────────────────────────────────────────────────

    pub fn export_json(&self) -> EngineResult<String> {
        let metrics = self.metrics();
        Ok(serde_json::to_string_pretty(&metrics)?)
    }

    pub fn export_csv(&self) -> String {
        let metrics = self.metrics.lock();
        let mut out = String::with_capacity(METRICS_CSV_HEADER.len() + metrics.len() * 96);
        out.push_str(METRICS_CSV_HEADER);
        out.push('\n');
        for m in metrics.iter() {
            let cache_hit = match m.cache_hit {
                Some(hit) => hit.to_string(),
                None => String::new(),
            };
            out.push_str(&format!(
                "{},{},{},{:.3},{},{},{},{},{}\n",
                m.timestamp.to_rfc3339(),
                csv_field(&m.service),
                csv_field(&m.operation),
                m.duration_ms,
                m.memory_usage,
                m.input_size,
                m.output_size,
                cache_hit,
                m.error_occurred
            ));
        }
        out
    }

    pub fn clear(&self) {
        self.metrics.lock().clear();
        self.alerts.lock().clear();
        self.breaches.lock().clear();
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Helpers
// ═════════════════════════════════════════════════════════════════════════════

fn summarize(service: &str, operation: &str, group: &[&PerformanceMetric]) -> OperationStats {
    let n = group.len();
    let mut durations: Vec<f64> = group.iter().map(|m| m.duration_ms).collect();
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let errors = group.iter().filter(|m| m.error_occurred).count();
    let cache_outcomes: Vec<bool> = group.iter().filter_map(|m| m.cache_hit).collect();
    let cache_hit_rate = if cache_outcomes.is_empty() {
        None
    } else {
        Some(cache_outcomes.iter().filter(|h| **h).count() as f32 / cache_outcomes.len() as f32)
    };

    OperationStats {
        service: service.to_string(),
        operation: operation.to_string(),
        count: n,
        avg_duration_ms: durations.iter().sum::<f64>() / n as f64,
        min_duration_ms: durations.first().copied().unwrap_or(0.0),
        max_duration_ms: durations.last().copied().unwrap_or(0.0),
        p95_duration_ms: percentile(&durations, 0.95),
        error_rate: errors as f32 / n as f32,
        cache_hit_rate,
        avg_memory_bytes: group.iter().map(|m| m.memory_usage as f64).sum::<f64>() / n as f64,
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn recommend(config: &MonitorConfig, operations: &[OperationStats]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let mut push = |priority, op: &OperationStats, message: String| {
        out.push(Recommendation {
            priority,
            service: op.service.clone(),
            operation: op.operation.clone(),
            message,
        })
    };

    for op in operations {
        if op.error_rate > config.max_error_rate {
            push(
                RecommendationPriority::High,
                op,
                format!(
                    "Investigate failures: {:.0}% of calls error (limit {:.0}%)",
                    op.error_rate * 100.0,
                    config.max_error_rate * 100.0
                ),
            );
        }
        if op.p95_duration_ms > config.slow_operation_ms {
            push(
                RecommendationPriority::High,
                op,
                format!(
                    "p95 latency {:.1}ms exceeds {:.0}ms; cache the result or shrink the input",
                    op.p95_duration_ms, config.slow_operation_ms
                ),
            );
        } else if op.avg_duration_ms > config.slow_operation_ms / 2.0 {
            push(
                RecommendationPriority::Medium,
                op,
                format!(
                    "Average latency {:.1}ms is approaching the {:.0}ms limit",
                    op.avg_duration_ms, config.slow_operation_ms
                ),
            );
        }
        if let Some(rate) = op.cache_hit_rate {
            if rate < config.min_cache_hit_rate {
                push(
                    RecommendationPriority::Medium,
                    op,
                    format!(
                        "Cache hit rate {:.0}% is low; raise the cache TTL or size",
                        rate * 100.0
                    ),
                );
            }
        }
        if op.avg_memory_bytes > config.max_memory_bytes as f64 * 0.8 {
            push(
                RecommendationPriority::Medium,
                op,
                "Memory use is close to the limit; compress the context more often".to_string(),
            );
        }
        if op.count >= 10 && op.avg_duration_ms < 1.0 && op.cache_hit_rate == Some(1.0) {
            push(
                RecommendationPriority::Low,
                op,
                "Always served from cache; the cache TTL could be shortened".to_string(),
            );
        }
    }

    // stable: equal priorities keep operation order
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
