// ── Context Atoms: Engine Configuration ────────────────────────────────────
//
// Every section and field is optional; missing values fall back to the
// defaults in `atoms::constants`. Out-of-range values are never rejected:
// `sanitized()` clamps them and logs each correction.

use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use log::warn;
use serde::{Deserialize, Serialize};

/// Validation rule categories that can be switched on or off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Presence of required fields.
    Structure,
    /// JSON type of present fields.
    Types,
    /// Numeric trait/score fields within [0, 1].
    Ranges,
    /// Cross-field invariants.
    Consistency,
    /// Runtime-registered rules.
    Custom,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 5] = [
        RuleCategory::Structure,
        RuleCategory::Types,
        RuleCategory::Ranges,
        RuleCategory::Consistency,
        RuleCategory::Custom,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: i64,
    pub default_ttl_secs: i64,
    pub cleanup_interval_secs: i64,
    /// Advisory: reported in stats, payloads are stored as-is.
    pub compression_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE as i64,
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS as i64,
            cleanup_interval_secs: DEFAULT_CACHE_CLEANUP_INTERVAL_SECS as i64,
            compression_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub short_term_capacity: i64,
    pub long_term_capacity: i64,
    pub working_memory_capacity: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: DEFAULT_SHORT_TERM_CAPACITY as i64,
            long_term_capacity: DEFAULT_LONG_TERM_CAPACITY as i64,
            working_memory_capacity: DEFAULT_WORKING_MEMORY_CAPACITY as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Medium-severity errors also invalidate a context.
    pub strict_mode: bool,
    pub enabled_rule_set: Vec<RuleCategory>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            enabled_rule_set: RuleCategory::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionConfig {
    pub cache_capacity: i64,
    pub cache_ttl_secs: i64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_EMOTION_CACHE_CAPACITY as i64,
            cache_ttl_secs: DEFAULT_EMOTION_CACHE_TTL_SECS as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub history_limit: i64,
    pub slow_operation_ms: f64,
    pub max_memory_bytes: u64,
    pub max_error_rate: f32,
    pub min_cache_hit_rate: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_METRIC_HISTORY_LIMIT as i64,
            slow_operation_ms: DEFAULT_SLOW_OPERATION_MS,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_error_rate: DEFAULT_MAX_ERROR_RATE,
            min_cache_hit_rate: DEFAULT_MIN_CACHE_HIT_RATE,
        }
    }
}

/// Advisory timeouts. Recorded in metadata only, never enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub context_build_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            context_build_ms: 5_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextEngineConfig {
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub validation: ValidationConfig,
    pub emotion: EmotionConfig,
    pub monitor: MonitorConfig,
    pub timeouts: TimeoutConfig,
}

impl ContextEngineConfig {
    /// Parse a TOML document. Missing sections use defaults; the result is sanitized.
    pub fn from_toml_str(input: &str) -> EngineResult<Self> {
        let parsed: ContextEngineConfig = toml::from_str(input)?;
        Ok(parsed.sanitized())
    }

    /// Parse a JSON document. Missing sections use defaults; the result is sanitized.
    pub fn from_json_str(input: &str) -> EngineResult<Self> {
        let parsed: ContextEngineConfig = serde_json::from_str(input)?;
        Ok(parsed.sanitized())
    }

    /// Clamp out-of-range values instead of rejecting them.
    pub fn sanitized(mut self) -> Self {
        self.cache.max_size = clamp_min("cache.max_size", self.cache.max_size, 1);
        self.cache.default_ttl_secs =
            clamp_min("cache.default_ttl_secs", self.cache.default_ttl_secs, 0);
        self.cache.cleanup_interval_secs = clamp_min(
            "cache.cleanup_interval_secs",
            self.cache.cleanup_interval_secs,
            1,
        );
        self.memory.short_term_capacity = clamp_min(
            "memory.short_term_capacity",
            self.memory.short_term_capacity,
            1,
        );
        self.memory.long_term_capacity = clamp_min(
            "memory.long_term_capacity",
            self.memory.long_term_capacity,
            1,
        );
        self.memory.working_memory_capacity = clamp_min(
            "memory.working_memory_capacity",
            self.memory.working_memory_capacity,
            1,
        );
        self.emotion.cache_capacity =
            clamp_min("emotion.cache_capacity", self.emotion.cache_capacity, 1);
        self.emotion.cache_ttl_secs =
            clamp_min("emotion.cache_ttl_secs", self.emotion.cache_ttl_secs, 0);
        self.monitor.history_limit =
            clamp_min("monitor.history_limit", self.monitor.history_limit, 1);

        if !self.monitor.slow_operation_ms.is_finite() || self.monitor.slow_operation_ms <= 0.0 {
            warn!(
                "[config] monitor.slow_operation_ms={} is invalid, using {}",
                self.monitor.slow_operation_ms, DEFAULT_SLOW_OPERATION_MS
            );
            self.monitor.slow_operation_ms = DEFAULT_SLOW_OPERATION_MS;
        }
        self.monitor.max_error_rate = clamp_unit("monitor.max_error_rate", self.monitor.max_error_rate);
        self.monitor.min_cache_hit_rate =
            clamp_unit("monitor.min_cache_hit_rate", self.monitor.min_cache_hit_rate);
        self
    }
}

fn clamp_min(field: &str, value: i64, min: i64) -> i64 {
    if value < min {
        warn!("[config] {}={} is out of range, clamping to {}", field, value, min);
        min
    } else {
        value
    }
}

fn clamp_unit(field: &str, value: f32) -> f32 {
    if value.is_nan() {
        warn!("[config] {} is NaN, clamping to 0.0", field);
        return 0.0;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!("[config] {}={} is out of range, clamping to {}", field, value, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = ContextEngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ContextEngineConfig::default());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg = ContextEngineConfig::from_toml_str(
            r#"
            [cache]
            max_size = 3

            [validation]
            strict_mode = true
            enabled_rule_set = ["structure", "consistency"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.max_size, 3);
        assert_eq!(cfg.cache.default_ttl_secs, DEFAULT_CACHE_TTL_SECS as i64);
        assert!(cfg.validation.strict_mode);
        assert_eq!(
            cfg.validation.enabled_rule_set,
            vec![RuleCategory::Structure, RuleCategory::Consistency]
        );
    }

    #[test]
    fn negative_values_are_clamped() {
        let cfg = ContextEngineConfig::from_json_str(
            r#"{"cache": {"max_size": -5, "default_ttl_secs": -1},
                "memory": {"short_term_capacity": 0},
                "monitor": {"max_error_rate": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.max_size, 1);
        assert_eq!(cfg.cache.default_ttl_secs, 0);
        assert_eq!(cfg.memory.short_term_capacity, 1);
        assert_eq!(cfg.monitor.max_error_rate, 1.0);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(ContextEngineConfig::from_toml_str("[cache\nmax_size = ").is_err());
    }
}
