// ── Context Atoms: Constants ───────────────────────────────────────────────
// All named constants for the crate live here.
// Collecting them in one place eliminates magic numbers and keeps every layer's
// heuristics auditable.

// ── Cache defaults ────────────────────────────────────────────────────────
pub const DEFAULT_CACHE_MAX_SIZE: usize = 100;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_CACHE_CLEANUP_INTERVAL_SECS: u64 = 60;
/// Fixed bookkeeping overhead added to each entry's footprint estimate.
pub const CACHE_ENTRY_OVERHEAD_BYTES: usize = 128;

// ── Memory tier capacities ────────────────────────────────────────────────
pub const DEFAULT_SHORT_TERM_CAPACITY: usize = 50;
pub const DEFAULT_LONG_TERM_CAPACITY: usize = 1000;
pub const DEFAULT_WORKING_MEMORY_CAPACITY: usize = 10;

// ── Significance heuristic ────────────────────────────────────────────────
// An interaction is "significant" when at least two signals fire.
pub const SIGNIFICANT_CONTENT_LENGTH: usize = 100;
pub const SIGNIFICANCE_MIN_SIGNALS: usize = 2;
pub const INTERACTION_SUMMARY_CHARS: usize = 120;

/// Phrases that mark a message as worth remembering.
pub const MEMORY_TRIGGER_KEYWORDS: &[&str] = &[
    "remember",
    "don't forget",
    "never forget",
    "important",
    "my name is",
    "birthday",
    "anniversary",
    "favorite",
    "always",
    "never",
    "love",
    "hate",
    "promise",
    "secret",
    "dream",
    "family",
];

// ── Relevance blending ────────────────────────────────────────────────────
pub const RELEVANCE_SHORT_TERM_WEIGHT: f32 = 0.4;
pub const RELEVANCE_LONG_TERM_WEIGHT: f32 = 0.6;
/// Highlights surfaced into the Session layer per processed message.
pub const MEMORY_HIGHLIGHT_LIMIT: usize = 3;
/// Memories consulted when building a response context.
pub const RESPONSE_MEMORY_LIMIT: usize = 5;

// ── Emotion analyzer ──────────────────────────────────────────────────────
/// Runner-up label must exceed this score to be reported as secondary.
pub const SECONDARY_MIN_SCORE: f32 = 0.3;
/// Empirical ceiling for a single label's score (normalizes intensity).
pub const MAX_EXPECTED_EMOTION_SCORE: f32 = 3.0;
/// Confidence reported when no pattern matched at all.
pub const NO_SIGNAL_CONFIDENCE: f32 = 0.3;
/// Characters of input that take part in the cache fingerprint.
pub const FINGERPRINT_PREFIX_CHARS: usize = 200;
pub const DEFAULT_EMOTION_CACHE_CAPACITY: usize = 200;
pub const DEFAULT_EMOTION_CACHE_TTL_SECS: u64 = 600;

// ── Conversation flow ─────────────────────────────────────────────────────
pub const PHASE_GREETING_MAX: usize = 3;
pub const PHASE_EXPLORATION_MAX: usize = 10;
pub const PHASE_DEEP_DISCUSSION_MAX: usize = 30;
/// Average message length (chars) that saturates momentum.
pub const MOMENTUM_SCALE_CHARS: f32 = 200.0;
/// Average message length (chars) that saturates depth.
pub const DEPTH_SCALE_CHARS: f32 = 500.0;
pub const MIN_CLARITY: f32 = 0.3;
/// Messages considered by the flow heuristics.
pub const FLOW_WINDOW: usize = 10;
pub const MAX_ACTIVE_TOPICS: usize = 5;

// ── Validation scoring ────────────────────────────────────────────────────
pub const PENALTY_CRITICAL: f32 = 0.30;
pub const PENALTY_HIGH: f32 = 0.15;
pub const PENALTY_MEDIUM: f32 = 0.05;
pub const PENALTY_LOW: f32 = 0.02;
pub const PENALTY_PER_WARNING: f32 = 0.02;
/// Score history kept for trend analysis.
pub const VALIDATION_HISTORY_LIMIT: usize = 100;
/// Recent-vs-earlier average delta that counts as a trend.
pub const TREND_DELTA: f32 = 0.05;
/// Message history length above which a context is considered oversized.
pub const OVERSIZED_HISTORY: usize = 100;
/// Low emotional confidence that earns a quality warning.
pub const LOW_EMOTION_CONFIDENCE: f32 = 0.2;

// ── Performance monitor ───────────────────────────────────────────────────
pub const DEFAULT_METRIC_HISTORY_LIMIT: usize = 1000;
pub const DEFAULT_SLOW_OPERATION_MS: f64 = 100.0;
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_ERROR_RATE: f32 = 0.05;
pub const DEFAULT_MIN_CACHE_HIT_RATE: f32 = 0.5;
pub const MAX_ALERTS: usize = 100;
/// Fixed header of the CSV metrics export.
pub const METRICS_CSV_HEADER: &str =
    "timestamp,service,operation,duration,memoryUsage,inputSize,outputSize,cacheHit,errorOccurred";

// ── Event sources ─────────────────────────────────────────────────────────
pub const SOURCE_CACHE: &str = "context_cache";
pub const SOURCE_MEMORY: &str = "memory_system";
pub const SOURCE_MANAGER: &str = "context_manager";
