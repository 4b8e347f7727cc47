// ── Integration tests ──────────────────────────────────────────────────────
//
// End-to-end behaviour through the public API: each component on its own,
// then the manager composing them.

use async_trait::async_trait;
use chrono::Utc;
use openpawz_context::atoms::config::{EmotionConfig, ValidationConfig};
use openpawz_context::atoms::constants::METRICS_CSV_HEADER;
use openpawz_context::atoms::traits::{
    CompressionOutcome, ContextCompressor, FeedbackAnalytics, FeedbackCollector,
    FeedbackSubmission,
};
use openpawz_context::atoms::types::{Emotion, LearnedPreference, SignificantInteraction};
use openpawz_context::engine::cache::TtlCache;
use openpawz_context::engine::emotion::{EmotionAnalyzer, EmotionContext};
use openpawz_context::engine::memory::{LongTermMemory, ShortTermMemory};
use openpawz_context::engine::validation::{
    ContextValidator, ErrorType, HealthCategory, RuleFindings, Severity,
};
use openpawz_context::{
    Context, ContextEngineConfig, ContextEvent, ContextEventType, ContextManager, EngineError,
    EngineResult, Message, SystemPolicy,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn manager() -> ContextManager {
    ContextManager::new(ContextEngineConfig::default(), SystemPolicy::default())
}

fn record(m: &ContextManager, event_type: ContextEventType) -> Arc<Mutex<Vec<ContextEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    m.subscribe(event_type, move |e| sink.lock().push(e.clone()));
    seen
}

fn interaction(id: &str, impact: f32) -> SignificantInteraction {
    SignificantInteraction {
        id: id.into(),
        timestamp: Utc::now(),
        summary: format!("interaction {}", id),
        impact,
        emotional_resonance: 0.5,
        topics: vec!["travel".into()],
    }
}

fn preference(confidence: f32, evidence: &str) -> LearnedPreference {
    LearnedPreference {
        category: "food".into(),
        preference: "ramen".into(),
        confidence,
        evidence: vec![evidence.into()],
        last_updated: Utc::now(),
    }
}

/// Keeps the last `keep` messages.
struct TailCompressor {
    keep: usize,
}

#[async_trait]
impl ContextCompressor for TailCompressor {
    fn name(&self) -> &str {
        "tail"
    }

    async fn compress(
        &self,
        messages: &[Message],
        _context: &Context,
    ) -> EngineResult<CompressionOutcome> {
        let skip = messages.len().saturating_sub(self.keep);
        let retained: Vec<Message> = messages[skip..].to_vec();
        Ok(CompressionOutcome {
            compression_ratio: retained.len() as f32 / messages.len().max(1) as f32,
            retained,
            emotional_tone: "calm".into(),
        })
    }

    async fn summarize(&self, messages: &[Message], _context: &Context) -> EngineResult<String> {
        Ok(format!("{} messages", messages.len()))
    }
}

struct FailingCompressor;

#[async_trait]
impl ContextCompressor for FailingCompressor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn compress(&self, _: &[Message], _: &Context) -> EngineResult<CompressionOutcome> {
        Err(EngineError::collaborator("failing", "model unavailable"))
    }

    async fn summarize(&self, _: &[Message], _: &Context) -> EngineResult<String> {
        Err(EngineError::collaborator("failing", "model unavailable"))
    }
}

/// Averages ratings; a low rating suggests more warmth.
#[derive(Default)]
struct AveragingCollector {
    ratings: Mutex<Vec<u8>>,
}

#[async_trait]
impl FeedbackCollector for AveragingCollector {
    fn name(&self) -> &str {
        "averaging"
    }

    async fn submit(&self, feedback: FeedbackSubmission) -> EngineResult<FeedbackAnalytics> {
        let mut ratings = self.ratings.lock();
        ratings.push(feedback.rating);
        let average = ratings.iter().map(|r| *r as f32).sum::<f32>() / ratings.len() as f32;

        let mut suggested_adjustments = BTreeMap::new();
        if feedback.rating <= 2 {
            suggested_adjustments.insert("warmth".to_string(), 0.1);
        }
        Ok(FeedbackAnalytics {
            total_submissions: ratings.len(),
            average_rating: average,
            ratings_by_category: BTreeMap::from([(feedback.category, average)]),
            suggested_adjustments,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn cache_evicts_least_recently_used() {
    let cache: TtlCache<String> = TtlCache::with_capacity(3, 300);
    cache.set("A", "a".into(), None);
    cache.set("B", "b".into(), None);
    cache.set("C", "c".into(), None);
    assert_eq!(cache.get("A").as_deref(), Some("a"));
    cache.set("D", "d".into(), None);

    assert!(!cache.has("B"));
    assert!(cache.has("A"));
    assert!(cache.has("C"));
    assert!(cache.has("D"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn cache_zero_ttl_is_immediately_unavailable() {
    let cache: TtlCache<String> = TtlCache::with_capacity(3, 300);
    cache.set("gone", "x".into(), Some(0));
    assert!(cache.get("gone").is_none());
    assert!(!cache.has("gone"));
    assert_eq!(cache.len(), 0);
}

#[test]
fn cache_stats_track_hits_and_misses() {
    let cache: TtlCache<String> = TtlCache::with_capacity(10, 300);
    cache.set("k", "v".into(), None);
    cache.get("k");
    cache.get("missing");
    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.total_accesses, 2);
    assert!((stats.hit_rate - 0.5).abs() < 1e-6);
    assert!(stats.estimated_memory_bytes > 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Memory tiers
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn short_term_keeps_last_n_in_order() {
    let mut st = ShortTermMemory::new(5);
    for i in 0..10 {
        st.add_message(Message::user(format!("m{}", i)));
    }
    let contents: Vec<String> = st
        .recent_messages(None)
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["m5", "m6", "m7", "m8", "m9"]);
}

#[test]
fn long_term_overflow_drops_lowest_impact() {
    let mut lt = LongTermMemory::new(3);
    lt.store_significant_interaction(interaction("first", 0.9));
    lt.store_significant_interaction(interaction("weak", 0.2));
    lt.store_significant_interaction(interaction("mid", 0.5));
    let evicted = lt.store_significant_interaction(interaction("new", 0.7));

    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].id, "weak");
    let ids: Vec<&str> = lt.interactions().iter().map(|i| i.id.as_str()).collect();
    assert!(ids.contains(&"first"));
    assert!(ids.contains(&"new"));
    assert_eq!(lt.interaction_count(), 3);
}

#[test]
fn preference_updates_merge_confidence() {
    let mut lt = LongTermMemory::new(10);
    lt.update_preference(preference(0.6, "I like ramen"));
    lt.update_preference(preference(0.8, "ramen is the best"));

    let prefs = lt.preferences(Some("food"));
    assert_eq!(prefs.len(), 1);
    assert!((prefs[0].confidence - 0.7).abs() < 1e-6);
    assert_eq!(prefs[0].evidence.len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// Emotion
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn intensity_modifiers_and_cache() {
    let mut analyzer = EmotionAnalyzer::new(&EmotionConfig::default());
    let ctx = EmotionContext::default();

    let plain = analyzer.analyze_emotional_state("I am happy", &ctx);
    let boosted = analyzer.analyze_emotional_state("I am very extremely happy", &ctx);
    assert_eq!(plain.primary, Emotion::Happy);
    assert_eq!(boosted.primary, Emotion::Happy);
    assert!(boosted.intensity > plain.intensity);

    let again = analyzer.analyze_emotional_state("I am very extremely happy", &ctx);
    assert_eq!(again, boosted);
    assert_eq!(analyzer.cache_stats().hits, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn processed_context_validates_cleanly() {
    let mut m = manager();
    m.process_message(Message::user("Hello there"));
    let ctx = m.process_message(Message::user("Can you recommend a good album?"));

    let result = m.validate_context(&ctx).unwrap();
    assert!(result.is_valid, "{:?}", result.errors);
    assert!(result.score > 0.8);
}

#[test]
fn missing_system_layer_is_critical() {
    let mut m = manager();
    let ctx = m.process_message(Message::user("hi"));
    let mut value = serde_json::to_value(&ctx).unwrap();
    value.as_object_mut().unwrap().remove("system");

    let result = m.validate_value(&value);
    assert!(!result.is_valid);
    let err = result.errors.iter().find(|e| e.field == "system").unwrap();
    assert_eq!(err.severity, Severity::Critical);
    assert_eq!(err.error_type, ErrorType::Missing);
}

#[test]
fn message_count_mismatch_is_inconsistent() {
    let mut m = manager();
    let mut ctx = m.process_message(Message::user("hi"));
    ctx.session.message_count = 7;

    let result = m.validate_context(&ctx).unwrap();
    assert!(result
        .errors
        .iter()
        .any(|e| e.error_type == ErrorType::Inconsistent && e.field == "session.message_count"));
}

#[test]
fn failing_custom_rule_is_downgraded() {
    let mut validator = ContextValidator::new(&ValidationConfig::default());
    validator.register_rule(
        "always_fails",
        |_: &serde_json::Value| -> Result<Option<RuleFindings>, String> {
            Err("rule exploded".into())
        },
    );
    let mut m = manager();
    let ctx = m.process_message(Message::user("hi"));

    let result = validator.validate_context(&ctx).unwrap();
    let err = result
        .errors
        .iter()
        .find(|e| e.error_type == ErrorType::CustomRule)
        .unwrap();
    assert_eq!(err.severity, Severity::Low);
    assert!(result.is_valid);
}

#[test]
fn empty_context_health_reports_data_quality() {
    let mut m = manager();
    let ctx = m.get_context_for_response("hello");
    assert!(ctx.immediate.recent_messages.is_empty());
    assert!(ctx.immediate.active_topics.is_empty());

    let report = m.perform_health_check(&ctx).unwrap();
    assert!(report.validation.is_valid);
    assert!(report.issues_in(HealthCategory::DataQuality).count() >= 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Manager
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn clear_session_with_and_without_long_term() {
    let mut m = manager();
    m.process_message(Message::user(
        "Please remember this, I was so happy on our trip to Kyoto",
    ));
    m.process_message(Message::user("ok"));
    assert_eq!(m.memory_stats().long_term_count, 1);
    let first = m.session_id().to_string();

    m.clear_session(true);
    let stats = m.memory_stats();
    assert_ne!(m.session_id(), first);
    assert_eq!(stats.short_term_count, 0);
    assert!(!stats.has_current_context);
    assert_eq!(stats.long_term_count, 1);

    let second = m.session_id().to_string();
    m.clear_session(false);
    assert_ne!(m.session_id(), second);
    assert_eq!(m.memory_stats().long_term_count, 0);
}

#[test]
fn events_flow_through_one_bus() {
    let mut m = manager();
    let created = record(&m, ContextEventType::ContextCreated);
    let memory = record(&m, ContextEventType::MemoryUpdated);
    let cached = record(&m, ContextEventType::ContextCached);

    m.process_message(Message::user("I prefer short answers"));

    assert_eq!(created.lock().len(), 1);
    assert_eq!(memory.lock().len(), 1);
    assert_eq!(cached.lock().len(), 1);
    let event = created.lock()[0].clone();
    assert_eq!(event.source, "context_manager");
    assert_eq!(event.payload["total_messages"], 1);
}

#[test]
fn unsubscribe_stops_delivery() {
    let mut m = manager();
    let seen = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&seen);
    let id = m.subscribe(ContextEventType::ContextCreated, move |_| *sink.lock() += 1);

    m.process_message(Message::user("one"));
    assert!(m.unsubscribe(ContextEventType::ContextCreated, id));
    m.process_message(Message::user("two"));
    assert_eq!(*seen.lock(), 1);
}

#[test]
fn learned_preferences_reach_session_layer() {
    let mut m = manager();
    let ctx = m.process_message(Message::user("My favorite food is ramen"));
    let prefs = &ctx.session.user_profile.preferences;
    assert_eq!(prefs.len(), 1);
    assert_eq!(prefs[0].category, "food");
    assert_eq!(prefs[0].preference, "ramen");
}

#[test]
fn metrics_export_after_processing() {
    let mut m = manager();
    m.process_message(Message::user("hello"));
    m.get_context_for_response("hello");
    m.get_context_for_response("hello");

    let report = m.performance_report();
    assert_eq!(report.total_operations, 3);
    let response = report
        .operations
        .iter()
        .find(|o| o.operation == "get_context_for_response")
        .unwrap();
    assert_eq!(response.count, 2);
    assert_eq!(response.cache_hit_rate, Some(0.5));

    let csv = m.export_metrics_csv();
    assert_eq!(csv.lines().next(), Some(METRICS_CSV_HEADER));
    assert_eq!(csv.lines().count(), 4);

    let json: serde_json::Value = serde_json::from_str(&m.export_metrics_json().unwrap()).unwrap();
    assert!(json.is_object() || json.is_array());
}

#[tokio::test]
async fn compression_substitutes_retained_messages() {
    let mut m = manager().with_compressor(Arc::new(TailCompressor { keep: 2 }));
    m.initialize().await.unwrap();
    let mut ctx = m.process_message(Message::user("one"));
    for text in ["two", "three", "four"] {
        ctx = m.process_message(Message::user(text));
    }
    assert_eq!(ctx.immediate.recent_messages.len(), 4);

    let compressed = m.compress_context(&ctx).await.unwrap();
    assert_eq!(compressed.immediate.recent_messages.len(), 2);
    assert_eq!(compressed.session.message_count, 2);
    let meta = compressed.immediate.compression.clone().unwrap();
    assert_eq!(meta.original_count, 4);
    assert_eq!(meta.retained_count, 2);
    assert!((meta.compression_ratio - 0.5).abs() < 1e-6);
    assert_eq!(ctx.immediate.recent_messages.len(), 4);

    assert!(m.validate_context(&compressed).unwrap().is_valid);
    assert_eq!(m.summarize_conversation().await.unwrap(), "4 messages");
    m.shutdown().await;
}

#[tokio::test]
async fn compressor_failure_is_reported() {
    let mut m = manager().with_compressor(Arc::new(FailingCompressor));
    let errors = record(&m, ContextEventType::ErrorOccurred);
    let ctx = m.process_message(Message::user("hi"));

    let result = m.compress_context(&ctx).await;
    assert!(matches!(result, Err(EngineError::Collaborator { .. })));
    assert_eq!(errors.lock().len(), 1);
    assert_eq!(errors.lock()[0].payload["operation"], "compress_context");
}

#[tokio::test]
async fn low_rating_announces_personality_adjustment() {
    let collector = Arc::new(AveragingCollector::default());
    let mut m = manager().with_feedback_collector(collector);
    let adjusted = record(&m, ContextEventType::PersonalityAdjusted);
    m.process_message(Message::user("hi"));

    let good = m.submit_feedback(5, "tone", "lovely").await.unwrap();
    assert!(good.suggested_adjustments.is_empty());
    assert!(adjusted.lock().is_empty());

    let bad = m.submit_feedback(1, "tone", "too cold").await.unwrap();
    assert_eq!(bad.total_submissions, 2);
    assert!((bad.average_rating - 3.0).abs() < 1e-6);
    assert_eq!(adjusted.lock().len(), 1);
    assert_eq!(adjusted.lock()[0].payload["adjustments"]["warmth"], 0.1f32 as f64);

    // static policy is untouched
    assert_eq!(m.policy().personality.traits["warmth"], 0.8);
}

#[tokio::test]
async fn shutdown_refuses_work_but_stays_usable() {
    let mut m = manager();
    m.initialize().await.unwrap();
    m.process_message(Message::user("hi"));
    m.shutdown().await;

    let ctx = m.process_message(Message::user("anyone?"));
    assert!(ctx.immediate.recent_messages.is_empty());
    assert_eq!(m.total_messages(), 1);
    assert!(m.validate_context(&ctx).unwrap().is_valid);
    assert!(m.initialize().await.is_err());
}
