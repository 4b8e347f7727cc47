// ── Context Manager ────────────────────────────────────────────────────────
//
// The orchestrator. Composes cache, memory, emotion analyzer, validator and
// monitor around one shared event bus, and turns each incoming message into a
// fresh layered Context:
//
//   System     ← injected, immutable SystemPolicy
//   Session    ← session id / counters + memory snapshot + learned profile
//   Immediate  ← recent messages + emotion + flow heuristics + environment
//
// Lifecycle:
//   Active ──clear_session──▶ Cleared ──process_message──▶ Active
//   any    ──shutdown──────▶ ShutDown (terminal)
//
// `process_message` and `get_context_for_response` never fail: any error
// becomes a safely-defaulted fallback Context plus an `error_occurred` event,
// and counters are left untouched.

use crate::atoms::config::ContextEngineConfig;
use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{
    ContextCompressor, EnvironmentProbe, FeedbackAnalytics, FeedbackCollector,
    FeedbackSubmission, InteractionMetadata, SystemEnvironmentProbe,
};
use crate::atoms::types::{
    CompressionMetadata, Context, ContextEvent, ContextEventType, Emotion, EmotionAnalysis,
    ImmediateContext, MemoryHighlight, MemorySnapshot, MemoryTier, Message, SessionContext,
    SystemContext, SystemPolicy, UserProfile,
};
use crate::engine::cache::{CacheStats, ContextCache};
use crate::engine::emotion::{EmotionAnalyzer, EmotionCacheStats, EmotionContext};
use crate::engine::events::{EventBus, ListenerId};
use crate::engine::flow;
use crate::engine::memory::{MemoryStats, MemorySystem, RelevantMemories};
use crate::engine::monitor::{OperationOutcome, OperationSpan, PerformanceMonitor, PerformanceReport};
use crate::engine::validation::{
    ContextValidator, HealthCheck, ValidationResult, ValidationRule, ValidationStats,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Cleared,
    ShutDown,
}

pub struct ContextManager {
    config: ContextEngineConfig,
    policy: Arc<SystemPolicy>,
    bus: EventBus,
    cache: ContextCache,
    memory: MemorySystem,
    emotion: EmotionAnalyzer,
    validator: ContextValidator,
    monitor: Arc<PerformanceMonitor>,
    probe: Box<dyn EnvironmentProbe>,
    compressor: Option<Arc<dyn ContextCompressor>>,
    feedback: Option<Arc<dyn FeedbackCollector>>,
    session_id: String,
    session_started: DateTime<Utc>,
    total_messages: usize,
    last_context: Option<Context>,
    last_emotion: Option<Emotion>,
    state: LifecycleState,
}

impl ContextManager {
    pub fn new(config: ContextEngineConfig, policy: SystemPolicy) -> Self {
        let config = config.sanitized();
        let bus = EventBus::new();
        Self {
            cache: ContextCache::new(&config.cache, bus.clone()),
            memory: MemorySystem::new(&config.memory, bus.clone()),
            emotion: EmotionAnalyzer::new(&config.emotion),
            validator: ContextValidator::new(&config.validation),
            monitor: Arc::new(PerformanceMonitor::new(&config.monitor)),
            probe: Box::new(SystemEnvironmentProbe::default()),
            compressor: None,
            feedback: None,
            policy: Arc::new(policy),
            bus,
            config,
            session_id: uuid::Uuid::new_v4().to_string(),
            session_started: Utc::now(),
            total_messages: 0,
            last_context: None,
            last_emotion: None,
            state: LifecycleState::Active,
        }
    }

    pub fn with_environment_probe(mut self, probe: impl EnvironmentProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn ContextCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_feedback_collector(mut self, collector: Arc<dyn FeedbackCollector>) -> Self {
        self.feedback = Some(collector);
        self
    }

    // ═════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═════════════════════════════════════════════════════════════════════

    /// Start background work (the cache sweep). Fails after shutdown.
    pub async fn initialize(&mut self) -> EngineResult<()> {
        self.ensure_running()?;
        let sweeping = self.cache.start_sweeper();
        info!(
            "[manager] Initialized session {} (sweeper={})",
            self.session_id, sweeping
        );
        Ok(())
    }

    /// Stop the sweep, drop every listener, and refuse further work.
    pub async fn shutdown(&mut self) {
        if self.state == LifecycleState::ShutDown {
            return;
        }
        self.cache.stop_sweeper();
        self.bus.clear();
        self.state = LifecycleState::ShutDown;
        info!(
            "[manager] Shut down session {} after {} message(s)",
            self.session_id, self.total_messages
        );
    }

    /// Start a new session. Long-term memory survives when `preserve_long_term`.
    pub fn clear_session(&mut self, preserve_long_term: bool) {
        if self.state == LifecycleState::ShutDown {
            warn!("[manager] clear_session ignored: manager is shut down");
            return;
        }
        let previous = std::mem::replace(&mut self.session_id, uuid::Uuid::new_v4().to_string());
        self.session_started = Utc::now();
        self.total_messages = 0;
        self.memory.clear_short_term();
        self.memory.clear_working();
        if !preserve_long_term {
            self.memory.clear_long_term();
        }
        self.cache.clear();
        self.emotion.clear_cache();
        self.last_context = None;
        self.last_emotion = None;
        self.state = LifecycleState::Cleared;

        info!(
            "[manager] Session {} cleared → {} (long-term {})",
            previous,
            self.session_id,
            if preserve_long_term { "kept" } else { "wiped" }
        );
        self.bus.publish(
            ContextEventType::ContextUpdated,
            SOURCE_MANAGER,
            json!({
                "action": "session_cleared",
                "previous_session_id": previous,
                "session_id": self.session_id,
                "preserved_long_term": preserve_long_term,
            }),
        );
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.state == LifecycleState::ShutDown {
            Err(EngineError::Lifecycle("context manager is shut down".into()))
        } else {
            Ok(())
        }
    }

    // ═════════════════════════════════════════════════════════════════════
    // Per-turn processing
    // ═════════════════════════════════════════════════════════════════════

    /// Build the context for an incoming message. Never fails.
    pub fn process_message(&mut self, message: Message) -> Context {
        let span = self
            .monitor
            .start(SOURCE_MANAGER, "process_message", message.content.len());

        match self.try_process_message(&message) {
            Ok(context) => {
                let metric = self.monitor.finish(
                    span,
                    OperationOutcome {
                        output_size: context.immediate.recent_messages.len(),
                        memory_usage: self.memory_footprint(),
                        cache_hit: None,
                        error_occurred: false,
                    },
                );
                if metric.duration_ms > self.config.timeouts.context_build_ms as f64 {
                    warn!(
                        "[manager] Context build took {:.1}ms (advisory limit {}ms)",
                        metric.duration_ms, self.config.timeouts.context_build_ms
                    );
                }
                context
            }
            Err(e) => self.fallback_after("process_message", e, span),
        }
    }

    fn try_process_message(&mut self, message: &Message) -> EngineResult<Context> {
        self.ensure_running()?;
        if message.id.trim().is_empty() {
            return Err(EngineError::context("process_message", "message id is empty"));
        }

        if self.state == LifecycleState::Cleared {
            self.state = LifecycleState::Active;
        }
        self.total_messages += 1;

        let emotion_ctx = EmotionContext {
            previous_emotion: self.last_emotion,
            phase: flow::phase_for(self.total_messages),
            active_topics: self
                .last_context
                .as_ref()
                .map(|c| c.immediate.active_topics.clone())
                .unwrap_or_default(),
        };
        let emotional_state = self
            .emotion
            .analyze_emotional_state(&message.content, &emotion_ctx);

        // the window the short-term tier will hold once this message lands
        let mut recent = self.memory.short_term().recent_messages(None);
        recent.push(message.clone());
        let excess = recent.len().saturating_sub(self.memory.short_term().capacity());
        recent.drain(..excess);

        // recall runs against prior turns only, so a message never matches itself
        let relevant = self
            .memory
            .get_relevant_memories(&message.content, MEMORY_HIGHLIGHT_LIMIT);

        let mut context = self.build_context(recent, emotional_state);
        self.memory.process_message(message, &context);

        context.session = self.session_layer(context.immediate.recent_messages.len(), Some(&relevant));
        self.memory.working_mut().update_context(context.clone());

        let key = format!("{}:{}", self.session_id, self.total_messages);
        self.cache.set(&key, context.clone(), None);

        self.last_emotion = Some(context.immediate.emotional_state.primary);
        self.last_context = Some(context.clone());

        self.bus.publish(
            ContextEventType::ContextCreated,
            SOURCE_MANAGER,
            json!({
                "session_id": self.session_id,
                "message_id": message.id,
                "cache_key": key,
                "total_messages": self.total_messages,
                "emotion": context.immediate.emotional_state.primary,
                "phase": context.immediate.conversation_flow.phase,
            }),
        );
        Ok(context)
    }

    /// Context for producing a reply to `query`. Cache-first; never fails.
    pub fn get_context_for_response(&mut self, query: &str) -> Context {
        let span = self
            .monitor
            .start(SOURCE_MANAGER, "get_context_for_response", query.len());
        if let Err(e) = self.ensure_running() {
            return self.fallback_after("get_context_for_response", e, span);
        }

        // keyed per turn: a new message invalidates every earlier response context
        let key = format!(
            "{}:{}:response:{}",
            self.session_id,
            self.total_messages,
            normalize_query(query)
        );
        if let Some(hit) = self.cache.get(&key) {
            self.monitor.finish(
                span,
                OperationOutcome {
                    output_size: hit.immediate.recent_messages.len(),
                    memory_usage: self.memory_footprint(),
                    cache_hit: Some(true),
                    error_occurred: false,
                },
            );
            return hit;
        }

        let relevant = self
            .memory
            .get_relevant_memories(query, RESPONSE_MEMORY_LIMIT);
        let mut context = match &self.last_context {
            Some(last) => last.clone(),
            None => self.base_context(),
        };
        context.session = self.session_layer(context.immediate.recent_messages.len(), Some(&relevant));
        context.timestamp = Utc::now();
        self.cache.set(&key, context.clone(), None);

        self.bus.publish(
            ContextEventType::ContextUpdated,
            SOURCE_MANAGER,
            json!({
                "action": "response_context",
                "session_id": self.session_id,
                "cache_key": key,
                "relevance_score": relevant.relevance_score,
                "memories": relevant.interactions.len() + relevant.preferences.len(),
            }),
        );
        self.monitor.finish(
            span,
            OperationOutcome {
                output_size: context.immediate.recent_messages.len(),
                memory_usage: self.memory_footprint(),
                cache_hit: Some(false),
                error_occurred: false,
            },
        );
        context
    }

    // ═════════════════════════════════════════════════════════════════════
    // Collaborators
    // ═════════════════════════════════════════════════════════════════════

    /// Replace the message history with the compressor's retained subset.
    /// The input context is left untouched.
    pub async fn compress_context(&self, context: &Context) -> EngineResult<Context> {
        self.ensure_running()?;
        let compressor = self.compressor.clone().ok_or_else(|| {
            EngineError::collaborator("compressor", "no context compressor configured")
        })?;

        let original = &context.immediate.recent_messages;
        let span = self
            .monitor
            .start(SOURCE_MANAGER, "compress_context", original.len());
        let outcome = match compressor.compress(original, context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_failure("compress_context", &e, span);
                return Err(e);
            }
        };

        let mut compressed = context.clone();
        compressed.immediate.compression = Some(CompressionMetadata {
            original_count: original.len(),
            retained_count: outcome.retained.len(),
            compression_ratio: outcome.compression_ratio.clamp(0.0, 1.0),
            emotional_tone: outcome.emotional_tone,
        });
        compressed.session.message_count = outcome.retained.len();
        compressed.immediate.recent_messages = outcome.retained;
        compressed.timestamp = Utc::now();

        info!(
            "[manager] Compressed {} → {} messages via {}",
            original.len(),
            compressed.immediate.recent_messages.len(),
            compressor.name()
        );
        self.bus.publish(
            ContextEventType::ContextUpdated,
            SOURCE_MANAGER,
            json!({
                "action": "compressed",
                "session_id": self.session_id,
                "compression": compressed.immediate.compression,
            }),
        );
        self.monitor.finish(
            span,
            OperationOutcome {
                output_size: compressed.immediate.recent_messages.len(),
                ..Default::default()
            },
        );
        Ok(compressed)
    }

    /// Summary of the recent conversation, produced by the compressor.
    pub async fn summarize_conversation(&self) -> EngineResult<String> {
        self.ensure_running()?;
        let compressor = self.compressor.clone().ok_or_else(|| {
            EngineError::collaborator("compressor", "no context compressor configured")
        })?;

        let messages = self.memory.short_term().recent_messages(None);
        let context = match &self.last_context {
            Some(last) => last.clone(),
            None => self.base_context(),
        };
        let span = self
            .monitor
            .start(SOURCE_MANAGER, "summarize_conversation", messages.len());
        match compressor.summarize(&messages, &context).await {
            Ok(summary) => {
                self.monitor.finish(
                    span,
                    OperationOutcome {
                        output_size: summary.len(),
                        ..Default::default()
                    },
                );
                Ok(summary)
            }
            Err(e) => {
                self.report_failure("summarize_conversation", &e, span);
                Err(e)
            }
        }
    }

    /// Forward a rating to the feedback collector. Suggested personality
    /// adjustments are announced as `personality_adjusted`; the static policy
    /// is never modified.
    pub async fn submit_feedback(
        &self,
        rating: u8,
        category: impl Into<String>,
        text: impl Into<String>,
    ) -> EngineResult<FeedbackAnalytics> {
        self.ensure_running()?;
        if !(1..=5).contains(&rating) {
            return Err(EngineError::Other(format!(
                "feedback rating must be 1-5, got {}",
                rating
            )));
        }
        let collector = self.feedback.clone().ok_or_else(|| {
            EngineError::collaborator("feedback", "no feedback collector configured")
        })?;

        let submission = FeedbackSubmission {
            rating,
            category: category.into(),
            text: text.into(),
            interaction: InteractionMetadata {
                session_id: self.session_id.clone(),
                total_messages: self.total_messages,
                last_emotion: self.last_emotion.unwrap_or_default(),
                phase: flow::phase_for(self.total_messages),
            },
        };

        let span = self.monitor.start(SOURCE_MANAGER, "submit_feedback", 1);
        let analytics = match collector.submit(submission).await {
            Ok(a) => a,
            Err(e) => {
                self.report_failure("submit_feedback", &e, span);
                return Err(e);
            }
        };
        self.monitor.finish(span, OperationOutcome::default());

        if !analytics.suggested_adjustments.is_empty() {
            self.bus.publish(
                ContextEventType::PersonalityAdjusted,
                SOURCE_MANAGER,
                json!({
                    "session_id": self.session_id,
                    "adjustments": analytics.suggested_adjustments,
                    "average_rating": analytics.average_rating,
                    "collector": collector.name(),
                }),
            );
        }
        Ok(analytics)
    }

    // ═════════════════════════════════════════════════════════════════════
    // Validation
    // ═════════════════════════════════════════════════════════════════════

    pub fn validate_context(&mut self, context: &Context) -> EngineResult<ValidationResult> {
        self.validator.validate_context(context)
    }

    pub fn validate_value(&mut self, value: &serde_json::Value) -> ValidationResult {
        self.validator.validate_value(value)
    }

    pub fn perform_health_check(&mut self, context: &Context) -> EngineResult<HealthCheck> {
        self.validator.perform_health_check(context)
    }

    pub fn validation_stats(&self) -> ValidationStats {
        self.validator.validation_stats()
    }

    pub fn register_validation_rule(
        &mut self,
        name: impl Into<String>,
        rule: impl ValidationRule + 'static,
    ) {
        self.validator.register_rule(name, rule);
    }

    pub fn unregister_validation_rule(&mut self, name: &str) -> bool {
        self.validator.unregister_rule(name)
    }

    // ═════════════════════════════════════════════════════════════════════
    // Observability
    // ═════════════════════════════════════════════════════════════════════

    pub fn performance_report(&self) -> PerformanceReport {
        self.monitor.report()
    }

    pub fn export_metrics_json(&self) -> EngineResult<String> {
        self.monitor.export_json()
    }

    pub fn export_metrics_csv(&self) -> String {
        self.monitor.export_csv()
    }

    pub fn monitor(&self) -> Arc<PerformanceMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    pub fn emotion_cache_stats(&self) -> EmotionCacheStats {
        self.emotion.cache_stats()
    }

    pub fn subscribe<F>(&self, event_type: ContextEventType, listener: F) -> ListenerId
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(event_type, listener)
    }

    pub fn unsubscribe(&self, event_type: ContextEventType, id: ListenerId) -> bool {
        self.bus.unsubscribe(event_type, id)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn total_messages(&self) -> usize {
        self.total_messages
    }

    pub fn last_context(&self) -> Option<&Context> {
        self.last_context.as_ref()
    }

    pub fn policy(&self) -> &SystemPolicy {
        &self.policy
    }

    pub fn memory(&self) -> &MemorySystem {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemorySystem {
        &mut self.memory
    }

    pub fn config(&self) -> &ContextEngineConfig {
        &self.config
    }

    // ═════════════════════════════════════════════════════════════════════
    // Context assembly
    // ═════════════════════════════════════════════════════════════════════

    fn build_context(&self, recent: Vec<Message>, emotional_state: EmotionAnalysis) -> Context {
        let active_topics = flow::active_topics(&recent);
        let conversation_flow = flow::analyze_flow(&recent, self.total_messages);
        Context {
            system: SystemContext::from(self.policy.as_ref()),
            session: self.session_layer(recent.len(), None),
            immediate: ImmediateContext {
                recent_messages: recent,
                emotional_state,
                active_topics,
                conversation_flow,
                environment: self.probe.snapshot(),
                compression: None,
            },
            timestamp: Utc::now(),
        }
    }

    /// A context over the current short-term window with neutral emotion.
    fn base_context(&self) -> Context {
        let recent = self.memory.short_term().recent_messages(None);
        self.build_context(recent, EmotionAnalysis::neutral())
    }

    fn session_layer(
        &self,
        message_count: usize,
        relevant: Option<&RelevantMemories>,
    ) -> SessionContext {
        let stats = self.memory.stats();
        SessionContext {
            session_id: self.session_id.clone(),
            started_at: self.session_started,
            message_count,
            total_messages: self.total_messages,
            user_profile: UserProfile {
                preferences: self
                    .memory
                    .long_term()
                    .preferences(None)
                    .into_iter()
                    .cloned()
                    .collect(),
                relationship: self.memory.relationship().clone(),
            },
            memory: MemorySnapshot {
                short_term_count: stats.short_term_count,
                long_term_count: stats.long_term_count,
                preference_count: stats.preference_count,
                highlights: relevant.map(highlights).unwrap_or_default(),
                relevance_score: relevant.map_or(0.0, |r| r.relevance_score),
            },
        }
    }

    /// Minimal context that always validates.
    fn fallback_context(&self) -> Context {
        Context {
            system: SystemContext::from(self.policy.as_ref()),
            session: SessionContext {
                session_id: self.session_id.clone(),
                started_at: self.session_started,
                message_count: 0,
                total_messages: self.total_messages,
                user_profile: UserProfile::default(),
                memory: MemorySnapshot::default(),
            },
            immediate: ImmediateContext::default(),
            timestamp: Utc::now(),
        }
    }

    fn fallback_after(&self, operation: &str, error: EngineError, span: OperationSpan) -> Context {
        self.report_failure(operation, &error, span);
        self.fallback_context()
    }

    fn report_failure(&self, operation: &str, error: &EngineError, span: OperationSpan) {
        warn!("[manager] {} failed: {}", operation, error);
        self.monitor.finish(
            span,
            OperationOutcome {
                error_occurred: true,
                ..Default::default()
            },
        );
        self.bus.publish(
            ContextEventType::ErrorOccurred,
            SOURCE_MANAGER,
            json!({
                "operation": operation,
                "error": error.to_string(),
                "session_id": self.session_id,
            }),
        );
    }

    /// Approximate footprint: characters held by the short-term window.
    fn memory_footprint(&self) -> u64 {
        self.memory.stats().short_term_chars as u64
    }
}

fn highlights(relevant: &RelevantMemories) -> Vec<MemoryHighlight> {
    let mut out: Vec<MemoryHighlight> = relevant
        .interactions
        .iter()
        .map(|i| MemoryHighlight {
            tier: MemoryTier::LongTerm,
            summary: i.summary.clone(),
            score: i.impact,
        })
        .chain(relevant.preferences.iter().map(|p| MemoryHighlight {
            tier: MemoryTier::LongTerm,
            summary: format!("{}: {}", p.category, p.preference),
            score: p.confidence,
        }))
        .collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out.truncate(MEMORY_HIGHLIGHT_LIMIT);
    out
}

/// Lowercased, whitespace-collapsed query used in response cache keys.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
