// ── Memory System Module ───────────────────────────────────────────────────
//
// Three-tier conversational memory.
//
// Architecture:
//   Short-Term (FIFO message window) → Working Memory (current turn) → Long-Term (significant
//   interactions, learned preferences, relationship progress)
//
// Sub-modules:
//   - eviction: first-class bounded-store policies (FIFO, lowest-impact, completed-first)
//   - short_term: bounded chronological message buffer
//   - long_term: interactions + preferences + relationship
//   - working: current-context slot, active processes, scratch map
//
// `MemorySystem::process_message` is the per-turn entry point: it appends to
// short-term, replaces the working context, runs the significance heuristic,
// extracts preferences, and emits `memory_updated` naming the touched tiers.

pub mod eviction;
pub mod long_term;
pub mod short_term;
pub mod working;

pub use long_term::LongTermMemory;
pub use short_term::ShortTermMemory;
pub use working::WorkingMemory;

use crate::atoms::config::MemoryConfig;
use crate::atoms::constants::*;
use crate::atoms::types::{
    Context, ContextEventType, Emotion, LearnedPreference, MemoryTier, Message,
    RelationshipProgress, Sender, SignificantInteraction,
};
use crate::engine::events::EventBus;
use chrono::Utc;
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::sync::LazyLock;

// ═════════════════════════════════════════════════════════════════════════════
// Reports
// ═════════════════════════════════════════════════════════════════════════════

/// What one `process_message` call changed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryUpdate {
    pub tiers: Vec<MemoryTier>,
    pub significant_interaction_id: Option<String>,
    pub preferences_updated: usize,
    pub evicted_messages: usize,
}

/// Memories relevant to a query, blended across tiers.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RelevantMemories {
    pub recent_messages: Vec<Message>,
    pub interactions: Vec<SignificantInteraction>,
    pub preferences: Vec<LearnedPreference>,
    /// 0.4 × short-term hit ratio + 0.6 × long-term topic-hit ratio
    pub relevance_score: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryStats {
    pub short_term_count: usize,
    pub short_term_capacity: usize,
    pub short_term_chars: usize,
    pub long_term_count: usize,
    pub long_term_capacity: usize,
    pub preference_count: usize,
    pub process_count: usize,
    pub temporary_entries: usize,
    pub has_current_context: bool,
}

// ═════════════════════════════════════════════════════════════════════════════
// Preference extraction patterns (compiled once, stored in static)
// ═════════════════════════════════════════════════════════════════════════════

struct PreferencePattern {
    regex: Regex,
    /// `None` = the first capture group names the category.
    category: Option<&'static str>,
    confidence: f32,
}

static PREFERENCE_PATTERNS: LazyLock<Vec<PreferencePattern>> = LazyLock::new(|| {
    const TAIL: &str = r"(?:[.!?,;]|\s+(?:and|but|because|so)\b|$)";
    let patterns: Vec<(String, Option<&'static str>, f32)> = vec![
        // "my favorite color is blue"
        (
            format!(r"(?i)\bmy\s+favou?rite\s+([a-z]+)\s+is\s+([a-z0-9][a-z0-9 '\-]{{0,40}}?){TAIL}"),
            None,
            0.9,
        ),
        // "I (really) love/like/enjoy X"
        (
            format!(r"(?i)\bi\s+(?:really\s+)?(?:love|like|enjoy)\s+([a-z0-9][a-z0-9 '\-]{{0,40}}?){TAIL}"),
            Some("interests"),
            0.7,
        ),
        // "I prefer X"
        (
            format!(r"(?i)\bi\s+(?:much\s+)?prefer\s+([a-z0-9][a-z0-9 '\-]{{0,40}}?){TAIL}"),
            Some("style"),
            0.75,
        ),
        // "I hate/dislike/don't like X"
        (
            format!(r"(?i)\bi\s+(?:really\s+)?(?:hate|dislike|don't\s+like|do\s+not\s+like|can't\s+stand)\s+([a-z0-9][a-z0-9 '\-]{{0,40}}?){TAIL}"),
            Some("aversions"),
            0.7,
        ),
    ];

    patterns
        .into_iter()
        .filter_map(|(pattern, category, confidence)| match Regex::new(&pattern) {
            Ok(regex) => Some(PreferencePattern {
                regex,
                category,
                confidence,
            }),
            Err(e) => {
                warn!("[memory] Failed to compile preference pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
});

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "was",
    "what", "when", "where", "who", "how", "why", "can", "could", "would", "should", "have",
    "has", "had", "about", "from", "they", "them", "there", "then", "than", "just", "like",
    "all", "any", "our", "out", "into", "its", "it's", "i'm", "did", "does", "too", "very",
];

/// Lowercased content words (≥ 3 chars, no stopwords), deduplicated in order.
pub(crate) fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
    {
        let word = word.trim_matches('\'');
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Pull preference candidates out of a user message.
pub fn extract_preferences(content: &str) -> Vec<LearnedPreference> {
    let now = Utc::now();
    let mut found = Vec::new();
    for pattern in PREFERENCE_PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(content) {
            let (category, preference) = match pattern.category {
                Some(cat) => (cat.to_string(), caps.get(1)),
                None => (
                    caps.get(1)
                        .map(|m| m.as_str().to_lowercase())
                        .unwrap_or_default(),
                    caps.get(2),
                ),
            };
            let Some(preference) = preference.map(|m| m.as_str().trim().to_lowercase()) else {
                continue;
            };
            if preference.is_empty() || category.is_empty() {
                continue;
            }
            found.push(LearnedPreference {
                category,
                preference,
                confidence: pattern.confidence,
                evidence: vec![content.to_string()],
                last_updated: now,
            });
        }
    }
    found
}

// ═════════════════════════════════════════════════════════════════════════════
// MemorySystem
// ═════════════════════════════════════════════════════════════════════════════

pub struct MemorySystem {
    short_term: ShortTermMemory,
    long_term: LongTermMemory,
    working: WorkingMemory,
    bus: EventBus,
}

impl MemorySystem {
    pub fn new(config: &MemoryConfig, bus: EventBus) -> Self {
        Self {
            short_term: ShortTermMemory::new(config.short_term_capacity.max(1) as usize),
            long_term: LongTermMemory::new(config.long_term_capacity.max(1) as usize),
            working: WorkingMemory::new(config.working_memory_capacity.max(1) as usize),
            bus,
        }
    }

    /// Per-turn update across all tiers.
    pub fn process_message(&mut self, message: &Message, context: &Context) -> MemoryUpdate {
        let mut tiers = vec![MemoryTier::ShortTerm, MemoryTier::Working];

        let evicted = self.short_term.add_message(message.clone());
        self.working.update_context(context.clone());

        let significant_interaction_id = if is_significant(message, context) {
            let interaction = synthesize_interaction(message, context);
            let id = interaction.id.clone();
            let evicted = self.long_term.store_significant_interaction(interaction);
            let kept = !evicted.iter().any(|e| e.id == id);
            info!(
                "[memory] Significant interaction {} {}",
                id,
                if kept { "stored" } else { "evicted on arrival" }
            );
            tiers.push(MemoryTier::LongTerm);
            Some(id)
        } else {
            None
        };

        let mut preferences_updated = 0;
        if message.sender == Sender::User {
            for candidate in extract_preferences(&message.content) {
                let stored = self.long_term.update_preference(candidate);
                debug!(
                    "[memory] Preference {}:{} → confidence {:.2}",
                    stored.category, stored.preference, stored.confidence
                );
                preferences_updated += 1;
            }
            if preferences_updated > 0 && !tiers.contains(&MemoryTier::LongTerm) {
                tiers.push(MemoryTier::LongTerm);
            }
        }

        let update = MemoryUpdate {
            tiers,
            significant_interaction_id,
            preferences_updated,
            evicted_messages: evicted.len(),
        };
        self.bus.publish(
            ContextEventType::MemoryUpdated,
            SOURCE_MEMORY,
            json!({
                "message_id": message.id,
                "tiers": update.tiers,
                "significant_interaction_id": update.significant_interaction_id,
                "preferences_updated": update.preferences_updated,
            }),
        );
        update
    }

    /// Blend short-term hits, long-term hits, and matching preferences.
    pub fn get_relevant_memories(&self, query: &str, limit: usize) -> RelevantMemories {
        let terms = keywords(query);
        if terms.is_empty() {
            return RelevantMemories::default();
        }

        let matches = |text: &str| {
            let lower = text.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        };

        let st_matches: Vec<&Message> =
            self.short_term.iter().filter(|m| matches(&m.content)).collect();
        let st_ratio = ratio(st_matches.len(), self.short_term.len());
        let lt_ratio = ratio(
            self.long_term.topic_hits(query),
            self.long_term.interaction_count(),
        );

        let skip = st_matches.len().saturating_sub(limit);
        let recent_messages = st_matches.into_iter().skip(skip).cloned().collect();
        let interactions = self.long_term.search_significant_interactions(query, limit);
        let preferences = self
            .long_term
            .preferences(None)
            .into_iter()
            .filter(|p| matches(&p.category) || matches(&p.preference))
            .take(limit)
            .cloned()
            .collect();

        RelevantMemories {
            recent_messages,
            interactions,
            preferences,
            relevance_score: (RELEVANCE_SHORT_TERM_WEIGHT * st_ratio
                + RELEVANCE_LONG_TERM_WEIGHT * lt_ratio)
                .clamp(0.0, 1.0),
        }
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            short_term_count: self.short_term.len(),
            short_term_capacity: self.short_term.capacity(),
            short_term_chars: self.short_term.total_chars(),
            long_term_count: self.long_term.interaction_count(),
            long_term_capacity: self.long_term.capacity(),
            preference_count: self.long_term.preference_count(),
            process_count: self.working.process_count(),
            temporary_entries: self.working.temporary_len(),
            has_current_context: self.working.current_context().is_some(),
        }
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    pub fn short_term_mut(&mut self) -> &mut ShortTermMemory {
        &mut self.short_term
    }

    pub fn long_term(&self) -> &LongTermMemory {
        &self.long_term
    }

    pub fn long_term_mut(&mut self) -> &mut LongTermMemory {
        &mut self.long_term
    }

    pub fn working(&self) -> &WorkingMemory {
        &self.working
    }

    pub fn working_mut(&mut self) -> &mut WorkingMemory {
        &mut self.working
    }

    pub fn relationship(&self) -> &RelationshipProgress {
        self.long_term.relationship()
    }

    pub fn clear_short_term(&mut self) {
        self.short_term.clear();
    }

    pub fn clear_working(&mut self) {
        self.working.clear();
    }

    pub fn clear_long_term(&mut self) {
        self.long_term.clear();
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Significance heuristic
// ═════════════════════════════════════════════════════════════════════════════

fn significance_signals(message: &Message, context: &Context) -> usize {
    let lower = message.content.to_lowercase();
    let long = message.content.chars().count() > SIGNIFICANT_CONTENT_LENGTH;
    let emotional = context.immediate.emotional_state.primary != Emotion::Neutral;
    let triggered = MEMORY_TRIGGER_KEYWORDS.iter().any(|k| lower.contains(k));
    [long, emotional, triggered].iter().filter(|s| **s).count()
}

/// True when at least two of {long content, non-neutral emotion, trigger keyword} fire.
pub fn is_significant(message: &Message, context: &Context) -> bool {
    significance_signals(message, context) >= SIGNIFICANCE_MIN_SIGNALS
}

fn synthesize_interaction(message: &Message, context: &Context) -> SignificantInteraction {
    let signals = significance_signals(message, context) as f32;
    let intensity = context.immediate.emotional_state.intensity.clamp(0.0, 1.0);

    let summary: String = message
        .content
        .chars()
        .take(INTERACTION_SUMMARY_CHARS)
        .collect();

    // active topics first, then the trigger phrases that fired
    let lower = message.content.to_lowercase();
    let mut topics = context.immediate.active_topics.clone();
    for trigger in MEMORY_TRIGGER_KEYWORDS.iter().filter(|k| lower.contains(*k)) {
        if !topics.iter().any(|t| t == trigger) {
            topics.push(trigger.to_string());
        }
    }

    SignificantInteraction {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: message.timestamp,
        summary,
        impact: (0.3 + 0.15 * signals + 0.3 * intensity).clamp(0.0, 1.0),
        emotional_resonance: intensity,
        topics,
    }
}

fn ratio(hits: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        hits as f32 / total as f32
    }
}
