// ── Emotion Analyzer ───────────────────────────────────────────────────────
//
// Text → EmotionAnalysis, pure heuristics over an ordered pattern table.
//
// Pipeline:
//   1. score each label: Σ match_count × base_intensity × weight
//   2. apply every intensity modifier present ("very", "slightly", ...)
//   3. primary = top label, secondary = runner-up above SECONDARY_MIN_SCORE
//   4. intensity / confidence from primary's share and strength
//   5. trend against the previous turn's label (polarity sets)
//
// Results are memoized under a SHA-256 fingerprint of (text prefix, previous
// emotion, phase, sorted topics) in a bounded, TTL-swept cache.

mod patterns;

use crate::atoms::config::EmotionConfig;
use crate::atoms::constants::*;
use crate::atoms::types::{ConversationPhase, Emotion, EmotionAnalysis, EmotionTrend};
use log::debug;
use patterns::{EMOTION_PATTERNS, INTENSITY_MODIFIERS, LABEL_ORDER};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Conversation state that influences (and keys) an analysis.
#[derive(Debug, Clone, Default)]
pub struct EmotionContext {
    pub previous_emotion: Option<Emotion>,
    pub phase: ConversationPhase,
    pub active_topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmotionCacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f32,
}

struct CachedAnalysis {
    analysis: EmotionAnalysis,
    stored_at: Instant,
}

pub struct EmotionAnalyzer {
    cache: HashMap<String, CachedAnalysis>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
    last_sweep: Instant,
    hits: u64,
    misses: u64,
}

impl EmotionAnalyzer {
    pub fn new(config: &EmotionConfig) -> Self {
        Self {
            cache: HashMap::new(),
            order: VecDeque::new(),
            capacity: config.cache_capacity.max(1) as usize,
            ttl: Duration::from_secs(config.cache_ttl_secs.max(0) as u64),
            last_sweep: Instant::now(),
            hits: 0,
            misses: 0,
        }
    }

    /// Analyze one text in the given conversational context.
    pub fn analyze_emotional_state(&mut self, text: &str, ctx: &EmotionContext) -> EmotionAnalysis {
        if self.last_sweep.elapsed() >= self.ttl {
            self.sweep_cache();
        }

        let key = fingerprint(text, ctx);
        if let Some(cached) = self.cache.get(&key) {
            if cached.stored_at.elapsed() < self.ttl {
                self.hits += 1;
                return cached.analysis.clone();
            }
        }
        self.misses += 1;

        let analysis = score_text(text, ctx.previous_emotion);
        self.insert(key, analysis.clone());
        analysis
    }

    fn insert(&mut self, key: String, analysis: EmotionAnalysis) {
        if self.cache.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.cache.insert(
            key.clone(),
            CachedAnalysis {
                analysis,
                stored_at: Instant::now(),
            },
        );
        self.order.push_back(key);
        while self.cache.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn sweep_cache(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.cache.len();
        self.cache.retain(|_, c| c.stored_at.elapsed() < ttl);
        let cache = &self.cache;
        self.order.retain(|k| cache.contains_key(k));
        self.last_sweep = Instant::now();
        let removed = before - self.cache.len();
        if removed > 0 {
            debug!("[emotion] Swept {} expired analyses", removed);
        }
        removed
    }

    pub fn cache_stats(&self) -> EmotionCacheStats {
        let total = self.hits + self.misses;
        EmotionCacheStats {
            size: self.cache.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                self.hits as f32 / total as f32
            },
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Scoring
// ═════════════════════════════════════════════════════════════════════════════

fn score_text(text: &str, previous: Option<Emotion>) -> EmotionAnalysis {
    let mut scores = [0.0f32; LABEL_ORDER.len()];
    let mut indicators: Vec<String> = Vec::new();

    for pattern in EMOTION_PATTERNS.iter() {
        let mut count = 0usize;
        for m in pattern.regex.find_iter(text) {
            count += 1;
            push_unique(&mut indicators, m.as_str().to_lowercase());
        }
        if count > 0 {
            if let Some(slot) = LABEL_ORDER.iter().position(|l| *l == pattern.label) {
                scores[slot] += count as f32 * pattern.intensity * pattern.weight;
            }
        }
    }

    let total: f32 = scores.iter().sum();
    if total <= 0.0 {
        return EmotionAnalysis {
            trend: trend(previous, Emotion::Neutral),
            ..EmotionAnalysis::neutral()
        };
    }

    let mut multiplier = 1.0f32;
    for modifier in INTENSITY_MODIFIERS.iter() {
        if modifier.regex.is_match(text) {
            multiplier *= modifier.multiplier;
            push_unique(&mut indicators, modifier.phrase.to_string());
        }
    }
    for s in scores.iter_mut() {
        *s *= multiplier;
    }
    let total = total * multiplier;

    // strict `>` keeps the earlier label on ties
    let mut primary_idx = 0;
    for (i, s) in scores.iter().enumerate() {
        if *s > scores[primary_idx] {
            primary_idx = i;
        }
    }
    let primary_score = scores[primary_idx];

    let secondary = scores
        .iter()
        .enumerate()
        .filter(|(i, s)| *i != primary_idx && **s > SECONDARY_MIN_SCORE)
        .fold(None::<(usize, f32)>, |best, (i, s)| match best {
            Some((_, b)) if *s <= b => best,
            _ => Some((i, *s)),
        })
        .map(|(i, _)| LABEL_ORDER[i]);

    let primary = LABEL_ORDER[primary_idx];
    let intensity = (primary_score / MAX_EXPECTED_EMOTION_SCORE).clamp(0.0, 1.0);
    let dominance = primary_score / total;
    let confidence = (0.6 * dominance + 0.4 * intensity).clamp(0.0, 1.0);

    EmotionAnalysis {
        primary,
        secondary,
        intensity,
        confidence,
        indicators,
        trend: trend(previous, primary),
    }
}

/// Direction of change between two turns, judged by polarity sets.
pub fn trend(previous: Option<Emotion>, current: Emotion) -> EmotionTrend {
    let Some(prev) = previous else {
        return EmotionTrend::Stable;
    };
    if (!prev.is_positive() && current.is_positive())
        || (prev.is_negative() && !current.is_negative())
    {
        EmotionTrend::Improving
    } else if (prev.is_positive() && !current.is_positive())
        || (!prev.is_negative() && current.is_negative())
    {
        EmotionTrend::Declining
    } else {
        EmotionTrend::Stable
    }
}

/// Hex SHA-256 over the lowercased text prefix and the emotional context.
fn fingerprint(text: &str, ctx: &EmotionContext) -> String {
    let prefix: String = text
        .chars()
        .take(FINGERPRINT_PREFIX_CHARS)
        .collect::<String>()
        .to_lowercase();
    let mut topics = ctx.active_topics.clone();
    topics.sort();

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(ctx.previous_emotion.map_or("none", |e| e.as_str()).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(ctx.phase.as_str().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(topics.join(",").as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}
