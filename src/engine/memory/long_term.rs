// ── Memory: Long-Term Tier ─────────────────────────────────────────────────
//
// Holds what outlives the conversational window:
//   - significant interactions (bounded; the lowest-impact one is evicted)
//   - learned preferences (upsert by category + preference)
//   - relationship progress (shallow partial merge)
//
// Impact-first eviction can discard an interaction that was only just stored
// if it is the weakest one; recency does not weigh in.

use super::eviction::{BoundedStore, LowestImpactPolicy};
use super::keywords;
use crate::atoms::types::{
    LearnedPreference, RelationshipProgress, RelationshipUpdate, SignificantInteraction,
};
use chrono::Utc;
use log::debug;

pub struct LongTermMemory {
    interactions: BoundedStore<SignificantInteraction, LowestImpactPolicy>,
    preferences: Vec<LearnedPreference>,
    relationship: RelationshipProgress,
}

impl LongTermMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            interactions: BoundedStore::new(capacity, LowestImpactPolicy),
            preferences: Vec::new(),
            relationship: RelationshipProgress::default(),
        }
    }

    // ── Significant interactions ───────────────────────────────────────

    /// Store an interaction (scores clamped to [0, 1]). Returns what was evicted.
    pub fn store_significant_interaction(
        &mut self,
        mut interaction: SignificantInteraction,
    ) -> Vec<SignificantInteraction> {
        interaction.impact = clamp_unit(interaction.impact);
        interaction.emotional_resonance = clamp_unit(interaction.emotional_resonance);
        let evicted = self.interactions.push(interaction);
        for e in &evicted {
            debug!(
                "[memory::long_term] Evicted interaction {} (impact {:.2})",
                e.id, e.impact
            );
        }
        evicted
    }

    /// Keyword match over summary + topics, highest impact first.
    pub fn search_significant_interactions(
        &self,
        query: &str,
        limit: usize,
    ) -> Vec<SignificantInteraction> {
        let terms = keywords(query);
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits: Vec<&SignificantInteraction> = self
            .interactions
            .iter()
            .filter(|i| {
                let summary = i.summary.to_lowercase();
                terms.iter().any(|t| {
                    summary.contains(t.as_str())
                        || i.topics.iter().any(|topic| topic.to_lowercase().contains(t.as_str()))
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.impact
                .partial_cmp(&a.impact)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        hits.into_iter().take(limit).cloned().collect()
    }

    /// Interactions whose topics mention any keyword of `query`.
    pub fn topic_hits(&self, query: &str) -> usize {
        let terms = keywords(query);
        self.interactions
            .iter()
            .filter(|i| {
                i.topics.iter().any(|topic| {
                    let topic = topic.to_lowercase();
                    terms.iter().any(|t| topic.contains(t.as_str()))
                })
            })
            .count()
    }

    pub fn interactions(&self) -> &[SignificantInteraction] {
        self.interactions.items()
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    pub fn capacity(&self) -> usize {
        self.interactions.capacity()
    }

    // ── Preferences ────────────────────────────────────────────────────

    /// Upsert by (category, preference): confidence becomes the mean of old and
    /// new, evidence is concatenated, last_updated is replaced.
    pub fn update_preference(&mut self, candidate: LearnedPreference) -> &LearnedPreference {
        let confidence = clamp_unit(candidate.confidence);
        let pos = self.preferences.iter().position(|p| {
            p.category.eq_ignore_ascii_case(&candidate.category)
                && p.preference.eq_ignore_ascii_case(&candidate.preference)
        });

        let idx = match pos {
            Some(i) => {
                let existing = &mut self.preferences[i];
                existing.confidence = (existing.confidence + confidence) / 2.0;
                existing.evidence.extend(candidate.evidence);
                existing.last_updated = Utc::now();
                i
            }
            None => {
                self.preferences.push(LearnedPreference {
                    confidence,
                    last_updated: Utc::now(),
                    ..candidate
                });
                self.preferences.len() - 1
            }
        };
        &self.preferences[idx]
    }

    /// All preferences, or only one category's.
    pub fn preferences(&self, category: Option<&str>) -> Vec<&LearnedPreference> {
        self.preferences
            .iter()
            .filter(|p| category.map_or(true, |c| p.category.eq_ignore_ascii_case(c)))
            .collect()
    }

    pub fn preference_count(&self) -> usize {
        self.preferences.len()
    }

    // ── Relationship ───────────────────────────────────────────────────

    /// Shallow merge: every `Some` field replaces the current value.
    pub fn update_relationship_progress(
        &mut self,
        update: RelationshipUpdate,
    ) -> &RelationshipProgress {
        if let Some(trust) = update.trust_level {
            self.relationship.trust_level = clamp_unit(trust);
        }
        if let Some(intimacy) = update.intimacy_level {
            self.relationship.intimacy_level = clamp_unit(intimacy);
        }
        if let Some(shared) = update.shared_experiences {
            self.relationship.shared_experiences = shared;
        }
        if let Some(log) = update.evolution_log {
            self.relationship.evolution_log = log;
        }
        &self.relationship
    }

    pub fn relationship(&self) -> &RelationshipProgress {
        &self.relationship
    }

    pub fn clear(&mut self) {
        self.interactions.clear();
        self.preferences.clear();
        self.relationship = RelationshipProgress::default();
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
