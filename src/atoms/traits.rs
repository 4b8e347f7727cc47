// ── Context Atoms: Collaborator Traits ─────────────────────────────────────
//
// The engine never talks to renderers, LLMs, or analytics back-ends directly.
// Those collaborators plug in through the traits below; the engine only hands
// them plain data and substitutes what they return.

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    Context, ConversationPhase, Emotion, EnvironmentSnapshot, Message, TimeOfDay,
};
use async_trait::async_trait;
use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Environment probe ──────────────────────────────────────────────────────

/// Supplies device / timezone / time-of-day for the Immediate layer.
pub trait EnvironmentProbe: Send + Sync {
    fn snapshot(&self) -> EnvironmentSnapshot;
}

/// Default probe backed by the local system clock.
#[derive(Debug, Clone)]
pub struct SystemEnvironmentProbe {
    device: String,
}

impl SystemEnvironmentProbe {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Default for SystemEnvironmentProbe {
    fn default() -> Self {
        Self::new(std::env::consts::OS)
    }
}

impl EnvironmentProbe for SystemEnvironmentProbe {
    fn snapshot(&self) -> EnvironmentSnapshot {
        let now = Local::now();
        EnvironmentSnapshot {
            device: self.device.clone(),
            timezone: now.format("%:z").to_string(),
            time_of_day: TimeOfDay::from_hour(now.hour()),
        }
    }
}

// ── Compression collaborator ───────────────────────────────────────────────

/// What a compressor hands back: the retained subset plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionOutcome {
    pub retained: Vec<Message>,
    /// retained / original, 0.0–1.0
    pub compression_ratio: f32,
    pub emotional_tone: String,
}

/// Shrinks a message history (and summarizes conversations) on the engine's behalf.
#[async_trait]
pub trait ContextCompressor: Send + Sync {
    fn name(&self) -> &str;

    async fn compress(
        &self,
        messages: &[Message],
        context: &Context,
    ) -> EngineResult<CompressionOutcome>;

    async fn summarize(&self, messages: &[Message], context: &Context) -> EngineResult<String>;
}

// ── Feedback collaborator ──────────────────────────────────────────────────

/// Interaction metadata the manager attaches to each feedback submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionMetadata {
    pub session_id: String,
    pub total_messages: usize,
    pub last_emotion: Emotion,
    pub phase: ConversationPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackSubmission {
    /// 1–5
    pub rating: u8,
    pub category: String,
    pub text: String,
    pub interaction: InteractionMetadata,
}

/// Aggregate analytics returned by the collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackAnalytics {
    pub total_submissions: usize,
    pub average_rating: f32,
    pub ratings_by_category: BTreeMap<String, f32>,
    /// Trait name → suggested delta. Reported as `personality_adjusted`;
    /// the static policy itself is never mutated.
    #[serde(default)]
    pub suggested_adjustments: BTreeMap<String, f32>,
}

#[async_trait]
pub trait FeedbackCollector: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, feedback: FeedbackSubmission) -> EngineResult<FeedbackAnalytics>;
}
