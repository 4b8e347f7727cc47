// ── Context Atoms: Core Types ──────────────────────────────────────────────
//
// Type definitions for the layered conversation context and the memory records
// it is assembled from. These are pure data types (no logic beyond small
// constructors and classification helpers, no I/O).
//
// Follows the project pattern: structs in atoms/, impls in engine/.

use crate::atoms::constants::NO_SIGNAL_CONFIDENCE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 1: Messages
// ═══════════════════════════════════════════════════════════════════════════

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    System,
}

/// A single conversational message as supplied by the message producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh UUID and the current time.
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 2: Emotion
// ═══════════════════════════════════════════════════════════════════════════

/// Emotion labels produced by the analyzer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Excited,
    Curious,
    Sad,
    Frustrated,
    Confused,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Excited => "excited",
            Emotion::Curious => "curious",
            Emotion::Sad => "sad",
            Emotion::Frustrated => "frustrated",
            Emotion::Confused => "confused",
        }
    }

    /// Member of the positive polarity set (happy / excited / curious).
    pub fn is_positive(&self) -> bool {
        matches!(self, Emotion::Happy | Emotion::Excited | Emotion::Curious)
    }

    /// Member of the negative polarity set (sad / frustrated / confused).
    pub fn is_negative(&self) -> bool {
        matches!(self, Emotion::Sad | Emotion::Frustrated | Emotion::Confused)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of emotional change relative to the previous turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTrend {
    Improving,
    Declining,
    #[default]
    Stable,
}

/// Result of analyzing one piece of text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionAnalysis {
    pub primary: Emotion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Emotion>,
    /// 0.0–1.0
    pub intensity: f32,
    /// 0.0–1.0
    pub confidence: f32,
    /// Phrases that contributed to the score.
    pub indicators: Vec<String>,
    pub trend: EmotionTrend,
}

impl EmotionAnalysis {
    /// The "nothing detected" analysis.
    pub fn neutral() -> Self {
        Self {
            primary: Emotion::Neutral,
            secondary: None,
            intensity: 0.0,
            confidence: NO_SIGNAL_CONFIDENCE,
            indicators: Vec::new(),
            trend: EmotionTrend::Stable,
        }
    }
}

impl Default for EmotionAnalysis {
    fn default() -> Self {
        Self::neutral()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 3: Memory Records
// ═══════════════════════════════════════════════════════════════════════════

/// The memory tiers, used to report which tiers an update touched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
    Working,
}

/// An interaction judged important enough for long-term retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignificantInteraction {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    /// 0.0–1.0; lowest impact is evicted first.
    pub impact: f32,
    /// 0.0–1.0
    pub emotional_resonance: f32,
    pub topics: Vec<String>,
}

/// A preference learned from the user's own words.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearnedPreference {
    pub category: String,
    pub preference: String,
    /// 0.0–1.0
    pub confidence: f32,
    pub evidence: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// One entry in the relationship's evolution log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipMilestone {
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Progress of the agent–user relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipProgress {
    /// 0.0–1.0
    pub trust_level: f32,
    /// 0.0–1.0
    pub intimacy_level: f32,
    pub shared_experiences: Vec<String>,
    pub evolution_log: Vec<RelationshipMilestone>,
}

impl Default for RelationshipProgress {
    fn default() -> Self {
        Self {
            trust_level: 0.5,
            intimacy_level: 0.1,
            shared_experiences: Vec::new(),
            evolution_log: Vec::new(),
        }
    }
}

/// Partial update for `RelationshipProgress`. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    #[serde(default)]
    pub trust_level: Option<f32>,
    #[serde(default)]
    pub intimacy_level: Option<f32>,
    #[serde(default)]
    pub shared_experiences: Option<Vec<String>>,
    #[serde(default)]
    pub evolution_log: Option<Vec<RelationshipMilestone>>,
}

/// Lifecycle of an in-flight working-memory process.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// A tracked in-flight process (e.g. "compression", "topic_tracking").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveProcess {
    pub id: String,
    pub process_type: String,
    pub status: ProcessStatus,
    /// 0.0–1.0
    pub progress: f32,
    #[serde(default)]
    pub data: serde_json::Value,
    pub started_at: DateTime<Utc>,
}

impl ActiveProcess {
    pub fn new(id: impl Into<String>, process_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_type: process_type.into(),
            status: ProcessStatus::Pending,
            progress: 0.0,
            data: serde_json::Value::Null,
            started_at: Utc::now(),
        }
    }
}

/// Partial update for an `ActiveProcess`.
#[derive(Debug, Clone, Default)]
pub struct ProcessUpdate {
    pub status: Option<ProcessStatus>,
    pub progress: Option<f32>,
    pub data: Option<serde_json::Value>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 4: Context Layers
// ═══════════════════════════════════════════════════════════════════════════

/// Static personality description carried in the System layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalityProfile {
    pub name: String,
    /// Trait name → strength (0.0–1.0).
    pub traits: BTreeMap<String, f32>,
    pub communication_style: String,
}

/// The injected, immutable policy the System layer is built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemPolicy {
    pub personality: PersonalityProfile,
    pub capabilities: Vec<String>,
    pub guidelines: Vec<String>,
}

impl Default for SystemPolicy {
    fn default() -> Self {
        let traits = [
            ("warmth", 0.8),
            ("curiosity", 0.7),
            ("empathy", 0.9),
            ("humor", 0.5),
            ("formality", 0.3),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            personality: PersonalityProfile {
                name: "Paw".into(),
                traits,
                communication_style: "warm".into(),
            },
            capabilities: vec![
                "conversation".into(),
                "memory_recall".into(),
                "emotion_awareness".into(),
            ],
            guidelines: vec![
                "Be honest about uncertainty".into(),
                "Respect the user's stated preferences".into(),
            ],
        }
    }
}

/// System layer: static policy and capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemContext {
    pub personality: PersonalityProfile,
    pub capabilities: Vec<String>,
    pub guidelines: Vec<String>,
}

impl From<&SystemPolicy> for SystemContext {
    fn from(policy: &SystemPolicy) -> Self {
        Self {
            personality: policy.personality.clone(),
            capabilities: policy.capabilities.clone(),
            guidelines: policy.guidelines.clone(),
        }
    }
}

/// What the user has taught the agent so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub preferences: Vec<LearnedPreference>,
    pub relationship: RelationshipProgress,
}

/// A memory surfaced into the context, tagged with its tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryHighlight {
    pub tier: MemoryTier,
    pub summary: String,
    /// 0.0–1.0
    pub score: f32,
}

/// Summary of memory state as seen by the session layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemorySnapshot {
    pub short_term_count: usize,
    pub long_term_count: usize,
    pub preference_count: usize,
    pub highlights: Vec<MemoryHighlight>,
    /// 0.0–1.0
    pub relevance_score: f32,
}

/// Session layer: per-conversation state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    /// Number of messages retained in `immediate.recent_messages`.
    pub message_count: usize,
    /// Messages processed since the session started.
    pub total_messages: usize,
    pub user_profile: UserProfile,
    pub memory: MemorySnapshot,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    Greeting,
    Exploration,
    DeepDiscussion,
    Conclusion,
}

impl ConversationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationPhase::Greeting => "greeting",
            ConversationPhase::Exploration => "exploration",
            ConversationPhase::DeepDiscussion => "deep_discussion",
            ConversationPhase::Conclusion => "conclusion",
        }
    }
}

/// Flow state of the conversation. All scores are 0.0–1.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationFlow {
    pub phase: ConversationPhase,
    pub momentum: f32,
    pub depth: f32,
    pub engagement: f32,
    pub clarity: f32,
}

impl Default for ConversationFlow {
    fn default() -> Self {
        Self {
            phase: ConversationPhase::Greeting,
            momentum: 0.0,
            depth: 0.0,
            engagement: 0.5,
            clarity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    #[default]
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Bucket a local hour (0–23).
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

/// Snapshot of the client environment supplied by the environment probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentSnapshot {
    pub device: String,
    pub timezone: String,
    pub time_of_day: TimeOfDay,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            device: "unknown".into(),
            timezone: "UTC".into(),
            time_of_day: TimeOfDay::default(),
        }
    }
}

/// Metadata attached when a compressor replaced the message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressionMetadata {
    pub original_count: usize,
    pub retained_count: usize,
    pub compression_ratio: f32,
    pub emotional_tone: String,
}

/// Immediate layer: per-turn state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImmediateContext {
    pub recent_messages: Vec<Message>,
    pub emotional_state: EmotionAnalysis,
    pub active_topics: Vec<String>,
    pub conversation_flow: ConversationFlow,
    pub environment: EnvironmentSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionMetadata>,
}

/// The layered snapshot consumed before each reply is produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub system: SystemContext,
    pub session: SessionContext,
    pub immediate: ImmediateContext,
    pub timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 5: Events
// ═══════════════════════════════════════════════════════════════════════════

/// Every event type published on the context bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextEventType {
    ContextCreated,
    ContextUpdated,
    ContextCached,
    ContextRetrieved,
    ContextExpired,
    MemoryUpdated,
    PersonalityAdjusted,
    ErrorOccurred,
}

impl ContextEventType {
    pub const ALL: [ContextEventType; 8] = [
        ContextEventType::ContextCreated,
        ContextEventType::ContextUpdated,
        ContextEventType::ContextCached,
        ContextEventType::ContextRetrieved,
        ContextEventType::ContextExpired,
        ContextEventType::MemoryUpdated,
        ContextEventType::PersonalityAdjusted,
        ContextEventType::ErrorOccurred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextEventType::ContextCreated => "context_created",
            ContextEventType::ContextUpdated => "context_updated",
            ContextEventType::ContextCached => "context_cached",
            ContextEventType::ContextRetrieved => "context_retrieved",
            ContextEventType::ContextExpired => "context_expired",
            ContextEventType::MemoryUpdated => "memory_updated",
            ContextEventType::PersonalityAdjusted => "personality_adjusted",
            ContextEventType::ErrorOccurred => "error_occurred",
        }
    }
}

impl fmt::Display for ContextEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as delivered to listeners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextEvent {
    #[serde(rename = "type")]
    pub event_type: ContextEventType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl ContextEvent {
    pub fn new(
        event_type: ContextEventType,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            payload,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_polarity_sets() {
        assert!(Emotion::Happy.is_positive());
        assert!(Emotion::Curious.is_positive());
        assert!(Emotion::Confused.is_negative());
        assert!(!Emotion::Neutral.is_positive());
        assert!(!Emotion::Neutral.is_negative());
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&ContextEventType::MemoryUpdated).unwrap();
        assert_eq!(json, "\"memory_updated\"");
        assert_eq!(ContextEventType::ContextExpired.as_str(), "context_expired");
    }

    #[test]
    fn time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(7), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(13), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(19), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(2), TimeOfDay::Night);
    }

    #[test]
    fn default_policy_traits_in_range() {
        let policy = SystemPolicy::default();
        assert!(policy
            .personality
            .traits
            .values()
            .all(|v| (0.0..=1.0).contains(v)));
        let system = SystemContext::from(&policy);
        assert_eq!(system.capabilities, policy.capabilities);
    }
}
