// ── Validation: Built-in Rules ─────────────────────────────────────────────
//
// Every built-in rule walks the JSON form of a context through a `Checker`,
// which counts attempted/passed checks and collects findings. Field tables
// carry the severity of each failure, so importance lives next to the path.
//
// Sub-fields of a layer are only examined when the layer itself is present;
// a missing layer is one structural error, not a cascade.

use super::{ErrorType, Severity, ValidationError, ValidationWarning, WarningImpact};
use crate::atoms::constants::{LOW_EMOTION_CONFIDENCE, OVERSIZED_HISTORY};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ═════════════════════════════════════════════════════════════════════════════
// Custom rule interface
// ═════════════════════════════════════════════════════════════════════════════

/// Findings a rule reports. An empty set counts as a pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleFindings {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl RuleFindings {
    pub fn error(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn warning(warning: ValidationWarning) -> Self {
        Self {
            errors: Vec::new(),
            warnings: vec![warning],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// A runtime-registered check over the JSON form of a context.
///
/// `Ok(None)` means the rule has nothing to say. `Err` is reported as a
/// low-severity `custom_rule` error and never aborts validation.
pub trait ValidationRule: Send + Sync {
    fn check(&self, context: &Value) -> Result<Option<RuleFindings>, String>;
}

impl<F> ValidationRule for F
where
    F: Fn(&Value) -> Result<Option<RuleFindings>, String> + Send + Sync,
{
    fn check(&self, context: &Value) -> Result<Option<RuleFindings>, String> {
        self(context)
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Checker
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JsonKind {
    Object,
    Array,
    String,
    /// Non-negative integer.
    Count,
    /// RFC 3339 string.
    Timestamp,
}

impl JsonKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonKind::Object => value.is_object(),
            JsonKind::Array => value.is_array(),
            JsonKind::String => value.is_string(),
            JsonKind::Count => value.as_u64().is_some(),
            JsonKind::Timestamp => value.as_str().and_then(parse_timestamp).is_some(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            JsonKind::Object => "an object",
            JsonKind::Array => "an array",
            JsonKind::String => "a string",
            JsonKind::Count => "a non-negative integer",
            JsonKind::Timestamp => "an RFC 3339 timestamp",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Checker {
    pub attempted: usize,
    pub passed: usize,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl Checker {
    pub fn record(&mut self, ok: bool, error: impl FnOnce() -> ValidationError) {
        self.attempted += 1;
        if ok {
            self.passed += 1;
        } else {
            self.errors.push(error());
        }
    }

    pub fn warn(&mut self, field: &str, message: String, impact: WarningImpact, suggestion: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            impact,
            suggestion: suggestion.to_string(),
        });
    }

    /// Merge a custom rule's outcome (one attempted check).
    pub fn absorb(&mut self, findings: RuleFindings) {
        self.attempted += 1;
        if findings.errors.is_empty() {
            self.passed += 1;
        }
        self.errors.extend(findings.errors);
        self.warnings.extend(findings.warnings);
    }

    fn presence(&mut self, root: &Value, path: &str, severity: Severity) {
        let present = lookup(root, path).is_some();
        self.record(present, || ValidationError {
            field: path.to_string(),
            error_type: ErrorType::Missing,
            message: format!("Required field '{}' is missing", path),
            severity,
        });
    }

    fn kind(&mut self, value: &Value, path: &str, kind: JsonKind, severity: Severity) {
        self.record(kind.matches(value), || ValidationError {
            field: path.to_string(),
            error_type: ErrorType::InvalidType,
            message: format!("Field '{}' must be {}", path, kind.describe()),
            severity,
        });
    }

    fn unit_range(&mut self, value: &Value, path: &str, severity: Severity) {
        match value.as_f64() {
            Some(n) => self.record((0.0..=1.0).contains(&n), || ValidationError {
                field: path.to_string(),
                error_type: ErrorType::OutOfRange,
                message: format!("Field '{}' = {} is outside [0, 1]", path, n),
                severity,
            }),
            None => self.kind_number(path, severity),
        }
    }

    fn kind_number(&mut self, path: &str, severity: Severity) {
        self.record(false, || ValidationError {
            field: path.to_string(),
            error_type: ErrorType::InvalidType,
            message: format!("Field '{}' must be a number", path),
            severity,
        });
    }
}

/// Dotted-path lookup. JSON `null` counts as absent.
pub(crate) fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |v, key| v.get(key))
        .filter(|v| !v.is_null())
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Whether the layer (first path segment) of `path` exists.
fn layer_present(root: &Value, path: &str) -> bool {
    match path.split_once('.') {
        Some((layer, _)) => lookup(root, layer).is_some(),
        None => true,
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Field tables
// ═════════════════════════════════════════════════════════════════════════════

const REQUIRED_FIELDS: &[(&str, Severity)] = &[
    ("system", Severity::Critical),
    ("session", Severity::Critical),
    ("immediate", Severity::Critical),
    ("timestamp", Severity::High),
    ("system.personality", Severity::High),
    ("system.capabilities", Severity::Medium),
    ("system.guidelines", Severity::Low),
    ("session.session_id", Severity::High),
    ("session.started_at", Severity::Medium),
    ("session.message_count", Severity::Medium),
    ("session.total_messages", Severity::Low),
    ("session.user_profile", Severity::Low),
    ("session.memory", Severity::Low),
    ("immediate.recent_messages", Severity::High),
    ("immediate.emotional_state", Severity::Medium),
    ("immediate.active_topics", Severity::Low),
    ("immediate.conversation_flow", Severity::Medium),
    ("immediate.environment", Severity::Low),
];

const TYPED_FIELDS: &[(&str, JsonKind, Severity)] = &[
    ("timestamp", JsonKind::Timestamp, Severity::Medium),
    ("system.personality", JsonKind::Object, Severity::High),
    ("system.personality.name", JsonKind::String, Severity::Low),
    ("system.personality.traits", JsonKind::Object, Severity::Medium),
    ("system.capabilities", JsonKind::Array, Severity::Medium),
    ("system.guidelines", JsonKind::Array, Severity::Low),
    ("session.session_id", JsonKind::String, Severity::High),
    ("session.started_at", JsonKind::Timestamp, Severity::Medium),
    ("session.message_count", JsonKind::Count, Severity::Medium),
    ("session.total_messages", JsonKind::Count, Severity::Low),
    ("session.user_profile", JsonKind::Object, Severity::Low),
    ("session.memory", JsonKind::Object, Severity::Low),
    ("immediate.recent_messages", JsonKind::Array, Severity::High),
    ("immediate.emotional_state", JsonKind::Object, Severity::Medium),
    ("immediate.emotional_state.primary", JsonKind::String, Severity::Low),
    ("immediate.active_topics", JsonKind::Array, Severity::Low),
    ("immediate.conversation_flow", JsonKind::Object, Severity::Medium),
    ("immediate.environment", JsonKind::Object, Severity::Low),
];

const MESSAGE_FIELDS: &[(&str, JsonKind)] = &[
    ("id", JsonKind::String),
    ("content", JsonKind::String),
    ("sender", JsonKind::String),
    ("timestamp", JsonKind::Timestamp),
];

const SCORE_FIELDS: &[(&str, Severity)] = &[
    ("immediate.emotional_state.intensity", Severity::Medium),
    ("immediate.emotional_state.confidence", Severity::Medium),
    ("immediate.conversation_flow.momentum", Severity::Low),
    ("immediate.conversation_flow.depth", Severity::Low),
    ("immediate.conversation_flow.engagement", Severity::Low),
    ("immediate.conversation_flow.clarity", Severity::Low),
    ("session.memory.relevance_score", Severity::Low),
    ("session.user_profile.relationship.trust_level", Severity::Low),
    ("session.user_profile.relationship.intimacy_level", Severity::Low),
];

// ═════════════════════════════════════════════════════════════════════════════
// Rules
// ═════════════════════════════════════════════════════════════════════════════

pub(crate) fn check_structure(root: &Value, checker: &mut Checker) {
    for &(path, severity) in REQUIRED_FIELDS {
        if layer_present(root, path) {
            checker.presence(root, path, severity);
        }
    }
}

pub(crate) fn check_types(root: &Value, checker: &mut Checker) {
    for &(path, kind, severity) in TYPED_FIELDS {
        if let Some(value) = lookup(root, path) {
            checker.kind(value, path, kind, severity);
        }
    }

    let Some(messages) = lookup(root, "immediate.recent_messages").and_then(Value::as_array) else {
        return;
    };
    for (i, message) in messages.iter().enumerate() {
        let base = format!("immediate.recent_messages[{}]", i);
        if !message.is_object() {
            checker.kind(message, &base, JsonKind::Object, Severity::Medium);
            continue;
        }
        for &(key, kind) in MESSAGE_FIELDS {
            let path = format!("{}.{}", base, key);
            match message.get(key).filter(|v| !v.is_null()) {
                Some(value) => checker.kind(value, &path, kind, Severity::Medium),
                None => checker.record(false, || ValidationError {
                    message: format!("Required field '{}' is missing", path),
                    field: path.clone(),
                    error_type: ErrorType::Missing,
                    severity: Severity::Medium,
                }),
            }
        }
    }
}

pub(crate) fn check_ranges(root: &Value, checker: &mut Checker) {
    // an explicit null (NaN serializes as null) is a bad score, not a missing one
    for &(path, severity) in SCORE_FIELDS {
        if let Some(value) = path.split('.').try_fold(root, |v, key| v.get(key)) {
            checker.unit_range(value, path, severity);
        }
    }

    if let Some(traits) = lookup(root, "system.personality.traits").and_then(Value::as_object) {
        for (name, value) in traits {
            let path = format!("system.personality.traits.{}", name);
            checker.unit_range(value, &path, Severity::Medium);
        }
    }

    if let Some(prefs) = lookup(root, "session.user_profile.preferences").and_then(Value::as_array)
    {
        for (i, pref) in prefs.iter().enumerate() {
            if let Some(value) = pref.get("confidence") {
                let path = format!("session.user_profile.preferences[{}].confidence", i);
                checker.unit_range(value, &path, Severity::Low);
            }
        }
    }
}

pub(crate) fn check_consistency(root: &Value, checker: &mut Checker) {
    let timestamp = lookup(root, "timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    let started = lookup(root, "session.started_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    if let (Some(ts), Some(start)) = (timestamp, started) {
        checker.record(ts >= start, || ValidationError {
            field: "timestamp".into(),
            error_type: ErrorType::Inconsistent,
            message: format!("Context timestamp {} precedes session start {}", ts, start),
            severity: Severity::Medium,
        });
    }

    let recorded = lookup(root, "session.message_count").and_then(Value::as_u64);
    let messages = lookup(root, "immediate.recent_messages").and_then(Value::as_array);
    if let (Some(recorded), Some(messages)) = (recorded, messages) {
        let actual = messages.len() as u64;
        checker.record(recorded == actual, || ValidationError {
            field: "session.message_count".into(),
            error_type: ErrorType::Inconsistent,
            message: format!(
                "session.message_count is {} but {} recent messages are retained",
                recorded, actual
            ),
            severity: Severity::High,
        });
    }

    let total = lookup(root, "session.total_messages").and_then(Value::as_u64);
    if let (Some(total), Some(recorded)) = (total, recorded) {
        checker.record(total >= recorded, || ValidationError {
            field: "session.total_messages".into(),
            error_type: ErrorType::Inconsistent,
            message: format!(
                "session.total_messages ({}) is below the retained count ({})",
                total, recorded
            ),
            severity: Severity::Low,
        });
    }

    // ── Quality warnings ──────────────────────────────────────────────
    if let Some(messages) = messages {
        if messages.len() > OVERSIZED_HISTORY {
            checker.warn(
                "immediate.recent_messages",
                format!("{} recent messages retained", messages.len()),
                WarningImpact::Performance,
                "Compress the context or lower the short-term capacity",
            );
        }
    }
    if let Some(confidence) =
        lookup(root, "immediate.emotional_state.confidence").and_then(Value::as_f64)
    {
        if confidence < LOW_EMOTION_CONFIDENCE as f64 {
            checker.warn(
                "immediate.emotional_state.confidence",
                format!("Emotional confidence is low ({:.2})", confidence),
                WarningImpact::Quality,
                "Treat the detected emotion as a weak signal",
            );
        }
    }
    if let Some(traits) = lookup(root, "system.personality.traits").and_then(Value::as_object) {
        if traits.is_empty() {
            checker.warn(
                "system.personality.traits",
                "Personality has no traits".into(),
                WarningImpact::Quality,
                "Define at least one personality trait",
            );
        }
    }
    if let Some(caps) = lookup(root, "system.capabilities").and_then(Value::as_array) {
        if caps.is_empty() {
            checker.warn(
                "system.capabilities",
                "No capabilities declared".into(),
                WarningImpact::Usability,
                "Declare the capabilities the agent may use",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_treats_null_as_missing() {
        let v = json!({"a": {"b": null, "c": 1}});
        assert!(lookup(&v, "a.b").is_none());
        assert_eq!(lookup(&v, "a.c"), Some(&json!(1)));
        assert!(lookup(&v, "a.x.y").is_none());
    }

    #[test]
    fn test_missing_layer_does_not_cascade() {
        let v = json!({"timestamp": "2024-01-01T00:00:00Z"});
        let mut c = Checker::default();
        check_structure(&v, &mut c);
        let fields: Vec<&str> = c.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["system", "session", "immediate"]);
        assert_eq!(c.attempted, 4);
        assert_eq!(c.passed, 1);
    }

    #[test]
    fn test_trait_out_of_range() {
        let v = json!({"system": {"personality": {"traits": {"warmth": 1.4, "humor": 0.2}}}});
        let mut c = Checker::default();
        check_ranges(&v, &mut c);
        assert_eq!(c.errors.len(), 1);
        assert_eq!(c.errors[0].field, "system.personality.traits.warmth");
        assert_eq!(c.errors[0].error_type, ErrorType::OutOfRange);
    }

    #[test]
    fn test_non_numeric_score_is_type_error() {
        let v = json!({"immediate": {"emotional_state": {"intensity": "high"}}});
        let mut c = Checker::default();
        check_ranges(&v, &mut c);
        assert_eq!(c.errors[0].error_type, ErrorType::InvalidType);
    }

    #[test]
    fn test_null_score_is_type_error() {
        let v = json!({"immediate": {"conversation_flow": {"depth": null, "clarity": 0.5}}});
        let mut c = Checker::default();
        check_ranges(&v, &mut c);
        assert_eq!(c.errors.len(), 1);
        assert_eq!(c.errors[0].field, "immediate.conversation_flow.depth");
        assert_eq!(c.errors[0].error_type, ErrorType::InvalidType);
        assert_eq!(c.errors[0].severity, Severity::Low);
        assert_eq!(c.attempted, 2);
    }

    #[test]
    fn test_message_shape_checked() {
        let v = json!({"immediate": {"recent_messages": [
            {"id": "1", "content": 5, "sender": "user", "timestamp": "2024-01-01T00:00:00Z"},
            "oops"
        ]}});
        let mut c = Checker::default();
        check_types(&v, &mut c);
        let fields: Vec<&str> = c.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["immediate.recent_messages[0].content", "immediate.recent_messages[1]"]
        );

        let v = json!({"immediate": {"recent_messages": [{"id": "1", "sender": "user"}]}});
        let mut c = Checker::default();
        check_types(&v, &mut c);
        assert_eq!(c.errors.len(), 2);
        assert_eq!(c.errors[0].field, "immediate.recent_messages[0].content");
        assert_eq!(c.errors[0].error_type, ErrorType::Missing);
    }

    #[test]
    fn test_timestamp_before_start_is_inconsistent() {
        let v = json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "session": {"started_at": "2024-06-01T00:00:00Z"}
        });
        let mut c = Checker::default();
        check_consistency(&v, &mut c);
        assert_eq!(c.errors.len(), 1);
        assert_eq!(c.errors[0].field, "timestamp");
        assert_eq!(c.errors[0].error_type, ErrorType::Inconsistent);
    }

    #[test]
    fn test_closure_is_a_rule() {
        let rule = |v: &Value| -> Result<Option<RuleFindings>, String> {
            if v.get("x").is_some() {
                Ok(None)
            } else {
                Err("no x".into())
            }
        };
        assert_eq!(rule.check(&json!({"x": 1})), Ok(None));
        assert!(rule.check(&json!({})).is_err());
    }
}
