// ── Context Validator ──────────────────────────────────────────────────────
//
// Structural / type / range / consistency checks over the JSON form of a
// context, plus runtime-registered custom rules and a derived health check.
//
// Validation is a pure reporting function: nothing here mutates the context
// it inspects, and nothing is raised. A failing or panicking custom rule is
// downgraded to a low-severity `custom_rule` error.
//
// Scoring:
//   score = passed / attempted
//         − Σ per-error severity penalty (critical 0.30 … low 0.02)
//         − 0.02 per warning
//   clamped to [0, 1].

pub mod health;
pub mod rules;

pub use health::{HealthCategory, HealthCheck, HealthIssue, HealthStatus};
pub use rules::{RuleFindings, ValidationRule};

use crate::atoms::config::{RuleCategory, ValidationConfig};
use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::types::Context;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rules::Checker;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

// ═════════════════════════════════════════════════════════════════════════════
// Result types
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Missing,
    InvalidType,
    OutOfRange,
    Inconsistent,
    CustomRule,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Missing => "missing",
            ErrorType::InvalidType => "invalid_type",
            ErrorType::OutOfRange => "out_of_range",
            ErrorType::Inconsistent => "inconsistent",
            ErrorType::CustomRule => "custom_rule",
        }
    }
}

/// Ordered low → critical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn penalty(&self) -> f32 {
        match self {
            Severity::Critical => PENALTY_CRITICAL,
            Severity::High => PENALTY_HIGH,
            Severity::Medium => PENALTY_MEDIUM,
            Severity::Low => PENALTY_LOW,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningImpact {
    Performance,
    Quality,
    Usability,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub error_type: ErrorType,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub impact: WarningImpact,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// 0.0–1.0
    pub score: f32,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub checks_attempted: usize,
    pub checks_passed: usize,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improving,
    Declining,
    #[default]
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorTypeCount {
    pub error_type: ErrorType,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationStats {
    pub total_validations: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub average_score: f32,
    /// Top five, most frequent first.
    pub common_error_types: Vec<ErrorTypeCount>,
    pub performance_trend: PerformanceTrend,
    pub custom_rule_count: usize,
}

// ═════════════════════════════════════════════════════════════════════════════
// Validator
// ═════════════════════════════════════════════════════════════════════════════

pub struct ContextValidator {
    strict_mode: bool,
    enabled: HashSet<RuleCategory>,
    /// Registration order is evaluation order.
    custom_rules: Vec<(String, Arc<dyn ValidationRule>)>,
    score_history: VecDeque<f32>,
    total_validations: usize,
    valid_count: usize,
    score_sum: f64,
    error_counts: HashMap<ErrorType, usize>,
}

impl ContextValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            strict_mode: config.strict_mode,
            enabled: config.enabled_rule_set.iter().copied().collect(),
            custom_rules: Vec::new(),
            score_history: VecDeque::new(),
            total_validations: 0,
            valid_count: 0,
            score_sum: 0.0,
            error_counts: HashMap::new(),
        }
    }

    pub fn is_enabled(&self, category: RuleCategory) -> bool {
        self.enabled.contains(&category)
    }

    /// Register (or replace) a named custom rule.
    pub fn register_rule(&mut self, name: impl Into<String>, rule: impl ValidationRule + 'static) {
        let name = name.into();
        let rule: Arc<dyn ValidationRule> = Arc::new(rule);
        match self.custom_rules.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                debug!("[validation] Replacing custom rule '{}'", name);
                slot.1 = rule;
            }
            None => {
                debug!("[validation] Registered custom rule '{}'", name);
                self.custom_rules.push((name, rule));
            }
        }
    }

    /// Returns false if no rule had that name.
    pub fn unregister_rule(&mut self, name: &str) -> bool {
        let before = self.custom_rules.len();
        self.custom_rules.retain(|(n, _)| n != name);
        before != self.custom_rules.len()
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.custom_rules.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Validate a context through its JSON form.
    pub fn validate_context(&mut self, context: &Context) -> EngineResult<ValidationResult> {
        let value = serde_json::to_value(context)?;
        Ok(self.validate_value(&value))
    }

    /// Validate an arbitrary (possibly externally supplied) context document.
    pub fn validate_value(&mut self, value: &Value) -> ValidationResult {
        let mut checker = Checker::default();

        if self.is_enabled(RuleCategory::Structure) {
            rules::check_structure(value, &mut checker);
        }
        if self.is_enabled(RuleCategory::Types) {
            rules::check_types(value, &mut checker);
        }
        if self.is_enabled(RuleCategory::Ranges) {
            rules::check_ranges(value, &mut checker);
        }
        if self.is_enabled(RuleCategory::Consistency) {
            rules::check_consistency(value, &mut checker);
        }
        if self.is_enabled(RuleCategory::Custom) {
            for (name, rule) in &self.custom_rules {
                checker.absorb(run_custom_rule(name, rule.as_ref(), value));
            }
        }

        let result = self.score(checker);
        self.record(&result);
        result
    }

    fn score(&self, checker: Checker) -> ValidationResult {
        let ratio = if checker.attempted == 0 {
            1.0
        } else {
            checker.passed as f32 / checker.attempted as f32
        };
        let penalty: f32 = checker.errors.iter().map(|e| e.severity.penalty()).sum::<f32>()
            + PENALTY_PER_WARNING * checker.warnings.len() as f32;

        let invalidating = |s: Severity| {
            s >= Severity::High || (self.strict_mode && s == Severity::Medium)
        };
        let is_valid = !checker.errors.iter().any(|e| invalidating(e.severity));

        ValidationResult {
            is_valid,
            score: (ratio - penalty).clamp(0.0, 1.0),
            errors: checker.errors,
            warnings: checker.warnings,
            checks_attempted: checker.attempted,
            checks_passed: checker.passed,
            validated_at: Utc::now(),
        }
    }

    fn record(&mut self, result: &ValidationResult) {
        self.total_validations += 1;
        if result.is_valid {
            self.valid_count += 1;
        }
        self.score_sum += result.score as f64;
        for e in &result.errors {
            *self.error_counts.entry(e.error_type).or_insert(0) += 1;
        }
        self.score_history.push_back(result.score);
        while self.score_history.len() > VALIDATION_HISTORY_LIMIT {
            self.score_history.pop_front();
        }
    }

    pub fn validation_stats(&self) -> ValidationStats {
        let mut common: Vec<ErrorTypeCount> = self
            .error_counts
            .iter()
            .map(|(t, c)| ErrorTypeCount {
                error_type: *t,
                count: *c,
            })
            .collect();
        common.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.error_type.as_str().cmp(b.error_type.as_str()))
        });
        common.truncate(5);

        ValidationStats {
            total_validations: self.total_validations,
            valid_count: self.valid_count,
            invalid_count: self.total_validations - self.valid_count,
            average_score: if self.total_validations == 0 {
                0.0
            } else {
                (self.score_sum / self.total_validations as f64) as f32
            },
            common_error_types: common,
            performance_trend: score_trend(&self.score_history),
            custom_rule_count: self.custom_rules.len(),
        }
    }

    /// Forget history and totals; registered rules stay.
    pub fn reset_stats(&mut self) {
        self.score_history.clear();
        self.total_validations = 0;
        self.valid_count = 0;
        self.score_sum = 0.0;
        self.error_counts.clear();
    }
}

fn run_custom_rule(name: &str, rule: &dyn ValidationRule, value: &Value) -> RuleFindings {
    let failure = |message: String| {
        RuleFindings::error(ValidationError {
            field: name.to_string(),
            error_type: ErrorType::CustomRule,
            message,
            severity: Severity::Low,
        })
    };
    match catch_unwind(AssertUnwindSafe(|| rule.check(value))) {
        Ok(Ok(findings)) => findings.unwrap_or_default(),
        Ok(Err(message)) => {
            warn!("[validation] Custom rule '{}' failed: {}", name, message);
            failure(format!("Rule '{}' failed: {}", name, message))
        }
        Err(_) => {
            warn!("[validation] Custom rule '{}' panicked", name);
            failure(format!("Rule '{}' panicked", name))
        }
    }
}

/// Recent half vs. earlier half of the score history.
fn score_trend(history: &VecDeque<f32>) -> PerformanceTrend {
    if history.len() < 4 {
        return PerformanceTrend::Stable;
    }
    let mid = history.len() / 2;
    let earlier = history.iter().take(mid).sum::<f32>() / mid as f32;
    let recent = history.iter().skip(mid).sum::<f32>() / (history.len() - mid) as f32;
    let delta = recent - earlier;
    if delta > TREND_DELTA {
        PerformanceTrend::Improving
    } else if delta < -TREND_DELTA {
        PerformanceTrend::Declining
    } else {
        PerformanceTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::*;
    use serde_json::json;

    pub(crate) fn well_formed() -> Context {
        let started = Utc::now() - chrono::Duration::minutes(5);
        let messages = vec![Message::user("hello"), Message::assistant("hi there")];
        Context {
            system: SystemContext::from(&SystemPolicy::default()),
            session: SessionContext {
                session_id: "session-1".into(),
                started_at: started,
                message_count: messages.len(),
                total_messages: 2,
                user_profile: UserProfile::default(),
                memory: MemorySnapshot::default(),
            },
            immediate: ImmediateContext {
                recent_messages: messages,
                active_topics: vec!["music".into()],
                ..Default::default()
            },
            timestamp: Utc::now(),
        }
    }

    fn validator() -> ContextValidator {
        ContextValidator::new(&ValidationConfig::default())
    }

    #[test]
    fn test_well_formed_context_is_valid() {
        let result = validator().validate_context(&well_formed()).unwrap();
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
        assert!(result.score > 0.8);
    }

    #[test]
    fn test_missing_system_is_critical() {
        let mut v = serde_json::to_value(well_formed()).unwrap();
        v.as_object_mut().unwrap().remove("system");
        let result = validator().validate_value(&v);
        assert!(!result.is_valid);
        let err = result.errors.iter().find(|e| e.field == "system").unwrap();
        assert_eq!(err.severity, Severity::Critical);
        assert_eq!(err.error_type, ErrorType::Missing);
    }

    #[test]
    fn test_message_count_mismatch_is_inconsistent() {
        let mut ctx = well_formed();
        ctx.session.message_count = 7;
        ctx.session.total_messages = 7;
        let result = validator().validate_context(&ctx).unwrap();
        assert!(result
            .errors
            .iter()
            .any(|e| e.error_type == ErrorType::Inconsistent && e.field == "session.message_count"));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_strict_mode_invalidates_medium() {
        let mut v = serde_json::to_value(well_formed()).unwrap();
        v["immediate"]["emotional_state"]["intensity"] = json!(2.0);

        let lenient = validator().validate_value(&v);
        assert!(lenient.is_valid);
        assert_eq!(lenient.errors.len(), 1);

        let mut strict = ContextValidator::new(&ValidationConfig {
            strict_mode: true,
            ..Default::default()
        });
        assert!(!strict.validate_value(&v).is_valid);
    }

    #[test]
    fn test_nan_score_is_reported() {
        let mut ctx = well_formed();
        ctx.immediate.emotional_state.intensity = f32::NAN;
        let result = validator().validate_context(&ctx).unwrap();
        let err = result
            .errors
            .iter()
            .find(|e| e.field == "immediate.emotional_state.intensity")
            .unwrap();
        assert_eq!(err.error_type, ErrorType::InvalidType);
        assert_eq!(err.severity, Severity::Medium);
        // medium severity only invalidates in strict mode
        assert!(result.is_valid);
    }

    #[test]
    fn test_score_penalties() {
        let mut v = serde_json::to_value(well_formed()).unwrap();
        v["system"]["personality"]["traits"]["warmth"] = json!(3.0);
        let result = validator().validate_value(&v);
        let ratio = result.checks_passed as f32 / result.checks_attempted as f32;
        let expected = ratio - PENALTY_MEDIUM - PENALTY_PER_WARNING * result.warnings.len() as f32;
        assert!((result.score - expected.clamp(0.0, 1.0)).abs() < 1e-5);
    }

    #[test]
    fn test_disabled_category_is_skipped() {
        let mut validator = ContextValidator::new(&ValidationConfig {
            strict_mode: false,
            enabled_rule_set: vec![RuleCategory::Types],
        });
        let mut v = serde_json::to_value(well_formed()).unwrap();
        v.as_object_mut().unwrap().remove("system");
        assert!(validator.validate_value(&v).is_valid);
    }

    #[test]
    fn test_custom_rules_register_and_isolate_failures() {
        let mut validator = validator();
        validator.register_rule("needs_topics", |v: &Value| -> Result<Option<RuleFindings>, String> {
            let empty = v["immediate"]["active_topics"]
                .as_array()
                .map_or(true, |a| a.is_empty());
            Ok(empty.then(|| {
                RuleFindings::warning(ValidationWarning {
                    field: "immediate.active_topics".into(),
                    message: "no topics".into(),
                    impact: WarningImpact::Usability,
                    suggestion: "talk more".into(),
                })
            }))
        });
        validator.register_rule("broken", |_: &Value| -> Result<Option<RuleFindings>, String> {
            Err("boom".to_string())
        });
        validator.register_rule("panicky", |_: &Value| -> Result<Option<RuleFindings>, String> {
            panic!("rule exploded")
        });

        let mut ctx = well_formed();
        ctx.immediate.active_topics.clear();
        let result = validator.validate_context(&ctx).unwrap();

        let custom: Vec<&ValidationError> = result
            .errors
            .iter()
            .filter(|e| e.error_type == ErrorType::CustomRule)
            .collect();
        assert_eq!(custom.len(), 2);
        assert!(custom.iter().all(|e| e.severity == Severity::Low));
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.message == "no topics"));

        assert!(validator.unregister_rule("broken"));
        assert!(!validator.unregister_rule("broken"));
        assert_eq!(validator.rule_names(), vec!["needs_topics", "panicky"]);
    }

    #[test]
    fn test_stats_and_trend() {
        let mut validator = validator();
        let good = serde_json::to_value(well_formed()).unwrap();
        let mut bad = good.clone();
        bad.as_object_mut().unwrap().remove("session");

        for _ in 0..3 {
            validator.validate_value(&bad);
        }
        for _ in 0..3 {
            validator.validate_value(&good);
        }
        let stats = validator.validation_stats();
        assert_eq!(stats.total_validations, 6);
        assert_eq!(stats.valid_count, 3);
        assert_eq!(stats.invalid_count, 3);
        assert_eq!(stats.performance_trend, PerformanceTrend::Improving);
        assert_eq!(stats.common_error_types[0].error_type, ErrorType::Missing);
        assert_eq!(stats.common_error_types[0].count, 3);
    }

    #[test]
    fn test_trend_needs_four_points() {
        let history: VecDeque<f32> = vec![0.1, 0.9, 0.9].into();
        assert_eq!(score_trend(&history), PerformanceTrend::Stable);
        let history: VecDeque<f32> = vec![0.9, 0.9, 0.5, 0.5].into();
        assert_eq!(score_trend(&history), PerformanceTrend::Declining);
        let history: VecDeque<f32> = vec![0.8, 0.8, 0.82, 0.82].into();
        assert_eq!(score_trend(&history), PerformanceTrend::Stable);
    }
}
