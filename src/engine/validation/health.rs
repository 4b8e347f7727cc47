// ── Validation: Health Check ───────────────────────────────────────────────
//
// A derived, non-blocking quality report. Re-validates the context, maps each
// error and warning onto a health category, adds soft issues that are never
// hard errors, and rolls everything into one verdict:
//
//   critical  ← invalid context, or any critical issue
//   warning   ← any high or medium issue
//   healthy   ← otherwise
//
// The security scan reuses the credential/PII pattern style of the memory
// encryption layer: a compiled-once table, first match per pattern.

use super::rules::lookup;
use super::{ContextValidator, ErrorType, Severity, ValidationResult, WarningImpact};
use crate::atoms::constants::OVERSIZED_HISTORY;
use crate::atoms::error::EngineResult;
use crate::atoms::types::Context;
use chrono::{DateTime, Utc};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    DataQuality,
    Performance,
    Consistency,
    Security,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthIssue {
    pub category: HealthCategory,
    pub severity: Severity,
    pub field: String,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    pub status: HealthStatus,
    /// Validation score of the underlying re-validation.
    pub score: f32,
    pub issues: Vec<HealthIssue>,
    /// Deduplicated, most severe first.
    pub recommendations: Vec<String>,
    pub validation: ValidationResult,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn issues_in(&self, category: HealthCategory) -> impl Iterator<Item = &HealthIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Sensitive content patterns (compiled once)
// ═════════════════════════════════════════════════════════════════════════════

struct SensitivePattern {
    regex: Regex,
    label: &'static str,
}

static SENSITIVE_PATTERNS: LazyLock<Vec<SensitivePattern>> = LazyLock::new(|| {
    let patterns: Vec<(&str, &'static str)> = vec![
        // password/secret/token/api key followed by a value
        (r"(?i)(password|passwd|secret|token|api.?key)\s*(is|=|:)\s*\S+", "credential"),
        // Credit card (4 groups of 4 digits)
        (r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b", "card number"),
        // SSN (US format: 123-45-6789)
        (r"\b\d{3}-\d{2}-\d{4}\b", "national id"),
        // Private key material
        (r"-----BEGIN [A-Z ]*PRIVATE KEY-----", "private key"),
    ];

    patterns
        .into_iter()
        .filter_map(|(pattern, label)| match Regex::new(pattern) {
            Ok(regex) => Some(SensitivePattern { regex, label }),
            Err(e) => {
                warn!("[validation::health] Failed to compile pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Labels of every sensitive pattern present in `content`.
fn sensitive_labels(content: &str) -> Vec<&'static str> {
    SENSITIVE_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(content))
        .map(|p| p.label)
        .collect()
}

// ═════════════════════════════════════════════════════════════════════════════
// Health check
// ═════════════════════════════════════════════════════════════════════════════

impl ContextValidator {
    pub fn perform_health_check(&mut self, context: &Context) -> EngineResult<HealthCheck> {
        let value = serde_json::to_value(context)?;
        Ok(self.perform_health_check_value(&value))
    }

    pub fn perform_health_check_value(&mut self, value: &Value) -> HealthCheck {
        let validation = self.validate_value(value);
        let mut issues: Vec<HealthIssue> = Vec::new();

        for e in &validation.errors {
            issues.push(HealthIssue {
                category: match e.error_type {
                    ErrorType::Inconsistent => HealthCategory::Consistency,
                    _ => HealthCategory::DataQuality,
                },
                severity: e.severity,
                field: e.field.clone(),
                description: e.message.clone(),
                recommendation: error_recommendation(e.error_type, &e.field),
            });
        }
        for w in &validation.warnings {
            issues.push(HealthIssue {
                category: match w.impact {
                    WarningImpact::Performance => HealthCategory::Performance,
                    WarningImpact::Quality | WarningImpact::Usability => {
                        HealthCategory::DataQuality
                    }
                },
                severity: Severity::Low,
                field: w.field.clone(),
                description: w.message.clone(),
                recommendation: w.suggestion.clone(),
            });
        }
        soft_issues(value, &mut issues);

        let status = if !validation.is_valid
            || issues.iter().any(|i| i.severity == Severity::Critical)
        {
            HealthStatus::Critical
        } else if issues.iter().any(|i| i.severity >= Severity::Medium) {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        let mut recommendations: Vec<String> = Vec::new();
        for issue in &issues {
            if !recommendations.contains(&issue.recommendation) {
                recommendations.push(issue.recommendation.clone());
            }
        }

        info!(
            "[validation::health] status={:?} issues={} score={:.2}",
            status,
            issues.len(),
            validation.score
        );

        HealthCheck {
            status,
            score: validation.score,
            issues,
            recommendations,
            validation,
            checked_at: Utc::now(),
        }
    }
}

fn soft_issues(value: &Value, issues: &mut Vec<HealthIssue>) {
    let messages = lookup(value, "immediate.recent_messages").and_then(Value::as_array);

    if let Some(messages) = messages {
        if messages.is_empty() {
            issues.push(HealthIssue {
                category: HealthCategory::DataQuality,
                severity: Severity::Low,
                field: "immediate.recent_messages".into(),
                description: "No recent messages in context".into(),
                recommendation: "Process at least one message before building a reply".into(),
            });
        }
        if messages.len() > OVERSIZED_HISTORY {
            issues.push(HealthIssue {
                category: HealthCategory::Performance,
                severity: Severity::Medium,
                field: "immediate.recent_messages".into(),
                description: format!("Message history is oversized ({} messages)", messages.len()),
                recommendation: "Compress the conversation history".into(),
            });
        }

        for (i, message) in messages.iter().enumerate() {
            let Some(content) = message.get("content").and_then(Value::as_str) else {
                continue;
            };
            let labels = sensitive_labels(content);
            if !labels.is_empty() {
                issues.push(HealthIssue {
                    category: HealthCategory::Security,
                    severity: Severity::High,
                    field: format!("immediate.recent_messages[{}].content", i),
                    description: format!("Message appears to contain: {}", labels.join(", ")),
                    recommendation: "Redact sensitive values before they reach the context".into(),
                });
            }
        }
    }

    let topics = lookup(value, "immediate.active_topics").and_then(Value::as_array);
    if topics.map_or(false, |t| t.is_empty()) {
        issues.push(HealthIssue {
            category: HealthCategory::DataQuality,
            severity: Severity::Low,
            field: "immediate.active_topics".into(),
            description: "No active topics detected".into(),
            recommendation: "Let the conversation establish a topic before relying on recall".into(),
        });
    }
}

fn error_recommendation(error_type: ErrorType, field: &str) -> String {
    match error_type {
        ErrorType::Missing => format!("Populate '{}' when building the context", field),
        ErrorType::InvalidType => format!("Fix the type of '{}'", field),
        ErrorType::OutOfRange => format!("Clamp '{}' into [0, 1]", field),
        ErrorType::Inconsistent => format!("Rebuild the context so '{}' agrees with its source", field),
        ErrorType::CustomRule => format!("Review custom rule '{}'", field),
    }
}
