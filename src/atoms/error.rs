// ── Context Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the context engine, built with `thiserror`.
//
// Design rules:
//   • Validation findings (missing fields, out-of-range scores, inconsistent
//     counts) are REPORTED through `ValidationResult`, never raised here.
//   • Variants cover operational failures only: serialization, configuration,
//     collaborator calls, lifecycle misuse, and context construction.
//   • The manager is the only layer allowed to swallow an `EngineError`; it
//     replaces the failed build with a fallback context.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external collaborator (compressor, feedback collector) failed or is absent.
    #[error("Collaborator error: {collaborator}: {message}")]
    Collaborator {
        collaborator: String,
        message: String,
    },

    /// Operation is not allowed in the current lifecycle state.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// A context construction step could not complete.
    #[error("Context build error: {step}: {message}")]
    Context { step: String, message: String },

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a collaborator error with name and message.
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Create a context-build error for a named step.
    pub fn context(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Context {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All fallible engine operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_error_formats_name_and_message() {
        let err = EngineError::collaborator("compressor", "not configured");
        assert_eq!(
            err.to_string(),
            "Collaborator error: compressor: not configured"
        );
    }

    #[test]
    fn string_bridge_maps_to_other() {
        let err: EngineError = "boom".into();
        assert!(matches!(err, EngineError::Other(ref m) if m == "boom"));
        let s: String = err.into();
        assert_eq!(s, "boom");
    }
}
