//! Error types for the profile matching engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error taxonomy.
///
/// `NotFound` is deliberately a unit variant: it is the branchable "no match /
/// entity absent" signal and is left unwrapped at every boundary so callers can
/// distinguish it from a system failure. Everything else carries a message and
/// is wrapped with context as it crosses the matching boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Entity (filter, profile, index key) is absent. Never fatal in
    /// aggregate reads, where it means "empty".
    #[error("not found")]
    NotFound,

    /// Malformed inline literal, missing mandatory element/values, or an
    /// unsupported rule type.
    #[error("validation error: {0}")]
    Validation(String),

    /// A path expression could not be parsed against any value source, or a
    /// remote domain collaborator failed to produce one.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Forward and reverse index disagree for a profile.
    #[error("index consistency error: {0}")]
    Consistency(String),

    /// Persistence, cache or remote collaborator failure, including call
    /// deadline expiry.
    #[error("backend error: {0}")]
    Backend(String),

    /// Named lock could not be acquired within the bounded wait.
    #[error("lock timeout on: {0}")]
    LockTimeout(String),
}

impl EngineError {
    /// True for the branchable "entity absent" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound)
    }

    /// Wrap any non-NotFound error with additional context. NotFound passes
    /// through untouched so callers can still branch on it.
    pub fn contextualize(self, context: &str) -> Self {
        match self {
            EngineError::NotFound => EngineError::NotFound,
            other => EngineError::Backend(format!("{context}: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_branching() {
        assert!(EngineError::NotFound.is_not_found());
        assert!(!EngineError::Validation("x".to_string()).is_not_found());
    }

    #[test]
    fn test_display() {
        assert_eq!(EngineError::NotFound.to_string(), "not found");
        assert_eq!(
            EngineError::Validation("Values is mandatory for type: *string".to_string())
                .to_string(),
            "validation error: Values is mandatory for type: *string"
        );
        assert_eq!(
            EngineError::LockTimeout("thresholds:cgrates.org:TH1".to_string()).to_string(),
            "lock timeout on: thresholds:cgrates.org:TH1"
        );
    }

    #[test]
    fn test_contextualize_preserves_not_found() {
        let err = EngineError::NotFound.contextualize("matching thresholds");
        assert_eq!(err, EngineError::NotFound);

        let err = EngineError::Resolution("unknown domain".to_string())
            .contextualize("matching thresholds");
        match err {
            EngineError::Backend(msg) => {
                assert!(msg.contains("matching thresholds"));
                assert!(msg.contains("unknown domain"));
            }
            other => panic!("expected Backend, got {other:?}"),
        }
    }
}
