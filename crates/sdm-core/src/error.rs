//! Error taxonomy for goal decision and prediction.

/// Errors produced while deciding goals for a push.
#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    /// A push context field was read but is not available.
    ///
    /// This is the only error kind the goal predictor treats as recoverable.
    #[error("insufficient data: {field} is not available")]
    InsufficientData { field: String },

    #[error("push test '{name}' failed: {reason}")]
    Predicate { name: String, reason: String },

    #[error("project error: {0}")]
    Project(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GoalError {
    /// Shorthand for [`GoalError::InsufficientData`].
    pub fn insufficient(field: impl Into<String>) -> Self {
        GoalError::InsufficientData {
            field: field.into(),
        }
    }

    /// Whether this error means "the push did not carry enough data".
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, GoalError::InsufficientData { .. })
    }
}

/// Result type for goal decision operations.
pub type GoalResult<T> = std::result::Result<T, GoalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_is_identifiable() {
        let err = GoalError::insufficient("push");
        assert!(err.is_insufficient_data());
        assert!(err.to_string().contains("push is not available"));
    }

    #[test]
    fn test_other_errors_are_not_insufficient_data() {
        let err = GoalError::Predicate {
            name: "hasFile(pom.xml)".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(!err.is_insufficient_data());
        assert!(err.to_string().contains("hasFile(pom.xml)"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_project_error_display() {
        let err = GoalError::Project("clone failed".to_string());
        assert!(err.to_string().contains("project error"));
    }
}
