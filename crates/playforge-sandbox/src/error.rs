//! Error types for the sandbox layer.

/// Infrastructure-level failures of a checker run.
///
/// A checker that runs to completion and reports problems is *not* an error;
/// it is a [`CheckerOutcome`](crate::CheckerOutcome) with a nonzero exit code.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("sandbox busy: no execution slot freed within {waited_ms}ms")]
    Busy { waited_ms: u64 },

    #[error("{checker} timed out after {timeout_secs}s")]
    Timeout { checker: String, timeout_secs: u64 },

    #[error("invalid checker invocation: {0}")]
    InvalidInvocation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Whether a fresh start attempt may succeed (runtime hiccup, not a bad request).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SandboxError::Unavailable { .. })
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retryable() {
        let err = SandboxError::Unavailable {
            reason: "Cannot connect to the Docker daemon".into(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("sandbox unavailable"));
    }

    #[test]
    fn test_other_errors_not_retryable() {
        assert!(!SandboxError::Busy { waited_ms: 10 }.is_retryable());
        assert!(!SandboxError::InvalidInvocation("empty".into()).is_retryable());
        let timeout = SandboxError::Timeout {
            checker: "ansible-lint".into(),
            timeout_secs: 30,
        };
        assert!(!timeout.is_retryable());
        assert_eq!(timeout.to_string(), "ansible-lint timed out after 30s");
    }
}
