//! Top-level error type and user-facing error messages
//!
//! Each layer has its own `thiserror` enum; [`JobScoutError`] aggregates them
//! for `main`, which prints [`JobScoutError::user_message`] and exits with
//! [`JobScoutError::exit_code`].

use crate::config::ConfigError;
use crate::consumer::ConsumerError;
use crate::criteria::InputError;
use crate::pipeline::runner::PipelineError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MAX_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret|bearer)([=:]\s*|\s+)[A-Za-z0-9._~+/=-]{8,}")
        .expect("secret pattern is valid")
});

static SECRET_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("secret path pattern is valid")
});

/// Main error type for a jobscout invocation
#[derive(Debug, Error)]
pub enum JobScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Consumer(#[from] ConsumerError),

    #[error("Setup error: {message}")]
    Setup { message: String },
}

impl JobScoutError {
    pub fn setup<S: Into<String>>(message: S) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Input(_) => 2,
            Self::Pipeline(PipelineError::Cancelled { .. }) => 130,
            Self::Pipeline(PipelineError::Rejected { .. }) => 3,
            _ => 1,
        }
    }

    /// Message safe to show on the terminal
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Redact secret-looking values and file paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SECRET_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(suffix);
    }

    sanitized
}

/// Result type for jobscout operations
pub type JobScoutResult<T> = Result<T, JobScoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::runner::CancelReason;
    use crate::pipeline::stage::StageKind;

    #[test]
    fn test_error_message_sanitization() {
        let sanitized = sanitize_error_message("Request failed: api_key=sk-abcdef1234567890");
        assert!(!sanitized.contains("sk-abcdef1234567890"));
        assert!(sanitized.contains("key=***"));
    }

    #[test]
    fn test_bearer_token_redacted() {
        let sanitized = sanitize_error_message("header Authorization: Bearer abcdefgh12345678 rejected");
        assert!(!sanitized.contains("abcdefgh12345678"));
    }

    #[test]
    fn test_short_values_are_kept() {
        // "key: 42" is not a credential
        assert_eq!(sanitize_error_message("missing key: 42"), "missing key: 42");
    }

    #[test]
    fn test_missing_secret_name_survives() {
        let err = JobScoutError::Config(ConfigError::MissingSecret("OPENAI_API_KEY".to_string()));
        assert!(err.user_message().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(1000));
        assert_eq!(sanitized.len(), MAX_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.len() <= MAX_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized = sanitize_error_message("cannot open /home/user/.aws/credentials");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("credentials"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            JobScoutError::Input(InputError::InvalidLeadCount("abc".to_string())).exit_code(),
            2
        );
        assert_eq!(
            JobScoutError::Pipeline(PipelineError::Cancelled {
                stage: StageKind::Discovery,
                reason: CancelReason::Interrupted,
            })
            .exit_code(),
            130
        );
        assert_eq!(
            JobScoutError::Pipeline(PipelineError::Rejected {
                stage: StageKind::Discovery,
                reason: "no".to_string(),
            })
            .exit_code(),
            3
        );
        assert_eq!(JobScoutError::setup("x").exit_code(), 1);
    }
}
