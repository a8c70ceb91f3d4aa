//! Error types and constructors.
//!
//! Two layers live here:
//!
//! - [`AppError`] / [`AppResult`] from `masterror` for configuration, I/O and
//!   command-line failures, built through the small constructor helpers below.
//! - [`QueryError`] for the request pipeline. Every failure of a "convert and
//!   run" request lands in exactly one [`ErrorCategory`], which is what the
//!   caller gets to see.

use std::fmt;

pub use masterror::{AppError, AppErrorKind, AppResult};
use serde::Serialize;

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create output serialization error
pub fn output_error(message: impl Into<String>) -> AppError {
    AppError::internal(message.into())
}

/// Convert a transport failure from the generation endpoint
pub fn http_error(err: reqwest::Error) -> GeneratorError {
    if err.is_timeout() {
        GeneratorError::Transport(format!("Request timeout: {}", err))
    } else if err.is_connect() {
        GeneratorError::Transport(format!("Connection failed: {}", err))
    } else if err.is_decode() {
        GeneratorError::Transport(format!("Malformed response body: {}", err))
    } else {
        GeneratorError::Transport(err.to_string())
    }
}

/// Client-visible failure category of a pipeline request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Gate rejection, empty input, or a missing generation credential
    Validation,
    /// The store refused or failed to run the vetted query
    Execution,
    /// The generation service failed and no fallback template applied
    Upstream,
    /// Anything unanticipated; details stay server-side
    Internal
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Execution => write!(f, "execution"),
            Self::Upstream => write!(f, "upstream"),
            Self::Internal => write!(f, "internal")
        }
    }
}

/// Failure of a single "convert and run" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    Validation(String),
    Execution(String),
    Upstream(String),
    Internal(String)
}

impl QueryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Execution(_) => ErrorCategory::Execution,
            Self::Upstream(_) => ErrorCategory::Upstream,
            Self::Internal(_) => ErrorCategory::Internal
        }
    }

    /// Full detail, including internal messages. Server-side use only.
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Execution(msg)
            | Self::Upstream(msg)
            | Self::Internal(msg) => msg
        }
    }

    /// Message safe to hand back to the caller.
    pub fn client_message(&self) -> &str {
        match self {
            Self::Internal(_) => "internal error",
            other => other.detail()
        }
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Execution(_) => 3,
            Self::Upstream(_) => 4,
            Self::Internal(_) => 1
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::Execution(msg) => write!(f, "Execution error: {}", msg),
            Self::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            Self::Internal(_) => write!(f, "Internal error")
        }
    }
}

impl std::error::Error for QueryError {}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let message = err.client_message().to_string();
        match err.category() {
            ErrorCategory::Validation => AppError::validation(message),
            ErrorCategory::Execution => AppError::new(AppErrorKind::Database, message),
            ErrorCategory::Upstream => AppError::service(message),
            ErrorCategory::Internal => AppError::internal(message)
        }
    }
}

/// Failure of the SQL generation step.
///
/// Any variant lets the pipeline fall through to the fallback matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    /// No API key configured for a provider that needs one
    MissingCredential(&'static str),
    /// The call did not finish within the configured bound
    Timeout(u64),
    /// Non-success HTTP status from the provider
    Status { status: u16, body: String },
    /// Connection, TLS or body decoding failure
    Transport(String),
    /// The provider answered but with no usable text
    EmptyResponse,
    /// Generation is switched off in this process
    Disabled
}

impl GeneratorError {
    /// Category used when no fallback template rescues the request.
    pub fn into_query_error(self) -> QueryError {
        match self {
            Self::MissingCredential(_) => QueryError::Validation(self.to_string()),
            _ => QueryError::Upstream(self.to_string())
        }
    }
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential(provider) => {
                write!(f, "API key required for {} (set LLM_API_KEY)", provider)
            }
            Self::Timeout(secs) => write!(f, "SQL generation timed out after {}s", secs),
            Self::Status {
                status,
                body
            } => write!(f, "generation API error {}: {}", status, body),
            Self::Transport(msg) => write!(f, "generation request failed: {}", msg),
            Self::EmptyResponse => write!(f, "generation API returned an empty response"),
            Self::Disabled => write!(f, "SQL generation is disabled")
        }
    }
}

impl std::error::Error for GeneratorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_message_is_opaque() {
        let err = QueryError::Internal("pool poisoned at executor.rs:42".into());
        assert_eq!(err.client_message(), "internal error");
        assert!(!err.to_string().contains("executor.rs"));
        assert!(err.detail().contains("executor.rs"));
    }

    #[test]
    fn test_categories_and_exit_codes_are_distinct() {
        let errors = [
            QueryError::Validation("a".into()),
            QueryError::Execution("b".into()),
            QueryError::Upstream("c".into()),
            QueryError::Internal("d".into())
        ];
        let mut codes: Vec<i32> = errors.iter().map(QueryError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 4);
        assert_eq!(errors[1].category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_missing_credential_is_validation() {
        let err = GeneratorError::MissingCredential("OpenAI").into_query_error();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_timeout_is_upstream() {
        let err = GeneratorError::Timeout(30).into_query_error();
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert!(err.client_message().contains("30s"));
    }
}
