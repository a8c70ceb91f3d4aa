// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use sql_query_gate::error::{
    AppError, ErrorCategory, GeneratorError, QueryError, config_error, file_read_error,
    output_error
};

#[test]
fn test_file_read_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error = file_read_error("/path/to/question.txt", io_error);
    let _msg = error.to_string();
}

#[test]
fn test_config_error() {
    let error = config_error("Invalid value for MAX_ROWS");
    let _msg = error.to_string();
}

#[test]
fn test_output_error() {
    let error = output_error("JSON serialization failed");
    let _msg = error.to_string();
}

#[test]
fn test_exit_codes_per_category() {
    assert_eq!(QueryError::Validation("x".into()).exit_code(), 2);
    assert_eq!(QueryError::Execution("x".into()).exit_code(), 3);
    assert_eq!(QueryError::Upstream("x".into()).exit_code(), 4);
    assert_eq!(QueryError::Internal("x".into()).exit_code(), 1);
}

#[test]
fn test_internal_detail_never_reaches_client() {
    let err = QueryError::Internal("connection string postgresql://user:pw@db".into());
    assert_eq!(err.client_message(), "internal error");
    assert_eq!(err.to_string(), "Internal error");
    let app: AppError = err.into();
    assert!(!app.to_string().contains("pw@db"));
}

#[test]
fn test_generator_error_categories() {
    assert_eq!(
        GeneratorError::MissingCredential("OpenAI")
            .into_query_error()
            .category(),
        ErrorCategory::Validation
    );
    for err in [
        GeneratorError::Timeout(30),
        GeneratorError::Status {
            status: 429,
            body:   "rate limited".into()
        },
        GeneratorError::Transport("connection refused".into()),
        GeneratorError::EmptyResponse,
        GeneratorError::Disabled
    ] {
        assert_eq!(err.into_query_error().category(), ErrorCategory::Upstream);
    }
}

#[test]
fn test_generator_error_messages() {
    assert_eq!(
        GeneratorError::Timeout(30).to_string(),
        "SQL generation timed out after 30s"
    );
    assert!(
        GeneratorError::Status {
            status: 401,
            body:   "bad key".into()
        }
        .to_string()
        .contains("401")
    );
}

#[test]
fn test_category_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&ErrorCategory::Upstream).unwrap(),
        "\"upstream\""
    );
}
