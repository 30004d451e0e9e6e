//! Errors raised by interceptors and their handlers.

use crate::http::HttpMethod;
use crate::matching::RestrictionError;

/// Misuse of an interceptor or a handler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterceptorError {
    #[error("interceptor for {base_url} is not running; call start() first")]
    NotRunning { base_url: String },
    #[error("handler {method} {path} has no response declared")]
    NoResponseDeclaration { method: HttpMethod, path: String },
    #[error(
        "request saving is disabled for interceptor {base_url}; \
         enable it to access intercepted requests"
    )]
    RequestSavingDisabled { base_url: String },
    #[error("handler is no longer attached to an interceptor")]
    Detached,
    #[error(transparent)]
    Restriction(#[from] RestrictionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_not_running_display() {
        let error = InterceptorError::NotRunning {
            base_url: "http://localhost:3000".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "interceptor for http://localhost:3000 is not running; call start() first"
        );
    }

    #[rstest]
    fn test_no_response_display() {
        let error = InterceptorError::NoResponseDeclaration {
            method: HttpMethod::Post,
            path: "/users".to_string(),
        };
        assert_eq!(error.to_string(), "handler POST /users has no response declared");
    }

    #[rstest]
    fn test_restriction_error_is_transparent() {
        let error: InterceptorError = RestrictionError::Predicate("boom".to_string()).into();
        assert_eq!(error.to_string(), "computed restriction failed: boom");
    }
}
