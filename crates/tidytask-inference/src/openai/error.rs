//! OpenAI-specific error handling.

use tidytask_core::Error;

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert an OpenAI error to a tidytask Error. Retryable codes become
/// `Error::Unavailable`, everything else `Error::ExternalService`.
pub fn to_tidytask_error(code: OpenAIErrorCode, message: &str) -> Error {
    let message = match code {
        OpenAIErrorCode::AuthenticationError => format!("Authentication failed: {}", message),
        OpenAIErrorCode::RateLimitExceeded => format!("Rate limit exceeded: {}", message),
        OpenAIErrorCode::ModelNotFound => format!("Model not found: {}", message),
        OpenAIErrorCode::ContextLengthExceeded => format!("Context too long: {}", message),
        OpenAIErrorCode::ServerError => format!("Server error: {}", message),
        OpenAIErrorCode::Unknown => message.to_string(),
    };
    if code.is_retryable() {
        Error::Unavailable(message)
    } else {
        Error::ExternalService(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_from_status() {
        assert_eq!(
            OpenAIErrorCode::from_response(401, "invalid_api_key"),
            OpenAIErrorCode::AuthenticationError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(429, "rate_limit_exceeded"),
            OpenAIErrorCode::RateLimitExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(404, "model_not_found"),
            OpenAIErrorCode::ModelNotFound
        );
        assert_eq!(
            OpenAIErrorCode::from_response(400, "context_length_exceeded"),
            OpenAIErrorCode::ContextLengthExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(502, "bad_gateway"),
            OpenAIErrorCode::ServerError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(418, "im_a_teapot"),
            OpenAIErrorCode::Unknown
        );
    }

    #[test]
    fn test_retryable_codes_map_to_transient_errors() {
        for code in [OpenAIErrorCode::RateLimitExceeded, OpenAIErrorCode::ServerError] {
            assert!(code.is_retryable());
            assert!(to_tidytask_error(code, "x").is_transient());
        }
    }

    #[test]
    fn test_permanent_codes_are_not_transient() {
        for code in [
            OpenAIErrorCode::AuthenticationError,
            OpenAIErrorCode::ModelNotFound,
            OpenAIErrorCode::ContextLengthExceeded,
            OpenAIErrorCode::Unknown,
        ] {
            assert!(!code.is_retryable());
            let err = to_tidytask_error(code, "x");
            assert!(err.is_external());
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_auth_error_message() {
        let err = to_tidytask_error(OpenAIErrorCode::AuthenticationError, "Invalid key");
        assert!(err.to_string().contains("Authentication failed"));
    }
}
