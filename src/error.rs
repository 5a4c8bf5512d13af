use thiserror::Error;

/// Type alias for Result with PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types surfaced by the extraction and classification pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Credential rejected by the provider, or no credential at all
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Unknown message id (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The chat model call failed or produced no usable content
    #[error("Model invocation failed ({model}): {message}")]
    ModelInvocation { model: String, message: String },

    /// The model reply could not be read as a JSON array of classifications
    #[error("Could not parse classification response: {0}")]
    ResponseParse(String),

    /// Empty or invalid caller input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Any other non-success response from the mail provider
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Provider response did not have the expected shape
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimitExceeded { .. }
                | PipelineError::ServerError { .. }
                | PipelineError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Map a non-success HTTP status from the mail provider to an error.
    ///
    /// `resource` names what was requested so 404s can report the message id.
    pub fn from_status(
        status: reqwest::StatusCode,
        headers: &reqwest::header::HeaderMap,
        resource: &str,
        body: &str,
    ) -> Self {
        let status_code = status.as_u16();
        let message = match provider_error_message(body) {
            Some(detail) => format!("HTTP {}: {}", status_code, detail),
            None => format!(
                "HTTP {}: {}",
                status_code,
                status.canonical_reason().unwrap_or("Unknown")
            ),
        };

        match status_code {
            401 => PipelineError::AuthError(message),
            404 => PipelineError::MessageNotFound(resource.to_string()),
            429 => PipelineError::RateLimitExceeded {
                retry_after: parse_retry_after_header(headers),
            },
            400 => PipelineError::BadRequest(message),
            403 => PipelineError::Forbidden(message),
            500..=599 => PipelineError::ServerError {
                status: status_code,
                message,
            },
            _ => PipelineError::ApiError(message),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            PipelineError::NetworkError(format!("Request timed out: {}", error))
        } else if error.is_decode() {
            PipelineError::InvalidMessageFormat(error.to_string())
        } else if let Some(status) = error.status() {
            PipelineError::ApiError(format!("HTTP {}: {}", status.as_u16(), error))
        } else {
            PipelineError::NetworkError(format!("Connection error: {}", error))
        }
    }
}

/// Pull `error.message` out of a Google-style JSON error body
fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("error_description"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header(headers: &reqwest::header::HeaderMap) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(value) = headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(seconds) = value.parse::<u64>() {
            return seconds;
        }

        if let Ok(http_date) = httpdate::parse_http_date(value) {
            if let Ok(duration) = http_date.duration_since(std::time::SystemTime::now()) {
                return duration.as_secs();
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use reqwest::StatusCode;

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_transient_errors() {
        let rate_limit = PipelineError::RateLimitExceeded { retry_after: 5 };
        assert!(rate_limit.is_transient());
        assert!(!rate_limit.is_permanent());

        let server_error = PipelineError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(server_error.is_transient());

        let network_error = PipelineError::NetworkError("Connection timeout".to_string());
        assert!(network_error.is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(PipelineError::AuthError("expired".to_string()).is_permanent());
        assert!(PipelineError::MessageNotFound("msg123".to_string()).is_permanent());
        assert!(PipelineError::ResponseParse("bad json".to_string()).is_permanent());
        assert!(PipelineError::ValidationError("empty".to_string()).is_permanent());
    }

    #[test]
    fn test_error_display() {
        let error = PipelineError::ModelInvocation {
            model: "gpt-4o".to_string(),
            message: "invalid api key".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("gpt-4o"));
        assert!(display.contains("invalid api key"));

        let error = PipelineError::RateLimitExceeded { retry_after: 10 };
        assert!(error.to_string().contains("10 seconds"));
    }

    #[test]
    fn test_from_status_mapping() {
        let headers = HeaderMap::new();

        let err = PipelineError::from_status(StatusCode::UNAUTHORIZED, &headers, "abc", "");
        assert!(matches!(err, PipelineError::AuthError(_)));

        let err = PipelineError::from_status(StatusCode::NOT_FOUND, &headers, "abc", "");
        assert!(matches!(err, PipelineError::MessageNotFound(ref id) if id == "abc"));

        let err = PipelineError::from_status(StatusCode::FORBIDDEN, &headers, "abc", "");
        assert!(matches!(err, PipelineError::Forbidden(_)));

        let err = PipelineError::from_status(StatusCode::BAD_GATEWAY, &headers, "abc", "");
        assert!(matches!(err, PipelineError::ServerError { status: 502, .. }));

        let err = PipelineError::from_status(StatusCode::IM_A_TEAPOT, &headers, "abc", "");
        assert!(matches!(err, PipelineError::ApiError(_)));
    }

    #[test]
    fn test_from_status_uses_provider_message() {
        let body = r#"{"error": {"code": 401, "message": "Invalid Credentials"}}"#;
        let err =
            PipelineError::from_status(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "abc", body);
        assert!(err.to_string().contains("Invalid Credentials"));
    }

    #[test]
    fn test_parse_retry_after_header_integer() {
        assert_eq!(parse_retry_after_header(&headers_with_retry_after("120")), 120);
        assert_eq!(parse_retry_after_header(&headers_with_retry_after("0")), 0);
    }

    #[test]
    fn test_parse_retry_after_header_missing_or_invalid() {
        assert_eq!(parse_retry_after_header(&HeaderMap::new()), 5);
        assert_eq!(parse_retry_after_header(&headers_with_retry_after("invalid")), 5);
    }

    #[test]
    fn test_parse_retry_after_header_http_date() {
        let future_time = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let headers = headers_with_retry_after(&httpdate::fmt_http_date(future_time));

        let retry_after = parse_retry_after_header(&headers);
        assert!(
            (58..=61).contains(&retry_after),
            "Expected ~60, got {}",
            retry_after
        );
    }

    #[test]
    fn test_parse_retry_after_header_past_http_date() {
        let past_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        let headers = headers_with_retry_after(&httpdate::fmt_http_date(past_time));

        assert_eq!(parse_retry_after_header(&headers), 5);
    }

    #[test]
    fn test_429_reads_retry_after() {
        let headers = headers_with_retry_after("42");
        let err = PipelineError::from_status(StatusCode::TOO_MANY_REQUESTS, &headers, "x", "");
        assert!(matches!(err, PipelineError::RateLimitExceeded { retry_after: 42 }));
    }
}
