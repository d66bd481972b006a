use thiserror::Error;

/// Failures surfaced by a [`ChatClient`](super::ChatClient)
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The endpoint answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced an HTTP response
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered but the body could not be used
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// HTTP status code, when the failure carried one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LlmError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-side failures that are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self.status_code(), Some(500..=599))
    }

    /// Quota or authorization failures that end the whole run
    pub fn is_fatal(&self) -> bool {
        match self {
            LlmError::Status { status, message } => {
                matches!(status, 401 | 402 | 403)
                    || message.to_lowercase().contains("usage limit")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, message: &str) -> LlmError {
        LlmError::Status {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(status(500, "boom").is_transient());
        assert!(status(503, "unavailable").is_transient());
        assert!(!status(404, "missing").is_transient());
        assert!(!LlmError::Network("refused".into()).is_transient());
    }

    #[test]
    fn quota_and_auth_errors_are_fatal() {
        assert!(status(402, "payment required").is_fatal());
        assert!(status(401, "unauthorized").is_fatal());
        assert!(status(429, "you've reached your hourly usage limit").is_fatal());
        assert!(!status(500, "boom").is_fatal());
        assert!(!LlmError::InvalidResponse("garbage".into()).is_fatal());
    }

    #[test]
    fn status_code_only_for_http_failures() {
        assert_eq!(status(502, "bad gateway").status_code(), Some(502));
        assert_eq!(LlmError::Network("reset".into()).status_code(), None);
    }
}
