//! Error types for cb-omnichat

use thiserror::Error;

/// What went wrong talking to the OmniChat API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Non-success HTTP status, with the response body as sent by OmniChat
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// cb-omnichat error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OmniChatError {
    #[error("Authentication failed: {0}")]
    Auth(UpstreamError),

    #[error("Contact resolution failed: {0}")]
    Resolution(UpstreamError),

    #[error("Broadcast dispatch failed: {0}")]
    Dispatch(UpstreamError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, OmniChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_upstream_payload() {
        let err = OmniChatError::Dispatch(UpstreamError::Status {
            status: 422,
            body: r#"{"error":"template not approved"}"#.to_string(),
        });
        assert_eq!(
            err.to_string(),
            r#"Broadcast dispatch failed: HTTP 422: {"error":"template not approved"}"#
        );
    }
}
