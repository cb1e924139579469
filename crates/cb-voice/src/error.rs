//! Error types for cb-voice

use thiserror::Error;

/// cb-voice error type
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Twilio auth token not set")]
    MissingAuthToken,

    #[error("Missing X-Twilio-Signature header")]
    MissingSignature,

    #[error("Webhook signature verification failed")]
    SignatureVerificationFailed,

    #[error("Cannot determine webhook URL: {0}")]
    WebhookUrl(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, VoiceError>;
