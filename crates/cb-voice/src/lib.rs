//! cb-voice: Twilio Voice webhook for callbridge
//!
//! Answers every authenticated voice webhook with a TwiML hangup and,
//! once that response is on the wire, runs the OmniChat broadcast flow
//! for the caller in a background task.

pub mod body;
pub mod error;
pub mod flow;
pub mod payload;
pub mod signature;
pub mod twiml;
pub mod webhook;

pub use error::{Result, VoiceError};
pub use flow::{CallFlow, CallState, FlowOutcome, FlowStage};
pub use payload::{CallEvent, VoiceWebhook};
pub use signature::{RequestValidator, SignatureGate};
pub use twiml::VoiceResponse;
pub use webhook::{VoiceServer, voice_router};
