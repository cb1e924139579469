//! cb-omnichat: OmniChat messaging platform integration
//!
//! Authenticates against the OmniChat API with a cached bearer token,
//! finds or creates the contact for a phone number and sends it a
//! WhatsApp template broadcast.

pub mod broadcast;
pub mod client;
pub mod contacts;
pub mod error;
pub mod models;
pub mod service;
pub mod token;

pub use broadcast::{BroadcastDispatcher, Broadcaster};
pub use client::{Credentials, OmniChatApi};
pub use contacts::{ContactDirectory, ContactResolver};
pub use error::{OmniChatError, Result, UpstreamError};
pub use models::{BearerToken, BroadcastRequest, Contact, ContactStatus, NewContact};
pub use service::OmniChat;
pub use token::{Clock, SystemClock, TokenCache, TokenIssuer};
