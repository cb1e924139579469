//! cb-core: callbridge core library
//!
//! Configuration loading and the shared error type used by the
//! callbridge crates.

pub mod config;
pub mod error;

pub use config::{Config, OmniChatConfig, ServerConfig, TwilioConfig};
pub use error::{Error, Result};
