//! Template broadcast dispatch

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::OmniChatApi;
use crate::error::{OmniChatError, Result};
use crate::models::BroadcastRequest;
use crate::token::TokenCache;

/// Sends the configured template to a contact
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Send exactly one broadcast to `contact_id`
    async fn dispatch(&self, contact_id: &str) -> Result<()>;
}

/// Broadcast dispatcher backed by the OmniChat API
pub struct BroadcastDispatcher {
    api: Arc<OmniChatApi>,
    tokens: Arc<TokenCache>,
    api_account_id: String,
    template_id: String,
    message: String,
}

impl BroadcastDispatcher {
    pub fn new(
        api: Arc<OmniChatApi>,
        tokens: Arc<TokenCache>,
        api_account_id: &str,
        template_id: &str,
        message: &str,
    ) -> Self {
        Self {
            api,
            tokens,
            api_account_id: api_account_id.to_string(),
            template_id: template_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Build the broadcast body for `contact_id`
    pub fn request_for(&self, contact_id: &str) -> BroadcastRequest {
        BroadcastRequest {
            api_account_id: self.api_account_id.clone(),
            contact_id: contact_id.to_string(),
            template_id: self.template_id.clone(),
            message: self.message.clone(),
        }
    }
}

#[async_trait]
impl Broadcaster for BroadcastDispatcher {
    async fn dispatch(&self, contact_id: &str) -> Result<()> {
        let bearer = self.tokens.get_bearer().await?;
        let request = self.request_for(contact_id);

        self.api
            .send_broadcast(&bearer, &request)
            .await
            .map_err(OmniChatError::Dispatch)?;

        info!(
            "Broadcast template {} sent to contact {}",
            self.template_id, contact_id
        );
        Ok(())
    }
}
