//! Find-or-create contact resolution
//!
//! Lookup and create are two separate calls with nothing tying them
//! together, so two concurrent resolutions for the same number can both
//! miss and both create a contact.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::OmniChatApi;
use crate::error::{OmniChatError, Result};
use crate::models::{Contact, NewContact};
use crate::token::TokenCache;

/// Maps a phone number to an OmniChat contact id
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Return the id of the contact for `mobile_number`, creating it if needed
    async fn resolve_contact(&self, mobile_number: &str) -> Result<String>;
}

/// Contact resolver backed by the OmniChat API
pub struct ContactResolver {
    api: Arc<OmniChatApi>,
    tokens: Arc<TokenCache>,
    api_account_id: String,
}

impl ContactResolver {
    pub fn new(api: Arc<OmniChatApi>, tokens: Arc<TokenCache>, api_account_id: &str) -> Self {
        Self {
            api,
            tokens,
            api_account_id: api_account_id.to_string(),
        }
    }

    /// First contact matching `mobile_number`, in the order OmniChat returns them
    pub async fn find_by_mobile(&self, mobile_number: &str) -> Result<Option<Contact>> {
        let bearer = self.tokens.get_bearer().await?;

        let contacts = self
            .api
            .find_contacts(&bearer, &self.api_account_id, mobile_number)
            .await
            .map_err(OmniChatError::Resolution)?;

        Ok(contacts.into_iter().next())
    }

    /// Create a presubscribed contact named after its number
    pub async fn create(&self, mobile_number: &str) -> Result<Contact> {
        let bearer = self.tokens.get_bearer().await?;
        let contact = NewContact::presubscribed(mobile_number, &self.api_account_id);

        self.api
            .create_contact(&bearer, &contact)
            .await
            .map_err(OmniChatError::Resolution)
    }
}

#[async_trait]
impl ContactDirectory for ContactResolver {
    async fn resolve_contact(&self, mobile_number: &str) -> Result<String> {
        if let Some(contact) = self.find_by_mobile(mobile_number).await? {
            info!("Found contact {} for {}", contact.contact_id, mobile_number);
            return Ok(contact.contact_id);
        }

        let contact = self.create(mobile_number).await?;
        info!("Created contact {} for {}", contact.contact_id, mobile_number);
        Ok(contact.contact_id)
    }
}
