//! OmniChat REST API client

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, error};

use cb_core::OmniChatConfig;

use crate::error::{OmniChatError, Result, UpstreamError};
use crate::models::{
    BearerToken, BroadcastRequest, Contact, ContactList, NewContact, TokenRequest, TokenResponse,
};
use crate::token::TokenIssuer;

/// Header identifying the calling application on the token exchange
pub const CALLING_APPLICATION_HEADER: &str = "X-Calling-Application";

/// Fixed login used for the token exchange
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub app_name: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// OmniChat REST API client
///
/// Thin wrapper over the HTTP endpoints. Every call is made exactly once;
/// there is no retry at this layer or above it.
#[derive(Debug, Clone)]
pub struct OmniChatApi {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl OmniChatApi {
    /// Create a new OmniChat API client
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| OmniChatError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Create a client from the OmniChat section of the configuration
    pub fn from_config(config: &OmniChatConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
                app_name: config.app_name.clone(),
            },
        )
    }

    /// Exchange the configured credentials for a bearer token
    pub async fn request_token(&self) -> std::result::Result<BearerToken, UpstreamError> {
        let url = format!("{}/oauth/token", self.base_url);

        debug!("Requesting OmniChat token for {}", self.credentials.username);

        let response = self
            .client
            .post(&url)
            .header(CALLING_APPLICATION_HEADER, &self.credentials.app_name)
            .json(&TokenRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await?;

        let token: TokenResponse = check_status(response, "Token request").await?.json().await?;

        if token.access_token.is_empty() {
            return Err(UpstreamError::Decode("empty access_token".to_string()));
        }

        Ok(BearerToken::new(token.access_token, token.expires_at))
    }

    /// List contacts in `api_account_id` whose mobile number is exactly `mobile_number`
    pub async fn find_contacts(
        &self,
        bearer: &str,
        api_account_id: &str,
        mobile_number: &str,
    ) -> std::result::Result<Vec<Contact>, UpstreamError> {
        let url = format!("{}/contact", self.base_url);

        debug!("Looking up contact for {}", mobile_number);

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .query(&[
                ("apiAccountId", api_account_id),
                ("mobileNumber", mobile_number),
            ])
            .send()
            .await?;

        let list: ContactList = check_status(response, "Contact lookup").await?.json().await?;
        Ok(list.items)
    }

    /// Create a contact
    pub async fn create_contact(
        &self,
        bearer: &str,
        contact: &NewContact,
    ) -> std::result::Result<Contact, UpstreamError> {
        let url = format!("{}/contact", self.base_url);

        debug!("Creating contact for {}", contact.mobile_number);

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer)
            .json(contact)
            .send()
            .await?;

        let created: Contact = check_status(response, "Contact create").await?.json().await?;
        Ok(created)
    }

    /// Send a template broadcast; the response body is not inspected
    pub async fn send_broadcast(
        &self,
        bearer: &str,
        request: &BroadcastRequest,
    ) -> std::result::Result<(), UpstreamError> {
        let url = format!("{}/broadcast", self.base_url);

        debug!(
            "Sending template {} to contact {}",
            request.template_id, request.contact_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await?;

        check_status(response, "Broadcast").await?;
        Ok(())
    }
}

#[async_trait]
impl TokenIssuer for OmniChatApi {
    async fn issue_token(&self) -> std::result::Result<BearerToken, UpstreamError> {
        self.request_token().await
    }
}

/// Turn a non-success response into `UpstreamError::Status` carrying the body
async fn check_status(
    response: Response,
    operation: &str,
) -> std::result::Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("{} failed: {} - {}", operation, status, body);

    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}
