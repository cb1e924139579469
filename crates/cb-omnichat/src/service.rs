//! Wiring of the OmniChat components from configuration

use std::sync::Arc;

use tracing::info;

use cb_core::OmniChatConfig;

use crate::broadcast::BroadcastDispatcher;
use crate::client::OmniChatApi;
use crate::contacts::ContactResolver;
use crate::error::Result;
use crate::token::TokenCache;

/// OmniChat integration: one API client and token cache shared by the
/// contact resolver and the broadcast dispatcher
pub struct OmniChat {
    tokens: Arc<TokenCache>,
    resolver: Arc<ContactResolver>,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl OmniChat {
    /// Build the integration from configuration
    pub fn from_config(config: &OmniChatConfig) -> Result<Self> {
        let api = Arc::new(OmniChatApi::from_config(config)?);
        let tokens = Arc::new(TokenCache::new(api.clone()));

        let resolver = Arc::new(ContactResolver::new(
            api.clone(),
            tokens.clone(),
            &config.api_account_id,
        ));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            api,
            tokens.clone(),
            &config.api_account_id,
            &config.template_id,
            &config.message,
        ));

        info!(
            "OmniChat client initialized for {} (account {}, template {})",
            config.base_url, config.api_account_id, config.template_id
        );

        Ok(Self {
            tokens,
            resolver,
            dispatcher,
        })
    }

    pub fn resolver(&self) -> Arc<ContactResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn dispatcher(&self) -> Arc<BroadcastDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn token_cache(&self) -> Arc<TokenCache> {
        Arc::clone(&self.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::contacts::ContactDirectory;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_components_share_one_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1",
                "expires_at": "2999-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "items": [{ "contactId": "c1" }] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/broadcast"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = OmniChatConfig {
            base_url: server.uri(),
            username: "user".to_string(),
            password: "pass".to_string(),
            app_name: "callbridge".to_string(),
            api_account_id: "acc-1".to_string(),
            template_id: "tpl-1".to_string(),
            message: String::new(),
        };
        let omnichat = OmniChat::from_config(&config).unwrap();

        let contact_id = omnichat.resolver().resolve_contact("+447700900123").await.unwrap();
        omnichat.dispatcher().dispatch(&contact_id).await.unwrap();
        assert_eq!(omnichat.token_cache().get_bearer().await.unwrap(), "tok-1");
    }
}
