//! Twilio request validation
//!
//! Twilio signs every webhook with `X-Twilio-Signature`: the base64
//! HMAC-SHA1, keyed by the account auth token, of the full request URL
//! followed by every POST parameter (`key` + `value`) sorted by key.
//! JSON bodies are instead covered by a `bodySHA256` query parameter.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, Uri, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use cb_core::TwilioConfig;

use crate::error::{Result, VoiceError};
use crate::flow::CallState;
use crate::payload::{form_pairs, is_json};

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the request signature
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Largest webhook body accepted
pub const MAX_WEBHOOK_BODY: usize = 64 * 1024;

/// Query parameter carrying the SHA-256 of a JSON body
const BODY_HASH_PARAM: &str = "bodySHA256";

/// Twilio signature validator
#[derive(Clone)]
pub struct RequestValidator {
    auth_token: String,
}

impl RequestValidator {
    pub fn new(auth_token: &str) -> Self {
        Self {
            auth_token: auth_token.to_string(),
        }
    }

    fn mac(&self, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes()).ok()?;

        let mut sorted = params.to_vec();
        sorted.sort();

        mac.update(url.as_bytes());
        for (key, value) in &sorted {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        Some(mac)
    }

    /// Signature Twilio would send for this URL and parameter set
    pub fn compute_signature(&self, url: &str, params: &[(String, String)]) -> String {
        self.mac(url, params)
            .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Check a form-encoded request.
    ///
    /// The URL is tried as given and with its default port toggled.
    pub fn validate(&self, url: &str, params: &[(String, String)], signature: &str) -> bool {
        let Ok(expected) = STANDARD.decode(signature.trim()) else {
            return false;
        };

        url_variants(url).iter().any(|candidate| {
            self.mac(candidate, params)
                .map(|mac| mac.verify_slice(&expected).is_ok())
                .unwrap_or(false)
        })
    }

    /// Check a JSON request whose URL carries `bodySHA256`
    pub fn validate_with_body(&self, url: &str, body: &[u8], signature: &str) -> bool {
        let Some(expected_hash) = body_hash_param(url) else {
            return false;
        };

        let actual_hash = format!("{:x}", Sha256::digest(body));
        actual_hash.eq_ignore_ascii_case(&expected_hash) && self.validate(url, &[], signature)
    }
}

fn body_hash_param(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == BODY_HASH_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// The URL as given plus the same URL with its port removed, or with the
/// scheme's default port added when it has none
fn url_variants(url: &str) -> Vec<String> {
    let mut variants = vec![url.to_string()];

    let Some((scheme, rest)) = url.split_once("://") else {
        return variants;
    };
    let (authority, tail) = match rest.find(['/', '?', '#']) {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            variants.push(format!("{}://{}{}", scheme, host, tail));
        }
        _ => {
            let default_port = match scheme.to_ascii_lowercase().as_str() {
                "https" => Some(443),
                "http" => Some(80),
                _ => None,
            };
            if let Some(port) = default_port {
                variants.push(format!("{}://{}:{}{}", scheme, authority, port, tail));
            }
        }
    }

    variants
}

/// Pass/fail gate placed in front of the voice webhook
#[derive(Clone)]
pub struct SignatureGate {
    validator: Option<RequestValidator>,
    webhook_base_url: Option<String>,
}

impl SignatureGate {
    /// Gate that checks every request against `auth_token`
    pub fn new(auth_token: &str, webhook_base_url: Option<String>) -> Self {
        Self {
            validator: Some(RequestValidator::new(auth_token)),
            webhook_base_url,
        }
    }

    /// Gate that lets every request through
    pub fn disabled() -> Self {
        Self {
            validator: None,
            webhook_base_url: None,
        }
    }

    pub fn from_config(config: &TwilioConfig) -> Result<Self> {
        if !config.validate {
            warn!("Twilio signature validation is disabled");
            return Ok(Self::disabled());
        }

        let auth_token = config
            .auth_token
            .as_deref()
            .ok_or(VoiceError::MissingAuthToken)?;

        Ok(Self::new(auth_token, config.webhook_base_url.clone()))
    }

    /// Verify a buffered request
    pub fn verify(&self, parts: &Parts, body: &[u8]) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };

        let signature = parts
            .headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(VoiceError::MissingSignature)?;

        let url = webhook_url(self.webhook_base_url.as_deref(), &parts.headers, &parts.uri)?;

        let valid = if body_hash_param(&url).is_some() {
            validator.validate_with_body(&url, body, signature)
        } else {
            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let params = if is_json(content_type) {
                Vec::new()
            } else {
                form_pairs(body)
            };
            validator.validate(&url, &params, signature)
        };

        if valid {
            debug!("Twilio signature verified for {}", url);
            Ok(())
        } else {
            Err(VoiceError::SignatureVerificationFailed)
        }
    }
}

/// Reconstruct the URL Twilio requested
fn webhook_url(base_url: Option<&str>, headers: &HeaderMap, uri: &Uri) -> Result<String> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if let Some(base) = base_url {
        return Ok(format!("{}{}", base.trim_end_matches('/'), path_and_query));
    }

    let first_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let scheme = first_value("x-forwarded-proto").unwrap_or_else(|| "https".to_string());
    let host = first_value("x-forwarded-host")
        .or_else(|| first_value(header::HOST.as_str()))
        .ok_or_else(|| VoiceError::WebhookUrl("no Host header".to_string()))?;

    Ok(format!("{}://{}{}", scheme, host, path_and_query))
}

/// Middleware rejecting requests without a valid Twilio signature.
///
/// Rejected requests never reach the handler.
pub async fn verify_twilio_signature(
    State(gate): State<Arc<SignatureGate>>,
    request: Request,
    next: Next,
) -> Response {
    debug!(state = ?CallState::Received, "Webhook received on {}", request.uri().path());

    let (parts, body) = request.into_parts();

    let bytes: Bytes = match axum::body::to_bytes(body, MAX_WEBHOOK_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
        }
    };

    if let Err(e) = gate.verify(&parts, &bytes) {
        warn!("Rejected webhook {}: {}", parts.uri.path(), e);
        return (StatusCode::FORBIDDEN, "Twilio Request Validation Failed.").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
