//! Webhook server for Twilio Voice call notifications

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::body::FlushNotifyBody;
use crate::error::{Result, VoiceError};
use crate::flow::{CallFlow, CallState};
use crate::payload::VoiceWebhook;
use crate::signature::{SignatureGate, verify_twilio_signature};
use crate::twiml::{TWIML_CONTENT_TYPE, VoiceResponse};

/// Voice webhook path
pub const VOICE_WEBHOOK_PATH: &str = "/webhook/voice";

/// Path of the original deployment, served by the same handler
pub const LEGACY_VOICE_WEBHOOK_PATH: &str = "/twilio/voice";

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub flow: CallFlow,
}

/// Build the router: health check plus the signature-gated voice webhook
pub fn voice_router(flow: CallFlow, gate: SignatureGate) -> Router {
    let webhook = Router::new()
        .route(VOICE_WEBHOOK_PATH, post(handle_voice))
        .route(LEGACY_VOICE_WEBHOOK_PATH, post(handle_voice))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(gate),
            verify_twilio_signature,
        ))
        .with_state(Arc::new(WebhookState { flow }));

    Router::new().route("/", get(health)).merge(webhook)
}

/// Health check
async fn health() -> &'static str {
    "OK"
}

/// Handle a validated voice webhook.
///
/// The hangup is returned no matter what the payload holds; the OmniChat
/// flow starts only after the response body has been written out.
async fn handle_voice(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!(state = ?CallState::Validated, "Voice webhook passed validation");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let event = match VoiceWebhook::parse(content_type, &body) {
        Ok(payload) => {
            info!(
                call_sid = payload.call_sid.as_deref().unwrap_or("-"),
                "Incoming call from {}",
                payload.from.as_deref().unwrap_or("unknown")
            );
            let event = payload.call_event();
            if event.is_none() {
                warn!(
                    state = ?CallState::Skipped,
                    "No dialable caller number ({:?}), skipping OmniChat flow",
                    payload.from
                );
            }
            event
        }
        Err(e) => {
            warn!(state = ?CallState::Skipped, "Unreadable voice webhook: {}", e);
            None
        }
    };

    let (responded_tx, responded_rx) = oneshot::channel();
    if let Some(event) = event {
        state.flow.spawn_after(event, responded_rx);
    }

    debug!(state = ?CallState::Responded, "Hanging up");
    twiml_response(VoiceResponse::new().hangup(), responded_tx)
}

fn twiml_response(twiml: VoiceResponse, responded: oneshot::Sender<()>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)],
        Body::new(FlushNotifyBody::new(twiml.to_xml(), responded)),
    )
        .into_response()
}

/// Voice webhook server
pub struct VoiceServer {
    addr: SocketAddr,
    router: Router,
}

impl VoiceServer {
    /// Create a new webhook server
    pub fn new(addr: SocketAddr, flow: CallFlow, gate: SignatureGate) -> Self {
        Self {
            addr,
            router: voice_router(flow, gate),
        }
    }

    /// Serve until `shutdown` completes
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting voice webhook server on {}", self.addr);

        let app = self.router.layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| VoiceError::Server(e.to_string()))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| VoiceError::Server(e.to_string()))?;

        info!("Voice webhook server stopped");
        Ok(())
    }
}
