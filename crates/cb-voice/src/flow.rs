//! Background follow-up for an answered call
//!
//! Lifecycle of one webhook delivery:
//!
//! ```text
//! Received -> Validated -> Responded -> BackgroundResolving -> BackgroundDispatching -> Done
//!                                            |                         |
//!                                            +--> Failed(Resolving)    +--> Failed(Dispatching)
//! ```
//!
//! The first three states belong to the HTTP request. Everything after
//! `Responded` runs in its own task and never reports back to the caller.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use cb_omnichat::{Broadcaster, ContactDirectory, OmniChatError};

use crate::payload::CallEvent;

/// Background stage that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Resolving,
    Dispatching,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStage::Resolving => write!(f, "contact resolution"),
            FlowStage::Dispatching => write!(f, "broadcast dispatch"),
        }
    }
}

/// State of a webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    Validated,
    Responded,
    BackgroundResolving,
    BackgroundDispatching,
    Done,
    Failed(FlowStage),
    /// Answered, but there was no dialable caller number to follow up
    Skipped,
}

/// Terminal result of the background flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Done { contact_id: String },
    Failed { stage: FlowStage, error: OmniChatError },
}

impl FlowOutcome {
    pub fn state(&self) -> CallState {
        match self {
            FlowOutcome::Done { .. } => CallState::Done,
            FlowOutcome::Failed { stage, .. } => CallState::Failed(*stage),
        }
    }
}

/// Resolve the caller's contact, then broadcast the template to it
#[derive(Clone)]
pub struct CallFlow {
    directory: Arc<dyn ContactDirectory>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl CallFlow {
    pub fn new(directory: Arc<dyn ContactDirectory>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            directory,
            broadcaster,
        }
    }

    /// Run resolve then dispatch. Errors end the flow and are logged here;
    /// nothing is retried.
    pub async fn run(&self, event: &CallEvent) -> FlowOutcome {
        let call_sid = event.call_sid.as_deref().unwrap_or("-");

        debug!(call_sid, state = ?CallState::BackgroundResolving, "Resolving contact for {}", event.caller_number);
        let contact_id = match self.directory.resolve_contact(&event.caller_number).await {
            Ok(contact_id) => contact_id,
            Err(e) => return fail(event, FlowStage::Resolving, e),
        };

        debug!(call_sid, state = ?CallState::BackgroundDispatching, "Dispatching broadcast to {}", contact_id);
        if let Err(e) = self.broadcaster.dispatch(&contact_id).await {
            return fail(event, FlowStage::Dispatching, e);
        }

        info!(call_sid, "WhatsApp broadcast sent to {}", event.caller_number);
        FlowOutcome::Done { contact_id }
    }

    /// Spawn the flow; it starts only once `responded` fires (or its sender
    /// is dropped).
    pub fn spawn_after(
        &self,
        event: CallEvent,
        responded: oneshot::Receiver<()>,
    ) -> JoinHandle<FlowOutcome> {
        let flow = self.clone();
        tokio::spawn(async move {
            let _ = responded.await;
            flow.run(&event).await
        })
    }
}

fn fail(event: &CallEvent, stage: FlowStage, error: OmniChatError) -> FlowOutcome {
    error!(
        call_sid = event.call_sid.as_deref().unwrap_or("-"),
        stage = %stage,
        "OmniChat error for {}: {}",
        event.caller_number,
        error
    );
    FlowOutcome::Failed { stage, error }
}
