//! Hub core - coordinates validators
//!
//! The hub:
//! - Admits validators that prove ownership of their key (`signup`)
//! - Tracks which validators are reachable (`registry`)
//! - Fans monitoring work out to them every period (`dispatch`)
//! - Matches replies to the requests they answer (`correlation`)
//! - Records verified results and credits the validator (`ingestion`)
//!
//! The transport layer owns the sockets and feeds frames in through
//! [`Hub::handle_frame`]; nothing here touches a socket directly.

pub mod correlation;
pub mod dispatch;
pub mod ingestion;
pub mod registry;
pub mod signup;

#[cfg(test)]
mod tests;

pub use correlation::{CorrelationError, CorrelationTable, PendingCheck};
pub use dispatch::{DispatchReport, DispatchSettings, Dispatcher};
pub use ingestion::{IngestOutcome, ResultIngestion};
pub use registry::{Connection, ConnectionId, ConnectionRegistry, RegistryError, Session};
pub use signup::{DropReason, SignupHandler, SignupOutcome};

use std::sync::Arc;

use hubwire::protocol::decode;
use hubwire::{ValidatorMessage, WireError};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::Store;

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error("send queue for validator {0} is full")]
    Saturated(String),
    #[error("send queue for validator {0} is closed")]
    QueueClosed(String),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// What the hub did with one inbound frame
#[derive(Debug)]
pub enum FrameOutcome {
    Signup(SignupOutcome),
    Ingest(IngestOutcome),
    /// A reply whose request id is not pending
    UnknownRequest(Uuid),
    Malformed(HubError),
}

pub struct Hub {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
    correlation: Arc<CorrelationTable>,
    signup: SignupHandler,
    ingestion: ResultIngestion,
}

impl Hub {
    pub fn new(store: Arc<dyn Store>, reward: u32) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let correlation = Arc::new(CorrelationTable::new());

        Self {
            signup: SignupHandler::new(Arc::clone(&store), Arc::clone(&registry)),
            ingestion: ResultIngestion::new(Arc::clone(&store), reward),
            store,
            registry,
            correlation,
        }
    }

    pub fn from_config(store: Arc<dyn Store>, config: &Config) -> Self {
        Self::new(store, config.rewards.per_check)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn correlation(&self) -> &Arc<CorrelationTable> {
        &self.correlation
    }

    /// Build a dispatcher sharing this hub's registry and correlation table
    pub fn dispatcher(&self, settings: DispatchSettings) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.correlation),
            settings,
        )
    }

    /// Process one text frame received on `session`.
    ///
    /// Frames from one session must be fed in order; nothing returned here
    /// is an error the transport has to act on.
    pub async fn handle_frame(&self, session: &Session, text: &str) -> FrameOutcome {
        let message: ValidatorMessage = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection = %session.id(), "Dropping malformed frame: {}", e);
                return FrameOutcome::Malformed(e.into());
            }
        };

        match message {
            ValidatorMessage::Signup(request) => {
                debug!(connection = %session.id(), request_id = %request.request_id, "Signup received");
                FrameOutcome::Signup(self.signup.handle(session, request).await)
            }
            ValidatorMessage::Validate(reply) => {
                let Some(pending) = self.correlation.resolve(&reply.request_id).await else {
                    warn!(
                        target: logger::AUDIT_TARGET,
                        event = "unknown_request",
                        connection = %session.id(),
                        request_id = %reply.request_id,
                        "Reply for a request that is not pending"
                    );
                    return FrameOutcome::UnknownRequest(reply.request_id);
                };
                FrameOutcome::Ingest(self.ingestion.ingest(pending, reply).await)
            }
        }
    }

    /// Forget a closed session. Its pending checks stay until they go stale.
    pub async fn disconnect(&self, session: &Session) {
        if let Some(connection) = self.registry.remove(session.id()).await {
            info!(
                validator_id = %connection.validator_id,
                connection = %session.id(),
                connected_for = ?connection.admitted_at.elapsed(),
                "Validator disconnected"
            );
        } else {
            debug!(connection = %session.id(), "Session closed before signup");
        }
    }
}
