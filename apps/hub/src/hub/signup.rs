//! Signup protocol handler
//!
//! received -> verified -> identity resolved -> admitted -> acknowledged.
//! Any failure drops the request without a reply.

use std::sync::Arc;

use hubwire::crypto::{canonical_public_key, signup_message};
use hubwire::{HubMessage, SignupAck, SignupRequest, verify};
use tracing::{debug, error, info, warn};

use super::HubError;
use super::registry::{Connection, ConnectionRegistry, Session};
use crate::database::Store;
use crate::database::models::{UNKNOWN_LOCATION, Validator};

/// Why a signup did not get an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BadSignature,
    StoreFailed,
    AlreadySignedUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    Admitted { validator_id: String, created: bool },
    Dropped(DropReason),
}

pub struct SignupHandler {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
}

impl SignupHandler {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn handle(&self, session: &Session, request: SignupRequest) -> SignupOutcome {
        let message = signup_message(&request.request_id, &request.public_key);
        if !verify(&message, &request.public_key, &request.signed_message) {
            warn!(
                target: logger::AUDIT_TARGET,
                event = "signup_rejected",
                connection = %session.id(),
                public_key = %request.public_key,
                request_id = %request.request_id,
                "Signup signature rejected"
            );
            return SignupOutcome::Dropped(DropReason::BadSignature);
        }

        // A verified key always parses; the fallback only keeps this total
        let public_key = match canonical_public_key(&request.public_key) {
            Ok(key) => key,
            Err(_) => return SignupOutcome::Dropped(DropReason::BadSignature),
        };

        if self.registry.contains(session.id()).await {
            return self.reject_second_signup(session, &public_key);
        }

        let (validator, created) = match self.resolve_identity(&public_key, &request.ip).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(
                    connection = %session.id(),
                    public_key = %public_key,
                    "Failed to resolve validator identity: {}", e
                );
                return SignupOutcome::Dropped(DropReason::StoreFailed);
            }
        };

        let connection = Connection::new(session, validator.id.clone(), public_key.clone());
        match self.registry.add(connection).await {
            Ok(Some(replaced)) => {
                info!(
                    validator_id = %validator.id,
                    old = %replaced.connection_id,
                    new = %session.id(),
                    "Validator reconnected, previous session replaced"
                );
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Registry refused admission: {}", HubError::from(e));
                return self.reject_second_signup(session, &public_key);
            }
        }

        let ack = HubMessage::Signup(SignupAck {
            validator_id: validator.id.clone(),
            request_id: request.request_id,
        });
        if session.outbound().send(ack).await.is_err() {
            debug!(connection = %session.id(), "Session closed before signup ack could be queued");
        }

        info!(
            validator_id = %validator.id,
            connection = %session.id(),
            created,
            "Validator signed up"
        );
        SignupOutcome::Admitted { validator_id: validator.id, created }
    }

    /// Look up the validator for `public_key`, creating it on first sight
    async fn resolve_identity(&self, public_key: &str, ip: &str) -> Result<(Validator, bool), HubError> {
        if let Some(existing) = self.store.find_validator_by_public_key(public_key).await? {
            return Ok((existing, false));
        }

        let validator = self.store.create_validator(ip, public_key, UNKNOWN_LOCATION).await?;
        Ok((validator, true))
    }

    fn reject_second_signup(&self, session: &Session, public_key: &str) -> SignupOutcome {
        warn!(
            target: logger::AUDIT_TARGET,
            event = "duplicate_signup",
            connection = %session.id(),
            public_key,
            "Second signup on an admitted session ignored"
        );
        SignupOutcome::Dropped(DropReason::AlreadySignedUp)
    }
}
