//! Validation dispatch loop
//!
//! Once per period every active site is sent to every connected validator.
//! Each request is registered in the correlation table before it is queued,
//! so a fast reply can never outrun its entry.

use std::sync::Arc;
use std::time::Duration;

use hubwire::{HubMessage, ValidateRequest};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::HubError;
use super::correlation::{CorrelationTable, PendingCheck};
use super::registry::{Connection, ConnectionRegistry};
use crate::config;
use crate::database::Store;
use crate::database::models::MonitoredSite;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub interval: Duration,
    /// Outstanding checks a validator may owe before it is skipped
    pub max_pending_per_validator: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        (&config::Dispatch::default()).into()
    }
}

impl From<&config::Dispatch> for DispatchSettings {
    fn from(dispatch: &config::Dispatch) -> Self {
        Self {
            interval: dispatch.interval(),
            max_pending_per_validator: dispatch.max_pending_per_validator,
        }
    }
}

/// What one period did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sites: usize,
    pub validators: usize,
    pub sent: usize,
    /// Not sent because the validator's queue or pending budget was full
    pub saturated: usize,
    /// Not sent because the validator's session had already closed
    pub closed: usize,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
    correlation: Arc<CorrelationTable>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectionRegistry>,
        correlation: Arc<CorrelationTable>,
        settings: DispatchSettings,
    ) -> Self {
        Self { store, registry, correlation, settings }
    }

    /// Run a single fan-out period
    pub async fn run_period(&self) -> anyhow::Result<DispatchReport> {
        let sites = self.store.list_active_sites().await?;
        let connections = self.registry.list_active().await;
        let mut pending = self.correlation.pending_by_validator().await;

        let mut report = DispatchReport {
            sites: sites.len(),
            validators: connections.len(),
            ..Default::default()
        };

        for site in &sites {
            for connection in &connections {
                let outstanding = pending.entry(connection.validator_id.clone()).or_insert(0);
                if *outstanding >= self.settings.max_pending_per_validator {
                    report.saturated += 1;
                    continue;
                }

                match self.send_check(site, connection).await {
                    Ok(()) => {
                        *outstanding += 1;
                        report.sent += 1;
                    }
                    Err(HubError::Saturated(_)) => report.saturated += 1,
                    Err(HubError::QueueClosed(_)) => report.closed += 1,
                    Err(e) => warn!(site = %site.url, "Skipping check: {}", e),
                }
            }
        }

        Ok(report)
    }

    async fn send_check(&self, site: &MonitoredSite, connection: &Connection) -> Result<(), HubError> {
        let request_id = Uuid::now_v7();
        self.correlation
            .register(PendingCheck::new(
                request_id,
                connection.validator_id.clone(),
                connection.public_key.clone(),
                site.id.clone(),
                site.url.clone(),
            ))
            .await?;

        let frame = HubMessage::Validate(ValidateRequest { url: site.url.clone(), request_id });
        match connection.outbound.try_send(frame) {
            Ok(()) => {
                debug!(validator_id = %connection.validator_id, site = %site.url, %request_id, "Check dispatched");
                Ok(())
            }
            Err(e) => {
                self.correlation.cancel(&request_id).await;
                match e {
                    TrySendError::Full(_) => Err(HubError::Saturated(connection.validator_id.clone())),
                    TrySendError::Closed(_) => Err(HubError::QueueClosed(connection.validator_id.clone())),
                }
            }
        }
    }

    /// Start the periodic loop. The first period runs immediately.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.run_period().await {
                    Ok(report) if report.saturated > 0 || report.closed > 0 => {
                        warn!(
                            sites = report.sites,
                            validators = report.validators,
                            sent = report.sent,
                            saturated = report.saturated,
                            closed = report.closed,
                            "Dispatch period left checks unsent"
                        );
                    }
                    Ok(report) => {
                        info!(
                            sites = report.sites,
                            validators = report.validators,
                            sent = report.sent,
                            "Dispatch period complete"
                        );
                    }
                    Err(e) => {
                        error!("Dispatch period aborted, could not list sites: {:#}", e);
                    }
                }
            }
        })
    }
}
