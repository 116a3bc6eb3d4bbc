//! Hub connection for a validator
//!
//! Connect, sign up, answer `validate` requests with signed results, and
//! reconnect with backoff whenever the hub goes away.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::{SinkExt, StreamExt};
use hubwire::crypto::{sign_message, signup_message, validate_reply_message};
use hubwire::protocol::{decode, encode};
use hubwire::{HubMessage, KeyPair, SignupRequest, ValidateReply, ValidatorMessage};
use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checker::{Checker, Probe};
use crate::config::Config;

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Replies that may wait for the socket writer
const OUTBOUND_QUEUE: usize = 256;

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, current: initial }
    }

    /// Delay to wait now; doubles the next one up to `max`
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Default)]
struct Registration {
    validator_id: Option<String>,
    /// Request id of the signup still waiting for its ack
    pending_signup: Option<Uuid>,
}

pub struct ValidatorClient {
    hub_url: String,
    ip: String,
    keypair: Arc<KeyPair>,
    checker: Arc<dyn Checker>,
    registration: RwLock<Registration>,
    backoff: Backoff,
    heartbeat: Duration,
}

impl ValidatorClient {
    pub fn new(config: &Config, keypair: KeyPair, checker: Arc<dyn Checker>) -> Self {
        Self {
            hub_url: config.hub.url.clone(),
            ip: config.identity.ip.clone(),
            keypair: Arc::new(keypair),
            checker,
            registration: RwLock::new(Registration::default()),
            backoff: Backoff::new(config.reconnect.initial(), config.reconnect.max()),
            heartbeat: config.heartbeat(),
        }
    }

    /// Id the hub assigned on the current connection, if signed up
    pub async fn validator_id(&self) -> Option<String> {
        self.registration.read().await.validator_id.clone()
    }

    pub fn signup_request(&self, request_id: Uuid) -> SignupRequest {
        let public_key = self.keypair.public_key_hex();
        SignupRequest {
            signed_message: sign_message(&signup_message(&request_id, &public_key), &self.keypair),
            public_key,
            request_id,
            ip: self.ip.clone(),
        }
    }

    /// Stay connected to the hub forever
    pub async fn run(&self) {
        let mut backoff = self.backoff.clone();

        loop {
            match self.connect().await {
                Ok(socket) => {
                    backoff.reset();
                    match self.run_session(socket).await {
                        Ok(()) => warn!("Hub closed the connection"),
                        Err(e) => warn!("Connection to hub lost: {:#}", e),
                    }
                }
                Err(e) => warn!("Could not reach hub: {:#}", e),
            }

            let delay = backoff.next_delay();
            info!("Reconnecting in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect(&self) -> Result<HubSocket> {
        let (socket, _) = connect_async(self.hub_url.as_str())
            .await
            .with_context(|| format!("connecting to {}", self.hub_url))?;
        info!("Connected to hub at {}", self.hub_url);
        Ok(socket)
    }

    /// Sign up on a fresh connection and serve it until it closes
    async fn run_session(&self, socket: HubSocket) -> Result<()> {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<ValidatorMessage>(OUTBOUND_QUEUE);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match encode(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode frame for hub: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!("Write to hub failed: {}", e);
                    break;
                }
            }
        });

        let request_id = Uuid::now_v7();
        {
            let mut registration = self.registration.write().await;
            registration.validator_id = None;
            registration.pending_signup = Some(request_id);
        }
        info!(public_key = %self.keypair.public_key_hex(), %request_id, "Sending signup");
        tx.send(ValidatorMessage::Signup(self.signup_request(request_id)))
            .await
            .map_err(|_| anyhow!("connection closed before signup was sent"))?;

        let result = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match decode::<HubMessage>(&text) {
                    Ok(message) => self.handle_message(message, &tx).await,
                    Err(e) => warn!("Ignoring malformed frame from hub: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(anyhow::Error::from(e).context("reading from hub")),
            }
        };

        writer.abort();
        *self.registration.write().await = Registration::default();
        result
    }

    async fn handle_message(&self, message: HubMessage, outbound: &mpsc::Sender<ValidatorMessage>) {
        match message {
            HubMessage::Signup(ack) => {
                let mut registration = self.registration.write().await;
                if registration.pending_signup != Some(ack.request_id) {
                    warn!(request_id = %ack.request_id, "Ignoring signup ack for an unknown request");
                    return;
                }
                registration.pending_signup = None;
                info!("Signed up as validator {}", ack.validator_id);
                registration.validator_id = Some(ack.validator_id);
            }
            HubMessage::Validate(request) => {
                debug!(url = %request.url, request_id = %request.request_id, "Check requested");
                let checker = Arc::clone(&self.checker);
                let keypair = Arc::clone(&self.keypair);
                let outbound = outbound.clone();

                tokio::spawn(async move {
                    let probe = checker.check(&request.url).await;
                    info!(
                        url = %request.url,
                        status = %probe.status,
                        latency_ms = probe.latency_ms,
                        "Check finished"
                    );

                    let reply = signed_reply(&keypair, request.request_id, &probe);
                    if outbound.send(ValidatorMessage::Validate(reply)).await.is_err() {
                        debug!(request_id = %request.request_id, "Connection closed before reply was sent");
                    }
                });
            }
        }
    }

    /// Log whether we are signed up every heartbeat interval
    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(client.heartbeat);

            loop {
                interval.tick().await;
                match client.validator_id().await {
                    Some(id) => info!("Validator {} is active", id),
                    None => info!("Validator not yet registered"),
                }
            }
        })
    }
}

fn signed_reply(keypair: &KeyPair, request_id: Uuid, probe: &Probe) -> ValidateReply {
    ValidateReply {
        request_id,
        status: probe.status,
        latency: probe.latency_ms,
        signed_message: sign_message(&validate_reply_message(&request_id), keypair),
    }
}
