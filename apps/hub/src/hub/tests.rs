//! End-to-end tests for the hub core
//!
//! These drive a real [`Hub`] over a real libsql store, with in-process
//! sessions standing in for sockets:
//! - Signup (fresh key, known key, bad signature, second signup)
//! - Dispatch fan-out and its backpressure accounting
//! - Reply ingestion (recorded, unknown id, bad signature, duplicates)
//! - Disconnects, reconnects and stale entries
use super::*;
use crate::database::models::{MonitoredSite, NewTick, Tick, Validator};
use crate::database::{LibsqlStore, open_store};
use anyhow::{Result, bail};
use async_trait::async_trait;
use hubwire::crypto::{generate_keypair, sign_message, signup_message, validate_reply_message};
use hubwire::protocol::encode;
use hubwire::{CheckStatus, HubMessage, KeyPair, SignupRequest, ValidateReply, ValidatorMessage};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;

const REWARD: u32 = 100;

/// Helper to create a hub over a throwaway database
async fn create_test_hub() -> Result<(Hub, Arc<LibsqlStore>, TempDir)> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("hub.db");
    let store = Arc::new(open_store(&db_path.to_string_lossy()).await?);
    let hub = Hub::new(store.clone(), REWARD);
    Ok((hub, store, temp_dir))
}

fn settings(max_pending_per_validator: usize) -> DispatchSettings {
    DispatchSettings { interval: Duration::from_secs(60), max_pending_per_validator }
}

/// A validator on the far side of an in-process session
struct TestValidator {
    keypair: KeyPair,
    session: Session,
    rx: mpsc::Receiver<HubMessage>,
}

impl TestValidator {
    fn new() -> Self {
        Self::with_keypair(generate_keypair(), 16)
    }

    fn with_keypair(keypair: KeyPair, capacity: usize) -> Self {
        let (session, rx) = Session::channel(capacity);
        Self { keypair, session, rx }
    }

    /// Same identity, new socket
    fn reconnect(&self) -> Self {
        Self::with_keypair(self.keypair.clone(), 16)
    }

    fn signup_frame(&self) -> (Uuid, String) {
        let request_id = Uuid::now_v7();
        let public_key = self.keypair.public_key_hex();
        let frame = ValidatorMessage::Signup(SignupRequest {
            signed_message: sign_message(&signup_message(&request_id, &public_key), &self.keypair),
            public_key,
            request_id,
            ip: "10.0.0.7".to_string(),
        });
        (request_id, encode(&frame).unwrap())
    }

    fn reply_frame(&self, request_id: Uuid, status: CheckStatus, latency: u64) -> String {
        let frame = ValidatorMessage::Validate(ValidateReply {
            request_id,
            status,
            latency,
            signed_message: sign_message(&validate_reply_message(&request_id), &self.keypair),
        });
        encode(&frame).unwrap()
    }

    async fn sign_up(&mut self, hub: &Hub) -> String {
        let (request_id, frame) = self.signup_frame();
        let outcome = hub.handle_frame(&self.session, &frame).await;
        let FrameOutcome::Signup(SignupOutcome::Admitted { validator_id, .. }) = outcome else {
            panic!("signup not admitted: {outcome:?}");
        };

        match self.rx.try_recv() {
            Ok(HubMessage::Signup(ack)) => {
                assert_eq!(ack.request_id, request_id);
                assert_eq!(ack.validator_id, validator_id);
            }
            other => panic!("expected signup ack, got {other:?}"),
        }
        validator_id
    }

    fn next_request(&mut self) -> (String, Uuid) {
        match self.rx.try_recv() {
            Ok(HubMessage::Validate(req)) => (req.url, req.request_id),
            other => panic!("expected validate request, got {other:?}"),
        }
    }
}

/// Store whose every call fails
struct OfflineStore;

#[async_trait]
impl Store for OfflineStore {
    async fn find_validator_by_public_key(&self, _: &str) -> Result<Option<Validator>> {
        bail!("store offline")
    }
    async fn create_validator(&self, _: &str, _: &str, _: &str) -> Result<Validator> {
        bail!("store offline")
    }
    async fn get_validator(&self, _: &str) -> Result<Option<Validator>> {
        bail!("store offline")
    }
    async fn list_active_sites(&self) -> Result<Vec<MonitoredSite>> {
        bail!("store offline")
    }
    async fn create_site(&self, _: &str, _: &str) -> Result<MonitoredSite> {
        bail!("store offline")
    }
    async fn set_site_disabled(&self, _: &str, _: bool) -> Result<()> {
        bail!("store offline")
    }
    async fn record_observation(&self, _: &NewTick, _: u32) -> Result<String> {
        bail!("store offline")
    }
    async fn recent_ticks(&self, _: &str, _: usize) -> Result<Vec<Tick>> {
        bail!("store offline")
    }
}

#[tokio::test]
async fn test_fresh_key_signup_creates_validator() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let mut validator = TestValidator::new();

    let validator_id = validator.sign_up(&hub).await;

    let record = store
        .find_validator_by_public_key(&validator.keypair.public_key_hex())
        .await?
        .expect("validator row");
    assert_eq!(record.id, validator_id);
    assert_eq!(record.pending_payouts, 0);
    assert_eq!(record.location, "unknown");
    assert_eq!(record.ip, "10.0.0.7");

    let active = hub.registry().list_active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].validator_id, validator_id);
    Ok(())
}

#[tokio::test]
async fn test_known_key_signup_reuses_record() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let mut first = TestValidator::new();
    let first_id = first.sign_up(&hub).await;
    hub.disconnect(&first.session).await;

    let mut second = first.reconnect();
    let (_, frame) = second.signup_frame();
    let outcome = hub.handle_frame(&second.session, &frame).await;

    assert!(matches!(
        outcome,
        FrameOutcome::Signup(SignupOutcome::Admitted { ref validator_id, created: false }) if *validator_id == first_id
    ));
    assert!(matches!(second.rx.try_recv(), Ok(HubMessage::Signup(_))));
    assert_eq!(store.count_validators().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_uppercase_key_maps_to_same_validator() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;
    hub.disconnect(&validator.session).await;

    let again = validator.reconnect();
    let request_id = Uuid::now_v7();
    let public_key = again.keypair.public_key_hex().to_uppercase();
    let frame = encode(&ValidatorMessage::Signup(SignupRequest {
        signed_message: sign_message(&signup_message(&request_id, &public_key), &again.keypair),
        public_key,
        request_id,
        ip: "10.0.0.7".to_string(),
    }))?;

    let outcome = hub.handle_frame(&again.session, &frame).await;
    assert!(matches!(
        outcome,
        FrameOutcome::Signup(SignupOutcome::Admitted { validator_id: ref id, .. }) if *id == validator_id
    ));
    assert_eq!(store.count_validators().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_bad_signup_signature_is_dropped_silently() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let mut validator = TestValidator::new();
    let impostor = generate_keypair();

    let request_id = Uuid::now_v7();
    let public_key = validator.keypair.public_key_hex();
    let frame = encode(&ValidatorMessage::Signup(SignupRequest {
        signed_message: sign_message(&signup_message(&request_id, &public_key), &impostor),
        public_key: public_key.clone(),
        request_id,
        ip: "10.0.0.7".to_string(),
    }))?;

    let outcome = hub.handle_frame(&validator.session, &frame).await;

    assert!(matches!(outcome, FrameOutcome::Signup(SignupOutcome::Dropped(DropReason::BadSignature))));
    assert!(validator.rx.try_recv().is_err());
    assert!(hub.registry().is_empty().await);
    assert!(store.find_validator_by_public_key(&public_key).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_second_signup_on_session_is_dropped() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;

    // A different identity on the already admitted session
    let other = TestValidator::new();
    let (_, frame) = other.signup_frame();
    let outcome = hub.handle_frame(&validator.session, &frame).await;

    assert!(matches!(outcome, FrameOutcome::Signup(SignupOutcome::Dropped(DropReason::AlreadySignedUp))));
    assert!(validator.rx.try_recv().is_err());
    assert_eq!(hub.registry().len().await, 1);
    assert_eq!(store.count_validators().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_signup_with_store_offline_is_dropped() -> Result<()> {
    let hub = Hub::new(Arc::new(OfflineStore), REWARD);
    let mut validator = TestValidator::new();
    let (_, frame) = validator.signup_frame();

    let outcome = hub.handle_frame(&validator.session, &frame).await;

    assert!(matches!(outcome, FrameOutcome::Signup(SignupOutcome::Dropped(DropReason::StoreFailed))));
    assert!(validator.rx.try_recv().is_err());
    assert!(hub.registry().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_and_good_reply_records_tick() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report, DispatchReport { sites: 1, validators: 1, sent: 1, saturated: 0, closed: 0 });

    let (url, request_id) = validator.next_request();
    assert_eq!(url, "https://example.com");
    assert_eq!(hub.correlation().len().await, 1);

    let reply = validator.reply_frame(request_id, CheckStatus::Good, 120);
    let outcome = hub.handle_frame(&validator.session, &reply).await;
    assert!(matches!(outcome, FrameOutcome::Ingest(IngestOutcome::Recorded { .. })));

    let ticks = store.recent_ticks(&site.id, 10).await?;
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].status, CheckStatus::Good);
    assert_eq!(ticks[0].latency_ms, 120);
    assert_eq!(ticks[0].validator_id, validator_id);

    let record = store.get_validator(&validator_id).await?.expect("validator row");
    assert_eq!(record.pending_payouts, i64::from(REWARD));
    assert!(hub.correlation().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_reply_with_unknown_request_id_is_dropped() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;

    let never_sent = Uuid::now_v7();
    let reply = validator.reply_frame(never_sent, CheckStatus::Good, 120);
    let outcome = hub.handle_frame(&validator.session, &reply).await;

    assert!(matches!(outcome, FrameOutcome::UnknownRequest(id) if id == never_sent));
    assert!(store.recent_ticks(&site.id, 10).await?.is_empty());
    assert_eq!(store.get_validator(&validator_id).await?.unwrap().pending_payouts, 0);
    Ok(())
}

#[tokio::test]
async fn test_reply_with_bad_signature_changes_nothing() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;

    hub.dispatcher(settings(1024)).run_period().await?;
    let (_, request_id) = validator.next_request();

    // Signed by a key the request was not addressed to
    let forger = TestValidator::with_keypair(generate_keypair(), 1);
    let reply = forger.reply_frame(request_id, CheckStatus::Good, 120);
    let outcome = hub.handle_frame(&validator.session, &reply).await;

    assert!(matches!(outcome, FrameOutcome::Ingest(IngestOutcome::BadSignature)));
    assert!(store.recent_ticks(&site.id, 10).await?.is_empty());
    assert_eq!(store.get_validator(&validator_id).await?.unwrap().pending_payouts, 0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_reply_is_credited_once() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;

    hub.dispatcher(settings(1024)).run_period().await?;
    let (_, request_id) = validator.next_request();
    let reply = validator.reply_frame(request_id, CheckStatus::Bad, 1000);

    let first = hub.handle_frame(&validator.session, &reply).await;
    let second = hub.handle_frame(&validator.session, &reply).await;

    assert!(matches!(first, FrameOutcome::Ingest(IngestOutcome::Recorded { .. })));
    assert!(matches!(second, FrameOutcome::UnknownRequest(_)));
    assert_eq!(store.recent_ticks(&site.id, 10).await?.len(), 1);
    assert_eq!(store.get_validator(&validator_id).await?.unwrap().pending_payouts, i64::from(REWARD));
    Ok(())
}

#[tokio::test]
async fn test_two_validators_same_site_each_credited_once() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut alice = TestValidator::new();
    let mut bob = TestValidator::new();
    let alice_id = alice.sign_up(&hub).await;
    let bob_id = bob.sign_up(&hub).await;

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report.sent, 2);

    let (_, alice_request) = alice.next_request();
    let (_, bob_request) = bob.next_request();
    assert_ne!(alice_request, bob_request);

    let alice_reply = alice.reply_frame(alice_request, CheckStatus::Good, 80);
    let bob_reply = bob.reply_frame(bob_request, CheckStatus::Bad, 1000);
    hub.handle_frame(&alice.session, &alice_reply).await;
    hub.handle_frame(&bob.session, &bob_reply).await;

    let ticks = store.recent_ticks(&site.id, 10).await?;
    assert_eq!(ticks.len(), 2);
    let alice_tick = ticks.iter().find(|t| t.validator_id == alice_id).expect("alice tick");
    let bob_tick = ticks.iter().find(|t| t.validator_id == bob_id).expect("bob tick");
    assert_eq!((alice_tick.status, alice_tick.latency_ms), (CheckStatus::Good, 80));
    assert_eq!((bob_tick.status, bob_tick.latency_ms), (CheckStatus::Bad, 1000));

    assert_eq!(store.get_validator(&alice_id).await?.unwrap().pending_payouts, i64::from(REWARD));
    assert_eq!(store.get_validator(&bob_id).await?.unwrap().pending_payouts, i64::from(REWARD));
    Ok(())
}

#[tokio::test]
async fn test_reply_is_attributed_to_addressed_validator() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut alice = TestValidator::new();
    let mut bob = TestValidator::new();
    let alice_id = alice.sign_up(&hub).await;
    let bob_id = bob.sign_up(&hub).await;

    hub.dispatcher(settings(1024)).run_period().await?;
    let (_, alice_request) = alice.next_request();

    // Alice's signed reply relayed over Bob's session still credits Alice
    let reply = alice.reply_frame(alice_request, CheckStatus::Good, 50);
    let outcome = hub.handle_frame(&bob.session, &reply).await;

    assert!(matches!(outcome, FrameOutcome::Ingest(IngestOutcome::Recorded { .. })));
    let ticks = store.recent_ticks(&site.id, 10).await?;
    assert_eq!(ticks[0].validator_id, alice_id);
    assert_eq!(store.get_validator(&bob_id).await?.unwrap().pending_payouts, 0);
    Ok(())
}

#[tokio::test]
async fn test_disconnected_validator_is_not_dispatched() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;

    hub.disconnect(&validator.session).await;
    hub.disconnect(&validator.session).await;

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report.validators, 0);
    assert_eq!(report.sent, 0);
    assert!(validator.rx.try_recv().is_err());
    assert!(hub.correlation().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_moves_dispatch_to_new_session() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    let mut old = TestValidator::new();
    let validator_id = old.sign_up(&hub).await;

    // New socket signs up before the old one is noticed as closed
    let mut new = old.reconnect();
    assert_eq!(new.sign_up(&hub).await, validator_id);
    assert_eq!(hub.registry().len().await, 1);

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report.sent, 1);
    assert!(old.rx.try_recv().is_err());
    new.next_request();

    // The old socket closing later leaves the new one registered
    hub.disconnect(&old.session).await;
    assert!(hub.registry().contains(new.session.id()).await);
    Ok(())
}

#[tokio::test]
async fn test_replaced_session_can_sign_up_again() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    let mut old = TestValidator::new();
    let validator_id = old.sign_up(&hub).await;
    let mut new = old.reconnect();
    new.sign_up(&hub).await;

    // The replaced session is no longer admitted, so its signup is fresh
    assert!(!hub.registry().contains(old.session.id()).await);
    assert_eq!(old.sign_up(&hub).await, validator_id);
    assert!(!hub.registry().contains(new.session.id()).await);
    assert_eq!(hub.registry().len().await, 1);

    hub.dispatcher(settings(1024)).run_period().await?;
    old.next_request();
    assert!(new.rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_reply_with_oversized_latency_is_dropped() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;

    hub.dispatcher(settings(1024)).run_period().await?;
    let (_, request_id) = validator.next_request();
    let reply = validator.reply_frame(request_id, CheckStatus::Good, u64::MAX);
    let outcome = hub.handle_frame(&validator.session, &reply).await;

    assert!(matches!(outcome, FrameOutcome::Ingest(IngestOutcome::LatencyOutOfRange)));
    assert!(store.recent_ticks(&site.id, 10).await?.is_empty());
    assert_eq!(store.get_validator(&validator_id).await?.unwrap().pending_payouts, 0);
    assert!(hub.correlation().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_disabled_site_is_not_dispatched() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    store.set_site_disabled(&site.id, true).await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report.sites, 0);
    assert_eq!(report.sent, 0);
    assert!(validator.rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_site_disabled_mid_period_is_still_paid() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    let validator_id = validator.sign_up(&hub).await;

    hub.dispatcher(settings(1024)).run_period().await?;
    let (_, request_id) = validator.next_request();
    store.set_site_disabled(&site.id, true).await?;

    let reply = validator.reply_frame(request_id, CheckStatus::Good, 95);
    let outcome = hub.handle_frame(&validator.session, &reply).await;

    assert!(matches!(outcome, FrameOutcome::Ingest(IngestOutcome::Recorded { .. })));
    assert_eq!(store.get_validator(&validator_id).await?.unwrap().pending_payouts, i64::from(REWARD));
    Ok(())
}

#[tokio::test]
async fn test_full_queue_counts_as_saturated() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    store.create_site("https://example.org", "owner").await?;
    store.create_site("https://example.net", "owner").await?;

    // Room for the signup ack only, drained by sign_up
    let mut validator = TestValidator::with_keypair(generate_keypair(), 1);
    validator.sign_up(&hub).await;

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report.sent, 1);
    assert_eq!(report.saturated, 2);
    // Entries of unsent requests are cancelled
    assert_eq!(hub.correlation().len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_pending_budget_limits_outstanding_checks() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    store.create_site("https://example.org", "owner").await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;
    let dispatcher = hub.dispatcher(settings(3));

    let first = dispatcher.run_period().await?;
    assert_eq!((first.sent, first.saturated), (2, 0));

    // Nothing answered yet: only one more check fits the budget
    let second = dispatcher.run_period().await?;
    assert_eq!((second.sent, second.saturated), (1, 1));
    assert_eq!(hub.correlation().pending_by_validator().await.values().sum::<usize>(), 3);
    Ok(())
}

#[tokio::test]
async fn test_closed_queue_cancels_entry() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;

    // Writer gone, registry not yet told
    let TestValidator { session, rx, .. } = validator;
    drop(rx);

    let report = hub.dispatcher(settings(1024)).run_period().await?;
    assert_eq!(report.closed, 1);
    assert_eq!(report.sent, 0);
    assert!(hub.correlation().is_empty().await);
    assert!(hub.registry().contains(session.id()).await);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_with_store_offline_fails_period() {
    let hub = Hub::new(Arc::new(OfflineStore), REWARD);
    assert!(hub.dispatcher(settings(1024)).run_period().await.is_err());
}

#[tokio::test]
async fn test_stale_entry_reply_is_unknown() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    let site = store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;

    hub.dispatcher(settings(1024)).run_period().await?;
    let (_, request_id) = validator.next_request();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let evicted = hub.correlation().evict_stale(Duration::from_millis(5)).await;
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].request_id, request_id);

    let reply = validator.reply_frame(request_id, CheckStatus::Good, 120);
    let outcome = hub.handle_frame(&validator.session, &reply).await;
    assert!(matches!(outcome, FrameOutcome::UnknownRequest(_)));
    assert!(store.recent_ticks(&site.id, 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() -> Result<()> {
    let (hub, _store, _dir) = create_test_hub().await?;
    let validator = TestValidator::new();

    for frame in [
        "not json",
        r#"{"type":"ping","data":{}}"#,
        r#"{"type":"validate","data":{"requestId":"x"}}"#,
    ] {
        let outcome = hub.handle_frame(&validator.session, frame).await;
        assert!(matches!(outcome, FrameOutcome::Malformed(HubError::Wire(_))), "{frame}");
    }
    assert!(hub.registry().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_dispatcher_first_period_runs_immediately() -> Result<()> {
    let (hub, store, _dir) = create_test_hub().await?;
    store.create_site("https://example.com", "owner").await?;
    let mut validator = TestValidator::new();
    validator.sign_up(&hub).await;

    let handle = hub.dispatcher(settings(1024)).spawn();
    let frame = tokio::time::timeout(Duration::from_secs(5), validator.rx.recv()).await?;
    handle.abort();

    assert!(matches!(frame, Some(HubMessage::Validate(ref req)) if req.url == "https://example.com"));
    Ok(())
}
