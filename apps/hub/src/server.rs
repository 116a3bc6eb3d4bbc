//! WebSocket endpoint validators connect to
//!
//! One socket is one [`Session`]: a reader loop feeding frames to the hub
//! in order, and a writer task draining the session's bounded queue.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use hubwire::protocol::{MAX_FRAME_BYTES, encode};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::hub::{Hub, Session};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    /// Capacity of each session's outbound queue
    pub outbound_capacity: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(hubwire::DEFAULT_WS_PATH, get(websocket_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "validators": state.hub.registry().len().await,
        "pending": state.hub.correlation().len().await,
    }))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    debug!(%peer, "WebSocket upgrade requested");
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, peer, state))
        .into_response()
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (session, mut outbound_rx) = Session::channel(state.outbound_capacity);
    let (mut sender, mut receiver) = socket.split();
    let connection = session.id();

    info!(%connection, %peer, "Validator socket opened");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(%connection, "Failed to encode outbound frame: {}", e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!(%connection, "Socket write failed: {}", e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                state.hub.handle_frame(&session, &text).await;
            }
            Ok(Message::Binary(_)) => {
                warn!(%connection, "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%connection, "Socket read failed: {}", e);
                break;
            }
        }
    }

    state.hub.disconnect(&session).await;
    writer.abort();
    info!(%connection, %peer, "Validator socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{LibsqlStore, Store, open_store};
    use crate::hub::DispatchSettings;
    use anyhow::Result;
    use hubwire::crypto::{generate_keypair, sign_message, signup_message, validate_reply_message};
    use hubwire::protocol::decode;
    use hubwire::{CheckStatus, HubMessage, SignupRequest, ValidateReply, ValidatorMessage};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use uuid::Uuid;

    async fn start_server() -> Result<(SocketAddr, Arc<Hub>, Arc<LibsqlStore>, TempDir)> {
        let dir = tempdir()?;
        let store = Arc::new(open_store(&dir.path().join("hub.db").to_string_lossy()).await?);
        let hub = Arc::new(Hub::new(store.clone(), 100));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = AppState { hub: Arc::clone(&hub), outbound_capacity: 16 };
        tokio::spawn(serve(listener, state, std::future::pending()));

        Ok((addr, hub, store, dir))
    }

    /// Poll `check` until it holds or two seconds pass
    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_health_endpoint() -> Result<()> {
        let (addr, _hub, _store, _dir) = start_server().await?;

        let mut stream = tokio::net::TcpStream::connect(addr).await?;
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("\"status\":\"ok\""));
        Ok(())
    }

    #[tokio::test]
    async fn test_validator_round_trip_over_socket() -> Result<()> {
        let (addr, hub, store, _dir) = start_server().await?;
        let site = store.create_site("https://example.com", "owner").await?;
        let keypair = generate_keypair();

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await?;

        let request_id = Uuid::now_v7();
        let public_key = keypair.public_key_hex();
        let signup = ValidatorMessage::Signup(SignupRequest {
            signed_message: sign_message(&signup_message(&request_id, &public_key), &keypair),
            public_key,
            request_id,
            ip: "127.0.0.1".to_string(),
        });
        ws.send(WsMessage::Text(encode(&signup)?)).await?;

        let Some(WsMessage::Text(ack)) = ws.next().await.transpose()? else {
            panic!("expected signup ack");
        };
        let HubMessage::Signup(ack) = decode::<HubMessage>(&ack)? else {
            panic!("expected signup ack, got {ack}");
        };
        assert_eq!(ack.request_id, request_id);

        let settings = DispatchSettings { interval: Duration::from_secs(60), max_pending_per_validator: 8 };
        assert_eq!(hub.dispatcher(settings).run_period().await?.sent, 1);

        let Some(WsMessage::Text(work)) = ws.next().await.transpose()? else {
            panic!("expected validate request");
        };
        let HubMessage::Validate(work) = decode::<HubMessage>(&work)? else {
            panic!("expected validate request, got {work}");
        };
        assert_eq!(work.url, "https://example.com");

        let reply = ValidatorMessage::Validate(ValidateReply {
            request_id: work.request_id,
            status: CheckStatus::Good,
            latency: 120,
            signed_message: sign_message(&validate_reply_message(&work.request_id), &keypair),
        });
        ws.send(WsMessage::Text(encode(&reply)?)).await?;

        let recorded = eventually(|| {
            let store = Arc::clone(&store);
            let site_id = site.id.clone();
            async move { store.recent_ticks(&site_id, 10).await.map(|t| t.len() == 1).unwrap_or(false) }
        })
        .await;
        assert!(recorded);

        let validator = store.get_validator(&ack.validator_id).await?.expect("validator row");
        assert_eq!(validator.pending_payouts, 100);

        ws.close(None).await?;
        let gone = eventually(|| {
            let hub = Arc::clone(&hub);
            async move { hub.registry().is_empty().await }
        })
        .await;
        assert!(gone);
        Ok(())
    }
}
