use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, warn};

use syr_core::{CredentialVerifier, RoutingEngine, StoreError};
use syr_types::api::Claims;
use syr_types::events::{GatewayCommand, GatewayEvent};
use syr_types::models::{ConnectionId, Identity};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// The first frame must authenticate within this window.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a live connection needs from the rest of the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub verifier: CredentialVerifier,
    pub router: RoutingEngine,
    pub jwt_secret: Arc<str>,
}

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Handle a single WebSocket connection: handshake, then relay events
/// out and commands in until either side goes away.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for identify/authenticate
    let identity = match wait_for_identify(&mut sender, &mut receiver, &ctx).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", identity.username, identity.service_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready { user: identity.clone() };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, ctx, identity).await;
}

async fn run_connection_loop(mut sender: WsSender, mut receiver: WsReceiver, ctx: GatewayContext, identity: Identity) {
    // Registering binds presence and pushes the roster to everyone
    let (conn_id, mut outbound_rx) = ctx.dispatcher.connect(&identity).await;

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbound_rx.recv() => {
                    let Some(payload) = result else { break };
                    if sender.send(Message::Text(payload.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, conn_id, &recv_identity, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.service_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", identity.username, identity.service_id);
}

async fn wait_for_identify(sender: &mut WsSender, receiver: &mut WsReceiver, ctx: &GatewayContext) -> Option<Identity> {
    let handshake = async {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };

            let result = match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(cmd) => identify(ctx, cmd).await,
                Err(_) => Err(("not_identified", "identify first".to_string())),
            };

            match result {
                Ok(identity) => return Some(identity),
                Err((code, error)) => {
                    let reply = GatewayEvent::CommandError {
                        request_id: None,
                        code: code.to_string(),
                        error,
                    };
                    if send_event(&mut *sender, &reply).await.is_err() {
                        return None;
                    }
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, handshake).await.ok().flatten()
}

/// Resolve a handshake command to an identity, or an error code and message
/// for the `command_error` reply.
async fn identify(ctx: &GatewayContext, cmd: GatewayCommand) -> Result<Identity, (&'static str, String)> {
    match cmd {
        GatewayCommand::Identify { token } => decode::<Claims>(
            &token,
            &DecodingKey::from_secret(ctx.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| Identity::from(data.claims))
        .map_err(|_| ("invalid_token", "invalid or expired token".to_string())),

        GatewayCommand::Authenticate { username, password, service } => ctx
            .verifier
            .verify(&username, &password, &service)
            .await
            .map_err(|e| (e.code(), e.to_string())),

        _ => Err(("not_identified", "identify first".to_string())),
    }
}

async fn handle_command(ctx: &GatewayContext, conn_id: ConnectionId, identity: &Identity, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Identify { .. } | GatewayCommand::Authenticate { .. } => {} // Already handled

        GatewayCommand::SendMessage { request_id, mut message } => {
            // Sender fields default to the authenticated identity
            if message.from_user.trim().is_empty() {
                message.from_user = identity.username.clone();
            }
            if message.from_service.trim().is_empty() {
                message.from_service = identity.service_id.clone();
            }

            let reply = match ctx.dispatcher.submit_and_publish(&ctx.router, message).await {
                Ok(routed) => GatewayEvent::MessageAck {
                    request_id,
                    message: routed.message,
                },
                Err(e) => GatewayEvent::CommandError {
                    request_id,
                    code: e.code().to_string(),
                    error: e.to_string(),
                },
            };
            ctx.dispatcher.send_to(conn_id, &reply).await;
        }

        GatewayCommand::MarkRead { message_id } => {
            match ctx.router.store().mark_read(message_id, identity.id).await {
                Ok(message) => {
                    let event = GatewayEvent::MessageRead {
                        message_id,
                        user_id: identity.id,
                    };
                    ctx.dispatcher.deliver(&message.audience(), &event).await;
                }
                Err(e) => {
                    let (code, error) = match e {
                        StoreError::NotFound(_) => ("not_found", e.to_string()),
                        other => {
                            warn!("mark_read {} failed: {}", message_id, other);
                            ("unavailable", "store unavailable".to_string())
                        }
                    };
                    let reply = GatewayEvent::CommandError {
                        request_id: None,
                        code: code.to_string(),
                        error,
                    };
                    ctx.dispatcher.send_to(conn_id, &reply).await;
                }
            }
        }
    }
}

async fn send_event(sender: &mut WsSender, event: &GatewayEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}
