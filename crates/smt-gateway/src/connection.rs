use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use smt_db::{DbError, MessageStore};
use smt_types::GLOBAL_SCOPE;
use smt_types::api::Identity;
use smt_types::events::WireMessage;
use smt_types::models::Message as ChatMessage;

use crate::Gateway;
use crate::error::{GatewayError, TransportError};
use crate::registry::{Outbound, Registration};

/// Longest message body accepted from a client, in bytes.
pub const MAX_BODY_LEN: usize = 4096;

type Sender = SplitSink<WebSocket, Message>;
type Receiver = SplitStream<WebSocket>;

/// Run one live connection for an identity already resolved by the session
/// gate. Admits it, pushes the global replay, then runs the inbound and
/// outbound halves until either side ends.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway, identity: Identity) {
    let (mut sender, receiver) = socket.split();

    let (registration, outbound) = match gateway.registry().admit(&identity.username) {
        Ok(admitted) => admitted,
        Err(e) => {
            warn!("Refusing live connection: {}", e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!(
        "{} ({}) connected [{}]",
        identity.username, identity.user_id, registration.conn_id
    );

    // Admission happens before the replay read so nothing published in between
    // is lost; such a message may show up in both.
    if let Err(e) = send_replay(&mut sender, &gateway).await {
        warn!("{}: replay failed, closing: {}", identity.username, e);
        gateway.registry().remove(&registration);
        return;
    }

    run_connection_loop(sender, receiver, gateway.clone(), registration.clone(), outbound).await;

    gateway.registry().remove(&registration);
    info!(
        "{} ({}) disconnected [{}]",
        identity.username, identity.user_id, registration.conn_id
    );
}

async fn send_replay(sender: &mut Sender, gateway: &Gateway) -> Result<usize, GatewayError> {
    let db = gateway.db().clone();
    let limit = gateway.config().replay_limit;
    let history = tokio::task::spawn_blocking(move || db.replay(GLOBAL_SCOPE, limit))
        .await
        .map_err(|e| GatewayError::Join(e.to_string()))??;

    let timeout = gateway.config().write_timeout;
    for message in &history {
        let frame = Utf8Bytes::from(serde_json::to_string(&WireMessage::from(message))?);
        write_frame(sender, Message::Text(frame), timeout).await?;
    }

    debug!("Replayed {} global message(s)", history.len());
    Ok(history.len())
}

async fn run_connection_loop(
    mut sender: Sender,
    mut receiver: Receiver,
    gateway: Gateway,
    registration: Registration,
    mut outbound: Outbound,
) {
    let write_timeout = gateway.config().write_timeout;
    let heartbeat_interval = gateway.config().heartbeat_interval;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Drain this connection's queue -> client, with heartbeat.
    let send_name = registration.username.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    // None: the registry dropped us (overflow or failed delivery).
                    let Some(frame) = frame else { break };
                    if let Err(e) = write_frame(&mut sender, Message::Text(frame), write_timeout).await {
                        warn!("{}: write failed: {}", send_name, e);
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{}: heartbeat timeout (missed {} pongs), dropping connection", send_name, missed_heartbeats);
                            break;
                        }
                    }
                    if write_frame(&mut sender, Message::Ping(Default::default()), write_timeout).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sender.send(Message::Close(None)).await;
    });

    // Read messages from client
    let recv_gateway = gateway.clone();
    let username = registration.username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_inbound(&recv_gateway, &username, &text).await;
                }
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
}

/// Validate, persist and fan out one client frame. Every failure is logged and
/// affects only this frame; the connection stays open.
async fn handle_inbound(gateway: &Gateway, username: &str, text: &str) {
    let wire = match serde_json::from_str::<WireMessage>(text) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(
                "{} sent a malformed frame: {} -- raw: {}",
                username,
                e,
                truncate(text, 200)
            );
            return;
        }
    };

    if wire.message.trim().is_empty() {
        debug!("{} sent an empty message, ignoring", username);
        return;
    }
    if wire.message.len() > MAX_BODY_LEN {
        warn!(
            "{} sent a {} byte message (max {}), ignoring",
            username,
            wire.message.len(),
            MAX_BODY_LEN
        );
        return;
    }

    if wire.chat_recv_id != GLOBAL_SCOPE {
        match check_scope(gateway, username, wire.chat_recv_id).await {
            Ok(()) => {}
            Err(GatewayError::Storage(DbError::NotMember(chat_id))) => {
                warn!("{} is not a member of chat {}, dropping message", username, chat_id);
                return;
            }
            Err(e) => {
                warn!("{}: cannot send to chat {}: {}", username, wire.chat_recv_id, e);
                return;
            }
        }
    } else {
        debug!("Message sent to {} by {}", smt_types::GLOBAL_SCOPE_NAME, username);
    }

    // The claimed author is ignored: messages are always attributed to the
    // admitted identity.
    let message = ChatMessage::new(username, wire.message, wire.chat_recv_id);
    if let Err(e) = gateway.broadcaster().send(message).await {
        error!("{}: message not delivered: {}", username, e);
    }
}

async fn check_scope(gateway: &Gateway, username: &str, chat_id: i64) -> Result<(), GatewayError> {
    let db = gateway.db().clone();
    let username = username.to_string();
    tokio::task::spawn_blocking(move || db.ensure_scope_access(&username, chat_id))
        .await
        .map_err(|e| GatewayError::Join(e.to_string()))??;
    Ok(())
}

async fn write_frame(sender: &mut Sender, frame: Message, timeout: Duration) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, sender.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(TransportError::Closed),
        Err(_) => Err(TransportError::Timeout),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use smt_db::Database;

    use crate::GatewayConfig;

    fn gateway_with(users: &[&str]) -> Gateway {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for u in users {
            db.create_user(u, "hash").unwrap();
        }
        Gateway::new(db, GatewayConfig::default())
    }

    #[tokio::test]
    async fn inbound_global_message_is_stored_and_broadcast() {
        let gateway = gateway_with(&["alice", "bob"]);
        let (_reg, mut rx) = gateway.registry().admit("bob").unwrap();

        handle_inbound(
            &gateway,
            "alice",
            r#"{"username":"mallory","message":"hi all","chat_recv_id":0}"#,
        )
        .await;

        let delivered: WireMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(delivered.username, "alice");
        assert_eq!(delivered.message, "hi all");

        let stored = gateway.db().replay(GLOBAL_SCOPE, 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].author, "alice");
    }

    #[tokio::test]
    async fn inbound_to_foreign_chat_is_dropped() {
        let gateway = gateway_with(&["alice", "bob", "eve"]);
        let chat_id = gateway.db().create_direct_chat("alice", "bob").unwrap();
        let (_reg, mut rx) = gateway.registry().admit("bob").unwrap();

        let frame = format!(r#"{{"message":"sneaky","chat_recv_id":{}}}"#, chat_id);
        handle_inbound(&gateway, "eve", &frame).await;
        assert!(rx.try_recv().is_err());
        assert!(gateway.db().replay(chat_id, 10).unwrap().is_empty());

        let frame = format!(r#"{{"message":"hey","chat_recv_id":{}}}"#, chat_id);
        handle_inbound(&gateway, "alice", &frame).await;
        let delivered: WireMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(delivered.chat_recv_id, chat_id);
    }

    #[tokio::test]
    async fn malformed_and_empty_frames_are_ignored() {
        let gateway = gateway_with(&["alice"]);
        let (reg, mut rx) = gateway.registry().admit("alice").unwrap();

        handle_inbound(&gateway, "alice", "not json").await;
        handle_inbound(&gateway, "alice", r#"{"message":"   "}"#).await;

        assert!(rx.try_recv().is_err());
        assert!(gateway.registry().contains(&reg));
        assert!(gateway.db().replay(GLOBAL_SCOPE, 10).unwrap().is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("héllo", 2), "h");
    }
}
