use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use movienight_db::Database;
use movienight_types::events::{ClientCommand, ServerEvent};
use movienight_types::models::ChatMessage;

use crate::relay::{ConnId, Relay};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Number of chat messages replayed to a socket when it joins a room.
pub const HISTORY_LIMIT: u32 = 100;

const GUEST_NAME: &str = "Guest";

/// Who is on the other end of a socket, when it presented a valid credential.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Per-connection context shared by the command handlers.
struct Session {
    conn_id: ConnId,
    relay: Relay,
    db: Arc<Database>,
    identity: Option<Identity>,
}

impl Session {
    /// An authenticated socket always speaks as itself; guests are taken at their word.
    fn user_id(&self, claimed: Option<String>) -> Option<String> {
        match &self.identity {
            Some(identity) => Some(identity.user_id.to_string()),
            None => claimed,
        }
    }

    fn username(&self, claimed: Option<String>) -> Option<String> {
        match &self.identity {
            Some(identity) => Some(identity.username.clone()),
            None => claimed,
        }
    }

    fn label(&self) -> String {
        match &self.identity {
            Some(identity) => format!("{} ({})", identity.username, self.conn_id),
            None => format!("guest ({})", self.conn_id),
        }
    }
}

/// Drive a single realtime socket until it closes.
pub async fn handle_connection(
    socket: WebSocket,
    relay: Relay,
    db: Arc<Database>,
    identity: Option<Identity>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = relay.connect().await;

    let session = Session {
        conn_id,
        relay: relay.clone(),
        db,
        identity,
    };
    info!("{} connected to relay", session.label());

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward relay events -> socket, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode relay event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
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

    // Read commands from the socket; handled one at a time so a connection's
    // events reach the room in the order it sent them.
    let label = session.label();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&session, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            session.label(),
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

    let rooms = relay.disconnect(conn_id).await;
    info!("{} disconnected from relay (left {} room(s))", label, rooms.len());
}

async fn handle_command(session: &Session, cmd: ClientCommand) {
    match cmd {
        ClientCommand::JoinRoom { watchlist_id, user_id } => {
            let user_id = session.user_id(user_id);
            session.relay.join(&watchlist_id, session.conn_id, user_id).await;

            let history = load_history(session, &watchlist_id).await;
            session
                .relay
                .send_to(session.conn_id, ServerEvent::ChatHistory(history))
                .await;
        }

        ClientCommand::LeaveRoom { watchlist_id, user_id } => {
            let user_id = session.user_id(user_id);
            session.relay.leave(&watchlist_id, session.conn_id, user_id).await;
        }

        ClientCommand::Typing {
            watchlist_id,
            user_id,
            username,
            is_typing,
        } => {
            trace!("{} typing={} in {}", session.label(), is_typing, watchlist_id);
            session
                .relay
                .emit_except(
                    &watchlist_id,
                    session.conn_id,
                    ServerEvent::UserTyping {
                        user_id: session.user_id(user_id),
                        username: session.username(username),
                        is_typing,
                    },
                )
                .await;
        }

        ClientCommand::ChatMessage {
            watchlist_id,
            user_id,
            username,
            text,
        } => {
            if text.trim().is_empty() {
                warn!("{} sent an empty chat message, dropping", session.label());
                return;
            }
            let Ok(wid) = watchlist_id.parse::<Uuid>() else {
                warn!("{} chat for malformed watchlist id '{}'", session.label(), watchlist_id);
                return;
            };

            let msg = ChatMessage {
                id: Uuid::new_v4(),
                watchlist_id: wid,
                user_id: session.user_id(user_id).and_then(|u| u.parse().ok()),
                username: session
                    .username(username)
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| GUEST_NAME.to_string()),
                text,
                created_at: chrono::Utc::now(),
            };

            // Persist first; only a stored message is relayed
            let db = session.db.clone();
            let stored = msg.clone();
            let result = tokio::task::spawn_blocking(move || db.insert_chat_message(&stored)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Failed to store chat message for {}: {}", watchlist_id, e);
                    return;
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            }

            session.relay.emit(&watchlist_id, ServerEvent::NewMessage(msg)).await;
        }
    }
}

async fn load_history(session: &Session, watchlist_id: &str) -> Vec<ChatMessage> {
    let Ok(wid) = watchlist_id.parse::<Uuid>() else {
        return Vec::new();
    };

    let db = session.db.clone();
    match tokio::task::spawn_blocking(move || db.recent_chat_messages(wid, HISTORY_LIMIT)).await {
        Ok(Ok(history)) => history,
        Ok(Err(e)) => {
            error!("Failed to load chat history for {}: {}", watchlist_id, e);
            Vec::new()
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            Vec::new()
        }
    }
}
