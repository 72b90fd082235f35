use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::config::Config;
use crate::directory::BookingDirectory;
use crate::error::ChatError;
use crate::protocol::{ClientEvent, Notification, NotificationKind, ServerEvent};
use crate::room::RoomRegistry;
use crate::store::MessageStore;

struct Session {
    /// Set once by `setup`, immutable for the session's lifetime.
    user_id: Option<String>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

type Sessions = Arc<RwLock<HashMap<String, Session>>>;
// room_id -> user ids with an open typing episode
type TypingEpisodes = Arc<RwLock<HashMap<String, HashSet<String>>>>;

#[derive(Clone)]
pub struct Server {
    sessions: Sessions,
    rooms: RoomRegistry,
    typing: TypingEpisodes,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn BookingDirectory>,
    inbound_queue_depth: usize,
}

impl Server {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn BookingDirectory>,
        config: &Config,
    ) -> Self {
        Server {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            rooms: RoomRegistry::new(),
            typing: Arc::new(RwLock::new(HashMap::new())),
            store,
            directory,
            inbound_queue_depth: config.inbound_queue_depth.max(1),
        }
    }

    /// Registers a session and hands back its outbound event stream.
    pub async fn attach(&self, conn_id: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            conn_id.to_string(),
            Session {
                user_id: None,
                tx,
            },
        );
        rx
    }

    /// Tears a session down: leaves every joined room, closes any open
    /// typing episodes, forgets the connection.
    pub async fn detach(&self, conn_id: &str) {
        for (room_id, user_id) in self.rooms.leave_all(conn_id).await {
            self.close_typing_episode(&room_id, &user_id, Some(conn_id))
                .await;
        }
        let mut sessions = self.sessions.write().await;
        sessions.remove(conn_id);
        debug!("session {conn_id} detached");
    }

    pub async fn handle_event(&self, conn_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::Setup { user_id } => {
                let mut sessions = self.sessions.write().await;
                if let Some(session) = sessions.get_mut(conn_id) {
                    match &session.user_id {
                        None => {
                            info!("session {conn_id} registered as {user_id}");
                            session.user_id = Some(user_id);
                        }
                        Some(existing) if *existing != user_id => {
                            warn!(
                                "session {conn_id} already registered as {existing}, \
                                 ignoring setup for {user_id}"
                            );
                        }
                        Some(_) => {}
                    }
                }
            }

            ClientEvent::JoinRoom { room_id, user_id } => {
                if !self.session_is(conn_id, &user_id).await {
                    self.send_error(conn_id, &ChatError::NotRegistered.to_string())
                        .await;
                    return;
                }
                if self.rooms.join(&room_id, conn_id, &user_id).await {
                    debug!("{user_id} joined room {room_id}");
                    // History fetch failure degrades to an empty log.
                    let messages = match self.store.history(&room_id).await {
                        Ok(messages) => messages,
                        Err(e) => {
                            warn!("history fetch failed for {room_id}: {e}");
                            Vec::new()
                        }
                    };
                    self.send_to_session(
                        conn_id,
                        ServerEvent::History {
                            booking_id: room_id,
                            messages,
                        },
                    )
                    .await;
                }
            }

            ClientEvent::LeaveRoom { room_id, .. } => {
                if let Some(user_id) = self.rooms.leave(&room_id, conn_id).await {
                    debug!("{user_id} left room {room_id}");
                    self.close_typing_episode(&room_id, &user_id, Some(conn_id))
                        .await;
                }
            }

            ClientEvent::Typing {
                booking_id,
                user_id,
            } => {
                // A session may only signal presence for its own user.
                if !self.session_is(conn_id, &user_id).await {
                    return;
                }
                if !self.rooms.user_present(&booking_id, &user_id).await {
                    return;
                }
                {
                    let mut typing = self.typing.write().await;
                    typing
                        .entry(booking_id.clone())
                        .or_default()
                        .insert(user_id.clone());
                }
                self.broadcast_to_room_except(
                    &booking_id,
                    ServerEvent::UserTyping { user_id },
                    Some(conn_id),
                )
                .await;
            }

            ClientEvent::StopTyping {
                booking_id,
                user_id,
            } => {
                if !self.session_is(conn_id, &user_id).await {
                    return;
                }
                let had_episode = {
                    let mut typing = self.typing.write().await;
                    match typing.get_mut(&booking_id) {
                        Some(users) => {
                            let removed = users.remove(&user_id);
                            if users.is_empty() {
                                typing.remove(&booking_id);
                            }
                            removed
                        }
                        None => false,
                    }
                };
                if had_episode {
                    self.broadcast_to_room_except(
                        &booking_id,
                        ServerEvent::UserStoppedTyping { user_id },
                        Some(conn_id),
                    )
                    .await;
                }
            }

            ClientEvent::SendMessage {
                booking_id,
                sender_id,
                content,
            } => {
                self.handle_send(conn_id, &booking_id, &sender_id, &content)
                    .await;
            }
        }
    }

    /// Validates, persists and fans out one message. Validation failures
    /// never reach the store or the room.
    async fn handle_send(&self, conn_id: &str, booking_id: &str, sender_id: &str, content: &str) {
        if !self.session_is(conn_id, sender_id).await {
            self.send_error(conn_id, &ChatError::NotRegistered.to_string())
                .await;
            return;
        }

        let content = content.trim();
        if content.is_empty() {
            self.send_error(conn_id, &ChatError::EmptyContent.to_string())
                .await;
            return;
        }

        let Some(parties) = self.directory.parties(booking_id).await else {
            let err = ChatError::UnknownBooking(booking_id.to_string());
            self.send_error(conn_id, &err.to_string()).await;
            return;
        };
        let receiver = match parties.counterpart(sender_id) {
            Ok(receiver) => receiver.to_string(),
            Err(e) => {
                self.send_error(conn_id, &e.to_string()).await;
                return;
            }
        };

        let message = match self
            .store
            .append(booking_id, sender_id, &receiver, content)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!("message persist failed for {booking_id}: {e}");
                self.send_error(conn_id, &e.to_string()).await;
                return;
            }
        };

        // Echo to every room member, sender included; clients merge by id.
        self.broadcast_to_room_except(
            booking_id,
            ServerEvent::NewMessage {
                message: message.clone(),
            },
            None,
        )
        .await;

        // A receiver with the room open on any session is reading the
        // conversation and gets the in-room echo there; no badge. Only
        // a receiver not present in the room at all is notified, on
        // every registered session.
        if self.rooms.user_present(booking_id, &receiver).await {
            return;
        }
        let notification = Notification {
            kind: NotificationKind::Message,
            booking_id: booking_id.to_string(),
            from_user: sender_id.to_string(),
            to_user: receiver.clone(),
            message_id: Some(message.id.clone()),
            content: message.content.clone(),
            timestamp: message.timestamp,
        };
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            if session.user_id.as_deref() == Some(receiver.as_str()) {
                let _ = session.tx.send(ServerEvent::NewMessageNotification {
                    notification: notification.clone(),
                });
            }
        }
    }

    /// Pushes a generic notification at every registered session of the
    /// target user. Used by the surrounding system, not by chat itself.
    pub async fn notify(&self, notification: Notification) {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            if session.user_id.as_deref() == Some(notification.to_user.as_str()) {
                let _ = session.tx.send(ServerEvent::NewNotification {
                    notification: notification.clone(),
                });
            }
        }
    }

    /// Ends a user's typing episode in a room, if one is open, and tells
    /// the remaining members.
    async fn close_typing_episode(
        &self,
        room_id: &str,
        user_id: &str,
        except_conn: Option<&str>,
    ) {
        if self.rooms.user_present(room_id, user_id).await {
            // Another session of the same user still holds the room open.
            return;
        }
        let had_episode = {
            let mut typing = self.typing.write().await;
            match typing.get_mut(room_id) {
                Some(users) => {
                    let removed = users.remove(user_id);
                    if users.is_empty() {
                        typing.remove(room_id);
                    }
                    removed
                }
                None => false,
            }
        };
        if had_episode {
            self.broadcast_to_room_except(
                room_id,
                ServerEvent::UserStoppedTyping {
                    user_id: user_id.to_string(),
                },
                except_conn,
            )
            .await;
        }
    }

    async fn session_is(&self, conn_id: &str, user_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(conn_id)
            .is_some_and(|s| s.user_id.as_deref() == Some(user_id))
    }

    async fn send_error(&self, conn_id: &str, message: &str) {
        self.send_to_session(
            conn_id,
            ServerEvent::MessageError {
                message: message.to_string(),
            },
        )
        .await;
    }

    async fn send_to_session(&self, conn_id: &str, event: ServerEvent) {
        let sessions = self.sessions.read().await;
        if let Some(session) = sessions.get(conn_id) {
            let _ = session.tx.send(event);
        }
    }

    async fn broadcast_to_room_except(
        &self,
        room_id: &str,
        event: ServerEvent,
        except_conn: Option<&str>,
    ) {
        let members = self.rooms.members(room_id).await;
        let sessions = self.sessions.read().await;
        for (conn_id, _) in members {
            if Some(conn_id.as_str()) != except_conn {
                if let Some(session) = sessions.get(&conn_id) {
                    let _ = session.tx.send(event.clone());
                }
            }
        }
    }

    /// Runs one WebSocket session to completion.
    ///
    /// Inbound frames land on a bounded queue drained by a single
    /// consumer task, so handlers never run re-entrantly and per-room
    /// FIFO order is preserved as delivered by the transport.
    pub async fn handle_connection(&self, ws: WebSocket) {
        let conn_id = Uuid::new_v4().to_string();
        info!("new connection {conn_id}");
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut outbound = self.attach(&conn_id).await;

        let writer_conn = conn_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(event) = outbound.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            debug!("write to {writer_conn} failed: {e}");
                            break;
                        }
                    }
                    Err(e) => warn!("failed to serialize event for {writer_conn}: {e}"),
                }
            }
        });

        let (queue_tx, mut queue_rx) = mpsc::channel::<ClientEvent>(self.inbound_queue_depth);
        let consumer_server = self.clone();
        let consumer_conn = conn_id.clone();
        let consumer = tokio::spawn(async move {
            while let Some(event) = queue_rx.recv().await {
                consumer_server.handle_event(&consumer_conn, event).await;
            }
        });

        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(msg) => {
                    if let Ok(text) = msg.to_str() {
                        match serde_json::from_str::<ClientEvent>(text) {
                            Ok(event) => {
                                if queue_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => debug!("unparseable frame from {conn_id}: {e}"),
                        }
                    }
                }
                Err(e) => {
                    debug!("websocket error on {conn_id}: {e}");
                    break;
                }
            }
        }

        // Let queued events drain before membership is torn down.
        drop(queue_tx);
        let _ = consumer.await;
        self.detach(&conn_id).await;
        writer.abort();
        info!("connection {conn_id} closed");
    }
}
