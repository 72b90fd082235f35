use std::collections::HashSet;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Config;
use crate::error::ChatError;
use crate::protocol::{ClientEvent, ServerEvent};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub event_queue_depth: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = Config::default();
        Self::from_config(url, &defaults)
    }

    pub fn from_config(url: impl Into<String>, config: &Config) -> Self {
        Self {
            url: url.into(),
            reconnect_base: Duration::from_millis(config.reconnect_base_ms),
            reconnect_cap: Duration::from_millis(config.reconnect_cap_ms),
            event_queue_depth: config.inbound_queue_depth.max(1),
        }
    }
}

/// Owns one realtime connection for one user.
///
/// A background task dials the server, registers the user id with
/// `setup`, and keeps the connection alive: on transport failure it
/// reconnects with exponential backoff, re-registers and replays a
/// `joinRoom` for every room the caller has joined and not left.
///
/// Inbound events land on a bounded queue drained by the caller via
/// `next_event`; commands are fire-and-confirm, so confirmation comes
/// back as the room echo carrying the store-assigned message.
pub struct ChatClient {
    user_id: String,
    commands: mpsc::UnboundedSender<ClientEvent>,
    events: mpsc::Receiver<ServerEvent>,
}

impl ChatClient {
    pub fn connect(config: ClientConfig, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_depth);
        tokio::spawn(run_connection(config, user_id.clone(), cmd_rx, event_tx));
        Self {
            user_id,
            commands: cmd_tx,
            events: event_rx,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn join_room(&self, room_id: &str) -> Result<(), ChatError> {
        self.command(ClientEvent::JoinRoom {
            room_id: room_id.to_string(),
            user_id: self.user_id.clone(),
        })
    }

    pub fn leave_room(&self, room_id: &str) -> Result<(), ChatError> {
        self.command(ClientEvent::LeaveRoom {
            room_id: room_id.to_string(),
            user_id: self.user_id.clone(),
        })
    }

    pub fn typing(&self, booking_id: &str) -> Result<(), ChatError> {
        self.command(ClientEvent::Typing {
            booking_id: booking_id.to_string(),
            user_id: self.user_id.clone(),
        })
    }

    pub fn stop_typing(&self, booking_id: &str) -> Result<(), ChatError> {
        self.command(ClientEvent::StopTyping {
            booking_id: booking_id.to_string(),
            user_id: self.user_id.clone(),
        })
    }

    pub fn send_message(&self, booking_id: &str, content: &str) -> Result<(), ChatError> {
        self.command(ClientEvent::SendMessage {
            booking_id: booking_id.to_string(),
            sender_id: self.user_id.clone(),
            content: content.to_string(),
        })
    }

    /// Next inbound server event; None once the connection task is gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// Closes the connection. Dropping the client does the same.
    pub fn close(self) {}

    fn command(&self, event: ClientEvent) -> Result<(), ChatError> {
        self.commands
            .send(event)
            .map_err(|_| ChatError::ConnectionClosed)
    }
}

async fn run_connection(
    config: ClientConfig,
    user_id: String,
    mut commands: mpsc::UnboundedReceiver<ClientEvent>,
    events: mpsc::Sender<ServerEvent>,
) {
    let mut joined: HashSet<String> = HashSet::new();
    let mut pending: Vec<ClientEvent> = Vec::new();
    let mut backoff = config.reconnect_base;

    loop {
        let ws = match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!("connect to {} failed: {e}", config.url);
                if !wait_reconnect(&mut commands, &mut joined, &mut pending, backoff).await {
                    return;
                }
                backoff = (backoff * 2).min(config.reconnect_cap);
                continue;
            }
        };
        info!("connected to {} as {user_id}", config.url);
        backoff = config.reconnect_base;
        let (mut ws_tx, mut ws_rx) = ws.split();

        // Register, then replay joins so the server's room membership
        // matches what the caller believes after a reconnect, then flush
        // sends held over from the outage. The history reply that
        // follows each join resyncs the log; the id-dedup merge makes
        // the replay safe.
        let mut replay = vec![ClientEvent::Setup {
            user_id: user_id.clone(),
        }];
        replay.extend(joined.iter().map(|room_id| ClientEvent::JoinRoom {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
        }));
        replay.append(&mut pending);
        let mut replay_failed = false;
        for event in replay {
            if let Err(e) = send_event(&mut ws_tx, &event).await {
                warn!("replay failed: {e}");
                replay_failed = true;
                break;
            }
        }
        if replay_failed {
            if !wait_reconnect(&mut commands, &mut joined, &mut pending, backoff).await {
                return;
            }
            backoff = (backoff * 2).min(config.reconnect_cap);
            continue;
        }

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return;
                    }
                    Some(event) => {
                        track_membership(&mut joined, &event);
                        if let Err(e) = send_event(&mut ws_tx, &event).await {
                            warn!("send failed: {e}");
                            break;
                        }
                    }
                },
                frame = ws_rx.next() => match frame {
                    Some(Ok(msg)) => {
                        if msg.is_close() {
                            debug!("server closed the connection");
                            break;
                        }
                        if let Ok(text) = msg.to_text() {
                            match serde_json::from_str::<ServerEvent>(text) {
                                Ok(event) => {
                                    if events.send(event).await.is_err() {
                                        // Consumer is gone; nothing left to do.
                                        return;
                                    }
                                }
                                Err(e) => debug!("unparseable server frame: {e}"),
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("websocket error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }

        if !wait_reconnect(&mut commands, &mut joined, &mut pending, backoff).await {
            return;
        }
        backoff = (backoff * 2).min(config.reconnect_cap);
    }
}

fn track_membership(joined: &mut HashSet<String>, event: &ClientEvent) {
    match event {
        ClientEvent::JoinRoom { room_id, .. } => {
            joined.insert(room_id.clone());
        }
        ClientEvent::LeaveRoom { room_id, .. } => {
            joined.remove(room_id);
        }
        _ => {}
    }
}

/// Waits out a reconnect delay while still consuming commands, so the
/// task exits as soon as its owner is dropped mid-outage. Join and
/// leave intent folds into the replay set, sends are held for the next
/// connection, and transient typing signals are dropped (typing resets
/// to Idle across reconnect). Returns false once the client is gone.
async fn wait_reconnect(
    commands: &mut mpsc::UnboundedReceiver<ClientEvent>,
    joined: &mut HashSet<String>,
    pending: &mut Vec<ClientEvent>,
    delay: Duration,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                None => return false,
                Some(event) => {
                    track_membership(joined, &event);
                    if matches!(event, ClientEvent::SendMessage { .. }) {
                        pending.push(event);
                    }
                }
            }
        }
    }
}

async fn send_event(sink: &mut WsSink, event: &ClientEvent) -> Result<(), ChatError> {
    match serde_json::to_string(event) {
        Ok(text) => sink
            .send(Message::text(text))
            .await
            .map_err(ChatError::from),
        Err(e) => {
            warn!("failed to serialize client event: {e}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commands_are_accepted_while_disconnected() {
        // Nothing listens on this port; the client queues commands and
        // keeps retrying in the background.
        let client = ChatClient::connect(ClientConfig::new("ws://127.0.0.1:9"), "u1");
        assert_eq!(client.user_id(), "u1");
        assert!(client.join_room("b1").is_ok());
        assert!(client.send_message("b1", "hello").is_ok());
        client.close();
    }

    #[tokio::test]
    async fn connection_task_exits_with_its_owner_during_outage() {
        let config = ClientConfig {
            url: "ws://127.0.0.1:9".to_string(),
            reconnect_base: Duration::from_millis(50),
            reconnect_cap: Duration::from_secs(30),
            event_queue_depth: 8,
        };
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _event_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_connection(
            config,
            "u1".to_string(),
            cmd_rx,
            event_tx,
        ));

        // Dropping the command side mid-backoff must stop the task well
        // before the reconnect delay would elapse.
        drop(cmd_tx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("connection task should stop when the client is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn outage_commands_fold_into_replay_state() {
        let mut joined = HashSet::new();
        let mut pending = Vec::new();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        cmd_tx
            .send(ClientEvent::JoinRoom {
                room_id: "b1".to_string(),
                user_id: "u1".to_string(),
            })
            .unwrap();
        cmd_tx
            .send(ClientEvent::Typing {
                booking_id: "b1".to_string(),
                user_id: "u1".to_string(),
            })
            .unwrap();
        cmd_tx
            .send(ClientEvent::SendMessage {
                booking_id: "b1".to_string(),
                sender_id: "u1".to_string(),
                content: "queued".to_string(),
            })
            .unwrap();

        assert!(
            wait_reconnect(
                &mut cmd_rx,
                &mut joined,
                &mut pending,
                Duration::from_millis(20)
            )
            .await
        );
        // Join intent lands in the replay set, the send is held, the
        // stale typing signal is dropped.
        assert!(joined.contains("b1"));
        assert_eq!(
            pending,
            vec![ClientEvent::SendMessage {
                booking_id: "b1".to_string(),
                sender_id: "u1".to_string(),
                content: "queued".to_string(),
            }]
        );
    }
}
