//! Real-time discussion relay over WebSocket.
//!
//! Each proposal with at least one connected reader has a room: a broadcast
//! channel plus the set of connections currently in it. Frames are JSON
//! objects of the form `{"event": "...", "data": {...}}`. Delivery is best
//! effort: a receiver that falls behind the channel skips what it missed.

use std::collections::{BTreeSet, HashMap};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxen_database::SafeDatabase;
use voxen_service::parser::DiscussionMessage;

use crate::access::readable_proposal;
use crate::auth::verify_token;
use crate::discussions::post_message;
use crate::error::ApiError;
use crate::extract::Query;
use crate::state::AppState;

const ROOM_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ActiveUsers { proposal_id: String, users: Vec<String> },
    UserJoined { proposal_id: String, address: String },
    UserLeft { proposal_id: String, address: String },
    NewMessage { message: DiscussionMessage },
    MessageUpdated { message: DiscussionMessage },
    MessageDeleted { proposal_id: String, id: String },
    UserTyping { proposal_id: String, address: String, is_typing: bool },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinDiscussion { proposal_id: String },
    SendMessage { proposal_id: String, text: String },
    LeaveDiscussion { proposal_id: String },
    UserTyping { proposal_id: String, is_typing: bool },
}

struct Room {
    sender: broadcast::Sender<ServerEvent>,
    participants: HashMap<Uuid, String>,
}

impl Room {
    fn users(&self) -> Vec<String> {
        self.participants
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Default)]
pub struct Relay {
    rooms: DashMap<String, Room>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the connection to the room and returns its receiver. The joiner
    /// is subscribed before the presence events go out, so it sees them too.
    pub fn join(&self, proposal_id: &str, conn: Uuid, address: &str) -> broadcast::Receiver<ServerEvent> {
        let mut room = self.rooms.entry(proposal_id.to_string()).or_insert_with(|| Room {
            sender: broadcast::channel(ROOM_CAPACITY).0,
            participants: HashMap::new(),
        });
        let receiver = room.sender.subscribe();
        room.participants.insert(conn, address.to_string());

        let _ = room.sender.send(ServerEvent::UserJoined {
            proposal_id: proposal_id.to_string(),
            address: address.to_string(),
        });
        let _ = room.sender.send(ServerEvent::ActiveUsers {
            proposal_id: proposal_id.to_string(),
            users: room.users(),
        });
        receiver
    }

    /// Removes the connection; empty rooms are dropped. Returns whether the
    /// connection was in the room.
    pub fn leave(&self, proposal_id: &str, conn: Uuid) -> bool {
        let Some(mut room) = self.rooms.get_mut(proposal_id) else {
            return false;
        };
        let Some(address) = room.participants.remove(&conn) else {
            return false;
        };

        let _ = room.sender.send(ServerEvent::UserLeft {
            proposal_id: proposal_id.to_string(),
            address,
        });
        let _ = room.sender.send(ServerEvent::ActiveUsers {
            proposal_id: proposal_id.to_string(),
            users: room.users(),
        });
        let empty = room.participants.is_empty();
        drop(room);

        if empty {
            self.rooms.remove_if(proposal_id, |_, room| room.participants.is_empty());
        }
        true
    }

    /// Fans an event out to the room, if anyone is listening.
    pub fn publish(&self, proposal_id: &str, event: ServerEvent) {
        if let Some(room) = self.rooms.get(proposal_id) {
            let _ = room.sender.send(event);
        }
    }

    pub fn active_users(&self, proposal_id: &str) -> Vec<String> {
        self.rooms.get(proposal_id).map(|room| room.users()).unwrap_or_default()
    }

    pub fn is_member(&self, proposal_id: &str, conn: Uuid) -> bool {
        self.rooms
            .get(proposal_id)
            .map_or(false, |room| room.participants.contains_key(&conn))
    }
}

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler<D: SafeDatabase>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<D>>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let claims = verify_token(&state.config.jwt_secret, &token)?;
    Ok(ws.on_upgrade(move |socket| run_session(socket, state, claims.sub)))
}

/// Drains a room into the connection's queue. The queue is bounded, so a
/// slow socket stalls this task and the room's receiver lags instead.
async fn forward(
    mut receiver: broadcast::Receiver<ServerEvent>,
    outbound: mpsc::Sender<ServerEvent>,
    room: String,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if outbound.send(event).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(room = %room, skipped, "relay receiver lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Per-connection state: the outbound queue and one forwarder task per joined room.
struct Session<D: SafeDatabase> {
    state: AppState<D>,
    conn: Uuid,
    address: String,
    outbound: mpsc::Sender<ServerEvent>,
    forwarders: HashMap<String, JoinHandle<()>>,
}

async fn run_session<D: SafeDatabase>(socket: WebSocket, state: AppState<D>, address: String) {
    let conn = Uuid::new_v4();
    info!(%address, %conn, "relay connection opened");

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut queue) = mpsc::channel::<ServerEvent>(ROOM_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(event) = queue.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("could not encode relay event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        state,
        conn,
        address,
        outbound,
        forwarders: HashMap::new(),
    };

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => session.handle(event),
                Err(e) => session.reply_error(format!("Malformed event: {}", e)),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.close();
    writer.abort();
}

impl<D: SafeDatabase> Session<D> {
    fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinDiscussion { proposal_id } => self.join(proposal_id),
            ClientEvent::LeaveDiscussion { proposal_id } => self.leave(&proposal_id),
            ClientEvent::SendMessage { proposal_id, text } => {
                if let Err(e) = post_message(&self.state, &proposal_id, &self.address, &text) {
                    self.reply_error(e.public_message());
                }
            }
            ClientEvent::UserTyping { proposal_id, is_typing } => {
                if self.state.relay.is_member(&proposal_id, self.conn) {
                    self.state.relay.publish(
                        &proposal_id,
                        ServerEvent::UserTyping {
                            proposal_id: proposal_id.clone(),
                            address: self.address.clone(),
                            is_typing,
                        },
                    );
                }
            }
        }
    }

    fn join(&mut self, proposal_id: String) {
        if self.forwarders.contains_key(&proposal_id) {
            return;
        }
        if let Err(e) = readable_proposal(&self.state.db, &proposal_id, Some(&self.address)) {
            self.reply_error(e.public_message());
            return;
        }

        let receiver = self.state.relay.join(&proposal_id, self.conn, &self.address);
        let forwarder = tokio::spawn(forward(receiver, self.outbound.clone(), proposal_id.clone()));
        self.forwarders.insert(proposal_id, forwarder);
    }

    fn leave(&mut self, proposal_id: &str) {
        if let Some(forwarder) = self.forwarders.remove(proposal_id) {
            forwarder.abort();
            self.state.relay.leave(proposal_id, self.conn);
        }
    }

    fn reply_error(&self, message: String) {
        if self.outbound.try_send(ServerEvent::Error { message }).is_err() {
            debug!(conn = %self.conn, "relay queue full, error reply dropped");
        }
    }

    fn close(mut self) {
        let rooms: Vec<String> = self.forwarders.keys().cloned().collect();
        for proposal_id in rooms {
            self.leave(&proposal_id);
        }
        info!(address = %self.address, conn = %self.conn, "relay connection closed");
    }
}
