//! Realtime fan-out over WebSockets.
//!
//! The [`Hub`] is the engine's [`Broadcast`] sink. Every published event goes
//! to a single tokio broadcast channel tagged with its topic; each socket task
//! keeps the set of topics its user may see and drops the rest.

use std::{collections::HashSet, sync::Arc};

use api_types::ws::ClientMessage;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use engine::{
    gateways::{Broadcast, Event, bill_topic, group_topic, user_topic},
    users,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::server::ServerState;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
struct Envelope {
    topic: String,
    payload: String,
}

#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<Arc<Envelope>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.tx.subscribe()
    }

    fn send(&self, topic: String, payload: String) {
        // No receivers is the normal idle state.
        if self.tx.send(Arc::new(Envelope { topic, payload })).is_err() {
            tracing::trace!("no websocket subscribers");
        }
    }
}

impl Broadcast for Hub {
    fn publish(&self, topic: &str, event: &Event) {
        match serde_json::to_string(event) {
            Ok(payload) => self.send(topic.to_string(), payload),
            Err(err) => tracing::warn!(%topic, "failed to encode event: {err}"),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state, user.username))
}

async fn client_loop(mut socket: WebSocket, state: ServerState, username: String) {
    let mut rx = state.hub.subscribe();
    let mut topics = HashSet::from([user_topic(&username)]);
    match state.engine.list_groups(&username).await {
        Ok(groups) => topics.extend(
            groups
                .iter()
                .map(|summary| group_topic(&summary.group.id.to_string())),
        ),
        Err(err) => tracing::warn!(user = %username, "failed to load groups: {err}"),
    }
    tracing::debug!(user = %username, topics = topics.len(), "websocket connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&state, &username, &mut topics, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(user = %username, "websocket error: {err}");
                    break;
                }
            },
            envelope = rx.recv() => match envelope {
                Ok(envelope) => {
                    if !topics.contains(&envelope.topic) {
                        continue;
                    }
                    let text = Message::Text(envelope.payload.clone().into());
                    if socket.send(text).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user = %username, skipped, "websocket client lagging");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!(user = %username, "websocket disconnected");
}

async fn handle_client_message(
    state: &ServerState,
    username: &str,
    topics: &mut HashSet<String>,
    text: &str,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(user = %username, "ignoring websocket message: {err}");
            return;
        }
    };
    match message {
        ClientMessage::JoinBill { bill_id } => {
            match state.engine.bill(&bill_id, username).await {
                Ok(_) => {
                    topics.insert(bill_topic(&bill_id));
                }
                Err(err) => {
                    tracing::debug!(user = %username, %bill_id, "join refused: {err}");
                }
            }
        }
        ClientMessage::UpdateSplit { bill_id, payload } => {
            let topic = bill_topic(&bill_id);
            if !topics.contains(&topic) {
                tracing::debug!(user = %username, %bill_id, "split edit for unjoined bill");
                return;
            }
            let relay = serde_json::json!({
                "event": "split-edit",
                "bill_id": bill_id,
                "username": username,
                "payload": payload,
            });
            state.hub.send(topic, relay.to_string());
        }
    }
}
