//! WebSocket push channel
//!
//! One subscription per connection. The optional `model` query
//! parameter scopes the subscription on open; a `subscribe` control
//! message re-targets it later. Events arrive as raw serialized JSON,
//! one per text frame.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::{Broadcaster, ClientMessage};
use crate::store::Store;

/// Query parameters accepted on channel open.
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Restrict the subscription to one model.
    pub model: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    State(store): State<Arc<Store>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, store, params.model))
}

async fn handle_socket(socket: WebSocket, store: Arc<Store>, model: Option<String>) {
    let broadcaster = store.broadcaster();
    let (id, mut rx) = broadcaster.subscribe(model);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(payload) => {
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    None => break, // Subscription dropped by the broadcaster
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, broadcaster, id, &mut sender).await {
                            break; // Client requested close or error
                        }
                    }
                    Some(Err(_)) => break, // WebSocket error
                    None => break, // Client disconnected
                }
            }
        }
    }

    broadcaster.unsubscribe(id);
}

/// Handle a message from the client.
/// Returns false if the connection should be closed.
async fn handle_client_message(
    msg: Message,
    broadcaster: &Broadcaster,
    id: u64,
    sender: &mut SplitSink<WebSocket, Message>,
) -> bool {
    match msg {
        Message::Text(text) => {
            if let Ok(control) = serde_json::from_str::<ClientMessage>(&text) {
                match control {
                    ClientMessage::Subscribe { model, filter } => {
                        if filter.is_some() {
                            tracing::debug!(
                                subscription = id,
                                "subscribe filter accepted but not applied"
                            );
                        }
                        broadcaster.retarget(id, model);
                    }
                    ClientMessage::Ping => {
                        let pong = serde_json::json!({"type": "pong"});
                        let _ = sender.send(Message::Text(pong.to_string())).await;
                    }
                }
            }
            true
        }
        Message::Binary(_) => true, // Ignore binary messages
        Message::Ping(data) => {
            let _ = sender.send(Message::Pong(data)).await;
            true
        }
        Message::Pong(_) => true, // Ignore pong responses
        Message::Close(_) => false, // Client requested close
    }
}
