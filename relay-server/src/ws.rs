//! WebSocket boundary (spec §6): `watch relay` / `unwatch relay` join and
//! leave the "relay" topic; `relay requests satisfied` events are pushed
//! while watching. Delivery stays best-effort — a slow client just misses
//! events it can't keep up with (spec §4.H).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::dto::RequestsSatisfiedDto;
use crate::state::AppState;

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, state))
}

async fn run(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut sub = state.relay.events.subscribe();
    let mut watching = false;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match text.trim() {
                            "watch relay" => watching = true,
                            "unwatch relay" => watching = false,
                            other => tracing::debug!(message = other, "unrecognized websocket command"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            event = sub.recv(), if watching => {
                let Some(relay_core::RelayEvent::RequestsSatisfied(payload)) = event else {
                    break;
                };
                let body = serde_json::json!({
                    "topic": "relay requests satisfied",
                    "event": RequestsSatisfiedDto::from_core(&payload),
                });
                if sink.send(Message::Text(body.to_string())).await.is_err() {
                    break;
                }
            }
        }
    }
}
