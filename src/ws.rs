//! Websocket attach point. Each connection joins the requester's own
//! outcome room plus the global announcement channel, gets the current
//! sale state on connect, and then just forwards events until either
//! side goes away.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::bus::BroadcastEvent;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachParams {
    requester_id: Option<String>,
}

pub async fn attach(
    ws: WebSocketUpgrade,
    Query(params): Query<AttachParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let requester_id = match params.requester_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "requesterId query parameter is required",
            ))
        }
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, requester_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, requester_id: String) {
    let mut outcomes = state.bus.subscribe(&requester_id);
    let mut announcements = state.bus.subscribe_global();
    let (mut sender, mut receiver) = socket.split();

    debug!(%requester_id, "websocket attached");

    let hello = BroadcastEvent::SaleStateChanged { status: state.sale_status().await };
    if send_json(&mut sender, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = outcomes.recv() => match event {
                Ok(event) => {
                    if send_json(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%requester_id, skipped, "outcome stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            event = announcements.recv() => match event {
                Ok(event) => {
                    if send_json(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%requester_id, skipped, "announcement stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(%requester_id, "websocket detached");
}

async fn send_json<S>(sender: &mut S, event: &impl Serialize) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let Ok(text) = serde_json::to_string(event) else {
        return Ok(());
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
