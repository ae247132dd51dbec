use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use super::AdminState;
use crate::event::HandleResult;
use crate::upstream::Upstream;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub upstreams: usize,
    pub retained_requests: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        upstreams: state.registry.len(),
        retained_requests: state.events.len(),
    })
}

pub async fn get_upstreams(State(state): State<AdminState>) -> Json<Vec<Upstream>> {
    Json(state.registry.list().to_vec())
}

/// Retained request lifecycles, newest first.
pub async fn get_requests(State(state): State<AdminState>) -> Json<Vec<HandleResult>> {
    Json(
        state
            .events
            .recent()
            .iter()
            .map(|result| HandleResult::clone(result))
            .collect(),
    )
}

pub async fn get_request(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HandleResult>, StatusCode> {
    state
        .events
        .get(&id)
        .map(|result| Json(HandleResult::clone(&result)))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn live_events(ws: WebSocketUpgrade, State(state): State<AdminState>) -> Response {
    let updates = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, updates))
}

/// Push every published snapshot to the socket as a JSON text frame.
async fn stream_events(mut socket: WebSocket, mut updates: broadcast::Receiver<Arc<HandleResult>>) {
    tracing::debug!("Live event subscriber connected");
    loop {
        tokio::select! {
            received = updates.recv() => match received {
                Ok(result) => {
                    let text = match serde_json::to_string(result.as_ref()) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(id = %result.id, error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Live event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Live event subscriber disconnected");
}
