//! WebSocket stream of mesh and traffic events.
//!
//! Connect to `/event_notifs`. The first message is a `snapshot` of the
//! current topology; after that every engine event and traffic notification
//! is forwarded as JSON. A client that falls behind gets a fresh snapshot.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use meshsim_engine::TopologyView;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::AppState;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Snapshot {
    Snapshot { topology: TopologyView },
}

pub async fn event_notifs_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("Event stream client connected");
    let mut events = state.engine.subscribe();
    let mut traffic = state.traffic.subscribe();

    if let Err(e) = send_snapshot(&mut socket, &state).await {
        warn!("Failed to send initial snapshot: {}", e);
        return;
    }

    loop {
        let sent = tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => socket.send(Message::Pong(data)).await,
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => send_json(&mut socket, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event stream lagged, resending snapshot");
                    send_snapshot(&mut socket, &state).await
                }
                Err(RecvError::Closed) => break,
            },
            event = traffic.recv() => match event {
                Ok(event) => send_json(&mut socket, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Traffic stream lagged");
                    Ok(())
                }
                Err(RecvError::Closed) => break,
            },
        };

        if let Err(e) = sent {
            warn!("Failed to send event: {}", e);
            break;
        }
    }
    info!("Event stream client disconnected");
}

async fn send_snapshot(socket: &mut WebSocket, state: &AppState) -> Result<(), axum::Error> {
    let snapshot = Snapshot::Snapshot {
        topology: state.engine.topology_view(),
    };
    send_json(socket, &snapshot).await
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    let json = serde_json::to_string(value).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}
