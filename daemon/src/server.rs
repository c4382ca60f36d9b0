//! Network surfaces: command ingress over TCP and HTTP, status over HTTP
//! and WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::queue::CommandSender;
use crate::status::StatusBroadcaster;

#[derive(Clone)]
pub struct ServerState {
    pub queue: CommandSender,
    pub status: Arc<StatusBroadcaster>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/status/ws", get(status_ws_endpoint))
        .route("/command", post(command_handler))
        .with_state(state)
}

/// Serve the HTTP surface on an already bound listener.
pub async fn serve_http(listener: TcpListener, state: ServerState) -> std::io::Result<()> {
    info!("Status endpoint: http://{}/status", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn status_handler(State(state): State<ServerState>) -> Response {
    match state.status.latest() {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "No status published yet").into_response(),
    }
}

async fn command_handler(State(state): State<ServerState>, body: String) -> Response {
    let command = body.trim();
    if command.is_empty() {
        return (StatusCode::BAD_REQUEST, "Empty command").into_response();
    }
    info!("Queued command '{}' from HTTP", command);
    state.queue.push(command);
    StatusCode::ACCEPTED.into_response()
}

async fn status_ws_endpoint(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| status_ws_handler(socket, state.status))
}

/// Forward every published snapshot to one WebSocket client as JSON text.
async fn status_ws_handler(ws: WebSocket, status: Arc<StatusBroadcaster>) {
    let (mut sender, mut receiver) = ws.split();
    let mut rx = status.subscribe();

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                match snapshot {
                    Ok(snapshot) => {
                        let json = match serde_json::to_string(snapshot.as_ref()) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Failed to serialize status: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = sender.send(Message::Text(json.into())).await {
                            debug!("WebSocket send error: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Status client lagged {} snapshots", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut recv_task => break,
        }
    }

    recv_task.abort();
    debug!("Status WebSocket closed");
}

/// Accept TCP connections and queue each non-empty line as a command.
pub async fn run_command_listener(listener: TcpListener, queue: CommandSender) -> std::io::Result<()> {
    info!("Accepting commands on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        let queue = queue.clone();
        tokio::spawn(async move {
            if let Err(e) = read_commands(stream, peer, &queue).await {
                warn!("Command connection from {} failed: {}", peer, e);
            }
        });
    }
}

async fn read_commands(stream: TcpStream, peer: SocketAddr, queue: &CommandSender) -> std::io::Result<()> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        info!("Queued command '{}' from {}", command, peer);
        queue.push(command);
    }
    Ok(())
}
