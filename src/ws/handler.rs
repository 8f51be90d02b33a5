//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::MoveDir;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::ConnectionHandle;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (handle, mut outbound_rx) = ConnectionHandle::new(connection_id);
    state.matchmaking.attach(handle);

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: outbound channel -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let rate_limiter = ConnectionRateLimiter::new();

    // Reader loop: WebSocket -> matchmaking service
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => dispatch(&state, connection_id, msg, &rate_limiter).await,
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(connection_id = %connection_id, "Received ping/pong");
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    state.matchmaking.on_disconnect(connection_id).await;
    writer_handle.abort();

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Route one parsed client event into the matchmaking service
async fn dispatch(
    state: &AppState,
    connection_id: Uuid,
    msg: ClientMsg,
    rate_limiter: &ConnectionRateLimiter,
) {
    match msg {
        ClientMsg::Register(username) => {
            state.matchmaking.register(connection_id, &username).await;
        }
        ClientMsg::Matchmaking { username, league } => {
            state.matchmaking.enqueue_for_match(&username, &league);
        }
        ClientMsg::CancelMatchmaking { username } => {
            state.matchmaking.cancel_matchmaking(&username);
        }
        ClientMsg::Challenge {
            id,
            challenger,
            opponent,
        } => {
            state.matchmaking.challenge(&id, &challenger, &opponent);
        }
        ClientMsg::MoveLeft(username) => {
            forward_move(state, connection_id, username, MoveDir::Left, rate_limiter);
        }
        ClientMsg::MoveRight(username) => {
            forward_move(state, connection_id, username, MoveDir::Right, rate_limiter);
        }
        ClientMsg::JoinGame(_) => {
            // Practice mode against the computer lives outside this service
            debug!(connection_id = %connection_id, "join-game is not handled here");
        }
    }
}

fn forward_move(
    state: &AppState,
    connection_id: Uuid,
    username: String,
    dir: MoveDir,
    rate_limiter: &ConnectionRateLimiter,
) {
    if !rate_limiter.check_input() {
        warn!(connection_id = %connection_id, "Rate limited input message");
        return;
    }
    state.matchmaking.forward_move(connection_id, username, dir);
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
