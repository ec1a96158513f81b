//! WebSocket transport for interview chat.
//!
//! The upgrade always succeeds; authentication and authorization failures
//! are reported by closing the socket with 1008 (or 1000 for finished
//! assessments) before any frame is exchanged.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::OutboundFrame;
use super::session::{ChatSession, Rejection, CLOSE_NORMAL};
use crate::api::AppState;
use crate::auth::cookie_token;

/// Seconds between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Bearer token, for clients that cannot set cookies.
    pub token: Option<String>,
}

type WsSink = SplitSink<WebSocket, WsMessage>;

/// Upgrade handler for `GET /ws/assessments/:id`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(assessment_id): Path<Uuid>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    // A stale cookie must not shadow a valid query token.
    let tokens: Vec<String> = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(cookie_token)
        .map(str::to_string)
        .into_iter()
        .chain(params.token)
        .collect();
    info!(%assessment_id, "New chat connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state, assessment_id, tokens))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    assessment_id: Uuid,
    tokens: Vec<String>,
) {
    let (mut sender, receiver) = socket.split();

    let identity = state.auth.verify_any(tokens.iter().map(String::as_str)).await;
    let Some(identity) = identity else {
        debug!(%assessment_id, "Rejected unauthenticated chat connection");
        close(&mut sender, Rejection::unauthenticated()).await;
        return;
    };

    let session = match ChatSession::open(
        state.store.clone(),
        state.gateway.clone(),
        Arc::clone(&state.chat),
        assessment_id,
        identity,
    )
    .await
    {
        Ok(session) => session,
        Err(rejection) => {
            info!(%assessment_id, code = rejection.code, reason = %rejection.reason, "Chat connection refused");
            close(&mut sender, rejection).await;
            return;
        }
    };

    let (connection_id, notifications) = state.registry.connect(assessment_id).await;
    info!(%assessment_id, %connection_id, user_id = %identity.user_id, "Chat connected");

    run_session(&session, sender, receiver, notifications).await;

    state.registry.disconnect(assessment_id, connection_id).await;
    info!(%assessment_id, %connection_id, "Chat disconnected");
}

/// Message loop for an authorized connection. Returns when either side
/// closes.
async fn run_session(
    session: &ChatSession,
    mut sender: WsSink,
    mut receiver: SplitStream<WebSocket>,
    mut notifications: tokio::sync::mpsc::Receiver<OutboundFrame>,
) {
    for frame in session.initialize().await {
        if send_frame(&mut sender, &frame).await.is_err() {
            debug!("Client disconnected during initialization");
            return;
        }
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let turn = session.handle_text(&text).await;
                        for frame in &turn.frames {
                            if send_frame(&mut sender, frame).await.is_err() {
                                debug!("Failed to send frame, client disconnected");
                                return;
                            }
                        }
                        if turn.close {
                            close(&mut sender, Rejection {
                                code: CLOSE_NORMAL,
                                reason: "Assessment ended".to_string(),
                            })
                            .await;
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        debug!("Ignoring binary message from client");
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("Client requested close");
                        return;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        return;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return;
                    }
                }
            }

            Some(frame) = notifications.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    debug!("Failed to send notification, client disconnected");
                    return;
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(WsMessage::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    return;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    warn!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    return;
                }
            }
        }
    }
}

async fn send_frame(sender: &mut WsSink, frame: &OutboundFrame) -> Result<(), axum::Error> {
    sender.send(WsMessage::Text(frame.to_json())).await
}

async fn close(sender: &mut WsSink, rejection: Rejection) {
    let frame = CloseFrame {
        code: rejection.code,
        reason: Cow::Owned(rejection.reason),
    };
    if sender.send(WsMessage::Close(Some(frame))).await.is_err() {
        debug!("Client went away before close frame");
    }
}
