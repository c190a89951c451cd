//! Rendezvous for browser peers exchanging WebRTC handshakes.
//!
//! The hub relays signaling envelopes only; file bytes flow directly
//! between browsers and never touch this service. One task per websocket
//! connection owns both socket halves: inbound frames are handled inline
//! (registry mutation is lock-cheap and never does I/O) and outbound
//! events drain from the session's bounded queue, which preserves
//! per-sender/per-recipient FIFO.
//!
//! ## Endpoints
//!
//! - GET /p2p/ws - websocket upgrade into the signaling protocol
//!
//! ## Session lifecycle
//!
//! ```text
//! connecting ─(join_room)→ joined ─(leave_room | close | evict)→ closed
//! ```
//!
//! Sessions that never join are dropped after the idle timeout. Joined
//! sessions are kept alive by any inbound frame (`ping` suffices) and are
//! closed by the heartbeat sweep once idle.

mod hub;

pub use hub::{Hub, HubConfig, HubStats, JoinGrant, PeerOutbox};

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use shared::signal::{ClientEvent, ServerEvent, SignalErrorCode};

use crate::{
    admission::{self, RateBucket},
    error::{AppError, ErrorCode},
    middleware::auth::{Client, Principal},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    State(state): State<AppState>,
    client: Client,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    if matches!(client.principal, Principal::Anonymous) && !state.config.p2p_allow_anonymous {
        return Err(AppError::External(
            ErrorCode::Unauthenticated,
            "Signaling requires a session",
        ));
    }
    admission::check(&state, RateBucket::Api, &client.principal, &client.ip_hash).await?;

    // The transport cap sits above the protocol cap so the frame-size rule
    // in the session loop decides, with its proper error frame.
    let hard_cap = state.config.ws_max_frame_bytes.saturating_mul(2);
    Ok(ws
        .max_message_size(hard_cap)
        .max_frame_size(hard_cap)
        .on_upgrade(move |socket| serve_socket(state, socket))
        .into_response())
}

enum Flow {
    Continue,
    Close,
}

async fn serve_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel(state.config.send_queue_depth);
    let outbox = PeerOutbox::new(tx);
    let mut session: Option<Uuid> = None;
    let join_deadline = Duration::from_secs(state.config.idle_timeout_secs.max(1) as u64);

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(event) => {
                    let Ok(frame) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            // The hub evicted us (slow queue, idle sweep, or room teardown).
            // Tell the client why, best-effort, and close.
            _ = outbox.closed.notified() => {
                if let Some(code) = outbox.close_reason.get().copied() {
                    let _ = send_direct(&mut sink, error_event(code)).await;
                }
                break;
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    outbox
                        .last_seen
                        .store(Utc::now().timestamp(), Ordering::Relaxed);
                    if text.len() > state.config.ws_max_frame_bytes {
                        let _ = send_direct(
                            &mut sink,
                            error_event(SignalErrorCode::FrameTooLarge),
                        )
                        .await;
                        break;
                    }
                    match handle_frame(&state, &outbox, &mut session, &text) {
                        Flow::Continue => {}
                        Flow::Close => break,
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Binary, ping, pong: refresh liveness only.
                    outbox
                        .last_seen
                        .store(Utc::now().timestamp(), Ordering::Relaxed);
                }
                Some(Err(_)) => break,
            },
            _ = tokio::time::sleep(join_deadline), if session.is_none() => break,
        }
    }

    if let Some(sid) = session.take() {
        state.hub.leave(sid);
        state.metrics.signal_peers.dec();
    }
    let _ = sink.close().await;
}

/// Dispatch one inbound frame. Pure registry work, no suspension points.
fn handle_frame(
    state: &AppState,
    outbox: &PeerOutbox,
    session: &mut Option<Uuid>,
    text: &str,
) -> Flow {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            return queue(
                state,
                outbox,
                session,
                error_event(SignalErrorCode::ValidationFailed),
            );
        }
    };

    match event {
        ClientEvent::JoinRoom {
            room_id,
            device_name,
        } => {
            if session.is_some() {
                return queue(
                    state,
                    outbox,
                    session,
                    error_event(SignalErrorCode::ValidationFailed),
                );
            }
            match state.hub.join(&room_id, device_name, outbox.clone()) {
                Ok(grant) => {
                    *session = Some(grant.session_id);
                    state.metrics.signal_peers.inc();
                    tracing::debug!(session_id = %grant.session_id, room_id = %room_id, "peer joined");
                    queue(
                        state,
                        outbox,
                        session,
                        ServerEvent::Joined {
                            session_id: grant.session_id,
                            peers: grant.peers,
                        },
                    )
                }
                Err(code) => queue(state, outbox, session, error_event(code)),
            }
        }
        ClientEvent::LeaveRoom => {
            if let Some(sid) = session.take() {
                state.hub.leave(sid);
                state.metrics.signal_peers.dec();
                tracing::debug!(session_id = %sid, "peer left");
            }
            Flow::Close
        }
        ClientEvent::Ping => queue(state, outbox, session, ServerEvent::Pong),
        ClientEvent::WebrtcOffer {
            target_session,
            offer,
        } => relay(state, outbox, session, target_session, |sid| {
            ServerEvent::WebrtcOffer {
                sender_session: sid,
                offer,
            }
        }),
        ClientEvent::WebrtcAnswer {
            target_session,
            answer,
        } => relay(state, outbox, session, target_session, |sid| {
            ServerEvent::WebrtcAnswer {
                sender_session: sid,
                answer,
            }
        }),
        ClientEvent::IceCandidate {
            target_session,
            candidate,
        } => relay(state, outbox, session, target_session, |sid| {
            ServerEvent::IceCandidate {
                sender_session: sid,
                candidate,
            }
        }),
    }
}

/// Forward a directed message, stamping the sender's session id.
fn relay(
    state: &AppState,
    outbox: &PeerOutbox,
    session: &mut Option<Uuid>,
    target: Uuid,
    build: impl FnOnce(Uuid) -> ServerEvent,
) -> Flow {
    let Some(sid) = *session else {
        return queue(
            state,
            outbox,
            session,
            error_event(SignalErrorCode::ValidationFailed),
        );
    };

    match state.hub.forward(sid, target, build(sid)) {
        Ok(()) => {
            state.metrics.signal_relayed.inc();
            Flow::Continue
        }
        Err(code) => queue(state, outbox, session, error_event(code)),
    }
}

/// Enqueue an event to this session's own send queue. A session that
/// overflows its own queue is treated like any other slow peer.
fn queue(state: &AppState, outbox: &PeerOutbox, session: &mut Option<Uuid>, event: ServerEvent) -> Flow {
    match outbox.tx.try_send(event) {
        Ok(()) => Flow::Continue,
        Err(mpsc::error::TrySendError::Full(_)) => {
            let _ = outbox
                .close_reason
                .set(SignalErrorCode::SendBufferExhausted);
            if let Some(sid) = session.take() {
                state.hub.leave(sid);
                state.metrics.signal_peers.dec();
            }
            Flow::Close
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Flow::Close,
    }
}

async fn send_direct(
    sink: &mut (impl SinkExt<Message> + Unpin),
    event: ServerEvent,
) -> Result<(), ()> {
    let frame = serde_json::to_string(&event).map_err(|_| ())?;
    sink.send(Message::Text(frame.into())).await.map_err(|_| ())
}

fn error_event(code: SignalErrorCode) -> ServerEvent {
    ServerEvent::Error {
        code,
        message: describe(code).to_string(),
    }
}

fn describe(code: SignalErrorCode) -> &'static str {
    match code {
        SignalErrorCode::ValidationFailed => "Malformed frame or not allowed in this state",
        SignalErrorCode::Unauthenticated => "Signaling requires a session",
        SignalErrorCode::RateLimited => "Rate limit exceeded",
        SignalErrorCode::UnknownPeer => "No such peer in your room",
        SignalErrorCode::CrossRoomForbidden => "Target session is in another room",
        SignalErrorCode::FrameTooLarge => "Frame exceeds the size cap",
        SignalErrorCode::SendBufferExhausted => "Send queue overflow",
        SignalErrorCode::Unavailable => "Room unavailable",
    }
}

/// Background heartbeat: closes sessions idle past the timeout.
pub async fn run_heartbeat(state: AppState) {
    let mut ticker =
        tokio::time::interval(Duration::from_secs(state.config.heartbeat_secs.max(1)));
    loop {
        ticker.tick().await;
        let evicted = state.hub.sweep_idle(Utc::now());
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "closed idle signaling sessions");
        }
    }
}
