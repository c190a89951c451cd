//! Room registry and message fan-out.
//!
//! Rooms live in a sharded map keyed by room id, so registry locking is
//! per-room rather than global, and a session index maps `session_id →
//! room_id` for directed routing. Peers hold only their room id, never a
//! pointer back into the registry, which keeps teardown one-directional.
//!
//! Every peer has a bounded send queue. Fan-out never blocks: a peer whose
//! queue is full is evicted (closed with `send_buffer_exhausted`) instead
//! of stalling the sender. All registry work is pure in-memory mutation;
//! no lock is ever held across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use shared::signal::{PeerInfo, ServerEvent, SignalErrorCode};

use crate::config::Config;

/// Hub tuning, extracted from the server config at startup.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub room_cap: usize,
    pub max_rooms: usize,
    pub send_queue_depth: usize,
    pub room_id_max_len: usize,
    pub idle_timeout_secs: i64,
}

impl HubConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            room_cap: config.room_cap,
            max_rooms: config.max_rooms,
            send_queue_depth: config.send_queue_depth,
            room_id_max_len: config.room_id_max_len,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

/// The sending side of a peer session, handed to the hub at join time.
/// The session task keeps the receiving half. Eviction stamps
/// `close_reason` and fires `closed`; the session task reads the reason
/// when it wakes.
#[derive(Clone)]
pub struct PeerOutbox {
    pub tx: mpsc::Sender<ServerEvent>,
    pub last_seen: Arc<AtomicI64>,
    pub close_reason: Arc<OnceLock<SignalErrorCode>>,
    pub closed: Arc<Notify>,
}

impl PeerOutbox {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            tx,
            last_seen: Arc::new(AtomicI64::new(Utc::now().timestamp())),
            close_reason: Arc::new(OnceLock::new()),
            closed: Arc::new(Notify::new()),
        }
    }
}

struct PeerHandle {
    device_name: Option<String>,
    joined_at: DateTime<Utc>,
    outbox: PeerOutbox,
}

impl PeerHandle {
    fn info(&self, session_id: Uuid) -> PeerInfo {
        PeerInfo {
            session_id,
            device_name: self.device_name.clone(),
            joined_at: self.joined_at,
        }
    }
}

#[derive(Default)]
struct Room {
    peers: HashMap<Uuid, PeerHandle>,
}

/// Granted to a session on a successful `join_room`.
#[derive(Debug)]
pub struct JoinGrant {
    pub session_id: Uuid,
    pub peers: Vec<PeerInfo>,
}

/// Point-in-time registry counts for status and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub peers: usize,
}

/// In-memory signaling state. Process-local by design: a restart wipes all
/// rooms and peers must rejoin.
pub struct Hub {
    rooms: DashMap<String, Room>,
    index: DashMap<Uuid, String>,
    peer_count: AtomicUsize,
    cfg: HubConfig,
}

impl Hub {
    pub fn new(cfg: HubConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            index: DashMap::new(),
            peer_count: AtomicUsize::new(0),
            cfg,
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.rooms.len(),
            peers: self.peer_count.load(Ordering::Relaxed),
        }
    }

    /// Add a peer to a room. Assigns a fresh session id (never reused),
    /// snapshots the existing members for the `joined` reply, and notifies
    /// them with exactly one `peer_joined` each.
    pub fn join(
        &self,
        room_id: &str,
        device_name: Option<String>,
        outbox: PeerOutbox,
    ) -> Result<JoinGrant, SignalErrorCode> {
        if !valid_room_id(room_id, self.cfg.room_id_max_len) {
            return Err(SignalErrorCode::ValidationFailed);
        }
        if !self.rooms.contains_key(room_id) && self.rooms.len() >= self.cfg.max_rooms {
            return Err(SignalErrorCode::Unavailable);
        }

        let session_id = Uuid::new_v4();
        let slow_peers;
        let peers;
        {
            let mut room = self.rooms.entry(room_id.to_string()).or_default();
            if room.peers.len() >= self.cfg.room_cap {
                // Drop the guard before the early return so an empty
                // placeholder room does not linger.
                let empty = room.peers.is_empty();
                drop(room);
                if empty {
                    self.rooms.remove_if(room_id, |_, r| r.peers.is_empty());
                }
                return Err(SignalErrorCode::Unavailable);
            }

            peers = room
                .peers
                .iter()
                .map(|(id, peer)| peer.info(*id))
                .collect();

            let handle = PeerHandle {
                device_name,
                joined_at: Utc::now(),
                outbox,
            };
            let announcement = ServerEvent::PeerJoined {
                session_id,
                device_name: handle.device_name.clone(),
                joined_at: handle.joined_at,
            };
            slow_peers = broadcast(&room, &announcement);

            room.peers.insert(session_id, handle);
            self.index.insert(session_id, room_id.to_string());
            self.peer_count.fetch_add(1, Ordering::Relaxed);
        }

        for victim in slow_peers {
            self.evict(victim, Some(SignalErrorCode::SendBufferExhausted));
        }

        Ok(JoinGrant { session_id, peers })
    }

    /// Remove a peer and notify the remaining members with exactly one
    /// `peer_left`. Returns false when the session was already gone.
    pub fn leave(&self, session_id: Uuid) -> bool {
        self.evict(session_id, None)
    }

    /// Relay a directed message. The caller has already stamped
    /// `sender_session`; the hub only routes.
    pub fn forward(
        &self,
        sender: Uuid,
        target: Uuid,
        event: ServerEvent,
    ) -> Result<(), SignalErrorCode> {
        let sender_room = self
            .index
            .get(&sender)
            .map(|r| r.value().clone())
            .ok_or(SignalErrorCode::ValidationFailed)?;

        let target_room = self.index.get(&target).map(|r| r.value().clone());
        match target_room {
            None => return Err(SignalErrorCode::UnknownPeer),
            Some(room) if room != sender_room => {
                return Err(SignalErrorCode::CrossRoomForbidden);
            }
            Some(_) => {}
        }

        let overflowed = {
            let Some(room) = self.rooms.get(&sender_room) else {
                return Err(SignalErrorCode::UnknownPeer);
            };
            let Some(peer) = room.peers.get(&target) else {
                return Err(SignalErrorCode::UnknownPeer);
            };
            matches!(
                peer.outbox.tx.try_send(event),
                Err(mpsc::error::TrySendError::Full(_))
            )
        };

        // Delivery is best-effort: a full queue closes the slow recipient
        // rather than surfacing an error to the sender.
        if overflowed {
            self.evict(target, Some(SignalErrorCode::SendBufferExhausted));
        }
        Ok(())
    }

    /// Close sessions whose last inbound frame is older than the idle
    /// timeout. Called from the heartbeat task. Returns the evicted ids.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let cutoff = now.timestamp() - self.cfg.idle_timeout_secs;
        let mut stale = Vec::new();
        for room in self.rooms.iter() {
            for (id, peer) in room.peers.iter() {
                if peer.outbox.last_seen.load(Ordering::Relaxed) < cutoff {
                    stale.push(*id);
                }
            }
        }
        for &id in &stale {
            self.evict(id, None);
        }
        stale
    }

    /// Remove a session, stamp its close reason, and broadcast `peer_left`.
    /// Rooms left empty are garbage-collected immediately. Idempotent; the
    /// worklist absorbs cascades where a `peer_left` broadcast overflows
    /// another slow peer.
    fn evict(&self, session_id: Uuid, reason: Option<SignalErrorCode>) -> bool {
        let mut removed_target = false;
        let mut worklist = vec![(session_id, reason)];

        while let Some((sid, why)) = worklist.pop() {
            let Some((_, room_id)) = self.index.remove(&sid) else {
                continue;
            };

            let mut room_empty = false;
            if let Some(mut room) = self.rooms.get_mut(&room_id) {
                if let Some(peer) = room.peers.remove(&sid) {
                    if let Some(code) = why {
                        let _ = peer.outbox.close_reason.set(code);
                    }
                    // Wake the session task; it reads the reason, tells the
                    // client, and closes the socket.
                    peer.outbox.closed.notify_one();
                    self.peer_count.fetch_sub(1, Ordering::Relaxed);
                    if sid == session_id {
                        removed_target = true;
                    }

                    let slow = broadcast(&room, &ServerEvent::PeerLeft { session_id: sid });
                    worklist.extend(
                        slow.into_iter()
                            .map(|v| (v, Some(SignalErrorCode::SendBufferExhausted))),
                    );
                }
                room_empty = room.peers.is_empty();
            }

            if room_empty {
                self.rooms.remove_if(&room_id, |_, r| r.peers.is_empty());
            }
        }

        removed_target
    }
}

/// Fan out an event to every peer in the room. Returns the peers whose
/// queues overflowed; the caller evicts them outside the room lock.
fn broadcast(room: &Room, event: &ServerEvent) -> Vec<Uuid> {
    let mut slow = Vec::new();
    for (id, peer) in room.peers.iter() {
        if let Err(mpsc::error::TrySendError::Full(_)) = peer.outbox.tx.try_send(event.clone()) {
            slow.push(*id);
        }
    }
    slow
}

fn valid_room_id(room_id: &str, max_len: usize) -> bool {
    !room_id.is_empty()
        && room_id.len() <= max_len
        && room_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
