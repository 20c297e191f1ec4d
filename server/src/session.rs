//! Session registry and best-effort fan-out for the trivia server
//!
//! This module handles the server-side management of connected players,
//! including:
//! - Session lifecycle (admit, remove, end-of-game teardown)
//! - Username uniqueness across all live sessions
//! - Registration-order iteration for scoreboard output
//! - Best-effort broadcast where a failed send marks the session for removal
//!
//! The registry owns the write half of every session socket. Only the game
//! engine task calls into it, so writes are naturally serialized and the
//! maps need no locking.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;

/// Unique identifier assigned to each admitted connection.
pub type SessionId = u32;

/// One admitted player connection.
///
/// Holds the socket's write half and the stop signal for the session's
/// receiver task. The read half lives inside that receiver task; see
/// `network::spawn_receiver`.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the registry
    pub id: SessionId,
    /// Username accepted during the join handshake (unique among live sessions)
    pub username: String,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// When the session was admitted
    pub joined_at: Instant,
    writer: OwnedWriteHalf,
    stop: watch::Sender<bool>,
}

impl Session {
    /// Sends one logical message followed by a newline.
    ///
    /// Multi-line blocks are passed as a single string with embedded
    /// newlines and go out in one write; clients must tolerate both
    /// line-split and whole-block delivery.
    pub async fn send(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Tells this session's receiver task to exit.
    fn signal_stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// Manages all live sessions and enforces the username uniqueness invariant
///
/// The SessionManager is the single authority on who is connected. It hands
/// out session IDs, rejects duplicate usernames, and preserves registration
/// order so the scoreboard can iterate players in the order they joined.
/// All mutation happens from the game engine task.
pub struct SessionManager {
    /// Live sessions indexed by their unique ID
    sessions: HashMap<SessionId, Session>,
    /// Session IDs in registration order
    order: Vec<SessionId>,
    /// Next available session ID for new connections
    next_session_id: SessionId,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Creates an empty registry. Session IDs start from 1.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            next_session_id: 1,
        }
    }

    /// Returns true if a live session already uses `username`.
    ///
    /// Comparison is case-sensitive exact match.
    pub fn username_taken(&self, username: &str) -> bool {
        self.sessions
            .values()
            .any(|session| session.username == username)
    }

    /// Admits a new session.
    ///
    /// Returns `None` if the username is already connected, leaving the
    /// existing session untouched. On success returns the new session ID
    /// and the stop-signal receiver for the session's receiver task.
    pub fn add_session(
        &mut self,
        username: String,
        addr: SocketAddr,
        writer: OwnedWriteHalf,
    ) -> Option<(SessionId, watch::Receiver<bool>)> {
        if self.username_taken(&username) {
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        let (stop_tx, stop_rx) = watch::channel(false);
        info!("Session {} ('{}') connected from {}", id, username, addr);
        self.sessions.insert(
            id,
            Session {
                id,
                username,
                addr,
                joined_at: Instant::now(),
                writer,
                stop: stop_tx,
            },
        );
        self.order.push(id);

        Some((id, stop_rx))
    }

    /// Removes a session and stops its receiver task.
    ///
    /// Returns the removed session so the caller can report the username,
    /// or `None` if it was already gone (e.g. a disconnect event raced a
    /// broadcast failure).
    pub fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.order.retain(|other| *other != id);
        session.signal_stop();
        info!("Session {} ('{}') removed", session.id, session.username);
        Some(session)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn username(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id).map(|s| s.username.as_str())
    }

    /// Session IDs in registration order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.order.clone()
    }

    /// Iterates live sessions in registration order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    /// Sends one message to one session.
    ///
    /// The caller decides whether a failure matters; per-answer feedback
    /// swallows errors, broadcasts route them into session removal.
    pub async fn send_to(&mut self, id: SessionId, text: &str) -> std::io::Result<()> {
        match self.sessions.get_mut(&id) {
            Some(session) => session.send(text).await,
            None => Ok(()),
        }
    }

    /// Best-effort fan-out of one message to every live session.
    ///
    /// Sessions whose send fails are treated as implicitly disconnected and
    /// returned for removal; the remaining sessions still get the message.
    /// `exclude` skips one session (used for join notices, which go to
    /// existing players only).
    pub async fn broadcast(&mut self, text: &str, exclude: Option<SessionId>) -> Vec<SessionId> {
        let mut failed = Vec::new();
        for id in self.order.clone() {
            if Some(id) == exclude {
                continue;
            }
            if let Some(session) = self.sessions.get_mut(&id) {
                if session.send(text).await.is_err() {
                    failed.push(id);
                }
            }
        }
        failed
    }

    /// Forcibly disconnects every session, clearing the registry.
    ///
    /// Used at end of game so the next game starts from an empty lobby.
    /// Write halves are shut down so well-behaved clients see EOF; each
    /// receiver task exits via its stop signal.
    pub async fn disconnect_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.signal_stop();
            let _ = session.writer.shutdown().await;
        }
        self.order.clear();
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
