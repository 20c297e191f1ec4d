//! TCP acceptor and per-session receiver tasks.
//!
//! Everything here is pure I/O: raw bytes come off the sockets, get decoded
//! best-effort as text and are forwarded into the engine's single event
//! inbox. No task in this module ever touches the roster, scores or round
//! state; admission decisions included, those belong to the engine.

use crate::session::SessionId;
use log::{debug, error, warn};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// Events flowing from the I/O tasks into the game engine's inbox.
///
/// This is the only path through which connection activity ever reaches the
/// engine; arrival order on the channel is the order used for first-correct
/// grading.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection finished its handshake and awaits an admission decision.
    JoinRequest {
        username: String,
        stream: TcpStream,
    },
    /// A non-empty line of text from a live session, already trimmed.
    Message {
        session_id: SessionId,
        text: String,
    },
    /// The session's socket reached EOF or failed.
    Disconnected { session_id: SessionId },
}

const HANDSHAKE_BUFFER: usize = 256;
const RECEIVE_BUFFER: usize = 1024;

/// Spawns the accept loop.
///
/// Each accepted connection gets its own handshake task so a client that
/// connects and never sends a username cannot stall the listener. Accept
/// errors terminate the loop: fatal for new connections, existing sessions
/// are unaffected.
pub fn spawn_acceptor(listener: TcpListener, events: mpsc::UnboundedSender<ServerEvent>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    spawn_handshake(stream, events.clone());
                }
                Err(e) => {
                    error!(
                        "Accept failed, no further connections will be admitted: {}",
                        e
                    );
                    break;
                }
            }
        }
    });
}

/// Reads the join handshake from a fresh connection.
///
/// The very first read on the socket is trusted to contain the whole
/// username; there is no delimiter in the protocol. The trimmed result is
/// forwarded to the engine, which validates it and replies.
fn spawn_handshake(mut stream: TcpStream, events: mpsc::UnboundedSender<ServerEvent>) {
    tokio::spawn(async move {
        let mut buf = [0u8; HANDSHAKE_BUFFER];
        match stream.read(&mut buf).await {
            Ok(0) => debug!("Connection closed before handshake"),
            Ok(n) => {
                let username = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                // Empty usernames are still forwarded so the engine can send
                // the specific rejection message.
                let _ = events.send(ServerEvent::JoinRequest { username, stream });
            }
            Err(e) => warn!("Handshake read failed: {}", e),
        }
    });
}

/// Spawns the read loop for one admitted session.
///
/// The loop waits on the socket and on the session's stop signal at the
/// same time, so the engine can retire the task promptly without it ever
/// blocking forever on a silent peer. EOF and read errors both become a
/// single `Disconnected` event; an engine-initiated stop emits nothing,
/// the engine already knows.
pub fn spawn_receiver(
    session_id: SessionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ServerEvent>,
    mut stop: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; RECEIVE_BUFFER];
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        let _ = events.send(ServerEvent::Disconnected { session_id });
                        break;
                    }
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                        if !text.is_empty()
                            && events
                                .send(ServerEvent::Message { session_id, text })
                                .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Read error on session {}: {}", session_id, e);
                        let _ = events.send(ServerEvent::Disconnected { session_id });
                        break;
                    }
                }
            }
        }
        debug!("Receiver for session {} exited", session_id);
    });
}
