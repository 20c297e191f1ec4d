//! # Trivia Session Server Library
//!
//! This library provides the authoritative server for a multiplayer trivia
//! game over raw TCP. It admits players through a username handshake, runs
//! a round-based question/answer protocol, grades answers with an
//! ordering-sensitive first-correct bonus and produces a competition-ranked
//! final result.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All mutable game state (the session roster, the score map, the current
//! round's answers) is owned by one engine task. Every other task (the
//! connection acceptor and the per-session receivers) communicates with it
//! exclusively by enqueueing events onto a single multi-producer inbox.
//! Because exactly one logical actor ever writes the shared maps, no locks
//! guard them and no write can race another.
//!
//! ### Round Lifecycle
//! A game starts once the lobby holds the configured minimum number of
//! players. Each round broadcasts a question block, collects answers while
//! shrinking the expected set as players disconnect, grades the collected
//! answers in inbox arrival order and broadcasts the scoreboard. After the
//! final round the competition ranking is broadcast, every session is
//! disconnected and the lobby reopens for a fresh game.
//!
//! ### Disconnect Handling
//! Transport failures are all treated the same way: the session is removed,
//! its score entry is deleted and a leave notice is broadcast. A send
//! failure during a broadcast marks the session as implicitly disconnected
//! without failing the broadcast for anyone else, and a receiver noticing
//! EOF or a read error reports it through the inbox like any other event.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Session registry: username uniqueness, registration-order iteration,
//! ownership of socket write halves and best-effort fan-out.
//!
//! ### Network Module (`network`)
//! Pure I/O tasks: the accept loop, the join handshake read and the
//! per-session receive loop, all feeding the engine's inbox.
//!
//! ### Game Module (`game`)
//! The engine itself: admission decisions, the round state machine, answer
//! collection, grading, ranking and end-of-game cleanup.
//!
//! ### Questions Module (`questions`)
//! Question-bank file loading and validation (5-line groups, terminal
//! answer letter), with configuration errors kept on the operator side.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::{GameConfig, GameServer};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig {
//!         bank_path: PathBuf::from("questions.txt"),
//!         num_questions: 10,
//!         min_players: 2,
//!     };
//!
//!     let mut server = GameServer::bind("127.0.0.1:8080", config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod questions;
pub mod session;
