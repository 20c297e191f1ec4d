//! Game engine and round state machine.
//!
//! The engine is the sole consumer of the event inbox and the only place
//! that mutates the roster, the scores and the round answers. The acceptor
//! and the receivers communicate with it purely by enqueueing events, so
//! none of the shared game state needs a lock.

use crate::network::{spawn_acceptor, spawn_receiver, ServerEvent};
use crate::questions::{load_question_bank, BankError, Question};
use crate::session::{SessionId, SessionManager};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long the engine waits on the inbox before re-checking the expected
/// set during answer collection. A cooperative poll, not a busy spin.
const INBOX_POLL: Duration = Duration::from_millis(250);

/// Upper bound on the questions-per-game setting.
const MAX_QUESTIONS: u32 = 100;

// Reasons attached to leave notices.
const REASON_DISCONNECTED: &str = "disconnected";
const REASON_CONNECTION_LOST: &str = "connection lost";

/// Lifecycle of one game.
///
/// Transitions run strictly forward, `Lobby → Configuring → InRound(1) →
/// Grading(1) → … → GameOver → Lobby`, except that a failed setup falls
/// back from `Configuring` to `Lobby` and any round can short-circuit to
/// `GameOver` once the player count drops to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Lobby,
    Configuring,
    InRound(u32),
    Grading(u32),
    GameOver,
}

impl GamePhase {
    /// New connections are admitted only before a game starts.
    pub fn accepting_players(self) -> bool {
        matches!(self, GamePhase::Lobby | GamePhase::Configuring)
    }
}

/// Operator-facing game settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Path to the question-bank file, re-read at each game start
    pub bank_path: PathBuf,
    /// Questions per game, validated to (0, 100]
    pub num_questions: u32,
    /// Lobby size required before a game starts (at least 2)
    pub min_players: usize,
}

/// Configuration errors that abort game setup only.
///
/// The server stays in the lobby and retries setup the next time the
/// player threshold is reached, so the operator can fix the bank file
/// without restarting the process.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("number of questions must be between 1 and {MAX_QUESTIONS} (got {0})")]
    QuestionCountOutOfRange(u32),
    #[error(transparent)]
    Bank(#[from] BankError),
}

/// Engine-level failures during an active game.
///
/// Caught at the top of the round loop; the game ends early but the
/// end-of-game cleanup still runs so the server returns to an accepting
/// state with no partially-updated scores left behind.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("question index {index} out of range for bank of {len}")]
    QuestionIndex { index: usize, len: usize },
}

/// Score totals for one player, created at game start and deleted (not
/// zeroed) when the player leaves.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayerScore {
    /// Points accumulated across the rounds of the current game
    pub round_total: u32,
    /// All-time total, used for the final ranking
    pub all_time: u32,
}

impl PlayerScore {
    fn award(&mut self, points: u32) {
        self.round_total += points;
        self.all_time += points;
    }
}

/// Outcome for one submitted answer, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First correct answer of the round; `points` includes the bonus.
    FirstCorrect { points: u32 },
    Correct,
    Wrong { answer: char },
}

/// Grades collected answers in arrival order.
///
/// The first correct entry earns `1 + (players_in_round - 1)`; later
/// correct entries earn 1; wrong entries earn nothing. Arrival order is
/// exactly the order answers were drained from the inbox, never a map
/// iteration order.
pub fn judge_answers(
    answers: &[(SessionId, char)],
    correct: char,
    players_in_round: usize,
) -> Vec<(SessionId, Verdict)> {
    let bonus = players_in_round.saturating_sub(1) as u32;
    let mut seen_correct = false;

    answers
        .iter()
        .map(|(session_id, letter)| {
            let verdict = if *letter == correct {
                if seen_correct {
                    Verdict::Correct
                } else {
                    seen_correct = true;
                    Verdict::FirstCorrect { points: 1 + bonus }
                }
            } else {
                Verdict::Wrong { answer: correct }
            };
            (*session_id, verdict)
        })
        .collect()
}

/// Bank index for a 1-based round number; the bank replays cyclically when
/// the game asks for more questions than the bank holds.
pub fn bank_index(round: u32, bank_len: usize) -> usize {
    (round as usize - 1) % bank_len
}

/// Competition ranking over `(username, score)` entries.
///
/// Sorted by score descending, username ascending for stability among
/// ties. Tied entries share a rank and the next distinct score takes its
/// 1-based position, so scores [9, 9, 7] rank [1, 1, 3].
pub fn competition_ranking(mut entries: Vec<(String, u32)>) -> Vec<(usize, String, u32)> {
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut ranked = Vec::with_capacity(entries.len());
    let mut previous_score = None;
    let mut current_rank = 0;
    for (position, (name, score)) in entries.into_iter().enumerate() {
        if previous_score != Some(score) {
            current_rank = position + 1;
        }
        previous_score = Some(score);
        ranked.push((current_rank, name, score));
    }
    ranked
}

/// The trivia server: listener, session registry, scores and the round
/// state machine, all owned by the single task that calls [`run`].
///
/// [`run`]: GameServer::run
pub struct GameServer {
    listener: Option<TcpListener>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    sessions: SessionManager,
    scores: HashMap<SessionId, PlayerScore>,
    config: GameConfig,
    phase: GamePhase,
}

impl GameServer {
    pub async fn bind(addr: &str, config: GameConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, events) = mpsc::unbounded_channel();

        Ok(GameServer {
            listener: Some(listener),
            events,
            event_tx,
            sessions: SessionManager::new(),
            scores: HashMap::new(),
            config,
            phase: GamePhase::Lobby,
        })
    }

    /// The bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "listener already handed to the acceptor",
            )),
        }
    }

    /// Main engine loop: drains the inbox forever, starting a game whenever
    /// the lobby reaches the configured minimum player count.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self
            .listener
            .take()
            .ok_or("server is already running")?;
        spawn_acceptor(listener, self.event_tx.clone());

        info!(
            "Lobby open, waiting for {} players to start a game",
            self.config.min_players
        );

        loop {
            let event = match self.events.recv().await {
                Some(event) => event,
                None => break,
            };
            self.handle_lobby_event(event).await;

            if self.phase == GamePhase::Lobby && self.sessions.len() >= self.config.min_players {
                self.run_game().await;
            }
        }

        Ok(())
    }

    async fn handle_lobby_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::JoinRequest { username, stream } => {
                self.handle_join(username, stream).await;
            }
            ServerEvent::Message { session_id, text } => {
                debug!("Ignoring lobby message from session {}: {}", session_id, text);
            }
            ServerEvent::Disconnected { session_id } => {
                self.drop_session(session_id, REASON_DISCONNECTED).await;
            }
        }
    }

    /// Admission: validates in order game-in-progress, empty username,
    /// duplicate username; each failure gets its own rejection string and
    /// the connection is closed without creating a session.
    async fn handle_join(&mut self, username: String, stream: TcpStream) {
        if !self.phase.accepting_players() {
            debug!("Rejecting '{}': game in progress", username);
            Self::reject(stream, shared::REJECT_GAME_IN_PROGRESS).await;
            return;
        }
        if username.is_empty() {
            Self::reject(stream, shared::REJECT_USERNAME_REQUIRED).await;
            return;
        }
        if self.sessions.username_taken(&username) {
            debug!("Rejecting duplicate username '{}'", username);
            Self::reject(stream, shared::REJECT_USERNAME_TAKEN).await;
            return;
        }

        let addr = match stream.peer_addr() {
            Ok(addr) => addr,
            // Peer vanished between accept and admission.
            Err(_) => return,
        };
        let (reader, writer) = stream.into_split();
        let Some((session_id, stop_rx)) = self.sessions.add_session(username.clone(), addr, writer)
        else {
            warn!("Username '{}' taken during admission", username);
            return;
        };

        if self.sessions.send_to(session_id, &shared::welcome(&username)).await.is_err() {
            self.drop_session(session_id, REASON_CONNECTION_LOST).await;
            return;
        }
        self.broadcast_reaping_except(&shared::join_notice(&username), Some(session_id))
            .await;
        spawn_receiver(session_id, reader, self.event_tx.clone(), stop_rx);

        info!(
            "Player '{}' joined ({}/{} in lobby)",
            username,
            self.sessions.len(),
            self.config.min_players
        );
    }

    async fn reject(mut stream: TcpStream, message: &str) {
        let _ = stream.write_all(message.as_bytes()).await;
        let _ = stream.write_all(b"\n").await;
        let _ = stream.shutdown().await;
    }

    /// Runs one complete game and always returns the server to an
    /// accepting lobby, even if a round fails mid-way.
    async fn run_game(&mut self) {
        self.phase = GamePhase::Configuring;
        let bank = match self.prepare_game() {
            Ok(bank) => bank,
            Err(e) => {
                error!("Game setup failed, returning to lobby: {}", e);
                self.phase = GamePhase::Lobby;
                return;
            }
        };

        info!(
            "Starting game: {} questions ({} in bank) for {} players",
            self.config.num_questions,
            bank.len(),
            self.sessions.len()
        );
        self.scores = self
            .sessions
            .ids()
            .into_iter()
            .map(|id| (id, PlayerScore::default()))
            .collect();

        if let Err(e) = self.play_rounds(&bank).await {
            error!("Round failed, ending game early: {}", e);
        }
        self.finish_game().await;
    }

    /// Validates the question count and loads the bank. Runs on every game
    /// start so a fixed bank file is picked up without a restart.
    fn prepare_game(&self) -> Result<Vec<Question>, SetupError> {
        let n = self.config.num_questions;
        if n == 0 || n > MAX_QUESTIONS {
            return Err(SetupError::QuestionCountOutOfRange(n));
        }
        Ok(load_question_bank(&self.config.bank_path)?)
    }

    async fn play_rounds(&mut self, bank: &[Question]) -> Result<(), GameError> {
        for round in 1..=self.config.num_questions {
            if self.sessions.is_empty() {
                info!("No players left, ending game early");
                break;
            }

            let index = bank_index(round, bank.len());
            let question = bank.get(index).ok_or(GameError::QuestionIndex {
                index,
                len: bank.len(),
            })?;

            self.phase = GamePhase::InRound(round);
            let players_in_round = self.sessions.len();
            info!(
                "Round {} starting with {} players (bank question {})",
                round,
                players_in_round,
                index + 1
            );

            let block = shared::question_block(round, &question.text, &question.options);
            self.broadcast_reaping(&block).await;

            let answers = self.collect_answers().await;
            self.phase = GamePhase::Grading(round);
            if answers.is_empty() {
                info!("Round {} collected no answers, skipping grading", round);
                continue;
            }

            self.grade_round(question, &answers, players_in_round).await;
            let scoreboard = self.scoreboard();
            self.broadcast_reaping(&scoreboard).await;
        }
        Ok(())
    }

    /// Drains the inbox until every expected session has answered or the
    /// expected set is empty.
    ///
    /// Answers are recorded first-come in a vector; that arrival order is
    /// what later decides the first-correct bonus. Disconnects shrink both
    /// the roster and the expected set, duplicate or stale messages are
    /// ignored, and joins are turned away mid-game.
    async fn collect_answers(&mut self) -> Vec<(SessionId, char)> {
        let mut expected: HashSet<SessionId> = self.sessions.ids().into_iter().collect();
        let mut answers: Vec<(SessionId, char)> = Vec::new();

        while !expected.is_empty() {
            let event = match timeout(INBOX_POLL, self.events.recv()).await {
                Err(_) => {
                    expected.retain(|id| self.sessions.contains(*id));
                    continue;
                }
                Ok(None) => break,
                Ok(Some(event)) => event,
            };

            match event {
                ServerEvent::Message { session_id, text } => {
                    if !expected.contains(&session_id) {
                        debug!("Ignoring message from session {}: {}", session_id, text);
                    } else if let Some(letter) = shared::parse_answer(&text) {
                        debug!("Session {} answered '{}'", session_id, letter);
                        answers.push((session_id, letter));
                        expected.remove(&session_id);
                    }
                }
                ServerEvent::Disconnected { session_id } => {
                    expected.remove(&session_id);
                    self.drop_session(session_id, REASON_DISCONNECTED).await;
                }
                ServerEvent::JoinRequest { username, stream } => {
                    debug!("Rejecting join from '{}' mid-game", username);
                    Self::reject(stream, shared::REJECT_GAME_IN_PROGRESS).await;
                }
            }

            // Leave-notice broadcasts can reap further sessions; keep the
            // expected set a subset of the live roster.
            expected.retain(|id| self.sessions.contains(*id));
        }

        // Never grade answers from sessions that left after answering.
        answers.retain(|(id, _)| self.sessions.contains(*id));
        answers
    }

    async fn grade_round(
        &mut self,
        question: &Question,
        answers: &[(SessionId, char)],
        players_in_round: usize,
    ) {
        for (session_id, verdict) in judge_answers(answers, question.answer, players_in_round) {
            let feedback = match verdict {
                Verdict::FirstCorrect { points } => {
                    self.award(session_id, points);
                    if let Some(name) = self.sessions.username(session_id) {
                        info!("'{}' answered first and correctly (+{})", name, points);
                    }
                    shared::first_correct_feedback(points)
                }
                Verdict::Correct => {
                    self.award(session_id, 1);
                    shared::correct_feedback()
                }
                Verdict::Wrong { answer } => shared::wrong_feedback(answer),
            };
            // A failed feedback send is swallowed: the session is already
            // gone or its disconnect event is in flight, and grading must
            // continue for the other players.
            let _ = self.sessions.send_to(session_id, &feedback).await;
        }
    }

    fn award(&mut self, session_id: SessionId, points: u32) {
        if let Some(score) = self.scores.get_mut(&session_id) {
            score.award(points);
        }
    }

    /// Scoreboard in registration order, not sorted.
    fn scoreboard(&self) -> String {
        shared::scoreboard_block(self.sessions.iter_ordered().map(|session| {
            let score = self
                .scores
                .get(&session.id)
                .map(|s| s.round_total)
                .unwrap_or(0);
            (session.username.as_str(), score)
        }))
    }

    /// Broadcasts the final ranking, disconnects everyone and reopens the
    /// lobby so a new game can be configured without a process restart.
    async fn finish_game(&mut self) {
        self.phase = GamePhase::GameOver;

        let entries: Vec<(String, u32)> = self
            .sessions
            .iter_ordered()
            .map(|session| {
                let score = self
                    .scores
                    .get(&session.id)
                    .map(|s| s.all_time)
                    .unwrap_or(0);
                (session.username.clone(), score)
            })
            .collect();
        let ranked = competition_ranking(entries);
        for (rank, name, score) in &ranked {
            info!("Final ranking {}. {} with {} points", rank, name, score);
        }

        let block =
            shared::final_results_block(ranked.iter().map(|(r, n, s)| (*r, n.as_str(), *s)));
        self.broadcast_reaping(&block).await;

        self.sessions.disconnect_all().await;
        self.scores.clear();
        self.phase = GamePhase::Lobby;
        info!("Game over, lobby reopened for new players");
    }

    /// Removes one session (roster and score entry) and broadcasts the
    /// leave notice to everyone still connected.
    async fn drop_session(&mut self, session_id: SessionId, reason: &str) {
        let Some(session) = self.sessions.remove_session(session_id) else {
            // Already reaped by a failed broadcast; the late disconnect
            // event is harmless.
            return;
        };
        self.scores.remove(&session_id);
        info!("Player '{}' left ({})", session.username, reason);

        let notice = shared::leave_notice(&session.username, reason);
        self.broadcast_reaping(&notice).await;
    }

    async fn broadcast_reaping(&mut self, text: &str) {
        self.broadcast_reaping_except(text, None).await;
    }

    /// Best-effort broadcast: any send failure removes that session and
    /// broadcasts its leave notice, without ever failing the original
    /// broadcast for the remaining sessions.
    async fn broadcast_reaping_except(&mut self, text: &str, exclude: Option<SessionId>) {
        let mut failed = self.sessions.broadcast(text, exclude).await;
        while let Some(session_id) = failed.pop() {
            if let Some(session) = self.sessions.remove_session(session_id) {
                self.scores.remove(&session_id);
                warn!("Dropping session '{}': send failed", session.username);
                let notice = shared::leave_notice(&session.username, REASON_CONNECTION_LOST);
                failed.extend(self.sessions.broadcast(&notice, None).await);
            }
        }
    }
}
