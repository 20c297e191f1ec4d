//! Integration tests for the trivia server
//!
//! These tests run the real server over real TCP sockets and validate the
//! documented wire catalogue: admission, notices, round flow, grading and
//! the final ranking.

use server::game::{GameConfig, GameServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Delay long enough for the server to observe one event before the next
/// one is produced, used where arrival order matters.
const ORDERING_GAP: Duration = Duration::from_millis(300);

const TWO_QUESTION_BANK: &str = "\
What is 2+2?
A) 3
B) 4
C) 5
Answer: B
What is the capital of Norway?
A) Oslo
B) Bergen
C) Stavanger
Answer: A
";

const ONE_QUESTION_BANK: &str = "\
What is 2+2?
A) 3
B) 4
C) 5
Answer: B
";

/// Two lines short of a complete question group.
const MALFORMED_BANK: &str = "\
What is 2+2?
A) 3
B) 4
";

/// Writes a bank file unique to this test invocation.
fn write_bank(contents: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "trivia-bank-{}-{}.txt",
        std::process::id(),
        n
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Starts a server on an ephemeral port and returns its address.
async fn start_server(bank: &str, num_questions: u32, min_players: usize) -> SocketAddr {
    start_server_with_bank(write_bank(bank), num_questions, min_players).await
}

/// Like `start_server`, but with a caller-owned bank path so a test can
/// rewrite the file while the server is running.
async fn start_server_with_bank(
    bank_path: PathBuf,
    num_questions: u32,
    min_players: usize,
) -> SocketAddr {
    let config = GameConfig {
        bank_path,
        num_questions,
        min_players,
    };
    let mut game_server = GameServer::bind("127.0.0.1:0", config).await.unwrap();
    let addr = game_server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = game_server.run().await;
    });
    addr
}

/// A scripted player connection with a consume-forward read buffer, so a
/// test can assert on message order without caring how the server splits
/// its writes.
struct TestClient {
    stream: TcpStream,
    buffer: String,
}

impl TestClient {
    /// Connects and sends the handshake username.
    async fn join(addr: SocketAddr, username: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(username.as_bytes()).await.unwrap();
        TestClient {
            stream,
            buffer: String::new(),
        }
    }

    /// Reads until the unconsumed buffer contains `needle`, then consumes
    /// through the end of the match.
    async fn expect(&mut self, needle: &str) {
        let result = timeout(WAIT, async {
            loop {
                if let Some(pos) = self.buffer.find(needle) {
                    self.buffer.drain(..pos + needle.len());
                    return;
                }
                let mut buf = [0u8; 4096];
                let n = self.stream.read(&mut buf).await.expect("read failed");
                if n == 0 {
                    panic!(
                        "connection closed while waiting for {:?}; buffered: {:?}",
                        needle, self.buffer
                    );
                }
                self.buffer.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        })
        .await;
        if result.is_err() {
            panic!(
                "timed out waiting for {:?}; buffered: {:?}",
                needle, self.buffer
            );
        }
    }

    async fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
    }

    /// Waits for the server to close the connection.
    async fn expect_eof(&mut self) {
        let mut buf = [0u8; 4096];
        loop {
            let n = timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for EOF")
                .expect("read failed");
            if n == 0 {
                return;
            }
        }
    }
}

/// ADMISSION TESTS
mod admission_tests {
    use super::*;

    /// Welcome goes to the joiner, the join notice to everyone else.
    #[tokio::test]
    async fn welcome_and_join_notice() {
        let addr = start_server(TWO_QUESTION_BANK, 2, 10).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;

        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;
        alice.expect("player bob joined the game").await;
    }

    /// A duplicate username is rejected and the original session is
    /// unaffected.
    #[tokio::test]
    async fn duplicate_username_rejected() {
        let addr = start_server(TWO_QUESTION_BANK, 2, 10).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;

        let mut imposter = TestClient::join(addr, "alice").await;
        imposter.expect(shared::REJECT_USERNAME_TAKEN).await;

        // The original alice still receives broadcasts.
        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;
        alice.expect("player bob joined the game").await;
    }

    #[tokio::test]
    async fn empty_username_rejected() {
        let addr = start_server(TWO_QUESTION_BANK, 2, 10).await;

        let mut client = TestClient::join(addr, "   ").await;
        client.expect(shared::REJECT_USERNAME_REQUIRED).await;
    }

    /// A vanished player produces a leave notice for the others.
    #[tokio::test]
    async fn leave_notice_broadcast_on_disconnect() {
        let addr = start_server(TWO_QUESTION_BANK, 2, 10).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;
        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;
        alice.expect("player bob joined the game").await;

        drop(bob);
        alice
            .expect("player 'bob' left the game (disconnected)")
            .await;
    }
}

/// GAME FLOW TESTS
mod game_flow_tests {
    use super::*;

    /// The full two-player scenario: two rounds, alice first and correct in
    /// both, bob wrong in both. Verifies feedback, scoreboards, the
    /// first-correct bonus arithmetic, the final ranking and the lobby
    /// reset.
    #[tokio::test]
    async fn two_player_end_to_end() {
        let addr = start_server(TWO_QUESTION_BANK, 2, 2).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;
        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;

        // Round 1
        alice.expect("[QUESTION]").await;
        alice.expect("Question 1").await;
        alice.expect("What is 2+2?").await;
        bob.expect("Question 1").await;

        // A third player cannot join mid-game.
        let mut charlie = TestClient::join(addr, "charlie").await;
        charlie.expect(shared::REJECT_GAME_IN_PROGRESS).await;

        alice.send("B").await;
        sleep(ORDERING_GAP).await;
        bob.send("C").await;

        // Two players in the round: first-correct earns 1 + 1 = 2.
        alice
            .expect("You were the first to answer correctly! You earned 2 points.")
            .await;
        bob.expect("Wrong! The correct answer was B.").await;

        alice.expect("===== SCOREBOARD =====").await;
        alice.expect("alice : 2").await;
        alice.expect("bob : 0").await;

        // Round 2
        alice.expect("Question 2").await;
        alice.expect("What is the capital of Norway?").await;
        bob.expect("Question 2").await;

        alice.send("A").await;
        sleep(ORDERING_GAP).await;
        bob.send("B").await;

        alice.expect("You earned 2 points.").await;
        bob.expect("Wrong! The correct answer was A.").await;

        // Final results: alice 2 * (1 + 1) = 4, bob 0.
        alice.expect("===== GAME OVER =====").await;
        alice.expect("=== FINAL RESULTS ===").await;
        alice.expect("1. alice — 4").await;
        alice.expect("2. bob — 0").await;
        bob.expect("2. bob — 0").await;

        // End of game disconnects everyone and reopens the lobby.
        alice.expect_eof().await;
        bob.expect_eof().await;

        let mut dave = TestClient::join(addr, "dave").await;
        dave.expect("Welcome dave! *-*").await;
    }

    /// A player who disconnects mid-round shrinks the expected set;
    /// grading proceeds with the remaining answers and the bonus still
    /// reflects the roster size at round start.
    #[tokio::test]
    async fn disconnect_mid_round_shrinks_expected_set() {
        let addr = start_server(ONE_QUESTION_BANK, 1, 3).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;
        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;
        let mut carol = TestClient::join(addr, "carol").await;
        carol.expect("Welcome carol! *-*").await;

        alice.expect("Question 1").await;
        bob.expect("Question 1").await;
        carol.expect("Question 1").await;

        // Carol leaves without answering.
        drop(carol);

        alice.send("B").await;
        sleep(ORDERING_GAP).await;
        bob.send("C").await;

        alice
            .expect("player 'carol' left the game (disconnected)")
            .await;

        // Three players started the round, so the bonus is 2.
        alice
            .expect("You were the first to answer correctly! You earned 3 points.")
            .await;
        bob.expect("Wrong! The correct answer was B.").await;

        alice.expect("===== SCOREBOARD =====").await;
        alice.expect("alice : 3").await;
        alice.expect("bob : 0").await;

        alice.expect("1. alice — 3").await;
        alice.expect("2. bob — 0").await;
    }

    /// With a one-question bank and three rounds, the bank replays
    /// cyclically on the wire.
    #[tokio::test]
    async fn question_bank_replays_cyclically() {
        let addr = start_server(ONE_QUESTION_BANK, 3, 2).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;
        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;

        for round in 1..=3 {
            alice.expect(&format!("Question {}", round)).await;
            alice.expect("What is 2+2?").await;
            bob.expect(&format!("Question {}", round)).await;

            alice.send("B").await;
            sleep(ORDERING_GAP).await;
            bob.send("B").await;

            alice.expect("You earned 2 points.").await;
            bob.expect("Correct! You earned 1 point.").await;
        }

        alice.expect("1. alice — 6").await;
        alice.expect("2. bob — 3").await;
    }

    /// A malformed bank aborts game setup only: the lobby stays open, the
    /// connected players are kept, and once the operator fixes the file the
    /// next join attempt starts a game, all without a restart.
    #[tokio::test]
    async fn bad_bank_aborts_setup_and_retries_after_fix() {
        let bank_path = write_bank(MALFORMED_BANK);
        let addr = start_server_with_bank(bank_path.clone(), 1, 2).await;

        let mut alice = TestClient::join(addr, "alice").await;
        alice.expect("Welcome alice! *-*").await;

        // Reaching the threshold triggers a setup attempt that fails.
        let mut bob = TestClient::join(addr, "bob").await;
        bob.expect("Welcome bob! *-*").await;

        // The lobby is still accepting: a later join is welcomed, not
        // rejected, and triggers another failed setup.
        let mut carol = TestClient::join(addr, "carol").await;
        carol.expect("Welcome carol! *-*").await;
        alice.expect("player carol joined the game").await;

        // Let the carol-triggered setup attempt fail before fixing the file.
        sleep(ORDERING_GAP).await;
        std::fs::write(&bank_path, ONE_QUESTION_BANK).unwrap();

        // The next join re-runs setup against the fixed bank and the game
        // starts for everyone.
        let mut dave = TestClient::join(addr, "dave").await;
        dave.expect("Welcome dave! *-*").await;
        alice.expect("Question 1").await;
        bob.expect("What is 2+2?").await;
        dave.expect("Question 1").await;
        carol.expect("Question 1").await;
    }
}
