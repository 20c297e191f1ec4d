//! Wire-text catalogue for the trivia protocol.
//!
//! The transport is raw TCP carrying UTF-8 text with no length framing, so
//! every string a client can ever receive is produced here and nowhere else.
//! The server, the test client and the integration tests all compare against
//! these exact strings.

/// Valid answer letters, in option order.
pub const ANSWER_OPTIONS: [char; 3] = ['A', 'B', 'C'];

/// Marker line that precedes every question block on the wire.
pub const QUESTION_MARKER: &str = "[QUESTION]";

pub const SCOREBOARD_HEADER: &str = "===== SCOREBOARD =====";
pub const GAME_OVER_HEADER: &str = "===== GAME OVER =====";
pub const FINAL_RESULTS_HEADER: &str = "=== FINAL RESULTS ===";
pub const NO_SCORES_LINE: &str = "No scores to display.";

// Admission rejections, one distinct string per failure mode.
pub const REJECT_GAME_IN_PROGRESS: &str =
    "A game is already in progress, please try again later.";
pub const REJECT_USERNAME_REQUIRED: &str = "A username is required to join.";
pub const REJECT_USERNAME_TAKEN: &str = "That username is already connected.";

pub fn welcome(username: &str) -> String {
    format!("Welcome {}! *-*", username)
}

pub fn join_notice(username: &str) -> String {
    format!("player {} joined the game", username)
}

pub fn leave_notice(username: &str, reason: &str) -> String {
    format!("player '{}' left the game ({})", username, reason)
}

/// Builds the question block broadcast at the start of a round.
///
/// The separator length tracks the question text so the block reads as a
/// box around the longest line. Option lines carry their own letter labels
/// straight from the question bank and are emitted verbatim.
pub fn question_block(number: u32, text: &str, options: &[String; 3]) -> String {
    let separator = "=".repeat(text.chars().count());
    let mut lines = vec![
        QUESTION_MARKER.to_string(),
        separator.clone(),
        format!("Question {}", number),
        text.to_string(),
    ];
    lines.extend(options.iter().cloned());
    lines.push(separator);
    lines.join("\n")
}

/// Builds the scoreboard block from `(username, score)` pairs.
///
/// Entries are emitted in the order given; the caller is responsible for
/// iterating players in registration order.
pub fn scoreboard_block<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut lines = vec![SCOREBOARD_HEADER.to_string()];
    let mut any = false;
    for (name, score) in entries {
        lines.push(format!("{} : {}", name, score));
        any = true;
    }
    if !any {
        lines.push(NO_SCORES_LINE.to_string());
    }
    lines.push("=".repeat(SCOREBOARD_HEADER.chars().count()));
    lines.join("\n")
}

/// Builds the final results block from already-ranked `(rank, username,
/// score)` entries.
pub fn final_results_block<'a, I>(ranked: I) -> String
where
    I: IntoIterator<Item = (usize, &'a str, u32)>,
{
    let mut lines = vec![
        GAME_OVER_HEADER.to_string(),
        FINAL_RESULTS_HEADER.to_string(),
    ];
    for (rank, name, score) in ranked {
        lines.push(format!("{}. {} — {}", rank, name, score));
    }
    lines.join("\n")
}

pub fn first_correct_feedback(points: u32) -> String {
    format!(
        "You were the first to answer correctly! You earned {} points.",
        points
    )
}

pub fn correct_feedback() -> String {
    "Correct! You earned 1 point.".to_string()
}

pub fn wrong_feedback(correct: char) -> String {
    format!("Wrong! The correct answer was {}.", correct)
}

/// Extracts the answer letter from a raw client line.
///
/// Only the first character is significant and it is upper-cased before
/// comparison, so "b", "B" and "b) because..." all submit 'B'. Returns
/// `None` for whitespace-only input.
pub fn parse_answer(text: &str) -> Option<char> {
    text.trim().chars().next().map(|c| c.to_ascii_uppercase())
}
