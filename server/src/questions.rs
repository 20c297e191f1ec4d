//! Question-bank loading and validation.
//!
//! The bank is a plain text file of 5-line groups: the question text, the
//! three option lines (each carrying its own letter label) and an answer
//! line whose last character names the correct option. Malformed groups
//! are configuration errors surfaced to the operator, never to players.

use shared::ANSWER_OPTIONS;
use std::fs;
use std::path::Path;
use thiserror::Error;

const LINES_PER_QUESTION: usize = 5;

/// One question as loaded from the bank. Immutable for the whole game.
#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub options: [String; 3],
    /// Correct option letter, one of 'A', 'B', 'C'.
    pub answer: char,
}

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question bank '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("question bank contains no questions")]
    Empty,
    #[error("incomplete question group at line {line}: each question needs 5 lines")]
    TruncatedGroup { line: usize },
    #[error("question at line {line} has no text")]
    EmptyQuestion { line: usize },
    #[error("answer line {line} must end with one of A, B or C (got '{found}')")]
    InvalidAnswer { line: usize, found: String },
}

/// Reads and parses the bank file at `path`.
pub fn load_question_bank(path: &Path) -> Result<Vec<Question>, BankError> {
    let raw = fs::read_to_string(path).map_err(|source| BankError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_question_bank(&raw)
}

/// Parses the raw bank text into questions.
///
/// Trailing blank lines are tolerated so a terminating newline does not
/// count towards a group; blank lines inside a group are not.
pub fn parse_question_bank(raw: &str) -> Result<Vec<Question>, BankError> {
    let mut lines: Vec<&str> = raw.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    if lines.is_empty() {
        return Err(BankError::Empty);
    }
    if lines.len() % LINES_PER_QUESTION != 0 {
        // Point at the first line of the short group.
        let line = (lines.len() / LINES_PER_QUESTION) * LINES_PER_QUESTION + 1;
        return Err(BankError::TruncatedGroup { line });
    }

    let mut questions = Vec::with_capacity(lines.len() / LINES_PER_QUESTION);
    for (index, group) in lines.chunks(LINES_PER_QUESTION).enumerate() {
        let base_line = index * LINES_PER_QUESTION + 1;

        let text = group[0].trim();
        if text.is_empty() {
            return Err(BankError::EmptyQuestion { line: base_line });
        }

        let answer_line = group[4];
        let answer = answer_line
            .trim_end()
            .chars()
            .last()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| ANSWER_OPTIONS.contains(c))
            .ok_or_else(|| BankError::InvalidAnswer {
                line: base_line + 4,
                found: answer_line.to_string(),
            })?;

        questions.push(Question {
            text: text.to_string(),
            options: [
                group[1].to_string(),
                group[2].to_string(),
                group[3].to_string(),
            ],
            answer,
        });
    }

    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_BANK: &str = "\
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

    #[test]
    fn test_parse_valid_bank() {
        let questions = parse_question_bank(VALID_BANK).unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "What is 2+2?");
        assert_eq!(questions[0].options[1], "B) 4");
        assert_eq!(questions[0].answer, 'B');
        assert_eq!(questions[1].answer, 'A');
    }

    #[test]
    fn test_parse_tolerates_trailing_blank_lines() {
        let raw = format!("{}\n\n", VALID_BANK);
        let questions = parse_question_bank(&raw).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_parse_empty_bank() {
        assert!(matches!(parse_question_bank(""), Err(BankError::Empty)));
        assert!(matches!(parse_question_bank("\n\n"), Err(BankError::Empty)));
    }

    #[test]
    fn test_parse_truncated_group() {
        let raw = "What is 2+2?\nA) 3\nB) 4\n";
        match parse_question_bank(raw) {
            Err(BankError::TruncatedGroup { line }) => assert_eq!(line, 1),
            other => panic!("Expected TruncatedGroup, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncated_second_group() {
        let raw = format!("{}One more question?\nA) yes\n", VALID_BANK);
        match parse_question_bank(&raw) {
            Err(BankError::TruncatedGroup { line }) => assert_eq!(line, 11),
            other => panic!("Expected TruncatedGroup, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_invalid_answer_letter() {
        let raw = "What is 2+2?\nA) 3\nB) 4\nC) 5\nAnswer: D\n";
        match parse_question_bank(raw) {
            Err(BankError::InvalidAnswer { line, found }) => {
                assert_eq!(line, 5);
                assert_eq!(found, "Answer: D");
            }
            other => panic!("Expected InvalidAnswer, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_lowercase_answer_letter_accepted() {
        let raw = "What is 2+2?\nA) 3\nB) 4\nC) 5\nAnswer: b\n";
        let questions = parse_question_bank(raw).unwrap();
        assert_eq!(questions[0].answer, 'B');
    }

    #[test]
    fn test_parse_empty_question_text() {
        let raw = "\nA) 3\nB) 4\nC) 5\nAnswer: B\n";
        assert!(matches!(
            parse_question_bank(raw),
            Err(BankError::EmptyQuestion { line: 1 })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = Path::new("/nonexistent/question-bank.txt");
        assert!(matches!(
            load_question_bank(path),
            Err(BankError::Io { .. })
        ));
    }
}
