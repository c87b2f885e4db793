//! Error types for question generation.

use thiserror::Error;

/// A question that can't be shown: too few or blank options, or a bad correct index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question needs at least 2 options, got {0}")]
    TooFewOptions(usize),
    #[error("correct option {index} is out of range for {options} options")]
    CorrectOutOfRange { index: usize, options: usize },
    #[error("correct option is not a non-negative integer")]
    NonIntegralCorrect,
    #[error("question text is blank")]
    BlankPrompt,
    #[error("option {0} is blank")]
    BlankOption(usize),
}

/// Errors emitted while requesting a question set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerationError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("generation request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("response envelope is not valid JSON: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("question text is not valid JSON: {0}")]
    Questions(#[source] serde_json::Error),
    #[error("question text is not a JSON array")]
    NotAnArray,
    #[error("question {index} is malformed: {source}")]
    InvalidQuestion {
        index: usize,
        #[source]
        source: QuestionError,
    },
}

/// Why a session ended up empty. Cheap to copy around with the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    HttpStatus(u16),
    Envelope,
    Questions,
    NotAnArray,
    InvalidQuestion(usize),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Transport(_) => FailureKind::Transport,
            GenerationError::HttpStatus(status) => FailureKind::HttpStatus(status.as_u16()),
            GenerationError::Envelope(_) => FailureKind::Envelope,
            GenerationError::Questions(_) => FailureKind::Questions,
            GenerationError::NotAnArray => FailureKind::NotAnArray,
            GenerationError::InvalidQuestion { index, .. } => FailureKind::InvalidQuestion(*index),
        }
    }
}
