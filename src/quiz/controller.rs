use async_trait::async_trait;
use log::{debug, info, warn};

use super::{Selection, Session};
use crate::error::{FailureKind, GenerationError};
use crate::quiz::Question;

/// Something that can turn a prompt into a question set.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn generate_questions(&self, prompt: &str) -> Result<Vec<Question>, GenerationError>;
}

/// Issued when a request starts. Only the latest ticket may replace the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Owns the session, the prompt it was generated from, and the request generation.
///
/// A request can be driven in one call with [`SessionController::request_new_session`],
/// or split into [`SessionController::begin_request`] and
/// [`SessionController::finish_request`] when the state has to be stored while the
/// request is in flight.
#[derive(Debug, Clone, Default)]
pub struct SessionController {
    prompt: String,
    session: Session,
    generation: u64,
    last_failure: Option<FailureKind>,
}

impl SessionController {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Why the latest completed request produced an empty session, if it failed.
    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    /// Stores `prompt`, marks the session as loading and supersedes any request in flight.
    pub fn begin_request(&mut self, prompt: &str) -> RequestTicket {
        self.prompt = prompt.to_string();
        self.generation += 1;
        self.session.set_loading(true);
        RequestTicket {
            generation: self.generation,
        }
    }

    /// Applies the outcome of the request behind `ticket`.
    ///
    /// Failures never propagate: they leave an empty session and are recorded in
    /// `last_failure`. Returns `false` when a newer request has superseded `ticket`, in
    /// which case nothing changes.
    pub fn finish_request(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<Vec<Question>, GenerationError>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Dropping response for request {} (latest is {})",
                ticket.generation, self.generation
            );
            return false;
        }

        match outcome {
            Ok(questions) => {
                info!("Received {} questions", questions.len());
                self.session = Session::new(questions);
                self.last_failure = None;
            }
            Err(err) => {
                warn!("Error fetching questions: {}", err);
                self.session = Session::default();
                self.last_failure = Some(err.kind());
            }
        }
        true
    }

    /// Runs a whole request in place. The bot drives the same two steps itself because
    /// it has to store the controller in its dialogue while the request is in flight.
    pub async fn request_new_session(&mut self, source: &dyn QuestionSource, prompt: &str) {
        let ticket = self.begin_request(prompt);
        let outcome = source.generate_questions(prompt).await;
        self.finish_request(ticket, outcome);
    }

    /// Requests a fresh question set for the stored prompt, dropping all progress.
    pub async fn restart(&mut self, source: &dyn QuestionSource) {
        let prompt = self.prompt.clone();
        self.request_new_session(source, &prompt).await;
    }

    /// Ignored while a request is in flight; the current questions are about to go away.
    pub fn select_answer(&mut self, option: usize) -> Selection {
        if self.session.is_loading() {
            return Selection::NoQuestion;
        }
        self.session.select_answer(option)
    }

    pub fn advance(&mut self) -> bool {
        !self.session.is_loading() && self.session.advance()
    }

    pub fn retreat(&mut self) -> bool {
        !self.session.is_loading() && self.session.retreat()
    }
}
