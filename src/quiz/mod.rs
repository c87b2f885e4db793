pub mod controller;
pub mod gemini;

use crate::error::QuestionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
}

impl Question {
    pub fn new(
        prompt: String,
        options: Vec<String>,
        correct_option: usize,
    ) -> Result<Self, QuestionError> {
        if prompt.trim().is_empty() {
            return Err(QuestionError::BlankPrompt);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions(options.len()));
        }
        if let Some(blank) = options.iter().position(|option| option.trim().is_empty()) {
            return Err(QuestionError::BlankOption(blank));
        }
        if correct_option >= options.len() {
            return Err(QuestionError::CorrectOutOfRange {
                index: correct_option,
                options: options.len(),
            });
        }
        Ok(Self {
            prompt,
            options,
            correct_option,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option
    }
}

/// Per-question answer slot. Moves `Unanswered -> Answered` once and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Answer {
    #[default]
    Unanswered,
    Answered(usize),
}

impl Answer {
    /// Commits `option` if nothing was committed yet. Returns whether it did.
    pub fn commit(&mut self, option: usize) -> bool {
        match self {
            Answer::Unanswered => {
                *self = Answer::Answered(option);
                true
            }
            Answer::Answered(_) => false,
        }
    }

    pub fn selected(&self) -> Option<usize> {
        match self {
            Answer::Unanswered => None,
            Answer::Answered(option) => Some(*option),
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Answer::Answered(_))
    }
}

/// What happened to a `select_answer` call. Only `Correct` and `Incorrect` commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Correct,
    Incorrect,
    AlreadyAnswered,
    OutOfRange,
    NoQuestion,
}

impl Selection {
    pub fn is_committed(&self) -> bool {
        matches!(self, Selection::Correct | Selection::Incorrect)
    }
}

/// One question set and the user's progress through it.
///
/// `answers` always has one slot per question and `score` always equals the
/// number of slots holding their question's correct option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    questions: Vec<Question>,
    answers: Vec<Answer>,
    current_question: usize,
    score: usize,
    loading: bool,
}

impl Session {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            answers: vec![Answer::Unanswered; questions.len()],
            questions,
            current_question: 0,
            score: 0,
            loading: false,
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_question
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question)
    }

    pub fn current_answer(&self) -> Answer {
        self.answers
            .get(self.current_question)
            .copied()
            .unwrap_or_default()
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn select_answer(&mut self, option: usize) -> Selection {
        let Some(question) = self.questions.get(self.current_question) else {
            return Selection::NoQuestion;
        };
        if option >= question.options.len() {
            return Selection::OutOfRange;
        }
        if !self.answers[self.current_question].commit(option) {
            return Selection::AlreadyAnswered;
        }

        if question.is_correct(option) {
            self.score += 1;
            Selection::Correct
        } else {
            Selection::Incorrect
        }
    }

    pub fn can_advance(&self) -> bool {
        self.current_question + 1 < self.questions.len()
    }

    pub fn can_retreat(&self) -> bool {
        self.current_question > 0
    }

    /// Moves to the next question. No-op on the last one.
    pub fn advance(&mut self) -> bool {
        if !self.can_advance() {
            return false;
        }
        self.current_question += 1;
        true
    }

    /// Moves to the previous question. No-op on the first one.
    pub fn retreat(&mut self) -> bool {
        if !self.can_retreat() {
            return false;
        }
        self.current_question -= 1;
        true
    }

    /// On the last question with its answer committed; that is when the score is shown.
    pub fn is_complete(&self) -> bool {
        !self.questions.is_empty()
            && self.current_question == self.questions.len() - 1
            && self.current_answer().is_answered()
    }
}
