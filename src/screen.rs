//! The single quiz screen: one message, edited in place, with inline buttons.

use std::fmt;
use std::str::FromStr;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use thiserror::Error;

use crate::quiz::controller::SessionController;
use crate::quiz::{Answer, Session};

pub const TITLE: &str = "🧠 Trivia";
pub const LOADING_TEXT: &str = "Cargando preguntas...";
pub const EMPTY_TEXT: &str = "No hay preguntas disponibles";
pub const SUPERSEDED_TEXT: &str = "Estas preguntas fueron reemplazadas por una nueva partida.";
const GENERATE_BUTTON: &str = "🔄 Generar nuevas preguntas";
const PLAY_AGAIN_BUTTON: &str = "🔄 Jugar de nuevo";
const PREV_BUTTON: &str = "⬅️ Anterior";
const NEXT_BUTTON: &str = "Siguiente ➡️";
const PREV_BUTTON_DISABLED: &str = "▫️ Anterior";
const NEXT_BUTTON_DISABLED: &str = "Siguiente ▫️";

/// A button press. Everything but `Restart` and `Noop` is bound to the request
/// generation whose screen carried the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select { generation: u64, option: usize },
    Prev { generation: u64 },
    Next { generation: u64 },
    Restart,
    Noop,
}

impl Action {
    pub fn generation(&self) -> Option<u64> {
        match self {
            Action::Select { generation, .. }
            | Action::Prev { generation }
            | Action::Next { generation } => Some(*generation),
            Action::Restart | Action::Noop => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Select { generation, option } => write!(f, "sel:{generation}:{option}"),
            Action::Prev { generation } => write!(f, "prev:{generation}"),
            Action::Next { generation } => write!(f, "next:{generation}"),
            Action::Restart => f.write_str("restart"),
            Action::Noop => f.write_str("noop"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown button data {0:?}")]
pub struct UnknownAction(String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(data.to_string());
        let mut parts = data.split(':');
        let action = match (parts.next(), parts.next(), parts.next()) {
            (Some("sel"), Some(generation), Some(option)) => Action::Select {
                generation: generation.parse().map_err(|_| unknown())?,
                option: option.parse().map_err(|_| unknown())?,
            },
            (Some("prev"), Some(generation), None) => Action::Prev {
                generation: generation.parse().map_err(|_| unknown())?,
            },
            (Some("next"), Some(generation), None) => Action::Next {
                generation: generation.parse().map_err(|_| unknown())?,
            },
            (Some("restart"), None, None) => Action::Restart,
            (Some("noop"), None, None) => Action::Noop,
            _ => return Err(unknown()),
        };
        if parts.next().is_some() {
            return Err(unknown());
        }
        Ok(action)
    }
}

#[derive(Debug, Clone)]
pub struct Screen {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

fn button(label: impl Into<String>, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.to_string())
}

/// "No questions" with a restart button. Also what a chat falls back to when a
/// question screen can't be shown.
pub fn empty_screen() -> Screen {
    Screen {
        text: EMPTY_TEXT.to_string(),
        keyboard: Some(InlineKeyboardMarkup::new(vec![vec![button(
            GENERATE_BUTTON,
            Action::Restart,
        )]])),
    }
}

pub fn render(controller: &SessionController) -> Screen {
    let session = controller.session();
    if session.is_loading() {
        return Screen {
            text: LOADING_TEXT.to_string(),
            keyboard: None,
        };
    }

    let Some(question) = session.current_question() else {
        return empty_screen();
    };

    let generation = controller.generation();
    let answer = session.current_answer();

    let mut text = format!(
        "{}\n\nPregunta {} de {}\n\n{}",
        TITLE,
        session.current_index() + 1,
        session.len(),
        question.prompt()
    );

    let mut rows: Vec<Vec<InlineKeyboardButton>> = question
        .options()
        .iter()
        .enumerate()
        .map(|(option, label)| {
            let action = match answer {
                Answer::Unanswered => Action::Select { generation, option },
                Answer::Answered(_) => Action::Noop,
            };
            vec![button(
                format!("{}{}", option_marker(session, option), label),
                action,
            )]
        })
        .collect();

    rows.push(vec![
        if session.can_retreat() {
            button(PREV_BUTTON, Action::Prev { generation })
        } else {
            button(PREV_BUTTON_DISABLED, Action::Noop)
        },
        if session.can_advance() {
            button(NEXT_BUTTON, Action::Next { generation })
        } else {
            button(NEXT_BUTTON_DISABLED, Action::Noop)
        },
    ]);

    if session.is_complete() {
        text.push_str(&format!(
            "\n\n🏆 Tu puntaje: {} / {}",
            session.score(),
            session.len()
        ));
        rows.push(vec![button(PLAY_AGAIN_BUTTON, Action::Restart)]);
    }

    Screen {
        text,
        keyboard: Some(InlineKeyboardMarkup::new(rows)),
    }
}

fn option_marker(session: &Session, option: usize) -> &'static str {
    let (Answer::Answered(selected), Some(question)) =
        (session.current_answer(), session.current_question())
    else {
        return "";
    };
    if question.is_correct(option) {
        "✅ "
    } else if option == selected {
        "❌ "
    } else {
        ""
    }
}
