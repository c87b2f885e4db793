use std::env;

use crate::quiz::gemini::GeminiConfig;

const DEFAULT_PROMPT: &str = "Lista de 5 preguntas de cultura general de Colombia";

#[derive(Clone, Debug)]
pub struct Config {
    /// Prompt used for a chat's first session.
    pub default_prompt: String,
    pub gemini: GeminiConfig,
}

impl Config {
    /// Reads the environment; call after `dotenv()` so `.env` values are visible.
    pub fn from_env() -> Self {
        let default_prompt = env::var("QUIZ_PROMPT")
            .ok()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        Self {
            default_prompt,
            gemini: GeminiConfig::from_env(),
        }
    }
}
