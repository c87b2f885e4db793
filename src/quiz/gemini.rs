use std::env;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::controller::QuestionSource;
use super::Question;
use crate::error::{GenerationError, QuestionError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_KEY_VAR: &str = "GEMINI_API_KEY";
const API_KEY_HEADER: &str = "x-goog-api-key";
// What we fall back to when the response has no candidate text at all.
const EMPTY_QUESTION_SET: &str = "[]";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the variable holding the API key. The key itself is read per request.
    pub api_key_var: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            api_key_var: API_KEY_VAR.into(),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            model: env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            api_key_var: defaults.api_key_var,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// A missing key becomes an empty string; the endpoint gets to reject it.
    pub fn api_key(&self) -> String {
        env::var(&self.api_key_var).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Sends one generation request for `prompt` and returns the raw response body.
    ///
    /// No retries and no timeout beyond the transport defaults.
    async fn send(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.config.api_key();
        if api_key.is_empty() {
            warn!("{} is not set, sending the request without a key", self.config.api_key_var);
        }

        info!("Requesting questions from {}", self.config.model);
        let response = self
            .client
            .post(self.config.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&GenerateRequest::new(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::HttpStatus(response.status()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl QuestionSource for GeminiClient {
    async fn generate_questions(&self, prompt: &str) -> Result<Vec<Question>, GenerationError> {
        let body = self.send(prompt).await?;
        let text = extract_text(&body)?;
        debug!("Question text: {:?}", text);
        parse_questions(&text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_json_schema: Value,
}

impl GenerateRequest {
    pub fn new(prompt: &str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_json_schema: question_set_schema(),
            },
        }
    }
}

/// Structured-output schema: an array of `{ question, options, correctOption }`.
pub fn question_set_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "options": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "correctOption": { "type": "number" }
            },
            "required": ["question", "options", "correctOption"]
        }
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Pulls `candidates[0].content.parts[0].text` out of a response body.
pub fn extract_text(body: &str) -> Result<String, GenerationError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(GenerationError::Envelope)?;

    let text = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .and_then(|parts| parts.into_iter().next())
        .and_then(|part| part.text)
        .unwrap_or_else(|| EMPTY_QUESTION_SET.to_string());

    Ok(text)
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    #[serde(rename = "correctOption")]
    correct_option: serde_json::Number,
}

impl RawQuestion {
    fn into_question(self) -> Result<Question, QuestionError> {
        let correct = self
            .correct_option
            .as_u64()
            .or_else(|| {
                self.correct_option
                    .as_f64()
                    .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                    .map(|n| n as u64)
            })
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(QuestionError::NonIntegralCorrect)?;

        Question::new(self.question, self.options, correct)
    }
}

/// Parses the model's text into validated questions.
pub fn parse_questions(text: &str) -> Result<Vec<Question>, GenerationError> {
    let value: Value = serde_json::from_str(text).map_err(GenerationError::Questions)?;
    let Value::Array(items) = value else {
        return Err(GenerationError::NotAnArray);
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let raw: RawQuestion =
                serde_json::from_value(item).map_err(GenerationError::Questions)?;
            raw.into_question()
                .map_err(|source| GenerationError::InvalidQuestion { index, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::error::FailureKind;
    use crate::quiz::controller::SessionController;

    struct ReceivedRequest {
        line: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    impl ReceivedRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        }
    }

    /// Answers exactly one HTTP request with `status` and `body` on a local port.
    /// Returns the base URL to point the client at and the request the server saw.
    fn serve_once(
        status: &'static str,
        body: String,
    ) -> (String, thread::JoinHandle<ReceivedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/v1beta", listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut line = String::new();
            reader.read_line(&mut line).unwrap();

            let mut headers = Vec::new();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
                }
            }

            let length = headers
                .iter()
                .find(|(name, _)| name == "content-length")
                .and_then(|(_, value)| value.parse::<usize>().ok())
                .unwrap_or(0);
            let mut request_body = vec![0; length];
            reader.read_exact(&mut request_body).unwrap();

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();

            ReceivedRequest {
                line: line.trim_end().to_string(),
                headers,
                body: request_body,
            }
        });

        (base_url, server)
    }

    fn client_for(base_url: String, api_key_var: &str) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            base_url,
            model: "m".into(),
            api_key_var: api_key_var.into(),
        })
    }

    const THREE_QUESTIONS: &str = r#"[
        {"question": "¿Capital de Colombia?", "options": ["Cali", "Bogotá", "Medellín"], "correctOption": 1},
        {"question": "¿Río más largo?", "options": ["Magdalena", "Cauca"], "correctOption": 0},
        {"question": "¿Producto típico?", "options": ["Té", "Cacao", "Café"], "correctOption": 2.0}
    ]"#;

    fn envelope(text: &str) -> String {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" },
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[test]
    fn request_body_embeds_prompt_and_schema() {
        let body = serde_json::to_value(GenerateRequest::new("Cinco preguntas")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Cinco preguntas");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        let schema = &body["generationConfig"]["responseJsonSchema"];
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["properties"]["options"]["items"]["type"], "string");
        assert_eq!(schema["items"]["properties"]["correctOption"]["type"], "number");
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let config = GeminiConfig {
            base_url: "http://localhost:8080/v1beta/".into(),
            model: "gemini-test".into(),
            api_key_var: "UNUSED".into(),
        };
        assert_eq!(
            config.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn missing_api_key_is_empty() {
        let config = GeminiConfig {
            api_key_var: "TRIVIA_BOT_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..GeminiConfig::default()
        };
        assert_eq!(config.api_key(), "");
    }

    #[test]
    fn parses_well_formed_response() {
        let text = extract_text(&envelope(THREE_QUESTIONS)).unwrap();
        let questions = parse_questions(&text).unwrap();

        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].prompt(), "¿Capital de Colombia?");
        assert_eq!(questions[0].correct_option(), 1);
        assert_eq!(questions[1].options(), &["Magdalena", "Cauca"]);
        assert_eq!(questions[2].correct_option(), 2);
    }

    #[test]
    fn missing_candidate_text_means_no_questions() {
        let text = extract_text(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#).unwrap();
        assert_eq!(text, "[]");
        assert!(parse_questions(&text).unwrap().is_empty());

        let text = extract_text(r#"{"candidates": [{"content": {"parts": []}}]}"#).unwrap();
        assert_eq!(text, "[]");
    }

    #[test]
    fn non_json_envelope_is_an_envelope_failure() {
        let err = extract_text("<html>Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Envelope);
    }

    #[test]
    fn unparsable_question_text_is_a_questions_failure() {
        let text = extract_text(&envelope("Claro, aquí tienes tus preguntas:")).unwrap();
        let err = parse_questions(&text).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Questions);
    }

    #[test]
    fn non_array_question_text_is_rejected() {
        let err = parse_questions(r#"{"question": "¿?", "options": [], "correctOption": 0}"#)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotAnArray);
    }

    #[test]
    fn malformed_question_reports_its_index() {
        let text = r#"[
            {"question": "a", "options": ["x", "y"], "correctOption": 0},
            {"question": "b", "options": ["x", "y"], "correctOption": 5}
        ]"#;
        let err = parse_questions(text).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidQuestion(1));

        let text = r#"[{"question": "a", "options": ["x", "y"], "correctOption": 0.5}]"#;
        match parse_questions(text).unwrap_err() {
            GenerationError::InvalidQuestion { index, source } => {
                assert_eq!(index, 0);
                assert_eq!(source, QuestionError::NonIntegralCorrect);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn posts_prompt_with_key_and_maps_rejection_to_empty_session() {
        env::set_var("TRIVIA_BOT_TEST_KEY_REJECTED", "k123");
        let (base_url, server) =
            serve_once("403 Forbidden", r#"{"error": {"code": 403}}"#.to_string());
        let client = client_for(base_url, "TRIVIA_BOT_TEST_KEY_REJECTED");

        let mut controller = SessionController::default();
        controller
            .request_new_session(&client, "Cinco preguntas")
            .await;

        assert!(controller.session().is_empty());
        assert!(!controller.session().is_loading());
        assert_eq!(controller.last_failure(), Some(FailureKind::HttpStatus(403)));

        let request = server.join().unwrap();
        assert_eq!(request.line, "POST /v1beta/models/m:generateContent HTTP/1.1");
        assert_eq!(request.header("x-goog-api-key"), Some("k123"));
        assert_eq!(request.header("content-type"), Some("application/json"));

        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body, serde_json::to_value(GenerateRequest::new("Cinco preguntas")).unwrap());
    }

    #[tokio::test]
    async fn successful_response_yields_questions() {
        let text = r#"[{"question": "¿Capital?", "options": ["Cali", "Bogotá"], "correctOption": 1}]"#;
        let (base_url, server) = serve_once("200 OK", envelope(text));
        let client = client_for(base_url, "TRIVIA_BOT_TEST_KEY_THAT_IS_NEVER_SET");

        let questions = client.generate_questions("Una pregunta").await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].prompt(), "¿Capital?");
        assert_eq!(questions[0].correct_option(), 1);

        let request = server.join().unwrap();
        assert_eq!(request.header("x-goog-api-key"), Some(""));
    }

    #[test]
    fn blank_option_is_a_malformed_question() {
        let text = r#"[{"question": "¿Capital?", "options": ["", "Bogotá"], "correctOption": 1}]"#;
        match parse_questions(text).unwrap_err() {
            GenerationError::InvalidQuestion { index, source } => {
                assert_eq!(index, 0);
                assert_eq!(source, QuestionError::BlankOption(0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_fields_are_a_questions_failure() {
        let err = parse_questions(r#"[{"question": "a"}]"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Questions);
    }
}
