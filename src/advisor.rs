//! Advisory client: asks a text-generation service for a short strategy hint.
//!
//! The boundary never fails from the caller's point of view.
//! [`strategic_advice`] swallows every error and returns a fixed fallback.

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::constants::{ADVICE_EMPTY, ADVICE_FALLBACK, DEFAULT_ADVISOR_MODEL, DEFAULT_ADVISOR_URL, N};
use crate::game::GameState;

/// Advisory error with location tracking. Never leaves this module's
/// public boundary through [`strategic_advice`].
#[derive(Debug, Clone, Display, Error)]
#[display("Advisor error: {} at {}:{}", message, file, line)]
pub struct AdvisorError {
    pub message: String,
    pub line: u32,
    pub file: &'static str,
}

impl AdvisorError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        let message = message.into();
        error!(error_message = %message, "Advisor error created");
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<reqwest::Error> for AdvisorError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        Self::new(format!("HTTP error: {err}"))
    }
}

/// A text-generation backend.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, prompt: &str) -> Result<String, AdvisorError>;
}

/// Build the request text: marker grid plus turn and capture metadata.
pub fn render_prompt(state: &GameState) -> String {
    format!(
        "You are a professional 9-dan Go player.\n\
         Current board state ({N}x{N}):\n\
         {board}\n\
         \n\
         Current turn: {turn}\n\
         Black captures: {black}\n\
         White captures: {white}\n\
         \n\
         Briefly analyze the board and suggest a strategy for the {turn} player in 2-3 sentences.",
        board = state.board,
        turn = state.current_turn,
        black = state.captures.black,
        white = state.captures.white,
    )
}

/// Ask `advisor` about `state`. Always returns displayable text.
#[instrument(skip_all)]
pub async fn strategic_advice(advisor: &dyn Advisor, state: &GameState) -> String {
    let prompt = render_prompt(state);
    match advisor.advise(&prompt).await {
        Ok(text) if text.trim().is_empty() => ADVICE_EMPTY.to_string(),
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "Advisory request failed; using fallback");
            ADVICE_FALLBACK.to_string()
        }
    }
}

/// Connection settings for [`GeminiAdvisor`].
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ADVISOR_URL.to_string(),
            model: DEFAULT_ADVISOR_MODEL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

/// [`Advisor`] speaking the Gemini `generateContent` REST API.
#[derive(Debug, Clone)]
pub struct GeminiAdvisor {
    client: reqwest::Client,
    config: AdvisorConfig,
}

impl GeminiAdvisor {
    pub fn new(config: AdvisorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl Advisor for GeminiAdvisor {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn advise(&self, prompt: &str) -> Result<String, AdvisorError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AdvisorError::new("no API key configured"))?;

        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };
        debug!(url = %self.endpoint(), "Requesting advice");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.text())
    }
}
