//! Gemini `generateContent` client.
//!
//! Sends one system instruction and one user turn, returns the text of the
//! first candidate.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{PluginError, Result};

/// A chat model taking a system instruction and a user prompt.
pub trait ChatModel {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    api_base: String,
    client: Client,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| PluginError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }
}

fn build_request<'a>(system_message: &'a str, prompt: &'a str) -> GenerateRequest<'a> {
    let system_instruction = (!system_message.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part { text: system_message }],
    });

    GenerateRequest {
        system_instruction,
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: prompt }],
        }],
    }
}

/// Concatenated text parts of the first candidate.
fn extract_answer(body: &str) -> Result<String> {
    let data: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| PluginError::Llm(format!("Failed to parse Gemini response: {e}")))?;

    let text: String = data
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(PluginError::Llm("Gemini returned no text".into()));
    }
    Ok(text)
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(e) => format!("Gemini returned {status}: {}", e.error.message),
        Err(_) => format!("Gemini returned {status}"),
    }
}

impl ChatModel for GeminiClient {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String> {
        let body = build_request(system_message, prompt);
        debug!(
            "Sending request to '{}' with data: SystemMessage: {system_message} HumanMessage: {prompt}",
            self.model
        );

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_connect() {
                    format!("Cannot connect to Gemini at {}", self.api_base)
                } else if e.is_timeout() {
                    "Gemini request timed out".to_string()
                } else {
                    format!("Gemini request failed: {e}")
                };
                warn!("{message}");
                PluginError::Llm(message)
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PluginError::Llm(format!("Failed to read Gemini response: {e}")))?;

        if !status.is_success() {
            let message = error_message(status, &text);
            warn!("{message}");
            return Err(PluginError::Llm(message));
        }

        let answer = extract_answer(&text)?;
        debug!("Gemini output: '{answer}'");
        Ok(answer)
    }
}
