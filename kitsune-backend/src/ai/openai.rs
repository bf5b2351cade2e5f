use crate::ai::types::AiError;
use crate::ai::Message;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Sampling parameters are fixed for every request
pub const MODEL: &str = "gpt-3.5-turbo-0301";
const MAX_TOKENS: u32 = 512;
const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 1.0;
const FREQUENCY_PENALTY: f64 = 0.0;
const PRESENCE_PENALTY: f64 = 0.0;

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Result<Self, String> {
        Self::with_endpoint(api_key, OPENAI_CHAT_COMPLETIONS_URL)
    }

    pub fn with_endpoint(api_key: &str, endpoint: &str) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth_headers.insert(header::AUTHORIZATION, auth_value);

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        let request = build_request(&messages);

        log::info!(
            "[OPENAI] Sending {} message(s) to {} with model {}",
            messages.len(),
            self.endpoint,
            MODEL
        );
        log::debug!(
            "[OPENAI] Full request:\n{}",
            serde_json::to_string_pretty(&request).unwrap_or_default()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.auth_headers.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        parse_completion(&body)
    }
}

fn build_request(messages: &[Message]) -> OpenAICompletionRequest<'_> {
    OpenAICompletionRequest {
        model: MODEL,
        messages,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
        top_p: TOP_P,
        frequency_penalty: FREQUENCY_PENALTY,
        presence_penalty: PRESENCE_PENALTY,
        stream: false,
    }
}

/// Extract the first choice's text from a completion response body.
fn parse_completion(body: &str) -> Result<String, AiError> {
    let parsed: OpenAICompletionResponse =
        serde_json::from_str(body).map_err(|e| AiError::Decode(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or(AiError::EmptyResponse)
}
