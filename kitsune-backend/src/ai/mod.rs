pub mod openai;
pub mod types;

pub use openai::OpenAIClient;
pub use types::AiError;

use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Mock AI client for tests: returns queued responses in order and records
/// the message list of every request.
#[derive(Clone, Default)]
pub struct MockAiClient {
    responses: Arc<Mutex<VecDeque<Result<String, AiError>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockAiClient {
    pub fn new(responses: Vec<Result<String, AiError>>) -> Self {
        MockAiClient {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Message lists received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }

    fn next_response(&self, messages: Vec<Message>) -> Result<String, AiError> {
        self.requests.lock().push(messages);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or(Err(AiError::MockExhausted))
    }
}

/// Completion client used by the dispatcher
#[derive(Clone)]
pub enum AiClient {
    OpenAI(OpenAIClient),
    Mock(MockAiClient),
}

impl AiClient {
    /// Send one completion request and return the first choice's text.
    pub async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        match self {
            AiClient::OpenAI(client) => client.generate_text(messages).await,
            AiClient::Mock(mock) => mock.next_response(messages),
        }
    }
}
