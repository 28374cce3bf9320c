//! External command suggestions through an OpenAI-compatible chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use webssh_core::{SuggestionError, SuggestionProvider};

const SYSTEM_PROMPT: &str = "You are a Linux command assistant. Given a command prefix or a \
    description, reply with relevant Linux commands, one per line, each followed by a short \
    explanation. Reply with nothing else.";

/// Chat completion client used as the suggestion provider.
pub struct ChatSuggestionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatSuggestionClient {
    #[must_use]
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint,
            model,
            api_key,
        }
    }

    fn request_body(&self, command: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "stream": false,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Suggest commands for: {command}") },
            ],
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, SuggestionError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| SuggestionError::MalformedResponse("no choices".into()))
    }
}

#[async_trait]
impl SuggestionProvider for ChatSuggestionClient {
    async fn suggest(&self, command: &str) -> Result<String, SuggestionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(command))
            .send()
            .await
            .map_err(|e| SuggestionError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SuggestionError::RequestFailed(format!("HTTP {status}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SuggestionError::MalformedResponse(e.to_string()))?;
        debug!(command, "Suggestion service answered");
        body.into_text()
    }
}
