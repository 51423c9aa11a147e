use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::NamingError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Fast model used for folder naming
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Message content for API request
#[derive(Serialize)]
struct MessageContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

/// Message in conversation
#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<MessageContent>,
}

/// API request body
#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

/// Content block in API response
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// API response body
#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

/// API error response
#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Blocking Anthropic Messages API client
///
/// Must not be created, used or dropped on an async executor thread.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, NamingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NamingError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Client for the default model if an API key is present
    pub fn from_api_key(api_key: Option<&str>) -> Result<Option<Self>, NamingError> {
        match api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Self::new(key, DEFAULT_MODEL).map(Some),
            None => Ok(None),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single-turn message and return the concatenated text reply
    pub fn send_message(&self, system_prompt: &str, user_message: &str, max_tokens: u32) -> Result<String, NamingError> {
        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens,
            system: system_prompt.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![MessageContent {
                    content_type: "text".to_string(),
                    text: user_message.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| NamingError::Request(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&error_text) {
                return Err(NamingError::Api(api_error.error.message));
            }
            return Err(NamingError::Api(format!("({}) {}", status, error_text)));
        }

        let api_response: ApiResponse = response
            .json()
            .map_err(|e| NamingError::Parse(e.to_string()))?;

        Ok(collect_text(api_response).trim().to_string())
    }
}

fn collect_text(response: ApiResponse) -> String {
    response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_text_skips_non_text_blocks() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"content": [
                {"type": "text", "text": "Machine_"},
                {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                {"type": "text", "text": "Learning"}
            ], "stop_reason": "end_turn"}"#,
        )
        .unwrap();

        assert_eq!(collect_text(response), "Machine_Learning");
    }

    #[test]
    fn test_request_wire_format() {
        let request = ApiRequest {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 50,
            system: "sys".to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![MessageContent {
                    content_type: "text".to_string(),
                    text: "hi".to_string(),
                }],
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["max_tokens"], 50);
    }

    #[test]
    fn test_no_client_without_key() {
        assert!(AnthropicClient::from_api_key(None).unwrap().is_none());
        assert!(AnthropicClient::from_api_key(Some("  ")).unwrap().is_none());
    }
}
