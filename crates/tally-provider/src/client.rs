//! HTTP client for OpenAI-compatible chat-completions endpoints.
//!
//! Sends the conversation buffer with the available function declarations
//! in function-call mode "auto" and normalizes the first choice into a
//! `ProviderReply`. No streaming; a single request/response per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use tally_core::config::ProviderConfig;
use tally_core::error::{Result, TallyError};

use crate::types::{ChatProvider, ChatTurn, FunctionCall, FunctionDecl, ProviderReply};

/// Reqwest-backed chat-completions client.
///
/// Constructed once from explicit configuration and shared across turns;
/// the await on `complete` is the orchestrator's provider suspension point.
pub struct ChatClient {
    http: Client,
    cfg: ProviderConfig,
}

impl ChatClient {
    pub fn new(cfg: ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| TallyError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, cfg })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

fn reply_from_response(response: ChatCompletionResponse) -> Result<ProviderReply> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TallyError::Provider("Chat completions response had no choices".into()))?;
    Ok(ProviderReply {
        content: choice.message.content,
        function_call: choice.message.function_call,
    })
}

#[async_trait]
impl ChatProvider for ChatClient {
    async fn complete(
        &self,
        messages: &[ChatTurn],
        functions: &[FunctionDecl],
    ) -> Result<ProviderReply> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        debug!(target = "chat_client", model = %self.cfg.model, messages = messages.len(), "POST {}", url);

        let body = json!({
            "model": self.cfg.model,
            "messages": messages,
            "functions": functions,
            "function_call": "auto",
            "temperature": self.cfg.temperature,
        });

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| TallyError::Provider(format!("Chat completions request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(TallyError::Provider(format!(
                "Chat completions error: status={} body={}",
                status, text
            )));
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| {
            TallyError::Provider(format!("Failed to parse chat completions JSON: {}", e))
        })?;
        reply_from_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text_reply() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello! How can I help?"}
            }]
        }))
        .unwrap();
        let reply = reply_from_response(response).unwrap();
        assert_eq!(reply.content.as_deref(), Some("Hello! How can I help?"));
        assert!(reply.function_call.is_none());
    }

    #[test]
    fn test_parse_function_call_reply() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": {
                        "name": "run_sql_query",
                        "arguments": "{\"lookup_spec\": {\"model\": \"Order\"}}"
                    }
                }
            }]
        }))
        .unwrap();
        let reply = reply_from_response(response).unwrap();
        assert!(reply.content.is_none());
        let call = reply.function_call.unwrap();
        assert_eq!(call.name, "run_sql_query");
        // Arguments stay a raw JSON string for the orchestrator to parse.
        assert!(call.arguments.contains("lookup_spec"));
    }

    #[test]
    fn test_parse_reply_without_choices_errors() {
        let response: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": []})).unwrap();
        let err = reply_from_response(response).unwrap_err();
        assert!(matches!(err, TallyError::Provider(_)));
    }

    #[test]
    fn test_client_builds_from_config() {
        let client = ChatClient::new(ProviderConfig::default()).unwrap();
        assert_eq!(client.cfg.model, "gpt-3.5-turbo");
    }
}
