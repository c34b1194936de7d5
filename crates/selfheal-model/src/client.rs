// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ApiErrorField, TransportError};
use crate::types::{CompletionRequest, CompletionResponse, FunctionCall, Message, Role, ToolCallRequest};

/// Sends a chat-completions request to an OpenAI-compatible endpoint and
/// parses the response, tolerating the two documented error-shape variants.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, TransportError>;
}

/// Non-streaming client for the OpenAI-compatible `/chat/completions` wire
/// format. A turn-by-turn blocking agent loop has no use for SSE streaming,
/// so this is a single request/response round trip per call.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, TransportError> {
        let key = self.api_key.as_deref().ok_or(TransportError::MissingApiKey)?;

        debug!(
            model = %req.model,
            messages = req.messages.len(),
            tools = req.tools.len(),
            "sending chat completion request"
        );
        trace!(?req, "full completion request");

        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(key)
            .json(&req)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_completion_body(&text)
    }
}

fn parse_completion_body(text: &str) -> Result<CompletionResponse, TransportError> {
    let body: Value =
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))?;

    // A 2xx body may still carry an `error` field (seen from some
    // OpenAI-compatible proxies). Fail the same as a non-2xx status.
    if let Some(err_field) = body.get("error").filter(|v| !v.is_null()) {
        let parsed: ApiErrorField = serde_json::from_value(err_field.clone())
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        return Err(TransportError::ApiError(parsed.into_text()));
    }

    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .ok_or(TransportError::EmptyChoices)?;

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();

    let msg = choice
        .get("message")
        .ok_or_else(|| TransportError::Decode("missing message".into()))?;

    let content = msg.get("content").and_then(|v| v.as_str()).map(String::from);

    let tool_calls = msg
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc.get("id")?.as_str()?.to_string();
                    let function = tc.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = function.get("arguments")?.as_str()?.to_string();
                    Some(ToolCallRequest {
                        id,
                        kind: "function".to_string(),
                        function: FunctionCall { name, arguments },
                    })
                })
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty());

    let message = Message {
        role: Role::Assistant,
        content,
        tool_calls,
        tool_call_id: None,
    };

    Ok(CompletionResponse {
        message,
        finish_reason,
    })
}
