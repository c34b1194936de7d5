// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::ChatClient;
use crate::error::TransportError;
use crate::types::{CompletionRequest, CompletionResponse, Message};

/// A pre-scripted chat client. Each call to `complete` pops the next
/// response from the front of the queue, letting tests drive the agent loop
/// through an exact, deterministic sequence of turns (including tool calls)
/// without any network access.
pub struct ScriptedMockClient {
    scripts: Mutex<Vec<CompletionResponse>>,
    pub requests_seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedMockClient {
    pub fn new(scripts: Vec<CompletionResponse>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            requests_seen: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a client that always replies with a `stop` text message.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse {
            message: Message::assistant(reply.into()),
            finish_reason: "stop".to_string(),
        }])
    }

    pub fn calls_made(&self) -> usize {
        self.requests_seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for ScriptedMockClient {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, TransportError> {
        self.requests_seen.lock().unwrap().push(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            return Err(TransportError::Request("mock script exhausted".into()));
        }
        Ok(scripts.remove(0))
    }
}

/// A client that always fails with the given transport error, for testing
/// the `chat_transport` failure path.
pub struct FailingMockClient {
    pub message: String,
}

#[async_trait]
impl ChatClient for FailingMockClient {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, TransportError> {
        Err(TransportError::Request(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_scripts_in_order() {
        let client = ScriptedMockClient::new(vec![
            CompletionResponse {
                message: Message::assistant("first"),
                finish_reason: "stop".to_string(),
            },
            CompletionResponse {
                message: Message::assistant("second"),
                finish_reason: "stop".to_string(),
            },
        ]);
        let req = CompletionRequest {
            model: "m".into(),
            messages: vec![],
            tools: vec![],
            max_tokens: 10,
            temperature: 0.0,
        };
        let first = client.complete(req.clone()).await.unwrap();
        assert_eq!(first.message.as_text(), Some("first"));
        let second = client.complete(req).await.unwrap();
        assert_eq!(second.message.as_text(), Some("second"));
        assert_eq!(client.calls_made(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_errors() {
        let client = ScriptedMockClient::new(vec![]);
        let req = CompletionRequest {
            model: "m".into(),
            messages: vec![],
            tools: vec![],
            max_tokens: 10,
            temperature: 0.0,
        };
        assert!(client.complete(req).await.is_err());
    }
}
