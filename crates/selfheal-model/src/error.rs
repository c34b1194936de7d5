// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;
use thiserror::Error;

/// Transport-level failure talking to an OpenAI-compatible endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Request(String),
    #[error("{status} error: {body}")]
    Http { status: u16, body: String },
    #[error("API error: {0}")]
    ApiError(String),
    #[error("response carried no choices")]
    EmptyChoices,
    #[error("malformed response: {0}")]
    Decode(String),
}

/// The `error` field of a 2xx chat-completions body is not consistently
/// shaped across OpenAI-compatible providers: some return a bare string,
/// others an object with a `message` field. Parse both, normalizing at the
/// edge per the documented "Dual-shape API error parsing" pattern.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiErrorField {
    Message { message: String },
    Bare(String),
}

impl ApiErrorField {
    pub fn into_text(self) -> String {
        match self {
            ApiErrorField::Message { message } => message,
            ApiErrorField::Bare(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_string_error() {
        let v: ApiErrorField = serde_json::from_str(r#""rate limited""#).unwrap();
        assert_eq!(v.into_text(), "rate limited");
    }

    #[test]
    fn parses_object_error_with_message() {
        let v: ApiErrorField = serde_json::from_str(r#"{"message": "bad request"}"#).unwrap();
        assert_eq!(v.into_text(), "bad request");
    }
}
