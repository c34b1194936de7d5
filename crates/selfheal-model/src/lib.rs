// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod client;
mod error;
mod guard;
mod mock;
mod types;

pub use client::{ChatClient, OpenAiCompatClient};
pub use error::{ApiErrorField, TransportError};
pub use guard::{GuardClient, GuardResult};
pub use mock::{FailingMockClient, ScriptedMockClient};
pub use types::{
    CompletionRequest, CompletionResponse, FunctionCall, Message, Role, ToolCallRequest,
    ToolSchema,
};
