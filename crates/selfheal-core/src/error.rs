// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error kinds a caller of the core subsystem branches on directly.
/// Everything else (tool argument parsing, sandbox violations) is encoded
/// as ordinary `ToolOutput` strings and never reaches here.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("self-healing disabled")]
    Disabled,

    #[error("API key not configured")]
    MissingApiKey,

    #[error("{0}")]
    PolicyDenial(String),

    #[error("chat transport error: {0}")]
    ChatTransport(#[from] selfheal_model::TransportError),

    #[error("analysis incomplete after {0} iterations")]
    IterationsExhausted(usize),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
}
