// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use selfheal_model::Message;

/// The conversation history for a single analysis run. Owned exclusively by
/// one `Agent` invocation and never shared or persisted across submissions —
/// there is no compaction here, unlike a long-lived chat session: the
/// iteration cap and the per-tool-output size cap already bound growth for a
/// single bounded run.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    pub messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Walk backward and return the most recent non-empty assistant text,
    /// used by the iteration-cap fallback.
    pub fn last_non_empty_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == selfheal_model::Role::Assistant)
            .find_map(|m| m.as_text().map(str::to_string).filter(|t| !t.is_empty()))
    }
}
