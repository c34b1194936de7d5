// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use selfheal_model::{ChatClient, CompletionRequest, Message, ToolSchema};
use selfheal_tools::{ToolCall, ToolCatalog};

use crate::error::CoreError;
use crate::session::ConversationHistory;
use crate::types::Submission;

/// Bounded tool-calling conversation driver: one blocking request/response
/// per turn, no streaming, no mode switching, no compaction — just a hard
/// iteration cap.
pub const MAX_ITERATIONS: usize = 10;

/// Minimum description length below which the user prompt gets a
/// steering note nudging the model to explore the tree.
const MIN_DESCRIPTION_LEN: usize = 20;

pub struct Agent {
    client: Arc<dyn ChatClient>,
    catalog: Arc<ToolCatalog>,
    model: String,
}

impl Agent {
    pub fn new(client: Arc<dyn ChatClient>, catalog: Arc<ToolCatalog>, model: impl Into<String>) -> Self {
        Self {
            client,
            catalog,
            model: model.into(),
        }
    }

    /// Run the bounded agent loop to completion and return the final
    /// analysis text.
    pub async fn analyze(&self, submission: &Submission) -> Result<String, CoreError> {
        let mut history = ConversationHistory::new();
        history.push(Message::system(system_prompt()));
        history.push(Message::user(render_user_prompt(submission)));

        let tools = self.tool_schemas();

        for iteration in 1..=MAX_ITERATIONS {
            let req = CompletionRequest {
                model: self.model.clone(),
                messages: history.messages.clone(),
                tools: tools.clone(),
                max_tokens: 4000,
                temperature: 0.2,
            };

            let resp = self.client.complete(req).await?;
            history.push(resp.message.clone());

            if resp.finish_reason == "stop" || !resp.message.has_tool_calls() {
                return Ok(resp.message.as_text().unwrap_or_default().to_string());
            }

            let calls = resp.message.tool_calls.clone().unwrap_or_default();
            info!(iteration, calls = calls.len(), "agent requested tool calls");

            for call in calls {
                let output = match serde_json::from_str::<Value>(&call.function.arguments) {
                    Ok(args) => {
                        self.catalog
                            .dispatch(ToolCall {
                                id: call.id.clone(),
                                name: call.function.name.clone(),
                                args,
                            })
                            .await
                    }
                    Err(e) => selfheal_tools::ToolOutput::err(
                        &call.id,
                        format!("Error parsing arguments: {e}"),
                    ),
                };
                history.push(Message::tool_result(output.call_id, output.content));
            }
        }

        warn!(iterations = MAX_ITERATIONS, "agent loop exhausted iteration cap");
        match history.last_non_empty_assistant_text() {
            Some(text) => Ok(text),
            None => Err(CoreError::IterationsExhausted(MAX_ITERATIONS)),
        }
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.catalog
            .schemas()
            .into_iter()
            .map(|(name, description, parameters)| ToolSchema {
                name,
                description,
                parameters,
            })
            .collect()
    }
}

/// Agent persona and mandated output sections.
fn system_prompt() -> String {
    "You are an autonomous root-cause analysis agent investigating a bug \
     report against a real source tree. You have two tools available: \
     `list_files(path)` to list the immediate children of a directory, and \
     `get_file_content(path)` to read a file's text content. Use them to \
     explore the codebase named in the report before concluding.\n\n\
     When you are done investigating, reply with no further tool calls and \
     produce a report using exactly these Markdown sections, in order:\n\
     ## Summary\n## Relevant Files\n## Analysis\n## Suggested Fix"
        .to_string()
}

/// Render the submission into the user prompt, embedding console logs in a
/// fenced block when present and appending a steering note for very short
/// descriptions.
fn render_user_prompt(submission: &Submission) -> String {
    let mut prompt = format!(
        "A user submitted the following {} report.\n\nTitle: {}\nDescription: {}\n",
        submission.kind.as_str(),
        submission.title,
        submission.description
    );

    if let Some(url) = &submission.url {
        prompt.push_str(&format!("Page URL: {url}\n"));
    }

    if let Some(logs) = &submission.console_logs {
        prompt.push_str(&format!("\nConsole logs:\n```\n{logs}\n```\n"));
    }

    if submission.description.chars().count() < MIN_DESCRIPTION_LEN {
        prompt.push_str(
            "\nThe description above is very short. Use `list_files` to explore the \
             project tree before forming a conclusion.\n",
        );
    }

    prompt
}
