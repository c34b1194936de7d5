// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use selfheal_core::Submission;

/// Alternative to the in-process agent loop: hand the submission to a
/// subprocess that talks to a containerized agent and scrape its stdout for
/// artifact URLs.
pub struct ExternalAgentStrategy {
    script: PathBuf,
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("failed to spawn trigger script {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("trigger script exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
}

/// Scraped artifacts from a completed external run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapedOutput {
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub branch: Option<String>,
}

impl ExternalAgentStrategy {
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }

    /// Serialize `submission` to the compact JSON object the script expects
    /// and invoke it, returning the raw stdout transcript on success.
    pub async fn run(&self, submission: &Submission) -> Result<(String, ScrapedOutput), ExternalError> {
        let payload = serialize_submission(submission);

        debug!(script = %self.script.display(), id = submission.id, "invoking external trigger script");

        let output = tokio::process::Command::new(&self.script)
            .arg(payload.to_string())
            .output()
            .await
            .map_err(|e| ExternalError::Spawn {
                path: self.script.display().to_string(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(status = ?output.status.code(), "external trigger script failed");
            return Err(ExternalError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let scraped = scrape_output(&stdout);
        Ok((stdout, scraped))
    }
}

/// The compact JSON object passed as the script's sole argument.
/// Intentionally narrower than `Submission`'s own `Serialize` impl —
/// `submitter_email` is never handed to the external worker.
fn serialize_submission(submission: &Submission) -> serde_json::Value {
    json!({
        "id": submission.id,
        "title": submission.title,
        "description": submission.description,
        "type": submission.kind.as_str(),
        "url": submission.url,
        "consoleLogs": submission.console_logs,
    })
}

/// Line-by-line scan for the two documented output patterns. First match of
/// each kind wins.
fn scrape_output(stdout: &str) -> ScrapedOutput {
    let mut result = ScrapedOutput::default();

    for line in stdout.lines() {
        if result.pr_url.is_none() && line.contains("github.com") && line.contains("/pull/") {
            if let Some(url) = extract_pr_url(line) {
                if let Some(number) = extract_pr_number(&url) {
                    result.pr_number = Some(number);
                }
                result.pr_url = Some(url);
            }
        }

        if result.branch.is_none() {
            if let Some(rest) = line.trim().strip_prefix("Branch:") {
                result.branch = Some(rest.trim().to_string());
            } else if let Some(token) = find_branch_token(line) {
                result.branch = Some(token);
            }
        }
    }

    result
}

/// Pull the first `github.com/.../pull/N` substring out of a line, trimming
/// surrounding parens/brackets (`(https://...)`, `[https://...]`).
fn extract_pr_url(line: &str) -> Option<String> {
    let start = line.find("https://github.com").or_else(|| line.find("github.com"))?;
    let tail = &line[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || matches!(c, ')' | ']' | '>' | '"' | '\''))
        .unwrap_or(tail.len());
    let candidate = &tail[..end];
    if candidate.contains("/pull/") {
        Some(candidate.trim_matches(|c| matches!(c, '(' | '[' | '<')).to_string())
    } else {
        None
    }
}

fn extract_pr_number(url: &str) -> Option<u64> {
    let idx = url.find("/pull/")? + "/pull/".len();
    let digits: String = url[idx..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// A line beginning with `fix/` or `feature/` (ignoring leading whitespace)
/// names a branch directly.
fn find_branch_token(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.starts_with("fix/") || trimmed.starts_with("feature/") {
        let token = trimmed.split_whitespace().next()?;
        Some(token.to_string())
    } else {
        None
    }
}
