// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_cooldown() -> String {
    "1h".to_string()
}

fn default_timeout() -> String {
    "30m".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Strategy used to run the investigating agent. Internal drives the agent
/// loop in-process; external hands the submission to a subprocess that talks
/// to a containerized worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Internal,
    External,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Internal
    }
}

/// Self-healing subsystem configuration as loaded from YAML + environment.
///
/// Durations are accepted as human-readable strings (`"1h"`, `"30m"`) in the
/// config file and parsed at load time; see [`crate::loader::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealConfig {
    /// Master switch. When `false`, the subsystem never triggers regardless
    /// of any other setting.
    #[serde(default)]
    pub enabled: bool,

    /// Strategy selector: in-process agent loop vs. external subprocess.
    #[serde(default)]
    pub mode: Strategy,

    /// Feedback types admitted to trigger analysis. The sentinel `"all"`
    /// admits every type.
    #[serde(default)]
    pub allowed_types: Vec<String>,

    /// Submitter emails (case-insensitive, trimmed at comparison time)
    /// authorized to trigger the external strategy. Required non-empty when
    /// `mode = external`.
    #[serde(default)]
    pub admin_emails: HashSet<String>,

    /// Minimum wall-clock gap between admitted runs, e.g. `"1h"`.
    #[serde(default = "default_cooldown")]
    pub cooldown: String,

    /// Per-run deadline, e.g. `"30m"`.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Sandbox FS root for the internal strategy. Never empty in production.
    pub source_dir: Option<PathBuf>,

    /// Path to the trigger script invoked by the external strategy.
    pub trigger_script: Option<PathBuf>,

    /// API credential for the Chat Transport and Guard Client.
    pub api_key: Option<String>,

    /// Environment variable holding the API key; preferred over `api_key` in
    /// version-controlled config files.
    pub api_key_env: Option<String>,

    /// OpenAI-compatible base URL (before `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier forwarded to the Chat Transport.
    #[serde(default = "default_model")]
    pub model: String,

    /// Bypass the Guard Client entirely. Reserved for development only.
    #[serde(default)]
    pub skip_guards: bool,

    /// Run the dispatcher without calling the model; produce synthetic
    /// output. Useful for exercising the trigger/dispatch plumbing in tests.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SelfHealConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: Strategy::default(),
            allowed_types: Vec::new(),
            admin_emails: HashSet::new(),
            cooldown: default_cooldown(),
            timeout: default_timeout(),
            source_dir: None,
            trigger_script: None,
            api_key: None,
            api_key_env: None,
            base_url: default_base_url(),
            model: default_model(),
            skip_guards: false,
            dry_run: false,
        }
    }
}

impl SelfHealConfig {
    /// Resolve the API key: explicit `api_key` wins, then `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
        })
    }

    /// Parsed cooldown duration; falls back to one hour on a malformed string.
    pub fn cooldown_duration(&self) -> Duration {
        humantime::parse_duration(&self.cooldown).unwrap_or(Duration::from_secs(3600))
    }

    /// Parsed per-run timeout; falls back to thirty minutes on a malformed string.
    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(Duration::from_secs(1800))
    }

    /// Returns `true` if every type is admitted via the `"all"` sentinel.
    pub fn allows_all_types(&self) -> bool {
        self.allowed_types.iter().any(|t| t == "all")
    }

    pub fn type_allowed(&self, feedback_type: &str) -> bool {
        self.allows_all_types() || self.allowed_types.iter().any(|t| t == feedback_type)
    }
}
