// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use selfheal_config::{SelfHealConfig, Strategy};

use crate::types::Submission;

/// Probe for external-worker reachability. The IPC mechanism is left to the
/// host; this is the seam it plugs its chosen transport (HTTP health check,
/// socket ping, ...) into.
#[async_trait]
pub trait ExternalWorkerHealth: Send + Sync {
    async fn reachable(&self) -> bool;
}

/// Always-reachable stub used when no external strategy is configured, and
/// in tests that never exercise the external path.
pub struct AlwaysReachable;

#[async_trait]
impl ExternalWorkerHealth for AlwaysReachable {
    async fn reachable(&self) -> bool {
        true
    }
}

/// The two mutable fields a single mutex protects. Held only across direct
/// reads/writes, never across I/O.
#[derive(Debug, Default)]
struct TriggerState {
    is_running: bool,
    last_run: Option<DateTime<Utc>>,
}

/// Gates each submission on mode, type allow-list, admin allow-list
/// (external mode only), single-flight, and cooldown window. One instance
/// per process; the config it holds is immutable after construction.
pub struct TriggerPolicy {
    config: Arc<SelfHealConfig>,
    state: Mutex<TriggerState>,
    worker_health: Arc<dyn ExternalWorkerHealth>,
}

impl TriggerPolicy {
    pub fn new(config: Arc<SelfHealConfig>) -> Self {
        Self {
            config,
            state: Mutex::new(TriggerState::default()),
            worker_health: Arc::new(AlwaysReachable),
        }
    }

    pub fn with_worker_health(config: Arc<SelfHealConfig>, worker_health: Arc<dyn ExternalWorkerHealth>) -> Self {
        Self {
            config,
            state: Mutex::new(TriggerState::default()),
            worker_health,
        }
    }

    /// Decide whether `submission` may trigger an analysis run right now.
    /// Returns `(allowed, reason)`; `reason` is always populated, even on
    /// the admitted path, for observability.
    pub async fn can_trigger(&self, submission: &Submission) -> (bool, String) {
        if !self.config.enabled {
            return (false, "self-healing disabled".to_string());
        }

        if let Err(reason) = self.check_strategy_prerequisites(submission).await {
            return (false, reason);
        }

        if !self.config.type_allowed(submission.kind.as_str()) {
            return (
                false,
                format!("submission type '{}' not in allow-list", submission.kind.as_str()),
            );
        }

        let state = self.state.lock().await;
        if state.is_running {
            return (false, "an analysis is already running".to_string());
        }

        if let Some(last_run) = state.last_run {
            let elapsed = Utc::now().signed_duration_since(last_run);
            let cooldown = chrono::Duration::from_std(self.config.cooldown_duration())
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
            if elapsed < cooldown {
                let remaining = cooldown - elapsed;
                let minutes = (remaining.num_seconds() as f64 / 60.0).round() as i64;
                return (
                    false,
                    format!("cooldown active, {minutes} minute(s) remaining"),
                );
            }
        }

        (true, "admitted".to_string())
    }

    async fn check_strategy_prerequisites(&self, submission: &Submission) -> Result<(), String> {
        match self.config.mode {
            Strategy::Internal => {
                if self.config.resolve_api_key().is_none() {
                    return Err("API key not configured".to_string());
                }
            }
            Strategy::External => {
                let email = submission
                    .submitter_email
                    .as_deref()
                    .map(|e| e.trim().to_lowercase())
                    .unwrap_or_default();
                let is_admin = self
                    .config
                    .admin_emails
                    .iter()
                    .any(|a| a.trim().to_lowercase() == email);
                if email.is_empty() || !is_admin {
                    return Err("submitter is not an authorized admin".to_string());
                }
                let Some(script) = &self.config.trigger_script else {
                    return Err("external trigger script not configured".to_string());
                };
                if !script.exists() {
                    return Err("external trigger script not found on host".to_string());
                }
                if !self.worker_health.reachable().await {
                    return Err("external worker not reachable".to_string());
                }
            }
        }
        Ok(())
    }

    /// Mark a run as started. Callers must pair this with [`Self::release`]
    /// on every exit path — see `selfheal-dispatch::dispatcher::TriggerGuard`
    /// for the RAII wrapper that enforces this.
    pub async fn acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.is_running {
            return false;
        }
        state.is_running = true;
        state.last_run = Some(Utc::now());
        true
    }

    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        state.is_running = false;
    }

    /// Snapshot of `{enabled, is_running, last_run?, cooldown_remaining?,
    /// strategy_health_probes}`. `cooldown_remaining` is omitted entirely
    /// until the first run, rather than emitted as `null`.
    pub async fn status(&self) -> HashMap<String, Value> {
        let state = self.state.lock().await;
        let mut out = HashMap::new();
        out.insert("enabled".to_string(), json!(self.config.enabled));
        out.insert("is_running".to_string(), json!(state.is_running));
        out.insert("last_run".to_string(), json!(state.last_run));

        if let Some(last) = state.last_run {
            let elapsed = Utc::now().signed_duration_since(last);
            let cooldown = chrono::Duration::from_std(self.config.cooldown_duration())
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
            let remaining = (cooldown - elapsed).num_seconds().max(0);
            out.insert("cooldown_remaining".to_string(), json!(remaining));
        }

        let probes = match self.config.mode {
            Strategy::External => {
                let mut m = serde_json::Map::new();
                m.insert("external_worker".to_string(), json!(self.worker_health.reachable().await));
                Value::Object(m)
            }
            Strategy::Internal => Value::Object(serde_json::Map::new()),
        };
        out.insert("strategy_health_probes".to_string(), probes);

        out
    }
}
