// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use selfheal_config::{SelfHealConfig, Strategy};
use selfheal_core::{Agent, CoreError, NewSubmission, RecordStore, Submission, TriggerPolicy};
use selfheal_model::{ChatClient, GuardClient};
use selfheal_tools::{SandboxFs, ToolCatalog};

use crate::external::{ExternalAgentStrategy, ScrapedOutput};

/// Construction-time failure: the config names a strategy whose prerequisite
/// path is missing. Distinct from [`IntakeError`], which covers per-submission
/// rejections once the dispatcher already exists.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("mode = internal requires source_dir to be set")]
    MissingSourceDir,
    #[error("mode = external requires trigger_script to be set")]
    MissingTriggerScript,
}

/// Synchronous-phase failure: the caller (intake) turns this into an HTTP
/// response; nothing is persisted.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("title and description must be non-empty")]
    InvalidSubmission,
    #[error("submission blocked: {0}")]
    GuardBlocked(String),
}

/// What the synchronous phase hands back to the intake caller: a trigger
/// denial is not an error, it is `triggered=false` with a reason.
#[derive(Debug, Clone)]
pub struct DispatchAcceptance {
    pub submission_id: i64,
    pub triggered: bool,
    pub reason: String,
}

/// The result composed at the end of the detached analysis task. Never
/// observed by the intake caller directly — only through the optional
/// observer channel, or indirectly via the record store.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub triggered: bool,
    pub success: bool,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    pub branch: Option<String>,
}

/// RAII guard releasing the trigger's `is_running` flag on every exit path:
/// success, error, or panic.
struct TriggerGuard {
    trigger: Arc<TriggerPolicy>,
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            trigger.release().await;
        });
    }
}

/// Interchangeable "run an agent" implementation selected by `config.mode`.
enum AgentStrategy {
    Internal(Arc<Agent>),
    External(Arc<ExternalAgentStrategy>),
}

/// Pre-filters submissions through the guard, gates them through the
/// trigger policy, and spawns detached analysis work.
pub struct Dispatcher {
    config: Arc<SelfHealConfig>,
    guard: Arc<GuardClient>,
    trigger: Arc<TriggerPolicy>,
    strategy: AgentStrategy,
    store: Arc<dyn RecordStore>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<SelfHealConfig>,
        guard: Arc<GuardClient>,
        trigger: Arc<TriggerPolicy>,
        agent: Arc<Agent>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            guard,
            trigger,
            strategy: AgentStrategy::Internal(agent),
            store,
        }
    }

    pub fn new_external(
        config: Arc<SelfHealConfig>,
        guard: Arc<GuardClient>,
        trigger: Arc<TriggerPolicy>,
        external: Arc<ExternalAgentStrategy>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            guard,
            trigger,
            strategy: AgentStrategy::External(external),
            store,
        }
    }

    /// Build the strategy named by `config.mode`, wiring the internal
    /// agent's sandbox root from `config.source_dir` or the external
    /// strategy's script from `config.trigger_script`.
    pub fn from_config(
        config: Arc<SelfHealConfig>,
        client: Arc<dyn ChatClient>,
        guard: Arc<GuardClient>,
        trigger: Arc<TriggerPolicy>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, BuildError> {
        match config.mode {
            Strategy::Internal => {
                let source_dir = config
                    .source_dir
                    .clone()
                    .ok_or(BuildError::MissingSourceDir)?;
                let catalog = Arc::new(ToolCatalog::new(Arc::new(SandboxFs::new(source_dir))));
                let agent = Arc::new(Agent::new(client, catalog, config.model.clone()));
                Ok(Self::new(config, guard, trigger, agent, store))
            }
            Strategy::External => {
                let script = config
                    .trigger_script
                    .clone()
                    .ok_or(BuildError::MissingTriggerScript)?;
                let external = Arc::new(ExternalAgentStrategy::new(script));
                Ok(Self::new_external(config, guard, trigger, external, store))
            }
        }
    }

    /// Synchronous phase: validate, guard-check, persist, consult the
    /// trigger policy, and — if admitted — spawn the detached worker.
    /// Returns immediately; the worker's own result is never awaited here.
    pub async fn handle_submission(
        &self,
        submission: NewSubmission,
        observer: Option<mpsc::Sender<RunResult>>,
    ) -> Result<DispatchAcceptance, IntakeError> {
        if !submission.is_valid() {
            return Err(IntakeError::InvalidSubmission);
        }

        if self.config.enabled {
            let combined = format!("{}\n{}", submission.title, submission.description);
            let verdict = self.guard.check_injection(&combined).await;
            if verdict.blocked {
                return Err(IntakeError::GuardBlocked(
                    verdict.reason.unwrap_or_else(|| "blocked".to_string()),
                ));
            }
        }

        let id = self
            .store
            .create(&submission.clone().with_id(0))
            .await
            .map_err(|_| IntakeError::InvalidSubmission)?;
        let submission = submission.with_id(id);

        let (allowed, reason) = self.trigger.can_trigger(&submission).await;
        if !allowed {
            info!(id, reason = %reason, "analysis not triggered");
            return Ok(DispatchAcceptance {
                submission_id: id,
                triggered: false,
                reason,
            });
        }

        if !self.trigger.acquire().await {
            return Ok(DispatchAcceptance {
                submission_id: id,
                triggered: false,
                reason: "already running".to_string(),
            });
        }

        self.spawn_worker(submission, observer);

        Ok(DispatchAcceptance {
            submission_id: id,
            triggered: true,
            reason: "admitted".to_string(),
        })
    }

    /// Launch the detached analysis task. Fire-and-forget: ambient request
    /// cancellation in the caller must not abort this task.
    fn spawn_worker(&self, submission: Submission, observer: Option<mpsc::Sender<RunResult>>) {
        let timeout = self.config.timeout_duration();
        let dry_run = self.config.dry_run;
        let store = self.store.clone();
        let trigger = self.trigger.clone();
        let agent = match &self.strategy {
            AgentStrategy::Internal(a) => Some(a.clone()),
            AgentStrategy::External(_) => None,
        };
        let external = match &self.strategy {
            AgentStrategy::External(e) => Some(e.clone()),
            AgentStrategy::Internal(_) => None,
        };

        tokio::spawn(async move {
            let _guard = TriggerGuard { trigger };
            let started_at = Utc::now();

            let run = tokio::time::timeout(
                timeout,
                run_strategy(submission.clone(), dry_run, agent, external),
            )
            .await;

            let completed_at = Utc::now();
            let mut result = RunResult {
                triggered: true,
                started_at: Some(started_at),
                completed_at: Some(completed_at),
                ..Default::default()
            };

            match run {
                Ok(Ok(StrategyOutput { text, scraped })) => {
                    if let Err(e) = store.update_analysis(submission.id, &text).await {
                        error!(id = submission.id, error = %e, "failed to persist analysis");
                        result.success = false;
                        result.error = Some(e.to_string());
                    } else {
                        result.success = true;
                        result.message = "analysis complete".to_string();
                    }
                    result.output = Some(text);
                    result.pr_url = scraped.pr_url;
                    result.pr_number = scraped.pr_number;
                    result.branch = scraped.branch;
                }
                Ok(Err(e)) => {
                    warn!(id = submission.id, error = %e, "analysis run failed");
                    result.success = false;
                    result.message = "analysis failed".to_string();
                    result.error = Some(e);
                }
                Err(_) => {
                    let msg = format!("timeout after {timeout:?}");
                    warn!(id = submission.id, "{msg}");
                    result.success = false;
                    result.message = msg.clone();
                    result.error = Some(msg);
                }
            }

            if let Some(tx) = observer {
                let _ = tx.send(result).await;
            }
        });
    }
}

struct StrategyOutput {
    text: String,
    scraped: ScrapedOutput,
}

async fn run_strategy(
    submission: Submission,
    dry_run: bool,
    agent: Option<Arc<Agent>>,
    external: Option<Arc<ExternalAgentStrategy>>,
) -> Result<StrategyOutput, String> {
    if dry_run {
        return Ok(StrategyOutput {
            text: format!(
                "## Summary\n[dry run] would analyze submission #{}: {}\n",
                submission.id, submission.title
            ),
            scraped: ScrapedOutput::default(),
        });
    }

    if let Some(agent) = agent {
        return agent
            .analyze(&submission)
            .await
            .map(|text| StrategyOutput {
                text,
                scraped: ScrapedOutput::default(),
            })
            .map_err(|e: CoreError| e.to_string());
    }

    if let Some(external) = external {
        return external
            .run(&submission)
            .await
            .map(|(text, scraped)| StrategyOutput { text, scraped })
            .map_err(|e| e.to_string());
    }

    Err("no strategy configured".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use selfheal_config::SelfHealConfig;
    use selfheal_core::{InMemoryRecordStore, SubmissionType};
    use selfheal_model::ScriptedMockClient;
    use selfheal_tools::{SandboxFs, ToolCatalog};

    use super::*;

    fn new_submission(title: &str, description: &str) -> NewSubmission {
        NewSubmission {
            title: title.to_string(),
            description: description.to_string(),
            kind: SubmissionType::Bug,
            url: None,
            console_logs: None,
            submitter_email: None,
        }
    }

    fn enabled_config() -> SelfHealConfig {
        let mut cfg = SelfHealConfig::default();
        cfg.enabled = true;
        cfg.allowed_types = vec!["all".to_string()];
        cfg.api_key = Some("key".into());
        cfg.skip_guards = true;
        cfg
    }

    async fn dispatcher_with(cfg: SelfHealConfig, reply: &str) -> (Dispatcher, Arc<InMemoryRecordStore>) {
        let config = Arc::new(cfg);
        let guard = Arc::new(GuardClient::new(None, "guard-model", config.skip_guards));
        let trigger = Arc::new(TriggerPolicy::new(config.clone()));
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(ToolCatalog::new(Arc::new(SandboxFs::new(dir.path().to_path_buf()))));
        let client = Arc::new(ScriptedMockClient::always_text(reply));
        let agent = Arc::new(Agent::new(client, catalog, config.model.clone()));
        let store = Arc::new(InMemoryRecordStore::new(1));
        let dispatcher = Dispatcher::new(config, guard, trigger, agent, store.clone());
        (dispatcher, store)
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected_before_persistence() {
        let (dispatcher, store) = dispatcher_with(enabled_config(), "ok").await;
        let err = dispatcher
            .handle_submission(new_submission("", "description"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidSubmission));
        assert!(store.analyses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_subsystem_still_persists_but_does_not_trigger() {
        let mut cfg = enabled_config();
        cfg.enabled = false;
        let (dispatcher, _store) = dispatcher_with(cfg, "ok").await;
        let acceptance = dispatcher
            .handle_submission(new_submission("t", "d"), None)
            .await
            .unwrap();
        assert!(!acceptance.triggered);
        assert_eq!(acceptance.reason, "self-healing disabled");
    }

    #[tokio::test]
    async fn admitted_submission_triggers_and_eventually_updates_analysis() {
        let (dispatcher, store) = dispatcher_with(enabled_config(), "## Summary\nfix it").await;
        let (tx, mut rx) = mpsc::channel(1);
        let acceptance = dispatcher
            .handle_submission(new_submission("t", "d"), Some(tx))
            .await
            .unwrap();
        assert!(acceptance.triggered);

        let result = rx.recv().await.unwrap();
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("## Summary\nfix it"));

        let analyses = store.analyses.lock().unwrap();
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0].1, "## Summary\nfix it");
    }

    #[tokio::test]
    async fn dry_run_produces_synthetic_output_without_model_call() {
        let mut cfg = enabled_config();
        cfg.dry_run = true;
        let (dispatcher, _store) = dispatcher_with(cfg, "should not be used").await;
        let (tx, mut rx) = mpsc::channel(1);
        dispatcher
            .handle_submission(new_submission("t", "d"), Some(tx))
            .await
            .unwrap();
        let result = rx.recv().await.unwrap();
        assert!(result.success);
        assert!(result.output.unwrap().contains("[dry run]"));
    }

    #[test]
    fn from_config_requires_source_dir_in_internal_mode() {
        let config = Arc::new(enabled_config());
        let guard = Arc::new(GuardClient::new(None, "guard-model", true));
        let trigger = Arc::new(TriggerPolicy::new(config.clone()));
        let store = Arc::new(InMemoryRecordStore::new(1));
        let client = Arc::new(ScriptedMockClient::always_text("ok"));
        let err = Dispatcher::from_config(config, client, guard, trigger, store).unwrap_err();
        assert!(matches!(err, BuildError::MissingSourceDir));
    }

    #[tokio::test]
    async fn from_config_wires_internal_strategy_from_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = enabled_config();
        cfg.source_dir = Some(dir.path().to_path_buf());
        let config = Arc::new(cfg);
        let guard = Arc::new(GuardClient::new(None, "guard-model", true));
        let trigger = Arc::new(TriggerPolicy::new(config.clone()));
        let store = Arc::new(InMemoryRecordStore::new(1));
        let client = Arc::new(ScriptedMockClient::always_text("## Summary\nfrom config"));
        let dispatcher = Dispatcher::from_config(config, client, guard, trigger, store.clone()).unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        dispatcher
            .handle_submission(new_submission("t", "d"), Some(tx))
            .await
            .unwrap();
        let result = rx.recv().await.unwrap();
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("## Summary\nfrom config"));
    }

    #[tokio::test]
    async fn second_submission_while_running_is_denied_single_flight() {
        let (dispatcher, _store) = dispatcher_with(enabled_config(), "## Summary\nslow").await;
        assert!(dispatcher.trigger.acquire().await);
        let acceptance = dispatcher
            .handle_submission(new_submission("t", "d"), None)
            .await
            .unwrap();
        assert!(!acceptance.triggered);
        assert_eq!(acceptance.reason, "an analysis is already running");
    }
}
