//! The outer attempt loop.
//!
//! One fresh browser instance per attempt, teardown on every exit path,
//! classification-driven retry, and a final result that is produced no
//! matter what happened inside: `execute` never fails the future.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_tempo::TempoPlan;
use chrono::Utc;
use element_resolver::{Diagnostics, ElementResolver};
use futures::FutureExt;
use interstitial_guard::{GuardConfig, InterstitialGuard};
use surface_adapter::{BrowserLauncher, BrowserSession, LaunchOptions, Readiness};
use tokio::time::sleep;
use tracing::{error, info, warn};
use viabot_core_types::{ViabilityJob, WorkflowResult, PROTOCOL_NOT_FOUND};

use crate::classify::is_retryable;
use crate::errors::WorkflowError;
use crate::report::ArtifactStore;
use crate::sequencer::{SequenceOutcome, SequencerConfig, StepSequencer};

/// Everything the engine needs beyond the job itself.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub entry_url: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Published per-job navigation timeout; doubled for the entry
    /// navigation to tolerate slow remote or host conditions.
    pub navigation_timeout: Duration,
    pub launch: LaunchOptions,
    pub tempo: TempoPlan,
    pub guard: GuardConfig,
    pub sequencer: SequencerConfig,
    /// Where resolution-failure snapshots land; None disables them.
    pub diagnostics_dir: Option<PathBuf>,
}

impl EngineSettings {
    pub fn new(entry_url: impl Into<String>, sequencer: SequencerConfig) -> Self {
        Self {
            entry_url: entry_url.into(),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(60),
            launch: LaunchOptions::default(),
            tempo: TempoPlan::default(),
            guard: GuardConfig::default(),
            sequencer,
            diagnostics_dir: None,
        }
    }
}

/// The workflow orchestrator.
pub struct WorkflowEngine {
    launcher: Arc<dyn BrowserLauncher>,
    sequencer: StepSequencer,
    settings: EngineSettings,
}

impl WorkflowEngine {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: EngineSettings,
    ) -> Self {
        let diagnostics = match &settings.diagnostics_dir {
            Some(dir) => Diagnostics::into_dir(dir.clone()),
            None => Diagnostics::disabled(),
        };
        let resolver = ElementResolver::new(diagnostics);
        let guard = InterstitialGuard::new(settings.guard.clone());
        let sequencer = StepSequencer::new(
            settings.sequencer.clone(),
            settings.tempo.clone(),
            resolver,
            guard,
            artifacts,
        );
        Self {
            launcher,
            sequencer,
            settings,
        }
    }

    /// Run the job to a final result. All internal failures are caught,
    /// classified and folded into the returned value.
    pub async fn execute(&self, job: &ViabilityJob) -> WorkflowResult {
        let mut last_error: Option<WorkflowError> = None;
        let mut attempts_made = 0u32;

        for attempt in 1..=self.settings.max_retries {
            attempts_made = attempt;
            info!(
                attempt,
                max = self.settings.max_retries,
                enterprise = job.enterprise_id,
                "starting workflow attempt"
            );

            match self.run_attempt(job).await {
                Ok(outcome) => {
                    info!(attempt, "workflow attempt succeeded");
                    return self.success_result(job, outcome, attempt);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "workflow attempt failed");
                    let retryable = is_retryable(&err);
                    last_error = Some(err);

                    if !retryable {
                        error!(attempt, "non-retryable failure, aborting retries");
                        break;
                    }
                    if attempt < self.settings.max_retries {
                        info!(
                            delay_ms = self.settings.retry_delay.as_millis() as u64,
                            "transient failure, waiting before the next attempt"
                        );
                        sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        let cause = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempt was made".to_string());
        error!(attempts = attempts_made, %cause, "workflow failed");
        WorkflowResult::failure(
            job,
            attempts_made,
            format!("failed after {attempts_made} attempt(s): {cause}"),
        )
    }

    /// One attempt inside one browser instance. The browser is torn down on
    /// every exit path, including a panicking sequencer.
    async fn run_attempt(&self, job: &ViabilityJob) -> Result<SequenceOutcome, WorkflowError> {
        let session = self.launcher.launch(&self.settings.launch).await?;

        let driven = AssertUnwindSafe(self.drive(session.as_ref(), job))
            .catch_unwind()
            .await;

        if let Err(err) = session.close().await {
            warn!(error = %err, "browser teardown reported an error");
        }

        match driven {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::Internal("attempt panicked".to_string())),
        }
    }

    async fn drive(
        &self,
        session: &dyn BrowserSession,
        job: &ViabilityJob,
    ) -> Result<SequenceOutcome, WorkflowError> {
        let entry = session
            .open_surface(
                &self.settings.entry_url,
                Readiness::NetworkMostlyIdle,
                self.settings.navigation_timeout * 2,
            )
            .await?;
        self.sequencer.run(session, entry, job).await
    }

    fn success_result(
        &self,
        job: &ViabilityJob,
        outcome: SequenceOutcome,
        attempts: u32,
    ) -> WorkflowResult {
        let status = match (&outcome.protocol, outcome.map_degraded) {
            (Some(_), false) => "workflow completed".to_string(),
            (Some(_), true) => "workflow completed with degraded map confirmation".to_string(),
            // The remote system has likely registered the submission even
            // though the protocol could not be read back; reporting failure
            // here would be misleading.
            (None, _) => "submission registered, protocol not recovered".to_string(),
        };
        WorkflowResult {
            success: true,
            protocol_number: outcome
                .protocol
                .unwrap_or_else(|| PROTOCOL_NOT_FOUND.to_string()),
            enterprise_name: job.enterprise_name.clone(),
            enterprise_id: job.enterprise_id,
            report_file_url: outcome.report_url,
            status,
            attempts,
            processed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryArtifactStore;
    use action_tempo::TempoPlan;
    use std::sync::Arc;
    use surface_adapter::mock::{LaunchScript, MockLauncher, MockSession};
    use viabot_core_types::{Credentials, FiscalRepresentative, Partner, RequestDefaults};

    const SUCCESS_BODY: &str = "Viabilidade concluida com sucesso - protocolo PEP123456";

    fn job() -> ViabilityJob {
        ViabilityJob {
            enterprise_id: 42,
            enterprise_name: "ACME ADVOGADOS".to_string(),
            enterprise_purpose: "Serviços advocatícios".to_string(),
            city: "RECIFE".to_string(),
            state: "PE".to_string(),
            town_registry: "1234567".to_string(),
            reference_point: None,
            ownership_structure: vec![Partner {
                cpf: "00000000000".to_string(),
            }],
        }
    }

    fn settings() -> EngineSettings {
        let sequencer = SequencerConfig {
            credentials: Credentials {
                cpf: "11122233344".to_string(),
                password: "hunter2".to_string(),
            },
            fiscal_representative: FiscalRepresentative {
                name: "Maria Contadora".to_string(),
                cpf: "55566677788".to_string(),
                phone: "81999990000".to_string(),
            },
            defaults: RequestDefaults {
                institution: "OAB".to_string(),
                state_registry_requested: "Não".to_string(),
                commercial_establishment_area: "25".to_string(),
                property_sequential_number: "7654321".to_string(),
                sepul_protocol: None,
                built_area: "25".to_string(),
                requestor_phone: "81988887777".to_string(),
            },
            selector_timeout: Duration::from_millis(40),
            resolver_budget: Duration::from_millis(60),
            submit_budget: Duration::from_millis(40),
            surface_spawn_timeout: Duration::from_millis(10),
            interstitial_timeout: Duration::from_millis(30),
            acquisition_attempts: 2,
        };
        let mut settings = EngineSettings::new("https://portal.example/login", sequencer);
        settings.max_retries = 3;
        settings.retry_delay = Duration::from_millis(1);
        settings.navigation_timeout = Duration::from_millis(100);
        settings.tempo = TempoPlan::instant();
        settings.guard = interstitial_guard::GuardConfig::instant();
        settings
    }

    fn engine(launcher: Arc<MockLauncher>) -> WorkflowEngine {
        WorkflowEngine::new(launcher, Arc::new(MemoryArtifactStore::new()), settings())
    }

    fn good_session() -> Arc<MockSession> {
        Arc::new(MockSession::lenient().with_default_body(SUCCESS_BODY))
    }

    #[tokio::test]
    async fn first_attempt_success_reports_one_attempt() {
        let launcher = Arc::new(MockLauncher::single(good_session()));
        let result = engine(launcher.clone()).execute(&job()).await;

        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.protocol_number, "PEP123456");
        assert_eq!(result.enterprise_id, 42);
        assert_eq!(launcher.teardown_count(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let k = 3;
        let launcher = Arc::new(MockLauncher::scripted(vec![
            LaunchScript::Session(Arc::new(MockSession::failing_open("Target closed"))),
            LaunchScript::Session(Arc::new(MockSession::failing_open(
                "Navigation timeout of 120000 ms exceeded",
            ))),
            LaunchScript::Session(good_session()),
        ]));
        let result = engine(launcher.clone()).execute(&job()).await;

        assert!(result.success);
        assert_eq!(result.attempts, k);
        // One teardown per attempt, failed attempts included.
        assert_eq!(launcher.teardown_count(), k as usize);
    }

    #[tokio::test]
    async fn unrecognized_error_stops_after_one_attempt() {
        let launcher = Arc::new(MockLauncher::scripted(vec![
            LaunchScript::Session(Arc::new(MockSession::failing_open(
                "the option layout changed",
            ))),
            LaunchScript::Session(good_session()),
        ]));
        let result = engine(launcher.clone()).execute(&job()).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(launcher.launch_count(), 1);
        assert!(result.status.contains("the option layout changed"));
        assert_eq!(result.protocol_number, viabot_core_types::PROTOCOL_FAILED);
    }

    #[tokio::test]
    async fn launch_failure_is_retryable_by_default() {
        let launcher = Arc::new(MockLauncher::scripted(vec![
            LaunchScript::FailLaunch("spawn: chromium not found".into()),
            LaunchScript::Session(good_session()),
        ]));
        let result = engine(launcher.clone()).execute(&job()).await;

        assert!(result.success);
        assert_eq!(result.attempts, 2);
        // The failed launch produced no session, so only one teardown.
        assert_eq!(launcher.teardown_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fold_into_a_failure_result() {
        let launcher = Arc::new(MockLauncher::scripted(vec![
            LaunchScript::Session(Arc::new(MockSession::failing_open("Target closed"))),
            LaunchScript::Session(Arc::new(MockSession::failing_open("Target closed"))),
            LaunchScript::Session(Arc::new(MockSession::failing_open("Target closed"))),
        ]));
        let result = engine(launcher.clone()).execute(&job()).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert!(result.status.contains("failed after 3 attempt(s)"));
        assert_eq!(launcher.teardown_count(), 3);
    }
}
