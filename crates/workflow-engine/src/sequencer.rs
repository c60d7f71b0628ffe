//! The ordered workflow script.
//!
//! One long, strictly ordered chain of form interactions across the surfaces
//! the portal spawns: login, the viability form, the map confirmation gated
//! by the anti-bot guard, the ownership structure, naming, complementary
//! information, the fire-safety questionnaire, final submission, and the
//! protocol/report recovery zone where failures soften instead of failing
//! the attempt.

use std::sync::Arc;
use std::time::Duration;

use action_tempo::{TempoPlan, TypingSpeed};
use element_resolver::ElementResolver;
use interstitial_guard::{InterstitialGuard, RecoveryOutcome};
use once_cell::sync::Lazy;
use regex::Regex;
use surface_adapter::{ensure_active, BrowserSession, Key, Surface, SurfaceError};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use viabot_core_types::{Credentials, FiscalRepresentative, RequestDefaults, ViabilityJob};

use crate::errors::WorkflowError;
use crate::report::ArtifactStore;
use crate::steps::{PauseKind, StepAction, StepRunner, Target};

/// Protocol identifiers embedded in the confirmation message.
static PROTOCOL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"PEP\d+").expect("protocol pattern"));

/// Texts tried when the primary map confirmation button is missing.
const ALTERNATIVE_CONFIRMATIONS: [&str; 7] =
    ["Confirmar", "Confirma", "OK", "Aceitar", "Continuar", "Confirm", "Ok"];

/// Spelling variants of the questionnaire start button (the portal itself
/// misspells it).
const START_BUTTON_VARIANTS: [&str; 4] = ["Inciar", "INCIAR", "Iniciar", "INICIAR"];

/// Fixed answer script for the fire-safety questionnaire.
const FIRE_SAFETY_SCRIPT: [&str; 22] = [
    "Até 200 m²",
    "Avançar",
    "Não",
    "Exclusivamente térreo",
    "Avançar",
    "Não",
    "Avançar",
    "Não",
    "Avançar",
    "Não",
    "Não",
    "Não",
    "Não",
    "Não",
    "Avançar",
    "Não",
    "Avançar",
    "Não",
    "Avançar",
    "Não",
    "Não",
    "Confirmar",
];

/// Static inputs and pacing for the sequencer.
#[derive(Clone, Debug)]
pub struct SequencerConfig {
    pub credentials: Credentials,
    pub fiscal_representative: FiscalRepresentative,
    pub defaults: RequestDefaults,
    /// Budget for plain selector waits.
    pub selector_timeout: Duration,
    /// Budget handed to the resolver for ordinary text targets.
    pub resolver_budget: Duration,
    /// Shorter budget for submission/alternative lookups.
    pub submit_budget: Duration,
    /// How long to wait for a click-spawned surface to appear.
    pub surface_spawn_timeout: Duration,
    /// Budget for the anti-bot title watch on the map surface.
    pub interstitial_timeout: Duration,
    /// Inner retry count for acquiring the viability form surface.
    pub acquisition_attempts: u32,
}

impl SequencerConfig {
    pub fn new(
        credentials: Credentials,
        fiscal_representative: FiscalRepresentative,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            credentials,
            fiscal_representative,
            defaults,
            selector_timeout: Duration::from_secs(5),
            resolver_budget: Duration::from_secs(10),
            submit_budget: Duration::from_secs(5),
            surface_spawn_timeout: Duration::from_secs(10),
            interstitial_timeout: Duration::from_secs(45),
            acquisition_attempts: 5,
        }
    }
}

/// What the sequencer recovered once the submission went through.
#[derive(Clone, Debug, Default)]
pub struct SequenceOutcome {
    pub protocol: Option<String>,
    pub report_url: Option<String>,
    /// The map step was skipped or completed with fallback coordinates.
    pub map_degraded: bool,
}

/// Drives the full ordered step script against one browser session.
pub struct StepSequencer {
    config: SequencerConfig,
    tempo: TempoPlan,
    resolver: ElementResolver,
    guard: InterstitialGuard,
    artifacts: Arc<dyn ArtifactStore>,
}

impl StepSequencer {
    pub fn new(
        config: SequencerConfig,
        tempo: TempoPlan,
        resolver: ElementResolver,
        guard: InterstitialGuard,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            config,
            tempo,
            resolver,
            guard,
            artifacts,
        }
    }

    fn runner(&self) -> StepRunner<'_> {
        StepRunner::new(&self.resolver, &self.tempo, self.config.resolver_budget)
    }

    /// Run the whole script. Errors before the final submission fail the
    /// attempt; after it, recovery is best-effort and the outcome is always
    /// returned.
    pub async fn run(
        &self,
        session: &dyn BrowserSession,
        entry: Arc<dyn Surface>,
        job: &ViabilityJob,
    ) -> Result<SequenceOutcome, WorkflowError> {
        let runner = self.runner();

        self.login(&runner, entry.as_ref()).await?;
        let form = self.acquire_form_surface(session, &runner, entry.as_ref()).await?;
        self.location_form(&runner, form.as_ref(), job).await?;
        self.applicant_form(&runner, form.as_ref(), job).await?;
        let map_degraded = self
            .map_confirmation(session, &runner, form.as_ref())
            .await?;
        self.ownership(&runner, form.as_ref(), job).await?;
        self.naming(&runner, form.as_ref(), job).await?;
        self.complementary(&runner, form.as_ref()).await?;
        let questionnaire = self.milestone(session, &runner, form.as_ref()).await?;
        self.fire_safety(&runner, questionnaire.as_ref()).await?;
        self.submit(&runner, questionnaire.as_ref(), form.as_ref())
            .await?;

        Ok(self.finalize(session, form.as_ref(), job, map_degraded).await)
    }

    async fn login(&self, runner: &StepRunner<'_>, entry: &dyn Surface) -> Result<(), WorkflowError> {
        info!("logging into the portal");
        let steps = [
            StepAction::TypeText {
                field: r#"input[placeholder="Digite seu CPF"]"#.to_string(),
                text: self.config.credentials.cpf.clone(),
                speed: TypingSpeed::Fast,
            },
            StepAction::Pause(PauseKind::Action),
            StepAction::TypeText {
                field: r#"input[placeholder="Digite sua Senha."]"#.to_string(),
                text: self.config.credentials.password.clone(),
                speed: TypingSpeed::Fast,
            },
            StepAction::Click(Target::Text("Entrar".to_string())),
            StepAction::Pause(PauseKind::Action),
            StepAction::Click(Target::Text("Viabilidade".to_string())),
            StepAction::Pause(PauseKind::Action),
        ];
        runner.run_all(entry, &steps).await
    }

    /// The page-open is not always synchronous with the click that triggers
    /// it, so acquiring the form surface gets its own bounded retry loop.
    async fn acquire_form_surface(
        &self,
        session: &dyn BrowserSession,
        runner: &StepRunner<'_>,
        entry: &dyn Surface,
    ) -> Result<Arc<dyn Surface>, WorkflowError> {
        let mut last: Option<SurfaceError> = None;
        for attempt in 1..=self.config.acquisition_attempts {
            info!(attempt, "opening the viability request form");
            let baseline = session.surface_count().await?;
            runner
                .click(
                    entry,
                    &Target::Text("Pedido de Viabilidade".to_string()),
                    self.config.resolver_budget,
                )
                .await?;
            sleep(self.tempo.page_load.sample()).await;

            let form = session
                .await_surface_beyond(baseline, self.config.surface_spawn_timeout)
                .await?;
            match form
                .wait_for_selector("#drpListaMucinicpios", self.config.selector_timeout)
                .await
            {
                Ok(()) => {
                    info!(surface = %form.id(), "form surface adopted");
                    return Ok(form);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "form surface not ready, retrying");
                    last = Some(err);
                }
            }
        }
        Err(WorkflowError::FormAcquisition {
            attempts: self.config.acquisition_attempts,
            last: last.unwrap_or(SurfaceError::Other(
                "form surface never appeared".to_string(),
            )),
        })
    }

    async fn location_form(
        &self,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
        job: &ViabilityJob,
    ) -> Result<(), WorkflowError> {
        sleep(self.tempo.action_pause()).await;
        ensure_active(form, "focus the city dropdown").await?;
        let city = job.city.to_uppercase();
        runner
            .select_option(form, "#drpListaMucinicpios", &city)
            .await?;
        info!(%city, "city selected");
        sleep(self.tempo.action_pause()).await;

        ensure_active(form, "wait for the institution dropdown").await?;
        form.wait_for_selector("#drpListaOpcoes", self.config.selector_timeout)
            .await?;
        sleep(self.tempo.action_pause()).await;

        ensure_active(form, "select the institution").await?;
        let institution = self.config.defaults.institution.to_uppercase();
        runner
            .select_option(form, "#drpListaOpcoes", &institution)
            .await?;
        info!(%institution, "institution selected");
        sleep(self.tempo.action_pause()).await;

        ensure_active(form, "tick the head-office checkbox").await?;
        form.click_css("#chkEmpresa").await?;
        sleep(self.tempo.action_pause()).await;

        ensure_active(form, "advance past the location form").await?;
        runner
            .click(
                form,
                &Target::Text("Avançar".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.page_load.sample()).await;
        Ok(())
    }

    async fn applicant_form(
        &self,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
        job: &ViabilityJob,
    ) -> Result<(), WorkflowError> {
        info!("filling the applicant and legal-entity form");
        let defaults = &self.config.defaults;

        runner
            .type_text(form, "#txtIPTU", &job.town_registry, TypingSpeed::Fast)
            .await?;
        sleep(self.tempo.action_pause()).await;

        runner
            .type_text(
                form,
                "#txtArea",
                &defaults.commercial_establishment_area,
                TypingSpeed::Slow,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;

        // The state-registry dropdown only reacts to keyboard selection.
        form.click_css("#drpEnviaSefaz").await?;
        form.focus_css("#drpEnviaSefaz").await?;
        form.press_key(Key::ArrowDown).await?;
        if let Some(first) = defaults.state_registry_requested.chars().next() {
            let mut buffer = [0u8; 4];
            form.insert_text(first.encode_utf8(&mut buffer)).await?;
        }
        form.press_key(Key::Enter).await?;
        info!(
            answer = %defaults.state_registry_requested,
            "state-registry question answered through the keyboard"
        );
        sleep(self.tempo.action_pause()).await;

        form.click_css("#drpTipoRegistro").await?;
        if !form
            .select_option_containing("#drpTipoRegistro", "Sociedade")
            .await?
        {
            warn!("no 'Sociedade' option in the registration-type dropdown");
        }
        sleep(self.tempo.action_pause()).await;

        form.click_css("#drpnaturezaJuridica").await?;
        if !form
            .select_option_containing("#drpnaturezaJuridica", "Sociedade Unipessoal de Advocacia")
            .await?
        {
            warn!("no 'Sociedade Unipessoal de Advocacia' option in the legal-nature dropdown");
        }
        sleep(self.tempo.action_pause()).await;

        runner
            .click(
                form,
                &Target::Text("Internet".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;

        form.wait_for_selector("#txtCodigoImovel", self.config.selector_timeout)
            .await?;
        runner
            .type_text(
                form,
                "#txtCodigoImovel",
                &defaults.property_sequential_number,
                TypingSpeed::Slow,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;

        runner
            .click(
                form,
                &Target::Text("Buscar Imóvel".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;

        if form.text_containing("Validado").await?.is_none() {
            return Err(WorkflowError::Validation(
                "property sequential number".to_string(),
            ));
        }
        info!("property sequential number validated");

        let reference = job
            .reference_point
            .clone()
            .unwrap_or_else(|| "NÃO SE APLICA".to_string());
        runner
            .type_text(form, "#txtReferencia", &reference, TypingSpeed::Slow)
            .await?;
        sleep(self.tempo.action_pause()).await;
        Ok(())
    }

    /// The map surface is where the anti-bot interstitial lives. Returns
    /// whether the confirmation was degraded (skipped or fallback
    /// coordinates).
    async fn map_confirmation(
        &self,
        session: &dyn BrowserSession,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
    ) -> Result<bool, WorkflowError> {
        ensure_active(form, "open the map surface").await?;
        let baseline = session.surface_count().await?;
        runner
            .click(
                form,
                &Target::Text("Visualizar Mapa".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.page_load.sample()).await;

        let map = session
            .await_surface_beyond(baseline, self.config.surface_spawn_timeout)
            .await?;
        sleep(self.tempo.page_load.sample()).await;
        if let (Ok(url), Ok(title)) = (map.url().await, map.title().await) {
            info!(%url, %title, "map surface adopted");
        }

        let mut degraded = false;
        if self
            .guard
            .resolve_interstitial(map.as_ref(), self.config.interstitial_timeout)
            .await
        {
            self.confirm_address(runner, map.as_ref()).await?;
        } else {
            warn!("interstitial did not clear, degrading");
            match self.guard.recover(map.as_ref()).await {
                RecoveryOutcome::DialogDismissed => {
                    // Map intentionally skipped. The stray surface must not
                    // outlive the abandoned branch.
                    if let Err(err) = map.close().await {
                        warn!(error = %err, "could not close the skipped map surface");
                    }
                    sleep(self.tempo.page_load.sample()).await;
                    if !runner
                        .try_click_text(form, "Avançar", self.config.submit_budget)
                        .await
                    {
                        return Err(WorkflowError::ElementNotFound {
                            target: "Avançar".to_string(),
                            waited_ms: self.config.submit_budget.as_millis() as u64,
                        });
                    }
                    info!("advanced without map confirmation");
                    sleep(self.tempo.action_pause()).await;
                    return Ok(true);
                }
                RecoveryOutcome::DefaultCoordinates => {
                    degraded = true;
                }
                RecoveryOutcome::ReloadFailed => {
                    return Err(WorkflowError::InterstitialBlocked("map".to_string()));
                }
            }
        }

        sleep(self.tempo.action_pause()).await;
        runner
            .click(
                form,
                &Target::Text("Avançar".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;
        Ok(degraded)
    }

    async fn confirm_address(
        &self,
        runner: &StepRunner<'_>,
        map: &dyn Surface,
    ) -> Result<(), WorkflowError> {
        if runner
            .try_click_text(map, "Confirma Endereço", self.config.resolver_budget)
            .await
        {
            info!("address confirmed on the map surface");
            return Ok(());
        }
        warn!("primary confirmation button missing, trying alternatives");
        for text in ALTERNATIVE_CONFIRMATIONS {
            if runner
                .try_click_text(map, text, self.config.submit_budget)
                .await
            {
                info!(text, "alternative confirmation clicked");
                return Ok(());
            }
        }
        Err(WorkflowError::ElementNotFound {
            target: "Confirma Endereço".to_string(),
            waited_ms: self.config.resolver_budget.as_millis() as u64,
        })
    }

    /// Each partner entry runs as its own awaited sub-sequence. They may
    /// interleave at the scheduler's discretion, but the gate serializes
    /// every fill-then-add pair: the form clears the CPF field after each
    /// add, so an entry is safe only against a fresh empty field.
    async fn ownership(
        &self,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
        job: &ViabilityJob,
    ) -> Result<(), WorkflowError> {
        info!(
            partners = job.ownership_structure.len(),
            "filling the ownership structure"
        );
        let gate = tokio::sync::Mutex::new(());
        let partners = &job.ownership_structure;
        // The requester's own entry is implicit in the portal: the last
        // partner is skipped whenever more than one is present.
        let skip_last = partners.len() > 1;

        let mut entries = Vec::new();
        for (index, partner) in partners.iter().enumerate() {
            if skip_last && index == partners.len() - 1 {
                continue;
            }
            let gate = &gate;
            entries.push(async move {
                let _slot = gate.lock().await;
                form.wait_for_selector("#CpfSocio", self.config.resolver_budget)
                    .await?;
                runner
                    .type_text(form, "#CpfSocio", &partner.cpf, TypingSpeed::Slow)
                    .await?;
                runner
                    .click(
                        form,
                        &Target::Text("Adicionar".to_string()),
                        self.config.resolver_budget,
                    )
                    .await?;
                sleep(self.tempo.action_pause()).await;
                debug!(index, "partner added");
                Ok::<(), WorkflowError>(())
            });
        }

        for result in futures::future::join_all(entries).await {
            result?;
        }

        runner
            .click(
                form,
                &Target::Text("Avançar".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;
        Ok(())
    }

    async fn naming(
        &self,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
        job: &ViabilityJob,
    ) -> Result<(), WorkflowError> {
        info!("filling enterprise name and purpose");
        let steps = [
            StepAction::TypeText {
                field: "#txtOpcao1".to_string(),
                text: job.enterprise_name.clone(),
                speed: TypingSpeed::Normal,
            },
            StepAction::Pause(PauseKind::Action),
            StepAction::TypeText {
                field: "#txtObjeto".to_string(),
                text: job.enterprise_purpose.clone(),
                speed: TypingSpeed::Slow,
            },
            StepAction::Pause(PauseKind::Action),
            StepAction::Click(Target::Text("Avançar".to_string())),
            StepAction::Pause(PauseKind::Action),
        ];
        runner.run_all(form, &steps).await
    }

    /// Complementary information is a Tab-navigated form: only the first
    /// field has a usable selector.
    async fn complementary(
        &self,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
    ) -> Result<(), WorkflowError> {
        info!("filling complementary information");
        let defaults = &self.config.defaults;
        let fiscal = &self.config.fiscal_representative;

        form.wait_for_selector("#pnPrincipal input:first-of-type", self.config.selector_timeout)
            .await?;
        runner
            .type_text(
                form,
                "#pnPrincipal input:first-of-type",
                &defaults.built_area,
                TypingSpeed::Slow,
            )
            .await?;
        sleep(self.tempo.action_pause()).await;

        let tabbed_fields: [(&str, TypingSpeed); 4] = [
            (defaults.requestor_phone.as_str(), TypingSpeed::Slow),
            (fiscal.name.as_str(), TypingSpeed::Normal),
            (fiscal.cpf.as_str(), TypingSpeed::Slow),
            (fiscal.phone.as_str(), TypingSpeed::Slow),
        ];
        for (value, speed) in tabbed_fields {
            form.press_key(Key::Tab).await?;
            runner.type_at_focus(form, value, speed).await?;
            sleep(self.tempo.action_pause()).await;
        }

        self.fill_sepul_field(runner, form).await;
        sleep(self.tempo.action_pause()).await;
        Ok(())
    }

    /// The SEPUL protocol field has no selector of its own: primary path is
    /// one more Tab, fallback is the sixth plain text input. An unfilled
    /// field is tolerated.
    async fn fill_sepul_field(&self, runner: &StepRunner<'_>, form: &dyn Surface) {
        let sepul = self.config.defaults.sepul_or_default().to_string();

        let tab_path: Result<(), WorkflowError> = async {
            form.press_key(Key::Tab).await?;
            sleep(self.tempo.action_pause()).await;
            runner.type_at_focus(form, &sepul, TypingSpeed::Slow).await
        }
        .await;

        match tab_path {
            Ok(()) => {
                info!(%sepul, "SEPUL protocol entered through tab navigation");
                return;
            }
            Err(err) => warn!(error = %err, "tab path to the SEPUL field failed"),
        }

        match form.fill_text_input_at(5, &sepul).await {
            Ok(true) => info!(%sepul, "SEPUL protocol entered through the input index fallback"),
            Ok(false) => warn!("SEPUL protocol field could not be filled automatically"),
            Err(err) => warn!(error = %err, "SEPUL fallback failed"),
        }
    }

    /// Submit the milestone form and adopt the fire-safety questionnaire
    /// surface the portal spawns for it.
    async fn milestone(
        &self,
        session: &dyn BrowserSession,
        runner: &StepRunner<'_>,
        form: &dyn Surface,
    ) -> Result<Arc<dyn Surface>, WorkflowError> {
        ensure_active(form, "submit the milestone form").await?;
        let baseline = session.surface_count().await?;
        runner
            .click(
                form,
                &Target::Text("Preencher Formulário".to_string()),
                self.config.resolver_budget,
            )
            .await?;
        sleep(self.tempo.page_load.sample()).await;

        let questionnaire = session
            .await_surface_beyond(baseline, self.config.surface_spawn_timeout)
            .await?;
        sleep(self.tempo.page_load.sample()).await;

        let content = questionnaire
            .content()
            .await
            .unwrap_or_default()
            .to_lowercase();
        if !content.contains("bombeiro") && !content.contains("inciar") && !content.contains("iniciar")
        {
            warn!("adopted surface does not look like the fire-safety questionnaire");
            if let Ok(all) = session.surfaces().await {
                for (index, surface) in all.iter().enumerate() {
                    let url = surface.url().await.unwrap_or_default();
                    let title = surface.title().await.unwrap_or_default();
                    info!(index, %url, %title, "open surface");
                }
            }
        }

        for text in START_BUTTON_VARIANTS {
            sleep(self.tempo.important_click.sample()).await;
            match questionnaire.click_text(text).await {
                Ok(true) => {
                    info!(text, "questionnaire started");
                    sleep(self.tempo.action_pause()).await;
                    return Ok(questionnaire);
                }
                Ok(false) => debug!(text, "start button not found under this spelling"),
                Err(err) => warn!(text, error = %err, "start button probe failed"),
            }
        }

        if let Ok(inventory) = questionnaire.clickable_inventory().await {
            let dump = serde_json::to_string(&inventory).unwrap_or_default();
            info!(buttons = %dump, "buttons on the adopted surface");
        }
        Err(WorkflowError::ElementNotFound {
            target: "Inciar".to_string(),
            waited_ms: self.config.submit_budget.as_millis() as u64,
        })
    }

    async fn fire_safety(
        &self,
        runner: &StepRunner<'_>,
        questionnaire: &dyn Surface,
    ) -> Result<(), WorkflowError> {
        info!("answering the fire-safety questionnaire");
        let mut steps = Vec::with_capacity(FIRE_SAFETY_SCRIPT.len() * 2);
        for answer in FIRE_SAFETY_SCRIPT {
            steps.push(StepAction::Click(Target::Text(answer.to_string())));
            steps.push(StepAction::Pause(PauseKind::Action));
        }
        runner.run_all(questionnaire, &steps).await?;
        info!("fire-safety questionnaire completed");
        Ok(())
    }

    /// The submission button may live on either surface.
    async fn submit(
        &self,
        runner: &StepRunner<'_>,
        questionnaire: &dyn Surface,
        form: &dyn Surface,
    ) -> Result<(), WorkflowError> {
        info!("looking for the final submission control");
        if runner
            .try_click_text(questionnaire, "Enviar", self.config.submit_budget)
            .await
        {
            info!("submission sent from the questionnaire surface");
        } else if runner
            .try_click_text(form, "Enviar", self.config.submit_budget)
            .await
        {
            info!("submission sent from the form surface");
        } else {
            return Err(WorkflowError::ElementNotFound {
                target: "Enviar".to_string(),
                waited_ms: (self.config.submit_budget.as_millis() * 2) as u64,
            });
        }
        sleep(self.tempo.final_submit.sample()).await;
        Ok(())
    }

    /// Soft-failure zone. By now the remote system has most likely already
    /// registered the submission, so recovery failures here downgrade the
    /// outcome instead of failing the workflow.
    async fn finalize(
        &self,
        session: &dyn BrowserSession,
        form: &dyn Surface,
        job: &ViabilityJob,
        map_degraded: bool,
    ) -> SequenceOutcome {
        info!("submission registered, recovering protocol and report");
        let protocol = self.extract_protocol(form).await;
        let report_url = self
            .capture_report(session, form, job, protocol.as_deref())
            .await;
        SequenceOutcome {
            protocol,
            report_url,
            map_degraded,
        }
    }

    async fn extract_protocol(&self, form: &dyn Surface) -> Option<String> {
        match form
            .text_containing("Viabilidade concluida com sucesso")
            .await
        {
            Ok(Some(text)) => {
                if let Some(found) = PROTOCOL_PATTERN.find(&text) {
                    info!(protocol = found.as_str(), "protocol extracted from the confirmation");
                    return Some(found.as_str().to_string());
                }
            }
            Ok(None) => debug!("confirmation message not found"),
            Err(err) => warn!(error = %err, "confirmation lookup failed"),
        }

        match form.body_text().await {
            Ok(body) => PROTOCOL_PATTERN.find(&body).map(|found| {
                info!(protocol = found.as_str(), "protocol found in the page body");
                found.as_str().to_string()
            }),
            Err(err) => {
                warn!(error = %err, "body scan for the protocol failed");
                None
            }
        }
    }

    /// Render the confirmation report (PDF, falling back to a full-page
    /// capture) and delegate persistence. Any failure here means "no
    /// artifact", never "no workflow".
    async fn capture_report(
        &self,
        session: &dyn BrowserSession,
        form: &dyn Surface,
        job: &ViabilityJob,
        protocol: Option<&str>,
    ) -> Option<String> {
        let runner = self.runner();
        let baseline = match session.surface_count().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "surface listing failed before the report");
                return None;
            }
        };
        if !runner
            .try_click_text(form, "Ver Relatório", self.config.submit_budget)
            .await
        {
            warn!("'Ver Relatório' not found, continuing without the artifact");
            return None;
        }
        sleep(self.tempo.page_load.sample()).await;

        let adopted = match session.surface_count().await {
            Ok(count) if count > baseline => session.newest_surface().await.ok(),
            _ => {
                debug!("report rendered on the form surface itself");
                None
            }
        };
        let report: &dyn Surface = adopted.as_deref().unwrap_or(form);
        sleep(self.tempo.page_load.sample()).await;

        let (bytes, extension) = match report.print_pdf().await {
            Ok(bytes) => {
                info!("report rendered as PDF");
                (bytes, "pdf")
            }
            Err(err) => {
                warn!(error = %err, "PDF render failed, falling back to a full-page capture");
                match report.screenshot().await {
                    Ok(bytes) => (bytes, "png"),
                    Err(err) => {
                        warn!(error = %err, "capture fallback failed, no artifact");
                        return None;
                    }
                }
            }
        };

        let stamp = protocol
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().format("%Y%m%d%H%M%S").to_string());
        let file_name = format!("{}-RELATORIO-{}.{}", job.enterprise_name, stamp, extension);
        let prefix = format!("viability-reports/{stamp}");

        match self.artifacts.store(bytes, &file_name, &prefix).await {
            Ok(url) => {
                info!(%url, "report persisted");
                Some(url)
            }
            Err(err) => {
                warn!(error = %err, "report upload failed, continuing without the artifact");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FailingArtifactStore, MemoryArtifactStore};
    use element_resolver::Diagnostics;
    use interstitial_guard::GuardConfig;
    use surface_adapter::mock::{MockSession, MockSurface};
    use viabot_core_types::Partner;

    const SUCCESS_BODY: &str = "Viabilidade concluida com sucesso - protocolo PEP123456";

    fn job(partners: usize) -> ViabilityJob {
        ViabilityJob {
            enterprise_id: 42,
            enterprise_name: "ACME ADVOGADOS".to_string(),
            enterprise_purpose: "Serviços advocatícios".to_string(),
            city: "RECIFE".to_string(),
            state: "PE".to_string(),
            town_registry: "1234567".to_string(),
            reference_point: None,
            ownership_structure: (0..partners)
                .map(|i| Partner {
                    cpf: format!("0000000000{i}"),
                })
                .collect(),
        }
    }

    fn test_sequencer(artifacts: Arc<dyn ArtifactStore>) -> StepSequencer {
        let credentials = Credentials {
            cpf: "11122233344".to_string(),
            password: "hunter2".to_string(),
        };
        let fiscal = FiscalRepresentative {
            name: "Maria Contadora".to_string(),
            cpf: "55566677788".to_string(),
            phone: "81999990000".to_string(),
        };
        let defaults = RequestDefaults {
            institution: "OAB".to_string(),
            state_registry_requested: "Não".to_string(),
            commercial_establishment_area: "25".to_string(),
            property_sequential_number: "7654321".to_string(),
            sepul_protocol: None,
            built_area: "25".to_string(),
            requestor_phone: "81988887777".to_string(),
        };
        let mut config = SequencerConfig::new(credentials, fiscal, defaults);
        config.selector_timeout = Duration::from_millis(50);
        config.resolver_budget = Duration::from_millis(80);
        config.submit_budget = Duration::from_millis(60);
        config.surface_spawn_timeout = Duration::from_millis(20);
        config.interstitial_timeout = Duration::from_millis(40);
        config.acquisition_attempts = 3;

        let resolver = ElementResolver::new(Diagnostics::disabled()).with_pacing(
            Duration::from_millis(30),
            Duration::from_millis(2),
            Duration::from_millis(5),
        );
        StepSequencer::new(
            config,
            TempoPlan::instant(),
            resolver,
            InterstitialGuard::new(GuardConfig::instant()),
            artifacts,
        )
    }

    async fn open_entry(session: &MockSession) -> Arc<dyn Surface> {
        session
            .open_surface("about:portal", surface_adapter::Readiness::NetworkMostlyIdle, Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_run_extracts_protocol_and_uploads_report() {
        let store = Arc::new(MemoryArtifactStore::new());
        let sequencer = test_sequencer(store.clone());
        let session = MockSession::lenient().with_default_body(SUCCESS_BODY);
        let entry = open_entry(&session).await;

        let outcome = sequencer.run(&session, entry, &job(1)).await.unwrap();
        assert_eq!(outcome.protocol.as_deref(), Some("PEP123456"));
        assert!(!outcome.map_degraded);
        let url = outcome.report_url.expect("report uploaded");
        assert!(url.ends_with(".pdf"));
        assert!(url.contains("viability-reports/PEP123456"));
        assert_eq!(store.stored_keys().len(), 1);
    }

    #[tokio::test]
    async fn ownership_skips_the_last_partner_when_several() {
        let sequencer = test_sequencer(Arc::new(MemoryArtifactStore::new()));
        let session = MockSession::lenient().with_default_body(SUCCESS_BODY);
        let entry = open_entry(&session).await;

        sequencer.run(&session, entry, &job(3)).await.unwrap();

        let surface = &session.spawned_surfaces()[0];
        let typed = surface.typed_text();
        assert!(typed.contains("00000000000"));
        assert!(typed.contains("00000000001"));
        assert!(!typed.contains("00000000002"), "last partner must be skipped");
    }

    #[tokio::test]
    async fn single_partner_is_entered() {
        let sequencer = test_sequencer(Arc::new(MemoryArtifactStore::new()));
        let session = MockSession::lenient().with_default_body(SUCCESS_BODY);
        let entry = open_entry(&session).await;

        sequencer.run(&session, entry, &job(1)).await.unwrap();
        let typed = session.spawned_surfaces()[0].typed_text();
        assert!(typed.contains("00000000000"));
    }

    #[tokio::test]
    async fn pdf_failure_falls_back_to_screenshot() {
        let store = Arc::new(MemoryArtifactStore::new());
        let sequencer = test_sequencer(store.clone());
        let session = MockSession::lenient();
        session.queue_surface(Arc::new(
            MockSurface::lenient()
                .with_body(SUCCESS_BODY)
                .with_titles(["Portal"])
                .failing_pdf(),
        ));
        let entry = open_entry(&session).await;

        let outcome = sequencer.run(&session, entry, &job(1)).await.unwrap();
        let url = outcome.report_url.expect("screenshot artifact");
        assert!(url.ends_with(".png"));
    }

    #[tokio::test]
    async fn upload_failure_keeps_success_with_missing_artifact() {
        let sequencer = test_sequencer(Arc::new(FailingArtifactStore));
        let session = MockSession::lenient().with_default_body(SUCCESS_BODY);
        let entry = open_entry(&session).await;

        let outcome = sequencer.run(&session, entry, &job(1)).await.unwrap();
        assert_eq!(outcome.protocol.as_deref(), Some("PEP123456"));
        assert!(outcome.report_url.is_none());
    }

    #[tokio::test]
    async fn missing_protocol_still_returns_outcome() {
        let sequencer = test_sequencer(Arc::new(MemoryArtifactStore::new()));
        let session =
            MockSession::lenient().with_default_body("Processo registrado, aguarde");
        let entry = open_entry(&session).await;

        let outcome = sequencer.run(&session, entry, &job(1)).await.unwrap();
        assert!(outcome.protocol.is_none());
    }

    #[tokio::test]
    async fn blocked_map_with_dialog_skips_and_continues() {
        let sequencer = test_sequencer(Arc::new(MemoryArtifactStore::new()));
        let session = MockSession::lenient().with_default_body(SUCCESS_BODY);

        let entry = open_entry(&session).await;
        // Form surface, then a map surface stuck on a challenge title but
        // carrying a close control.
        session.queue_surface(Arc::new(
            MockSurface::lenient()
                .with_body(SUCCESS_BODY)
                .with_titles(["Portal"]),
        ));
        let map = Arc::new(
            MockSurface::new()
                .with_titles(["Just a moment..."])
                .with_selectors([".close"]),
        );
        session.queue_surface(map.clone());

        let outcome = sequencer.run(&session, entry, &job(1)).await.unwrap();
        assert!(outcome.map_degraded);
        assert!(map.is_closed(), "skipped map surface must be closed");
        assert_eq!(map.recorded_clicks(), vec![".close".to_string()]);
    }

    #[tokio::test]
    async fn dead_entry_surface_fails_the_sequence() {
        let sequencer = test_sequencer(Arc::new(MemoryArtifactStore::new()));
        let session = MockSession::lenient().with_default_body(SUCCESS_BODY);
        let entry = open_entry(&session).await;
        session.spawned_surfaces()[0].poison("Execution context was destroyed");

        let err = sequencer.run(&session, entry, &job(1)).await.unwrap_err();
        assert!(crate::classify::is_retryable(&err));
    }
}
