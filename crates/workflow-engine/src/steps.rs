//! Step descriptors and their runner.
//!
//! The uniform stretches of the workflow are data: ordered lists of
//! [`StepAction`] values executed by [`StepRunner`]. Each action composes
//! the element resolver, the timing model and the health monitor, and is
//! retryable and testable on its own.

use std::time::Duration;

use action_tempo::{TempoPlan, TypingSpeed};
use element_resolver::ElementResolver;
use surface_adapter::{ensure_active, Key, Surface};
use tokio::time::sleep;
use tracing::debug;

use crate::errors::WorkflowError;

/// What a click step aims at.
#[derive(Clone, Debug)]
pub enum Target {
    /// A CSS selector, clicked directly.
    Css(String),
    /// Free-text content, located through the multi-strategy resolver.
    Text(String),
}

/// Which configured delay range a pause samples from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PauseKind {
    Action,
    PageLoad,
    ImportantClick,
    FinalSubmit,
}

/// One step of the ordered workflow script.
#[derive(Clone, Debug)]
pub enum StepAction {
    Click(Target),
    /// Click the field, then enter the text character by character.
    TypeText {
        field: String,
        text: String,
        speed: TypingSpeed,
    },
    SelectOption {
        select: String,
        label: String,
    },
    PressKey(Key),
    WaitForSelector {
        css: String,
        timeout_ms: u64,
    },
    Pause(PauseKind),
}

/// Executes step descriptors against a surface.
pub struct StepRunner<'a> {
    resolver: &'a ElementResolver,
    tempo: &'a TempoPlan,
    /// Budget handed to the resolver for each free-text target.
    text_budget: Duration,
}

impl<'a> StepRunner<'a> {
    pub fn new(resolver: &'a ElementResolver, tempo: &'a TempoPlan, text_budget: Duration) -> Self {
        Self {
            resolver,
            tempo,
            text_budget,
        }
    }

    pub async fn run_all(
        &self,
        surface: &dyn Surface,
        steps: &[StepAction],
    ) -> Result<(), WorkflowError> {
        for step in steps {
            self.run(surface, step).await?;
        }
        Ok(())
    }

    pub async fn run(&self, surface: &dyn Surface, step: &StepAction) -> Result<(), WorkflowError> {
        debug!(?step, "running step");
        match step {
            StepAction::Click(target) => self.click(surface, target, self.text_budget).await,
            StepAction::TypeText { field, text, speed } => {
                self.type_text(surface, field, text, *speed).await
            }
            StepAction::SelectOption { select, label } => {
                self.select_option(surface, select, label).await
            }
            StepAction::PressKey(key) => {
                surface.press_key(*key).await?;
                Ok(())
            }
            StepAction::WaitForSelector { css, timeout_ms } => {
                surface
                    .wait_for_selector(css, Duration::from_millis(*timeout_ms))
                    .await?;
                Ok(())
            }
            StepAction::Pause(kind) => {
                sleep(self.pause_for(*kind)).await;
                Ok(())
            }
        }
    }

    fn pause_for(&self, kind: PauseKind) -> Duration {
        match kind {
            PauseKind::Action => self.tempo.action_delay.sample(),
            PauseKind::PageLoad => self.tempo.page_load.sample(),
            PauseKind::ImportantClick => self.tempo.important_click.sample(),
            PauseKind::FinalSubmit => self.tempo.final_submit.sample(),
        }
    }

    pub async fn click(
        &self,
        surface: &dyn Surface,
        target: &Target,
        budget: Duration,
    ) -> Result<(), WorkflowError> {
        match target {
            Target::Css(css) => {
                surface.click_css(css).await?;
                Ok(())
            }
            Target::Text(text) => {
                if self
                    .resolver
                    .locate_and_activate(surface, text, budget)
                    .await
                {
                    Ok(())
                } else {
                    Err(WorkflowError::ElementNotFound {
                        target: text.clone(),
                        waited_ms: budget.as_millis() as u64,
                    })
                }
            }
        }
    }

    /// Resolve a free-text target without failing the step on a miss.
    pub async fn try_click_text(
        &self,
        surface: &dyn Surface,
        text: &str,
        budget: Duration,
    ) -> bool {
        self.resolver.locate_and_activate(surface, text, budget).await
    }

    /// Fill a field character by character. Every keystroke is preceded by a
    /// health check: a context torn down mid-word must surface immediately,
    /// not as a half-typed ghost entry.
    pub async fn type_text(
        &self,
        surface: &dyn Surface,
        field: &str,
        text: &str,
        speed: TypingSpeed,
    ) -> Result<(), WorkflowError> {
        ensure_active(surface, &format!("focus field '{field}'")).await?;
        surface.click_css(field).await?;
        sleep(self.tempo.action_pause()).await;
        self.type_at_focus(surface, text, speed).await
    }

    /// Type into whatever currently holds focus (tab-navigated forms).
    pub async fn type_at_focus(
        &self,
        surface: &dyn Surface,
        text: &str,
        speed: TypingSpeed,
    ) -> Result<(), WorkflowError> {
        let mut buffer = [0u8; 4];
        for ch in text.chars() {
            ensure_active(surface, &format!("type character '{ch}'")).await?;
            surface.insert_text(ch.encode_utf8(&mut buffer)).await?;
            sleep(self.tempo.keystroke(speed)).await;
        }
        Ok(())
    }

    pub async fn select_option(
        &self,
        surface: &dyn Surface,
        select: &str,
        label: &str,
    ) -> Result<(), WorkflowError> {
        ensure_active(surface, &format!("select option in '{select}'")).await?;
        if surface.select_option_containing(select, label).await? {
            Ok(())
        } else {
            Err(WorkflowError::OptionNotFound {
                select: select.to_string(),
                label: label.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use element_resolver::Diagnostics;
    use surface_adapter::mock::MockSurface;

    fn runner_parts() -> (ElementResolver, TempoPlan) {
        let resolver = ElementResolver::new(Diagnostics::disabled()).with_pacing(
            Duration::from_millis(50),
            Duration::from_millis(2),
            Duration::from_millis(5),
        );
        (resolver, TempoPlan::instant())
    }

    #[tokio::test]
    async fn type_text_enters_every_character() {
        let (resolver, tempo) = runner_parts();
        let runner = StepRunner::new(&resolver, &tempo, Duration::from_millis(100));
        let surface = MockSurface::lenient();
        runner
            .type_text(&surface, "#txtIPTU", "1234567", TypingSpeed::Fast)
            .await
            .unwrap();
        assert_eq!(surface.typed_text(), "1234567");
        assert_eq!(surface.recorded_clicks(), vec!["#txtIPTU".to_string()]);
    }

    #[tokio::test]
    async fn typing_stops_at_first_dead_context() {
        let (resolver, tempo) = runner_parts();
        let runner = StepRunner::new(&resolver, &tempo, Duration::from_millis(100));
        let surface = MockSurface::lenient();
        surface.poison("Execution context was destroyed");
        let err = runner
            .type_text(&surface, "#txtArea", "99", TypingSpeed::Slow)
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("execution context was destroyed"));
        assert!(surface.typed_text().is_empty());
    }

    #[tokio::test]
    async fn text_click_miss_becomes_element_not_found() {
        let (resolver, tempo) = runner_parts();
        let runner = StepRunner::new(&resolver, &tempo, Duration::from_millis(60));
        let surface = MockSurface::new();
        let err = runner
            .run(&surface, &StepAction::Click(Target::Text("Enviar".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ElementNotFound { .. }));
    }

    #[tokio::test]
    async fn select_option_requires_a_matching_label() {
        let (resolver, tempo) = runner_parts();
        let runner = StepRunner::new(&resolver, &tempo, Duration::from_millis(60));
        let surface = MockSurface::new().with_select_options(
            "#drpListaMucinicpios",
            vec!["0001 - RECIFE / PE".to_string()],
        );
        runner
            .select_option(&surface, "#drpListaMucinicpios", "RECIFE")
            .await
            .unwrap();
        assert!(runner
            .select_option(&surface, "#drpListaMucinicpios", "OLINDA")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn step_list_runs_in_order() {
        let (resolver, tempo) = runner_parts();
        let runner = StepRunner::new(&resolver, &tempo, Duration::from_millis(60));
        let surface = MockSurface::lenient();
        let steps = vec![
            StepAction::Click(Target::Text("Entrar".into())),
            StepAction::Pause(PauseKind::Action),
            StepAction::Click(Target::Text("Viabilidade".into())),
        ];
        runner.run_all(&surface, &steps).await.unwrap();
        assert_eq!(
            surface.recorded_clicks(),
            vec!["Entrar".to_string(), "Viabilidade".to_string()]
        );
    }
}
