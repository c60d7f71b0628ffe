//! Typed, validated configuration.
//!
//! Everything is loaded once at startup from defaults layered under
//! `VIABOT_*` environment variables (double underscore as the section
//! separator, e.g. `VIABOT_CREDENTIALS__CPF`). Validation runs before any
//! workflow executes and reports every missing required value at once.

use std::time::Duration;

use action_tempo::TempoPlan;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use surface_adapter::LaunchOptions;
use thiserror::Error;
use viabot_core_types::{Credentials, FiscalRepresentative, RequestDefaults};
use workflow_engine::{EngineSettings, SequencerConfig};

const DEFAULT_ENTRY_URL: &str =
    "https://redesim.jucepe.pe.gov.br/requerimentouniversal/NovoLogin.aspx";

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecordsApiSettings {
    pub base_url: String,
    pub api_secret: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub entry_url: String,
    pub credentials: Credentials,
    pub fiscal_representative: FiscalRepresentative,
    pub request_defaults: RequestDefaults,
    pub tempo: TempoPlan,
    pub browser: BrowserSettings,
    pub retry: RetrySettings,
    pub records_api: RecordsApiSettings,
    pub storage: StorageSettings,
    pub diagnostics_dir: Option<String>,
}

/// One or more required values are missing.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("required configuration not set: {}", keys.join(", "))]
pub struct MissingConfig {
    pub keys: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let tempo = TempoPlan::default();
        let builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("entry_url", DEFAULT_ENTRY_URL)?
            .set_default("credentials.cpf", "")?
            .set_default("credentials.password", "")?
            .set_default("fiscal_representative.name", "")?
            .set_default("fiscal_representative.cpf", "")?
            .set_default("fiscal_representative.phone", "")?
            .set_default("request_defaults.institution", "OAB")?
            .set_default("request_defaults.state_registry_requested", "Não")?
            .set_default("request_defaults.commercial_establishment_area", "")?
            .set_default("request_defaults.property_sequential_number", "")?
            .set_default("request_defaults.built_area", "")?
            .set_default("request_defaults.requestor_phone", "")?
            .set_default("tempo.action_delay.min_ms", tempo.action_delay.min_ms)?
            .set_default("tempo.action_delay.max_ms", tempo.action_delay.max_ms)?
            .set_default("tempo.typing_fast.min_ms", tempo.typing_fast.min_ms)?
            .set_default("tempo.typing_fast.max_ms", tempo.typing_fast.max_ms)?
            .set_default("tempo.typing_normal.min_ms", tempo.typing_normal.min_ms)?
            .set_default("tempo.typing_normal.max_ms", tempo.typing_normal.max_ms)?
            .set_default("tempo.typing_slow.min_ms", tempo.typing_slow.min_ms)?
            .set_default("tempo.typing_slow.max_ms", tempo.typing_slow.max_ms)?
            .set_default("tempo.page_load.min_ms", tempo.page_load.min_ms)?
            .set_default("tempo.page_load.max_ms", tempo.page_load.max_ms)?
            .set_default("tempo.important_click.min_ms", tempo.important_click.min_ms)?
            .set_default("tempo.important_click.max_ms", tempo.important_click.max_ms)?
            .set_default("tempo.final_submit.min_ms", tempo.final_submit.min_ms)?
            .set_default("tempo.final_submit.max_ms", tempo.final_submit.max_ms)?
            .set_default("browser.headless", true)?
            .set_default("browser.window_width", 1920)?
            .set_default("browser.window_height", 1080)?
            .set_default("retry.max_retries", 3)?
            .set_default("retry.retry_delay_ms", 5000)?
            .set_default("retry.timeout_ms", 60_000)?
            .set_default("records_api.base_url", "")?
            .set_default("records_api.api_secret", "")?
            .set_default("storage.bucket", "")?
            .set_default("storage.region", "")?
            .add_source(Environment::with_prefix("VIABOT").separator("__"));
        builder.build()?.try_deserialize()
    }

    /// Reject startup when any required value is unset. Reports every
    /// missing key, not just the first.
    pub fn validate(&self) -> Result<(), MissingConfig> {
        let required: [(&str, &str); 7] = [
            ("VIABOT_CREDENTIALS__CPF", &self.credentials.cpf),
            ("VIABOT_CREDENTIALS__PASSWORD", &self.credentials.password),
            (
                "VIABOT_FISCAL_REPRESENTATIVE__NAME",
                &self.fiscal_representative.name,
            ),
            (
                "VIABOT_FISCAL_REPRESENTATIVE__CPF",
                &self.fiscal_representative.cpf,
            ),
            (
                "VIABOT_FISCAL_REPRESENTATIVE__PHONE",
                &self.fiscal_representative.phone,
            ),
            ("VIABOT_RECORDS_API__BASE_URL", &self.records_api.base_url),
            ("VIABOT_RECORDS_API__API_SECRET", &self.records_api.api_secret),
        ];
        let keys: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| key.to_string())
            .collect();
        if keys.is_empty() {
            Ok(())
        } else {
            Err(MissingConfig { keys })
        }
    }

    /// Engine settings derived from this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        let sequencer = SequencerConfig::new(
            self.credentials.clone(),
            self.fiscal_representative.clone(),
            self.request_defaults.clone(),
        );
        let mut settings = EngineSettings::new(self.entry_url.clone(), sequencer);
        settings.max_retries = self.retry.max_retries;
        settings.retry_delay = Duration::from_millis(self.retry.retry_delay_ms);
        settings.navigation_timeout = Duration::from_millis(self.retry.timeout_ms);
        settings.tempo = self.tempo.clone();
        settings.launch = LaunchOptions {
            headless: self.browser.headless,
            window_width: self.browser.window_width,
            window_height: self.browser.window_height,
            ..LaunchOptions::default()
        };
        settings.diagnostics_dir = self.diagnostics_dir.clone().map(Into::into);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> AppConfig {
        AppConfig::from_env().expect("defaults load")
    }

    #[test]
    fn defaults_load_without_environment() {
        let config = bare_config();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.browser.headless);
        assert_eq!(config.entry_url, DEFAULT_ENTRY_URL);
    }

    #[test]
    fn validation_lists_every_missing_key() {
        let config = bare_config();
        let err = config.validate().unwrap_err();
        assert!(err.keys.contains(&"VIABOT_CREDENTIALS__CPF".to_string()));
        assert!(err
            .keys
            .contains(&"VIABOT_RECORDS_API__API_SECRET".to_string()));
        assert_eq!(err.keys.len(), 7);
    }

    #[test]
    fn complete_config_validates() {
        let mut config = bare_config();
        config.credentials.cpf = "11122233344".into();
        config.credentials.password = "hunter2".into();
        config.fiscal_representative.name = "Maria".into();
        config.fiscal_representative.cpf = "55566677788".into();
        config.fiscal_representative.phone = "81999990000".into();
        config.records_api.base_url = "https://records.example".into();
        config.records_api.api_secret = "secret".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_settings_carry_retry_and_browser_choices() {
        let mut config = bare_config();
        config.retry.max_retries = 5;
        config.retry.retry_delay_ms = 1234;
        config.browser.headless = false;
        let settings = config.engine_settings();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.retry_delay, Duration::from_millis(1234));
        assert!(!settings.launch.headless);
        assert_eq!(settings.entry_url, DEFAULT_ENTRY_URL);
    }
}
