//! Completion notifier.
//!
//! Hands the final result to the downstream system of record. Delivery is
//! best-effort: failures are logged and never folded back into the workflow
//! result.

use viabot_core_types::{NotificationPayload, WorkflowResult};
use tracing::{debug, error, info};

pub struct Notifier {
    client: reqwest::Client,
    base_url: Option<String>,
    api_secret: String,
}

impl Notifier {
    pub fn new(base_url: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Some(base_url.into()),
            api_secret: api_secret.into(),
        }
    }

    /// A notifier that only logs. For tests and local runs.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
            api_secret: String::new(),
        }
    }

    pub async fn notify(&self, result: &WorkflowResult) {
        let Some(base) = &self.base_url else {
            debug!("notifier disabled, skipping delivery");
            return;
        };
        let payload = NotificationPayload::from_result(result);
        let url = format!("{}/commercial-registry/", base.trim_end_matches('/'));

        match self
            .client
            .post(&url)
            .header("x-api-secret", &self.api_secret)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(enterprise = result.enterprise_id, "records system notified");
            }
            Ok(response) => {
                error!(
                    enterprise = result.enterprise_id,
                    status = %response.status(),
                    "records system rejected the notification"
                );
            }
            Err(err) => {
                error!(
                    enterprise = result.enterprise_id,
                    error = %err,
                    "could not reach the records system"
                );
            }
        }
    }
}
