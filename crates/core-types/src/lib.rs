//! Shared data model for the viability workflow engine.
//!
//! Everything here is plain data: the inbound job description, the static
//! per-deployment configuration, and the final result handed to the
//! notification layer. No I/O lives in this crate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Sentinel protocol value when the submission went through but the protocol
/// identifier could not be recovered from the confirmation surface.
pub const PROTOCOL_NOT_FOUND: &str = "PROTOCOL_NOT_FOUND";

/// Sentinel protocol value for a failed workflow.
pub const PROTOCOL_FAILED: &str = "FAILED";

/// Identifier for one browsing surface (context/tab).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One partner record in the ownership structure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub cpf: String,
}

/// One unit of external work: the enterprise to register and its owners.
///
/// Created once per inbound request and never mutated afterwards; the
/// orchestrator owns it for the lifetime of the job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViabilityJob {
    pub enterprise_id: i64,
    pub enterprise_name: String,
    pub enterprise_purpose: String,
    pub city: String,
    pub state: String,
    pub town_registry: String,
    #[serde(default)]
    pub reference_point: Option<String>,
    pub ownership_structure: Vec<Partner>,
}

impl ViabilityJob {
    /// Reject malformed jobs before the workflow core is ever invoked.
    pub fn validate(&self) -> Result<(), JobValidationError> {
        if self.ownership_structure.is_empty() {
            return Err(JobValidationError::EmptyOwnership);
        }
        for (field, value) in [
            ("enterpriseName", &self.enterprise_name),
            ("enterprisePurpose", &self.enterprise_purpose),
            ("city", &self.city),
            ("state", &self.state),
            ("townRegistry", &self.town_registry),
        ] {
            if value.trim().is_empty() {
                return Err(JobValidationError::MissingField(field.to_string()));
            }
        }
        if self
            .ownership_structure
            .iter()
            .any(|p| p.cpf.trim().is_empty())
        {
            return Err(JobValidationError::MissingField(
                "ownershipStructure[].cpf".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validation failure for an inbound job description.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum JobValidationError {
    #[error("ownership structure must contain at least one partner")]
    EmptyOwnership,

    #[error("required field missing or empty: {0}")]
    MissingField(String),
}

/// Portal login credentials. Process-wide, read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub cpf: String,
    pub password: String,
}

/// Fiscal representative entered into the complementary-information form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FiscalRepresentative {
    pub name: String,
    pub cpf: String,
    pub phone: String,
}

/// Static request values that do not vary per job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestDefaults {
    pub institution: String,
    /// Answer to the "request state registry?" dropdown; matched by its
    /// first letter through the keyboard.
    pub state_registry_requested: String,
    pub commercial_establishment_area: String,
    pub property_sequential_number: String,
    #[serde(default)]
    pub sepul_protocol: Option<String>,
    pub built_area: String,
    pub requestor_phone: String,
}

impl RequestDefaults {
    /// The SEPUL field accepts "0" when no protocol exists.
    pub fn sepul_or_default(&self) -> &str {
        self.sepul_protocol.as_deref().unwrap_or("0")
    }
}

/// Final, immutable outcome of one job. Produced exactly once, at
/// orchestrator exit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub success: bool,
    pub protocol_number: String,
    pub enterprise_name: String,
    pub enterprise_id: i64,
    #[serde(default)]
    pub report_file_url: Option<String>,
    pub status: String,
    pub attempts: u32,
    pub processed_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub fn failure(job: &ViabilityJob, attempts: u32, status: impl Into<String>) -> Self {
        Self {
            success: false,
            protocol_number: PROTOCOL_FAILED.to_string(),
            enterprise_name: job.enterprise_name.clone(),
            enterprise_id: job.enterprise_id,
            report_file_url: None,
            status: status.into(),
            attempts,
            processed_at: Utc::now(),
        }
    }
}

/// Payload delivered to the downstream system of record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub file_url: Option<String>,
    pub enterprise_id: i64,
    pub logs: NotificationLogs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationLogs {
    pub status: String,
    pub protocol_number: String,
    pub processing_time: String,
    pub bot_response: String,
    pub attempts: u32,
}

impl NotificationPayload {
    pub fn from_result(result: &WorkflowResult) -> Self {
        Self {
            file_url: result.report_file_url.clone(),
            enterprise_id: result.enterprise_id,
            logs: NotificationLogs {
                status: if result.success {
                    "completed".to_string()
                } else {
                    "failed".to_string()
                },
                protocol_number: result.protocol_number.clone(),
                processing_time: "N/A".to_string(),
                bot_response: result.status.clone(),
                attempts: result.attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> ViabilityJob {
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

    #[test]
    fn valid_job_passes() {
        assert!(sample_job().validate().is_ok());
    }

    #[test]
    fn empty_ownership_rejected() {
        let mut job = sample_job();
        job.ownership_structure.clear();
        assert_eq!(job.validate(), Err(JobValidationError::EmptyOwnership));
    }

    #[test]
    fn blank_required_field_rejected() {
        let mut job = sample_job();
        job.city = "  ".to_string();
        assert!(matches!(
            job.validate(),
            Err(JobValidationError::MissingField(f)) if f == "city"
        ));
    }

    #[test]
    fn job_deserializes_from_camel_case() {
        let raw = serde_json::json!({
            "enterpriseId": 42,
            "enterpriseName": "ACME",
            "enterprisePurpose": "Consultoria",
            "city": "RECIFE",
            "state": "PE",
            "townRegistry": "7654321",
            "ownershipStructure": [{"cpf": "00000000000"}],
        });
        let job: ViabilityJob = serde_json::from_value(raw).expect("job parses");
        assert_eq!(job.enterprise_id, 42);
        assert_eq!(job.ownership_structure.len(), 1);
        assert!(job.reference_point.is_none());
    }

    #[test]
    fn notification_payload_tracks_outcome() {
        let result = WorkflowResult::failure(&sample_job(), 3, "gave up");
        let payload = NotificationPayload::from_result(&result);
        assert_eq!(payload.logs.status, "failed");
        assert_eq!(payload.logs.attempts, 3);
        assert_eq!(payload.logs.protocol_number, PROTOCOL_FAILED);
        assert!(payload.file_url.is_none());
    }
}
