//! Artifact persistence seam.
//!
//! The engine renders the confirmation report and hands the bytes to an
//! [`ArtifactStore`]; whatever stands behind it (object storage in
//! production) is none of the engine's business. Upload failure downgrades
//! the result to "report unavailable", never to workflow failure.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("artifact upload failed: {0}")]
pub struct ArtifactError(pub String);

/// Persists a generated report and returns its durable URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        prefix: &str,
    ) -> Result<String, ArtifactError>;
}

/// Keeps artifacts in memory and returns `memory://` URLs. For tests and
/// dry runs.
#[derive(Default)]
pub struct MemoryArtifactStore {
    stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        prefix: &str,
    ) -> Result<String, ArtifactError> {
        let key = format!("{prefix}/{file_name}");
        self.stored.lock().unwrap().push((key.clone(), bytes));
        Ok(format!("memory://{key}"))
    }
}

/// Rejects every upload. Exercises the degraded no-report path.
pub struct FailingArtifactStore;

#[async_trait]
impl ArtifactStore for FailingArtifactStore {
    async fn store(
        &self,
        _bytes: Vec<u8>,
        _file_name: &str,
        _prefix: &str,
    ) -> Result<String, ArtifactError> {
        Err(ArtifactError("store unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_returns_addressable_url() {
        let store = MemoryArtifactStore::new();
        let url = store
            .store(b"pdf".to_vec(), "ACME-RELATORIO-PEP1.pdf", "viability-reports/PEP1")
            .await
            .unwrap();
        assert_eq!(
            url,
            "memory://viability-reports/PEP1/ACME-RELATORIO-PEP1.pdf"
        );
        assert_eq!(store.stored_keys().len(), 1);
    }
}
