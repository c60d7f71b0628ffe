//! S3-compatible artifact store.
//!
//! Persists generated reports under a random object key and returns the
//! public virtual-hosted URL. The engine treats any failure here as
//! "artifact unavailable", so this layer stays deliberately thin.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::info;
use uuid::Uuid;
use workflow_engine::{ArtifactError, ArtifactStore};

pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ArtifactStore {
    pub async fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
            region,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.bucket.is_empty() && !self.region.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        prefix: &str,
    ) -> Result<String, ArtifactError> {
        if !self.is_configured() {
            return Err(ArtifactError(
                "storage bucket/region not configured".to_string(),
            ));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("pdf");
        let content_type = match extension {
            "png" => "image/png",
            _ => "application/pdf",
        };
        let key = format!("{prefix}/{}.{extension}", Uuid::new_v4());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| ArtifactError(err.to_string()))?;

        let url = format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        );
        info!(%url, "artifact stored");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_store_refuses_uploads() {
        let store = S3ArtifactStore::new("", "").await;
        assert!(!store.is_configured());
        let err = store
            .store(b"pdf".to_vec(), "x.pdf", "viability-reports/PEP1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
