//! The conversion path: validate, transform, persist, link.

use std::sync::Arc;

use thiserror::Error;

use crate::core::registry::{ArtifactRegistry, RegistryError};
use crate::core::transformer::{to_xlsx, TransformError};
use crate::domain::{ConversionRequest, ResourceLink, ValidationError};

/// Hard failures of a conversion; the caller may retry
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0}")]
    Transform(TransformError),

    #[error("{0}")]
    Storage(#[from] RegistryError),
}

/// Result of a conversion that did not fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The input was unusable; nothing was written
    Rejected(ValidationError),

    /// The spreadsheet is downloadable at the link
    Created(ResourceLink),
}

/// Turns conversion requests into registered download links
pub struct ExcelService {
    registry: Arc<ArtifactRegistry>,

    /// Public origin used to build download URIs, e.g. `http://localhost:8080`
    base_url: String,
}

impl ExcelService {
    pub fn new(registry: Arc<ArtifactRegistry>, base_url: impl Into<String>) -> Self {
        Self {
            registry,
            base_url: base_url.into(),
        }
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert one request.
    ///
    /// User input errors come back as `Rejected` without touching storage.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutcome, ConversionError> {
        let bytes = match to_xlsx(request) {
            Ok(bytes) => bytes,
            Err(TransformError::Invalid(reason)) => {
                tracing::debug!("Rejected conversion request: {}", reason);
                return Ok(ConversionOutcome::Rejected(reason));
            }
            Err(e) => return Err(ConversionError::Transform(e)),
        };

        let artifact = self.registry.persist(&bytes).await?;
        let link = ResourceLink::for_artifact(&self.base_url, &artifact);

        tracing::info!(
            "Generated spreadsheet {} ({} rows, {} bytes)",
            link.uri,
            request.data.len(),
            bytes.len()
        );

        Ok(ConversionOutcome::Created(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{RegistryConfig, TracingObserver};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn service_in(temp: &TempDir) -> ExcelService {
        let registry = ArtifactRegistry::open(
            RegistryConfig {
                root: temp.path().join("downloads"),
                validity: Duration::from_secs(120),
                sweep_interval: Duration::from_secs(30),
            },
            Arc::new(TracingObserver),
        )
        .await
        .unwrap();
        ExcelService::new(registry, "http://localhost:8080")
    }

    #[tokio::test]
    async fn test_convert_creates_tracked_artifact() {
        let temp = TempDir::new().unwrap();
        let service = service_in(&temp).await;
        let request = ConversionRequest::from_value(json!({
            "headers": { "name": "Name" },
            "data": [{ "name": "Ann" }]
        }))
        .unwrap();

        let outcome = service.convert(&request).await.unwrap();

        let link = match outcome {
            ConversionOutcome::Created(link) => link,
            other => panic!("expected a link, got {:?}", other),
        };
        let id = link.uri.rsplit('/').next().unwrap();
        assert!(link.uri.starts_with("http://localhost:8080/downloads/"));
        assert!(service.registry().is_tracked(id).await);
        assert!(service.registry().path_for(id).is_file());
    }

    #[tokio::test]
    async fn test_empty_request_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let service = service_in(&temp).await;

        let outcome = service.convert(&ConversionRequest::default()).await.unwrap();

        assert_eq!(outcome, ConversionOutcome::Rejected(ValidationError::NoData));
        assert!(service.registry().is_empty().await);
        let files = std::fs::read_dir(service.registry().root()).unwrap().count();
        assert_eq!(files, 0);
    }

    #[tokio::test]
    async fn test_empty_headers_write_nothing() {
        let temp = TempDir::new().unwrap();
        let service = service_in(&temp).await;
        let request = ConversionRequest::from_value(json!({
            "headers": {},
            "data": [{ "name": "Ann" }, { "name": "Bo" }]
        }))
        .unwrap();

        let outcome = service.convert(&request).await.unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::Rejected(ValidationError::NoHeaders)
        );
        assert!(service.registry().is_empty().await);
        let files = std::fs::read_dir(service.registry().root()).unwrap().count();
        assert_eq!(files, 0);
    }

    #[tokio::test]
    async fn test_convert_after_shutdown_is_a_storage_fault() {
        let temp = TempDir::new().unwrap();
        let service = service_in(&temp).await;
        service.registry().shutdown().await.unwrap();

        let request = ConversionRequest::from_value(json!({
            "headers": { "a": "A" },
            "data": [{ "a": 1 }]
        }))
        .unwrap();
        let result = service.convert(&request).await;

        assert!(matches!(
            result,
            Err(ConversionError::Storage(RegistryError::Closed))
        ));
    }
}
