use crate::backend::raw::{RawProject, RawRecord};
use async_trait::async_trait;
use color_eyre::eyre::Result;
use thiserror::Error;

/// Upstream narrowing for a pipeline listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineQuery {
    pub project_id: Option<String>,
}

#[async_trait]
pub trait PipelineBackend: Send + Sync {
    async fn list_pipelines(&self, query: &PipelineQuery) -> Result<Vec<RawRecord>>;
    async fn get_pipeline_detail(&self, id: &str) -> Result<RawRecord>;
    async fn delete_pipeline(&self, id: &str) -> Result<()>;
    async fn list_projects(&self) -> Result<Vec<RawProject>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("analysis service credentials are not configured")]
    MissingCredentials,
    #[error("analysis service unavailable: {0}")]
    Unavailable(String),
    #[error("analysis service returned an empty response")]
    EmptyResponse,
}

/// Opaque log-to-markdown analysis. Implementations never see run metadata.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze_logs(&self, logs: &str) -> std::result::Result<String, ServiceError>;
}
