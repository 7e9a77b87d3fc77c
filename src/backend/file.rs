use crate::backend::normalizer::{record_id, record_project_id};
use crate::backend::parser::{self, Snapshot};
use crate::backend::raw::{RawProject, RawRecord};
use crate::traits::{PipelineBackend, PipelineQuery};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

/// Backend over a JSON snapshot on disk. The file is re-read on every call;
/// deletions are held in memory only.
pub struct JsonFileBackend {
    path: PathBuf,
    deleted: Mutex<HashSet<String>>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            deleted: Mutex::new(HashSet::new()),
        }
    }

    async fn load(&self) -> Result<Snapshot> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                eyre!("Runs file not found: {}", self.path.display())
            } else {
                eyre!("Failed to read {}: {e}", self.path.display())
            }
        })?;
        parser::parse_snapshot(&json)
    }

    fn is_deleted(&self, id: &str) -> Result<bool> {
        let deleted = self
            .deleted
            .lock()
            .map_err(|_| eyre!("deletion set lock poisoned"))?;
        Ok(deleted.contains(id))
    }

    fn live_pipelines(&self, snapshot: Snapshot) -> Result<Vec<RawRecord>> {
        let deleted = self
            .deleted
            .lock()
            .map_err(|_| eyre!("deletion set lock poisoned"))?;
        Ok(snapshot
            .pipelines
            .into_iter()
            .filter(|raw| record_id(raw).is_none_or(|id| !deleted.contains(&id)))
            .collect())
    }
}

#[async_trait]
impl PipelineBackend for JsonFileBackend {
    async fn list_pipelines(&self, query: &PipelineQuery) -> Result<Vec<RawRecord>> {
        let snapshot = self.load().await?;
        let mut pipelines = self.live_pipelines(snapshot)?;
        if let Some(project) = &query.project_id {
            pipelines.retain(|raw| record_project_id(raw).as_ref() == Some(project));
        }
        tracing::debug!(
            path = %self.path.display(),
            count = pipelines.len(),
            "listed pipelines"
        );
        Ok(pipelines)
    }

    async fn get_pipeline_detail(&self, id: &str) -> Result<RawRecord> {
        if self.is_deleted(id)? {
            return Err(eyre!("Pipeline {id} not found"));
        }
        let snapshot = self.load().await?;
        snapshot
            .pipelines
            .into_iter()
            .find(|raw| record_id(raw).as_deref() == Some(id))
            .ok_or_else(|| eyre!("Pipeline {id} not found"))
    }

    async fn delete_pipeline(&self, id: &str) -> Result<()> {
        let snapshot = self.load().await?;
        let exists = snapshot
            .pipelines
            .iter()
            .any(|raw| record_id(raw).as_deref() == Some(id));
        if !exists {
            return Err(eyre!("Pipeline {id} not found"));
        }
        let mut deleted = self
            .deleted
            .lock()
            .map_err(|_| eyre!("deletion set lock poisoned"))?;
        if !deleted.insert(id.to_string()) {
            return Err(eyre!("Pipeline {id} already deleted"));
        }
        tracing::info!(id, "pipeline deleted");
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<RawProject>> {
        Ok(self.load().await?.projects)
    }
}
