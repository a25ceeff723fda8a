//! Commit of walked models
//!
//! Models go either to a running ymir server (one import request per model)
//! or straight into the local store. The target is chosen once, up front, by a
//! single reachability probe. Every model is committed independently: a failure
//! is recorded in the report and the next model is attempted.

use crate::services::ymir_client::{ClientError, YmirClient};
use std::path::Path;
use thiserror::Error;
use ymir_common::db::ModelStore;
use ymir_common::id;
use ymir_common::model::Model;

/// Failure to commit one model
#[derive(Debug, Error)]
pub enum CommitError {
    /// Remote import request failed
    #[error("Remote import failed: {0}")]
    Remote(#[from] ClientError),

    /// Local store write failed
    #[error("Local store write failed: {0}")]
    Store(#[from] ymir_common::Error),
}

/// Where committed models go
pub enum CommitTarget {
    Remote(YmirClient),
    Local(ModelStore),
}

impl CommitTarget {
    pub fn describe(&self) -> String {
        match self {
            CommitTarget::Remote(client) => format!("ymir server at {}", client.base_url()),
            CommitTarget::Local(_) => "local store".to_string(),
        }
    }
}

/// Result of committing one model
#[derive(Debug)]
pub struct CommitOutcome {
    pub display_name: String,
    pub base_path: String,
    /// Identifier under which the model was stored, if known
    pub result: Result<Option<String>, CommitError>,
}

impl CommitOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-model results of a commit run
#[derive(Debug, Default)]
pub struct CommitReport {
    pub outcomes: Vec<CommitOutcome>,
}

impl CommitReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Persists walked models to the selected target
pub struct CommitSink {
    target: CommitTarget,
}

impl CommitSink {
    pub fn new(target: CommitTarget) -> Self {
        Self { target }
    }

    /// Probe the server once; use it when alive, otherwise open the local store
    pub async fn select(client: YmirClient, db_file: &Path) -> Result<Self, ymir_common::Error> {
        if client.ping().await {
            tracing::info!("Found ymir server at {}. Importing via the API", client.base_url());
            return Ok(Self::new(CommitTarget::Remote(client)));
        }

        tracing::info!(
            "No response from {}. Importing into the local store at {}",
            client.base_url(),
            db_file.display()
        );
        let store = ModelStore::open(db_file).await?;
        Ok(Self::new(CommitTarget::Local(store)))
    }

    pub fn target(&self) -> &CommitTarget {
        &self.target
    }

    /// Commit every model, one at a time, never stopping on failure
    pub async fn commit(&self, models: &[Model]) -> CommitReport {
        let mut report = CommitReport::default();

        for (index, model) in models.iter().enumerate() {
            tracing::info!(
                index,
                model = %model.display_name,
                "Importing model into {}",
                self.target.describe()
            );

            let result = self.commit_one(model).await;
            match &result {
                Ok(Some(id)) => tracing::info!(model = %model.display_name, id = %id, "Model imported"),
                Ok(None) => tracing::info!(model = %model.display_name, "Model imported"),
                Err(e) => tracing::warn!(
                    model = %model.display_name,
                    path = %model.base_path,
                    "Import failed: {}. Trying next model.",
                    e
                ),
            }

            report.outcomes.push(CommitOutcome {
                display_name: model.display_name.clone(),
                base_path: model.base_path.clone(),
                result,
            });
        }

        report
    }

    async fn commit_one(&self, model: &Model) -> Result<Option<String>, CommitError> {
        match &self.target {
            CommitTarget::Remote(client) => Ok(client.import_model(model).await?),
            CommitTarget::Local(store) => {
                // The server assigns ids on import; going direct to the store we must
                let mut stored = model.clone();
                stored.id = id::generate();
                store.create(&stored).await?;
                Ok(Some(stored.id))
            }
        }
    }
}
