//! Import run orchestration: walk, summarize, optionally commit

use crate::error::{ImportError, ImportResult};
use crate::services::commit_sink::{CommitReport, CommitSink};
use crate::services::model_walker::{ModelWalker, WalkOptions};
use crate::services::ymir_client::YmirClient;
use std::path::PathBuf;
use ymir_common::model::{Model, Tag};

/// Parameters of one import run
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub root: PathBuf,
    pub tags: Vec<Tag>,
    pub walk: WalkOptions,
    /// Commit found models; `None` only walks and writes manifests
    pub commit: Option<CommitSettings>,
}

/// Where to commit when the request asks for it
#[derive(Debug, Clone)]
pub struct CommitSettings {
    pub ymir_host: String,
    pub db_file: PathBuf,
}

/// Outcome of one import run
#[derive(Debug)]
pub struct ImportSummary {
    pub models: Vec<Model>,
    pub commit: Option<CommitReport>,
}

impl ImportSummary {
    /// Human-readable headline printed at the end of a run
    pub fn headline(&self) -> String {
        match self.models.len() {
            0 => "NO MODELS FOUND".to_string(),
            n => format!("{} MODELS FOUND", n),
        }
    }
}

/// Run the synchronous walker on the blocking pool
pub async fn find_models(
    root: PathBuf,
    tags: Vec<Tag>,
    options: WalkOptions,
) -> ImportResult<Vec<Model>> {
    let walker = ModelWalker::new(root, tags, options);
    let models = tokio::task::spawn_blocking(move || walker.walk())
        .await
        .map_err(|e| ImportError::Task(e.to_string()))??;
    Ok(models)
}

/// Walk the request root and commit the found models if requested
pub async fn run_import(request: ImportRequest) -> ImportResult<ImportSummary> {
    let ImportRequest {
        root,
        tags,
        walk,
        commit,
    } = request;

    let models = find_models(root, tags, walk).await?;

    if models.is_empty() {
        tracing::info!("No models found");
        return Ok(ImportSummary {
            models,
            commit: None,
        });
    }

    let commit = match commit {
        Some(settings) => {
            let client = YmirClient::new(&settings.ymir_host)?;
            let sink = CommitSink::select(client, &settings.db_file).await?;
            let report = sink.commit(&models).await;
            tracing::info!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Commit complete"
            );
            Some(report)
        }
        None => {
            tracing::debug!("Commit not requested, manifests only");
            None
        }
    };

    Ok(ImportSummary { models, commit })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline() {
        let mut summary = ImportSummary {
            models: Vec::new(),
            commit: None,
        };
        assert_eq!(summary.headline(), "NO MODELS FOUND");

        summary.models.push(Model::new("a", Vec::new()));
        summary.models.push(Model::new("b", Vec::new()));
        assert_eq!(summary.headline(), "2 MODELS FOUND");
    }

    #[tokio::test]
    async fn test_missing_root_is_walk_error() {
        let result = find_models(
            PathBuf::from("/definitely/not/here/ymir"),
            Vec::new(),
            WalkOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(ImportError::Walk(_))));
    }
}
