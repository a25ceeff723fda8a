//! Error types for ymir-import
//!
//! Each service defines its own error enum; [`ImportError`] wraps the ones that
//! can end an import run. Per-model commit failures stay in the commit report.

use crate::services::model_walker::WalkError;
use crate::services::ymir_client::ClientError;
use thiserror::Error;

/// Import pipeline error
#[derive(Debug, Error)]
pub enum ImportError {
    /// Directory walk failed
    #[error(transparent)]
    Walk(#[from] WalkError),

    /// Remote API client failure
    #[error(transparent)]
    Client(#[from] ClientError),

    /// ymir-common error (store, config, tags)
    #[error("Common error: {0}")]
    Common(#[from] ymir_common::Error),

    /// Blocking walk task panicked or was cancelled
    #[error("Walk task failed: {0}")]
    Task(String),
}

/// Result type for the import pipeline
pub type ImportResult<T> = Result<T, ImportError>;
