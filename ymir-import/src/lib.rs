//! ymir-import library interface
//!
//! Bulk importer for 3D-print model directories: discovers project
//! directories under a root, classifies their files, extracts README and
//! G-code metadata, writes a `model.json` manifest per project and commits
//! the resulting records to the ymir server or the local store.

pub mod config;
pub mod error;
pub mod services;

pub use crate::error::{ImportError, ImportResult};
pub use crate::services::commit_sink::{CommitReport, CommitSink, CommitTarget};
pub use crate::services::importer::{
    find_models, run_import, CommitSettings, ImportRequest, ImportSummary,
};
pub use crate::services::model_walker::{ModelWalker, WalkOptions};
