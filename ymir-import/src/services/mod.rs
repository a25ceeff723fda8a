//! Import pipeline services

pub mod commit_sink;
pub mod file_classifier;
pub mod gcode_parser;
pub mod importer;
pub mod model_walker;
pub mod ymir_client;

pub use commit_sink::{CommitError, CommitOutcome, CommitReport, CommitSink, CommitTarget};
pub use file_classifier::{classify, classify_entry, is_readme, FileRole};
pub use gcode_parser::{GcodeError, GcodeParser};
pub use importer::{find_models, run_import, CommitSettings, ImportRequest, ImportSummary};
pub use model_walker::{ModelWalker, WalkError, WalkOptions};
pub use ymir_client::{ClientError, YmirClient};
