//! # Ymir Common Library
//!
//! Shared code for the ymir asset manager and its importer:
//! - Model record types (models, file references, tags, print metadata)
//! - Embedded key-value model store
//! - Configuration loading
//! - Identifier generation

pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod model;

pub use error::{Error, Result};
pub use model::{FileRef, Model, Note, PrintMetadata, SlicerDialect, Tag};
