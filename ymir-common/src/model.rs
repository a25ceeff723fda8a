//! Model record types
//!
//! A [`Model`] is one importable 3D-print project: its geometry, slicer output,
//! images and documentation. The JSON shape (camelCase, `_id`) is shared by the
//! `model.json` manifest, the embedded store and the remote import endpoint.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Manifest file written into every discovered model directory
pub const MANIFEST_FILE_NAME: &str = "model.json";

/// One importable 3D-print project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Opaque identifier, assigned at commit time
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Sanitized name of the model directory
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    /// Labels attached to every model of an import run
    #[serde(default)]
    pub tags: Vec<Tag>,

    /// On-disk location once organized
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_path: String,

    #[serde(default)]
    pub model_files: Vec<FileRef>,

    #[serde(default)]
    pub print_files: Vec<FileRef>,

    #[serde(default)]
    pub other_files: Vec<FileRef>,

    #[serde(default)]
    pub images: Vec<FileRef>,

    /// Text of the first README found for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub date_created: DateTime<Utc>,

    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Model {
    /// Create an empty model record stamped with the current time
    pub fn new(display_name: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            id: String::new(),
            display_name: display_name.into(),
            tags,
            base_path: String::new(),
            model_files: Vec::new(),
            print_files: Vec::new(),
            other_files: Vec::new(),
            images: Vec::new(),
            description: None,
            date_created: Utc::now(),
            notes: Vec::new(),
        }
    }

    /// Total number of file references across all roles
    pub fn file_count(&self) -> usize {
        self.model_files.len() + self.print_files.len() + self.other_files.len() + self.images.len()
    }

    /// Pretty-printed JSON, as written to the manifest
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest (`model.json`) into `dir`
    pub fn write_manifest(&self, dir: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        std::fs::write(dir.join(MANIFEST_FILE_NAME), json)?;
        Ok(())
    }
}

/// Reference to a file belonging to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    /// Path relative to the model root, `/`-separated
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Slicer metadata, only for print files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PrintMetadata>,
}

impl FileRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            metadata: None,
        }
    }
}

/// Free-text note attached to a model after import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub date: DateTime<Utc>,
}

/// Validated model label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Validate and normalize a raw label
    ///
    /// Surrounding whitespace is trimmed; empty labels and labels containing
    /// control characters are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("tag must not be empty".to_string()));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(Error::InvalidInput(format!(
                "tag {:?} contains control characters",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert raw CLI labels into an ordered, duplicate-free tag list
pub fn parse_tags<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Tag>> {
    let mut tags: Vec<Tag> = Vec::with_capacity(raw.len());
    for label in raw {
        let tag = Tag::parse(label.as_ref())?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// Slicer family that produced a G-code file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlicerDialect {
    /// PrusaSlicer: `; key = value` comments, embedded PNG thumbnails
    Prusa,
    /// Marlin flavoured output (Cura): `;KEY:value` comments
    Marlin,
}

impl fmt::Display for SlicerDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlicerDialect::Prusa => f.write_str("PRUSA"),
            SlicerDialect::Marlin => f.write_str("MARLIN"),
        }
    }
}

/// Metadata extracted from a slicer-generated G-code header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintMetadata {
    #[serde(rename = "gCodeType", default, skip_serializing_if = "Option::is_none")]
    pub gcode_type: Option<SlicerDialect>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(rename = "createDate", default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_height: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nozzle_diameter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,

    #[serde(rename = "filamentUsedG", default, skip_serializing_if = "Option::is_none")]
    pub filament_used_g: Option<String>,

    #[serde(rename = "filamentUsedM", default, skip_serializing_if = "Option::is_none")]
    pub filament_used_m: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer_type: Option<String>,

    /// `data:image/png;base64,...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}
