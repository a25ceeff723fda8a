//! File role classification
//!
//! Maps a file name to the role it plays in a model using static extension
//! allow-lists. Anything not on a list is ignored, so stray binaries, caches
//! and OS litter never end up in a model record.

use std::fs::Metadata;
use std::path::Path;
use ymir_common::model::MANIFEST_FILE_NAME;

/// CAD and mesh formats
pub const MODEL_EXTENSIONS: &[&str] = &[
    "3ds", "3mf", "amf", "blend", "dwg", "dxf", "f3d", "f3z", "factory", "fcstd", "iges", "ipt",
    "obj", "ply", "py", "rsdoc", "scad", "shape", "shapr", "skp", "sldasm", "sldprt", "slvs",
    "step", "stl", "stp",
];

/// Slicer output
pub const PRINT_EXTENSIONS: &[&str] = &["gcode"];

pub const IMAGE_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png", "svg"];

/// Documentation, archives and config
pub const OTHER_EXTENSIONS: &[&str] = &[
    "csv", "doc", "ini", "json", "md", "pdf", "toml", "txt", "yaml", "yml", "zip",
];

/// Role of a file within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    Model,
    Print,
    Image,
    Other,
    Ignore,
}

/// Classify a file by name
///
/// Extensions are matched case-sensitively. README files are always
/// [`FileRole::Other`]; the manifest itself is always ignored.
pub fn classify(file_name: &str) -> FileRole {
    if file_name == MANIFEST_FILE_NAME {
        return FileRole::Ignore;
    }

    if is_readme(file_name) {
        return FileRole::Other;
    }

    let ext = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext,
        None => return FileRole::Ignore,
    };

    if MODEL_EXTENSIONS.contains(&ext) {
        FileRole::Model
    } else if PRINT_EXTENSIONS.contains(&ext) {
        FileRole::Print
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        FileRole::Image
    } else if OTHER_EXTENSIONS.contains(&ext) {
        FileRole::Other
    } else {
        FileRole::Ignore
    }
}

/// Classify a directory entry, ignoring executables regardless of extension
pub fn classify_entry(path: &Path, metadata: &Metadata) -> FileRole {
    if is_executable(metadata) {
        return FileRole::Ignore;
    }

    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => classify(name),
        // Non UTF-8 names cannot be represented in the manifest
        None => FileRole::Ignore,
    }
}

/// True if the name contains "README" in any case
pub fn is_readme(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().contains("readme")
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}
