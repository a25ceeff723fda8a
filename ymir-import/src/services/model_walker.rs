//! Model directory walker
//!
//! Depth-first walk of an import root that groups files into model records.
//!
//! A model is rooted at the first directory of a model-less subtree that
//! directly contains a classifiable file. Everything below that directory
//! contributes to the same model; the model is finalized (manifest written,
//! optionally copied to the models directory) when the walk leaves its root.
//! Directories holding only subdirectories never start a model themselves.
//!
//! Entries are visited in lexicographic order, files before subdirectories,
//! so repeated walks of the same tree produce identical records.

use crate::services::file_classifier::{classify_entry, is_readme, FileRole};
use crate::services::gcode_parser::{GcodeError, GcodeParser};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, Metadata};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use ymir_common::model::{FileRef, Model, PrintMetadata, Tag, MANIFEST_FILE_NAME};

/// Directories never descended into
const IGNORED_DIRECTORIES: &[&str] = &[".git", ".svn", ".hg", "node_modules"];

static DISPLAY_NAME_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9.\- ]+").expect("display name pattern is valid"));

/// Model walker errors
#[derive(Debug, Error)]
pub enum WalkError {
    /// Import root does not exist
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Import root is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Directory listing failed
    #[error("Cannot read directory {} (depth {depth}): {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        depth: usize,
        #[source]
        source: std::io::Error,
    },

    /// Writing `model.json` failed; aborts the import run
    #[error("Could not write manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: ymir_common::Error,
    },

    /// Models directory could not be prepared
    #[error("Cannot prepare models directory {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Relocating a model's files failed
    #[error("Could not copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Walk behaviour
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Copy each finished model into this directory
    pub models_dir: Option<PathBuf>,
    /// Parse G-code headers of print files
    pub extract_print_metadata: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            models_dir: None,
            extract_print_metadata: true,
        }
    }
}

/// Model under construction, owned by the directory that started it
struct PendingModel {
    root: PathBuf,
    model: Model,
}

/// Walks an import root and builds one [`Model`] per project directory
pub struct ModelWalker {
    root: PathBuf,
    tags: Vec<Tag>,
    options: WalkOptions,
}

impl ModelWalker {
    pub fn new(root: impl Into<PathBuf>, tags: Vec<Tag>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            tags,
            options,
        }
    }

    /// Walk the whole tree and return finished models in traversal order
    pub fn walk(&self) -> Result<Vec<Model>, WalkError> {
        if !self.root.exists() {
            return Err(WalkError::PathNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(WalkError::NotADirectory(self.root.clone()));
        }

        let root = self.root.canonicalize().map_err(|source| WalkError::ReadDir {
            path: self.root.clone(),
            depth: 0,
            source,
        })?;

        let relocation = match &self.options.models_dir {
            Some(dir) => Some(prepare_models_dir(dir)?),
            None => None,
        };

        let mut context = WalkContext {
            root: &root,
            relocation: relocation.as_deref(),
            claimed: Vec::new(),
        };

        tracing::info!(root = %root.display(), "Scanning for models");

        let mut found = Vec::new();
        self.walk_dir(&mut context, &root, 0, None, &mut found)?;

        tracing::info!(root = %root.display(), models = found.len(), "Scan complete");
        Ok(found)
    }

    fn walk_dir(
        &self,
        context: &mut WalkContext<'_>,
        dir: &Path,
        depth: usize,
        inherited: Option<&mut PendingModel>,
        found: &mut Vec<Model>,
    ) -> Result<(), WalkError> {
        tracing::debug!(path = %dir.display(), depth, "Scanning directory");

        let (files, subdirs) = match self.list_entries(context, dir, depth) {
            Ok(listing) => listing,
            Err(e) if depth > 0 => {
                tracing::warn!("{}. Skipping this directory.", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if files.is_empty() && !subdirs.is_empty() {
            tracing::debug!(path = %dir.display(), depth, "Only directories, descending");
        }

        let mut inherited = inherited;
        let mut owned: Option<PendingModel> = None;

        for (path, metadata) in &files {
            let role = classify_entry(path, metadata);
            if role == FileRole::Ignore {
                tracing::debug!(path = %path.display(), "Ignoring file (executable or not a model file type)");
                continue;
            }

            let pending = match inherited.as_deref_mut() {
                Some(pending) => pending,
                None => owned.get_or_insert_with(|| self.start_model(dir, depth)),
            };
            self.add_file(pending, path, role);
        }

        for subdir in &subdirs {
            let target = match inherited.as_deref_mut() {
                Some(pending) => Some(pending),
                None => owned.as_mut(),
            };
            self.walk_dir(context, subdir, depth + 1, target, found)?;
        }

        if let Some(pending) = owned {
            if let Some(model) = self.finalize(context, pending)? {
                found.push(model);
            }
        }

        Ok(())
    }

    /// Sorted files and descendable subdirectories of `dir`
    fn list_entries(
        &self,
        context: &WalkContext<'_>,
        dir: &Path,
        depth: usize,
    ) -> Result<(Vec<(PathBuf, Metadata)>, Vec<PathBuf>), WalkError> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.path() == Some(dir) {
                        return Err(WalkError::ReadDir {
                            path: dir.to_path_buf(),
                            depth,
                            source: e.into(),
                        });
                    }
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if context.should_descend(entry.path()) {
                    subdirs.push(entry.into_path());
                } else {
                    tracing::debug!(path = %entry.path().display(), "Skipping directory");
                }
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(metadata) => files.push((entry.into_path(), metadata)),
                    Err(e) => tracing::warn!("Cannot stat {}: {}", entry.path().display(), e),
                }
            } else {
                tracing::debug!(path = %entry.path().display(), "Skipping symlink or special file");
            }
        }

        Ok((files, subdirs))
    }

    fn start_model(&self, dir: &Path, depth: usize) -> PendingModel {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let display_name = clean_display_name(&name);

        tracing::info!(path = %dir.display(), depth, model = %display_name, "Creating model");

        PendingModel {
            root: dir.to_path_buf(),
            model: Model::new(display_name, self.tags.clone()),
        }
    }

    fn add_file(&self, pending: &mut PendingModel, path: &Path, role: FileRole) {
        let relative = relative_model_path(&pending.root, path);
        let model = &mut pending.model;

        match role {
            FileRole::Model => {
                tracing::debug!(model = %model.display_name, file = %relative, "Adding model file");
                model.model_files.push(FileRef::new(relative));
            }
            FileRole::Print => {
                tracing::debug!(model = %model.display_name, file = %relative, "Adding print file");
                let mut file = FileRef::new(relative);
                if self.options.extract_print_metadata {
                    file.metadata = extract_print_metadata(path);
                }
                model.print_files.push(file);
            }
            FileRole::Image => {
                tracing::debug!(model = %model.display_name, file = %relative, "Adding image");
                model.images.push(FileRef::new(relative));
            }
            FileRole::Other => {
                let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                if is_readme(&name) {
                    read_description(model, path);
                }
                tracing::debug!(model = %model.display_name, file = %relative, "Adding other file");
                model.other_files.push(FileRef::new(relative));
            }
            FileRole::Ignore => {}
        }
    }

    /// Relocate files and write the manifest; `None` when the copy failed
    fn finalize(
        &self,
        context: &mut WalkContext<'_>,
        pending: PendingModel,
    ) -> Result<Option<Model>, WalkError> {
        let PendingModel { root, mut model } = pending;

        tracing::info!(
            model = %model.display_name,
            files = model.file_count(),
            "Writing {}/{}",
            root.display(),
            MANIFEST_FILE_NAME
        );

        let Some(models_dir) = context.relocation else {
            model.base_path = root.to_string_lossy().into_owned();
            write_manifest(&model, &root)?;
            return Ok(Some(model));
        };

        let wanted = destination_for(context.root, &root, &model, models_dir);
        let destination = context.claim_destination(models_dir, &wanted);

        tracing::info!(model = %model.display_name, "Copying model to {}", destination.display());
        if let Err(e) = copy_tree(&root, &destination) {
            tracing::warn!("{}. Skipping this model from import.", e);
            model.base_path = root.to_string_lossy().into_owned();
            write_manifest(&model, &root)?;
            return Ok(None);
        }

        model.base_path = destination.to_string_lossy().into_owned();
        write_manifest(&model, &root)?;
        write_manifest(&model, &destination)?;

        Ok(Some(model))
    }
}

/// Per-walk state shared by every level of the recursion
struct WalkContext<'a> {
    root: &'a Path,
    relocation: Option<&'a Path>,
    /// Destinations handed out so far in this walk
    claimed: Vec<PathBuf>,
}

impl WalkContext<'_> {
    fn should_descend(&self, dir: &Path) -> bool {
        let ignored = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| IGNORED_DIRECTORIES.contains(&n))
            .unwrap_or(false);
        if ignored {
            return false;
        }

        // Never re-import models that were relocated below the import root
        match self.relocation {
            Some(models_dir) => dir != models_dir,
            None => true,
        }
    }

    /// Turn `wanted` into a destination no other model owns
    ///
    /// A component that names another model's directory (claimed in this
    /// walk, or holding a manifest from an earlier import) becomes
    /// `<name> 2`, `<name> 3`, and so on. The final directory must not exist
    /// yet and must not enclose another claimed destination.
    fn claim_destination(&mut self, models_dir: &Path, wanted: &Path) -> PathBuf {
        let parts: Vec<String> = match wanted.strip_prefix(models_dir) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut destination = models_dir.to_path_buf();
        for (index, part) in parts.iter().enumerate() {
            let is_last = index + 1 == parts.len();
            let mut candidate = destination.join(part);
            let mut suffix = 2;
            while self.is_taken(&candidate, is_last) {
                candidate = destination.join(format!("{} {}", part, suffix));
                suffix += 1;
            }
            destination = candidate;
        }

        if destination != wanted {
            tracing::info!(
                "Destination {} is already taken, using {}",
                wanted.display(),
                destination.display()
            );
        }

        self.claimed.push(destination.clone());
        destination
    }

    fn is_taken(&self, candidate: &Path, is_last: bool) -> bool {
        if self.claimed.iter().any(|c| c == candidate) || candidate.join(MANIFEST_FILE_NAME).exists() {
            return true;
        }
        is_last && (candidate.exists() || self.claimed.iter().any(|c| c.starts_with(candidate)))
    }
}

fn write_manifest(model: &Model, dir: &Path) -> Result<(), WalkError> {
    model.write_manifest(dir).map_err(|source| WalkError::Manifest {
        path: dir.join(MANIFEST_FILE_NAME),
        source,
    })
}

/// Replace every run of characters outside `[A-Za-z0-9.\- ]` with one space
pub fn clean_display_name(name: &str) -> String {
    DISPLAY_NAME_FILTER.replace_all(name, " ").into_owned()
}

/// `/`-separated path of `file` relative to the model root
fn relative_model_path(model_root: &Path, file: &Path) -> String {
    match file.strip_prefix(model_root) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Where a model lands inside the models directory
///
/// Mirrors the model's location below the import root, with every path
/// component sanitized. A model at the import root itself uses its name.
fn destination_for(import_root: &Path, model_root: &Path, model: &Model, models_dir: &Path) -> PathBuf {
    let mut destination = models_dir.to_path_buf();
    let mut pushed = false;

    if let Ok(relative) = model_root.strip_prefix(import_root) {
        for component in relative.components() {
            if let Component::Normal(part) = component {
                destination.push(sanitize_component(&part.to_string_lossy()));
                pushed = true;
            }
        }
    }

    if !pushed {
        destination.push(sanitize_component(&model.display_name));
    }

    destination
}

fn sanitize_component(part: &str) -> String {
    let cleaned = clean_display_name(part);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "model".to_string()
    } else {
        cleaned.to_string()
    }
}

fn prepare_models_dir(dir: &Path) -> Result<PathBuf, WalkError> {
    fs::create_dir_all(dir)
        .and_then(|_| dir.canonicalize())
        .map_err(|source| WalkError::Destination {
            path: dir.to_path_buf(),
            source,
        })
}

/// First README wins; later ones are only listed as other files
fn read_description(model: &mut Model, path: &Path) {
    if model.description.is_some() {
        tracing::debug!(
            model = %model.display_name,
            "Model already has a description, ignoring {}",
            path.display()
        );
        return;
    }

    match fs::read(path) {
        Ok(bytes) => {
            tracing::info!(
                model = %model.display_name,
                "Found a README file. Setting contents as model description"
            );
            model.description = Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        Err(e) => tracing::warn!("Can't open README {}: {}", path.display(), e),
    }
}

fn extract_print_metadata(path: &Path) -> Option<PrintMetadata> {
    match GcodeParser::new(path).parse() {
        Ok(metadata) => Some(metadata),
        Err(e @ GcodeError::UnsupportedDialect { .. }) => {
            tracing::debug!("{}", e);
            None
        }
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    }
}

/// Recursively copy `from` into `to`, merging with existing content
fn copy_tree(from: &Path, to: &Path) -> Result<(), WalkError> {
    let copy_error = |source: std::io::Error| WalkError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::create_dir_all(to).map_err(copy_error)?;

    // Skip the destination in case it lives inside the source tree
    let walker = WalkDir::new(from)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(to));

    for entry in walker {
        let entry = entry.map_err(|e| copy_error(e.into()))?;
        let relative = match entry.path().strip_prefix(from) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(copy_error)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(copy_error)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_display_name() {
        assert_eq!(clean_display_name("Widget"), "Widget");
        assert_eq!(clean_display_name("MPR-1_v2.0"), "MPR-1 v2.0");
        assert_eq!(clean_display_name("cable__clip!!(final)"), "cable clip final ");
        assert_eq!(clean_display_name("Spool Holder"), "Spool Holder");
    }

    #[test]
    fn test_relative_model_path() {
        let root = Path::new("/models/Widget");
        assert_eq!(relative_model_path(root, Path::new("/models/Widget/a.stl")), "a.stl");
        assert_eq!(
            relative_model_path(root, Path::new("/models/Widget/files/v2/a.stl")),
            "files/v2/a.stl"
        );
        assert_eq!(relative_model_path(root, Path::new("/elsewhere/b.stl")), "b.stl");
    }

    #[test]
    fn test_destination_mirrors_relative_location() {
        let model = Model::new("Clip", Vec::new());
        let dest = destination_for(
            Path::new("/imports"),
            Path::new("/imports/Tools/Cable_Clip"),
            &model,
            Path::new("/library"),
        );
        assert_eq!(dest, PathBuf::from("/library/Tools/Cable Clip"));

        let at_root = destination_for(
            Path::new("/imports/Widget"),
            Path::new("/imports/Widget"),
            &Model::new("Widget", Vec::new()),
            Path::new("/library"),
        );
        assert_eq!(at_root, PathBuf::from("/library/Widget"));
    }

    #[test]
    fn test_sanitize_component_never_escapes() {
        assert_eq!(sanitize_component(".."), "model");
        assert_eq!(sanitize_component("%%%"), "model");
        assert_eq!(sanitize_component(" Bracket "), "Bracket");
    }

    #[test]
    fn test_failed_copy_leaves_source_manifest_pointing_at_source() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let source = temp_dir.path().join("Widget");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("widget.stl"), b"solid").unwrap();

        // A regular file where the models directory should be makes the copy fail
        let models_dir = temp_dir.path().join("library");
        fs::write(&models_dir, b"not a directory").unwrap();

        let walker = ModelWalker::new(temp_dir.path(), Vec::new(), WalkOptions::default());
        let mut context = WalkContext {
            root: temp_dir.path(),
            relocation: Some(models_dir.as_path()),
            claimed: Vec::new(),
        };
        let mut model = Model::new("Widget", Vec::new());
        model.model_files.push(FileRef::new("widget.stl"));
        let pending = PendingModel {
            root: source.clone(),
            model,
        };

        assert!(walker.finalize(&mut context, pending).unwrap().is_none());

        let manifest = fs::read_to_string(source.join(MANIFEST_FILE_NAME)).unwrap();
        let written: Model = serde_json::from_str(&manifest).unwrap();
        assert_eq!(Path::new(&written.base_path), source.as_path());
    }

    #[test]
    fn test_claim_destination_suffixes_taken_names() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let models_dir = temp_dir.path().to_path_buf();
        let mut context = WalkContext {
            root: Path::new("/imports"),
            relocation: Some(models_dir.as_path()),
            claimed: Vec::new(),
        };

        let first = context.claim_destination(&models_dir, &models_dir.join("a b"));
        let second = context.claim_destination(&models_dir, &models_dir.join("a b"));
        let nested = context.claim_destination(&models_dir, &models_dir.join("a b").join("x"));

        assert_eq!(first, models_dir.join("a b"));
        assert_eq!(second, models_dir.join("a b 2"));
        assert_eq!(nested, models_dir.join("a b 3").join("x"));

        // A directory left by an earlier import is never merged into
        fs::create_dir_all(models_dir.join("Clip")).unwrap();
        let clip = context.claim_destination(&models_dir, &models_dir.join("Clip"));
        assert_eq!(clip, models_dir.join("Clip 2"));
    }

    #[test]
    fn test_walk_missing_root() {
        let walker = ModelWalker::new("/nonexistent/import/root", Vec::new(), WalkOptions::default());
        assert!(matches!(walker.walk(), Err(WalkError::PathNotFound(_))));
    }

    #[test]
    fn test_walk_file_as_root() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file = temp_dir.path().join("widget.stl");
        fs::write(&file, b"solid").unwrap();

        let walker = ModelWalker::new(&file, Vec::new(), WalkOptions::default());
        assert!(matches!(walker.walk(), Err(WalkError::NotADirectory(_))));
    }
}
