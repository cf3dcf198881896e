//! Descriptor-set loading from files, directories and strings.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::descriptor::FileDescriptorSet;
use crate::error::LoadError;

/// Load a descriptor set from a file, or from every `.json` file under a directory.
///
/// Directory contents are merged in sorted path order. A schema file that
/// appears in several sets must have identical contents in each.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the path doesn't exist,
/// or `LoadError::InvalidJson` if a file isn't a valid descriptor set.
pub fn load_descriptor_set(path: &Path) -> Result<FileDescriptorSet, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    if path.is_file() {
        return load_descriptor_file(path);
    }

    let files = collect_descriptor_files(path);
    if files.is_empty() {
        return Err(LoadError::NoDescriptors {
            path: path.to_path_buf(),
        });
    }

    let mut merged = FileDescriptorSet::default();
    for file in &files {
        let set = load_descriptor_file(file)?;
        merge_into(&mut merged, set)?;
    }
    Ok(merged)
}

/// Load a descriptor set from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't a valid descriptor set.
pub fn load_descriptor_set_str(content: &str) -> Result<FileDescriptorSet, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load an arbitrary JSON document (e.g. a message payload).
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}

/// Merge `other` into `target`, dropping files already present with equal contents.
pub fn merge_into(target: &mut FileDescriptorSet, other: FileDescriptorSet) -> Result<(), LoadError> {
    for file in other.file {
        match target.file.iter().find(|f| f.name == file.name) {
            Some(existing) if *existing == file => {}
            Some(_) => {
                return Err(LoadError::DuplicateFile {
                    name: file.name.clone(),
                })
            }
            None => target.file.push(file),
        }
    }
    Ok(())
}

fn load_descriptor_file(path: &Path) -> Result<FileDescriptorSet, LoadError> {
    let content = read_file(path)?;
    let set = load_descriptor_set_str(&content)?;
    debug!(path = %path.display(), files = set.file.len(), "loaded descriptor set");
    Ok(set)
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Collect all .json files in a directory, sorted.
fn collect_descriptor_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
