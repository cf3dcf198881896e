//! Descriptor-set linting.
//!
//! Runs resolution, validation and the emitter support check over every file
//! of a descriptor set without emitting anything, and reports the findings
//! per schema file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::descriptor::FileDescriptorSet;
use crate::emit::{emitter_for, unsupported_transforms, EmitContext};
use crate::error::ValidationError;
use crate::index::GlobalIndex;
use crate::loader::load_descriptor_set;
use crate::plan::build_plans;
use crate::types::GenerateOptions;
use crate::validation::{validate, ValidationWarning};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// Element the finding is about, e.g. `shop.Order.created_at`.
    pub path: String,
    pub message: String,
}

/// Result of linting a single schema file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a descriptor set.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint the descriptor set at `path` (a file or a directory of sets).
///
/// If `strict` is true, files with warnings count as failed.
pub fn lint(path: &Path, options: &GenerateOptions, strict: bool) -> LintResult {
    match load_descriptor_set(path) {
        Ok(set) => lint_set(&set, path, options, strict),
        Err(e) => {
            let diagnostic = Diagnostic {
                severity: Severity::Error,
                code: "E001".to_string(),
                file: path.to_path_buf(),
                path: "/".to_string(),
                message: format!("load error: {}", e),
            };
            summarize(path, vec![(path.to_path_buf(), vec![diagnostic])], strict)
        }
    }
}

/// Lint an already-loaded descriptor set. `path` labels the result.
pub fn lint_set(
    set: &FileDescriptorSet,
    path: &Path,
    options: &GenerateOptions,
    strict: bool,
) -> LintResult {
    let mut by_file: BTreeMap<String, Vec<Diagnostic>> = BTreeMap::new();
    let mut push = |d: Diagnostic| {
        by_file
            .entry(d.file.to_string_lossy().into_owned())
            .or_default()
            .push(d)
    };

    match GlobalIndex::build(set, &[], options) {
        Ok(index) => {
            let report = validate(&index);
            let clean = report.is_ok();
            report.errors.iter().map(error_diagnostic).for_each(&mut push);
            report.warnings.iter().map(warning_diagnostic).for_each(&mut push);

            if clean {
                let plans = build_plans(&index);
                let ctx = EmitContext {
                    index: &index,
                    plans: &plans,
                    options,
                };
                for target in options.effective_targets() {
                    let emitter = emitter_for(target);
                    unsupported_transforms(emitter.as_ref(), &ctx)
                        .iter()
                        .map(error_diagnostic)
                        .for_each(&mut push);
                }
            }
        }
        Err(e) => push(Diagnostic {
            severity: Severity::Error,
            code: "E002".to_string(),
            file: path.to_path_buf(),
            path: "/".to_string(),
            message: e.to_string(),
        }),
    }

    let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = set
        .file
        .iter()
        .map(|f| {
            let diagnostics = by_file.remove(&f.name).unwrap_or_default();
            (PathBuf::from(&f.name), diagnostics)
        })
        .collect();
    // Findings not tied to a schema file in the set.
    for (name, diagnostics) in by_file {
        files.push((PathBuf::from(name), diagnostics));
    }

    summarize(path, files, strict)
}

fn summarize(path: &Path, files: Vec<(PathBuf, Vec<Diagnostic>)>, strict: bool) -> LintResult {
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for (file, diagnostics) in files {
        let file_errors = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        let file_warnings = diagnostics.len() - file_errors;
        total_errors += file_errors;
        total_warnings += file_warnings;

        let status = if file_errors > 0 {
            FileStatus::Error
        } else if file_warnings > 0 {
            FileStatus::Warning
        } else {
            FileStatus::Ok
        };
        results.push(FileResult {
            file,
            status,
            diagnostics,
        });
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: results.len(),
        passed: results.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

fn element_path(message: &str, field: &str) -> String {
    if field.is_empty() {
        message.to_string()
    } else {
        format!("{}.{}", message, field)
    }
}

fn error_diagnostic(e: &ValidationError) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: e.kind.code().to_string(),
        file: PathBuf::from(&e.file),
        path: element_path(&e.message, &e.field),
        message: format!("{} [{}]: {}", e.kind, e.directive, e.reason),
    }
}

fn warning_diagnostic(w: &ValidationWarning) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        code: "W101".to_string(),
        file: PathBuf::from(&w.file),
        path: element_path(&w.message, &w.field),
        message: format!("[{}]: {}", w.directive, w.reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn set(files: serde_json::Value) -> FileDescriptorSet {
        serde_json::from_value(json!({ "file": files })).unwrap()
    }

    #[test]
    fn lint_clean_set() {
        let input = set(json!([{
            "name": "a.proto",
            "package": "a",
            "messageType": [{"name": "A", "field": [
                {"name": "data", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
                 "options": {"[sebuf.http.bytes_encoding]": "HEX"}}
            ]}]
        }]));
        let result = lint_set(&input, Path::new("set.json"), &GenerateOptions::new(), false);
        assert!(result.is_ok());
        assert_eq!(result.files_checked, 1);
        assert_eq!(result.results[0].status, FileStatus::Ok);
    }

    #[test]
    fn lint_reports_errors_per_file() {
        let input = set(json!([
            {"name": "ok.proto", "package": "ok", "messageType": [{"name": "Ok"}]},
            {
                "name": "bad.proto",
                "package": "bad",
                "messageType": [{"name": "Bad", "field": [
                    {"name": "name", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING",
                     "options": {"[sebuf.http.bytes_encoding]": "HEX"}}
                ]}]
            }
        ]));
        let result = lint_set(&input, Path::new("set.json"), &GenerateOptions::new(), false);
        assert!(!result.is_ok());
        assert_eq!(result.failed, 1);
        assert_eq!(result.passed, 1);

        let bad = &result.results[1];
        assert_eq!(bad.file, PathBuf::from("bad.proto"));
        assert_eq!(bad.status, FileStatus::Error);
        assert_eq!(bad.diagnostics[0].code, "E101");
        assert_eq!(bad.diagnostics[0].path, "bad.Bad.name");
    }

    #[test]
    fn lint_strict_fails_on_warnings() {
        let input = set(json!([{
            "name": "n.proto",
            "package": "n",
            "messageType": [{"name": "N", "field": [
                {"name": "big", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_INT64",
                 "options": {"[sebuf.http.int64_encoding]": "NUMBER"}}
            ]}]
        }]));
        let lenient = lint_set(&input, Path::new("set.json"), &GenerateOptions::new(), false);
        assert!(lenient.is_ok());
        assert_eq!(lenient.warnings, 1);
        assert_eq!(lenient.failed, 0);

        let strict = lint_set(&input, Path::new("set.json"), &GenerateOptions::new(), true);
        assert_eq!(strict.failed, 1);
        assert_eq!(strict.results[0].diagnostics[0].code, "W101");
    }

    #[test]
    fn lint_unloadable_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not valid json }}").unwrap();

        let result = lint(file.path(), &GenerateOptions::new(), false);
        assert_eq!(result.files_checked, 1);
        assert_eq!(result.results[0].status, FileStatus::Error);
        assert_eq!(result.results[0].diagnostics[0].code, "E001");
    }
}
