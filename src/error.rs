//! Error types for descriptor loading, validation, generation and the wire codec.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors while loading a descriptor set.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no descriptor files found under {path}")]
    NoDescriptors { path: PathBuf },

    // Parse errors (exit code 2)
    #[error("invalid descriptor JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate descriptor file '{name}' with different contents")]
    DuplicateFile { name: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. }
            | LoadError::ReadError { .. }
            | LoadError::NoDescriptors { .. } => 3,
            _ => 2,
        }
    }
}

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Directive applied to a structurally incompatible field kind.
    IncompatibleDirective,
    /// Custom enum name table missing an entry.
    IncompleteEnumMapping,
    /// Two structural directives, or root unwrap combined with anything else.
    ConflictingTransform,
    /// Referenced message or enum absent from the global index.
    UnresolvedCrossFileReference,
    /// An emitter met a plan entry it does not implement.
    UnrecognizedTransform,
}

impl ErrorKind {
    /// Stable diagnostic code, used by lint output.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::IncompatibleDirective => "E101",
            ErrorKind::IncompleteEnumMapping => "E102",
            ErrorKind::ConflictingTransform => "E103",
            ErrorKind::UnresolvedCrossFileReference => "E104",
            ErrorKind::UnrecognizedTransform => "E105",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::IncompatibleDirective => "IncompatibleDirective",
            ErrorKind::IncompleteEnumMapping => "IncompleteEnumMapping",
            ErrorKind::ConflictingTransform => "ConflictingTransform",
            ErrorKind::UnresolvedCrossFileReference => "UnresolvedCrossFileReference",
            ErrorKind::UnrecognizedTransform => "UnrecognizedTransform",
        };
        f.write_str(name)
    }
}

/// Single validation finding with enough context to locate it in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub kind: ErrorKind,
    /// Schema file that declares the offending element.
    pub file: String,
    /// Fully-qualified message (or enum) name, without leading dot.
    pub message: String,
    /// Field (or enum value) name; empty for message-level findings.
    pub field: String,
    /// Directive name, e.g. `timestamp_format`.
    pub directive: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        kind: ErrorKind,
        file: impl Into<String>,
        message: impl Into<String>,
        field: impl Into<String>,
        directive: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file: file.into(),
            message: message.into(),
            field: field.into(),
            directive: directive.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file, self.message)?;
        if !self.field.is_empty() {
            write!(f, ".{}", self.field)?;
        }
        write!(f, ": {} [{}] {}", self.kind, self.directive, self.reason)
    }
}

/// Errors that abort a generation run.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("generation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<ValidationError> },

    #[error("recursion limit {limit} exceeded while resolving {type_name}")]
    RecursionLimit { type_name: String, limit: usize },

    #[error("unknown target file '{name}'")]
    UnknownTarget { name: String },
}

impl GenerateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerateError::Load(e) => e.exit_code(),
            GenerateError::Invalid { .. } => 1,
            _ => 2,
        }
    }

    /// Findings carried by this error, if it is an aggregate report.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            GenerateError::Invalid { errors } => errors,
            _ => &[],
        }
    }
}

/// Errors from the reference wire codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no message named '{name}'")]
    UnknownMessage { name: String },

    #[error("expected JSON object for {message}, got {actual}")]
    ExpectedObject { message: String, actual: String },

    #[error("invalid value for {message}.{field} [{directive}]: {reason}")]
    InvalidValue {
        message: String,
        field: String,
        directive: String,
        reason: String,
    },

    #[error("nesting deeper than {limit} levels at {message}")]
    RecursionLimit { message: String, limit: usize },
}

impl CodecError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CodecError::UnknownMessage { .. } => 2,
            _ => 1,
        }
    }
}

/// Errors from checking an encoded payload against generated OpenAPI schemas.
#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error("no component schema named '{name}'")]
    UnknownComponent { name: String },

    #[error("invalid component schema: {message}")]
    InvalidSchema { message: String },

    #[error("payload does not match {component}: {} error(s)", errors.len())]
    Mismatch {
        component: String,
        errors: Vec<SchemaError>,
    },
}

impl ConformanceError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConformanceError::Mismatch { .. } => 1,
            _ => 2,
        }
    }
}

/// Single schema mismatch with path context.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the offending value.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("set.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::DuplicateFile {
            name: "a.proto".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn generate_error_exit_codes() {
        let err = GenerateError::Invalid {
            errors: vec![ValidationError::new(
                ErrorKind::IncompatibleDirective,
                "a.proto",
                "pkg.M",
                "f",
                "bytes_encoding",
                "only valid on bytes fields",
            )],
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.validation_errors().len(), 1);

        let err = GenerateError::RecursionLimit {
            type_name: "pkg.Node".into(),
            limit: 8,
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.validation_errors().is_empty());
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new(
            ErrorKind::IncompleteEnumMapping,
            "status.proto",
            "pkg.Status",
            "STATUS_UNSPECIFIED",
            "enum_value",
            "missing custom name",
        );
        assert_eq!(
            err.to_string(),
            "status.proto: pkg.Status.STATUS_UNSPECIFIED: IncompleteEnumMapping [enum_value] missing custom name"
        );
    }

    #[test]
    fn validation_error_display_without_field() {
        let err = ValidationError::new(
            ErrorKind::ConflictingTransform,
            "a.proto",
            "pkg.M",
            "",
            "unwrap",
            "x",
        );
        assert_eq!(err.to_string(), "a.proto: pkg.M: ConflictingTransform [unwrap] x");
    }

    #[test]
    fn schema_error_display() {
        let err = SchemaError {
            path: "/data".into(),
            message: "\"zz\" does not match \"^[0-9a-fA-F]*$\"".into(),
        };
        assert_eq!(err.to_string(), "/data: \"zz\" does not match \"^[0-9a-fA-F]*$\"");
    }

    #[test]
    fn conformance_error_exit_codes() {
        let err = ConformanceError::Mismatch {
            component: "Blob".into(),
            errors: vec![],
        };
        assert_eq!(err.exit_code(), 1);
        let err = ConformanceError::UnknownComponent { name: "Nope".into() };
        assert_eq!(err.exit_code(), 2);
    }
}
