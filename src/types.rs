//! Core types: directive values, emitter targets and generation options.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default package that owns the encoding extensions.
pub const DEFAULT_EXTENSION_PACKAGE: &str = "sebuf.http";

/// Default bound on type nesting and plan recursion.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Directive names, as they appear after the extension package.
pub const UNWRAP: &str = "unwrap";
pub const FLATTEN: &str = "flatten";
pub const FLATTEN_PREFIX: &str = "flatten_prefix";
pub const NULLABLE: &str = "nullable";
pub const INT64_ENCODING: &str = "int64_encoding";
pub const ENUM_ENCODING: &str = "enum_encoding";
pub const ENUM_VALUE: &str = "enum_value";
pub const TIMESTAMP_FORMAT: &str = "timestamp_format";
pub const BYTES_ENCODING: &str = "bytes_encoding";
pub const EMPTY_BEHAVIOR: &str = "empty_behavior";
/// Oneof option: discriminator property and optional variant flattening.
pub const ONEOF_CONFIG: &str = "oneof_config";
/// Field option: discriminator value of one oneof member.
pub const ONEOF_VALUE: &str = "oneof_value";

/// Fully-qualified name of the well-known timestamp type.
pub const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An enum-valued directive.
///
/// Raw values may be the full enum name (`TIMESTAMP_FORMAT_UNIX_SECONDS`),
/// the short suffix (`UNIX_SECONDS`) or the enum number.
pub trait DirectiveEnum: Sized + Copy {
    /// Prefix shared by the full value names, e.g. `TIMESTAMP_FORMAT_`.
    const PREFIX: &'static str;
    /// Short names in enum-number order; index 0 is `UNSPECIFIED`.
    const NAMES: &'static [&'static str];

    fn from_index(index: usize) -> Option<Self>;

    /// Parse a raw extension value. Returns `None` for unknown values.
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                let index = usize::try_from(n.as_u64()?).ok()?;
                Self::from_index(index)
            }
            Value::String(s) => {
                let short = s.strip_prefix(Self::PREFIX).unwrap_or(s);
                let index = Self::NAMES.iter().position(|name| *name == short)?;
                Self::from_index(index)
            }
            _ => None,
        }
    }

    /// Accepted spellings, for error messages.
    fn expected() -> String {
        Self::NAMES.join(", ")
    }
}

/// Wire form of 64-bit integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Int64Encoding {
    #[default]
    Unspecified,
    /// JSON string (the baseline).
    String,
    /// JSON number; values above 2^53 lose precision in most JSON readers.
    Number,
}

impl DirectiveEnum for Int64Encoding {
    const PREFIX: &'static str = "INT64_ENCODING_";
    const NAMES: &'static [&'static str] = &["UNSPECIFIED", "STRING", "NUMBER"];

    fn from_index(index: usize) -> Option<Self> {
        [Self::Unspecified, Self::String, Self::Number]
            .get(index)
            .copied()
    }
}

/// Wire form of enum fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnumEncoding {
    #[default]
    Unspecified,
    /// Value name (the baseline, or the custom name when one is declared).
    String,
    /// Enum number.
    Number,
}

impl DirectiveEnum for EnumEncoding {
    const PREFIX: &'static str = "ENUM_ENCODING_";
    const NAMES: &'static [&'static str] = &["UNSPECIFIED", "STRING", "NUMBER"];

    fn from_index(index: usize) -> Option<Self> {
        [Self::Unspecified, Self::String, Self::Number]
            .get(index)
            .copied()
    }
}

/// Wire form of `google.protobuf.Timestamp` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampFormat {
    #[default]
    Unspecified,
    Rfc3339,
    /// Integer seconds since the epoch; sub-second precision is dropped.
    UnixSeconds,
    /// Integer milliseconds since the epoch; sub-millisecond precision is truncated.
    UnixMillis,
    /// `YYYY-MM-DD` in UTC; the time of day is dropped.
    Date,
}

impl DirectiveEnum for TimestampFormat {
    const PREFIX: &'static str = "TIMESTAMP_FORMAT_";
    const NAMES: &'static [&'static str] =
        &["UNSPECIFIED", "RFC3339", "UNIX_SECONDS", "UNIX_MILLIS", "DATE"];

    fn from_index(index: usize) -> Option<Self> {
        [
            Self::Unspecified,
            Self::Rfc3339,
            Self::UnixSeconds,
            Self::UnixMillis,
            Self::Date,
        ]
        .get(index)
        .copied()
    }
}

impl TimestampFormat {
    /// True when the wire value is a JSON number.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::UnixSeconds | Self::UnixMillis)
    }
}

/// Wire form of `bytes` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BytesEncoding {
    #[default]
    #[serde(rename = "UNSPECIFIED")]
    Unspecified,
    /// Standard alphabet with padding (the baseline).
    #[serde(rename = "BASE64")]
    Base64,
    #[serde(rename = "BASE64_RAW")]
    Base64Raw,
    #[serde(rename = "BASE64URL")]
    Base64Url,
    #[serde(rename = "BASE64URL_RAW")]
    Base64UrlRaw,
    /// Lowercase hexadecimal.
    #[serde(rename = "HEX")]
    Hex,
}

impl DirectiveEnum for BytesEncoding {
    const PREFIX: &'static str = "BYTES_ENCODING_";
    const NAMES: &'static [&'static str] = &[
        "UNSPECIFIED",
        "BASE64",
        "BASE64_RAW",
        "BASE64URL",
        "BASE64URL_RAW",
        "HEX",
    ];

    fn from_index(index: usize) -> Option<Self> {
        [
            Self::Unspecified,
            Self::Base64,
            Self::Base64Raw,
            Self::Base64Url,
            Self::Base64UrlRaw,
            Self::Hex,
        ]
        .get(index)
        .copied()
    }
}

/// Wire form of a set-but-empty message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmptyBehavior {
    #[default]
    Unspecified,
    /// `{}` (the baseline).
    Preserve,
    /// `null`.
    Null,
    /// Key removed; decodes as unset.
    Omit,
}

impl DirectiveEnum for EmptyBehavior {
    const PREFIX: &'static str = "EMPTY_BEHAVIOR_";
    const NAMES: &'static [&'static str] = &["UNSPECIFIED", "PRESERVE", "NULL", "OMIT"];

    fn from_index(index: usize) -> Option<Self> {
        [Self::Unspecified, Self::Preserve, Self::Null, Self::Omit]
            .get(index)
            .copied()
    }
}

/// An artifact family produced from the encoding plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    GoServer,
    GoClient,
    TypeScript,
    OpenApi,
}

impl Target {
    pub const ALL: [Target; 4] = [
        Target::GoServer,
        Target::GoClient,
        Target::TypeScript,
        Target::OpenApi,
    ];

    /// Parse a target name. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "go-server" => Some(Target::GoServer),
            "go-client" => Some(Target::GoClient),
            "typescript" | "ts" => Some(Target::TypeScript),
            "openapi" => Some(Target::OpenApi),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::GoServer => "go-server",
            Target::GoClient => "go-client",
            Target::TypeScript => "typescript",
            Target::OpenApi => "openapi",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for a generation run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Proto package that declares the directive extensions.
    pub extension_package: String,
    /// Go package name for server output. Defaults to the file's `go_package`.
    pub server_package: Option<String>,
    /// Go package name for client output. Defaults to the file's `go_package`.
    pub client_package: Option<String>,
    /// Artifacts to emit. Empty means all of them.
    pub targets: Vec<Target>,
    /// Bound on type nesting depth during resolution and plan building.
    pub max_depth: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerateOptions {
    /// Options with the default extension package and every target enabled.
    pub fn new() -> Self {
        Self {
            extension_package: DEFAULT_EXTENSION_PACKAGE.to_string(),
            server_package: None,
            client_package: None,
            targets: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the extension package (leading/trailing dots are ignored).
    pub fn extension_package(mut self, package: impl Into<String>) -> Self {
        self.extension_package = package.into().trim_matches('.').to_string();
        self
    }

    pub fn server_package(mut self, package: impl Into<String>) -> Self {
        self.server_package = Some(package.into());
        self
    }

    pub fn client_package(mut self, package: impl Into<String>) -> Self {
        self.client_package = Some(package.into());
        self
    }

    /// Restrict emission to the given targets.
    pub fn targets(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.targets = targets.into_iter().collect();
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Targets to emit, in a stable order.
    pub fn effective_targets(&self) -> Vec<Target> {
        if self.targets.is_empty() {
            return Target::ALL.to_vec();
        }
        let mut targets = self.targets.clone();
        targets.sort();
        targets.dedup();
        targets
    }
}
