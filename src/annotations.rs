//! Annotation extraction.
//!
//! Reads the raw extension values on one field, oneof or enum value into typed
//! decisions. Extraction knows nothing about other files and performs no
//! compatibility checks; a raw value of the wrong shape is reported as
//! [`Malformed`] and replaced by the default, so later stages never look at
//! raw option JSON again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{EnumValueDescriptor, FieldDescriptor, OneofDescriptor, OptionsJson};
use crate::types::{
    json_type_name, BytesEncoding, DirectiveEnum, EmptyBehavior, EnumEncoding, Int64Encoding,
    TimestampFormat, BYTES_ENCODING, EMPTY_BEHAVIOR, ENUM_ENCODING, ENUM_VALUE, FLATTEN,
    FLATTEN_PREFIX, INT64_ENCODING, NULLABLE, ONEOF_CONFIG, ONEOF_VALUE, TIMESTAMP_FORMAT, UNWRAP,
};

/// Typed access to the directive extensions in one `options` object.
#[derive(Debug, Clone, Copy)]
pub struct Directives<'a> {
    options: Option<&'a OptionsJson>,
    package: &'a str,
}

impl<'a> Directives<'a> {
    pub fn new(options: Option<&'a OptionsJson>, package: &'a str) -> Self {
        Self { options, package }
    }

    /// Raw value of `[<package>.<name>]`, if set.
    pub fn raw(&self, name: &str) -> Option<&'a Value> {
        let key = format!("[{}.{}]", self.package, name);
        self.options?.get(&key)
    }

    pub fn flag(&self, name: &str) -> Result<bool, String> {
        match self.raw(name) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(format!("expected boolean, got {}", json_type_name(other))),
        }
    }

    pub fn text(&self, name: &str) -> Result<Option<String>, String> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(format!("expected string, got {}", json_type_name(other))),
        }
    }

    pub fn enumerated<T: DirectiveEnum + Default>(&self, name: &str) -> Result<T, String> {
        match self.raw(name) {
            None => Ok(T::default()),
            Some(value) => T::parse(value).ok_or_else(|| {
                format!("unknown value {}: expected one of {}", value, T::expected())
            }),
        }
    }
}

/// A directive whose raw value could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Malformed {
    pub directive: &'static str,
    pub reason: String,
}

/// Directive values on one field. `Default` is "no override anywhere".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationSet {
    pub unwrap: bool,
    pub flatten: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten_prefix: Option<String>,
    pub nullable: bool,
    pub int64_encoding: Int64Encoding,
    pub enum_encoding: EnumEncoding,
    pub timestamp_format: TimestampFormat,
    pub bytes_encoding: BytesEncoding,
    pub empty_behavior: EmptyBehavior,
    /// Discriminator value when the field is a member of a discriminated oneof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneof_value: Option<String>,
}

impl AnnotationSet {
    /// Names of directives that deviate from the baseline wire format.
    ///
    /// Explicit baseline spellings (`STRING`, `RFC3339`, `BASE64`, `PRESERVE`)
    /// are not overrides.
    pub fn overrides(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.unwrap {
            names.push(UNWRAP);
        }
        if self.flatten {
            names.push(FLATTEN);
        }
        if self.nullable {
            names.push(NULLABLE);
        }
        if self.int64_encoding == Int64Encoding::Number {
            names.push(INT64_ENCODING);
        }
        if self.enum_encoding == EnumEncoding::Number {
            names.push(ENUM_ENCODING);
        }
        if !matches!(
            self.timestamp_format,
            TimestampFormat::Unspecified | TimestampFormat::Rfc3339
        ) {
            names.push(TIMESTAMP_FORMAT);
        }
        if !matches!(
            self.bytes_encoding,
            BytesEncoding::Unspecified | BytesEncoding::Base64
        ) {
            names.push(BYTES_ENCODING);
        }
        if matches!(self.empty_behavior, EmptyBehavior::Null | EmptyBehavior::Omit) {
            names.push(EMPTY_BEHAVIOR);
        }
        names
    }

    /// Structural directives replace the document shape rather than one value.
    pub fn structural(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.unwrap {
            names.push(UNWRAP);
        }
        if self.flatten {
            names.push(FLATTEN);
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract the directives on one field.
pub fn extract_field(field: &FieldDescriptor, package: &str) -> (AnnotationSet, Vec<Malformed>) {
    let directives = Directives::new(field.options.as_ref(), package);
    let mut problems = Vec::new();

    let set = AnnotationSet {
        unwrap: take(&mut problems, UNWRAP, directives.flag(UNWRAP)),
        flatten: take(&mut problems, FLATTEN, directives.flag(FLATTEN)),
        flatten_prefix: take(&mut problems, FLATTEN_PREFIX, directives.text(FLATTEN_PREFIX)),
        nullable: take(&mut problems, NULLABLE, directives.flag(NULLABLE)),
        int64_encoding: take(
            &mut problems,
            INT64_ENCODING,
            directives.enumerated(INT64_ENCODING),
        ),
        enum_encoding: take(&mut problems, ENUM_ENCODING, directives.enumerated(ENUM_ENCODING)),
        timestamp_format: take(
            &mut problems,
            TIMESTAMP_FORMAT,
            directives.enumerated(TIMESTAMP_FORMAT),
        ),
        bytes_encoding: take(
            &mut problems,
            BYTES_ENCODING,
            directives.enumerated(BYTES_ENCODING),
        ),
        empty_behavior: take(
            &mut problems,
            EMPTY_BEHAVIOR,
            directives.enumerated(EMPTY_BEHAVIOR),
        ),
        oneof_value: take(&mut problems, ONEOF_VALUE, non_empty(directives.text(ONEOF_VALUE))),
    };

    (set, problems)
}

fn non_empty(text: Result<Option<String>, String>) -> Result<Option<String>, String> {
    match text? {
        Some(s) if s.is_empty() => Err("value must not be empty".to_string()),
        other => Ok(other),
    }
}

/// Discriminated-union settings of one oneof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OneofConfig {
    /// Property naming the active variant.
    pub discriminator: String,
    /// Lift the active variant's fields next to the discriminator.
    pub flatten: bool,
}

/// Extract the `oneof_config` of one oneof. An empty discriminator means none.
pub fn extract_oneof(
    oneof: &OneofDescriptor,
    package: &str,
) -> (Option<OneofConfig>, Option<Malformed>) {
    let malformed = |reason: String| Malformed {
        directive: ONEOF_CONFIG,
        reason,
    };
    let Some(raw) = Directives::new(oneof.options.as_ref(), package).raw(ONEOF_CONFIG) else {
        return (None, None);
    };
    match serde_json::from_value::<OneofConfig>(raw.clone()) {
        Ok(config) if config.discriminator.is_empty() && config.flatten => (
            None,
            Some(malformed("flatten requires a discriminator".to_string())),
        ),
        Ok(config) if config.discriminator.is_empty() => (None, None),
        Ok(config) => (Some(config), None),
        Err(e) => (None, Some(malformed(e.to_string()))),
    }
}

fn take<T: Default>(
    problems: &mut Vec<Malformed>,
    directive: &'static str,
    result: Result<T, String>,
) -> T {
    result.unwrap_or_else(|reason| {
        problems.push(Malformed { directive, reason });
        T::default()
    })
}

/// Extract the custom wire name of one enum value.
pub fn extract_enum_value(
    value: &EnumValueDescriptor,
    package: &str,
) -> (Option<String>, Option<Malformed>) {
    let directives = Directives::new(value.options.as_ref(), package);
    match directives.text(ENUM_VALUE) {
        Ok(Some(name)) if name.is_empty() => (
            None,
            Some(Malformed {
                directive: ENUM_VALUE,
                reason: "custom name must not be empty".to_string(),
            }),
        ),
        Ok(name) => (name, None),
        Err(reason) => (
            None,
            Some(Malformed {
                directive: ENUM_VALUE,
                reason,
            }),
        ),
    }
}
