//! Validation of directives against the resolved schema.
//!
//! Every rule runs over every indexed file, imports included, and every
//! violation is collected before anything is reported.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, GenerateError, ValidationError};
use crate::annotations::OneofConfig;
use crate::index::{
    Cardinality, GlobalIndex, ResolvedEnum, ResolvedField, ResolvedMessage, ResolvedOneof,
    ScalarKind, ValueType,
};
use crate::types::{
    BytesEncoding, EmptyBehavior, EnumEncoding, Int64Encoding, TimestampFormat, BYTES_ENCODING,
    EMPTY_BEHAVIOR, ENUM_ENCODING, ENUM_VALUE, FLATTEN, FLATTEN_PREFIX, INT64_ENCODING, NULLABLE,
    ONEOF_CONFIG, ONEOF_VALUE, TIMESTAMP_FORMAT, TIMESTAMP_TYPE, UNWRAP,
};

/// Non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub file: String,
    pub message: String,
    pub field: String,
    pub directive: String,
    pub reason: String,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}.{}: [{}] {}",
            self.file, self.message, self.field, self.directive, self.reason
        )
    }
}

/// Everything validation found, in file and declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into the generation barrier: any error aborts the run.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, GenerateError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(GenerateError::Invalid {
                errors: self.errors,
            })
        }
    }

    fn error(
        &mut self,
        kind: ErrorKind,
        message: &ResolvedMessage,
        field: &str,
        directive: &str,
        reason: impl Into<String>,
    ) {
        let err = ValidationError::new(
            kind,
            &message.file,
            &message.full_name,
            field,
            directive,
            reason,
        );
        debug!(error = %err, "validation error");
        self.errors.push(err);
    }

    fn warning(
        &mut self,
        message: &ResolvedMessage,
        field: &str,
        directive: &str,
        reason: impl Into<String>,
    ) {
        let warning = ValidationWarning {
            file: message.file.clone(),
            message: message.full_name.clone(),
            field: field.to_string(),
            directive: directive.to_string(),
            reason: reason.into(),
        };
        warn!(warning = %warning, "validation warning");
        self.warnings.push(warning);
    }
}

/// Validate every directive in the index.
///
/// Resolution problems recorded by the index come first. Fields whose type
/// did not resolve are skipped by the per-field rules; everything else is
/// still checked.
pub fn validate(index: &GlobalIndex) -> ValidationReport {
    let mut report = ValidationReport {
        errors: index.problems().to_vec(),
        warnings: Vec::new(),
    };

    for file in index.files() {
        for message in index.messages_in(file) {
            for field in message.fields.iter().filter(|f| !f.unresolved) {
                check_field(index, message, field, &mut report);
            }
            check_unwrap(message, &mut report);
            for (oneof, config) in message.discriminated_oneofs() {
                check_discriminated_oneof(index, message, oneof, config, &mut report);
            }
            check_wire_keys(index, message, &mut report);
        }
        for e in index.enums_in(file) {
            check_enum_names(e, &mut report);
        }
    }

    info!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated directives"
    );
    report
}

fn check_field(
    index: &GlobalIndex,
    message: &ResolvedMessage,
    field: &ResolvedField,
    report: &mut ValidationReport,
) {
    let a = &field.annotations;
    let name = field.name.as_str();

    if a.timestamp_format != TimestampFormat::Unspecified
        && (field.is_map() || field.message_type() != Some(TIMESTAMP_TYPE))
    {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            TIMESTAMP_FORMAT,
            format!(
                "timestamp_format is only valid on {} fields (got {})",
                TIMESTAMP_TYPE,
                field.describe()
            ),
        );
    }

    if a.bytes_encoding != BytesEncoding::Unspecified
        && (field.is_map() || field.ty != ValueType::Scalar(ScalarKind::Bytes))
    {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            BYTES_ENCODING,
            format!(
                "bytes_encoding is only valid on bytes fields (got {})",
                field.describe()
            ),
        );
    }

    if a.int64_encoding != Int64Encoding::Unspecified {
        let is_64bit = matches!(&field.ty, ValueType::Scalar(kind) if kind.is_64bit());
        if field.is_map() || !is_64bit {
            report.error(
                ErrorKind::IncompatibleDirective,
                message,
                name,
                INT64_ENCODING,
                format!(
                    "int64_encoding is only valid on int64, sint64, sfixed64, uint64 and fixed64 fields (got {})",
                    field.describe()
                ),
            );
        } else if a.int64_encoding == Int64Encoding::Number {
            report.warning(
                message,
                name,
                INT64_ENCODING,
                "NUMBER encoding loses precision for values beyond 2^53 in JavaScript clients",
            );
        }
    }

    if a.enum_encoding != EnumEncoding::Unspecified {
        match field.ty.enum_name() {
            Some(enum_name) if !field.is_map() => {
                let has_custom = index
                    .enum_type(enum_name)
                    .map(ResolvedEnum::has_custom_names)
                    .unwrap_or(false);
                if a.enum_encoding == EnumEncoding::Number && has_custom {
                    report.error(
                        ErrorKind::ConflictingTransform,
                        message,
                        name,
                        ENUM_ENCODING,
                        format!(
                            "enum_encoding=NUMBER conflicts with the enum_value names declared on {}",
                            enum_name
                        ),
                    );
                }
            }
            _ => report.error(
                ErrorKind::IncompatibleDirective,
                message,
                name,
                ENUM_ENCODING,
                format!(
                    "enum_encoding is only valid on enum fields (got {})",
                    field.describe()
                ),
            ),
        }
    }

    if a.nullable {
        if field.message_type().is_some() {
            report.error(
                ErrorKind::IncompatibleDirective,
                message,
                name,
                NULLABLE,
                "nullable is only valid on primitive fields, not message fields",
            );
        } else if field.cardinality != Cardinality::Optional {
            report.error(
                ErrorKind::IncompatibleDirective,
                message,
                name,
                NULLABLE,
                format!(
                    "nullable is only valid on proto3 optional fields (got {})",
                    field.describe()
                ),
            );
        }
    }

    if a.empty_behavior != EmptyBehavior::Unspecified
        && (!field.is_singular() || field.message_type().is_none())
    {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            EMPTY_BEHAVIOR,
            format!(
                "empty_behavior is only valid on singular message fields (got {})",
                field.describe()
            ),
        );
    }

    if a.unwrap && (field.is_singular() || field.message_type().is_none()) {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            UNWRAP,
            format!(
                "unwrap is only valid on repeated or map fields whose element type is a message (got {})",
                field.describe()
            ),
        );
    }

    if a.flatten {
        check_flatten_field(index, message, field, report);
    } else if a.flatten_prefix.is_some() {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            FLATTEN_PREFIX,
            "flatten_prefix requires flatten=true on the same field",
        );
    }

    if a.oneof_value.is_some() {
        let discriminated = field.oneof.as_ref().is_some_and(|name| {
            message.discriminated_oneofs().any(|(o, _)| o.name == *name)
        });
        if !discriminated {
            report.error(
                ErrorKind::IncompatibleDirective,
                message,
                name,
                ONEOF_VALUE,
                "oneof_value is only valid on members of a oneof with a oneof_config discriminator",
            );
        }
    }

    let structural = a.structural();
    if structural.len() > 1 {
        report.error(
            ErrorKind::ConflictingTransform,
            message,
            name,
            &structural.join("+"),
            format!(
                "a field carries at most one structural directive (got {})",
                structural.join(" and ")
            ),
        );
    }
}

fn check_flatten_field(
    index: &GlobalIndex,
    message: &ResolvedMessage,
    field: &ResolvedField,
    report: &mut ValidationReport,
) {
    let name = field.name.as_str();
    let target = field.message_type().and_then(|m| index.message(m));

    match target {
        Some(child) if field.is_singular() && !child.well_known => {
            if child.is_root_unwrap() {
                report.error(
                    ErrorKind::ConflictingTransform,
                    message,
                    name,
                    FLATTEN,
                    format!(
                        "cannot flatten {}: its root unwrap serializes it as a bare array or map",
                        child.full_name
                    ),
                );
            }
        }
        _ => report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            FLATTEN,
            format!(
                "flatten is only valid on singular, non-well-known message fields (got {})",
                field.describe()
            ),
        ),
    }

    if let Some(oneof) = &field.oneof {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            name,
            FLATTEN,
            format!("flatten is not valid on members of oneof '{}'", oneof),
        );
    }

    let a = &field.annotations;
    for (set, other) in [
        (a.nullable, NULLABLE),
        (
            matches!(a.empty_behavior, EmptyBehavior::Null | EmptyBehavior::Omit),
            EMPTY_BEHAVIOR,
        ),
    ] {
        if set {
            report.error(
                ErrorKind::ConflictingTransform,
                message,
                name,
                FLATTEN,
                format!("flatten cannot be combined with {}", other),
            );
        }
    }
}

fn check_unwrap(message: &ResolvedMessage, report: &mut ValidationReport) {
    let unwrapped: Vec<&ResolvedField> = message
        .fields
        .iter()
        .filter(|f| f.annotations.unwrap)
        .collect();
    let Some(first) = unwrapped.first() else {
        return;
    };

    for extra in &unwrapped[1..] {
        report.error(
            ErrorKind::ConflictingTransform,
            message,
            &extra.name,
            UNWRAP,
            format!(
                "only one field per message can have the unwrap annotation (already on '{}')",
                first.name
            ),
        );
    }

    if first.is_map() && message.fields.len() != 1 {
        report.error(
            ErrorKind::IncompatibleDirective,
            message,
            &first.name,
            UNWRAP,
            "map fields with unwrap require the message to have exactly one field (root unwrap)",
        );
    }

    if message.is_root_unwrap() {
        for other in first.annotations.overrides() {
            if other == UNWRAP {
                continue;
            }
            report.error(
                ErrorKind::ConflictingTransform,
                message,
                &first.name,
                UNWRAP,
                format!(
                    "root-level unwrap cannot be combined with {}: the wrapping document is discarded",
                    other
                ),
            );
        }
    }
}

fn check_discriminated_oneof(
    index: &GlobalIndex,
    message: &ResolvedMessage,
    oneof: &ResolvedOneof,
    config: &OneofConfig,
    report: &mut ValidationReport,
) {
    let mut values: BTreeMap<&str, &str> = BTreeMap::new();
    for member in message.oneof_members(oneof) {
        let name = member.name.as_str();
        if let Some(previous) = values.insert(member.variant_value(), name) {
            report.error(
                ErrorKind::ConflictingTransform,
                message,
                name,
                ONEOF_VALUE,
                format!(
                    "discriminator value \"{}\" is already used by '{}'",
                    member.variant_value(),
                    previous
                ),
            );
        }

        if matches!(
            member.annotations.empty_behavior,
            EmptyBehavior::Null | EmptyBehavior::Omit
        ) {
            report.error(
                ErrorKind::ConflictingTransform,
                message,
                name,
                EMPTY_BEHAVIOR,
                format!(
                    "empty_behavior cannot rewrite a variant of discriminated oneof '{}'",
                    oneof.name
                ),
            );
        }

        if !config.flatten || member.unresolved {
            continue;
        }
        match member.message_type().and_then(|m| index.message(m)) {
            Some(child) if !child.well_known => {
                if child.is_root_unwrap() {
                    report.error(
                        ErrorKind::ConflictingTransform,
                        message,
                        name,
                        ONEOF_CONFIG,
                        format!(
                            "cannot flatten variant {}: its root unwrap serializes it as a bare array or map",
                            child.full_name
                        ),
                    );
                }
            }
            _ => report.error(
                ErrorKind::IncompatibleDirective,
                message,
                name,
                ONEOF_CONFIG,
                format!(
                    "flattened oneof '{}' requires every variant to be a non-well-known message (got {})",
                    oneof.name,
                    member.describe()
                ),
            ),
        }
    }
}

/// Keys the message writes must be unique once flattening and
/// discriminators are applied.
fn check_wire_keys(index: &GlobalIndex, message: &ResolvedMessage, report: &mut ValidationReport) {
    let flattened = message.fields.iter().find(|f| f.annotations.flatten);
    let discriminated = message.discriminated_oneofs().next();
    let (culprit, directive) = match (flattened, discriminated) {
        (Some(field), _) => (field.name.as_str(), FLATTEN),
        (None, Some((oneof, _))) => (oneof.name.as_str(), ONEOF_CONFIG),
        (None, None) => return,
    };

    match index.flattened_keys(&message.full_name) {
        Ok(keys) => {
            let mut seen = HashSet::new();
            let mut reported = HashSet::new();
            for key in &keys {
                if !seen.insert(key.as_str()) && reported.insert(key.as_str()) {
                    let (culprit, directive) = discriminated_owner(message, key)
                        .map(|oneof| (oneof, ONEOF_CONFIG))
                        .unwrap_or((culprit, directive));
                    report.error(
                        ErrorKind::ConflictingTransform,
                        message,
                        culprit,
                        directive,
                        format!("wire key '{}' collides with another field", key),
                    );
                }
            }
        }
        Err(cycle) if cycle.first() == Some(&message.full_name) => {
            report.error(
                ErrorKind::ConflictingTransform,
                message,
                culprit,
                directive,
                format!("flatten cycle: {}", cycle.join(" -> ")),
            );
        }
        // A cycle further down is reported on the message that starts it.
        Err(_) => {}
    }
}

/// The discriminated oneof of `message` whose discriminator is `key`.
fn discriminated_owner<'m>(message: &'m ResolvedMessage, key: &str) -> Option<&'m str> {
    message
        .discriminated_oneofs()
        .find(|(_, config)| config.discriminator == key)
        .map(|(oneof, _)| oneof.name.as_str())
}

fn check_enum_names(e: &ResolvedEnum, report: &mut ValidationReport) {
    if !e.has_custom_names() {
        return;
    }

    let mut error = |kind: ErrorKind, value: &str, reason: String| {
        let err = ValidationError::new(kind, &e.file, &e.full_name, value, ENUM_VALUE, reason);
        debug!(error = %err, "validation error");
        report.errors.push(err);
    };

    let mut by_name: BTreeMap<&str, &str> = BTreeMap::new();
    for value in &e.values {
        match &value.custom_name {
            None => error(
                ErrorKind::IncompleteEnumMapping,
                &value.name,
                format!(
                    "no custom name for {} (number {}); every value of an enum with enum_value names needs one",
                    value.name, value.number
                ),
            ),
            Some(custom) => {
                if let Some(previous) = by_name.insert(custom.as_str(), value.name.as_str()) {
                    error(
                        ErrorKind::ConflictingTransform,
                        &value.name,
                        format!(
                            "custom name \"{}\" is already used by {}",
                            custom, previous
                        ),
                    );
                }
                // Decoders accept proto names too, so this would be ambiguous.
                if let Some(shadowed) = e
                    .values
                    .iter()
                    .find(|other| other.name == *custom && other.name != value.name)
                {
                    error(
                        ErrorKind::ConflictingTransform,
                        &value.name,
                        format!(
                            "custom name \"{}\" is the proto name of {} (number {})",
                            custom, shadowed.name, shadowed.number
                        ),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FileDescriptorSet;
    use crate::types::GenerateOptions;
    use serde_json::{json, Value};

    fn index_of(messages: Value, enums: Value) -> GlobalIndex {
        let set: FileDescriptorSet = serde_json::from_value(json!({"file": [{
            "name": "test.proto",
            "package": "t",
            "messageType": messages,
            "enumType": enums
        }]}))
        .unwrap();
        GlobalIndex::build(&set, &[], &GenerateOptions::new()).unwrap()
    }

    fn field(name: &str, number: i32, ty: &str, options: Value) -> Value {
        json!({"name": name, "number": number, "label": "LABEL_OPTIONAL", "type": ty, "options": options})
    }

    fn kinds(report: &ValidationReport) -> Vec<(ErrorKind, String, String)> {
        report
            .errors
            .iter()
            .map(|e| (e.kind, e.field.clone(), e.directive.clone()))
            .collect()
    }

    #[test]
    fn valid_schema_has_no_errors() {
        let index = index_of(
            json!([{"name": "M", "field": [
                field("data", 1, "TYPE_BYTES", json!({"[sebuf.http.bytes_encoding]": "HEX"})),
                field("id", 2, "TYPE_INT64", json!({"[sebuf.http.int64_encoding]": "STRING"}))
            ]}]),
            json!([]),
        );
        let report = validate(&index);
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn representational_directives_on_wrong_kinds() {
        let index = index_of(
            json!([{"name": "M", "field": [
                field("a", 1, "TYPE_STRING", json!({"[sebuf.http.bytes_encoding]": "HEX"})),
                field("b", 2, "TYPE_STRING", json!({"[sebuf.http.timestamp_format]": "UNIX_SECONDS"})),
                field("c", 3, "TYPE_INT32", json!({"[sebuf.http.int64_encoding]": "NUMBER"})),
                field("d", 4, "TYPE_STRING", json!({"[sebuf.http.enum_encoding]": "NUMBER"}))
            ]}]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::IncompatibleDirective, "a".into(), BYTES_ENCODING.into()),
                (ErrorKind::IncompatibleDirective, "b".into(), TIMESTAMP_FORMAT.into()),
                (ErrorKind::IncompatibleDirective, "c".into(), INT64_ENCODING.into()),
                (ErrorKind::IncompatibleDirective, "d".into(), ENUM_ENCODING.into()),
            ]
        );
    }

    #[test]
    fn int64_number_warns() {
        let index = index_of(
            json!([{"name": "M", "field": [
                field("n", 1, "TYPE_UINT64", json!({"[sebuf.http.int64_encoding]": "NUMBER"}))
            ]}]),
            json!([]),
        );
        let report = validate(&index);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].directive, INT64_ENCODING);
    }

    #[test]
    fn unwrap_rules() {
        let index = index_of(
            json!([
                {"name": "Item", "field": [field("id", 1, "TYPE_STRING", json!({}))]},
                {"name": "NotRepeated", "field": [
                    {"name": "item", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE", "typeName": ".t.Item",
                     "options": {"[sebuf.http.unwrap]": true}}
                ]},
                {"name": "Scalars", "field": [
                    {"name": "ids", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_STRING",
                     "options": {"[sebuf.http.unwrap]": true}}
                ]},
                {"name": "Twice", "field": [
                    {"name": "a", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE", "typeName": ".t.Item",
                     "options": {"[sebuf.http.unwrap]": true}},
                    {"name": "b", "number": 2, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE", "typeName": ".t.Item",
                     "options": {"[sebuf.http.unwrap]": true}}
                ]}
            ]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::IncompatibleDirective, "item".into(), UNWRAP.into()),
                (ErrorKind::IncompatibleDirective, "ids".into(), UNWRAP.into()),
                (ErrorKind::ConflictingTransform, "b".into(), UNWRAP.into()),
            ]
        );
    }

    #[test]
    fn root_unwrap_with_other_directive_conflicts() {
        let index = index_of(
            json!([
                {"name": "Item", "field": [field("id", 1, "TYPE_STRING", json!({}))]},
                {"name": "Items", "field": [
                    {"name": "items", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE", "typeName": ".t.Item",
                     "options": {"[sebuf.http.unwrap]": true, "[sebuf.http.empty_behavior]": "NULL"}}
                ]}
            ]),
            json!([]),
        );
        let report = validate(&index);
        let conflict = report
            .errors
            .iter()
            .find(|e| e.kind == ErrorKind::ConflictingTransform)
            .unwrap();
        assert_eq!(conflict.message, "t.Items");
        assert!(conflict.directive.contains(UNWRAP));
        assert!(conflict.reason.contains(EMPTY_BEHAVIOR));
    }

    #[test]
    fn nullable_rules() {
        let index = index_of(
            json!([{"name": "M", "field": [
                {"name": "a", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING", "proto3Optional": true,
                 "oneofIndex": 0, "options": {"[sebuf.http.nullable]": true}},
                field("b", 2, "TYPE_STRING", json!({"[sebuf.http.nullable]": true}))
            ], "oneofDecl": [{"name": "_a"}]}]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![(ErrorKind::IncompatibleDirective, "b".into(), NULLABLE.into())]
        );
    }

    #[test]
    fn flatten_rules() {
        let index = index_of(
            json!([
                {"name": "Address", "field": [field("city", 1, "TYPE_STRING", json!({}))]},
                {"name": "Order", "field": [
                    field("city", 1, "TYPE_STRING", json!({})),
                    {"name": "shipping", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE", "typeName": ".t.Address",
                     "options": {"[sebuf.http.flatten]": true}},
                    field("note", 3, "TYPE_STRING", json!({"[sebuf.http.flatten_prefix]": "x_"}))
                ]}
            ]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::IncompatibleDirective, "note".into(), FLATTEN_PREFIX.into()),
                (ErrorKind::ConflictingTransform, "shipping".into(), FLATTEN.into()),
            ]
        );
        assert!(report.errors[1].reason.contains("'city'"));
    }

    #[test]
    fn flatten_with_prefix_avoids_collision() {
        let index = index_of(
            json!([
                {"name": "Address", "field": [field("city", 1, "TYPE_STRING", json!({}))]},
                {"name": "Order", "field": [
                    field("city", 1, "TYPE_STRING", json!({})),
                    {"name": "shipping", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE", "typeName": ".t.Address",
                     "options": {"[sebuf.http.flatten]": true, "[sebuf.http.flatten_prefix]": "ship_"}}
                ]}
            ]),
            json!([]),
        );
        assert!(validate(&index).is_ok());
    }

    #[test]
    fn incomplete_enum_mapping_names_zero_value() {
        let index = index_of(
            json!([{"name": "M", "field": [
                {"name": "status", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_ENUM", "typeName": ".t.Status"}
            ]}]),
            json!([{"name": "Status", "value": [
                {"name": "STATUS_UNSPECIFIED", "number": 0},
                {"name": "ACTIVE", "number": 1, "options": {"[sebuf.http.enum_value]": "active"}},
                {"name": "INACTIVE", "number": 2, "options": {"[sebuf.http.enum_value]": "inactive"}}
            ]}]),
        );
        let report = validate(&index);
        assert_eq!(report.errors.len(), 1);
        let err = &report.errors[0];
        assert_eq!(err.kind, ErrorKind::IncompleteEnumMapping);
        assert_eq!(err.message, "t.Status");
        assert_eq!(err.field, "STATUS_UNSPECIFIED");
    }

    #[test]
    fn duplicate_custom_names_and_number_conflict() {
        let index = index_of(
            json!([{"name": "M", "field": [
                {"name": "status", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_ENUM", "typeName": ".t.Status",
                 "options": {"[sebuf.http.enum_encoding]": "ENUM_ENCODING_NUMBER"}}
            ]}]),
            json!([{"name": "Status", "value": [
                {"name": "A", "number": 0, "options": {"[sebuf.http.enum_value]": "same"}},
                {"name": "B", "number": 1, "options": {"[sebuf.http.enum_value]": "same"}}
            ]}]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::ConflictingTransform, "status".into(), ENUM_ENCODING.into()),
                (ErrorKind::ConflictingTransform, "B".into(), ENUM_VALUE.into()),
            ]
        );
    }

    #[test]
    fn custom_name_equal_to_another_proto_name_conflicts() {
        let index = index_of(
            json!([]),
            json!([{"name": "Kind", "value": [
                {"name": "A", "number": 0, "options": {"[sebuf.http.enum_value]": "x"}},
                {"name": "B", "number": 1, "options": {"[sebuf.http.enum_value]": "A"}},
                {"name": "C", "number": 2, "options": {"[sebuf.http.enum_value]": "C"}}
            ]}]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![(ErrorKind::ConflictingTransform, "B".into(), ENUM_VALUE.into())]
        );
        assert!(report.errors[0].reason.contains("proto name of A"));
    }

    fn member(name: &str, number: i32, type_name: &str, options: Value) -> Value {
        json!({"name": name, "number": number, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
               "typeName": type_name, "oneofIndex": 0, "options": options})
    }

    #[test]
    fn discriminated_oneof_rules() {
        let index = index_of(
            json!([
                {"name": "Card", "field": [field("last4", 1, "TYPE_STRING", json!({}))]},
                {"name": "Bank", "field": [field("id", 1, "TYPE_STRING", json!({}))]},
                {"name": "Payment", "field": [
                    field("id", 1, "TYPE_STRING", json!({})),
                    member("card", 2, ".t.Card", json!({"[sebuf.http.oneof_value]": "x"})),
                    member("bank", 3, ".t.Bank", json!({"[sebuf.http.oneof_value]": "x"})),
                    {"name": "code", "number": 4, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING", "oneofIndex": 0}
                ], "oneofDecl": [{"name": "method", "options": {
                    "[sebuf.http.oneof_config]": {"discriminator": "type", "flatten": true}
                }}]},
                {"name": "Stray", "field": [
                    field("note", 1, "TYPE_STRING", json!({"[sebuf.http.oneof_value]": "n"}))
                ]}
            ]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::ConflictingTransform, "bank".into(), ONEOF_VALUE.into()),
                (ErrorKind::IncompatibleDirective, "code".into(), ONEOF_CONFIG.into()),
                (ErrorKind::ConflictingTransform, "method".into(), ONEOF_CONFIG.into()),
                (ErrorKind::IncompatibleDirective, "note".into(), ONEOF_VALUE.into()),
            ]
        );
        // Bank's lifted 'id' lands on Payment's own 'id'.
        assert!(report.errors[2].reason.contains("'id'"));
    }

    #[test]
    fn discriminator_collides_with_sibling_field() {
        let index = index_of(
            json!([
                {"name": "Card", "field": [field("last4", 1, "TYPE_STRING", json!({}))]},
                {"name": "Payment", "field": [
                    field("kind", 1, "TYPE_STRING", json!({})),
                    member("card", 2, ".t.Card", json!({"[sebuf.http.empty_behavior]": "NULL"}))
                ], "oneofDecl": [{"name": "method", "options": {
                    "[sebuf.http.oneof_config]": {"discriminator": "kind"}
                }}]}
            ]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::ConflictingTransform, "card".into(), EMPTY_BEHAVIOR.into()),
                (ErrorKind::ConflictingTransform, "method".into(), ONEOF_CONFIG.into()),
            ]
        );
    }

    #[test]
    fn unresolved_fields_do_not_hide_other_errors() {
        let index = index_of(
            json!([{"name": "M", "field": [
                {"name": "other", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                 "typeName": ".b.Missing", "options": {"[sebuf.http.timestamp_format]": "DATE"}},
                field("data", 2, "TYPE_STRING", json!({"[sebuf.http.bytes_encoding]": "HEX"}))
            ]}]),
            json!([]),
        );
        let report = validate(&index);
        assert_eq!(
            kinds(&report),
            vec![
                (ErrorKind::UnresolvedCrossFileReference, "other".into(), "type".into()),
                (ErrorKind::IncompatibleDirective, "data".into(), BYTES_ENCODING.into()),
            ]
        );
    }

    #[test]
    fn collects_errors_across_files() {
        let set: FileDescriptorSet = serde_json::from_value(json!({"file": [
            {"name": "a.proto", "package": "a", "messageType": [{"name": "A", "field": [
                field("x", 1, "TYPE_STRING", json!({"[sebuf.http.bytes_encoding]": "HEX"}))
            ]}]},
            {"name": "b.proto", "package": "b", "messageType": [{"name": "B", "field": [
                field("y", 1, "TYPE_STRING", json!({"[sebuf.http.int64_encoding]": "NUMBER"}))
            ]}]}
        ]}))
        .unwrap();
        let index = GlobalIndex::build(&set, &["a.proto".into()], &GenerateOptions::new()).unwrap();
        // b.proto is not imported by a.proto, so only a.proto is checked.
        assert_eq!(validate(&index).errors.len(), 1);

        let index = GlobalIndex::build(&set, &[], &GenerateOptions::new()).unwrap();
        let report = validate(&index);
        let files: Vec<_> = report.errors.iter().map(|e| e.file.as_str()).collect();
        assert_eq!(files, vec!["a.proto", "b.proto"]);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
