//! Cross-file global resolution.
//!
//! [`GlobalIndex::build`] walks every file transitively imported by the
//! generation targets, resolves every field's type reference and extracts its
//! directives. The result is immutable and is the only read path for
//! validation, plan building and the emitters.
//!
//! Unresolved imports and type references do not stop the build: they are
//! kept as problems next to malformed directives so validation can report
//! them together with everything else.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::annotations::{extract_enum_value, extract_field, extract_oneof, AnnotationSet, OneofConfig};
use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldKind, FieldLabel, FileDescriptor, FileDescriptorSet,
    MessageDescriptor,
};
use crate::error::{ErrorKind, GenerateError, ValidationError};
use crate::types::GenerateOptions;

/// Well-known message types that resolve without being present in the set.
const WELL_KNOWN_MESSAGES: &[(&str, &str)] = &[
    ("google.protobuf.Timestamp", "google/protobuf/timestamp.proto"),
    ("google.protobuf.Duration", "google/protobuf/duration.proto"),
    ("google.protobuf.Empty", "google/protobuf/empty.proto"),
    ("google.protobuf.FieldMask", "google/protobuf/field_mask.proto"),
    ("google.protobuf.Any", "google/protobuf/any.proto"),
    ("google.protobuf.Struct", "google/protobuf/struct.proto"),
    ("google.protobuf.Value", "google/protobuf/struct.proto"),
    ("google.protobuf.ListValue", "google/protobuf/struct.proto"),
    ("google.protobuf.DoubleValue", "google/protobuf/wrappers.proto"),
    ("google.protobuf.FloatValue", "google/protobuf/wrappers.proto"),
    ("google.protobuf.Int64Value", "google/protobuf/wrappers.proto"),
    ("google.protobuf.UInt64Value", "google/protobuf/wrappers.proto"),
    ("google.protobuf.Int32Value", "google/protobuf/wrappers.proto"),
    ("google.protobuf.UInt32Value", "google/protobuf/wrappers.proto"),
    ("google.protobuf.BoolValue", "google/protobuf/wrappers.proto"),
    ("google.protobuf.StringValue", "google/protobuf/wrappers.proto"),
    ("google.protobuf.BytesValue", "google/protobuf/wrappers.proto"),
];

const WELL_KNOWN_ENUMS: &[(&str, &str)] =
    &[("google.protobuf.NullValue", "google/protobuf/struct.proto")];

/// Scalar protobuf types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    fn from_kind(kind: FieldKind) -> Option<Self> {
        Some(match kind {
            FieldKind::Double => Self::Double,
            FieldKind::Float => Self::Float,
            FieldKind::Int32 => Self::Int32,
            FieldKind::Int64 => Self::Int64,
            FieldKind::Uint32 => Self::Uint32,
            FieldKind::Uint64 => Self::Uint64,
            FieldKind::Sint32 => Self::Sint32,
            FieldKind::Sint64 => Self::Sint64,
            FieldKind::Fixed32 => Self::Fixed32,
            FieldKind::Fixed64 => Self::Fixed64,
            FieldKind::Sfixed32 => Self::Sfixed32,
            FieldKind::Sfixed64 => Self::Sfixed64,
            FieldKind::Bool => Self::Bool,
            FieldKind::String => Self::String,
            FieldKind::Bytes => Self::Bytes,
            FieldKind::Message | FieldKind::Group | FieldKind::Enum => return None,
        })
    }

    /// 64-bit integer kinds, which protojson writes as strings.
    pub fn is_64bit(&self) -> bool {
        matches!(
            self,
            Self::Int64 | Self::Uint64 | Self::Sint64 | Self::Fixed64 | Self::Sfixed64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::Uint32 | Self::Uint64 | Self::Fixed32 | Self::Fixed64
        )
    }

    pub fn proto_name(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

/// Element type of a field: the value itself, the list element or the map value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ValueType {
    Scalar(ScalarKind),
    Enum(String),
    Message(String),
}

impl ValueType {
    pub fn message_name(&self) -> Option<&str> {
        match self {
            ValueType::Message(name) => Some(name),
            _ => None,
        }
    }

    pub fn enum_name(&self) -> Option<&str> {
        match self {
            ValueType::Enum(name) => Some(name),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ValueType::Scalar(kind) => kind.proto_name().to_string(),
            ValueType::Enum(name) => format!("enum {}", name),
            ValueType::Message(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Singular,
    /// proto3 `optional` (explicit presence).
    Optional,
    Repeated,
    Map { key: ScalarKind },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedField {
    pub name: String,
    pub json_name: String,
    pub number: i32,
    pub cardinality: Cardinality,
    /// Element type; for maps, the value type.
    pub ty: ValueType,
    /// Real (non-synthetic) oneof this field belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneof: Option<String>,
    pub annotations: AnnotationSet,
    /// The type reference did not resolve; `ty` holds the raw name.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unresolved: bool,
}

impl ResolvedField {
    /// Discriminator value of a oneof member: `oneof_value` or the proto name.
    pub fn variant_value(&self) -> &str {
        self.annotations.oneof_value.as_deref().unwrap_or(&self.name)
    }

    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_map(&self) -> bool {
        matches!(self.cardinality, Cardinality::Map { .. })
    }

    /// Neither repeated nor a map.
    pub fn is_singular(&self) -> bool {
        matches!(self.cardinality, Cardinality::Singular | Cardinality::Optional)
    }

    pub fn message_type(&self) -> Option<&str> {
        self.ty.message_name()
    }

    pub fn describe(&self) -> String {
        match self.cardinality {
            Cardinality::Singular => self.ty.describe(),
            Cardinality::Optional => format!("optional {}", self.ty.describe()),
            Cardinality::Repeated => format!("repeated {}", self.ty.describe()),
            Cardinality::Map { key } => {
                format!("map<{}, {}>", key.proto_name(), self.ty.describe())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMessage {
    /// Fully-qualified name without the leading dot.
    pub full_name: String,
    /// Name relative to the package, dotted for nested types (`Outer.Inner`).
    pub local_name: String,
    pub file: String,
    pub package: String,
    pub fields: Vec<ResolvedField>,
    /// Real oneofs in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oneofs: Vec<ResolvedOneof>,
    pub well_known: bool,
}

/// A real oneof and the settings of its discriminated wire form.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedOneof {
    pub name: String,
    /// Member field names in declaration order.
    pub members: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<OneofConfig>,
}

impl ResolvedMessage {
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Identifier used by generated code (`Outer_Inner`).
    pub fn ident(&self) -> String {
        self.local_name.replace('.', "_")
    }

    /// The field carrying `unwrap`, if any.
    pub fn unwrap_field(&self) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.annotations.unwrap)
    }

    /// A single-field message whose only field is unwrapped.
    pub fn is_root_unwrap(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].annotations.unwrap
    }

    /// Oneofs carrying a discriminator.
    pub fn discriminated_oneofs(&self) -> impl Iterator<Item = (&ResolvedOneof, &OneofConfig)> {
        self.oneofs
            .iter()
            .filter_map(|o| o.config.as_ref().map(|config| (o, config)))
    }

    /// Member fields of a oneof.
    pub fn oneof_members<'m>(&'m self, oneof: &'m ResolvedOneof) -> impl Iterator<Item = &'m ResolvedField> {
        oneof.members.iter().filter_map(move |name| self.field(name))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEnumValue {
    pub name: String,
    pub number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

impl ResolvedEnumValue {
    pub fn wire_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEnum {
    pub full_name: String,
    pub local_name: String,
    pub file: String,
    pub package: String,
    pub values: Vec<ResolvedEnumValue>,
    pub well_known: bool,
}

impl ResolvedEnum {
    pub fn has_custom_names(&self) -> bool {
        self.values.iter().any(|v| v.custom_name.is_some())
    }

    pub fn ident(&self) -> String {
        self.local_name.replace('.', "_")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedFile {
    pub name: String,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_package: Option<String>,
    pub dependencies: Vec<String>,
    /// Messages declared in this file, nested ones included, in declaration order.
    pub messages: Vec<String>,
    pub enums: Vec<String>,
    /// Requested for output, as opposed to pulled in as an import.
    pub targeted: bool,
}

impl ResolvedFile {
    /// Path without the `.proto` suffix.
    pub fn prefix(&self) -> &str {
        self.name.strip_suffix(".proto").unwrap_or(&self.name)
    }

    /// Go import path from `go_package`.
    pub fn go_import_path(&self) -> Option<&str> {
        let go_package = self.go_package.as_deref()?;
        Some(go_package.split(';').next().unwrap_or(go_package))
    }

    /// Go package name: explicit `;name` suffix, last import path element, or proto package.
    pub fn go_package_name(&self) -> String {
        if let Some(go_package) = self.go_package.as_deref() {
            if let Some((_, name)) = go_package.split_once(';') {
                return name.to_string();
            }
            if let Some(last) = go_package.rsplit('/').next() {
                return sanitize_go_package(last);
            }
        }
        let last = self.package.rsplit('.').next().unwrap_or_default();
        if last.is_empty() {
            "wire".to_string()
        } else {
            sanitize_go_package(last)
        }
    }
}

fn sanitize_go_package(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

/// Immutable whole-run lookup from type name to resolved directive data.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalIndex {
    files: Vec<ResolvedFile>,
    messages: BTreeMap<String, ResolvedMessage>,
    enums: BTreeMap<String, ResolvedEnum>,
    /// Resolution failures and directive values that could not be
    /// interpreted, reported by validation.
    problems: Vec<ValidationError>,
    max_depth: usize,
}

/// Raw descriptors of the run, keyed by fully-qualified name.
struct RawTypes<'a> {
    messages: BTreeMap<String, RawMessage<'a>>,
    enums: BTreeMap<String, RawEnum<'a>>,
}

struct RawMessage<'a> {
    desc: &'a MessageDescriptor,
    file: &'a FileDescriptor,
    local_name: String,
}

struct RawEnum<'a> {
    desc: &'a EnumDescriptor,
    file: &'a FileDescriptor,
    local_name: String,
}

impl GlobalIndex {
    /// Resolve every file reachable from `targets` (all files when empty).
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::UnknownTarget` for a target missing from the set
    /// or `GenerateError::RecursionLimit` when nesting exceeds `max_depth`.
    /// Unresolved imports and type references land in [`GlobalIndex::problems`].
    pub fn build(
        set: &FileDescriptorSet,
        targets: &[String],
        options: &GenerateOptions,
    ) -> Result<GlobalIndex, GenerateError> {
        let by_name: BTreeMap<&str, &FileDescriptor> =
            set.file.iter().map(|f| (f.name.as_str(), f)).collect();

        for target in targets {
            if !by_name.contains_key(target.as_str()) {
                return Err(GenerateError::UnknownTarget {
                    name: target.clone(),
                });
            }
        }

        let roots: Vec<&str> = if targets.is_empty() {
            set.file.iter().map(|f| f.name.as_str()).collect()
        } else {
            targets.iter().map(String::as_str).collect()
        };
        let targeted: HashSet<&str> = roots.iter().copied().collect();

        let mut problems = Vec::new();
        let closure = import_closure(&by_name, &roots, &mut problems);
        let files: Vec<&FileDescriptor> = set
            .file
            .iter()
            .filter(|f| closure.contains(f.name.as_str()))
            .collect();

        let mut raw = RawTypes {
            messages: BTreeMap::new(),
            enums: BTreeMap::new(),
        };
        let mut resolved_files = Vec::new();
        for &file in &files {
            let mut file_messages = Vec::new();
            let mut file_enums = Vec::new();
            for message in &file.message_type {
                collect_message(
                    file,
                    message,
                    "",
                    1,
                    options.max_depth,
                    &mut raw,
                    &mut file_messages,
                    &mut file_enums,
                )?;
            }
            for e in &file.enum_type {
                let local = e.name.clone();
                let full = qualify(&file.package, &local);
                file_enums.push(full.clone());
                raw.enums.insert(
                    full,
                    RawEnum {
                        desc: e,
                        file,
                        local_name: local,
                    },
                );
            }
            debug!(
                file = %file.name,
                messages = file_messages.len(),
                enums = file_enums.len(),
                "indexed file"
            );
            resolved_files.push(ResolvedFile {
                name: file.name.clone(),
                package: file.package.clone(),
                go_package: file.go_package().map(str::to_string),
                dependencies: file.dependency.clone(),
                messages: file_messages,
                enums: file_enums,
                targeted: targeted.contains(file.name.as_str()),
            });
        }

        // Where every type in the whole set lives, to explain unreachable references.
        let mut defined_in: BTreeMap<String, &str> = BTreeMap::new();
        for file in &set.file {
            collect_defined(
                &file.package,
                "",
                &file.message_type,
                &file.enum_type,
                &file.name,
                &mut defined_in,
            );
        }

        let package = options.extension_package.as_str();
        let mut messages = BTreeMap::new();
        for (full_name, message) in &raw.messages {
            if message.desc.is_map_entry() {
                continue;
            }
            let mut fields = Vec::new();
            for field in &message.desc.field {
                let (cardinality, ty, unresolved) =
                    match resolve_field(field, full_name, message, &raw, &defined_in) {
                        Ok((cardinality, ty)) => (cardinality, ty, false),
                        Err(e) => {
                            problems.push(e);
                            let (cardinality, ty) = unresolved_placeholder(field);
                            (cardinality, ty, true)
                        }
                    };
                let (annotations, malformed) = extract_field(field, package);
                for m in malformed {
                    problems.push(ValidationError::new(
                        ErrorKind::IncompatibleDirective,
                        &message.file.name,
                        full_name,
                        &field.name,
                        m.directive,
                        m.reason,
                    ));
                }
                let oneof = field
                    .real_oneof()
                    .and_then(|i| message.desc.oneof_decl.get(i))
                    .map(|o| o.name.clone());
                fields.push(ResolvedField {
                    name: field.name.clone(),
                    json_name: field.json_name(),
                    number: field.number,
                    cardinality,
                    ty,
                    oneof,
                    annotations,
                    unresolved,
                });
            }

            let mut oneofs = Vec::new();
            for (i, decl) in message.desc.oneof_decl.iter().enumerate() {
                let members: Vec<String> = message
                    .desc
                    .field
                    .iter()
                    .filter(|f| f.real_oneof() == Some(i))
                    .map(|f| f.name.clone())
                    .collect();
                // Synthetic oneofs of proto3 optional fields have no real members.
                if members.is_empty() {
                    continue;
                }
                let (config, malformed) = extract_oneof(decl, package);
                if let Some(m) = malformed {
                    problems.push(ValidationError::new(
                        ErrorKind::IncompatibleDirective,
                        &message.file.name,
                        full_name,
                        &decl.name,
                        m.directive,
                        m.reason,
                    ));
                }
                oneofs.push(ResolvedOneof {
                    name: decl.name.clone(),
                    members,
                    config,
                });
            }

            messages.insert(
                full_name.clone(),
                ResolvedMessage {
                    full_name: full_name.clone(),
                    local_name: message.local_name.clone(),
                    file: message.file.name.clone(),
                    package: message.file.package.clone(),
                    fields,
                    oneofs,
                    well_known: is_well_known_message(full_name),
                },
            );
        }

        let mut enums = BTreeMap::new();
        for (full_name, e) in &raw.enums {
            let mut values = Vec::new();
            for value in &e.desc.value {
                let (custom_name, malformed) = extract_enum_value(value, package);
                if let Some(m) = malformed {
                    problems.push(ValidationError::new(
                        ErrorKind::IncompatibleDirective,
                        &e.file.name,
                        full_name,
                        &value.name,
                        m.directive,
                        m.reason,
                    ));
                }
                values.push(ResolvedEnumValue {
                    name: value.name.clone(),
                    number: value.number,
                    custom_name,
                });
            }
            enums.insert(
                full_name.clone(),
                ResolvedEnum {
                    full_name: full_name.clone(),
                    local_name: e.local_name.clone(),
                    file: e.file.name.clone(),
                    package: e.file.package.clone(),
                    values,
                    well_known: WELL_KNOWN_ENUMS.iter().any(|(n, _)| *n == full_name.as_str()),
                },
            );
        }

        register_well_known(&mut messages, &mut enums);

        info!(
            files = resolved_files.len(),
            messages = messages.len(),
            enums = enums.len(),
            problems = problems.len(),
            "resolved descriptor set"
        );

        Ok(GlobalIndex {
            files: resolved_files,
            messages,
            enums,
            problems,
            max_depth: options.max_depth,
        })
    }

    /// Every resolved file, in descriptor-set order.
    pub fn files(&self) -> &[ResolvedFile] {
        &self.files
    }

    /// Files requested for output.
    pub fn targets(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.files.iter().filter(|f| f.targeted)
    }

    pub fn file(&self, name: &str) -> Option<&ResolvedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn message(&self, name: &str) -> Option<&ResolvedMessage> {
        self.messages.get(name.trim_start_matches('.'))
    }

    pub fn enum_type(&self, name: &str) -> Option<&ResolvedEnum> {
        self.enums.get(name.trim_start_matches('.'))
    }

    /// All messages, well-known ones included, sorted by name.
    pub fn messages(&self) -> impl Iterator<Item = &ResolvedMessage> {
        self.messages.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &ResolvedEnum> {
        self.enums.values()
    }

    /// Messages of one file in declaration order.
    pub fn messages_in<'a>(
        &'a self,
        file: &'a ResolvedFile,
    ) -> impl Iterator<Item = &'a ResolvedMessage> + 'a {
        file.messages.iter().filter_map(move |name| self.message(name))
    }

    pub fn enums_in<'a>(
        &'a self,
        file: &'a ResolvedFile,
    ) -> impl Iterator<Item = &'a ResolvedEnum> + 'a {
        file.enums.iter().filter_map(move |name| self.enum_type(name))
    }

    pub fn problems(&self) -> &[ValidationError] {
        &self.problems
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Keys a message occupies on the wire once flattened children and
    /// discriminated oneofs are laid out.
    ///
    /// A discriminated oneof contributes its discriminator plus either its
    /// members or, when flattened, the keys of every variant. Returns the
    /// chain of message names on a flatten cycle.
    pub fn flattened_keys(&self, message: &str) -> Result<Vec<String>, Vec<String>> {
        let mut stack = Vec::new();
        let mut keys = Vec::new();
        self.collect_flattened_keys(message, "", &mut stack, &mut keys)?;
        Ok(keys)
    }

    fn collect_flattened_keys(
        &self,
        message: &str,
        prefix: &str,
        stack: &mut Vec<String>,
        keys: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        if stack.iter().any(|m| m == message) {
            let mut cycle = stack.clone();
            cycle.push(message.to_string());
            return Err(cycle);
        }
        let Some(msg) = self.message(message) else {
            return Ok(());
        };
        stack.push(message.to_string());
        for field in &msg.fields {
            let group = field.oneof.as_ref().and_then(|name| {
                msg.discriminated_oneofs().find(|(o, _)| o.name == *name)
            });
            if let Some((oneof, config)) = group {
                // The whole group is laid out at its first member.
                if oneof.members.first() == Some(&field.name) {
                    keys.push(format!("{}{}", prefix, config.discriminator));
                    let mut variant_keys = Vec::new();
                    for member in msg.oneof_members(oneof) {
                        match member.message_type() {
                            Some(child) if config.flatten => {
                                let mut child_keys = Vec::new();
                                self.collect_flattened_keys(child, prefix, stack, &mut child_keys)?;
                                for key in child_keys {
                                    if !variant_keys.contains(&key) {
                                        variant_keys.push(key);
                                    }
                                }
                            }
                            _ => variant_keys.push(format!("{}{}", prefix, member.json_name)),
                        }
                    }
                    keys.extend(variant_keys);
                }
                continue;
            }
            match (field.annotations.flatten, field.message_type()) {
                (true, Some(child)) if field.is_singular() => {
                    let child_prefix = format!(
                        "{}{}",
                        prefix,
                        field.annotations.flatten_prefix.as_deref().unwrap_or_default()
                    );
                    self.collect_flattened_keys(child, &child_prefix, stack, keys)?;
                }
                _ => keys.push(format!("{}{}", prefix, field.json_name)),
            }
        }
        stack.pop();
        Ok(())
    }
}

/// Files transitively imported from `roots`; missing imports are reported.
fn import_closure<'a>(
    by_name: &BTreeMap<&'a str, &'a FileDescriptor>,
    roots: &[&'a str],
    errors: &mut Vec<ValidationError>,
) -> BTreeSet<&'a str> {
    let mut visited = BTreeSet::new();
    let mut stack: Vec<&str> = roots.iter().rev().copied().collect();

    while let Some(name) = stack.pop() {
        if !visited.insert(name) {
            continue;
        }
        let Some(file) = by_name.get(name) else {
            continue;
        };
        for dep in file.dependency.iter().rev() {
            match by_name.get_key_value(dep.as_str()) {
                Some((dep_name, _)) => stack.push(*dep_name),
                None if is_well_known_file(dep) => {}
                None => errors.push(ValidationError::new(
                    ErrorKind::UnresolvedCrossFileReference,
                    name,
                    "",
                    "",
                    "import",
                    format!("imported file '{}' is not in the descriptor set", dep),
                )),
            }
        }
    }
    visited
}

#[allow(clippy::too_many_arguments)]
fn collect_message<'a>(
    file: &'a FileDescriptor,
    message: &'a MessageDescriptor,
    parent: &str,
    depth: usize,
    max_depth: usize,
    raw: &mut RawTypes<'a>,
    file_messages: &mut Vec<String>,
    file_enums: &mut Vec<String>,
) -> Result<(), GenerateError> {
    let local = if parent.is_empty() {
        message.name.clone()
    } else {
        format!("{}.{}", parent, message.name)
    };
    let full = qualify(&file.package, &local);
    if depth > max_depth {
        return Err(GenerateError::RecursionLimit {
            type_name: full,
            limit: max_depth,
        });
    }

    if !message.is_map_entry() {
        file_messages.push(full.clone());
    }
    raw.messages.insert(
        full,
        RawMessage {
            desc: message,
            file,
            local_name: local.clone(),
        },
    );

    for e in &message.enum_type {
        let enum_local = format!("{}.{}", local, e.name);
        let enum_full = qualify(&file.package, &enum_local);
        file_enums.push(enum_full.clone());
        raw.enums.insert(
            enum_full,
            RawEnum {
                desc: e,
                file,
                local_name: enum_local,
            },
        );
    }
    for nested in &message.nested_type {
        collect_message(
            file,
            nested,
            &local,
            depth + 1,
            max_depth,
            raw,
            file_messages,
            file_enums,
        )?;
    }
    Ok(())
}

fn collect_defined<'a>(
    package: &str,
    parent: &str,
    messages: &[MessageDescriptor],
    enums: &[EnumDescriptor],
    file: &'a str,
    out: &mut BTreeMap<String, &'a str>,
) {
    for e in enums {
        out.insert(qualify(package, &join(parent, &e.name)), file);
    }
    for m in messages {
        let local = join(parent, &m.name);
        out.insert(qualify(package, &local), file);
        collect_defined(package, &local, &m.nested_type, &m.enum_type, file, out);
    }
}

fn resolve_field(
    field: &FieldDescriptor,
    message_name: &str,
    message: &RawMessage<'_>,
    raw: &RawTypes<'_>,
    defined_in: &BTreeMap<String, &str>,
) -> Result<(Cardinality, ValueType), ValidationError> {
    let unresolved = |type_name: &str| {
        let reason = match defined_in.get(type_name) {
            Some(file) => format!(
                "type '{}' is defined in '{}', which is not imported by this run's files",
                type_name, file
            ),
            None => format!("type '{}' is not defined in any file of the run", type_name),
        };
        ValidationError::new(
            ErrorKind::UnresolvedCrossFileReference,
            &message.file.name,
            message_name,
            &field.name,
            "type",
            reason,
        )
    };

    let repeated = field.label == FieldLabel::Repeated;
    let cardinality = if repeated {
        Cardinality::Repeated
    } else if field.proto3_optional {
        Cardinality::Optional
    } else {
        Cardinality::Singular
    };

    match field.kind {
        FieldKind::Message | FieldKind::Group => {
            let type_name = field.type_ref().unwrap_or_default();
            if let Some(target) = raw.messages.get(type_name) {
                if repeated && target.desc.is_map_entry() {
                    return resolve_map_entry(
                        field,
                        message_name,
                        message,
                        target,
                        raw,
                        &unresolved,
                    );
                }
                return Ok((cardinality, ValueType::Message(type_name.to_string())));
            }
            if is_well_known_message(type_name) {
                return Ok((cardinality, ValueType::Message(type_name.to_string())));
            }
            Err(unresolved(type_name))
        }
        FieldKind::Enum => {
            let type_name = field.type_ref().unwrap_or_default();
            let well_known = WELL_KNOWN_ENUMS.iter().any(|(n, _)| *n == type_name);
            if raw.enums.contains_key(type_name) || well_known {
                Ok((cardinality, ValueType::Enum(type_name.to_string())))
            } else {
                Err(unresolved(type_name))
            }
        }
        kind => match ScalarKind::from_kind(kind) {
            Some(scalar) => Ok((cardinality, ValueType::Scalar(scalar))),
            None => Err(unresolved(field.type_ref().unwrap_or_default())),
        },
    }
}

/// Shape of a field whose type did not resolve, so later checks still see it.
fn unresolved_placeholder(field: &FieldDescriptor) -> (Cardinality, ValueType) {
    let cardinality = if field.label == FieldLabel::Repeated {
        Cardinality::Repeated
    } else if field.proto3_optional {
        Cardinality::Optional
    } else {
        Cardinality::Singular
    };
    let name = field.type_ref().unwrap_or_default().to_string();
    let ty = match field.kind {
        FieldKind::Enum => ValueType::Enum(name),
        _ => ValueType::Message(name),
    };
    (cardinality, ty)
}

fn resolve_map_entry(
    field: &FieldDescriptor,
    message_name: &str,
    message: &RawMessage<'_>,
    entry: &RawMessage<'_>,
    raw: &RawTypes<'_>,
    unresolved: &dyn Fn(&str) -> ValidationError,
) -> Result<(Cardinality, ValueType), ValidationError> {
    let malformed = |reason: &str| {
        ValidationError::new(
            ErrorKind::UnresolvedCrossFileReference,
            &message.file.name,
            message_name,
            &field.name,
            "type",
            format!("map entry '{}' {}", entry.local_name, reason),
        )
    };

    let key = entry
        .desc
        .field
        .iter()
        .find(|f| f.number == 1)
        .and_then(|f| ScalarKind::from_kind(f.kind))
        .ok_or_else(|| malformed("has no scalar key field"))?;
    let value = entry
        .desc
        .field
        .iter()
        .find(|f| f.number == 2)
        .ok_or_else(|| malformed("has no value field"))?;

    let ty = match value.kind {
        FieldKind::Message | FieldKind::Group => {
            let type_name = value.type_ref().unwrap_or_default();
            if raw.messages.contains_key(type_name) || is_well_known_message(type_name) {
                ValueType::Message(type_name.to_string())
            } else {
                return Err(unresolved(type_name));
            }
        }
        FieldKind::Enum => {
            let type_name = value.type_ref().unwrap_or_default();
            if raw.enums.contains_key(type_name) {
                ValueType::Enum(type_name.to_string())
            } else {
                return Err(unresolved(type_name));
            }
        }
        kind => ValueType::Scalar(
            ScalarKind::from_kind(kind).ok_or_else(|| malformed("has an invalid value type"))?,
        ),
    };
    Ok((Cardinality::Map { key }, ty))
}

fn register_well_known(
    messages: &mut BTreeMap<String, ResolvedMessage>,
    enums: &mut BTreeMap<String, ResolvedEnum>,
) {
    for (name, file) in WELL_KNOWN_MESSAGES {
        messages
            .entry(name.to_string())
            .or_insert_with(|| ResolvedMessage {
                full_name: name.to_string(),
                local_name: name.trim_start_matches("google.protobuf.").to_string(),
                file: file.to_string(),
                package: "google.protobuf".to_string(),
                fields: Vec::new(),
                oneofs: Vec::new(),
                well_known: true,
            });
    }
    for (name, file) in WELL_KNOWN_ENUMS {
        enums.entry(name.to_string()).or_insert_with(|| ResolvedEnum {
            full_name: name.to_string(),
            local_name: name.trim_start_matches("google.protobuf.").to_string(),
            file: file.to_string(),
            package: "google.protobuf".to_string(),
            values: vec![ResolvedEnumValue {
                name: "NULL_VALUE".to_string(),
                number: 0,
                custom_name: None,
            }],
            well_known: true,
        });
    }
}

pub fn is_well_known_message(name: &str) -> bool {
    WELL_KNOWN_MESSAGES.iter().any(|(n, _)| *n == name)
}

fn is_well_known_file(name: &str) -> bool {
    name.starts_with("google/protobuf/")
}

fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}
