//! Serde model of a JSON-rendered `google.protobuf.FileDescriptorSet`.
//!
//! This is the shape `buf build -o set.json` writes: lowerCamelCase keys,
//! enum fields as value names, and extension options keyed by
//! `"[package.extension]"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw `options` object of a descriptor, including extension keys.
pub type OptionsJson = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FileDescriptorSet {
    #[serde(default)]
    pub file: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FileDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub dependency: Vec<String>,
    #[serde(default, rename = "messageType")]
    pub message_type: Vec<MessageDescriptor>,
    #[serde(default, rename = "enumType")]
    pub enum_type: Vec<EnumDescriptor>,
    #[serde(default)]
    pub options: Option<OptionsJson>,
    #[serde(default)]
    pub syntax: Option<String>,
}

impl FileDescriptor {
    /// The `go_package` file option, if any.
    pub fn go_package(&self) -> Option<&str> {
        self.options
            .as_ref()?
            .get("goPackage")
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MessageDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub field: Vec<FieldDescriptor>,
    #[serde(default, rename = "nestedType")]
    pub nested_type: Vec<MessageDescriptor>,
    #[serde(default, rename = "enumType")]
    pub enum_type: Vec<EnumDescriptor>,
    #[serde(default, rename = "oneofDecl")]
    pub oneof_decl: Vec<OneofDescriptor>,
    #[serde(default)]
    pub options: Option<OptionsJson>,
}

impl MessageDescriptor {
    /// True for the synthetic entry message protoc generates for a map field.
    pub fn is_map_entry(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.get("mapEntry"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OneofDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: Option<OptionsJson>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: i32,
    #[serde(default)]
    pub label: FieldLabel,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, rename = "typeName")]
    pub type_name: Option<String>,
    #[serde(default, rename = "jsonName")]
    pub json_name: Option<String>,
    #[serde(default, rename = "proto3Optional")]
    pub proto3_optional: bool,
    #[serde(default, rename = "oneofIndex")]
    pub oneof_index: Option<i32>,
    #[serde(default)]
    pub options: Option<OptionsJson>,
}

impl FieldDescriptor {
    /// JSON name as protojson emits it.
    pub fn json_name(&self) -> String {
        match &self.json_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => to_json_name(&self.name),
        }
    }

    /// Referenced type name without the leading dot.
    pub fn type_ref(&self) -> Option<&str> {
        self.type_name
            .as_deref()
            .map(|name| name.trim_start_matches('.'))
            .filter(|name| !name.is_empty())
    }

    /// Index of the real (non-synthetic) oneof this field belongs to.
    pub fn real_oneof(&self) -> Option<usize> {
        if self.proto3_optional {
            return None;
        }
        self.oneof_index.and_then(|i| usize::try_from(i).ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EnumDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Vec<EnumValueDescriptor>,
    #[serde(default)]
    pub options: Option<OptionsJson>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EnumValueDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: i32,
    #[serde(default)]
    pub options: Option<OptionsJson>,
}

/// Enum-typed descriptor fields arrive as a value name or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawEnumValue {
    Name(String),
    Number(i64),
}

/// `FieldDescriptorProto.Label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "RawEnumValue", into = "String")]
pub enum FieldLabel {
    #[default]
    Optional,
    Required,
    Repeated,
}

impl TryFrom<RawEnumValue> for FieldLabel {
    type Error = String;

    fn try_from(raw: RawEnumValue) -> Result<Self, Self::Error> {
        match raw {
            RawEnumValue::Name(name) => match name.as_str() {
                "LABEL_OPTIONAL" => Ok(Self::Optional),
                "LABEL_REQUIRED" => Ok(Self::Required),
                "LABEL_REPEATED" => Ok(Self::Repeated),
                other => Err(format!("unknown field label \"{}\"", other)),
            },
            RawEnumValue::Number(1) => Ok(Self::Optional),
            RawEnumValue::Number(2) => Ok(Self::Required),
            RawEnumValue::Number(3) => Ok(Self::Repeated),
            RawEnumValue::Number(n) => Err(format!("unknown field label {}", n)),
        }
    }
}

impl From<FieldLabel> for String {
    fn from(label: FieldLabel) -> Self {
        match label {
            FieldLabel::Optional => "LABEL_OPTIONAL",
            FieldLabel::Required => "LABEL_REQUIRED",
            FieldLabel::Repeated => "LABEL_REPEATED",
        }
        .to_string()
    }
}

/// `FieldDescriptorProto.Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "RawEnumValue", into = "String")]
pub enum FieldKind {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

/// Type names in descriptor numbering order (`TYPE_DOUBLE` = 1).
const FIELD_KIND_NAMES: [(&str, FieldKind); 18] = [
    ("TYPE_DOUBLE", FieldKind::Double),
    ("TYPE_FLOAT", FieldKind::Float),
    ("TYPE_INT64", FieldKind::Int64),
    ("TYPE_UINT64", FieldKind::Uint64),
    ("TYPE_INT32", FieldKind::Int32),
    ("TYPE_FIXED64", FieldKind::Fixed64),
    ("TYPE_FIXED32", FieldKind::Fixed32),
    ("TYPE_BOOL", FieldKind::Bool),
    ("TYPE_STRING", FieldKind::String),
    ("TYPE_GROUP", FieldKind::Group),
    ("TYPE_MESSAGE", FieldKind::Message),
    ("TYPE_BYTES", FieldKind::Bytes),
    ("TYPE_UINT32", FieldKind::Uint32),
    ("TYPE_ENUM", FieldKind::Enum),
    ("TYPE_SFIXED32", FieldKind::Sfixed32),
    ("TYPE_SFIXED64", FieldKind::Sfixed64),
    ("TYPE_SINT32", FieldKind::Sint32),
    ("TYPE_SINT64", FieldKind::Sint64),
];

impl TryFrom<RawEnumValue> for FieldKind {
    type Error = String;

    fn try_from(raw: RawEnumValue) -> Result<Self, Self::Error> {
        match raw {
            RawEnumValue::Name(name) => FIELD_KIND_NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| format!("unknown field type \"{}\"", name)),
            RawEnumValue::Number(n) => usize::try_from(n)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| FIELD_KIND_NAMES.get(i))
                .map(|(_, kind)| *kind)
                .ok_or_else(|| format!("unknown field type {}", n)),
        }
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        FIELD_KIND_NAMES
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(name, _)| name.to_string())
            .unwrap_or_default()
    }
}

/// protoc's default JSON name: drop underscores, uppercase the next letter.
pub fn to_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
