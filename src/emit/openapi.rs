//! OpenAPI 3.1 component schemas.
//!
//! One document per schema file, holding the file's messages and enums plus
//! everything they reference. Types, formats and patterns are read off the
//! plan so the documented shape is exactly what the encoder writes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde_json::{json, Map, Value};

use super::{EmitContext, Emitter, GeneratedFile};
use crate::index::{GlobalIndex, ResolvedEnum, ResolvedField, ResolvedMessage, ScalarKind, ValueType};
use crate::plan::{OneofVariant, TransformKind, TransformTag};
use crate::types::{BytesEncoding, EmptyBehavior, Target, TimestampFormat, TIMESTAMP_TYPE};

pub struct OpenApiEmitter;

impl Emitter for OpenApiEmitter {
    fn target(&self) -> Target {
        Target::OpenApi
    }

    fn supports(&self, _tag: TransformTag) -> bool {
        true
    }

    fn emit_file(&self, ctx: &EmitContext<'_>, file: &crate::index::ResolvedFile) -> Option<GeneratedFile> {
        if file.messages.is_empty() && file.enums.is_empty() {
            return None;
        }

        let mut builder = SchemaBuilder {
            ctx,
            package: &file.package,
            pending: VecDeque::new(),
        };
        builder.pending.extend(file.messages.iter().cloned());
        builder.pending.extend(file.enums.iter().cloned());

        let mut schemas = BTreeMap::new();
        let mut done = BTreeSet::new();
        while let Some(name) = builder.pending.pop_front() {
            if !done.insert(name.clone()) {
                continue;
            }
            let schema = if let Some(message) = ctx.index.message(&name) {
                builder.message_schema(message)
            } else if let Some(e) = ctx.index.enum_type(&name) {
                enum_schema(e)
            } else {
                continue;
            };
            schemas.insert(component_name(ctx.index, &file.package, &name), schema);
        }

        let document = json!({
            "openapi": "3.1.0",
            "info": {
                "title": file.name,
                "version": "0.0.0"
            },
            "components": {
                "schemas": schemas
            }
        });
        let content = serde_json::to_string_pretty(&document).ok()? + "\n";

        Some(GeneratedFile {
            target: Target::OpenApi,
            name: format!("{}.openapi.json", file.prefix()),
            content,
        })
    }
}

/// Component key of a type: package-relative within the document's package,
/// fully qualified otherwise.
pub fn component_name(index: &GlobalIndex, package: &str, full_name: &str) -> String {
    let local = index
        .message(full_name)
        .map(|m| (&m.package, &m.local_name))
        .or_else(|| index.enum_type(full_name).map(|e| (&e.package, &e.local_name)));
    match local {
        Some((p, local)) if p == package => local.clone(),
        _ => full_name.trim_start_matches('.').to_string(),
    }
}

struct SchemaBuilder<'c> {
    ctx: &'c EmitContext<'c>,
    package: &'c str,
    /// Types referenced but not yet rendered.
    pending: VecDeque<String>,
}

impl<'c> SchemaBuilder<'c> {
    fn reference(&mut self, full_name: &str) -> Value {
        self.pending.push_back(full_name.to_string());
        json!({
            "$ref": format!(
                "#/components/schemas/{}",
                component_name(self.ctx.index, self.package, full_name)
            )
        })
    }

    fn kinds(&self, message: &ResolvedMessage, field: &ResolvedField) -> Vec<&'c TransformKind> {
        self.ctx
            .plans
            .get(&message.full_name)
            .map(|plan| {
                plan.transforms
                    .iter()
                    .filter(|t| t.field == field.name)
                    .map(|t| &t.kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn message_schema(&mut self, message: &ResolvedMessage) -> Value {
        if message.is_root_unwrap() && self.ctx.plans.has_plan(&message.full_name) {
            return self.field_schema(message, &message.fields[0]);
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        self.properties(message, "", &mut properties, &mut required, 0);

        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    fn properties(
        &mut self,
        message: &ResolvedMessage,
        prefix: &str,
        properties: &mut Map<String, Value>,
        required: &mut Vec<String>,
        depth: usize,
    ) {
        for field in &message.fields {
            if let Some(TransformKind::OneofDiscriminator {
                discriminator,
                flatten,
                variants,
            }) = self.oneof_of(message, field)
            {
                if variants.first().is_some_and(|v| v.field == field.name) {
                    let values: Vec<&str> = variants.iter().map(|v| v.value.as_str()).collect();
                    properties.insert(
                        format!("{}{}", prefix, discriminator),
                        json!({ "type": "string", "enum": values }),
                    );
                    self.oneof_variants(message, prefix, *flatten, variants, properties, depth);
                }
                continue;
            }

            let kinds = self.kinds(message, field);
            let flattened = kinds.iter().find_map(|k| match k {
                TransformKind::Flatten {
                    message_type,
                    prefix: child_prefix,
                    ..
                } => Some((message_type.clone(), child_prefix.clone())),
                _ => None,
            });
            if let Some((child, child_prefix)) = flattened {
                if let Some(child) = self.ctx.index.message(&child) {
                    if depth < self.ctx.index.max_depth() {
                        let prefix = format!("{}{}", prefix, child_prefix);
                        self.properties(child, &prefix, properties, required, depth + 1);
                    }
                }
                continue;
            }

            let key = format!("{}{}", prefix, field.json_name);
            let mut schema = self.field_schema(message, field);
            for kind in &kinds {
                match kind {
                    TransformKind::Nullable => {
                        schema = nullable(schema);
                        required.push(key.clone());
                    }
                    TransformKind::EmptyValueAs {
                        behavior: EmptyBehavior::Null,
                    } => schema = nullable(schema),
                    _ => {}
                }
            }
            properties.insert(key, schema);
        }
    }

    /// Variant properties. A flattened variant's own properties are lifted
    /// but never required, since only one variant is present at a time.
    fn oneof_variants(
        &mut self,
        message: &ResolvedMessage,
        prefix: &str,
        flatten: bool,
        variants: &[OneofVariant],
        properties: &mut Map<String, Value>,
        depth: usize,
    ) {
        for variant in variants {
            let child = variant
                .message_type
                .as_deref()
                .and_then(|m| self.ctx.index.message(m))
                .filter(|_| flatten);
            match child {
                Some(child) if depth < self.ctx.index.max_depth() => {
                    let mut lifted = Map::new();
                    self.properties(child, prefix, &mut lifted, &mut Vec::new(), depth + 1);
                    for (key, schema) in lifted {
                        properties.entry(key).or_insert(schema);
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(member) = message.field(&variant.field) {
                        let schema = self.field_schema(message, member);
                        properties.insert(format!("{}{}", prefix, member.json_name), schema);
                    }
                }
            }
        }
    }

    fn oneof_of(&self, message: &ResolvedMessage, field: &ResolvedField) -> Option<&'c TransformKind> {
        field.oneof.as_ref()?;
        self.ctx
            .plans
            .get(&message.full_name)?
            .transforms
            .iter()
            .map(|t| &t.kind)
            .find(|k| {
                matches!(k, TransformKind::OneofDiscriminator { variants, .. }
                    if variants.iter().any(|v| v.field == field.name))
            })
    }

    /// Schema of a field's whole value.
    fn field_schema(&mut self, message: &ResolvedMessage, field: &ResolvedField) -> Value {
        let kinds = self.kinds(message, field);
        if field.is_map() {
            let collapsed = kinds.iter().find_map(|k| match k {
                TransformKind::Unwrap {
                    value_field: Some(inner),
                    is_root: false,
                    ..
                } => Some(inner.clone()),
                _ => None,
            });
            let value = match collapsed {
                Some(inner_json) => {
                    let value_message = field.message_type().and_then(|m| self.ctx.index.message(m));
                    match value_message
                        .and_then(|m| m.fields.iter().find(|f| f.json_name == inner_json).map(|f| (m, f)))
                    {
                        Some((value_message, inner)) => {
                            let inner_kinds = self.kinds(value_message, inner);
                            let items = self.element_schema(inner, &inner_kinds);
                            json!({ "type": "array", "items": items })
                        }
                        None => json!({ "type": "array" }),
                    }
                }
                None => self.element_schema(field, &kinds),
            };
            return json!({ "type": "object", "additionalProperties": value });
        }

        let element = self.element_schema(field, &kinds);
        if field.is_list() {
            json!({ "type": "array", "items": element })
        } else {
            element
        }
    }

    fn element_schema(&mut self, field: &ResolvedField, kinds: &[&TransformKind]) -> Value {
        match &field.ty {
            ValueType::Scalar(kind) => {
                let as_number = kinds.iter().any(|k| k.tag() == TransformTag::IntegerAsNumber);
                let bytes = kinds.iter().find_map(|k| match k {
                    TransformKind::BytesAs { encoding } => Some(*encoding),
                    _ => None,
                });
                scalar_schema(*kind, as_number, bytes.unwrap_or(BytesEncoding::Base64))
            }
            ValueType::Enum(name) => {
                let numbers = kinds.iter().find_map(|k| match k {
                    TransformKind::EnumAsNumber { values, .. } => Some(values),
                    _ => None,
                });
                if let Some(values) = numbers {
                    let mut seen = BTreeSet::new();
                    let numbers: Vec<i32> = values
                        .iter()
                        .map(|v| v.number)
                        .filter(|n| seen.insert(*n))
                        .collect();
                    return json!({ "type": "integer", "enum": numbers });
                }
                if name == "google.protobuf.NullValue" {
                    return json!({ "type": "null" });
                }
                self.reference(name)
            }
            ValueType::Message(name) if name == TIMESTAMP_TYPE => {
                let format = kinds
                    .iter()
                    .find_map(|k| match k {
                        TransformKind::TimestampAs { format } => Some(*format),
                        _ => None,
                    })
                    .unwrap_or(TimestampFormat::Rfc3339);
                timestamp_schema(format)
            }
            ValueType::Message(name) => match well_known_schema(name) {
                Some(schema) => schema,
                None => self.reference(name),
            },
        }
    }
}

fn enum_schema(e: &ResolvedEnum) -> Value {
    let mut seen = BTreeSet::new();
    let names: Vec<&str> = e
        .values
        .iter()
        .map(|v| v.wire_name())
        .filter(|n| seen.insert(*n))
        .collect();
    json!({ "type": "string", "enum": names })
}

fn scalar_schema(kind: ScalarKind, int64_as_number: bool, bytes: BytesEncoding) -> Value {
    match kind {
        ScalarKind::Bool => json!({ "type": "boolean" }),
        ScalarKind::String => json!({ "type": "string" }),
        ScalarKind::Bytes => bytes_schema(bytes),
        ScalarKind::Double => json!({ "type": "number", "format": "double" }),
        ScalarKind::Float => json!({ "type": "number", "format": "float" }),
        k if k.is_64bit() => {
            let (format, pattern) = if k.is_unsigned() {
                ("uint64", "^[0-9]+$")
            } else {
                ("int64", "^-?[0-9]+$")
            };
            if int64_as_number {
                json!({ "type": "integer", "format": format })
            } else {
                json!({ "type": "string", "format": format, "pattern": pattern })
            }
        }
        k => {
            let format = if k.is_unsigned() { "uint32" } else { "int32" };
            json!({ "type": "integer", "format": format })
        }
    }
}

fn bytes_schema(encoding: BytesEncoding) -> Value {
    match encoding {
        BytesEncoding::Hex => {
            json!({ "type": "string", "format": "hex", "pattern": "^[0-9a-fA-F]*$" })
        }
        BytesEncoding::Base64Raw => {
            json!({ "type": "string", "format": "byte", "pattern": "^[A-Za-z0-9+/]*$" })
        }
        BytesEncoding::Base64Url => {
            json!({ "type": "string", "format": "base64url", "pattern": "^[A-Za-z0-9_-]*={0,2}$" })
        }
        BytesEncoding::Base64UrlRaw => {
            json!({ "type": "string", "format": "base64url", "pattern": "^[A-Za-z0-9_-]*$" })
        }
        BytesEncoding::Base64 | BytesEncoding::Unspecified => {
            json!({ "type": "string", "format": "byte" })
        }
    }
}

fn timestamp_schema(format: TimestampFormat) -> Value {
    match format {
        TimestampFormat::UnixSeconds => json!({ "type": "integer", "format": "unix-timestamp" }),
        TimestampFormat::UnixMillis => json!({ "type": "integer", "format": "unix-timestamp-ms" }),
        TimestampFormat::Date => json!({ "type": "string", "format": "date" }),
        TimestampFormat::Rfc3339 | TimestampFormat::Unspecified => {
            json!({ "type": "string", "format": "date-time" })
        }
    }
}

fn well_known_schema(name: &str) -> Option<Value> {
    let local = name.strip_prefix("google.protobuf.")?;
    Some(match local {
        "Duration" => json!({ "type": "string", "pattern": "^-?[0-9]+(\\.[0-9]+)?s$" }),
        "FieldMask" | "StringValue" => json!({ "type": "string" }),
        "BytesValue" => bytes_schema(BytesEncoding::Base64),
        "Int64Value" => scalar_schema(ScalarKind::Int64, false, BytesEncoding::Base64),
        "UInt64Value" => scalar_schema(ScalarKind::Uint64, false, BytesEncoding::Base64),
        "Int32Value" => scalar_schema(ScalarKind::Int32, false, BytesEncoding::Base64),
        "UInt32Value" => scalar_schema(ScalarKind::Uint32, false, BytesEncoding::Base64),
        "DoubleValue" => scalar_schema(ScalarKind::Double, false, BytesEncoding::Base64),
        "FloatValue" => scalar_schema(ScalarKind::Float, false, BytesEncoding::Base64),
        "BoolValue" => json!({ "type": "boolean" }),
        "Empty" | "Struct" | "Any" => json!({ "type": "object" }),
        "ListValue" => json!({ "type": "array" }),
        "Value" => json!({}),
        _ => return None,
    })
}

/// Allow `null` alongside the schema's own type.
fn nullable(mut schema: Value) -> Value {
    match schema.get("type").and_then(Value::as_str).map(str::to_string) {
        Some(ty) => {
            schema["type"] = json!([ty, "null"]);
            schema
        }
        None => json!({ "oneOf": [schema, { "type": "null" }] }),
    }
}
