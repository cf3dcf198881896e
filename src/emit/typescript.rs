//! TypeScript client types.
//!
//! Only declares shapes: every value type is chosen from the field's plan
//! entries so it matches what the Go encoder writes.

use std::collections::{BTreeMap, BTreeSet};

use super::{relative_path, EmitContext, Emitter, GeneratedFile, GENERATED_BY};
use crate::index::{ResolvedEnum, ResolvedField, ResolvedFile, ResolvedMessage, ScalarKind, ValueType};
use crate::plan::{OneofVariant, TransformKind, TransformTag};
use crate::types::{EmptyBehavior, Target, TIMESTAMP_TYPE};

pub struct TypeScriptEmitter;

impl Emitter for TypeScriptEmitter {
    fn target(&self) -> Target {
        Target::TypeScript
    }

    fn supports(&self, _tag: TransformTag) -> bool {
        true
    }

    fn emit_file(&self, ctx: &EmitContext<'_>, file: &ResolvedFile) -> Option<GeneratedFile> {
        if file.messages.is_empty() && file.enums.is_empty() {
            return None;
        }

        let mut unit = TsUnit {
            ctx,
            file,
            imports: BTreeMap::new(),
        };
        let mut body = String::new();
        for e in ctx.index.enums_in(file) {
            body.push('\n');
            body.push_str(&enum_alias(e));
        }
        for message in ctx.index.messages_in(file) {
            body.push('\n');
            body.push_str(&unit.declaration(message));
        }

        let mut content = format!("// {}\n// source: {}\n", GENERATED_BY, file.name);
        if !unit.imports.is_empty() {
            content.push('\n');
        }
        for (path, names) in &unit.imports {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            content.push_str(&format!(
                "import type {{ {} }} from \"{}\";\n",
                names.join(", "),
                path
            ));
        }
        content.push_str(&body);

        Some(GeneratedFile {
            target: Target::TypeScript,
            name: format!("{}.wire.ts", file.prefix()),
            content,
        })
    }
}

fn enum_alias(e: &ResolvedEnum) -> String {
    let mut seen = BTreeSet::new();
    let members: Vec<String> = e
        .values
        .iter()
        .map(|v| v.wire_name())
        .filter(|name| seen.insert(*name))
        .map(|name| format!("\"{}\"", name))
        .collect();
    format!("export type {} = {};\n", e.ident(), members.join(" | "))
}

struct TsUnit<'c> {
    ctx: &'c EmitContext<'c>,
    file: &'c ResolvedFile,
    /// Relative module path to imported type names.
    imports: BTreeMap<String, BTreeSet<String>>,
}

/// One property line of an interface.
struct Property {
    key: String,
    ty: String,
    optional: bool,
}

impl<'c> TsUnit<'c> {
    fn declaration(&mut self, message: &ResolvedMessage) -> String {
        let ident = message.ident();
        if message.is_root_unwrap() && self.ctx.plans.has_plan(&message.full_name) {
            let field = &message.fields[0];
            return format!("export type {} = {};\n", ident, self.field_type(message, field));
        }

        let mut props = Vec::new();
        self.properties(message, "", &mut props, 0);
        let mut out = format!("export interface {} {{\n", ident);
        for p in props {
            out.push_str(&format!(
                "  {}{}: {};\n",
                property_key(&p.key),
                if p.optional { "?" } else { "" },
                p.ty
            ));
        }
        out.push_str("}\n");
        out
    }

    fn properties(&mut self, message: &ResolvedMessage, prefix: &str, out: &mut Vec<Property>, depth: usize) {
        for field in &message.fields {
            if let Some(TransformKind::OneofDiscriminator {
                discriminator,
                flatten,
                variants,
            }) = self.oneof_of(message, field)
            {
                if variants.first().is_some_and(|v| v.field == field.name) {
                    self.oneof_properties(message, prefix, discriminator, *flatten, variants, out, depth);
                }
                continue;
            }

            if let Some(child) = self.flattened_child(message, field) {
                if depth < self.ctx.index.max_depth() {
                    let prefix = format!("{}{}", prefix, flatten_prefix(self, message, field));
                    self.properties(child, &prefix, out, depth + 1);
                }
                continue;
            }

            let property = self.property(message, field, prefix);
            out.push(property);
        }
    }

    fn property(&mut self, message: &ResolvedMessage, field: &ResolvedField, prefix: &str) -> Property {
        let mut ty = self.field_type(message, field);
        let mut optional = true;
        for kind in self.kinds(message, field) {
            match kind {
                TransformKind::Nullable => {
                    ty = format!("{} | null", ty);
                    optional = false;
                }
                TransformKind::EmptyValueAs {
                    behavior: EmptyBehavior::Null,
                } => ty = format!("{} | null", ty),
                _ => {}
            }
        }
        Property {
            key: format!("{}{}", prefix, field.json_name),
            ty,
            optional,
        }
    }

    /// Discriminator as a literal union, then the variants. Flattened
    /// variants contribute their own properties, all optional.
    #[allow(clippy::too_many_arguments)]
    fn oneof_properties(
        &mut self,
        message: &ResolvedMessage,
        prefix: &str,
        discriminator: &str,
        flatten: bool,
        variants: &[OneofVariant],
        out: &mut Vec<Property>,
        depth: usize,
    ) {
        let literals: Vec<String> = variants.iter().map(|v| format!("\"{}\"", v.value)).collect();
        out.push(Property {
            key: format!("{}{}", prefix, discriminator),
            ty: literals.join(" | "),
            optional: true,
        });

        for variant in variants {
            let child = variant
                .message_type
                .as_deref()
                .and_then(|m| self.ctx.index.message(m))
                .filter(|_| flatten);
            match child {
                Some(child) if depth < self.ctx.index.max_depth() => {
                    let mut lifted = Vec::new();
                    self.properties(child, prefix, &mut lifted, depth + 1);
                    for p in lifted {
                        if !out.iter().any(|o| o.key == p.key) {
                            out.push(Property { optional: true, ..p });
                        }
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(member) = message.field(&variant.field) {
                        let property = self.property(message, member, prefix);
                        out.push(property);
                    }
                }
            }
        }
    }

    /// The discriminator entry covering a oneof member.
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

    fn flattened_child(&self, message: &ResolvedMessage, field: &ResolvedField) -> Option<&'c ResolvedMessage> {
        let child = self.kinds(message, field).into_iter().find_map(|k| match k {
            TransformKind::Flatten { message_type, .. } => Some(message_type.clone()),
            _ => None,
        })?;
        self.ctx.index.message(&child)
    }

    /// Plan entries of one field.
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

    /// Declared type of a field's whole value (list and map included).
    fn field_type(&mut self, message: &ResolvedMessage, field: &ResolvedField) -> String {
        let kinds = self.kinds(message, field);
        let element = self.element_type(field, &kinds);

        if field.is_list() {
            return array_of(&element);
        }
        if field.is_map() {
            let collapsed = kinds.iter().find_map(|k| match k {
                TransformKind::Unwrap {
                    value_field: Some(inner),
                    is_root: false,
                    ..
                } => Some(inner.clone()),
                _ => None,
            });
            if let Some(inner_json) = collapsed {
                let value_message = field.message_type().and_then(|m| self.ctx.index.message(m));
                let inner = value_message
                    .and_then(|m| m.fields.iter().find(|f| f.json_name == inner_json).map(|f| (m, f)));
                if let Some((value_message, inner)) = inner {
                    let inner_kinds = self.kinds(value_message, inner);
                    let inner_element = self.element_type(inner, &inner_kinds);
                    return format!("Record<string, {}>", array_of(&inner_element));
                }
            }
            return format!("Record<string, {}>", element);
        }
        element
    }

    fn element_type(&mut self, field: &ResolvedField, kinds: &[&TransformKind]) -> String {
        let has = |tag: TransformTag| kinds.iter().any(|k| k.tag() == tag);
        match &field.ty {
            ValueType::Scalar(kind) => {
                if kind.is_64bit() && !has(TransformTag::IntegerAsNumber) {
                    "string".to_string()
                } else {
                    scalar_type(*kind).to_string()
                }
            }
            ValueType::Enum(name) => {
                if has(TransformTag::EnumAsNumber) {
                    return "number".to_string();
                }
                if name == "google.protobuf.NullValue" {
                    return "null".to_string();
                }
                self.type_ref(name)
            }
            ValueType::Message(name) if name == TIMESTAMP_TYPE => {
                let numeric = kinds.iter().any(|k| {
                    matches!(k, TransformKind::TimestampAs { format } if format.is_numeric())
                });
                if numeric {
                    "number".to_string()
                } else {
                    "string".to_string()
                }
            }
            ValueType::Message(name) => match well_known_type(name) {
                Some(ty) => ty.to_string(),
                None => self.type_ref(name),
            },
        }
    }

    /// Name of a generated type, importing it when declared in another file.
    fn type_ref(&mut self, full_name: &str) -> String {
        let declared = self
            .ctx
            .index
            .message(full_name)
            .map(|m| (m.ident(), m.file.clone()))
            .or_else(|| {
                self.ctx
                    .index
                    .enum_type(full_name)
                    .map(|e| (e.ident(), e.file.clone()))
            });
        let Some((ident, file)) = declared else {
            return "unknown".to_string();
        };
        if file != self.file.name {
            let module = match self.ctx.index.file(&file) {
                Some(f) => format!("{}.wire", f.prefix()),
                None => format!("{}.wire", file.trim_end_matches(".proto")),
            };
            self.imports
                .entry(relative_path(&self.file.name, &module))
                .or_default()
                .insert(ident.clone());
        }
        ident
    }
}

fn flatten_prefix(unit: &TsUnit<'_>, message: &ResolvedMessage, field: &ResolvedField) -> String {
    unit.kinds(message, field)
        .into_iter()
        .find_map(|k| match k {
            TransformKind::Flatten { prefix, .. } => Some(prefix.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn scalar_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Bool => "boolean",
        ScalarKind::String | ScalarKind::Bytes => "string",
        _ => "number",
    }
}

fn well_known_type(name: &str) -> Option<&'static str> {
    Some(match name.trim_start_matches("google.protobuf.") {
        "Duration" | "FieldMask" | "StringValue" | "BytesValue" | "Int64Value" | "UInt64Value" => {
            "string"
        }
        "DoubleValue" | "FloatValue" | "Int32Value" | "UInt32Value" => "number",
        "BoolValue" => "boolean",
        "Empty" => "Record<string, never>",
        "Struct" | "Any" => "Record<string, unknown>",
        "Value" => "unknown",
        "ListValue" => "unknown[]",
        _ => return None,
    })
    .filter(|_| name.starts_with("google.protobuf."))
}

fn array_of(element: &str) -> String {
    if element.contains(' ') {
        format!("({})[]", element)
    } else {
        format!("{}[]", element)
    }
}

fn property_key(key: &str) -> String {
    let mut chars = key.chars();
    let ident_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    if ident_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        key.to_string()
    } else {
        format!("\"{}\"", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FileDescriptorSet;
    use crate::index::GlobalIndex;
    use crate::plan::build_plans;
    use crate::types::GenerateOptions;
    use serde_json::{json, Value};

    fn emit(files: Value) -> Vec<GeneratedFile> {
        let options = GenerateOptions::new();
        let set: FileDescriptorSet = serde_json::from_value(json!({ "file": files })).unwrap();
        let index = GlobalIndex::build(&set, &[], &options).unwrap();
        let plans = build_plans(&index);
        let ctx = EmitContext {
            index: &index,
            plans: &plans,
            options: &options,
        };
        index
            .targets()
            .filter_map(|f| TypeScriptEmitter.emit_file(&ctx, f))
            .collect()
    }

    #[test]
    fn field_types_follow_transforms() {
        let files = emit(json!([{
            "name": "event.proto",
            "package": "ev",
            "messageType": [
                {"name": "Meta", "field": [
                    {"name": "tag", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}
                ]},
                {"name": "Event", "field": [
                    {"name": "id", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_INT64"},
                    {"name": "count", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_UINT64",
                     "options": {"[sebuf.http.int64_encoding]": "NUMBER"}},
                    {"name": "at", "number": 3, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                     "typeName": ".google.protobuf.Timestamp",
                     "options": {"[sebuf.http.timestamp_format]": "UNIX_MILLIS"}},
                    {"name": "digest", "number": 4, "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
                     "options": {"[sebuf.http.bytes_encoding]": "HEX"}},
                    {"name": "note", "number": 5, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING",
                     "proto3Optional": true, "options": {"[sebuf.http.nullable]": true}},
                    {"name": "meta", "number": 6, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                     "typeName": ".ev.Meta", "options": {"[sebuf.http.empty_behavior]": "NULL"}},
                    {"name": "status", "number": 7, "label": "LABEL_OPTIONAL", "type": "TYPE_ENUM",
                     "typeName": ".ev.Status"}
                ]}
            ],
            "enumType": [{"name": "Status", "value": [
                {"name": "STATUS_UNSPECIFIED", "number": 0, "options": {"[sebuf.http.enum_value]": "unknown"}},
                {"name": "STATUS_ACTIVE", "number": 1, "options": {"[sebuf.http.enum_value]": "active"}}
            ]}]
        }]));

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "event.wire.ts");
        assert_eq!(
            files[0].content,
            "// Code generated by protowire. DO NOT EDIT.\n// source: event.proto\n\
             \nexport type Status = \"unknown\" | \"active\";\n\
             \nexport interface Meta {\n  tag?: string;\n}\n\
             \nexport interface Event {\n  id?: string;\n  count?: number;\n  at?: number;\n  digest?: string;\n  note: string | null;\n  meta?: Meta | null;\n  status?: Status;\n}\n"
        );
    }

    #[test]
    fn root_unwrap_flatten_and_imports() {
        let files = emit(json!([
            {
                "name": "common/address.proto",
                "package": "common",
                "messageType": [{"name": "Address", "field": [
                    {"name": "street", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}
                ]}]
            },
            {
                "name": "shop/order.proto",
                "package": "shop",
                "dependency": ["common/address.proto"],
                "messageType": [
                    {"name": "Order", "field": [
                        {"name": "id", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"},
                        {"name": "billing", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                         "typeName": ".common.Address",
                         "options": {"[sebuf.http.flatten]": true, "[sebuf.http.flatten_prefix]": "billing_"}},
                        {"name": "shipping", "number": 3, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                         "typeName": ".common.Address"}
                    ]},
                    {"name": "OrderList", "field": [
                        {"name": "orders", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE",
                         "typeName": ".shop.Order", "options": {"[sebuf.http.unwrap]": true}}
                    ]}
                ]
            }
        ]));

        let order = files.iter().find(|f| f.name == "shop/order.wire.ts").unwrap();
        assert!(order
            .content
            .contains("import type { Address } from \"../common/address.wire\";\n"));
        assert!(order.content.contains(
            "export interface Order {\n  id?: string;\n  billing_street?: string;\n  shipping?: Address;\n}\n"
        ));
        assert!(order.content.contains("export type OrderList = Order[];\n"));
    }

    #[test]
    fn map_value_unwrap_is_a_record_of_arrays() {
        let files = emit(json!([{
            "name": "m.proto",
            "package": "m",
            "messageType": [
                {"name": "Bar", "field": [{"name": "close", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_DOUBLE"}]},
                {"name": "BarList", "field": [
                    {"name": "bars", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE",
                     "typeName": ".m.Bar", "options": {"[sebuf.http.unwrap]": true}},
                    {"name": "source", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}
                ]},
                {"name": "Response", "field": [
                    {"name": "data", "number": 1, "label": "LABEL_REPEATED", "type": "TYPE_MESSAGE",
                     "typeName": ".m.Response.DataEntry"}
                ], "nestedType": [{
                    "name": "DataEntry",
                    "field": [
                        {"name": "key", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"},
                        {"name": "value", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE", "typeName": ".m.BarList"}
                    ],
                    "options": {"mapEntry": true}
                }]}
            ]
        }]));
        assert!(files[0]
            .content
            .contains("export interface Response {\n  data?: Record<string, Bar[]>;\n}\n"));
    }

    #[test]
    fn discriminated_oneofs_declare_literal_unions() {
        let oneof_file = |flatten: bool| {
            json!([{
                "name": "pay.proto",
                "package": "pay",
                "messageType": [
                    {"name": "Card", "field": [
                        {"name": "last4", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}
                    ]},
                    {"name": "Bank", "field": [
                        {"name": "iban", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"}
                    ]},
                    {"name": "Payment", "field": [
                        {"name": "id", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING"},
                        {"name": "card", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                         "typeName": ".pay.Card", "oneofIndex": 0,
                         "options": {"[sebuf.http.oneof_value]": "credit_card"}},
                        {"name": "bank", "number": 3, "label": "LABEL_OPTIONAL", "type": "TYPE_MESSAGE",
                         "typeName": ".pay.Bank", "oneofIndex": 0}
                    ], "oneofDecl": [{"name": "method", "options": {
                        "[sebuf.http.oneof_config]": {"discriminator": "type", "flatten": flatten}
                    }}]}
                ]
            }])
        };

        let files = emit(oneof_file(false));
        assert!(files[0].content.contains(
            "export interface Payment {\n  id?: string;\n  type?: \"credit_card\" | \"bank\";\n  card?: Card;\n  bank?: Bank;\n}\n"
        ));

        let files = emit(oneof_file(true));
        assert!(files[0].content.contains(
            "export interface Payment {\n  id?: string;\n  type?: \"credit_card\" | \"bank\";\n  last4?: string;\n  iban?: string;\n}\n"
        ));
    }

    #[test]
    fn quotes_non_identifier_keys() {
        assert_eq!(property_key("billing_street"), "billing_street");
        assert_eq!(property_key("x-ray"), "\"x-ray\"");
        assert_eq!(array_of("string | null"), "(string | null)[]");
    }
}
