//! Encoding plans.
//!
//! Every target allows one serialization override per message type, so all
//! field-level transforms of a message are merged into a single ordered
//! [`EncodingPlan`] here, before any emitter runs. A message also gets a plan
//! when it only contains (directly, in a list or as a map value) another
//! message that has one, so overrides compose through nesting.
//!
//! Discriminated oneofs get one message-level entry after the field entries:
//! the discriminator is written once the variants are in their wire form.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::index::{GlobalIndex, ResolvedField, ResolvedMessage, ScalarKind, ValueType};
use crate::types::{
    BytesEncoding, EmptyBehavior, EnumEncoding, Int64Encoding, TimestampFormat, BYTES_ENCODING,
    EMPTY_BEHAVIOR, ENUM_ENCODING, ENUM_VALUE, FLATTEN, INT64_ENCODING, NULLABLE, ONEOF_CONFIG,
    TIMESTAMP_FORMAT, UNWRAP,
};

/// Where a field's transformed values sit inside its JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// The field value itself.
    Single,
    /// Each element of a JSON array.
    List,
    /// Each value of a JSON object keyed by map key.
    MapValues,
}

/// One entry of an enum name table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumName {
    /// Baseline (proto) value name.
    pub name: String,
    pub number: i32,
    /// Name written on the wire.
    pub wire: String,
}

/// One member of a discriminated oneof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OneofVariant {
    pub field: String,
    pub json_name: String,
    /// Discriminator value naming this variant.
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Wire keys of the variant message, lifted when the oneof is flattened.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub child_keys: Vec<String>,
}

/// A single deviation from the baseline wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// Replace the document (root) or each map value (map-value) by one field's contents.
    Unwrap {
        /// Element message of the unwrapped list, or map value message.
        element_type: Option<String>,
        is_map: bool,
        is_root: bool,
        /// For map-value unwrap: the JSON name of the value message's list field.
        #[serde(skip_serializing_if = "Option::is_none")]
        value_field: Option<String>,
    },
    /// Absent becomes `null`.
    Nullable,
    /// 64-bit integer as a JSON number.
    IntegerAsNumber { unsigned: bool },
    EnumCustomNames { enum_type: String, table: Vec<EnumName> },
    EnumAsNumber { enum_type: String, values: Vec<EnumName> },
    TimestampAs { format: TimestampFormat },
    BytesAs { encoding: BytesEncoding },
    EmptyValueAs { behavior: EmptyBehavior },
    /// Apply the field's message type's own plan.
    Nested { message_type: String },
    /// Lift the child object's keys into the parent, prefixed.
    Flatten {
        message_type: String,
        prefix: String,
        /// Keys the child occupies on the wire, before prefixing.
        child_keys: Vec<String>,
    },
    /// Name the set member of a oneof in a discriminator property, optionally
    /// lifting the member's own keys next to it.
    OneofDiscriminator {
        discriminator: String,
        flatten: bool,
        variants: Vec<OneofVariant>,
    },
}

/// Discriminant of [`TransformKind`], used by emitters to declare support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TransformTag {
    Unwrap,
    Nullable,
    IntegerAsNumber,
    EnumCustomNames,
    EnumAsNumber,
    TimestampAs,
    BytesAs,
    EmptyValueAs,
    Nested,
    Flatten,
    OneofDiscriminator,
}

impl TransformTag {
    pub const ALL: [TransformTag; 11] = [
        TransformTag::Unwrap,
        TransformTag::Nullable,
        TransformTag::IntegerAsNumber,
        TransformTag::EnumCustomNames,
        TransformTag::EnumAsNumber,
        TransformTag::TimestampAs,
        TransformTag::BytesAs,
        TransformTag::EmptyValueAs,
        TransformTag::Nested,
        TransformTag::Flatten,
        TransformTag::OneofDiscriminator,
    ];

    /// Directive that gives rise to this transform.
    pub fn directive(&self) -> &'static str {
        match self {
            TransformTag::Unwrap => UNWRAP,
            TransformTag::Nullable => NULLABLE,
            TransformTag::IntegerAsNumber => INT64_ENCODING,
            TransformTag::EnumCustomNames => ENUM_VALUE,
            TransformTag::EnumAsNumber => ENUM_ENCODING,
            TransformTag::TimestampAs => TIMESTAMP_FORMAT,
            TransformTag::BytesAs => BYTES_ENCODING,
            TransformTag::EmptyValueAs => EMPTY_BEHAVIOR,
            TransformTag::Nested => "nested",
            TransformTag::Flatten => FLATTEN,
            TransformTag::OneofDiscriminator => ONEOF_CONFIG,
        }
    }
}

impl std::fmt::Display for TransformTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl TransformKind {
    pub fn tag(&self) -> TransformTag {
        match self {
            TransformKind::Unwrap { .. } => TransformTag::Unwrap,
            TransformKind::Nullable => TransformTag::Nullable,
            TransformKind::IntegerAsNumber { .. } => TransformTag::IntegerAsNumber,
            TransformKind::EnumCustomNames { .. } => TransformTag::EnumCustomNames,
            TransformKind::EnumAsNumber { .. } => TransformTag::EnumAsNumber,
            TransformKind::TimestampAs { .. } => TransformTag::TimestampAs,
            TransformKind::BytesAs { .. } => TransformTag::BytesAs,
            TransformKind::EmptyValueAs { .. } => TransformTag::EmptyValueAs,
            TransformKind::Nested { .. } => TransformTag::Nested,
            TransformKind::Flatten { .. } => TransformTag::Flatten,
            TransformKind::OneofDiscriminator { .. } => TransformTag::OneofDiscriminator,
        }
    }

    pub fn is_root_unwrap(&self) -> bool {
        matches!(self, TransformKind::Unwrap { is_root: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTransform {
    /// Proto field name, or the oneof name for a discriminator.
    pub field: String,
    /// Key in the baseline document; the discriminator property for a oneof.
    pub json_name: String,
    pub container: Container,
    #[serde(flatten)]
    pub kind: TransformKind,
}

/// The merged transforms of one message, in application order.
///
/// Encoding applies the transforms front to back; decoding applies their
/// inverses back to front. A root unwrap, when present, is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingPlan {
    pub message: String,
    pub transforms: Vec<FieldTransform>,
}

impl EncodingPlan {
    pub fn root_unwrap(&self) -> Option<&FieldTransform> {
        self.transforms.iter().find(|t| t.kind.is_root_unwrap())
    }

    pub fn tags(&self) -> BTreeSet<TransformTag> {
        self.transforms.iter().map(|t| t.kind.tag()).collect()
    }

    /// Messages whose plans this plan delegates to.
    pub fn nested_messages(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().filter_map(|t| match &t.kind {
            TransformKind::Nested { message_type } => Some(message_type.as_str()),
            _ => None,
        })
    }
}

/// All plans of one generation run, keyed by message name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanSet {
    plans: BTreeMap<String, EncodingPlan>,
}

impl PlanSet {
    /// Whether the message needs the custom serialization path.
    pub fn has_plan(&self, message: &str) -> bool {
        self.plans.contains_key(message.trim_start_matches('.'))
    }

    pub fn get(&self, message: &str) -> Option<&EncodingPlan> {
        self.plans.get(message.trim_start_matches('.'))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodingPlan> {
        self.plans.values()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Build the plan of every message that needs one.
///
/// Expects an index that passed validation.
pub fn build_plans(index: &GlobalIndex) -> PlanSet {
    let needs = messages_needing_plans(index);
    let mut plans = BTreeMap::new();

    for name in &needs {
        if plans.contains_key(name) {
            continue;
        }
        let Some(message) = index.message(name) else {
            continue;
        };
        let plan = build_plan(index, message, &needs);
        debug!(
            type_name = %name,
            transforms = plan.transforms.len(),
            "built encoding plan"
        );
        plans.insert(name.clone(), plan);
    }

    info!(plans = plans.len(), "built encoding plans");
    PlanSet { plans }
}

/// Messages with a direct transform, plus everything that reaches one.
fn messages_needing_plans(index: &GlobalIndex) -> BTreeSet<String> {
    let mut needs: BTreeSet<String> = index
        .messages()
        .filter(|m| !m.well_known && has_direct_transform(index, m))
        .map(|m| m.full_name.clone())
        .collect();

    // Fixpoint over "field refers to a message with a plan"; cycles settle.
    loop {
        let added: Vec<String> = index
            .messages()
            .filter(|m| !m.well_known && !needs.contains(&m.full_name))
            .filter(|m| {
                m.fields
                    .iter()
                    .filter_map(ResolvedField::message_type)
                    .any(|t| needs.contains(t))
            })
            .map(|m| m.full_name.clone())
            .collect();
        if added.is_empty() {
            break;
        }
        needs.extend(added);
    }
    needs
}

fn has_direct_transform(index: &GlobalIndex, message: &ResolvedMessage) -> bool {
    message.discriminated_oneofs().next().is_some()
        || message.fields.iter().any(|field| {
            !field_transforms(index, message, field, &BTreeSet::new()).is_empty()
        })
}

fn build_plan(index: &GlobalIndex, message: &ResolvedMessage, needs: &BTreeSet<String>) -> EncodingPlan {
    let mut transforms = Vec::new();
    for field in &message.fields {
        transforms.extend(field_transforms(index, message, field, needs));
    }
    transforms.extend(oneof_transforms(index, message));
    // Root unwrap discards the document, so it runs after everything else.
    transforms.sort_by_key(|t| t.kind.is_root_unwrap());

    EncodingPlan {
        message: message.full_name.clone(),
        transforms,
    }
}

/// One discriminator entry per discriminated oneof, in declaration order.
fn oneof_transforms(index: &GlobalIndex, message: &ResolvedMessage) -> Vec<FieldTransform> {
    message
        .discriminated_oneofs()
        .map(|(oneof, config)| {
            let variants = message
                .oneof_members(oneof)
                .map(|member| {
                    let message_type = member.message_type().map(str::to_string);
                    let child_keys = match &message_type {
                        Some(child) if config.flatten => index.flattened_keys(child).unwrap_or_default(),
                        _ => Vec::new(),
                    };
                    OneofVariant {
                        field: member.name.clone(),
                        json_name: member.json_name.clone(),
                        value: member.variant_value().to_string(),
                        message_type,
                        child_keys,
                    }
                })
                .collect();
            FieldTransform {
                field: oneof.name.clone(),
                json_name: config.discriminator.clone(),
                container: Container::Single,
                kind: TransformKind::OneofDiscriminator {
                    discriminator: config.discriminator.clone(),
                    flatten: config.flatten,
                    variants,
                },
            }
        })
        .collect()
}

/// Transforms of one field, in application order.
///
/// `needs` holds messages with plans; pass an empty set to get only the
/// field's direct transforms.
fn field_transforms(
    index: &GlobalIndex,
    message: &ResolvedMessage,
    field: &ResolvedField,
    needs: &BTreeSet<String>,
) -> Vec<FieldTransform> {
    let a = &field.annotations;
    let container = if field.is_list() {
        Container::List
    } else if field.is_map() {
        Container::MapValues
    } else {
        Container::Single
    };
    let mut out = Vec::new();
    let mut push = |container: Container, kind: TransformKind| {
        out.push(FieldTransform {
            field: field.name.clone(),
            json_name: field.json_name.clone(),
            container,
            kind,
        });
    };

    if field.is_singular() && matches!(a.empty_behavior, EmptyBehavior::Null | EmptyBehavior::Omit) {
        push(
            Container::Single,
            TransformKind::EmptyValueAs {
                behavior: a.empty_behavior,
            },
        );
    }

    if let Some(child) = field.message_type() {
        if needs.contains(child) {
            push(
                container,
                TransformKind::Nested {
                    message_type: child.to_string(),
                },
            );
        }

        // Map-value unwrap: the value message collapses to its list field.
        if field.is_map() {
            if let Some(value) = index.message(child) {
                if let Some(inner) = value.unwrap_field().filter(|_| !value.is_root_unwrap()) {
                    if inner.is_list() {
                        push(
                            Container::MapValues,
                            TransformKind::Unwrap {
                                element_type: inner.message_type().map(str::to_string),
                                is_map: true,
                                is_root: false,
                                value_field: Some(inner.json_name.clone()),
                            },
                        );
                        if value.fields.len() > 1 {
                            warn!(
                                type_name = %message.full_name,
                                field = %field.name,
                                value = %value.full_name,
                                "map-value unwrap drops the other fields of the value message"
                            );
                        }
                    }
                }
            }
        }
    }

    if a.unwrap && message.is_root_unwrap() {
        push(
            Container::Single,
            TransformKind::Unwrap {
                element_type: field.message_type().map(str::to_string),
                is_map: field.is_map(),
                is_root: true,
                value_field: None,
            },
        );
    }

    if a.flatten && field.is_singular() {
        if let Some(child) = field.message_type() {
            push(
                Container::Single,
                TransformKind::Flatten {
                    message_type: child.to_string(),
                    prefix: a.flatten_prefix.clone().unwrap_or_default(),
                    child_keys: index.flattened_keys(child).unwrap_or_default(),
                },
            );
        }
    }

    if a.int64_encoding == Int64Encoding::Number {
        if let ValueType::Scalar(kind) = field.ty {
            push(
                container,
                TransformKind::IntegerAsNumber {
                    unsigned: matches!(kind, ScalarKind::Uint64 | ScalarKind::Fixed64),
                },
            );
        }
    }

    if let Some(enum_name) = field.ty.enum_name() {
        if let Some(e) = index.enum_type(enum_name) {
            let names = |wire: &dyn Fn(&crate::index::ResolvedEnumValue) -> String| {
                e.values
                    .iter()
                    .map(|v| EnumName {
                        name: v.name.clone(),
                        number: v.number,
                        wire: wire(v),
                    })
                    .collect::<Vec<_>>()
            };
            if a.enum_encoding == EnumEncoding::Number {
                push(
                    container,
                    TransformKind::EnumAsNumber {
                        enum_type: enum_name.to_string(),
                        values: names(&|v| v.number.to_string()),
                    },
                );
            } else if e.has_custom_names() {
                push(
                    container,
                    TransformKind::EnumCustomNames {
                        enum_type: enum_name.to_string(),
                        table: names(&|v| v.wire_name().to_string()),
                    },
                );
            }
        }
    }

    if matches!(
        a.timestamp_format,
        TimestampFormat::UnixSeconds | TimestampFormat::UnixMillis | TimestampFormat::Date
    ) {
        push(
            container,
            TransformKind::TimestampAs {
                format: a.timestamp_format,
            },
        );
    }

    if !matches!(a.bytes_encoding, BytesEncoding::Unspecified | BytesEncoding::Base64) {
        push(
            container,
            TransformKind::BytesAs {
                encoding: a.bytes_encoding,
            },
        );
    }

    if a.nullable {
        push(Container::Single, TransformKind::Nullable);
    }

    out
}
