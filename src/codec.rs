//! Reference wire codec.
//!
//! Applies encoding plans to baseline (protojson-shaped) JSON documents and
//! back. The generated Go code performs the same rewrites on a
//! `map[string]json.RawMessage`; this module is the executable definition the
//! emitters are tested against.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::error::CodecError;
use crate::index::GlobalIndex;
use crate::plan::{Container, EncodingPlan, EnumName, FieldTransform, PlanSet, TransformKind};
use crate::types::{BytesEncoding, EmptyBehavior, TimestampFormat};

/// Deepest chain of nested plans followed before giving up.
pub const MAX_NESTING: usize = 100;

/// Encoder/decoder for every message of one generation run.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'a> {
    index: &'a GlobalIndex,
    plans: &'a PlanSet,
}

impl<'a> Codec<'a> {
    pub fn new(index: &'a GlobalIndex, plans: &'a PlanSet) -> Self {
        Self { index, plans }
    }

    /// Rewrite a baseline document of `message` into its wire form.
    ///
    /// Messages without a plan are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::UnknownMessage` for a name missing from the index,
    /// or `CodecError::InvalidValue` when a value cannot be re-expressed.
    pub fn encode(&self, message: &str, baseline: &Value) -> Result<Value, CodecError> {
        self.encode_at(message, baseline, 0)
    }

    /// Rewrite a wire document of `message` back into its baseline form.
    ///
    /// # Errors
    ///
    /// Same as [`Codec::encode`].
    pub fn decode(&self, message: &str, wire: &Value) -> Result<Value, CodecError> {
        self.decode_at(message, wire, 0)
    }

    fn plan_for(&self, message: &str, depth: usize) -> Result<Option<&'a EncodingPlan>, CodecError> {
        if self.index.message(message).is_none() {
            return Err(CodecError::UnknownMessage {
                name: message.to_string(),
            });
        }
        if depth > MAX_NESTING {
            return Err(CodecError::RecursionLimit {
                message: message.to_string(),
                limit: MAX_NESTING,
            });
        }
        Ok(self.plans.get(message))
    }

    fn encode_at(&self, message: &str, value: &Value, depth: usize) -> Result<Value, CodecError> {
        let Some(plan) = self.plan_for(message, depth)? else {
            return Ok(value.clone());
        };
        let mut doc = expect_object(message, value)?;
        trace!(type_name = message, depth, "encoding");

        for t in &plan.transforms {
            if t.kind.is_root_unwrap() {
                return Ok(doc.remove(&t.json_name).unwrap_or_else(|| empty_container(t)));
            }
            self.encode_field(plan, &mut doc, t, depth)?;
        }
        Ok(Value::Object(doc))
    }

    fn decode_at(&self, message: &str, value: &Value, depth: usize) -> Result<Value, CodecError> {
        let Some(plan) = self.plan_for(message, depth)? else {
            return Ok(value.clone());
        };
        trace!(type_name = message, depth, "decoding");

        let mut doc = match plan.root_unwrap() {
            Some(root) => {
                let mut doc = Map::new();
                match value {
                    Value::Null => {}
                    Value::Array(items) if items.is_empty() => {}
                    Value::Object(entries) if entries.is_empty() => {}
                    Value::Array(_) | Value::Object(_) => {
                        doc.insert(root.json_name.clone(), value.clone());
                    }
                    other => {
                        return Err(invalid(
                            plan,
                            root,
                            format!("expected array or object, got {}", crate::types::json_type_name(other)),
                        ))
                    }
                }
                doc
            }
            None => expect_object(message, value)?,
        };

        for t in plan.transforms.iter().rev() {
            if t.kind.is_root_unwrap() {
                continue;
            }
            self.decode_field(plan, &mut doc, t, depth)?;
        }
        Ok(Value::Object(doc))
    }

    fn encode_field(
        &self,
        plan: &EncodingPlan,
        doc: &mut Map<String, Value>,
        t: &FieldTransform,
        depth: usize,
    ) -> Result<(), CodecError> {
        let key = t.json_name.as_str();
        match &t.kind {
            TransformKind::EmptyValueAs { behavior } => {
                if doc.get(key).is_some_and(is_empty_object) {
                    match behavior {
                        EmptyBehavior::Null => {
                            doc.insert(key.to_string(), Value::Null);
                        }
                        EmptyBehavior::Omit => {
                            doc.remove(key);
                        }
                        EmptyBehavior::Unspecified | EmptyBehavior::Preserve => {}
                    }
                }
            }
            TransformKind::Nested { message_type } => {
                each_value(doc, t, |v| {
                    *v = self.encode_at(message_type, v, depth + 1)?;
                    Ok::<(), CodecError>(())
                })?;
            }
            TransformKind::Unwrap {
                value_field: Some(inner),
                ..
            } => {
                each_value(doc, t, |v| {
                    let items = match v {
                        Value::Object(entries) => entries.remove(inner),
                        _ => None,
                    };
                    *v = items.unwrap_or_else(|| Value::Array(Vec::new()));
                    Ok::<(), CodecError>(())
                })?;
            }
            TransformKind::Unwrap { .. } => {}
            TransformKind::Flatten { prefix, .. } => {
                if let Some(child) = doc.remove(key) {
                    match child {
                        Value::Object(entries) => {
                            for (k, v) in entries {
                                doc.insert(format!("{}{}", prefix, k), v);
                            }
                        }
                        Value::Null => {}
                        other => {
                            return Err(invalid(
                                plan,
                                t,
                                format!("expected object, got {}", crate::types::json_type_name(&other)),
                            ))
                        }
                    }
                }
            }
            TransformKind::Nullable => {
                if !doc.contains_key(key) {
                    doc.insert(key.to_string(), Value::Null);
                }
            }
            TransformKind::OneofDiscriminator {
                discriminator,
                flatten,
                variants,
            } => {
                let Some(variant) = variants
                    .iter()
                    .find(|v| doc.get(&v.json_name).is_some_and(|value| !value.is_null()))
                else {
                    return Ok(());
                };
                if *flatten {
                    match doc.remove(&variant.json_name) {
                        Some(Value::Object(entries)) => doc.extend(entries),
                        Some(other) => {
                            return Err(invalid(
                                plan,
                                t,
                                format!(
                                    "variant '{}' must be an object to flatten, got {}",
                                    variant.field,
                                    crate::types::json_type_name(&other)
                                ),
                            ))
                        }
                        None => {}
                    }
                }
                doc.insert(discriminator.clone(), Value::String(variant.value.clone()));
            }
            kind => {
                each_value(doc, t, |v| encode_scalar(kind, v))
                    .map_err(|reason| invalid(plan, t, reason))?;
            }
        }
        Ok(())
    }

    fn decode_field(
        &self,
        plan: &EncodingPlan,
        doc: &mut Map<String, Value>,
        t: &FieldTransform,
        depth: usize,
    ) -> Result<(), CodecError> {
        let key = t.json_name.as_str();
        match &t.kind {
            TransformKind::EmptyValueAs { behavior } => {
                if *behavior == EmptyBehavior::Null && doc.get(key) == Some(&Value::Null) {
                    doc.insert(key.to_string(), Value::Object(Map::new()));
                }
            }
            TransformKind::Nested { message_type } => {
                each_value(doc, t, |v| {
                    *v = self.decode_at(message_type, v, depth + 1)?;
                    Ok::<(), CodecError>(())
                })?;
            }
            TransformKind::Unwrap {
                value_field: Some(inner),
                ..
            } => {
                each_value(doc, t, |v| {
                    let mut entries = Map::new();
                    if matches!(v, Value::Array(items) if !items.is_empty()) {
                        entries.insert(inner.clone(), v.take());
                    }
                    *v = Value::Object(entries);
                    Ok::<(), CodecError>(())
                })?;
            }
            TransformKind::Unwrap { .. } => {}
            TransformKind::Flatten {
                prefix, child_keys, ..
            } => {
                let mut child = Map::new();
                for k in child_keys {
                    if let Some(v) = doc.remove(&format!("{}{}", prefix, k)) {
                        child.insert(k.clone(), v);
                    }
                }
                if !child.is_empty() {
                    doc.insert(key.to_string(), Value::Object(child));
                }
            }
            TransformKind::Nullable => {
                if doc.get(key) == Some(&Value::Null) {
                    doc.remove(key);
                }
            }
            TransformKind::OneofDiscriminator {
                flatten, variants, ..
            } => {
                let tag = match doc.remove(key) {
                    None | Some(Value::Null) => return Ok(()),
                    Some(Value::String(tag)) => tag,
                    Some(other) => {
                        return Err(invalid(
                            plan,
                            t,
                            format!(
                                "discriminator '{}' must be a string, got {}",
                                key,
                                crate::types::json_type_name(&other)
                            ),
                        ))
                    }
                };
                let variant = variants.iter().find(|v| v.value == tag).ok_or_else(|| {
                    invalid(plan, t, format!("unknown {} value \"{}\"", key, tag))
                })?;
                if *flatten {
                    let mut child = Map::new();
                    for k in &variant.child_keys {
                        if let Some(v) = doc.remove(k) {
                            child.insert(k.clone(), v);
                        }
                    }
                    doc.insert(variant.json_name.clone(), Value::Object(child));
                }
            }
            kind => {
                each_value(doc, t, |v| decode_scalar(kind, v))
                    .map_err(|reason| invalid(plan, t, reason))?;
            }
        }
        Ok(())
    }
}

/// Apply `f` to every value a transform addresses, skipping absent keys and nulls.
fn each_value<E>(
    doc: &mut Map<String, Value>,
    t: &FieldTransform,
    mut f: impl FnMut(&mut Value) -> Result<(), E>,
) -> Result<(), E> {
    let Some(value) = doc.get_mut(&t.json_name) else {
        return Ok(());
    };
    match (t.container, value) {
        (_, Value::Null) => Ok(()),
        (Container::Single, v) => f(v),
        (Container::List, Value::Array(items)) => items
            .iter_mut()
            .filter(|v| !v.is_null())
            .try_for_each(&mut f),
        (Container::MapValues, Value::Object(entries)) => entries
            .values_mut()
            .filter(|v| !v.is_null())
            .try_for_each(&mut f),
        _ => Ok(()),
    }
}

fn encode_scalar(kind: &TransformKind, value: &mut Value) -> Result<(), String> {
    match kind {
        TransformKind::IntegerAsNumber { unsigned } => {
            if let Value::String(s) = value {
                *value = Value::Number(parse_integer(s, *unsigned)?);
            }
        }
        TransformKind::EnumCustomNames { table, .. } | TransformKind::EnumAsNumber { values: table, .. } => {
            let numeric = matches!(kind, TransformKind::EnumAsNumber { .. });
            if let Some(entry) = find_enum(table, value) {
                *value = if numeric {
                    Value::from(entry.number)
                } else {
                    Value::String(entry.wire.clone())
                };
            }
        }
        TransformKind::TimestampAs { format } => {
            if let Value::String(s) = value {
                *value = format_timestamp(parse_rfc3339(s)?, *format);
            }
        }
        TransformKind::BytesAs { encoding } => {
            if let Value::String(s) = value {
                let bytes = decode_bytes(s, BytesEncoding::Base64)?;
                *value = Value::String(encode_bytes(&bytes, *encoding));
            }
        }
        _ => {}
    }
    Ok(())
}

fn decode_scalar(kind: &TransformKind, value: &mut Value) -> Result<(), String> {
    match kind {
        TransformKind::IntegerAsNumber { .. } => {
            if let Value::Number(n) = value {
                let text = match (n.as_i64(), n.as_u64()) {
                    (Some(i), _) => i.to_string(),
                    (None, Some(u)) => u.to_string(),
                    _ => return Err(format!("{} is not an integer", n)),
                };
                *value = Value::String(text);
            }
        }
        TransformKind::EnumCustomNames { table, .. } | TransformKind::EnumAsNumber { values: table, .. } => {
            // Wire names win over proto names so a custom name can never be
            // shadowed by another value's proto name.
            let entry = match &*value {
                Value::String(s) => table
                    .iter()
                    .find(|e| e.wire == *s)
                    .or_else(|| table.iter().find(|e| e.name == *s)),
                other => find_enum(table, other),
            };
            match entry {
                Some(entry) => *value = Value::String(entry.name.clone()),
                None if value.is_number() => {}
                None => return Err(format!("unknown enum value {}", value)),
            }
        }
        TransformKind::TimestampAs { format } => {
            if let Some(instant) = parse_timestamp(value, *format)? {
                *value = Value::String(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true));
            }
        }
        TransformKind::BytesAs { encoding } => {
            if let Value::String(s) = value {
                let bytes = decode_bytes(s, *encoding)?;
                *value = Value::String(STANDARD.encode(bytes));
            }
        }
        _ => {}
    }
    Ok(())
}

fn find_enum<'t>(table: &'t [EnumName], value: &Value) -> Option<&'t EnumName> {
    match value {
        Value::String(s) => table.iter().find(|e| e.name == *s),
        Value::Number(n) => {
            let number = n.as_i64()?;
            table.iter().find(|e| i64::from(e.number) == number)
        }
        _ => None,
    }
}

fn parse_integer(s: &str, unsigned: bool) -> Result<Number, String> {
    let parsed = if unsigned {
        s.parse::<u64>().map(Number::from).ok()
    } else {
        s.parse::<i64>().map(Number::from).ok()
    };
    parsed.ok_or_else(|| format!("'{}' is not a 64-bit integer", s))
}

/// Re-express an instant in the given wire format.
pub fn format_timestamp(instant: DateTime<Utc>, format: TimestampFormat) -> Value {
    match format {
        TimestampFormat::UnixSeconds => Value::from(instant.timestamp()),
        // Floors toward negative infinity; plain truncation for post-epoch instants.
        TimestampFormat::UnixMillis => Value::from(instant.timestamp_millis()),
        TimestampFormat::Date => Value::String(instant.format("%Y-%m-%d").to_string()),
        TimestampFormat::Unspecified | TimestampFormat::Rfc3339 => {
            Value::String(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
    }
}

/// Read a wire timestamp; `None` for values that are already RFC 3339 strings.
pub fn parse_timestamp(value: &Value, format: TimestampFormat) -> Result<Option<DateTime<Utc>>, String> {
    let out_of_range = || format!("timestamp {} is out of range", value);
    match (format, value) {
        (TimestampFormat::UnixSeconds, Value::Number(n)) => {
            let secs = n.as_i64().ok_or_else(|| format!("{} is not whole seconds", n))?;
            DateTime::from_timestamp(secs, 0).map(Some).ok_or_else(out_of_range)
        }
        (TimestampFormat::UnixMillis, Value::Number(n)) => {
            let millis = n.as_i64().ok_or_else(|| format!("{} is not whole milliseconds", n))?;
            DateTime::from_timestamp_millis(millis).map(Some).ok_or_else(out_of_range)
        }
        (TimestampFormat::Date, Value::String(s)) if !s.contains('T') => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| format!("'{}' is not a YYYY-MM-DD date: {}", s, e))?;
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(out_of_range)?;
            Ok(Some(midnight.and_utc()))
        }
        (_, Value::String(_)) => Ok(None),
        (_, other) => Err(format!(
            "unexpected {} for timestamp",
            crate::types::json_type_name(other)
        )),
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", s, e))
}

/// Encode bytes in the given wire encoding.
pub fn encode_bytes(bytes: &[u8], encoding: BytesEncoding) -> String {
    match encoding {
        BytesEncoding::Unspecified | BytesEncoding::Base64 => STANDARD.encode(bytes),
        BytesEncoding::Base64Raw => STANDARD_NO_PAD.encode(bytes),
        BytesEncoding::Base64Url => URL_SAFE.encode(bytes),
        BytesEncoding::Base64UrlRaw => URL_SAFE_NO_PAD.encode(bytes),
        BytesEncoding::Hex => hex::encode(bytes),
    }
}

/// Decode bytes from the given wire encoding.
///
/// Each encoding accepts only its own alphabet and padding, matching the
/// generated Go decoders.
pub fn decode_bytes(text: &str, encoding: BytesEncoding) -> Result<Vec<u8>, String> {
    let decoded = match encoding {
        BytesEncoding::Hex => return hex::decode(text).map_err(|e| format!("invalid hex: {}", e)),
        BytesEncoding::Unspecified | BytesEncoding::Base64 => STANDARD.decode(text),
        BytesEncoding::Base64Raw => STANDARD_NO_PAD.decode(text),
        BytesEncoding::Base64Url => URL_SAFE.decode(text),
        BytesEncoding::Base64UrlRaw => URL_SAFE_NO_PAD.decode(text),
    };
    decoded.map_err(|e| format!("invalid {}: {}", encoding_label(encoding), e))
}

fn encoding_label(encoding: BytesEncoding) -> &'static str {
    match encoding {
        BytesEncoding::Unspecified | BytesEncoding::Base64 => "base64",
        BytesEncoding::Base64Raw => "unpadded base64",
        BytesEncoding::Base64Url => "base64url",
        BytesEncoding::Base64UrlRaw => "unpadded base64url",
        BytesEncoding::Hex => "hex",
    }
}

fn expect_object(message: &str, value: &Value) -> Result<Map<String, Value>, CodecError> {
    match value {
        Value::Object(entries) => Ok(entries.clone()),
        other => Err(CodecError::ExpectedObject {
            message: message.to_string(),
            actual: crate::types::json_type_name(other).to_string(),
        }),
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(entries) if entries.is_empty())
}

fn empty_container(t: &FieldTransform) -> Value {
    match t.kind {
        TransformKind::Unwrap { is_map: true, .. } => Value::Object(Map::new()),
        _ => Value::Array(Vec::new()),
    }
}

fn invalid(plan: &EncodingPlan, t: &FieldTransform, reason: String) -> CodecError {
    CodecError::InvalidValue {
        message: plan.message.clone(),
        field: t.field.clone(),
        directive: t.kind.tag().directive().to_string(),
        reason,
    }
}
