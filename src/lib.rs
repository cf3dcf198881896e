//! Protowire
//!
//! Annotation-driven JSON wire encoding for protobuf schemas.
//!
//! Schema authors attach directives (`unwrap`, `timestamp_format`,
//! `bytes_encoding`, ...) to fields, enum values and messages. This library
//! resolves those directives across every file of a descriptor set, validates
//! them, composes one [`EncodingPlan`] per message that needs a custom
//! encoding, and renders the plans into Go server and client code, TypeScript
//! declarations and OpenAPI component schemas that all agree on the wire
//! shape.
//!
//! # Example
//!
//! ```
//! use protowire::{compile, load_descriptor_set_str, GenerateOptions};
//! use serde_json::json;
//!
//! let set = load_descriptor_set_str(r#"{
//!     "file": [{
//!         "name": "blob.proto",
//!         "package": "blob",
//!         "messageType": [{"name": "Blob", "field": [{
//!             "name": "data", "number": 1,
//!             "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
//!             "options": {"[sebuf.http.bytes_encoding]": "HEX"}
//!         }]}]
//!     }]
//! }"#).unwrap();
//!
//! let compiled = compile(&set, &[], &GenerateOptions::new()).unwrap();
//! assert!(compiled.plans.has_plan("blob.Blob"));
//!
//! // Baseline protobuf JSON writes bytes as base64; the plan rewrites them as hex.
//! let wire = compiled.codec().encode("blob.Blob", &json!({"data": "SGVsbG8="})).unwrap();
//! assert_eq!(wire, json!({"data": "48656c6c6f"}));
//! ```
//!
//! # Pipeline
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | [`GlobalIndex::build`] | descriptor set | resolved files, messages, enums |
//! | [`validate`] | index | every directive error at once |
//! | [`build_plans`] | validated index | [`PlanSet`] |
//! | [`emit::emit_all`] | plans | [`GeneratedFile`]s |
//!
//! Nothing is written to disk by the library; the `protowire` binary owns
//! file placement.

mod annotations;
mod codec;
mod conformance;
mod descriptor;
pub mod emit;
mod error;
mod generate;
mod index;
mod linter;
mod loader;
mod plan;
mod types;
mod validation;

pub use annotations::{extract_enum_value, extract_field, AnnotationSet, Malformed};
pub use codec::{decode_bytes, encode_bytes, format_timestamp, parse_timestamp, Codec, MAX_NESTING};
pub use conformance::check as check_conformance;
pub use descriptor::{
    to_json_name, EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FieldKind, FieldLabel,
    FileDescriptor, FileDescriptorSet, MessageDescriptor, OneofDescriptor,
};
pub use emit::{GeneratedFile, GENERATED_BY};
pub use error::{
    CodecError, ConformanceError, ErrorKind, GenerateError, LoadError, SchemaError,
    ValidationError,
};
pub use generate::{compile, generate, Compiled, GenerationOutput};
pub use index::{
    is_well_known_message, Cardinality, GlobalIndex, ResolvedEnum, ResolvedEnumValue,
    ResolvedField, ResolvedFile, ResolvedMessage, ScalarKind, ValueType,
};
pub use linter::{lint, lint_set, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{load_descriptor_set, load_descriptor_set_str, load_json, merge_into};
pub use plan::{
    build_plans, Container, EncodingPlan, EnumName, FieldTransform, PlanSet, TransformKind,
    TransformTag,
};
pub use types::{
    BytesEncoding, DirectiveEnum, EmptyBehavior, EnumEncoding, GenerateOptions, Int64Encoding,
    Target, TimestampFormat, DEFAULT_EXTENSION_PACKAGE, DEFAULT_MAX_DEPTH,
};
pub use validation::{validate, ValidationReport, ValidationWarning};
