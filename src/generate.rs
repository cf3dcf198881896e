//! One generation run: resolve, validate, plan, emit.
//!
//! The stages are separated by a full barrier. Resolution finishes over every
//! reachable file and validation reports zero errors before any plan is built,
//! and every emitter is checked before any of them renders. A run therefore
//! returns either the complete artifact set or the complete error list.

use tracing::info;

use crate::codec::Codec;
use crate::descriptor::FileDescriptorSet;
use crate::emit::{emit_all, EmitContext, GeneratedFile};
use crate::error::GenerateError;
use crate::index::GlobalIndex;
use crate::plan::{build_plans, PlanSet};
use crate::types::GenerateOptions;
use crate::validation::{validate, ValidationWarning};

/// A resolved and validated schema with its encoding plans.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub index: GlobalIndex,
    pub plans: PlanSet,
    pub warnings: Vec<ValidationWarning>,
}

impl Compiled {
    /// Reference codec over this schema.
    pub fn codec(&self) -> Codec<'_> {
        Codec::new(&self.index, &self.plans)
    }

    /// Render the targets selected by `options`.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::Invalid` if an emitter cannot render a plan.
    pub fn emit(&self, options: &GenerateOptions) -> Result<Vec<GeneratedFile>, GenerateError> {
        let ctx = EmitContext {
            index: &self.index,
            plans: &self.plans,
            options,
        };
        emit_all(&ctx)
    }
}

/// Artifacts of a successful run. Writing them is up to the caller.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub files: Vec<GeneratedFile>,
    pub plans: PlanSet,
    pub warnings: Vec<ValidationWarning>,
}

/// Resolve `targets` (every file when empty), validate, and build plans.
///
/// # Errors
///
/// Returns the resolver's error, or `GenerateError::Invalid` carrying every
/// validation error found.
pub fn compile(
    set: &FileDescriptorSet,
    targets: &[String],
    options: &GenerateOptions,
) -> Result<Compiled, GenerateError> {
    let index = GlobalIndex::build(set, targets, options)?;
    let warnings = validate(&index).into_result()?;
    let plans = build_plans(&index);
    info!(
        files = index.files().len(),
        plans = plans.len(),
        warnings = warnings.len(),
        "compiled schema"
    );
    Ok(Compiled {
        index,
        plans,
        warnings,
    })
}

/// Run the whole pipeline and return the generated artifacts.
///
/// # Errors
///
/// Returns any error of [`compile`], or `GenerateError::Invalid` with one
/// `UnrecognizedTransform` per plan entry a selected emitter cannot render.
pub fn generate(
    set: &FileDescriptorSet,
    targets: &[String],
    options: &GenerateOptions,
) -> Result<GenerationOutput, GenerateError> {
    let compiled = compile(set, targets, options)?;
    let files = compiled.emit(options)?;
    Ok(GenerationOutput {
        files,
        plans: compiled.plans,
        warnings: compiled.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Target;
    use serde_json::json;

    fn set(files: serde_json::Value) -> FileDescriptorSet {
        serde_json::from_value(json!({ "file": files })).unwrap()
    }

    fn tagged() -> FileDescriptorSet {
        set(json!([{
            "name": "blob.proto",
            "package": "blob",
            "options": {"goPackage": "example.com/blob;blob"},
            "messageType": [{"name": "Blob", "field": [
                {"name": "data", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
                 "options": {"[sebuf.http.bytes_encoding]": "HEX"}}
            ]}]
        }]))
    }

    #[test]
    fn emits_every_target() {
        let output = generate(&tagged(), &[], &GenerateOptions::new()).unwrap();
        let names: Vec<(Target, &str)> = output
            .files
            .iter()
            .map(|f| (f.target, f.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (Target::GoServer, "blob_wire.pb.go"),
                (Target::GoClient, "blob_wire.pb.go"),
                (Target::TypeScript, "blob.wire.ts"),
                (Target::OpenApi, "blob.openapi.json"),
            ]
        );
        assert!(output.plans.has_plan("blob.Blob"));
    }

    #[test]
    fn selected_targets_only() {
        let options = GenerateOptions::new().targets([Target::OpenApi]);
        let output = generate(&tagged(), &[], &options).unwrap();
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].target, Target::OpenApi);
    }

    #[test]
    fn invalid_schema_emits_nothing() {
        let input = set(json!([{
            "name": "bad.proto",
            "package": "bad",
            "messageType": [{"name": "Bad", "field": [
                {"name": "name", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_STRING",
                 "options": {"[sebuf.http.bytes_encoding]": "HEX"}},
                {"name": "count", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_INT32",
                 "options": {"[sebuf.http.timestamp_format]": "UNIX_SECONDS"}}
            ]}]
        }]));
        let err = generate(&input, &[], &GenerateOptions::new()).unwrap_err();
        let kinds: Vec<ErrorKind> = err.validation_errors().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::IncompatibleDirective; 2]);
    }

    #[test]
    fn compiled_codec_uses_plans() {
        let compiled = compile(&tagged(), &[], &GenerateOptions::new()).unwrap();
        let wire = compiled
            .codec()
            .encode("blob.Blob", &json!({"data": "SGVsbG8="}))
            .unwrap();
        assert_eq!(wire, json!({"data": "48656c6c6f"}));
    }
}
