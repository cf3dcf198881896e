//! Target emitters.
//!
//! Each emitter renders the same [`PlanSet`] into one artifact family. The
//! driver refuses to run an emitter over a plan containing a transform the
//! emitter does not declare, so no target ever falls back to the baseline
//! encoding for a field another target rewrites.

mod go;
mod openapi;
mod typescript;

pub use go::GoEmitter;
pub use openapi::{component_name, OpenApiEmitter};
pub use typescript::TypeScriptEmitter;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ErrorKind, GenerateError, ValidationError};
use crate::index::{GlobalIndex, ResolvedFile};
use crate::plan::{PlanSet, TransformTag};
use crate::types::{GenerateOptions, Target};

/// Banner on every generated artifact.
pub const GENERATED_BY: &str = "Code generated by protowire. DO NOT EDIT.";

/// One generated artifact. Writing it is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub target: Target,
    /// Path relative to the output root.
    pub name: String,
    pub content: String,
}

/// Read-only inputs shared by every emitter in a run.
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    pub index: &'a GlobalIndex,
    pub plans: &'a PlanSet,
    pub options: &'a GenerateOptions,
}

pub trait Emitter {
    fn target(&self) -> Target;

    /// Whether this emitter can render the given transform.
    fn supports(&self, tag: TransformTag) -> bool;

    /// Render one schema file; `None` when the file needs no artifact.
    fn emit_file(&self, ctx: &EmitContext<'_>, file: &ResolvedFile) -> Option<GeneratedFile>;
}

/// The emitter for one target.
pub fn emitter_for(target: Target) -> Box<dyn Emitter> {
    match target {
        Target::GoServer | Target::GoClient => Box::new(GoEmitter::new(target)),
        Target::TypeScript => Box::new(TypeScriptEmitter),
        Target::OpenApi => Box::new(OpenApiEmitter),
    }
}

/// Plan entries `emitter` cannot render, one error per message and tag.
pub fn unsupported_transforms(emitter: &dyn Emitter, ctx: &EmitContext<'_>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for plan in ctx.plans.iter() {
        for tag in plan.tags() {
            if emitter.supports(tag) {
                continue;
            }
            let file = ctx
                .index
                .message(&plan.message)
                .map(|m| m.file.clone())
                .unwrap_or_default();
            let fields: Vec<&str> = plan
                .transforms
                .iter()
                .filter(|t| t.kind.tag() == tag)
                .map(|t| t.field.as_str())
                .collect();
            errors.push(ValidationError::new(
                ErrorKind::UnrecognizedTransform,
                file,
                &plan.message,
                fields.join(","),
                tag.directive(),
                format!("the {} emitter does not implement {}", emitter.target(), tag),
            ));
        }
    }
    errors
}

/// Run `emitters` over every targeted file.
///
/// Support is checked for all emitters before any of them renders, so a run
/// returns either every artifact or none.
///
/// # Errors
///
/// Returns `GenerateError::Invalid` with one `UnrecognizedTransform` per
/// unsupported plan entry.
pub fn emit_with(
    emitters: &[&dyn Emitter],
    ctx: &EmitContext<'_>,
) -> Result<Vec<GeneratedFile>, GenerateError> {
    let errors: Vec<ValidationError> = emitters
        .iter()
        .flat_map(|e| unsupported_transforms(*e, ctx))
        .collect();
    if !errors.is_empty() {
        return Err(GenerateError::Invalid { errors });
    }

    let mut files = Vec::new();
    for emitter in emitters {
        for file in ctx.index.targets() {
            if let Some(generated) = emitter.emit_file(ctx, file) {
                debug!(
                    target_kind = %emitter.target(),
                    file = %generated.name,
                    bytes = generated.content.len(),
                    "emitted file"
                );
                files.push(generated);
            }
        }
    }
    info!(files = files.len(), "emitted artifacts");
    Ok(files)
}

/// Run the emitters selected by `ctx.options`.
pub fn emit_all(ctx: &EmitContext<'_>) -> Result<Vec<GeneratedFile>, GenerateError> {
    let boxed: Vec<Box<dyn Emitter>> = ctx
        .options
        .effective_targets()
        .into_iter()
        .map(emitter_for)
        .collect();
    let emitters: Vec<&dyn Emitter> = boxed.iter().map(|e| e.as_ref()).collect();
    emit_with(&emitters, ctx)
}

/// `PascalCase` identifier from a dotted or snake-cased name.
pub(crate) fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Path of `to` relative to the directory of `from`, both `/`-separated.
pub(crate) fn relative_path(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to_parts: Vec<&str> = to.split('/').collect();
    let common = from_dir
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count()
        .min(to_parts.len().saturating_sub(1));

    let mut parts: Vec<&str> = vec![".."; from_dir.len() - common];
    parts.extend(&to_parts[common..]);
    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}
