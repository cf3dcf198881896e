//! Protowire CLI
//!
//! Command-line build harness: loads descriptor sets, runs generation and
//! writes artifacts, lints directives, and encodes or decodes payloads with
//! the reference codec.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use protowire::emit::{component_name, EmitContext, Emitter, OpenApiEmitter};
use protowire::{
    check_conformance, compile, generate, lint, load_descriptor_set, load_json, Compiled,
    ConformanceError, FileDescriptorSet, FileStatus, GenerateError, GenerateOptions, Severity,
    Target,
};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protowire")]
#[command(about = "Annotation-driven JSON wire encoding for protobuf schemas")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that resolves a schema.
#[derive(clap::Args)]
struct SchemaArgs {
    /// Descriptor set (JSON) or a directory of descriptor sets
    descriptors: PathBuf,

    /// Proto package declaring the directive extensions
    #[arg(long, default_value = protowire::DEFAULT_EXTENSION_PACKAGE)]
    extension_package: String,

    /// Bound on type nesting depth
    #[arg(long, default_value_t = protowire::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl SchemaArgs {
    fn options(&self) -> GenerateOptions {
        GenerateOptions::new()
            .extension_package(self.extension_package.as_str())
            .max_depth(self.max_depth)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Go, TypeScript and OpenAPI artifacts
    Generate {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Schema file to generate for (repeatable; default: every file)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Artifact to emit: go-server, go-client, typescript, openapi (repeatable; default: all)
        #[arg(long = "target", value_parser = parse_target)]
        targets: Vec<Target>,

        /// Output directory; each target gets its own subdirectory
        #[arg(long, default_value = "gen")]
        out: PathBuf,

        /// Go package name for server output
        #[arg(long)]
        server_package: Option<String>,

        /// Go package name for client output
        #[arg(long)]
        client_package: Option<String>,

        /// Suppress the summary line
        #[arg(long, short)]
        quiet: bool,
    },

    /// Check directives without generating anything
    Lint {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },

    /// Print encoding plans as JSON
    Plan {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Only this message (fully-qualified name)
        #[arg(long)]
        message: Option<String>,
    },

    /// Rewrite a baseline protobuf JSON payload into its wire form
    Encode {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Message type of the payload (fully-qualified name)
        #[arg(long)]
        message: String,

        /// Payload file
        payload: PathBuf,

        /// Also check the wire payload against the generated OpenAPI schema
        #[arg(long)]
        check: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Rewrite a wire payload back into baseline protobuf JSON
    Decode {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Message type of the payload (fully-qualified name)
        #[arg(long)]
        message: String,

        /// Payload file
        payload: PathBuf,

        /// Check the wire payload against the generated OpenAPI schema first
        #[arg(long)]
        check: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Generate {
            schema,
            files,
            targets,
            out,
            server_package,
            client_package,
            quiet,
        } => {
            let mut options = schema.options().targets(targets);
            if let Some(package) = server_package {
                options = options.server_package(package);
            }
            if let Some(package) = client_package {
                options = options.client_package(package);
            }
            run_generate(&schema.descriptors, &files, &options, &out, quiet)
        }

        Commands::Lint {
            schema,
            format,
            strict,
            quiet,
        } => run_lint(&schema.descriptors, &schema.options(), &format, strict, quiet),

        Commands::Plan { schema, message } => {
            run_plan(&schema.descriptors, &schema.options(), message.as_deref())
        }

        Commands::Encode {
            schema,
            message,
            payload,
            check,
            pretty,
        } => run_codec(
            &schema.descriptors,
            &schema.options(),
            CodecArgs {
                message,
                payload,
                check,
                pretty,
                decode: false,
            },
        ),

        Commands::Decode {
            schema,
            message,
            payload,
            check,
            pretty,
        } => run_codec(
            &schema.descriptors,
            &schema.options(),
            CodecArgs {
                message,
                payload,
                check,
                pretty,
                decode: true,
            },
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn parse_target(s: &str) -> Result<Target, String> {
    Target::parse(s).ok_or_else(|| {
        format!(
            "unknown target '{}': expected go-server, go-client, typescript or openapi",
            s
        )
    })
}

fn load(path: &Path) -> Result<FileDescriptorSet, u8> {
    load_descriptor_set(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

/// Print a generation failure, listing every validation error.
fn report_generate_error(e: &GenerateError) -> u8 {
    eprintln!("Error: {}", e);
    for error in e.validation_errors() {
        eprintln!("  {}", error);
    }
    e.exit_code() as u8
}

fn run_generate(
    descriptors: &Path,
    files: &[String],
    options: &GenerateOptions,
    out: &Path,
    quiet: bool,
) -> Result<(), u8> {
    let set = load(descriptors)?;
    let output = generate(&set, files, options).map_err(|e| report_generate_error(&e))?;

    for warning in &output.warnings {
        eprintln!("warning: {}", warning);
    }

    for file in &output.files {
        let path = out.join(file.target.name()).join(&file.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                eprintln!("Error creating {}: {}", parent.display(), e);
                3u8
            })?;
        }
        std::fs::write(&path, &file.content).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        })?;
        debug!(path = %path.display(), "wrote artifact");
    }

    if !quiet {
        println!(
            "Generated {} files ({} plans) in {}",
            output.files.len(),
            output.plans.len(),
            out.display()
        );
    }
    Ok(())
}

fn run_lint(
    path: &Path,
    options: &GenerateOptions,
    format: &str,
    strict: bool,
    quiet: bool,
) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, options, strict);

    if format == "json" {
        let json = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", json);
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.failed == 0 {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.failed == 0 {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_plan(descriptors: &Path, options: &GenerateOptions, message: Option<&str>) -> Result<(), u8> {
    let set = load(descriptors)?;
    let compiled = compile(&set, &[], options).map_err(|e| report_generate_error(&e))?;

    let json = match message {
        Some(name) => {
            if compiled.index.message(name).is_none() {
                eprintln!("Error: no message named '{}'", name);
                return Err(2);
            }
            // Messages without a plan use the baseline encoding.
            serde_json::to_string_pretty(&compiled.plans.get(name))
        }
        None => serde_json::to_string_pretty(&compiled.plans),
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", json);
    Ok(())
}

struct CodecArgs {
    message: String,
    payload: PathBuf,
    check: bool,
    pretty: bool,
    decode: bool,
}

fn run_codec(descriptors: &Path, options: &GenerateOptions, args: CodecArgs) -> Result<(), u8> {
    let set = load(descriptors)?;
    let compiled = compile(&set, &[], options).map_err(|e| report_generate_error(&e))?;
    let payload = load_json(&args.payload).map_err(|e| {
        eprintln!("Error: loading payload: {}", e);
        e.exit_code() as u8
    })?;

    let codec = compiled.codec();
    let output = if args.decode {
        if args.check {
            check_wire(&compiled, options, &args.message, &payload)?;
        }
        codec.decode(&args.message, &payload)
    } else {
        codec.encode(&args.message, &payload)
    }
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    if args.check && !args.decode {
        check_wire(&compiled, options, &args.message, &output)?;
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", json);
    Ok(())
}

/// Check a wire payload against the OpenAPI schema generated for its message.
fn check_wire(
    compiled: &Compiled,
    options: &GenerateOptions,
    message: &str,
    wire: &Value,
) -> Result<(), u8> {
    let resolved = compiled.index.message(message).ok_or_else(|| {
        eprintln!("Error: no message named '{}'", message);
        2u8
    })?;
    let file = compiled.index.file(&resolved.file).ok_or_else(|| {
        eprintln!("Error: no schema file named '{}'", resolved.file);
        2u8
    })?;

    let ctx = EmitContext {
        index: &compiled.index,
        plans: &compiled.plans,
        options,
    };
    let document: Value = OpenApiEmitter
        .emit_file(&ctx, file)
        .and_then(|generated| serde_json::from_str(&generated.content).ok())
        .unwrap_or(Value::Null);
    let component = component_name(&compiled.index, &file.package, &resolved.full_name);

    check_conformance(&document, &component, wire).map_err(|e| {
        eprintln!("Error: {}", e);
        if let ConformanceError::Mismatch { errors, .. } = &e {
            for error in errors {
                eprintln!("  {}", error);
            }
        }
        e.exit_code() as u8
    })
}
