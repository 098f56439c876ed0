use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axle_contracts::AXLEC_REPORT_SCHEMA_VERSION;
use axle_targets::{PointerWidth, TargetId};
use axlec::compile::{self, ResolveOptions};
use axlec::diagnostics;
use axlec::language;
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "axlec")]
#[command(about = "Axle type resolution core (mutability and staging).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    LangId,
    Resolve {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = TargetId::X86_64)]
        target: TargetId,
        /// Overrides the target's pointer width (32 or 64).
        #[arg(long, value_name = "BITS")]
        pointer_width: Option<u32>,
        #[arg(long)]
        report_json: bool,
        #[arg(long, value_name = "PATH")]
        emit_bindings: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        emit_mono_map: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        emit_wide_pointers: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct AxlecToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    target: &'static str,
    pointer_width: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<diagnostics::Diagnostic>,
    exit_code: u8,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::LangId => {
            println!("{}", language::LANG_ID);
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Resolve {
            input,
            target,
            pointer_width,
            report_json,
            emit_bindings,
            emit_mono_map,
            emit_wide_pointers,
        } => {
            let mut profile = target.profile();
            if let Some(bits) = pointer_width {
                let w = PointerWidth::from_bits(bits)
                    .with_context(|| format!("unsupported --pointer-width {bits} (use 32 or 64)"))?;
                profile = profile.with_pointer_width(w);
            }
            let options = ResolveOptions {
                target: profile,
                ..ResolveOptions::default()
            };

            let bytes = match std::fs::read(&input) {
                Ok(bytes) => bytes,
                Err(err) => {
                    if report_json {
                        let report = AxlecToolReport {
                            schema_version: AXLEC_REPORT_SCHEMA_VERSION,
                            command: "resolve",
                            ok: false,
                            r#in: input.display().to_string(),
                            target: profile.id.as_str(),
                            pointer_width: profile.pointer_width.bits(),
                            fingerprint: None,
                            diagnostics_count: 1,
                            diagnostics: vec![diagnostic_error(
                                "AXL-IO-READ-0001",
                                diagnostics::Stage::Parse,
                                &format!("read input {}: {err}", input.display()),
                            )],
                            exit_code: 2,
                        };
                        print_json(&report)?;
                        return Ok(std::process::ExitCode::from(2));
                    }
                    return Err(err).with_context(|| format!("read input: {}", input.display()));
                }
            };

            let out = match compile::resolve_unit(&bytes, &options) {
                Ok(out) => out,
                Err(err) => {
                    if report_json {
                        let code = match err.kind {
                            compile::CompileErrorKind::Budget => "AXL-BUDGET-0001",
                            compile::CompileErrorKind::Parse => "AXL-PARSE-0001",
                            _ => "AXL-INTERNAL-0001",
                        };
                        let report = AxlecToolReport {
                            schema_version: AXLEC_REPORT_SCHEMA_VERSION,
                            command: "resolve",
                            ok: false,
                            r#in: input.display().to_string(),
                            target: profile.id.as_str(),
                            pointer_width: profile.pointer_width.bits(),
                            fingerprint: None,
                            diagnostics_count: 1,
                            diagnostics: vec![diagnostic_error(
                                code,
                                diagnostics::Stage::Parse,
                                &err.message,
                            )],
                            exit_code: 2,
                        };
                        print_json(&report)?;
                        return Ok(std::process::ExitCode::from(2));
                    }
                    return Err(err).with_context(|| format!("resolve: {}", input.display()));
                }
            };

            if let Some(path) = &emit_bindings {
                write_json_file(path, &out.bindings)?;
            }
            if let Some(path) = &emit_mono_map {
                write_json_file(path, &out.mono)?;
            }
            if let Some(path) = &emit_wide_pointers {
                write_json_file(path, &out.wide_pointers)?;
            }

            let exit_code: u8 = if out.ok() { 0 } else { 1 };
            if report_json {
                let report = AxlecToolReport {
                    schema_version: AXLEC_REPORT_SCHEMA_VERSION,
                    command: "resolve",
                    ok: out.ok(),
                    r#in: input.display().to_string(),
                    target: profile.id.as_str(),
                    pointer_width: profile.pointer_width.bits(),
                    fingerprint: Some(out.fingerprint.clone()),
                    diagnostics_count: out.report.diagnostics.len(),
                    diagnostics: out.report.diagnostics,
                    exit_code,
                };
                print_json(&report)?;
            } else {
                for d in &out.report.diagnostics {
                    eprintln!("{}: {} at {}", d.code, d.message, d.ptr());
                }
                println!(
                    "{}: {} ({} instances, {} wide pointers)",
                    out.unit,
                    if out.ok() { "ok" } else { "unresolved" },
                    out.mono.items.len(),
                    out.wide_pointers.items.len()
                );
            }
            Ok(std::process::ExitCode::from(exit_code))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn write_json_file(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    let out = serde_json::to_string(value)? + "\n";
    std::fs::write(path, out.as_bytes()).with_context(|| format!("write: {}", path.display()))?;
    Ok(())
}

fn diagnostic_error(
    code: &str,
    stage: diagnostics::Stage,
    message: &str,
) -> diagnostics::Diagnostic {
    diagnostics::Diagnostic {
        code: code.to_string(),
        severity: diagnostics::Severity::Error,
        stage,
        message: message.to_string(),
        loc: None,
        notes: Vec::new(),
        related: Vec::new(),
        data: Default::default(),
    }
}
