//! C -> LLVM IR -> shasm -> sheet pipeline orchestration.
//!
//! The translator itself is pure text-to-text; this module owns the impure
//! edges: invoking `clang` to produce the IR, reading and writing artifact
//! files, and running the native assembler. Each stage either completes or
//! fails with no partial output — shasm is emitted to a string before
//! anything touches the filesystem.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::info;
use thiserror::Error;

use crate::asm::{assemble, AssembleError};
use crate::ir::{parse_llvm_ir, ParseError};
use crate::lower::{emit_shasm, EmitError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error("Unsupported optimization level: {level}")]
    UnsupportedOptLevel { level: String },

    #[error("{clang_bin} failed with {status}: {stderr}")]
    Clang {
        clang_bin: String,
        status: String,
        stderr: String,
    },

    #[error("LLVM IR file not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Cannot emit a sheet without shasm output")]
    SheetWithoutAsm,
}

/// Uppercase an optimization level and drop a leading dash; only the levels
/// clang accepts pass through.
pub fn normalize_opt_level(opt_level: &str) -> Result<String, PipelineError> {
    let mut level = opt_level.trim().to_uppercase();
    if let Some(rest) = level.strip_prefix('-') {
        level = rest.to_string();
    }
    match level.as_str() {
        "O0" | "O1" | "O2" | "O3" | "OS" | "OZ" => Ok(level),
        _ => Err(PipelineError::UnsupportedOptLevel {
            level: opt_level.to_string(),
        }),
    }
}

/// Run `clang -S -emit-llvm` over `c_path`, writing textual IR to `ll_path`.
///
/// At `O0` the `optnone` attribute is disabled so the IR still contains the
/// straightforward alloca/load/store shape the backend recognizes.
pub fn compile_c_to_llvm(
    c_path: &Path,
    ll_path: &Path,
    clang_bin: &str,
    opt_level: &str,
) -> Result<(), PipelineError> {
    let level = normalize_opt_level(opt_level)?;
    ensure_parent_dir(ll_path)?;

    let mut command = Command::new(clang_bin);
    command.arg("-S").arg("-emit-llvm").arg(format!("-{level}"));
    if level == "O0" {
        command.args(["-Xclang", "-disable-O0-optnone"]);
    }
    command.arg(c_path).arg("-o").arg(ll_path);

    info!("running {clang_bin} on {}", c_path.display());
    let output = command.output()?;
    if !output.status.success() {
        return Err(PipelineError::Clang {
            clang_bin: clang_bin.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Translate an IR file to shasm, write it to `asm_path`, and return the
/// emitted text.
pub fn compile_llvm_to_shasm(ll_path: &Path, asm_path: &Path) -> Result<String, PipelineError> {
    let llvm_ir = fs::read_to_string(ll_path)?;
    let module = parse_llvm_ir(&llvm_ir, &ll_path.display().to_string())?;
    let asm = emit_shasm(&module)?;
    ensure_parent_dir(asm_path)?;
    fs::write(asm_path, &asm)?;
    info!("wrote shasm to {}", asm_path.display());
    Ok(asm)
}

/// Assemble a shasm file into an encoded sheet file.
pub fn assemble_shasm_to_sheet(asm_path: &Path, sheet_path: &Path) -> Result<(), PipelineError> {
    let asm = fs::read_to_string(asm_path)?;
    let sheet = assemble(&asm)?;
    ensure_parent_dir(sheet_path)?;
    fs::write(sheet_path, sheet)?;
    info!("wrote sheet to {}", sheet_path.display());
    Ok(())
}

/// Pipeline stage configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// IR output path; defaults to the C file with an `.ll` extension.
    pub ll_path: Option<PathBuf>,
    /// shasm output path; defaults to the C file with an `.asm` extension.
    pub asm_path: Option<PathBuf>,
    /// Run the clang stage.
    pub emit_ll: bool,
    /// Run the lowering stage.
    pub emit_asm: bool,
    pub clang_bin: String,
    pub opt_level: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            ll_path: None,
            asm_path: None,
            emit_ll: true,
            emit_asm: true,
            clang_bin: "clang".to_string(),
            opt_level: "O0".to_string(),
        }
    }
}

/// Artifact paths produced by [`run_pipeline`]; `None` for skipped stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArtifacts {
    pub ll_path: Option<PathBuf>,
    pub asm_path: Option<PathBuf>,
}

/// Run the configured stages over one C source file.
pub fn run_pipeline(
    c_path: &Path,
    options: &PipelineOptions,
) -> Result<PipelineArtifacts, PipelineError> {
    let ll_path = options
        .ll_path
        .clone()
        .unwrap_or_else(|| c_path.with_extension("ll"));
    let asm_path = options
        .asm_path
        .clone()
        .unwrap_or_else(|| c_path.with_extension("asm"));

    if options.emit_ll {
        compile_c_to_llvm(c_path, &ll_path, &options.clang_bin, &options.opt_level)?;
    }
    if options.emit_asm {
        if !ll_path.exists() {
            return Err(PipelineError::MissingInput { path: ll_path });
        }
        compile_llvm_to_shasm(&ll_path, &asm_path)?;
    }

    Ok(PipelineArtifacts {
        ll_path: options.emit_ll.then_some(ll_path),
        asm_path: options.emit_asm.then_some(asm_path),
    })
}

fn ensure_parent_dir(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
