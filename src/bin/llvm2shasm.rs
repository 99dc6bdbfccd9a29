//! CLI driver for the C -> LLVM IR -> shasm -> sheet pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use llvm2shasm::pipeline::{
    assemble_shasm_to_sheet, run_pipeline, PipelineError, PipelineOptions,
};

/// Compile C to LLVM IR and lower a minimal subset to shasm.
#[derive(Parser, Debug)]
#[command(name = "llvm2shasm", version)]
struct Args {
    /// Path to the C source file.
    c_file: PathBuf,

    /// LLVM IR output path (default: sibling .ll file).
    #[arg(long)]
    ll_out: Option<PathBuf>,

    /// shasm output path (default: sibling .asm file).
    #[arg(long)]
    asm_out: Option<PathBuf>,

    /// Optional encoded sheet output path.
    #[arg(long)]
    sheet_out: Option<PathBuf>,

    /// clang executable name or path.
    #[arg(long, default_value = "clang")]
    clang_bin: String,

    /// Optimization level passed to clang (O0..O3, Os, Oz).
    #[arg(long, default_value = "O0")]
    opt_level: String,

    /// Skip the clang stage and reuse an existing .ll file.
    #[arg(long)]
    no_emit_ll: bool,

    /// Skip the lowering stage.
    #[arg(long)]
    no_emit_asm: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), PipelineError> {
    let options = PipelineOptions {
        ll_path: args.ll_out.clone(),
        asm_path: args.asm_out.clone(),
        emit_ll: !args.no_emit_ll,
        emit_asm: !args.no_emit_asm,
        clang_bin: args.clang_bin.clone(),
        opt_level: args.opt_level.clone(),
    };

    let artifacts = run_pipeline(&args.c_file, &options)?;

    if let Some(ll_path) = &artifacts.ll_path {
        println!("LLVM IR: {}", ll_path.display());
    }
    if let Some(asm_path) = &artifacts.asm_path {
        println!("shasm: {}", asm_path.display());
    }

    if let Some(sheet_out) = &args.sheet_out {
        let asm_path = artifacts
            .asm_path
            .as_ref()
            .ok_or(PipelineError::SheetWithoutAsm)?;
        assemble_shasm_to_sheet(asm_path, sheet_out)?;
        println!("sheet: {}", sheet_out.display());
    }

    Ok(())
}
