//! llvm2shasm - LLVM IR to spreadsheet-machine assembly.
//!
//! The target is a tiny machine with a memory-addressed instruction set and
//! no general registers: every value and pointer is a named storage cell.
//! This crate translates a narrow, fixed subset of textual LLVM IR — the
//! control-flow graph of a single `@main` function — into that machine's
//! assembly ("shasm"), then optionally assembles it into the grid-encoded
//! sheet the machine executes.
//!
//! # Primary usage
//!
//! ```
//! use llvm2shasm::{emit_shasm, parse_llvm_ir};
//!
//! let ir = r#"
//! define i64 @main() {
//! entry:
//!   ret i64 7
//! }
//! "#;
//! let module = parse_llvm_ir(ir, "demo.ll").unwrap();
//! let asm = emit_shasm(&module).unwrap();
//! assert!(asm.contains("halt"));
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - IR subset data model and line-oriented parser
//! - [`lower`] - declaration scan and instruction lowering to shasm
//! - [`isa`] - the 19-opcode target instruction set
//! - [`asm`] - shasm assembler, sheet encoding, and diagnostics decoder
//! - [`pipeline`] - clang invocation and artifact orchestration

pub mod asm;
pub mod ir;
pub mod isa;
pub mod lower;
pub mod pipeline;

pub use asm::{assemble, AssembleError};
pub use ir::{parse_llvm_ir, Block, Instruction, Module, ParseError};
pub use isa::Opcode;
pub use lower::{emit_shasm, Address, EmitError};
pub use pipeline::{run_pipeline, PipelineArtifacts, PipelineError, PipelineOptions};
