//! LLVM IR subset data structures.
//!
//! This module defines the in-memory form of the narrow LLVM IR subset the
//! backend accepts: a [`Module`] holding the basic blocks of the single
//! `@main` function, each block an ordered list of [`Instruction`]s. Operand
//! tokens are kept as source text (`%name`, `@name`, or a decimal literal);
//! the lowering pass resolves them against its own tables, so nothing here
//! depends on the target machine.

pub mod parser;

pub use parser::{parse_llvm_ir, ParseError};

/// One recognized IR instruction with tag-specific operand tokens.
///
/// Tokens are stored exactly as they appeared in the source (minus
/// surrounding whitespace); literal integers stay textual until the emitter
/// resolves them to constant cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `%p = alloca iN` — reserve one storage cell.
    AllocaScalar { result: String, bits: u32 },
    /// `%p = alloca [N x iM]` — reserve N storage cells.
    AllocaArray { result: String, len: usize, bits: u32 },
    /// `store iN <value>, ptr <ptr>` — value may be a symbol or a literal.
    Store { value: String, ptr: String },
    /// `%r = load iN, ptr <ptr>`.
    Load { result: String, ptr: String },
    /// `%r = <op> iN <lhs>, <rhs>` for the nine integer binary ops.
    BinOp {
        result: String,
        op: String,
        lhs: String,
        rhs: String,
    },
    /// `%r = icmp <pred> iN <lhs>, <rhs>`.
    ICmp {
        result: String,
        pred: String,
        lhs: String,
        rhs: String,
    },
    /// `%r = getelementptr i8, ptr <base>, iN <offset>` — byte addressing.
    GepByte {
        result: String,
        base: String,
        offset: String,
    },
    /// Two-index `getelementptr`; the leading zero index is discarded.
    Gep {
        result: String,
        base: String,
        index: String,
    },
    /// `%r = call iN @<callee>(<args>)`.
    Call {
        result: String,
        callee: String,
        args: Vec<String>,
    },
    /// `sext`/`zext`/`trunc`/`bitcast`, all reduced to a plain move.
    Cast { result: String, source: String },
    /// `br i1 <cond>, label %<then>, label %<else>`.
    CondBr {
        cond: String,
        then_label: String,
        else_label: String,
    },
    /// `br label %<target>`.
    Br { target: String },
    /// `ret iN <value>` or `ret void`.
    Ret { value: Option<String> },
}

/// A labeled basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

/// The parsed `@main` function: entry block label plus blocks in
/// first-appearance order.
///
/// Block order is part of the output contract — the emitter walks blocks in
/// exactly this order — so blocks live in a `Vec`, never a hash map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub entry: String,
    pub blocks: Vec<Block>,
}

impl Module {
    /// Look up a block by its IR label.
    pub fn block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }
}
