//! Line-oriented parser for the accepted LLVM IR subset.
//!
//! The parser scans the textual IR once, ignores everything outside the body
//! of `@main`, and matches each instruction line against an ordered table of
//! `(pattern, builder)` rules. Rule order is significant: the first
//! structural match wins, so the array `alloca` form must be tried before the
//! scalar one and the byte `getelementptr` form before the generic two-index
//! form. Anything that matches no rule is a hard error carrying the source
//! name and 1-based line number in a `path:line:` prefix, which keeps the
//! message clickable in editors and terminals.

use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};
use thiserror::Error;

use super::{Block, Instruction, Module};

/// Parse failures, all fatal. Line-carrying variants render with a
/// `source:line:` prefix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{source_name}:{line}: Unsupported LLVM instruction: {text}")]
    UnsupportedInstruction {
        source_name: String,
        line: usize,
        text: String,
    },

    #[error("{source_name}:{line}: Unsupported call argument: {text}")]
    UnsupportedCallArgument {
        source_name: String,
        line: usize,
        text: String,
    },

    #[error("no parseable `main` function blocks found in {source_name}")]
    EmptyModule { source_name: String },
}

/// Why a single line failed, before source position is attached.
enum BadLine {
    Unsupported,
    CallArgument(String),
}

/// Parse the body of `@main` out of `text` into a [`Module`].
///
/// Lines before the `define ... @main` header and after the closing `}` are
/// ignored, as are blank lines and `;` comments. An instruction appearing
/// before any label is placed in an implicit `entry` block.
pub fn parse_llvm_ir(text: &str, source_name: &str) -> Result<Module, ParseError> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut index: hashbrown::HashMap<String, usize> = hashbrown::HashMap::new();
    let mut current: Option<usize> = None;
    let mut in_main = false;

    for (line_idx, raw) in text.lines().enumerate() {
        let line_number = line_idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if line.starts_with("define ") && line.contains("@main") {
            debug!("{source_name}:{line_number}: entering @main body");
            in_main = true;
            continue;
        }
        if !in_main {
            continue;
        }
        if line == "}" {
            break;
        }

        if let Some(caps) = LABEL.captures(line) {
            current = Some(open_block(&mut blocks, &mut index, &caps[1]));
            continue;
        }

        let block = match current {
            Some(idx) => idx,
            None => {
                let idx = open_block(&mut blocks, &mut index, "entry");
                current = Some(idx);
                idx
            }
        };

        match parse_instruction(line) {
            Ok(Some(inst)) => blocks[block].instructions.push(inst),
            Ok(None) => {}
            Err(BadLine::Unsupported) => {
                return Err(ParseError::UnsupportedInstruction {
                    source_name: source_name.to_string(),
                    line: line_number,
                    text: line.to_string(),
                })
            }
            Err(BadLine::CallArgument(token)) => {
                return Err(ParseError::UnsupportedCallArgument {
                    source_name: source_name.to_string(),
                    line: line_number,
                    text: token,
                })
            }
        }
    }

    if blocks.is_empty() {
        return Err(ParseError::EmptyModule {
            source_name: source_name.to_string(),
        });
    }

    let entry = if index.contains_key("entry") {
        "entry".to_string()
    } else {
        blocks[0].label.clone()
    };
    debug!(
        "parsed {} block(s) from {source_name}, entry = {entry}",
        blocks.len()
    );
    Ok(Module { entry, blocks })
}

/// Register a (possibly empty) block, reusing it if the label reappears.
fn open_block(
    blocks: &mut Vec<Block>,
    index: &mut hashbrown::HashMap<String, usize>,
    label: &str,
) -> usize {
    if let Some(&idx) = index.get(label) {
        return idx;
    }
    let idx = blocks.len();
    blocks.push(Block {
        label: label.to_string(),
        instructions: Vec::new(),
    });
    index.insert(label.to_string(), idx);
    idx
}

/// Match one instruction line against the rule table.
///
/// `Ok(None)` means the line is recognized but contributes nothing: a bare
/// `call` with no assigned result is a no-op in this subset.
fn parse_instruction(line: &str) -> Result<Option<Instruction>, BadLine> {
    for (pattern, builder) in RULES.iter() {
        if let Some(caps) = pattern.captures(line) {
            return builder(&caps).map(Some);
        }
    }

    if line.starts_with("call ") {
        return Ok(None);
    }
    if line.starts_with("ret void") {
        return Ok(Some(Instruction::Ret { value: None }));
    }

    Err(BadLine::Unsupported)
}

/// Valid LLVM local/global symbol, e.g. `%t3` or `@main`.
const NAME: &str = r"[%@][A-Za-z$._0-9-]+";

type Builder = fn(&Captures) -> Result<Instruction, BadLine>;

lazy_static! {
    static ref LABEL: Regex = Regex::new(r"^([A-Za-z$._0-9-]+):").unwrap();
    static ref CALL_ARG_TAIL: Regex =
        Regex::new(&format!(r"({NAME}|-?\d+)\s*$")).unwrap();

    /// The instruction-selection table. First structural match wins.
    static ref RULES: Vec<(Regex, Builder)> = vec![
        rule(
            &format!(r"^({NAME})\s*=\s*alloca\s+\[(\d+)\s+x\s+i(\d+)\].*$"),
            build_alloca_array,
        ),
        rule(
            &format!(r"^({NAME})\s*=\s*alloca\s+i(\d+).*$"),
            build_alloca_scalar,
        ),
        rule(r"^store\s+i\d+\s+([^,]+),\s+ptr\s+([^,]+).*$", build_store),
        rule(
            &format!(r"^({NAME})\s*=\s*load\s+i\d+,\s+ptr\s+([^,]+).*$"),
            build_load,
        ),
        rule(
            &format!(
                r"^({NAME})\s*=\s*(add|sub|mul|and|or|xor|shl|lshr|ashr)\b(?:\s+\w+)*\s+i\d+\s+([^,]+),\s+(.+)$"
            ),
            build_binop,
        ),
        rule(
            &format!(r"^({NAME})\s*=\s*icmp\s+(\w+)\s+i\d+\s+([^,]+),\s+(.+)$"),
            build_icmp,
        ),
        rule(
            &format!(r"^({NAME})\s*=\s*getelementptr\b.*\bi8,\s+ptr\s+([^,]+),\s+i\d+\s+(.+)$"),
            build_gep_byte,
        ),
        rule(
            &format!(
                r"^({NAME})\s*=\s*getelementptr\b.*,\s+ptr\s+({NAME}),\s+i\d+\s+([^,]+),\s+i\d+\s+(.+)$"
            ),
            build_gep,
        ),
        rule(
            &format!(r"^({NAME})\s*=\s*call\s+i\d+\s+@([A-Za-z$._0-9-]+)\((.*)\).*$"),
            build_call,
        ),
        rule(
            &format!(r"^({NAME})\s*=\s*(?:sext|zext|trunc|bitcast)\b.*\s+({NAME}|-?\d+)\s+to\s+.*$"),
            build_cast,
        ),
        rule(
            &format!(r"^br\s+i1\s+([^,]+),\s+label\s+%([^,]+),\s+label\s+%([A-Za-z$._0-9-]+).*$"),
            build_cond_br,
        ),
        rule(r"^br\s+label\s+%([A-Za-z$._0-9-]+).*$", build_br),
        rule(r"^ret\s+\w+\s+(.+)$", build_ret),
    ];
}

fn rule(pattern: &str, builder: Builder) -> (Regex, Builder) {
    (Regex::new(pattern).unwrap(), builder)
}

fn sym(caps: &Captures, group: usize) -> String {
    caps[group].trim().to_string()
}

fn int<T: std::str::FromStr>(caps: &Captures, group: usize) -> Result<T, BadLine> {
    caps[group].trim().parse().map_err(|_| BadLine::Unsupported)
}

fn build_alloca_array(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::AllocaArray {
        result: sym(caps, 1),
        len: int(caps, 2)?,
        bits: int(caps, 3)?,
    })
}

fn build_alloca_scalar(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::AllocaScalar {
        result: sym(caps, 1),
        bits: int(caps, 2)?,
    })
}

fn build_store(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::Store {
        value: sym(caps, 1),
        ptr: sym(caps, 2),
    })
}

fn build_load(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::Load {
        result: sym(caps, 1),
        ptr: sym(caps, 2),
    })
}

fn build_binop(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::BinOp {
        result: sym(caps, 1),
        op: sym(caps, 2),
        lhs: sym(caps, 3),
        rhs: sym(caps, 4),
    })
}

fn build_icmp(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::ICmp {
        result: sym(caps, 1),
        pred: sym(caps, 2),
        lhs: sym(caps, 3),
        rhs: sym(caps, 4),
    })
}

fn build_gep_byte(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::GepByte {
        result: sym(caps, 1),
        base: sym(caps, 2),
        offset: sym(caps, 3),
    })
}

fn build_gep(caps: &Captures) -> Result<Instruction, BadLine> {
    // Group 3 is the leading struct/array index; single-level addressing off
    // an allocation only ever sees 0 there, so it is dropped.
    Ok(Instruction::Gep {
        result: sym(caps, 1),
        base: sym(caps, 2),
        index: sym(caps, 4),
    })
}

fn build_call(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::Call {
        result: sym(caps, 1),
        callee: caps[2].to_string(),
        args: parse_call_args(&caps[3])?,
    })
}

/// Reduce each comma-separated call argument to its trailing value token,
/// shedding type annotations and attributes.
fn parse_call_args(arg_text: &str) -> Result<Vec<String>, BadLine> {
    let mut args = Vec::new();
    for raw in arg_text.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }
        match CALL_ARG_TAIL.captures(token) {
            Some(caps) => args.push(sym(&caps, 1)),
            None => return Err(BadLine::CallArgument(token.to_string())),
        }
    }
    Ok(args)
}

fn build_cast(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::Cast {
        result: sym(caps, 1),
        source: sym(caps, 2),
    })
}

fn build_cond_br(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::CondBr {
        cond: sym(caps, 1),
        then_label: sym(caps, 2),
        else_label: sym(caps, 3),
    })
}

fn build_br(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::Br {
        target: sym(caps, 1),
    })
}

fn build_ret(caps: &Captures) -> Result<Instruction, BadLine> {
    Ok(Instruction::Ret {
        value: Some(sym(caps, 1)),
    })
}
