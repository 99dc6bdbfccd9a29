//! Instruction selection and lowering from the IR subset to shasm.
//!
//! The target machine has no general registers: every value lives in a named
//! storage cell, and every instruction addresses cells by `(row, column)`.
//! Lowering therefore runs in two passes over the same [`Module`]:
//!
//! 1. a *declaration scan* that registers every storage cell the program
//!    will touch — allocations, SSA result cells, constant cells, and the
//!    scratch cells synthesized lowerings need — in first-discovery order;
//! 2. a *code emission* pass that rewrites each instruction into zero or
//!    more shasm lines, resolving operand tokens against the tables the
//!    scan populated.
//!
//! Operations the target lacks are synthesized: strict less-than becomes a
//! subtract-one plus `lte`, and `rotr32` expands to a four-instruction
//! shift/or sequence sharing a single `const_32` cell across the module.
//!
//! All state is owned by one [`Emitter`] per translation, so concurrent
//! translations never interfere, and everything order-observable (blocks,
//! declarations) lives in `Vec`s to keep output byte-deterministic.

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};
use thiserror::Error;

use crate::ir::{Instruction, Module};

/// One target storage location: a declared row plus a resolved column
/// operand indexing into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub row: String,
    pub col: String,
}

/// Lowering failures. These are structural rather than textual, so they
/// carry symbol/operator context instead of line numbers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Unsupported call target: {name}")]
    UnsupportedCallTarget { name: String },

    #[error("Unsupported {callee} arity: {arity}")]
    UnsupportedArity { callee: String, arity: usize },

    #[error("Unsupported {kind}: {name}")]
    UnsupportedOperator { kind: &'static str, name: String },

    #[error("Unknown value token: {token}")]
    UnknownValueToken { token: String },

    #[error("Unknown pointer token: {token}")]
    UnknownPointerToken { token: String },

    #[error("Unknown block label: {label}")]
    UnknownBlockLabel { label: String },

    #[error("Unsupported unaligned byte GEP offset: {offset} for stride {stride}")]
    UnalignedOffset { offset: i64, stride: u32 },

    #[error("Unsupported dynamic byte GEP offset for stride {stride}: {token}")]
    UnsupportedDynamicOffset { token: String, stride: u32 },
}

/// Lower `module` to shasm text: declaration lines first, then a `_start`
/// prologue jumping to the entry block, then each block in discovery order.
pub fn emit_shasm(module: &Module) -> Result<String, EmitError> {
    Emitter::new(module).emit()
}

/// Per-translation lowering state. Created fresh for every call to
/// [`emit_shasm`] and discarded afterwards.
struct Emitter<'m> {
    module: &'m Module,
    /// Constant pool: literal value -> constant cell name.
    const_cells: HashMap<i64, String>,
    /// Pointer symbol -> storage address.
    pointer_slots: HashMap<String, Address>,
    /// Pointer symbol -> element width in bytes (logical index stride).
    pointer_elem_bytes: HashMap<String, u32>,
    /// SSA result symbol -> value cell name.
    value_slots: HashMap<String, String>,
    /// Declaration lines in first-discovery order.
    declarations: Vec<String>,
    declared: HashSet<String>,
    /// Shared cell for the rotate expansion, declared lazily on first use.
    const_32: Option<String>,
    /// IR block label -> sanitized shasm label.
    block_labels: HashMap<String, String>,
}

impl<'m> Emitter<'m> {
    fn new(module: &'m Module) -> Self {
        let block_labels = module
            .blocks
            .iter()
            .map(|b| (b.label.clone(), sanitize_label(&b.label)))
            .collect();
        Emitter {
            module,
            const_cells: HashMap::new(),
            pointer_slots: HashMap::new(),
            pointer_elem_bytes: HashMap::new(),
            value_slots: HashMap::new(),
            declarations: Vec::new(),
            declared: HashSet::new(),
            const_32: None,
            block_labels,
        }
    }

    fn emit(mut self) -> Result<String, EmitError> {
        self.scan_declarations()?;

        let module = self.module;
        let mut body = Vec::new();
        body.push("_start:".to_string());
        body.push(format!("    jmp {}", self.block_label(&module.entry)?));

        for block in &module.blocks {
            body.push(format!("{}:", self.block_label(&block.label)?));
            for inst in &block.instructions {
                self.emit_instruction(inst, &mut body)?;
            }
        }

        debug!(
            "emitted {} declaration(s) and {} body line(s)",
            self.declarations.len(),
            body.len()
        );
        let mut lines = self.declarations;
        lines.extend(body);
        Ok(format!("{}\n", lines.join("\n")))
    }

    // ------------------------------------------------------------------
    // Pass 1: declaration scan
    // ------------------------------------------------------------------

    fn scan_declarations(&mut self) -> Result<(), EmitError> {
        self.declare_const(0);
        self.declare_const(1);
        // Reserved output cell; the return lowering copies into it.
        self.declare("out", "0");

        let module = self.module;
        for block in &module.blocks {
            for inst in &block.instructions {
                self.scan_instruction(inst)?;
            }
        }
        Ok(())
    }

    fn scan_instruction(&mut self, inst: &Instruction) -> Result<(), EmitError> {
        match inst {
            Instruction::AllocaScalar { result, bits } => {
                let row = slot_name(result);
                self.declare_zeroed(&row, 1);
                let col = self.declare_const(0);
                self.pointer_slots.insert(result.clone(), Address { row, col });
                self.pointer_elem_bytes
                    .insert(result.clone(), bits_to_bytes(*bits));
            }
            Instruction::AllocaArray { result, len, bits } => {
                let row = slot_name(result);
                self.declare_zeroed(&row, *len);
                let col = self.declare_const(0);
                self.pointer_slots.insert(result.clone(), Address { row, col });
                self.pointer_elem_bytes
                    .insert(result.clone(), bits_to_bytes(*bits));
            }
            Instruction::Load { result, ptr } => {
                self.declare_result(result);
                self.pointer(ptr)?;
            }
            Instruction::BinOp { result, lhs, rhs, .. } => {
                self.declare_result(result);
                self.value(lhs)?;
                self.value(rhs)?;
            }
            Instruction::ICmp {
                result, pred, lhs, rhs, ..
            } => {
                let row = self.declare_result(result);
                if pred == "slt" {
                    self.declare_zeroed(&format!("{row}_cmp_rhs_minus_1"), 1);
                }
                self.value(lhs)?;
                self.value(rhs)?;
            }
            Instruction::Cast { result, source } => {
                self.declare_result(result);
                self.value(source)?;
            }
            Instruction::Call {
                result,
                callee,
                args,
            } => {
                let row = self.declare_result(result);
                match callee.as_str() {
                    "rotr32" => {
                        check_arity(callee, args)?;
                        self.declare_zeroed(&format!("{row}_rot_shift"), 1);
                        self.declare_zeroed(&format!("{row}_rot_right"), 1);
                        self.declare_zeroed(&format!("{row}_rot_left"), 1);
                    }
                    "lshr32" => check_arity(callee, args)?,
                    _ => {
                        return Err(EmitError::UnsupportedCallTarget {
                            name: callee.clone(),
                        })
                    }
                }
                for arg in args {
                    self.value(arg)?;
                }
            }
            Instruction::Gep {
                result,
                base,
                index,
            } => {
                // Single-level addressing off an allocation: the resolved
                // index REPLACES the base column, it does not accumulate.
                let base_addr = self.pointer(base)?;
                let col = self.value(index)?;
                self.pointer_slots.insert(
                    result.clone(),
                    Address {
                        row: base_addr.row,
                        col,
                    },
                );
                let stride = self.stride(base);
                self.pointer_elem_bytes.insert(result.clone(), stride);
            }
            Instruction::GepByte {
                result,
                base,
                offset,
            } => {
                let base_addr = self.pointer(base)?;
                let col = self.byte_offset_to_index(base, offset)?;
                self.pointer_slots.insert(
                    result.clone(),
                    Address {
                        row: base_addr.row,
                        col,
                    },
                );
                let stride = self.stride(base);
                self.pointer_elem_bytes.insert(result.clone(), stride);
            }
            Instruction::Store { value, ptr } => {
                self.value(value)?;
                self.pointer(ptr)?;
            }
            Instruction::CondBr { cond, .. } => {
                self.value(cond)?;
            }
            Instruction::Br { .. } => {}
            Instruction::Ret { value } => {
                if let Some(token) = value {
                    self.value(token)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pass 2: code emission
    // ------------------------------------------------------------------

    fn emit_instruction(
        &mut self,
        inst: &Instruction,
        body: &mut Vec<String>,
    ) -> Result<(), EmitError> {
        trace!("lowering {inst:?}");
        match inst {
            // Address-forming instructions already did their work during the
            // declaration scan; they produce no code.
            Instruction::AllocaScalar { .. }
            | Instruction::AllocaArray { .. }
            | Instruction::Gep { .. }
            | Instruction::GepByte { .. } => {}

            Instruction::Load { result, ptr } => {
                let addr = self.pointer(ptr)?;
                let dst = self.result_slot(result)?;
                body.push(format!("    load {dst} {} {}", addr.row, addr.col));
            }
            Instruction::Store { value, ptr } => {
                let addr = self.pointer(ptr)?;
                let src = self.value(value)?;
                body.push(format!("    store {} {} {src}", addr.row, addr.col));
            }
            Instruction::BinOp {
                result,
                op,
                lhs,
                rhs,
            } => {
                let opcode = match op.as_str() {
                    "add" | "sub" | "mul" | "and" | "or" | "xor" | "shl" | "lshr" | "ashr" => op,
                    _ => {
                        return Err(EmitError::UnsupportedOperator {
                            kind: "arithmetic op",
                            name: op.clone(),
                        })
                    }
                };
                let dst = self.result_slot(result)?;
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                body.push(format!("    {opcode} {dst} {lhs} {rhs}"));
            }
            Instruction::ICmp {
                result,
                pred,
                lhs,
                rhs,
            } => match pred.as_str() {
                "sle" => {
                    let dst = self.result_slot(result)?;
                    let lhs = self.value(lhs)?;
                    let rhs = self.value(rhs)?;
                    body.push(format!("    lte {dst} {lhs} {rhs}"));
                }
                // No native strict less-than: compare against rhs - 1.
                "slt" => {
                    let dst = self.result_slot(result)?;
                    let scratch = format!("{dst}_cmp_rhs_minus_1");
                    let lhs = self.value(lhs)?;
                    let rhs = self.value(rhs)?;
                    let one = self.declare_const(1);
                    body.push(format!("    sub {scratch} {rhs} {one}"));
                    body.push(format!("    lte {dst} {lhs} {scratch}"));
                }
                _ => {
                    return Err(EmitError::UnsupportedOperator {
                        kind: "comparison predicate",
                        name: pred.clone(),
                    })
                }
            },
            Instruction::Call {
                result,
                callee,
                args,
            } => match callee.as_str() {
                "lshr32" => {
                    check_arity(callee, args)?;
                    let dst = self.result_slot(result)?;
                    let value = self.value(&args[0])?;
                    let amount = self.value(&args[1])?;
                    body.push(format!("    lshr {dst} {value} {amount}"));
                }
                // rotr32(x, n) = (x >> n) | (x << (32 - n)).
                "rotr32" => {
                    check_arity(callee, args)?;
                    let const_32 = match self.const_32.clone() {
                        Some(name) => name,
                        None => {
                            let name = self.declare_const(32);
                            self.const_32 = Some(name.clone());
                            name
                        }
                    };
                    let dst = self.result_slot(result)?;
                    let value = self.value(&args[0])?;
                    let amount = self.value(&args[1])?;
                    let shift = format!("{dst}_rot_shift");
                    let right = format!("{dst}_rot_right");
                    let left = format!("{dst}_rot_left");
                    body.push(format!("    sub {shift} {const_32} {amount}"));
                    body.push(format!("    lshr {right} {value} {amount}"));
                    body.push(format!("    shl {left} {value} {shift}"));
                    body.push(format!("    or {dst} {right} {left}"));
                }
                _ => {
                    return Err(EmitError::UnsupportedCallTarget {
                        name: callee.clone(),
                    })
                }
            },
            // One machine word, no type distinctions: every cast is an
            // identity move through add-with-0.
            Instruction::Cast { result, source } => {
                let dst = self.result_slot(result)?;
                let src = self.value(source)?;
                let zero = self.declare_const(0);
                body.push(format!("    add {dst} {src} {zero}"));
            }
            // Only a negated conditional jump exists, so the true edge needs
            // an explicit fallthrough jump.
            Instruction::CondBr {
                cond,
                then_label,
                else_label,
            } => {
                let cond = self.value(cond)?;
                let else_target = self.block_label(else_label)?.to_string();
                let then_target = self.block_label(then_label)?.to_string();
                body.push(format!("    jmp0 {cond} {else_target}"));
                body.push(format!("    jmp {then_target}"));
            }
            Instruction::Br { target } => {
                let target = self.block_label(target)?.to_string();
                body.push(format!("    jmp {target}"));
            }
            Instruction::Ret { value } => {
                if let Some(token) = value {
                    let src = self.value(token)?;
                    let zero = self.declare_const(0);
                    body.push(format!("    add out {src} {zero}"));
                }
                body.push("    halt".to_string());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations and operand resolution
    // ------------------------------------------------------------------

    /// Record a declaration line, once per cell name.
    fn declare(&mut self, name: &str, init: &str) {
        if !self.declared.insert(name.to_string()) {
            return;
        }
        self.declarations.push(format!("{name} = {init}"));
    }

    fn declare_zeroed(&mut self, name: &str, cells: usize) {
        let init = vec!["0"; cells.max(1)].join(" ");
        self.declare(name, &init);
    }

    /// Declare and bind the value cell for an SSA result symbol.
    fn declare_result(&mut self, result: &str) -> String {
        let row = slot_name(result);
        self.declare_zeroed(&row, 1);
        self.value_slots.insert(result.to_string(), row.clone());
        row
    }

    /// Constant pool lookup, declaring the cell on first use.
    fn declare_const(&mut self, value: i64) -> String {
        if let Some(name) = self.const_cells.get(&value) {
            return name.clone();
        }
        let name = if value < 0 {
            format!("const_neg_{}", value.unsigned_abs())
        } else {
            format!("const_{value}")
        };
        self.const_cells.insert(value, name.clone());
        self.declare(&name, &value.to_string());
        name
    }

    /// Resolve a value token: a literal becomes its constant cell, a symbol
    /// must already have a value cell.
    fn value(&mut self, token: &str) -> Result<String, EmitError> {
        let token = token.trim();
        if let Some(literal) = parse_literal(token) {
            return Ok(self.declare_const(literal));
        }
        self.value_slots
            .get(token)
            .cloned()
            .ok_or_else(|| EmitError::UnknownValueToken {
                token: token.to_string(),
            })
    }

    fn result_slot(&self, result: &str) -> Result<String, EmitError> {
        self.value_slots
            .get(result)
            .cloned()
            .ok_or_else(|| EmitError::UnknownValueToken {
                token: result.to_string(),
            })
    }

    fn pointer(&self, token: &str) -> Result<Address, EmitError> {
        let token = token.trim();
        self.pointer_slots
            .get(token)
            .cloned()
            .ok_or_else(|| EmitError::UnknownPointerToken {
                token: token.to_string(),
            })
    }

    fn stride(&self, base: &str) -> u32 {
        self.pointer_elem_bytes.get(base).copied().unwrap_or(1)
    }

    /// Convert a byte `getelementptr` offset into an element index.
    ///
    /// A literal offset must divide evenly by the base stride. A symbolic
    /// offset is only meaningful at stride 1, where the symbol's own value
    /// cell doubles as the index.
    fn byte_offset_to_index(&mut self, base: &str, offset: &str) -> Result<String, EmitError> {
        let token = offset.trim();
        let stride = self.stride(base);
        if let Some(byte_offset) = parse_literal(token) {
            if byte_offset % i64::from(stride) != 0 {
                return Err(EmitError::UnalignedOffset {
                    offset: byte_offset,
                    stride,
                });
            }
            return Ok(self.declare_const(byte_offset / i64::from(stride)));
        }
        if stride == 1 {
            return self.value(token);
        }
        Err(EmitError::UnsupportedDynamicOffset {
            token: token.to_string(),
            stride,
        })
    }

    fn block_label(&self, label: &str) -> Result<&str, EmitError> {
        self.block_labels
            .get(label)
            .map(String::as_str)
            .ok_or_else(|| EmitError::UnknownBlockLabel {
                label: label.to_string(),
            })
    }
}

fn check_arity(callee: &str, args: &[String]) -> Result<(), EmitError> {
    if args.len() != 2 {
        return Err(EmitError::UnsupportedArity {
            callee: callee.to_string(),
            arity: args.len(),
        });
    }
    Ok(())
}

/// Logical index stride for an `iN` element; sub-byte widths clamp to 1.
fn bits_to_bytes(bits: u32) -> u32 {
    (bits / 8).max(1)
}

/// Storage cell name for an IR symbol: `%t.1` -> `v_t_1`.
fn slot_name(symbol: &str) -> String {
    let stripped = symbol.trim_start_matches(['%', '@']);
    let safe: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("v_{safe}")
}

/// Rewrite an IR block label into a valid shasm label.
fn sanitize_label(label: &str) -> String {
    let safe: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if safe.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("bb_{safe}")
    } else {
        safe
    }
}

/// Recognize a decimal integer token (optional leading minus).
fn parse_literal(token: &str) -> Option<i64> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
