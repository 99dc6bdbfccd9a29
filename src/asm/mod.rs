//! shasm assembler: label resolution and sheet encoding.
//!
//! The machine executes a grid ("sheet") of numeric rows. The assembler lays
//! shasm text out row by row: row 0 is reserved and patched to point at the
//! `_start` row, a `name = v v v` line materializes a data row and binds the
//! name, a `label:` line binds a name without materializing anything, and
//! every other line is an instruction row `[opcode, operand...]`. Names bind
//! to the index of the row *preceding* the bound one — cell addressing on
//! the machine is row-relative and the program counter advances before each
//! fetch, so the off-by-one is load-bearing and matches the machine.
//!
//! Operand tokens that parse as integers are literal words; anything else is
//! a reference resolved against the bound names after layout.

pub mod decode;

use hashbrown::HashMap;
use log::debug;
use thiserror::Error;

use crate::isa::Opcode;

/// Assembly failures, all fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("Unknown op '{op}'")]
    UnknownOp { op: String },

    #[error("Label '{label}' is already set")]
    DuplicateLabel { label: String },

    #[error("Label '{label}' not found")]
    UnknownLabel { label: String },
}

/// Words per encoded sheet cell.
const WORDS_PER_CELL: usize = 16666;

struct LabelRef {
    label: String,
    y: usize,
    x: usize,
}

/// Assemble shasm text into encoded sheet text.
pub fn assemble(source: &str) -> Result<String, AssembleError> {
    let rows = layout(source)?;
    debug!("assembled {} sheet row(s)", rows.len());
    Ok(encode_sheet(&rows))
}

/// Lay the program out as numeric rows with all references resolved.
pub fn layout(source: &str) -> Result<Vec<Vec<i64>>, AssembleError> {
    let mut rows: Vec<Vec<i64>> = vec![vec![0]];
    let mut labels: HashMap<String, i64> = HashMap::new();
    let mut refs = vec![LabelRef {
        label: "_start".to_string(),
        y: 0,
        x: 0,
    }];

    for line in source.lines() {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if let Some(cut) = tokens.iter().position(|t| t.starts_with('#')) {
            tokens.truncate(cut);
        }
        if tokens.is_empty() {
            continue;
        }

        if tokens.len() > 1 && tokens[1] == "=" {
            let y = rows.len();
            let row = tokens[2..]
                .iter()
                .enumerate()
                .map(|(x, token)| concretify(token, x, y, &mut refs))
                .collect();
            bind_label(&mut labels, tokens[0], y as i64 - 1)?;
            rows.push(row);
        } else if let Some(label) = tokens[0].strip_suffix(':') {
            bind_label(&mut labels, label, rows.len() as i64 - 1)?;
        } else {
            let opcode =
                Opcode::from_mnemonic(tokens[0]).ok_or_else(|| AssembleError::UnknownOp {
                    op: tokens[0].to_string(),
                })?;
            let y = rows.len();
            let mut row = vec![i64::from(opcode.code())];
            row.extend(
                tokens[1..]
                    .iter()
                    .enumerate()
                    .map(|(x, token)| concretify(token, x + 1, y, &mut refs)),
            );
            rows.push(row);
        }
    }

    for r in refs {
        let target = labels
            .get(&r.label)
            .copied()
            .ok_or(AssembleError::UnknownLabel { label: r.label })?;
        rows[r.y][r.x] = target;
    }
    Ok(rows)
}

fn bind_label(
    labels: &mut HashMap<String, i64>,
    label: &str,
    row: i64,
) -> Result<(), AssembleError> {
    if labels.contains_key(label) {
        return Err(AssembleError::DuplicateLabel {
            label: label.to_string(),
        });
    }
    labels.insert(label.to_string(), row);
    Ok(())
}

/// A literal token is a word value; anything else becomes a reference
/// placeholder patched after layout.
fn concretify(token: &str, x: usize, y: usize, refs: &mut Vec<LabelRef>) -> i64 {
    match token.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            refs.push(LabelRef {
                label: token.to_string(),
                y,
                x,
            });
            0
        }
    }
}

/// Encode resolved rows as sheet text: 16666 words per `[...]` cell, cells
/// tab-separated, rows newline-separated.
fn encode_sheet(rows: &[Vec<i64>]) -> String {
    rows.iter()
        .map(|row| {
            row.chunks(WORDS_PER_CELL)
                .map(encode_cell)
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pack words into one cell, three chars per 32-bit word: the high 15 bits,
/// the middle 15 bits, and the low 2 bits, each offset by 32 to stay in
/// printable range.
fn encode_cell(words: &[i64]) -> String {
    let mut cell = String::with_capacity(words.len() * 3 + 2);
    cell.push('[');
    for &word in words {
        let unsigned = word as u32;
        let a = (unsigned >> 17) & 0x7fff;
        let b = (unsigned >> 2) & 0x7fff;
        let c = unsigned & 0x3;
        for part in [a, b, c] {
            cell.push(char::from_u32(part + 32).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }
    cell.push(']');
    cell
}
