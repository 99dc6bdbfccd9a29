//! Sheet cell decoder for diagnostics.
//!
//! Inverts the cell encoding so an encoded row can be inspected as operand
//! words, with a best-effort disassembly back to mnemonics.

use thiserror::Error;

use crate::isa::Opcode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("cell text length {len} is not a multiple of 3")]
    TruncatedCell { len: usize },

    #[error("cell char {ch:?} is outside the encoded range")]
    InvalidCellChar { ch: char },
}

/// Decode one `[...]` cell (brackets optional) back into 32-bit words.
pub fn decode_cell(cell: &str) -> Result<Vec<u32>, DecodeError> {
    let inner = cell
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(cell);
    let chars: Vec<char> = inner.chars().collect();
    if chars.len() % 3 != 0 {
        return Err(DecodeError::TruncatedCell { len: chars.len() });
    }

    let mut words = Vec::with_capacity(chars.len() / 3);
    for triple in chars.chunks(3) {
        let a = part(triple[0], 0x7fff)?;
        let b = part(triple[1], 0x7fff)?;
        let c = part(triple[2], 0x3)?;
        words.push((a << 17) | (b << 2) | c);
    }
    Ok(words)
}

fn part(ch: char, max: u32) -> Result<u32, DecodeError> {
    let value = (ch as u32).checked_sub(32);
    match value {
        Some(v) if v <= max => Ok(v),
        _ => Err(DecodeError::InvalidCellChar { ch }),
    }
}

/// Decode one sheet line: tab-separated cells, concatenated into one row.
pub fn decode_row(line: &str) -> Result<Vec<u32>, DecodeError> {
    let mut words = Vec::new();
    for cell in line.split('\t') {
        words.extend(decode_cell(cell)?);
    }
    Ok(words)
}

/// Render a decoded instruction row as `mnemonic operand...`.
///
/// A row whose first word is not a known opcode is shown as raw data, which
/// is what declaration rows look like once encoded.
pub fn disassemble_row(words: &[u32]) -> String {
    match words.split_first() {
        None => String::from("<empty row>"),
        Some((&first, operands)) => match Opcode::from_code(first) {
            Some(op) => {
                let mut text = op.mnemonic().to_string();
                for operand in operands {
                    text.push(' ');
                    text.push_str(&operand.to_string());
                }
                text
            }
            None => {
                let cells: Vec<String> = words.iter().map(u32::to_string).collect();
                format!("data {}", cells.join(" "))
            }
        },
    }
}
