//! The target machine's instruction set.
//!
//! Nineteen mnemonics with fixed opcode numbers. The lowering engine only
//! ever produces the direct-addressed subset; the `_a` address-indirect
//! variants exist in the machine and must still assemble and disassemble.

/// One target opcode. The discriminant is the encoded opcode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// Less-or-equal compare; also spelled `<=` in hand-written shasm.
    Lte = 0,
    Add = 1,
    Load = 2,
    LoadA = 3,
    Store = 4,
    StoreA = 5,
    /// Jump when the operand cell is zero (the only conditional jump).
    Jmp0 = 6,
    Jmp0A = 7,
    Jmp = 8,
    JmpA = 9,
    Halt = 10,
    Sub = 11,
    Mul = 12,
    And = 13,
    Or = 14,
    Xor = 15,
    Shl = 16,
    Lshr = 17,
    Ashr = 18,
}

/// Every opcode, in opcode-number order.
pub const OPCODES: [Opcode; 19] = [
    Opcode::Lte,
    Opcode::Add,
    Opcode::Load,
    Opcode::LoadA,
    Opcode::Store,
    Opcode::StoreA,
    Opcode::Jmp0,
    Opcode::Jmp0A,
    Opcode::Jmp,
    Opcode::JmpA,
    Opcode::Halt,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Shl,
    Opcode::Lshr,
    Opcode::Ashr,
];

impl Opcode {
    /// Encoded opcode number.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Canonical mnemonic as the lowering engine emits it.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lte => "lte",
            Opcode::Add => "add",
            Opcode::Load => "load",
            Opcode::LoadA => "load_a",
            Opcode::Store => "store",
            Opcode::StoreA => "store_a",
            Opcode::Jmp0 => "jmp0",
            Opcode::Jmp0A => "jmp0_a",
            Opcode::Jmp => "jmp",
            Opcode::JmpA => "jmp_a",
            Opcode::Halt => "halt",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Lshr => "lshr",
            Opcode::Ashr => "ashr",
        }
    }

    /// Resolve an assembly mnemonic, including the `<=` alias for `lte`.
    pub fn from_mnemonic(token: &str) -> Option<Opcode> {
        match token {
            "<=" => Some(Opcode::Lte),
            _ => OPCODES.iter().copied().find(|op| op.mnemonic() == token),
        }
    }

    /// Resolve an encoded opcode number.
    pub fn from_code(code: u32) -> Option<Opcode> {
        OPCODES.get(code as usize).copied()
    }
}
