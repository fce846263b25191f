//! 256-entry opcode tables, one per prefix context, built at compile time.

use super::{Op, bit, extended, indexed, standard};

macro_rules! opcode_table {
    ($decode:path) => {{
        let mut table: [Op; 256] = [$decode(0); 256];
        let mut opcode = 0;
        while opcode < 256 {
            table[opcode] = $decode(opcode as u8);
            opcode += 1;
        }
        table
    }};
}

/// Unprefixed opcodes.
pub(crate) static STANDARD: [Op; 256] = opcode_table!(standard::decode);

/// After $ED.
pub(crate) static EXTENDED: [Op; 256] = opcode_table!(extended::decode);

/// After $CB.
pub(crate) static BIT: [Op; 256] = opcode_table!(bit::decode);

/// After $DD or $FD.
pub(crate) static INDEXED: [Op; 256] = opcode_table!(indexed::decode);

/// The final opcode of DD CB d op / FD CB d op.
pub(crate) static INDEXED_BIT: [Op; 256] = opcode_table!(bit::decode_indexed);

