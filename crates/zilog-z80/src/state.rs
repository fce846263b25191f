//! CPU signal lines and decoder modes.

use bitflags::bitflags;

bitflags! {
    /// Signals latched on the CPU between steps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateFlags: u8 {
        /// RESET line asserted; the next step performs the reset sequence.
        const RESET = 0b0000_0001;
        /// HALT executed; the CPU idles until an interrupt.
        const HALTED = 0b0000_0010;
        /// Maskable interrupt line asserted.
        const INT = 0b0000_0100;
        /// Set by EI: no maskable interrupt after the next instruction.
        const INT_BLOCKED = 0b0000_1000;
        /// Non-maskable interrupt pending.
        const NMI = 0b0001_0000;
    }
}

/// Maskable interrupt mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptMode {
    #[default]
    Im0,
    Im1,
    Im2,
}

impl InterruptMode {
    /// The mode number as written in `IM n`.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Im0 => 0,
            Self::Im1 => 1,
            Self::Im2 => 2,
        }
    }
}

/// Which dispatch table decodes the next opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixMode {
    #[default]
    None,
    /// After $ED.
    Extended,
    /// After $CB.
    Bit,
    /// After $DD or $FD.
    Indexed,
}

/// Index register selected by the last DD/FD prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    #[default]
    None,
    Ix,
    Iy,
}
