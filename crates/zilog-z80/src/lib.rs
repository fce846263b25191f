//! Tact-accurate Z80 CPU engine.
//!
//! Each call to [`Z80::execute_cpu_cycle`] runs one whole instruction (or an
//! interrupt acknowledge, or one HALT idle cycle) against an
//! [`emu_core::Bus`], charging the documented tacts plus whatever contention
//! the bus reports.

mod alu;
mod cpu;
mod flags;
mod registers;
mod state;

pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::{Reg16, Reg8, Registers};
pub use state::{IndexMode, InterruptMode, PrefixMode, StateFlags};
