//! Z80 CPU core.
//!
//! The engine executes one whole instruction (or one interrupt acknowledge,
//! or one HALT idle cycle) per call to [`Z80::execute_cpu_cycle`]. Every bus
//! access is timed individually: the bus is asked for contention before each
//! memory access and before each internal cycle that keeps an address on the
//! bus, so the tact counter ends up exact on contended machines.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]

mod bit;
mod dispatch;
mod extended;
mod indexed;
mod standard;

use emu_core::{Bus, BusError, Observable, Value};

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::registers::Registers;
use crate::state::{IndexMode, InterruptMode, PrefixMode, StateFlags};

/// Opcode handler. The opcode byte is passed so one handler can serve a
/// whole decoded group.
pub(crate) type Op = fn(&mut Z80, &mut dyn Bus, u8) -> Result<(), BusError>;

/// Z80 CPU.
#[derive(Debug, Clone, Default)]
pub struct Z80 {
    pub(crate) regs: Registers,
    pub(crate) iff1: bool,
    pub(crate) iff2: bool,
    pub(crate) im: InterruptMode,
    pub(crate) state: StateFlags,
    pub(crate) prefix: PrefixMode,
    pub(crate) index: IndexMode,
    pub(crate) tacts: u64,
    /// Flags written by the current instruction (0 if it left F alone).
    q: u8,
    /// `q` as it stood after the previous instruction.
    last_q: u8,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Power-on reset: every register, flag, mode and counter to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // =========================================================================
    // Step
    // =========================================================================

    /// Run one step: a pending reset, NMI or maskable interrupt, one HALT
    /// idle cycle, or one instruction (with all its prefixes).
    ///
    /// # Errors
    ///
    /// Propagates the first device failure reported by the bus. Tacts spent
    /// before the failure stay on the counter.
    pub fn execute_cpu_cycle(&mut self, bus: &mut dyn Bus) -> Result<(), BusError> {
        if self.state.contains(StateFlags::RESET) {
            self.reset_signal();
            return Ok(());
        }

        let blocked = self.state.contains(StateFlags::INT_BLOCKED);
        self.state.remove(StateFlags::INT_BLOCKED);

        if self.prefix == PrefixMode::None {
            if self.state.contains(StateFlags::NMI) {
                return self.accept_nmi(bus);
            }
            if self.state.contains(StateFlags::INT) && self.iff1 && !blocked {
                return self.accept_interrupt(bus);
            }
        }

        if self.state.contains(StateFlags::HALTED) {
            self.tacts += 4;
            self.regs.increment_r();
            return Ok(());
        }

        self.execute_instruction(bus)
    }

    /// RESET line: clears control state but keeps the general-purpose
    /// registers.
    fn reset_signal(&mut self) {
        self.regs.set_pc(0);
        self.regs.set_sp(0);
        self.regs.set_ir(0);
        self.regs.set_wz(0);
        self.iff1 = false;
        self.iff2 = false;
        self.im = InterruptMode::Im0;
        self.prefix = PrefixMode::None;
        self.index = IndexMode::None;
        self.state = StateFlags::empty();
        self.tacts = 0;
        self.q = 0;
        self.last_q = 0;
    }

    fn execute_instruction(&mut self, bus: &mut dyn Bus) -> Result<(), BusError> {
        self.last_q = self.q;
        self.q = 0;

        loop {
            let opcode = self.fetch_opcode(bus)?;
            let table = match self.prefix {
                PrefixMode::None => &dispatch::STANDARD,
                PrefixMode::Extended => &dispatch::EXTENDED,
                PrefixMode::Bit => &dispatch::BIT,
                PrefixMode::Indexed => &dispatch::INDEXED,
            };
            let superseded = self.prefix == PrefixMode::Indexed && matches!(opcode, 0xDD | 0xFD);
            self.prefix = PrefixMode::None;
            table[usize::from(opcode)](self, bus, opcode)?;

            // A second index prefix replaces the first and ends this step.
            if superseded {
                return Ok(());
            }
            if self.prefix == PrefixMode::None {
                break;
            }
        }

        self.index = IndexMode::None;
        Ok(())
    }

    fn accept_nmi(&mut self, bus: &mut dyn Bus) -> Result<(), BusError> {
        self.leave_halt();
        self.state.remove(StateFlags::NMI);
        self.iff1 = false;
        self.regs.increment_r();
        self.tacts += 5;
        self.push(bus, self.regs.pc())?;
        self.regs.set_pc(0x0066);
        self.regs.set_wz(0x0066);
        Ok(())
    }

    fn accept_interrupt(&mut self, bus: &mut dyn Bus) -> Result<(), BusError> {
        self.leave_halt();
        self.iff1 = false;
        self.iff2 = false;
        self.regs.increment_r();
        self.tacts += 7;
        self.push(bus, self.regs.pc())?;

        let target = if self.im == InterruptMode::Im2 {
            let vector = (u16::from(self.regs.i()) << 8) | u16::from(bus.interrupt_data());
            self.read_word(bus, vector)?
        } else {
            0x0038
        };
        self.regs.set_pc(target);
        self.regs.set_wz(target);
        Ok(())
    }

    /// HALT leaves PC on the HALT opcode; acceptance resumes after it.
    fn leave_halt(&mut self) {
        if self.state.contains(StateFlags::HALTED) {
            self.state.remove(StateFlags::HALTED);
            self.regs.set_pc(self.regs.pc().wrapping_add(1));
        }
    }

    // =========================================================================
    // Timed bus access
    // =========================================================================

    fn contend(&mut self, bus: &mut dyn Bus, address: u16) {
        self.tacts += u64::from(bus.memory_contention(address, self.tacts));
    }

    /// M1: opcode fetch at PC, 4 tacts, refresh counter advances.
    pub(crate) fn fetch_opcode(&mut self, bus: &mut dyn Bus) -> Result<u8, BusError> {
        let pc = self.regs.pc();
        self.contend(bus, pc);
        let opcode = bus.read(pc)?;
        self.tacts += 4;
        self.regs.set_pc(pc.wrapping_add(1));
        self.regs.increment_r();
        Ok(opcode)
    }

    pub(crate) fn read_byte(&mut self, bus: &mut dyn Bus, address: u16) -> Result<u8, BusError> {
        self.contend(bus, address);
        let value = bus.read(address)?;
        self.tacts += 3;
        Ok(value)
    }

    pub(crate) fn write_byte(
        &mut self,
        bus: &mut dyn Bus,
        address: u16,
        value: u8,
    ) -> Result<(), BusError> {
        self.contend(bus, address);
        bus.write(address, value)?;
        self.tacts += 3;
        Ok(())
    }

    pub(crate) fn read_word(&mut self, bus: &mut dyn Bus, address: u16) -> Result<u16, BusError> {
        let lo = self.read_byte(bus, address)?;
        let hi = self.read_byte(bus, address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    pub(crate) fn write_word(
        &mut self,
        bus: &mut dyn Bus,
        address: u16,
        value: u16,
    ) -> Result<(), BusError> {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(bus, address, lo)?;
        self.write_byte(bus, address.wrapping_add(1), hi)
    }

    /// Operand byte at PC.
    pub(crate) fn fetch_byte(&mut self, bus: &mut dyn Bus) -> Result<u8, BusError> {
        let pc = self.regs.pc();
        self.regs.set_pc(pc.wrapping_add(1));
        self.read_byte(bus, pc)
    }

    /// Little-endian operand word at PC.
    pub(crate) fn fetch_word(&mut self, bus: &mut dyn Bus) -> Result<u16, BusError> {
        let lo = self.fetch_byte(bus)?;
        let hi = self.fetch_byte(bus)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// `count` single-tact internal cycles with `address` on the bus.
    pub(crate) fn internal(&mut self, bus: &mut dyn Bus, address: u16, count: u8) {
        for _ in 0..count {
            self.contend(bus, address);
            self.tacts += 1;
        }
    }

    /// Internal cycles that keep IR on the bus.
    pub(crate) fn internal_ir(&mut self, bus: &mut dyn Bus, count: u8) {
        self.internal(bus, self.regs.ir(), count);
    }

    pub(crate) fn push(&mut self, bus: &mut dyn Bus, value: u16) -> Result<(), BusError> {
        let [lo, hi] = value.to_le_bytes();
        let sp = self.regs.sp().wrapping_sub(1);
        self.write_byte(bus, sp, hi)?;
        let sp = sp.wrapping_sub(1);
        self.write_byte(bus, sp, lo)?;
        self.regs.set_sp(sp);
        Ok(())
    }

    pub(crate) fn pop(&mut self, bus: &mut dyn Bus) -> Result<u16, BusError> {
        let sp = self.regs.sp();
        let value = self.read_word(bus, sp)?;
        self.regs.set_sp(sp.wrapping_add(2));
        Ok(value)
    }

    pub(crate) fn port_in(&mut self, bus: &mut dyn Bus, port: u16) -> Result<u8, BusError> {
        self.tacts += u64::from(bus.port_contention(port, self.tacts));
        let value = bus.read_port(port)?;
        self.tacts += 4;
        Ok(value)
    }

    pub(crate) fn port_out(
        &mut self,
        bus: &mut dyn Bus,
        port: u16,
        value: u8,
    ) -> Result<(), BusError> {
        self.tacts += u64::from(bus.port_contention(port, self.tacts));
        bus.write_port(port, value)?;
        self.tacts += 4;
        Ok(())
    }

    // =========================================================================
    // Register helpers shared by the dispatch tables
    // =========================================================================

    /// Write F and latch it for SCF/CCF.
    pub(crate) fn set_f(&mut self, value: u8) {
        self.regs.set_f(value);
        self.q = value;
    }

    pub(crate) fn last_q(&self) -> u8 {
        self.last_q
    }

    /// HL, or IX/IY under an index prefix.
    pub(crate) fn hl_or_index(&self) -> u16 {
        match self.index {
            IndexMode::None => self.regs.hl(),
            IndexMode::Ix => self.regs.ix(),
            IndexMode::Iy => self.regs.iy(),
        }
    }

    pub(crate) fn set_hl_or_index(&mut self, value: u16) {
        match self.index {
            IndexMode::None => self.regs.set_hl(value),
            IndexMode::Ix => self.regs.set_ix(value),
            IndexMode::Iy => self.regs.set_iy(value),
        }
    }

    /// 8-bit register by its 3-bit opcode encoding (B C D E H L - A). H and
    /// L follow the index prefix. Code 6 is memory and never reaches here.
    pub(crate) fn reg8(&self, code: u8) -> u8 {
        match code & 7 {
            0 => self.regs.b(),
            1 => self.regs.c(),
            2 => self.regs.d(),
            3 => self.regs.e(),
            4 => (self.hl_or_index() >> 8) as u8,
            5 => self.hl_or_index() as u8,
            _ => self.regs.a(),
        }
    }

    pub(crate) fn set_reg8(&mut self, code: u8, value: u8) {
        match code & 7 {
            0 => self.regs.set_b(value),
            1 => self.regs.set_c(value),
            2 => self.regs.set_d(value),
            3 => self.regs.set_e(value),
            4 => {
                let pair = self.hl_or_index();
                self.set_hl_or_index((pair & 0x00FF) | (u16::from(value) << 8));
            }
            5 => {
                let pair = self.hl_or_index();
                self.set_hl_or_index((pair & 0xFF00) | u16::from(value));
            }
            _ => self.regs.set_a(value),
        }
    }

    /// Register pair by its 2-bit encoding with SP in slot 3.
    pub(crate) fn reg16(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.hl_or_index(),
            _ => self.regs.sp(),
        }
    }

    pub(crate) fn set_reg16(&mut self, code: u8, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl_or_index(value),
            _ => self.regs.set_sp(value),
        }
    }

    /// Register pair by its 2-bit encoding with AF in slot 3 (PUSH/POP).
    pub(crate) fn reg16_af(&self, code: u8) -> u16 {
        if code & 3 == 3 {
            self.regs.af()
        } else {
            self.reg16(code)
        }
    }

    pub(crate) fn set_reg16_af(&mut self, code: u8, value: u16) {
        if code & 3 == 3 {
            self.regs.set_af(value);
        } else {
            self.set_reg16(code, value);
        }
    }

    /// Condition code by its 3-bit encoding: NZ Z NC C PO PE P M.
    pub(crate) fn condition(&self, code: u8) -> bool {
        let f = self.regs.f();
        match code & 7 {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    // =========================================================================
    // Accessors and harness setters
    // =========================================================================

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub fn tacts(&self) -> u64 {
        self.tacts
    }

    pub fn set_tacts(&mut self, tacts: u64) {
        self.tacts = tacts;
    }

    #[must_use]
    pub fn iff1(&self) -> bool {
        self.iff1
    }

    #[must_use]
    pub fn iff2(&self) -> bool {
        self.iff2
    }

    pub fn set_iff(&mut self, iff1: bool, iff2: bool) {
        self.iff1 = iff1;
        self.iff2 = iff2;
    }

    #[must_use]
    pub fn interrupt_mode(&self) -> InterruptMode {
        self.im
    }

    pub fn set_interrupt_mode(&mut self, mode: InterruptMode) {
        self.im = mode;
    }

    #[must_use]
    pub fn state_flags(&self) -> StateFlags {
        self.state
    }

    pub fn set_state_flags(&mut self, flags: StateFlags) {
        self.state = flags;
    }

    #[must_use]
    pub fn prefix_mode(&self) -> PrefixMode {
        self.prefix
    }

    pub fn set_prefix_mode(&mut self, mode: PrefixMode) {
        self.prefix = mode;
    }

    #[must_use]
    pub fn index_mode(&self) -> IndexMode {
        self.index
    }

    pub fn set_index_mode(&mut self, mode: IndexMode) {
        self.index = mode;
    }

    /// F as written by the last instruction, or 0 if it left F alone. SCF
    /// and CCF read it.
    #[must_use]
    pub fn flags_latch(&self) -> u8 {
        self.q
    }

    pub fn set_flags_latch(&mut self, q: u8) {
        self.q = q;
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state.contains(StateFlags::HALTED)
    }

    /// Suppress maskable interrupts until after the next instruction.
    pub fn block_interrupt(&mut self) {
        self.state.insert(StateFlags::INT_BLOCKED);
    }

    pub fn raise_interrupt(&mut self) {
        self.state.insert(StateFlags::INT);
    }

    pub fn revoke_interrupt(&mut self) {
        self.state.remove(StateFlags::INT);
    }

    pub fn signal_nmi(&mut self) {
        self.state.insert(StateFlags::NMI);
    }

    /// Assert RESET; honoured at the start of the next step.
    pub fn signal_reset(&mut self) {
        self.state.insert(StateFlags::RESET);
    }
}

const QUERY_PATHS: &[&str] = &[
    "pc",
    "sp",
    "af",
    "bc",
    "de",
    "hl",
    "ix",
    "iy",
    "ir",
    "wz",
    "af'",
    "bc'",
    "de'",
    "hl'",
    "a",
    "f",
    "b",
    "c",
    "d",
    "e",
    "h",
    "l",
    "i",
    "r",
    "flags.s",
    "flags.z",
    "flags.y",
    "flags.h",
    "flags.x",
    "flags.pv",
    "flags.n",
    "flags.c",
    "iff1",
    "iff2",
    "im",
    "halted",
    "tacts",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let regs = &self.regs;
        let flag = |mask: u8| Value::Bool(regs.f() & mask != 0);
        let value = match path {
            "pc" => regs.pc().into(),
            "sp" => regs.sp().into(),
            "af" => regs.af().into(),
            "bc" => regs.bc().into(),
            "de" => regs.de().into(),
            "hl" => regs.hl().into(),
            "ix" => regs.ix().into(),
            "iy" => regs.iy().into(),
            "ir" => regs.ir().into(),
            "wz" => regs.wz().into(),
            "af'" => regs.af_alt().into(),
            "bc'" => regs.bc_alt().into(),
            "de'" => regs.de_alt().into(),
            "hl'" => regs.hl_alt().into(),
            "a" => regs.a().into(),
            "f" => regs.f().into(),
            "b" => regs.b().into(),
            "c" => regs.c().into(),
            "d" => regs.d().into(),
            "e" => regs.e().into(),
            "h" => regs.h().into(),
            "l" => regs.l().into(),
            "i" => regs.i().into(),
            "r" => regs.r().into(),
            "flags.s" => flag(SF),
            "flags.z" => flag(ZF),
            "flags.y" => flag(YF),
            "flags.h" => flag(HF),
            "flags.x" => flag(XF),
            "flags.pv" => flag(PF),
            "flags.n" => flag(NF),
            "flags.c" => flag(CF),
            "iff1" => self.iff1.into(),
            "iff2" => self.iff2.into(),
            "im" => self.im.number().into(),
            "halted" => self.is_halted().into(),
            "tacts" => self.tacts.into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
