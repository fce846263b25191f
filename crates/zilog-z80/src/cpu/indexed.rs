//! DD/FD-prefixed instructions that address memory through `(IX+d)` or
//! `(IY+d)`. Everything else after an index prefix decodes as the
//! unprefixed opcode with HL renamed.

#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use emu_core::{Bus, BusError};

use super::standard::{self, alu_a, plain_reg8, set_plain_reg8};
use super::{Op, Z80};
use crate::alu;
use crate::flags::CF;

pub(super) const fn decode(opcode: u8) -> Op {
    match opcode {
        0x34 => inc_indexed,
        0x35 => dec_indexed,
        0x36 => ld_indexed_n,
        // HALT, not LD (HL),(HL)
        0x76 => standard::decode(opcode),
        0x40..=0x7F if opcode & 7 == 6 => ld_r_indexed,
        0x70..=0x77 => ld_indexed_r,
        0x80..=0xBF if opcode & 7 == 6 => alu_indexed,
        0xCB => indexed_bit,
        _ => standard::decode(opcode),
    }
}

/// Read the displacement at PC and form IX+d / IY+d. Costs the operand read
/// plus five internal cycles on the displacement address. WZ takes the
/// effective address.
fn displaced_address(cpu: &mut Z80, bus: &mut dyn Bus) -> Result<u16, BusError> {
    let operand = cpu.regs.pc();
    let offset = cpu.fetch_byte(bus)?;
    cpu.internal(bus, operand, 5);
    Ok(effective_address(cpu, offset))
}

fn effective_address(cpu: &mut Z80, offset: u8) -> u16 {
    let address = cpu.hl_or_index().wrapping_add(offset as i8 as u16);
    cpu.regs.set_wz(address);
    address
}

// LD r,(IX+d)
fn ld_r_indexed(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = displaced_address(cpu, bus)?;
    let value = cpu.read_byte(bus, address)?;
    set_plain_reg8(cpu, op >> 3, value);
    Ok(())
}

// LD (IX+d),r
fn ld_indexed_r(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = displaced_address(cpu, bus)?;
    let value = plain_reg8(cpu, op);
    cpu.write_byte(bus, address, value)
}

// LD (IX+d),n: the displacement and the immediate overlap the internal cycles.
fn ld_indexed_n(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let offset = cpu.fetch_byte(bus)?;
    let operand = cpu.regs.pc();
    let value = cpu.fetch_byte(bus)?;
    cpu.internal(bus, operand, 2);
    let address = effective_address(cpu, offset);
    cpu.write_byte(bus, address, value)
}

// INC (IX+d)
fn inc_indexed(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = displaced_address(cpu, bus)?;
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    let result = alu::inc8(value);
    cpu.write_byte(bus, address, result.value)?;
    cpu.set_f((cpu.regs.f() & CF) | result.flags);
    Ok(())
}

// DEC (IX+d)
fn dec_indexed(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = displaced_address(cpu, bus)?;
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    let result = alu::dec8(value);
    cpu.write_byte(bus, address, result.value)?;
    cpu.set_f((cpu.regs.f() & CF) | result.flags);
    Ok(())
}

// ADD/ADC/SUB/SBC/AND/XOR/OR/CP (IX+d)
fn alu_indexed(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = displaced_address(cpu, bus)?;
    let value = cpu.read_byte(bus, address)?;
    alu_a(cpu, op, value);
    Ok(())
}

// DD CB d op: displacement and opcode are plain reads, so R only counts the
// two prefix fetches.
fn indexed_bit(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let offset = cpu.fetch_byte(bus)?;
    let operand = cpu.regs.pc();
    let opcode = cpu.fetch_byte(bus)?;
    cpu.internal(bus, operand, 2);
    effective_address(cpu, offset);
    super::dispatch::INDEXED_BIT[usize::from(opcode)](cpu, bus, opcode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IndexMode;
    use emu_core::SimpleBus;

    #[test]
    fn negative_displacement_wraps_below_index() {
        let mut cpu = Z80::new();
        let mut bus = SimpleBus::new();
        cpu.index = IndexMode::Iy;
        cpu.regs.set_iy(0x0001);
        bus.load(0x0000, &[0xFE]);
        let address = displaced_address(&mut cpu, &mut bus).unwrap();
        assert_eq!(address, 0xFFFF);
        assert_eq!(cpu.regs.wz(), 0xFFFF);
        assert_eq!(cpu.tacts(), 8);
    }
}
