//! CB-prefixed rotates, shifts and bit operations, plain and indexed.

use emu_core::{Bus, BusError};

use super::standard::set_plain_reg8;
use super::{Op, Z80};
use crate::alu;
use crate::flags::{CF, HF, PF, SF, XYF, ZF, flag_if};

pub(super) const fn decode(opcode: u8) -> Op {
    match (opcode >> 6, opcode & 7) {
        (1, 6) => bit_hl_mem,
        (1, _) => bit_r,
        (_, 6) => modify_hl_mem,
        _ => modify_r,
    }
}

/// DD CB d op / FD CB d op. The effective address is already in WZ.
pub(super) const fn decode_indexed(opcode: u8) -> Op {
    if opcode >> 6 == 1 {
        bit_indexed
    } else {
        modify_indexed
    }
}

/// Result of a non-BIT CB operation on `value`; updates F for shifts.
fn modify(cpu: &mut Z80, op: u8, value: u8) -> u8 {
    let mask = 1 << ((op >> 3) & 7);
    match op >> 6 {
        0 => {
            let result = alu::rotate_shift(op >> 3, value, cpu.regs.f() & CF != 0);
            cpu.set_f(result.flags);
            result.value
        }
        2 => value & !mask,
        _ => value | mask,
    }
}

/// BIT n. X/Y come from `xy_source`, which differs per addressing form.
fn test_bit(cpu: &mut Z80, op: u8, value: u8, xy_source: u8) {
    let bit = (op >> 3) & 7;
    let set = value & (1 << bit) != 0;
    cpu.set_f(
        (cpu.regs.f() & CF)
            | HF
            | flag_if(!set, ZF | PF)
            | flag_if(set && bit == 7, SF)
            | (xy_source & XYF),
    );
}

// Shifts, RES and SET on a register
fn modify_r(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.reg8(op);
    let result = modify(cpu, op, value);
    cpu.set_reg8(op, result);
    Ok(())
}

fn bit_r(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.reg8(op);
    test_bit(cpu, op, value, value);
    Ok(())
}

fn read_modify_write(
    cpu: &mut Z80,
    bus: &mut dyn Bus,
    op: u8,
    address: u16,
) -> Result<u8, BusError> {
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    let result = modify(cpu, op, value);
    cpu.write_byte(bus, address, result)?;
    Ok(result)
}

// Shifts, RES and SET on (HL)
fn modify_hl_mem(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.regs.hl();
    read_modify_write(cpu, bus, op, address)?;
    Ok(())
}

// BIT n,(HL): X/Y leak from MEMPTR.
fn bit_hl_mem(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.regs.hl();
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    let xy = (cpu.regs.wz() >> 8) as u8;
    test_bit(cpu, op, value, xy);
    Ok(())
}

// BIT n,(IX+d)
fn bit_indexed(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.regs.wz();
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    test_bit(cpu, op, value, (address >> 8) as u8);
    Ok(())
}

// Shifts, RES and SET on (IX+d); the undocumented forms also copy the result
// into a register.
fn modify_indexed(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.regs.wz();
    let result = read_modify_write(cpu, bus, op, address)?;
    if op & 7 != 6 {
        set_plain_reg8(cpu, op, result);
    }
    Ok(())
}
