//! Unprefixed instructions.
//!
//! Handlers that touch H, L or HL go through the index-aware helpers, so the
//! same table also decodes DD/FD-prefixed opcodes that only rename HL to
//! IX/IY. Opcodes that address `(HL)` are overridden in the indexed table.

#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use emu_core::{Bus, BusError};

use super::{Op, Z80};
use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XYF, ZF, flag_if};
use crate::state::{IndexMode, PrefixMode, StateFlags};

pub(super) const fn decode(opcode: u8) -> Op {
    match opcode {
        0x00 => nop,
        0x01 | 0x11 | 0x21 | 0x31 => ld_rr_nn,
        0x02 | 0x12 => ld_indirect_a,
        0x0A | 0x1A => ld_a_indirect,
        0x03 | 0x13 | 0x23 | 0x33 => inc_rr,
        0x0B | 0x1B | 0x2B | 0x3B => dec_rr,
        0x34 => inc_hl_mem,
        0x35 => dec_hl_mem,
        0x36 => ld_hl_mem_n,
        _ if opcode & 0xC7 == 0x04 => inc_r,
        _ if opcode & 0xC7 == 0x05 => dec_r,
        _ if opcode & 0xC7 == 0x06 => ld_r_n,
        0x07 | 0x0F | 0x17 | 0x1F => rotate_a,
        0x08 => ex_af,
        0x09 | 0x19 | 0x29 | 0x39 => add_hl_rr,
        0x10 => djnz,
        0x18 => jr,
        0x20 | 0x28 | 0x30 | 0x38 => jr_cc,
        0x22 => ld_nn_hl,
        0x2A => ld_hl_nn,
        0x32 => ld_nn_a,
        0x3A => ld_a_nn,
        0x27 => daa,
        0x2F => cpl,
        0x37 => scf,
        0x3F => ccf,
        0x76 => halt,
        0x40..=0x7F if opcode & 7 == 6 => ld_r_hl_mem,
        0x70..=0x77 => ld_hl_mem_r,
        0x40..=0x7F => ld_r_r,
        0x80..=0xBF if opcode & 7 == 6 => alu_hl_mem,
        0x80..=0xBF => alu_r,
        _ if opcode & 0xC7 == 0xC0 => ret_cc,
        _ if opcode & 0xCF == 0xC1 => pop,
        _ if opcode & 0xCF == 0xC5 => push,
        _ if opcode & 0xC7 == 0xC2 => jp_cc,
        _ if opcode & 0xC7 == 0xC4 => call_cc,
        _ if opcode & 0xC7 == 0xC6 => alu_n,
        _ if opcode & 0xC7 == 0xC7 => rst,
        0xC3 => jp,
        0xC9 => ret,
        0xCD => call,
        0xD3 => out_n_a,
        0xDB => in_a_n,
        0xD9 => exx,
        0xE3 => ex_sp_hl,
        0xE9 => jp_hl,
        0xEB => ex_de_hl,
        0xF3 => di,
        0xF9 => ld_sp_hl,
        0xFB => ei,
        0xCB => prefix_cb,
        0xED => prefix_ed,
        _ => prefix_index,
    }
}

// =============================================================================
// Loads and exchanges
// =============================================================================

fn nop(_cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    Ok(())
}

// LD rr,nn
fn ld_rr_nn(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.fetch_word(bus)?;
    cpu.set_reg16(op >> 4, value);
    Ok(())
}

// LD (BC),A / LD (DE),A
fn ld_indirect_a(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.reg16(op >> 4);
    let a = cpu.regs.a();
    cpu.write_byte(bus, address, a)?;
    cpu.regs.set_wz((u16::from(a) << 8) | (address.wrapping_add(1) & 0xFF));
    Ok(())
}

// LD A,(BC) / LD A,(DE)
fn ld_a_indirect(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.reg16(op >> 4);
    let value = cpu.read_byte(bus, address)?;
    cpu.regs.set_a(value);
    cpu.regs.set_wz(address.wrapping_add(1));
    Ok(())
}

// LD r,n
fn ld_r_n(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.fetch_byte(bus)?;
    cpu.set_reg8(op >> 3, value);
    Ok(())
}

// LD (HL),n
fn ld_hl_mem_n(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let value = cpu.fetch_byte(bus)?;
    cpu.write_byte(bus, cpu.regs.hl(), value)
}

// LD r,r'
fn ld_r_r(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.reg8(op);
    cpu.set_reg8(op >> 3, value);
    Ok(())
}

// LD r,(HL)
fn ld_r_hl_mem(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.read_byte(bus, cpu.regs.hl())?;
    set_plain_reg8(cpu, op >> 3, value);
    Ok(())
}

// LD (HL),r
fn ld_hl_mem_r(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = plain_reg8(cpu, op);
    cpu.write_byte(bus, cpu.regs.hl(), value)
}

// LD (nn),HL
fn ld_nn_hl(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = cpu.fetch_word(bus)?;
    let value = cpu.hl_or_index();
    cpu.write_word(bus, address, value)?;
    cpu.regs.set_wz(address.wrapping_add(1));
    Ok(())
}

// LD HL,(nn)
fn ld_hl_nn(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = cpu.fetch_word(bus)?;
    let value = cpu.read_word(bus, address)?;
    cpu.set_hl_or_index(value);
    cpu.regs.set_wz(address.wrapping_add(1));
    Ok(())
}

// LD (nn),A
fn ld_nn_a(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = cpu.fetch_word(bus)?;
    let a = cpu.regs.a();
    cpu.write_byte(bus, address, a)?;
    cpu.regs.set_wz((u16::from(a) << 8) | (address.wrapping_add(1) & 0xFF));
    Ok(())
}

// LD A,(nn)
fn ld_a_nn(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = cpu.fetch_word(bus)?;
    let value = cpu.read_byte(bus, address)?;
    cpu.regs.set_a(value);
    cpu.regs.set_wz(address.wrapping_add(1));
    Ok(())
}

// LD SP,HL
fn ld_sp_hl(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 2);
    cpu.regs.set_sp(cpu.hl_or_index());
    Ok(())
}

fn ex_af(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.regs.exchange_af();
    Ok(())
}

fn exx(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.regs.exchange_alternates();
    Ok(())
}

// EX DE,HL ignores index prefixes.
fn ex_de_hl(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let de = cpu.regs.de();
    cpu.regs.set_de(cpu.regs.hl());
    cpu.regs.set_hl(de);
    Ok(())
}

// EX (SP),HL
fn ex_sp_hl(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let sp = cpu.regs.sp();
    let sp_hi = sp.wrapping_add(1);
    let lo = cpu.read_byte(bus, sp)?;
    let hi = cpu.read_byte(bus, sp_hi)?;
    cpu.internal(bus, sp_hi, 1);
    let [old_lo, old_hi] = cpu.hl_or_index().to_le_bytes();
    cpu.write_byte(bus, sp_hi, old_hi)?;
    cpu.write_byte(bus, sp, old_lo)?;
    cpu.internal(bus, sp, 2);
    let value = u16::from_le_bytes([lo, hi]);
    cpu.set_hl_or_index(value);
    cpu.regs.set_wz(value);
    Ok(())
}

fn pop(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.pop(bus)?;
    cpu.set_reg16_af(op >> 4, value);
    Ok(())
}

fn push(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    let value = cpu.reg16_af(op >> 4);
    cpu.push(bus, value)
}

// =============================================================================
// Arithmetic
// =============================================================================

fn inc_rr(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 2);
    let value = cpu.reg16(op >> 4).wrapping_add(1);
    cpu.set_reg16(op >> 4, value);
    Ok(())
}

fn dec_rr(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 2);
    let value = cpu.reg16(op >> 4).wrapping_sub(1);
    cpu.set_reg16(op >> 4, value);
    Ok(())
}

fn inc_r(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let result = alu::inc8(cpu.reg8(op >> 3));
    cpu.set_reg8(op >> 3, result.value);
    cpu.set_f((cpu.regs.f() & CF) | result.flags);
    Ok(())
}

fn dec_r(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let result = alu::dec8(cpu.reg8(op >> 3));
    cpu.set_reg8(op >> 3, result.value);
    cpu.set_f((cpu.regs.f() & CF) | result.flags);
    Ok(())
}

// INC (HL)
fn inc_hl_mem(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = cpu.regs.hl();
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    let result = alu::inc8(value);
    cpu.write_byte(bus, address, result.value)?;
    cpu.set_f((cpu.regs.f() & CF) | result.flags);
    Ok(())
}

// DEC (HL)
fn dec_hl_mem(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let address = cpu.regs.hl();
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 1);
    let result = alu::dec8(value);
    cpu.write_byte(bus, address, result.value)?;
    cpu.set_f((cpu.regs.f() & CF) | result.flags);
    Ok(())
}

// ADD HL,rr
fn add_hl_rr(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 7);
    let hl = cpu.hl_or_index();
    let (value, flags) = alu::add16(hl, cpu.reg16(op >> 4));
    cpu.regs.set_wz(hl.wrapping_add(1));
    cpu.set_hl_or_index(value);
    cpu.set_f((cpu.regs.f() & (SF | ZF | PF)) | flags);
    Ok(())
}

/// Apply accumulator operation `op` (bits 3-5) with `value`.
pub(super) fn alu_a(cpu: &mut Z80, op: u8, value: u8) {
    let carry = cpu.regs.f() & CF != 0;
    let result = alu::accumulator_op(op >> 3, cpu.regs.a(), value, carry);
    cpu.regs.set_a(result.value);
    cpu.set_f(result.flags);
}

fn alu_r(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.reg8(op);
    alu_a(cpu, op, value);
    Ok(())
}

fn alu_hl_mem(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.read_byte(bus, cpu.regs.hl())?;
    alu_a(cpu, op, value);
    Ok(())
}

fn alu_n(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let value = cpu.fetch_byte(bus)?;
    alu_a(cpu, op, value);
    Ok(())
}

// RLCA / RRCA / RLA / RRA
fn rotate_a(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let result = alu::rotate_accumulator(op >> 3, cpu.regs.a(), cpu.regs.f());
    cpu.regs.set_a(result.value);
    cpu.set_f(result.flags);
    Ok(())
}

fn daa(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let result = alu::daa(cpu.regs.a(), cpu.regs.f());
    cpu.regs.set_a(result.value);
    cpu.set_f(result.flags);
    Ok(())
}

fn cpl(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let a = !cpu.regs.a();
    cpu.regs.set_a(a);
    cpu.set_f((cpu.regs.f() & (SF | ZF | PF | CF)) | HF | NF | (a & XYF));
    Ok(())
}

// SCF and CCF: X/Y are A's bits, OR'd with F's when the previous
// instruction did not write F.
fn scf(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let f = cpu.regs.f();
    let xy = ((cpu.last_q() ^ f) | cpu.regs.a()) & XYF;
    cpu.set_f((f & (SF | ZF | PF)) | CF | xy);
    Ok(())
}

fn ccf(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let f = cpu.regs.f();
    let carry = f & CF != 0;
    let xy = ((cpu.last_q() ^ f) | cpu.regs.a()) & XYF;
    cpu.set_f((f & (SF | ZF | PF)) | flag_if(carry, HF) | flag_if(!carry, CF) | xy);
    Ok(())
}

// =============================================================================
// Control flow
// =============================================================================

fn halt(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.state.insert(StateFlags::HALTED);
    cpu.regs.set_pc(cpu.regs.pc().wrapping_sub(1));
    Ok(())
}

/// Relative jump from the displacement byte just read at `operand`.
fn jump_relative(cpu: &mut Z80, bus: &mut dyn Bus, operand: u16, offset: u8) {
    cpu.internal(bus, operand, 5);
    let target = cpu.regs.pc().wrapping_add(offset as i8 as u16);
    cpu.regs.set_pc(target);
    cpu.regs.set_wz(target);
}

fn djnz(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    let b = cpu.regs.b().wrapping_sub(1);
    cpu.regs.set_b(b);
    let operand = cpu.regs.pc();
    let offset = cpu.fetch_byte(bus)?;
    if b != 0 {
        jump_relative(cpu, bus, operand, offset);
    }
    Ok(())
}

fn jr(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let operand = cpu.regs.pc();
    let offset = cpu.fetch_byte(bus)?;
    jump_relative(cpu, bus, operand, offset);
    Ok(())
}

// JR NZ/Z/NC/C
fn jr_cc(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let operand = cpu.regs.pc();
    let offset = cpu.fetch_byte(bus)?;
    if cpu.condition((op >> 3) & 3) {
        jump_relative(cpu, bus, operand, offset);
    }
    Ok(())
}

fn jp(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let target = cpu.fetch_word(bus)?;
    cpu.regs.set_pc(target);
    cpu.regs.set_wz(target);
    Ok(())
}

fn jp_cc(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let target = cpu.fetch_word(bus)?;
    cpu.regs.set_wz(target);
    if cpu.condition(op >> 3) {
        cpu.regs.set_pc(target);
    }
    Ok(())
}

// JP (HL)
fn jp_hl(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.regs.set_pc(cpu.hl_or_index());
    Ok(())
}

fn call_to(cpu: &mut Z80, bus: &mut dyn Bus, target: u16) -> Result<(), BusError> {
    cpu.internal(bus, cpu.regs.pc().wrapping_sub(1), 1);
    cpu.push(bus, cpu.regs.pc())?;
    cpu.regs.set_pc(target);
    Ok(())
}

fn call(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let target = cpu.fetch_word(bus)?;
    cpu.regs.set_wz(target);
    call_to(cpu, bus, target)
}

fn call_cc(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let target = cpu.fetch_word(bus)?;
    cpu.regs.set_wz(target);
    if cpu.condition(op >> 3) {
        call_to(cpu, bus, target)?;
    }
    Ok(())
}

pub(super) fn ret(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let target = cpu.pop(bus)?;
    cpu.regs.set_pc(target);
    cpu.regs.set_wz(target);
    Ok(())
}

fn ret_cc(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    if cpu.condition(op >> 3) {
        ret(cpu, bus, op)?;
    }
    Ok(())
}

fn rst(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    cpu.push(bus, cpu.regs.pc())?;
    let target = u16::from(op & 0x38);
    cpu.regs.set_pc(target);
    cpu.regs.set_wz(target);
    Ok(())
}

fn di(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.iff1 = false;
    cpu.iff2 = false;
    Ok(())
}

fn ei(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.block_interrupt();
    Ok(())
}

// =============================================================================
// I/O
// =============================================================================

// OUT (n),A
fn out_n_a(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let n = cpu.fetch_byte(bus)?;
    let a = cpu.regs.a();
    let port = (u16::from(a) << 8) | u16::from(n);
    cpu.port_out(bus, port, a)?;
    cpu.regs.set_wz((u16::from(a) << 8) | u16::from(n.wrapping_add(1)));
    Ok(())
}

// IN A,(n)
fn in_a_n(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let n = cpu.fetch_byte(bus)?;
    let port = (u16::from(cpu.regs.a()) << 8) | u16::from(n);
    let value = cpu.port_in(bus, port)?;
    cpu.regs.set_a(value);
    cpu.regs.set_wz(port.wrapping_add(1));
    Ok(())
}

// =============================================================================
// Prefixes
// =============================================================================

fn prefix_cb(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.prefix = PrefixMode::Bit;
    Ok(())
}

/// ED also cancels a pending index prefix.
pub(super) fn prefix_ed(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.prefix = PrefixMode::Extended;
    cpu.index = IndexMode::None;
    Ok(())
}

// DD / FD
pub(super) fn prefix_index(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.prefix = PrefixMode::Indexed;
    cpu.index = if op == 0xDD { IndexMode::Ix } else { IndexMode::Iy };
    Ok(())
}

// =============================================================================
// Register access that ignores index prefixes
// =============================================================================

/// Register by opcode encoding, H and L always meaning H and L. Used by
/// the `(HL)`/`(IX+d)` memory forms.
pub(super) fn plain_reg8(cpu: &Z80, code: u8) -> u8 {
    match code & 7 {
        4 => cpu.regs.h(),
        5 => cpu.regs.l(),
        _ => cpu.reg8(code),
    }
}

pub(super) fn set_plain_reg8(cpu: &mut Z80, code: u8, value: u8) {
    match code & 7 {
        4 => cpu.regs.set_h(value),
        5 => cpu.regs.set_l(value),
        _ => cpu.set_reg8(code, value),
    }
}
