//! ED-prefixed instructions.

use emu_core::{Bus, BusError};

use super::standard::ret;
use super::{Op, Z80};
use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, XYF, YF, ZF, flag_if, parity, sz53, sz53p};
use crate::state::InterruptMode;

pub(super) const fn decode(opcode: u8) -> Op {
    match opcode {
        0x40..=0x7F => match opcode & 7 {
            0 => in_r_c,
            1 => out_c_r,
            2 if opcode & 0x08 == 0 => sbc_hl_rr,
            2 => adc_hl_rr,
            3 if opcode & 0x08 == 0 => ld_nn_rr,
            3 => ld_rr_nn,
            4 => neg,
            5 => retn,
            6 => im,
            _ => match opcode {
                0x47 => ld_i_a,
                0x4F => ld_r_a,
                0x57 => ld_a_i,
                0x5F => ld_a_r,
                0x67 => rrd,
                0x6F => rld,
                _ => nop,
            },
        },
        0xA0 | 0xA8 | 0xB0 | 0xB8 => ldi,
        0xA1 | 0xA9 | 0xB1 | 0xB9 => cpi,
        0xA2 | 0xAA | 0xB2 | 0xBA => ini,
        0xA3 | 0xAB | 0xB3 | 0xBB => outi,
        _ => nop,
    }
}

/// Undefined ED opcodes cost the two fetches and do nothing.
fn nop(_cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    Ok(())
}

// IN r,(C); ED 70 only sets flags.
fn in_r_c(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let port = cpu.regs.bc();
    let value = cpu.port_in(bus, port)?;
    cpu.regs.set_wz(port.wrapping_add(1));
    if op & 0x38 != 0x30 {
        cpu.set_reg8(op >> 3, value);
    }
    cpu.set_f((cpu.regs.f() & CF) | sz53p(value));
    Ok(())
}

// OUT (C),r; ED 71 writes zero.
fn out_c_r(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let port = cpu.regs.bc();
    let value = if op & 0x38 == 0x30 { 0 } else { cpu.reg8(op >> 3) };
    cpu.port_out(bus, port, value)?;
    cpu.regs.set_wz(port.wrapping_add(1));
    Ok(())
}

fn sbc_hl_rr(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 7);
    let hl = cpu.regs.hl();
    let (value, flags) = alu::sbc16(hl, cpu.reg16(op >> 4), cpu.regs.f() & CF != 0);
    cpu.regs.set_wz(hl.wrapping_add(1));
    cpu.regs.set_hl(value);
    cpu.set_f(flags);
    Ok(())
}

fn adc_hl_rr(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 7);
    let hl = cpu.regs.hl();
    let (value, flags) = alu::adc16(hl, cpu.reg16(op >> 4), cpu.regs.f() & CF != 0);
    cpu.regs.set_wz(hl.wrapping_add(1));
    cpu.regs.set_hl(value);
    cpu.set_f(flags);
    Ok(())
}

// LD (nn),rr
fn ld_nn_rr(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.fetch_word(bus)?;
    let value = cpu.reg16(op >> 4);
    cpu.write_word(bus, address, value)?;
    cpu.regs.set_wz(address.wrapping_add(1));
    Ok(())
}

// LD rr,(nn)
fn ld_rr_nn(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let address = cpu.fetch_word(bus)?;
    let value = cpu.read_word(bus, address)?;
    cpu.set_reg16(op >> 4, value);
    cpu.regs.set_wz(address.wrapping_add(1));
    Ok(())
}

fn neg(cpu: &mut Z80, _bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let result = alu::sub8(0, cpu.regs.a(), false);
    cpu.regs.set_a(result.value);
    cpu.set_f(result.flags);
    Ok(())
}

// RETN / RETI: both restore IFF1 from IFF2.
fn retn(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.iff1 = cpu.iff2;
    ret(cpu, bus, op)
}

fn im(cpu: &mut Z80, _bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.im = match (op >> 3) & 3 {
        2 => InterruptMode::Im1,
        3 => InterruptMode::Im2,
        _ => InterruptMode::Im0,
    };
    Ok(())
}

fn ld_i_a(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    cpu.regs.set_i(cpu.regs.a());
    Ok(())
}

fn ld_r_a(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    cpu.regs.set_r(cpu.regs.a());
    Ok(())
}

fn ld_a_ir(cpu: &mut Z80, bus: &mut dyn Bus, value: u8) {
    cpu.internal_ir(bus, 1);
    cpu.regs.set_a(value);
    cpu.set_f((cpu.regs.f() & CF) | sz53(value) | flag_if(cpu.iff2, PF));
}

fn ld_a_i(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let value = cpu.regs.i();
    ld_a_ir(cpu, bus, value);
    Ok(())
}

fn ld_a_r(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    let value = cpu.regs.r();
    ld_a_ir(cpu, bus, value);
    Ok(())
}

// RRD / RLD: rotate a BCD digit between A and (HL).
fn rotate_digit(cpu: &mut Z80, bus: &mut dyn Bus, left: bool) -> Result<(), BusError> {
    let address = cpu.regs.hl();
    let value = cpu.read_byte(bus, address)?;
    cpu.internal(bus, address, 4);
    let a = cpu.regs.a();
    let (memory, digit) = if left {
        ((value << 4) | (a & 0x0F), value >> 4)
    } else {
        ((a << 4) | (value >> 4), value & 0x0F)
    };
    cpu.write_byte(bus, address, memory)?;
    let a = (a & 0xF0) | digit;
    cpu.regs.set_a(a);
    cpu.regs.set_wz(address.wrapping_add(1));
    cpu.set_f((cpu.regs.f() & CF) | sz53p(a));
    Ok(())
}

fn rrd(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    rotate_digit(cpu, bus, false)
}

fn rld(cpu: &mut Z80, bus: &mut dyn Bus, _op: u8) -> Result<(), BusError> {
    rotate_digit(cpu, bus, true)
}

// =============================================================================
// Block instructions
//
// Bit 3 of the opcode selects decrement, bit 4 selects repeat. A repeating
// instruction that has not finished rewinds PC onto its own ED prefix, so
// every iteration is a separate step.
// =============================================================================

fn step(op: u8) -> u16 {
    if op & 0x08 == 0 { 1 } else { 0xFFFF }
}

fn repeats(op: u8) -> bool {
    op & 0x10 != 0
}

/// Rewind onto the ED prefix for another iteration; returns PC's high byte.
fn rewind(cpu: &mut Z80) -> u8 {
    let pc = cpu.regs.pc().wrapping_sub(2);
    cpu.regs.set_pc(pc);
    cpu.regs.set_wz(pc.wrapping_add(1));
    (pc >> 8) as u8
}

// LDI / LDD / LDIR / LDDR
fn ldi(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let hl = cpu.regs.hl();
    let de = cpu.regs.de();
    let value = cpu.read_byte(bus, hl)?;
    cpu.write_byte(bus, de, value)?;
    cpu.internal(bus, de, 2);

    let bc = cpu.regs.bc().wrapping_sub(1);
    cpu.regs.set_bc(bc);
    let kept = cpu.regs.f() & (SF | ZF | CF);

    if repeats(op) && bc != 0 {
        cpu.internal(bus, de, 5);
        let pch = rewind(cpu);
        cpu.set_f(kept | PF | (pch & XYF));
    } else {
        let n = value.wrapping_add(cpu.regs.a());
        cpu.set_f(kept | (n & XF) | flag_if(n & 0x02 != 0, YF) | flag_if(bc != 0, PF));
    }

    cpu.regs.set_hl(hl.wrapping_add(step(op)));
    cpu.regs.set_de(de.wrapping_add(step(op)));
    Ok(())
}

// CPI / CPD / CPIR / CPDR
fn cpi(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    let hl = cpu.regs.hl();
    let value = cpu.read_byte(bus, hl)?;
    cpu.internal(bus, hl, 5);
    cpu.regs.set_wz(cpu.regs.wz().wrapping_add(step(op)));

    let a = cpu.regs.a();
    let result = a.wrapping_sub(value);
    let half = a & 0x0F < value & 0x0F;
    let bc = cpu.regs.bc().wrapping_sub(1);
    cpu.regs.set_bc(bc);

    let base = (cpu.regs.f() & CF)
        | NF
        | (result & SF)
        | flag_if(result == 0, ZF)
        | flag_if(half, HF)
        | flag_if(bc != 0, PF);

    if repeats(op) && bc != 0 && result != 0 {
        cpu.internal(bus, hl, 5);
        let pch = rewind(cpu);
        cpu.set_f(base | (pch & XYF));
    } else {
        let n = result.wrapping_sub(u8::from(half));
        cpu.set_f(base | (n & XF) | flag_if(n & 0x02 != 0, YF));
    }

    cpu.regs.set_hl(hl.wrapping_add(step(op)));
    Ok(())
}

/// Flags shared by the four I/O block instructions. `k` is the transferred
/// byte plus the adjusted C (input) or the new L (output).
fn block_io_flags(cpu: &mut Z80, op: u8, value: u8, k: u16) {
    let b = cpu.regs.b();
    let carry = k > 0xFF;
    let negative = value & 0x80 != 0;
    let p = (k as u8 & 7) ^ b;

    if repeats(op) && b != 0 {
        let pch = rewind(cpu);
        let (half, pf) = match (carry, negative) {
            (true, true) => (b & 0x0F == 0, parity(p ^ (b.wrapping_sub(1) & 7))),
            (true, false) => (b & 0x0F == 0x0F, parity(p ^ (b.wrapping_add(1) & 7))),
            _ => (false, parity(p ^ (b & 7))),
        };
        cpu.set_f(
            (b & SF)
                | (pch & XYF)
                | flag_if(negative, NF)
                | flag_if(carry, CF)
                | flag_if(half, HF)
                | pf,
        );
    } else {
        cpu.set_f(
            flag_if(b == 0, ZF)
                | (b & (SF | XYF))
                | flag_if(negative, NF)
                | flag_if(carry, HF | CF)
                | parity(p),
        );
    }
}

// INI / IND / INIR / INDR
fn ini(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    let port = cpu.regs.bc();
    let value = cpu.port_in(bus, port)?;
    let hl = cpu.regs.hl();
    cpu.write_byte(bus, hl, value)?;
    cpu.regs.set_wz(port.wrapping_add(step(op)));
    cpu.regs.set_b(cpu.regs.b().wrapping_sub(1));

    let c = cpu.regs.c().wrapping_add(step(op) as u8);
    let k = u16::from(value) + u16::from(c);
    block_io_flags(cpu, op, value, k);
    if repeats(op) && cpu.regs.b() != 0 {
        cpu.internal(bus, hl, 5);
    }

    cpu.regs.set_hl(hl.wrapping_add(step(op)));
    Ok(())
}

// OUTI / OUTD / OTIR / OTDR
fn outi(cpu: &mut Z80, bus: &mut dyn Bus, op: u8) -> Result<(), BusError> {
    cpu.internal_ir(bus, 1);
    let hl = cpu.regs.hl();
    let value = cpu.read_byte(bus, hl)?;
    cpu.regs.set_b(cpu.regs.b().wrapping_sub(1));
    let port = cpu.regs.bc();
    cpu.port_out(bus, port, value)?;
    cpu.regs.set_wz(port.wrapping_add(step(op)));

    let hl = hl.wrapping_add(step(op));
    cpu.regs.set_hl(hl);
    let k = u16::from(value) + u16::from(hl as u8);
    block_io_flags(cpu, op, value, k);
    if repeats(op) && cpu.regs.b() != 0 {
        cpu.internal(bus, port, 5);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_step_direction() {
        assert_eq!(step(0xA0), 1);
        assert_eq!(step(0xA8), 0xFFFF);
        assert!(repeats(0xB0));
        assert!(!repeats(0xA8));
    }
}
