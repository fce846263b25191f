//! Pure ALU operations. Each returns the result and the complete new flag
//! byte unless noted otherwise.

use crate::flags::{CF, HF, NF, PF, SF, XYF, ZF, flag_if, sz53, sz53p};

/// Result of an 8-bit ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let wide = u16::from(a) + u16::from(b) + u16::from(c);
    let value = wide as u8;
    let flags = sz53(value)
        | flag_if((a & 0x0F) + (b & 0x0F) + c > 0x0F, HF)
        | flag_if((a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0, PF)
        | flag_if(wide > 0xFF, CF);
    AluResult { value, flags }
}

#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let flags = NF
        | sz53(value)
        | flag_if(u16::from(a & 0x0F) < u16::from(b & 0x0F) + u16::from(c), HF)
        | flag_if((a ^ b) & 0x80 != 0 && (b ^ value) & 0x80 == 0, PF)
        | flag_if(u16::from(a) < u16::from(b) + u16::from(c), CF);
    AluResult { value, flags }
}

/// CP: a subtraction whose undocumented bits come from the operand.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let diff = sub8(a, b, false);
    AluResult {
        value: a,
        flags: (diff.flags & !XYF) | (b & XYF),
    }
}

#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: sz53p(value) | HF,
    }
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: sz53p(value),
    }
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: sz53p(value),
    }
}

/// The eight accumulator operations selected by bits 3-5 of the opcode:
/// ADD, ADC, SUB, SBC, AND, XOR, OR, CP.
#[must_use]
pub fn accumulator_op(op: u8, a: u8, b: u8, carry: bool) -> AluResult {
    match op & 7 {
        0 => add8(a, b, false),
        1 => add8(a, b, carry),
        2 => sub8(a, b, false),
        3 => sub8(a, b, carry),
        4 => and8(a, b),
        5 => xor8(a, b),
        6 => or8(a, b),
        _ => cp8(a, b),
    }
}

/// INC r. Carry is not affected, so the returned flags exclude CF.
#[must_use]
pub fn inc8(a: u8) -> AluResult {
    let value = a.wrapping_add(1);
    AluResult {
        value,
        flags: sz53(value) | flag_if(a & 0x0F == 0x0F, HF) | flag_if(a == 0x7F, PF),
    }
}

/// DEC r. Carry is not affected, so the returned flags exclude CF.
#[must_use]
pub fn dec8(a: u8) -> AluResult {
    let value = a.wrapping_sub(1);
    AluResult {
        value,
        flags: NF | sz53(value) | flag_if(a & 0x0F == 0, HF) | flag_if(a == 0x80, PF),
    }
}

/// CB-prefixed rotates and shifts selected by bits 3-5 of the opcode:
/// RLC, RRC, RL, RR, SLA, SRA, SLL, SRL.
#[must_use]
pub fn rotate_shift(op: u8, a: u8, carry: bool) -> AluResult {
    let (value, carry_out) = match op & 7 {
        0 => (a.rotate_left(1), a & 0x80 != 0),
        1 => (a.rotate_right(1), a & 0x01 != 0),
        2 => ((a << 1) | u8::from(carry), a & 0x80 != 0),
        3 => ((a >> 1) | (u8::from(carry) << 7), a & 0x01 != 0),
        4 => (a << 1, a & 0x80 != 0),
        5 => ((a >> 1) | (a & 0x80), a & 0x01 != 0),
        6 => ((a << 1) | 1, a & 0x80 != 0),
        _ => (a >> 1, a & 0x01 != 0),
    };
    AluResult {
        value,
        flags: sz53p(value) | flag_if(carry_out, CF),
    }
}

/// RLCA, RRCA, RLA, RRA (bits 3-4 of the opcode). S, Z and P/V are kept from
/// `f`.
#[must_use]
pub fn rotate_accumulator(op: u8, a: u8, f: u8) -> AluResult {
    let shifted = rotate_shift(op & 3, a, f & CF != 0);
    AluResult {
        value: shifted.value,
        flags: (f & (SF | ZF | PF)) | (shifted.value & XYF) | (shifted.flags & CF),
    }
}

/// ADD HL,rr. Returns H, C and the undocumented bits; S, Z and P/V belong to
/// the caller.
#[must_use]
pub fn add16(a: u16, b: u16) -> (u16, u8) {
    let wide = u32::from(a) + u32::from(b);
    let value = wide as u16;
    let flags = ((value >> 8) as u8 & XYF)
        | flag_if((a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF, HF)
        | flag_if(wide > 0xFFFF, CF);
    (value, flags)
}

/// ADC HL,rr with the full flag byte.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let wide = u32::from(a) + u32::from(b) + u32::from(c);
    let value = wide as u16;
    let flags = ((value >> 8) as u8 & (SF | XYF))
        | flag_if(value == 0, ZF)
        | flag_if((a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF, HF)
        | flag_if((a ^ b) & 0x8000 == 0 && (a ^ value) & 0x8000 != 0, PF)
        | flag_if(wide > 0xFFFF, CF);
    (value, flags)
}

/// SBC HL,rr with the full flag byte.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let flags = NF
        | ((value >> 8) as u8 & (SF | XYF))
        | flag_if(value == 0, ZF)
        | flag_if(u32::from(a & 0x0FFF) < u32::from(b & 0x0FFF) + u32::from(c), HF)
        | flag_if((a ^ b) & 0x8000 != 0 && (b ^ value) & 0x8000 == 0, PF)
        | flag_if(u32::from(a) < u32::from(b) + u32::from(c), CF);
    (value, flags)
}

/// Decimal adjust after an addition or subtraction recorded in `f`.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let subtract = f & NF != 0;
    let half = f & HF != 0;
    let carry = f & CF != 0;

    let mut correction = 0u8;
    let mut carry_out = carry;
    if half || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry_out = true;
    }

    let (value, half_out) = if subtract {
        (a.wrapping_sub(correction), half && a & 0x0F < 6)
    } else {
        (a.wrapping_add(correction), a & 0x0F > 9)
    };

    AluResult {
        value,
        flags: sz53p(value) | (f & NF) | flag_if(half_out, HF) | flag_if(carry_out, CF),
    }
}
