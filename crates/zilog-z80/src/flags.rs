//! Z80 flag register bits and shared flag builders.

/// Sign (bit 7).
pub const SF: u8 = 0x80;
/// Zero (bit 6).
pub const ZF: u8 = 0x40;
/// Undocumented copy of result bit 5.
pub const YF: u8 = 0x20;
/// Half carry (bit 4).
pub const HF: u8 = 0x10;
/// Undocumented copy of result bit 3.
pub const XF: u8 = 0x08;
/// Parity/overflow (bit 2).
pub const PF: u8 = 0x04;
/// Add/subtract (bit 1).
pub const NF: u8 = 0x02;
/// Carry (bit 0).
pub const CF: u8 = 0x01;

/// Both undocumented bits.
pub const XYF: u8 = XF | YF;

/// `mask` if `condition` holds, otherwise 0.
#[must_use]
pub const fn flag_if(condition: bool, mask: u8) -> u8 {
    if condition { mask } else { 0 }
}

/// PF set when `value` has an even number of one bits.
#[must_use]
pub const fn parity(value: u8) -> u8 {
    flag_if(value.count_ones() % 2 == 0, PF)
}

/// S, Z and the undocumented bits for an 8-bit result.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    (value & (SF | XYF)) | flag_if(value == 0, ZF)
}

/// [`sz53`] plus parity.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    sz53(value) | parity(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sz53p_covers_sign_zero_parity_and_xy() {
        assert_eq!(sz53p(0x00), ZF | PF);
        assert_eq!(sz53p(0x80), SF);
        assert_eq!(sz53p(0x28), YF | XF | PF);
        assert_eq!(sz53(0x01), 0);
    }
}
