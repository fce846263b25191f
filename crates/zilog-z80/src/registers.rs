//! Z80 register bank.
//!
//! All registers live in one little-endian byte array. A 16-bit pair is two
//! consecutive bytes (low byte first), so `B`/`C` and `BC` are two views of
//! the same storage and can never disagree.

/// 8-bit registers, by their offset into the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg8 {
    F = 0,
    A = 1,
    C = 2,
    B = 3,
    E = 4,
    D = 5,
    L = 6,
    H = 7,
    FAlt = 8,
    AAlt = 9,
    CAlt = 10,
    BAlt = 11,
    EAlt = 12,
    DAlt = 13,
    LAlt = 14,
    HAlt = 15,
    Ixl = 16,
    Ixh = 17,
    Iyl = 18,
    Iyh = 19,
    R = 20,
    I = 21,
    Z = 26,
    W = 27,
}

/// 16-bit register pairs, by the offset of their low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg16 {
    AF = 0,
    BC = 2,
    DE = 4,
    HL = 6,
    AFAlt = 8,
    BCAlt = 10,
    DEAlt = 12,
    HLAlt = 14,
    IX = 16,
    IY = 18,
    IR = 20,
    SP = 22,
    PC = 24,
    WZ = 26,
}

const BANK_SIZE: usize = 28;

/// The complete Z80 register file.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    bank: [u8; BANK_SIZE],
}

macro_rules! byte_views {
    ($($get:ident, $set:ident => $reg:ident;)*) => {
        $(
            #[must_use]
            pub const fn $get(&self) -> u8 {
                self.byte(Reg8::$reg)
            }

            pub fn $set(&mut self, value: u8) {
                self.set_byte(Reg8::$reg, value);
            }
        )*
    };
}

macro_rules! word_views {
    ($($get:ident, $set:ident => $reg:ident;)*) => {
        $(
            #[must_use]
            pub const fn $get(&self) -> u16 {
                self.word(Reg16::$reg)
            }

            pub fn $set(&mut self, value: u16) {
                self.set_word(Reg16::$reg, value);
            }
        )*
    };
}

impl Registers {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bank: [0; BANK_SIZE],
        }
    }

    /// Zero every register.
    pub fn clear(&mut self) {
        self.bank = [0; BANK_SIZE];
    }

    #[must_use]
    pub const fn byte(&self, reg: Reg8) -> u8 {
        self.bank[reg as usize]
    }

    pub fn set_byte(&mut self, reg: Reg8, value: u8) {
        self.bank[reg as usize] = value;
    }

    #[must_use]
    pub const fn word(&self, reg: Reg16) -> u16 {
        let offset = reg as usize;
        u16::from_le_bytes([self.bank[offset], self.bank[offset + 1]])
    }

    pub fn set_word(&mut self, reg: Reg16, value: u16) {
        let offset = reg as usize;
        let [lo, hi] = value.to_le_bytes();
        self.bank[offset] = lo;
        self.bank[offset + 1] = hi;
    }

    byte_views! {
        a, set_a => A;
        f, set_f => F;
        b, set_b => B;
        c, set_c => C;
        d, set_d => D;
        e, set_e => E;
        h, set_h => H;
        l, set_l => L;
        ixh, set_ixh => Ixh;
        ixl, set_ixl => Ixl;
        iyh, set_iyh => Iyh;
        iyl, set_iyl => Iyl;
        i, set_i => I;
        r, set_r => R;
    }

    word_views! {
        af, set_af => AF;
        bc, set_bc => BC;
        de, set_de => DE;
        hl, set_hl => HL;
        af_alt, set_af_alt => AFAlt;
        bc_alt, set_bc_alt => BCAlt;
        de_alt, set_de_alt => DEAlt;
        hl_alt, set_hl_alt => HLAlt;
        ix, set_ix => IX;
        iy, set_iy => IY;
        ir, set_ir => IR;
        sp, set_sp => SP;
        pc, set_pc => PC;
        wz, set_wz => WZ;
    }

    /// `EX AF,AF'`
    pub fn exchange_af(&mut self) {
        let af = self.af();
        self.set_af(self.af_alt());
        self.set_af_alt(af);
    }

    /// `EXX`: swap BC, DE and HL with their shadows.
    pub fn exchange_alternates(&mut self) {
        for (main, alt) in [
            (Reg16::BC, Reg16::BCAlt),
            (Reg16::DE, Reg16::DEAlt),
            (Reg16::HL, Reg16::HLAlt),
        ] {
            let value = self.word(main);
            self.set_word(main, self.word(alt));
            self.set_word(alt, value);
        }
    }

    /// Advance the memory refresh counter: bit 7 of R is preserved, the low
    /// seven bits count with rollover.
    pub fn increment_r(&mut self) {
        let r = self.r();
        self.set_r((r & 0x80) | (r.wrapping_add(1) & 0x7F));
    }
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registers")
            .field("af", &format_args!("{:04X}", self.af()))
            .field("bc", &format_args!("{:04X}", self.bc()))
            .field("de", &format_args!("{:04X}", self.de()))
            .field("hl", &format_args!("{:04X}", self.hl()))
            .field("af'", &format_args!("{:04X}", self.af_alt()))
            .field("bc'", &format_args!("{:04X}", self.bc_alt()))
            .field("de'", &format_args!("{:04X}", self.de_alt()))
            .field("hl'", &format_args!("{:04X}", self.hl_alt()))
            .field("ix", &format_args!("{:04X}", self.ix()))
            .field("iy", &format_args!("{:04X}", self.iy()))
            .field("ir", &format_args!("{:04X}", self.ir()))
            .field("sp", &format_args!("{:04X}", self.sp()))
            .field("pc", &format_args!("{:04X}", self.pc()))
            .field("wz", &format_args!("{:04X}", self.wz()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_and_pairs_share_storage() {
        let mut regs = Registers::new();
        regs.set_bc(0x1234);
        assert_eq!(regs.b(), 0x12);
        assert_eq!(regs.c(), 0x34);

        regs.set_l(0xCD);
        regs.set_h(0xAB);
        assert_eq!(regs.hl(), 0xABCD);

        regs.set_af(0xFF01);
        assert_eq!(regs.a(), 0xFF);
        assert_eq!(regs.f(), 0x01);
    }

    #[test]
    fn ir_splits_into_i_high_and_r_low() {
        let mut regs = Registers::new();
        regs.set_ir(0x789A);
        assert_eq!(regs.i(), 0x78);
        assert_eq!(regs.r(), 0x9A);
    }

    #[test]
    fn index_halves_alias_index_registers() {
        let mut regs = Registers::new();
        regs.set_ix(0x89AB);
        regs.set_iyl(0x42);
        assert_eq!(regs.ixh(), 0x89);
        assert_eq!(regs.ixl(), 0xAB);
        assert_eq!(regs.iy(), 0x0042);
        assert_eq!(regs.byte(Reg8::Ixh), 0x89);
    }

    #[test]
    fn exchanges_swap_with_shadows() {
        let mut regs = Registers::new();
        regs.set_af(0x0102);
        regs.set_af_alt(0x0304);
        regs.set_bc(0x1111);
        regs.set_de(0x2222);
        regs.set_hl(0x3333);
        regs.set_bc_alt(0xAAAA);
        regs.set_de_alt(0xBBBB);
        regs.set_hl_alt(0xCCCC);

        regs.exchange_af();
        regs.exchange_alternates();

        assert_eq!(regs.af(), 0x0304);
        assert_eq!(regs.af_alt(), 0x0102);
        assert_eq!(regs.bc(), 0xAAAA);
        assert_eq!(regs.de(), 0xBBBB);
        assert_eq!(regs.hl(), 0xCCCC);
        assert_eq!(regs.hl_alt(), 0x3333);
    }

    #[test]
    fn refresh_counter_keeps_bit_seven() {
        let mut regs = Registers::new();
        regs.set_r(0x7F);
        regs.increment_r();
        assert_eq!(regs.r(), 0x00);

        regs.set_r(0xFF);
        regs.increment_r();
        assert_eq!(regs.r(), 0x80);
    }

    #[test]
    fn clear_zeroes_everything() {
        let mut regs = Registers::new();
        regs.set_pc(0x8000);
        regs.set_iy(0x1234);
        regs.clear();
        assert_eq!(regs, Registers::new());
    }
}
