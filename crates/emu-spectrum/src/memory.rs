//! Spectrum memory devices.
//!
//! The virtual machine reaches memory only through [`MemoryDevice`]. Banking
//! and contention differences between models stay behind the trait so the
//! bus doesn't need to know which model is active.

use emu_core::BusError;

use crate::config::ScreenTiming;
use crate::contention::{ContentionTable, is_contended_page};
use crate::error::MachineError;

/// Size of the 48K ROM image.
pub const ROM_SIZE: usize = 0x4000;

/// Memory interface for the virtual machine.
pub trait MemoryDevice: Send {
    /// Read a byte on behalf of the CPU.
    fn read(&mut self, address: u16) -> Result<u8, BusError>;

    /// Write a byte on behalf of the CPU. ROM writes are silently ignored.
    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError>;

    /// Read a byte without side effects or contention (debuggers, snapshots).
    fn peek(&self, address: u16) -> u8;

    /// Store a byte regardless of ROM protection (debuggers, code loaders).
    fn poke(&mut self, address: u16, value: u8);

    /// Wait tacts for an access to `address` starting at `frame_tact`.
    fn contention_wait(&self, _address: u16, _frame_tact: u64) -> u32 {
        0
    }
}

/// 48K Spectrum memory: 16K ROM + 48K RAM.
///
/// Layout:
/// - $0000-$3FFF: ROM (writes ignored)
/// - $4000-$7FFF: Contended RAM (shared with ULA)
/// - $8000-$FFFF: Uncontended RAM
pub struct Memory48K {
    rom: Box<[u8; ROM_SIZE]>,
    ram: Box<[u8; 0xC000]>,
    contention: ContentionTable,
}

impl Memory48K {
    /// Create a new 48K memory with the given ROM data.
    pub fn new(rom: &[u8], timing: &ScreenTiming) -> Result<Self, MachineError> {
        let rom: Box<[u8; ROM_SIZE]> = rom
            .to_vec()
            .into_boxed_slice()
            .try_into()
            .map_err(|bytes: Box<[u8]>| MachineError::InvalidRom {
                expected: ROM_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self {
            rom,
            ram: Box::new([0; 0xC000]),
            contention: ContentionTable::new(timing),
        })
    }
}

impl MemoryDevice for Memory48K {
    fn read(&mut self, address: u16) -> Result<u8, BusError> {
        Ok(self.peek(address))
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        if address >= 0x4000 {
            self.ram[usize::from(address - 0x4000)] = value;
        }
        Ok(())
    }

    fn peek(&self, address: u16) -> u8 {
        if address < 0x4000 {
            self.rom[usize::from(address)]
        } else {
            self.ram[usize::from(address - 0x4000)]
        }
    }

    fn poke(&mut self, address: u16, value: u8) {
        if address < 0x4000 {
            self.rom[usize::from(address)] = value;
        } else {
            self.ram[usize::from(address - 0x4000)] = value;
        }
    }

    fn contention_wait(&self, address: u16, frame_tact: u64) -> u32 {
        if is_contended_page(address) {
            self.contention.delay_at(frame_tact)
        } else {
            0
        }
    }
}

/// 64K of writable RAM with no ROM and no contention.
///
/// Used by test machines and code that runs without a Spectrum ROM.
pub struct FlatMemory {
    ram: Box<[u8; 0x1_0000]>,
}

impl FlatMemory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: Box::new([0; 0x1_0000]),
        }
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice for FlatMemory {
    fn read(&mut self, address: u16) -> Result<u8, BusError> {
        Ok(self.ram[usize::from(address)])
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        self.ram[usize::from(address)] = value;
        Ok(())
    }

    fn peek(&self, address: u16) -> u8 {
        self.ram[usize::from(address)]
    }

    fn poke(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }
}
