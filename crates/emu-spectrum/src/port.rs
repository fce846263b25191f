//! I/O port devices.

use emu_core::BusError;

use crate::config::ScreenTiming;
use crate::contention::{ContentionTable, is_contended_page};

/// Port interface for the virtual machine.
pub trait PortDevice: Send {
    /// Read from a full 16-bit port address.
    fn read_port(&mut self, port: u16) -> Result<u8, BusError>;

    /// Write to a full 16-bit port address.
    fn write_port(&mut self, port: u16, value: u8) -> Result<(), BusError>;

    /// Wait tacts for the whole I/O cycle on `port` starting at `frame_tact`.
    fn contention_wait(&self, _port: u16, _frame_tact: u64) -> u32 {
        0
    }
}

/// Minimal 48K port map.
///
/// Even ports reach the ULA. The last value written there is latched (border
/// in bits 0-2, MIC in bit 3, EAR in bit 4) for whoever renders it. Reads see
/// no keys pressed and a floating bus.
pub struct Spectrum48Ports {
    ula_latch: u8,
    contention: ContentionTable,
}

impl Spectrum48Ports {
    #[must_use]
    pub fn new(timing: &ScreenTiming) -> Self {
        Self {
            ula_latch: 0,
            contention: ContentionTable::new(timing),
        }
    }

    /// Ports with no contention at all.
    #[must_use]
    pub fn uncontended() -> Self {
        Self {
            ula_latch: 0,
            contention: ContentionTable::uncontended(),
        }
    }

    /// Last value written to the ULA port.
    #[must_use]
    pub fn ula_latch(&self) -> u8 {
        self.ula_latch
    }

    #[must_use]
    pub fn border_colour(&self) -> u8 {
        self.ula_latch & 0x07
    }
}

impl PortDevice for Spectrum48Ports {
    fn read_port(&mut self, _port: u16) -> Result<u8, BusError> {
        Ok(0xFF)
    }

    fn write_port(&mut self, port: u16, value: u8) -> Result<(), BusError> {
        if port & 1 == 0 {
            self.ula_latch = value;
        }
        Ok(())
    }

    fn contention_wait(&self, port: u16, frame_tact: u64) -> u32 {
        self.contention
            .io_delay(port, is_contended_page(port), frame_tact)
    }
}
