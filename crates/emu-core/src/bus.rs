//! Memory and I/O bus interface.

use thiserror::Error;

/// A failure reported by a device behind the bus.
///
/// The Z80 has no bus-error line, so these never originate in the CPU. They
/// come from collaborators (a port device backed by real hardware, a paged
/// memory device with a broken mapping) and abort the current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("memory device failed at ${address:04X}: {reason}")]
    Memory { address: u16, reason: String },
    #[error("port device failed at ${port:04X}: {reason}")]
    Port { port: u16, reason: String },
}

/// Memory and I/O bus interface.
///
/// The CPU calls a contention function before every access that puts an
/// address on the bus, passing its current tact count. The returned value is
/// the number of wait tacts the CPU must add before the access completes.
/// Uncontended machines keep the default implementations.
pub trait Bus {
    /// Read a byte from memory.
    fn read(&mut self, address: u16) -> Result<u8, BusError>;

    /// Write a byte to memory.
    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError>;

    /// Read a byte from an I/O port (full 16-bit port address).
    fn read_port(&mut self, port: u16) -> Result<u8, BusError>;

    /// Write a byte to an I/O port.
    fn write_port(&mut self, port: u16, value: u8) -> Result<(), BusError>;

    /// Wait tacts for a memory access (or an internal cycle) at `address`
    /// starting at CPU tact `tacts`.
    fn memory_contention(&mut self, _address: u16, _tacts: u64) -> u32 {
        0
    }

    /// Wait tacts for a whole 4-tact I/O cycle on `port` starting at `tacts`.
    fn port_contention(&mut self, _port: u16, _tacts: u64) -> u32 {
        0
    }

    /// Byte on the data bus during an interrupt acknowledge (IM2 vector low
    /// byte). The Spectrum leaves the bus floating at $FF.
    fn interrupt_data(&mut self) -> u8 {
        0xFF
    }
}

/// Flat 64K RAM bus with no contention and open-bus ports.
///
/// Used by CPU tests and CP/M style harnesses.
pub struct SimpleBus {
    ram: Vec<u8>,
    /// Last value written to each port, for assertions.
    port_writes: Vec<(u16, u8)>,
    /// Value returned by every port read.
    pub port_value: u8,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; 0x1_0000],
            port_writes: Vec::new(),
            port_value: 0xFF,
        }
    }

    /// Copy `data` into RAM at `address`, wrapping at $FFFF.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        for (offset, &byte) in data.iter().enumerate() {
            let target = address.wrapping_add(offset as u16);
            self.ram[usize::from(target)] = byte;
        }
    }

    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.ram[usize::from(address)]
    }

    pub fn poke(&mut self, address: u16, value: u8) {
        self.ram[usize::from(address)] = value;
    }

    /// Port writes in the order they happened.
    #[must_use]
    pub fn port_writes(&self) -> &[(u16, u8)] {
        &self.port_writes
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> Result<u8, BusError> {
        Ok(self.peek(address))
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        self.poke(address, value);
        Ok(())
    }

    fn read_port(&mut self, _port: u16) -> Result<u8, BusError> {
        Ok(self.port_value)
    }

    fn write_port(&mut self, port: u16, value: u8) -> Result<(), BusError> {
        self.port_writes.push((port, value));
        Ok(())
    }
}
