//! Spectrum bus: memory and I/O routing.
//!
//! The bus connects the Z80 CPU to the memory and port devices. It knows
//! nothing about the model; routing and contention come from the devices.
//!
//! # Contention
//!
//! The CPU hands the bus its absolute tact count. The bus converts it to a
//! position within the current frame, asks the device for its wait, and
//! keeps a running total of the tacts lost to contention.

use emu_core::{Bus, BusError};

use crate::memory::MemoryDevice;
use crate::port::PortDevice;

/// The Spectrum bus, implementing `emu_core::Bus`.
pub struct SpectrumBus {
    memory: Box<dyn MemoryDevice>,
    ports: Box<dyn PortDevice>,
    /// CPU tact at which the current frame started.
    frame_start_tacts: u64,
    clock_multiplier: u64,
    /// Tacts lost to contention since the bus was created.
    contention_tacts: u64,
}

impl SpectrumBus {
    #[must_use]
    pub fn new(memory: Box<dyn MemoryDevice>, ports: Box<dyn PortDevice>) -> Self {
        Self {
            memory,
            ports,
            frame_start_tacts: 0,
            clock_multiplier: 1,
            contention_tacts: 0,
        }
    }

    #[must_use]
    pub fn with_clock_multiplier(mut self, multiplier: u32) -> Self {
        self.clock_multiplier = u64::from(multiplier.max(1));
        self
    }

    #[must_use]
    pub fn memory(&self) -> &dyn MemoryDevice {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> &mut dyn MemoryDevice {
        self.memory.as_mut()
    }

    #[must_use]
    pub fn ports(&self) -> &dyn PortDevice {
        self.ports.as_ref()
    }

    pub fn ports_mut(&mut self) -> &mut dyn PortDevice {
        self.ports.as_mut()
    }

    /// Frame tact (in base clock tacts) for the CPU tact count `tacts`.
    #[must_use]
    pub fn frame_tact(&self, tacts: u64) -> u64 {
        tacts.saturating_sub(self.frame_start_tacts) / self.clock_multiplier
    }

    #[must_use]
    pub fn frame_start_tacts(&self) -> u64 {
        self.frame_start_tacts
    }

    pub fn set_frame_start_tacts(&mut self, tacts: u64) {
        self.frame_start_tacts = tacts;
    }

    #[must_use]
    pub fn contention_tacts(&self) -> u64 {
        self.contention_tacts
    }

    /// Convert a device wait (base clock tacts) into CPU tacts and count it.
    fn account(&mut self, wait: u32) -> u32 {
        let wait = wait.saturating_mul(self.clock_multiplier as u32);
        self.contention_tacts += u64::from(wait);
        wait
    }
}

impl Bus for SpectrumBus {
    fn read(&mut self, address: u16) -> Result<u8, BusError> {
        self.memory.read(address)
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        self.memory.write(address, value)
    }

    fn read_port(&mut self, port: u16) -> Result<u8, BusError> {
        self.ports.read_port(port)
    }

    fn write_port(&mut self, port: u16, value: u8) -> Result<(), BusError> {
        self.ports.write_port(port, value)
    }

    fn memory_contention(&mut self, address: u16, tacts: u64) -> u32 {
        let wait = self
            .memory
            .contention_wait(address, self.frame_tact(tacts));
        self.account(wait)
    }

    fn port_contention(&mut self, port: u16, tacts: u64) -> u32 {
        let wait = self.ports.contention_wait(port, self.frame_tact(tacts));
        self.account(wait)
    }
}
