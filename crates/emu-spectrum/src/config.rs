//! Spectrum model configuration.
//!
//! Everything the virtual machine needs to know about the hardware it
//! emulates is passed in explicitly through [`MachineConfig`]. There is no
//! registry of editions; callers pick a preset and adjust it.

use emu_core::MasterClock;

/// Base CPU clock of every Sinclair model (3.5 MHz).
pub const SPECTRUM_CPU_FREQUENCY: u64 = 3_500_000;

/// Default length of a CPU frame in tacts.
pub const DEFAULT_CPU_FRAME_TACTS: u64 = 1024;

/// Supported Spectrum models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectrumModel {
    #[default]
    Spectrum48KPal,
    Spectrum48KNtsc,
}

/// Screen timing that matters to the CPU side of the machine.
///
/// Only the values the execution cycle and memory contention depend on are
/// kept here. Pixel and border geometry belong to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenTiming {
    /// Tacts in one rendered frame.
    pub frame_tacts: u64,
    /// Tacts in one raster line.
    pub tacts_per_line: u64,
    /// Frame tact at which the ULA first contends memory (top-left pixel).
    pub first_contended_tact: u64,
    /// Tacts per line during which the ULA fetches display data.
    pub contended_tacts_per_line: u64,
    /// Number of display lines.
    pub contended_lines: u64,
    /// Frame tact at which the maskable interrupt is raised.
    pub interrupt_tact: u64,
}

impl ScreenTiming {
    /// 48K PAL: 312 lines of 224 tacts.
    #[must_use]
    pub const fn pal_48k() -> Self {
        Self {
            frame_tacts: 69_888,
            tacts_per_line: 224,
            first_contended_tact: 14_335,
            contended_tacts_per_line: 128,
            contended_lines: 192,
            interrupt_tact: 0,
        }
    }

    /// 48K NTSC: 264 lines of 224 tacts.
    #[must_use]
    pub const fn ntsc_48k() -> Self {
        Self {
            frame_tacts: 59_136,
            tacts_per_line: 224,
            first_contended_tact: 8_959,
            contended_tacts_per_line: 128,
            contended_lines: 192,
            interrupt_tact: 0,
        }
    }
}

impl Default for ScreenTiming {
    fn default() -> Self {
        Self::pal_48k()
    }
}

/// Configuration for creating a Spectrum virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub model: SpectrumModel,
    /// ROM data. Must be exactly 16,384 bytes for the 48K models when the
    /// 48K memory device is used. May be empty for flat-RAM machines.
    pub rom: Vec<u8>,
    pub screen: ScreenTiming,
    /// Tacts per CPU frame, the finest boundary the run loop yields at.
    pub cpu_frame_tacts: u64,
    /// CPU speed relative to the base clock (1 = 3.5 MHz).
    pub clock_multiplier: u32,
    pub clock: MasterClock,
}

impl MachineConfig {
    /// 48K PAL machine with the given ROM.
    #[must_use]
    pub fn spectrum48_pal(rom: Vec<u8>) -> Self {
        Self::for_model(SpectrumModel::Spectrum48KPal, rom)
    }

    /// 48K NTSC machine with the given ROM.
    #[must_use]
    pub fn spectrum48_ntsc(rom: Vec<u8>) -> Self {
        Self::for_model(SpectrumModel::Spectrum48KNtsc, rom)
    }

    #[must_use]
    pub fn for_model(model: SpectrumModel, rom: Vec<u8>) -> Self {
        let screen = match model {
            SpectrumModel::Spectrum48KPal => ScreenTiming::pal_48k(),
            SpectrumModel::Spectrum48KNtsc => ScreenTiming::ntsc_48k(),
        };
        Self {
            model,
            rom,
            screen,
            cpu_frame_tacts: DEFAULT_CPU_FRAME_TACTS,
            clock_multiplier: 1,
            clock: MasterClock::new(SPECTRUM_CPU_FREQUENCY),
        }
    }

    #[must_use]
    pub fn with_screen(mut self, screen: ScreenTiming) -> Self {
        self.screen = screen;
        self
    }

    #[must_use]
    pub fn with_cpu_frame_tacts(mut self, tacts: u64) -> Self {
        self.cpu_frame_tacts = tacts.max(1);
        self
    }

    /// Run the CPU `multiplier` times faster than the base clock. Zero is
    /// treated as 1.
    #[must_use]
    pub fn with_clock_multiplier(mut self, multiplier: u32) -> Self {
        self.clock_multiplier = multiplier.max(1);
        self
    }

    #[must_use]
    pub fn with_interrupt_tact(mut self, tact: u64) -> Self {
        self.screen.interrupt_tact = tact;
        self
    }

    /// Frame length in CPU tacts, taking the clock multiplier into account.
    #[must_use]
    pub fn frame_tacts_at_cpu_speed(&self) -> u64 {
        self.screen.frame_tacts * u64::from(self.clock_multiplier)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::spectrum48_pal(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pal_preset() {
        let config = MachineConfig::spectrum48_pal(vec![0; 0x4000]);
        assert_eq!(config.model, SpectrumModel::Spectrum48KPal);
        assert_eq!(config.screen.frame_tacts, 69_888);
        assert_eq!(config.cpu_frame_tacts, 1024);
        assert_eq!(config.clock_multiplier, 1);
        assert_eq!(config.clock.frames_per_second(config.screen.frame_tacts), 50);
    }

    #[test]
    fn ntsc_preset() {
        let config = MachineConfig::spectrum48_ntsc(Vec::new());
        assert_eq!(config.screen.frame_tacts, 59_136);
        assert_eq!(config.screen.frame_tacts, 264 * config.screen.tacts_per_line);
        assert_eq!(config.clock.frames_per_second(config.screen.frame_tacts), 59);
    }

    #[test]
    fn builders_clamp_zero() {
        let config = MachineConfig::default()
            .with_clock_multiplier(0)
            .with_cpu_frame_tacts(0);
        assert_eq!(config.clock_multiplier, 1);
        assert_eq!(config.cpu_frame_tacts, 1);
    }

    #[test]
    fn multiplier_stretches_frame() {
        let config = MachineConfig::default().with_clock_multiplier(2);
        assert_eq!(config.frame_tacts_at_cpu_speed(), 139_776);
    }
}
