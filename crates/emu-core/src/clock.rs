//! Base clock of an emulated machine.

use std::time::Duration;

/// Base CPU clock of a machine.
///
/// Everything the core counts is in tacts of this clock. Wall-clock pacing
/// lives outside the core; this only converts tact budgets into the real time
/// they represent so a scheduler can throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// Clock frequency in Hz (e.g., `3_500_000` for the 48K Spectrum).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Real time taken by `tacts` clock cycles.
    #[must_use]
    pub fn duration_of(&self, tacts: u64) -> Duration {
        if self.frequency_hz == 0 {
            return Duration::ZERO;
        }
        let nanos = u128::from(tacts) * 1_000_000_000 / u128::from(self.frequency_hz);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Frames per second for a frame of `frame_tacts` (integer division).
    #[must_use]
    pub const fn frames_per_second(&self, frame_tacts: u64) -> u64 {
        if frame_tacts == 0 {
            0
        } else {
            self.frequency_hz / frame_tacts
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrum_frame_is_about_twenty_milliseconds() {
        let clock = MasterClock::new(3_500_000);
        assert_eq!(clock.frames_per_second(69_888), 50);
        assert_eq!(clock.duration_of(69_888), Duration::from_nanos(19_968_000));
    }

    #[test]
    fn zero_frequency_is_inert() {
        let clock = MasterClock::new(0);
        assert_eq!(clock.duration_of(1000), Duration::ZERO);
        assert_eq!(MasterClock::new(100).frames_per_second(0), 0);
    }
}
