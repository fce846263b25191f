//! ULA memory and I/O contention.
//!
//! While the ULA fetches display data it holds the CPU off the lower 16K of
//! RAM. The delay depends on where in the 8-tact fetch cycle the CPU asks for
//! the bus: `[6, 5, 4, 3, 2, 1, 0, 0]`. Outside the display area there is no
//! contention.
//!
//! The table is indexed by frame tact and precomputed once per screen timing.

use crate::config::ScreenTiming;

/// Delay pattern over one 8-tact ULA fetch cycle.
const CONTENTION_PATTERN: [u8; 8] = [6, 5, 4, 3, 2, 1, 0, 0];

/// Per-frame-tact contention delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentionTable {
    delays: Vec<u8>,
}

impl ContentionTable {
    #[must_use]
    pub fn new(timing: &ScreenTiming) -> Self {
        let frame_tacts = usize::try_from(timing.frame_tacts).unwrap_or(0);
        let mut delays = vec![0; frame_tacts];
        for line in 0..timing.contended_lines {
            let line_start = timing.first_contended_tact + line * timing.tacts_per_line;
            for offset in 0..timing.contended_tacts_per_line {
                let Ok(tact) = usize::try_from(line_start + offset) else {
                    continue;
                };
                if let Some(slot) = delays.get_mut(tact) {
                    *slot = CONTENTION_PATTERN[(offset % 8) as usize];
                }
            }
        }
        Self { delays }
    }

    /// A table that never delays.
    #[must_use]
    pub fn uncontended() -> Self {
        Self { delays: Vec::new() }
    }

    /// Delay for an access starting at `frame_tact`. Tacts past the end of
    /// the frame wrap into the next one.
    #[must_use]
    pub fn delay_at(&self, frame_tact: u64) -> u32 {
        if self.delays.is_empty() {
            return 0;
        }
        let index = (frame_tact % self.delays.len() as u64) as usize;
        u32::from(self.delays[index])
    }

    /// Total delay for a 4-tact I/O cycle starting at `frame_tact`.
    ///
    /// Contention depends on two factors:
    ///   1. Whether the high byte of the port address is in $40-$7F
    ///   2. Whether the port is even (ULA port, bit 0 clear)
    ///
    /// | High $40-$7F? | Even (ULA)? | Pattern          |
    /// |---------------|-------------|------------------|
    /// | No            | Yes         | N:1, C:3         |
    /// | No            | No          | N:4              |
    /// | Yes           | Yes         | C:1, C:3         |
    /// | Yes           | No          | C:1, C:1, C:1, C:1 |
    ///
    /// "C:n" applies contention at the current position, then advances n
    /// tacts before the next check.
    #[must_use]
    pub fn io_delay(&self, port: u16, contended_high: bool, frame_tact: u64) -> u32 {
        let ula_port = port & 1 == 0;
        match (contended_high, ula_port) {
            (false, false) => 0,
            (false, true) => self.delay_at(frame_tact + 1),
            (true, true) => {
                let first = self.delay_at(frame_tact);
                let second = self.delay_at(frame_tact + 1 + u64::from(first));
                first + second
            }
            (true, false) => {
                let mut tact = frame_tact;
                let mut total = 0;
                for _ in 0..4 {
                    let delay = self.delay_at(tact);
                    total += delay;
                    tact += u64::from(delay) + 1;
                }
                total
            }
        }
    }
}

/// Is `address` in the contended 16K page ($4000-$7FFF)?
#[must_use]
pub const fn is_contended_page(address: u16) -> bool {
    address & 0xC000 == 0x4000
}
