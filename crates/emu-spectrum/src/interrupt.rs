//! Maskable interrupt generation.
//!
//! The ULA pulls INT low once per frame. The execution cycle asks the
//! interrupt source before every instruction and forwards the answer to the
//! CPU's INT line.

/// Tacts of the longest instruction. INT stays asserted at least this long
/// so an instruction that straddles the interrupt tact still sees it.
pub const LONGEST_INSTRUCTION_TACTS: u64 = 23;

/// What the INT line should do before the next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSignal {
    /// Leave the line as it is.
    None,
    Raise,
    Revoke,
}

/// Source of the maskable interrupt.
pub trait InterruptSource: Send {
    /// Called at every instruction boundary with the current frame tact.
    fn check_for_interrupt(&mut self, frame_tact: u64) -> InterruptSignal;

    /// Called when the execution cycle crosses a frame boundary.
    fn on_new_frame(&mut self);

    /// Was the interrupt raised in this frame?
    fn interrupt_raised(&self) -> bool;

    /// Was the interrupt revoked in this frame?
    fn interrupt_revoked(&self) -> bool;
}

/// Frame interrupt at a fixed tact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptDevice {
    interrupt_tact: u64,
    raised: bool,
    revoked: bool,
}

impl InterruptDevice {
    #[must_use]
    pub fn new(interrupt_tact: u64) -> Self {
        Self {
            interrupt_tact,
            raised: false,
            revoked: false,
        }
    }

    #[must_use]
    pub fn interrupt_tact(&self) -> u64 {
        self.interrupt_tact
    }
}

impl InterruptSource for InterruptDevice {
    fn check_for_interrupt(&mut self, frame_tact: u64) -> InterruptSignal {
        if self.revoked || frame_tact < self.interrupt_tact {
            return InterruptSignal::None;
        }
        if frame_tact > self.interrupt_tact + LONGEST_INSTRUCTION_TACTS {
            self.revoked = true;
            return InterruptSignal::Revoke;
        }
        if self.raised {
            return InterruptSignal::None;
        }
        self.raised = true;
        InterruptSignal::Raise
    }

    fn on_new_frame(&mut self) {
        self.raised = false;
        self.revoked = false;
    }

    fn interrupt_raised(&self) -> bool {
        self.raised
    }

    fn interrupt_revoked(&self) -> bool {
        self.revoked
    }
}
