//! Options and results of one execution cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// How far an execution cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmulationMode {
    /// Normal running: stop at the end of each rendered frame.
    #[default]
    Continuous,
    /// Like `Continuous`, but breakpoints are honoured.
    Debugger,
    /// Stop once the CPU executes HALT.
    UntilHalt,
    /// Stop when PC reaches the termination point.
    UntilExecutionPoint,
    /// Stop at the end of every CPU frame.
    UntilCpuFrameEnds,
    /// Execute exactly one instruction and report `BreakpointReached` at
    /// the next one. Breakpoints are not evaluated.
    StepInto,
}

/// Immutable parameters of one execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteCycleOptions {
    pub emulation_mode: EmulationMode,
    /// Address to stop at in `UntilExecutionPoint` mode.
    pub termination_point: Option<u16>,
}

impl ExecuteCycleOptions {
    #[must_use]
    pub const fn new(emulation_mode: EmulationMode) -> Self {
        Self {
            emulation_mode,
            termination_point: None,
        }
    }

    #[must_use]
    pub const fn with_termination_point(mut self, address: u16) -> Self {
        self.termination_point = Some(address);
        self
    }

    /// Run to `address`.
    #[must_use]
    pub const fn until(address: u16) -> Self {
        Self::new(EmulationMode::UntilExecutionPoint).with_termination_point(address)
    }
}

/// Why an execution cycle returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCompletionReason {
    Cancelled,
    TerminationPointReached,
    BreakpointReached,
    Halted,
    CpuFrameCompleted,
    RenderFrameCompleted,
    /// A device failed; the error is kept by the virtual machine.
    Exception,
}

/// Cooperative cancellation shared between a control thread and the run
/// loop. Polled at every instruction boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_run_continuously() {
        let options = ExecuteCycleOptions::default();
        assert_eq!(options.emulation_mode, EmulationMode::Continuous);
        assert_eq!(options.termination_point, None);
    }

    #[test]
    fn until_sets_mode_and_address() {
        let options = ExecuteCycleOptions::until(0x8003);
        assert_eq!(options.emulation_mode, EmulationMode::UntilExecutionPoint);
        assert_eq!(options.termination_point, Some(0x8003));
    }

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
