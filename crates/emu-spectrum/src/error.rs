//! Machine-level errors.

use emu_core::BusError;
use thiserror::Error;

use crate::machine::VmState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// The requested operation is not allowed in the current state.
    #[error("cannot {operation} while the machine is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: VmState,
    },
    #[error("ROM must be exactly {expected} bytes, got {actual}")]
    InvalidRom { expected: usize, actual: usize },
    /// A device failed during execution.
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("run loop thread panicked")]
    RunLoopPanicked,
}
