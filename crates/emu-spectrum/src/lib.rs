//! ZX Spectrum virtual machine core.
//!
//! The machine runs the Z80 one instruction at a time inside a frame-bounded
//! execution cycle. Each cycle ends with exactly one
//! [`ExecutionCompletionReason`]: a frame boundary, a breakpoint, HALT, a
//! termination address, cancellation or a device failure.
//!
//! Memory, ports and the interrupt line are small capability traits so a
//! host can plug in its own devices. The 48K devices are provided.

mod breakpoint;
mod bus;
mod config;
mod contention;
mod debug;
mod error;
mod execution;
mod interrupt;
mod machine;
mod memory;
mod port;
mod vm;

pub use breakpoint::{BreakpointError, BreakpointInfo, HitCondition, HitType};
pub use bus::SpectrumBus;
pub use config::{
    DEFAULT_CPU_FRAME_TACTS, MachineConfig, SPECTRUM_CPU_FREQUENCY, ScreenTiming, SpectrumModel,
};
pub use contention::ContentionTable;
pub use debug::{BreakpointTable, DebugInfoProvider};
pub use error::MachineError;
pub use execution::{
    CancellationToken, EmulationMode, ExecuteCycleOptions, ExecutionCompletionReason,
};
pub use interrupt::{
    InterruptDevice, InterruptSignal, InterruptSource, LONGEST_INSTRUCTION_TACTS,
};
pub use machine::{
    CpuFrameCallback, RunResult, RunningMachine, SpectrumMachine, VmState, VmStateChange,
};
pub use memory::{FlatMemory, Memory48K, MemoryDevice, ROM_SIZE};
pub use port::{PortDevice, Spectrum48Ports};
pub use vm::{FrameCallback, SpectrumVm};
