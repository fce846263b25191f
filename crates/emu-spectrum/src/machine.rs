//! Top-level Spectrum machine.
//!
//! `SpectrumMachine` wraps the virtual machine core in a power/run state
//! machine, publishes every state change to subscribers and drives the
//! execution cycle one CPU frame at a time.
//!
//! # States
//!
//! ```text
//! Off -> TurningOn -> On -> Starting -> Running -> Pausing  -> Paused
//!                                               -> Stopping -> Stopped
//! any -> TurningOff -> Off
//! ```
//!
//! Starting again from `Stopped` asserts the CPU's RESET line first.

use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use emu_core::{Observable, Value};
use log::{debug, warn};

use crate::config::MachineConfig;
use crate::error::MachineError;
use crate::execution::{
    CancellationToken, EmulationMode, ExecuteCycleOptions, ExecutionCompletionReason,
};
use crate::vm::SpectrumVm;

/// Power and run state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmState {
    #[default]
    Off,
    TurningOn,
    On,
    Starting,
    Running,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    TurningOff,
}

/// Published on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmStateChange {
    pub old: VmState,
    pub new: VmState,
}

/// Called after every CPU frame of a run. Returning `Break` cancels the run.
pub type CpuFrameCallback = Box<dyn FnMut(&SpectrumVm) -> ControlFlow<()> + Send>;

/// Outcome of one run of the machine.
pub type RunResult = Result<ExecutionCompletionReason, MachineError>;

pub struct SpectrumMachine {
    vm: SpectrumVm,
    state: VmState,
    subscribers: Vec<Sender<VmStateChange>>,
    cpu_frame_callback: Option<CpuFrameCallback>,
}

impl SpectrumMachine {
    /// Create a powered-off 48K machine from the given configuration.
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        SpectrumVm::new(config).map(Self::from_vm)
    }

    #[must_use]
    pub fn from_vm(vm: SpectrumVm) -> Self {
        Self {
            vm,
            state: VmState::Off,
            subscribers: Vec::new(),
            cpu_frame_callback: None,
        }
    }

    /// Receive every future state change.
    pub fn subscribe(&mut self) -> Receiver<VmStateChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn set_cpu_frame_callback(&mut self, callback: CpuFrameCallback) {
        self.cpu_frame_callback = Some(callback);
    }

    fn set_state(&mut self, new: VmState) {
        let old = self.state;
        self.state = new;
        debug!("machine state {old:?} -> {new:?}");
        let change = VmStateChange { old, new };
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }

    fn require(&self, operation: &'static str, allowed: &[VmState]) -> Result<(), MachineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MachineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    pub fn turn_on(&mut self) -> Result<(), MachineError> {
        self.require("turn on", &[VmState::Off])?;
        self.set_state(VmState::TurningOn);
        self.vm.reset();
        self.set_state(VmState::On);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), MachineError> {
        self.require("start", &[VmState::On, VmState::Paused, VmState::Stopped])?;
        let restart = self.state == VmState::Stopped;
        self.set_state(VmState::Starting);
        if restart {
            self.vm.signal_reset();
        }
        self.set_state(VmState::Running);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), MachineError> {
        self.require("pause", &[VmState::Running])?;
        self.set_state(VmState::Pausing);
        self.set_state(VmState::Paused);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), MachineError> {
        self.require("stop", &[VmState::Running, VmState::Paused])?;
        self.set_state(VmState::Stopping);
        self.set_state(VmState::Stopped);
        Ok(())
    }

    pub fn turn_off(&mut self) -> Result<(), MachineError> {
        if self.state == VmState::Off {
            return Err(MachineError::InvalidState {
                operation: "turn off",
                state: self.state,
            });
        }
        self.set_state(VmState::TurningOff);
        self.set_state(VmState::Off);
        Ok(())
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Start the machine and run until the options say to stop.
    ///
    /// Afterwards the machine is `Paused`, or `Stopped` when a device failed.
    pub fn run(&mut self, token: &CancellationToken, options: &ExecuteCycleOptions) -> RunResult {
        self.run_loop(token, options, false)
    }

    /// Like [`run`](Self::run), but in continuous mode keeps going from frame
    /// to frame until cancelled.
    pub fn run_until_cancelled(
        &mut self,
        token: &CancellationToken,
        options: &ExecuteCycleOptions,
    ) -> RunResult {
        self.run_loop(token, options, true)
    }

    fn run_loop(
        &mut self,
        token: &CancellationToken,
        options: &ExecuteCycleOptions,
        across_frames: bool,
    ) -> RunResult {
        self.start()?;
        let reason = loop {
            let reason = self.start_and_run(token, options);
            if !(across_frames && reason == ExecutionCompletionReason::RenderFrameCompleted) {
                break reason;
            }
        };

        if reason == ExecutionCompletionReason::Exception {
            self.stop()?;
            if let Some(err) = self.vm.last_error() {
                return Err(err.clone().into());
            }
            return Ok(reason);
        }
        self.pause()?;
        Ok(reason)
    }

    /// Execute the next instruction and leave the machine `Paused`.
    ///
    /// A breakpoint at the current address does not hold the step back.
    pub fn step_into(&mut self) -> RunResult {
        self.run(
            &CancellationToken::new(),
            &ExecuteCycleOptions::new(EmulationMode::StepInto),
        )
    }

    /// Drive the execution cycle CPU frame by CPU frame until a reason that
    /// ends the run for these options.
    pub fn start_and_run(
        &mut self,
        token: &CancellationToken,
        options: &ExecuteCycleOptions,
    ) -> ExecutionCompletionReason {
        let mode = options.emulation_mode;
        loop {
            let reason = self.vm.execute_cycle(token, options, true);
            if reason == ExecutionCompletionReason::Cancelled {
                return reason;
            }

            if let Some(callback) = self.cpu_frame_callback.as_mut()
                && callback(&self.vm).is_break()
            {
                return ExecutionCompletionReason::Cancelled;
            }

            match reason {
                ExecutionCompletionReason::TerminationPointReached
                | ExecutionCompletionReason::BreakpointReached
                | ExecutionCompletionReason::Halted
                | ExecutionCompletionReason::Exception => return reason,
                ExecutionCompletionReason::RenderFrameCompleted
                    if mode == EmulationMode::Continuous =>
                {
                    return reason;
                }
                ExecutionCompletionReason::CpuFrameCompleted
                    if mode == EmulationMode::UntilCpuFrameEnds =>
                {
                    return reason;
                }
                _ => {}
            }
        }
    }

    /// Move the machine onto its own run-loop thread.
    ///
    /// Continuous mode keeps running frame after frame; other modes end when
    /// their stop condition is met. The returned handle pauses or stops the
    /// run and hands the machine back.
    #[must_use]
    pub fn spawn(mut self, options: ExecuteCycleOptions) -> RunningMachine {
        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = thread::spawn(move || {
            let result = self.run_until_cancelled(&run_token, &options);
            (self, result)
        });
        RunningMachine {
            token,
            handle: Some(handle),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> VmState {
        self.state
    }

    #[must_use]
    pub fn vm(&self) -> &SpectrumVm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut SpectrumVm {
        &mut self.vm
    }

    /// Read memory without contention, for debuggers.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.vm.peek(address)
    }

    pub fn poke(&mut self, address: u16, value: u8) {
        self.vm.poke(address, value);
    }
}

/// Parse a `memory.<address>` suffix: `0x4000`, `$4000` or decimal.
fn parse_address(text: &str) -> Option<u16> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = text.strip_prefix('$') {
        u16::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

impl Observable for SpectrumMachine {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.vm.cpu().query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            parse_address(rest).map(|a| Value::U8(self.vm.peek(a)))
        } else if let Some(rest) = path.strip_prefix("vm.") {
            match rest {
                "state" => Some(format!("{:?}", self.state).into()),
                "frame_count" => Some(self.vm.frame_count().into()),
                "cpu_frame_count" => Some(self.vm.cpu_frame_count().into()),
                "last_cpu_frame_tacts" => Some(self.vm.last_cpu_frame_tacts().into()),
                "last_render_frame_tacts" => Some(self.vm.last_render_frame_tacts().into()),
                "frame_tact" => Some(self.vm.current_frame_tact().into()),
                "overflow" => Some(self.vm.overflow().into()),
                "contention" => Some(self.vm.cycle_contention().into()),
                "last_contention" => Some(self.vm.last_cycle_contention().into()),
                "last_completion" => self
                    .vm
                    .last_completion()
                    .map(|reason| format!("{reason:?}").into()),
                _ => None,
            }
        } else {
            self.vm.cpu().query(path)
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<z80_paths>",
            "memory.<address>",
            "vm.state",
            "vm.frame_count",
            "vm.cpu_frame_count",
            "vm.last_cpu_frame_tacts",
            "vm.last_render_frame_tacts",
            "vm.frame_tact",
            "vm.overflow",
            "vm.contention",
            "vm.last_contention",
            "vm.last_completion",
        ]
    }
}

/// Handle to a machine running on its own thread.
///
/// Dropping the handle cancels the run and waits for the thread; the
/// machine is dropped with it.
pub struct RunningMachine {
    token: CancellationToken,
    /// Taken by `join`; `None` only while the handle is being consumed.
    handle: Option<JoinHandle<(SpectrumMachine, RunResult)>>,
}

impl RunningMachine {
    /// Token shared with the run loop.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Has the run loop returned on its own?
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the run loop to end without cancelling it.
    pub fn join(mut self) -> Result<(SpectrumMachine, RunResult), MachineError> {
        self.handle
            .take()
            .ok_or(MachineError::RunLoopPanicked)?
            .join()
            .map_err(|_| MachineError::RunLoopPanicked)
    }

    /// Cancel the run and take the machine back, paused.
    pub fn pause(self) -> Result<(SpectrumMachine, RunResult), MachineError> {
        self.token.cancel();
        self.join()
    }

    /// Cancel the run and take the machine back, stopped, with the result
    /// the run loop ended on.
    pub fn stop(self) -> Result<(SpectrumMachine, RunResult), MachineError> {
        let (mut machine, result) = self.pause()?;
        if machine.state() != VmState::Stopped {
            machine.stop()?;
        }
        Ok((machine, result))
    }
}

impl Drop for RunningMachine {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            if handle.join().is_err() {
                warn!("run loop panicked");
            }
        }
    }
}
