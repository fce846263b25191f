//! Execution cycle controller.
//!
//! `SpectrumVm` owns the CPU, the bus and the collaborators that decide when
//! to stop. One call to [`SpectrumVm::execute_cycle`] runs whole instructions
//! until exactly one completion reason applies.
//!
//! # Frame loop
//!
//! Each rendered frame is `ScreenTiming::frame_tacts` base-clock tacts long.
//! Instructions don't line up with frame boundaries, so the tacts an
//! instruction spends past the end of a frame are carried into the next one
//! as overflow.

use std::ops::ControlFlow;

use emu_core::BusError;
use log::{debug, trace, warn};
use zilog_z80::Z80;

use crate::bus::SpectrumBus;
use crate::config::MachineConfig;
use crate::debug::DebugInfoProvider;
use crate::error::MachineError;
use crate::execution::{
    CancellationToken, EmulationMode, ExecuteCycleOptions, ExecutionCompletionReason,
};
use crate::interrupt::{InterruptDevice, InterruptSignal, InterruptSource};
use crate::memory::{Memory48K, MemoryDevice};
use crate::port::{PortDevice, Spectrum48Ports};

/// Called after every completed render frame with the updated machine.
pub type FrameCallback = Box<dyn FnMut(&SpectrumVm) -> ControlFlow<()> + Send>;

/// The Spectrum virtual machine core.
pub struct SpectrumVm {
    cpu: Z80,
    bus: SpectrumBus,
    interrupt: Box<dyn InterruptSource>,
    debug_info: Option<Box<dyn DebugInfoProvider>>,
    config: MachineConfig,
    /// Completed render frames.
    frame_count: u64,
    /// Tacts the last completed frame ran past its end.
    overflow: u64,
    /// CPU tact counter when the last render frame completed.
    render_frame_end: u64,
    last_render_frame_tacts: u64,
    cpu_frame_count: u64,
    last_cpu_frame_tacts: u64,
    /// Address of the breakpoint that ended the previous cycle.
    last_breakpoint: Option<u16>,
    last_completion: Option<ExecutionCompletionReason>,
    last_error: Option<BusError>,
    cycle_contention: u64,
    last_cycle_contention: u64,
    frame_callback: Option<FrameCallback>,
}

impl SpectrumVm {
    /// A 48K machine: ROM and contended RAM, ULA ports, frame interrupt.
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        let memory = Memory48K::new(&config.rom, &config.screen)?;
        let ports = Spectrum48Ports::new(&config.screen);
        let interrupt = InterruptDevice::new(config.screen.interrupt_tact);
        Ok(Self::with_devices(
            config,
            Box::new(memory),
            Box::new(ports),
            Box::new(interrupt),
        ))
    }

    /// Build a machine from explicit devices.
    #[must_use]
    pub fn with_devices(
        config: MachineConfig,
        memory: Box<dyn MemoryDevice>,
        ports: Box<dyn PortDevice>,
        interrupt: Box<dyn InterruptSource>,
    ) -> Self {
        let bus = SpectrumBus::new(memory, ports).with_clock_multiplier(config.clock_multiplier);
        Self {
            cpu: Z80::new(),
            bus,
            interrupt,
            debug_info: None,
            config,
            frame_count: 0,
            overflow: 0,
            render_frame_end: 0,
            last_render_frame_tacts: 0,
            cpu_frame_count: 0,
            last_cpu_frame_tacts: 0,
            last_breakpoint: None,
            last_completion: None,
            last_error: None,
            cycle_contention: 0,
            last_cycle_contention: 0,
            frame_callback: None,
        }
    }

    // =========================================================================
    // Execution cycle
    // =========================================================================

    /// Run instructions until one completion reason applies.
    ///
    /// With `complete_on_cpu_frame` the cycle also returns once a CPU frame's
    /// worth of tacts has been spent in this call, whatever the mode.
    pub fn execute_cycle(
        &mut self,
        token: &CancellationToken,
        options: &ExecuteCycleOptions,
        complete_on_cpu_frame: bool,
    ) -> ExecutionCompletionReason {
        let contention_start = self.bus.contention_tacts();
        self.last_cycle_contention = self.cycle_contention;

        let reason = self.run_cycle(token, options, complete_on_cpu_frame);

        self.cycle_contention = self.bus.contention_tacts() - contention_start;
        self.last_completion = Some(reason);
        reason
    }

    fn run_cycle(
        &mut self,
        token: &CancellationToken,
        options: &ExecuteCycleOptions,
        complete_on_cpu_frame: bool,
    ) -> ExecutionCompletionReason {
        let mode = options.emulation_mode;
        let multiplier = u64::from(self.config.clock_multiplier);
        let cpu_frame_start = self.cpu.tacts();
        let cpu_frame_tacts = self.config.cpu_frame_tacts * multiplier;
        let stop_on_cpu_frame = complete_on_cpu_frame || mode == EmulationMode::UntilCpuFrameEnds;

        loop {
            if token.is_cancelled() {
                return ExecutionCompletionReason::Cancelled;
            }

            let cpu_frame_used = self.cpu.tacts().saturating_sub(cpu_frame_start);
            if stop_on_cpu_frame && cpu_frame_used >= cpu_frame_tacts {
                self.cpu_frame_count += 1;
                self.last_cpu_frame_tacts = cpu_frame_used;
                return ExecutionCompletionReason::CpuFrameCompleted;
            }

            let pc = self.cpu.registers().pc();
            if mode == EmulationMode::UntilExecutionPoint && options.termination_point == Some(pc)
            {
                return ExecutionCompletionReason::TerminationPointReached;
            }

            // Resuming from a breakpoint: its address is not evaluated again
            // until execution has moved off it. The marker survives cycles
            // that end before reaching this point.
            let resuming = self.last_breakpoint.take() == Some(pc);
            if mode == EmulationMode::Debugger && !resuming && self.breakpoint_hit(pc) {
                debug!("breakpoint at ${pc:04X}");
                self.last_breakpoint = Some(pc);
                return ExecutionCompletionReason::BreakpointReached;
            }

            let frame_tact = self.bus.frame_tact(self.cpu.tacts());
            match self.interrupt.check_for_interrupt(frame_tact) {
                InterruptSignal::Raise => self.cpu.raise_interrupt(),
                InterruptSignal::Revoke => self.cpu.revoke_interrupt(),
                InterruptSignal::None => {}
            }

            if let Err(err) = self.cpu.execute_cpu_cycle(&mut self.bus) {
                warn!("execution stopped at ${pc:04X}: {err}");
                self.last_error = Some(err);
                return ExecutionCompletionReason::Exception;
            }

            if mode == EmulationMode::UntilHalt && self.cpu.is_halted() {
                return ExecutionCompletionReason::Halted;
            }

            if self.bus.frame_tact(self.cpu.tacts()) >= self.config.screen.frame_tacts {
                if self.complete_frame().is_break() {
                    return ExecutionCompletionReason::Cancelled;
                }
                if mode != EmulationMode::StepInto {
                    return ExecutionCompletionReason::RenderFrameCompleted;
                }
            }

            if mode == EmulationMode::StepInto {
                // The new PC counts as the place the debugger stopped, so a
                // following debugger run does not stop on it straight away.
                let next = self.cpu.registers().pc();
                debug!("stepped ${pc:04X} -> ${next:04X}");
                self.last_breakpoint = Some(next);
                return ExecutionCompletionReason::BreakpointReached;
            }
        }
    }

    /// Count a hit on the breakpoint at `pc`, if there is one.
    fn breakpoint_hit(&mut self, pc: u16) -> bool {
        self.debug_info
            .as_mut()
            .and_then(|provider| provider.breakpoint_mut(pc))
            .is_some_and(|breakpoint| breakpoint.is_cpu_breakpoint && breakpoint.hit())
    }

    fn complete_frame(&mut self) -> ControlFlow<()> {
        let frame_cpu_tacts = self.config.frame_tacts_at_cpu_speed();
        let next_start = self.bus.frame_start_tacts() + frame_cpu_tacts;
        self.overflow = self.cpu.tacts().saturating_sub(next_start);
        self.last_render_frame_tacts = self.cpu.tacts().saturating_sub(self.render_frame_end);
        self.render_frame_end = self.cpu.tacts();
        self.bus.set_frame_start_tacts(next_start);
        self.frame_count += 1;
        self.interrupt.on_new_frame();
        trace!(
            "frame {} complete, overflow {} tacts",
            self.frame_count, self.overflow
        );

        let Some(mut callback) = self.frame_callback.take() else {
            return ControlFlow::Continue(());
        };
        let flow = callback(self);
        self.frame_callback = Some(callback);
        flow
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Power-on reset: CPU, frame bookkeeping and collaborators.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.restart_frames();
    }

    /// Pulse the RESET line: control state clears, general registers and
    /// memory survive.
    pub fn signal_reset(&mut self) {
        self.restart_frames();
        self.cpu.signal_reset();
        // RESET is handled without a bus cycle.
        if let Err(err) = self.cpu.execute_cpu_cycle(&mut self.bus) {
            warn!("reset failed: {err}");
            self.last_error = Some(err);
        }
    }

    fn restart_frames(&mut self) {
        self.bus.set_frame_start_tacts(0);
        self.frame_count = 0;
        self.overflow = 0;
        self.render_frame_end = 0;
        self.last_render_frame_tacts = 0;
        self.cpu_frame_count = 0;
        self.last_cpu_frame_tacts = 0;
        self.last_breakpoint = None;
        self.last_error = None;
        self.interrupt.on_new_frame();
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    pub fn set_debug_info_provider(&mut self, provider: Box<dyn DebugInfoProvider>) {
        self.debug_info = Some(provider);
    }

    pub fn clear_debug_info_provider(&mut self) -> Option<Box<dyn DebugInfoProvider>> {
        self.debug_info.take()
    }

    pub fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.frame_callback = Some(callback);
    }

    // =========================================================================
    // Memory access for debuggers and loaders
    // =========================================================================

    /// Read memory without contention or side effects.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.bus.memory().peek(address)
    }

    pub fn poke(&mut self, address: u16, value: u8) {
        self.bus.memory_mut().poke(address, value);
    }

    /// Copy `code` to `address`, wrapping at $FFFF.
    pub fn load(&mut self, address: u16, code: &[u8]) {
        for (offset, &byte) in code.iter().enumerate() {
            self.poke(address.wrapping_add(offset as u16), byte);
        }
    }

    /// Load `code` at `address` and point PC at it.
    pub fn inject_code(&mut self, address: u16, code: &[u8]) {
        self.load(address, code);
        self.cpu.registers_mut().set_pc(address);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &SpectrumBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SpectrumBus {
        &mut self.bus
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    #[must_use]
    pub fn interrupt_source(&self) -> &dyn InterruptSource {
        self.interrupt.as_ref()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// CPU frames completed since the last reset.
    #[must_use]
    pub fn cpu_frame_count(&self) -> u64 {
        self.cpu_frame_count
    }

    /// CPU tacts spent in the last completed CPU frame.
    #[must_use]
    pub fn last_cpu_frame_tacts(&self) -> u64 {
        self.last_cpu_frame_tacts
    }

    /// CPU tacts between the last two render frame boundaries.
    #[must_use]
    pub fn last_render_frame_tacts(&self) -> u64 {
        self.last_render_frame_tacts
    }

    #[must_use]
    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Position within the current render frame, in base-clock tacts.
    #[must_use]
    pub fn current_frame_tact(&self) -> u64 {
        self.bus.frame_tact(self.cpu.tacts())
    }

    #[must_use]
    pub fn last_completion(&self) -> Option<ExecutionCompletionReason> {
        self.last_completion
    }

    /// Device error behind the last `Exception`.
    #[must_use]
    pub fn last_error(&self) -> Option<&BusError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<BusError> {
        self.last_error.take()
    }

    /// Breakpoint that ended the previous cycle.
    #[must_use]
    pub fn last_breakpoint(&self) -> Option<u16> {
        self.last_breakpoint
    }

    /// Contention tacts spent in the current (or most recent) cycle.
    #[must_use]
    pub fn cycle_contention(&self) -> u64 {
        self.cycle_contention
    }

    /// Contention tacts spent in the cycle before that.
    #[must_use]
    pub fn last_cycle_contention(&self) -> u64 {
        self.last_cycle_contention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatMemory;

    fn make_vm() -> SpectrumVm {
        SpectrumVm::with_devices(
            MachineConfig::default(),
            Box::new(FlatMemory::new()),
            Box::new(Spectrum48Ports::uncontended()),
            Box::new(InterruptDevice::new(0)),
        )
    }

    #[test]
    fn new_rejects_short_rom() {
        let result = SpectrumVm::new(MachineConfig::spectrum48_pal(vec![0; 10]));
        assert!(matches!(result, Err(MachineError::InvalidRom { .. })));
    }

    #[test]
    fn inject_code_sets_pc() {
        let mut vm = make_vm();
        vm.inject_code(0x8000, &[0x3E, 0x10]);
        assert_eq!(vm.cpu().registers().pc(), 0x8000);
        assert_eq!(vm.peek(0x8001), 0x10);
    }

    #[test]
    fn cancelled_token_stops_before_executing() {
        let mut vm = make_vm();
        let token = CancellationToken::new();
        token.cancel();
        let reason = vm.execute_cycle(&token, &ExecuteCycleOptions::default(), false);
        assert_eq!(reason, ExecutionCompletionReason::Cancelled);
        assert_eq!(vm.cpu().tacts(), 0);
        assert_eq!(vm.last_completion(), Some(reason));
    }

    #[test]
    fn until_cpu_frame_mode_stops_on_cpu_frame() {
        let mut vm = make_vm();
        let options = ExecuteCycleOptions::new(EmulationMode::UntilCpuFrameEnds);
        let reason = vm.execute_cycle(&CancellationToken::new(), &options, false);
        assert_eq!(reason, ExecutionCompletionReason::CpuFrameCompleted);
        // NOPs: 256 of them fill 1024 tacts exactly.
        assert_eq!(vm.cpu().tacts(), 1024);
    }

    #[test]
    fn reset_restarts_frames() {
        let mut vm = make_vm();
        let reason = vm.execute_cycle(
            &CancellationToken::new(),
            &ExecuteCycleOptions::default(),
            false,
        );
        assert_eq!(reason, ExecutionCompletionReason::RenderFrameCompleted);
        assert_eq!(vm.frame_count(), 1);

        vm.reset();
        assert_eq!(vm.frame_count(), 0);
        assert_eq!(vm.current_frame_tact(), 0);
        assert_eq!(vm.cpu().tacts(), 0);
    }
}
