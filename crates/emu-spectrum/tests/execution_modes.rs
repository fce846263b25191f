//! Execution cycle stop conditions, frame bookkeeping and contention.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use emu_core::BusError;
use emu_spectrum::{
    CancellationToken, EmulationMode, ExecuteCycleOptions, ExecutionCompletionReason, FlatMemory,
    InterruptDevice, MachineConfig, PortDevice, ScreenTiming, Spectrum48Ports, SpectrumVm,
};
use zilog_z80::InterruptMode;

const ARITHMETIC: [u8; 6] = [
    0x3E, 0x10, // LD A,$10
    0x87, // ADD A,A
    0x47, // LD B,A
    0x4F, // LD C,A
    0x76, // HALT
];

fn flat_vm(config: MachineConfig, code: &[u8]) -> SpectrumVm {
    let interrupt = InterruptDevice::new(config.screen.interrupt_tact);
    let mut vm = SpectrumVm::with_devices(
        config,
        Box::new(FlatMemory::new()),
        Box::new(Spectrum48Ports::uncontended()),
        Box::new(interrupt),
    );
    vm.inject_code(0x8000, code);
    vm
}

fn run(
    vm: &mut SpectrumVm,
    options: ExecuteCycleOptions,
    cpu_frame: bool,
) -> ExecutionCompletionReason {
    vm.execute_cycle(&CancellationToken::new(), &options, cpu_frame)
}

#[test]
fn until_halt_ignores_termination_point() {
    let mut vm = flat_vm(MachineConfig::default(), &ARITHMETIC);
    let options =
        ExecuteCycleOptions::new(EmulationMode::UntilHalt).with_termination_point(0x8002);

    assert_eq!(run(&mut vm, options, false), ExecutionCompletionReason::Halted);

    let regs = vm.cpu().registers();
    assert_eq!(regs.a(), 0x20);
    assert_eq!(regs.b(), 0x20);
    assert_eq!(regs.c(), 0x20);
    assert!(vm.cpu().is_halted());
    // HALT keeps PC on the opcode until an interrupt releases it.
    assert_eq!(regs.pc(), 0x8005);
}

#[test]
fn stops_at_termination_point() {
    let mut vm = flat_vm(MachineConfig::default(), &ARITHMETIC);

    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::until(0x8003), false),
        ExecutionCompletionReason::TerminationPointReached
    );

    let regs = vm.cpu().registers();
    assert_eq!(regs.a(), 0x20);
    assert_eq!(regs.b(), 0x00);
    assert_eq!(regs.c(), 0x00);
    assert_eq!(regs.pc(), 0x8003);
    assert_eq!(vm.cpu().tacts(), 11);
}

#[test]
fn stops_when_cpu_frame_ends() {
    let code = [
        0x06, 0x00, // LD B,0
        0x3E, 0x00, // LD A,0
        0x3C, // INC A
        0x10, 0xFD, // DJNZ -3
        0x76, // HALT
    ];
    let mut vm = flat_vm(MachineConfig::default(), &code);

    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), true),
        ExecutionCompletionReason::CpuFrameCompleted
    );

    let regs = vm.cpu().registers();
    assert_eq!(regs.a(), 0x3C);
    assert_eq!(regs.b(), 0xC4);
    assert_eq!(regs.pc(), 0x8004);
    assert_eq!(vm.cpu().tacts(), 1034);
    assert_eq!(vm.cpu_frame_count(), 1);
    assert_eq!(vm.last_cpu_frame_tacts(), 1034);
}

#[test]
fn cpu_frame_budget_restarts_each_call() {
    let mut vm = flat_vm(MachineConfig::default().with_cpu_frame_tacts(100), &[]);

    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), true),
        ExecutionCompletionReason::CpuFrameCompleted
    );
    assert_eq!(vm.cpu().tacts(), 100);
    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), true),
        ExecutionCompletionReason::CpuFrameCompleted
    );
    assert_eq!(vm.cpu().tacts(), 200);
    assert_eq!(vm.cpu_frame_count(), 2);
    assert_eq!(vm.last_cpu_frame_tacts(), 100);
    // Render frames are counted separately.
    assert_eq!(vm.frame_count(), 0);
}

#[test]
fn render_frame_overflow_carries_over() {
    // 102-tact frames of 4-tact NOPs: the first frame ends 2 tacts late.
    let screen = ScreenTiming {
        frame_tacts: 102,
        ..ScreenTiming::pal_48k()
    };
    let mut vm = flat_vm(MachineConfig::default().with_screen(screen), &[]);

    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), false),
        ExecutionCompletionReason::RenderFrameCompleted
    );
    assert_eq!(vm.cpu().tacts(), 104);
    assert_eq!(vm.overflow(), 2);
    assert_eq!(vm.frame_count(), 1);
    assert_eq!(vm.current_frame_tact(), 2);
    assert_eq!(vm.last_render_frame_tacts(), 104);

    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), false),
        ExecutionCompletionReason::RenderFrameCompleted
    );
    assert_eq!(vm.cpu().tacts(), 204);
    assert_eq!(vm.overflow(), 0);
    assert_eq!(vm.frame_count(), 2);
    assert_eq!(vm.last_render_frame_tacts(), 100);
    assert_eq!(vm.cpu_frame_count(), 0);
}

#[test]
fn step_into_completes_frame_without_stopping_there() {
    let screen = ScreenTiming {
        frame_tacts: 8,
        ..ScreenTiming::pal_48k()
    };
    let mut vm = flat_vm(MachineConfig::default().with_screen(screen), &[]);
    let options = ExecuteCycleOptions::new(EmulationMode::StepInto);

    assert_eq!(
        run(&mut vm, options, false),
        ExecutionCompletionReason::BreakpointReached
    );
    assert_eq!(vm.cpu().registers().pc(), 0x8001);
    assert_eq!(vm.frame_count(), 0);

    // The second NOP ends the frame; the step still reports one instruction.
    assert_eq!(
        run(&mut vm, options, false),
        ExecutionCompletionReason::BreakpointReached
    );
    assert_eq!(vm.cpu().registers().pc(), 0x8002);
    assert_eq!(vm.cpu().tacts(), 8);
    assert_eq!(vm.frame_count(), 1);
    assert_eq!(vm.last_breakpoint(), Some(0x8002));
}

#[test]
fn frame_callback_sees_updated_frame() {
    let screen = ScreenTiming {
        frame_tacts: 100,
        ..ScreenTiming::pal_48k()
    };
    let mut vm = flat_vm(MachineConfig::default().with_screen(screen), &[]);
    let seen = Arc::new(AtomicU64::new(0));
    let seen_in_callback = Arc::clone(&seen);
    vm.set_frame_callback(Box::new(move |vm| {
        seen_in_callback.store(vm.frame_count(), Ordering::SeqCst);
        ControlFlow::Continue(())
    }));

    run(&mut vm, ExecuteCycleOptions::default(), false);
    run(&mut vm, ExecuteCycleOptions::default(), false);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn frame_callback_can_cancel() {
    let mut vm = flat_vm(MachineConfig::default(), &[]);
    vm.set_frame_callback(Box::new(|_| ControlFlow::Break(())));
    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), false),
        ExecutionCompletionReason::Cancelled
    );
    assert_eq!(vm.frame_count(), 1);
}

#[test]
fn frame_interrupt_reaches_the_cpu() {
    let code = [
        0xFB, // EI
        0x76, // HALT
    ];
    let mut vm = flat_vm(MachineConfig::default().with_interrupt_tact(100), &code);
    vm.cpu_mut().registers_mut().set_sp(0xC000);
    vm.cpu_mut().set_interrupt_mode(InterruptMode::Im1);
    vm.load(0x0038, &[0x76]); // HALT in the handler

    // Before the interrupt tact nothing happens but HALT.
    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::until(0x0038), false),
        ExecutionCompletionReason::TerminationPointReached
    );
    assert!(vm.interrupt_source().interrupt_raised());
    assert!(!vm.cpu().iff1());
    // Return address is the instruction after HALT.
    assert_eq!(vm.peek(0xBFFE), 0x02);
    assert_eq!(vm.peek(0xBFFF), 0x80);
    assert!(vm.current_frame_tact() >= 100);
}

#[test]
fn cancellation_is_polled_each_instruction() {
    let mut vm = flat_vm(MachineConfig::default(), &[]);
    let token = CancellationToken::new();
    let canceller = token.clone();
    vm.set_frame_callback(Box::new(move |_| {
        canceller.cancel();
        ControlFlow::Continue(())
    }));

    let options = ExecuteCycleOptions::default();
    assert_eq!(
        vm.execute_cycle(&token, &options, false),
        ExecutionCompletionReason::RenderFrameCompleted
    );
    let tacts = vm.cpu().tacts();
    assert_eq!(
        vm.execute_cycle(&token, &options, false),
        ExecutionCompletionReason::Cancelled
    );
    assert_eq!(vm.cpu().tacts(), tacts);
}

/// A port that is not wired to anything.
struct DeadPort;

impl PortDevice for DeadPort {
    fn read_port(&mut self, port: u16) -> Result<u8, BusError> {
        Err(BusError::Port {
            port,
            reason: "no device".into(),
        })
    }

    fn write_port(&mut self, _port: u16, _value: u8) -> Result<(), BusError> {
        Ok(())
    }
}

#[test]
fn device_failure_is_an_exception() {
    let mut vm = SpectrumVm::with_devices(
        MachineConfig::default(),
        Box::new(FlatMemory::new()),
        Box::new(DeadPort),
        Box::new(InterruptDevice::new(0)),
    );
    vm.inject_code(0x8000, &[0x3E, 0x12, 0xDB, 0x34]); // LD A,$12 : IN A,($34)

    assert_eq!(
        run(&mut vm, ExecuteCycleOptions::default(), false),
        ExecutionCompletionReason::Exception
    );
    assert_eq!(
        vm.last_error(),
        Some(&BusError::Port {
            port: 0x1234,
            reason: "no device".into()
        })
    );
    assert_eq!(vm.last_completion(), Some(ExecutionCompletionReason::Exception));
}

#[test]
fn contention_is_counted_per_cycle() {
    let rom = vec![0u8; 0x4000];
    let mut vm = SpectrumVm::new(MachineConfig::spectrum48_pal(rom)).expect("valid ROM");
    // NOPs in contended RAM for a whole frame.
    vm.cpu_mut().registers_mut().set_pc(0x4000);

    run(&mut vm, ExecuteCycleOptions::default(), false);
    let first = vm.cycle_contention();
    assert!(first > 0);
    assert!(vm.cpu().tacts() >= 69_888);

    run(&mut vm, ExecuteCycleOptions::default(), false);
    assert_eq!(vm.last_cycle_contention(), first);
}

#[test]
fn uncontended_ram_costs_nothing_extra() {
    let rom = vec![0u8; 0x4000];
    let mut vm = SpectrumVm::new(MachineConfig::spectrum48_pal(rom)).expect("valid ROM");
    vm.inject_code(0x8000, &[0x00, 0x00, 0x76]);

    let options = ExecuteCycleOptions::new(EmulationMode::UntilHalt);
    assert_eq!(run(&mut vm, options, false), ExecutionCompletionReason::Halted);
    assert_eq!(vm.cpu().tacts(), 12);
    assert_eq!(vm.cycle_contention(), 0);
}
