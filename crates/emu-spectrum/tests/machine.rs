//! Machine state transitions, run loop and background execution.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use emu_core::{BusError, Observable, Value};
use emu_spectrum::{
    BreakpointTable, CancellationToken, EmulationMode, ExecuteCycleOptions,
    ExecutionCompletionReason, FlatMemory, InterruptDevice, MachineConfig, MachineError,
    PortDevice, Spectrum48Ports, SpectrumMachine, SpectrumVm, VmState, VmStateChange,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_machine(code: &[u8]) -> SpectrumMachine {
    let mut vm = SpectrumVm::with_devices(
        MachineConfig::default(),
        Box::new(FlatMemory::new()),
        Box::new(Spectrum48Ports::uncontended()),
        Box::new(InterruptDevice::new(0)),
    );
    vm.load(0x0000, code);
    SpectrumMachine::from_vm(vm)
}

fn changes(rx: &std::sync::mpsc::Receiver<VmStateChange>) -> Vec<(VmState, VmState)> {
    rx.try_iter().map(|c| (c.old, c.new)).collect()
}

#[test]
fn power_cycle_publishes_every_step() {
    init_logging();
    let mut machine = make_machine(&[]);
    let rx = machine.subscribe();

    machine.turn_on().unwrap();
    machine.start().unwrap();
    machine.pause().unwrap();
    machine.start().unwrap();
    machine.stop().unwrap();
    machine.turn_off().unwrap();

    use VmState::{
        Off, On, Paused, Pausing, Running, Starting, Stopped, Stopping, TurningOff, TurningOn,
    };
    assert_eq!(
        changes(&rx),
        vec![
            (Off, TurningOn),
            (TurningOn, On),
            (On, Starting),
            (Starting, Running),
            (Running, Pausing),
            (Pausing, Paused),
            (Paused, Starting),
            (Starting, Running),
            (Running, Stopping),
            (Stopping, Stopped),
            (Stopped, TurningOff),
            (TurningOff, Off),
        ]
    );
}

#[test]
fn invalid_transitions_are_rejected() {
    let mut machine = make_machine(&[]);
    assert!(matches!(
        machine.pause(),
        Err(MachineError::InvalidState {
            state: VmState::Off,
            ..
        })
    ));
    machine.turn_on().unwrap();
    assert!(machine.turn_on().is_err());
    assert!(machine.stop().is_err());
    assert!(machine.pause().is_err());
    assert_eq!(machine.state(), VmState::On);
}

#[test]
fn dropped_subscribers_are_forgotten() {
    let mut machine = make_machine(&[]);
    drop(machine.subscribe());
    let rx = machine.subscribe();
    machine.turn_on().unwrap();
    assert_eq!(changes(&rx).len(), 2);
}

#[test]
fn run_until_halt_pauses_afterwards() {
    init_logging();
    let mut machine = make_machine(&[0x3E, 0x10, 0x87, 0x76]); // LD A,$10 : ADD A,A : HALT
    machine.turn_on().unwrap();

    let reason = machine
        .run(
            &CancellationToken::new(),
            &ExecuteCycleOptions::new(EmulationMode::UntilHalt),
        )
        .unwrap();

    assert_eq!(reason, ExecutionCompletionReason::Halted);
    assert_eq!(machine.state(), VmState::Paused);
    assert_eq!(machine.query("cpu.a"), Some(Value::U8(0x20)));
    assert_eq!(machine.query("vm.state"), Some(Value::from("Paused")));
    assert_eq!(machine.query("vm.last_completion"), Some(Value::from("Halted")));
}

#[test]
fn restart_from_stopped_resets_the_cpu() {
    let mut machine = make_machine(&[0x3E, 0x10, 0x76]); // LD A,$10 : HALT
    machine.turn_on().unwrap();
    machine
        .run(&CancellationToken::new(), &ExecuteCycleOptions::until(0x0002))
        .unwrap();
    assert_eq!(machine.vm().cpu().registers().pc(), 0x0002);
    machine.stop().unwrap();
    machine.vm_mut().cpu_mut().registers_mut().set_b(0x77);

    machine.start().unwrap();

    // RESET line: PC and tacts restart from zero, general registers survive.
    let cpu = machine.vm().cpu();
    assert_eq!(cpu.registers().pc(), 0x0000);
    assert_eq!(cpu.tacts(), 0);
    assert_eq!(cpu.registers().a(), 0x10);
    assert_eq!(cpu.registers().b(), 0x77);
    assert_eq!(machine.state(), VmState::Running);
}

#[test]
fn continuous_run_completes_one_render_frame() {
    let mut machine = make_machine(&[]);
    let frames = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&frames);
    machine.set_cpu_frame_callback(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        ControlFlow::Continue(())
    }));
    machine.turn_on().unwrap();

    let reason = machine
        .run(&CancellationToken::new(), &ExecuteCycleOptions::default())
        .unwrap();

    assert_eq!(reason, ExecutionCompletionReason::RenderFrameCompleted);
    assert_eq!(machine.vm().frame_count(), 1);
    // 68 full CPU frames of 1024 tacts, then the render frame boundary.
    assert_eq!(frames.load(Ordering::SeqCst), 69);
    assert_eq!(machine.vm().cpu_frame_count(), 68);
    assert_eq!(machine.vm().last_cpu_frame_tacts(), 1024);
    assert_eq!(machine.vm().last_render_frame_tacts(), 69_888);
    assert_eq!(machine.query("vm.cpu_frame_count"), Some(Value::U64(68)));
    assert_eq!(
        machine.query("vm.last_render_frame_tacts"),
        Some(Value::U64(69_888))
    );
    assert_eq!(
        machine.query("vm.last_cpu_frame_tacts"),
        Some(Value::U64(1024))
    );
}

#[test]
fn until_cpu_frame_mode_returns_each_cpu_frame() {
    let mut machine = make_machine(&[]);
    machine.turn_on().unwrap();
    let reason = machine
        .run(
            &CancellationToken::new(),
            &ExecuteCycleOptions::new(EmulationMode::UntilCpuFrameEnds),
        )
        .unwrap();
    assert_eq!(reason, ExecutionCompletionReason::CpuFrameCompleted);
    assert_eq!(machine.vm().cpu().tacts(), 1024);
}

#[test]
fn cpu_frame_callback_can_cancel_the_run() {
    let mut machine = make_machine(&[]);
    machine.set_cpu_frame_callback(Box::new(|vm| {
        if vm.cpu().tacts() >= 3 * 1024 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }));
    machine.turn_on().unwrap();

    let reason = machine
        .run(&CancellationToken::new(), &ExecuteCycleOptions::default())
        .unwrap();
    assert_eq!(reason, ExecutionCompletionReason::Cancelled);
    assert_eq!(machine.vm().cpu().tacts(), 3 * 1024);
    assert_eq!(machine.state(), VmState::Paused);
}

#[test]
fn debugger_run_stops_at_breakpoint() {
    let mut machine = make_machine(&[0x00, 0x00, 0x00, 0x76]);
    let mut breakpoints = BreakpointTable::new();
    breakpoints.insert_conditional(0x0002, None).unwrap();
    machine
        .vm_mut()
        .set_debug_info_provider(Box::new(breakpoints));
    machine.turn_on().unwrap();

    let options = ExecuteCycleOptions::new(EmulationMode::Debugger);
    let reason = machine.run(&CancellationToken::new(), &options).unwrap();
    assert_eq!(reason, ExecutionCompletionReason::BreakpointReached);
    assert_eq!(machine.query("pc"), Some(Value::U16(0x0002)));
}

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
fn device_failure_stops_the_machine() {
    init_logging();
    let mut vm = SpectrumVm::with_devices(
        MachineConfig::default(),
        Box::new(FlatMemory::new()),
        Box::new(DeadPort),
        Box::new(InterruptDevice::new(0)),
    );
    vm.load(0x0000, &[0xDB, 0xFE]); // IN A,($FE)
    let mut machine = SpectrumMachine::from_vm(vm);
    machine.turn_on().unwrap();

    let err = machine
        .run(&CancellationToken::new(), &ExecuteCycleOptions::default())
        .unwrap_err();

    assert_eq!(
        err,
        MachineError::Bus(BusError::Port {
            port: 0x00FE,
            reason: "no device".into()
        })
    );
    assert_eq!(machine.state(), VmState::Stopped);
    assert!(machine.vm().last_error().is_some());
}

#[test]
fn background_run_pauses_and_hands_back() {
    init_logging();
    // JR $ : spin forever
    let mut machine = make_machine(&[0x18, 0xFE]);
    machine.turn_on().unwrap();
    let rx = machine.subscribe();

    let running = machine.spawn(ExecuteCycleOptions::default());
    // Wait until the run loop is actually running.
    let started = rx
        .recv_timeout(Duration::from_secs(5))
        .and_then(|_| rx.recv_timeout(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(started.new, VmState::Running);
    assert!(!running.is_finished());

    let (machine, result) = running.pause().unwrap();
    assert_eq!(result, Ok(ExecutionCompletionReason::Cancelled));
    assert_eq!(machine.state(), VmState::Paused);
    assert_eq!(machine.vm().cpu().registers().pc(), 0x0000);
}

#[test]
fn background_run_ends_on_its_own() {
    let mut machine = make_machine(&[0x00, 0x76]);
    machine.turn_on().unwrap();

    let running = machine.spawn(ExecuteCycleOptions::new(EmulationMode::UntilHalt));
    let (machine, result) = running.join().unwrap();

    assert_eq!(result, Ok(ExecutionCompletionReason::Halted));
    assert_eq!(machine.state(), VmState::Paused);
}

#[test]
fn background_stop_leaves_machine_stopped() {
    let mut machine = make_machine(&[0x18, 0xFE]);
    machine.turn_on().unwrap();
    let running = machine.spawn(ExecuteCycleOptions::default());
    let token = running.token().clone();

    let (machine, result) = running.stop().unwrap();
    assert!(token.is_cancelled());
    assert_eq!(result, Ok(ExecutionCompletionReason::Cancelled));
    assert_eq!(machine.state(), VmState::Stopped);
}

#[test]
fn background_stop_reports_device_failure() {
    let mut vm = SpectrumVm::with_devices(
        MachineConfig::default(),
        Box::new(FlatMemory::new()),
        Box::new(DeadPort),
        Box::new(InterruptDevice::new(0)),
    );
    vm.load(0x0000, &[0xDB, 0xFE]); // IN A,($FE)
    let mut machine = SpectrumMachine::from_vm(vm);
    machine.turn_on().unwrap();

    let running = machine.spawn(ExecuteCycleOptions::default());
    // Let the run loop fail on its own before stopping it.
    while !running.is_finished() {
        thread::sleep(Duration::from_millis(1));
    }
    let (machine, result) = running.stop().unwrap();

    assert!(matches!(result, Err(MachineError::Bus(BusError::Port { port: 0x00FE, .. }))));
    assert_eq!(machine.state(), VmState::Stopped);
}

#[test]
fn dropping_the_handle_ends_the_run() {
    let mut machine = make_machine(&[0x18, 0xFE]); // JR $
    let frames = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&frames);
    machine.vm_mut().set_frame_callback(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        ControlFlow::Continue(())
    }));
    machine.turn_on().unwrap();
    let rx = machine.subscribe();

    let running = machine.spawn(ExecuteCycleOptions::default());
    let started = rx
        .recv_timeout(Duration::from_secs(5))
        .and_then(|_| rx.recv_timeout(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(started.new, VmState::Running);

    drop(running);
    let after_drop = frames.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(frames.load(Ordering::SeqCst), after_drop);

    // The run loop paused the machine before it was dropped.
    let last = rx.iter().last().unwrap();
    assert_eq!(last.new, VmState::Paused);
}

#[test]
fn peek_and_poke_skip_contention() {
    let rom = vec![0u8; 0x4000];
    let mut machine = SpectrumMachine::new(MachineConfig::spectrum48_pal(rom)).unwrap();
    machine.poke(0x4000, 0x5A);
    assert_eq!(machine.peek(0x4000), 0x5A);
    assert_eq!(machine.query("memory.0x4000"), Some(Value::U8(0x5A)));
    assert_eq!(machine.vm().bus().contention_tacts(), 0);
}
