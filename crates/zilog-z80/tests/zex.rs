//! Minimal CP/M harness for ZEXDOC/ZEXALL.
//!
//! CP/M memory layout:
//! - 0x0000: Warm boot (HALT here ends the run)
//! - 0x0005: BDOS entry (intercepted before execution)
//! - 0x0006-0x0007: Top of TPA (programs read this for stack init)
//! - 0x0100: Program load address (TPA start)

use emu_core::SimpleBus;
use std::io::Write;
use zilog_z80::Z80;

/// Print characters for BDOS functions 2 and 9.
fn bdos(cpu: &Z80, bus: &SimpleBus, output: &mut String) {
    let regs = cpu.registers();
    match regs.c() {
        2 => output.push(char::from(regs.e())),
        9 => {
            let mut addr = regs.de();
            while bus.peek(addr) != b'$' {
                output.push(char::from(bus.peek(addr)));
                addr = addr.wrapping_add(1);
            }
        }
        func => eprintln!("\nUnknown BDOS function: {func}"),
    }
}

fn run_zex(binary: &[u8]) -> bool {
    let mut bus = SimpleBus::new();
    bus.load(0x0100, binary);
    bus.load(0x0000, &[0x76]);
    bus.load(0x0005, &[0xC9]);
    bus.load(0x0006, &[0x00, 0xFE]);

    let mut cpu = Z80::new();
    cpu.registers_mut().set_pc(0x0100);

    let mut output = String::new();
    let mut instructions: u64 = 0;

    loop {
        let pc = cpu.registers().pc();
        if pc == 0x0000 || cpu.is_halted() {
            eprintln!("Warm boot after {instructions} instructions");
            break;
        }

        if pc == 0x0005 {
            let printed = output.len();
            bdos(&cpu, &bus, &mut output);
            eprint!("{}", &output[printed..]);
            std::io::stderr().flush().expect("stderr");

            // Return to the caller without executing the stub.
            let regs = cpu.registers_mut();
            let sp = regs.sp();
            let ret = u16::from_le_bytes([bus.peek(sp), bus.peek(sp.wrapping_add(1))]);
            regs.set_sp(sp.wrapping_add(2));
            regs.set_pc(ret);
            continue;
        }

        cpu.execute_cpu_cycle(&mut bus).expect("flat RAM never fails");
        instructions += 1;
        if instructions % 10_000_000 == 0 {
            eprintln!("[{instructions} instructions]");
        }
    }

    eprintln!("Total: {} tacts", cpu.tacts());
    !output.contains("ERROR")
}

#[test]
#[ignore]
fn zexdoc() {
    let binary = std::fs::read("tests/data/zexdoc.com").expect("tests/data/zexdoc.com not found");
    assert!(run_zex(&binary), "ZEXDOC failed");
}

#[test]
#[ignore]
fn zexall() {
    let binary = std::fs::read("tests/data/zexall.com").expect("tests/data/zexall.com not found");
    assert!(run_zex(&binary), "ZEXALL failed");
}
