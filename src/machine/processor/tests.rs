use super::*;
use crate::machine::assembler::Assembler;

fn load_with<'isa>(isa: &'isa Isa, config: ProcessorConfig, source: &str) -> Processor<'isa> {
    let program = Assembler::new(isa)
        .assemble(source)
        .expect("assembly failed");
    let mut cpu = Processor::new(isa, config);
    cpu.load(&program).expect("load failed");
    cpu
}

fn load<'isa>(isa: &'isa Isa, source: &str) -> Processor<'isa> {
    load_with(isa, ProcessorConfig::default(), source)
}

fn run_to_halt<'isa>(isa: &'isa Isa, source: &str) -> Processor<'isa> {
    let mut cpu = load(isa, source);
    assert_eq!(cpu.run().expect("run failed"), Signal::Halted);
    cpu
}

const COUNTDOWN: &str = "
    addi r1, r0, 3
loop:
    addi r2, r2, 2
    addi r1, r1, -1
    bne r1, r0, loop
    halt
";

#[test]
fn arithmetic_and_logic() {
    let isa = Isa::new();
    let cpu = run_to_halt(
        &isa,
        "
        addi r1, r0, 5
        addi r2, r0, 3
        add r3, r1, r2
        sub r4, r2, r1
        and r5, r1, r2
        or r6, r1, r2
        nand r7, r1, r2
        halt
        ",
    );
    assert_eq!(cpu.registers(), &[0, 5, 3, 8, 0xFFFE, 1, 7, 0xFFFE]);
}

#[test]
fn zero_register_stays_zero() {
    let isa = Isa::new();
    let cpu = run_to_halt(&isa, "addi r0, r0, 5\nadd r1, r0, r0\nhalt");
    assert_eq!(cpu.register(0).unwrap(), 0);
    assert_eq!(cpu.register(1).unwrap(), 0);
}

#[test]
fn load_and_store_words() {
    let isa = Isa::new();
    let cpu = run_to_halt(
        &isa,
        "
        lea r1, data
        lw r2, r1, 0
        addi r2, r2, 1
        sw r2, 1(r1)
        halt
        data: .word 41
        .word 0
        ",
    );
    assert_eq!(cpu.register(1).unwrap(), 5);
    assert_eq!(cpu.register(2).unwrap(), 42);
    assert_eq!(cpu.memory()[6], 42);
}

#[test]
fn load_address_macro_loads_label_address() {
    let isa = Isa::new();
    let cpu = run_to_halt(&isa, "la r4, target\nhalt\nnoop\ntarget: .word 7");
    assert_eq!(cpu.register(4).unwrap(), 6);
}

#[test]
fn countdown_loop() {
    let isa = Isa::new();
    let cpu = run_to_halt(&isa, COUNTDOWN);
    assert_eq!(cpu.register(1).unwrap(), 0);
    assert_eq!(cpu.register(2).unwrap(), 6);
    assert_eq!(cpu.pc(), 5);
    assert_eq!(cpu.status(), Status::Halted);
}

#[test]
fn blt_compares_signed() {
    let isa = Isa::new();
    let cpu = run_to_halt(
        &isa,
        "
        addi r1, r0, -1
        blt r1, r0, negative
        addi r3, r0, 1
        halt
        negative: addi r3, r0, 2
        halt
        ",
    );
    assert_eq!(cpu.register(3).unwrap(), 2);
}

#[test]
fn jalr_links_and_returns() {
    let isa = Isa::new();
    let cpu = run_to_halt(
        &isa,
        "
        lea r1, function
        jalr r7, r1
        halt
        function: addi r2, r0, 9
        jalr r0, r7
        ",
    );
    assert_eq!(cpu.register(2).unwrap(), 9);
    assert_eq!(cpu.register(7).unwrap(), 2);
    assert_eq!(cpu.pc(), 3);
}

#[test]
fn halt_is_sticky() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "halt\naddi r1, r0, 1");
    assert_eq!(cpu.step().unwrap(), Signal::Halted);
    assert_eq!(cpu.pc(), 1);
    assert_eq!(cpu.history_depth(), 1);

    assert_eq!(cpu.step().unwrap(), Signal::Halted);
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.pc(), 1);
    assert_eq!(cpu.register(1).unwrap(), 0);
    assert_eq!(cpu.history_depth(), 1);
}

#[test]
fn rewind_restores_pre_step_state() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "addi r1, r0, 4\nsw r1, r0, 7\nhalt");
    cpu.step().unwrap();

    let before = cpu.state().clone();
    let depth = cpu.history_depth();
    assert_eq!(cpu.step().unwrap(), Signal::Stepped);
    assert_eq!(cpu.memory()[7], 4);

    assert!(cpu.rewind());
    assert_eq!(cpu.state(), &before);
    assert_eq!(cpu.history_depth(), depth);
    assert_eq!(cpu.status(), Status::Loaded);
}

#[test]
fn rewind_on_empty_history_changes_nothing() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "addi r1, r0, 4\nhalt");
    let before = cpu.state().clone();
    assert!(!cpu.rewind());
    assert_eq!(cpu.state(), &before);
    assert_eq!(cpu.status(), Status::Loaded);
}

#[test]
fn rewind_out_of_halt() {
    let isa = Isa::new();
    let mut cpu = run_to_halt(&isa, "addi r1, r0, 1\nhalt");
    assert!(cpu.rewind());
    assert_eq!(cpu.pc(), 1);
    assert_ne!(cpu.status(), Status::Halted);
    assert_eq!(cpu.step().unwrap(), Signal::Halted);
}

#[test]
fn breakpoint_stops_before_executing() {
    let isa = Isa::new();
    let mut cpu = load(&isa, COUNTDOWN);
    cpu.set_breakpoint(3);

    assert_eq!(cpu.run().unwrap(), Signal::BreakpointHit(3));
    assert_eq!(cpu.pc(), 3);
    assert_eq!(cpu.status(), Status::StoppedAtBreakpoint);
    assert_eq!(cpu.register(1).unwrap(), 2);

    // Continuing runs past the breakpoint and stops at it on the next lap.
    assert_eq!(cpu.run().unwrap(), Signal::BreakpointHit(3));
    assert_eq!(cpu.register(1).unwrap(), 1);

    cpu.clear_breakpoint();
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.register(2).unwrap(), 6);
}

#[test]
fn run_stops_at_whichever_comes_first() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "noop\nhalt\nnoop\nnoop");
    cpu.set_breakpoint(3);
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.pc(), 2);

    let mut cpu = load(&isa, "noop\nnoop\nhalt");
    cpu.set_breakpoint(1);
    assert_eq!(cpu.run().unwrap(), Signal::BreakpointHit(1));
}

#[test]
fn unreachable_breakpoint_never_triggers() {
    let isa = Isa::new();
    let mut cpu = load(
        &isa,
        "
        beq r0, r0, skip
        noop
        skip: halt
        ",
    );
    cpu.set_breakpoint(1);
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.status(), Status::Halted);
}

#[test]
fn set_breakpoint_replaces_previous() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "noop\nnoop\nnoop\nhalt");
    cpu.set_breakpoint(1);
    cpu.set_breakpoint(2);
    assert_eq!(cpu.breakpoint(), Some(2));
    assert_eq!(cpu.run().unwrap(), Signal::BreakpointHit(2));
}

#[test]
fn rewind_onto_breakpoint_reports_stopped() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "noop\nnoop\nhalt");
    cpu.step().unwrap();
    cpu.step().unwrap();
    cpu.set_breakpoint(1);
    assert!(cpu.rewind());
    assert_eq!(cpu.pc(), 1);
    assert_eq!(cpu.status(), Status::StoppedAtBreakpoint);
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
}

#[test]
fn reset_restores_program_and_keeps_breakpoint() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "addi r1, r0, 9\nsw r1, r0, 0\nhalt");
    let program = cpu.memory().to_vec();
    cpu.set_breakpoint(2);
    assert_eq!(cpu.run().unwrap(), Signal::BreakpointHit(2));
    assert_eq!(cpu.memory()[0], 9);

    cpu.reset();
    assert_eq!(cpu.memory(), program.as_slice());
    assert_eq!(cpu.registers(), &[0; REGISTER_COUNT]);
    assert_eq!(cpu.pc(), 0);
    assert_eq!(cpu.history_depth(), 0);
    assert_eq!(cpu.breakpoint(), Some(2));
    assert_eq!(cpu.status(), Status::Loaded);
}

#[test]
fn load_clears_breakpoint_and_history() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "noop\nhalt");
    cpu.set_breakpoint(1);
    cpu.step().unwrap();
    cpu.load(&[0xE000]).unwrap();
    assert_eq!(cpu.breakpoint(), None);
    assert_eq!(cpu.history_depth(), 0);
    assert_eq!(cpu.pc(), 0);
}

#[test]
fn reset_after_rejected_load_restores_previous_program() {
    let isa = Isa::new();
    let config = ProcessorConfig {
        memory_words: 4,
        history_limit: None,
    };
    let mut cpu = load_with(&isa, config, "addi r1, r0, 1\nhalt");
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert!(cpu.load(&[0; 5]).is_err());

    cpu.reset();
    assert_eq!(cpu.memory(), &[0x5201, 0xE000, 0, 0]);
    assert_eq!(cpu.register(1).unwrap(), 0);
    assert_eq!(cpu.status(), Status::Loaded);
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.register(1).unwrap(), 1);
}

#[test]
fn rewind_reports_loaded_with_history_left() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "noop\nnoop\nhalt");
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.status(), Status::Running);

    assert!(cpu.rewind());
    assert_eq!(cpu.status(), Status::Loaded);
    assert_eq!(cpu.history_depth(), 1);
    assert_eq!(cpu.pc(), 1);
}

#[test]
fn history_limit_drops_oldest() {
    let isa = Isa::new();
    let config = ProcessorConfig {
        history_limit: Some(2),
        ..ProcessorConfig::default()
    };
    let mut cpu = load_with(&isa, config, "noop\nnoop\nnoop\nnoop\nhalt");
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.history_depth(), 2);

    assert!(cpu.rewind());
    assert!(cpu.rewind());
    assert_eq!(cpu.pc(), 3);
    assert!(!cpu.rewind());
}

#[test]
fn load_image_with_bad_token_keeps_memory() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "addi r1, r0, 1\nhalt");
    cpu.step().unwrap();
    let before = cpu.state().clone();

    assert_eq!(
        cpu.load_image("0241 E0G0 0000"),
        Err(VMError::InvalidToken {
            token: "E0G0".into(),
            index: 1
        })
    );
    assert_eq!(cpu.state(), &before);
    assert_eq!(cpu.history_depth(), 1);
}

#[test]
fn load_image_runs() {
    let isa = Isa::new();
    let mut cpu = Processor::new(&isa, ProcessorConfig::default());
    cpu.load_image("5205 0241 E000").unwrap();
    assert_eq!(cpu.run().unwrap(), Signal::Halted);
    assert_eq!(cpu.register(1).unwrap(), 10);
}

#[test]
fn program_too_large() {
    let isa = Isa::new();
    let config = ProcessorConfig {
        memory_words: 4,
        history_limit: None,
    };
    let mut cpu = load_with(&isa, config, "addi r1, r0, 1");
    assert_eq!(
        cpu.load(&[0; 5]),
        Err(VMError::ProgramTooLarge {
            words: 5,
            capacity: 4
        })
    );
    assert_eq!(cpu.memory()[0], 0x5201);
}

#[test]
fn memory_size_is_capped() {
    let isa = Isa::new();
    let config = ProcessorConfig {
        memory_words: usize::MAX,
        history_limit: None,
    };
    let cpu = Processor::new(&isa, config);
    assert_eq!(cpu.memory().len(), MAX_MEMORY_WORDS);
}

#[test]
fn run_for_interrupts_infinite_loop() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "spin: beq r0, r0, spin");
    assert_eq!(cpu.run_for(10).unwrap(), Signal::Interrupted);
    assert_eq!(cpu.history_depth(), 10);
    assert_eq!(cpu.pc(), 0);
    assert_eq!(cpu.status(), Status::Running);
}

#[test]
fn run_while_sees_processor_state() {
    let isa = Isa::new();
    let mut cpu = load(&isa, COUNTDOWN);
    let signal = cpu
        .run_while(|cpu| cpu.register(2).unwrap_or_default() < 4)
        .unwrap();
    assert_eq!(signal, Signal::Interrupted);
    assert_eq!(cpu.register(2).unwrap(), 4);
}

#[test]
fn load_out_of_bounds_is_fatal_and_atomic() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "addi r1, r0, -1\nlw r2, r1, 0\nhalt");
    cpu.step().unwrap();
    let before = cpu.state().clone();

    assert_eq!(
        cpu.step(),
        Err(VMError::AddressOutOfBounds { address: 0xFFFF })
    );
    assert_eq!(cpu.state(), &before);
    assert_eq!(cpu.history_depth(), 1);
}

#[test]
fn store_out_of_bounds_is_fatal() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "sw r1, r0, -1\nhalt");
    assert_eq!(cpu.run(), Err(VMError::AddressOutOfBounds { address: -1 }));
    assert_eq!(cpu.pc(), 0);
    assert_eq!(cpu.history_depth(), 0);
}

#[test]
fn jump_out_of_bounds_is_fatal() {
    let isa = Isa::new();
    let mut cpu = load(&isa, "addi r1, r0, -1\njalr r2, r1\nhalt");
    cpu.step().unwrap();
    assert_eq!(
        cpu.step(),
        Err(VMError::AddressOutOfBounds { address: 0xFFFF })
    );
    assert_eq!(cpu.register(2).unwrap(), 0);
    assert_eq!(cpu.pc(), 1);
}

#[test]
fn running_off_the_end_of_memory() {
    let isa = Isa::new();
    let config = ProcessorConfig {
        memory_words: 2,
        history_limit: None,
    };
    let mut cpu = load_with(&isa, config, "noop\nnoop");
    assert_eq!(cpu.run(), Err(VMError::AddressOutOfBounds { address: 2 }));
    assert_eq!(cpu.pc(), 2);
    assert_eq!(cpu.history_depth(), 2);
}

#[test]
fn invalid_instruction_reports_word_and_address() {
    let isa = Isa::new();
    let mut cpu = Processor::new(&isa, ProcessorConfig::default());
    cpu.load(&[0x0000, 0xD123]).unwrap();
    assert_eq!(cpu.step().unwrap(), Signal::Stepped);
    assert_eq!(
        cpu.step(),
        Err(VMError::InvalidInstruction {
            word: 0xD123,
            address: 1
        })
    );
    assert_eq!(cpu.pc(), 1);
}

#[test]
fn disassembly_of_memory() {
    let isa = Isa::new();
    let mut cpu = Processor::new(&isa, ProcessorConfig::default());
    cpu.load(&[0x0000, 0x0241, 0x821E, 0xD123, 0xE000]).unwrap();

    let text: Vec<String> = (0..5)
        .map(|addr| cpu.disassemble_at(addr).unwrap().text)
        .collect();
    assert_eq!(
        text,
        vec![
            "noop",
            "add r1, r1, r1",
            "beq r1, r0, -2",
            ".word 0xD123",
            "halt"
        ]
    );

    let line = cpu.disassemble_at(1).unwrap().to_string();
    assert_eq!(line, "0x0001: 0241    577  add r1, r1, r1");
    assert!(cpu.disassemble_at(DEFAULT_MEMORY_WORDS).is_err());
}

#[test]
fn countdown_demo_sums_to_fifteen() {
    let isa = Isa::new();
    let cpu = run_to_halt(&isa, include_str!("../../../demos/countdown.s"));
    assert_eq!(cpu.register(2).unwrap(), 15);
    assert_eq!(cpu.memory()[11], 15);
}
