//! Interactive simulator for the 16-bit machine.
//!
//! Loads a program and drives the processor from a command prompt.
//!
//! # Usage
//! ```text
//! lcsim [program] [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: Assembly source (`.s`) or memory image / object file. Without
//!   it, a built-in demo program is loaded.
//!
//! # Options
//! - `--history-limit <n>`: Keep at most `n` undo snapshots
//! - `--memory <words>`: Memory capacity in words (defaults to 16384)

use lcsim::machine::assembler::{Assembler, assemble_file};
use lcsim::machine::errors::{Error, VMError};
use lcsim::machine::image::read_image_file;
use lcsim::machine::isa::{Isa, Word};
use lcsim::machine::processor::{Processor, ProcessorConfig, Signal};
use lcsim::utils::log;
use lcsim::{error, info, warn};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;

const PROMPT: &str = "(lcsim) ";
const SOURCE_EXTENSION: &str = "s";
/// Rows shown by `memory` when no count is given.
const DEFAULT_MEMORY_ROWS: usize = 8;
/// Instructions shown on each side of the listed address.
const LIST_RADIUS: usize = 4;

/// Program loaded when no file is given: multiplies `a` by `b` through a
/// subroutine and stores the product in `result`.
const DEFAULT_PROGRAM: &str = "\
main:
    la r1, a
    lw r2, r1, 0        # r2 = a
    lw r3, r1, 1        # r3 = b
    lea r6, multiply
    jalr r7, r6
    la r1, result
    sw r4, r1, 0
    halt

# r4 = r2 * r3, for r3 >= 0
multiply:
    add r4, r0, r0
mul_loop:
    beq r3, r0, mul_done
    add r4, r4, r2
    addi r3, r3, -1
    beq r0, r0, mul_loop
mul_done:
    jalr r0, r7

a:      .word 6
b:      .word 7
result: .word 0
";

/// A parsed prompt command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Step(usize),
    Continue,
    Back(usize),
    Registers,
    Reset,
    Memory { address: usize, count: usize },
    Break(usize),
    ClearBreak,
    List(Option<usize>),
    Print(u8),
    Exit,
    Help,
}

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    let mut program_path: Option<String> = None;
    let mut config = ProcessorConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            k @ ("--history-limit" | "--memory") => {
                i += 1;
                let Some(value) = args.get(i).and_then(|v| v.parse::<usize>().ok()) else {
                    error!("{k} requires a numeric argument");
                    process::exit(1);
                };
                if k == "--memory" {
                    config.memory_words = value;
                } else {
                    config.history_limit = Some(value);
                }
                i += 1;
            }
            other if other.starts_with('-') || program_path.is_some() => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            other => {
                program_path = Some(other.to_string());
                i += 1;
            }
        }
    }

    let isa = Isa::new();
    let program = match &program_path {
        Some(path) => load_program(&isa, path),
        None => Assembler::new(&isa)
            .assemble_named(DEFAULT_PROGRAM, "<default program>")
            .map_err(Error::from),
    };
    let program = program.unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    });

    let mut cpu = Processor::new(&isa, config);
    if let Err(e) = cpu.load(&program) {
        error!("{e}");
        process::exit(1);
    }

    info!("Type `help` for the list of commands.");
    if let Err(e) = repl(&mut cpu) {
        error!("{e}");
        process::exit(1);
    }
}

/// Assembles `.s` files; reads anything else as a memory image.
fn load_program(isa: &Isa, path: &str) -> Result<Vec<Word>, Error> {
    let is_source = Path::new(path)
        .extension()
        .is_some_and(|ext| ext == SOURCE_EXTENSION);
    if is_source {
        assemble_file(isa, path)
    } else {
        Ok(read_image_file(path)?)
    }
}

fn repl(cpu: &mut Processor<'_>) -> io::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            return Ok(());
        };

        match parse_command(&line) {
            Ok(Some(Command::Exit)) => return Ok(()),
            Ok(Some(command)) => execute(cpu, command),
            Ok(None) => {}
            Err(message) => warn!("{message}"),
        }
    }
}

/// Parses one prompt line. Blank lines yield `Ok(None)`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let extra = words.next();

    let command = match (name.to_ascii_lowercase().as_str(), arg, extra) {
        ("run" | "r", None, None) => Command::Run,
        ("step" | "s", None, None) => Command::Step(1),
        ("step" | "s", Some(n), None) => Command::Step(parse_count(n)?),
        ("continue" | "c", None, None) => Command::Continue,
        ("back" | "b", None, None) => Command::Back(1),
        ("back" | "b", Some(n), None) => Command::Back(parse_count(n)?),
        ("register" | "registers" | "reg", None, None) => Command::Registers,
        ("reset", None, None) => Command::Reset,
        ("memory" | "mem" | "m", Some(address), count) => Command::Memory {
            address: parse_address(address)?,
            count: count.map(parse_count).transpose()?.unwrap_or(DEFAULT_MEMORY_ROWS),
        },
        ("break", Some("clear"), None) => Command::ClearBreak,
        ("break", Some(address), None) => Command::Break(parse_address(address)?),
        ("list" | "l", address, None) => Command::List(address.map(parse_address).transpose()?),
        ("print" | "p", Some(reg), None) => Command::Print(parse_register(reg)?),
        ("exit" | "quit" | "q", None, None) => Command::Exit,
        ("help" | "h" | "?", None, None) => Command::Help,
        (other, ..) => return Err(format!("Unknown command or bad arguments: `{other}` (try `help`)")),
    };
    Ok(Some(command))
}

/// Parses a decimal or `0x` hexadecimal address.
fn parse_address(token: &str) -> Result<usize, String> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => token.parse::<usize>(),
    };
    parsed.map_err(|_| format!("Invalid address: `{token}`"))
}

fn parse_count(token: &str) -> Result<usize, String> {
    match token.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Invalid count: `{token}`")),
    }
}

fn parse_register(token: &str) -> Result<u8, String> {
    let digits = token
        .strip_prefix('$')
        .unwrap_or(token)
        .trim_start_matches(['r', 'R']);
    digits
        .parse::<u8>()
        .map_err(|_| format!("Invalid register: `{token}`"))
}

fn execute(cpu: &mut Processor<'_>, command: Command) {
    match command {
        Command::Run => report(cpu, |cpu| cpu.run()),
        Command::Continue => report(cpu, |cpu| cpu.run()),
        Command::Step(n) => {
            for _ in 0..n {
                match cpu.step() {
                    Ok(Signal::Stepped) => {}
                    other => {
                        report(cpu, |_| other);
                        return;
                    }
                }
            }
            show_current(cpu);
        }
        Command::Back(n) => {
            let undone = (0..n).take_while(|_| cpu.rewind()).count();
            if undone < n {
                warn!("History exhausted after {undone} step(s)");
            }
            show_current(cpu);
        }
        Command::Registers => print_registers(cpu),
        Command::Reset => {
            cpu.reset();
            show_current(cpu);
        }
        Command::Memory { address, count } => {
            for addr in address..address.saturating_add(count) {
                match cpu.disassemble_at(addr) {
                    Ok(line) => println!("{line}"),
                    Err(e) => {
                        warn!("{e}");
                        break;
                    }
                }
            }
        }
        Command::Break(address) => {
            cpu.set_breakpoint(address);
            println!("Breakpoint set at {address:#06x}");
        }
        Command::ClearBreak => {
            cpu.clear_breakpoint();
            println!("Breakpoint cleared");
        }
        Command::List(address) => {
            let center = address.unwrap_or_else(|| cpu.pc());
            let start = center.saturating_sub(LIST_RADIUS);
            for addr in start..=center.saturating_add(LIST_RADIUS) {
                let Ok(line) = cpu.disassemble_at(addr) else {
                    break;
                };
                let marker = match (addr == cpu.pc(), cpu.breakpoint() == Some(addr)) {
                    (true, true) => "B>",
                    (true, false) => " >",
                    (false, true) => "B ",
                    (false, false) => "  ",
                };
                println!("{marker} {line}");
            }
        }
        Command::Print(reg) => match cpu.register(reg) {
            Ok(value) => println!("r{reg} = {value} ({value:#06x}, signed {})", value as i16),
            Err(e) => warn!("{e}"),
        },
        Command::Help => print_help(),
        Command::Exit => {}
    }
}

/// Runs `action` and prints how it stopped.
fn report<'isa>(
    cpu: &mut Processor<'isa>,
    action: impl FnOnce(&mut Processor<'isa>) -> Result<Signal, VMError>,
) {
    match action(cpu) {
        Ok(Signal::Halted) => println!("Halted at {:#06x}", cpu.pc()),
        Ok(Signal::BreakpointHit(address)) => println!("Breakpoint hit at {address:#06x}"),
        Ok(Signal::Interrupted) => println!("Interrupted at {:#06x}", cpu.pc()),
        Ok(Signal::Stepped) => {}
        Err(e) => error!("{e}"),
    }
    show_current(cpu);
}

fn show_current(cpu: &Processor<'_>) {
    match cpu.disassemble_at(cpu.pc()) {
        Ok(line) => println!("{line}"),
        Err(_) => println!("pc = {:#06x} (outside memory)", cpu.pc()),
    }
}

fn print_registers(cpu: &Processor<'_>) {
    for (i, value) in cpu.registers().iter().enumerate() {
        println!("r{i} = {value:#06x} {value:>6}");
    }
    println!("pc = {:#06x}", cpu.pc());
    println!(
        "status = {:?}, breakpoint = {}, history = {}",
        cpu.status(),
        cpu.breakpoint()
            .map_or_else(|| "none".to_string(), |b| format!("{b:#06x}")),
        cpu.history_depth()
    );
}

const HELP: &str = "\
Commands:
    run                      Run until halt or the breakpoint
    step [n]                 Execute n instructions (default 1)
    continue                 Resume after a breakpoint stop
    back [n]                 Undo n steps (default 1)
    register                 Show all registers
    reset                    Reload the program, keeping the breakpoint
    memory <addr> [count]    Dump count words starting at addr (default 8)
    break <addr>             Set the breakpoint (`break clear` removes it)
    list [addr]              Disassemble around addr (default: pc)
    print <reg>              Show one register (e.g. `print r3`)
    exit                     Leave the simulator
    help                     Show this message

Addresses accept decimal or 0x-prefixed hexadecimal.";

fn print_help() {
    println!("{HELP}");
}

const USAGE: &str = "\
Simulator

USAGE:
    {program} [program] [OPTIONS]

ARGS:
    [program]    Assembly source (.s) or memory image / object file.
                 A built-in demo program is loaded when omitted.

OPTIONS:
    --history-limit <n>    Keep at most n undo snapshots (default: unbounded)
    --memory <words>       Memory capacity in words (default: 16384)
    -h, --help             Print this help message

ENVIRONMENT:
    LCSIM_LOG               Log level: debug, info, warn, error, off (default: info)
    LCSIM_LOG_TIMESTAMPS    Set to 0 to hide log timestamps

EXAMPLES:
    # Run the built-in demo
    {program}

    # Assemble and run a source file
    {program} demos/countdown.s

    # Run an assembled object file with a bounded undo history
    {program} demos/countdown.lc --history-limit 1000
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
