//! Execution engine.
//!
//! The [`Processor`] fetches, decodes and executes words from its memory one
//! step at a time. Before every step it records a full snapshot of the
//! machine so that [`Processor::rewind`] can undo it.
//!
//! Instruction dispatch is generated from
//! [`for_each_instruction!`](crate::for_each_instruction): every table row
//! names an `op_*` handler on [`MachineState`], so an instruction without a
//! handler fails to compile.

mod history;
mod memory;
mod registers;
#[cfg(test)]
mod tests;

pub use memory::Memory;
pub use registers::Registers;

use crate::for_each_instruction;
use crate::machine::errors::VMError;
use crate::machine::image::parse_image;
use crate::machine::isa::{Instruction, Isa, REGISTER_COUNT, Word};
use crate::{debug, info};
use history::History;
use std::fmt;

/// Default memory capacity in words.
pub const DEFAULT_MEMORY_WORDS: usize = 16 * 1024;
/// Largest memory a 16-bit address can reach.
pub const MAX_MEMORY_WORDS: usize = 1 << 16;

/// Processor construction options.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProcessorConfig {
    /// Memory capacity in words, capped at [`MAX_MEMORY_WORDS`].
    pub memory_words: usize,
    /// Maximum number of undo snapshots kept; `None` keeps all of them.
    pub history_limit: Option<usize>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            memory_words: DEFAULT_MEMORY_WORDS,
            history_limit: None,
        }
    }
}

/// Lifecycle of a loaded program.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// Program loaded or reset, or a step was just rewound and the PC is not
    /// at the breakpoint. History may be non-empty after a rewind.
    Loaded,
    /// At least one step executed since the last load, reset or rewind.
    Running,
    /// A run stopped in front of the breakpoint.
    StoppedAtBreakpoint,
    /// A `halt` instruction executed.
    Halted,
}

/// Why a `step` or `run` returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    /// One instruction executed; the program can continue.
    Stepped,
    /// A `halt` instruction executed, now or earlier.
    Halted,
    /// Execution stopped in front of the breakpoint at this address.
    BreakpointHit(usize),
    /// The run's tripwire asked it to stop.
    Interrupted,
}

/// Control-flow outcome of one instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Flow {
    /// Continue with the following word.
    Next,
    /// Continue at the given address.
    Jump(i64),
    Halt,
}

/// Architectural state: everything a history snapshot restores.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineState {
    registers: Registers,
    memory: Memory,
    pc: usize,
}

macro_rules! define_dispatch {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $handler:ident
        ),* $(,)?
    ) => {
        impl MachineState {
            /// Executes one decoded instruction located at `self.pc`.
            fn execute(&mut self, instruction: Instruction) -> Result<Flow, VMError> {
                match instruction {
                    $(
                        Instruction::$name { $( $field ),* } => self.$handler($( $field ),*),
                    )*
                }
            }
        }
    };
}

for_each_instruction!(define_dispatch);

impl MachineState {
    fn new(capacity: usize) -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(capacity),
            pc: 0,
        }
    }

    /// Address of the instruction after the one being executed.
    fn next_pc(&self) -> i64 {
        self.pc as i64 + 1
    }

    fn binary(
        &mut self,
        ra: u8,
        rb: u8,
        rc: u8,
        f: impl FnOnce(Word, Word) -> Word,
    ) -> Result<Flow, VMError> {
        let b = self.registers.get(rb)?;
        let c = self.registers.get(rc)?;
        self.registers.set(ra, f(b, c))?;
        Ok(Flow::Next)
    }

    fn branch(
        &self,
        ra: u8,
        rb: u8,
        offset: i8,
        taken: impl FnOnce(Word, Word) -> bool,
    ) -> Result<Flow, VMError> {
        let a = self.registers.get(ra)?;
        let b = self.registers.get(rb)?;
        if taken(a, b) {
            Ok(Flow::Jump(self.next_pc() + offset as i64))
        } else {
            Ok(Flow::Next)
        }
    }

    fn effective_address(&self, rb: u8, disp: i8) -> Result<i64, VMError> {
        Ok(self.registers.get(rb)? as i64 + disp as i64)
    }

    fn op_add(&mut self, ra: u8, rb: u8, rc: u8) -> Result<Flow, VMError> {
        self.binary(ra, rb, rc, Word::wrapping_add)
    }

    fn op_sub(&mut self, ra: u8, rb: u8, rc: u8) -> Result<Flow, VMError> {
        self.binary(ra, rb, rc, Word::wrapping_sub)
    }

    fn op_and(&mut self, ra: u8, rb: u8, rc: u8) -> Result<Flow, VMError> {
        self.binary(ra, rb, rc, |b, c| b & c)
    }

    fn op_or(&mut self, ra: u8, rb: u8, rc: u8) -> Result<Flow, VMError> {
        self.binary(ra, rb, rc, |b, c| b | c)
    }

    fn op_nand(&mut self, ra: u8, rb: u8, rc: u8) -> Result<Flow, VMError> {
        self.binary(ra, rb, rc, |b, c| !(b & c))
    }

    fn op_addi(&mut self, ra: u8, rb: u8, imm: i8) -> Result<Flow, VMError> {
        let b = self.registers.get(rb)?;
        // i8 -> u16 sign-extends, so wrapping_add also subtracts
        self.registers.set(ra, b.wrapping_add(imm as Word))?;
        Ok(Flow::Next)
    }

    fn op_lw(&mut self, ra: u8, rb: u8, disp: i8) -> Result<Flow, VMError> {
        let address = self.effective_address(rb, disp)?;
        let value = self.memory.read(address)?;
        self.registers.set(ra, value)?;
        Ok(Flow::Next)
    }

    fn op_sw(&mut self, ra: u8, rb: u8, disp: i8) -> Result<Flow, VMError> {
        let address = self.effective_address(rb, disp)?;
        let value = self.registers.get(ra)?;
        self.memory.write(address, value)?;
        Ok(Flow::Next)
    }

    fn op_beq(&mut self, ra: u8, rb: u8, offset: i8) -> Result<Flow, VMError> {
        self.branch(ra, rb, offset, |a, b| a == b)
    }

    fn op_bne(&mut self, ra: u8, rb: u8, offset: i8) -> Result<Flow, VMError> {
        self.branch(ra, rb, offset, |a, b| a != b)
    }

    fn op_blt(&mut self, ra: u8, rb: u8, offset: i8) -> Result<Flow, VMError> {
        self.branch(ra, rb, offset, |a, b| (a as i16) < (b as i16))
    }

    fn op_jalr(&mut self, ra: u8, rb: u8) -> Result<Flow, VMError> {
        let target = self.registers.get(rb)?;
        let link = self.next_pc() as Word;
        self.registers.set(ra, link)?;
        Ok(Flow::Jump(target as i64))
    }

    fn op_lea(&mut self, ra: u8, offset: i8) -> Result<Flow, VMError> {
        let address = self.next_pc() + offset as i64;
        self.registers.set(ra, address as Word)?;
        Ok(Flow::Next)
    }

    fn op_halt(&mut self) -> Result<Flow, VMError> {
        Ok(Flow::Halt)
    }
}

/// One disassembled memory word.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Disassembly {
    pub address: usize,
    pub word: Word,
    /// Pseudo-op name, decoded instruction, or `.word 0x....` when the word
    /// does not decode.
    pub text: String,
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#06x}: {:04X} {:>6}  {}",
            self.address, self.word, self.word, self.text
        )
    }
}

/// Loads, runs, single-steps and rewinds programs against one machine.
///
/// # Example
///
/// ```
/// use lcsim::machine::assembler::Assembler;
/// use lcsim::machine::isa::Isa;
/// use lcsim::machine::processor::{Processor, ProcessorConfig, Signal};
///
/// let isa = Isa::new();
/// let program = Assembler::new(&isa).assemble("addi r1, r0, 7\nhalt").unwrap();
///
/// let mut cpu = Processor::new(&isa, ProcessorConfig::default());
/// cpu.load(&program).unwrap();
/// assert_eq!(cpu.run().unwrap(), Signal::Halted);
/// assert_eq!(cpu.register(1).unwrap(), 7);
/// ```
pub struct Processor<'isa> {
    isa: &'isa Isa,
    config: ProcessorConfig,
    state: MachineState,
    /// State right after the last `load`, restored by `reset`.
    initial: MachineState,
    breakpoint: Option<usize>,
    history: History<MachineState>,
    status: Status,
}

impl<'isa> Processor<'isa> {
    /// Creates a processor with zeroed memory and no program.
    pub fn new(isa: &'isa Isa, config: ProcessorConfig) -> Self {
        let config = ProcessorConfig {
            memory_words: config.memory_words.min(MAX_MEMORY_WORDS),
            ..config
        };
        Self {
            isa,
            config,
            state: MachineState::new(config.memory_words),
            initial: MachineState::new(config.memory_words),
            breakpoint: None,
            history: History::new(config.history_limit),
            status: Status::Loaded,
        }
    }

    /// Loads `program` at address 0.
    ///
    /// Memory past the program is zeroed, registers and PC are cleared, and the
    /// history and breakpoint are dropped. Fails with
    /// [`VMError::ProgramTooLarge`] without changing anything if the program
    /// does not fit.
    pub fn load(&mut self, program: &[Word]) -> Result<(), VMError> {
        let mut state = MachineState::new(self.config.memory_words);
        state.memory.load(program)?;

        self.initial = state.clone();
        self.state = state;
        self.history.clear();
        self.breakpoint = None;
        self.status = Status::Loaded;
        info!(
            "loaded program of {} word(s) into {} words of memory",
            program.len(),
            self.config.memory_words
        );
        Ok(())
    }

    /// Parses a raw hexadecimal memory image and loads it.
    ///
    /// Memory is left untouched if the image contains an invalid token.
    pub fn load_image(&mut self, text: &str) -> Result<(), VMError> {
        let words = parse_image(text)?;
        self.load(&words)
    }

    /// Restores the state right after the last `load`, keeping the breakpoint.
    pub fn reset(&mut self) {
        self.state = self.initial.clone();
        self.history.clear();
        self.status = Status::Loaded;
        debug!("processor reset");
    }

    /// Executes the instruction at PC.
    ///
    /// Fetch, decode and execution errors leave the machine exactly as it was
    /// before the call and record nothing in the history. Once halted, further
    /// steps execute nothing and return [`Signal::Halted`].
    pub fn step(&mut self) -> Result<Signal, VMError> {
        if self.status == Status::Halted {
            return Ok(Signal::Halted);
        }

        let address = self.state.pc;
        let word = self.state.memory.read(address as i64)?;
        let instruction = self.isa.decode(word, address)?;

        let snapshot = self.state.clone();
        let flow = match self.state.execute(instruction) {
            Ok(flow) => flow,
            Err(err) => {
                self.state = snapshot;
                return Err(err);
            }
        };

        let next = match flow {
            Flow::Next | Flow::Halt => self.state.next_pc(),
            Flow::Jump(target) => target,
        };
        // PC may rest one past the end; fetching from there fails.
        if !(0..=self.state.memory.capacity() as i64).contains(&next) {
            self.state = snapshot;
            return Err(VMError::AddressOutOfBounds { address: next });
        }

        self.state.pc = next as usize;
        self.history.push(snapshot);

        if flow == Flow::Halt {
            self.status = Status::Halted;
            Ok(Signal::Halted)
        } else {
            self.status = Status::Running;
            Ok(Signal::Stepped)
        }
    }

    /// Runs until `halt` or the breakpoint.
    pub fn run(&mut self) -> Result<Signal, VMError> {
        self.run_while(|_| true)
    }

    /// Runs at most `max_steps` instructions.
    pub fn run_for(&mut self, max_steps: usize) -> Result<Signal, VMError> {
        let mut remaining = max_steps;
        self.run_while(|_| {
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            true
        })
    }

    /// Runs while `tripwire` returns true.
    ///
    /// Before each step the tripwire is consulted first, then the breakpoint:
    /// reaching the breakpoint stops without executing it. When resuming from
    /// [`Status::StoppedAtBreakpoint`] the breakpoint is not checked for the
    /// first step, so a `continue` makes progress.
    pub fn run_while<F>(&mut self, mut tripwire: F) -> Result<Signal, VMError>
    where
        F: FnMut(&Self) -> bool,
    {
        if self.status == Status::Halted {
            return Ok(Signal::Halted);
        }

        let mut resuming = self.status == Status::StoppedAtBreakpoint;
        loop {
            if !tripwire(self) {
                return Ok(Signal::Interrupted);
            }

            let pc = self.state.pc;
            if !resuming && self.breakpoint == Some(pc) {
                self.status = Status::StoppedAtBreakpoint;
                debug!("breakpoint hit at {pc:#06x}");
                return Ok(Signal::BreakpointHit(pc));
            }
            resuming = false;

            if self.step()? == Signal::Halted {
                return Ok(Signal::Halted);
            }
        }
    }

    /// Undoes the most recent step. Returns `false` if there is nothing to undo.
    pub fn rewind(&mut self) -> bool {
        let Some(previous) = self.history.pop() else {
            return false;
        };
        self.state = previous;
        self.status = if self.breakpoint == Some(self.state.pc) {
            Status::StoppedAtBreakpoint
        } else {
            Status::Loaded
        };
        debug!(
            "rewound to pc {:#06x} ({} snapshot(s) left)",
            self.state.pc,
            self.history.len()
        );
        true
    }

    /// Sets the breakpoint, replacing any previous one.
    pub fn set_breakpoint(&mut self, address: usize) {
        self.breakpoint = Some(address);
    }

    pub fn clear_breakpoint(&mut self) {
        self.breakpoint = None;
    }

    /// Disassembles the word at `address`.
    pub fn disassemble_at(&self, address: usize) -> Result<Disassembly, VMError> {
        let word = self.state.memory.read(address as i64)?;
        let text = match self.isa.pseudo_op_name(word) {
            Some(name) => name.to_string(),
            None => match Instruction::decode(word) {
                Some(instruction) => instruction.to_string(),
                None => format!(".word 0x{word:04X}"),
            },
        };
        Ok(Disassembly {
            address,
            word,
            text,
        })
    }

    pub fn pc(&self) -> usize {
        self.state.pc
    }

    /// Returns the value of register `r`.
    pub fn register(&self, r: u8) -> Result<Word, VMError> {
        self.state.registers.get(r)
    }

    pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
        self.state.registers.as_array()
    }

    pub fn memory(&self) -> &[Word] {
        self.state.memory.as_slice()
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn breakpoint(&self) -> Option<usize> {
        self.breakpoint
    }

    /// Number of steps that can currently be rewound.
    pub fn history_depth(&self) -> usize {
        self.history.len()
    }
}
