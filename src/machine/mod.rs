//! A small 16-bit-word computer and its toolchain.
//!
//! The assembler and the processor share one instruction set definition, so
//! the words one produces are exactly the words the other executes.
//!
//! # Architecture
//!
//! - **Words**: 16 bits, used for both instructions and data
//! - **Registers**: `r0`..`r7` plus the program counter; `r0` reads as zero
//! - **Memory**: fixed-capacity, word-addressed (16K words by default)
//! - **Instruction format**: one word, 4-bit opcode, 3-bit register fields and
//!   a signed 5-bit immediate
//! - **Debugging**: one breakpoint and full-state undo history
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, label resolution, diagnostics, encoding
//! - [`errors`]: Assembly and execution error types
//! - [`image`]: Object-file and raw memory-image formats
//! - [`isa`]: Instruction set definition and encode/decode
//! - [`processor`]: Execution engine, breakpoint, history and disassembly

pub mod assembler;
pub mod errors;
pub mod image;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod processor;
