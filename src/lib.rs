//! 16-bit instruction-set simulator library.
//!
//! Provides the instruction set definition, an assembler, memory-image
//! formats and an execution engine with breakpoint and undo support.

pub mod machine;
pub mod utils;
