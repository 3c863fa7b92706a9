//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the machine's instruction set. The [`for_each_instruction!`](crate::for_each_instruction)
//! macro holds the canonical instruction definitions and invokes a callback macro for code
//! generation. This keeps the assembler's encoder, the decoder and the
//! processor's dispatch in lock-step: a row added here without a matching
//! execution handler does not compile.
//!
//! This module generates:
//! - The [`Opcode`] enum with opcode mappings and `TryFrom<u8>`
//! - The [`Instruction`] tagged union with `encode`/`decode` and `Display`
//!
//! See [`processor`](super::processor) for the execution dispatch generated
//! from the same table.
//!
//! # Word Format
//!
//! Every instruction is a single 16-bit word:
//!
//! ```text
//!  15   12 11  9 8   6 5  4      0
//! [opcode ][ ra ][ rb ][ ][ imm5  ]   register/immediate formats
//! [opcode ][ ra ][ rb ][    ][ rc ]   three-register format (rc in bits 2..0)
//! ```
//!
//! Immediates are 5-bit two's complement values (-16..=15). Unused bits are
//! written as zero and ignored on decode.

use crate::machine::errors::{EncodeError, VMError};
use std::collections::HashMap;
use std::fmt;

/// Machine word: the unit of both instructions and data.
pub type Word = u16;

/// Number of general purpose registers (`r0`..`r7`).
pub const REGISTER_COUNT: usize = 8;
/// Smallest value accepted by a 5-bit immediate field.
pub const IMM_MIN: i32 = -16;
/// Largest value accepted by a 5-bit immediate field.
pub const IMM_MAX: i32 = 15;

const OPCODE_SHIFT: u32 = 12;
const RA_SHIFT: u32 = 9;
const RB_SHIFT: u32 = 6;
const RC_SHIFT: u32 = 0;
const REG_MASK: Word = 0b111;
const IMM_MASK: Word = 0b1_1111;
const IMM_SIGN: Word = 0b1_0000;

/// Literal words for assembler pseudo-ops that bypass field encoding.
pub const PSEUDO_OPS: [(&str, Word); 2] = [("noop", 0x0000), ("halt", 0xE000)];

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each row reads `Variant = opcode, "mnemonic" => [field: Kind, ...], handler`
/// where `handler` names the [`MachineState`](super::processor::MachineState)
/// method implementing the instruction. Register fields named `ra`, `rb` and
/// `rc` occupy the matching bit slots; any other field is the 5-bit immediate.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Arithmetic / logic
            // =========================
            /// add ra, rb, rc ; ra = rb + rc
            Add = 0x0, "add" => [ra: Reg, rb: Reg, rc: Reg], op_add,
            /// sub ra, rb, rc ; ra = rb - rc
            Sub = 0x1, "sub" => [ra: Reg, rb: Reg, rc: Reg], op_sub,
            /// and ra, rb, rc ; ra = rb & rc
            And = 0x2, "and" => [ra: Reg, rb: Reg, rc: Reg], op_and,
            /// or ra, rb, rc ; ra = rb | rc
            Or = 0x3, "or" => [ra: Reg, rb: Reg, rc: Reg], op_or,
            /// nand ra, rb, rc ; ra = !(rb & rc)
            Nand = 0x4, "nand" => [ra: Reg, rb: Reg, rc: Reg], op_nand,
            /// addi ra, rb, imm ; ra = rb + imm
            Addi = 0x5, "addi" => [ra: Reg, rb: Reg, imm: Imm], op_addi,
            // =========================
            // Memory
            // =========================
            /// lw ra, disp(rb) ; ra = mem[rb + disp]
            Lw = 0x6, "lw" => [ra: Reg, rb: Reg, disp: Disp], op_lw,
            /// sw ra, disp(rb) ; mem[rb + disp] = ra
            Sw = 0x7, "sw" => [ra: Reg, rb: Reg, disp: Disp], op_sw,
            // =========================
            // Control flow
            // =========================
            /// beq ra, rb, offset ; if ra == rb then PC = PC + 1 + offset
            Beq = 0x8, "beq" => [ra: Reg, rb: Reg, offset: PcRel], op_beq,
            /// bne ra, rb, offset ; if ra != rb then PC = PC + 1 + offset
            Bne = 0x9, "bne" => [ra: Reg, rb: Reg, offset: PcRel], op_bne,
            /// blt ra, rb, offset ; if ra < rb (signed) then PC = PC + 1 + offset
            Blt = 0xA, "blt" => [ra: Reg, rb: Reg, offset: PcRel], op_blt,
            /// jalr ra, rb ; ra = PC + 1; PC = rb
            Jalr = 0xB, "jalr" => [ra: Reg, rb: Reg], op_jalr,
            /// lea ra, offset ; ra = PC + 1 + offset
            Lea = 0xC, "lea" => [ra: Reg, offset: PcRel], op_lea,
            /// halt ; stop execution
            Halt = 0xE, "halt" => [], op_halt,
        }
    };
}

/// Kind of an instruction operand, as listed in the instruction table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Register index `r0`..`r7`.
    Reg,
    /// Signed arithmetic immediate.
    Imm,
    /// Signed offset relative to the instruction after the current one.
    PcRel,
    /// Signed displacement added to a base register.
    Disp,
}

/// Resolved operand value handed to [`Isa::encode`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Reg(u8),
    Imm(i32),
}

/// Sign-extends a 5-bit immediate field.
const fn sign_extend(field: Word) -> i8 {
    let field = field & IMM_MASK;
    if field & IMM_SIGN != 0 {
        (field as i16 - 32) as i8
    } else {
        field as i8
    }
}

fn operand_reg(operand: &Operand) -> Result<u8, EncodeError> {
    match *operand {
        Operand::Reg(r) if (r as usize) < REGISTER_COUNT => Ok(r),
        Operand::Reg(r) => Err(EncodeError::ExpectedRegister(format!("r{r}"))),
        Operand::Imm(v) => Err(EncodeError::ExpectedRegister(v.to_string())),
    }
}

fn operand_imm(operand: &Operand) -> Result<i8, EncodeError> {
    match *operand {
        Operand::Imm(v) if (IMM_MIN..=IMM_MAX).contains(&v) => Ok(v as i8),
        Operand::Imm(v) => Err(EncodeError::OffsetTooLarge(v)),
        Operand::Reg(r) => Err(EncodeError::ExpectedImmediate(format!("r{r}"))),
    }
}

macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $handler:ident
        ),* $(,)?
    ) => {
        // =========================
        // Opcode enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(value),
                }
            }
        }

        impl Opcode {
            /// Every opcode in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name ),* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand kinds in source order.
            pub const fn operand_kinds(self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }
        }

        // =========================
        // Decoded instruction
        // =========================
        /// A decoded instruction carrying only the fields of its format.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name {
                    $( $field: define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl Instruction {
            /// Returns the opcode of this instruction.
            pub const fn opcode(&self) -> Opcode {
                match self {
                    $( Instruction::$name { .. } => Opcode::$name, )*
                }
            }

            /// Packs the instruction into a single word.
            pub fn encode(&self) -> Word {
                match *self {
                    $(
                        Instruction::$name { $( $field ),* } => {
                            (($opcode as Word) << OPCODE_SHIFT)
                                $( | define_instructions!(@place $field, $kind, $field) )*
                        }
                    )*
                }
            }

            /// Unpacks a word; `None` if the opcode is unassigned.
            pub fn decode(word: Word) -> Option<Self> {
                let opcode = Opcode::try_from((word >> OPCODE_SHIFT) as u8).ok()?;
                Some(match opcode {
                    $(
                        Opcode::$name => Instruction::$name {
                            $( $field: define_instructions!(@extract $field, $kind, word) ),*
                        },
                    )*
                })
            }

            /// Builds an instruction from already-resolved operands, checking
            /// operand kinds and immediate ranges.
            #[allow(unused_mut, unused_variables, unused_assignments)]
            pub fn from_operands(opcode: Opcode, operands: &[Operand]) -> Result<Self, EncodeError> {
                let expected = opcode.operand_kinds().len();
                if operands.len() != expected {
                    return Err(EncodeError::ArityMismatch {
                        mnemonic: opcode.mnemonic(),
                        expected,
                        actual: operands.len(),
                    });
                }

                let mut next = 0;
                match opcode {
                    $(
                        Opcode::$name => Ok(Instruction::$name {
                            $( $field: {
                                let operand = &operands[next];
                                next += 1;
                                define_instructions!(@operand $kind, operand)?
                            } ),*
                        }),
                    )*
                }
            }
        }

        impl fmt::Display for Instruction {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(
                        Instruction::$name { $( $field ),* } => {
                            let operands: &[String] = &[ $( define_instructions!(@fmt $kind, $field) ),* ];
                            if operands.is_empty() {
                                f.write_str($mnemonic)
                            } else {
                                write!(f, "{} {}", $mnemonic, operands.join(", "))
                            }
                        }
                    )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)   => { u8 };
    (@ty Imm)   => { i8 };
    (@ty PcRel) => { i8 };
    (@ty Disp)  => { i8 };

    // ---------- encoding ----------
    (@place ra, Reg, $v:expr) => { ((($v as Word) & REG_MASK) << RA_SHIFT) };
    (@place rb, Reg, $v:expr) => { ((($v as Word) & REG_MASK) << RB_SHIFT) };
    (@place rc, Reg, $v:expr) => { ((($v as Word) & REG_MASK) << RC_SHIFT) };
    (@place $f:ident, $kind:ident, $v:expr) => { (($v as Word) & IMM_MASK) };

    // ---------- decoding ----------
    (@extract ra, Reg, $w:expr) => { ((($w >> RA_SHIFT) & REG_MASK) as u8) };
    (@extract rb, Reg, $w:expr) => { ((($w >> RB_SHIFT) & REG_MASK) as u8) };
    (@extract rc, Reg, $w:expr) => { ((($w >> RC_SHIFT) & REG_MASK) as u8) };
    (@extract $f:ident, $kind:ident, $w:expr) => { sign_extend($w) };

    // ---------- operand checking ----------
    (@operand Reg, $op:expr) => { operand_reg($op) };
    (@operand $kind:ident, $op:expr) => { operand_imm($op) };

    // ---------- display ----------
    (@fmt Reg, $v:expr) => { format!("r{}", $v) };
    (@fmt $kind:ident, $v:expr) => { $v.to_string() };
}

for_each_instruction!(define_instructions);

/// Immutable instruction-set tables shared by the assembler and the processor.
///
/// Build it once and hand out references; it holds no mutable state, so any
/// number of assemblers and processors can share one instance.
#[derive(Debug, Clone)]
pub struct Isa {
    mnemonics: HashMap<&'static str, Opcode>,
    pseudo_ops: HashMap<&'static str, Word>,
}

impl Isa {
    /// Builds the standard instruction set.
    pub fn new() -> Self {
        Self {
            mnemonics: Opcode::ALL.iter().map(|op| (op.mnemonic(), *op)).collect(),
            pseudo_ops: PSEUDO_OPS.into_iter().collect(),
        }
    }

    /// Looks up an opcode by mnemonic.
    pub fn opcode(&self, mnemonic: &str) -> Option<Opcode> {
        self.mnemonics.get(mnemonic).copied()
    }

    /// Returns the literal word of a zero-operand pseudo-op (`noop`, `halt`).
    pub fn pseudo_op(&self, mnemonic: &str) -> Option<Word> {
        self.pseudo_ops.get(mnemonic).copied()
    }

    /// Returns the pseudo-op whose literal equals `word`, if any.
    pub fn pseudo_op_name(&self, word: Word) -> Option<&'static str> {
        PSEUDO_OPS
            .iter()
            .find(|(_, literal)| *literal == word)
            .map(|(name, _)| *name)
    }

    /// Encodes `mnemonic` with resolved operands into a word.
    pub fn encode(&self, mnemonic: &str, operands: &[Operand]) -> Result<Word, EncodeError> {
        if operands.is_empty()
            && let Some(literal) = self.pseudo_op(mnemonic)
        {
            return Ok(literal);
        }

        let opcode = self
            .opcode(mnemonic)
            .ok_or_else(|| EncodeError::UnrecognizedInstruction(mnemonic.to_string()))?;
        Ok(Instruction::from_operands(opcode, operands)?.encode())
    }

    /// Decodes the word fetched from `address`.
    pub fn decode(&self, word: Word, address: usize) -> Result<Instruction, VMError> {
        Instruction::decode(word).ok_or(VMError::InvalidInstruction { word, address })
    }
}

impl Default for Isa {
    fn default() -> Self {
        Self::new()
    }
}
