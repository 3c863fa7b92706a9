use crate::machine::isa::Word;
use lcsim_derive::Error;

/// Errors that abort an `assemble` call. Every variant carries the 1-based
/// source line it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// Immediate or resolved offset outside the signed 5-bit field.
    #[error("line {line}: offset {offset} does not fit in the range -16..=15")]
    OffsetTooLarge { offset: i32, line: usize },
    /// Mnemonic not present in the instruction set.
    #[error("line {line}: unrecognized instruction `{mnemonic}`")]
    UnrecognizedInstruction { mnemonic: String, line: usize },
    /// Numeric literal that does not parse or does not fit a word.
    #[error("line {line}: `{token}` is not a number")]
    NotANumber { token: String, line: usize },
    /// Label defined twice, or more than one label on the same line.
    #[error("line {line}: duplicate label `{label}`")]
    DuplicateLabel { label: String, line: usize },
    /// Reference to a label that is never defined.
    #[error("line {line}: undefined label `{label}`")]
    UndefinedLabel { label: String, line: usize },
    /// Expected a register operand (e.g., `r3`) but got something else.
    #[error("line {line}: expected register, got `{token}`")]
    ExpectedRegister { token: String, line: usize },
    /// Wrong number of operands for an instruction.
    #[error("line {line}: `{mnemonic}` takes {expected} operand(s), got {actual}")]
    ArityMismatch {
        mnemonic: String,
        expected: usize,
        actual: usize,
        line: usize,
    },
}

impl AsmError {
    /// Returns the 1-based source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            AsmError::OffsetTooLarge { line, .. }
            | AsmError::UnrecognizedInstruction { line, .. }
            | AsmError::NotANumber { line, .. }
            | AsmError::DuplicateLabel { line, .. }
            | AsmError::UndefinedLabel { line, .. }
            | AsmError::ExpectedRegister { line, .. }
            | AsmError::ArityMismatch { line, .. } => *line,
        }
    }
}

/// Errors from [`Isa::encode`](crate::machine::isa::Isa::encode). They carry no
/// source position; the assembler attaches one with [`EncodeError::at`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unrecognized instruction `{0}`")]
    UnrecognizedInstruction(String),
    #[error("`{mnemonic}` takes {expected} operand(s), got {actual}")]
    ArityMismatch {
        mnemonic: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("expected register, got `{0}`")]
    ExpectedRegister(String),
    #[error("expected immediate, got `{0}`")]
    ExpectedImmediate(String),
    #[error("offset {0} does not fit in the range -16..=15")]
    OffsetTooLarge(i32),
}

impl EncodeError {
    /// Attaches the source line the failing instruction came from.
    pub fn at(self, line: usize) -> AsmError {
        match self {
            EncodeError::UnrecognizedInstruction(mnemonic) => {
                AsmError::UnrecognizedInstruction { mnemonic, line }
            }
            EncodeError::ArityMismatch {
                mnemonic,
                expected,
                actual,
            } => AsmError::ArityMismatch {
                mnemonic: mnemonic.to_string(),
                expected,
                actual,
                line,
            },
            EncodeError::ExpectedRegister(token) => AsmError::ExpectedRegister { token, line },
            EncodeError::ExpectedImmediate(token) => AsmError::NotANumber { token, line },
            EncodeError::OffsetTooLarge(offset) => AsmError::OffsetTooLarge { offset, line },
        }
    }
}

/// Errors raised while loading or executing a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    /// Fetched word does not decode to any instruction.
    #[error("invalid instruction {word:#06x} at address {address:#06x}")]
    InvalidInstruction { word: Word, address: usize },
    /// Fetch, load, store or jump target outside of memory.
    #[error("address {address} is outside of memory")]
    AddressOutOfBounds { address: i64 },
    /// Program does not fit in memory.
    #[error("program of {words} words does not fit in {capacity} words of memory")]
    ProgramTooLarge { words: usize, capacity: usize },
    /// Memory image token that is not a 16-bit hexadecimal word.
    #[error("invalid token '{token}' at word {index} of memory image")]
    InvalidToken { token: String, index: usize },
    /// Register index outside `r0..r7`.
    #[error("register index {index} out of bounds")]
    InvalidRegister { index: u8 },
    /// File I/O error while reading or writing a program.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
}

/// Top-level error used by the binaries.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Assembly(#[from] AsmError),
    #[error("{0}")]
    Machine(#[from] VMError),
}
