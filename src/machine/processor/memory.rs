use crate::machine::errors::VMError;
use crate::machine::isa::Word;

/// Fixed-capacity word-addressed memory.
///
/// Addresses are taken as `i64` so that effective addresses computed from a
/// register and a signed displacement can be bounds-checked without wrapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Memory {
    words: Vec<Word>,
}

impl Memory {
    /// Creates a zero-filled memory of `capacity` words.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    fn index(&self, address: i64) -> Result<usize, VMError> {
        usize::try_from(address)
            .ok()
            .filter(|idx| *idx < self.words.len())
            .ok_or(VMError::AddressOutOfBounds { address })
    }

    /// Reads the word at `address`.
    pub fn read(&self, address: i64) -> Result<Word, VMError> {
        let idx = self.index(address)?;
        Ok(self.words[idx])
    }

    /// Writes `value` at `address`.
    pub fn write(&mut self, address: i64, value: Word) -> Result<(), VMError> {
        let idx = self.index(address)?;
        self.words[idx] = value;
        Ok(())
    }

    /// Copies `program` to address 0 and zero-fills the rest.
    ///
    /// Returns [`VMError::ProgramTooLarge`] without modifying memory if the
    /// program does not fit.
    pub fn load(&mut self, program: &[Word]) -> Result<(), VMError> {
        if program.len() > self.words.len() {
            return Err(VMError::ProgramTooLarge {
                words: program.len(),
                capacity: self.words.len(),
            });
        }
        let (head, tail) = self.words.split_at_mut(program.len());
        head.copy_from_slice(program);
        tail.fill(0);
        Ok(())
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.words
    }
}
