use crate::machine::errors::VMError;
use crate::machine::isa::{REGISTER_COUNT, Word};

/// Register file holding `r0`..`r7`.
///
/// `r0` is hardwired to zero: it always reads as zero and writes to it are
/// discarded.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Registers {
    regs: [Word; REGISTER_COUNT],
}

impl Registers {
    /// Creates a register file with every register cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value in register `idx`.
    ///
    /// Returns [`VMError::InvalidRegister`] if `idx` is out of bounds.
    pub fn get(&self, idx: u8) -> Result<Word, VMError> {
        self.regs
            .get(idx as usize)
            .copied()
            .ok_or(VMError::InvalidRegister { index: idx })
    }

    /// Stores a value into register `idx`.
    ///
    /// Writes to `r0` are ignored. Returns [`VMError::InvalidRegister`] if
    /// `idx` is out of bounds.
    pub fn set(&mut self, idx: u8, value: Word) -> Result<(), VMError> {
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(VMError::InvalidRegister { index: idx })?;
        if idx != 0 {
            *slot = value;
        }
        Ok(())
    }

    pub fn as_array(&self) -> &[Word; REGISTER_COUNT] {
        &self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_register_ignores_writes() {
        let mut regs = Registers::new();
        regs.set(0, 0xBEEF).unwrap();
        assert_eq!(regs.get(0).unwrap(), 0);
    }

    #[test]
    fn set_and_get() {
        let mut regs = Registers::new();
        regs.set(7, 0x1234).unwrap();
        assert_eq!(regs.get(7).unwrap(), 0x1234);
        assert_eq!(regs.as_array()[7], 0x1234);
    }

    #[test]
    fn out_of_bounds_index() {
        let mut regs = Registers::new();
        assert_eq!(regs.get(8), Err(VMError::InvalidRegister { index: 8 }));
        assert_eq!(regs.set(9, 1), Err(VMError::InvalidRegister { index: 9 }));
    }
}
