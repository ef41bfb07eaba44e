use std::io::{self, Write};

use crate::bytecode::Word;

use super::VmError;

pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// The LIFO operand stack, doubling as addressable local storage.
///
/// Index 0 is the oldest element, depth 0 is the most recently pushed one.
#[derive(Clone, Debug)]
pub struct OperandStack {
    words: Vec<Word>,
    capacity: usize,
}

impl Default for OperandStack {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_CAPACITY)
    }
}

impl OperandStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, word: Word) -> Result<(), VmError> {
        if self.words.len() >= self.capacity {
            return Err(VmError::StackOverflow {
                capacity: self.capacity,
            });
        }
        self.words.push(word);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Word, VmError> {
        self.words.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn get_absolute(&self, index: u64) -> Result<Word, VmError> {
        let slot = self.check_address(index)?;
        Ok(self.words[slot])
    }

    pub fn get_relative(&self, depth: u64) -> Result<Word, VmError> {
        // depth >= size would put us below the bottom of the stack
        let index = (self.words.len() as u64)
            .checked_sub(depth)
            .and_then(|above| above.checked_sub(1))
            .ok_or_else(|| self.illegal_address(depth))?;
        self.get_absolute(index)
    }

    pub fn set_absolute(&mut self, index: u64, word: Word) -> Result<(), VmError> {
        let slot = self.check_address(index)?;
        self.words[slot] = word;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bottom to top
    pub fn as_slice(&self) -> &[Word] {
        &self.words
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Write out the stack bottom to top as signed integers
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Stack:")?;
        if self.words.is_empty() {
            writeln!(out, "  [empty]")?;
        }
        for word in self.words.iter() {
            writeln!(out, "  {}", word.as_i64())?;
        }
        writeln!(out, "{}", "-".repeat(30))
    }

    fn check_address(&self, index: u64) -> Result<usize, VmError> {
        match usize::try_from(index) {
            Ok(slot) if slot < self.words.len() => Ok(slot),
            _ => Err(self.illegal_address(index)),
        }
    }

    fn illegal_address(&self, address: u64) -> VmError {
        VmError::IllegalStackAddress {
            address,
            size: self.words.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(values: &[i64]) -> OperandStack {
        let mut stack = OperandStack::default();
        for value in values {
            stack.push(Word::from_i64(*value)).unwrap();
        }
        stack
    }

    #[test]
    fn push_then_pop_is_lifo() {
        let mut stack = stack_of(&[1, 2, 3]);
        assert_eq!(stack.pop().unwrap().as_i64(), 3);
        assert_eq!(stack.pop().unwrap().as_i64(), 2);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn push_past_capacity_overflows() {
        let mut stack = OperandStack::new(2);
        stack.push(Word::from_i64(1)).unwrap();
        stack.push(Word::from_i64(2)).unwrap();
        assert!(matches!(
            stack.push(Word::from_i64(3)),
            Err(VmError::StackOverflow { capacity: 2 })
        ));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn pop_on_empty_underflows() {
        let mut stack = OperandStack::default();
        assert!(matches!(stack.pop(), Err(VmError::StackUnderflow)));

        // popping everything never exposes stale values
        let mut stack = stack_of(&[9]);
        stack.pop().unwrap();
        assert!(matches!(stack.pop(), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn absolute_addresses_count_from_the_bottom() {
        let stack = stack_of(&[10, 20, 30]);
        assert_eq!(stack.get_absolute(0).unwrap().as_i64(), 10);
        assert_eq!(stack.get_absolute(2).unwrap().as_i64(), 30);
        assert!(matches!(
            stack.get_absolute(3),
            Err(VmError::IllegalStackAddress {
                address: 3,
                size: 3
            })
        ));
    }

    #[test]
    fn relative_addresses_count_from_the_top() {
        let stack = stack_of(&[10, 20, 30]);
        assert_eq!(stack.get_relative(0).unwrap().as_i64(), 30);
        assert_eq!(stack.get_relative(2).unwrap().as_i64(), 10);
        assert!(matches!(
            stack.get_relative(3),
            Err(VmError::IllegalStackAddress { address: 3, .. })
        ));
        assert!(matches!(
            stack.get_relative(u64::MAX),
            Err(VmError::IllegalStackAddress { .. })
        ));
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut stack = stack_of(&[10, 20, 30]);
        stack.set_absolute(1, Word::from_i64(-5)).unwrap();
        assert_eq!(
            stack.as_slice(),
            &[Word::from_i64(10), Word::from_i64(-5), Word::from_i64(30)]
        );
        assert!(matches!(
            stack.set_absolute(3, Word::ZERO),
            Err(VmError::IllegalStackAddress { .. })
        ));
    }

    #[test]
    fn dump_matches_debug_layout() {
        let mut out = Vec::new();
        OperandStack::default().dump(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("Stack:\n  [empty]\n{}\n", "-".repeat(30))
        );

        let mut out = Vec::new();
        stack_of(&[1, -2]).dump(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("Stack:\n  1\n  -2\n{}\n", "-".repeat(30))
        );
    }
}
