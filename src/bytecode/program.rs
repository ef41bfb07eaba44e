use std::fmt;

use thiserror::Error;

use super::Instruction;

pub const DEFAULT_PROGRAM_CAPACITY: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Program is full (capacity {capacity} instructions)")]
    ProgramFull { capacity: usize },
}

/// An append-only list of instructions, once handed to an executor it is never changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    capacity: usize,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PROGRAM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            instructions: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_instructions<I: IntoIterator<Item = Instruction>>(
        instructions: I,
    ) -> Result<Self, ProgramError> {
        let mut program = Program::new();
        for inst in instructions {
            program.add_inst(inst)?;
        }
        Ok(program)
    }

    pub fn add_inst(&mut self, inst: Instruction) -> Result<(), ProgramError> {
        if self.instructions.len() >= self.capacity {
            return Err(ProgramError::ProgramFull {
                capacity: self.capacity,
            });
        }
        self.instructions.push(inst);
        Ok(())
    }

    /// Fetch the instruction at `inst_ptr`, `None` if it's outside the program
    pub fn get(&self, inst_ptr: u64) -> Option<&Instruction> {
        usize::try_from(inst_ptr)
            .ok()
            .and_then(|index| self.instructions.get(index))
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, inst) in self.instructions.iter().enumerate() {
            writeln!(f, "{:04}: {}", index, inst)?;
        }
        Ok(())
    }
}
