pub mod executor;
pub mod stack;

use bitflags::bitflags;
use thiserror::Error;

use crate::bytecode::Opcode;

pub use executor::{run, ExecutionState, Executor};
pub use stack::{OperandStack, DEFAULT_STACK_CAPACITY};

/// Every error is fatal, the run stops on the instruction that raised it
#[derive(Error, Debug)]
pub enum VmError {
    #[error("Stack overflow (capacity {capacity})")]
    StackOverflow { capacity: usize },

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Illegal stack address {address} (stack size {size})")]
    IllegalStackAddress { address: u64, size: usize },

    #[error("Illegal instruction address: {0}")]
    IllegalInstructionAddress(u64),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Instruction `{0}` has no execution semantics")]
    Unimplemented(Opcode),

    #[error("Step limit of {0} instructions exceeded")]
    StepLimitExceeded(u64),

    #[error("Failed to write output")]
    Output(
        #[from]
        std::io::Error,
    ),
}

bitflags! {
    /// Debug side channels of the executor, none of them change what a program computes
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ExecutionFlags : u8 {
        /// Write one line per executed instruction
        const TRACE        = 0b0000_0001;
        /// Dump the stack once the run is over (halted or not)
        const DUMP_ON_EXIT = 0b0000_0010;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub stack_capacity: usize,

    /// Stop a run after this many executed instructions
    pub max_steps: Option<u64>,

    pub flags: ExecutionFlags,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_steps: None,
            flags: ExecutionFlags::empty(),
        }
    }
}
