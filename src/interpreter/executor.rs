use std::io::{self, Write};

use crate::bytecode::{Instruction, Program, Word};

use super::{ExecutionFlags, ExecutorConfig, OperandStack, VmError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    /// Reached a `halt`, the only clean way out
    Halted,
    /// Stopped on a fatal error
    Faulted,
}

/// What happens to the instruction pointer after an instruction
enum Flow {
    Next,
    Jump(u64),
    Halt,
}

/// Owns a program and its operand stack and runs the fetch/decode/execute loop.
///
/// Output from `print_int` and the debug channels goes to `out`.
pub struct Executor<W: Write> {
    program: Program,
    stack: OperandStack,
    inst_ptr: u64,
    state: ExecutionState,
    steps: u64,
    config: ExecutorConfig,
    out: W,
}

impl<W: Write> Executor<W> {
    pub fn new(program: Program, out: W) -> Self {
        Self::with_config(program, ExecutorConfig::default(), out)
    }

    pub fn with_config(program: Program, config: ExecutorConfig, out: W) -> Self {
        Self {
            program,
            stack: OperandStack::new(config.stack_capacity),
            inst_ptr: 0,
            state: ExecutionState::Running,
            steps: 0,
            config,
            out,
        }
    }

    /// Back to the initial state so the same program can be run again
    pub fn reset(&mut self) {
        self.stack.clear();
        self.inst_ptr = 0;
        self.state = ExecutionState::Running;
        self.steps = 0;
    }

    /// Run until `halt` or the first error
    pub fn run(&mut self) -> Result<(), VmError> {
        let outcome = self.run_to_halt();

        if self.config.flags.contains(ExecutionFlags::DUMP_ON_EXIT) {
            if let Err(err) = self.stack.dump(&mut self.out) {
                return outcome.and(Err(err.into()));
            }
        }

        outcome
    }

    fn run_to_halt(&mut self) -> Result<(), VmError> {
        while self.state == ExecutionState::Running {
            self.step()?;
        }
        Ok(())
    }

    /// Execute a single instruction, does nothing once the run is over
    pub fn step(&mut self) -> Result<ExecutionState, VmError> {
        if self.state != ExecutionState::Running {
            return Ok(self.state);
        }

        match self.try_step() {
            Ok(state) => Ok(state),
            Err(err) => {
                self.state = ExecutionState::Faulted;
                Err(err)
            }
        }
    }

    fn try_step(&mut self) -> Result<ExecutionState, VmError> {
        if let Some(max_steps) = self.config.max_steps {
            if self.steps >= max_steps {
                return Err(VmError::StepLimitExceeded(max_steps));
            }
        }

        // strictly less than the length, one past the end is not an instruction
        let inst = *self
            .program
            .get(self.inst_ptr)
            .ok_or(VmError::IllegalInstructionAddress(self.inst_ptr))?;

        if self.config.flags.contains(ExecutionFlags::TRACE) {
            self.trace(&inst)?;
        }

        self.steps += 1;
        match self.execute(inst)? {
            Flow::Next => self.inst_ptr += 1,
            // validated on the next fetch
            Flow::Jump(target) => self.inst_ptr = target,
            Flow::Halt => self.state = ExecutionState::Halted,
        }

        Ok(self.state)
    }

    fn execute(&mut self, inst: Instruction) -> Result<Flow, VmError> {
        match inst {
            Instruction::Nop => {}
            Instruction::Push(word) => self.stack.push(word)?,
            Instruction::Get(addr) => {
                let word = self.stack.get_absolute(addr)?;
                self.stack.push(word)?;
            }
            Instruction::Dup(depth) => {
                let word = self.stack.get_relative(depth)?;
                self.stack.push(word)?;
            }
            Instruction::Set(addr) => {
                let word = self.stack.pop()?;
                self.stack.set_absolute(addr, word)?;
            }
            Instruction::IAdd => self.binary_op(|a, b| Ok(Word::from_i64(a.wrapping_add(b))))?,
            Instruction::ISub => self.binary_op(|a, b| Ok(Word::from_i64(a.wrapping_sub(b))))?,
            Instruction::IMul => self.binary_op(|a, b| Ok(Word::from_i64(a.wrapping_mul(b))))?,
            Instruction::IDiv => self.binary_op(|a, b| {
                if b == 0 {
                    Err(VmError::DivisionByZero)
                } else {
                    // i64::MIN / -1 wraps back to i64::MIN
                    Ok(Word::from_i64(a.wrapping_div(b)))
                }
            })?,
            Instruction::IEq => self.binary_op(|a, b| Ok(Word::from(a == b)))?,
            Instruction::IGt => self.binary_op(|a, b| Ok(Word::from(a > b)))?,
            Instruction::IGe => self.binary_op(|a, b| Ok(Word::from(a >= b)))?,
            Instruction::ILt => self.binary_op(|a, b| Ok(Word::from(a < b)))?,
            Instruction::ILe => self.binary_op(|a, b| Ok(Word::from(a <= b)))?,
            Instruction::Jmp(target) => return Ok(Flow::Jump(target)),
            Instruction::Jnz(target) => {
                if !self.stack.pop()?.is_zero() {
                    return Ok(Flow::Jump(target));
                }
            }
            Instruction::Alloc(_) | Instruction::Free => {
                return Err(VmError::Unimplemented(inst.opcode()))
            }
            Instruction::Halt => return Ok(Flow::Halt),
            Instruction::PrintInt => {
                let word = self.stack.pop()?;
                writeln!(self.out, "{}", word.as_i64())?;
            }
        }

        Ok(Flow::Next)
    }

    /// Pops `b` then `a` and pushes `op(a, b)`.
    /// Operands are only removed once `op` succeeded so a failing instruction leaves the stack as it was.
    fn binary_op<F>(&mut self, op: F) -> Result<(), VmError>
    where
        F: FnOnce(i64, i64) -> Result<Word, VmError>,
    {
        if self.stack.len() < 2 {
            return Err(VmError::StackUnderflow);
        }
        let b = self.stack.get_relative(0)?.as_i64();
        let a = self.stack.get_relative(1)?.as_i64();
        let result = op(a, b)?;

        self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(result)
    }

    fn trace(&mut self, inst: &Instruction) -> io::Result<()> {
        let values: Vec<i64> = self.stack.as_slice().iter().map(|w| w.as_i64()).collect();
        writeln!(
            self.out,
            "{:04}: {:<16} {:?}",
            self.inst_ptr,
            inst.to_string(),
            values
        )
    }
}

impl<W: Write> Executor<W> {
    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn inst_ptr(&self) -> u64 {
        self.inst_ptr
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Instructions executed since the last reset
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

/// Run `program` with the default configuration, printing to stdout.
/// Returns the final stack (bottom to top) along with how the run ended.
pub fn run(program: Program) -> (Vec<Word>, Result<(), VmError>) {
    let mut executor = Executor::new(program, io::stdout());
    let outcome = executor.run();
    (executor.stack().as_slice().to_vec(), outcome)
}

#[cfg(test)]
mod tests {
    use stackvm::program;

    use super::*;
    use crate::bytecode::Opcode;

    fn execute(program: Program) -> (Executor<Vec<u8>>, Result<(), VmError>) {
        execute_with(program, ExecutorConfig::default())
    }

    fn execute_with(
        program: Program,
        config: ExecutorConfig,
    ) -> (Executor<Vec<u8>>, Result<(), VmError>) {
        let mut executor = Executor::with_config(program, config, Vec::new());
        let outcome = executor.run();
        (executor, outcome)
    }

    fn values(executor: &Executor<Vec<u8>>) -> Vec<i64> {
        executor
            .stack()
            .as_slice()
            .iter()
            .map(|word| word.as_i64())
            .collect()
    }

    fn printed(executor: &Executor<Vec<u8>>) -> String {
        String::from_utf8(executor.output().clone()).unwrap()
    }

    fn assemble(instructions: &[Instruction]) -> Program {
        Program::from_instructions(instructions.iter().copied()).unwrap()
    }

    #[test]
    fn adds_two_numbers() {
        let (executor, outcome) = execute(assemble(&[
            Instruction::push(5),
            Instruction::push(7),
            Instruction::iadd(),
            Instruction::halt(),
        ]));
        assert!(outcome.is_ok());
        assert_eq!(executor.state(), ExecutionState::Halted);
        assert_eq!(values(&executor), vec![12]);
    }

    #[test]
    fn jnz_pops_its_condition_and_falls_through_on_zero() {
        let (executor, outcome) = execute(assemble(&[
            Instruction::push(1),
            Instruction::push(0),
            Instruction::jnz(4),
            Instruction::push(99),
            Instruction::halt(),
        ]));
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![1, 99]);
        assert_eq!(executor.steps(), 5);
    }

    #[test]
    fn jnz_jumps_on_any_nonzero_word() {
        let (executor, outcome) = execute(assemble(&[
            Instruction::push(-1),
            Instruction::jnz(3),
            Instruction::push(99),
            Instruction::halt(),
        ]));
        assert!(outcome.is_ok());
        assert!(executor.stack().is_empty());
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let (executor, outcome) = execute(assemble(&[
            Instruction::push(3),
            Instruction::push(0),
            Instruction::idiv(),
            Instruction::halt(),
        ]));
        assert!(matches!(outcome, Err(VmError::DivisionByZero)));
        assert_eq!(executor.state(), ExecutionState::Faulted);
        assert_eq!(executor.inst_ptr(), 2);
        assert_eq!(values(&executor), vec![3, 0]);
    }

    #[test]
    fn fibonacci_loop_matches_hand_trace() {
        let program = program! {
            push 0;
            push 1;
            next:
            dup 1;
            dup 1;
            iadd;
            dup 0;
            print_int;
            dup 0;
            push 100;
            igt;
            jnz done;
            jmp next;
            done:
            halt;
        }
        .unwrap();
        assert_eq!(program.get(10), Some(&Instruction::Jnz(12)));
        assert_eq!(program.get(11), Some(&Instruction::Jmp(2)));

        let (executor, outcome) = execute(program);
        assert!(outcome.is_ok());
        assert_eq!(
            printed(&executor),
            "1\n2\n3\n5\n8\n13\n21\n34\n55\n89\n144\n"
        );
        assert_eq!(
            values(&executor),
            vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144]
        );
        // 2 pushes, 11 loop bodies of 10 instructions, one fewer jmp on the last one, then halt
        assert_eq!(executor.steps(), 2 + 11 * 10 - 1 + 1);
    }

    #[test]
    fn run_reports_the_final_stack() {
        let (stack, outcome) = run(program! { push 5; push 7; iadd; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(stack, vec![Word::from_i64(12)]);

        let (stack, outcome) = run(program! { push 3; push 0; idiv; halt; }.unwrap());
        assert!(matches!(outcome, Err(VmError::DivisionByZero)));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn pushes_land_in_order() {
        let values_in = [3, -8, 0, i64::MAX, i64::MIN];
        let mut instructions: Vec<Instruction> =
            values_in.iter().map(|v| Instruction::push(*v)).collect();
        instructions.push(Instruction::halt());

        let (executor, outcome) = execute(assemble(&instructions));
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), values_in.to_vec());
    }

    #[test]
    fn dup_zero_copies_the_top() {
        let (executor, outcome) = execute(program! { push 41; dup 0; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![41, 41]);
    }

    #[test]
    fn dup_reaches_down_by_depth() {
        let (executor, outcome) =
            execute(program! { push 1; push 2; push 3; dup 2; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![1, 2, 3, 1]);
    }

    #[test]
    fn dup_below_the_bottom_is_illegal() {
        let (executor, outcome) = execute(program! { push 1; dup 1; halt; }.unwrap());
        assert!(matches!(
            outcome,
            Err(VmError::IllegalStackAddress {
                address: 1,
                size: 1
            })
        ));
        assert_eq!(values(&executor), vec![1]);
    }

    #[test]
    fn integer_algebra_holds() {
        let samples = [0, 1, -1, 7, -12345, i64::MAX, i64::MIN];
        for a in samples {
            for b in samples {
                let (add_sub, outcome) = execute(
                    program! { push (a); push (b); iadd; push (b); isub; halt; }.unwrap(),
                );
                assert!(outcome.is_ok());
                assert_eq!(values(&add_sub), vec![a]);

                let (commuted, outcome) = execute(
                    program! {
                        push (a); push (b); iadd;
                        push (b); push (a); iadd;
                        ieq;
                        push (a); push (b); imul;
                        push (b); push (a); imul;
                        ieq;
                        halt;
                    }
                    .unwrap(),
                );
                assert!(outcome.is_ok());
                assert_eq!(values(&commuted), vec![1, 1]);
            }
        }
    }

    #[test]
    fn subtraction_and_division_take_operands_in_push_order() {
        let (executor, outcome) =
            execute(program! { push 10; push 3; isub; push -7; push 2; idiv; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![7, -3]);
    }

    #[test]
    fn division_overflow_wraps() {
        let (executor, outcome) =
            execute(program! { push (i64::MIN); push -1; idiv; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![i64::MIN]);
    }

    #[test]
    fn comparisons_are_signed() {
        let (executor, outcome) = execute(
            program! {
                push 3; push 5; ilt;
                push 3; push 5; igt;
                push 5; push 5; ige;
                push 5; push 5; ile;
                push 4; push 5; ieq;
                push -1; push 1; igt;
                halt;
            }
            .unwrap(),
        );
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![1, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn binary_ops_need_two_operands() {
        let (executor, outcome) = execute(program! { push 1; iadd; halt; }.unwrap());
        assert!(matches!(outcome, Err(VmError::StackUnderflow)));
        assert_eq!(values(&executor), vec![1]);
    }

    #[test]
    fn popping_an_empty_stack_underflows() {
        let (_, outcome) = execute(program! { print_int; halt; }.unwrap());
        assert!(matches!(outcome, Err(VmError::StackUnderflow)));

        let (_, outcome) = execute(program! { jnz 0; }.unwrap());
        assert!(matches!(outcome, Err(VmError::StackUnderflow)));
    }

    #[test]
    fn get_reads_absolute_slots() {
        let (executor, outcome) =
            execute(program! { push 10; push 20; get 0; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![10, 20, 10]);

        let (_, outcome) = execute(program! { push 10; get 1; halt; }.unwrap());
        assert!(matches!(
            outcome,
            Err(VmError::IllegalStackAddress {
                address: 1,
                size: 1
            })
        ));
    }

    #[test]
    fn set_pops_then_overwrites() {
        let (executor, outcome) =
            execute(program! { push 1; push 2; push 9; set 0; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert_eq!(values(&executor), vec![9, 2]);

        // after the pop only one slot is left
        let (_, outcome) = execute(program! { push 1; push 2; set 1; halt; }.unwrap());
        assert!(matches!(
            outcome,
            Err(VmError::IllegalStackAddress {
                address: 1,
                size: 1
            })
        ));
    }

    #[test]
    fn running_off_the_end_is_an_illegal_address() {
        let (executor, outcome) = execute(program! { push 1; nop; }.unwrap());
        assert!(matches!(
            outcome,
            Err(VmError::IllegalInstructionAddress(2))
        ));
        assert_eq!(values(&executor), vec![1]);
    }

    #[test]
    fn jump_to_last_instruction_is_legal() {
        let (executor, outcome) = execute(program! { jmp 2; push 1; halt; }.unwrap());
        assert!(outcome.is_ok());
        assert!(executor.stack().is_empty());

        let (_, outcome) = execute(program! { jmp 3; push 1; halt; }.unwrap());
        assert!(matches!(
            outcome,
            Err(VmError::IllegalInstructionAddress(3))
        ));
    }

    #[test]
    fn empty_program_has_nothing_to_fetch() {
        let (_, outcome) = execute(Program::new());
        assert!(matches!(
            outcome,
            Err(VmError::IllegalInstructionAddress(0))
        ));
    }

    #[test]
    fn stack_overflow_is_fatal() {
        let config = ExecutorConfig {
            stack_capacity: 2,
            ..ExecutorConfig::default()
        };
        let (executor, outcome) =
            execute_with(program! { push 1; push 2; push 3; halt; }.unwrap(), config);
        assert!(matches!(
            outcome,
            Err(VmError::StackOverflow { capacity: 2 })
        ));
        assert_eq!(values(&executor), vec![1, 2]);
    }

    #[test]
    fn heap_opcodes_fail_fast() {
        let (_, outcome) = execute(program! { alloc 16; halt; }.unwrap());
        assert!(matches!(
            outcome,
            Err(VmError::Unimplemented(Opcode::Alloc))
        ));

        let (_, outcome) = execute(program! { free; halt; }.unwrap());
        assert!(matches!(outcome, Err(VmError::Unimplemented(Opcode::Free))));
    }

    #[test]
    fn step_limit_stops_runaway_loops() {
        let config = ExecutorConfig {
            max_steps: Some(100),
            ..ExecutorConfig::default()
        };
        let (executor, outcome) = execute_with(program! { top: jmp top; }.unwrap(), config);
        assert!(matches!(outcome, Err(VmError::StepLimitExceeded(100))));
        assert_eq!(executor.steps(), 100);
    }

    #[test]
    fn step_limit_allows_exactly_enough_steps() {
        let config = ExecutorConfig {
            max_steps: Some(2),
            ..ExecutorConfig::default()
        };
        let (_, outcome) = execute_with(program! { push 1; halt; }.unwrap(), config);
        assert!(outcome.is_ok());
    }

    #[test]
    fn stepping_after_halt_does_nothing() {
        let mut executor = Executor::new(program! { push 1; halt; }.unwrap(), Vec::new());
        assert_eq!(executor.step().unwrap(), ExecutionState::Running);
        assert_eq!(executor.step().unwrap(), ExecutionState::Halted);
        assert_eq!(executor.step().unwrap(), ExecutionState::Halted);
        assert_eq!(executor.steps(), 2);
    }

    #[test]
    fn reset_allows_a_second_run() {
        let mut executor =
            Executor::new(program! { push 2; dup 0; imul; print_int; halt; }.unwrap(), Vec::new());
        executor.run().unwrap();
        executor.reset();
        assert_eq!(executor.state(), ExecutionState::Running);
        assert_eq!(executor.inst_ptr(), 0);
        executor.run().unwrap();
        assert_eq!(String::from_utf8(executor.into_output()).unwrap(), "4\n4\n");
    }

    #[test]
    fn trace_writes_one_line_per_step() {
        let config = ExecutorConfig {
            flags: ExecutionFlags::TRACE,
            ..ExecutorConfig::default()
        };
        let (executor, outcome) =
            execute_with(program! { push 5; push 7; iadd; halt; }.unwrap(), config);
        assert!(outcome.is_ok());

        let output = printed(&executor);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("0000: push 5"));
        assert!(lines[2].starts_with("0002: iadd"));
        assert!(lines[2].ends_with("[5, 7]"));
    }

    #[test]
    fn dump_on_exit_reports_faulted_runs_too() {
        let config = ExecutorConfig {
            flags: ExecutionFlags::DUMP_ON_EXIT,
            ..ExecutorConfig::default()
        };
        let (executor, outcome) =
            execute_with(program! { push 3; push 0; idiv; }.unwrap(), config);
        assert!(matches!(outcome, Err(VmError::DivisionByZero)));
        assert_eq!(
            printed(&executor),
            format!("Stack:\n  3\n  0\n{}\n", "-".repeat(30))
        );
    }
}
