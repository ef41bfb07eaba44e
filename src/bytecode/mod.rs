pub mod encoding;
pub mod program;

use std::fmt;

pub use program::{Program, ProgramError, DEFAULT_PROGRAM_CAPACITY};

/// A raw 64 bit machine word.
///
/// The word doesn't know what it holds, every opcode picks the view it needs
/// through one of the explicit conversions below.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Word(u64);

impl Word {
    pub const ZERO: Word = Word(0);

    pub const fn from_u64(value: u64) -> Word {
        Word(value)
    }

    pub const fn from_i64(value: i64) -> Word {
        Word(value as u64)
    }

    pub fn from_f64(value: f64) -> Word {
        Word(value.to_bits())
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Truthiness as `jnz` sees it (unsigned view)
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({})", self.as_i64())
    }
}

impl From<i64> for Word {
    fn from(value: i64) -> Self {
        Word::from_i64(value)
    }
}

impl From<bool> for Word {
    fn from(value: bool) -> Self {
        Word::from_u64(value as u64)
    }
}

/// The numeric tag of every instruction, order matches the binary encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Push,
    /// absolute stack address
    Get,
    /// relative stack address (depth from the top)
    Dup,
    Set,
    IAdd,
    ISub,
    IMul,
    IDiv,
    IEq,
    IGt,
    IGe,
    ILt,
    ILe,
    Jmp,
    Jnz,
    Alloc,
    Free,
    Halt,
    /// temporary for debug purposes
    PrintInt,
}

impl Opcode {
    pub const ALL: [Opcode; 20] = [
        Opcode::Nop,
        Opcode::Push,
        Opcode::Get,
        Opcode::Dup,
        Opcode::Set,
        Opcode::IAdd,
        Opcode::ISub,
        Opcode::IMul,
        Opcode::IDiv,
        Opcode::IEq,
        Opcode::IGt,
        Opcode::IGe,
        Opcode::ILt,
        Opcode::ILe,
        Opcode::Jmp,
        Opcode::Jnz,
        Opcode::Alloc,
        Opcode::Free,
        Opcode::Halt,
        Opcode::PrintInt,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Push => "push",
            Opcode::Get => "get",
            Opcode::Dup => "dup",
            Opcode::Set => "set",
            Opcode::IAdd => "iadd",
            Opcode::ISub => "isub",
            Opcode::IMul => "imul",
            Opcode::IDiv => "idiv",
            Opcode::IEq => "ieq",
            Opcode::IGt => "igt",
            Opcode::IGe => "ige",
            Opcode::ILt => "ilt",
            Opcode::ILe => "ile",
            Opcode::Jmp => "jmp",
            Opcode::Jnz => "jnz",
            Opcode::Alloc => "alloc",
            Opcode::Free => "free",
            Opcode::Halt => "halt",
            Opcode::PrintInt => "print_int",
        }
    }

    /// Case insensitive lookup of an opcode by its mnemonic
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.mnemonic().eq_ignore_ascii_case(text))
    }

    pub fn takes_operand(&self) -> bool {
        matches!(
            self,
            Opcode::Push
                | Opcode::Get
                | Opcode::Dup
                | Opcode::Set
                | Opcode::Jmp
                | Opcode::Jnz
                | Opcode::Alloc
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Opcode::ALL.get(tag as usize).copied().ok_or(tag)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic().to_ascii_uppercase())
    }
}

/// A single decoded instruction, the operand lives inside the variant that needs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Push(Word),
    Get(u64),
    Dup(u64),
    Set(u64),
    IAdd,
    ISub,
    IMul,
    IDiv,
    IEq,
    IGt,
    IGe,
    ILt,
    ILe,
    Jmp(u64),
    Jnz(u64),
    /// Declared but has no execution semantics
    Alloc(u64),
    /// Declared but has no execution semantics
    Free,
    Halt,
    PrintInt,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Push(_) => Opcode::Push,
            Instruction::Get(_) => Opcode::Get,
            Instruction::Dup(_) => Opcode::Dup,
            Instruction::Set(_) => Opcode::Set,
            Instruction::IAdd => Opcode::IAdd,
            Instruction::ISub => Opcode::ISub,
            Instruction::IMul => Opcode::IMul,
            Instruction::IDiv => Opcode::IDiv,
            Instruction::IEq => Opcode::IEq,
            Instruction::IGt => Opcode::IGt,
            Instruction::IGe => Opcode::IGe,
            Instruction::ILt => Opcode::ILt,
            Instruction::ILe => Opcode::ILe,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::Jnz(_) => Opcode::Jnz,
            Instruction::Alloc(_) => Opcode::Alloc,
            Instruction::Free => Opcode::Free,
            Instruction::Halt => Opcode::Halt,
            Instruction::PrintInt => Opcode::PrintInt,
        }
    }

    /// The operand as a raw word, operand-less instructions report zero
    pub fn operand(&self) -> Word {
        match *self {
            Instruction::Push(word) => word,
            Instruction::Get(addr)
            | Instruction::Dup(addr)
            | Instruction::Set(addr)
            | Instruction::Jmp(addr)
            | Instruction::Jnz(addr)
            | Instruction::Alloc(addr) => Word::from_u64(addr),
            _ => Word::ZERO,
        }
    }

    /// Rebuild an instruction from its tag and raw operand.
    /// The operand is ignored for opcodes that don't take one.
    pub fn from_parts(opcode: Opcode, operand: Word) -> Instruction {
        let addr = operand.as_u64();
        match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::Push => Instruction::Push(operand),
            Opcode::Get => Instruction::Get(addr),
            Opcode::Dup => Instruction::Dup(addr),
            Opcode::Set => Instruction::Set(addr),
            Opcode::IAdd => Instruction::IAdd,
            Opcode::ISub => Instruction::ISub,
            Opcode::IMul => Instruction::IMul,
            Opcode::IDiv => Instruction::IDiv,
            Opcode::IEq => Instruction::IEq,
            Opcode::IGt => Instruction::IGt,
            Opcode::IGe => Instruction::IGe,
            Opcode::ILt => Instruction::ILt,
            Opcode::ILe => Instruction::ILe,
            Opcode::Jmp => Instruction::Jmp(addr),
            Opcode::Jnz => Instruction::Jnz(addr),
            Opcode::Alloc => Instruction::Alloc(addr),
            Opcode::Free => Instruction::Free,
            Opcode::Halt => Instruction::Halt,
            Opcode::PrintInt => Instruction::PrintInt,
        }
    }
}

// Lower-case constructors, these are the names both assemblers emit calls to.
impl Instruction {
    pub fn nop() -> Instruction {
        Instruction::Nop
    }

    pub fn push(value: i64) -> Instruction {
        Instruction::Push(Word::from_i64(value))
    }

    pub fn get(addr: u64) -> Instruction {
        Instruction::Get(addr)
    }

    pub fn dup(depth: u64) -> Instruction {
        Instruction::Dup(depth)
    }

    pub fn set(addr: u64) -> Instruction {
        Instruction::Set(addr)
    }

    pub fn iadd() -> Instruction {
        Instruction::IAdd
    }

    pub fn isub() -> Instruction {
        Instruction::ISub
    }

    pub fn imul() -> Instruction {
        Instruction::IMul
    }

    pub fn idiv() -> Instruction {
        Instruction::IDiv
    }

    pub fn ieq() -> Instruction {
        Instruction::IEq
    }

    pub fn igt() -> Instruction {
        Instruction::IGt
    }

    pub fn ige() -> Instruction {
        Instruction::IGe
    }

    pub fn ilt() -> Instruction {
        Instruction::ILt
    }

    pub fn ile() -> Instruction {
        Instruction::ILe
    }

    pub fn jmp(target: u64) -> Instruction {
        Instruction::Jmp(target)
    }

    pub fn jnz(target: u64) -> Instruction {
        Instruction::Jnz(target)
    }

    pub fn alloc(size: u64) -> Instruction {
        Instruction::Alloc(size)
    }

    pub fn free() -> Instruction {
        Instruction::Free
    }

    pub fn halt() -> Instruction {
        Instruction::Halt
    }

    pub fn print_int() -> Instruction {
        Instruction::PrintInt
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode().mnemonic();
        match *self {
            Instruction::Push(word) => write!(f, "{} {}", mnemonic, word.as_i64()),
            Instruction::Get(addr)
            | Instruction::Dup(addr)
            | Instruction::Set(addr)
            | Instruction::Jmp(addr)
            | Instruction::Jnz(addr)
            | Instruction::Alloc(addr) => write!(f, "{} {}", mnemonic, addr),
            _ => write!(f, "{}", mnemonic),
        }
    }
}
