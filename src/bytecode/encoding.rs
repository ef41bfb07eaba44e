use arbitrary_int::u5;
use bitbybit::bitfield;
use num_traits::ops::bytes::ToBytes;
use thiserror::Error;

use super::{Instruction, Opcode, Program, ProgramError, Word};

/// Every encoded program starts with these 4 bytes, the last one is the format version
pub const MAGIC: [u8; 4] = *b"SVM\x01";

const OPERAND_SIZE: usize = 8;
const RESERVED_BITS: u8 = 0b0110_0000;

/// The first byte of every encoded instruction.
///
/// Structure is: HasOperand (1 bit) | Reserved (2 bits) | Opcode (5 bits)
/// if `has_operand` is set then the next 8 bytes are the little endian operand.
#[bitfield(u8)]
#[derive(Debug)]
pub struct InstructionHeader {
    #[bit(7, rw)]
    pub has_operand: bool,

    #[bits(0..=4, rw)]
    pub opcode: u5,
}

impl InstructionHeader {
    pub fn for_opcode(opcode: Opcode) -> InstructionHeader {
        InstructionHeader::new_with_raw_value(0)
            .with_opcode(u5::new(opcode as u8))
            .with_has_operand(opcode.takes_operand())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing magic header, this isn't an encoded program")]
    BadMagic,

    #[error("Unknown opcode tag {tag} at byte {offset}")]
    UnknownOpcode { offset: usize, tag: u8 },

    #[error("Malformed instruction header {header:#04x} at byte {offset}")]
    MalformedHeader { offset: usize, header: u8 },

    #[error("Operand flag at byte {offset} disagrees with opcode {opcode}")]
    OperandMismatch { offset: usize, opcode: Opcode },

    #[error("Program truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error(transparent)]
    Program(#[from] ProgramError),
}

fn emit<const COUNT: usize, T: ToBytes<Bytes = [u8; COUNT]>>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(&ToBytes::to_le_bytes(&value));
}

pub fn is_encoded(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

pub fn encode(program: &Program) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + program.len() * (1 + OPERAND_SIZE));
    out.extend_from_slice(&MAGIC);

    for inst in program {
        let opcode = inst.opcode();
        let header = InstructionHeader::for_opcode(opcode);
        emit(&mut out, header.raw_value());
        if opcode.takes_operand() {
            emit(&mut out, inst.operand().as_u64());
        }
    }

    out
}

pub fn decode(bytes: &[u8], capacity: usize) -> Result<Program, DecodeError> {
    if !is_encoded(bytes) {
        return Err(DecodeError::BadMagic);
    }

    let mut program = Program::with_capacity(capacity);
    let mut offset = MAGIC.len();
    while offset < bytes.len() {
        let raw = bytes[offset];
        if raw & RESERVED_BITS != 0 {
            return Err(DecodeError::MalformedHeader {
                offset,
                header: raw,
            });
        }

        let header = InstructionHeader::new_with_raw_value(raw);
        let opcode = Opcode::try_from(header.opcode().value())
            .map_err(|tag| DecodeError::UnknownOpcode { offset, tag })?;
        if header.has_operand() != opcode.takes_operand() {
            return Err(DecodeError::OperandMismatch { offset, opcode });
        }

        let operand = if header.has_operand() {
            let operand_bytes: [u8; OPERAND_SIZE] = bytes
                .get(offset + 1..offset + 1 + OPERAND_SIZE)
                .and_then(|slice| slice.try_into().ok())
                .ok_or(DecodeError::Truncated { offset })?;
            offset += 1 + OPERAND_SIZE;
            Word::from_u64(u64::from_le_bytes(operand_bytes))
        } else {
            offset += 1;
            Word::ZERO
        };

        program.add_inst(Instruction::from_parts(opcode, operand))?;
    }

    Ok(program)
}
