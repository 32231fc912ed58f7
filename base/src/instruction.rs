//! Binary representation of stack machine instructions.
//!
//! Every instruction starts with a one-byte opcode.  The opcode
//! determines the class of the instruction, and the class determines
//! what follows the opcode and so the size of the instruction:
//!
//! | Class          | Layout                          | Size |
//! |----------------|---------------------------------|------|
//! | Nullary        | `id`                            | 1    |
//! | Arithmetic     | `id`, mode flag (1 = reversed)  | 2    |
//! | Trigonometric  | `id`, register                  | 2    |
//! | Register       | `id`, register                  | 2    |
//! | Memory         | `id`, i16 offset                | 3    |
//! | Real           | `id`, f64 value                 | 9    |
//! | Call           | `id`, i16 target                | 3    |
//!
//! Multi-byte fields are little-endian.  The opcode numbers are
//! shared with the dispatch table of the virtual machine and must not
//! be changed.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

mod encode;
mod format;

pub use encode::{encode, EncodingError};

/// `Opcode` enumerates the operations of the virtual machine.
#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Opcode {
    End = 0,
    Ret = 1,
    Pop = 2,
    PushReg = 3,
    PushMem = 4,
    PushReal = 5,
    FldReg = 6,
    FldMem = 7,
    FldReal = 8,
    FSum = 9,
    FSub = 10,
    FMul = 11,
    FDiv = 12,
    FLog = 13,
    FPow = 14,
    FSin = 15,
    FCos = 16,
    FTan = 17,
    FCtan = 18,
    FAsin = 19,
    FAcos = 20,
    FAtan = 21,
    FActan = 22,
    Call = 23,
}

/// The shape of the operand fields which follow an opcode.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum InstructionClass {
    Nullary,
    Arithmetic,
    Trigonometric,
    Register,
    Memory,
    Real,
    Call,
}

impl InstructionClass {
    /// Size in bytes of an encoded instruction of this class.
    pub const fn size(self) -> usize {
        match self {
            InstructionClass::Nullary => 1,
            InstructionClass::Arithmetic
            | InstructionClass::Trigonometric
            | InstructionClass::Register => 2,
            InstructionClass::Memory | InstructionClass::Call => 1 + OFFSET_SIZE,
            InstructionClass::Real => 1 + REAL_SIZE,
        }
    }
}

/// Width of a signed 16-bit offset field.
pub const OFFSET_SIZE: usize = 2;
const REAL_SIZE: usize = 8;

impl Opcode {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn class(&self) -> InstructionClass {
        use Opcode::*;
        match self {
            End | Ret | Pop => InstructionClass::Nullary,
            FSum | FSub | FMul | FDiv | FLog | FPow => InstructionClass::Arithmetic,
            FSin | FCos | FTan | FCtan | FAsin | FAcos | FAtan | FActan => {
                InstructionClass::Trigonometric
            }
            PushReg | FldReg => InstructionClass::Register,
            PushMem | FldMem => InstructionClass::Memory,
            PushReal | FldReal => InstructionClass::Real,
            Call => InstructionClass::Call,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DisassemblyFailure;
    fn try_from(opcode: u8) -> Result<Opcode, DisassemblyFailure> {
        use Opcode::*;
        Ok(match opcode {
            0 => End,
            1 => Ret,
            2 => Pop,
            3 => PushReg,
            4 => PushMem,
            5 => PushReal,
            6 => FldReg,
            7 => FldMem,
            8 => FldReal,
            9 => FSum,
            10 => FSub,
            11 => FMul,
            12 => FDiv,
            13 => FLog,
            14 => FPow,
            15 => FSin,
            16 => FCos,
            17 => FTan,
            18 => FCtan,
            19 => FAsin,
            20 => FAcos,
            21 => FAtan,
            22 => FActan,
            23 => Call,
            _ => {
                return Err(DisassemblyFailure::InvalidOpcode(opcode));
            }
        })
    }
}

/// An encoded instruction, prior to serialisation.
///
/// Instructions are normally created by [`encode`] (which
/// guarantees that the opcode belongs to the variant's class) or by
/// [`Instruction::decode`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Instruction {
    Nullary(Opcode),
    Arithmetic { opcode: Opcode, reverse: bool },
    Trigonometric { opcode: Opcode, reg: u8 },
    Register { opcode: Opcode, reg: u8 },
    Memory { opcode: Opcode, offset: i16 },
    Real { opcode: Opcode, value: f64 },
    Call { target: i16 },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nullary(opcode)
            | Instruction::Arithmetic { opcode, .. }
            | Instruction::Trigonometric { opcode, .. }
            | Instruction::Register { opcode, .. }
            | Instruction::Memory { opcode, .. }
            | Instruction::Real { opcode, .. } => *opcode,
            Instruction::Call { .. } => Opcode::Call,
        }
    }

    pub fn size(&self) -> usize {
        self.opcode().class().size()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result: Vec<u8> = Vec::with_capacity(self.size());
        result.push(self.opcode().number());
        match self {
            Instruction::Nullary(_) => (),
            Instruction::Arithmetic { reverse, .. } => {
                result.push(u8::from(*reverse));
            }
            Instruction::Trigonometric { reg, .. } | Instruction::Register { reg, .. } => {
                result.push(*reg);
            }
            Instruction::Memory { offset, .. } => {
                result.extend_from_slice(&offset.to_le_bytes());
            }
            Instruction::Call { target } => {
                result.extend_from_slice(&target.to_le_bytes());
            }
            Instruction::Real { value, .. } => {
                result.extend_from_slice(&value.to_le_bytes());
            }
        }
        result
    }

    /// Decode the instruction at the start of `bytes`.  Any bytes
    /// beyond the end of that instruction are ignored; use
    /// [`Instruction::size`] to find where the next one begins.
    pub fn decode(bytes: &[u8]) -> Result<Instruction, DisassemblyFailure> {
        let (&id, operands) = match bytes.split_first() {
            Some(parts) => parts,
            None => {
                return Err(DisassemblyFailure::Empty);
            }
        };
        let opcode = Opcode::try_from(id)?;
        let needed = opcode.class().size() - 1;
        if operands.len() < needed {
            return Err(DisassemblyFailure::Truncated {
                opcode,
                available: operands.len(),
                needed,
            });
        }
        let operands = &operands[..needed];
        let i16_operand = || i16::from_le_bytes([operands[0], operands[1]]);
        Ok(match opcode.class() {
            InstructionClass::Nullary => Instruction::Nullary(opcode),
            InstructionClass::Arithmetic => match operands[0] {
                0 => Instruction::Arithmetic {
                    opcode,
                    reverse: false,
                },
                1 => Instruction::Arithmetic {
                    opcode,
                    reverse: true,
                },
                flag => {
                    return Err(DisassemblyFailure::InvalidModeFlag(opcode, flag));
                }
            },
            InstructionClass::Trigonometric => Instruction::Trigonometric {
                opcode,
                reg: operands[0],
            },
            InstructionClass::Register => Instruction::Register {
                opcode,
                reg: operands[0],
            },
            InstructionClass::Memory => Instruction::Memory {
                opcode,
                offset: i16_operand(),
            },
            InstructionClass::Call => Instruction::Call {
                target: i16_operand(),
            },
            InstructionClass::Real => {
                let mut buf = [0_u8; REAL_SIZE];
                buf.copy_from_slice(operands);
                Instruction::Real {
                    opcode,
                    value: f64::from_le_bytes(buf),
                }
            }
        })
    }
}

/// Signals that a sequence of bytes could not be converted to an
/// [`Instruction`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DisassemblyFailure {
    /// There were no bytes at all.
    Empty,

    /// The opcode byte does not correspond to a known opcode.
    InvalidOpcode(u8),

    /// The input ended part way through the instruction.
    Truncated {
        opcode: Opcode,
        available: usize,
        needed: usize,
    },

    /// The mode flag of an arithmetic instruction is neither 0 nor 1.
    InvalidModeFlag(Opcode, u8),
}

impl Display for DisassemblyFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            DisassemblyFailure::Empty => f.write_str("no instruction to decode"),
            DisassemblyFailure::InvalidOpcode(n) => write!(f, "invalid opcode {n}"),
            DisassemblyFailure::Truncated {
                opcode,
                available,
                needed,
            } => write!(
                f,
                "instruction {opcode} needs {needed} operand bytes but only {available} remain"
            ),
            DisassemblyFailure::InvalidModeFlag(opcode, flag) => {
                write!(f, "instruction {opcode} has invalid mode flag {flag}")
            }
        }
    }
}

impl Error for DisassemblyFailure {}

#[cfg(test)]
fn instruction_of_class(
    opcode: Opcode,
    reg: u8,
    offset: i16,
    value: f64,
    reverse: bool,
) -> Instruction {
    match opcode.class() {
        InstructionClass::Nullary => Instruction::Nullary(opcode),
        InstructionClass::Arithmetic => Instruction::Arithmetic { opcode, reverse },
        InstructionClass::Trigonometric => Instruction::Trigonometric { opcode, reg },
        InstructionClass::Register => Instruction::Register { opcode, reg },
        InstructionClass::Memory => Instruction::Memory { opcode, offset },
        InstructionClass::Real => Instruction::Real { opcode, value },
        InstructionClass::Call => Instruction::Call { target: offset },
    }
}

#[cfg(test)]
#[proptest]
fn reversible_decoding(
    opcode: Opcode,
    reg: u8,
    offset: i16,
    reverse: bool,
    #[strategy(-1.0e300_f64..1.0e300_f64)] value: f64,
) {
    let input = instruction_of_class(opcode, reg, offset, value, reverse);
    let bytes = input.to_bytes();
    assert_eq!(bytes.len(), input.size());
    assert_eq!(bytes[0], opcode.number());
    match Instruction::decode(&bytes) {
        Ok(decoded) => {
            assert_eq!(decoded, input);
        }
        Err(e) => {
            panic!("input {input:?} encoded to {bytes:?} but that could not be decoded ({e})");
        }
    }
}

#[cfg(test)]
#[proptest]
fn opcode_numbers_are_reversible(opcode: Opcode) {
    assert_eq!(Opcode::try_from(opcode.number()), Ok(opcode));
}

#[test]
fn class_sizes() {
    assert_eq!(InstructionClass::Nullary.size(), 1);
    assert_eq!(InstructionClass::Arithmetic.size(), 2);
    assert_eq!(InstructionClass::Trigonometric.size(), 2);
    assert_eq!(InstructionClass::Register.size(), 2);
    assert_eq!(InstructionClass::Memory.size(), 3);
    assert_eq!(InstructionClass::Real.size(), 9);
    assert_eq!(InstructionClass::Call.size(), 3);
}

#[test]
fn memory_offset_is_little_endian() {
    let inst = Instruction::Memory {
        opcode: Opcode::PushMem,
        offset: -2,
    };
    assert_eq!(inst.to_bytes(), vec![4, 0xFE, 0xFF]);
}

#[test]
fn decode_ignores_following_instructions() {
    let bytes = [Opcode::FSum.number(), 1, Opcode::End.number()];
    assert_eq!(
        Instruction::decode(&bytes),
        Ok(Instruction::Arithmetic {
            opcode: Opcode::FSum,
            reverse: true
        })
    );
    assert_eq!(
        Instruction::decode(&bytes[2..]),
        Ok(Instruction::Nullary(Opcode::End))
    );
}

#[test]
fn decode_failures() {
    assert_eq!(Instruction::decode(&[]), Err(DisassemblyFailure::Empty));
    assert_eq!(
        Instruction::decode(&[200]),
        Err(DisassemblyFailure::InvalidOpcode(200))
    );
    assert_eq!(
        Instruction::decode(&[Opcode::FldReal.number(), 1, 2, 3]),
        Err(DisassemblyFailure::Truncated {
            opcode: Opcode::FldReal,
            available: 3,
            needed: 8,
        })
    );
    assert_eq!(
        Instruction::decode(&[Opcode::FDiv.number(), 7]),
        Err(DisassemblyFailure::InvalidModeFlag(Opcode::FDiv, 7))
    );
}
