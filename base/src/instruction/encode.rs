//! Conversion of mnemonic and operand tokens into [`Instruction`]s.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::{Instruction, Opcode};
use crate::token::{Tag, Token};

/// Signals that a mnemonic and its operand do not form a valid
/// instruction.  These are mistakes in the caller's input; retrying
/// will not help.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EncodingError {
    /// The token in mnemonic position is not a mnemonic.
    NotAMnemonic(Token),

    /// The mnemonic needs an operand but none was supplied.
    MissingOperand { mnemonic: Token },

    /// The mnemonic takes no operand but one was supplied.
    UnexpectedOperand { mnemonic: Token, operand: Token },

    /// The operand kind does not match the opcode class (for
    /// example a real literal as the operand of `sin`).
    OperandMismatch { mnemonic: Token, operand: Token },

    /// The operand has the right kind but its text does not
    /// represent a value of that kind (for example a register
    /// number larger than 255).
    BadOperand {
        operand: Token,
        expected: &'static str,
    },
}

impl Display for EncodingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            EncodingError::NotAMnemonic(token) => {
                write!(f, "'{token}' is not an instruction mnemonic")
            }
            EncodingError::MissingOperand { mnemonic } => {
                write!(f, "instruction '{mnemonic}' requires an operand")
            }
            EncodingError::UnexpectedOperand { mnemonic, operand } => {
                write!(
                    f,
                    "instruction '{mnemonic}' takes no operand, but '{operand}' was given"
                )
            }
            EncodingError::OperandMismatch { mnemonic, operand } => {
                write!(
                    f,
                    "operand '{operand}' ({:?}) is not valid for instruction '{mnemonic}'",
                    operand.tag()
                )
            }
            EncodingError::BadOperand { operand, expected } => {
                write!(f, "operand '{operand}' is not a valid {expected}")
            }
        }
    }
}

impl Error for EncodingError {}

fn parse_operand<T: FromStr>(operand: &Token, expected: &'static str) -> Result<T, EncodingError> {
    operand
        .text()
        .trim()
        .parse::<T>()
        .map_err(|_| EncodingError::BadOperand {
            operand: operand.clone(),
            expected,
        })
}

fn register(operand: &Token) -> Result<u8, EncodingError> {
    parse_operand(operand, "register number")
}

fn offset(operand: &Token) -> Result<i16, EncodingError> {
    parse_operand(operand, "16-bit signed offset")
}

fn real(operand: &Token) -> Result<f64, EncodingError> {
    parse_operand(operand, "real number")
}

fn arithmetic_opcode(tag: Tag) -> Option<(Opcode, bool)> {
    Some(match tag {
        Tag::Sum => (Opcode::FSum, false),
        Tag::SumR => (Opcode::FSum, true),
        Tag::Sub => (Opcode::FSub, false),
        Tag::SubR => (Opcode::FSub, true),
        Tag::Mul => (Opcode::FMul, false),
        Tag::MulR => (Opcode::FMul, true),
        Tag::Div => (Opcode::FDiv, false),
        Tag::DivR => (Opcode::FDiv, true),
        Tag::Log => (Opcode::FLog, false),
        Tag::LogR => (Opcode::FLog, true),
        Tag::Pow => (Opcode::FPow, false),
        Tag::PowR => (Opcode::FPow, true),
        _ => {
            return None;
        }
    })
}

fn trigonometric_opcode(tag: Tag) -> Option<Opcode> {
    Some(match tag {
        Tag::Sin => Opcode::FSin,
        Tag::Cos => Opcode::FCos,
        Tag::Tan => Opcode::FTan,
        Tag::Ctan => Opcode::FCtan,
        Tag::Asin => Opcode::FAsin,
        Tag::Acos => Opcode::FAcos,
        Tag::Atan => Opcode::FAtan,
        Tag::Actan => Opcode::FActan,
        _ => {
            return None;
        }
    })
}

/// Encode the instruction `mnemonic` with the (optional) `operand`.
///
/// The operand's tag selects between the register, memory and real
/// forms of `fld` and `push`.  A `call` operand must be a numeric
/// target; symbolic call targets are the assembler's business since
/// their value is not known until link time.
///
/// # Errors
///
/// Fails with [`EncodingError`] when the operand kind does not match
/// the opcode class, when an operand is missing or superfluous, or
/// when its text cannot be parsed.
pub fn encode(mnemonic: &Token, operand: Option<&Token>) -> Result<Instruction, EncodingError> {
    let tag = mnemonic.tag();
    let mismatch = |operand: &Token| EncodingError::OperandMismatch {
        mnemonic: mnemonic.clone(),
        operand: operand.clone(),
    };
    let required = || {
        operand.ok_or_else(|| EncodingError::MissingOperand {
            mnemonic: mnemonic.clone(),
        })
    };
    let nothing_else = |inst: Instruction| match operand {
        None => Ok(inst),
        Some(op) => Err(EncodingError::UnexpectedOperand {
            mnemonic: mnemonic.clone(),
            operand: op.clone(),
        }),
    };

    if !tag.is_mnemonic() {
        return Err(EncodingError::NotAMnemonic(mnemonic.clone()));
    }
    if let Some((opcode, reverse)) = arithmetic_opcode(tag) {
        return nothing_else(Instruction::Arithmetic { opcode, reverse });
    }
    if let Some(opcode) = trigonometric_opcode(tag) {
        let op = required()?;
        return match op.tag() {
            Tag::Register => Ok(Instruction::Trigonometric {
                opcode,
                reg: register(op)?,
            }),
            _ => Err(mismatch(op)),
        };
    }
    match tag {
        Tag::End => nothing_else(Instruction::Nullary(Opcode::End)),
        Tag::Ret => nothing_else(Instruction::Nullary(Opcode::Ret)),
        Tag::Pop => nothing_else(Instruction::Nullary(Opcode::Pop)),
        Tag::Fld | Tag::Push => {
            let push = tag == Tag::Push;
            let op = required()?;
            match op.tag() {
                Tag::Register => Ok(Instruction::Register {
                    opcode: if push { Opcode::PushReg } else { Opcode::FldReg },
                    reg: register(op)?,
                }),
                Tag::Number => Ok(Instruction::Memory {
                    opcode: if push { Opcode::PushMem } else { Opcode::FldMem },
                    offset: offset(op)?,
                }),
                Tag::Real => Ok(Instruction::Real {
                    opcode: if push {
                        Opcode::PushReal
                    } else {
                        Opcode::FldReal
                    },
                    value: real(op)?,
                }),
                _ => Err(mismatch(op)),
            }
        }
        Tag::Call => {
            let op = required()?;
            match op.tag() {
                Tag::Number => Ok(Instruction::Call { target: offset(op)? }),
                _ => Err(mismatch(op)),
            }
        }
        _ => Err(EncodingError::NotAMnemonic(mnemonic.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionClass;
    use test_strategy::proptest;

    fn tok(tag: Tag, text: &str) -> Token {
        Token::new(tag, text)
    }

    fn encode_bytes(mnemonic: Tag, text: &str, operand: Option<Token>) -> Vec<u8> {
        match encode(&tok(mnemonic, text), operand.as_ref()) {
            Ok(inst) => inst.to_bytes(),
            Err(e) => panic!("failed to encode {text}: {e}"),
        }
    }

    #[test]
    fn nullary() {
        assert_eq!(encode_bytes(Tag::End, "end", None), vec![0]);
        assert_eq!(encode_bytes(Tag::Ret, "ret", None), vec![1]);
        assert_eq!(encode_bytes(Tag::Pop, "pop", None), vec![2]);
    }

    #[test]
    fn arithmetic_reverse_forms_set_mode_flag() {
        let cases = [
            (Tag::Sum, Tag::SumR, Opcode::FSum),
            (Tag::Sub, Tag::SubR, Opcode::FSub),
            (Tag::Mul, Tag::MulR, Opcode::FMul),
            (Tag::Div, Tag::DivR, Opcode::FDiv),
            (Tag::Log, Tag::LogR, Opcode::FLog),
            (Tag::Pow, Tag::PowR, Opcode::FPow),
        ];
        for (base, reversed, opcode) in cases {
            assert_eq!(encode_bytes(base, "x", None), vec![opcode.number(), 0]);
            assert_eq!(encode_bytes(reversed, "x", None), vec![opcode.number(), 1]);
        }
    }

    #[test]
    fn trigonometric() {
        let reg = Some(tok(Tag::Register, "5"));
        assert_eq!(
            encode_bytes(Tag::Actan, "actan", reg.clone()),
            vec![Opcode::FActan.number(), 5]
        );
        assert_eq!(
            encode_bytes(Tag::Sin, "sin", reg),
            vec![Opcode::FSin.number(), 5]
        );
    }

    #[test]
    fn load_and_push_select_form_by_operand() {
        assert_eq!(
            encode_bytes(Tag::Push, "push", Some(tok(Tag::Register, "2"))),
            vec![Opcode::PushReg.number(), 2]
        );
        assert_eq!(
            encode_bytes(Tag::Fld, "fld", Some(tok(Tag::Register, "2"))),
            vec![Opcode::FldReg.number(), 2]
        );
        assert_eq!(
            encode_bytes(Tag::Fld, "fld", Some(tok(Tag::Number, "-3"))),
            vec![Opcode::FldMem.number(), 0xFD, 0xFF]
        );
        assert_eq!(
            encode_bytes(Tag::Push, "push", Some(tok(Tag::Number, "258"))),
            vec![Opcode::PushMem.number(), 2, 1]
        );
        let mut expected = vec![Opcode::PushReal.number()];
        expected.extend_from_slice(&1.5_f64.to_le_bytes());
        assert_eq!(
            encode_bytes(Tag::Push, "push", Some(tok(Tag::Real, "1.5"))),
            expected
        );
    }

    #[test]
    fn call_with_numeric_target() {
        assert_eq!(
            encode_bytes(Tag::Call, "call", Some(tok(Tag::Number, "16"))),
            vec![Opcode::Call.number(), 16, 0]
        );
    }

    #[test]
    fn operand_kind_must_match_class() {
        let mnemonic = tok(Tag::Sin, "sin");
        let operand = tok(Tag::Real, "1.0");
        assert_eq!(
            encode(&mnemonic, Some(&operand)),
            Err(EncodingError::OperandMismatch {
                mnemonic: mnemonic.clone(),
                operand
            })
        );
        let label = tok(Tag::Ident, "loop");
        assert!(matches!(
            encode(&tok(Tag::Call, "call"), Some(&label)),
            Err(EncodingError::OperandMismatch { .. })
        ));
        assert!(matches!(
            encode(&tok(Tag::Fld, "fld"), Some(&label)),
            Err(EncodingError::OperandMismatch { .. })
        ));
    }

    #[test]
    fn operand_presence() {
        assert_eq!(
            encode(&tok(Tag::Push, "push"), None),
            Err(EncodingError::MissingOperand {
                mnemonic: tok(Tag::Push, "push")
            })
        );
        assert!(matches!(
            encode(&tok(Tag::Pop, "pop"), Some(&tok(Tag::Register, "1"))),
            Err(EncodingError::UnexpectedOperand { .. })
        ));
        assert!(matches!(
            encode(&tok(Tag::SumR, "sumr"), Some(&tok(Tag::Register, "1"))),
            Err(EncodingError::UnexpectedOperand { .. })
        ));
    }

    #[test]
    fn unparseable_operands() {
        assert!(matches!(
            encode(&tok(Tag::Cos, "cos"), Some(&tok(Tag::Register, "256"))),
            Err(EncodingError::BadOperand { .. })
        ));
        assert!(matches!(
            encode(&tok(Tag::Fld, "fld"), Some(&tok(Tag::Number, "40000"))),
            Err(EncodingError::BadOperand { .. })
        ));
        assert!(matches!(
            encode(&tok(Tag::Fld, "fld"), Some(&tok(Tag::Real, "one"))),
            Err(EncodingError::BadOperand { .. })
        ));
    }

    #[test]
    fn not_a_mnemonic() {
        let plus = tok(Tag::Plus, "+");
        assert_eq!(encode(&plus, None), Err(EncodingError::NotAMnemonic(plus)));
    }

    const MEMORY_MNEMONICS: [(Tag, Opcode); 2] =
        [(Tag::Fld, Opcode::FldMem), (Tag::Push, Opcode::PushMem)];

    #[proptest]
    fn memory_operand_round_trip(offset: i16, #[strategy(0..2_usize)] which: usize) {
        let (tag, opcode) = MEMORY_MNEMONICS[which];
        let inst = encode(
            &tok(tag, "m"),
            Some(&tok(Tag::Number, &offset.to_string())),
        )
        .expect("offset is in range");
        assert_eq!(inst.opcode().class(), InstructionClass::Memory);
        let decoded = Instruction::decode(&inst.to_bytes()).expect("valid encoding");
        assert_eq!(decoded, Instruction::Memory { opcode, offset });
    }

    #[proptest]
    fn real_operand_round_trip(
        #[strategy(-1.0e12_f64..1.0e12_f64)] value: f64,
        push: bool,
    ) {
        let tag = if push { Tag::Push } else { Tag::Fld };
        let inst = encode(&tok(tag, "r"), Some(&tok(Tag::Real, &value.to_string())))
            .expect("real literal is valid");
        match Instruction::decode(&inst.to_bytes()).expect("valid encoding") {
            Instruction::Real {
                opcode,
                value: decoded,
            } => {
                assert_eq!(push, opcode == Opcode::PushReal);
                assert_eq!(decoded, value);
            }
            other => panic!("expected a real load, got {other:?}"),
        }
    }

    #[proptest]
    fn register_operand_round_trip(reg: u8) {
        let operand = tok(Tag::Register, &reg.to_string());
        for (tag, opcode) in [
            (Tag::Atan, Opcode::FAtan),
            (Tag::Acos, Opcode::FAcos),
            (Tag::Tan, Opcode::FTan),
        ] {
            let inst = encode(&tok(tag, "t"), Some(&operand)).expect("valid register");
            let decoded = Instruction::decode(&inst.to_bytes()).expect("valid encoding");
            assert_eq!(decoded, Instruction::Trigonometric { opcode, reg });
        }
    }
}
