/// Human-oriented formatting for instructions.
use std::fmt::{self, Display, Formatter};

use super::{Instruction, Opcode};

/// Opcodes are shown with the names used by the virtual machine's
/// dispatch table.
impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use Opcode::*;
        f.write_str(match self {
            End => "END",
            Ret => "RET",
            Pop => "POP",
            PushReg => "PUSH_REG",
            PushMem => "PUSH_MEM",
            PushReal => "PUSH_REAL",
            FldReg => "FLD_REG",
            FldMem => "FLD_MEM",
            FldReal => "FLD_REAL",
            FSum => "FSUM",
            FSub => "FSUB",
            FMul => "FMUL",
            FDiv => "FDIV",
            FLog => "FLOG",
            FPow => "FPOW",
            FSin => "FSIN",
            FCos => "FCOS",
            FTan => "FTAN",
            FCtan => "FCTAN",
            FAsin => "FASIN",
            FAcos => "FACOS",
            FAtan => "FATAN",
            FActan => "FACTAN",
            Call => "CALL",
        })
    }
}

/// The assembler mnemonic for an opcode.  The load and push opcodes
/// share a mnemonic across their register, memory and real forms.
fn mnemonic(opcode: Opcode) -> &'static str {
    use Opcode::*;
    match opcode {
        End => "end",
        Ret => "ret",
        Pop => "pop",
        PushReg | PushMem | PushReal => "push",
        FldReg | FldMem | FldReal => "fld",
        FSum => "sum",
        FSub => "sub",
        FMul => "mul",
        FDiv => "div",
        FLog => "log",
        FPow => "pow",
        FSin => "sin",
        FCos => "cos",
        FTan => "tan",
        FCtan => "ctan",
        FAsin => "asin",
        FAcos => "acos",
        FAtan => "atan",
        FActan => "actan",
        Call => "call",
    }
}

/// Render an instruction in assembler syntax.  Registers are shown
/// as `r<n>`, memory offsets in brackets.
impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let name = mnemonic(self.opcode());
        match self {
            Instruction::Nullary(_) => f.write_str(name),
            Instruction::Arithmetic { reverse, .. } => {
                write!(f, "{name}{}", if *reverse { "r" } else { "" })
            }
            Instruction::Trigonometric { reg, .. } | Instruction::Register { reg, .. } => {
                write!(f, "{name} r{reg}")
            }
            Instruction::Memory { offset, .. } => write!(f, "{name} [{offset}]"),
            Instruction::Real { value, .. } => write!(f, "{name} {value:?}"),
            Instruction::Call { target } => write!(f, "{name} {target}"),
        }
    }
}

#[test]
fn test_display_instruction() {
    assert_eq!(Instruction::Nullary(Opcode::Ret).to_string(), "ret");
    assert_eq!(
        Instruction::Arithmetic {
            opcode: Opcode::FPow,
            reverse: true
        }
        .to_string(),
        "powr"
    );
    assert_eq!(
        Instruction::Register {
            opcode: Opcode::PushReg,
            reg: 4
        }
        .to_string(),
        "push r4"
    );
    assert_eq!(
        Instruction::Memory {
            opcode: Opcode::FldMem,
            offset: -8
        }
        .to_string(),
        "fld [-8]"
    );
    assert_eq!(
        Instruction::Real {
            opcode: Opcode::PushReal,
            value: 2.0
        }
        .to_string(),
        "push 2.0"
    );
    assert_eq!(Instruction::Call { target: 12 }.to_string(), "call 12");
}

#[test]
fn test_display_opcode() {
    assert_eq!(Opcode::FActan.to_string(), "FACTAN");
    assert_eq!(Opcode::PushMem.to_string(), "PUSH_MEM");
}
