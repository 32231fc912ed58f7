//! Lexical units as produced by the lexer of the compiler and of the
//! assembler.  The lexer itself lives elsewhere; the toolchain only
//! consumes the tokens it hands over.
use std::fmt::{self, Display, Formatter};

/// `Tag` says what kind of lexical unit a [`Token`] is.
///
/// The mnemonic tags are those of the assembler.  The remaining tags
/// describe operands and the operators of the arithmetic expression
/// language.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Tag {
    // Nullary mnemonics.
    End,
    Ret,
    Pop,

    // Arithmetic mnemonics; the `R` forms take their operands in
    // reverse order.
    Sum,
    SumR,
    Sub,
    SubR,
    Mul,
    MulR,
    Div,
    DivR,
    Log,
    LogR,
    Pow,
    PowR,

    // Trigonometric mnemonics.
    Sin,
    Cos,
    Tan,
    Ctan,
    Asin,
    Acos,
    Atan,
    Actan,

    // Load, push and call mnemonics.
    Fld,
    Push,
    Call,

    /// A register number, e.g. `3`.
    Register,
    /// A signed integer, e.g. `-12`.  Used for memory offsets and
    /// call targets.
    Number,
    /// A real-number literal, e.g. `2.5e3`.
    Real,
    /// A name: a label in assembly code, a function name in
    /// expressions.
    Ident,

    // Operators of the expression language.
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
}

impl Tag {
    /// Returns true for the tags which name an assembler instruction.
    pub fn is_mnemonic(&self) -> bool {
        use Tag::*;
        !matches!(
            self,
            Register | Number | Real | Ident | Plus | Minus | Star | Slash | Caret
        )
    }
}

/// A lexical unit.  Tokens are never modified once the lexer has
/// created them.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Token {
    tag: Tag,
    text: String,
}

impl Token {
    pub fn new<S: Into<String>>(tag: Tag, text: S) -> Token {
        Token {
            tag,
            text: text.into(),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[test]
fn mnemonic_tags() {
    assert!(Tag::End.is_mnemonic());
    assert!(Tag::PowR.is_mnemonic());
    assert!(Tag::Call.is_mnemonic());
    assert!(!Tag::Register.is_mnemonic());
    assert!(!Tag::Ident.is_mnemonic());
    assert!(!Tag::Caret.is_mnemonic());
}
