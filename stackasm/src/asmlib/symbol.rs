use std::fmt::{self, Debug, Display, Formatter};

use base::prelude::{Tag, Token};

/// The name of a label.  Names are compared exactly; there is no
/// case folding.
#[derive(Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct SymbolName {
    canonical: String,
}

impl SymbolName {
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl From<String> for SymbolName {
    fn from(s: String) -> SymbolName {
        SymbolName { canonical: s }
    }
}

impl From<&str> for SymbolName {
    fn from(s: &str) -> SymbolName {
        SymbolName::from(s.to_string())
    }
}

/// Labels arrive from the lexer as identifier tokens; the name is
/// the token's text.
impl From<&Token> for SymbolName {
    fn from(tok: &Token) -> SymbolName {
        debug_assert_eq!(tok.tag(), Tag::Ident);
        SymbolName::from(tok.text())
    }
}

impl Display for SymbolName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.canonical, f)
    }
}

impl Debug for SymbolName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolName {{ canonical: \"{}\" }}", self.canonical)
    }
}

#[test]
fn symbol_names_are_case_sensitive() {
    assert_ne!(SymbolName::from("Main"), SymbolName::from("main"));
    assert_eq!(
        SymbolName::from(&Token::new(Tag::Ident, "loop")),
        SymbolName::from("loop")
    );
}
