use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use tracing::{event, Level};

use super::symbol::SymbolName;
use super::types::{LinkError, LinkPhase, ModuleName};

/// What is known about a symbol.  A symbol only ever moves from
/// `Undefined` to `Defined` while tables are merged.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SymbolState {
    /// Referenced, but expected to be defined by some other module.
    Undefined,
    /// Defined at this offset.  Whether the offset is relative to
    /// the start of a module or to the start of the image depends on
    /// which table holds it.
    Defined(i16),
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Symbol {
    pub name: SymbolName,
    pub state: SymbolState,
}

impl Symbol {
    pub fn defined(name: SymbolName, offset: i16) -> Symbol {
        Symbol {
            name,
            state: SymbolState::Defined(offset),
        }
    }

    pub fn undefined(name: SymbolName) -> Symbol {
        Symbol {
            name,
            state: SymbolState::Undefined,
        }
    }

    pub fn offset(&self) -> Option<i16> {
        match self.state {
            SymbolState::Defined(offset) => Some(offset),
            SymbolState::Undefined => None,
        }
    }
}

/// A symbol table (the "environment" in which code is reduced).
///
/// There is one per module while it is being assembled or measured,
/// and one for the whole link once the module tables have been
/// merged.  `set` never rejects anything; conflicting definitions are
/// detected by `merge` (between modules) and by the assembler
/// (within a module).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Environment {
    symbols: BTreeMap<SymbolName, Symbol>,
    // For tables built by `merge`, the module which supplied each
    // definition.
    origins: BTreeMap<SymbolName, ModuleName>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    /// Build a table from the entries of a manifest.  Later entries
    /// for the same name replace earlier ones.
    pub fn from_symbols<'a, I>(symbols: I) -> Environment
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        let mut result = Environment::new();
        for sym in symbols {
            result.set(sym.name.clone(), sym.state);
        }
        result
    }

    pub fn get(&self, name: &SymbolName) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Insert or overwrite the entry for `name`.
    pub fn set(&mut self, name: SymbolName, state: SymbolState) {
        self.symbols.insert(name.clone(), Symbol { name, state });
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All entries, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Names which are referenced but not defined.
    pub fn undefined(&self) -> impl Iterator<Item = &SymbolName> {
        self.symbols
            .values()
            .filter(|sym| sym.state == SymbolState::Undefined)
            .map(|sym| &sym.name)
    }

    /// The module which supplied the definition of `name`, if this
    /// table was built by merging.
    pub fn defining_module(&self, name: &SymbolName) -> Option<&str> {
        self.origins.get(name).map(String::as_str)
    }

    /// Returns a copy of the table with every definition moved
    /// `base` bytes further from the start of the image.
    ///
    /// # Errors
    ///
    /// Fails for each definition which would no longer fit in an
    /// offset field.
    pub fn relocated(&self, base: i64, module: &str) -> Result<Environment, Vec<LinkError>> {
        let mut errors: Vec<LinkError> = Vec::new();
        let mut result = Environment {
            symbols: BTreeMap::new(),
            origins: self.origins.clone(),
        };
        for sym in self.symbols.values() {
            let state = match sym.state {
                SymbolState::Undefined => SymbolState::Undefined,
                SymbolState::Defined(offset) => {
                    let absolute = base + i64::from(offset);
                    match i16::try_from(absolute) {
                        Ok(moved) => SymbolState::Defined(moved),
                        Err(_) => {
                            errors.push(LinkError::OffsetOutOfRange {
                                name: sym.name.clone(),
                                module: module.to_string(),
                                offset: absolute,
                                phase: LinkPhase::Merge,
                            });
                            continue;
                        }
                    }
                }
            };
            result.set(sym.name.clone(), state);
        }
        if errors.is_empty() {
            Ok(result)
        } else {
            Err(errors)
        }
    }

    /// Combine the table of `module` into this one.
    ///
    /// A definition in `other` of a name which this table already
    /// defines is a multiple definition; the first definition is
    /// kept.  An undefined entry in `other` is only added when this
    /// table knows nothing about the name.
    ///
    /// # Errors
    ///
    /// Returns every multiple definition found (the rest of `other`
    /// is still merged).
    pub fn merge(&mut self, other: &Environment, module: &str) -> Result<(), Vec<LinkError>> {
        let mut errors: Vec<LinkError> = Vec::new();
        for sym in other.iter() {
            let existing: Option<SymbolState> = self.get(&sym.name).map(|s| s.state);
            match (sym.state, existing) {
                (SymbolState::Defined(_), Some(SymbolState::Defined(_))) => {
                    let first = self
                        .defining_module(&sym.name)
                        .unwrap_or("an earlier module")
                        .to_string();
                    errors.push(LinkError::MultipleDefinition {
                        name: sym.name.clone(),
                        first,
                        second: module.to_string(),
                    });
                }
                (SymbolState::Defined(offset), _) => {
                    event!(
                        Level::TRACE,
                        "{module} defines {} at {offset}",
                        sym.name
                    );
                    self.set(sym.name.clone(), sym.state);
                    self.origins.insert(sym.name.clone(), module.to_string());
                }
                (SymbolState::Undefined, None) => {
                    self.set(sym.name.clone(), SymbolState::Undefined);
                }
                (SymbolState::Undefined, Some(_)) => (),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Lists the table in the style of a link map: one symbol per line.
impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for sym in self.iter() {
            match sym.state {
                SymbolState::Defined(offset) => {
                    write!(f, "{:<20} {:>6}", sym.name, offset)?;
                    if let Some(module) = self.defining_module(&sym.name) {
                        write!(f, "  {module}")?;
                    }
                    writeln!(f)?;
                }
                SymbolState::Undefined => {
                    writeln!(f, "{:<20} {:>6}", sym.name, "U")?;
                }
            }
        }
        Ok(())
    }
}
