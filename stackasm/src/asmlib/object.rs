//! Object modules: code trees together with the manifest of the
//! symbols they define and use.
use std::fmt::Write as _;

use tracing::{event, Level};

use super::code::{CodeError, CodeNode};
use super::rx::LazyRegex;
use super::symbol::SymbolName;
use super::symtab::{Environment, Symbol, SymbolState};
use super::types::{LinkError, LinkPhase, ModuleName};

/// The output of assembling (or partially linking) one unit of
/// source.  A module is never modified; resolving it yields a new
/// one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ObjectModule {
    name: ModuleName,
    manifest: Vec<Symbol>,
    code: CodeNode,
}

/// Convert an error found while working on the code of `module`.
pub(crate) fn code_error_to_link_error(
    module: &str,
    phase: LinkPhase,
    e: CodeError,
) -> LinkError {
    match e {
        CodeError::UnresolvedSymbol(name) => LinkError::UnresolvedSymbol {
            name,
            module: module.to_string(),
        },
        CodeError::OffsetOutOfRange { name, offset } => LinkError::OffsetOutOfRange {
            name,
            module: module.to_string(),
            offset,
            phase,
        },
    }
}

/// The entries of `manifest` which define a symbol at a different
/// offset from the one the code gives it, with both offsets.  An
/// undefined entry never disagrees.
fn manifest_disagreements<'a>(
    manifest: &'a [Symbol],
    from_code: &Environment,
) -> Vec<(&'a SymbolName, i16, i16)> {
    manifest
        .iter()
        .filter_map(|sym| {
            let listed = sym.offset()?;
            let actual = from_code.get(&sym.name).and_then(Symbol::offset)?;
            (listed != actual).then_some((&sym.name, listed, actual))
        })
        .collect()
}

impl ObjectModule {
    /// Build a module from its code.  The manifest lists every symbol
    /// the code mentions, in order of first appearance, as defined
    /// (at its offset from the start of the module) if the code
    /// defines it anywhere and as undefined otherwise.
    ///
    /// # Errors
    ///
    /// Fails if a label in the code lies too far from the start of
    /// the module.
    pub fn new(name: ModuleName, code: CodeNode) -> Result<ObjectModule, CodeError> {
        let mut local = Environment::new();
        code.measure(0, &mut local)?;
        let manifest: Vec<Symbol> = code
            .symbol_names()
            .into_iter()
            .map(|sym| match local.get(&sym).and_then(Symbol::offset) {
                Some(offset) => Symbol::defined(sym, offset),
                None => Symbol::undefined(sym),
            })
            .collect();
        Ok(ObjectModule {
            name,
            manifest,
            code,
        })
    }

    /// Build a module from a manifest and code which were produced
    /// separately (for example, read from an object file).
    pub fn with_manifest(name: ModuleName, manifest: Vec<Symbol>, code: CodeNode) -> ObjectModule {
        ObjectModule {
            name,
            manifest,
            code,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> &[Symbol] {
        &self.manifest
    }

    pub fn code(&self) -> &CodeNode {
        &self.code
    }

    /// The manifest in its textual form, one line per symbol.
    pub fn manifest_text(&self) -> String {
        let mut result = String::new();
        for sym in &self.manifest {
            // Writing to a String cannot fail.
            let _ = match sym.state {
                SymbolState::Defined(offset) => writeln!(result, "\t{} D {offset}", sym.name),
                SymbolState::Undefined => writeln!(result, "\t{}U", sym.name),
            };
        }
        result
    }

    /// Compute the size of the module and the table of the symbols it
    /// defines, relative to the start of the module.
    ///
    /// The table starts from the manifest.  Where the code itself
    /// defines a symbol, the code's offset is used, and a warning is
    /// logged if the manifest defined it at a different offset.
    ///
    /// # Errors
    ///
    /// Fails if a label in the code lies too far from the start of
    /// the module.
    pub fn measure(&self) -> Result<(Environment, usize), LinkError> {
        let mut from_code = Environment::new();
        let size = self
            .code
            .measure(0, &mut from_code)
            .map_err(|e| code_error_to_link_error(&self.name, LinkPhase::Measure, e))?;
        for (sym, listed, actual) in manifest_disagreements(&self.manifest, &from_code) {
            event!(
                Level::WARN,
                "{}: manifest says {sym} is at {listed} but the code defines it at {actual}; using the code's definition",
                self.name
            );
        }
        let mut table = Environment::from_symbols(&self.manifest);
        for sym in from_code.iter() {
            table.set(sym.name.clone(), sym.state);
        }
        event!(
            Level::DEBUG,
            "module {} is {size} bytes and has {} symbols",
            self.name,
            table.len()
        );
        Ok((table, size))
    }

    /// Reduce the code of the module, which starts at offset `base`,
    /// using `table`.  Deferred sequences in the code are kept, so
    /// this can be applied at each stage of a staged link.
    ///
    /// # Errors
    ///
    /// Returns every reference `table` cannot resolve.
    pub fn resolve(&self, table: &mut Environment, base: i16) -> Result<ObjectModule, Vec<CodeError>> {
        let reduced = self.code.reduce(table, base)?;
        Ok(ObjectModule {
            name: self.name.clone(),
            manifest: self.manifest.clone(),
            code: reduced.code,
        })
    }
}

/// Parse the textual form of a manifest (see
/// [`ObjectModule::manifest_text`]).  Blank lines are ignored.
///
/// # Errors
///
/// Every line which is neither `<name> D <offset>` nor `<name>U`
/// is reported.
pub fn parse_manifest(module: &str, text: &str) -> Result<Vec<Symbol>, Vec<LinkError>> {
    static MANIFEST_LINE: LazyRegex =
        LazyRegex::new(r"^\s*(?P<name>\S+?)(?:\s+D\s+(?P<offset>[-+]?[0-9]+)|U)\s*$");

    let mut symbols: Vec<Symbol> = Vec::new();
    let mut errors: Vec<LinkError> = Vec::new();
    for (line_number, line) in text.lines().enumerate().map(|(n, line)| (n + 1, line)) {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: Option<Symbol> = MANIFEST_LINE.captures(line).and_then(|caps| {
            let name = SymbolName::from(&caps["name"]);
            match caps.name("offset") {
                None => Some(Symbol::undefined(name)),
                Some(offset) => offset
                    .as_str()
                    .parse::<i16>()
                    .ok()
                    .map(|offset| Symbol::defined(name, offset)),
            }
        });
        match parsed {
            Some(sym) => {
                symbols.push(sym);
            }
            None => {
                errors.push(LinkError::MalformedManifest {
                    module: module.to_string(),
                    line_number,
                    line: line.to_string(),
                });
            }
        }
    }
    if errors.is_empty() {
        Ok(symbols)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> SymbolName {
        SymbolName::from(s)
    }

    #[test]
    fn manifest_follows_first_appearance() {
        let code = CodeNode::sequence(vec![
            CodeNode::seq(CodeNode::bytes([23]), CodeNode::reference("helper")),
            CodeNode::label("main"),
            CodeNode::bytes([0]),
            CodeNode::seq(CodeNode::bytes([23]), CodeNode::reference("main")),
        ]);
        let module = ObjectModule::new("a.o".to_string(), code).expect("small module");
        assert_eq!(
            module.manifest(),
            &[
                Symbol::undefined(name("helper")),
                Symbol::defined(name("main"), 3),
            ]
        );
        assert_eq!(module.manifest_text(), "\thelperU\n\tmain D 3\n");
    }

    #[test]
    fn manifest_text_parses_back() {
        let manifest = vec![
            Symbol::defined(name("start"), -4),
            Symbol::undefined(name("sqrt")),
            Symbol::defined(name("FOOU"), 12),
        ];
        let module = ObjectModule::with_manifest("m".to_string(), manifest.clone(), CodeNode::bytes([]));
        assert_eq!(parse_manifest("m", &module.manifest_text()), Ok(manifest));
    }

    #[test]
    fn manifest_without_leading_whitespace() {
        assert_eq!(
            parse_manifest("m", "X D 4\n\nyU\n"),
            Ok(vec![
                Symbol::defined(name("X"), 4),
                Symbol::undefined(name("y"))
            ])
        );
    }

    #[test]
    fn malformed_manifest_lines_are_all_reported() {
        let errors = parse_manifest("m", "\tok D 1\n\tbad Q 2\n\tfine U\n\thuge D 40000\n")
            .expect_err("the manifest has bad lines");
        let lines: Vec<usize> = errors
            .iter()
            .map(|e| match e {
                LinkError::MalformedManifest { line_number, .. } => *line_number,
                other => panic!("unexpected error {other:?}"),
            })
            .collect();
        // The undefined marker must follow the name directly.
        assert_eq!(lines, vec![2, 3, 4]);
        assert!(errors.iter().all(|e| e.phase() == LinkPhase::Load));
    }

    #[test]
    fn measure_prefers_code_to_manifest() {
        let code = CodeNode::seq(CodeNode::bytes([0, 0]), CodeNode::label("here"));
        let module = ObjectModule::with_manifest(
            "m".to_string(),
            vec![
                Symbol::defined(name("here"), 7),
                Symbol::defined(name("X"), 4),
            ],
            code,
        );
        let (table, size) = module.measure().expect("small module");
        assert_eq!(size, 2);
        assert_eq!(table.get(&name("here")).and_then(Symbol::offset), Some(2));
        // Definitions which only the manifest supplies are kept.
        assert_eq!(table.get(&name("X")).and_then(Symbol::offset), Some(4));
    }

    #[test]
    fn only_conflicting_definitions_disagree() {
        let code = CodeNode::sequence(vec![
            CodeNode::label("a"),
            CodeNode::bytes([0]),
            CodeNode::label("b"),
            CodeNode::bytes([0]),
            CodeNode::label("c"),
        ]);
        let mut from_code = Environment::new();
        code.measure(0, &mut from_code).expect("small module");
        let manifest = vec![
            Symbol::undefined(name("a")),
            Symbol::defined(name("b"), 1),
            Symbol::defined(name("c"), 9),
            Symbol::defined(name("elsewhere"), 3),
        ];
        assert_eq!(
            manifest_disagreements(&manifest, &from_code),
            vec![(&name("c"), 9, 2)]
        );
    }

    #[test]
    fn measure_with_undefined_manifest_entry_for_local_label() {
        let code = CodeNode::seq(CodeNode::bytes([0]), CodeNode::label("here"));
        let module = ObjectModule::with_manifest(
            "m".to_string(),
            vec![Symbol::undefined(name("here"))],
            code,
        );
        let (table, size) = module.measure().expect("small module");
        assert_eq!(size, 1);
        assert_eq!(table.get(&name("here")).and_then(Symbol::offset), Some(1));
    }

    #[test]
    fn resolve_returns_a_new_module() {
        let code = CodeNode::seq(CodeNode::label("top"), CodeNode::reference("top"));
        let module = ObjectModule::new("m".to_string(), code).expect("small module");
        let mut table = Environment::new();
        let resolved = module.resolve(&mut table, 10).expect("top is defined locally");
        assert_eq!(resolved.code(), &CodeNode::bytes([10, 0]));
        assert_eq!(resolved.manifest(), module.manifest());
        assert_eq!(module.code().as_bytes(), None);
    }
}
