//! Combining object modules.
//!
//! [`link`] produces the final image:
//!
//! 1. Each module is measured, giving its size and a table of the
//!    symbols it defines (relative to the start of the module).
//! 2. Modules are placed one after another in the order given, so the
//!    base of each module is the total size of those before it.
//! 3. The module tables are relocated to their bases and merged into
//!    a single table for the whole image.  A symbol defined by more
//!    than one module is an error.
//! 4. The code of each module is reduced using the merged table.  A
//!    reference to a symbol nobody defines is an error.
//! 5. The reduced modules are concatenated.
//!
//! Each step runs over all the modules before any error is reported,
//! so one failure describes every problem found in the step that
//! failed.  The steps are carried out in order on the calling thread.
use std::collections::BTreeSet;

use tracing::{event, span, Level};

use super::code::CodeNode;
use super::object::{code_error_to_link_error, ObjectModule};
use super::symbol::SymbolName;
use super::symtab::{Environment, Symbol};
use super::types::{LinkError, LinkFailure, LinkPhase, ModuleName};

/// Where a module was put in the image.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Placement {
    pub module: ModuleName,
    pub base: usize,
    pub size: usize,
}

/// The result of a successful link.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Image {
    bytes: Vec<u8>,
    symbols: Environment,
    placements: Vec<Placement>,
}

impl Image {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The symbol table of the whole image.  Offsets are from the
    /// start of the image.
    pub fn symbols(&self) -> &Environment {
        &self.symbols
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }
}

fn fail_if_any(errors: Vec<LinkError>) -> Result<(), LinkFailure> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(LinkFailure::new(errors))
    }
}

/// The table of each module and where it goes.
struct Layout {
    tables: Vec<Environment>,
    placements: Vec<Placement>,
}

fn measure_and_place(modules: &[ObjectModule]) -> Result<Layout, LinkFailure> {
    let mut errors: Vec<LinkError> = Vec::new();
    let mut tables: Vec<Environment> = Vec::with_capacity(modules.len());
    let mut placements: Vec<Placement> = Vec::with_capacity(modules.len());
    let mut base: usize = 0;
    for module in modules {
        match module.measure() {
            Ok((table, size)) => {
                event!(
                    Level::DEBUG,
                    "placing module {} ({size} bytes) at {base}",
                    module.name()
                );
                tables.push(table);
                placements.push(Placement {
                    module: module.name().to_string(),
                    base,
                    size,
                });
                base += size;
            }
            Err(e) => {
                errors.push(e);
            }
        }
    }
    fail_if_any(errors)?;
    Ok(Layout { tables, placements })
}

fn merge_tables(layout: &Layout) -> Result<Environment, LinkFailure> {
    let mut errors: Vec<LinkError> = Vec::new();
    let mut global = Environment::new();
    for (table, placement) in layout.tables.iter().zip(layout.placements.iter()) {
        let base = i64::try_from(placement.base).unwrap_or(i64::MAX);
        match table.relocated(base, &placement.module) {
            Ok(relocated) => {
                if let Err(mut collisions) = global.merge(&relocated, &placement.module) {
                    errors.append(&mut collisions);
                }
            }
            Err(mut out_of_range) => {
                errors.append(&mut out_of_range);
            }
        }
    }
    fail_if_any(errors)?;
    Ok(global)
}

/// Link `modules`, in order, into a single image.
///
/// # Errors
///
/// The link fails, producing no image, if a module defines a label
/// too far from the start of the image, if a symbol is defined by
/// more than one module, or if a symbol is referenced but defined by
/// no module.  The failure lists every error found in the phase which
/// failed.
pub fn link(modules: &[ObjectModule]) -> Result<Image, LinkFailure> {
    let span = span!(Level::INFO, "link", modules = modules.len());
    let _enter = span.enter();

    let layout = measure_and_place(modules)?;
    let mut global = merge_tables(&layout)?;

    let mut errors: Vec<LinkError> = Vec::new();
    let mut bytes: Vec<u8> = Vec::with_capacity(layout.placements.iter().map(|p| p.size).sum());
    for (module, placement) in modules.iter().zip(layout.placements.iter()) {
        // This is the final link, so nothing remains to be deferred.
        let code: CodeNode = module.code().clone().release_deferred();
        let base = i64::try_from(placement.base).unwrap_or(i64::MAX);
        match code.reduce_at(&mut global, base) {
            Ok(reduced) => match reduced.code.as_bytes() {
                Some(content) => {
                    bytes.extend_from_slice(content);
                }
                None => {
                    unreachable!(
                        "module {} still contains deferred code after it was released",
                        module.name()
                    );
                }
            },
            Err(unresolved) => {
                errors.extend(unresolved.into_iter().map(|e| {
                    code_error_to_link_error(module.name(), LinkPhase::Substitute, e)
                }));
            }
        }
    }
    fail_if_any(errors)?;

    event!(
        Level::INFO,
        "linked {} modules into {} bytes defining {} symbols",
        modules.len(),
        bytes.len(),
        global.len()
    );
    Ok(Image {
        bytes,
        symbols: global,
        placements: layout.placements,
    })
}

/// Combine `modules` into a single module called `name` without
/// resolving any references.  The code of the inputs is kept in
/// deferred sequences, so it is not reduced until the final link.
///
/// # Errors
///
/// Fails, like [`link`], if a label lies too far from the start of
/// the combined module or if a symbol is defined by more than one of
/// `modules`.
pub fn partial_link(name: ModuleName, modules: &[ObjectModule]) -> Result<ObjectModule, LinkFailure> {
    let layout = measure_and_place(modules)?;
    let global = merge_tables(&layout)?;

    let mut seen: BTreeSet<SymbolName> = BTreeSet::new();
    let mut names: Vec<SymbolName> = Vec::new();
    for module in modules {
        let mentioned = module
            .manifest()
            .iter()
            .map(|sym| sym.name.clone())
            .chain(module.code().symbol_names());
        for sym in mentioned {
            if seen.insert(sym.clone()) {
                names.push(sym);
            }
        }
    }
    let manifest: Vec<Symbol> = names
        .into_iter()
        .map(|sym| match global.get(&sym).and_then(Symbol::offset) {
            Some(offset) => Symbol::defined(sym, offset),
            None => Symbol::undefined(sym),
        })
        .collect();

    let code: CodeNode = modules
        .iter()
        .map(|module| module.code().clone())
        .reduce(CodeNode::deferred)
        .unwrap_or_else(|| CodeNode::bytes([]));
    event!(
        Level::DEBUG,
        "partially linked {} modules into {name} ({} bytes, {} symbols)",
        modules.len(),
        code.size(),
        manifest.len()
    );
    Ok(ObjectModule::with_manifest(name, manifest, code))
}
