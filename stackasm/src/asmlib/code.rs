//! Code whose final layout is not yet fixed.
//!
//! A [`CodeNode`] tree holds encoded instructions together with
//! references to labels whose offsets are not known yet.  Turning a
//! tree into bytes takes two passes:
//!
//! 1. [`CodeNode::measure`] computes the size of the tree and records
//!    the offset of every label definition in a symbol table.  The
//!    size of a reference does not depend on its value, so this pass
//!    never needs to resolve anything.
//! 2. [`CodeNode::reduce`] replaces each reference with the encoded
//!    offset of its label and concatenates the result.
//!
//! Because every definition is recorded before any reference is
//! substituted, a reference may appear before the definition it
//! refers to.
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use base::prelude::OFFSET_SIZE;

use super::symbol::SymbolName;
use super::symtab::{Environment, SymbolState};

#[cfg(test)]
mod tests;

/// The size in bytes of a resolved reference.  This is the same for
/// every reference, whatever it resolves to.
pub const REF_SIZE: usize = OFFSET_SIZE;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum CodeNode {
    /// Fixed content.
    Bytes(Vec<u8>),
    /// The offset of a label, encoded as a little-endian `i16`.
    Ref(SymbolName),
    /// Binds the label to the offset at which the inner code starts.
    /// The binding itself occupies no space.
    Def(SymbolName, Box<CodeNode>),
    Seq(Box<CodeNode>, Box<CodeNode>),
    /// Laid out just like `Seq`, but left alone by
    /// [`CodeNode::reduce`].  This keeps a sub-tree intact until the
    /// final link collapses it (see [`CodeNode::release_deferred`]).
    DeferredSeq(Box<CodeNode>, Box<CodeNode>),
}

/// The result of [`CodeNode::reduce`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Reduced {
    /// This is a `Bytes` node unless the reduced tree contained
    /// deferred sequences.
    pub code: CodeNode,
    pub size: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum CodeError {
    /// The symbol table has no definition for a referenced label.
    UnresolvedSymbol(SymbolName),
    /// A label definition lies beyond the range of an offset field.
    OffsetOutOfRange { name: SymbolName, offset: i64 },
}

impl Display for CodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            CodeError::UnresolvedSymbol(name) => write!(f, "undefined reference to {name}"),
            CodeError::OffsetOutOfRange { name, offset } => write!(
                f,
                "label {name} would be at offset {offset}, which does not fit in 16 bits"
            ),
        }
    }
}

impl Error for CodeError {}

fn offset_of(name: &SymbolName, position: i64) -> Result<i16, CodeError> {
    i16::try_from(position).map_err(|_| CodeError::OffsetOutOfRange {
        name: name.clone(),
        offset: position,
    })
}

fn advance(position: i64, size: usize) -> i64 {
    // Trees which do not fit in memory can't be built, so the size
    // of one always fits.
    position + i64::try_from(size).unwrap_or(i64::MAX)
}

impl CodeNode {
    pub fn bytes<B: Into<Vec<u8>>>(payload: B) -> CodeNode {
        CodeNode::Bytes(payload.into())
    }

    pub fn reference<N: Into<SymbolName>>(name: N) -> CodeNode {
        CodeNode::Ref(name.into())
    }

    pub fn def<N: Into<SymbolName>>(name: N, inner: CodeNode) -> CodeNode {
        CodeNode::Def(name.into(), Box::new(inner))
    }

    /// A label with nothing attached: it marks the offset of
    /// whatever follows it in the enclosing sequence.
    pub fn label<N: Into<SymbolName>>(name: N) -> CodeNode {
        CodeNode::def(name, CodeNode::Bytes(Vec::new()))
    }

    pub fn seq(first: CodeNode, second: CodeNode) -> CodeNode {
        CodeNode::Seq(Box::new(first), Box::new(second))
    }

    pub fn deferred(first: CodeNode, second: CodeNode) -> CodeNode {
        CodeNode::DeferredSeq(Box::new(first), Box::new(second))
    }

    /// Combine `nodes`, in order, into a single tree.  The tree is
    /// balanced so that its depth grows with the logarithm of the
    /// number of nodes.  No nodes at all yields empty `Bytes`.
    pub fn sequence(nodes: Vec<CodeNode>) -> CodeNode {
        fn build(mut nodes: Vec<CodeNode>) -> CodeNode {
            match nodes.len() {
                0 => CodeNode::Bytes(Vec::new()),
                1 => nodes.remove(0),
                n => {
                    let tail = nodes.split_off(n / 2);
                    CodeNode::seq(build(nodes), build(tail))
                }
            }
        }
        build(nodes)
    }

    /// The number of bytes this tree occupies once reduced.
    pub fn size(&self) -> usize {
        match self {
            CodeNode::Bytes(payload) => payload.len(),
            CodeNode::Ref(_) => REF_SIZE,
            CodeNode::Def(_, inner) => inner.size(),
            CodeNode::Seq(a, b) | CodeNode::DeferredSeq(a, b) => a.size() + b.size(),
        }
    }

    /// Pass 1.  Returns the size of the tree and records in `table`
    /// the offset of each label the tree defines, given that the tree
    /// starts at offset `base`.  Running this more than once with the
    /// same `base` leaves the table unchanged.
    ///
    /// # Errors
    ///
    /// Fails if a label would be placed at an offset which does not
    /// fit in an `i16`.
    pub fn measure(&self, base: i16, table: &mut Environment) -> Result<usize, CodeError> {
        self.measure_at(i64::from(base), table)
    }

    fn measure_at(&self, position: i64, table: &mut Environment) -> Result<usize, CodeError> {
        match self {
            CodeNode::Bytes(payload) => Ok(payload.len()),
            CodeNode::Ref(_) => Ok(REF_SIZE),
            CodeNode::Def(name, inner) => {
                let offset = offset_of(name, position)?;
                table.set(name.clone(), SymbolState::Defined(offset));
                inner.measure_at(position, table)
            }
            CodeNode::Seq(a, b) | CodeNode::DeferredSeq(a, b) => {
                let size_a = a.measure_at(position, table)?;
                let size_b = b.measure_at(advance(position, size_a), table)?;
                Ok(size_a + size_b)
            }
        }
    }

    /// Pass 2.  Substitutes every reference using `table`, given that
    /// the tree starts at offset `base`.  Definitions are re-asserted
    /// in `table` as they are passed.  Deferred sequences are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns every unresolved reference (and every out-of-range
    /// definition) in the tree.  A reference is never given a default
    /// value.
    pub fn reduce(&self, table: &mut Environment, base: i16) -> Result<Reduced, Vec<CodeError>> {
        self.reduce_at(table, i64::from(base))
    }

    /// As [`CodeNode::reduce`], but the tree may start beyond the
    /// range of an offset (as long as it defines no labels there).
    pub(crate) fn reduce_at(&self, table: &mut Environment, base: i64) -> Result<Reduced, Vec<CodeError>> {
        let mut errors: Vec<CodeError> = Vec::new();
        let (code, size) = self.substitute(table, base, &mut errors);
        if errors.is_empty() {
            Ok(Reduced { code, size })
        } else {
            Err(errors)
        }
    }

    fn substitute(
        &self,
        table: &mut Environment,
        position: i64,
        errors: &mut Vec<CodeError>,
    ) -> (CodeNode, usize) {
        match self {
            CodeNode::Bytes(payload) => (self.clone(), payload.len()),
            CodeNode::Ref(name) => match table.get(name).map(|sym| sym.state) {
                Some(SymbolState::Defined(offset)) => {
                    (CodeNode::Bytes(offset.to_le_bytes().to_vec()), REF_SIZE)
                }
                Some(SymbolState::Undefined) | None => {
                    errors.push(CodeError::UnresolvedSymbol(name.clone()));
                    // The caller discards the result when there are
                    // errors; this only keeps the sizes right.
                    (CodeNode::Bytes(vec![0; REF_SIZE]), REF_SIZE)
                }
            },
            CodeNode::Def(name, inner) => {
                match offset_of(name, position) {
                    Ok(offset) => {
                        table.set(name.clone(), SymbolState::Defined(offset));
                    }
                    Err(e) => {
                        errors.push(e);
                    }
                }
                inner.substitute(table, position, errors)
            }
            CodeNode::Seq(a, b) => {
                let (a, size_a) = a.substitute(table, position, errors);
                let (b, size_b) = b.substitute(table, advance(position, size_a), errors);
                let combined = match (a, b) {
                    (CodeNode::Bytes(mut head), CodeNode::Bytes(tail)) => {
                        head.extend(tail);
                        CodeNode::Bytes(head)
                    }
                    (a, b) => CodeNode::seq(a, b),
                };
                (combined, size_a + size_b)
            }
            CodeNode::DeferredSeq(_, _) => (self.clone(), self.size()),
        }
    }

    /// Turn every deferred sequence into an ordinary one, so that the
    /// whole tree can be reduced.  The final link does this.
    #[must_use]
    pub fn release_deferred(self) -> CodeNode {
        match self {
            CodeNode::Bytes(_) | CodeNode::Ref(_) => self,
            CodeNode::Def(name, inner) => CodeNode::Def(name, Box::new(inner.release_deferred())),
            CodeNode::Seq(a, b) | CodeNode::DeferredSeq(a, b) => {
                CodeNode::seq(a.release_deferred(), b.release_deferred())
            }
        }
    }

    /// The content of a fully-reduced tree.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CodeNode::Bytes(payload) => Some(payload.as_slice()),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        match self {
            CodeNode::Bytes(_) | CodeNode::Ref(_) => false,
            CodeNode::DeferredSeq(_, _) => true,
            CodeNode::Def(_, inner) => inner.is_deferred(),
            CodeNode::Seq(a, b) => a.is_deferred() || b.is_deferred(),
        }
    }

    /// The names of all the labels defined or referenced in the
    /// tree, in order of first appearance.
    pub fn symbol_names(&self) -> Vec<SymbolName> {
        fn walk(node: &CodeNode, seen: &mut BTreeSet<SymbolName>, order: &mut Vec<SymbolName>) {
            let mut note = |name: &SymbolName| {
                if seen.insert(name.clone()) {
                    order.push(name.clone());
                }
            };
            match node {
                CodeNode::Bytes(_) => (),
                CodeNode::Ref(name) => note(name),
                CodeNode::Def(name, inner) => {
                    note(name);
                    walk(inner, seen, order);
                }
                CodeNode::Seq(a, b) | CodeNode::DeferredSeq(a, b) => {
                    walk(a, seen, order);
                    walk(b, seen, order);
                }
            }
        }
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        walk(self, &mut seen, &mut result);
        result
    }
}
