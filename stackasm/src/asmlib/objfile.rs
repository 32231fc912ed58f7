//! Reading and writing object files.
//!
//! An object file holds one [`ObjectModule`]:
//!
//! ```text
//! SYMTAB:
//! <manifest lines>
//! <empty line>
//! <code section>
//! ```
//!
//! The code section is the module's code tree in prefix order.  Each
//! node starts with a one-byte tag:
//!
//! | Tag | Node          | Followed by                     |
//! |-----|---------------|---------------------------------|
//! | `B` | `Bytes`       | length (u16), the bytes         |
//! | `R` | `Ref`         | length (u16), the name (UTF-8)  |
//! | `D` | `Def`         | length (u16), the name, a node  |
//! | `S` | `Seq`         | two nodes                       |
//! | `T` | `DeferredSeq` | two nodes                       |
//!
//! Lengths are little-endian.  Nodes may be nested at most
//! [`MAX_DEPTH`] deep.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use super::code::CodeNode;
use super::object::{parse_manifest, ObjectModule};
use super::symbol::SymbolName;
use super::types::{LinkError, ModuleName};

const HEADER: &[u8] = b"SYMTAB:\n";

/// How deeply the nodes of a code section may be nested.  The
/// assembler builds balanced trees and each partial link adds one
/// level per module, so object files stay below this unless they
/// combine more than a thousand modules.
pub const MAX_DEPTH: usize = 1024;

const TAG_BYTES: u8 = b'B';
const TAG_REF: u8 = b'R';
const TAG_DEF: u8 = b'D';
const TAG_SEQ: u8 = b'S';
const TAG_DEFERRED: u8 = b'T';

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ObjectFileError {
    MissingHeader,
    /// The manifest is not followed by an empty line.
    UnterminatedManifest,
    NonUnicodeManifest,
    Manifest(Vec<LinkError>),
    Truncated { position: usize },
    UnknownTag { position: usize, tag: u8 },
    NonUnicodeName { position: usize },
    TrailingData { position: usize },
    NameTooLong(SymbolName),
    /// Nodes are nested more than [`MAX_DEPTH`] deep.
    TooDeep { position: usize },
}

impl Display for ObjectFileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ObjectFileError::MissingHeader => f.write_str("file does not start with SYMTAB:"),
            ObjectFileError::UnterminatedManifest => {
                f.write_str("symbol table is not followed by an empty line")
            }
            ObjectFileError::NonUnicodeManifest => {
                f.write_str("symbol table contains non-Unicode text")
            }
            ObjectFileError::Manifest(errors) => {
                f.write_str("symbol table is malformed:")?;
                for e in errors {
                    write!(f, "\n  {e}")?;
                }
                Ok(())
            }
            ObjectFileError::Truncated { position } => {
                write!(f, "code section ends unexpectedly at byte {position}")
            }
            ObjectFileError::UnknownTag { position, tag } => {
                write!(f, "code section has unknown tag {tag:#04x} at byte {position}")
            }
            ObjectFileError::NonUnicodeName { position } => {
                write!(f, "symbol name at byte {position} is not valid UTF-8")
            }
            ObjectFileError::TrailingData { position } => {
                write!(f, "unexpected data after the code section at byte {position}")
            }
            ObjectFileError::NameTooLong(name) => {
                write!(f, "symbol name {name} is too long for an object file")
            }
            ObjectFileError::TooDeep { position } => {
                write!(
                    f,
                    "code section nests more than {MAX_DEPTH} levels deep at byte {position}"
                )
            }
        }
    }
}

impl Error for ObjectFileError {}

fn write_length(out: &mut Vec<u8>, len: u16) {
    out.extend_from_slice(&len.to_le_bytes());
}

fn write_name(out: &mut Vec<u8>, name: &SymbolName) -> Result<(), ObjectFileError> {
    let text = name.as_str().as_bytes();
    let len = u16::try_from(text.len()).map_err(|_| ObjectFileError::NameTooLong(name.clone()))?;
    write_length(out, len);
    out.extend_from_slice(text);
    Ok(())
}

fn write_payload(out: &mut Vec<u8>, payload: &[u8]) {
    const MAX_CHUNK: usize = u16::MAX as usize;
    if payload.len() > MAX_CHUNK {
        // Too long for one node, so split it.
        let (head, tail) = payload.split_at(MAX_CHUNK);
        out.push(TAG_SEQ);
        write_payload(out, head);
        write_payload(out, tail);
    } else {
        out.push(TAG_BYTES);
        write_length(out, u16::try_from(payload.len()).unwrap_or(u16::MAX));
        out.extend_from_slice(payload);
    }
}

fn write_node(out: &mut Vec<u8>, node: &CodeNode) -> Result<(), ObjectFileError> {
    match node {
        CodeNode::Bytes(payload) => {
            write_payload(out, payload);
        }
        CodeNode::Ref(name) => {
            out.push(TAG_REF);
            write_name(out, name)?;
        }
        CodeNode::Def(name, inner) => {
            out.push(TAG_DEF);
            write_name(out, name)?;
            write_node(out, inner)?;
        }
        CodeNode::Seq(a, b) | CodeNode::DeferredSeq(a, b) => {
            out.push(if matches!(node, CodeNode::Seq(_, _)) {
                TAG_SEQ
            } else {
                TAG_DEFERRED
            });
            write_node(out, a)?;
            write_node(out, b)?;
        }
    }
    Ok(())
}

/// Serialize `module` as an object file.
///
/// # Errors
///
/// Fails only if a symbol name is too long to be represented.
pub fn write_object(module: &ObjectModule) -> Result<Vec<u8>, ObjectFileError> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(HEADER);
    out.extend_from_slice(module.manifest_text().as_bytes());
    out.push(b'\n');
    write_node(&mut out, module.code())?;
    Ok(out)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ObjectFileError> {
        match self.data.get(self.pos..self.pos + n) {
            Some(chunk) => {
                self.pos += n;
                Ok(chunk)
            }
            None => Err(ObjectFileError::Truncated {
                position: self.data.len(),
            }),
        }
    }

    fn length(&mut self) -> Result<usize, ObjectFileError> {
        let bytes = self.take(2)?;
        Ok(usize::from(u16::from_le_bytes([bytes[0], bytes[1]])))
    }

    fn name(&mut self) -> Result<SymbolName, ObjectFileError> {
        let len = self.length()?;
        let position = self.pos;
        let text = self.take(len)?;
        match std::str::from_utf8(text) {
            Ok(s) => Ok(SymbolName::from(s)),
            Err(_) => Err(ObjectFileError::NonUnicodeName { position }),
        }
    }

    fn node(&mut self, depth: usize) -> Result<CodeNode, ObjectFileError> {
        let position = self.pos;
        if depth > MAX_DEPTH {
            return Err(ObjectFileError::TooDeep { position });
        }
        let tag = self.take(1)?[0];
        match tag {
            TAG_BYTES => {
                let len = self.length()?;
                Ok(CodeNode::bytes(self.take(len)?))
            }
            TAG_REF => Ok(CodeNode::Ref(self.name()?)),
            TAG_DEF => {
                let name = self.name()?;
                let inner = self.node(depth + 1)?;
                Ok(CodeNode::def(name, inner))
            }
            TAG_SEQ => {
                let a = self.node(depth + 1)?;
                let b = self.node(depth + 1)?;
                Ok(CodeNode::seq(a, b))
            }
            TAG_DEFERRED => {
                let a = self.node(depth + 1)?;
                let b = self.node(depth + 1)?;
                Ok(CodeNode::deferred(a, b))
            }
            _ => Err(ObjectFileError::UnknownTag { position, tag }),
        }
    }
}

/// Read an object file, giving the module the name `name`.
///
/// # Errors
///
/// Fails if the file is not in the format [`write_object`] produces.
/// All the malformed lines of the manifest are reported together.
pub fn read_object(name: ModuleName, data: &[u8]) -> Result<ObjectModule, ObjectFileError> {
    let body = data
        .strip_prefix(HEADER)
        .ok_or(ObjectFileError::MissingHeader)?;
    let mut manifest_end: Option<usize> = None;
    let mut line_start = 0;
    while let Some(newline) = body[line_start..].iter().position(|b| *b == b'\n') {
        if newline == 0 {
            manifest_end = Some(line_start);
            break;
        }
        line_start += newline + 1;
    }
    let manifest_end = manifest_end.ok_or(ObjectFileError::UnterminatedManifest)?;
    let manifest_text = std::str::from_utf8(&body[..manifest_end])
        .map_err(|_| ObjectFileError::NonUnicodeManifest)?;
    let manifest = parse_manifest(&name, manifest_text).map_err(ObjectFileError::Manifest)?;

    let code_start = HEADER.len() + manifest_end + 1;
    let mut reader = Reader {
        data,
        pos: code_start,
    };
    let code = reader.node(0)?;
    if reader.pos != data.len() {
        return Err(ObjectFileError::TrailingData {
            position: reader.pos,
        });
    }
    Ok(ObjectModule::with_manifest(name, manifest, code))
}
