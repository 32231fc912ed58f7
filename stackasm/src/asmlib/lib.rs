//! Assembler back end and linker for the stack virtual machine.
//!
//! Code is held as [`CodeNode`] trees until the offsets of its labels
//! are known.  [`assemble`] turns statements into an
//! [`ObjectModule`]; [`link`] combines modules into an executable
//! [`Image`], and [`partial_link`] combines them into a single module
//! for linking later.
#![deny(unreachable_pub)]
#![deny(unsafe_code)]
#![warn(clippy::manual_string_new)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::return_self_not_must_use)]
#![warn(clippy::wildcard_imports)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::missing_errors_doc)]
#![warn(clippy::items_after_statements)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::unreadable_literal)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)] // fix later
#![allow(clippy::module_name_repetitions)] // fix later
#![allow(clippy::redundant_closure_for_method_calls)] // fix later
#![allow(clippy::needless_pass_by_value)] // fix soon
#![allow(clippy::single_match_else)] // fix soon

mod assemble;
mod code;
mod driver;
mod link;
mod listing;
mod object;
mod objfile;
mod rx;
mod symbol;
mod symtab;
mod types;

pub use assemble::{assemble, Statement};
pub use code::{CodeError, CodeNode, Reduced, REF_SIZE};
pub use driver::{link_files, read_object_file, write_object_file, LinkOptions};
pub use link::{link, partial_link, Image, Placement};
pub use listing::LinkMap;
pub use object::{parse_manifest, ObjectModule};
pub use objfile::{read_object, write_object, ObjectFileError, MAX_DEPTH};
pub use symbol::SymbolName;
pub use symtab::{Environment, Symbol, SymbolState};
pub use types::{
    AssemblyError, IoAction, IoFailed, LinkError, LinkFailure, LinkPhase, LinkerFailure,
    ModuleName,
};
