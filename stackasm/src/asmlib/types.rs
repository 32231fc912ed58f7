use std::error::Error;
use std::ffi::{OsStr, OsString};
use std::fmt::{self, Display, Formatter};
use std::io::Error as IoError;
use std::path::PathBuf;

use base::prelude::EncodingError;

use super::symbol::SymbolName;

/// Identifies a module within a link; normally derived from the name
/// of the object file the module was read from.
pub type ModuleName = String;

/// The stage of linking at which an error was detected.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub enum LinkPhase {
    /// Reading object modules and their manifests.
    Load,
    /// Computing the size and local labels of each module.
    Measure,
    /// Combining the symbol tables of the modules.
    Merge,
    /// Replacing references with the offsets they refer to.
    Substitute,
}

impl Display for LinkPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            LinkPhase::Load => "load",
            LinkPhase::Measure => "measure",
            LinkPhase::Merge => "merge",
            LinkPhase::Substitute => "substitute",
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LinkError {
    MalformedManifest {
        module: ModuleName,
        line_number: usize,
        line: String,
    },
    MultipleDefinition {
        name: SymbolName,
        first: ModuleName,
        second: ModuleName,
    },
    UnresolvedSymbol {
        name: SymbolName,
        module: ModuleName,
    },
    /// A label would be placed at an offset which a reference cannot
    /// represent.
    OffsetOutOfRange {
        name: SymbolName,
        module: ModuleName,
        offset: i64,
        phase: LinkPhase,
    },
}

impl LinkError {
    pub fn phase(&self) -> LinkPhase {
        match self {
            LinkError::MalformedManifest { .. } => LinkPhase::Load,
            LinkError::MultipleDefinition { .. } => LinkPhase::Merge,
            LinkError::UnresolvedSymbol { .. } => LinkPhase::Substitute,
            LinkError::OffsetOutOfRange { phase, .. } => *phase,
        }
    }

    /// The symbol the error is about, if any.
    pub fn symbol(&self) -> Option<&SymbolName> {
        match self {
            LinkError::MalformedManifest { .. } => None,
            LinkError::MultipleDefinition { name, .. }
            | LinkError::UnresolvedSymbol { name, .. }
            | LinkError::OffsetOutOfRange { name, .. } => Some(name),
        }
    }
}

impl Display for LinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            LinkError::MalformedManifest {
                module,
                line_number,
                line,
            } => write!(
                f,
                "{module}: manifest line {line_number} is not a symbol definition or reference: {line:?}"
            ),
            LinkError::MultipleDefinition {
                name,
                first,
                second,
            } => write!(
                f,
                "symbol {name} is defined in both {first} and {second}"
            ),
            LinkError::UnresolvedSymbol { name, module } => {
                write!(f, "{module}: undefined reference to {name}")
            }
            LinkError::OffsetOutOfRange {
                name,
                module,
                offset,
                phase: _,
            } => write!(
                f,
                "{module}: symbol {name} would be at offset {offset}, which does not fit in 16 bits"
            ),
        }
    }
}

impl Error for LinkError {}

/// A link which failed.  All the errors which could be detected are
/// included, not just the first.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LinkFailure {
    errors: Vec<LinkError>,
}

impl LinkFailure {
    pub(crate) fn new(errors: Vec<LinkError>) -> LinkFailure {
        debug_assert!(!errors.is_empty());
        LinkFailure { errors }
    }

    pub fn errors(&self) -> &[LinkError] {
        &self.errors
    }

    /// The phase which stopped the link; all errors of one failure
    /// come from the same phase.
    pub fn phase(&self) -> Option<LinkPhase> {
        self.errors.first().map(LinkError::phase)
    }
}

impl From<Vec<LinkError>> for LinkFailure {
    fn from(errors: Vec<LinkError>) -> LinkFailure {
        LinkFailure::new(errors)
    }
}

impl Display for LinkFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let phase = match self.phase() {
            Some(phase) => phase,
            None => {
                return f.write_str("link failed");
            }
        };
        write!(f, "link failed during {phase} phase:")?;
        for e in &self.errors {
            write!(f, "\n  {e}")?;
        }
        Ok(())
    }
}

impl Error for LinkFailure {}

/// An error in a statement handed to the assembler.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AssemblyError {
    Encoding {
        statement: usize,
        error: EncodingError,
    },
    DuplicateLabel {
        statement: usize,
        name: SymbolName,
    },
    LabelOutOfRange {
        statement: usize,
        name: SymbolName,
    },
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            AssemblyError::Encoding { statement, error } => {
                write!(f, "statement {statement}: {error}")
            }
            AssemblyError::DuplicateLabel { statement, name } => {
                write!(f, "statement {statement}: label {name} is already defined")
            }
            AssemblyError::LabelOutOfRange { statement, name } => {
                write!(
                    f,
                    "statement {statement}: label {name} is too far from the start of the module"
                )
            }
        }
    }
}

impl Error for AssemblyError {}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IoAction {
    Read,
    Write,
}

#[derive(Debug)]
pub struct IoFailed {
    pub action: IoAction,
    pub filename: PathBuf,
    pub error: IoError,
}

impl Display for IoFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let verb = match self.action {
            IoAction::Read => "reading",
            IoAction::Write => "writing",
        };
        write!(
            f,
            "I/O error {verb} {}: {}",
            self.filename.display(),
            self.error
        )
    }
}

/// Failures of the file-level linker driver.
#[derive(Debug)]
pub enum LinkerFailure {
    Io(IoFailed),
    BadObjectFile { filename: OsString, msg: String },
    Link(LinkFailure),
}

fn write_os_string(f: &mut Formatter<'_>, s: &OsStr) -> Result<(), fmt::Error> {
    match s.to_str() {
        Some(unicode_name) => f.write_str(unicode_name),
        None => write!(
            f,
            "{} (some non-Unicode characters changed to make it printable)",
            s.to_string_lossy(),
        ),
    }
}

impl Display for LinkerFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            LinkerFailure::Io(failed) => failed.fmt(f),
            LinkerFailure::BadObjectFile { filename, msg } => {
                f.write_str("invalid object file ")?;
                write_os_string(f, filename)?;
                write!(f, ": {msg}")
            }
            LinkerFailure::Link(failure) => failure.fmt(f),
        }
    }
}

impl Error for LinkerFailure {}

impl From<LinkFailure> for LinkerFailure {
    fn from(failure: LinkFailure) -> LinkerFailure {
        LinkerFailure::Link(failure)
    }
}

#[test]
fn link_error_phases() {
    let name = SymbolName::from("main");
    assert_eq!(
        LinkError::MultipleDefinition {
            name: name.clone(),
            first: "a.o".to_string(),
            second: "b.o".to_string(),
        }
        .phase(),
        LinkPhase::Merge
    );
    assert_eq!(
        LinkError::UnresolvedSymbol {
            name: name.clone(),
            module: "a.o".to_string(),
        }
        .phase(),
        LinkPhase::Substitute
    );
    let failure = LinkFailure::new(vec![LinkError::UnresolvedSymbol {
        name,
        module: "a.o".to_string(),
    }]);
    assert_eq!(
        failure.to_string(),
        "link failed during substitute phase:\n  a.o: undefined reference to main"
    );
}
