use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{event, span, Level};

use super::link::{link, partial_link};
use super::listing::LinkMap;
use super::object::ObjectModule;
use super::objfile::{read_object, write_object, ObjectFileError};
use super::types::{IoAction, IoFailed, LinkError, LinkFailure, LinkerFailure, ModuleName};

#[cfg(test)]
mod tests;

/// Options for [`link_files`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Print the link map on standard output.
    pub map: bool,
    /// Combine the inputs into a single object file instead of
    /// producing a final image.
    pub partial: bool,
}

fn module_name_for(path: &Path) -> ModuleName {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, LinkerFailure> {
    let inner = || -> Result<Vec<u8>, std::io::Error> {
        let mut file = OpenOptions::new().read(true).open(path)?;
        let mut content: Vec<u8> = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(content)
    };
    inner().map_err(|e| {
        LinkerFailure::Io(IoFailed {
            action: IoAction::Read,
            filename: path.to_path_buf(),
            error: e,
        })
    })
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), LinkerFailure> {
    let inner = || -> Result<(), std::io::Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(content)?;
        writer.flush()
    };
    inner().map_err(|e| {
        LinkerFailure::Io(IoFailed {
            action: IoAction::Write,
            filename: path.to_path_buf(),
            error: e,
        })
    })
}

/// Read one object file.  The module is named after the file.
///
/// # Errors
///
/// Fails if the file cannot be read or is not an object file.
pub fn read_object_file(input: &OsStr) -> Result<ObjectModule, LinkerFailure> {
    let path = PathBuf::from(input);
    let data = read_file(&path)?;
    read_object(module_name_for(&path), &data).map_err(|e| match e {
        ObjectFileError::Manifest(errors) => LinkerFailure::Link(LinkFailure::new(errors)),
        other => LinkerFailure::BadObjectFile {
            filename: input.to_owned(),
            msg: other.to_string(),
        },
    })
}

/// Write `module` to the object file `output`.
///
/// # Errors
///
/// Fails if the file cannot be written.
pub fn write_object_file(module: &ObjectModule, output: &Path) -> Result<(), LinkerFailure> {
    let data = write_object(module).map_err(|e| LinkerFailure::BadObjectFile {
        filename: output.as_os_str().to_owned(),
        msg: e.to_string(),
    })?;
    write_file(output, &data)
}

fn read_inputs(inputs: &[OsString]) -> Result<Vec<ObjectModule>, LinkerFailure> {
    let mut modules: Vec<ObjectModule> = Vec::with_capacity(inputs.len());
    // Malformed manifests in all the inputs are reported together.
    let mut load_errors: Vec<LinkError> = Vec::new();
    for input in inputs {
        match read_object_file(input) {
            Ok(module) => {
                event!(
                    Level::DEBUG,
                    "read module {} with {} symbols",
                    module.name(),
                    module.manifest().len()
                );
                modules.push(module);
            }
            Err(LinkerFailure::Link(failure)) => {
                load_errors.extend(failure.errors().iter().cloned());
            }
            Err(e) => {
                return Err(e);
            }
        }
    }
    if load_errors.is_empty() {
        Ok(modules)
    } else {
        Err(LinkerFailure::Link(LinkFailure::new(load_errors)))
    }
}

/// Link the object files `inputs`, in order, writing the result to
/// `output`.  This is an image unless `options.partial` is set, in
/// which case it is a single object file combining the inputs.
///
/// # Errors
///
/// Fails if an input cannot be read or is not an object file, if the
/// link fails, or if the output cannot be written.  Nothing is
/// written to `output` unless the link succeeds.
pub fn link_files(inputs: &[OsString], output: &Path, options: LinkOptions) -> Result<(), LinkerFailure> {
    let span = span!(Level::ERROR, "link files", output=?output);
    let _enter = span.enter();

    let modules = read_inputs(inputs)?;
    if options.partial {
        let combined = partial_link(module_name_for(output), &modules)?;
        if options.map {
            print!("{}", combined.manifest_text());
        }
        write_object_file(&combined, output)
    } else {
        let image = link(&modules)?;
        if options.map {
            print!("{}", LinkMap::new(&image));
        }
        write_file(output, image.bytes())
    }
}
