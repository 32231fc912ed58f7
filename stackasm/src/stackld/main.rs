use std::error::Error;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use clap::ArgAction::{Append, Set, SetTrue};
use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use stackasm::{link_files, LinkOptions, LinkerFailure};

/// Linker for stack virtual machine object files
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// Object files to link, in the order in which they are placed
    /// in the output.
    #[clap(action = Append, required = true)]
    inputs: Vec<OsString>,

    /// File to which the linked image (or, with --partial, the
    /// combined object file) is written.
    #[clap(action = Set, short = 'o', long)]
    output: OsString,

    /// Print the link map: where each module was placed and the
    /// final symbol table.
    #[clap(action = SetTrue, long)]
    map: bool,

    /// Combine the inputs into a single object file, leaving
    /// references to symbols they don't define for a later link.
    #[clap(action = SetTrue, short = 'r', long)]
    partial: bool,
}

#[derive(Debug)]
enum Fail {
    /// We initialised the linker but then it failed.
    LinkFail(LinkerFailure),
    /// We were not able to correctly initialise the linker.
    InitialisationFailure(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::LinkFail(linker_failure) => linker_failure.fmt(f),
            Fail::InitialisationFailure(msg) => f.write_str(msg.as_str()),
        }
    }
}

impl Error for Fail {}

fn run_linker() -> Result<(), Fail> {
    let cli = Cli::parse();

    // Set RUST_LOG (for example, RUST_LOG=debug) to select which
    // trace messages get printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Fail::InitialisationFailure(format!(
                "failed to initialise tracing filter (perhaps there is a problem with environment variables): {e}"
            )));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let span = span!(Level::ERROR, "link", inputs=?cli.inputs, output=?cli.output);
    let _enter = span.enter();
    let output_path = PathBuf::from(cli.output);
    let options = LinkOptions {
        map: cli.map,
        partial: cli.partial,
    };
    let result = link_files(&cli.inputs, &output_path, options).map_err(Fail::LinkFail);
    if let Err(e) = &result {
        event!(Level::ERROR, "link failed: {:?}", e);
    } else {
        event!(Level::INFO, "link succeeded");
    }
    result
}

fn main() {
    // Code trees are reduced recursively, so a pathological input
    // could exhaust the stack.
    unsafe { backtrace_on_stack_overflow::enable() };

    match run_linker() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
