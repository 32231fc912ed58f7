#![deny(unsafe_code)]

use std::error::Error;
use std::ffi::{OsStr, OsString};
use std::fmt::{self, Display, Formatter};
use std::fs::OpenOptions;
use std::io::{BufReader, Read};

use base::prelude::*;
use clap::ArgAction::Set;
use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

const ABOUT: &str = "Disassembler for linked stack virtual machine images";

/// Disassembler for images produced by stackld
#[derive(Parser, Debug)]
#[clap(version, about=ABOUT, long_about = None)]
struct Cli {
    /// File from which the linked image is read
    #[clap(action=Set)]
    input: OsString,
}

#[derive(Debug)]
enum Fail {
    ReadFailed(String),
    Generic(String),
    BadInstruction {
        offset: usize,
        error: DisassemblyFailure,
    },
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::Generic(message) | Fail::ReadFailed(message) => f.write_str(message),
            Fail::BadInstruction { offset, error } => {
                write!(f, "cannot disassemble the instruction at offset {offset}: {error}")
            }
        }
    }
}

impl Error for Fail {}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn disassemble_image(image: &[u8]) -> Result<(), Fail> {
    let mut offset: usize = 0;
    while offset < image.len() {
        let instruction = Instruction::decode(&image[offset..])
            .map_err(|error| Fail::BadInstruction { offset, error })?;
        let size = instruction.size();
        println!(
            "{offset:>6}|{:<30}|{instruction}",
            hex_bytes(&image[offset..offset + size])
        );
        offset += size;
    }
    event!(Level::DEBUG, "disassembled {} bytes", image.len());
    Ok(())
}

fn disassemble_file(input_file_name: &OsStr) -> Result<(), Fail> {
    let input_file = OpenOptions::new()
        .read(true)
        .open(input_file_name)
        .map_err(|e| Fail::Generic(format!("failed to open input file: {e}")))?;
    let mut image: Vec<u8> = Vec::new();
    BufReader::new(input_file)
        .read_to_end(&mut image)
        .map_err(|e| Fail::ReadFailed(e.to_string()))?;
    disassemble_image(&image)
}

fn disassemble() -> Result<(), Fail> {
    let cli = Cli::parse();
    // Set RUST_LOG to select which trace messages get printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Fail::Generic(format!(
                "failed to initialise tracing filter (perhaps there is a problem with environment variables): {e}"
            )));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let span = span!(Level::ERROR, "disassemble", input=?cli.input);
    let _enter = span.enter();
    disassemble_file(&cli.input)
}

fn main() {
    match disassemble() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
