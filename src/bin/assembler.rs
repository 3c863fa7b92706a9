//! Assembly to object-file compiler CLI.
//!
//! Reads an assembly source file and writes its machine words as an object
//! file that the simulator can load.
//!
//! # Usage
//! ```text
//! assembler <input.s> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.s`: Assembly source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.lc`)
//!
//! # Examples
//! ```text
//! assembler program.s
//! assembler program.s -o output.lc
//! ```

use lcsim::machine::assembler::assemble_file;
use lcsim::machine::image::{object_path_for, write_object_file};
use lcsim::machine::isa::Isa;
use lcsim::utils::log;
use lcsim::{error, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = Path::new(&args[1]);
    let mut output_path: Option<PathBuf> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(PathBuf::from(&args[i]));
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !input_path.exists() {
        error!("Input file does not exist: {}", input_path.display());
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| object_path_for(input_path));

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let isa = Isa::new();
    let words = match assemble_file(&isa, input_path) {
        Ok(words) => words,
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_object_file(&output_path, &words) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Assembled {} -> {} ({} words)",
        input_path.display(),
        output_path.display(),
        words.len()
    );
}

const USAGE: &str = "\
Assembler

USAGE:
    {program} <input.s> [OPTIONS]

ARGS:
    <input.s>    Assembly source file to compile

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.lc)
    -h, --help              Print this help message

EXAMPLES:
    # Compile to default output name
    {program} program.s

    # Compile with explicit output
    {program} program.s -o output.lc
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
