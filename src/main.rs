//! `cminusfc` CLI harness: reads the textual IR format described in
//! `driver::textir`, runs it through Mem2Reg promotion and the LoongArch-like
//! code generator, and writes the resulting assembly. Stands in for the real
//! `cminusfc` front end (lexer/parser/AST/sema), which this crate does not
//! implement — this binary exists so the core has an exercisable
//! end-to-end surface.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use cminusfc_core::driver::Driver;

#[derive(Parser)]
#[command(name = "cminusfc", author, version, about = "cminus-f optimization/lowering core driver", long_about = None)]
struct Cli {
    /// Path to a textual-IR source file (see `driver::textir` for the grammar).
    input: String,

    /// Output assembly path; defaults to stdout.
    #[arg(short, long)]
    output: Option<String>,

    /// Log dominator/Mem2Reg/codegen progress at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read `{}`: {e}", cli.input);
            return ExitCode::FAILURE;
        }
    };

    let driver = Driver { verbose: cli.verbose };
    let asm = match driver.compile_str(&source) {
        Ok(asm) => asm,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = fs::write(&path, asm) {
                eprintln!("error: cannot write `{path}`: {e}");
                return ExitCode::FAILURE;
            }
        }
        None => print!("{asm}"),
    }

    ExitCode::SUCCESS
}
