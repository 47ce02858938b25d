//! Entrypoint for CLI
use std::{env, error::Error, fs, time::Duration};

use log::{error, info};
use pascal::{Disassembler, Machine, NullHost, StepOutcome, IMPL_VERSION};

static USAGE: &str = r#"
usage: pascal CMD FILE

commands:
    run     Compile and run the target Pascal source file
    dis     Compile the target source file and print the p-code listing

examples:
    pascal run maze.pas
    pascal dis maze.pas
"#;

fn run_program(filepath: &str) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(filepath)?;

    info!("compiling {filepath}");
    let code = match pascal::compile(&source) {
        Ok(code) => code,
        Err(err) => {
            error!("compile error: {err}");
            return Err(err.into());
        }
    };

    let mut machine = Machine::new(code, Box::new(NullHost));
    machine.set_output_callback(|line| println!("{line}"));
    machine.set_finish_callback(|elapsed: Duration| {
        info!("finished in {}ms", elapsed.as_millis());
    });

    if let Err(err) = machine.run() {
        error!("runtime error: {err}");
        return Err(err.into());
    }
    Ok(())
}

fn disassemble(filepath: &str) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(filepath)?;
    let code = pascal::compile(&source)?;
    println!("{}", Disassembler::new(&code).listing());
    println!();
    println!("start address: {}", code.start_address);
    println!("constants: {}", code.constants.len());
    println!("typed constant words: {}", code.typed_constants.len());
    Ok(())
}

/// Drive a machine batch by batch instead of using the blocking run
/// loop, so delays are visible in the log. Kept for troubleshooting
/// with RUST_LOG=debug.
#[allow(dead_code)]
fn run_stepped(mut machine: Machine) -> Result<(), Box<dyn Error>> {
    loop {
        match machine.step(pascal::constants::STEP_BATCH)? {
            StepOutcome::Running => {}
            StepOutcome::NeedsDelay(ms) => {
                info!("delay {ms}ms");
                std::thread::sleep(Duration::from_millis(ms));
            }
            StepOutcome::Halted => return Ok(()),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    match parse_args() {
        Some(Cmd::Run { filepath }) => run_program(&filepath)?,
        Some(Cmd::Dis { filepath }) => disassemble(&filepath)?,
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    let cmd = args.next()?;
    let filepath = args.next()?;
    match cmd.as_str() {
        "run" => Some(Cmd::Run { filepath }),
        "dis" => Some(Cmd::Dis { filepath }),
        _ => None,
    }
}

fn print_usage() {
    println!("Pascal p-machine v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Compile and execute
    Run { filepath: String },
    /// Print bytecode listing
    Dis { filepath: String },
}
