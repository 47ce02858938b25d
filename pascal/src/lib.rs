//! A Turbo-Pascal-3 flavoured toolchain: lexer, recursive-descent
//! parser with an integrated symbol table and type checker, a compiler
//! to stack-oriented p-code, and the p-machine that executes it.
//!
//! ```no_run
//! let code = pascal::compile("program P; begin WriteLn('Hello') end.").unwrap();
//! let mut machine = pascal::Machine::new(code, Box::new(pascal::NullHost));
//! machine.set_output_callback(|line| println!("{line}"));
//! machine.run().unwrap();
//! ```
pub mod builtin;
pub mod bytecode;
pub mod compiler;
pub mod constants;
mod disasm;
mod error;
mod machine;
mod native;
mod value;

pub use self::{
    builtin::MODULE_NAME as BUILTIN_MODULE,
    bytecode::{Bytecode, Op},
    compiler::{compile, compile_with},
    disasm::Disassembler,
    error::{ErrorToken, PascalError, PascalResult},
    machine::{Ctl, Machine, State, StepOutcome},
    native::{
        Host, Module, ModuleCtx, ModuleRegistry, NativeFn, NativeProcedure, NativeRegistry,
        NullHost,
    },
    value::Value,
};

/// Version of *this* implementation.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        compiler::compile,
        disasm::Disassembler,
        error::{PascalError, PascalResult},
        machine::{Machine, StepOutcome},
        native::NullHost,
    };
}
