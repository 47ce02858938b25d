//! Compiler front end: source text in, bytecode out.
pub mod ast;
pub mod cursor;
pub mod symbol;
pub mod tokens;
pub mod types;

mod codegen;
mod lexer;
mod parser;
mod token_stream;

pub use lexer::Lexer;
pub use parser::{Ast, Parser};
pub use token_stream::TokenStream;

use log::debug;

use crate::bytecode::Bytecode;
use crate::error::PascalResult;
use crate::native::ModuleRegistry;

/// Compile a program with only the builtin module available.
pub fn compile(source: &str) -> PascalResult<Bytecode> {
    compile_with(source, &ModuleRegistry::new())
}

/// Compile a program against a set of host modules importable with
/// `uses`.
pub fn compile_with(source: &str, modules: &ModuleRegistry) -> PascalResult<Bytecode> {
    debug!("parsing");
    let ast = Parser::new(source, modules)?.parse()?;
    debug!("lowering to p-code");
    codegen::generate(ast)
}
