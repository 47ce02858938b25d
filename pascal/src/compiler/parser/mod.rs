//! Recursive-descent parser with integrated name resolution and type
//! checking.
//!
//! The parser runs in a single pass: declarations build symbol tables
//! and type-table entries as they are read, expressions resolve names
//! and get their types (and any implicit casts) immediately. The tree
//! that comes out is fully annotated; nothing downstream looks at names
//! again.
mod decl;
mod expr;
mod stmt;
mod typ;

use smol_str::SmolStr;

use crate::error::{PascalError, PascalResult};
use crate::native::{ModuleCtx, ModuleRegistry, NativeRegistry};
use crate::{builtin, value::Value};

use super::{
    ast::{Expr, ExprKind, Program, Subprogram},
    lexer::Lexer,
    symbol::{ScopeId, Symbol, SymbolKind, SymbolTable},
    token_stream::{unexpected, TokenStream},
    tokens::{Sym, Token, TokenKind, Word},
    types::{TypeId, TypeNode, TypeTable, TYPE_VOID},
};

/// Everything a compilation produces ahead of code generation.
pub struct Ast {
    pub program: Program,
    pub syms: SymbolTable,
    pub types: TypeTable,
    pub natives: NativeRegistry,
}

pub struct Parser<'a> {
    stream: TokenStream<'a>,
    pub(super) syms: SymbolTable,
    pub(super) types: TypeTable,
    natives: NativeRegistry,
    modules: &'a ModuleRegistry,
    scope: ScopeId,
    /// `^Name` nodes waiting for `Name` to be declared; live only
    /// while a `type` section is open.
    pending_pointers: Vec<(TypeId, Token)>,
    in_type_section: bool,
}

impl<'a> Parser<'a> {
    /// Build a parser over `source` with the builtin module already
    /// installed in the root scope. `modules` supplies anything a
    /// `uses` clause may import.
    pub fn new(source: &'a str, modules: &'a ModuleRegistry) -> PascalResult<Self> {
        let mut syms = SymbolTable::new();
        let mut types = TypeTable::new();
        let mut natives = NativeRegistry::new();

        let root = syms.root();
        builtin::install(&mut ModuleCtx {
            syms: &mut syms,
            scope: root,
            types: &mut types,
            natives: &mut natives,
        })?;

        Ok(Self {
            stream: TokenStream::new(Lexer::new(source)),
            syms,
            types,
            natives,
            modules,
            scope: root,
            pending_pointers: vec![],
            in_type_section: false,
        })
    }

    /// Parse a whole program. The program body becomes a
    /// parameterless subprogram the bytecode epilogue calls.
    pub fn parse(mut self) -> PascalResult<Ast> {
        self.stream.expect_word(Word::Program)?;
        let name_token = self.stream.expect_ident()?;
        let name: SmolStr = name_token.text.clone();
        self.stream.expect_sym(Sym::Semicolon)?;

        let ty = self.types.add(TypeNode::Subprogram {
            params: vec![],
            ret: TYPE_VOID,
        });
        let root = self.syms.root();
        let symbol = self
            .syms
            .declare(
                root,
                Symbol {
                    name: name.clone(),
                    kind: SymbolKind::Subprogram,
                    ty,
                    address: 0,
                    native: false,
                    by_ref: false,
                    value: None,
                },
                0,
            )
            .map_err(|err| self.attach(err, &name_token))?;

        let scope = self.syms.push_scope(root);
        self.scope = scope;
        let block = self.parse_block()?;
        self.stream.expect_sym(Sym::Dot)?;

        let token = self.stream.peek()?;
        if token.kind != TokenKind::Eof {
            return Err(unexpected(token, "expected end of input"));
        }

        Ok(Ast {
            program: Program {
                name: name.clone(),
                main: Subprogram {
                    name,
                    symbol,
                    scope,
                    ret: TYPE_VOID,
                    block,
                    line: name_token.line,
                },
            },
            syms: self.syms,
            types: self.types,
            natives: self.natives,
        })
    }

    // --------------------------------------------------------------------
    // Shared helpers

    pub(super) fn scope(&self) -> ScopeId {
        self.scope
    }

    pub(super) fn enter_scope(&mut self) -> ScopeId {
        let child = self.syms.push_scope(self.scope);
        self.scope = child;
        child
    }

    pub(super) fn leave_scope(&mut self, previous: ScopeId) {
        self.scope = previous;
    }

    /// Give a scope- or type-level error the offending token.
    pub(super) fn attach(&self, err: PascalError, token: &Token) -> PascalError {
        if err.token().is_some() {
            err
        } else {
            PascalError::at(err.message().to_string(), token.text.clone(), token.line)
        }
    }

    /// Wrap `expr` so its value has type `to`, inserting the implicit
    /// cast the type rules allow; incompatible types abort the parse.
    pub(super) fn cast_to(&self, expr: Expr, to: TypeId) -> PascalResult<Expr> {
        if expr.ty == to {
            return Ok(expr);
        }
        let kind = self
            .types
            .implicit_cast(expr.ty, to)
            .map_err(|err| PascalError::at(err.message().to_string(), "", expr.line))?;
        let line = expr.line;
        Ok(Expr {
            kind: ExprKind::Cast {
                kind,
                operand: Box::new(expr),
            },
            ty: to,
            line,
        })
    }

    /// Run a module installer against the current scope.
    pub(super) fn import_module(&mut self, name_token: &Token) -> PascalResult<()> {
        let Some(module) = self.modules.get(&name_token.text) else {
            return Err(unexpected(name_token, "unknown module"));
        };
        let mut ctx = ModuleCtx {
            syms: &mut self.syms,
            scope: self.scope,
            types: &mut self.types,
            natives: &mut self.natives,
        };
        (module.install)(&mut ctx)
    }

    /// Literal expression for a synthesized argument.
    pub(super) fn literal_int(&self, value: i32, line: u32) -> Expr {
        Expr {
            kind: ExprKind::Int(value),
            ty: super::types::TYPE_INTEGER,
            line,
        }
    }

    /// Constant symbols fold to their values at parse time.
    pub(super) fn const_value(&self, name: &str) -> Option<(Value, TypeId)> {
        let lookup = self.syms.lookup(self.scope, name)?;
        let sym = self.syms.symbol(lookup.symbol);
        match (&sym.kind, &sym.value) {
            (SymbolKind::Const, Some(value)) => Some((value.clone(), sym.ty)),
            _ => None,
        }
    }
}
