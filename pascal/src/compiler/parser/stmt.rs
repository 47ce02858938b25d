//! Statements.
use crate::error::{PascalError, PascalResult};

use super::super::{
    ast::{Expr, ExprKind, Stmt},
    symbol::SymbolKind,
    token_stream::unexpected,
    tokens::{Sym, TokenKind, Word},
    types::{TypeNode, TYPE_BOOLEAN, TYPE_INTEGER, TYPE_VOID},
};
use super::Parser;

impl Parser<'_> {
    /// Statements up to the matching `end`; `begin` is already
    /// consumed. Empty statements and a trailing semicolon are fine.
    pub(super) fn parse_compound(&mut self) -> PascalResult<Vec<Stmt>> {
        self.parse_stmt_list(Word::End)
    }

    fn parse_stmt_list(&mut self, terminator: Word) -> PascalResult<Vec<Stmt>> {
        let mut stmts = vec![];
        loop {
            if self.stream.match_word(terminator)? {
                return Ok(stmts);
            }
            stmts.push(self.parse_stmt()?);
            if self.stream.match_sym(Sym::Semicolon)? {
                continue;
            }
            self.stream.expect_word(terminator)?;
            return Ok(stmts);
        }
    }

    fn parse_stmt(&mut self) -> PascalResult<Stmt> {
        let token = self.stream.peek()?.clone();
        match token.kind {
            TokenKind::Word(Word::Begin) => {
                self.stream.next_token()?;
                Ok(Stmt::Compound(self.parse_compound()?))
            }
            TokenKind::Word(Word::If) => self.parse_if(),
            TokenKind::Word(Word::While) => self.parse_while(),
            TokenKind::Word(Word::Repeat) => self.parse_repeat(),
            TokenKind::Word(Word::For) => self.parse_for(),
            TokenKind::Word(Word::Exit) => {
                self.stream.next_token()?;
                Ok(Stmt::Exit)
            }
            // Empty statement in front of a separator or closer.
            TokenKind::Sym(Sym::Semicolon)
            | TokenKind::Word(Word::End)
            | TokenKind::Word(Word::Until)
            | TokenKind::Word(Word::Else) => Ok(Stmt::Empty),
            TokenKind::Ident => self.parse_assign_or_call(),
            _ => Err(unexpected(&token, "expected statement")),
        }
    }

    fn parse_if(&mut self) -> PascalResult<Stmt> {
        self.stream.expect_word(Word::If)?;
        let cond = self.parse_condition()?;
        self.stream.expect_word(Word::Then)?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.stream.match_word(Word::Else)? {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> PascalResult<Stmt> {
        self.stream.expect_word(Word::While)?;
        let cond = self.parse_condition()?;
        self.stream.expect_word(Word::Do)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_repeat(&mut self) -> PascalResult<Stmt> {
        self.stream.expect_word(Word::Repeat)?;
        let body = self.parse_stmt_list(Word::Until)?;
        let until = self.parse_condition()?;
        Ok(Stmt::Repeat { body, until })
    }

    /// `for v := a to|downto b do s`. The bounds are cast to the loop
    /// variable's type.
    fn parse_for(&mut self) -> PascalResult<Stmt> {
        self.stream.expect_word(Word::For)?;
        let name = self.stream.expect_ident()?;
        let Some(lookup) = self.syms.lookup(self.scope(), &name.text) else {
            return Err(unexpected(&name, "unknown identifier"));
        };
        let sym = self.syms.symbol(lookup.symbol).clone();
        if !matches!(sym.kind, SymbolKind::Variable | SymbolKind::Parameter) {
            return Err(unexpected(&name, "for loop needs a variable"));
        }
        if sym.ty != TYPE_INTEGER {
            return Err(unexpected(&name, "for loop variable must be integer"));
        }
        let var = Expr {
            kind: ExprKind::Ident(lookup),
            ty: sym.ty,
            line: name.line,
        };

        self.stream.expect_sym(Sym::Assign)?;
        let from = self.parse_expr()?;
        let from = self.cast_to(from, sym.ty)?;
        let downto = if self.stream.match_word(Word::To)? {
            false
        } else {
            self.stream.expect_word(Word::Downto)?;
            true
        };
        let to = self.parse_expr()?;
        let to = self.cast_to(to, sym.ty)?;
        self.stream.expect_word(Word::Do)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            var,
            from,
            to,
            downto,
            body,
        })
    }

    /// An identifier starts either an assignment (through any chain of
    /// designators), a function-result assignment, or a procedure
    /// call.
    fn parse_assign_or_call(&mut self) -> PascalResult<Stmt> {
        let name = self.stream.expect_ident()?;
        let Some(lookup) = self.syms.lookup(self.scope(), &name.text) else {
            return Err(unexpected(&name, "unknown identifier"));
        };
        let sym = self.syms.symbol(lookup.symbol).clone();

        match sym.kind {
            SymbolKind::Subprogram => {
                if self.stream.peek()?.is_sym(Sym::Assign) {
                    // Assignment to the function's return-value slot.
                    let ret = match self.types.node(sym.ty) {
                        TypeNode::Subprogram { ret, .. } => *ret,
                        _ => TYPE_VOID,
                    };
                    if ret == TYPE_VOID {
                        return Err(unexpected(&name, "cannot assign to a procedure"));
                    }
                    if sym.native {
                        return Err(unexpected(&name, "cannot assign to a native"));
                    }
                    self.stream.expect_sym(Sym::Assign)?;
                    let value = self.parse_expr()?;
                    let value = self.cast_to(value, ret)?;
                    let target = Expr {
                        kind: ExprKind::Ident(lookup),
                        ty: ret,
                        line: name.line,
                    };
                    Ok(Stmt::Assign { target, value })
                } else {
                    let call = self.parse_call(lookup, &name)?;
                    if call.ty != TYPE_VOID {
                        return Err(unexpected(&name, "function result is not used"));
                    }
                    Ok(Stmt::Call(call))
                }
            }
            SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::TypedConst => {
                let base = Expr {
                    kind: ExprKind::Ident(lookup),
                    ty: sym.ty,
                    line: name.line,
                };
                let target = self.parse_designators(base)?;
                self.stream.expect_sym(Sym::Assign)?;
                let value = self.parse_expr()?;
                let value = self.cast_to(value, target.ty)?;
                if !self.types.is_simple(target.ty) && value_is_not_designator(&value) {
                    return Err(PascalError::at(
                        "compound assignment needs a variable source",
                        name.text.clone(),
                        value.line,
                    ));
                }
                Ok(Stmt::Assign { target, value })
            }
            SymbolKind::Const => Err(unexpected(&name, "cannot assign to a constant")),
        }
    }

    /// Conditions of `if`, `while` and `repeat-until` must be boolean.
    fn parse_condition(&mut self) -> PascalResult<Expr> {
        let line = self.stream.peek()?.line;
        let cond = self.parse_expr()?;
        if cond.ty != TYPE_BOOLEAN {
            return Err(PascalError::at("condition must be boolean", "", line));
        }
        Ok(cond)
    }
}

/// Compound (array/record) assignments copy word by word through the
/// address walker, so the source must itself be addressable.
fn value_is_not_designator(expr: &Expr) -> bool {
    !matches!(
        expr.kind,
        ExprKind::Ident(_) | ExprKind::Index { .. } | ExprKind::Field { .. } | ExprKind::Deref(_)
    )
}
