//! Expression grammar: relational → additive → multiplicative → unary
//! → primary, with implicit casts inserted where the type rules allow.
use std::rc::Rc;

use crate::error::{PascalError, PascalResult};

use super::super::{
    ast::{BinaryOp, Expr, ExprKind, UnaryOp},
    symbol::{SymbolKind, SymbolLookup},
    token_stream::unexpected,
    tokens::{Sym, Token, TokenKind, Word},
    types::{CastKind, TypeNode, TYPE_ADDRESS, TYPE_BOOLEAN, TYPE_INTEGER, TYPE_REAL, TYPE_VOID},
};
use super::{decl, Parser};
use crate::value::Value;

impl Parser<'_> {
    /// Full expression; relational operators bind loosest and do not
    /// chain.
    pub(super) fn parse_expr(&mut self) -> PascalResult<Expr> {
        let lhs = self.parse_simple_expr()?;
        let op = match self.stream.peek_kind()? {
            TokenKind::Sym(Sym::Equal) => BinaryOp::Eq,
            TokenKind::Sym(Sym::NotEqual) => BinaryOp::NotEq,
            TokenKind::Sym(Sym::Less) => BinaryOp::Less,
            TokenKind::Sym(Sym::LessEqual) => BinaryOp::LessEq,
            TokenKind::Sym(Sym::Greater) => BinaryOp::Greater,
            TokenKind::Sym(Sym::GreaterEqual) => BinaryOp::GreaterEq,
            _ => return Ok(lhs),
        };
        let token = self.stream.next_token()?;
        let rhs = self.parse_simple_expr()?;
        let (lhs, rhs) = self.comparison_operands(lhs, rhs, op, &token)?;
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty: TYPE_BOOLEAN,
            line: token.line,
        })
    }

    fn parse_simple_expr(&mut self) -> PascalResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.stream.peek_kind()? {
                TokenKind::Sym(Sym::Plus) => BinaryOp::Add,
                TokenKind::Sym(Sym::Minus) => BinaryOp::Sub,
                TokenKind::Word(Word::Or) => BinaryOp::Or,
                _ => return Ok(lhs),
            };
            let token = self.stream.next_token()?;
            let rhs = self.parse_term()?;
            lhs = self.binary(op, lhs, rhs, &token)?;
        }
    }

    fn parse_term(&mut self) -> PascalResult<Expr> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.stream.peek_kind()? {
                TokenKind::Sym(Sym::Star) => BinaryOp::Mul,
                TokenKind::Sym(Sym::Slash) => BinaryOp::Divide,
                TokenKind::Word(Word::Div) => BinaryOp::Div,
                TokenKind::Word(Word::Mod) => BinaryOp::Mod,
                TokenKind::Word(Word::And) => BinaryOp::And,
                _ => return Ok(lhs),
            };
            let token = self.stream.next_token()?;
            let rhs = self.parse_factor()?;
            lhs = self.binary(op, lhs, rhs, &token)?;
        }
    }

    /// Apply the common-type rule for one binary operator and build
    /// the node.
    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
        token: &Token,
    ) -> PascalResult<Expr> {
        let (lhs, rhs, ty) = match op {
            BinaryOp::Or | BinaryOp::And => {
                self.require_boolean(&lhs, token)?;
                self.require_boolean(&rhs, token)?;
                (lhs, rhs, TYPE_BOOLEAN)
            }
            BinaryOp::Div | BinaryOp::Mod => {
                if lhs.ty != TYPE_INTEGER || rhs.ty != TYPE_INTEGER {
                    return Err(unexpected(token, "'div' and 'mod' take integer operands"));
                }
                (lhs, rhs, TYPE_INTEGER)
            }
            BinaryOp::Divide => {
                self.require_numeric(&lhs, token)?;
                self.require_numeric(&rhs, token)?;
                let lhs = self.cast_to(lhs, TYPE_REAL)?;
                let rhs = self.cast_to(rhs, TYPE_REAL)?;
                (lhs, rhs, TYPE_REAL)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                self.require_numeric(&lhs, token)?;
                self.require_numeric(&rhs, token)?;
                if lhs.ty == rhs.ty {
                    let ty = lhs.ty;
                    (lhs, rhs, ty)
                } else {
                    // Real absorbs integer.
                    let lhs = self.cast_to(lhs, TYPE_REAL)?;
                    let rhs = self.cast_to(rhs, TYPE_REAL)?;
                    (lhs, rhs, TYPE_REAL)
                }
            }
            _ => unreachable!("comparisons are built in parse_expr"),
        };
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            line: token.line,
        })
    }

    /// Bring comparison operands to one type: numerics mix through
    /// real, everything else must cast cleanly one way or the other.
    fn comparison_operands(
        &mut self,
        lhs: Expr,
        rhs: Expr,
        op: BinaryOp,
        token: &Token,
    ) -> PascalResult<(Expr, Expr)> {
        let numeric =
            |e: &Expr| e.ty == TYPE_INTEGER || e.ty == TYPE_REAL;
        let (lhs, rhs) = if numeric(&lhs) && numeric(&rhs) {
            if lhs.ty == rhs.ty {
                (lhs, rhs)
            } else {
                (self.cast_to(lhs, TYPE_REAL)?, self.cast_to(rhs, TYPE_REAL)?)
            }
        } else if self.types.implicit_cast(rhs.ty, lhs.ty).is_ok() {
            let to = lhs.ty;
            let rhs = self.cast_to(rhs, to)?;
            (lhs, rhs)
        } else if self.types.implicit_cast(lhs.ty, rhs.ty).is_ok() {
            let to = rhs.ty;
            let lhs = self.cast_to(lhs, to)?;
            (lhs, rhs)
        } else {
            return Err(unexpected(token, "incomparable operand types"));
        };

        let pointers = self.types.is_pointer(lhs.ty) || self.types.is_pointer(rhs.ty);
        if pointers && !matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
            return Err(unexpected(token, "pointers compare only with = and <>"));
        }
        Ok((lhs, rhs))
    }

    fn parse_factor(&mut self) -> PascalResult<Expr> {
        let token = self.stream.peek()?.clone();
        match token.kind {
            TokenKind::Sym(Sym::Minus) => {
                self.stream.next_token()?;
                let operand = self.parse_factor()?;
                self.require_numeric(&operand, &token)?;
                let ty = operand.ty;
                Ok(Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    ty,
                    line: token.line,
                })
            }
            TokenKind::Sym(Sym::Plus) => {
                self.stream.next_token()?;
                let operand = self.parse_factor()?;
                self.require_numeric(&operand, &token)?;
                Ok(operand)
            }
            TokenKind::Word(Word::Not) => {
                self.stream.next_token()?;
                let operand = self.parse_factor()?;
                self.require_boolean(&operand, &token)?;
                Ok(Expr {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    ty: TYPE_BOOLEAN,
                    line: token.line,
                })
            }
            TokenKind::Number => {
                let token = self.stream.next_token()?;
                let (value, ty) = decl::number_literal(&token)?;
                let kind = match value {
                    Value::Int(i) => ExprKind::Int(i),
                    Value::Real(r) => ExprKind::Real(r),
                    _ => unreachable!("number literals are numeric"),
                };
                Ok(Expr {
                    kind,
                    ty,
                    line: token.line,
                })
            }
            TokenKind::Str => {
                let token = self.stream.next_token()?;
                let ty = decl::string_literal_type(&token);
                Ok(Expr {
                    kind: ExprKind::Str(Rc::from(token.text.as_str())),
                    ty,
                    line: token.line,
                })
            }
            TokenKind::Word(Word::Nil) => {
                self.stream.next_token()?;
                Ok(Expr {
                    kind: ExprKind::Nil,
                    ty: TYPE_ADDRESS,
                    line: token.line,
                })
            }
            TokenKind::Sym(Sym::LeftParen) => {
                self.stream.next_token()?;
                let inner = self.parse_expr()?;
                self.stream.expect_sym(Sym::RightParen)?;
                Ok(inner)
            }
            TokenKind::Sym(Sym::At) => {
                self.stream.next_token()?;
                self.parse_addr_of(&token)
            }
            TokenKind::Ident => {
                let expr = self.parse_primary_ident()?;
                if expr.ty == TYPE_VOID {
                    return Err(unexpected(&token, "procedure call in expression"));
                }
                Ok(expr)
            }
            _ => Err(unexpected(&token, "expected expression")),
        }
    }

    /// `@v`: address of a variable designator; the result is a generic
    /// pointer.
    fn parse_addr_of(&mut self, at: &Token) -> PascalResult<Expr> {
        let token = self.stream.expect_ident()?;
        let Some(lookup) = self.syms.lookup(self.scope(), &token.text) else {
            return Err(unexpected(&token, "unknown identifier"));
        };
        let sym = self.syms.symbol(lookup.symbol).clone();
        if !matches!(
            sym.kind,
            SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::TypedConst
        ) {
            return Err(unexpected(at, "'@' takes the address of a variable"));
        }
        let base = Expr {
            kind: ExprKind::Ident(lookup),
            ty: sym.ty,
            line: token.line,
        };
        let target = self.parse_designators(base)?;
        Ok(Expr {
            kind: ExprKind::AddrOf(Box::new(target)),
            ty: TYPE_ADDRESS,
            line: at.line,
        })
    }

    /// Resolved identifier in expression position: constant value,
    /// function call, or variable designator.
    fn parse_primary_ident(&mut self) -> PascalResult<Expr> {
        let token = self.stream.expect_ident()?;
        let Some(lookup) = self.syms.lookup(self.scope(), &token.text) else {
            return Err(unexpected(&token, "unknown identifier"));
        };
        let sym = self.syms.symbol(lookup.symbol).clone();
        match sym.kind {
            SymbolKind::Const => {
                let value = sym
                    .value
                    .ok_or_else(|| unexpected(&token, "constant has no value"))?;
                let kind = match value {
                    Value::Int(i) => ExprKind::Int(i),
                    Value::Real(r) => ExprKind::Real(r),
                    Value::Bool(b) => ExprKind::Bool(b),
                    Value::Str(s) => ExprKind::Str(s),
                };
                Ok(Expr {
                    kind,
                    ty: sym.ty,
                    line: token.line,
                })
            }
            SymbolKind::Subprogram => self.parse_call(lookup, &token),
            SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::TypedConst => {
                let base = Expr {
                    kind: ExprKind::Ident(lookup),
                    ty: sym.ty,
                    line: token.line,
                };
                self.parse_designators(base)
            }
        }
    }

    /// Postfix designators: `[indices]`, `.field`, `^`.
    pub(super) fn parse_designators(&mut self, mut base: Expr) -> PascalResult<Expr> {
        loop {
            match self.stream.peek_kind()? {
                TokenKind::Sym(Sym::LeftBracket) => {
                    let token = self.stream.next_token()?;
                    let TypeNode::Array { ranges, elem } = self.types.node(base.ty).clone()
                    else {
                        return Err(unexpected(&token, "not an array"));
                    };
                    let mut indices = vec![];
                    for i in 0..ranges.len() {
                        if i > 0 {
                            self.stream.expect_sym(Sym::Comma)?;
                        }
                        let index = self.parse_expr()?;
                        let index = self.cast_to(index, TYPE_INTEGER)?;
                        indices.push(index);
                    }
                    self.stream.expect_sym(Sym::RightBracket)?;
                    base = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(base),
                            indices,
                        },
                        ty: elem,
                        line: token.line,
                    };
                }
                TokenKind::Sym(Sym::Dot) => {
                    self.stream.next_token()?;
                    let name = self.stream.expect_ident()?;
                    let TypeNode::Record { fields } = self.types.node(base.ty) else {
                        return Err(unexpected(&name, "not a record"));
                    };
                    let Some(field) = fields
                        .iter()
                        .find(|f| f.name.eq_ignore_ascii_case(&name.text))
                    else {
                        return Err(unexpected(&name, "unknown field"));
                    };
                    let (offset, ty) = (field.offset, field.ty);
                    base = Expr {
                        kind: ExprKind::Field {
                            base: Box::new(base),
                            offset,
                        },
                        ty,
                        line: name.line,
                    };
                }
                TokenKind::Sym(Sym::Caret) => {
                    let token = self.stream.next_token()?;
                    let Some(pointee) = self.types.pointee(base.ty) else {
                        return Err(unexpected(&token, "cannot dereference a non-pointer"));
                    };
                    base = Expr {
                        kind: ExprKind::Deref(Box::new(base)),
                        ty: pointee,
                        line: token.line,
                    };
                }
                _ => return Ok(base),
            }
        }
    }

    /// Call of a user subprogram or native, including the call-site
    /// rewrites some natives need.
    pub(super) fn parse_call(
        &mut self,
        lookup: SymbolLookup,
        name: &Token,
    ) -> PascalResult<Expr> {
        let sym = self.syms.symbol(lookup.symbol).clone();
        let TypeNode::Subprogram { params, ret } = self.types.node(sym.ty).clone() else {
            return Err(unexpected(name, "not callable"));
        };
        let mut ret = ret;

        let mut args = vec![];
        if self.stream.match_sym(Sym::LeftParen)? {
            loop {
                args.push(self.parse_expr()?);
                if !self.stream.match_sym(Sym::Comma)? {
                    break;
                }
            }
            self.stream.expect_sym(Sym::RightParen)?;
        }

        let mut checked = false;
        if sym.native {
            match sym.name.to_ascii_lowercase().as_str() {
                // New(p) grows a hidden argument: the word size of the
                // type p points at.
                "new" => {
                    if args.len() != 1 {
                        return Err(unexpected(name, "wrong number of arguments"));
                    }
                    let Some(pointee) = self.types.pointee(args[0].ty) else {
                        return Err(unexpected(name, "New needs a typed pointer variable"));
                    };
                    let size = self.types.size_of(pointee) as i32;
                    args.push(self.literal_int(size, name.line));
                }
                // A missing delta means 1.
                "inc" | "dec" => {
                    if args.len() == 1 {
                        args.push(self.literal_int(1, name.line));
                    }
                }
                // Random is real; Random(n) is integer.
                "random" => {
                    if args.len() > 1 {
                        return Err(unexpected(name, "wrong number of arguments"));
                    }
                    if let Some(bound) = args.pop() {
                        args.push(self.cast_to(bound, TYPE_INTEGER)?);
                        ret = TYPE_INTEGER;
                    }
                    checked = true;
                }
                // Integer in, integer out; the argument stays uncast.
                "abs" => {
                    if args.len() != 1 {
                        return Err(unexpected(name, "wrong number of arguments"));
                    }
                    if args[0].ty == TYPE_INTEGER {
                        ret = TYPE_INTEGER;
                    } else {
                        let arg = args.pop().unwrap();
                        args.push(self.cast_to(arg, TYPE_REAL)?);
                    }
                    checked = true;
                }
                _ => {}
            }
        }

        let variadic = sym.native
            && self
                .natives
                .get(sym.address)
                .map(|p| p.variadic)
                .unwrap_or(false);

        if variadic {
            // Each variadic argument occupies one popped word.
            for arg in &args {
                if self.types.size_of(arg.ty) != 1 {
                    return Err(PascalError::at(
                        "argument must be a simple value",
                        name.text.clone(),
                        arg.line,
                    ));
                }
            }
        }

        if !checked && !variadic {
            if args.len() != params.len() {
                return Err(unexpected(name, "wrong number of arguments"));
            }
            for (arg, param) in args.iter_mut().zip(&params) {
                if param.by_ref {
                    if !self.is_lvalue(arg) {
                        return Err(PascalError::at(
                            "var parameter needs a variable",
                            name.text.clone(),
                            arg.line,
                        ));
                    }
                    // Addresses pass as-is; the types must already
                    // agree without a conversion.
                    match self.types.implicit_cast(arg.ty, param.ty) {
                        Ok(CastKind::NoOp) => {}
                        _ => {
                            return Err(PascalError::at(
                                "var parameter type mismatch",
                                name.text.clone(),
                                arg.line,
                            ));
                        }
                    }
                } else {
                    let taken = std::mem::replace(arg, self.literal_int(0, 0));
                    *arg = self.cast_to(taken, param.ty)?;
                }
            }
        }

        Ok(Expr {
            kind: ExprKind::Call { lookup, args },
            ty: ret,
            line: name.line,
        })
    }

    /// Whether an expression designates a storable location.
    pub(super) fn is_lvalue(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Ident(lookup) => matches!(
                self.syms.symbol(lookup.symbol).kind,
                SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::TypedConst
            ),
            ExprKind::Index { base, .. } | ExprKind::Field { base, .. } => self.is_lvalue(base),
            ExprKind::Deref(_) => true,
            _ => false,
        }
    }

    fn require_numeric(&self, expr: &Expr, token: &Token) -> PascalResult<()> {
        if expr.ty == TYPE_INTEGER || expr.ty == TYPE_REAL {
            Ok(())
        } else {
            Err(unexpected(token, "numeric operand expected"))
        }
    }

    fn require_boolean(&self, expr: &Expr, token: &Token) -> PascalResult<()> {
        if expr.ty == TYPE_BOOLEAN {
            Ok(())
        } else {
            Err(unexpected(token, "boolean operand expected"))
        }
    }
}
