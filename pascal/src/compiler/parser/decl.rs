//! Declaration sections: `uses`, `var`, `const`, `type`, and
//! subprogram headers.
use crate::error::{PascalError, PascalResult};
use crate::value::Value;

use super::super::{
    ast::{Block, RawData, Subprogram, TypedConst},
    symbol::{Symbol, SymbolKind},
    token_stream::unexpected,
    tokens::{Sym, Token, TokenKind, Word},
    types::{CastKind, Param, TypeId, TypeNode, TYPE_INTEGER, TYPE_REAL, TYPE_VOID},
};
use super::Parser;

impl Parser<'_> {
    /// Declarations in any order, then the `begin .. end` body.
    pub(super) fn parse_block(&mut self) -> PascalResult<Block> {
        let mut block = Block::default();
        loop {
            let token = self.stream.peek()?.clone();
            match token.kind {
                TokenKind::Word(Word::Uses) => self.parse_uses()?,
                TokenKind::Word(Word::Var) => self.parse_var_section()?,
                TokenKind::Word(Word::Const) => self.parse_const_section(&mut block)?,
                TokenKind::Word(Word::Type) => self.parse_type_section()?,
                TokenKind::Word(Word::Procedure) | TokenKind::Word(Word::Function) => {
                    let sub = self.parse_subprogram()?;
                    block.subprograms.push(sub);
                }
                TokenKind::Word(Word::Begin) => break,
                _ => return Err(unexpected(&token, "expected declaration or 'begin'")),
            }
        }
        self.stream.expect_word(Word::Begin)?;
        block.body = self.parse_compound()?;
        Ok(block)
    }

    /// `uses a, b, c;` imports host modules into the current scope.
    fn parse_uses(&mut self) -> PascalResult<()> {
        self.stream.expect_word(Word::Uses)?;
        loop {
            let name = self.stream.expect_ident()?;
            self.import_module(&name)
                .map_err(|err| self.attach(err, &name))?;
            if !self.stream.match_sym(Sym::Comma)? {
                break;
            }
        }
        self.stream.expect_sym(Sym::Semicolon)?;
        Ok(())
    }

    /// `var` entries: comma-separated names sharing one type.
    fn parse_var_section(&mut self) -> PascalResult<()> {
        self.stream.expect_word(Word::Var)?;
        while self.stream.peek_kind()? == TokenKind::Ident {
            let mut names = vec![self.stream.expect_ident()?];
            while self.stream.match_sym(Sym::Comma)? {
                names.push(self.stream.expect_ident()?);
            }
            self.stream.expect_sym(Sym::Colon)?;
            let ty = self.parse_type_expr()?;
            self.stream.expect_sym(Sym::Semicolon)?;
            let size = self.types.size_of(ty);
            for name in names {
                let scope = self.scope();
                self.syms
                    .declare(
                        scope,
                        Symbol {
                            name: name.text.clone(),
                            kind: SymbolKind::Variable,
                            ty,
                            address: 0,
                            native: false,
                            by_ref: false,
                            value: None,
                        },
                        size,
                    )
                    .map_err(|err| self.attach(err, &name))?;
            }
        }
        Ok(())
    }

    /// `const` entries: either `name = expr` (type derived from the
    /// expression) or a typed constant `name : type = initializer`.
    fn parse_const_section(&mut self, block: &mut Block) -> PascalResult<()> {
        self.stream.expect_word(Word::Const)?;
        while self.stream.peek_kind()? == TokenKind::Ident {
            let name = self.stream.expect_ident()?;
            if self.stream.match_sym(Sym::Colon)? {
                // Typed constant: a pre-initialised frame variable.
                let ty = self.parse_type_expr()?;
                self.stream.expect_sym(Sym::Equal)?;
                let data = self.parse_typed_initializer(ty)?;
                self.stream.expect_sym(Sym::Semicolon)?;
                let size = self.types.size_of(ty);
                let scope = self.scope();
                let symbol = self
                    .syms
                    .declare(
                        scope,
                        Symbol {
                            name: name.text.clone(),
                            kind: SymbolKind::TypedConst,
                            ty,
                            address: 0,
                            native: false,
                            by_ref: false,
                            value: None,
                        },
                        size,
                    )
                    .map_err(|err| self.attach(err, &name))?;
                block.typed_consts.push(TypedConst { symbol, data });
            } else {
                self.stream.expect_sym(Sym::Equal)?;
                let (value, ty) = self.parse_const_expr()?;
                self.stream.expect_sym(Sym::Semicolon)?;
                let scope = self.scope();
                self.syms
                    .declare(
                        scope,
                        Symbol {
                            name: name.text.clone(),
                            kind: SymbolKind::Const,
                            ty,
                            address: 0,
                            native: false,
                            by_ref: false,
                            value: Some(value),
                        },
                        0,
                    )
                    .map_err(|err| self.attach(err, &name))?;
            }
        }
        Ok(())
    }

    /// `type` entries; `^Name` forward references resolve when the
    /// section closes.
    fn parse_type_section(&mut self) -> PascalResult<()> {
        self.stream.expect_word(Word::Type)?;
        self.in_type_section = true;
        while self.stream.peek_kind()? == TokenKind::Ident {
            let name = self.stream.expect_ident()?;
            self.stream.expect_sym(Sym::Equal)?;
            let ty = self.parse_type_expr()?;
            self.stream.expect_sym(Sym::Semicolon)?;
            let scope = self.scope();
            self.syms
                .declare_type(scope, &name.text, ty)
                .map_err(|err| self.attach(err, &name))?;
        }
        self.in_type_section = false;
        self.close_type_section()
    }

    /// `procedure`/`function` header and nested block. The symbol goes
    /// into the enclosing scope first so the body can recurse.
    fn parse_subprogram(&mut self) -> PascalResult<Subprogram> {
        let keyword = self.stream.next_token()?;
        let is_function = keyword.is_word(Word::Function);
        let name = self.stream.expect_ident()?;

        let mut params: Vec<Param> = vec![];
        let mut param_tokens: Vec<(Token, bool)> = vec![];
        if self.stream.match_sym(Sym::LeftParen)? {
            loop {
                let by_ref = self.stream.match_word(Word::Var)?;
                let mut group = vec![self.stream.expect_ident()?];
                while self.stream.match_sym(Sym::Comma)? {
                    group.push(self.stream.expect_ident()?);
                }
                self.stream.expect_sym(Sym::Colon)?;
                let ty = self.parse_type_name()?;
                for token in group {
                    params.push(Param {
                        name: token.text.clone(),
                        ty,
                        by_ref,
                    });
                    param_tokens.push((token, by_ref));
                }
                if !self.stream.match_sym(Sym::Semicolon)? {
                    break;
                }
            }
            self.stream.expect_sym(Sym::RightParen)?;
        }

        let ret = if is_function {
            self.stream.expect_sym(Sym::Colon)?;
            self.parse_type_name()?
        } else {
            TYPE_VOID
        };
        if is_function && !self.types.is_simple(ret) {
            return Err(unexpected(&name, "function result must be a simple type"));
        }
        self.stream.expect_sym(Sym::Semicolon)?;

        let ty = self.types.add(TypeNode::Subprogram {
            params: params.clone(),
            ret,
        });
        let scope = self.scope();
        let symbol = self
            .syms
            .declare(
                scope,
                Symbol {
                    name: name.text.clone(),
                    kind: SymbolKind::Subprogram,
                    ty,
                    address: 0,
                    native: false,
                    by_ref: false,
                    value: None,
                },
                0,
            )
            .map_err(|err| self.attach(err, &name))?;

        let outer = self.scope();
        let child = self.enter_scope();
        for (param, (token, by_ref)) in params.iter().zip(&param_tokens) {
            // A by-reference parameter holds one word: the address.
            let size = if *by_ref { 1 } else { self.types.size_of(param.ty) };
            self.syms
                .declare(
                    child,
                    Symbol {
                        name: param.name.clone(),
                        kind: SymbolKind::Parameter,
                        ty: param.ty,
                        address: 0,
                        native: false,
                        by_ref: *by_ref,
                        value: None,
                    },
                    size,
                )
                .map_err(|err| self.attach(err, token))?;
        }

        let block = self.parse_block()?;
        self.stream.expect_sym(Sym::Semicolon)?;
        self.leave_scope(outer);

        Ok(Subprogram {
            name: name.text.clone(),
            symbol,
            scope: child,
            ret,
            block,
            line: name.line,
        })
    }

    /// Parameter and result types must be type identifiers.
    fn parse_type_name(&mut self) -> PascalResult<TypeId> {
        let token = self.stream.expect_ident()?;
        self.syms
            .lookup_type(self.scope(), &token.text)
            .ok_or_else(|| unexpected(&token, "unknown type"))
    }

    // --------------------------------------------------------------------
    // Constant expressions and typed-constant initializers

    /// Constant expression folded at parse time: literals, named
    /// constants, parentheses, `+ - * / div mod` and unary sign.
    pub(super) fn parse_const_expr(&mut self) -> PascalResult<(Value, TypeId)> {
        let (mut value, mut ty) = self.parse_const_term()?;
        loop {
            let op = match self.stream.peek_kind()? {
                TokenKind::Sym(Sym::Plus) => ConstOp::Add,
                TokenKind::Sym(Sym::Minus) => ConstOp::Sub,
                _ => break,
            };
            let token = self.stream.next_token()?;
            let (rhs, rty) = self.parse_const_term()?;
            (value, ty) = const_arith(&token, op, value, ty, rhs, rty)?;
        }
        Ok((value, ty))
    }

    fn parse_const_term(&mut self) -> PascalResult<(Value, TypeId)> {
        let (mut value, mut ty) = self.parse_const_factor()?;
        loop {
            let op = match self.stream.peek_kind()? {
                TokenKind::Sym(Sym::Star) => ConstOp::Mul,
                TokenKind::Sym(Sym::Slash) => ConstOp::Divide,
                TokenKind::Word(Word::Div) => ConstOp::Div,
                TokenKind::Word(Word::Mod) => ConstOp::Mod,
                _ => break,
            };
            let token = self.stream.next_token()?;
            let (rhs, rty) = self.parse_const_factor()?;
            (value, ty) = const_arith(&token, op, value, ty, rhs, rty)?;
        }
        Ok((value, ty))
    }

    fn parse_const_factor(&mut self) -> PascalResult<(Value, TypeId)> {
        let token = self.stream.next_token()?;
        match token.kind {
            TokenKind::Sym(Sym::Minus) => {
                let (value, ty) = self.parse_const_factor()?;
                match value {
                    Value::Int(i) => Ok((Value::Int(i.wrapping_neg()), ty)),
                    Value::Real(r) => Ok((Value::Real(-r), ty)),
                    _ => Err(unexpected(&token, "cannot negate non-numeric constant")),
                }
            }
            TokenKind::Sym(Sym::Plus) => self.parse_const_factor(),
            TokenKind::Sym(Sym::LeftParen) => {
                let result = self.parse_const_expr()?;
                self.stream.expect_sym(Sym::RightParen)?;
                Ok(result)
            }
            TokenKind::Number => {
                let (value, ty) = number_literal(&token)?;
                Ok((value, ty))
            }
            TokenKind::Str => {
                let ty = string_literal_type(&token);
                Ok((Value::string(token.text.as_str()), ty))
            }
            TokenKind::Ident => self
                .const_value(&token.text)
                .ok_or_else(|| unexpected(&token, "constant expected")),
            _ => Err(unexpected(&token, "constant expected")),
        }
    }

    /// Initializer for a typed constant, flattened into raw words.
    fn parse_typed_initializer(&mut self, ty: TypeId) -> PascalResult<RawData> {
        let mut data = RawData::default();
        self.parse_initializer_into(ty, &mut data)?;
        Ok(data)
    }

    fn parse_initializer_into(&mut self, ty: TypeId, data: &mut RawData) -> PascalResult<()> {
        match self.types.node(ty).clone() {
            TypeNode::Array { ranges, elem } => self.parse_array_initializer(&ranges, elem, data),
            TypeNode::Record { .. } => {
                let token = self.stream.peek()?.clone();
                Err(unexpected(&token, "record typed constants are not supported"))
            }
            _ => {
                let token = self.stream.peek()?.clone();
                let (value, vty) = self.parse_const_expr()?;
                let cast = self
                    .types
                    .implicit_cast(vty, ty)
                    .map_err(|err| self.attach(err, &token))?;
                let value = match cast {
                    CastKind::IntToReal => Value::Real(value.as_int()? as f64),
                    CastKind::NoOp => value,
                };
                data.push(value, self.types.code_of(ty));
                Ok(())
            }
        }
    }

    /// One parenthesized list per dimension, row-major, with the
    /// element count matching `high - low + 1` exactly.
    fn parse_array_initializer(
        &mut self,
        ranges: &[(i32, i32)],
        elem: TypeId,
        data: &mut RawData,
    ) -> PascalResult<()> {
        let open = self.stream.expect_sym(Sym::LeftParen)?;
        let (low, high) = ranges[0];
        let count = (high - low + 1).max(0);
        if count == 0 {
            return Err(unexpected(&open, "empty array range"));
        }
        for i in 0..count {
            if i > 0 && !self.stream.match_sym(Sym::Comma)? {
                return Err(PascalError::at(
                    "array initializer count mismatch",
                    "",
                    open.line,
                ));
            }
            if ranges.len() > 1 {
                self.parse_array_initializer(&ranges[1..], elem, data)?;
            } else {
                self.parse_initializer_into(elem, data)?;
            }
        }
        self.stream.expect_sym(Sym::RightParen).map_err(|_| {
            PascalError::at("array initializer count mismatch", "", open.line)
        })?;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConstOp {
    Add,
    Sub,
    Mul,
    Divide,
    Div,
    Mod,
}

/// Classify a number literal: integral values are integers, everything
/// else is real.
pub(super) fn number_literal(token: &Token) -> PascalResult<(Value, TypeId)> {
    let parsed: f64 = token
        .text
        .parse()
        .map_err(|_| unexpected(token, "invalid number"))?;
    if parsed.fract() == 0.0 && parsed.abs() <= i32::MAX as f64 {
        Ok((Value::Int(parsed as i32), TYPE_INTEGER))
    } else {
        Ok((Value::Real(parsed), TYPE_REAL))
    }
}

/// Single-character string literals are chars.
pub(super) fn string_literal_type(token: &Token) -> TypeId {
    use super::super::types::{TYPE_CHAR, TYPE_STRING};
    if token.text.chars().count() == 1 {
        TYPE_CHAR
    } else {
        TYPE_STRING
    }
}

/// Fold one constant binary operation. `div` and `mod` stay integral,
/// `/` always goes real, the rest follow the operands.
fn const_arith(
    token: &Token,
    op: ConstOp,
    lhs: Value,
    _lty: TypeId,
    rhs: Value,
    _rty: TypeId,
) -> PascalResult<(Value, TypeId)> {
    let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Real(_));
    if !numeric(&lhs) || !numeric(&rhs) {
        return Err(unexpected(token, "constant arithmetic needs numbers"));
    }

    match op {
        ConstOp::Div | ConstOp::Mod => {
            let (l, r) = (lhs.as_int()?, rhs.as_int()?);
            if r == 0 {
                return Err(unexpected(token, "division by zero in constant"));
            }
            let value = match op {
                ConstOp::Div => l.wrapping_div(r),
                _ => l.wrapping_rem(r),
            };
            Ok((Value::Int(value), TYPE_INTEGER))
        }
        ConstOp::Divide => {
            let (l, r) = (lhs.as_real()?, rhs.as_real()?);
            Ok((Value::Real(l / r), TYPE_REAL))
        }
        ConstOp::Add | ConstOp::Sub | ConstOp::Mul => {
            if let (Value::Int(l), Value::Int(r)) = (&lhs, &rhs) {
                let value = match op {
                    ConstOp::Add => l.wrapping_add(*r),
                    ConstOp::Sub => l.wrapping_sub(*r),
                    _ => l.wrapping_mul(*r),
                };
                Ok((Value::Int(value), TYPE_INTEGER))
            } else {
                let (l, r) = (lhs.as_real()?, rhs.as_real()?);
                let value = match op {
                    ConstOp::Add => l + r,
                    ConstOp::Sub => l - r,
                    _ => l * r,
                };
                Ok((Value::Real(value), TYPE_REAL))
            }
        }
    }
}
