//! Type expressions.
use crate::error::{PascalError, PascalResult};

use super::super::{
    symbol::{Symbol, SymbolKind},
    token_stream::unexpected,
    tokens::{Sym, TokenKind, Word},
    types::{Field, TypeId, TypeNode, TYPE_SET},
};
use super::Parser;
use crate::value::Value;

impl Parser<'_> {
    /// One type expression: a type identifier, `array [..] of T`,
    /// `record .. end`, `set of T`, `^Name`, or an enumeration.
    pub(super) fn parse_type_expr(&mut self) -> PascalResult<TypeId> {
        let token = self.stream.peek()?.clone();
        match token.kind {
            TokenKind::Ident => {
                self.stream.next_token()?;
                self.syms
                    .lookup_type(self.scope(), &token.text)
                    .ok_or_else(|| unexpected(&token, "unknown type"))
            }
            TokenKind::Word(Word::Array) => self.parse_array_type(),
            TokenKind::Word(Word::Record) => self.parse_record_type(),
            TokenKind::Word(Word::Set) => {
                self.stream.next_token()?;
                self.stream.expect_word(Word::Of)?;
                // Set types declare storage only; no operations exist.
                self.parse_type_expr()?;
                Ok(TYPE_SET)
            }
            TokenKind::Sym(Sym::Caret) => self.parse_pointer_type(),
            TokenKind::Sym(Sym::LeftParen) => self.parse_enum_type(),
            _ => Err(unexpected(&token, "expected type")),
        }
    }

    /// `array [R1, R2, ...] of T`; each range is a pair of integer
    /// constant expressions.
    fn parse_array_type(&mut self) -> PascalResult<TypeId> {
        self.stream.expect_word(Word::Array)?;
        self.stream.expect_sym(Sym::LeftBracket)?;
        let mut ranges = vec![];
        loop {
            ranges.push(self.parse_range()?);
            if !self.stream.match_sym(Sym::Comma)? {
                break;
            }
        }
        self.stream.expect_sym(Sym::RightBracket)?;
        self.stream.expect_word(Word::Of)?;
        let elem = self.parse_type_expr()?;
        Ok(self.types.add(TypeNode::Array { ranges, elem }))
    }

    /// `low..high` with constant integer bounds.
    pub(super) fn parse_range(&mut self) -> PascalResult<(i32, i32)> {
        let low = self.parse_const_int()?;
        self.stream.expect_sym(Sym::DotDot)?;
        let high = self.parse_const_int()?;
        Ok((low, high))
    }

    /// `record F1; F2; ... end`. Fields are laid out sequentially; the
    /// offset of a field is the summed size of everything before it.
    fn parse_record_type(&mut self) -> PascalResult<TypeId> {
        self.stream.expect_word(Word::Record)?;
        let mut fields: Vec<Field> = vec![];
        let mut offset = 0u32;
        loop {
            if self.stream.match_word(Word::End)? {
                break;
            }
            let mut names = vec![self.stream.expect_ident()?];
            while self.stream.match_sym(Sym::Comma)? {
                names.push(self.stream.expect_ident()?);
            }
            self.stream.expect_sym(Sym::Colon)?;
            let ty = self.parse_type_expr()?;
            let size = self.types.size_of(ty);
            for name in names {
                if fields
                    .iter()
                    .any(|f| f.name.eq_ignore_ascii_case(&name.text))
                {
                    return Err(unexpected(&name, "duplicate field"));
                }
                fields.push(Field {
                    name: name.text.clone(),
                    ty,
                    offset,
                });
                offset += size;
            }
            if !self.stream.match_sym(Sym::Semicolon)? {
                self.stream.expect_word(Word::End)?;
                break;
            }
        }
        Ok(self.types.add(TypeNode::Record { fields }))
    }

    /// `^Name`. Inside a `type` section the name may not exist yet;
    /// such nodes are collected and back-patched when the section
    /// closes.
    fn parse_pointer_type(&mut self) -> PascalResult<TypeId> {
        self.stream.expect_sym(Sym::Caret)?;
        let name = self.stream.expect_ident()?;
        let pointee = self.syms.lookup_type(self.scope(), &name.text);
        if pointee.is_none() && !self.in_type_section {
            return Err(unexpected(&name, "unknown type"));
        }
        let id = self.types.add(TypeNode::Pointer {
            name: name.text.clone(),
            pointee,
        });
        if pointee.is_none() {
            self.pending_pointers.push((id, name));
        }
        Ok(id)
    }

    /// `(A, B, C)`: members become integer-valued constants of the
    /// enumeration type, declared in the current scope.
    fn parse_enum_type(&mut self) -> PascalResult<TypeId> {
        self.stream.expect_sym(Sym::LeftParen)?;
        let mut names = vec![];
        loop {
            names.push(self.stream.expect_ident()?);
            if !self.stream.match_sym(Sym::Comma)? {
                break;
            }
        }
        self.stream.expect_sym(Sym::RightParen)?;

        let id = self.types.add(TypeNode::Enum {
            names: names.iter().map(|t| t.text.clone()).collect(),
        });
        for (ordinal, token) in names.iter().enumerate() {
            let scope = self.scope();
            self.syms
                .declare(
                    scope,
                    Symbol {
                        name: token.text.clone(),
                        kind: SymbolKind::Const,
                        ty: id,
                        address: 0,
                        native: false,
                        by_ref: false,
                        value: Some(Value::Int(ordinal as i32)),
                    },
                    0,
                )
                .map_err(|err| self.attach(err, token))?;
        }
        Ok(id)
    }

    /// Resolve the `^Name` forward references a `type` section left
    /// open. Anything still unknown is an error.
    pub(super) fn close_type_section(&mut self) -> PascalResult<()> {
        let pending = std::mem::take(&mut self.pending_pointers);
        for (id, name) in pending {
            let Some(pointee) = self.syms.lookup_type(self.scope(), &name.text) else {
                return Err(unexpected(&name, "unresolved forward pointer"));
            };
            let TypeNode::Pointer {
                pointee: slot, ..
            } = self.types.node_mut(id)
            else {
                unreachable!("pending entries are pointer nodes");
            };
            *slot = Some(pointee);
        }
        Ok(())
    }

    /// A constant expression narrowed to an integer.
    pub(super) fn parse_const_int(&mut self) -> PascalResult<i32> {
        let line = self.stream.peek()?.line;
        let (value, _ty) = self.parse_const_expr()?;
        match value {
            Value::Int(i) => Ok(i),
            other => Err(PascalError::at(
                format!("expected integer constant, found {other}"),
                "",
                line,
            )),
        }
    }
}
