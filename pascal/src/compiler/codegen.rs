//! Code generator: annotated tree to p-code.
//!
//! One depth-first pass. Nested subprograms are emitted before their
//! parent binds its own entry address, so every call site a body can
//! legally reach already knows its target. `exit` statements emit
//! unconditional jumps that get patched to the subprogram's `RTN` once
//! it is placed.
use std::rc::Rc;

use log::debug;

use crate::bytecode::{encode, Bytecode, Op};
use crate::error::{PascalError, PascalResult};
use crate::value::Value;

use super::ast::{BinaryOp, Expr, ExprKind, Stmt, Subprogram, UnaryOp};
use super::parser::Ast;
use super::symbol::{SymbolKind, SymbolLookup, SymbolTable};
use super::types::{CastKind, SimpleType, TypeId, TypeNode, TypeTable, TYPE_CHAR, TYPE_VOID};

pub fn generate(ast: Ast) -> PascalResult<Bytecode> {
    let Ast {
        program,
        syms,
        types,
        natives,
    } = ast;
    let mut gen = CodeGen {
        syms,
        types,
        code: Bytecode::new(Rc::new(natives)),
        exit_fixups: vec![],
    };

    gen.compile_subprogram(&program.main)?;

    // Entry epilogue: call the program body, then halt.
    let start = gen.here();
    gen.code.start_address = start;
    let main_addr = gen.syms.symbol(program.main.symbol).address;
    gen.code
        .comments
        .insert(main_addr as usize, format!("program {}", program.name));
    gen.code
        .comments
        .insert(start, format!("entry {}", program.name));
    gen.emit(Op::Mst, 0, 0)?;
    gen.emit(Op::Cup, 0, main_addr)?;
    gen.emit(Op::Stp, 0, 0)?;

    debug!("generated {} instructions", gen.code.istore.len());
    Ok(gen.code)
}

struct CodeGen {
    syms: SymbolTable,
    types: TypeTable,
    code: Bytecode,
    /// Addresses of `exit` jumps per open subprogram.
    exit_fixups: Vec<Vec<usize>>,
}

impl CodeGen {
    fn here(&self) -> usize {
        self.code.istore.len()
    }

    fn emit(&mut self, op: Op, a: u32, b: u32) -> PascalResult<usize> {
        let addr = self.here();
        let word = encode(op, a, b)?;
        self.code.istore.push(word);
        Ok(addr)
    }

    fn patch_jump(&mut self, addr: usize, op: Op, target: usize) -> PascalResult<()> {
        self.code.istore[addr] = encode(op, 0, target as u32)?;
        Ok(())
    }

    // --------------------------------------------------------------------
    // Subprograms

    fn compile_subprogram(&mut self, sub: &Subprogram) -> PascalResult<()> {
        for nested in &sub.block.subprograms {
            self.compile_subprogram(nested)?;
        }

        let entry = self.here();
        self.syms.symbol_mut(sub.symbol).address = entry as u32;
        let what = if sub.ret == TYPE_VOID {
            "procedure"
        } else {
            "function"
        };
        self.code
            .comments
            .insert(entry, format!("{what} {}", sub.name));

        let frame = self.syms.frame_size(sub.scope);
        self.emit(Op::Ent, 0, frame)?;

        // Copy typed-constant initializers from the program image into
        // their frame slots, one word at a time.
        for tc in &sub.block.typed_consts {
            let base = self.syms.symbol(tc.symbol).address;
            for (i, value) in tc.data.values.iter().enumerate() {
                let blob = self.code.typed_constants.len();
                self.code.typed_constants.push(value.clone());
                self.emit(Op::Lda, 0, base + i as u32)?;
                let k = self.code.intern(Value::Int(blob as i32));
                self.emit(Op::Ldc, SimpleType::Address.code(), k as u32)?;
                self.emit(Op::Ldi, 0, 0)?;
                self.emit(Op::Sti, 0, 0)?;
            }
        }

        self.exit_fixups.push(vec![]);
        for stmt in &sub.block.body {
            self.compile_stmt(stmt)?;
        }

        let ret_code = self.types.code_of(sub.ret).code();
        let rtn = self.emit(Op::Rtn, ret_code, 0)?;
        for site in self.exit_fixups.pop().expect("fixup stack underflow") {
            self.patch_jump(site, Op::Ujp, rtn)?;
        }
        Ok(())
    }

    // --------------------------------------------------------------------
    // Statements

    fn compile_stmt(&mut self, stmt: &Stmt) -> PascalResult<()> {
        match stmt {
            Stmt::Empty => Ok(()),
            Stmt::Compound(stmts) => {
                for s in stmts {
                    self.compile_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Assign { target, value } => self.compile_assign(target, value),
            Stmt::Call(call) => self.compile_expr(call),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(cond)?;
                let skip = self.emit(Op::Fjp, 0, 0)?;
                self.compile_stmt(then_branch)?;
                match else_branch {
                    Some(els) => {
                        let over = self.emit(Op::Ujp, 0, 0)?;
                        let target = self.here();
                        self.patch_jump(skip, Op::Fjp, target)?;
                        self.compile_stmt(els)?;
                        let target = self.here();
                        self.patch_jump(over, Op::Ujp, target)?;
                    }
                    None => {
                        let target = self.here();
                        self.patch_jump(skip, Op::Fjp, target)?;
                    }
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                let top = self.here();
                self.compile_expr(cond)?;
                let out = self.emit(Op::Fjp, 0, 0)?;
                self.compile_stmt(body)?;
                self.emit(Op::Ujp, 0, top as u32)?;
                let target = self.here();
                self.patch_jump(out, Op::Fjp, target)?;
                Ok(())
            }
            Stmt::Repeat { body, until } => {
                let top = self.here();
                for s in body {
                    self.compile_stmt(s)?;
                }
                self.compile_expr(until)?;
                self.emit(Op::Fjp, 0, top as u32)?;
                Ok(())
            }
            Stmt::For {
                var,
                from,
                to,
                downto,
                body,
            } => self.compile_for(var, from, to, *downto, body),
            Stmt::Exit => {
                let site = self.emit(Op::Ujp, 0, 0)?;
                self.exit_fixups
                    .last_mut()
                    .expect("exit outside subprogram")
                    .push(site);
                Ok(())
            }
        }
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr) -> PascalResult<()> {
        let size = self.types.size_of(target.ty);
        if size == 1 {
            self.compile_address(target, 0)?;
            self.compile_expr(value)?;
            self.emit(Op::Sti, 0, 0)?;
        } else {
            // Word-by-word copy between two designators.
            for i in 0..size {
                self.compile_address(target, i)?;
                self.compile_address(value, i)?;
                self.emit(Op::Ldi, 0, 0)?;
                self.emit(Op::Sti, 0, 0)?;
            }
        }
        Ok(())
    }

    /// `for` lowering: assign the start value, then test against the
    /// bound at the top (leaving the loop once the variable passes it)
    /// and step the variable after each body run. The bound is
    /// re-evaluated every iteration.
    fn compile_for(
        &mut self,
        var: &Expr,
        from: &Expr,
        to: &Expr,
        downto: bool,
        body: &Stmt,
    ) -> PascalResult<()> {
        self.compile_address(var, 0)?;
        self.compile_expr(from)?;
        self.emit(Op::Sti, 0, 0)?;

        let top = self.here();
        self.compile_expr(var)?;
        self.compile_expr(to)?;
        let code = SimpleType::Integer.code();
        if downto {
            self.emit(Op::Les, code, 0)?;
        } else {
            self.emit(Op::Grt, code, 0)?;
        }
        let out = self.emit(Op::Tjp, 0, 0)?;

        self.compile_stmt(body)?;

        self.compile_address(var, 0)?;
        self.compile_expr(var)?;
        if downto {
            self.emit(Op::Dec, 0, 0)?;
        } else {
            self.emit(Op::Inc, 0, 0)?;
        }
        self.emit(Op::Sti, 0, 0)?;
        self.emit(Op::Ujp, 0, top as u32)?;

        let target = self.here();
        self.patch_jump(out, Op::Tjp, target)?;
        Ok(())
    }

    // --------------------------------------------------------------------
    // Expressions (rvalues)

    fn compile_expr(&mut self, expr: &Expr) -> PascalResult<()> {
        match &expr.kind {
            ExprKind::Int(i) => self.emit_ldc_value(&Value::Int(*i), expr.ty),
            ExprKind::Real(r) => self.emit_ldc_value(&Value::Real(*r), expr.ty),
            ExprKind::Bool(b) => self.emit_ldc_value(&Value::Bool(*b), expr.ty),
            ExprKind::Str(s) => self.emit_ldc_value(&Value::Str(Rc::clone(s)), expr.ty),
            ExprKind::Nil => {
                let k = self.code.intern(Value::Int(0));
                self.emit(Op::Ldc, SimpleType::Address.code(), k as u32)?;
                Ok(())
            }
            ExprKind::Ident(lookup) => self.compile_ident_read(lookup, expr),
            ExprKind::Index { .. } | ExprKind::Field { .. } | ExprKind::Deref(_) => {
                let size = self.types.size_of(expr.ty);
                for i in 0..size {
                    self.compile_address(expr, i)?;
                    self.emit(Op::Ldi, 0, 0)?;
                }
                Ok(())
            }
            ExprKind::AddrOf(inner) => self.compile_address(inner, 0),
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Not => Op::Not,
                    UnaryOp::Neg => {
                        if self.types.code_of(operand.ty) == SimpleType::Real {
                            Op::Ngr
                        } else {
                            Op::Ngi
                        }
                    }
                };
                self.emit(opcode, 0, 0)?;
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.compile_binary_op(*op, lhs, expr)
            }
            ExprKind::Call { lookup, args } => self.compile_call(lookup, args),
            ExprKind::Cast { kind, operand } => {
                self.compile_expr(operand)?;
                if *kind == CastKind::IntToReal {
                    self.emit(Op::Flt, 0, 0)?;
                }
                Ok(())
            }
        }
    }

    fn compile_binary_op(&mut self, op: BinaryOp, lhs: &Expr, expr: &Expr) -> PascalResult<()> {
        use BinaryOp as B;
        if op.is_comparison() {
            let code = self.types.code_of(lhs.ty).code();
            let opcode = match op {
                B::Eq => Op::Equ,
                B::NotEq => Op::Neq,
                B::Greater => Op::Grt,
                B::GreaterEq => Op::Geq,
                B::Less => Op::Les,
                B::LessEq => Op::Leq,
                _ => unreachable!(),
            };
            self.emit(opcode, code, 0)?;
            return Ok(());
        }

        let real = self.types.code_of(expr.ty) == SimpleType::Real;
        let opcode = match op {
            B::Add => {
                if real {
                    Op::Adr
                } else {
                    Op::Adi
                }
            }
            B::Sub => {
                if real {
                    Op::Sbr
                } else {
                    Op::Sbi
                }
            }
            B::Mul => {
                if real {
                    Op::Mpr
                } else {
                    Op::Mpi
                }
            }
            B::Divide => Op::Dvr,
            B::Div => Op::Dvi,
            B::Mod => Op::Mod,
            B::And => Op::And,
            B::Or => Op::Ior,
            _ => unreachable!("comparisons handled above"),
        };
        self.emit(opcode, 0, 0)?;
        Ok(())
    }

    fn compile_ident_read(&mut self, lookup: &SymbolLookup, expr: &Expr) -> PascalResult<()> {
        let sym = self.syms.symbol(lookup.symbol).clone();
        match sym.kind {
            SymbolKind::Const => {
                let value = sym.value.ok_or_else(|| {
                    PascalError::at("constant has no value", sym.name.clone(), expr.line)
                })?;
                self.emit_ldc_value(&value, sym.ty)
            }
            SymbolKind::Subprogram => Err(PascalError::at(
                "cannot read a subprogram as a value",
                sym.name.clone(),
                expr.line,
            )),
            _ => {
                let size = self.types.size_of(sym.ty);
                if sym.by_ref {
                    // The parameter slot holds an address; load through
                    // it, word by word for compounds.
                    for i in 0..size {
                        self.emit(Op::Lva, lookup.level, sym.address)?;
                        if i > 0 {
                            self.emit_ldc_int(i as i32)?;
                            self.emit(Op::Adi, 0, 0)?;
                        }
                        self.emit(Op::Ldi, 0, 0)?;
                    }
                } else if size == 1 {
                    let opcode = load_op(self.types.code_of(sym.ty));
                    self.emit(opcode, lookup.level, sym.address)?;
                } else {
                    // Large compound by value: word-by-word load.
                    for i in 0..size {
                        self.emit(Op::Lvi, lookup.level, sym.address + i)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn compile_call(&mut self, lookup: &SymbolLookup, args: &[Expr]) -> PascalResult<()> {
        let sym = self.syms.symbol(lookup.symbol).clone();
        let TypeNode::Subprogram { params, .. } = self.types.node(sym.ty).clone() else {
            return Err(PascalError::new(format!("'{}' is not callable", sym.name)));
        };

        if sym.native {
            for (i, arg) in args.iter().enumerate() {
                let by_ref = params.get(i).map(|p| p.by_ref).unwrap_or(false);
                if by_ref {
                    self.compile_address(arg, 0)?;
                } else {
                    self.compile_expr(arg)?;
                }
            }
            self.emit(Op::Csp, args.len() as u32, sym.address)?;
            return Ok(());
        }

        self.emit(Op::Mst, lookup.level, 0)?;
        let mut words = 0u32;
        for (arg, param) in args.iter().zip(&params) {
            if param.by_ref {
                self.compile_address(arg, 0)?;
                words += 1;
            } else {
                self.compile_expr(arg)?;
                words += self.types.size_of(param.ty);
            }
        }
        self.emit(Op::Cup, words, sym.address)?;
        Ok(())
    }

    // --------------------------------------------------------------------
    // Lvalues

    /// Push the address of a designator plus `extra` words. Constant
    /// field offsets fold into `extra`; array indexing computes
    /// `index - low` and scales by the dimension stride.
    fn compile_address(&mut self, expr: &Expr, extra: u32) -> PascalResult<()> {
        match &expr.kind {
            ExprKind::Ident(lookup) => {
                let sym = self.syms.symbol(lookup.symbol).clone();
                if sym.kind == SymbolKind::Subprogram {
                    // Assignment to the function result: slot 0 of the
                    // frame one static hop below the defining scope.
                    let level = lookup.level.checked_sub(1).ok_or_else(|| {
                        PascalError::at("cannot assign here", sym.name.clone(), expr.line)
                    })?;
                    self.emit(Op::Lda, level, extra)?;
                    return Ok(());
                }
                if sym.by_ref {
                    self.emit(Op::Lva, lookup.level, sym.address)?;
                    if extra > 0 {
                        self.emit_ldc_int(extra as i32)?;
                        self.emit(Op::Adi, 0, 0)?;
                    }
                } else {
                    self.emit(Op::Lda, lookup.level, sym.address + extra)?;
                }
                Ok(())
            }
            ExprKind::Field { base, offset } => self.compile_address(base, extra + offset),
            ExprKind::Index { base, indices } => {
                let TypeNode::Array { ranges, elem } = self.types.node(base.ty).clone() else {
                    return Err(PascalError::at("not an array", "", expr.line));
                };
                self.compile_address(base, extra)?;
                let elem_size = self.types.size_of(elem);
                for (dim, index) in indices.iter().enumerate() {
                    let inner: u32 = ranges[dim + 1..]
                        .iter()
                        .map(|(low, high)| (high - low + 1).max(0) as u32)
                        .product();
                    let stride = elem_size * inner;
                    self.compile_expr(index)?;
                    self.emit_ldc_int(ranges[dim].0)?;
                    self.emit(Op::Sbi, 0, 0)?;
                    self.emit(Op::Ixa, 0, stride)?;
                }
                Ok(())
            }
            ExprKind::Deref(pointer) => {
                self.compile_expr(pointer)?;
                if extra > 0 {
                    self.emit_ldc_int(extra as i32)?;
                    self.emit(Op::Adi, 0, 0)?;
                }
                Ok(())
            }
            ExprKind::Cast { kind, operand } if *kind == CastKind::NoOp => {
                self.compile_address(operand, extra)
            }
            _ => Err(PascalError::at("expression is not addressable", "", expr.line)),
        }
    }

    // --------------------------------------------------------------------
    // Constants

    fn emit_ldc_int(&mut self, value: i32) -> PascalResult<()> {
        let k = self.code.intern(Value::Int(value));
        self.emit(Op::Ldc, SimpleType::Integer.code(), k as u32)?;
        Ok(())
    }

    /// Booleans and small chars ride in the operand; everything else
    /// goes through the pool.
    fn emit_ldc_value(&mut self, value: &Value, ty: TypeId) -> PascalResult<()> {
        match value {
            Value::Bool(b) => {
                self.emit(Op::Ldc, SimpleType::Boolean.code(), *b as u32)?;
            }
            Value::Str(s) => {
                let only_char = s.chars().next().filter(|_| s.chars().count() == 1);
                match only_char {
                    Some(c) if ty == TYPE_CHAR && (c as u32) <= 0x7FFF => {
                        self.emit(Op::Ldc, SimpleType::Char.code(), c as u32)?;
                    }
                    _ => {
                        let k = self.code.intern(Value::Str(Rc::clone(s)));
                        self.emit(Op::Ldc, SimpleType::String.code(), k as u32)?;
                    }
                }
            }
            Value::Int(i) => {
                let code = if self.types.code_of(ty) == SimpleType::Address {
                    SimpleType::Address
                } else {
                    SimpleType::Integer
                };
                let k = self.code.intern(Value::Int(*i));
                self.emit(Op::Ldc, code.code(), k as u32)?;
            }
            Value::Real(r) => {
                let k = self.code.intern(Value::Real(*r));
                self.emit(Op::Ldc, SimpleType::Real.code(), k as u32)?;
            }
        }
        Ok(())
    }
}

fn load_op(code: SimpleType) -> Op {
    match code {
        SimpleType::Address => Op::Lva,
        SimpleType::Boolean => Op::Lvb,
        SimpleType::Char => Op::Lvc,
        SimpleType::Real => Op::Lvr,
        _ => Op::Lvi,
    }
}
