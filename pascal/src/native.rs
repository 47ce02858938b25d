//! Host interface and native procedure registry.
use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::compiler::symbol::{ScopeId, Symbol, SymbolKind, SymbolTable};
use crate::compiler::types::{Param, TypeId, TypeNode, TypeTable};
use crate::error::{PascalError, PascalResult};
use crate::machine::Ctl;
use crate::value::Value;

/// Hooks the embedding host provides to the machine. Output goes
/// through the machine's output callback; these cover the input side.
pub trait Host {
    /// Whether a key is waiting without blocking.
    fn key_pressed(&mut self) -> bool;
    /// Dequeue one key, if any.
    fn read_key(&mut self) -> Option<char>;
}

/// Host with no keyboard.
pub struct NullHost;

impl Host for NullHost {
    fn key_pressed(&mut self) -> bool {
        false
    }

    fn read_key(&mut self) -> Option<char> {
        None
    }
}

/// A native procedure body. Arguments arrive fully popped, in source
/// order; by-reference parameters arrive as data-store addresses to be
/// read and written through the control handle. A `Some` return value
/// is pushed for the caller.
pub type NativeFn = fn(&mut Ctl, &[Value]) -> PascalResult<Option<Value>>;

pub struct NativeProcedure {
    pub name: SmolStr,
    pub ret: TypeId,
    pub params: Vec<Param>,
    /// Accepts any number of arguments (`Write`/`WriteLn`); the `CSP`
    /// operand carries the actual count.
    pub variadic: bool,
    pub fun: NativeFn,
}

/// Ordered table of host-provided callables. The registration index is
/// stored on the symbol and emitted as the `CSP` operand.
#[derive(Default)]
pub struct NativeRegistry {
    procs: Vec<Rc<NativeProcedure>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, proc: NativeProcedure) -> u32 {
        self.procs.push(Rc::new(proc));
        (self.procs.len() - 1) as u32
    }

    pub fn get(&self, index: u32) -> Option<Rc<NativeProcedure>> {
        self.procs.get(index as usize).map(Rc::clone)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}

/// A named host module importable with `uses`. The built-in module is
/// installed up front; everything else (a `crt`, a `graph`) is plugged
/// in by the embedder through a [`ModuleRegistry`].
pub struct Module {
    pub name: SmolStr,
    pub install: fn(&mut ModuleCtx) -> PascalResult<()>,
}

#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<SmolStr, Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: Module) {
        let key: SmolStr = module.name.to_ascii_lowercase().into();
        self.modules.insert(key, module);
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        let key = name.to_ascii_lowercase();
        self.modules.get(key.as_str())
    }
}

/// Registration surface handed to a module installer: the symbol table
/// scope being imported into, the type table, and the native registry
/// shared by the whole compilation.
pub struct ModuleCtx<'a> {
    pub syms: &'a mut SymbolTable,
    pub scope: ScopeId,
    pub types: &'a mut TypeTable,
    pub natives: &'a mut NativeRegistry,
}

impl ModuleCtx<'_> {
    pub fn add_type(&mut self, name: &str, ty: TypeId) -> PascalResult<()> {
        self.syms.declare_type(self.scope, name, ty)
    }

    pub fn add_const(&mut self, name: &str, ty: TypeId, value: Value) -> PascalResult<()> {
        self.syms
            .declare(
                self.scope,
                Symbol {
                    name: name.into(),
                    kind: SymbolKind::Const,
                    ty,
                    address: 0,
                    native: false,
                    by_ref: false,
                    value: Some(value),
                },
                0,
            )
            .map(|_| ())
    }

    /// Register a native and declare its symbol. Parameters are
    /// `(name, type, by_ref)` tuples; a `by_ref` parameter is passed as
    /// an address.
    pub fn add_native(
        &mut self,
        name: &str,
        ret: TypeId,
        params: &[(&str, TypeId, bool)],
        fun: NativeFn,
    ) -> PascalResult<()> {
        self.add_native_inner(name, ret, params, false, fun)
    }

    /// Variant accepting any argument count.
    pub fn add_variadic(&mut self, name: &str, ret: TypeId, fun: NativeFn) -> PascalResult<()> {
        self.add_native_inner(name, ret, &[], true, fun)
    }

    fn add_native_inner(
        &mut self,
        name: &str,
        ret: TypeId,
        params: &[(&str, TypeId, bool)],
        variadic: bool,
        fun: NativeFn,
    ) -> PascalResult<()> {
        let params: Vec<Param> = params
            .iter()
            .map(|(name, ty, by_ref)| Param {
                name: SmolStr::from(*name),
                ty: *ty,
                by_ref: *by_ref,
            })
            .collect();

        let index = self.natives.register(NativeProcedure {
            name: name.into(),
            ret,
            params: params.clone(),
            variadic,
            fun,
        });

        let ty = self.types.add(TypeNode::Subprogram { params, ret });
        self.syms
            .declare(
                self.scope,
                Symbol {
                    name: name.into(),
                    kind: SymbolKind::Subprogram,
                    ty,
                    address: index,
                    native: true,
                    by_ref: false,
                    value: None,
                },
                0,
            )
            .map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::types::{TYPE_INTEGER, TYPE_VOID};

    fn nop(_ctl: &mut Ctl, _args: &[Value]) -> PascalResult<Option<Value>> {
        Ok(None)
    }

    #[test]
    fn test_registration_assigns_sequential_indices() {
        let mut syms = SymbolTable::new();
        let mut types = TypeTable::new();
        let mut natives = NativeRegistry::new();
        let scope = syms.root();
        let mut ctx = ModuleCtx {
            syms: &mut syms,
            scope,
            types: &mut types,
            natives: &mut natives,
        };

        ctx.add_native("First", TYPE_VOID, &[], nop).unwrap();
        ctx.add_native("Second", TYPE_INTEGER, &[("n", TYPE_INTEGER, false)], nop)
            .unwrap();

        let first = syms.lookup(syms.root(), "first").unwrap();
        let second = syms.lookup(syms.root(), "SECOND").unwrap();
        assert_eq!(syms.symbol(first.symbol).address, 0);
        assert_eq!(syms.symbol(second.symbol).address, 1);
        assert!(syms.symbol(second.symbol).native);
        assert_eq!(natives.get(1).unwrap().name, "Second");
        assert!(natives.get(2).is_none());
    }
}
