//! The `__builtin__` module: native types, constants and procedures
//! every program gets without a `uses` clause.
use itertools::Itertools;
use rand::prelude::*;

use crate::error::{PascalError, PascalResult};
use crate::machine::Ctl;
use crate::native::{Module, ModuleCtx};
use crate::value::Value;

use crate::compiler::types::{
    TYPE_ADDRESS, TYPE_ANY, TYPE_BOOLEAN, TYPE_CHAR, TYPE_INTEGER, TYPE_REAL, TYPE_STRING,
    TYPE_VOID,
};

pub const MODULE_NAME: &str = "__builtin__";

pub fn module() -> Module {
    Module {
        name: MODULE_NAME.into(),
        install,
    }
}

#[rustfmt::skip]
pub fn install(ctx: &mut ModuleCtx) -> PascalResult<()> {
    // Native types. The short and long integer flavours all share one
    // word-sized integer; Double shares Real.
    ctx.add_type("String",   TYPE_STRING)?;
    ctx.add_type("Integer",  TYPE_INTEGER)?;
    ctx.add_type("ShortInt", TYPE_INTEGER)?;
    ctx.add_type("LongInt",  TYPE_INTEGER)?;
    ctx.add_type("Char",     TYPE_CHAR)?;
    ctx.add_type("Boolean",  TYPE_BOOLEAN)?;
    ctx.add_type("Real",     TYPE_REAL)?;
    ctx.add_type("Double",   TYPE_REAL)?;
    ctx.add_type("Pointer",  TYPE_ADDRESS)?;

    ctx.add_const("Nil",   TYPE_ADDRESS, Value::Int(0))?;
    ctx.add_const("True",  TYPE_BOOLEAN, Value::Bool(true))?;
    ctx.add_const("False", TYPE_BOOLEAN, Value::Bool(false))?;
    ctx.add_const("Pi",    TYPE_REAL,    Value::Real(std::f64::consts::PI))?;

    // Numeric functions.
    ctx.add_native("Sin",    TYPE_REAL, &[("x", TYPE_REAL, false)], nat_sin)?;
    ctx.add_native("Cos",    TYPE_REAL, &[("x", TYPE_REAL, false)], nat_cos)?;
    ctx.add_native("ArcTan", TYPE_REAL, &[("x", TYPE_REAL, false)], nat_arctan)?;
    ctx.add_native("Exp",    TYPE_REAL, &[("x", TYPE_REAL, false)], nat_exp)?;
    ctx.add_native("Ln",     TYPE_REAL, &[("x", TYPE_REAL, false)], nat_ln)?;
    ctx.add_native("Sqrt",   TYPE_REAL, &[("x", TYPE_REAL, false)], nat_sqrt)?;
    ctx.add_native("Sqr",    TYPE_REAL, &[("x", TYPE_REAL, false)], nat_sqr)?;
    ctx.add_native("Frac",   TYPE_REAL, &[("x", TYPE_REAL, false)], nat_frac)?;
    ctx.add_native("Int",    TYPE_REAL, &[("x", TYPE_REAL, false)], nat_int)?;
    ctx.add_native("Round",  TYPE_INTEGER, &[("x", TYPE_REAL, false)], nat_round)?;
    ctx.add_native("Trunc",  TYPE_INTEGER, &[("x", TYPE_REAL, false)], nat_trunc)?;
    ctx.add_native("Odd",    TYPE_BOOLEAN, &[("n", TYPE_INTEGER, false)], nat_odd)?;
    // The parser rewrites Abs calls to return the argument's own type.
    ctx.add_native("Abs",    TYPE_REAL, &[("x", TYPE_REAL, false)], nat_abs)?;
    // Declared parameterless; a call with one argument returns integer.
    ctx.add_native("Random", TYPE_REAL, &[], nat_random)?;
    ctx.add_native("Randomize", TYPE_VOID, &[], nat_randomize)?;

    // Chars and strings.
    ctx.add_native("Chr",    TYPE_CHAR, &[("n", TYPE_INTEGER, false)], nat_chr)?;
    ctx.add_native("Ord",    TYPE_INTEGER, &[("c", TYPE_ANY, false)], nat_ord)?;
    ctx.add_native("Length", TYPE_INTEGER, &[("s", TYPE_STRING, false)], nat_length)?;
    ctx.add_native("UpCase", TYPE_CHAR, &[("c", TYPE_CHAR, false)], nat_upcase)?;

    // Procedures. Inc and Dec default a missing delta to 1 at the
    // call site.
    ctx.add_native("Inc", TYPE_VOID,
        &[("x", TYPE_INTEGER, true), ("delta", TYPE_INTEGER, false)], nat_inc)?;
    ctx.add_native("Dec", TYPE_VOID,
        &[("x", TYPE_INTEGER, true), ("delta", TYPE_INTEGER, false)], nat_dec)?;
    ctx.add_variadic("Write",   TYPE_VOID, nat_write)?;
    ctx.add_variadic("WriteLn", TYPE_VOID, nat_writeln)?;
    ctx.add_native("Halt",  TYPE_VOID, &[], nat_halt)?;
    ctx.add_native("Delay", TYPE_VOID, &[("ms", TYPE_INTEGER, false)], nat_delay)?;

    // Heap. New's size argument is hidden; the parser inserts it from
    // the pointee type of the actual argument.
    ctx.add_native("New", TYPE_VOID,
        &[("p", TYPE_ADDRESS, true), ("size", TYPE_INTEGER, false)], nat_new)?;
    ctx.add_native("GetMem", TYPE_VOID,
        &[("p", TYPE_ADDRESS, true), ("size", TYPE_INTEGER, false)], nat_new)?;
    ctx.add_native("Dispose", TYPE_VOID, &[("p", TYPE_ADDRESS, true)], nat_dispose)?;

    // Keyboard.
    ctx.add_native("KeyPressed", TYPE_BOOLEAN, &[], nat_keypressed)?;
    ctx.add_native("ReadKey",    TYPE_CHAR, &[], nat_readkey)?;

    Ok(())
}

fn arg(args: &[Value], index: usize) -> PascalResult<&Value> {
    args.get(index)
        .ok_or_else(|| PascalError::new("missing native argument"))
}

// ------------------------------------------------------------------------
// Numerics

fn nat_sin(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.sin())))
}

fn nat_cos(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.cos())))
}

fn nat_arctan(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.atan())))
}

fn nat_exp(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.exp())))
}

fn nat_ln(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.ln())))
}

fn nat_sqrt(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.sqrt())))
}

fn nat_sqr(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let x = arg(args, 0)?.as_real()?;
    Ok(Some(Value::Real(x * x)))
}

fn nat_frac(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.fract())))
}

fn nat_int(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Real(arg(args, 0)?.as_real()?.trunc())))
}

fn nat_round(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Int(arg(args, 0)?.as_real()?.round() as i32)))
}

fn nat_trunc(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Int(arg(args, 0)?.as_real()?.trunc() as i32)))
}

fn nat_odd(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(Some(Value::Bool(arg(args, 0)?.as_int()? & 1 != 0)))
}

/// Integer in, integer out; the parser keeps the argument uncast.
fn nat_abs(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let value = match arg(args, 0)? {
        Value::Int(i) => Value::Int(i.wrapping_abs()),
        other => Value::Real(other.as_real()?.abs()),
    };
    Ok(Some(value))
}

/// `Random` yields a real in [0, 1); `Random(n)` an integer in [0, n).
fn nat_random(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let mut rng = thread_rng();
    let value = match args.first() {
        None => Value::Real(rng.gen::<f64>()),
        Some(bound) => {
            let n = bound.as_int()?;
            if n <= 0 {
                Value::Int(0)
            } else {
                Value::Int(rng.gen_range(0..n))
            }
        }
    };
    Ok(Some(value))
}

/// The RNG is host-seeded; nothing to do.
fn nat_randomize(_ctl: &mut Ctl, _args: &[Value]) -> PascalResult<Option<Value>> {
    Ok(None)
}

// ------------------------------------------------------------------------
// Chars and strings

fn nat_chr(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let code = arg(args, 0)?.as_int()?;
    let c = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| PascalError::new(format!("invalid character code {code}")))?;
    Ok(Some(Value::string(c.to_string())))
}

fn nat_ord(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let value = match arg(args, 0)? {
        Value::Int(i) => *i,
        Value::Bool(b) => *b as i32,
        Value::Str(s) => match s.chars().next() {
            Some(c) => c as i32,
            None => 0,
        },
        other => return Err(PascalError::new(format!("Ord: not an ordinal: {other}"))),
    };
    Ok(Some(Value::Int(value)))
}

fn nat_length(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let s = arg(args, 0)?.as_str()?;
    Ok(Some(Value::Int(s.chars().count() as i32)))
}

fn nat_upcase(_ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let s = arg(args, 0)?.as_str()?;
    Ok(Some(Value::string(s.to_ascii_uppercase())))
}

// ------------------------------------------------------------------------
// Procedures

fn nat_inc(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let addr = arg(args, 0)?.as_addr()?;
    let delta = arg(args, 1)?.as_int()?;
    let current = ctl.read_dstore(addr)?.as_int()?;
    ctl.write_dstore(addr, Value::Int(current.wrapping_add(delta)))?;
    Ok(None)
}

fn nat_dec(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let addr = arg(args, 0)?.as_addr()?;
    let delta = arg(args, 1)?.as_int()?;
    let current = ctl.read_dstore(addr)?.as_int()?;
    ctl.write_dstore(addr, Value::Int(current.wrapping_sub(delta)))?;
    Ok(None)
}

fn nat_write(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    ctl.write(&args.iter().join(""));
    Ok(None)
}

fn nat_writeln(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    ctl.writeln(&args.iter().join(""));
    Ok(None)
}

fn nat_halt(ctl: &mut Ctl, _args: &[Value]) -> PascalResult<Option<Value>> {
    ctl.stop();
    Ok(None)
}

fn nat_delay(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let ms = arg(args, 0)?.as_int()?.max(0) as u64;
    ctl.delay(ms);
    Ok(None)
}

/// Shared by `New` and `GetMem`: allocate and store the block address
/// through the by-reference pointer argument.
fn nat_new(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let var_addr = arg(args, 0)?.as_addr()?;
    let words = arg(args, 1)?.as_int()?.max(0) as usize;
    let block = ctl.malloc(words)?;
    ctl.write_dstore(var_addr, Value::Int(block as i32))?;
    Ok(None)
}

fn nat_dispose(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let var_addr = arg(args, 0)?.as_addr()?;
    let block = ctl.read_dstore(var_addr)?.as_addr()?;
    if block != 0 {
        ctl.free(block)?;
    }
    ctl.write_dstore(var_addr, Value::Int(0))?;
    Ok(None)
}

// ------------------------------------------------------------------------
// Keyboard

fn nat_keypressed(ctl: &mut Ctl, _args: &[Value]) -> PascalResult<Option<Value>> {
    let pressed = ctl.key_pressed();
    Ok(Some(Value::Bool(pressed)))
}

fn nat_readkey(ctl: &mut Ctl, _args: &[Value]) -> PascalResult<Option<Value>> {
    let c = ctl.read_key().unwrap_or('\0');
    Ok(Some(Value::string(c.to_string())))
}
