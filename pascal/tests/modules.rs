//! Pluggable host modules imported with `uses`.
use std::cell::RefCell;
use std::rc::Rc;

use pascal::{
    compile_with, Ctl, Machine, Module, ModuleCtx, ModuleRegistry, NullHost, PascalResult, Value,
};

fn beep(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let times = args[0].as_int()?;
    for _ in 0..times {
        ctl.writeln("beep");
    }
    Ok(None)
}

fn double_it(ctl: &mut Ctl, args: &[Value]) -> PascalResult<Option<Value>> {
    let addr = args[0].as_addr()?;
    let value = ctl.read_dstore(addr)?.as_int()?;
    ctl.write_dstore(addr, Value::Int(value * 2))?;
    Ok(None)
}

fn install_speaker(ctx: &mut ModuleCtx) -> PascalResult<()> {
    use pascal::compiler::types::{TYPE_INTEGER, TYPE_VOID};
    ctx.add_const("MaxBeeps", TYPE_INTEGER, Value::Int(3))?;
    ctx.add_native("Beep", TYPE_VOID, &[("times", TYPE_INTEGER, false)], beep)?;
    ctx.add_native(
        "DoubleIt",
        TYPE_VOID,
        &[("n", TYPE_INTEGER, true)],
        double_it,
    )?;
    Ok(())
}

fn registry() -> ModuleRegistry {
    let mut modules = ModuleRegistry::new();
    modules.add(Module {
        name: "speaker".into(),
        install: install_speaker,
    });
    modules
}

#[test]
fn test_uses_imports_module_natives() {
    let source = "
        program P;
        uses speaker;
        var n: Integer;
        begin
          Beep(MaxBeeps - 1);
          n := 5;
          DoubleIt(n);
          WriteLn(n)
        end.";
    let code = compile_with(source, &registry()).expect("compile");
    let mut machine = Machine::new(code, Box::new(NullHost));
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&out);
    machine.set_output_callback(move |line| sink.borrow_mut().push(line.to_string()));
    machine.run().unwrap();
    assert_eq!(out.borrow().as_slice(), ["beep", "beep", "10"]);
}

#[test]
fn test_module_names_are_case_insensitive() {
    let source = "program P; uses SPEAKER; begin Beep(1) end.";
    assert!(compile_with(source, &registry()).is_ok());
}
