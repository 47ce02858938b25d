//! Machine-level invariants: load layout, stepping, halting, heap
//! behaviour and runtime errors.
use std::cell::RefCell;
use std::rc::Rc;

use pascal::constants::DSTORE_SIZE;
use pascal::{Bytecode, Machine, NativeRegistry, NullHost, StepOutcome, Value};

fn machine(source: &str) -> Machine {
    let code = pascal::compile(source).expect("compile");
    Machine::new(code, Box::new(NullHost))
}

#[test]
fn test_load_layout() {
    // Two typed-constant words land at the bottom of the data store;
    // sp sits just past them, np at the top.
    let m = machine(
        "program P;
         const A: array [1..2] of Integer = (7, 9);
         begin end.",
    );
    assert_eq!(m.sp(), 2);
    assert_eq!(m.np(), DSTORE_SIZE);
    assert_eq!(m.dstore(0), Some(&Value::Int(7)));
    assert_eq!(m.dstore(1), Some(&Value::Int(9)));
}

#[test]
fn test_stack_never_meets_heap() {
    let mut m = machine(
        "program P;
         var p: ^Integer; i: Integer;
         function Fib(n: Integer): Integer;
         begin
           if n < 2 then Fib := n else Fib := Fib(n - 1) + Fib(n - 2)
         end;
         begin
           for i := 1 to 10 do New(p);
           p^ := Fib(12)
         end.",
    );
    loop {
        match m.step(64).expect("step") {
            StepOutcome::Halted => break,
            _ => assert!(m.sp() <= m.np(), "stack ran into the heap"),
        }
    }
}

#[test]
fn test_frames_unwind_completely() {
    // Every MST/CUP is matched by an RTN that restores the caller's
    // registers; with no typed constants the main frame starts at 0,
    // so after the final return sp and mp are back to 0.
    let mut m = machine(
        "program P;
         var i: Integer;
         procedure Noop(a, b: Integer);
         var t: Integer;
         begin
           t := a + b
         end;
         begin
           for i := 1 to 5 do Noop(i, i)
         end.",
    );
    let mut max_sp = 0;
    loop {
        match m.step(1).expect("step") {
            StepOutcome::Halted => break,
            _ => max_sp = max_sp.max(m.sp()),
        }
    }
    assert!(max_sp > 0, "calls grew the stack");
    assert_eq!(m.sp(), 0);
    assert_eq!(m.mp(), 0);
}

#[test]
fn test_malloc_free_restores_heap_bottom() {
    let mut m = machine(
        "program P;
         var p: ^Integer;
         begin
           New(p);
           Dispose(p)
         end.",
    );
    m.run().unwrap();
    assert_eq!(m.np(), DSTORE_SIZE);
}

#[test]
fn test_free_above_heap_bottom_is_noop() {
    // q is released while p still sits below it; the heap cannot
    // shrink past p, so np only recovers p's block after p goes too.
    let mut m = machine(
        "program P;
         var p, q: ^Integer;
         begin
           New(p);
           New(q);
           Dispose(p);
           Dispose(q)
         end.",
    );
    m.run().unwrap();
    // p's two words (size tag + block) stay leaked; q's were at the
    // bottom and came back.
    assert_eq!(m.np(), DSTORE_SIZE - 2);
}

#[test]
fn test_step_budget_returns_running() {
    let mut m = machine(
        "program P;
         var i, s: Integer;
         begin
           s := 0;
           for i := 1 to 10000 do s := s + 1
         end.",
    );
    assert_eq!(m.step(10).unwrap(), StepOutcome::Running);
    assert_eq!(m.step(10).unwrap(), StepOutcome::Running);
}

#[test]
fn test_delay_surfaces_between_batches() {
    let mut m = machine("program P; begin Delay(25); WriteLn('x') end.");
    m.set_output_callback(|_| {});
    let mut saw_delay = false;
    loop {
        match m.step(1000).unwrap() {
            StepOutcome::NeedsDelay(ms) => {
                assert_eq!(ms, 25);
                saw_delay = true;
            }
            StepOutcome::Halted => break,
            StepOutcome::Running => {}
        }
    }
    assert!(saw_delay);
}

#[test]
fn test_stop_is_idempotent() {
    let fired = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&fired);

    let mut m = machine(
        "program P;
         var i, s: Integer;
         begin
           s := 0;
           for i := 1 to 100000 do s := s + 1
         end.",
    );
    m.set_finish_callback(move |_elapsed| *counter.borrow_mut() += 1);

    m.step(10).unwrap();
    m.stop();
    m.stop();
    assert_eq!(m.step(10).unwrap(), StepOutcome::Halted);
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn test_divide_by_zero_fires_finish() {
    let fired = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&fired);

    let mut m = machine(
        "program P;
         var z: Integer;
         begin
           z := 0;
           WriteLn(10 div z)
         end.",
    );
    m.set_finish_callback(move |_elapsed| *counter.borrow_mut() += 1);

    let err = m.run().unwrap_err();
    assert!(err.message().contains("division by zero"), "got: {err}");
    assert_eq!(*fired.borrow(), 1);
    // The machine is stopped; further stepping is a no-op.
    assert_eq!(m.step(1).unwrap(), StepOutcome::Halted);
}

#[test]
fn test_modulo_by_zero() {
    let mut m = machine(
        "program P;
         var z: Integer;
         begin
           z := 0;
           WriteLn(10 mod z)
         end.",
    );
    let err = m.run().unwrap_err();
    assert!(err.message().contains("modulo by zero"), "got: {err}");
}

#[test]
fn test_unbounded_recursion_exhausts_stack() {
    let fired = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&fired);

    // No base case: frames pile up until the stack meets the heap.
    let mut m = machine(
        "program P;
         procedure Dive(n: Integer);
         begin
           Dive(n + 1)
         end;
         begin
           Dive(0)
         end.",
    );
    m.set_finish_callback(move |_elapsed| *counter.borrow_mut() += 1);

    let err = m.run().unwrap_err();
    assert!(err.message().contains("stack overflow"), "got: {err}");
    assert_eq!(*fired.borrow(), 1);
    assert_eq!(m.step(1).unwrap(), StepOutcome::Halted);
}

#[test]
fn test_unknown_opcode_stops_machine() {
    let fired = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&fired);

    // Hand-built image whose only instruction word carries an opcode
    // byte the machine has never heard of.
    let mut code = Bytecode::new(Rc::new(NativeRegistry::new()));
    code.istore.push(0xFE);
    code.start_address = 0;

    let mut m = Machine::new(code, Box::new(NullHost));
    m.set_finish_callback(move |_elapsed| *counter.borrow_mut() += 1);

    let err = m.run().unwrap_err();
    assert!(err.message().contains("unknown opcode"), "got: {err}");
    assert_eq!(*fired.borrow(), 1);
    assert_eq!(m.step(1).unwrap(), StepOutcome::Halted);
}

#[test]
fn test_dangling_heap_address_rejected() {
    let mut m = machine(
        "program P;
         var p, q: ^Integer;
         begin
           New(p);
           q := p;
           Dispose(p);
           WriteLn(q^)
         end.",
    );
    m.set_output_callback(|_| {});
    let err = m.run().unwrap_err();
    assert!(err.message().contains("invalid data address"), "got: {err}");
}

#[test]
fn test_debug_callback_receives_disassembly() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lines);

    let mut m = machine("program P; begin WriteLn('hi') end.");
    m.set_output_callback(|_| {});
    m.set_debug_callback(move |line| sink.borrow_mut().push(line.to_string()));
    m.run().unwrap();

    let lines = lines.borrow();
    assert!(!lines.is_empty());
    // Execution starts at the entry epilogue: a mark, the call, halt.
    assert!(lines[0].contains("MST"), "got: {}", lines[0]);
    assert!(lines.iter().any(|l| l.contains("CSP")));
    assert!(lines.last().unwrap().contains("STP"));
}

#[test]
fn test_elapsed_time_reported() {
    let elapsed = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&elapsed);

    let mut m = machine("program P; begin end.");
    m.set_finish_callback(move |time| *slot.borrow_mut() = Some(time));
    m.run().unwrap();

    assert!(elapsed.borrow().is_some());
}
