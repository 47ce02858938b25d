//! End-to-end programs: compile, run, check output.
use std::cell::RefCell;
use std::rc::Rc;

use pascal::{Machine, NullHost};

fn start(source: &str) -> (Machine, Rc<RefCell<Vec<String>>>) {
    let code = match pascal::compile(source) {
        Ok(code) => code,
        Err(err) => panic!("compile error: {err}"),
    };
    let mut machine = Machine::new(code, Box::new(NullHost));
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&out);
    machine.set_output_callback(move |line| sink.borrow_mut().push(line.to_string()));
    (machine, out)
}

fn run(source: &str) -> Vec<String> {
    let (mut machine, out) = start(source);
    if let Err(err) = machine.run() {
        panic!("runtime error: {err}");
    }
    let lines = out.borrow().clone();
    lines
}

#[test]
fn test_hello() {
    assert_eq!(run("program P; begin WriteLn('Hello') end."), vec!["Hello"]);
}

#[test]
fn test_for_loop_sum() {
    let source = "
        program P;
        var i: Integer; s: Integer;
        begin
          s := 0;
          for i := 1 to 10 do s := s + i;
          WriteLn(s)
        end.";
    assert_eq!(run(source), vec!["55"]);
}

#[test]
fn test_recursive_fibonacci() {
    let source = "
        program P;
        function F(n: Integer): Integer;
        begin
          if n < 2 then F := n else F := F(n - 1) + F(n - 2)
        end;
        begin
          WriteLn(F(10))
        end.";
    assert_eq!(run(source), vec!["55"]);
}

#[test]
fn test_pointer_new_dispose() {
    let source = "
        program P;
        var p: ^Integer;
        begin
          New(p);
          p^ := 7;
          WriteLn(p^);
          Dispose(p)
        end.";
    let (mut machine, out) = start(source);
    machine.run().unwrap();
    assert_eq!(out.borrow().as_slice(), ["7"]);
    // The freed block sat at the heap bottom, so the heap is empty
    // again.
    assert_eq!(machine.np(), pascal::constants::DSTORE_SIZE);
}

#[test]
fn test_record_fields() {
    let source = "
        program P;
        type R = record x, y: Integer end;
        var r: R;
        begin
          r.x := 3;
          r.y := 4;
          WriteLn(r.x + r.y)
        end.";
    assert_eq!(run(source), vec!["7"]);
}

#[test]
fn test_typed_array_constant() {
    let source = "
        program P;
        const A: array [1..3] of Integer = (10, 20, 30);
        var i: Integer;
        begin
          for i := 1 to 3 do WriteLn(A[i])
        end.";
    assert_eq!(run(source), vec!["10", "20", "30"]);
}

#[test]
fn test_for_loop_bounds() {
    // hi - lo + 1 iterations; the variable passes the bound after the
    // loop falls through.
    let source = "
        program P;
        var i, n: Integer;
        begin
          n := 0;
          for i := 3 to 7 do n := n + 1;
          WriteLn(n);
          WriteLn(i);
          n := 0;
          for i := 3 to 2 do n := n + 1;
          WriteLn(n)
        end.";
    assert_eq!(run(source), vec!["5", "8", "0"]);
}

#[test]
fn test_for_downto() {
    let source = "
        program P;
        var i: Integer;
        begin
          for i := 3 downto 1 do Write(i);
          WriteLn('')
        end.";
    assert_eq!(run(source), vec!["321"]);
}

#[test]
fn test_while_and_repeat() {
    let source = "
        program P;
        var n: Integer;
        begin
          n := 1;
          while n < 100 do n := n * 2;
          WriteLn(n);
          repeat
            n := n - 30
          until n < 0;
          WriteLn(n)
        end.";
    assert_eq!(run(source), vec!["128", "-22"]);
}

#[test]
fn test_nested_subprograms_static_links() {
    // Inner reads and writes the enclosing frame through the static
    // link.
    let source = "
        program P;
        var total: Integer;
        procedure Outer(base: Integer);
        var local: Integer;
          procedure Inner(delta: Integer);
          begin
            local := local + delta;
            total := total + local + base
          end;
        begin
          local := 0;
          Inner(1);
          Inner(2)
        end;
        begin
          total := 0;
          Outer(10);
          WriteLn(total)
        end.";
    // First Inner: local 1, total 11. Second: local 3, total 24.
    assert_eq!(run(source), vec!["24"]);
}

#[test]
fn test_var_parameters() {
    let source = "
        program P;
        var a, b: Integer;
        procedure Swap(var x, y: Integer);
        var t: Integer;
        begin
          t := x; x := y; y := t
        end;
        begin
          a := 1; b := 2;
          Swap(a, b);
          Write(a); WriteLn(b)
        end.";
    assert_eq!(run(source), vec!["21"]);
}

#[test]
fn test_exit_jumps_to_return() {
    let source = "
        program P;
        function Clamped(n: Integer): Integer;
        begin
          Clamped := n;
          if n > 10 then begin Clamped := 10; exit end;
          if n < 0 then Clamped := 0
        end;
        begin
          Write(Clamped(42));
          Write(Clamped(-5));
          WriteLn(Clamped(7))
        end.";
    assert_eq!(run(source), vec!["1007"]);
}

#[test]
fn test_real_arithmetic() {
    let source = "
        program P;
        var x: Real;
        begin
          x := 1 / 4;
          WriteLn(x);
          WriteLn(Round(2.5 * 4))
        end.";
    assert_eq!(run(source), vec!["0.25", "10"]);
}

#[test]
fn test_abs_stays_integer() {
    let source = "
        program P;
        var n: Integer;
        begin
          n := Abs(-3);
          WriteLn(n + 1)
        end.";
    assert_eq!(run(source), vec!["4"]);
}

#[test]
fn test_builtin_math() {
    let source = "
        program P;
        begin
          WriteLn(Trunc(3.9));
          WriteLn(Round(3.9));
          WriteLn(Odd(7));
          WriteLn(Trunc(Sqrt(81.0)))
        end.";
    assert_eq!(run(source), vec!["3", "4", "TRUE", "9"]);
}

#[test]
fn test_chr_ord_upcase() {
    let source = "
        program P;
        var c: Char;
        begin
          c := Chr(65);
          WriteLn(c);
          WriteLn(Ord('A'));
          WriteLn(UpCase('q'))
        end.";
    assert_eq!(run(source), vec!["A", "65", "Q"]);
}

#[test]
fn test_string_variables_and_concat_output() {
    let source = "
        program P;
        var s: String; c: Char;
        begin
          s := 'it''s';
          c := '!';
          Write(s);
          WriteLn(c)
        end.";
    assert_eq!(run(source), vec!["it's!"]);
}

#[test]
fn test_char_widens_to_string() {
    let source = "
        program P;
        var s: String;
        begin
          s := 'x';
          if s = 'x' then WriteLn('yes') else WriteLn('no')
        end.";
    assert_eq!(run(source), vec!["yes"]);
}

#[test]
fn test_untyped_constants_fold() {
    let source = "
        program P;
        const N = 4 * 10 + 2;
        const H = N div 2;
        begin
          WriteLn(N);
          WriteLn(H)
        end.";
    assert_eq!(run(source), vec!["42", "21"]);
}

#[test]
fn test_enum_members_are_ordinals() {
    let source = "
        program P;
        type Color = (Red, Green, Blue);
        var c: Color;
        begin
          c := Green;
          if c = Green then WriteLn('green');
          WriteLn(Ord(Blue))
        end.";
    assert_eq!(run(source), vec!["green", "2"]);
}

#[test]
fn test_multidimensional_array() {
    let source = "
        program P;
        var m: array [1..2, 1..3] of Integer;
            i, j, s: Integer;
        begin
          for i := 1 to 2 do
            for j := 1 to 3 do
              m[i, j] := i * 10 + j;
          s := 0;
          for i := 1 to 2 do
            for j := 1 to 3 do
              s := s + m[i, j];
          WriteLn(s);
          WriteLn(m[2, 3])
        end.";
    // Sum of 11,12,13,21,22,23 = 102.
    assert_eq!(run(source), vec!["102", "23"]);
}

#[test]
fn test_record_array_mix() {
    let source = "
        program P;
        type Point = record x, y: Integer end;
        var pts: array [0..2] of Point;
            i: Integer;
        begin
          for i := 0 to 2 do
          begin
            pts[i].x := i;
            pts[i].y := i * i
          end;
          WriteLn(pts[2].x + pts[2].y)
        end.";
    assert_eq!(run(source), vec!["6"]);
}

#[test]
fn test_record_assignment_copies() {
    let source = "
        program P;
        type R = record x, y: Integer end;
        var a, b: R;
        begin
          a.x := 1; a.y := 2;
          b := a;
          a.x := 9;
          Write(b.x); WriteLn(b.y)
        end.";
    assert_eq!(run(source), vec!["12"]);
}

#[test]
fn test_linked_list_on_heap() {
    let source = "
        program P;
        type
          Link = ^Node;
          Node = record value: Integer; next: Link end;
        var head, cur: Link; i, total: Integer;
        begin
          head := nil;
          for i := 1 to 4 do
          begin
            New(cur);
            cur^.value := i;
            cur^.next := head;
            head := cur
          end;
          total := 0;
          while head <> nil do
          begin
            total := total + head^.value;
            head := head^.next
          end;
          WriteLn(total)
        end.";
    assert_eq!(run(source), vec!["10"]);
}

#[test]
fn test_halt_stops_program() {
    let source = "
        program P;
        begin
          WriteLn('before');
          Halt;
          WriteLn('after')
        end.";
    assert_eq!(run(source), vec!["before"]);
}

#[test]
fn test_write_buffers_until_writeln() {
    let source = "
        program P;
        var i: Integer;
        begin
          for i := 1 to 3 do Write(i, ' ');
          WriteLn('done')
        end.";
    assert_eq!(run(source), vec!["1 2 3 done"]);
}

#[test]
fn test_comments_and_case_insensitivity() {
    let source = "
        PROGRAM Mixed; { braces }
        VAR counter: INTEGER; (* parens *)
        BEGIN
          Counter := 6;
          writeln(COUNTER * 7)
        END.";
    assert_eq!(run(source), vec!["42"]);
}

#[test]
fn test_random_bounded_is_integer() {
    let source = "
        program P;
        var i, n: Integer;
        begin
          for i := 1 to 50 do
          begin
            n := Random(10);
            if (n < 0) or (n >= 10) then WriteLn('out of range')
          end;
          WriteLn('ok')
        end.";
    assert_eq!(run(source), vec!["ok"]);
}

#[test]
fn test_integer_arithmetic_wraps() {
    let source = "
        program P;
        var n: Integer;
        begin
          n := 2147483647;
          WriteLn(n + 1)
        end.";
    assert_eq!(run(source), vec!["-2147483648"]);
}

#[test]
fn test_address_of_and_deref() {
    let source = "
        program P;
        var n: Integer; p: Pointer; q: ^Integer;
        begin
          n := 5;
          p := @n;
          q := p;
          WriteLn(q^)
        end.";
    assert_eq!(run(source), vec!["5"]);
}
