//! Negative paths: every stage reports through the one error type,
//! pointing at the offending token where there is one, and the first
//! error aborts.

fn compile_err(source: &str) -> pascal::PascalError {
    match pascal::compile(source) {
        Ok(_) => panic!("expected a compile error"),
        Err(err) => err,
    }
}

#[test]
fn test_string_assigned_to_integer_reports_line() {
    let err = compile_err(
        "program P;\nvar i: Integer;\nbegin\n  i := 'hello'\nend.",
    );
    assert!(err.message().contains("cast"), "got: {err}");
    assert_eq!(err.line(), Some(4));
}

#[test]
fn test_unknown_identifier() {
    let err = compile_err("program P; begin x := 1 end.");
    assert!(err.message().contains("unknown identifier"), "got: {err}");
    assert_eq!(err.token().unwrap().text, "x");
}

#[test]
fn test_unknown_type() {
    let err = compile_err("program P; var x: Widget; begin end.");
    assert!(err.message().contains("unknown type"), "got: {err}");
}

#[test]
fn test_duplicate_identifier() {
    let err = compile_err("program P; var x: Integer; x: Real; begin end.");
    assert!(err.message().contains("duplicate"), "got: {err}");
}

#[test]
fn test_non_boolean_condition() {
    let err = compile_err("program P; begin if 1 then WriteLn('x') end.");
    assert!(err.message().contains("boolean"), "got: {err}");
}

#[test]
fn test_wrong_arity() {
    let err = compile_err(
        "program P;
         procedure Two(a, b: Integer); begin end;
         begin Two(1) end.",
    );
    assert!(err.message().contains("number of arguments"), "got: {err}");
}

#[test]
fn test_unresolved_forward_pointer() {
    let err = compile_err("program P; type Q = ^Missing; begin end.");
    assert!(
        err.message().contains("unresolved forward pointer"),
        "got: {err}"
    );
    assert_eq!(err.token().unwrap().text, "Missing");
}

#[test]
fn test_forward_pointer_outside_type_section() {
    let err = compile_err("program P; var p: ^Missing; begin end.");
    assert!(err.message().contains("unknown type"), "got: {err}");
}

#[test]
fn test_record_typed_constant_unsupported() {
    let err = compile_err(
        "program P;
         type R = record x: Integer end;
         const C: R = (1);
         begin end.",
    );
    assert!(err.message().contains("not supported"), "got: {err}");
}

#[test]
fn test_typed_constant_count_mismatch() {
    let err = compile_err(
        "program P;
         const A: array [1..3] of Integer = (1, 2);
         begin end.",
    );
    assert!(err.message().contains("count mismatch"), "got: {err}");
}

#[test]
fn test_div_requires_integers() {
    let err = compile_err("program P; begin WriteLn(1.5 div 2) end.");
    assert!(err.message().contains("integer operands"), "got: {err}");
}

#[test]
fn test_deref_non_pointer() {
    let err = compile_err("program P; var n: Integer; begin WriteLn(n^) end.");
    assert!(err.message().contains("dereference"), "got: {err}");
}

#[test]
fn test_incompatible_pointer_types() {
    let err = compile_err(
        "program P;
         type A = record x: Integer end; B = record y: Integer end;
         var pa: ^A; pb: ^B;
         begin pa := pb end.",
    );
    assert!(err.message().contains("cast"), "got: {err}");
}

#[test]
fn test_unknown_module() {
    let err = compile_err("program P; uses crt; begin end.");
    assert!(err.message().contains("unknown module"), "got: {err}");
    assert_eq!(err.token().unwrap().text, "crt");
}

#[test]
fn test_var_parameter_needs_variable() {
    let err = compile_err(
        "program P;
         procedure Bump(var n: Integer); begin n := n + 1 end;
         begin Bump(3) end.",
    );
    assert!(err.message().contains("needs a variable"), "got: {err}");
}

#[test]
fn test_function_result_must_be_used() {
    let err = compile_err(
        "program P;
         function Five: Integer; begin Five := 5 end;
         begin Five end.",
    );
    assert!(err.message().contains("not used"), "got: {err}");
}

#[test]
fn test_assignment_to_constant() {
    let err = compile_err("program P; const N = 1; begin N := 2 end.");
    assert!(err.message().contains("constant"), "got: {err}");
}

#[test]
fn test_unterminated_comment() {
    let err = compile_err("program P; begin end. { runs off");
    assert!(err.message().contains("unterminated comment"), "got: {err}");
}

#[test]
fn test_unterminated_string() {
    let err = compile_err("program P; begin WriteLn('oops) end.");
    assert!(err.message().contains("unterminated string"), "got: {err}");
}

#[test]
fn test_unknown_character() {
    let err = compile_err("program P; begin ? end.");
    assert!(err.message().contains("unknown character"), "got: {err}");
}

#[test]
fn test_missing_program_dot() {
    let err = compile_err("program P; begin end");
    assert!(err.message().contains("expected '.'"), "got: {err}");
}

#[test]
fn test_new_needs_typed_pointer() {
    let err = compile_err("program P; var p: Pointer; begin New(p) end.");
    assert!(err.message().contains("typed pointer"), "got: {err}");
}

#[test]
fn test_pointer_ordering_rejected() {
    let err = compile_err(
        "program P; var p, q: ^Integer; begin if p < q then WriteLn('x') end.",
    );
    assert!(err.message().contains("pointers compare"), "got: {err}");
}
