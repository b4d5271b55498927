mod common;

use common::*;
use sorrel_core::{Env, Value};

fn run(program: &[sorrel_core::ast::Stmt]) -> Result<Value, sorrel_core::SorrelError> {
    Env::new().execute(program)
}

#[test]
fn index_read_yields_one_byte_string() {
    let program = [
        assign(ident("a"), string("test")),
        expr_stmt(index(ident("a"), int(0))),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("t".into()));

    let program = [
        assign(ident("a"), string("test")),
        expr_stmt(index(ident("a"), int(4))),
    ];
    assert_eq!(run(&program).unwrap_err().to_string(), "index out of range");

    let program = [
        assign(ident("a"), string("test")),
        expr_stmt(index(ident("a"), string("a"))),
    ];
    assert_eq!(run(&program).unwrap_err().to_string(), "index must be a number");
}

#[test]
fn index_assignment_rebuilds_string() {
    // a = "abc"; a[1] = "x"; a
    let program = [
        assign(ident("a"), string("abc")),
        assign(index(ident("a"), int(1)), string("x")),
        expr_stmt(ident("a")),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("axc".into()));
}

#[test]
fn index_assignment_at_len_appends() {
    // a = "ab"; a[2] = "x"; a
    let program = [
        assign(ident("a"), string("ab")),
        assign(index(ident("a"), int(2)), string("x")),
        expr_stmt(ident("a")),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("abx".into()));

    // One past the end fails and leaves the string unchanged.
    let env = Env::new();
    let program = [
        assign(ident("a"), string("ab")),
        assign(index(ident("a"), int(3)), string("x")),
    ];
    assert_eq!(
        env.execute(&program).unwrap_err().to_string(),
        "index out of range"
    );
    assert_eq!(env.get("a").unwrap(), Value::Str("ab".into()));
}

#[test]
fn index_assignment_into_empty_string() {
    let program = [
        assign(ident("a"), string("")),
        assign(index(ident("a"), int(0)), string("x")),
        expr_stmt(ident("a")),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("x".into()));

    let program = [
        assign(ident("a"), string("")),
        assign(index(ident("a"), int(1)), string("x")),
    ];
    assert_eq!(run(&program).unwrap_err().to_string(), "index out of range");
}

#[test]
fn index_assignment_value_kinds() {
    // nil removes the byte
    let program = [
        assign(ident("a"), string("abc")),
        assign(index(ident("a"), int(1)), nil()),
        expr_stmt(ident("a")),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("ac".into()));

    // an integer writes the byte
    let program = [
        assign(ident("a"), string("abc")),
        assign(index(ident("a"), int(1)), int(120)),
        expr_stmt(ident("a")),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("axc".into()));

    // a rune writes the encoded character
    let program = [
        assign(ident("a"), string("abc")),
        assign(index(ident("a"), int(1)), rune('x')),
        expr_stmt(ident("a")),
    ];
    assert_eq!(run(&program).unwrap(), Value::Str("axc".into()));

    // bool / float / array cannot be assigned
    for (value, type_name) in [
        (boolean(true), "bool"),
        (float(2.2), "float"),
        (array(vec![string("a")]), "array"),
    ] {
        let env = Env::new();
        let program = [
            assign(ident("a"), string("abc")),
            assign(index(ident("a"), int(1)), value),
        ];
        assert_eq!(
            env.execute(&program).unwrap_err().to_string(),
            format!("type {} cannot be assigned to type string", type_name)
        );
        assert_eq!(env.get("a").unwrap(), Value::Str("abc".into()));
    }
}

#[test]
fn self_assignment_is_identity() {
    // a = "word"; a[i] = a[i] leaves a unchanged for every i
    for i in 0..4 {
        let program = [
            assign(ident("a"), string("word")),
            assign(
                index(ident("a"), int(i)),
                index(ident("a"), int(i)),
            ),
            expr_stmt(ident("a")),
        ];
        assert_eq!(run(&program).unwrap(), Value::Str("word".into()));
    }
}

#[test]
fn slice_rules() {
    let cases: &[(Option<i64>, Option<i64>, &str)] = &[
        (Some(0), Some(9), "test data"),
        (Some(1), Some(3), "es"),
        (None, Some(4), "test"),
        (Some(5), None, "data"),
        (Some(9), Some(9), ""),
    ];
    for (begin, end, expected) in cases {
        let program = [
            assign(ident("a"), string("test data")),
            expr_stmt(slice(ident("a"), begin.map(int), end.map(int))),
        ];
        assert_eq!(run(&program).unwrap(), Value::Str((*expected).into()));
    }

    for (begin, end) in [(Some(1), Some(0)), (Some(0), Some(10)), (Some(-1), None)] {
        let program = [
            assign(ident("a"), string("test data")),
            expr_stmt(slice(ident("a"), begin.map(int), end.map(int))),
        ];
        assert_eq!(run(&program).unwrap_err().to_string(), "index out of range");
    }
}

#[test]
fn slice_assignment_is_rejected() {
    let program = [
        assign(ident("a"), string("test")),
        assign(slice(ident("a"), Some(int(0)), Some(int(1))), string("x")),
    ];
    assert_eq!(
        run(&program).unwrap_err().to_string(),
        "type string does not support slice operation for assignment"
    );
}

#[test]
fn member_on_string_is_rejected() {
    let program = [
        assign(ident("a"), string("test")),
        assign(member(ident("a"), "b"), string("x")),
    ];
    assert_eq!(
        run(&program).unwrap_err().to_string(),
        "type string does not support member operation"
    );
}

#[test]
fn for_each_iterates_runes() {
    let env = Env::new();
    // out = []; for r in "héllo" { out += r }; out
    let program = [
        assign(ident("out"), array(vec![])),
        for_in(
            "r",
            string("héllo"),
            vec![op_assign(
                sorrel_core::ast::BinaryOp::Add,
                ident("out"),
                ident("r"),
            )],
        ),
        expr_stmt(len_of(ident("out"))),
    ];
    // Five runes even though the string is six bytes long.
    assert_eq!(env.execute(&program).unwrap(), Value::Int(5));
}

#[test]
fn len_is_byte_based() {
    let program = [expr_stmt(len_of(string("héllo")))];
    assert_eq!(run(&program).unwrap(), Value::Int(6));
}
