//! Tests bout-en-bout de la façade : source → ast / dis / interpret.

use pretty_assertions::assert_eq;
use terbium::{ast, dis, interpret, Config, Stage, Value, VmOptions};

fn value_of(src: &str) -> String {
    match interpret(src) {
        Ok(run) => run.value.to_string(),
        Err(errors) => panic!("{src}: {errors:#?}"),
    }
}

#[test]
fn precedence_is_respected() {
    assert_eq!(value_of("1 + 2 * 3"), "7");
    assert_eq!(value_of("(1 + 2) * 3"), "9");
    assert_eq!(value_of("10 - 4 - 3"), "3");
    assert_eq!(value_of("-2 * -3"), "6");
}

#[test]
fn conditionals() {
    assert_eq!(value_of("if true { 1 } else { 2 }"), "1");
    assert_eq!(value_of("if false { 1 } else { 2 }"), "2");
    assert_eq!(value_of("if false { 1 } else if true { 3 } else { 2 }"), "3");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let errors = interpret("1 / 0").unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, Stage::Runtime);
    assert_eq!(errors[0].message, "division by zero");
}

#[test]
fn unmatched_brace_points_at_the_opening_brace() {
    let src = "let x = 1;\nif x == 1 {\n  x";
    let errors = ast(src).unwrap_err();
    assert_eq!(errors.len(), 1);
    let err = &errors[0];
    assert_eq!(err.stage, Stage::Syntax);
    assert!(err.message.contains("`}`"), "{}", err.message);
    assert_eq!(err.position.map(|p| p.offset as usize), Some(src.len()));
    assert_eq!(err.notes.len(), 1);
    assert_eq!(err.notes[0].position.map(|p| (p.line, p.column)), Some((2, 11)));
}

#[test]
fn listing_of_an_addition() {
    insta::assert_snapshot!(dis("1 + 2").unwrap(), @r"
    ;; program: consts=2, functions=0, ops=4
    ;; constants
    const[0000] = 1
    const[0001] = 2

    == <main> (arity=0, locals=0, entry=0000) ==
    0000    1 | CONST                0 ; 1
    0001    1 | CONST                1 ; 2
    0002    1 | ADD
    0003    1 | HALT
    ");
}

#[test]
fn listing_with_a_function() {
    insta::assert_snapshot!(dis("fn add(a, b) { a + b } add(1, 2)").unwrap(), @r"
    ;; program: consts=2, functions=1, ops=8
    ;; constants
    const[0000] = 1
    const[0001] = 2

    == <main> (arity=0, locals=0, entry=0000) ==
    0000    1 | CONST                0 ; 1
    0001    1 | CONST                1 ; 2
    0002    1 | CALL                 0 2 ; add
    0003    1 | HALT

    == add (arity=2, locals=2, entry=0004) ==
    0004    1 | LOAD_LOCAL           0 ; a
    0005    1 | LOAD_LOCAL           1 ; b
    0006    1 | ADD
    0007    1 | RETURN
    ");
}

#[test]
fn outputs_are_deterministic() {
    let src = "fn fact(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }\nlet xs = [];\nlet i = 0;\nwhile i < 6 { push(xs, fact(i)); i = i + 1; }\nxs";
    assert_eq!(dis(src).unwrap(), dis(src).unwrap());
    assert_eq!(value_of(src), value_of(src));
    assert_eq!(value_of(src), "[1, 1, 2, 6, 24, 120]");
}

#[test]
fn trivial_sources() {
    for src in ["", "   \n\t", "// only a comment", "/* nested /* block */ comment */"] {
        let tree = ast(src).unwrap();
        assert!(tree.body.stmts.is_empty() && tree.body.tail.is_none(), "{src:?}");
        let program = terbium::compile(src).unwrap();
        assert_eq!(program.code.len(), 1, "{src:?}");
        assert_eq!(value_of(src), "null");
    }
    assert_eq!(value_of("42"), "42");
    assert_eq!(value_of("\"hi\""), "hi");
    assert_eq!(value_of("true"), "true");
    assert_eq!(value_of("null"), "null");
}

#[test]
fn print_output_is_returned_alongside_the_value() {
    let run = interpret("let n = 3; while n > 0 { print(\"n =\", n); n = n - 1; } \"done\"").unwrap();
    assert_eq!(run.output, vec!["n = 3", "n = 2", "n = 1"]);
    assert_eq!(run.value, Value::from("done"));
}

#[test]
fn each_stage_stops_the_pipeline() {
    // deux erreurs de syntaxe, aucune erreur de compilation rapportée
    let errors = interpret("let = 1; undefined_name; let = 2;").unwrap_err();
    assert!(errors.iter().all(|e| e.stage == Stage::Syntax));
    assert_eq!(errors.len(), 2);

    let errors = interpret("a + b").unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.stage == Stage::Compile));
}

#[test]
fn shadowing_and_scopes() {
    assert_eq!(value_of("let x = 1; let y = { let x = x + 10; x }; y + x"), "12");
    assert_eq!(value_of("let x = 1; if true { let x = 5; } x"), "1");
}

#[test]
fn mutual_recursion() {
    let src = "fn even(n) { if n == 0 { true } else { odd(n - 1) } }
               fn odd(n) { if n == 0 { false } else { even(n - 1) } }
               [even(10), odd(7), even(3)]";
    assert_eq!(value_of(src), "[true, true, false]");
}

#[test]
fn budgets_from_config() {
    let config = Config { vm: VmOptions { max_call_depth: 32, ..VmOptions::default() }, ..Config::default() };
    let errors = terbium::interpret_with("fn down(n) { down(n) } down(1)", &config).unwrap_err();
    assert_eq!(errors[0].message, "call stack overflow (depth limit 32)");
}

#[test]
fn json_ast_is_available() {
    let json = terbium::ast_json("let a = 1;").unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(parsed["body"]["stmts"].is_array());
}

proptest::proptest! {
    #[test]
    fn arbitrary_sources_never_panic(src in "[a-z0-9 +*/%<>=!&|(){}\\[\\];,.\"\n-]{0,64}") {
        let config = Config { vm: VmOptions { max_steps: Some(10_000), ..VmOptions::default() }, ..Config::default() };
        let _ = terbium::render_dis(&src);
        if let Err(errors) = terbium::interpret_with(&src, &config) {
            proptest::prop_assert!(!errors.is_empty());
        }
    }
}

#[test]
fn printed_float_literals_keep_their_value() {
    for src in ["1e300", "1.7976931348623157e308", "5e-324", "0.1", "1e16"] {
        let printed = terbium::syntax::printer::print_program(&ast(src).unwrap());
        assert_eq!(value_of(&printed), value_of(src), "{src} -> {printed}");
    }
    let errors = ast("1e999").unwrap_err();
    assert_eq!(errors[0].stage, Stage::Lex);
}
