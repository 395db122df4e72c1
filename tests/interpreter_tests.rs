use std::path::PathBuf;

use rstest::rstest;
use tiny_lang::RunError;
use tiny_lang::interpreter::Interpreter;

fn fixture(name: &str) -> String {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "fixtures", name].iter().collect();
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read fixture '{}': {e}", path.display()))
}

fn run_fixture(source: &str) -> Vec<String> {
    let mut interp = Interpreter::capturing();
    tiny_lang::run(source, &mut interp).expect("program should run");
    interp.output().to_vec()
}

#[rstest]
#[case("arithmetic")]
#[case("scoping")]
#[case("classes")]
#[case("counter")]
#[case("fib")]
#[case("hello")]
fn fixture_output_matches_expected(#[case] name: &str) {
    let source = fixture(&format!("{name}.tl"));
    let expected = fixture(&format!("{name}.expected"));
    let output = run_fixture(&source);
    let expected_lines: Vec<&str> = expected.lines().collect();
    assert_eq!(output, expected_lines, "fixture {name}");
}

#[test]
fn runtime_error_stops_execution_and_keeps_prior_output() {
    let source = fixture("error_runtime_division.tl");
    let expected = fixture("error_runtime_division.expected");
    let mut interp = Interpreter::capturing();

    let err = tiny_lang::run(&source, &mut interp).unwrap_err();
    let RunError::Runtime(err) = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(err.message, "division by zero");
    assert_eq!(err.line(), 3);
    assert_eq!(err.to_string(), "division by zero\n[line 3]");

    let expected_lines: Vec<&str> = expected.lines().collect();
    assert_eq!(interp.output(), expected_lines.as_slice());
}

#[test]
fn compile_errors_prevent_any_execution() {
    let mut interp = Interpreter::capturing();
    let err = tiny_lang::run("print 1;\nprint 2 +;\n", &mut interp).unwrap_err();
    assert!(matches!(err, RunError::Compile(ref errors) if errors.len() == 1));
    assert!(interp.output().is_empty());
}

#[test]
fn globals_persist_across_runs() {
    let mut interp = Interpreter::capturing();
    tiny_lang::run("fun greet(who) { return \"hi \" + who; }", &mut interp).expect("defines");
    tiny_lang::run("var who = \"there\";", &mut interp).expect("defines");
    tiny_lang::run("{ var local = greet(who); print local; }", &mut interp).expect("runs");
    assert_eq!(interp.output(), ["hi there"]);
}

#[test]
fn closures_capture_variables_not_values() {
    let source = "
        var log = nil;
        {
            var n = 1;
            fun read() { return n; }
            log = read;
            n = 2;
        }
        print log();
    ";
    assert_eq!(run_fixture(source), vec!["2"]);
}

#[test]
fn class_call_with_wrong_arity_fails() {
    let mut interp = Interpreter::capturing();
    let err = tiny_lang::run(
        "class P { init(x) { this.x = x; } }\nvar p = P(1);\nprint p.x;\nP(1, 2);",
        &mut interp,
    )
    .unwrap_err();
    let RunError::Runtime(err) = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(err.message, "expected 1 arguments but got 2");
    assert_eq!(err.line(), 4);
    assert_eq!(interp.output(), ["1"]);
}

#[test]
fn runaway_recursion_reports_stack_overflow() {
    let mut interp = Interpreter::capturing();
    let err = tiny_lang::run(
        "fun count(n) { print n; return count(n + 1); }\ncount(0);",
        &mut interp,
    )
    .unwrap_err();
    let RunError::Runtime(err) = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(err.message, "stack overflow");
    assert_eq!(interp.output().len(), tiny_lang::interpreter::MAX_CALL_DEPTH);
}
