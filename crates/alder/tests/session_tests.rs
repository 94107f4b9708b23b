//! Behavioral tests for `Session`, the persistent interactive session type
//! that keeps the environment value across `submit()` calls.

use alder::{Session, SubmissionError};
use pretty_assertions::assert_eq;

/// A fresh session carries the bundled core modules.
#[test]
fn fresh_session_has_the_core_modules() {
    let session = Session::new().unwrap();
    let declarations = alder::declarations_from_environment(session.environment()).unwrap();
    let names: Vec<&str> = declarations.iter().map(|(name, _)| name.as_str()).collect();
    for module in ["Basics", "Maybe", "List", "String", "Result", "Char", "Tuple"] {
        assert!(names.contains(&module), "missing {module}");
    }
}

/// Submitting a bare expression returns its display text and leaves the
/// environment unchanged.
#[test]
fn expression_submissions_do_not_grow_the_environment() {
    let mut session = Session::new().unwrap();
    let before = session.environment().clone();
    assert_eq!(session.submit("1 + 2").unwrap(), "3");
    assert_eq!(*session.environment(), before);
}

/// Variables defined in one submission persist to the next.
#[test]
fn variables_persist_across_submissions() {
    let mut session = Session::new().unwrap();
    session.submit("a = 10").unwrap();
    session.submit("b = 20").unwrap();
    assert_eq!(session.submit("a + b").unwrap(), "30");
}

/// Re-declaring a name replaces the previous value instead of appending a
/// second entry.
#[test]
fn redeclaring_replaces_the_binding() {
    let mut session = Session::new().unwrap();
    session.submit("x = 5").unwrap();
    let entries_before =
        alder::declarations_from_environment(session.environment()).unwrap().len();
    session.submit("x = 6").unwrap();
    let entries_after =
        alder::declarations_from_environment(session.environment()).unwrap().len();
    assert_eq!(entries_before, entries_after);
    assert_eq!(session.submit("x").unwrap(), "6");
}

/// A function defined interactively can be called later, including
/// recursively.
#[test]
fn recursive_function_defined_interactively() {
    let mut session = Session::new().unwrap();
    session
        .submit("fact n = if n == 0 then 1 else n * fact (n - 1)")
        .unwrap();
    assert_eq!(session.submit("fact 5").unwrap(), "120");
    assert_eq!(session.submit("fact 0").unwrap(), "1");
}

/// Interactive functions can use earlier interactive declarations.
#[test]
fn interactive_declarations_compose() {
    let mut session = Session::new().unwrap();
    session.submit("double n = n * 2").unwrap();
    session.submit("quadruple n = double (double n)").unwrap();
    assert_eq!(session.submit("quadruple 4").unwrap(), "16");
}

/// A failed submission reports the error and leaves the environment
/// untouched.
#[test]
fn failed_submissions_do_not_mutate_the_environment() {
    let mut session = Session::new().unwrap();
    session.submit("x = 1").unwrap();
    let before = session.environment().clone();
    let err = session.submit("y = nonexistent + 1").unwrap_err();
    assert!(matches!(err, SubmissionError::Compile(_)), "got {err:?}");
    assert_eq!(*session.environment(), before);
    assert_eq!(session.submit("x").unwrap(), "1");
}

/// Core list functions work end to end through the session.
#[test]
fn core_list_functions() {
    let mut session = Session::new().unwrap();
    assert_eq!(session.submit("List.length [ 1, 2, 3 ]").unwrap(), "3");
    assert_eq!(session.submit("List.reverse [ 1, 2, 3 ]").unwrap(), "[3,2,1]");
    assert_eq!(
        session.submit("List.map (\\n -> n * n) [ 1, 2, 3 ]").unwrap(),
        "[1,4,9]"
    );
    assert_eq!(
        session.submit("List.filter (\\n -> n > 1) [ 1, 2, 3 ]").unwrap(),
        "[2,3]"
    );
    assert_eq!(session.submit("List.range 1 5").unwrap(), "[1,2,3,4,5]");
    assert_eq!(
        session.submit("List.foldl (\\n acc -> acc + n) 0 [ 1, 2, 3, 4 ]").unwrap(),
        "10"
    );
    assert_eq!(session.submit("1 :: [ 2, 3 ]").unwrap(), "[1,2,3]");
}

/// Strings concatenate through `++` and display with quotes.
#[test]
fn string_operations() {
    let mut session = Session::new().unwrap();
    assert_eq!(session.submit("\"foo\" ++ \"bar\"").unwrap(), "\"foobar\"");
    assert_eq!(session.submit("String.length \"hello\"").unwrap(), "5");
    assert_eq!(session.submit("String.fromInt -42").unwrap(), "\"-42\"");
    assert_eq!(
        session.submit("String.join \", \" [ \"a\", \"b\", \"c\" ]").unwrap(),
        "\"a, b, c\""
    );
}

/// Arithmetic, comparison, and pipeline operators resolve through the core
/// modules.
#[test]
fn operator_coverage() {
    let mut session = Session::new().unwrap();
    assert_eq!(session.submit("2 ^ 10").unwrap(), "1024");
    assert_eq!(session.submit("17 // 5").unwrap(), "3");
    assert_eq!(session.submit("-17 // 5").unwrap(), "-3");
    assert_eq!(session.submit("modBy 10 -3").unwrap(), "7");
    assert_eq!(session.submit("remainderBy 5 17").unwrap(), "2");
    assert_eq!(session.submit("1 < 2 && 2 < 3").unwrap(), "True");
    assert_eq!(session.submit("1 == 2 || 3 > 2").unwrap(), "True");
    assert_eq!(session.submit("[ 1, 2, 3 ] |> List.reverse |> List.length").unwrap(), "3");
    assert_eq!(session.submit("max 3 7 + min 1 2").unwrap(), "8");
    assert_eq!(session.submit("compare 1 2").unwrap(), "LT");
}

/// Let blocks and case expressions compose inside submissions.
#[test]
fn let_and_case_in_submissions() {
    let mut session = Session::new().unwrap();
    assert_eq!(
        session
            .submit("let\n    double n =\n        n * 2\nin\ndouble 21")
            .unwrap(),
        "42"
    );
    assert_eq!(
        session
            .submit("case List.head [ 5, 6 ] of\n    Just n ->\n        n\n\n    Nothing ->\n        0")
            .unwrap(),
        "5"
    );
}

/// A non-recursive let binding evaluates the same after moving to an outer
/// scope.
#[test]
fn let_bindings_are_scope_transparent() {
    let mut session = Session::new().unwrap();
    let nested = session
        .submit("let\n    base =\n        5\nin\nlet\n    offset =\n        2\nin\nbase + offset")
        .unwrap();
    let flat = session
        .submit("let\n    base =\n        5\n\n    offset =\n        2\nin\nbase + offset")
        .unwrap();
    assert_eq!(nested, flat);
    assert_eq!(flat, "7");
}

/// Unsupported submissions are rejected with structured errors.
#[test]
fn unsupported_submissions_are_rejected() {
    let mut session = Session::new().unwrap();
    for text in [
        "( a, b ) = ( 1, 2 )",
        "port send : String -> Cmd msg",
        "infix left 6 (+) = add",
        "type Color = Red | Green",
    ] {
        let err = session.submit(text).unwrap_err();
        assert!(
            matches!(
                err,
                SubmissionError::Compile(alder::CompileError::UnsupportedConstruct(_))
            ),
            "submission {text:?} should be unsupported, got {err:?}"
        );
    }
}

/// Floating-point literals are outside the supported subset.
#[test]
fn float_literals_are_unsupported() {
    let mut session = Session::new().unwrap();
    let err = session.submit("1.5 + 1.5").unwrap_err();
    assert!(
        matches!(
            err,
            SubmissionError::Compile(alder::CompileError::UnsupportedConstruct(_))
        ),
        "got {err:?}"
    );
}

/// Sessions round-trip through dump/load bytes.
#[test]
fn session_dump_load_round_trip() {
    let mut session = Session::new().unwrap();
    session.submit("x = 41").unwrap();
    let bytes = session.dump().unwrap();
    let mut restored = Session::load(&bytes).unwrap();
    assert_eq!(restored.submit("x + 1").unwrap(), "42");
}

/// Debug overrides compile to identity and a placeholder.
#[test]
fn debug_overrides() {
    let mut session = Session::new().unwrap();
    assert_eq!(session.submit("Debug.log \"tag\" 42").unwrap(), "42");
    assert_eq!(
        session.submit("Debug.toString 42").unwrap(),
        "\"<Debug.toString is not implemented>\""
    );
}
