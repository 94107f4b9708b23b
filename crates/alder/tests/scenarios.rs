//! End-to-end scenarios exercising the full pipeline: parse, compile, emit,
//! evaluate, display.

use alder::{
    Session, bootstrap_environment, expand_environment_with_modules, parse_function_record,
    parse_module, run_submission, submission_evaluation,
};
use pretty_assertions::assert_eq;

fn environment_with_module(source: &str) -> alder::kernel::Value {
    let environment = bootstrap_environment().unwrap();
    let file = parse_module(source).unwrap();
    expand_environment_with_modules(&environment, &[file])
        .unwrap()
        .environment
}

#[test]
fn increment_function_in_a_module() {
    let environment = environment_with_module("module M exposing (f)\n\nf x =\n    x + 1\n");
    let result = submission_evaluation(&environment, &[], "M.f 41").unwrap();
    assert_eq!(result, "42");
}

#[test]
fn greedy_groups_with_step_uses_an_inner_recursive_helper() {
    let source = "
module Groups exposing (greedyGroupsOfWithStep)


greedyGroupsOfWithStep size step list =
    let
        go remaining acc =
            if Pine_kernel.equal [ remaining, [] ] then
                List.reverse acc

            else
                go
                    (List.drop step remaining)
                    (Pine_kernel.concat [ [ List.take size remaining ], acc ])
    in
    go list []
";
    let environment = environment_with_module(source.trim_start());
    let result = submission_evaluation(
        &environment,
        &[],
        "Groups.greedyGroupsOfWithStep 3 2 [ 1, 2, 3, 4, 5, 6 ]",
    )
    .unwrap();
    assert_eq!(result, "[[1,2,3],[3,4,5],[5,6]]");
}

#[test]
fn custom_type_tags_match_in_case_expressions() {
    let source = "
module Shape exposing (..)


type Shape
    = Circle Int
    | Rectangle Int Int
    | Dot


area shape =
    case shape of
        Circle radius ->
            radius * radius * 3

        Rectangle width height ->
            width * height

        Dot ->
            0
";
    let environment = environment_with_module(source.trim_start());
    assert_eq!(
        submission_evaluation(&environment, &[], "Shape.area (Shape.Circle 2)").unwrap(),
        "12"
    );
    assert_eq!(
        submission_evaluation(&environment, &[], "Shape.area (Shape.Rectangle 3 4)").unwrap(),
        "12"
    );
    assert_eq!(
        submission_evaluation(&environment, &[], "Shape.area Shape.Dot").unwrap(),
        "0"
    );
}

#[test]
fn core_maybe_tags_are_exposed_globally() {
    let environment = bootstrap_environment().unwrap();
    let result = submission_evaluation(
        &environment,
        &[],
        "case Just 7 of\n    Just n ->\n        n\n\n    Nothing ->\n        0",
    )
    .unwrap();
    assert_eq!(result, "7");
}

#[test]
fn record_fields_are_stored_in_lexicographic_order() {
    let environment = bootstrap_environment().unwrap();
    let (_, response) = run_submission(&environment, "{ b = 2, a = 1 }").unwrap();
    let (tag, arguments) = response.as_tagged().expect("a tagged record value");
    assert_eq!(tag, "Elm_Record");
    let [alder::kernel::Value::List(pairs)] = arguments else {
        panic!("record arguments should be a single field list")
    };
    let names: Vec<&str> = pairs
        .iter()
        .map(|pair| pair.as_list().unwrap()[0].as_name().unwrap())
        .collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(
        submission_evaluation(&environment, &[], "{ b = 2, a = 1 }").unwrap(),
        "{ a = 1, b = 2 }"
    );
}

#[test]
fn lambda_application_and_partial_application() {
    let environment = bootstrap_environment().unwrap();
    assert_eq!(
        submission_evaluation(&environment, &[], "(\\x y -> x - y) 10 3").unwrap(),
        "7"
    );
    let (_, partial) = run_submission(&environment, "(\\x y -> x - y) 10").unwrap();
    let (_, parameter_count, _, collected) =
        parse_function_record(&partial).expect("a partially applied function record");
    assert_eq!(parameter_count, 2);
    assert_eq!(collected, [alder::kernel::Value::from_i64(10)]);
}

#[test]
fn declarations_extend_the_environment() {
    let environment = bootstrap_environment().unwrap();
    let result = submission_evaluation(&environment, &["x = 5"], "x + 1").unwrap();
    assert_eq!(result, "6");

    let mut session = Session::new().unwrap();
    session.submit("x = 5").unwrap();
    assert_eq!(session.submit("x + 1").unwrap(), "6");
    let declarations =
        alder::declarations_from_environment(session.environment()).unwrap();
    assert!(declarations.iter().any(|(name, _)| name == "x"));
}

#[test]
fn record_access_update_and_accessor_functions() {
    let environment = bootstrap_environment().unwrap();
    assert_eq!(
        submission_evaluation(&environment, &[], "{ x = 1, y = 2 }.y").unwrap(),
        "2"
    );
    assert_eq!(
        submission_evaluation(&environment, &["p = { x = 1, y = 2 }"], "{ p | x = 9 }").unwrap(),
        "{ x = 9, y = 2 }"
    );
    assert_eq!(
        submission_evaluation(&environment, &[], ".x { x = 1, y = 2 }").unwrap(),
        "1"
    );
}

#[test]
fn record_constructors_from_type_aliases() {
    let source = "
module Geometry exposing (..)


type alias Point =
    { y : Int
    , x : Int
    }


origin =
    Point 0 0


shifted delta point =
    { point | x = point.x + delta }
";
    let environment = environment_with_module(source.trim_start());
    // constructor arguments follow the declared field order; storage is
    // sorted
    assert_eq!(
        submission_evaluation(&environment, &[], "Geometry.Point 1 2").unwrap(),
        "{ x = 2, y = 1 }"
    );
    assert_eq!(
        submission_evaluation(&environment, &[], "Geometry.shifted 5 (Geometry.Point 0 3)")
            .unwrap(),
        "{ x = 8, y = 0 }"
    );
}

#[test]
fn case_branches_match_in_order() {
    let environment = bootstrap_environment().unwrap();
    let result = submission_evaluation(
        &environment,
        &[],
        "case [ 1, 2 ] of\n    [] ->\n        0\n\n    [ _ ] ->\n        1\n\n    first :: _ ->\n        first\n",
    )
    .unwrap();
    assert_eq!(result, "1");
    // the two-element list skips the first two branches
    let result = submission_evaluation(
        &environment,
        &[],
        "case [ 9, 2 ] of\n    [] ->\n        0\n\n    first :: _ ->\n        first\n\n    [ _ ] ->\n        1\n",
    )
    .unwrap();
    assert_eq!(result, "9");
}

#[test]
fn mutually_recursive_module_functions() {
    let source = "
module Parity exposing (isEven, isOdd)


isEven n =
    if n == 0 then
        True

    else
        isOdd (n - 1)


isOdd n =
    if n == 0 then
        False

    else
        isEven (n - 1)
";
    let environment = environment_with_module(source.trim_start());
    assert_eq!(
        submission_evaluation(&environment, &[], "Parity.isEven 10").unwrap(),
        "True"
    );
    assert_eq!(
        submission_evaluation(&environment, &[], "Parity.isOdd 10").unwrap(),
        "False"
    );
}

#[test]
fn closures_capture_enclosing_parameters() {
    let source = "
module Cap exposing (..)


makeAdder amount =
    \\n -> n + amount


applyTwice fn value =
    fn (fn value)
";
    let environment = environment_with_module(source.trim_start());
    assert_eq!(
        submission_evaluation(&environment, &[], "Cap.applyTwice (Cap.makeAdder 3) 10").unwrap(),
        "16"
    );
}
