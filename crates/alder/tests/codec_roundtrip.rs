//! Round-trip and representation-invariant tests for the module codec and
//! the emitted value shapes.

use alder::{
    bootstrap_environment, declarations_from_environment, emit_module_value,
    expand_environment_with_modules, modules_from_environment, parse_function_record,
    parse_module, parse_module_value, split_declarations,
};
use pretty_assertions::assert_eq;

const SAMPLE: &str = "
module Sample exposing (..)


type Step
    = Forward Int
    | Turn Int Int
    | Halt


type alias Position =
    { x : Int
    , y : Int
    }


start =
    Position 0 0


advance amount position =
    { position | x = position.x + amount }


distance position =
    abs position.x + abs position.y
";

#[test]
fn compiled_modules_round_trip_through_their_value() {
    let environment = bootstrap_environment().unwrap();
    let file = parse_module(SAMPLE.trim_start()).unwrap();
    let expansion = expand_environment_with_modules(&environment, &[file]).unwrap();
    let modules = modules_from_environment(&expansion.environment).unwrap();
    let module = &modules["Sample"];

    let parsed = parse_module_value(&emit_module_value(module)).unwrap();
    assert_eq!(&parsed, module);

    // the serialized value in the environment is exactly the codec's output
    assert_eq!(expansion.added[0].1, emit_module_value(module));
}

#[test]
fn every_core_module_round_trips() {
    let environment = bootstrap_environment().unwrap();
    let modules = modules_from_environment(&environment).unwrap();
    assert_eq!(modules.len(), 7);
    for (name, module) in &modules {
        let parsed = parse_module_value(&emit_module_value(module)).unwrap();
        assert_eq!(&parsed, module, "module {name} failed to round-trip");
    }
}

#[test]
fn emitted_functions_have_the_closure_record_shape() {
    let environment = bootstrap_environment().unwrap();
    let modules = modules_from_environment(&environment).unwrap();
    for (module_name, module) in &modules {
        for (function_name, value) in &module.functions {
            if let Some((_, parameter_count, _, collected)) = parse_function_record(value) {
                assert!(
                    parameter_count > 0,
                    "{module_name}.{function_name} records zero parameters"
                );
                assert!(
                    collected.is_empty(),
                    "{module_name}.{function_name} was emitted with collected arguments"
                );
            }
        }
    }
    // a representative function is indeed a closure record
    assert!(
        parse_function_record(&modules["List"].functions["map"]).is_some(),
        "List.map should be a function record"
    );
}

#[test]
fn type_declarations_survive_the_codec() {
    let environment = bootstrap_environment().unwrap();
    let file = parse_module(SAMPLE.trim_start()).unwrap();
    let expansion = expand_environment_with_modules(&environment, &[file]).unwrap();
    let modules = modules_from_environment(&expansion.environment).unwrap();
    let module = &modules["Sample"];

    let alder::ir::TypeDecl::ChoiceType { tags } = &module.types["Step"] else {
        panic!("Step should be a choice type")
    };
    let tag_list: Vec<(&str, usize)> =
        tags.iter().map(|(tag, arity)| (tag.as_str(), *arity)).collect();
    assert_eq!(tag_list, [("Forward", 1), ("Turn", 2), ("Halt", 0)]);

    let alder::ir::TypeDecl::RecordType { fields } = &module.types["Position"] else {
        panic!("Position should be a record type")
    };
    assert_eq!(fields, &["x".to_owned(), "y".to_owned()]);
}

#[test]
fn the_environment_itself_is_a_list_of_named_pairs() {
    let environment = bootstrap_environment().unwrap();
    let declarations = declarations_from_environment(&environment).unwrap();
    let (modules, others) = split_declarations(declarations);
    assert!(others.is_empty());
    assert_eq!(modules.len(), 7);
}
