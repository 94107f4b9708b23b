#![doc = include_str!("../../../README.md")]

pub mod kernel;

mod codec;
mod corelib;
mod domains;
mod emit;
mod environment;
mod errors;
mod front;
pub mod ir;
mod parse;
mod pattern;
mod precedence;
mod project;
mod reduce;
mod routines;
mod session;
pub mod syntax;

pub use crate::{
    codec::{emit_module_value, parse_module_value},
    corelib::{CORE_MODULE_SOURCES, bootstrap_environment},
    emit::{EmitStack, EnvFnEntry, ExpectedEnvironment, emit_expression, emit_module},
    environment::{
        declarations_from_environment, environment_from_declarations, split_declarations,
        with_declaration,
    },
    errors::{CompileError, SubmissionError},
    front::{AUTO_IMPORTED_MODULES, compile_module},
    parse::{ParseError, parse_declaration_text, parse_expression_text, parse_module},
    project::{EnvironmentExpansion, expand_environment_with_modules, modules_from_environment},
    routines::{PARTIAL_APPLICATION_NAME, function_record_value, parse_function_record},
    session::{
        Session, SubmissionKind, classify_submission, compile_submission, display_value,
        run_submission, submission_evaluation,
    },
};
