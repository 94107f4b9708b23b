//! The kernel VM surface: values, expressions, the value↔expression codec,
//! and a big-step evaluator.
//!
//! The kernel is deliberately minimal and homoiconic: a [`Value`] is a blob
//! or a list, an [`Expr`] has seven forms, and `ParseAndEval` revives encoded
//! expressions at runtime. Everything the compiler emits bottoms out here.

mod eval;
mod expr;
mod value;

pub use eval::{
    DEFAULT_MAX_PARSE_AND_EVAL_DEPTH, EvalError, EvalLimits, evaluate, evaluate_with_limits,
};
pub use expr::{
    DecodeError, Expr, KernelFunction, decode, encode, string_as_value_function,
    string_as_value_list, string_as_value_literal,
};
pub use value::{FUNCTION_TAG, RECORD_TAG, STRING_TAG, Value};
