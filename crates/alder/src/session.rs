//! Interactive submissions and the persistent session.
//!
//! A submission is either a declaration (which extends the environment) or a
//! free-standing expression. Both compile into a program returning
//! `[newEnvironment, responseValue]`; the session evaluates the program,
//! keeps the new environment, and renders the response as display text.

use serde::{Deserialize, Serialize};

use crate::corelib::{bootstrap_environment, environment_is_empty};
use crate::emit::{EmitStack, emit_expression};
use crate::environment::{
    declarations_from_environment, split_declarations, with_declaration,
};
use crate::errors::{CompileError, SubmissionError};
use crate::front::{compile_interactive_declaration, compile_interactive_expression};
use crate::kernel::{self, Expr, Value, evaluate};
use crate::parse::{parse_declaration_text, parse_expression_text};
use crate::project::modules_from_environment;
use crate::reduce::reduce;
use crate::syntax::Declaration;

/// Lexical classification of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Declaration,
    Expression,
}

/// Decides whether a submission introduces a binding or evaluates an
/// expression: a bare `=` at bracket depth zero, before any expression
/// keyword, makes it a declaration.
pub fn classify_submission(text: &str) -> SubmissionKind {
    // declaration keywords can only lead a submission
    if let Some(first_word) = text.trim_start().split_whitespace().next() {
        if matches!(first_word, "port" | "type" | "infix") {
            return SubmissionKind::Declaration;
        }
    }
    let mut chars = text.chars().peekable();
    let mut depth = 0usize;
    let mut word = String::new();
    let mut prev = '\0';
    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            prev = c;
            continue;
        }
        // a completed keyword at depth zero settles the question
        if depth == 0 && matches!(word.as_str(), "let" | "if" | "case") {
            return SubmissionKind::Expression;
        }
        word.clear();
        match c {
            '"' | '\'' => {
                let closer = c;
                let mut escaped = false;
                for inner in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == closer {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '\\' if depth == 0 => return SubmissionKind::Expression,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => {
                let part_of_operator = matches!(
                    prev,
                    '<' | '>' | '/' | '=' | '|' | ':' | '+' | '-' | '*' | '^' | '&'
                ) || chars.peek() == Some(&'=');
                if !part_of_operator {
                    return SubmissionKind::Declaration;
                }
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
            }
            _ => {}
        }
        prev = c;
    }
    SubmissionKind::Expression
}

/// Compiles a submission in the given environment into a kernel program.
/// Evaluating the program (under the same environment) yields
/// `[newEnvironment, responseValue]`.
pub fn compile_submission(environment: &Value, text: &str) -> Result<Expr, SubmissionError> {
    let declarations = declarations_from_environment(environment)?;
    let (_, others) = split_declarations(declarations);
    let available = modules_from_environment(environment)?;

    match classify_submission(text) {
        SubmissionKind::Declaration => {
            if !text.trim_start().starts_with(|c: char| c.is_alphabetic()) {
                return Err(SubmissionError::Compile(CompileError::unsupported(
                    "destructuring as a top-level submission",
                )));
            }
            let declaration = parse_declaration_text(text)?;
            let function = match declaration {
                Declaration::Function(function) => function,
                Declaration::Port(_) => {
                    return Err(SubmissionError::Compile(CompileError::unsupported(
                        "port declaration as a submission",
                    )));
                }
                Declaration::Infix(_) => {
                    return Err(SubmissionError::Compile(CompileError::unsupported(
                        "infix declaration as a submission",
                    )));
                }
                Declaration::CustomType(_) | Declaration::TypeAlias(_) => {
                    return Err(SubmissionError::Compile(CompileError::unsupported(
                        "type declaration as a submission",
                    )));
                }
            };
            let value = compile_interactive_declaration(&available, &others, &function)?;
            let new_environment = with_declaration(environment, &function.name, value.clone());
            Ok(Expr::List(vec![
                Expr::lit(new_environment),
                Expr::lit(value),
            ]))
        }
        SubmissionKind::Expression => {
            let expression = parse_expression_text(text)?;
            let (compiled, imported) =
                compile_interactive_expression(&available, &others, &expression)?;
            let stack = EmitStack {
                imported_functions: imported,
                ..EmitStack::default()
            };
            let emitted = reduce(emit_expression(&stack, &compiled)?);
            Ok(Expr::List(vec![Expr::Environment, emitted]))
        }
    }
}

/// Compiles and evaluates one submission, returning the new environment and
/// the response value.
pub fn run_submission(
    environment: &Value,
    text: &str,
) -> Result<(Value, Value), SubmissionError> {
    let program = compile_submission(environment, text)?;
    let result = evaluate(environment, &program)?;
    let Value::List(items) = &result else {
        return Err(SubmissionError::Compile(CompileError::invariant(
            "submission program did not return [environment, response]",
        )));
    };
    let [new_environment, response] = items.as_slice() else {
        return Err(SubmissionError::Compile(CompileError::invariant(
            "submission program did not return [environment, response]",
        )));
    };
    Ok((new_environment.clone(), response.clone()))
}

/// Replays past submissions in order, runs the current one, and renders its
/// response. An empty environment is bootstrapped with the core modules
/// first. The caller's environment is not modified.
pub fn submission_evaluation(
    environment: &Value,
    previous_submissions: &[&str],
    submission: &str,
) -> Result<String, SubmissionError> {
    let mut environment = if environment_is_empty(environment) {
        bootstrap_environment()?
    } else {
        environment.clone()
    };
    for text in previous_submissions {
        let (next, _) = run_submission(&environment, text)?;
        environment = next;
    }
    let (_, response) = run_submission(&environment, submission)?;
    Ok(display_value(&response))
}

/// Serializable snapshot of a session for disk persistence.
#[derive(Serialize, Deserialize)]
struct SessionSnapshot {
    environment: Value,
}

/// A persistent interactive session: owns the environment value and extends
/// it with each successful submission. Failed submissions leave the
/// environment untouched.
pub struct Session {
    environment: Value,
}

impl Session {
    /// A fresh session with the bundled core modules compiled in.
    pub fn new() -> Result<Self, SubmissionError> {
        Ok(Self {
            environment: bootstrap_environment()?,
        })
    }

    /// Wraps an existing environment value, e.g. one built through
    /// [`expand_environment_with_modules`](crate::expand_environment_with_modules).
    pub fn from_environment(environment: Value) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> &Value {
        &self.environment
    }

    /// Compiles, evaluates, and persists one submission, returning the
    /// display text of its response.
    pub fn submit(&mut self, text: &str) -> Result<String, SubmissionError> {
        let (new_environment, response) = run_submission(&self.environment, text)?;
        self.environment = new_environment;
        Ok(display_value(&response))
    }

    /// Serializes the session to bytes.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(&SessionSnapshot {
            environment: self.environment.clone(),
        })
    }

    /// Restores a session from [`Session::dump`] bytes.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        let snapshot: SessionSnapshot = postcard::from_bytes(bytes)?;
        Ok(Self {
            environment: snapshot.environment,
        })
    }
}

/// Renders a value the way the surface language writes it. Without type
/// information some renderings are heuristic: characters display as their
/// code point, tuples as lists.
pub fn display_value(value: &Value) -> String {
    if value.is_true() {
        return "True".to_owned();
    }
    if *value == Value::false_value() {
        return "False".to_owned();
    }
    if let Some(text) = value.as_string() {
        return format!("{text:?}");
    }
    if let Some((tag, arguments)) = value.as_tagged() {
        if tag == kernel::RECORD_TAG {
            return display_record(arguments);
        }
        if tag == kernel::FUNCTION_TAG {
            return "<function>".to_owned();
        }
        if is_tag_name(tag) {
            if arguments.is_empty() {
                return tag.to_owned();
            }
            let rendered: Vec<String> = arguments
                .iter()
                .map(|argument| {
                    let text = display_value(argument);
                    if text.contains(' ') && !text.starts_with(['[', '{', '"', '(']) {
                        format!("({text})")
                    } else {
                        text
                    }
                })
                .collect();
            return format!("{tag} {}", rendered.join(" "));
        }
    }
    if let Some(n) = value.as_bigint() {
        return n.to_string();
    }
    match value {
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(display_value).collect();
            format!("[{}]", rendered.join(","))
        }
        Value::Blob(bytes) => {
            let mut text = String::with_capacity(2 + bytes.len() * 2);
            text.push_str("0x");
            for byte in bytes {
                text.push_str(&format!("{byte:02x}"));
            }
            text
        }
    }
}

fn display_record(arguments: &[Value]) -> String {
    let [Value::List(pairs)] = arguments else {
        return "{}".to_owned();
    };
    let fields: Vec<String> = pairs
        .iter()
        .filter_map(|pair| {
            let [name, field_value] = pair.as_list()? else { return None };
            Some(format!("{} = {}", name.as_name()?, display_value(field_value)))
        })
        .collect();
    format!("{{ {} }}", fields.join(", "))
}

/// A believable tag name: capitalized alphanumeric. Filters out accidental
/// two-element lists whose head happens to be a UTF-8 blob.
fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(char::is_uppercase)
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{SubmissionKind, classify_submission, display_value};
    use crate::kernel::Value;

    #[test]
    fn classification_finds_top_level_equals() {
        assert_eq!(classify_submission("x = 5"), SubmissionKind::Declaration);
        assert_eq!(classify_submission("f a b = a"), SubmissionKind::Declaration);
        assert_eq!(classify_submission("x + 1"), SubmissionKind::Expression);
        assert_eq!(classify_submission("x == 1"), SubmissionKind::Expression);
    }

    #[test]
    fn classification_ignores_equals_inside_brackets_and_lets() {
        assert_eq!(
            classify_submission("let\n    x =\n        1\nin\nx"),
            SubmissionKind::Expression
        );
        assert_eq!(
            classify_submission("{ a = 1, b = 2 }"),
            SubmissionKind::Expression
        );
        assert_eq!(
            classify_submission("f { a = 1 }"),
            SubmissionKind::Expression
        );
        assert_eq!(
            classify_submission("\"a = b\""),
            SubmissionKind::Expression
        );
    }

    #[test]
    fn display_covers_the_value_shapes() {
        assert_eq!(display_value(&Value::from_i64(-7)), "-7");
        assert_eq!(display_value(&Value::true_value()), "True");
        assert_eq!(display_value(&Value::string("hi")), "\"hi\"");
        assert_eq!(
            display_value(&Value::List(vec![Value::from_i64(1), Value::from_i64(2)])),
            "[1,2]"
        );
        assert_eq!(
            display_value(&Value::tag("Just", vec![Value::from_i64(7)])),
            "Just 7"
        );
        assert_eq!(
            display_value(&Value::tag(
                "Just",
                vec![Value::tag("Just", vec![Value::from_i64(7)])]
            )),
            "Just (Just 7)"
        );
        assert_eq!(
            display_value(&Value::record(vec![
                ("b".to_owned(), Value::from_i64(2)),
                ("a".to_owned(), Value::from_i64(1)),
            ])),
            "{ a = 1, b = 2 }"
        );
    }
}
