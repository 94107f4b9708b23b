//! The persistent environment format: a kernel list of `[nameBlob, value]`
//! pairs. Compiled modules appear under their dotted name; interactive
//! declarations under their plain name. The environment is the exchange
//! medium between sessions; it grows monotonically and is never mutated in
//! place.

use crate::errors::CompileError;
use crate::kernel::Value;

/// Reads all named declarations out of an environment value.
pub fn declarations_from_environment(
    environment: &Value,
) -> Result<Vec<(String, Value)>, CompileError> {
    let entries = environment.as_list().ok_or_else(|| {
        CompileError::bad_encoding(Vec::new(), "environment must be a list, not a blob")
    })?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let pair = entry.as_list().ok_or_else(|| {
                CompileError::bad_encoding(
                    vec![format!("environment entry {index}")],
                    "entry is not a list",
                )
            })?;
            let [name, value] = pair else {
                return Err(CompileError::bad_encoding(
                    vec![format!("environment entry {index}")],
                    format!("entry has {} elements, expected 2", pair.len()),
                ));
            };
            let name = name.as_name().ok_or_else(|| {
                CompileError::bad_encoding(
                    vec![format!("environment entry {index}")],
                    "entry name is not a UTF-8 blob",
                )
            })?;
            Ok((name.to_owned(), value.clone()))
        })
        .collect()
}

/// Builds an environment value from named declarations.
pub fn environment_from_declarations(declarations: &[(String, Value)]) -> Value {
    Value::List(
        declarations
            .iter()
            .map(|(name, value)| Value::List(vec![Value::name(name), value.clone()]))
            .collect(),
    )
}

/// Module names start with an upper-case letter (possibly dotted); anything
/// else is an interactive declaration.
pub fn is_module_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Splits environment declarations into compiled modules and other
/// declarations.
pub fn split_declarations(
    declarations: Vec<(String, Value)>,
) -> (Vec<(String, Value)>, Vec<(String, Value)>) {
    declarations
        .into_iter()
        .partition(|(name, _)| is_module_name(name))
}

/// Returns the environment with the named declaration replaced, or appended
/// when absent. The input is not modified.
pub fn with_declaration(environment: &Value, name: &str, value: Value) -> Value {
    let mut entries: Vec<Value> = environment.as_list().map(<[Value]>::to_vec).unwrap_or_default();
    let name_value = Value::name(name);
    let replaced = entries.iter_mut().any(|entry| {
        if let Value::List(pair) = entry {
            if pair.first() == Some(&name_value) {
                pair[1] = value.clone();
                return true;
            }
        }
        false
    });
    if !replaced {
        entries.push(Value::List(vec![name_value, value]));
    }
    Value::List(entries)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        declarations_from_environment, environment_from_declarations, split_declarations,
        with_declaration,
    };
    use crate::kernel::Value;

    #[test]
    fn environment_round_trips() {
        let declarations = vec![
            ("Basics".to_owned(), Value::from_i64(1)),
            ("x".to_owned(), Value::from_i64(2)),
        ];
        let environment = environment_from_declarations(&declarations);
        assert_eq!(declarations_from_environment(&environment).unwrap(), declarations);
    }

    #[test]
    fn splitting_separates_modules_from_interactive_declarations() {
        let declarations = vec![
            ("Json.Decode".to_owned(), Value::from_i64(1)),
            ("x".to_owned(), Value::from_i64(2)),
        ];
        let (modules, others) = split_declarations(declarations);
        assert_eq!(modules.len(), 1);
        assert_eq!(others[0].0, "x");
    }

    #[test]
    fn with_declaration_replaces_or_appends() {
        let environment = environment_from_declarations(&[("x".to_owned(), Value::from_i64(1))]);
        let replaced = with_declaration(&environment, "x", Value::from_i64(2));
        let appended = with_declaration(&replaced, "y", Value::from_i64(3));
        assert_eq!(
            declarations_from_environment(&appended).unwrap(),
            vec![
                ("x".to_owned(), Value::from_i64(2)),
                ("y".to_owned(), Value::from_i64(3)),
            ]
        );
    }
}
