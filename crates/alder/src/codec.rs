//! The module codec: a compiled module serializes to a single kernel value,
//! and parses back losslessly. The kernel value is the sole persistent
//! artifact a module leaves behind.

use indexmap::IndexMap;

use crate::errors::CompileError;
use crate::ir::{ModuleInCompilation, TypeDecl};
use crate::kernel::Value;

const CHOICE_TYPE_TAG: &str = "ChoiceType";
const RECORD_CONSTRUCTOR_TAG: &str = "RecordConstructor";

/// Serializes a module as a list of named entries: one per function, one per
/// type declaration.
pub fn emit_module_value(module: &ModuleInCompilation) -> Value {
    let mut entries = Vec::with_capacity(module.functions.len() + module.types.len());
    for (name, value) in &module.functions {
        entries.push(Value::List(vec![Value::name(name), value.clone()]));
    }
    for (name, declaration) in &module.types {
        let descriptor = match declaration {
            TypeDecl::ChoiceType { tags } => Value::List(vec![
                Value::name(CHOICE_TYPE_TAG),
                Value::List(
                    tags.iter()
                        .map(|(tag, arity)| {
                            Value::List(vec![Value::name(tag), Value::from_i64(*arity as i64)])
                        })
                        .collect(),
                ),
            ]),
            TypeDecl::RecordType { fields } => Value::List(vec![
                Value::name(RECORD_CONSTRUCTOR_TAG),
                Value::List(fields.iter().map(|field| Value::name(field)).collect()),
            ]),
        };
        entries.push(Value::List(vec![Value::name(name), descriptor]));
    }
    Value::List(entries)
}

/// Parses a module value produced by [`emit_module_value`]. Structural
/// errors carry a breadcrumb of the failing path.
pub fn parse_module_value(value: &Value) -> Result<ModuleInCompilation, CompileError> {
    let entries = value.as_list().ok_or_else(|| {
        CompileError::bad_encoding(Vec::new(), "module value must be a list, not a blob")
    })?;
    let mut functions = IndexMap::new();
    let mut types = IndexMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let breadcrumb = || vec![format!("entry {index}")];
        let pair = entry
            .as_list()
            .ok_or_else(|| CompileError::bad_encoding(breadcrumb(), "entry is not a list"))?;
        let [name, payload] = pair else {
            return Err(CompileError::bad_encoding(
                breadcrumb(),
                format!("entry has {} elements, expected 2", pair.len()),
            ));
        };
        let name = name.as_name().ok_or_else(|| {
            CompileError::bad_encoding(breadcrumb(), "entry name is not a UTF-8 blob")
        })?;
        let breadcrumb = || vec![format!("entry {index} ('{name}')")];
        match parse_type_descriptor(payload, &breadcrumb)? {
            Some(declaration) => {
                types.insert(name.to_owned(), declaration);
            }
            None => {
                functions.insert(name.to_owned(), payload.clone());
            }
        }
    }
    Ok(ModuleInCompilation { functions, types })
}

/// Recognizes a type descriptor; anything not wrapped in one of the two type
/// tags is a function value.
fn parse_type_descriptor(
    payload: &Value,
    breadcrumb: &dyn Fn() -> Vec<String>,
) -> Result<Option<TypeDecl>, CompileError> {
    let Some(items) = payload.as_list() else { return Ok(None) };
    let [tag, body] = items else { return Ok(None) };
    match tag.as_name() {
        Some(CHOICE_TYPE_TAG) => {
            let tag_entries = body.as_list().ok_or_else(|| {
                CompileError::bad_encoding(
                    with(breadcrumb(), "choice type tags"),
                    "tag list is a blob",
                )
            })?;
            let mut tags = IndexMap::new();
            for (tag_index, tag_entry) in tag_entries.iter().enumerate() {
                let path = || with(breadcrumb(), format!("tag {tag_index}"));
                let pair = tag_entry
                    .as_list()
                    .ok_or_else(|| CompileError::bad_encoding(path(), "tag entry is not a list"))?;
                let [tag_name, arity] = pair else {
                    return Err(CompileError::bad_encoding(
                        path(),
                        "tag entry is not a [name, arity] pair",
                    ));
                };
                let tag_name = tag_name.as_name().ok_or_else(|| {
                    CompileError::bad_encoding(path(), "tag name is not a UTF-8 blob")
                })?;
                let arity = arity
                    .as_i64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        CompileError::bad_encoding(path(), "tag arity is not a non-negative integer")
                    })?;
                tags.insert(tag_name.to_owned(), arity);
            }
            Ok(Some(TypeDecl::ChoiceType { tags }))
        }
        Some(RECORD_CONSTRUCTOR_TAG) => {
            let field_values = body.as_list().ok_or_else(|| {
                CompileError::bad_encoding(
                    with(breadcrumb(), "record fields"),
                    "field list is a blob",
                )
            })?;
            let fields = field_values
                .iter()
                .enumerate()
                .map(|(field_index, field)| {
                    field.as_name().map(str::to_owned).ok_or_else(|| {
                        CompileError::bad_encoding(
                            with(breadcrumb(), format!("field {field_index}")),
                            "field name is not a UTF-8 blob",
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(TypeDecl::RecordType { fields }))
        }
        _ => Ok(None),
    }
}

fn with(mut path: Vec<String>, segment: impl Into<String>) -> Vec<String> {
    path.push(segment.into());
    path
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::{emit_module_value, parse_module_value};
    use crate::errors::CompileError;
    use crate::ir::{ModuleInCompilation, TypeDecl};
    use crate::kernel::Value;

    fn sample_module() -> ModuleInCompilation {
        let mut functions = IndexMap::new();
        functions.insert("answer".to_owned(), Value::from_i64(42));
        functions.insert(
            "greeting".to_owned(),
            Value::string("hello"),
        );
        let mut types = IndexMap::new();
        let mut tags = IndexMap::new();
        tags.insert("Leaf".to_owned(), 1);
        tags.insert("Node".to_owned(), 2);
        types.insert("Tree".to_owned(), TypeDecl::ChoiceType { tags });
        types.insert(
            "Point".to_owned(),
            TypeDecl::RecordType {
                fields: vec!["x".to_owned(), "y".to_owned()],
            },
        );
        ModuleInCompilation { functions, types }
    }

    #[test]
    fn module_round_trips_through_its_value() {
        let module = sample_module();
        let parsed = parse_module_value(&emit_module_value(&module)).unwrap();
        assert_eq!(parsed, module);
    }

    #[test]
    fn blobs_where_lists_are_expected_are_rejected_with_a_path() {
        let err = parse_module_value(&Value::from_i64(1)).unwrap_err();
        assert!(matches!(err, CompileError::BadModuleEncoding { .. }));

        let bad_entry = Value::List(vec![Value::from_i64(7)]);
        let err = parse_module_value(&bad_entry).unwrap_err();
        let CompileError::BadModuleEncoding { path, .. } = err else {
            panic!("expected a bad-encoding error")
        };
        assert_eq!(path, ["entry 0"]);
    }

    #[test]
    fn malformed_type_descriptors_name_the_failing_tag() {
        let bad = Value::List(vec![Value::List(vec![
            Value::name("Tree"),
            Value::List(vec![
                Value::name("ChoiceType"),
                Value::List(vec![Value::List(vec![
                    Value::name("Leaf"),
                    Value::name("not a number"),
                ])]),
            ]),
        ])]);
        let err = parse_module_value(&bad).unwrap_err();
        let CompileError::BadModuleEncoding { path, .. } = err else {
            panic!("expected a bad-encoding error")
        };
        assert_eq!(path, ["entry 0 ('Tree')", "tag 0"]);
    }
}
