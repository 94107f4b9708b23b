//! The pipeline driver: expands a persistent environment with a batch of
//! parsed modules.
//!
//! Modules are compiled in dependency order of their explicit imports;
//! cycles within a batch are rejected with the offending path. Each compiled
//! module is serialized through the codec and appended to the environment
//! under its dotted name.

use ahash::AHashMap;

use crate::codec::{emit_module_value, parse_module_value};
use crate::environment::{
    declarations_from_environment, split_declarations, with_declaration,
};
use crate::errors::{CompileError, ResultContext};
use crate::front::compile_module;
use crate::ir::ModuleInCompilation;
use crate::kernel::Value;
use crate::syntax::{SyntaxFile, module_name_string};

/// Result of expanding an environment: the new environment value, plus a
/// manifest of the modules added by this call.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentExpansion {
    pub added: Vec<(String, Value)>,
    pub environment: Value,
}

/// Parses the compiled modules already present in an environment.
pub fn modules_from_environment(
    environment: &Value,
) -> Result<AHashMap<String, ModuleInCompilation>, CompileError> {
    let (modules, _) = split_declarations(declarations_from_environment(environment)?);
    modules
        .into_iter()
        .map(|(name, value)| {
            let parsed = parse_module_value(&value)
                .context(format!("Failed to parse module '{name}' from the environment"))?;
            Ok((name, parsed))
        })
        .collect()
}

/// Compiles a batch of parsed modules into the environment, in dependency
/// order, returning the new environment and a manifest of what was added.
pub fn expand_environment_with_modules(
    environment: &Value,
    files: &[SyntaxFile],
) -> Result<EnvironmentExpansion, CompileError> {
    let mut available = modules_from_environment(environment)?;
    let order = batch_compile_order(files)?;

    let mut new_environment = environment.clone();
    let mut added = Vec::with_capacity(files.len());
    for index in order {
        let file = &files[index];
        let module_name = module_name_string(&file.module.name);
        let compiled = compile_module(file, &available)?;
        let module_value = emit_module_value(&compiled);
        new_environment = with_declaration(&new_environment, &module_name, module_value.clone());
        added.push((module_name.clone(), module_value));
        available.insert(module_name, compiled);
    }
    Ok(EnvironmentExpansion {
        added,
        environment: new_environment,
    })
}

/// Orders a batch of modules so that imports within the batch come first.
/// The order is stable: modules stay in input order unless a dependency
/// forces otherwise. Import cycles are a hard error carrying the cycle path.
fn batch_compile_order(files: &[SyntaxFile]) -> Result<Vec<usize>, CompileError> {
    let batch_index: AHashMap<String, usize> = files
        .iter()
        .enumerate()
        .map(|(index, file)| (module_name_string(&file.module.name), index))
        .collect();
    let dependencies: Vec<Vec<usize>> = files
        .iter()
        .map(|file| {
            file.imports
                .iter()
                .filter_map(|import| {
                    batch_index.get(&module_name_string(&import.module_name)).copied()
                })
                .collect()
        })
        .collect();

    let mut emitted = vec![false; files.len()];
    let mut order = Vec::with_capacity(files.len());
    for _ in 0..files.len() {
        let next = (0..files.len())
            .find(|&candidate| {
                !emitted[candidate]
                    && dependencies[candidate]
                        .iter()
                        .all(|&dependency| emitted[dependency])
            });
        match next {
            Some(next) => {
                emitted[next] = true;
                order.push(next);
            }
            None => {
                return Err(CompileError::DependencyCycle(import_cycle_path(
                    files,
                    &dependencies,
                    &emitted,
                )));
            }
        }
    }
    Ok(order)
}

/// Walks the unemitted remainder of the graph to produce a concrete cycle
/// path for the error message.
fn import_cycle_path(
    files: &[SyntaxFile],
    dependencies: &[Vec<usize>],
    emitted: &[bool],
) -> Vec<String> {
    let start = (0..files.len())
        .find(|&index| !emitted[index])
        .unwrap_or_default();
    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = dependencies[current]
            .iter()
            .copied()
            .find(|&dependency| !emitted[dependency]);
        let Some(next) = next else { break };
        if let Some(position) = path.iter().position(|&seen| seen == next) {
            path.push(next);
            path.drain(..position);
            break;
        }
        path.push(next);
        current = next;
    }
    path.into_iter()
        .map(|index| module_name_string(&files[index].module.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{batch_compile_order, expand_environment_with_modules};
    use crate::errors::CompileError;
    use crate::kernel::Value;
    use crate::parse::parse_module;

    #[test]
    fn batch_order_follows_imports() {
        let files = vec![
            parse_module("module A exposing (..)\n\nimport B\n\na =\n    B.b\n").unwrap(),
            parse_module("module B exposing (..)\n\nb =\n    1\n").unwrap(),
        ];
        assert_eq!(batch_compile_order(&files).unwrap(), [1, 0]);
    }

    #[test]
    fn import_cycles_are_rejected_with_a_path() {
        let files = vec![
            parse_module("module A exposing (..)\n\nimport B\n\na =\n    1\n").unwrap(),
            parse_module("module B exposing (..)\n\nimport A\n\nb =\n    1\n").unwrap(),
        ];
        let err = batch_compile_order(&files).unwrap_err();
        let CompileError::DependencyCycle(path) = err else {
            panic!("expected a dependency cycle")
        };
        assert!(path.len() >= 2, "cycle path should name both modules: {path:?}");
    }

    #[test]
    fn expansion_adds_modules_to_the_environment() {
        let files = vec![
            parse_module("module M exposing (..)\n\nanswer =\n    Pine_kernel.int_add [ 40, 2 ]\n")
                .unwrap(),
        ];
        let expansion =
            expand_environment_with_modules(&Value::empty_list(), &files).unwrap();
        assert_eq!(expansion.added.len(), 1);
        assert_eq!(expansion.added[0].0, "M");
        let modules = super::modules_from_environment(&expansion.environment).unwrap();
        assert_eq!(
            modules["M"].functions["answer"],
            Value::from_i64(42)
        );
    }
}
