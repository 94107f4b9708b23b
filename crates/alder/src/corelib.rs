//! The bundled core modules, compiled into every fresh environment.
//!
//! The sources are embedded at build time and compiled once per process; the
//! resulting environment value is cached and cloned into new sessions. The
//! list is in compile order: later modules may reference earlier ones
//! through the auto-import table.

use std::sync::OnceLock;

use crate::environment::declarations_from_environment;
use crate::errors::SubmissionError;
use crate::kernel::Value;
use crate::parse::parse_module;
use crate::project::expand_environment_with_modules;

pub const CORE_MODULE_SOURCES: &[(&str, &str)] = &[
    ("Basics", include_str!("core/Basics.elm")),
    ("Tuple", include_str!("core/Tuple.elm")),
    ("Char", include_str!("core/Char.elm")),
    ("Maybe", include_str!("core/Maybe.elm")),
    ("List", include_str!("core/List.elm")),
    ("String", include_str!("core/String.elm")),
    ("Result", include_str!("core/Result.elm")),
];

/// Compiles the bundled core modules into an environment value. The result
/// is cached process-wide.
pub fn bootstrap_environment() -> Result<Value, SubmissionError> {
    static BOOTSTRAPPED: OnceLock<Result<Value, SubmissionError>> = OnceLock::new();
    BOOTSTRAPPED
        .get_or_init(|| {
            let files = CORE_MODULE_SOURCES
                .iter()
                .map(|(_, source)| parse_module(source))
                .collect::<Result<Vec<_>, _>>()?;
            let expansion = expand_environment_with_modules(&Value::empty_list(), &files)?;
            Ok(expansion.environment)
        })
        .clone()
}

/// True when the environment has no declarations yet and needs the core
/// modules.
pub fn environment_is_empty(environment: &Value) -> bool {
    declarations_from_environment(environment)
        .map(|declarations| declarations.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{CORE_MODULE_SOURCES, bootstrap_environment};
    use crate::environment::declarations_from_environment;

    #[test]
    fn core_modules_compile_into_the_environment() {
        let environment = bootstrap_environment().unwrap();
        let declarations = declarations_from_environment(&environment).unwrap();
        let names: Vec<&str> = declarations.iter().map(|(name, _)| name.as_str()).collect();
        for (module, _) in CORE_MODULE_SOURCES {
            assert!(names.contains(module), "missing core module {module}");
        }
    }
}
