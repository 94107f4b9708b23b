//! Error types for the compiler pipeline, separating failures by stage.
//!
//! Every fallible step returns a tagged result; contextual prefixes are
//! attached at each boundary so a failure names the declaration and module it
//! occurred in. Nothing in the library panics on user input.

use std::fmt;

use crate::kernel::EvalError;
use crate::parse::ParseError;

/// Failure while compiling modules or submissions.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Modules (or value-only let declarations) form a dependency cycle.
    /// The path lists the participants in dependency order.
    DependencyCycle(Vec<String>),
    /// A reference could not be resolved in the emitter.
    UnresolvedReference { name: String, scope: String },
    /// The construct is outside the supported language subset.
    UnsupportedConstruct(String),
    /// A module value failed to parse back into a module.
    BadModuleEncoding { path: Vec<String>, reason: String },
    /// An internal assertion failed; fatal for the submission, never
    /// silently recovered.
    InvariantViolation(String),
    /// A wrapped error with a contextual prefix.
    Context {
        context: String,
        error: Box<CompileError>,
    },
}

impl CompileError {
    pub fn unresolved(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            name: name.into(),
            scope: scope.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedConstruct(what.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn bad_encoding(path: Vec<String>, reason: impl Into<String>) -> Self {
        Self::BadModuleEncoding {
            path,
            reason: reason.into(),
        }
    }

    /// Wraps the error with a contextual message prefix.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            error: Box::new(self),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyCycle(path) => {
                write!(f, "dependency cycle: {}", path.join(" -> "))
            }
            Self::UnresolvedReference { name, scope } => {
                write!(f, "unresolved reference '{name}' in {scope}")
            }
            Self::UnsupportedConstruct(what) => write!(f, "unsupported construct: {what}"),
            Self::BadModuleEncoding { path, reason } => {
                if path.is_empty() {
                    write!(f, "bad module encoding: {reason}")
                } else {
                    write!(f, "bad module encoding at {}: {reason}", path.join(" / "))
                }
            }
            Self::InvariantViolation(message) => {
                write!(f, "compiler invariant violation: {message}")
            }
            Self::Context { context, error } => write!(f, "{context}: {error}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Extension adding contextual prefixes to compile results.
pub trait ResultContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T, CompileError>;
}

impl<T> ResultContext<T> for Result<T, CompileError> {
    fn context(self, context: impl Into<String>) -> Result<T, CompileError> {
        self.map_err(|error| error.context(context))
    }
}

/// Error type for interactive submissions, separating failures by pipeline
/// stage. Keeping parse/compile/eval failures distinct lets callers handle
/// user feedback without string matching.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionError {
    /// The submission text failed to parse.
    Parse(ParseError),
    /// Compilation failed after parsing succeeded.
    Compile(CompileError),
    /// The kernel evaluator rejected the compiled program.
    Eval(EvalError),
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(error) => write!(f, "{error}"),
            Self::Compile(error) => write!(f, "compile error: {error}"),
            Self::Eval(error) => write!(f, "evaluation error: {error}"),
        }
    }
}

impl std::error::Error for SubmissionError {}

impl From<ParseError> for SubmissionError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<CompileError> for SubmissionError {
    fn from(error: CompileError) -> Self {
        Self::Compile(error)
    }
}

impl From<EvalError> for SubmissionError {
    fn from(error: EvalError) -> Self {
        Self::Eval(error)
    }
}
