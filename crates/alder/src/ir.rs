//! The intermediate representation between the front compiler and the back
//! emitter, plus the module model both share.

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::kernel::{self, KernelFunction, Value};

/// A deconstruction step projecting a sub-value out of a parameter or case
/// subject. Steps compose left to right.
#[derive(Debug, Clone, PartialEq)]
pub enum Deconstruction {
    /// Take the element at this index.
    ListItem(usize),
    /// Drop this many leading elements.
    SkipItems(usize),
    /// Apply a prebuilt kernel subroutine to the value.
    KernelRoutine(kernel::Expr),
}

/// One positional parameter of a function: the bindings its pattern
/// introduces, each with the deconstruction path from the argument.
pub type FunctionParameter = Vec<(String, Vec<Deconstruction>)>;

/// The compiler's intermediate expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    KernelApplication {
        function: KernelFunction,
        argument: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        true_branch: Box<Expr>,
        false_branch: Box<Expr>,
    },
    /// Reference to a binding in an enclosing scope: a parameter, a let or
    /// module declaration, or an imported function.
    Reference(String),
    Function {
        parameters: Vec<FunctionParameter>,
        body: Box<Expr>,
    },
    /// Application kept distinct from anonymous functions so full
    /// applications can be emitted without the trampoline.
    Application {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    /// A mutually recursive let or module block.
    DeclarationBlock {
        declarations: IndexMap<String, Expr>,
        body: Box<Expr>,
    },
    /// Application of a prebuilt kernel subroutine (record access/update).
    KernelRoutine {
        routine: kernel::Expr,
        argument: Box<Expr>,
    },
    StringTag {
        tag: String,
        tagged: Box<Expr>,
    },
}

impl Expr {
    pub fn lit(value: Value) -> Self {
        Self::Literal(value)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference(name.into())
    }

    pub fn kernel(function: KernelFunction, argument: Self) -> Self {
        Self::KernelApplication {
            function,
            argument: Box::new(argument),
        }
    }

    pub fn conditional(condition: Self, true_branch: Self, false_branch: Self) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            true_branch: Box::new(true_branch),
            false_branch: Box::new(false_branch),
        }
    }

    pub fn apply(function: Self, arguments: Vec<Self>) -> Self {
        Self::Application {
            function: Box::new(function),
            arguments,
        }
    }

    pub fn equal2(a: Self, b: Self) -> Self {
        Self::kernel(KernelFunction::Equal, Self::List(vec![a, b]))
    }

    pub fn head(list: Self) -> Self {
        Self::kernel(KernelFunction::Head, list)
    }

    pub fn skip(count: usize, list: Self) -> Self {
        if count == 0 {
            return list;
        }
        Self::kernel(
            KernelFunction::Skip,
            Self::List(vec![Self::lit(Value::from_i64(count as i64)), list]),
        )
    }

    pub fn length(value: Self) -> Self {
        Self::kernel(KernelFunction::Length, value)
    }

    pub fn negate(value: Self) -> Self {
        Self::kernel(KernelFunction::Negate, value)
    }

    /// Applies a deconstruction path to this expression.
    pub fn deconstructed(self, path: &[Deconstruction]) -> Self {
        path.iter().fold(self, |expr, step| match step {
            Deconstruction::ListItem(index) => Self::head(Self::skip(*index, expr)),
            Deconstruction::SkipItems(count) => Self::skip(*count, expr),
            Deconstruction::KernelRoutine(routine) => Self::KernelRoutine {
                routine: routine.clone(),
                argument: Box::new(Self::List(vec![expr])),
            },
        })
    }

    /// Collects free references: names used but not bound by any enclosing
    /// parameter or declaration block within this expression.
    pub fn free_references(&self) -> AHashSet<String> {
        let mut free = AHashSet::new();
        let mut bound = Vec::new();
        self.collect_free(&mut bound, &mut free);
        free
    }

    fn collect_free(&self, bound: &mut Vec<String>, free: &mut AHashSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Reference(name) => {
                if !bound.iter().any(|b| b == name) {
                    free.insert(name.clone());
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_free(bound, free);
                }
            }
            Self::KernelApplication { argument, .. } => argument.collect_free(bound, free),
            Self::Conditional {
                condition,
                true_branch,
                false_branch,
            } => {
                condition.collect_free(bound, free);
                true_branch.collect_free(bound, free);
                false_branch.collect_free(bound, free);
            }
            Self::Function { parameters, body } => {
                let before = bound.len();
                for parameter in parameters {
                    for (name, _) in parameter {
                        bound.push(name.clone());
                    }
                }
                body.collect_free(bound, free);
                bound.truncate(before);
            }
            Self::Application { function, arguments } => {
                function.collect_free(bound, free);
                for argument in arguments {
                    argument.collect_free(bound, free);
                }
            }
            Self::DeclarationBlock { declarations, body } => {
                let before = bound.len();
                for name in declarations.keys() {
                    bound.push(name.clone());
                }
                for declaration in declarations.values() {
                    declaration.collect_free(bound, free);
                }
                body.collect_free(bound, free);
                bound.truncate(before);
            }
            Self::KernelRoutine { argument, .. } => argument.collect_free(bound, free),
            Self::StringTag { tagged, .. } => tagged.collect_free(bound, free),
        }
    }

    /// Counts application sites, used to choose between the inline and the
    /// shared-subject form of a compiled case expression.
    pub fn count_applications(&self) -> usize {
        match self {
            Self::Literal(_) | Self::Reference(_) => 0,
            Self::List(items) => items.iter().map(Self::count_applications).sum(),
            Self::KernelApplication { argument, .. } => argument.count_applications(),
            Self::Conditional {
                condition,
                true_branch,
                false_branch,
            } => {
                condition.count_applications()
                    + true_branch.count_applications()
                    + false_branch.count_applications()
            }
            Self::Function { body, .. } => body.count_applications(),
            Self::Application { function, arguments } => {
                1 + function.count_applications()
                    + arguments.iter().map(Self::count_applications).sum::<usize>()
            }
            Self::DeclarationBlock { declarations, body } => {
                declarations.values().map(Self::count_applications).sum::<usize>()
                    + body.count_applications()
            }
            Self::KernelRoutine { argument, .. } => 1 + argument.count_applications(),
            Self::StringTag { tagged, .. } => tagged.count_applications(),
        }
    }
}

/// A type declaration carried through module values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDecl {
    ChoiceType { tags: IndexMap<String, usize> },
    RecordType { fields: Vec<String> },
}

/// A module mid-compilation and post-parse: its compiled function values and
/// its type declarations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleInCompilation {
    pub functions: IndexMap<String, Value>,
    pub types: IndexMap<String, TypeDecl>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Deconstruction, Expr};
    use crate::kernel::KernelFunction;

    #[test]
    fn free_references_respect_binders() {
        let expr = Expr::Function {
            parameters: vec![vec![("x".to_owned(), Vec::new())]],
            body: Box::new(Expr::apply(
                Expr::reference("f"),
                vec![Expr::reference("x"), Expr::reference("y")],
            )),
        };
        let free = expr.free_references();
        let mut names: Vec<_> = free.into_iter().collect();
        names.sort();
        assert_eq!(names, ["f", "y"]);
    }

    #[test]
    fn block_declarations_bind_their_own_bodies() {
        let mut declarations = indexmap::IndexMap::new();
        declarations.insert("go".to_owned(), Expr::apply(Expr::reference("go"), vec![]));
        let block = Expr::DeclarationBlock {
            declarations,
            body: Box::new(Expr::apply(Expr::reference("go"), vec![Expr::reference("seed")])),
        };
        let free = block.free_references();
        assert!(free.contains("seed"));
        assert!(!free.contains("go"));
    }

    #[test]
    fn deconstruction_paths_compose_left_to_right() {
        let expr = Expr::reference("subject")
            .deconstructed(&[Deconstruction::SkipItems(1), Deconstruction::ListItem(2)]);
        // skip 1, then take element 2 of the remainder
        let Expr::KernelApplication { function, .. } = &expr else {
            panic!("expected the outer head application")
        };
        assert_eq!(*function, KernelFunction::Head);
        assert_eq!(expr.count_applications(), 0);
    }
}
