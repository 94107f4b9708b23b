use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kernel::value::Value;

/// The built-in kernel function set. Every function takes exactly one
/// argument; variadic operations receive a list.
///
/// The strum derives give the canonical snake_case names used both by the
/// expression encoding and by `Pine_kernel.<name>` applications in source
/// code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum KernelFunction {
    Equal,
    Negate,
    Length,
    Skip,
    Take,
    Reverse,
    Concat,
    Head,
    IntAdd,
    IntMul,
    IntIsSortedAsc,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    BitShiftLeft,
    BitShiftRight,
}

/// A kernel expression. This is the complete instruction set of the kernel
/// VM: everything the compiler emits is built from these seven forms.
///
/// `ParseAndEval` parses its `encoded` operand (a kernel *value*) back into a
/// kernel expression and evaluates it under the value of `environment`. It is
/// the only reflection mechanism and the substrate for all recursion in
/// emitted programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    ParseAndEval {
        encoded: Box<Expr>,
        environment: Box<Expr>,
    },
    KernelFunction {
        function: KernelFunction,
        argument: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        false_branch: Box<Expr>,
        true_branch: Box<Expr>,
    },
    Environment,
    /// An opaque inspection label; the evaluator preserves the tagged
    /// expression and ignores the tag.
    StringTag { tag: String, tagged: Box<Expr> },
}

impl Expr {
    pub fn lit(value: Value) -> Self {
        Self::Literal(value)
    }

    pub fn kernel(function: KernelFunction, argument: Self) -> Self {
        Self::KernelFunction {
            function,
            argument: Box::new(argument),
        }
    }

    pub fn parse_and_eval(encoded: Self, environment: Self) -> Self {
        Self::ParseAndEval {
            encoded: Box::new(encoded),
            environment: Box::new(environment),
        }
    }

    pub fn conditional(condition: Self, true_branch: Self, false_branch: Self) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            false_branch: Box::new(false_branch),
            true_branch: Box::new(true_branch),
        }
    }

    /// `equal [a, b]`
    pub fn equal2(a: Self, b: Self) -> Self {
        Self::kernel(KernelFunction::Equal, Self::List(vec![a, b]))
    }

    pub fn head(list: Self) -> Self {
        Self::kernel(KernelFunction::Head, list)
    }

    /// `skip [n, list]`; `skip 0` is elided.
    pub fn skip(count: usize, list: Self) -> Self {
        if count == 0 {
            return list;
        }
        Self::kernel(
            KernelFunction::Skip,
            Self::List(vec![Self::lit(Value::from_i64(count as i64)), list]),
        )
    }

    pub fn take(count: usize, list: Self) -> Self {
        Self::kernel(
            KernelFunction::Take,
            Self::List(vec![Self::lit(Value::from_i64(count as i64)), list]),
        )
    }

    pub fn length(value: Self) -> Self {
        Self::kernel(KernelFunction::Length, value)
    }

    pub fn concat(parts: Vec<Self>) -> Self {
        Self::kernel(KernelFunction::Concat, Self::List(parts))
    }

    pub fn negate(value: Self) -> Self {
        Self::kernel(KernelFunction::Negate, value)
    }

    /// The `i`-th element of a list expression: `head (skip i list)`.
    pub fn item(index: usize, list: Self) -> Self {
        Self::head(Self::skip(index, list))
    }

    /// Whether the expression reads the environment anywhere. Independent
    /// expressions evaluate to the same value under any environment and are
    /// candidates for compile-time folding.
    pub fn is_independent(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Environment => false,
            Self::List(items) => items.iter().all(Self::is_independent),
            Self::ParseAndEval { encoded, environment } => {
                encoded.is_independent() && environment.is_independent()
            }
            Self::KernelFunction { argument, .. } => argument.is_independent(),
            Self::Conditional {
                condition,
                false_branch,
                true_branch,
            } => {
                condition.is_independent()
                    && false_branch.is_independent()
                    && true_branch.is_independent()
            }
            Self::StringTag { tagged, .. } => tagged.is_independent(),
        }
    }
}

/// Sentinel blobs used when inspecting encoded expressions without decoding
/// them completely.
pub fn string_as_value_literal() -> Value {
    Value::name("Literal")
}

pub fn string_as_value_list() -> Value {
    Value::name("List")
}

pub fn string_as_value_function() -> Value {
    Value::name(crate::kernel::value::FUNCTION_TAG)
}

/// Encodes a kernel expression as a kernel value. The encoding is a tagged
/// list per variant, so any expression can be carried inside a program as a
/// literal and revived with `ParseAndEval`.
pub fn encode(expr: &Expr) -> Value {
    match expr {
        Expr::Literal(value) => Value::tag("Literal", vec![value.clone()]),
        Expr::List(items) => {
            Value::tag("List", vec![Value::List(items.iter().map(encode).collect())])
        }
        Expr::ParseAndEval { encoded, environment } => {
            Value::tag("ParseAndEval", vec![encode(encoded), encode(environment)])
        }
        Expr::KernelFunction { function, argument } => Value::tag(
            "KernelFunction",
            vec![Value::name(function.into()), encode(argument)],
        ),
        Expr::Conditional {
            condition,
            false_branch,
            true_branch,
        } => Value::tag(
            "Conditional",
            vec![encode(condition), encode(false_branch), encode(true_branch)],
        ),
        Expr::Environment => Value::tag("Environment", Vec::new()),
        Expr::StringTag { tag, tagged } => {
            Value::tag("StringTag", vec![Value::name(tag), encode(tagged)])
        }
    }
}

/// Failure while decoding a kernel value back into an expression. Carries a
/// breadcrumb of the path taken into the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub path: Vec<String>,
    pub reason: String,
}

impl DecodeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            reason: reason.into(),
        }
    }

    fn in_path(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "at {}: {}", self.path.join(" / "), self.reason)
        }
    }
}

impl std::error::Error for DecodeError {}

/// Parses a kernel value produced by [`encode`] back into an expression.
pub fn decode(value: &Value) -> Result<Expr, DecodeError> {
    let (tag, args) = value
        .as_tagged()
        .ok_or_else(|| DecodeError::new("expected a tagged expression list"))?;
    match (tag, args) {
        ("Literal", [literal]) => Ok(Expr::Literal(literal.clone())),
        ("List", [Value::List(items)]) => {
            let items = items
                .iter()
                .enumerate()
                .map(|(i, item)| decode(item).map_err(|e| e.in_path(format!("list item {i}"))))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::List(items))
        }
        ("ParseAndEval", [encoded, environment]) => Ok(Expr::ParseAndEval {
            encoded: Box::new(decode(encoded).map_err(|e| e.in_path("parse-and-eval expression"))?),
            environment: Box::new(
                decode(environment).map_err(|e| e.in_path("parse-and-eval environment"))?,
            ),
        }),
        ("KernelFunction", [name, argument]) => {
            let name = name
                .as_name()
                .ok_or_else(|| DecodeError::new("kernel function name is not a UTF-8 blob"))?;
            let function = name
                .parse::<KernelFunction>()
                .map_err(|_| DecodeError::new(format!("unknown kernel function '{name}'")))?;
            Ok(Expr::KernelFunction {
                function,
                argument: Box::new(
                    decode(argument).map_err(|e| e.in_path("kernel function argument"))?,
                ),
            })
        }
        ("Conditional", [condition, false_branch, true_branch]) => Ok(Expr::Conditional {
            condition: Box::new(decode(condition).map_err(|e| e.in_path("condition"))?),
            false_branch: Box::new(decode(false_branch).map_err(|e| e.in_path("false branch"))?),
            true_branch: Box::new(decode(true_branch).map_err(|e| e.in_path("true branch"))?),
        }),
        ("Environment", []) => Ok(Expr::Environment),
        ("StringTag", [tag_name, tagged]) => {
            let tag_name = tag_name
                .as_name()
                .ok_or_else(|| DecodeError::new("string tag is not a UTF-8 blob"))?;
            Ok(Expr::StringTag {
                tag: tag_name.to_owned(),
                tagged: Box::new(decode(tagged).map_err(|e| e.in_path("tagged expression"))?),
            })
        }
        (other, _) => Err(DecodeError::new(format!(
            "unknown expression tag '{other}' (or wrong argument count)"
        ))),
    }
}
