//! Local reductions over emitted kernel expressions.
//!
//! Two families, both strictly local:
//! - constant folding: an independent subexpression evaluates to the same
//!   value under any environment, so it can be evaluated now. This is what
//!   elides the trampoline for applications whose callee turns out to be a
//!   closed function record.
//! - `ParseAndEval` expansion: an encoded literal operand is decoded and the
//!   environment operand substituted for its `Environment` nodes, bounded in
//!   depth by the encoded operand's size.

use crate::kernel::{Expr, Value, decode, evaluate};

/// Above this size (in value units) an encoded operand is only expanded one
/// level deep; below it, two.
const EXPANSION_SIZE_LIMIT: usize = 10_000;

/// Expanding an encoded body duplicates the environment operand once per
/// `Environment` node; past this body size the duplication is not worth it
/// unless the whole node folds to a constant anyway.
const INLINE_BODY_SIZE_LIMIT: usize = 100;

/// Applies local reductions bottom-up until the expression is stable.
pub fn reduce(expr: Expr) -> Expr {
    reduce_with_depth(expr, 2)
}

fn reduce_with_depth(expr: Expr, depth: usize) -> Expr {
    let expr = match expr {
        Expr::List(items) => {
            let items: Vec<Expr> = items
                .into_iter()
                .map(|item| reduce_with_depth(item, depth))
                .collect();
            // a list of literals is itself a literal
            if items.iter().all(|item| matches!(item, Expr::Literal(_))) {
                let values = items
                    .into_iter()
                    .map(|item| match item {
                        Expr::Literal(value) => value,
                        _ => unreachable!("all items are literals"),
                    })
                    .collect();
                return Expr::lit(Value::List(values));
            }
            Expr::List(items)
        }
        Expr::KernelFunction { function, argument } => Expr::KernelFunction {
            function,
            argument: Box::new(reduce_with_depth(*argument, depth)),
        },
        Expr::Conditional {
            condition,
            false_branch,
            true_branch,
        } => {
            let condition = reduce_with_depth(*condition, depth);
            if let Expr::Literal(value) = &condition {
                let branch = if value.is_true() { true_branch } else { false_branch };
                return reduce_with_depth(*branch, depth);
            }
            Expr::Conditional {
                condition: Box::new(condition),
                false_branch: Box::new(reduce_with_depth(*false_branch, depth)),
                true_branch: Box::new(reduce_with_depth(*true_branch, depth)),
            }
        }
        Expr::ParseAndEval { encoded, environment } => {
            let encoded = reduce_with_depth(*encoded, depth);
            let environment = reduce_with_depth(*environment, depth);
            if depth > 0 {
                if let Some(expanded) = expand_parse_and_eval(&encoded, &environment, depth) {
                    return expanded;
                }
            }
            Expr::ParseAndEval {
                encoded: Box::new(encoded),
                environment: Box::new(environment),
            }
        }
        Expr::StringTag { tag, tagged } => Expr::StringTag {
            tag,
            tagged: Box::new(reduce_with_depth(*tagged, depth)),
        },
        other => other,
    };
    fold_independent(expr)
}

/// Evaluates an independent non-literal expression to its value. Failures
/// (and expressions that would only fail at runtime) leave the expression
/// untouched so the error surfaces where the program actually runs.
fn fold_independent(expr: Expr) -> Expr {
    match &expr {
        Expr::Literal(_) | Expr::Environment => return expr,
        Expr::KernelFunction { .. } | Expr::ParseAndEval { .. } | Expr::Conditional { .. } => {}
        // bare lists and tags carry no computation worth folding here
        Expr::List(_) | Expr::StringTag { .. } => return expr,
    }
    if !expr.is_independent() {
        return expr;
    }
    match evaluate(&Value::empty_list(), &expr) {
        Ok(value) => Expr::lit(value),
        Err(_) => expr,
    }
}

/// Expands `ParseAndEval` with a literal encoded operand by substituting the
/// environment operand into the decoded body.
fn expand_parse_and_eval(encoded: &Expr, environment: &Expr, depth: usize) -> Option<Expr> {
    let Expr::Literal(encoded_value) = encoded else {
        return None;
    };
    let body = decode(encoded_value).ok()?;
    // expanding duplicates the environment operand once per Environment node
    // in the body; only worth it for small bodies, unless the whole call is
    // closed and will fold to a constant anyway
    let closed = environment_count(&body) == 0 || environment.is_independent();
    if !closed && kernel_size(&body) > INLINE_BODY_SIZE_LIMIT {
        return None;
    }
    let next_depth = if encoded_value.size_units() > EXPANSION_SIZE_LIMIT {
        0
    } else {
        depth - 1
    };
    let substituted = substitute_environment(body, environment);
    Some(reduce_with_depth(substituted, next_depth))
}

fn environment_count(expr: &Expr) -> usize {
    match expr {
        Expr::Environment => 1,
        Expr::Literal(_) => 0,
        Expr::List(items) => items.iter().map(environment_count).sum(),
        Expr::KernelFunction { argument, .. } => environment_count(argument),
        Expr::ParseAndEval { encoded, environment } => {
            environment_count(encoded) + environment_count(environment)
        }
        Expr::Conditional {
            condition,
            false_branch,
            true_branch,
        } => {
            environment_count(condition)
                + environment_count(false_branch)
                + environment_count(true_branch)
        }
        Expr::StringTag { tagged, .. } => environment_count(tagged),
    }
}

fn kernel_size(expr: &Expr) -> usize {
    match expr {
        Expr::Literal(value) => value.size_units(),
        Expr::Environment => 1,
        Expr::List(items) => 1 + items.iter().map(kernel_size).sum::<usize>(),
        Expr::KernelFunction { argument, .. } => 1 + kernel_size(argument),
        Expr::ParseAndEval { encoded, environment } => {
            1 + kernel_size(encoded) + kernel_size(environment)
        }
        Expr::Conditional {
            condition,
            false_branch,
            true_branch,
        } => 1 + kernel_size(condition) + kernel_size(false_branch) + kernel_size(true_branch),
        Expr::StringTag { tagged, .. } => 1 + kernel_size(tagged),
    }
}

/// Replaces every `Environment` node with the given expression. Nested
/// `ParseAndEval` operands are expressions evaluated in the same
/// environment, so substitution descends into them as well.
fn substitute_environment(expr: Expr, replacement: &Expr) -> Expr {
    match expr {
        Expr::Environment => replacement.clone(),
        Expr::Literal(_) => expr,
        Expr::List(items) => Expr::List(
            items
                .into_iter()
                .map(|item| substitute_environment(item, replacement))
                .collect(),
        ),
        Expr::KernelFunction { function, argument } => Expr::KernelFunction {
            function,
            argument: Box::new(substitute_environment(*argument, replacement)),
        },
        Expr::ParseAndEval { encoded, environment } => Expr::ParseAndEval {
            encoded: Box::new(substitute_environment(*encoded, replacement)),
            environment: Box::new(substitute_environment(*environment, replacement)),
        },
        Expr::Conditional {
            condition,
            false_branch,
            true_branch,
        } => Expr::Conditional {
            condition: Box::new(substitute_environment(*condition, replacement)),
            false_branch: Box::new(substitute_environment(*false_branch, replacement)),
            true_branch: Box::new(substitute_environment(*true_branch, replacement)),
        },
        Expr::StringTag { tag, tagged } => Expr::StringTag {
            tag,
            tagged: Box::new(substitute_environment(*tagged, replacement)),
        },
    }
}
