//! Operator priorities and the re-association pass.
//!
//! The parser produces operator chains right-leaning in source order; this
//! pass rotates them until the tree respects the fixed priority table and,
//! within a priority, the declared associativity. Parenthesized operands are
//! distinct nodes, so rotation can never cross explicit parentheses. The
//! rewriting is a fix point: applying it twice gives the same tree.

use crate::syntax::{Associativity, Expression, ExpressionKind, LetDeclaration, Range};

/// The fixed priority and associativity of an operator. Unknown operators
/// get application-adjacent defaults and still compile to plain function
/// calls.
pub fn operator_priority(operator: &str) -> (u8, Associativity) {
    match operator {
        "<|" => (0, Associativity::Right),
        "|>" => (0, Associativity::Left),
        "||" => (2, Associativity::Right),
        "&&" => (3, Associativity::Right),
        "==" | "/=" | "<" | ">" | "<=" | ">=" => (4, Associativity::Non),
        "++" | "::" => (5, Associativity::Right),
        "+" | "-" => (6, Associativity::Left),
        "*" | "/" | "//" => (7, Associativity::Left),
        "^" => (8, Associativity::Right),
        "<<" => (9, Associativity::Right),
        ">>" => (9, Associativity::Left),
        _ => (9, Associativity::Left),
    }
}

/// Re-associates every operator application in the expression tree.
pub fn reassociate(expression: Expression) -> Expression {
    let Expression { range, kind } = expression;
    let kind = match kind {
        ExpressionKind::OperatorApplication { operator, left, right } => {
            let left = reassociate(*left);
            let right = reassociate(*right);
            return rebalance(range, operator, left, right);
        }
        ExpressionKind::Negation(inner) => {
            ExpressionKind::Negation(Box::new(reassociate(*inner)))
        }
        ExpressionKind::Application(parts) => {
            ExpressionKind::Application(parts.into_iter().map(reassociate).collect())
        }
        ExpressionKind::If {
            condition,
            then_branch,
            else_branch,
        } => ExpressionKind::If {
            condition: Box::new(reassociate(*condition)),
            then_branch: Box::new(reassociate(*then_branch)),
            else_branch: Box::new(reassociate(*else_branch)),
        },
        ExpressionKind::LetIn { declarations, body } => ExpressionKind::LetIn {
            declarations: declarations
                .into_iter()
                .map(|declaration| match declaration {
                    LetDeclaration::Function(mut function) => {
                        function.body = reassociate(function.body);
                        LetDeclaration::Function(function)
                    }
                    LetDeclaration::Destructuring { pattern, expression } => {
                        LetDeclaration::Destructuring {
                            pattern,
                            expression: reassociate(expression),
                        }
                    }
                })
                .collect(),
            body: Box::new(reassociate(*body)),
        },
        ExpressionKind::CaseOf { subject, branches } => ExpressionKind::CaseOf {
            subject: Box::new(reassociate(*subject)),
            branches: branches
                .into_iter()
                .map(|(pattern, body)| (pattern, reassociate(body)))
                .collect(),
        },
        ExpressionKind::Lambda { parameters, body } => ExpressionKind::Lambda {
            parameters,
            body: Box::new(reassociate(*body)),
        },
        ExpressionKind::ListLiteral(items) => {
            ExpressionKind::ListLiteral(items.into_iter().map(reassociate).collect())
        }
        ExpressionKind::Tuple(items) => {
            ExpressionKind::Tuple(items.into_iter().map(reassociate).collect())
        }
        ExpressionKind::RecordLiteral(fields) => ExpressionKind::RecordLiteral(
            fields
                .into_iter()
                .map(|(name, value)| (name, reassociate(value)))
                .collect(),
        ),
        ExpressionKind::RecordUpdate { record_name, fields } => ExpressionKind::RecordUpdate {
            record_name,
            fields: fields
                .into_iter()
                .map(|(name, value)| (name, reassociate(value)))
                .collect(),
        },
        ExpressionKind::FieldAccess { record, field } => ExpressionKind::FieldAccess {
            record: Box::new(reassociate(*record)),
            field,
        },
        ExpressionKind::Parenthesized(inner) => {
            ExpressionKind::Parenthesized(Box::new(reassociate(*inner)))
        }
        other => other,
    };
    Expression { range, kind }
}

/// Restores priority order at one operator node, recursing after each
/// rotation until the node is stable.
fn rebalance(range: Range, operator: String, left: Expression, right: Expression) -> Expression {
    let (priority, associativity) = operator_priority(&operator);

    // rotate a right child upward when it binds less tightly, or equally
    // tightly under left associativity (source order: the left operator
    // appeared first)
    if let ExpressionKind::OperatorApplication {
        operator: right_operator,
        left: right_left,
        right: right_right,
    } = &right.kind
    {
        let (right_priority, _) = operator_priority(right_operator);
        let rotate = right_priority < priority
            || (right_priority == priority && associativity != Associativity::Right);
        if rotate {
            let right_operator = right_operator.clone();
            let new_left_range = left.range.spanning(right_left.range);
            let new_left = rebalance(
                new_left_range,
                operator,
                left,
                (**right_left).clone(),
            );
            return rebalance(range, right_operator, new_left, (**right_right).clone());
        }
    }

    // rotate a left child upward when it binds less tightly; with the parser
    // producing right-leaning chains this only fires on already-transformed
    // subtrees
    if let ExpressionKind::OperatorApplication {
        operator: left_operator,
        left: left_left,
        right: left_right,
    } = &left.kind
    {
        let (left_priority, left_associativity) = operator_priority(left_operator);
        let rotate = left_priority < priority
            || (left_priority == priority && left_associativity == Associativity::Right);
        if rotate {
            let left_operator = left_operator.clone();
            let new_right_range = left_right.range.spanning(right.range);
            let new_right = rebalance(new_right_range, operator, (**left_right).clone(), right);
            return rebalance(range, left_operator, (**left_left).clone(), new_right);
        }
    }

    Expression::new(
        range,
        ExpressionKind::OperatorApplication {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::reassociate;
    use crate::parse::parse_expression_text;
    use crate::syntax::{Expression, ExpressionKind};

    /// Renders the operator structure as a parenthesized string for
    /// comparison.
    fn shape(expression: &Expression) -> String {
        match &expression.kind {
            ExpressionKind::OperatorApplication { operator, left, right } => {
                format!("({} {} {})", shape(left), operator, shape(right))
            }
            ExpressionKind::FunctionOrValue { name, .. } => name.clone(),
            ExpressionKind::Integer(n) => n.to_string(),
            ExpressionKind::Parenthesized(inner) => format!("p{}", shape(inner)),
            ExpressionKind::Application(parts) => {
                let parts: Vec<_> = parts.iter().map(shape).collect();
                format!("[{}]", parts.join(" "))
            }
            other => format!("<{other:?}>"),
        }
    }

    fn reassociated(source: &str) -> String {
        shape(&reassociate(parse_expression_text(source).unwrap()))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(reassociated("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(reassociated("1 * 2 + 3"), "((1 * 2) + 3)");
    }

    #[test]
    fn equal_priority_left_associative_operators_group_left() {
        assert_eq!(reassociated("1 - 2 - 3"), "((1 - 2) - 3)");
        assert_eq!(reassociated("1 + 2 - 3 + 4"), "(((1 + 2) - 3) + 4)");
    }

    #[test]
    fn right_associative_operators_stay_right() {
        assert_eq!(reassociated("a :: b :: c"), "(a :: (b :: c))");
        assert_eq!(reassociated("x ^ y ^ z"), "(x ^ (y ^ z))");
    }

    #[test]
    fn pipelines_bind_loosest() {
        assert_eq!(reassociated("a |> f |> g"), "((a |> f) |> g)");
        assert_eq!(reassociated("f <| a + b"), "(f <| (a + b))");
        assert_eq!(reassociated("a + b |> f"), "((a + b) |> f)");
    }

    #[test]
    fn comparisons_sit_between_boolean_and_arithmetic() {
        assert_eq!(
            reassociated("a + 1 == b && c"),
            "(((a + 1) == b) && c)"
        );
    }

    #[test]
    fn parentheses_block_rotation() {
        assert_eq!(reassociated("p1 * p2"), "(p1 * p2)");
        assert_eq!(reassociated("(1 + 2) * 3"), "(p(1 + 2) * 3)");
    }

    #[test]
    fn reassociation_is_idempotent() {
        for source in [
            "1 + 2 * 3 - 4",
            "a |> f <| b",
            "a :: b ++ c :: d",
            "x && y || z == w",
            "f a + g b * h c",
        ] {
            let once = reassociate(parse_expression_text(source).unwrap());
            let twice = reassociate(once.clone());
            assert_eq!(shape(&twice), shape(&once), "source: {source}");
            assert_eq!(twice, once, "source: {source}");
        }
    }
}
