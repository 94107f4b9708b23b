//! Pattern compilation: a surface pattern becomes a list of tests against a
//! case subject and a list of name bindings, both expressed as
//! deconstruction paths from the subject.

use crate::errors::CompileError;
use crate::ir::{Deconstruction, Expr};
use crate::kernel::Value;
use crate::routines::record_field_access_routine;
use crate::syntax::{Pattern, PatternKind};

/// One check a subject value must pass for the pattern to match, rooted at a
/// deconstruction path from the subject.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternTest {
    /// Equality against a literal value.
    Equals(Value),
    /// The value is a non-empty list (`skip 1` changes it).
    IsNonEmpty,
    /// The value is a list of exactly this length.
    LengthIs(usize),
    /// The value is a tagged list with this tag name as its head.
    TagIs(String),
}

/// The compiled form of a pattern: tests plus the bindings it introduces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternPlan {
    pub tests: Vec<(Vec<Deconstruction>, PatternTest)>,
    pub bindings: Vec<(String, Vec<Deconstruction>)>,
}

impl PatternPlan {
    /// Whether the pattern matches any value without inspection.
    pub fn is_irrefutable(&self) -> bool {
        self.tests.is_empty()
    }

    /// Folds all tests into a single boolean condition over the subject, or
    /// `None` when the pattern is irrefutable.
    pub fn condition(&self, subject: &Expr) -> Option<Expr> {
        let mut conditions = self.tests.iter().map(|(path, test)| {
            let value = subject.clone().deconstructed(path);
            match test {
                PatternTest::Equals(literal) => Expr::equal2(value, Expr::lit(literal.clone())),
                PatternTest::IsNonEmpty => {
                    Expr::negate(Expr::equal2(value.clone(), Expr::skip(1, value)))
                }
                PatternTest::LengthIs(length) => Expr::equal2(
                    Expr::length(value),
                    Expr::lit(Value::from_i64(*length as i64)),
                ),
                PatternTest::TagIs(tag) => {
                    Expr::equal2(Expr::lit(Value::name(tag)), Expr::head(value))
                }
            }
        });
        let first = conditions.next()?;
        // fold into a boolean chain instead of nesting the branch bodies
        Some(conditions.fold(first, |acc, condition| {
            Expr::conditional(acc, condition, Expr::lit(Value::false_value()))
        }))
    }
}

/// Compiles a pattern into its plan. Paths are relative to the case subject
/// (or function argument) the pattern scrutinizes.
pub fn plan_pattern(pattern: &Pattern) -> Result<PatternPlan, CompileError> {
    let mut plan = PatternPlan::default();
    plan_into(pattern, &mut Vec::new(), &mut plan)?;
    Ok(plan)
}

fn plan_into(
    pattern: &Pattern,
    path: &mut Vec<Deconstruction>,
    plan: &mut PatternPlan,
) -> Result<(), CompileError> {
    match &pattern.kind {
        PatternKind::All | PatternKind::Unit => {}
        PatternKind::Var(name) => {
            plan.bindings.push((name.clone(), path.clone()));
        }
        PatternKind::As { pattern, name } => {
            plan.bindings.push((name.clone(), path.clone()));
            plan_into(pattern, path, plan)?;
        }
        PatternKind::Parenthesized(inner) => plan_into(inner, path, plan)?,
        PatternKind::Int(n) => {
            plan.tests
                .push((path.clone(), PatternTest::Equals(Value::from_bigint(n))));
        }
        PatternKind::Character(c) => {
            plan.tests
                .push((path.clone(), PatternTest::Equals(Value::from_char(*c))));
        }
        PatternKind::StringLiteral(s) => {
            plan.tests
                .push((path.clone(), PatternTest::Equals(Value::string(s))));
        }
        PatternKind::Float(_) => {
            return Err(CompileError::unsupported("floating-point literal in pattern"));
        }
        PatternKind::List(items) if items.is_empty() => {
            plan.tests
                .push((path.clone(), PatternTest::Equals(Value::empty_list())));
        }
        PatternKind::List(items) | PatternKind::Tuple(items) => {
            plan.tests
                .push((path.clone(), PatternTest::LengthIs(items.len())));
            for (index, item) in items.iter().enumerate() {
                path.push(Deconstruction::ListItem(index));
                plan_into(item, path, plan)?;
                path.pop();
            }
        }
        PatternKind::UnCons { head, tail } => {
            plan.tests.push((path.clone(), PatternTest::IsNonEmpty));
            path.push(Deconstruction::ListItem(0));
            plan_into(head, path, plan)?;
            path.pop();
            path.push(Deconstruction::SkipItems(1));
            plan_into(tail, path, plan)?;
            path.pop();
        }
        PatternKind::Named { name, arguments, .. } => {
            // the boolean tags have literal representations, not tagged lists
            match name.as_str() {
                "True" if arguments.is_empty() => {
                    plan.tests
                        .push((path.clone(), PatternTest::Equals(Value::true_value())));
                    return Ok(());
                }
                "False" if arguments.is_empty() => {
                    plan.tests
                        .push((path.clone(), PatternTest::Equals(Value::false_value())));
                    return Ok(());
                }
                _ => {}
            }
            plan.tests.push((path.clone(), PatternTest::TagIs(name.clone())));
            for (index, argument) in arguments.iter().enumerate() {
                path.push(Deconstruction::ListItem(1));
                path.push(Deconstruction::ListItem(index));
                plan_into(argument, path, plan)?;
                path.pop();
                path.pop();
            }
        }
        PatternKind::Record(fields) => {
            for field in fields {
                let mut field_path = path.clone();
                field_path.push(Deconstruction::KernelRoutine(record_field_access_routine(
                    field,
                )));
                plan.bindings.push((field.clone(), field_path));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{PatternTest, plan_pattern};
    use crate::ir::Deconstruction;
    use crate::kernel::Value;
    use crate::parse::parse_expression_text;
    use crate::syntax::ExpressionKind;

    fn plan_of(source: &str) -> super::PatternPlan {
        // parse a one-branch case to get a pattern out of the parser
        let expr = parse_expression_text(&format!("case x of\n    {source} ->\n        0\n"))
            .unwrap();
        let ExpressionKind::CaseOf { branches, .. } = expr.kind else {
            panic!("expected case-of")
        };
        plan_pattern(&branches[0].0).unwrap()
    }

    #[test]
    fn wildcard_and_variables_have_no_tests() {
        assert!(plan_of("_").is_irrefutable());
        let plan = plan_of("x");
        assert!(plan.is_irrefutable());
        assert_eq!(plan.bindings, [("x".to_owned(), Vec::new())]);
    }

    #[test]
    fn empty_list_is_a_single_equality() {
        let plan = plan_of("[]");
        assert_eq!(
            plan.tests,
            [(Vec::new(), PatternTest::Equals(Value::empty_list()))]
        );
    }

    #[test]
    fn uncons_checks_non_empty_and_binds_head_and_tail() {
        let plan = plan_of("x :: rest");
        assert_eq!(plan.tests, [(Vec::new(), PatternTest::IsNonEmpty)]);
        assert_eq!(
            plan.bindings,
            [
                ("x".to_owned(), vec![Deconstruction::ListItem(0)]),
                ("rest".to_owned(), vec![Deconstruction::SkipItems(1)]),
            ]
        );
    }

    #[test]
    fn tag_patterns_check_the_head_and_descend_into_arguments() {
        let plan = plan_of("Just n");
        assert_eq!(
            plan.tests,
            [(Vec::new(), PatternTest::TagIs("Just".to_owned()))]
        );
        assert_eq!(
            plan.bindings,
            [(
                "n".to_owned(),
                vec![Deconstruction::ListItem(1), Deconstruction::ListItem(0)]
            )]
        );
    }

    #[test]
    fn boolean_tags_compare_against_the_literal_booleans() {
        let plan = plan_of("True");
        assert_eq!(
            plan.tests,
            [(Vec::new(), PatternTest::Equals(Value::true_value()))]
        );
    }

    #[test]
    fn tuples_check_length_and_positions() {
        let plan = plan_of("( a, b )");
        assert_eq!(plan.tests, [(Vec::new(), PatternTest::LengthIs(2))]);
        assert_eq!(plan.bindings.len(), 2);
    }

    #[test]
    fn as_patterns_bind_the_whole_subject() {
        let plan = plan_of("( a, _ ) as pair");
        assert!(plan.bindings.iter().any(|(name, path)| name == "pair" && path.is_empty()));
    }
}
