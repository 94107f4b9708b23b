use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Zero};
use smallvec::SmallVec;

use crate::kernel::{
    expr::{DecodeError, Expr, KernelFunction, decode},
    value::Value,
};

/// Limits enforced while evaluating. The only resource the big-step reducer
/// can exhaust without bound is `ParseAndEval` nesting, which is where all
/// emitted recursion lives.
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    pub max_parse_and_eval_depth: usize,
}

pub const DEFAULT_MAX_PARSE_AND_EVAL_DEPTH: usize = 512;

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_parse_and_eval_depth: DEFAULT_MAX_PARSE_AND_EVAL_DEPTH,
        }
    }
}

/// Failure while evaluating a kernel expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A `ParseAndEval` operand did not decode into an expression.
    Decode(DecodeError),
    /// `ParseAndEval` nesting exceeded the configured limit.
    DepthExceeded(usize),
    /// A kernel function received an argument outside its domain.
    InvalidKernelArgument {
        function: KernelFunction,
        message: String,
    },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "failed to parse expression value: {err}"),
            Self::DepthExceeded(limit) => {
                write!(f, "parse-and-eval depth exceeded the limit of {limit}")
            }
            Self::InvalidKernelArgument { function, message } => {
                write!(f, "invalid argument for kernel function {function}: {message}")
            }
        }
    }
}

impl std::error::Error for EvalError {}

impl From<DecodeError> for EvalError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// Evaluates an expression under an environment value with default limits.
pub fn evaluate(environment: &Value, expr: &Expr) -> Result<Value, EvalError> {
    evaluate_with_limits(environment, expr, EvalLimits::default())
}

/// Evaluates an expression under an environment value. The reducer is a
/// plain big-step interpreter: it blocks until completion, touches nothing
/// but its inputs, and reports the first failure it encounters.
pub fn evaluate_with_limits(
    environment: &Value,
    expr: &Expr,
    limits: EvalLimits,
) -> Result<Value, EvalError> {
    let mut state = EvalState { limits, depth: 0 };
    state.eval(environment, expr)
}

struct EvalState {
    limits: EvalLimits,
    depth: usize,
}

impl EvalState {
    fn eval(&mut self, env: &Value, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(env, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Environment => Ok(env.clone()),
            Expr::Conditional {
                condition,
                false_branch,
                true_branch,
            } => {
                if self.eval(env, condition)?.is_true() {
                    self.eval(env, true_branch)
                } else {
                    self.eval(env, false_branch)
                }
            }
            Expr::StringTag { tagged, .. } => self.eval(env, tagged),
            Expr::KernelFunction { function, argument } => {
                let argument = self.eval(env, argument)?;
                apply_kernel_function(*function, &argument)
            }
            Expr::ParseAndEval { encoded, environment } => {
                let encoded = self.eval(env, encoded)?;
                let inner_env = self.eval(env, environment)?;
                let inner_expr = decode(&encoded)?;
                if self.depth >= self.limits.max_parse_and_eval_depth {
                    return Err(EvalError::DepthExceeded(self.limits.max_parse_and_eval_depth));
                }
                self.depth += 1;
                let result = self.eval(&inner_env, &inner_expr);
                self.depth -= 1;
                result
            }
        }
    }
}

fn invalid(function: KernelFunction, message: impl Into<String>) -> EvalError {
    EvalError::InvalidKernelArgument {
        function,
        message: message.into(),
    }
}

fn int_list(function: KernelFunction, argument: &Value) -> Result<SmallVec<[BigInt; 4]>, EvalError> {
    let items = argument
        .as_list()
        .ok_or_else(|| invalid(function, "expected a list argument"))?;
    items
        .iter()
        .map(|item| {
            item.as_bigint()
                .ok_or_else(|| invalid(function, format!("expected an integer blob, got {item}")))
        })
        .collect()
}

fn skip_take_operands(
    function: KernelFunction,
    argument: &Value,
) -> Result<(usize, Value), EvalError> {
    let [count, value] = argument
        .as_list()
        .ok_or_else(|| invalid(function, "expected [count, value]"))?
    else {
        return Err(invalid(function, "expected exactly two operands"));
    };
    let count = count
        .as_bigint()
        .ok_or_else(|| invalid(function, "count is not an integer"))?;
    let count = if count.sign() == num_bigint::Sign::Minus {
        0
    } else {
        num_traits::ToPrimitive::to_usize(&count).unwrap_or(usize::MAX)
    };
    Ok((count, value.clone()))
}

fn apply_kernel_function(function: KernelFunction, argument: &Value) -> Result<Value, EvalError> {
    use KernelFunction as K;
    match function {
        K::Equal => {
            let items = argument
                .as_list()
                .ok_or_else(|| invalid(function, "expected a list of values"))?;
            let all_equal = items.windows(2).all(|pair| pair[0] == pair[1]);
            Ok(Value::bool_value(all_equal))
        }
        K::Negate => match argument {
            Value::Blob(bytes) if bytes.first() == Some(&4) => {
                let mut bytes = bytes.clone();
                bytes[0] = 2;
                Ok(Value::Blob(bytes))
            }
            Value::Blob(bytes) if bytes.first() == Some(&2) => {
                let mut bytes = bytes.clone();
                bytes[0] = 4;
                Ok(Value::Blob(bytes))
            }
            _ => Err(invalid(function, "expected an integer or boolean blob")),
        },
        K::Length => {
            let length = match argument {
                Value::Blob(bytes) => bytes.len(),
                Value::List(items) => items.len(),
            };
            Ok(Value::from_i64(length as i64))
        }
        K::Skip => {
            let (count, value) = skip_take_operands(function, argument)?;
            Ok(match value {
                Value::Blob(bytes) => Value::Blob(bytes.get(count.min(bytes.len())..).unwrap_or(&[]).to_vec()),
                Value::List(items) => {
                    Value::List(items.get(count.min(items.len())..).unwrap_or(&[]).to_vec())
                }
            })
        }
        K::Take => {
            let (count, value) = skip_take_operands(function, argument)?;
            Ok(match value {
                Value::Blob(bytes) => Value::Blob(bytes[..count.min(bytes.len())].to_vec()),
                Value::List(items) => Value::List(items[..count.min(items.len())].to_vec()),
            })
        }
        K::Reverse => Ok(match argument {
            Value::Blob(bytes) => Value::Blob(bytes.iter().rev().copied().collect()),
            Value::List(items) => Value::List(items.iter().rev().cloned().collect()),
        }),
        K::Concat => {
            let parts = argument
                .as_list()
                .ok_or_else(|| invalid(function, "expected a list of parts"))?;
            match parts.first() {
                None => Ok(Value::empty_list()),
                Some(Value::Blob(_)) => {
                    // parts of the other shape are skipped rather than failing
                    let mut bytes = Vec::new();
                    for part in parts {
                        if let Value::Blob(more) = part {
                            bytes.extend_from_slice(more);
                        }
                    }
                    Ok(Value::Blob(bytes))
                }
                Some(Value::List(_)) => {
                    let mut items = Vec::new();
                    for part in parts {
                        if let Value::List(more) = part {
                            items.extend_from_slice(more);
                        }
                    }
                    Ok(Value::List(items))
                }
            }
        }
        K::Head => Ok(match argument {
            Value::List(items) => items.first().cloned().unwrap_or_else(Value::empty_list),
            Value::Blob(bytes) => Value::Blob(bytes.first().map(|b| vec![*b]).unwrap_or_default()),
        }),
        K::IntAdd => {
            let operands = int_list(function, argument)?;
            let mut sum = BigInt::zero();
            for operand in operands {
                sum += operand;
            }
            Ok(Value::from_bigint(&sum))
        }
        K::IntMul => {
            let operands = int_list(function, argument)?;
            let mut product = BigInt::one();
            for operand in operands {
                product *= operand;
            }
            Ok(Value::from_bigint(&product))
        }
        K::IntIsSortedAsc => {
            let operands = int_list(function, argument)?;
            let sorted = operands.windows(2).all(|pair| pair[0] <= pair[1]);
            Ok(Value::bool_value(sorted))
        }
        K::BitAnd | K::BitOr | K::BitXor => {
            let parts = argument
                .as_list()
                .ok_or_else(|| invalid(function, "expected a list of blobs"))?;
            let mut blobs = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    Value::Blob(bytes) => blobs.push(bytes.as_slice()),
                    Value::List(_) => return Err(invalid(function, "expected blob operands")),
                }
            }
            let Some((first, rest)) = blobs.split_first() else {
                return Ok(Value::Blob(Vec::new()));
            };
            let mut result = first.to_vec();
            for blob in rest {
                combine_bits(function, &mut result, blob);
            }
            Ok(Value::Blob(result))
        }
        K::BitNot => match argument {
            Value::Blob(bytes) => Ok(Value::Blob(bytes.iter().map(|b| !b).collect())),
            Value::List(_) => Err(invalid(function, "expected a blob")),
        },
        K::BitShiftLeft | K::BitShiftRight => {
            let [count, value] = argument
                .as_list()
                .ok_or_else(|| invalid(function, "expected [count, blob]"))?
            else {
                return Err(invalid(function, "expected exactly two operands"));
            };
            let count = count
                .as_i64()
                .ok_or_else(|| invalid(function, "shift count is not an integer"))?;
            let Value::Blob(bytes) = value else {
                return Err(invalid(function, "expected a blob operand"));
            };
            let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
            Ok(Value::Blob(shift_bits(bytes, count, function == K::BitShiftLeft)))
        }
    }
}

/// Bitwise combination aligned at the least significant (right) end; the
/// result keeps the length of the accumulator.
fn combine_bits(function: KernelFunction, accumulator: &mut [u8], operand: &[u8]) {
    let acc_len = accumulator.len();
    for (offset, byte) in accumulator.iter_mut().rev().enumerate() {
        let other = if offset < operand.len() {
            operand[operand.len() - 1 - offset]
        } else {
            0
        };
        *byte = match function {
            KernelFunction::BitAnd => *byte & other,
            KernelFunction::BitOr => *byte | other,
            KernelFunction::BitXor => *byte ^ other,
            _ => unreachable!("combine_bits only serves bitwise functions"),
        };
    }
    debug_assert_eq!(accumulator.len(), acc_len);
}

/// Shifts within the blob's fixed width; bits falling off either end vanish.
fn shift_bits(bytes: &[u8], count: usize, left: bool) -> Vec<u8> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let width = bytes.len() * 8;
    if count >= width {
        return vec![0; bytes.len()];
    }
    let mut value = num_bigint::BigUint::from_bytes_be(bytes);
    if left {
        value <<= count;
    } else {
        value >>= count;
    }
    let mut out = value.to_bytes_be();
    if out.len() > bytes.len() {
        out = out[out.len() - bytes.len()..].to_vec();
    } else if out.len() < bytes.len() {
        let mut padded = vec![0; bytes.len() - out.len()];
        padded.extend_from_slice(&out);
        out = padded;
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{EvalError, EvalLimits, evaluate, evaluate_with_limits};
    use crate::kernel::{
        expr::{Expr, KernelFunction, encode},
        value::Value,
    };

    fn eval_closed(expr: &Expr) -> Value {
        evaluate(&Value::empty_list(), expr).unwrap()
    }

    #[test]
    fn arithmetic_and_comparison() {
        let sum = Expr::kernel(
            KernelFunction::IntAdd,
            Expr::List(vec![Expr::lit(Value::from_i64(40)), Expr::lit(Value::from_i64(2))]),
        );
        assert_eq!(eval_closed(&sum), Value::from_i64(42));

        let sorted = Expr::kernel(
            KernelFunction::IntIsSortedAsc,
            Expr::List(vec![Expr::lit(Value::from_i64(-3)), Expr::lit(Value::from_i64(7))]),
        );
        assert_eq!(eval_closed(&sorted), Value::true_value());
    }

    #[test]
    fn negate_serves_booleans_and_integers() {
        let not_true = Expr::negate(Expr::lit(Value::true_value()));
        assert_eq!(eval_closed(&not_true), Value::false_value());
        let minus_five = Expr::negate(Expr::lit(Value::from_i64(5)));
        assert_eq!(eval_closed(&minus_five), Value::from_i64(-5));
    }

    #[test]
    fn head_and_skip_are_total_on_short_lists() {
        let empty = Expr::lit(Value::empty_list());
        assert_eq!(eval_closed(&Expr::head(empty.clone())), Value::empty_list());
        assert_eq!(eval_closed(&Expr::skip(3, empty)), Value::empty_list());
    }

    #[test]
    fn conditional_selects_only_on_canonical_true() {
        for (condition, expected) in [
            (Value::true_value(), 1),
            (Value::false_value(), 2),
            (Value::empty_list(), 2),
            (Value::from_i64(1), 2),
        ] {
            let expr = Expr::conditional(
                Expr::lit(condition),
                Expr::lit(Value::from_i64(1)),
                Expr::lit(Value::from_i64(2)),
            );
            assert_eq!(eval_closed(&expr), Value::from_i64(expected));
        }
    }

    #[test]
    fn parse_and_eval_runs_an_encoded_program_under_a_new_environment() {
        let program = Expr::item(1, Expr::Environment);
        let expr = Expr::parse_and_eval(
            Expr::lit(encode(&program)),
            Expr::List(vec![
                Expr::lit(Value::from_i64(1)),
                Expr::lit(Value::from_i64(2)),
            ]),
        );
        assert_eq!(eval_closed(&expr), Value::from_i64(2));
    }

    #[test]
    fn runaway_parse_and_eval_hits_the_depth_limit() {
        // a program that re-evaluates itself forever: its environment is its
        // own encoding
        let looping = Expr::parse_and_eval(Expr::Environment, Expr::Environment);
        let env = encode(&looping);
        let result = evaluate_with_limits(
            &env,
            &looping,
            EvalLimits {
                max_parse_and_eval_depth: 16,
            },
        );
        assert_eq!(result, Err(EvalError::DepthExceeded(16)));
    }
}
