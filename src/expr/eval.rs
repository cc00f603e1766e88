//! Tree-walking evaluation.

use rand::{Rng, RngCore};

use super::parser::{ArithOp, CompareOp, Node};
use super::{Environment, ExprError, Value};

/// Internal failure: either a named-lookup error that surfaces as-is, or a
/// plain message the caller wraps with the expression source.
pub(crate) enum Failure {
    Expr(ExprError),
    Message(String),
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

pub(crate) fn eval(
    node: &Node,
    env: &dyn Environment,
    rng: &mut dyn RngCore,
) -> Result<Value, Failure> {
    match node {
        Node::Literal(value) => Ok(*value),
        Node::Name(name) => env
            .lookup(name)
            .ok_or_else(|| Failure::Expr(ExprError::UnknownVariable(name.clone()))),
        Node::Negate(operand) => match eval(operand, env, rng)? {
            Value::Float(x) => Ok(Value::Float(-x)),
            other => {
                let i = other.as_int().unwrap_or_default();
                i.checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Failure::Message("integer overflow".to_string()))
            }
        },
        Node::Arith(op, left, right) => {
            let l = eval(left, env, rng)?;
            let r = eval(right, env, rng)?;
            Ok(arith(*op, l, r)?)
        }
        Node::Compare(first, rest) => {
            let mut left = eval(first, env, rng)?;
            for (op, right_node) in rest {
                let right = eval(right_node, env, rng)?;
                if !compare(*op, left, right) {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Node::Not(operand) => Ok(Value::Bool(!eval(operand, env, rng)?.is_truthy())),
        Node::And(left, right) => {
            if !eval(left, env, rng)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(right, env, rng)?.is_truthy()))
        }
        Node::Or(left, right) => {
            if eval(left, env, rng)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(right, env, rng)?.is_truthy()))
        }
        Node::Call(name, args) => call(name, args, env, rng),
    }
}

fn call(
    name: &str,
    args: &[Node],
    env: &dyn Environment,
    rng: &mut dyn RngCore,
) -> Result<Value, Failure> {
    match name {
        "rand" => {
            let [lo, hi] = args else {
                return Err(Failure::Message(format!(
                    "rand() takes exactly 2 arguments ({} given)",
                    args.len()
                )));
            };
            let lo = eval(lo, env, rng)?;
            let hi = eval(hi, env, rng)?;
            let (Value::Int(lo), Value::Int(hi)) = (lo, hi) else {
                return Err(Failure::Message(format!(
                    "rand() arguments must be integers, got {lo} and {hi}"
                )));
            };
            if lo > hi {
                return Err(Failure::Message(format!(
                    "rand() lower bound {lo} is greater than upper bound {hi}"
                )));
            }
            Ok(Value::Int(rng.random_range(lo..=hi)))
        }
        _ => Err(Failure::Expr(ExprError::UnknownFunction(name.to_string()))),
    }
}

fn arith(op: ArithOp, l: Value, r: Value) -> Result<Value, String> {
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        return int_arith(op, a, b);
    }
    float_arith(op, l.as_f64(), r.as_f64())
}

fn int_arith(op: ArithOp, a: i64, b: i64) -> Result<Value, String> {
    let overflow = || "integer overflow".to_string();
    match op {
        ArithOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        ArithOp::Rem => {
            if b == 0 {
                return Err("modulo by zero".to_string());
            }
            let m = a.checked_rem(b).ok_or_else(overflow)?;
            // result takes the sign of the divisor
            if m != 0 && (m < 0) != (b < 0) {
                Ok(Value::Int(m + b))
            } else {
                Ok(Value::Int(m))
            }
        }
        ArithOp::Pow => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp).map(Value::Int).ok_or_else(overflow),
            Err(_) if b < 0 => float_arith(op, to_f64(a), to_f64(b)),
            Err(_) => Err(overflow()),
        },
        ArithOp::Div => float_arith(op, to_f64(a), to_f64(b)),
    }
}

fn float_arith(op: ArithOp, a: f64, b: f64) -> Result<Value, String> {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            a / b
        }
        ArithOp::Rem => {
            if b == 0.0 {
                return Err("modulo by zero".to_string());
            }
            a - b * (a / b).floor()
        }
        ArithOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err("zero cannot be raised to a negative power".to_string());
            }
            a.powf(b)
        }
    };
    if result.is_nan() {
        return Err("result is not a real number".to_string());
    }
    if result.is_infinite() {
        return Err("numeric overflow".to_string());
    }
    Ok(Value::Float(result))
}

fn compare(op: CompareOp, l: Value, r: Value) -> bool {
    let ordering = match (l.as_int(), r.as_int()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => l.as_f64().partial_cmp(&r.as_f64()),
    };
    let Some(ordering) = ordering else {
        return op == CompareOp::Ne;
    };
    match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => ordering.is_ne(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
    }
}

#[allow(clippy::cast_precision_loss)]
const fn to_f64(i: i64) -> f64 {
    i as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_remainder_follows_divisor_sign() {
        assert_eq!(int_arith(ArithOp::Rem, -7, 3).unwrap(), Value::Int(2));
        assert_eq!(int_arith(ArithOp::Rem, 7, -3).unwrap(), Value::Int(-2));
        assert_eq!(int_arith(ArithOp::Rem, 7, 3).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert!(int_arith(ArithOp::Mul, i64::MAX, 2).is_err());
        assert!(int_arith(ArithOp::Pow, 10, 30).is_err());
    }

    #[test]
    fn test_negative_integer_power_is_float() {
        assert_eq!(int_arith(ArithOp::Pow, 2, -1).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_bool_compares_as_number() {
        assert!(compare(CompareOp::Eq, Value::Bool(true), Value::Int(1)));
        assert!(compare(CompareOp::Lt, Value::Int(1), Value::Float(1.5)));
    }
}
