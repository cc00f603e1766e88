//! Arithmetic and boolean expressions used by phase scripts.
//!
//! Expressions appear in stop conditions, branch predicates, probabilities,
//! stimulus intensities and variable assignments. The language is small:
//!
//! - integer and float literals, `True` / `False`
//! - `+ - * / % **`, unary minus
//! - comparisons `= == != < <= > >=` (a single `=` tests equality)
//! - `and`, `or`, `not`, parentheses
//! - `rand(lo, hi)`: uniform integer in `lo..=hi`
//!
//! `/` always yields a float. Names are resolved through an [`Environment`].

mod eval;
mod lexer;
mod parser;

use rand::RngCore;
use thiserror::Error;

use eval::Failure;
use parser::{Node, Parser};

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// The text is not a valid expression
    #[error("Error in expression '{expr}': {message}.")]
    Syntax {
        /// Expression source
        expr: String,
        /// What the parser rejected
        message: String,
    },

    /// A name that the environment does not define
    #[error("Unknown variable '{0}'.")]
    UnknownVariable(String),

    /// A call to a function the language does not provide
    #[error("Unknown function '{0}'.")]
    UnknownFunction(String),

    /// A well-formed expression that cannot be evaluated
    #[error("Cannot evaluate expression '{expr}': {message}.")]
    Evaluation {
        /// Expression source
        expr: String,
        /// Why evaluation failed
        message: String,
    },
}

/// A computed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Boolean
    Bool(bool),
}

impl Value {
    /// Integer view; booleans count as 0 and 1, floats have none.
    #[must_use]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            Self::Bool(b) => Some(i64::from(b)),
            Self::Float(_) => None,
        }
    }

    /// Numeric view of any value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(x) => x,
            Self::Bool(b) => f64::from(u8::from(b)),
        }
    }

    /// Returns the boolean when the value is one.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            Self::Int(_) | Self::Float(_) => None,
        }
    }

    /// Truthiness: non-zero numbers and `True`.
    #[must_use]
    pub fn is_truthy(self) -> bool {
        match self {
            Self::Int(i) => i != 0,
            Self::Float(x) => x != 0.0,
            Self::Bool(b) => b,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Resolves names to values during evaluation.
pub trait Environment {
    /// Returns the value bound to `name`, if any.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl<F> Environment for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn lookup(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// A parsed expression, ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parses `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Syntax`] if `source` is not a valid expression.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = lexer::tokenize(source)?;
        let root = Parser::new(source, tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The text this expression was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names or functions, and for arithmetic
    /// that has no result (division by zero, overflow, bad `rand` bounds).
    pub fn evaluate(
        &self,
        env: &dyn Environment,
        rng: &mut dyn RngCore,
    ) -> Result<Value, ExprError> {
        eval::eval(&self.root, env, rng).map_err(|failure| match failure {
            Failure::Expr(err) => err,
            Failure::Message(message) => ExprError::Evaluation {
                expr: self.source.clone(),
                message,
            },
        })
    }

    /// Free variable names, in order of first appearance. Function names are
    /// not included.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        fn walk<'n>(node: &'n Node, out: &mut Vec<&'n str>) {
            match node {
                Node::Literal(_) => {}
                Node::Name(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Node::Negate(inner) | Node::Not(inner) => walk(inner, out),
                Node::Arith(_, l, r) | Node::And(l, r) | Node::Or(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Node::Compare(first, rest) => {
                    walk(first, out);
                    for (_, node) in rest {
                        walk(node, out);
                    }
                }
                Node::Call(_, args) => {
                    for arg in args {
                        walk(arg, out);
                    }
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Returns `true` if the expression calls a function, so its value may
    /// change from one evaluation to the next.
    #[must_use]
    pub fn has_calls(&self) -> bool {
        fn walk(node: &Node) -> bool {
            match node {
                Node::Literal(_) | Node::Name(_) => false,
                Node::Call(..) => true,
                Node::Negate(inner) | Node::Not(inner) => walk(inner),
                Node::Arith(_, l, r) | Node::And(l, r) | Node::Or(l, r) => walk(l) || walk(r),
                Node::Compare(first, rest) => walk(first) || rest.iter().any(|(_, n)| walk(n)),
            }
        }

        walk(&self.root)
    }
}

/// Parses and evaluates `source` in one step.
///
/// # Errors
///
/// Returns any parse or evaluation error.
pub fn evaluate(
    source: &str,
    env: &dyn Environment,
    rng: &mut dyn RngCore,
) -> Result<Value, ExprError> {
    Expression::parse(source)?.evaluate(env, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn vars(name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::Int(3)),
            "p" => Some(Value::Float(0.25)),
            "flag" => Some(Value::Bool(true)),
            _ => None,
        }
    }

    fn eval_str(source: &str) -> Result<Value, ExprError> {
        let mut rng = StdRng::seed_from_u64(1);
        evaluate(source, &vars, &mut rng)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval_str("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval_str("2 ** 3 ** 2").unwrap(), Value::Int(512));
        assert_eq!(eval_str("-2 ** 2").unwrap(), Value::Int(-4));
        assert_eq!(eval_str("x * p").unwrap(), Value::Float(0.75));
    }

    #[test]
    fn test_division_yields_float() {
        assert_eq!(eval_str("1/2").unwrap(), Value::Float(0.5));
        assert_eq!(eval_str("4/2").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_single_equals_is_equality() {
        assert_eq!(eval_str("x=3").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("x==4").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("x != 4").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(eval_str("x > 2 and not flag").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("x > 5 or flag").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("True").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_short_circuit_skips_unknown_names() {
        assert_eq!(eval_str("False and y").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("True or y").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            eval_str("y + 1").unwrap_err(),
            ExprError::UnknownVariable("y".into())
        );
        assert_eq!(
            eval_str("y + 1").unwrap_err().to_string(),
            "Unknown variable 'y'."
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            eval_str("count(b1)").unwrap_err(),
            ExprError::UnknownFunction("count".into())
        );
    }

    #[test]
    fn test_rand_is_inclusive_and_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let expr = Expression::parse("rand(1, 3)").unwrap();
        let mut seen = [false; 3];
        for _ in 0..200 {
            let Value::Int(v) = expr.evaluate(&vars, &mut rng).unwrap() else {
                panic!("rand must return an integer");
            };
            assert!((1..=3).contains(&v));
            seen[usize::try_from(v - 1).unwrap()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_rand_argument_errors() {
        assert!(matches!(
            eval_str("rand(3, 1)"),
            Err(ExprError::Evaluation { .. })
        ));
        assert!(matches!(
            eval_str("rand(1.5, 3)"),
            Err(ExprError::Evaluation { .. })
        ));
        assert!(matches!(eval_str("rand(1)"), Err(ExprError::Evaluation { .. })));
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval_str("1/0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot evaluate expression '1/0': division by zero."
        );
    }

    #[test]
    fn test_syntax_error_message() {
        let err = eval_str("1+/1").unwrap_err();
        assert!(err.to_string().starts_with("Error in expression '1+/1'"));
    }

    #[test]
    fn test_identifiers_skip_function_names() {
        let expr = Expression::parse("rand(lo, hi) > x and x < 10").unwrap();
        assert_eq!(expr.identifiers(), vec!["lo", "hi", "x"]);
        assert!(expr.has_calls());
        assert!(!Expression::parse("x + 1").unwrap().has_calls());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Bool(false).to_string(), "False");
    }
}
