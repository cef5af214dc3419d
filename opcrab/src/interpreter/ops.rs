//! Binary operators and comparators.

use crate::error::{ExecError, ExecResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

/// Symbols of the operator codes carried by `BINARY_OP`, indexed by operand.
/// Codes 13 and above are the in-place forms of codes 0 to 12.
const BINARY_OP_SYMBOLS: [&str; 26] = [
    "+", "&", "//", "<<", "@", "*", "%", "|", "**", ">>", "-", "/", "^", "+=", "&=", "//=",
    "<<=", "@=", "*=", "%=", "|=", "**=", ">>=", "-=", "/=", "^=",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
}

impl BinaryOperator {
    /// Decodes the operand of `BINARY_OP`.
    ///
    /// # Returns
    /// * `Ok(BinaryOperator)` - An implemented operator or its in-place form
    /// * `Err(String)` - The symbol of an operator code that is not implemented
    pub fn from_arg(arg: usize) -> Result<Self, String> {
        let base = if (13..26).contains(&arg) { arg - 13 } else { arg };
        match base {
            0 => Ok(BinaryOperator::Add),
            5 => Ok(BinaryOperator::Multiply),
            10 => Ok(BinaryOperator::Subtract),
            _ => Err(BINARY_OP_SYMBOLS
                .get(arg)
                .map(|symbol| symbol.to_string())
                .unwrap_or_else(|| format!("binary operator #{arg}"))),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    /// Accepts the bare symbol and the `bool(<symbol>)` form emitted when the
    /// result is coerced to a boolean.
    fn from_str(symbol: &str) -> Result<Self, String> {
        let bare = symbol
            .strip_prefix("bool(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(symbol);
        match bare {
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            _ => Err(symbol.to_string()),
        }
    }
}

/// Trait for evaluating binary operations on values.
pub trait BinaryEval {
    /// Evaluates the operation on two values.
    ///
    /// # Arguments
    /// * `left` - Left operand value, pushed first
    /// * `right` - Right operand value, pushed last
    ///
    /// # Returns
    /// * `Ok(Value)` - Result of the operation
    /// * `Err(ExecError)` - If the operand types are not supported
    fn eval(&self, left: Value, right: Value) -> ExecResult<Value>;
}

impl BinaryEval for BinaryOperator {
    fn eval(&self, left: Value, right: Value) -> ExecResult<Value> {
        if let (Some(l), Some(r)) = (Number::of(&left), Number::of(&right)) {
            return eval_numeric(*self, l, r);
        }
        match (*self, &left, &right) {
            (BinaryOperator::Add, Value::Str(l), Value::Str(r)) => {
                Ok(Value::from(format!("{l}{r}")))
            }
            (BinaryOperator::Add, Value::Tuple(l), Value::Tuple(r)) => {
                Ok(Value::Tuple(l.iter().chain(r.iter()).cloned().collect()))
            }
            (BinaryOperator::Multiply, Value::Str(s), Value::Int(n))
            | (BinaryOperator::Multiply, Value::Int(n), Value::Str(s)) => {
                Ok(Value::from(s.repeat(repeat_count(*n, s.len())?)))
            }
            (BinaryOperator::Multiply, Value::Tuple(items), Value::Int(n))
            | (BinaryOperator::Multiply, Value::Int(n), Value::Tuple(items)) => {
                let count = repeat_count(*n, items.len())?;
                let repeated: Arc<[Value]> = items
                    .iter()
                    .cycle()
                    .take(items.len() * count)
                    .cloned()
                    .collect();
                Ok(Value::Tuple(repeated))
            }
            _ => Err(unsupported(self.symbol(), &left, &right)),
        }
    }
}

impl BinaryEval for Comparator {
    fn eval(&self, left: Value, right: Value) -> ExecResult<Value> {
        let result = match self {
            Comparator::Eq => values_equal(&left, &right),
            Comparator::Ne => !values_equal(&left, &right),
            Comparator::Lt | Comparator::Le | Comparator::Gt | Comparator::Ge => {
                let Ok(order) = compare(&left, &right) else {
                    return Err(unsupported(self.symbol(), &left, &right));
                };
                // Unordered operands (NaN) make every ordering comparison false.
                order.is_some_and(|order| match self {
                    Comparator::Lt => order == Ordering::Less,
                    Comparator::Le => order != Ordering::Greater,
                    Comparator::Gt => order == Ordering::Greater,
                    _ => order != Ordering::Less,
                })
            }
        };
        Ok(Value::Bool(result))
    }
}

/// Numeric view of a value. Booleans participate as integers.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }
}

fn eval_numeric(op: BinaryOperator, left: Number, right: Number) -> ExecResult<Value> {
    match (left, right) {
        (Number::Int(l), Number::Int(r)) => eval_int_binop(op, l, r),
        (l, r) => {
            let (l, r) = (l.as_f64(), r.as_f64());
            Ok(Value::Float(match op {
                BinaryOperator::Add => l + r,
                BinaryOperator::Subtract => l - r,
                BinaryOperator::Multiply => l * r,
            }))
        }
    }
}

/// Evaluates a binary operation on integers, failing on overflow.
fn eval_int_binop(op: BinaryOperator, left: i64, right: i64) -> ExecResult<Value> {
    let (result, what) = match op {
        BinaryOperator::Add => (left.checked_add(right), "addition"),
        BinaryOperator::Subtract => (left.checked_sub(right), "subtraction"),
        BinaryOperator::Multiply => (left.checked_mul(right), "multiplication"),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| ExecError::ArithmeticError(format!("integer overflow in {what}")))
}

fn repeat_count(n: i64, unit: usize) -> ExecResult<usize> {
    let count = usize::try_from(n.max(0))
        .map_err(|_| ExecError::ArithmeticError("repeat count too large".to_string()))?;
    if unit.checked_mul(count).is_none() {
        return Err(ExecError::ArithmeticError("repeat count too large".to_string()));
    }
    Ok(count)
}

/// Equality across value kinds. Numbers compare by value regardless of
/// representation; values of unrelated kinds are never equal.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (Number::of(left), Number::of(right)) {
        return match (l, r) {
            (Number::Int(l), Number::Int(r)) => l == r,
            (l, r) => l.as_f64() == r.as_f64(),
        };
    }
    match (left, right) {
        (Value::Tuple(l), Value::Tuple(r)) => {
            l.len() == r.len() && l.iter().zip(r.iter()).all(|(a, b)| values_equal(a, b))
        }
        _ => left == right,
    }
}

/// Ordering for numbers and strings. `Err` for every other combination.
fn compare(left: &Value, right: &Value) -> Result<Option<Ordering>, ()> {
    if let (Some(l), Some(r)) = (Number::of(left), Number::of(right)) {
        return Ok(match (l, r) {
            (Number::Int(l), Number::Int(r)) => Some(l.cmp(&r)),
            (l, r) => l.as_f64().partial_cmp(&r.as_f64()),
        });
    }
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => Ok(Some(l.cmp(r))),
        _ => Err(()),
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ExecError {
    ExecError::UnsupportedOperator {
        op: op.to_string(),
        lhs: left.type_name(),
        rhs: right.type_name(),
    }
}
