//! Runtime values manipulated by the engine.
//!
//! The operand stack is dynamically typed, but the set of value kinds is
//! closed. Operators pattern-match on [`Value`] and fail explicitly on
//! combinations they do not support.

use crate::builtins::Builtin;
use crate::error::{ExecError, ExecResult};
use crate::program::CodeObject;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    /// The no-bound-method marker pushed beneath or above a callable.
    /// Never produced by user code and distinct from [`Value::None`].
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tuple(Arc<[Value]>),
    Range(Range),
    Builtin(Builtin),
    /// A code object constant, before `MAKE_FUNCTION` turns it into a function.
    Code(Arc<CodeObject>),
    Function(Arc<CodeObject>),
    Iterator(Box<ValueIter>),
}

/// Arithmetic progression produced by the `range` builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    /// Number of elements in the progression.
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let count = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / -step + 1
        } else {
            0
        };
        count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of advancing an iterator.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Next(Value),
    Exhausted,
}

/// Iterator handle state. Owned by the operand stack slot that holds it.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueIter {
    Range { next: i64, stop: i64, step: i64 },
    Items { items: Arc<[Value]>, pos: usize },
    Chars { text: Arc<str>, pos: usize },
}

impl ValueIter {
    pub fn advance(&mut self) -> Step {
        match self {
            ValueIter::Range { next, stop, step } => {
                let more = (*step > 0 && *next < *stop) || (*step < 0 && *next > *stop);
                if !more {
                    return Step::Exhausted;
                }
                let current = *next;
                *next = current.checked_add(*step).unwrap_or(*stop);
                Step::Next(Value::Int(current))
            }
            ValueIter::Items { items, pos } => match items.get(*pos) {
                Some(item) => {
                    *pos += 1;
                    Step::Next(item.clone())
                }
                None => Step::Exhausted,
            },
            ValueIter::Chars { text, pos } => match text[*pos..].chars().next() {
                Some(ch) => {
                    *pos += ch.len_utf8();
                    Step::Next(Value::from(ch.to_string()))
                }
                None => Step::Exhausted,
            },
        }
    }
}

impl Value {
    /// Name of the value's kind, as shown in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Null => "NULL",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::Range(_) => "range",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Code(_) => "code",
            Value::Function(_) => "function",
            Value::Iterator(_) => "iterator",
        }
    }

    /// Truthiness used by conditional jumps.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Range(range) => !range.is_empty(),
            Value::Builtin(_) | Value::Code(_) | Value::Function(_) | Value::Iterator(_) => true,
        }
    }

    /// Consumes an iterable and returns an iterator over it.
    pub fn iterate(self) -> ExecResult<ValueIter> {
        match self {
            Value::Range(Range { start, stop, step }) => Ok(ValueIter::Range {
                next: start,
                stop,
                step,
            }),
            Value::Tuple(items) => Ok(ValueIter::Items { items, pos: 0 }),
            Value::Str(text) => Ok(ValueIter::Chars { text, pos: 0 }),
            Value::Iterator(iter) => Ok(*iter),
            other => Err(ExecError::TypeError(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Quoted rendering, used for elements of containers and diagnostics.
    pub fn repr(&self) -> Repr<'_> {
        Repr(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

/// Display adapter returned by [`Value::repr`].
pub struct Repr<'a>(&'a Value);

impl fmt::Display for Repr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::None => f.write_str("None"),
            Value::Null => f.write_str("<NULL>"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Range(Range { start, stop, step }) => {
                if *step == 1 {
                    write!(f, "range({start}, {stop})")
                } else {
                    write!(f, "range({start}, {stop}, {step})")
                }
            }
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name()),
            Value::Code(code) => write!(f, "<code object {}>", code.name()),
            Value::Function(code) => write!(f, "<function {}>", code.name()),
            Value::Iterator(_) => f.write_str("<iterator>"),
        }
    }
}

/// Formats a float the way the host language prints it: integral values keep
/// a trailing `.0` and very large or small magnitudes use exponent notation.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{x:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => formatted,
        };
    }
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::from(items))
    }
}
