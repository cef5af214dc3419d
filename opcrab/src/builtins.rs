//! The builtin namespace.
//!
//! A fixed, read-only table consulted by name lookups only after the
//! environment misses. It is shared by every engine instance.

use crate::error::{ExecError, ExecResult};
use crate::interpreter::ops::{BinaryEval, BinaryOperator};
use crate::value::{Range, Step, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::LazyLock;

/// Signature shared by every builtin function.
pub type BuiltinFn = fn(&mut dyn Write, &[Value]) -> ExecResult<Value>;

/// A callable implemented by the engine itself.
#[derive(Clone, Copy)]
pub struct Builtin {
    name: &'static str,
    func: BuiltinFn,
}

impl Builtin {
    pub const fn new(name: &'static str, func: BuiltinFn) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes the builtin. Output goes to `out`.
    pub fn call(&self, out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
        (self.func)(out, args)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

#[derive(Debug)]
pub struct Builtins {
    table: HashMap<&'static str, Builtin>,
}

static BUILTINS: LazyLock<Builtins> = LazyLock::new(Builtins::standard);

impl Builtins {
    /// The standard namespace, shared by every engine.
    pub fn global() -> &'static Builtins {
        &BUILTINS
    }

    fn standard() -> Self {
        let table = [
            Builtin::new("print", print),
            Builtin::new("range", range),
            Builtin::new("len", len),
            Builtin::new("str", to_str),
            Builtin::new("int", to_int),
            Builtin::new("abs", abs),
            Builtin::new("sum", sum),
        ]
        .into_iter()
        .map(|builtin| (builtin.name, builtin))
        .collect();
        Self { table }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.table.get(name).copied().map(Value::Builtin)
    }
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> ExecResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExecError::TypeError(format!(
            "{name}() takes {expected} argument(s) but {} were given",
            args.len()
        )));
    }
    Ok(())
}

fn expect_int(name: &str, value: &Value) -> ExecResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(ExecError::TypeError(format!(
            "{name}() expected an integer, got '{}'",
            other.type_name()
        ))),
    }
}

fn print(out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{line}")?;
    Ok(Value::None)
}

fn range(_out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    expect_args("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|arg| expect_int("range", arg))
        .collect::<ExecResult<Vec<_>>>()?;
    let (start, stop, step) = match ints[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step] => (start, stop, step),
        _ => return Err(ExecError::TypeError("range() takes 1 to 3 arguments".into())),
    };
    if step == 0 {
        return Err(ExecError::ArithmeticError(
            "range() arg 3 must not be zero".to_string(),
        ));
    }
    Ok(Value::Range(Range { start, stop, step }))
}

fn len(_out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    expect_args("len", args, 1, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Tuple(items) => items.len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(ExecError::TypeError(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| ExecError::ArithmeticError("len() result does not fit in an int".into()))
}

fn to_str(_out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    expect_args("str", args, 0, 1)?;
    Ok(args
        .first()
        .map(|value| Value::from(value.to_string()))
        .unwrap_or_else(|| Value::from("")))
}

fn to_int(_out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    expect_args("int", args, 0, 1)?;
    let Some(value) = args.first() else {
        return Ok(Value::Int(0));
    };
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) if x.is_finite() && x.trunc().abs() < 9.2e18 => {
            Ok(Value::Int(x.trunc() as i64))
        }
        Value::Float(_) => Err(ExecError::ArithmeticError(format!(
            "cannot convert float {} to integer",
            value.repr()
        ))),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ExecError::TypeError(format!(
                "invalid literal for int() with base 10: {}",
                value.repr()
            ))
        }),
        other => Err(ExecError::TypeError(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn abs(_out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    expect_args("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| ExecError::ArithmeticError("integer overflow in abs()".to_string())),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(ExecError::TypeError(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn sum(_out: &mut dyn Write, args: &[Value]) -> ExecResult<Value> {
    expect_args("sum", args, 1, 2)?;
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    let mut iter = args[0].clone().iterate()?;
    while let Step::Next(item) = iter.advance() {
        total = BinaryOperator::Add.eval(total, item)?;
    }
    Ok(total)
}
