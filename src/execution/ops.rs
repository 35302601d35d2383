//! Operator semantics of generated code: arithmetic, comparison, `Math`.
//!
//! Numbers share one domain. Integer arithmetic stays integral while it is
//! exact; anything else (division, overflow, mixed operands) produces a float.

use std::cmp::Ordering;

use crate::ir::{BinaryOp, UnaryOp};
use crate::value::Value;

use super::{ExecutionError, ExecutionResult};

/// Numeric coercion: null is 0, booleans are 0/1, numeric strings parse
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Vector(_) | Value::Row(_) | Value::Record(_) => f64::NAN,
    }
}

fn number(v: f64) -> Value {
    Value::Float(v)
}

fn int_op(a: &Value, b: &Value, op: fn(i64, i64) -> Option<i64>) -> Option<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => op(*x, *y).map(Value::Int),
        _ => None,
    }
}

pub fn unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!value.truthy()),
        UnaryOp::Neg => match value {
            Value::Int(v) => v.checked_neg().map_or(number(-(*v as f64)), Value::Int),
            other => number(-to_number(other)),
        },
        UnaryOp::Plus => match value {
            Value::Int(_) | Value::Float(_) => value.clone(),
            other => number(to_number(other)),
        },
    }
}

/// Evaluate a non-short-circuiting binary operator
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> ExecutionResult<Value> {
    let value = match op {
        BinaryOp::Add => match (a, b) {
            (Value::String(x), y) => Value::string(&format!("{x}{}", display_raw(y))),
            (x, Value::String(y)) => Value::string(&format!("{}{y}", display_raw(x))),
            _ => int_op(a, b, i64::checked_add)
                .unwrap_or_else(|| number(to_number(a) + to_number(b))),
        },
        BinaryOp::Sub => int_op(a, b, i64::checked_sub)
            .unwrap_or_else(|| number(to_number(a) - to_number(b))),
        BinaryOp::Mul => int_op(a, b, i64::checked_mul)
            .unwrap_or_else(|| number(to_number(a) * to_number(b))),
        BinaryOp::Div => number(to_number(a) / to_number(b)),
        BinaryOp::Rem => int_op(a, b, i64::checked_rem)
            .unwrap_or_else(|| number(to_number(a) % to_number(b))),
        BinaryOp::Eq => Value::Bool(a.loose_eq(b)),
        BinaryOp::NotEq => Value::Bool(!a.loose_eq(b)),
        BinaryOp::StrictEq => Value::Bool(a.strict_eq(b)),
        BinaryOp::StrictNotEq => Value::Bool(!a.strict_eq(b)),
        BinaryOp::Lt => Value::Bool(compare(a, b) == Some(Ordering::Less)),
        BinaryOp::LtEq => Value::Bool(matches!(
            compare(a, b),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(a, b) == Some(Ordering::Greater)),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::And | BinaryOp::Or => {
            return Err(ExecutionError::TypeError(format!(
                "{} must be evaluated lazily",
                op.symbol()
            )))
        }
    };
    Ok(value)
}

/// Strings compare lexically with each other; everything else numerically
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// Text of a value inside string concatenation (strings unquoted)
pub fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        Value::Float(v) if v.fract() == 0.0 && v.is_finite() => format!("{}", *v as i64),
        other => other.to_string(),
    }
}

/// `Math.<name>(args)`
pub fn math(name: &str, args: &[Value]) -> ExecutionResult<Value> {
    let arg = |n: usize| args.get(n).map_or(f64::NAN, to_number);
    let value = match name {
        "abs" => match args.first() {
            Some(Value::Int(v)) => v.checked_abs().map_or(number(arg(0).abs()), Value::Int),
            _ => number(arg(0).abs()),
        },
        "floor" => number(arg(0).floor()),
        "ceil" => number(arg(0).ceil()),
        "round" => number((arg(0) + 0.5).floor()),
        "sqrt" => number(arg(0).sqrt()),
        "pow" => number(arg(0).powf(arg(1))),
        "min" => extremum(args, false),
        "max" => extremum(args, true),
        other => return Err(ExecutionError::NotCallable(format!("Math.{other}"))),
    };
    Ok(value)
}

/// `Math.min` / `Math.max`; integral when every argument is an int
fn extremum(args: &[Value], largest: bool) -> Value {
    if !args.is_empty() && args.iter().all(|v| matches!(v, Value::Int(_))) {
        let ints = args.iter().filter_map(Value::as_i64);
        if let Some(best) = if largest { ints.max() } else { ints.min() } {
            return Value::Int(best);
        }
    }
    let mut acc = if largest { f64::NEG_INFINITY } else { f64::INFINITY };
    for v in args {
        let x = to_number(v);
        if x.is_nan() {
            return number(f64::NAN);
        }
        acc = if largest { acc.max(x) } else { acc.min(x) };
    }
    number(acc)
}
