//! Host-side evaluation of expressions the database never sees
//!
//! Parameter values and client-side projection leaves are computed here from
//! the query's inputs.

use std::cmp::Ordering as CmpOrdering;

use thiserror::Error;

use crate::{BinaryOp, Expr, Inputs, UnaryOp, Value, ValueError};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Cannot evaluate on the client: {0}")]
    Unsupported(String),

    #[error("Type mismatch in {op}: {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("Field not found: {0}")]
    MissingField(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Evaluate a host expression against the supplied inputs.
pub fn eval(expr: &Expr, inputs: &Inputs) -> Result<Value, EvalError> {
    match expr {
        Expr::Constant { value, .. } => Ok(value.clone()),
        Expr::Input { name, .. } => inputs
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::MissingInput(name.clone())),
        Expr::Member { expr, field, .. } => match eval(expr, inputs)? {
            Value::Null => Ok(Value::Null),
            record => record
                .field(field)
                .cloned()
                .ok_or_else(|| EvalError::MissingField(field.clone())),
        },
        Expr::Binary { op, left, right } => {
            apply_binary(*op, eval(left, inputs)?, || eval(right, inputs))
        }
        Expr::Unary { op, operand } => apply_unary(op, eval(operand, inputs)?),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            if condition(&eval(test, inputs)?)? {
                eval(if_true, inputs)
            } else {
                eval(if_false, inputs)
            }
        }
        Expr::ArrayInit { elements, .. } => elements
            .iter()
            .map(|e| eval(e, inputs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::New { fields } => fields
            .iter()
            .map(|(name, e)| eval(e, inputs).map(|v| (name.clone(), v)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Record),
        Expr::Alias { expr, .. } => eval(expr, inputs),
        other => Err(EvalError::Unsupported(node_name(other).to_string())),
    }
}

fn node_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Column { .. } => "column",
        Expr::Function { .. } => "function",
        Expr::Fragment { .. } => "fragment",
        Expr::Cast { .. } => "cast",
        Expr::Exists { .. } => "exists",
        Expr::In { .. } => "in",
        Expr::Aggregate { .. } => "aggregate",
        Expr::ScalarSubquery { .. }
        | Expr::ComplexSubquery { .. }
        | Expr::CollectionSubquery { .. } => "subquery",
        Expr::Parameter { .. } => "lambda parameter",
        Expr::DefaultIfEmpty { .. } => "default-if-empty",
        _ => "expression",
    }
}

/// Apply a unary operator to an evaluated operand. NULL propagates.
pub fn apply_unary(op: &UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Convert { ty }, value) => Ok(value.coerce(ty)?),
        (op, value) => Err(EvalError::TypeMismatch {
            op: format!("{:?}", op),
            left: value.kind(),
            right: "none",
        }),
    }
}

/// Truth of a conditional test; NULL counts as false.
pub fn condition(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::TypeMismatch {
            op: "conditional".to_string(),
            left: other.kind(),
            right: "bool",
        }),
    }
}

/// Apply a binary operator. `right` is only computed when `lhs` does not
/// decide the result (`Coalesce`, `And`, `Or`).
pub fn apply_binary<E, F>(op: BinaryOp, lhs: Value, right: F) -> Result<Value, E>
where
    E: From<EvalError>,
    F: FnOnce() -> Result<Value, E>,
{
    match (op, &lhs) {
        (BinaryOp::Coalesce, Value::Null) => return right(),
        (BinaryOp::Coalesce, _) => return Ok(lhs),
        (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
        (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
        _ => {}
    }

    let rhs = right()?;
    Ok(strict_binary(op, lhs, rhs)?)
}

fn strict_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let mismatch = |lhs: &Value, rhs: &Value| EvalError::TypeMismatch {
        op: format!("{:?}", op),
        left: lhs.kind(),
        right: rhs.kind(),
    };

    match op {
        BinaryOp::And | BinaryOp::Or => match (&lhs, &rhs) {
            (Value::Bool(_), Value::Bool(b)) => Ok(Value::Bool(*b)),
            _ => Err(mismatch(&lhs, &rhs)),
        },
        BinaryOp::Equal => Ok(Value::Bool(compare(&lhs, &rhs) == Some(CmpOrdering::Equal))),
        BinaryOp::NotEqual => Ok(Value::Bool(compare(&lhs, &rhs) != Some(CmpOrdering::Equal))),
        BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual
        | BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Bool(false));
            }
            let ordering = compare(&lhs, &rhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            Ok(Value::Bool(match op {
                BinaryOp::GreaterThan => ordering == CmpOrdering::Greater,
                BinaryOp::GreaterThanOrEqual => ordering != CmpOrdering::Less,
                BinaryOp::LessThan => ordering == CmpOrdering::Less,
                _ => ordering != CmpOrdering::Greater,
            }))
        }
        _ => arithmetic(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let mismatch = |lhs: &Value, rhs: &Value| EvalError::TypeMismatch {
        op: format!("{:?}", op),
        left: lhs.kind(),
        right: rhs.kind(),
    };

    match (&lhs, &rhs) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                    return Err(EvalError::DivisionByZero)
                }
                BinaryOp::Divide => a.checked_div(b),
                BinaryOp::Modulo => a.checked_rem(b),
                BinaryOp::Power => u32::try_from(b).ok().and_then(|b| a.checked_pow(b)),
                BinaryOp::ExclusiveOr => Some(a ^ b),
                _ => None,
            };
            result.map(Value::Int).ok_or_else(|| mismatch(&lhs, &rhs))
        }
        (Value::Bool(a), Value::Bool(b)) if op == BinaryOp::ExclusiveOr => Ok(Value::Bool(a ^ b)),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        _ => {
            let (a, b) = match (as_float(&lhs), as_float(&rhs)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(mismatch(&lhs, &rhs)),
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                BinaryOp::Power => a.powf(b),
                _ => return Err(mismatch(&lhs, &rhs)),
            };
            Ok(Value::Float(result))
        }
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<CmpOrdering> {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => Some(CmpOrdering::Equal),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => (lhs == rhs).then_some(CmpOrdering::Equal),
        },
    }
}
