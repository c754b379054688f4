//! Primitive operator rules. Anything not covered here is dispatched through
//! the VM's method table.

use strum::{Display, EnumString};

use super::error::Exception;
use super::ops::Opcode;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
    Gt,
    Neg,
}

impl Operator {
    pub fn from_opcode(opcode: Opcode) -> Option<Operator> {
        Some(match opcode {
            Opcode::Add => Operator::Add,
            Opcode::Sub => Operator::Sub,
            Opcode::Mul => Operator::Mul,
            Opcode::Div => Operator::Div,
            Opcode::Eq => Operator::Eq,
            Opcode::Lt => Operator::Lt,
            Opcode::Gt => Operator::Gt,
            Opcode::Neg => Operator::Neg,
            _ => return None,
        })
    }

    fn verb(self) -> &'static str {
        match self {
            Operator::Add => "add",
            Operator::Sub => "subtract",
            Operator::Mul => "multiply",
            Operator::Div => "divide",
            Operator::Eq => "compare",
            Operator::Lt | Operator::Gt => "order",
            Operator::Neg => "negate",
        }
    }
}

fn overflow(op: Operator) -> Exception {
    Exception::type_error(format!("integer overflow in {}", op))
}

fn checked(op: Operator, result: Option<i64>) -> Result<Value, Exception> {
    result.map(Value::Int).ok_or_else(|| overflow(op))
}

/// Apply the built-in rule for a binary operator, if one covers the operand
/// types. `None` means the method table must be consulted.
pub fn binary(op: Operator, left: &Value, right: &Value) -> Option<Result<Value, Exception>> {
    let result = match (op, left, right) {
        (Operator::Add, Value::Int(a), Value::Int(b)) => checked(op, a.checked_add(*b)),
        (Operator::Sub, Value::Int(a), Value::Int(b)) => checked(op, a.checked_sub(*b)),
        (Operator::Mul, Value::Int(a), Value::Int(b)) => checked(op, a.checked_mul(*b)),
        (Operator::Div, Value::Int(_), Value::Int(0)) => Err(Exception::error("division by zero")),
        (Operator::Div, Value::Int(a), Value::Int(b)) => checked(op, a.checked_div(*b)),
        (Operator::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(&format!("{}{}", a, b))),
        (Operator::Add, Value::List(a), Value::List(b)) => Ok(Value::List(a.concat(b))),
        (Operator::Lt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
        (Operator::Gt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a > b)),
        (Operator::Lt, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a < b)),
        (Operator::Gt, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a > b)),
        (Operator::Eq, a, b) if a.is_scalar() && b.is_scalar() => Ok(Value::Bool(a == b)),
        _ => return None,
    };
    Some(result)
}

pub fn unary(op: Operator, operand: &Value) -> Option<Result<Value, Exception>> {
    match (op, operand) {
        (Operator::Neg, Value::Int(n)) => Some(checked(op, n.checked_neg())),
        _ => None,
    }
}

/// Result of an operator with neither a primitive rule nor a method.
pub fn fallback(op: Operator, left: &Value, right: Option<&Value>) -> Result<Value, Exception> {
    let operands = match right {
        Some(right) if op == Operator::Eq => return Ok(Value::Bool(left.same(right))),
        Some(right) => format!("{} and {}", left.type_name(), right.type_name()),
        None => left.type_name().to_string(),
    };
    let message = format!("cannot {} {}", op.verb(), operands);
    Err(Exception::type_error(message))
}
