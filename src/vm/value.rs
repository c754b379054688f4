use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::chunk::{Closure, Function};
use super::error::Exception;
use super::list::List;
use crate::builtins::Builtin;

/// A mutable cell shared between a frame slot and every closure that
/// captured it.
pub type CaptureBox = Rc<RefCell<Value>>;

/// A runtime value.
///
/// Scalars (`Nil`, `Bool`, `Int`, `Str`) compare by value, lists and maps
/// structurally, and every other variant by identity.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    List(List),
    Map(Rc<BTreeMap<String, Value>>),
    /// Function template; only found in constant pools.
    Function(Rc<Function>),
    Closure(Rc<Closure>),
    Box(CaptureBox),
    Exception(Rc<Exception>),
    Builtin(&'static Builtin),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn new_box(value: Value) -> CaptureBox {
        Rc::new(RefCell::new(value))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Str(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Get the type name of this value. Also the key into the VM's method
    /// table.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
            Value::Box(_) => "box",
            Value::Exception(_) => "exception",
            Value::Builtin(_) => "builtin",
        }
    }

    /// Identity comparison for reference variants, value comparison for
    /// scalars. Lists and maps are not inspected.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    /// Printable form used inside containers: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Box(a), Value::Box(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::List(list) => write!(f, "List({:?})", list),
            Value::Map(map) => write!(f, "Map({:?})", map),
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::Closure(closure) => write!(f, "Closure({})", closure.function.name),
            Value::Box(cell) => match cell.try_borrow() {
                Ok(inner) => write!(f, "Box({:?})", inner),
                Err(_) => write!(f, "Box(<borrowed>)"),
            },
            Value::Exception(e) => write!(f, "Exception({})", e),
            Value::Builtin(b) => write!(f, "Builtin({})", b.name),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, item.repr())?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "<fn {}>", func.name),
            Value::Closure(closure) => write!(f, "<fn {}>", closure.function.name),
            Value::Box(cell) => match cell.try_borrow() {
                Ok(inner) => write!(f, "<box {}>", inner.repr()),
                Err(_) => write!(f, "<box>"),
            },
            Value::Exception(e) => write!(f, "{}", e),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}
