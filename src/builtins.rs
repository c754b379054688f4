//! Native functions installed as globals in every VM.
//!
//! Builtins run to completion inside the `CALL` that invokes them; they never
//! get a frame of their own.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::vm::list::List;
use crate::vm::operators::Operator;
use crate::vm::{Exception, ExceptionKind, RuntimeError, Value, Vm};

pub type NativeFn = fn(&mut Vm, Vec<Value>) -> Result<Value, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(self, argc: usize) -> bool {
        match self {
            Arity::Exact(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
            Arity::Between(lo, hi) => (lo..=hi).contains(&argc),
        }
    }
}

/// Descriptor of a native function.
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub func: NativeFn,
}

impl Builtin {
    const fn new(name: &'static str, arity: Arity, func: NativeFn) -> Self {
        Self { name, arity, func }
    }

    pub fn check_arity(&self, argc: usize) -> Result<(), Exception> {
        if self.arity.accepts(argc) {
            return Ok(());
        }
        let expected = match self.arity {
            Arity::Exact(n) => n.to_string(),
            Arity::AtLeast(n) => format!("at least {}", n),
            Arity::Between(lo, hi) => format!("{} to {}", lo, hi),
        };
        Err(Exception::type_error(format!(
            "{} expects {} arguments, got {}",
            self.name, expected, argc
        )))
    }
}

pub static BUILTINS: &[Builtin] = &[
    Builtin::new("print", Arity::AtLeast(0), print),
    Builtin::new("len", Arity::Exact(1), len),
    Builtin::new("str", Arity::Exact(1), to_str),
    Builtin::new("list", Arity::AtLeast(0), list),
    Builtin::new("nth", Arity::Exact(2), nth),
    Builtin::new("head", Arity::Exact(1), head),
    Builtin::new("tail", Arity::Exact(1), tail),
    Builtin::new("cons", Arity::Exact(2), cons),
    Builtin::new("map", Arity::AtLeast(0), map),
    Builtin::new("put", Arity::Exact(3), put),
    Builtin::new("get", Arity::Exact(2), get),
    Builtin::new("type_of", Arity::Exact(1), type_of),
    Builtin::new("exception", Arity::Between(1, 2), exception),
    Builtin::new("raise", Arity::Exact(1), raise),
    Builtin::new("method", Arity::Exact(3), method),
    Builtin::new("resume", Arity::Exact(1), resume),
];

/// Structural equality for lists, seeded into the method table.
pub static LIST_EQ: Builtin = Builtin::new("list_eq", Arity::Exact(2), structural_eq);

/// Structural equality for maps, seeded into the method table.
pub static MAP_EQ: Builtin = Builtin::new("map_eq", Arity::Exact(2), structural_eq);

fn mismatch(builtin: &str, expected: &str, value: &Value) -> Exception {
    let found = value.type_name();
    let message = format!("{} expects {}, got {}", builtin, expected, found);
    Exception::type_error(message)
}

fn expect_list<'a>(builtin: &str, value: &'a Value) -> Result<&'a List, Exception> {
    value
        .as_list()
        .ok_or_else(|| mismatch(builtin, "a list", value))
}

fn expect_map<'a>(
    builtin: &str,
    value: &'a Value,
) -> Result<&'a Rc<BTreeMap<String, Value>>, Exception> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(mismatch(builtin, "a map", other)),
    }
}

fn expect_str<'a>(builtin: &str, value: &'a Value) -> Result<&'a str, Exception> {
    value
        .as_str()
        .ok_or_else(|| mismatch(builtin, "a string", value))
}

fn print(vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    vm.write_line(&line)
        .map_err(|e| Exception::error(format!("print failed: {}", e)))?;
    Ok(Value::Nil)
}

fn len(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(list) => list.len(),
        Value::Map(map) => map.len(),
        other => return Err(mismatch("len", "a string, list or map", other).into()),
    };
    Ok(Value::Int(n as i64))
}

fn to_str(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::str(&args[0].to_string()))
}

fn list(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::List(args.into_iter().collect()))
}

fn nth(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let list = expect_list("nth", &args[0])?;
    let index = args[1]
        .as_int()
        .ok_or_else(|| Exception::type_error("nth expects an int index"))?;
    let Some(value) = usize::try_from(index).ok().and_then(|i| list.nth(i)) else {
        let len = list.len();
        let message = format!("index {} out of range for list of length {}", index, len);
        return Err(Exception::error(message).into());
    };
    Ok(value.clone())
}

fn head(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let list = expect_list("head", &args[0])?;
    list.head()
        .cloned()
        .ok_or_else(|| Exception::error("head of empty list").into())
}

fn tail(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let list = expect_list("tail", &args[0])?;
    list.tail()
        .map(Value::List)
        .ok_or_else(|| Exception::error("tail of empty list").into())
}

fn cons(_vm: &mut Vm, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    let rest = expect_list("cons", &args[1])?.clone();
    let first = std::mem::replace(&mut args[0], Value::Nil);
    Ok(Value::List(rest.cons(first)))
}

fn map(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.len() % 2 != 0 {
        return Err(Exception::type_error("map expects key/value pairs").into());
    }
    let mut entries = BTreeMap::new();
    let mut iter = args.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key = expect_str("map", &key)?.to_string();
        entries.insert(key, value);
    }
    Ok(Value::Map(Rc::new(entries)))
}

fn put(_vm: &mut Vm, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut entries = BTreeMap::clone(expect_map("put", &args[0])?);
    let key = expect_str("put", &args[1])?.to_string();
    let value = std::mem::replace(&mut args[2], Value::Nil);
    entries.insert(key, value);
    Ok(Value::Map(Rc::new(entries)))
}

fn get(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let entries = expect_map("get", &args[0])?;
    let key = expect_str("get", &args[1])?;
    Ok(entries.get(key).cloned().unwrap_or(Value::Nil))
}

fn type_of(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::str(args[0].type_name()))
}

fn exception(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let kind = match args.as_slice() {
        [kind, _] => {
            let name = expect_str("exception", kind)?;
            let Ok(kind) = name.parse::<ExceptionKind>() else {
                let message = format!("unknown exception kind '{}'", name);
                return Err(Exception::type_error(message).into());
            };
            kind
        }
        _ => ExceptionKind::Error,
    };
    let message = match args.last() {
        Some(message) => expect_str("exception", message)?,
        None => "",
    };
    Ok(Value::Exception(Rc::new(Exception::new(kind, message))))
}

fn raise(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let exception = match &args[0] {
        Value::Exception(e) => Exception::new(e.kind, e.message.clone()),
        Value::Str(message) => Exception::error(message.to_string()),
        other => Exception::type_error(format!("cannot raise {}", other.type_name())),
    };
    Err(exception.into())
}

fn method(vm: &mut Vm, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    let type_name = expect_str("method", &args[0])?.to_string();
    let op_name = expect_str("method", &args[1])?;
    let Ok(op) = op_name.parse::<Operator>() else {
        let message = format!("unknown operator '{}'", op_name);
        return Err(Exception::type_error(message).into());
    };
    let callable = std::mem::replace(&mut args[2], Value::Nil);
    if !matches!(callable, Value::Closure(_) | Value::Builtin(_)) {
        return Err(mismatch("method", "a function", &callable).into());
    }
    vm.define_method(&type_name, op, callable);
    Ok(Value::Nil)
}

fn resume(vm: &mut Vm, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    let value = std::mem::replace(&mut args[0], Value::Nil);
    vm.resume(value)
}

fn structural_eq(_vm: &mut Vm, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(args[0] == args[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let builtin = BUILTINS.iter().find(|b| b.name == name).unwrap();
        builtin.check_arity(args.len())?;
        let mut vm = Vm::new(RuntimeConfig::default());
        (builtin.func)(&mut vm, args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().map(|&n| Value::Int(n)).collect())
    }

    #[test]
    fn test_arity() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(1));
        assert!(Arity::AtLeast(0).accepts(5));
        assert!(Arity::Between(1, 2).accepts(2));
        assert!(!Arity::Between(1, 2).accepts(3));

        let err = call("len", vec![]).unwrap_err();
        let expected = "TypeError: len expects 1 arguments, got 0";
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_list_builtins() {
        let pair = ints(&[4, 5]);
        assert_eq!(call("len", vec![ints(&[1, 2, 3])]).unwrap(), Value::Int(3));
        let second = call("nth", vec![pair.clone(), Value::Int(1)]).unwrap();
        assert_eq!(second, Value::Int(5));
        assert_eq!(call("head", vec![pair.clone()]).unwrap(), Value::Int(4));
        assert_eq!(call("tail", vec![pair]).unwrap(), ints(&[5]));
        let consed = call("cons", vec![Value::Int(1), ints(&[2])]).unwrap();
        assert_eq!(consed, ints(&[1, 2]));
        assert!(call("nth", vec![ints(&[1]), Value::Int(-1)]).is_err());
        assert!(call("head", vec![ints(&[])]).is_err());
    }

    #[test]
    fn test_map_builtins() {
        let m = call("map", vec![Value::str("a"), Value::Int(1)]).unwrap();
        let m2 = call("put", vec![m.clone(), Value::str("b"), Value::Int(2)]);
        let m2 = m2.unwrap();
        assert_eq!(call("len", vec![m.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("len", vec![m2.clone()]).unwrap(), Value::Int(2));
        let b = call("get", vec![m2, Value::str("b")]).unwrap();
        assert_eq!(b, Value::Int(2));
        let missing = call("get", vec![m, Value::str("b")]).unwrap();
        assert_eq!(missing, Value::Nil);
        assert!(call("map", vec![Value::str("a")]).is_err());
    }

    #[test]
    fn test_raise() {
        let args = vec![Value::str("TypeError"), Value::str("bad")];
        let e = call("exception", args).unwrap();
        let err = call("raise", vec![e]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad");

        let err = call("raise", vec![Value::str("plain")]).unwrap_err();
        assert_eq!(err.to_string(), "Error: plain");
    }

    #[test]
    fn test_unknown_exception_kind() {
        let args = vec![Value::str("Oops"), Value::str("bad")];
        let err = call("exception", args).unwrap_err();
        let expected = "TypeError: unknown exception kind 'Oops'";
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_type_of_and_str() {
        let type_name = call("type_of", vec![Value::Int(1)]).unwrap();
        assert_eq!(type_name, Value::str("int"));
        let text = call("str", vec![ints(&[1, 2])]).unwrap();
        assert_eq!(text, Value::str("[1, 2]"));
    }

    #[test]
    fn test_resume_outside_handler() {
        let err = call("resume", vec![Value::Nil]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: resume called outside of an effect handler"
        );
    }
}
