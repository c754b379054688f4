//! Persistent singly-linked lists.
//!
//! A `List` is immutable once built; every derived list shares structure with
//! its source. `ListBuilder` is the only mutable way to assemble one.

use std::fmt;
use std::rc::Rc;

use super::value::Value;

#[derive(Clone, Default)]
pub struct List {
    head: Option<Rc<Node>>,
}

struct Node {
    value: Value,
    next: List,
}

impl List {
    pub fn new() -> Self {
        Self { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// New list with `value` in front; `self` is shared as the tail.
    pub fn cons(&self, value: Value) -> List {
        List {
            head: Some(Rc::new(Node {
                value,
                next: self.clone(),
            })),
        }
    }

    pub fn head(&self) -> Option<&Value> {
        self.head.as_ref().map(|node| &node.value)
    }

    pub fn tail(&self) -> Option<List> {
        self.head.as_ref().map(|node| node.next.clone())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn nth(&self, index: usize) -> Option<&Value> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    /// `self` followed by `other`. The nodes of `self` are copied; `other`
    /// becomes the shared tail of the result. Neither input changes.
    pub fn concat(&self, other: &List) -> List {
        let mut builder = ListBuilder::new();
        for value in self.iter() {
            builder.push(value.clone());
        }
        builder.finish_onto(other.clone())
    }

    /// True when both lists start at the same node.
    pub fn ptr_eq(&self, other: &List) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

// Long spines would otherwise drop recursively, one stack frame per node.
impl Drop for List {
    fn drop(&mut self) {
        let mut current = self.head.take();
        while let Some(node) = current {
            match Rc::try_unwrap(node) {
                Ok(mut node) => current = node.next.head.take(),
                Err(_) => break,
            }
        }
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x == y => continue,
                _ => return false,
            }
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut builder = ListBuilder::new();
        for value in iter {
            builder.push(value);
        }
        builder.finish()
    }
}

pub struct Iter<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.head.as_deref();
        Some(&node.value)
    }
}

/// Front-to-back list construction. Never exposed as a `Value`.
#[derive(Default)]
pub struct ListBuilder {
    items: Vec<Value>,
}

impl ListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn finish(self) -> List {
        self.finish_onto(List::new())
    }

    /// Freeze the collected items in front of an existing (shared) tail.
    pub fn finish_onto(self, tail: List) -> List {
        self.items
            .into_iter()
            .rev()
            .fold(tail, |list, value| list.cons(value))
    }
}
