use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::value::Value;

/// One lexical scope at runtime. Closures hold an `Rc` to the scope they were
/// created in, so the scope lives as long as any of them does.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Shorthand for a shared child scope of `enclosing`.
    pub fn child_of(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Self::with_enclosing(Rc::clone(enclosing))))
    }

    /// Bind `name` in this scope, replacing any previous binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look `name` up through the whole chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(val) = self.values.get(name) {
            return Some(val.clone());
        }
        self.enclosing
            .as_ref()
            .and_then(|enclosing| enclosing.borrow().get(name))
    }

    /// Look `name` up exactly `distance` links out.
    pub fn get_at(&self, distance: usize, name: &str) -> Option<Value> {
        if distance == 0 {
            self.values.get(name).cloned()
        } else {
            self.enclosing
                .as_ref()?
                .borrow()
                .get_at(distance - 1, name)
        }
    }

    /// Assign to the nearest existing binding. Returns `false` if none exists.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return true;
        }
        match self.enclosing {
            Some(ref enclosing) => enclosing.borrow_mut().assign(name, value),
            None => false,
        }
    }

    /// Assign to the binding exactly `distance` links out. Returns `false` if
    /// the chain is shorter than `distance`.
    pub fn assign_at(&mut self, distance: usize, name: &str, value: Value) -> bool {
        if distance == 0 {
            self.values.insert(name.to_string(), value);
            true
        } else {
            match self.enclosing {
                Some(ref enclosing) => {
                    enclosing
                        .borrow_mut()
                        .assign_at(distance - 1, name, value)
                }
                None => false,
            }
        }
    }
}
