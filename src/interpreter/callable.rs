use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ast::Function;
use crate::interpreter::environment::Environment;
use crate::interpreter::value::{TinyInstance, Value};

/// Anything a call expression can invoke, other than a class.
#[derive(Debug, Clone)]
pub enum Callable {
    Native(NativeFunction),
    User(TinyFunction),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Self::Native(n) => n.arity(),
            Self::User(u) => u.declaration.params.len(),
        }
    }

    /// Identity comparison: the same native, or the same declaration closed
    /// over the same environment.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => a == b,
            (Self::User(a), Self::User(b)) => {
                Rc::ptr_eq(&a.declaration, &b.declaration) && Rc::ptr_eq(&a.closure, &b.closure)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => write!(f, "<native fn>"),
            Self::User(u) => write!(f, "<fn {}>", u.declaration.name),
        }
    }
}

/// A user-defined function or method together with the scope it closes over.
#[derive(Debug, Clone)]
pub struct TinyFunction {
    pub declaration: Rc<Function>,
    pub closure: Rc<RefCell<Environment>>,
    /// `init` methods return `this` when invoked directly.
    pub is_initializer: bool,
}

impl TinyFunction {
    pub fn new(declaration: Rc<Function>, closure: Rc<RefCell<Environment>>) -> Self {
        Self {
            declaration,
            closure,
            is_initializer: false,
        }
    }

    pub fn method(declaration: Rc<Function>, closure: Rc<RefCell<Environment>>) -> Self {
        let is_initializer = declaration.name == "init";
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    /// Copy of this method whose closure binds `this` to `instance`.
    pub fn bind(&self, instance: Rc<RefCell<TinyInstance>>) -> Self {
        let env = Environment::child_of(&self.closure);
        env.borrow_mut().define("this", Value::Instance(instance));
        Self {
            declaration: Rc::clone(&self.declaration),
            closure: env,
            is_initializer: self.is_initializer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFunction {
    Clock,
}

impl NativeFunction {
    pub const ALL: [NativeFunction; 1] = [NativeFunction::Clock];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Clock => "clock",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Clock => 0,
        }
    }

    pub fn call(&self, _args: &[Value]) -> Value {
        match self {
            Self::Clock => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                Value::Number(secs)
            }
        }
    }
}
