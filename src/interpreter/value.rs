use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::callable::{Callable, TinyFunction};

#[derive(Clone, Debug)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    Nil,
    Function(Callable),
    Class(Rc<TinyClass>),
    Instance(Rc<RefCell<TinyInstance>>),
}

impl Value {
    /// `nil`, `false` and `0` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    /// Value equality for primitives, identity for functions, classes and
    /// instances. Values of different types are never equal.
    pub fn is_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.same_as(b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64's Display already drops a trailing ".0".
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Nil => write!(f, "nil"),
            Self::Function(func) => write!(f, "{func}"),
            Self::Class(class) => write!(f, "{class}"),
            Self::Instance(inst) => write!(f, "{}", inst.borrow()),
        }
    }
}

#[derive(Debug)]
pub struct TinyClass {
    pub name: String,
    pub superclass: Option<Rc<TinyClass>>,
    pub methods: HashMap<String, TinyFunction>,
}

impl TinyClass {
    /// Own methods first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<TinyFunction> {
        self.methods
            .get(name)
            .cloned()
            .or_else(|| self.superclass.as_ref().and_then(|sc| sc.find_method(name)))
    }

    /// Number of arguments a call to the class takes: `init`'s arity, or 0.
    pub fn arity(&self) -> usize {
        self.find_method("init")
            .map_or(0, |init| init.declaration.params.len())
    }
}

impl fmt::Display for TinyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug)]
pub struct TinyInstance {
    pub class: Rc<TinyClass>,
    pub fields: HashMap<String, Value>,
}

impl TinyInstance {
    pub fn new(class: Rc<TinyClass>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    /// Field named `name`, or else the class method of that name bound to
    /// `this`. Fields shadow methods.
    pub fn get(&self, name: &str, this: &Rc<RefCell<TinyInstance>>) -> Option<Value> {
        if let Some(val) = self.fields.get(name) {
            return Some(val.clone());
        }
        self.class
            .find_method(name)
            .map(|method| Value::Function(Callable::User(method.bind(Rc::clone(this)))))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

impl fmt::Display for TinyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn class(name: &str, superclass: Option<Rc<TinyClass>>) -> Rc<TinyClass> {
        Rc::new(TinyClass {
            name: name.to_string(),
            superclass,
            methods: HashMap::new(),
        })
    }

    #[rstest]
    #[case(Value::Nil, false)]
    #[case(Value::Bool(false), false)]
    #[case(Value::Number(0.0), false)]
    #[case(Value::Bool(true), true)]
    #[case(Value::Number(-1.5), true)]
    #[case(Value::Str(String::new()), true)]
    fn truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[rstest]
    #[case(Value::Number(3.0), "3")]
    #[case(Value::Number(2.5), "2.5")]
    #[case(Value::Number(-7.0), "-7")]
    #[case(Value::Nil, "nil")]
    #[case(Value::Bool(true), "true")]
    #[case(Value::Str("hi".into()), "hi")]
    fn display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn equality_never_crosses_types() {
        assert!(!Value::Number(0.0).is_equal(&Value::Bool(false)));
        assert!(!Value::Nil.is_equal(&Value::Bool(false)));
        assert!(!Value::Str("1".into()).is_equal(&Value::Number(1.0)));
    }

    #[test]
    fn classes_and_instances_compare_by_identity() {
        let a = class("A", None);
        let other = class("A", None);
        assert!(Value::Class(Rc::clone(&a)).is_equal(&Value::Class(Rc::clone(&a))));
        assert!(!Value::Class(Rc::clone(&a)).is_equal(&Value::Class(other)));

        let inst = Rc::new(RefCell::new(TinyInstance::new(Rc::clone(&a))));
        let twin = Rc::new(RefCell::new(TinyInstance::new(a)));
        assert!(Value::Instance(Rc::clone(&inst)).is_equal(&Value::Instance(Rc::clone(&inst))));
        assert!(!Value::Instance(inst).is_equal(&Value::Instance(twin)));
    }

    #[test]
    fn instance_display_and_fields() {
        let inst = Rc::new(RefCell::new(TinyInstance::new(class("Point", None))));
        inst.borrow_mut().set("x", Value::Number(1.0));
        assert_eq!(inst.borrow().to_string(), "Point instance");
        let x = inst.borrow().get("x", &inst);
        assert!(matches!(x, Some(Value::Number(n)) if n == 1.0));
        assert!(inst.borrow().get("y", &inst).is_none());
    }

    #[test]
    fn class_without_init_has_zero_arity() {
        let base = class("Base", None);
        let derived = class("Derived", Some(base));
        assert_eq!(derived.arity(), 0);
        assert!(derived.find_method("init").is_none());
    }
}
