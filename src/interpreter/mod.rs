pub mod callable;
pub mod environment;
pub mod resolver;
pub mod value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use log::{debug, trace};

use crate::ast::*;
use crate::error::RuntimeError;
use crate::interpreter::callable::{Callable, NativeFunction, TinyFunction};
use crate::interpreter::environment::Environment;
use crate::interpreter::resolver::Resolutions;
use crate::interpreter::value::{TinyClass, TinyInstance, Value};
use crate::scanner::token::Span;

/// Non-local exits from statement execution. `Return` is ordinary control
/// flow and is caught by the innermost call frame.
#[derive(Debug)]
enum Unwind {
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Self::Error(err)
    }
}

/// Deepest nesting of user function calls before a "stack overflow" error.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Stack kept free before a call frame grows the native stack.
const RED_ZONE: usize = 100 * 1024;
/// Size of each native stack segment allocated on growth.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Where `print` output goes.
enum Output {
    Writer(Box<dyn Write>),
    Capture(Vec<String>),
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<ExprId, usize>,
    output: Output,
    call_depth: usize,
    /// Resolutions dropped from `locals` once the current run finishes.
    top_level: Vec<ExprId>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolutions for Interpreter {
    fn record(&mut self, id: ExprId, distance: usize) {
        self.locals.insert(id, distance);
    }

    fn record_top_level(&mut self, id: ExprId, distance: usize) {
        self.locals.insert(id, distance);
        self.top_level.push(id);
    }
}

impl Interpreter {
    /// An interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        Self::with_output(Output::Writer(writer))
    }

    /// An interpreter that keeps printed lines in memory; see [`Self::output`].
    pub fn capturing() -> Self {
        Self::with_output(Output::Capture(Vec::new()))
    }

    fn with_output(output: Output) -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        for native in NativeFunction::ALL {
            globals
                .borrow_mut()
                .define(native.name(), Value::Function(Callable::Native(native)));
        }

        Self {
            globals: Rc::clone(&globals),
            environment: globals,
            locals: HashMap::new(),
            output,
            call_depth: 0,
            top_level: Vec::new(),
        }
    }

    /// Lines printed so far by a [`Self::capturing`] interpreter.
    pub fn output(&self) -> &[String] {
        match self.output {
            Output::Capture(ref lines) => lines,
            Output::Writer(_) => &[],
        }
    }

    /// Run `program`. `locals` is merged into the resolutions recorded by
    /// earlier runs, so globals and functions persist across calls.
    /// Top-level resolutions handed over through [`Resolutions`] are dropped
    /// when the run ends.
    pub fn interpret(
        &mut self,
        program: &Program,
        locals: HashMap<ExprId, usize>,
    ) -> Result<(), RuntimeError> {
        self.locals.extend(locals);
        debug!(
            "interpreting {} declarations ({} resolved locals)",
            program.declarations.len(),
            self.locals.len()
        );
        let result = self.execute_program(program);
        for id in self.top_level.drain(..) {
            self.locals.remove(&id);
        }
        result
    }

    fn execute_program(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for decl in &program.declarations {
            match self.execute_decl(decl) {
                Ok(()) => {}
                Err(Unwind::Error(err)) => {
                    debug!("runtime error: {}", err.message);
                    return Err(err);
                }
                Err(Unwind::Return(_)) => {
                    return Err(RuntimeError::new(
                        "can't return from top-level code",
                        decl.span(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn execute_decl(&mut self, decl: &Decl) -> Result<(), Unwind> {
        match decl {
            Decl::Var(v) => {
                let value = match v.initializer {
                    Some(ref init) => self.evaluate(init)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(v.name.clone(), value);
                Ok(())
            }
            Decl::Fun(f) => {
                let function = TinyFunction::new(
                    Rc::clone(&f.function),
                    Rc::clone(&self.environment),
                );
                trace!("defined function '{}'", f.function.name);
                self.environment.borrow_mut().define(
                    f.function.name.clone(),
                    Value::Function(Callable::User(function)),
                );
                Ok(())
            }
            Decl::Class(c) => Ok(self.execute_class(c)?),
            Decl::Statement(s) => self.execute_stmt(s),
        }
    }

    fn execute_class(&mut self, class: &ClassDecl) -> Result<(), RuntimeError> {
        let superclass = match class.superclass {
            Some(ref sc) => match self.look_up_variable(&sc.name, sc.id, sc.span)? {
                Value::Class(parent) => Some(parent),
                _ => return Err(RuntimeError::new("superclass must be a class", sc.span)),
            },
            None => None,
        };

        // Methods of a subclass close over a scope binding `super`.
        let method_env = match superclass {
            Some(ref parent) => {
                let env = Environment::child_of(&self.environment);
                env.borrow_mut()
                    .define("super", Value::Class(Rc::clone(parent)));
                env
            }
            None => Rc::clone(&self.environment),
        };

        let methods = class
            .methods
            .iter()
            .map(|method| {
                let function = TinyFunction::method(Rc::clone(method), Rc::clone(&method_env));
                (method.name.clone(), function)
            })
            .collect();

        let tiny_class = Rc::new(TinyClass {
            name: class.name.clone(),
            superclass,
            methods,
        });
        debug!(
            "defined class '{}' with {} method(s)",
            tiny_class.name,
            tiny_class.methods.len()
        );

        self.environment
            .borrow_mut()
            .define(class.name.clone(), Value::Class(tiny_class));
        Ok(())
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<(), Unwind> {
        match stmt {
            Stmt::Expression(e) => {
                self.evaluate(&e.expression)?;
                Ok(())
            }
            Stmt::Print(p) => {
                let value = self.evaluate(&p.expression)?;
                self.emit(value.to_string(), p.span)?;
                Ok(())
            }
            Stmt::Return(r) => {
                let value = match r.value {
                    Some(ref val) => self.evaluate(val)?,
                    None => Value::Nil,
                };
                Err(Unwind::Return(value))
            }
            Stmt::Block(b) => {
                let env = Environment::child_of(&self.environment);
                self.execute_block(&b.declarations, env)
            }
            Stmt::If(i) => {
                if self.evaluate(&i.condition)?.is_truthy() {
                    self.execute_stmt(&i.then_branch)
                } else if let Some(ref else_branch) = i.else_branch {
                    self.execute_stmt(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::While(w) => {
                while self.evaluate(&w.condition)?.is_truthy() {
                    self.execute_stmt(&w.body)?;
                }
                Ok(())
            }
        }
    }

    /// Run `declarations` in `env`, restoring the current environment on
    /// every exit path.
    fn execute_block(
        &mut self,
        declarations: &[Decl],
        env: Rc<RefCell<Environment>>,
    ) -> Result<(), Unwind> {
        let previous = std::mem::replace(&mut self.environment, env);
        let result = declarations.iter().try_for_each(|d| self.execute_decl(d));
        self.environment = previous;
        result
    }

    fn emit(&mut self, text: String, span: Span) -> Result<(), RuntimeError> {
        match self.output {
            Output::Writer(ref mut writer) => writeln!(writer, "{text}")
                .map_err(|e| RuntimeError::new(format!("failed to write output: {e}"), span)),
            Output::Capture(ref mut lines) => {
                lines.push(text);
                Ok(())
            }
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(l) => Ok(match l.value {
                LiteralValue::Number(n) => Value::Number(n),
                LiteralValue::String(ref s) => Value::Str(s.clone()),
                LiteralValue::Bool(b) => Value::Bool(b),
                LiteralValue::Nil => Value::Nil,
            }),
            Expr::Grouping(g) => self.evaluate(&g.expression),
            Expr::Unary(u) => {
                let operand = self.evaluate(&u.operand)?;
                match u.operator {
                    UnaryOp::Negate => match operand {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(RuntimeError::new("operand must be a number", u.span)),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                }
            }
            Expr::Binary(b) => self.evaluate_binary(b),
            Expr::Ternary(t) => {
                let branch = if self.evaluate(&t.condition)?.is_truthy() {
                    &t.then_branch
                } else {
                    &t.else_branch
                };
                match self.evaluate(branch)? {
                    value @ Value::Number(_) => Ok(value),
                    _ => Err(RuntimeError::new("operand must be a number", t.question)),
                }
            }
            Expr::Variable(v) => self.look_up_variable(&v.name, v.id, v.span),
            Expr::Assign(a) => {
                let value = self.evaluate(&a.value)?;
                let assigned = match self.locals.get(&a.id) {
                    Some(&distance) => {
                        self.environment
                            .borrow_mut()
                            .assign_at(distance, &a.name, value.clone())
                    }
                    None => self.globals.borrow_mut().assign(&a.name, value.clone()),
                };
                if !assigned {
                    return Err(RuntimeError::new(
                        format!("undefined variable '{}'", a.name),
                        a.span,
                    ));
                }
                Ok(value)
            }
            Expr::Logical(l) => {
                let left = self.evaluate(&l.left)?;
                let decided = match l.operator {
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::And => !left.is_truthy(),
                };
                if decided {
                    Ok(left)
                } else {
                    self.evaluate(&l.right)
                }
            }
            Expr::Call(c) => self.evaluate_call(c),
            Expr::Get(g) => match self.evaluate(&g.object)? {
                Value::Instance(inst) => {
                    let value = inst.borrow().get(&g.name, &inst);
                    value.ok_or_else(|| {
                        RuntimeError::new(format!("undefined property '{}'", g.name), g.span)
                    })
                }
                _ => Err(RuntimeError::new("only instances have properties", g.span)),
            },
            Expr::Set(s) => match self.evaluate(&s.object)? {
                Value::Instance(inst) => {
                    let value = self.evaluate(&s.value)?;
                    inst.borrow_mut().set(s.name.clone(), value.clone());
                    Ok(value)
                }
                _ => Err(RuntimeError::new("only instances have fields", s.span)),
            },
            Expr::This(t) => self.look_up_variable("this", t.id, t.span),
            Expr::Super(s) => self.evaluate_super(s),
        }
    }

    fn evaluate_binary(&mut self, b: &BinaryExpr) -> Result<Value, RuntimeError> {
        let left = self.evaluate(&b.left)?;
        let right = self.evaluate(&b.right)?;
        let span = b.operator_span;

        match b.operator {
            BinaryOp::Add => match (left, right) {
                (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x + y)),
                (Value::Str(x), Value::Str(y)) => Ok(Value::Str(x + &y)),
                (Value::Str(x), n @ Value::Number(_)) => Ok(Value::Str(format!("{x}{n}"))),
                (n @ Value::Number(_), Value::Str(y)) => Ok(Value::Str(format!("{n}{y}"))),
                _ => Err(RuntimeError::new(
                    "operands must be two numbers or two strings",
                    span,
                )),
            },
            BinaryOp::Subtract => numeric(&left, &right, span, |x, y| Value::Number(x - y)),
            BinaryOp::Multiply => numeric(&left, &right, span, |x, y| Value::Number(x * y)),
            BinaryOp::Divide => {
                if matches!(right, Value::Number(d) if d == 0.0)
                    && matches!(left, Value::Number(_))
                {
                    return Err(RuntimeError::new("division by zero", span));
                }
                numeric(&left, &right, span, |x, y| Value::Number(x / y))
            }
            BinaryOp::Less => numeric(&left, &right, span, |x, y| Value::Bool(x < y)),
            BinaryOp::LessEqual => numeric(&left, &right, span, |x, y| Value::Bool(x <= y)),
            BinaryOp::Greater => numeric(&left, &right, span, |x, y| Value::Bool(x > y)),
            BinaryOp::GreaterEqual => numeric(&left, &right, span, |x, y| Value::Bool(x >= y)),
            BinaryOp::Equal => Ok(Value::Bool(left.is_equal(&right))),
            BinaryOp::NotEqual => Ok(Value::Bool(!left.is_equal(&right))),
        }
    }

    fn evaluate_call(&mut self, c: &CallExpr) -> Result<Value, RuntimeError> {
        let callee = self.evaluate(&c.callee)?;

        let mut args = Vec::with_capacity(c.arguments.len());
        for arg in &c.arguments {
            args.push(self.evaluate(arg)?);
        }

        let check_arity = |arity: usize| {
            if args.len() == arity {
                Ok(())
            } else {
                Err(RuntimeError::new(
                    format!("expected {arity} arguments but got {}", args.len()),
                    c.paren,
                ))
            }
        };

        match callee {
            Value::Function(Callable::Native(native)) => {
                check_arity(native.arity())?;
                trace!("calling native '{}'", native.name());
                Ok(native.call(&args))
            }
            Value::Function(Callable::User(func)) => {
                check_arity(func.declaration.params.len())?;
                self.call_function(&func, args, c.paren)
            }
            Value::Class(class) => {
                check_arity(class.arity())?;
                trace!("instantiating '{}'", class.name);
                let instance = Rc::new(RefCell::new(TinyInstance::new(Rc::clone(&class))));
                if let Some(init) = class.find_method("init") {
                    self.call_function(&init.bind(Rc::clone(&instance)), args, c.paren)?;
                }
                Ok(Value::Instance(instance))
            }
            _ => Err(RuntimeError::new(
                "can only call functions and classes",
                c.paren,
            )),
        }
    }

    fn call_function(
        &mut self,
        func: &TinyFunction,
        args: Vec<Value>,
        call_site: Span,
    ) -> Result<Value, RuntimeError> {
        if self.call_depth >= MAX_CALL_DEPTH {
            debug!("call depth limit reached at line {}", call_site.line);
            return Err(RuntimeError::new("stack overflow", call_site));
        }
        trace!("calling '{}' at line {}", func.declaration.name, call_site.line);
        let env = Environment::child_of(&func.closure);
        for (param, arg) in func.declaration.params.iter().zip(args) {
            env.borrow_mut().define(param.name.clone(), arg);
        }

        self.call_depth += 1;
        let outcome = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
            self.execute_block(&func.declaration.body, env)
        });
        self.call_depth -= 1;

        let value = match outcome {
            Ok(()) => Value::Nil,
            Err(Unwind::Return(value)) => value,
            Err(Unwind::Error(err)) => return Err(err),
        };

        if func.is_initializer {
            return func
                .closure
                .borrow()
                .get_at(0, "this")
                .ok_or_else(|| RuntimeError::new("initializer has no 'this'", call_site));
        }
        Ok(value)
    }

    fn evaluate_super(&mut self, s: &SuperExpr) -> Result<Value, RuntimeError> {
        let unresolved = || RuntimeError::new("unresolved 'super'", s.span);
        let distance = *self.locals.get(&s.id).ok_or_else(unresolved)?;
        let superclass = self.environment.borrow().get_at(distance, "super");
        // `this` lives in the scope just inside the one binding `super`.
        let object = distance
            .checked_sub(1)
            .and_then(|d| self.environment.borrow().get_at(d, "this"));

        let (Some(Value::Class(superclass)), Some(Value::Instance(instance))) =
            (superclass, object)
        else {
            return Err(unresolved());
        };
        let method = superclass.find_method(&s.method).ok_or_else(|| {
            RuntimeError::new(format!("undefined property '{}'", s.method), s.span)
        })?;
        Ok(Value::Function(Callable::User(method.bind(instance))))
    }

    fn look_up_variable(&self, name: &str, id: ExprId, span: Span) -> Result<Value, RuntimeError> {
        let value = match self.locals.get(&id) {
            Some(&distance) => self.environment.borrow().get_at(distance, name),
            None => self.globals.borrow().get(name),
        };
        value.ok_or_else(|| RuntimeError::new(format!("undefined variable '{name}'"), span))
    }
}

/// Apply a numeric operator, failing unless both operands are numbers.
fn numeric(
    left: &Value,
    right: &Value,
    span: Span,
    op: impl FnOnce(f64, f64) -> Value,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(x), Value::Number(y)) => Ok(op(*x, *y)),
        _ => Err(RuntimeError::new("operands must be numbers", span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::resolver::Resolver;
    use crate::parser::Parser;
    use crate::scanner;
    use rstest::rstest;

    fn run(source: &str) -> Vec<String> {
        let tokens = scanner::scan(source).expect("scan should succeed");
        let program = Parser::new(tokens).parse().expect("parse should succeed");
        let locals = Resolver::new()
            .resolve(&program)
            .expect("resolve should succeed");
        let mut interp = Interpreter::capturing();
        interp
            .interpret(&program, locals)
            .expect("interpret should succeed");
        interp.output().to_vec()
    }

    fn run_err(source: &str) -> RuntimeError {
        let tokens = scanner::scan(source).expect("scan should succeed");
        let program = Parser::new(tokens).parse().expect("parse should succeed");
        let locals = Resolver::new()
            .resolve(&program)
            .expect("resolve should succeed");
        let mut interp = Interpreter::capturing();
        interp.interpret(&program, locals).unwrap_err()
    }

    #[rstest]
    #[case("print 1 + 2;", "3")]
    #[case("print 10 - 3;", "7")]
    #[case("print 2 * 3;", "6")]
    #[case("print 10 / 4;", "2.5")]
    #[case("print -5;", "-5")]
    #[case("print 1 + 2 * 3;", "7")]
    #[case("print (1 + 2) * 3;", "9")]
    fn arithmetic(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run(source), vec![expected]);
    }

    #[rstest]
    #[case("print \"hello\" + \" world\";", "hello world")]
    #[case("print \"n=\" + 3;", "n=3")]
    #[case("print 2.5 + \"x\";", "2.5x")]
    fn string_concatenation(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run(source), vec![expected]);
    }

    #[test]
    fn truthiness() {
        assert_eq!(run("print !nil;"), vec!["true"]);
        assert_eq!(run("print !false;"), vec!["true"]);
        assert_eq!(run("print !0;"), vec!["true"]);
        assert_eq!(run("print !1;"), vec!["false"]);
        assert_eq!(run("print !\"hello\";"), vec!["false"]);
        assert_eq!(run("if (0) print 1; else print 2;"), vec!["2"]);
    }

    #[test]
    fn equality() {
        assert_eq!(run("print 1 == 1;"), vec!["true"]);
        assert_eq!(run("print 1 == 2;"), vec!["false"]);
        assert_eq!(run("print nil == nil;"), vec!["true"]);
        assert_eq!(run("print 1 != 2;"), vec!["true"]);
        assert_eq!(run("print 0 == false;"), vec!["false"]);
        assert_eq!(run("print \"a\" == \"a\";"), vec!["true"]);
    }

    #[test]
    fn functions_compare_by_identity() {
        let output = run("fun f() {} var g = f; print f == g;
            class A { m() {} } var a = A(); print a.m == a.m;");
        assert_eq!(output, vec!["true", "false"]);
    }

    #[test]
    fn variables() {
        assert_eq!(run("var x = 10; print x;"), vec!["10"]);
        assert_eq!(run("var x; print x;"), vec!["nil"]);
        assert_eq!(run("var x = 1; x = 2; print x;"), vec!["2"]);
    }

    #[test]
    fn blocks_and_scoping() {
        let output = run("var a = 1; { var a = 2; print a; } print a;");
        assert_eq!(output, vec!["2", "1"]);
    }

    #[test]
    fn if_else() {
        assert_eq!(run("if (true) print 1; else print 2;"), vec!["1"]);
        assert_eq!(run("if (false) print 1; else print 2;"), vec!["2"]);
    }

    #[test]
    fn while_loop() {
        let output = run("var i = 0; while (i < 3) { print i; i = i + 1; }");
        assert_eq!(output, vec!["0", "1", "2"]);
    }

    #[test]
    fn for_loop() {
        let output = run("for (var i = 0; i < 3; i = i + 1) print i;");
        assert_eq!(output, vec!["0", "1", "2"]);
    }

    #[test]
    fn ternary_evaluates_only_the_chosen_branch() {
        let output = run("var hits = 0;
            fun hit(n) { hits = hits + 1; return n; }
            print true ? hit(1) : hit(2);
            print false ? hit(1) : hit(2);
            print hits;");
        assert_eq!(output, vec!["1", "2", "2"]);
    }

    #[test]
    fn ternary_requires_a_number_result() {
        let err = run_err("print true ? \"a\" : 1;");
        assert_eq!(err.message, "operand must be a number");
    }

    #[test]
    fn functions() {
        let output = run("fun add(a, b) { return a + b; } print add(1, 2);");
        assert_eq!(output, vec!["3"]);
    }

    #[test]
    fn function_without_return_yields_nil() {
        assert_eq!(run("fun f() {} print f();"), vec!["nil"]);
    }

    #[test]
    fn return_unwinds_nested_blocks_and_loops() {
        let output = run("fun find() {
                var i = 0;
                while (true) { { if (i == 3) return i; } i = i + 1; }
            }
            print find();");
        assert_eq!(output, vec!["3"]);
    }

    #[test]
    fn independent_closure_counters() {
        let output = run("fun makeCounter() {
                var i = 0;
                fun count() {
                    i = i + 1;
                    return i;
                }
                return count;
            }
            var a = makeCounter();
            var b = makeCounter();
            print a();
            print a();
            print b();");
        assert_eq!(output, vec!["1", "2", "1"]);
    }

    #[test]
    fn closures_see_later_mutation() {
        let output = run("fun outer() {
                var x = \"before\";
                fun show() { print x; }
                x = \"after\";
                show();
            }
            outer();");
        assert_eq!(output, vec!["after"]);
    }

    #[test]
    fn closures_bind_statically() {
        let output = run("var a = \"global\";
            {
                fun show() { print a; }
                show();
                var a = \"block\";
                show();
            }");
        assert_eq!(output, vec!["global", "global"]);
    }

    #[test]
    fn classes() {
        let output = run("class Foo {
                bar() { return 42; }
            }
            var foo = Foo();
            print foo.bar();
            print Foo;
            print foo;");
        assert_eq!(output, vec!["42", "Foo", "Foo instance"]);
    }

    #[test]
    fn class_fields() {
        let output = run("class Foo {}
            var foo = Foo();
            foo.x = 10;
            print foo.x;");
        assert_eq!(output, vec!["10"]);
    }

    #[test]
    fn class_this() {
        let output = run("class Foo {
                init(x) { this.x = x; }
                getX() { return this.x; }
            }
            var foo = Foo(42);
            print foo.getX();");
        assert_eq!(output, vec!["42"]);
    }

    #[test]
    fn class_arity_follows_init() {
        let err = run_err("class P { init(x) {} } P(1, 2);");
        assert_eq!(err.message, "expected 1 arguments but got 2");
        let err = run_err("class Q {} Q(1);");
        assert_eq!(err.message, "expected 0 arguments but got 1");
    }

    #[test]
    fn direct_init_call_returns_this() {
        let output = run("class P { init() { this.v = 1; return 7; } }
            var p = P();
            print p.init() == p;");
        assert_eq!(output, vec!["true"]);
    }

    #[test]
    fn inheritance() {
        let output = run("class Animal {
                speak() { return \"...\"; }
                name() { return \"animal\"; }
            }
            class Dog < Animal {
                speak() { return \"Woof!\"; }
            }
            var dog = Dog();
            print dog.speak();
            print dog.name();");
        assert_eq!(output, vec!["Woof!", "animal"]);
    }

    #[test]
    fn inherited_method_binds_this_to_subclass_instance() {
        let output = run("class A { who() { return this.tag; } }
            class B < A { init() { this.tag = \"b\"; } }
            print B().who();");
        assert_eq!(output, vec!["b"]);
    }

    #[test]
    fn inherited_init_is_used_for_arity() {
        let output = run("class A { init(x) { this.x = x; } }
            class B < A {}
            print B(5).x;");
        assert_eq!(output, vec!["5"]);
    }

    #[test]
    fn super_call() {
        let output = run("class A {
                greet() { return \"A\"; }
            }
            class B < A {
                greet() { return super.greet() + \"B\"; }
            }
            class C < B {
                greet() { return super.greet() + \"C\"; }
            }
            print C().greet();");
        assert_eq!(output, vec!["ABC"]);
    }

    #[test]
    fn logical_operators_return_deciding_operand() {
        assert_eq!(run("print true or false;"), vec!["true"]);
        assert_eq!(run("print false and true;"), vec!["false"]);
        assert_eq!(run("print nil or \"yes\";"), vec!["yes"]);
        assert_eq!(run("print 0 and 1;"), vec!["0"]);
    }

    #[test]
    fn display_of_callables() {
        let output = run("fun f() {} print f; print clock;");
        assert_eq!(output, vec!["<fn f>", "<native fn>"]);
    }

    #[test]
    fn clock_is_a_number() {
        assert_eq!(run("print clock() > 0;"), vec!["true"]);
    }

    #[rstest]
    #[case("print x;", "undefined variable 'x'")]
    #[case("x = 1;", "undefined variable 'x'")]
    #[case("fun f(a) {} f(1, 2);", "expected 1 arguments but got 2")]
    #[case("print 1 + \"a\" - 2;", "operands must be numbers")]
    #[case("print 1 + true;", "operands must be two numbers or two strings")]
    #[case("print 1 / 0;", "division by zero")]
    #[case("print -\"a\";", "operand must be a number")]
    #[case("print 1 < \"a\";", "operands must be numbers")]
    #[case("\"str\"();", "can only call functions and classes")]
    #[case("print 1.x;", "only instances have properties")]
    #[case("var n = 1; n.x = 2;", "only instances have fields")]
    #[case("class A {} print A().missing;", "undefined property 'missing'")]
    #[case("class A {} class B < A { m() { return super.nope; } } B().m();", "undefined property 'nope'")]
    #[case("var NotClass = 1; class B < NotClass {}", "superclass must be a class")]
    fn runtime_errors(#[case] source: &str, #[case] message: &str) {
        assert_eq!(run_err(source).message, message);
    }

    #[test]
    fn unbounded_recursion_is_a_runtime_error() {
        let err = run_err("fun f(n) { return f(n + 1); }\nf(0);");
        assert_eq!(err.message, "stack overflow");
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn call_depth_recovers_after_overflow() {
        let mut interp = Interpreter::capturing();
        for source in [
            "fun down(n) { if (n == 0) return 0; return down(n - 1); }",
            "fun forever() { return forever(); } forever();",
            "print down(900);",
        ] {
            let tokens = scanner::scan(source).expect("scan should succeed");
            let program = Parser::new(tokens).parse().expect("parse should succeed");
            Resolver::new()
                .resolve_into(&program, &mut interp)
                .expect("resolves");
            let _ = interp.interpret(&program, HashMap::new());
        }
        assert_eq!(interp.output(), ["0"]);
    }

    #[test]
    fn top_level_resolutions_are_dropped_after_each_run() {
        let mut interp = Interpreter::capturing();
        for source in [
            "fun add(a, b) { return a + b; }",
            "{ var x = 1; print add(x, x); }",
            "{ var y = 2; print add(y, y); }",
        ] {
            let tokens = scanner::scan(source).expect("scan should succeed");
            let program = Parser::new(tokens).parse().expect("parse should succeed");
            Resolver::new()
                .resolve_into(&program, &mut interp)
                .expect("resolves");
            interp
                .interpret(&program, HashMap::new())
                .expect("interpret should succeed");
        }
        assert_eq!(interp.output(), ["2", "4"]);
        // only `a` and `b` inside `add` remain
        assert_eq!(interp.locals.len(), 2);
        assert!(interp.top_level.is_empty());
    }

    #[test]
    fn runtime_error_reports_line() {
        let err = run_err("var a = 1;\n\nprint a / 0;");
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn output_before_error_is_kept() {
        let tokens = scanner::scan("print 1; print nope;").expect("scan should succeed");
        let program = Parser::new(tokens).parse().expect("parse should succeed");
        let locals = Resolver::new().resolve(&program).expect("resolves");
        let mut interp = Interpreter::capturing();
        assert!(interp.interpret(&program, locals).is_err());
        assert_eq!(interp.output(), ["1"]);
    }

    #[test]
    fn environment_is_restored_after_error_in_block() {
        let mut interp = Interpreter::capturing();
        for source in ["var a = \"outer\";", "{ var a = \"inner\"; print nope; }", "print a;"] {
            let tokens = scanner::scan(source).expect("scan should succeed");
            let program = Parser::new(tokens).parse().expect("parse should succeed");
            Resolver::new()
                .resolve_into(&program, &mut interp)
                .expect("resolves");
            let _ = interp.interpret(&program, HashMap::new());
        }
        assert_eq!(interp.output(), ["outer"]);
    }

    #[test]
    fn writer_receives_printed_lines() {
        #[derive(Clone, Default)]
        struct Shared(Rc<RefCell<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = Shared::default();
        let mut interp = Interpreter::with_writer(Box::new(sink.clone()));
        let tokens = scanner::scan("print 1; print \"two\";").expect("scan should succeed");
        let program = Parser::new(tokens).parse().expect("parse should succeed");
        interp
            .interpret(&program, HashMap::new())
            .expect("interpret should succeed");
        assert_eq!(sink.0.borrow().as_slice(), b"1\ntwo\n");
        assert!(interp.output().is_empty());
    }

    #[test]
    fn fibonacci() {
        let output = run("fun fib(n) {
                if (n <= 1) return n;
                return fib(n - 1) + fib(n - 2);
            }
            for (var i = 0; i < 10; i = i + 1) {
                print fib(i);
            }");
        assert_eq!(
            output,
            vec!["0", "1", "1", "2", "3", "5", "8", "13", "21", "34"]
        );
    }
}
