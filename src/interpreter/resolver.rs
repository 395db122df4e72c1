use std::collections::HashMap;

use log::{debug, trace};

use crate::ast::*;
use crate::error::CompileError;
use crate::scanner::token::Span;

/// Receiver of the resolver's output: one call per local variable reference.
pub trait Resolutions {
    fn record(&mut self, id: ExprId, distance: usize);

    /// A reference outside every function body. It is only evaluated while
    /// the program that contains it runs.
    fn record_top_level(&mut self, id: ExprId, distance: usize) {
        self.record(id, distance);
    }
}

impl Resolutions for HashMap<ExprId, usize> {
    fn record(&mut self, id: ExprId, distance: usize) {
        self.insert(id, distance);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

pub struct Resolver {
    /// Innermost scope last. `false` means declared but not yet defined.
    scopes: Vec<HashMap<String, bool>>,
    /// `(expr, distance, inside a function body)`
    resolved: Vec<(ExprId, usize, bool)>,
    current_function: FunctionType,
    current_class: ClassType,
    /// Global whose initializer is being resolved.
    pending_global: Option<String>,
    errors: Vec<CompileError>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            resolved: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            pending_global: None,
            errors: Vec::new(),
        }
    }

    pub fn resolve(self, program: &Program) -> Result<HashMap<ExprId, usize>, Vec<CompileError>> {
        let mut locals = HashMap::new();
        self.resolve_into(program, &mut locals)?;
        Ok(locals)
    }

    /// Resolve `program`, handing every local reference to `sink`. Nothing is
    /// recorded if any resolution error is found.
    pub fn resolve_into(
        mut self,
        program: &Program,
        sink: &mut impl Resolutions,
    ) -> Result<(), Vec<CompileError>> {
        for decl in &program.declarations {
            self.resolve_decl(decl);
        }
        if !self.errors.is_empty() {
            debug!("resolution failed with {} error(s)", self.errors.len());
            return Err(self.errors);
        }
        debug!("resolved {} local references", self.resolved.len());
        for (id, distance, in_function) in self.resolved {
            if in_function {
                sink.record(id, distance);
            } else {
                sink.record_top_level(id, distance);
            }
        }
        Ok(())
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, span: Span) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(name) {
            self.errors.push(CompileError::resolve(
                "already a variable with this name in this scope",
                name,
                span,
            ));
        }
        scope.insert(name.to_string(), false);
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    /// Bind a name that is ready as soon as its scope opens (`this`, `super`).
    fn bind_implicit(&mut self, name: &str) {
        self.begin_scope();
        self.define(name);
    }

    fn resolve_local(&mut self, id: ExprId, name: &str) {
        let found = self
            .scopes
            .iter()
            .rev()
            .position(|scope| scope.contains_key(name));
        match found {
            Some(distance) => {
                trace!("resolved '{name}' (expr {id}) at distance {distance}");
                let in_function = self.current_function != FunctionType::None;
                self.resolved.push((id, distance, in_function));
            }
            None => trace!("'{name}' (expr {id}) left global"),
        }
    }

    fn resolve_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Var(v) => {
                self.declare(&v.name, v.name_span);
                if let Some(ref init) = v.initializer {
                    if self.scopes.is_empty() {
                        self.pending_global = Some(v.name.clone());
                        self.resolve_expr(init);
                        self.pending_global = None;
                    } else {
                        self.resolve_expr(init);
                    }
                }
                self.define(&v.name);
            }
            Decl::Fun(f) => {
                // Defined before the body so the function can recurse.
                self.declare(&f.function.name, f.function.span);
                self.define(&f.function.name);
                self.resolve_function(&f.function, FunctionType::Function);
            }
            Decl::Class(c) => self.resolve_class(c),
            Decl::Statement(s) => self.resolve_stmt(s),
        }
    }

    fn resolve_class(&mut self, class: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(&class.name, class.name_span);

        if let Some(ref superclass) = class.superclass {
            if superclass.name == class.name {
                self.errors.push(CompileError::resolve(
                    "a class can't inherit from itself",
                    &superclass.name,
                    superclass.span,
                ));
            }
            self.current_class = ClassType::Subclass;
            self.resolve_local(superclass.id, &superclass.name);
            self.bind_implicit("super");
        }

        self.bind_implicit("this");
        for method in &class.methods {
            self.resolve_function(method, FunctionType::Method);
        }
        self.end_scope();

        if class.superclass.is_some() {
            self.end_scope();
        }
        self.define(&class.name);
        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, function: &Function, func_type: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = func_type;
        self.begin_scope();
        for param in &function.params {
            self.declare(&param.name, param.span);
            self.define(&param.name);
        }
        for decl in &function.body {
            self.resolve_decl(decl);
        }
        self.end_scope();
        self.current_function = enclosing;
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(e) => self.resolve_expr(&e.expression),
            Stmt::Print(p) => self.resolve_expr(&p.expression),
            Stmt::Return(r) => {
                if self.current_function == FunctionType::None {
                    self.errors.push(CompileError::resolve(
                        "can't return from top-level code",
                        "return",
                        r.keyword,
                    ));
                }
                if let Some(ref value) = r.value {
                    self.resolve_expr(value);
                }
            }
            Stmt::Block(b) => {
                self.begin_scope();
                for decl in &b.declarations {
                    self.resolve_decl(decl);
                }
                self.end_scope();
            }
            Stmt::If(i) => {
                self.resolve_expr(&i.condition);
                self.resolve_stmt(&i.then_branch);
                if let Some(ref else_branch) = i.else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While(w) => {
                self.resolve_expr(&w.condition);
                self.resolve_stmt(&w.body);
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable(v) => self.resolve_variable(v),
            Expr::Assign(a) => {
                self.resolve_expr(&a.value);
                self.resolve_local(a.id, &a.name);
            }
            Expr::Binary(b) => {
                self.resolve_expr(&b.left);
                self.resolve_expr(&b.right);
            }
            Expr::Unary(u) => self.resolve_expr(&u.operand),
            Expr::Logical(l) => {
                self.resolve_expr(&l.left);
                self.resolve_expr(&l.right);
            }
            Expr::Ternary(t) => {
                self.resolve_expr(&t.condition);
                self.resolve_expr(&t.then_branch);
                self.resolve_expr(&t.else_branch);
            }
            Expr::Call(c) => {
                self.resolve_expr(&c.callee);
                for arg in &c.arguments {
                    self.resolve_expr(arg);
                }
            }
            Expr::Get(g) => self.resolve_expr(&g.object),
            Expr::Set(s) => {
                self.resolve_expr(&s.value);
                self.resolve_expr(&s.object);
            }
            Expr::Grouping(g) => self.resolve_expr(&g.expression),
            Expr::This(t) => {
                if self.current_class == ClassType::None {
                    self.errors.push(CompileError::resolve(
                        "can't use 'this' outside of a class",
                        "this",
                        t.span,
                    ));
                    return;
                }
                self.resolve_local(t.id, "this");
            }
            Expr::Super(s) => {
                let message = match self.current_class {
                    ClassType::None => "can't use 'super' outside of a class",
                    ClassType::Class => "can't use 'super' in a class with no superclass",
                    ClassType::Subclass => {
                        self.resolve_local(s.id, "super");
                        return;
                    }
                };
                self.errors
                    .push(CompileError::resolve(message, "super", s.span));
            }
            Expr::Literal(_) => {}
        }
    }

    fn resolve_variable(&mut self, v: &VariableExpr) {
        let own_initializer = match self.scopes.last() {
            Some(scope) => scope.get(&v.name) == Some(&false),
            None => self.pending_global.as_deref() == Some(v.name.as_str()),
        };

        if own_initializer {
            self.errors.push(CompileError::resolve(
                format!(
                    "can't read local variable '{}': used in its own initializer",
                    v.name
                ),
                &v.name,
                v.span,
            ));
        }
        self.resolve_local(v.id, &v.name);
    }
}
