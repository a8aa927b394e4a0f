//! Direct evaluator for the calculus, used to cross-check compiled programs.
//!
//! Values are immutable and shared through `Rc`; environments are persistent
//! linked frames, so closures capture their scope by reference count instead of by
//! raw stack position.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{Program, Shape, Term, Type};
use crate::diagnostics::CompileError;

/// A host function standing in for a foreign binding.
pub type Primitive = Rc<dyn Fn(&Value) -> Value>;

#[derive(Clone)]
pub enum Value {
    /// Contents of a primitive box.
    Word(u64),
    Product(Rc<[Value]>),
    Sum { tag: u32, payload: Rc<Value> },
    Closure(Rc<Closure>),
}

pub enum Closure {
    Lambda { arg: String, body: Rc<Term>, env: Env },
    /// `fix (\arg. body)`; unrolled once per application.
    Fix { arg: String, body: Rc<Term>, env: Env },
    Variant { tag: u32 },
    /// Curried product constructor that has received `fields.len()` of `arity` fields.
    Product { arity: usize, fields: Vec<Value> },
    Foreign { name: String, func: Primitive },
}

impl Value {
    pub fn word(n: u64) -> Self {
        Value::Word(n)
    }

    pub fn product(fields: impl IntoIterator<Item = Value>) -> Self {
        Value::Product(fields.into_iter().collect())
    }

    pub fn sum(tag: u32, payload: Value) -> Self {
        Value::Sum { tag, payload: Rc::new(payload) }
    }

    pub fn as_word(&self) -> Option<u64> {
        match self {
            Value::Word(n) => Some(*n),
            _ => None,
        }
    }
}

/// Closures are never equal, not even to themselves.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Word(a), Value::Word(b)) => a == b,
            (Value::Product(a), Value::Product(b)) => a == b,
            (Value::Sum { tag: ta, payload: pa }, Value::Sum { tag: tb, payload: pb }) => ta == tb && pa == pb,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Word(n) => write!(f, "{n}"),
            Value::Product(fields) => f.debug_tuple("Product").field(&&fields[..]).finish(),
            Value::Sum { tag, payload } => write!(f, "Sum({tag}, {payload:?})"),
            Value::Closure(c) => match c.as_ref() {
                Closure::Lambda { arg, .. } => write!(f, "<closure \\{arg}>"),
                Closure::Fix { arg, .. } => write!(f, "<fix \\{arg}>"),
                Closure::Variant { tag } => write!(f, "<constructor #{tag}>"),
                Closure::Product { arity, fields } => write!(f, "<product {}/{arity}>", fields.len()),
                Closure::Foreign { name, .. } => write!(f, "<foreign {name}>"),
            },
        }
    }
}

#[derive(Clone, Default)]
pub struct Env(Option<Rc<Frame>>);

struct Frame {
    name: String,
    value: Value,
    next: Env,
}

impl Env {
    fn bind(&self, name: impl Into<String>, value: Value) -> Env {
        Env(Some(Rc::new(Frame { name: name.into(), value, next: self.clone() })))
    }

    fn lookup(&self, name: &str) -> Result<Value, CompileError> {
        let mut cursor = &self.0;
        while let Some(frame) = cursor {
            if frame.name == name {
                return Ok(frame.value.clone());
            }
            cursor = &frame.next.0;
        }
        Err(CompileError::unresolved(name))
    }
}

/// Evaluate `program`'s main term and apply it to `input`.
///
/// `foreign` supplies an implementation for each foreign binding, keyed by its name.
pub fn eval_program(
    program: &Program,
    input: Value,
    foreign: &HashMap<String, Primitive>,
) -> Result<Value, CompileError> {
    let mut env = Env::default();
    for ty in &program.types {
        match ty {
            Type::Primitive { .. } => {}
            Type::Sum { variants } => {
                for (i, variant) in variants.iter().enumerate() {
                    let ctor = Closure::Variant { tag: i as u32 };
                    env = env.bind(&variant.tag, Value::Closure(Rc::new(ctor)));
                }
            }
            Type::Product { fields, tag } => {
                let value = if fields.is_empty() {
                    Value::product([])
                } else {
                    Value::Closure(Rc::new(Closure::Product { arity: fields.len(), fields: Vec::new() }))
                };
                env = env.bind(tag, value);
            }
            Type::Function { .. } => {
                return Err(CompileError::type_invalid(ty, "function types cannot be declared"));
            }
        }
    }
    for decl in &program.foreign {
        let func = foreign.get(&decl.name).ok_or_else(|| CompileError::unresolved(&decl.name))?;
        let prim = Closure::Foreign { name: decl.name.clone(), func: Rc::clone(func) };
        env = env.bind(&decl.name, Value::Closure(Rc::new(prim)));
    }

    let main = eval(&program.term, &env)?;
    apply(main, input, &program.term)
}

pub fn eval(term: &Term, env: &Env) -> Result<Value, CompileError> {
    match term {
        Term::Reference { name } => env.lookup(name),
        Term::Abstraction { arg, body, .. } => Ok(Value::Closure(Rc::new(Closure::Lambda {
            arg: arg.clone(),
            body: Rc::new((**body).clone()),
            env: env.clone(),
        }))),
        Term::Application { func, arg } => {
            let f = eval(func, env)?;
            let a = eval(arg, env)?;
            apply(f, a, func)
        }
        Term::Deproduct { product, names, body } => {
            let Value::Product(fields) = eval(product, env)? else {
                return Err(CompileError::class_mismatch(product, Shape::Product, None));
            };
            if fields.len() != names.len() {
                return Err(CompileError::arity_mismatch(product, fields.len(), names.len()));
            }
            let mut scope = env.clone();
            for (name, field) in names.iter().zip(fields.iter()) {
                scope = scope.bind(name, field.clone());
            }
            eval(body, &scope)
        }
        Term::Desum { sum, cases } => {
            let Value::Sum { tag, payload } = eval(sum, env)? else {
                return Err(CompileError::class_mismatch(sum, Shape::Sum, None));
            };
            let case = cases
                .get(tag as usize)
                .ok_or_else(|| CompileError::arity_mismatch(sum, tag as usize + 1, cases.len()))?;
            eval(&case.body, &env.bind(&case.name, (*payload).clone()))
        }
        Term::Fixpoint { term: inner } => {
            let Term::Abstraction { arg, body, .. } = inner.as_ref() else {
                return Err(CompileError::class_mismatch(inner, Shape::Abstraction, None));
            };
            Ok(Value::Closure(Rc::new(Closure::Fix {
                arg: arg.clone(),
                body: Rc::new((**body).clone()),
                env: env.clone(),
            })))
        }
    }
}

/// Apply `f` to `a`; `at` is the term reported if `f` is not applicable.
fn apply(f: Value, a: Value, at: &Term) -> Result<Value, CompileError> {
    let Value::Closure(closure) = f else {
        return Err(CompileError::class_mismatch(at, Shape::Function, None));
    };
    match closure.as_ref() {
        Closure::Lambda { arg, body, env } => eval(body, &env.bind(arg, a)),
        Closure::Fix { arg, body, env } => {
            let this = Value::Closure(Rc::clone(&closure));
            let unrolled = eval(body, &env.bind(arg, this))?;
            apply(unrolled, a, at)
        }
        Closure::Variant { tag } => Ok(Value::sum(*tag, a)),
        Closure::Product { arity, fields } => {
            let mut fields = fields.clone();
            fields.push(a);
            if fields.len() == *arity {
                Ok(Value::product(fields))
            } else {
                Ok(Value::Closure(Rc::new(Closure::Product { arity: *arity, fields })))
            }
        }
        Closure::Foreign { func, .. } => Ok(func(&a)),
    }
}
