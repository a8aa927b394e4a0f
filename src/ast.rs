use std::fmt;

use serde::{Deserialize, Serialize};

/// Static classification of a term's result. Compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    Primitive { name: String },
    Function { left: Box<Type>, right: Box<Type> },
    Product { fields: Vec<Type>, tag: String },
    Sum { variants: Vec<Variant> },
}

/// One alternative of a sum type: the payload it carries and the constructor name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub payload: Type,
    pub tag: String,
}

impl Type {
    pub fn prim(name: impl Into<String>) -> Self {
        Type::Primitive { name: name.into() }
    }

    pub fn func(left: Type, right: Type) -> Self {
        Type::Function { left: Box::new(left), right: Box::new(right) }
    }

    /// Right-nested function chain `p0 -> p1 -> ... -> result`.
    pub fn curried(params: impl IntoIterator<Item = Type>, result: Type) -> Self {
        let params: Vec<Type> = params.into_iter().collect();
        params.into_iter().rev().fold(result, |acc, p| Type::func(p, acc))
    }

    pub fn product(tag: impl Into<String>, fields: Vec<Type>) -> Self {
        Type::Product { fields, tag: tag.into() }
    }

    pub fn sum<S: Into<String>>(variants: impl IntoIterator<Item = (Type, S)>) -> Self {
        Type::Sum {
            variants: variants
                .into_iter()
                .map(|(payload, tag)| Variant { payload, tag: tag.into() })
                .collect(),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Type::Primitive { .. } => Shape::Primitive,
            Type::Function { .. } => Shape::Function,
            Type::Product { .. } => Shape::Product,
            Type::Sum { .. } => Shape::Sum,
        }
    }
}

/// The coarse kind of a type or term, used when a rule requires one particular shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Primitive,
    Function,
    Product,
    Sum,
    Abstraction,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Shape::Primitive => "primitive type",
            Shape::Function => "function type",
            Shape::Product => "product type",
            Shape::Sum => "sum type",
            Shape::Abstraction => "abstraction",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive { name } => write!(f, "{name}"),
            Type::Function { left, right } => {
                if matches!(**left, Type::Function { .. }) {
                    write!(f, "({left}) -> {right}")
                } else {
                    write!(f, "{left} -> {right}")
                }
            }
            Type::Product { fields, tag } => {
                write!(f, "{tag}(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
            Type::Sum { variants } => {
                write!(f, "[")?;
                for (i, v) in variants.iter().enumerate() {
                    if i > 0 { write!(f, " | ")?; }
                    write!(f, "{}: {}", v.tag, v.payload)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A node of the typed expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    Reference { name: String },
    Abstraction { arg: String, arg_type: Type, body: Box<Term> },
    Application { func: Box<Term>, arg: Box<Term> },
    Deproduct { product: Box<Term>, names: Vec<String>, body: Box<Term> },
    Desum { sum: Box<Term>, cases: Vec<Case> },
    /// `term` must be an abstraction `\f: T. body` with `body: T`.
    Fixpoint { term: Box<Term> },
}

/// One arm of a desum. `name` is bound to the variant's payload inside `body`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub name: String,
    pub body: Term,
}

impl Term {
    pub fn reference(name: impl Into<String>) -> Self {
        Term::Reference { name: name.into() }
    }

    pub fn abs(arg: impl Into<String>, arg_type: Type, body: Term) -> Self {
        Term::Abstraction { arg: arg.into(), arg_type, body: Box::new(body) }
    }

    pub fn app(func: Term, arg: Term) -> Self {
        Term::Application { func: Box::new(func), arg: Box::new(arg) }
    }

    /// Curried application `func a0 a1 ...`.
    pub fn apps(func: Term, args: impl IntoIterator<Item = Term>) -> Self {
        args.into_iter().fold(func, Term::app)
    }

    pub fn deproduct<S: Into<String>>(product: Term, names: impl IntoIterator<Item = S>, body: Term) -> Self {
        Term::Deproduct {
            product: Box::new(product),
            names: names.into_iter().map(Into::into).collect(),
            body: Box::new(body),
        }
    }

    pub fn desum<S: Into<String>>(sum: Term, cases: impl IntoIterator<Item = (S, Term)>) -> Self {
        Term::Desum {
            sum: Box::new(sum),
            cases: cases
                .into_iter()
                .map(|(name, body)| Case { name: name.into(), body })
                .collect(),
        }
    }

    pub fn fix(term: Term) -> Self {
        Term::Fixpoint { term: Box::new(term) }
    }

    /// Short name of the term's kind, for unit names and log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Term::Reference { .. } => "ref",
            Term::Abstraction { .. } => "abs",
            Term::Application { .. } => "app",
            Term::Deproduct { .. } => "deproduct",
            Term::Desum { .. } => "desum",
            Term::Fixpoint { .. } => "fix",
        }
    }

    fn is_atom(&self) -> bool {
        matches!(self, Term::Reference { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Reference { name } => write!(f, "{name}"),
            Term::Abstraction { arg, arg_type, body } => write!(f, "\\{arg}: {arg_type}. {body}"),
            Term::Application { func, arg } => {
                match **func {
                    Term::Reference { .. } | Term::Application { .. } => write!(f, "{func}")?,
                    _ => write!(f, "({func})")?,
                }
                if arg.is_atom() {
                    write!(f, " {arg}")
                } else {
                    write!(f, " ({arg})")
                }
            }
            Term::Deproduct { product, names, body } => {
                write!(f, "let ({}) = {product} in {body}", names.join(", "))
            }
            Term::Desum { sum, cases } => {
                write!(f, "case {sum} of {{")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 { write!(f, ";")?; }
                    write!(f, " {} => {}", case.name, case.body)?;
                }
                write!(f, " }}")
            }
            Term::Fixpoint { term } => write!(f, "fix ({term})"),
        }
    }
}

/// A host-implemented function bound as a top-level name.
///
/// The external code unit follows the uniform calling convention: it receives a
/// stack position and finds its single argument one word below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignDecl {
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub ty: Type,
}

impl ForeignDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), symbol: None, ty }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Linker-visible symbol; defaults to the bound name.
    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }
}

/// Declared types, foreign bindings and the main term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub types: Vec<Type>,
    #[serde(default)]
    pub foreign: Vec<ForeignDecl>,
    pub term: Term,
}

impl Program {
    pub fn new(types: Vec<Type>, term: Term) -> Self {
        Self { types, foreign: Vec::new(), term }
    }

    pub fn with_foreign(mut self, decl: ForeignDecl) -> Self {
        self.foreign.push(decl);
        self
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.types {
            writeln!(f, "type {ty}")?;
        }
        for decl in &self.foreign {
            writeln!(f, "foreign {} = \"{}\" : {}", decl.name, decl.symbol(), decl.ty)?;
        }
        write!(f, "{}", self.term)
    }
}
