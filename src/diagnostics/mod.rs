use std::path::PathBuf;

use thiserror::Error;

use crate::ast::{Shape, Term, Type};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Class mismatch: expected {expected}, found {}", describe_actual(.actual))]
    ClassMismatch { term: Box<Term>, expected: Shape, actual: Option<Type> },

    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { term: Box<Term>, actual: Type, expected: Type },

    #[error("Arity mismatch: expected {expected}, found {found}")]
    ArityMismatch { term: Box<Term>, expected: usize, found: usize },

    #[error("Invalid type {ty}: {msg}")]
    TypeInvalid { ty: Type, msg: String },

    #[error("Unresolved reference '{name}'")]
    UnresolvedReference { name: String },

    #[error("Codegen error: {msg}")]
    Codegen { msg: String },

    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },
}

fn describe_actual(actual: &Option<Type>) -> String {
    match actual {
        Some(ty) => ty.to_string(),
        None => "a term of another kind".to_string(),
    }
}

impl CompileError {
    pub fn class_mismatch(term: &Term, expected: Shape, actual: Option<Type>) -> Self {
        Self::ClassMismatch { term: Box::new(term.clone()), expected, actual }
    }

    pub fn type_mismatch(term: &Term, actual: Type, expected: Type) -> Self {
        Self::TypeMismatch { term: Box::new(term.clone()), actual, expected }
    }

    pub fn arity_mismatch(term: &Term, expected: usize, found: usize) -> Self {
        Self::ArityMismatch { term: Box::new(term.clone()), expected, found }
    }

    pub fn type_invalid(ty: &Type, msg: impl Into<String>) -> Self {
        Self::TypeInvalid { ty: ty.clone(), msg: msg.into() }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedReference { name: name.into() }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    /// The term the error points at, if any.
    pub fn term(&self) -> Option<&Term> {
        match self {
            Self::ClassMismatch { term, .. }
            | Self::TypeMismatch { term, .. }
            | Self::ArityMismatch { term, .. } => Some(term.as_ref()),
            _ => None,
        }
    }

    /// Short kind label used in rendered diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassMismatch { .. } => "class-mismatch",
            Self::TypeMismatch { .. } => "type-mismatch",
            Self::ArityMismatch { .. } => "arity-mismatch",
            Self::TypeInvalid { .. } => "type-invalid",
            Self::UnresolvedReference { .. } => "unresolved-reference",
            Self::Codegen { .. } => "codegen",
            Self::Config { .. } => "config",
        }
    }
}

/// Render a CompileError for terminal output.
pub fn render_error(filename: &str, err: &CompileError) -> String {
    let mut out = format!("error[{}]: {err}\n  --> {filename}\n", err.kind());
    match err {
        CompileError::Config { path, .. } => {
            out.push_str(&format!("  config: {}\n", path.display()));
        }
        CompileError::TypeInvalid { ty, .. } => {
            out.push_str(&format!("  declared: {ty}\n"));
        }
        _ => {}
    }
    if let Some(term) = err.term() {
        out.push_str(&format!("  in term: {term}\n"));
    }
    out
}
