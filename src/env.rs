//! Compile-time symbol table mapping names to stack displacements.
//!
//! Bindings are strictly nested: `push` appends, `pop` removes the most recent
//! binding. A binding's offset is the cumulative size before it was pushed, and
//! [`Environment::find`] reports it relative to the current cumulative size, so the
//! result is a negative displacement from the stack position a unit receives.

use crate::ast::Type;
use crate::diagnostics::CompileError;

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub ty: Type,
    pub offset: i64,
    pub size: i64,
}

#[derive(Debug, Default)]
pub struct Environment {
    bindings: Vec<Binding>,
    size: i64,
    high_water: i64,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, ty: Type, size: i64) {
        let name = name.into();
        tracing::trace!(%name, offset = self.size, size, "env push");
        self.bindings.push(Binding { name, ty, offset: self.size, size });
        self.size += size;
        self.high_water = self.high_water.max(self.size);
    }

    /// Remove the most recent binding.
    ///
    /// Popping an empty environment means the lowering lost track of its own
    /// scopes, so this panics instead of returning an error.
    pub fn pop(&mut self) -> Binding {
        let Some(binding) = self.bindings.pop() else {
            panic!("Environment::pop called on an empty scope");
        };
        self.size -= binding.size;
        tracing::trace!(name = %binding.name, "env pop");
        binding
    }

    /// Resolve `name` to `(displacement, type)`. The most recent binding wins.
    pub fn find(&self, name: &str) -> Result<(i64, &Type), CompileError> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.name == name)
            .map(|b| (b.offset - self.size, &b.ty))
            .ok_or_else(|| CompileError::unresolved(name))
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    /// Largest cumulative size reached so far.
    pub fn high_water(&self) -> i64 {
        self.high_water
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
