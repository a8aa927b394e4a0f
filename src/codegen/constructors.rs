//! Constructor code units for declared types, and host-provided foreign bindings.
//!
//! Every top-level binding is produced by a *materializer*: a unit the entry calls
//! with a null stack whose result is pushed as the binding's value.

use cranelift_module::{FuncId, Linkage, Module};

use crate::ast::{ForeignDecl, Type};
use crate::diagnostics::CompileError;

use super::lower::{sanitize, LowerContext};

/// A top-level binding and the unit computing its value.
#[derive(Debug, Clone)]
pub struct Materializer {
    pub name: String,
    pub ty: Type,
    pub unit: FuncId,
}

impl<'m, M: Module> LowerContext<'m, M> {
    /// Generate constructors for every declared type, in order, and bind them.
    pub fn declare_types(&mut self, types: &[Type], max_variants: u64) -> Result<Vec<Materializer>, CompileError> {
        let mut bound = Vec::new();
        for ty in types {
            match ty {
                Type::Primitive { .. } => {}
                Type::Sum { variants } => {
                    if variants.len() as u64 > max_variants {
                        return Err(CompileError::type_invalid(
                            ty,
                            format!("{} variants exceed the {max_variants} a tag can distinguish", variants.len()),
                        ));
                    }
                    for (index, variant) in variants.iter().enumerate() {
                        let unit = self.sum_constructor(&variant.tag, index as u32)?;
                        bound.push(self.bind(&variant.tag, Type::func(variant.payload.clone(), ty.clone()), unit));
                    }
                }
                Type::Product { fields, tag } => {
                    let unit = self.product_constructor(tag, fields.len())?;
                    let binding = if fields.is_empty() {
                        ty.clone()
                    } else {
                        Type::curried(fields.iter().cloned(), ty.clone())
                    };
                    bound.push(self.bind(tag, binding, unit));
                }
                Type::Function { .. } => {
                    return Err(CompileError::type_invalid(ty, "function types cannot be declared"));
                }
            }
        }
        Ok(bound)
    }

    /// Import each foreign symbol and bind it as a closure over a fresh one-word stack.
    pub fn declare_foreign(&mut self, decls: &[ForeignDecl]) -> Result<Vec<Materializer>, CompileError> {
        let mut bound = Vec::with_capacity(decls.len());
        for decl in decls {
            if !matches!(decl.ty, Type::Function { .. }) {
                return Err(CompileError::type_invalid(
                    &decl.ty,
                    format!("foreign binding '{}' must have a function type", decl.name),
                ));
            }
            let symbol = decl.symbol();
            let imported = self
                .module
                .declare_function(symbol, Linkage::Import, &self.unit_sig)
                .map_err(|e| CompileError::codegen(format!("declare foreign {symbol} error: {e}")))?;
            let unit = self.closure_materializer(&decl.name, imported, self.layout.word_bytes())?;
            bound.push(self.bind(&decl.name, decl.ty.clone(), unit));
        }
        Ok(bound)
    }

    fn bind(&mut self, name: &str, ty: Type, unit: FuncId) -> Materializer {
        self.env.push(name, ty.clone(), self.layout.word_bytes());
        Materializer { name: name.to_string(), ty, unit }
    }

    /// `tag(payload)`: pops its payload and boxes it with the variant's index.
    fn sum_constructor(&mut self, tag: &str, index: u32) -> Result<FuncId, CompileError> {
        let hint = sanitize(tag);
        let ctor = self.define_unit(&format!("sum_{hint}"), |em, stack| {
            let (_, payload) = em.pop(stack);
            Ok(em.alloc_sum(index, payload))
        })?;
        self.closure_materializer(tag, ctor, self.layout.word_bytes())
    }

    /// Curried product constructor.
    ///
    /// The base unit copies the `fields` words below its stack into a fresh record.
    /// Each trampoline returns a closure over the previous link at its own stack, so
    /// applying the materialized closure `fields` times fills the shared buffer from
    /// the bottom and finally runs the base unit just above it.
    fn product_constructor(&mut self, tag: &str, fields: usize) -> Result<FuncId, CompileError> {
        let hint = sanitize(tag);
        if fields == 0 {
            return self.define_unit(&format!("mat_{hint}"), |em, _| Ok(em.alloc_product(0)));
        }

        let word = self.layout.word_bytes();
        let mut link = self.define_unit(&format!("prod_{hint}"), |em, stack| {
            let record = em.alloc_product(fields);
            for i in 0..fields {
                let field = em.stack_slot(stack, -((fields - i) as i64) * word);
                em.write_field(record, i, field);
            }
            Ok(record)
        })?;
        for depth in 1..fields {
            let previous = link;
            link = self.define_unit(&format!("prod_{hint}_{depth}"), |em, stack| Ok(em.make_closure(previous, stack)))?;
        }
        self.closure_materializer(tag, link, self.layout.product_bytes(fields))
    }

    /// A unit ignoring its stack and returning a closure of `target` over a fresh buffer.
    fn closure_materializer(&mut self, hint: &str, target: FuncId, stack_bytes: i64) -> Result<FuncId, CompileError> {
        self.define_unit(&format!("mat_{}", sanitize(hint)), |em, _| {
            let stack = em.alloc(stack_bytes);
            Ok(em.make_closure(target, stack))
        })
    }
}
