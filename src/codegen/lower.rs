use cranelift_codegen::ir::{AbiParam, InstBuilder, Signature, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use crate::ast::{Case, Shape, Term, Type};
use crate::config::CodegenConfig;
use crate::diagnostics::CompileError;
use crate::env::Environment;

use super::layout::{Emitter, Layout};
use super::runtime::RuntimeRegistry;

/// A lowered term: the code unit computing it and its result type.
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: FuncId,
    pub ty: Type,
}

/// Per-module lowering state, threaded by reference through the recursive rules.
pub struct LowerContext<'m, M: Module> {
    pub(super) module: &'m mut M,
    pub(super) runtime: RuntimeRegistry,
    pub(super) layout: Layout,
    pub(super) unit_sig: Signature,
    pub env: Environment,
    /// One self-reference cell per lowered fixpoint.
    fix_cells: Vec<DataId>,
    units: usize,
}

impl<'m, M: Module> LowerContext<'m, M> {
    pub fn new(module: &'m mut M, config: &CodegenConfig) -> Result<Self, CompileError> {
        let ptr = module.target_config().pointer_type();
        let runtime = RuntimeRegistry::new(module, config)?;
        let mut unit_sig = module.make_signature();
        unit_sig.params.push(AbiParam::new(ptr));
        unit_sig.returns.push(AbiParam::new(ptr));
        Ok(Self {
            module,
            runtime,
            layout: Layout::new(ptr, config.tag_width),
            unit_sig,
            env: Environment::new(),
            fix_cells: Vec::new(),
            units: 0,
        })
    }

    /// Number of code units defined so far.
    pub fn unit_count(&self) -> usize {
        self.units
    }

    pub fn fixpoint_cells(&self) -> &[DataId] {
        &self.fix_cells
    }

    pub fn lower(&mut self, term: &Term) -> Result<Unit, CompileError> {
        tracing::trace!(kind = term.kind_name(), depth = self.env.len(), "lower term");
        match term {
            Term::Reference { name } => self.lower_reference(name),
            Term::Abstraction { arg, arg_type, body } => self.lower_abstraction(arg, arg_type, body),
            Term::Application { func, arg } => self.lower_application(func, arg),
            Term::Deproduct { product, names, body } => self.lower_deproduct(product, names, body),
            Term::Desum { sum, cases } => self.lower_desum(sum, cases),
            Term::Fixpoint { term: inner } => self.lower_fixpoint(inner),
        }
    }

    fn lower_reference(&mut self, name: &str) -> Result<Unit, CompileError> {
        let (displacement, ty) = self.env.find(name)?;
        let ty = ty.clone();
        let id = self.define_unit(&format!("ref_{name}"), |em, stack| {
            Ok(em.stack_slot(stack, displacement))
        })?;
        Ok(Unit { id, ty })
    }

    fn lower_abstraction(&mut self, arg: &str, arg_type: &Type, body: &Term) -> Result<Unit, CompileError> {
        let word = self.layout.word_bytes();
        self.env.push(arg, arg_type.clone(), word);
        let body = self.lower(body);
        self.env.pop();
        let body = body?;

        let id = self.define_unit(&format!("abs_{arg}"), |em, stack| {
            Ok(em.make_closure(body.id, stack))
        })?;
        Ok(Unit { id, ty: Type::func(arg_type.clone(), body.ty) })
    }

    fn lower_application(&mut self, func: &Term, arg: &Term) -> Result<Unit, CompileError> {
        let f = self.lower(func)?;
        let a = self.lower(arg)?;

        let Type::Function { left, right } = &f.ty else {
            return Err(CompileError::class_mismatch(func, Shape::Function, Some(f.ty)));
        };
        if **left != a.ty {
            return Err(CompileError::type_mismatch(arg, a.ty, (**left).clone()));
        }
        let ty = (**right).clone();

        let id = self.define_unit("app", |em, stack| {
            let closure = em.call_unit(f.id, stack);
            let value = em.call_unit(a.id, stack);
            let (entry, captured) = em.unpack_closure(closure);
            let extended = em.push(captured, value);
            Ok(em.call_entry(entry, extended))
        })?;
        Ok(Unit { id, ty })
    }

    fn lower_deproduct(&mut self, product: &Term, names: &[String], body: &Term) -> Result<Unit, CompileError> {
        let p = self.lower(product)?;
        let Type::Product { fields, .. } = &p.ty else {
            return Err(CompileError::class_mismatch(product, Shape::Product, Some(p.ty)));
        };
        if fields.len() != names.len() {
            return Err(CompileError::arity_mismatch(product, fields.len(), names.len()));
        }

        let word = self.layout.word_bytes();
        for (name, field) in names.iter().zip(fields) {
            self.env.push(name, field.clone(), word);
        }
        let body = self.lower(body);
        for _ in names {
            self.env.pop();
        }
        let body = body?;

        let count = names.len();
        let id = self.define_unit("deproduct", |em, stack| {
            let record = em.call_unit(p.id, stack);
            let mut extended = stack;
            for i in 0..count {
                let field = em.read_field(record, i);
                extended = em.push(extended, field);
            }
            Ok(em.call_unit(body.id, extended))
        })?;
        Ok(Unit { id, ty: body.ty })
    }

    fn lower_desum(&mut self, sum: &Term, cases: &[Case]) -> Result<Unit, CompileError> {
        let s = self.lower(sum)?;
        let Type::Sum { variants } = &s.ty else {
            return Err(CompileError::class_mismatch(sum, Shape::Sum, Some(s.ty)));
        };
        if variants.len() != cases.len() {
            return Err(CompileError::arity_mismatch(sum, variants.len(), cases.len()));
        }
        if variants.is_empty() {
            return Err(CompileError::type_invalid(&s.ty, "case dispatch over a sum without variants has no result type"));
        }
        let payloads: Vec<Type> = variants.iter().map(|v| v.payload.clone()).collect();

        let word = self.layout.word_bytes();
        let mut case_units = Vec::with_capacity(cases.len());
        let mut result: Option<Type> = None;
        for (case, payload) in cases.iter().zip(payloads) {
            self.env.push(&case.name, payload, word);
            let unit = self.lower(&case.body);
            self.env.pop();
            let unit = unit?;
            match &result {
                None => result = Some(unit.ty.clone()),
                Some(expected) if *expected != unit.ty => {
                    return Err(CompileError::type_mismatch(&case.body, unit.ty, expected.clone()));
                }
                Some(_) => {}
            }
            case_units.push(unit.id);
        }
        let Some(ty) = result else {
            unreachable!("at least one case was lowered")
        };

        let table = self.define_jump_table(&case_units)?;
        let id = self.define_unit("desum", |em, stack| {
            let record = em.call_unit(s.id, stack);
            let tag = em.read_tag(record);
            let payload = em.read_payload(record);
            let entry = em.table_entry(table, tag);
            let extended = em.push(stack, payload);
            Ok(em.call_entry(entry, extended))
        })?;
        Ok(Unit { id, ty })
    }

    fn lower_fixpoint(&mut self, inner: &Term) -> Result<Unit, CompileError> {
        let Term::Abstraction { arg, arg_type, body } = inner else {
            return Err(CompileError::class_mismatch(inner, Shape::Abstraction, None));
        };

        let word = self.layout.word_bytes();
        self.env.push(arg, arg_type.clone(), word);
        let lowered = self.lower(body);
        self.env.pop();
        let lowered = lowered?;

        if lowered.ty != *arg_type {
            return Err(CompileError::type_mismatch(body, lowered.ty, arg_type.clone()));
        }
        if !matches!(lowered.ty, Type::Function { .. }) {
            return Err(CompileError::class_mismatch(body, Shape::Function, Some(lowered.ty)));
        }

        let cell = self.define_fixpoint_cell(arg)?;

        // Re-enters the current closure of the fixpoint. The closure's argument slot
        // is shared by every recursive call, so its previous occupant is restored
        // once the call returns. Not safe for concurrent or re-entrant callers.
        let co = self.define_unit(&format!("co_{arg}"), |em, stack| {
            let cell_addr = em.data_address(cell);
            let current = em.load_word(cell_addr, 0);
            let (entry, captured) = em.unpack_closure(current);
            let saved = em.load_word(captured, 0);
            let (_, value) = em.pop(stack);
            let extended = em.push(captured, value);
            let result = em.call_entry(entry, extended);
            em.store_word(saved, captured, 0);
            Ok(result)
        })?;

        let id = self.define_unit(&format!("fix_{arg}"), |em, stack| {
            let co_stack = em.alloc(word);
            let co_closure = em.make_closure(co, co_stack);
            let extended = em.push(stack, co_closure);
            let closure = em.call_unit(lowered.id, extended);
            let cell_addr = em.data_address(cell);
            em.store_word(closure, cell_addr, 0);
            Ok(closure)
        })?;
        Ok(Unit { id, ty: arg_type.clone() })
    }

    fn define_fixpoint_cell(&mut self, hint: &str) -> Result<DataId, CompileError> {
        let name = format!("__lc_cell{}_{}", self.fix_cells.len(), sanitize(hint));
        let cell = self
            .module
            .declare_data(&name, Linkage::Local, true, false)
            .map_err(|e| CompileError::codegen(format!("declare fixpoint cell error: {e}")))?;
        let mut desc = DataDescription::new();
        desc.define_zeroinit(self.layout.word as usize);
        desc.set_align(self.layout.word as u64);
        self.module
            .define_data(cell, &desc)
            .map_err(|e| CompileError::codegen(format!("define fixpoint cell error: {e}")))?;
        self.fix_cells.push(cell);
        Ok(cell)
    }

    /// Read-only table of code addresses, entry i dispatching tag i.
    fn define_jump_table(&mut self, units: &[FuncId]) -> Result<DataId, CompileError> {
        let word = self.layout.word as usize;
        let mut desc = DataDescription::new();
        desc.define(vec![0u8; units.len() * word].into_boxed_slice());
        desc.set_align(word as u64);
        for (i, unit) in units.iter().enumerate() {
            let func_ref = self.module.declare_func_in_data(*unit, &mut desc);
            desc.write_function_addr((i * word) as u32, func_ref);
        }

        let table = self
            .module
            .declare_anonymous_data(false, false)
            .map_err(|e| CompileError::codegen(format!("declare jump table error: {e}")))?;
        self.module
            .define_data(table, &desc)
            .map_err(|e| CompileError::codegen(format!("define jump table error: {e}")))?;
        Ok(table)
    }

    /// Define a module-local code unit `(stack) -> Reference` whose body is built by `body`.
    pub fn define_unit<F>(&mut self, hint: &str, body: F) -> Result<FuncId, CompileError>
    where
        F: FnOnce(&mut Emitter<'_, M>, Value) -> Result<Value, CompileError>,
    {
        let name = format!("__lc_{}_{}", self.units, sanitize(hint));
        self.define_unit_as(&name, Linkage::Local, body)
    }

    pub(super) fn define_unit_as<F>(&mut self, name: &str, linkage: Linkage, body: F) -> Result<FuncId, CompileError>
    where
        F: FnOnce(&mut Emitter<'_, M>, Value) -> Result<Value, CompileError>,
    {
        let func_id = self
            .module
            .declare_function(name, linkage, &self.unit_sig)
            .map_err(|e| CompileError::codegen(format!("declare unit {name} error: {e}")))?;

        let mut fn_ctx = self.module.make_context();
        fn_ctx.func.signature = self.unit_sig.clone();
        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut fn_ctx.func, &mut builder_ctx);
            let entry_block = builder.create_block();
            builder.append_block_params_for_function_params(entry_block);
            builder.switch_to_block(entry_block);
            builder.seal_block(entry_block);
            let stack = builder.block_params(entry_block)[0];

            let mut em = Emitter {
                builder,
                module: &mut *self.module,
                runtime: &self.runtime,
                layout: &self.layout,
                unit_sig: &self.unit_sig,
            };
            let result = body(&mut em, stack)?;
            em.builder.ins().return_(&[result]);
            em.builder.finalize();
        }

        self.module
            .define_function(func_id, &mut fn_ctx)
            .map_err(|e| CompileError::codegen(format!("define unit {name} error: {e}")))?;
        self.module.clear_context(&mut fn_ctx);
        self.units += 1;
        tracing::debug!(unit = name, "defined code unit");
        Ok(func_id)
    }
}

/// Keep symbol names to characters every object format accepts.
pub(super) fn sanitize(hint: &str) -> String {
    hint.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
