pub mod constructors;
pub mod layout;
pub mod lower;
pub mod runtime;

use std::str::FromStr;

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use target_lexicon::Triple;
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::ast::{Program, Shape, Type};
use crate::config::CodegenConfig;
use crate::diagnostics::CompileError;
use lower::LowerContext;

/// Summary of a program lowered into a module.
#[derive(Debug, Clone)]
pub struct LoweredProgram {
    pub entry: FuncId,
    /// Size of the stack buffer the entry allocates.
    pub stack_bytes: i64,
    /// Code units defined, including the entry.
    pub units: usize,
    /// Type of the value the entry returns for its input.
    pub result_type: Type,
}

/// Lower `program` into `module`: constructors, foreign bindings, the main term
/// and the exported entry unit tying them together.
pub fn lower_program<M: Module>(
    module: &mut M,
    program: &Program,
    config: &CodegenConfig,
) -> Result<LoweredProgram, CompileError> {
    config
        .validate()
        .map_err(|msg| CompileError::codegen(format!("invalid configuration: {msg}")))?;

    let mut ctx = LowerContext::new(module, config)?;
    let mut bindings = ctx.declare_types(&program.types, config.max_variants())?;
    bindings.extend(ctx.declare_foreign(&program.foreign)?);

    let main = ctx.lower(&program.term)?;
    let Type::Function { right, .. } = &main.ty else {
        return Err(CompileError::class_mismatch(&program.term, Shape::Function, Some(main.ty)));
    };
    let result_type = (**right).clone();

    let stack_bytes = ctx.env.high_water().max(config.min_stack_bytes as i64);
    let materializers: Vec<FuncId> = bindings.iter().map(|b| b.unit).collect();

    let entry = ctx.define_unit_as(&config.entry_symbol, Linkage::Export, |em, input| {
        let mut stack = em.alloc(stack_bytes);
        for unit in &materializers {
            let null = em.null();
            let value = em.call_unit(*unit, null);
            stack = em.push(stack, value);
        }
        let closure = em.call_unit(main.id, stack);
        let (entry, captured) = em.unpack_closure(closure);
        let extended = em.push(captured, input);
        Ok(em.call_entry(entry, extended))
    })?;

    for _ in &bindings {
        ctx.env.pop();
    }

    let units = ctx.unit_count();
    tracing::info!(units, stack_bytes, bindings = bindings.len(), "lowered program");
    Ok(LoweredProgram { entry, stack_bytes, units, result_type })
}

/// Compile `program` to a relocatable object exporting the configured entry symbol.
pub fn compile_to_object(program: &Program, config: &CodegenConfig) -> Result<Vec<u8>, CompileError> {
    let mut module = object_module(config)?;
    lower_program(&mut module, program, config)?;

    let object = module.finish();
    let bytes = object.emit().map_err(|e| CompileError::codegen(format!("emit error: {e}")))?;

    Ok(bytes)
}

/// Run every lowering check on `program` without emitting an object.
pub fn check_program(program: &Program, config: &CodegenConfig) -> Result<LoweredProgram, CompileError> {
    let mut module = object_module(config)?;
    lower_program(&mut module, program, config)
}

fn object_module(config: &CodegenConfig) -> Result<ObjectModule, CompileError> {
    let isa = build_isa(config.target.as_deref(), true)?;
    let obj_builder = ObjectBuilder::new(isa, "lambdac_module", cranelift_module::default_libcall_names())
        .map_err(|e| CompileError::codegen(format!("object builder error: {e}")))?;
    Ok(ObjectModule::new(obj_builder))
}

/// Target ISA for `target`, or the host when `None`.
///
/// Object output is position independent; the JIT links absolute addresses and
/// must not assume libcalls live next to the generated code.
pub(crate) fn build_isa(target: Option<&str>, pic: bool) -> Result<OwnedTargetIsa, CompileError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("is_pic", if pic { "true" } else { "false" })
        .map_err(|e| CompileError::codegen(format!("flag error: {e}")))?;
    if !pic {
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(|e| CompileError::codegen(format!("flag error: {e}")))?;
    }

    let isa_builder = match target {
        Some(name) => {
            let triple = Triple::from_str(name)
                .map_err(|e| CompileError::codegen(format!("invalid target triple {name}: {e}")))?;
            cranelift_codegen::isa::lookup(triple)
                .map_err(|e| CompileError::codegen(format!("unsupported target {name}: {e}")))?
        }
        None => cranelift_native::builder()
            .map_err(|msg| CompileError::codegen(format!("host machine is not supported: {msg}")))?,
    };
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| CompileError::codegen(format!("ISA error: {e}")))
}
