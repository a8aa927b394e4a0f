//! In-process execution of compiled programs, and host access to runtime values.
//!
//! The helpers here read and write the record layouts generated code uses. They
//! operate on raw References and are `unsafe`: the caller must pass pointers that
//! really are values of the stated shape.

use std::ffi::{c_char, CStr};
use std::mem::size_of;
use std::ptr;

use cranelift_jit::{JITBuilder, JITModule};

use crate::ast::{Program, Type};
use crate::codegen::{build_isa, lower_program, LoweredProgram};
use crate::config::CodegenConfig;
use crate::diagnostics::CompileError;
use crate::interp::Value;

/// A runtime Reference.
pub type Ref = *mut u8;

/// Native form of every code unit, generated or foreign.
pub type UnitFn = unsafe extern "C" fn(Ref) -> Ref;

const WORD: usize = size_of::<usize>();

/// Host implementation of the allocation primitive. Zeroed, word aligned, never freed.
pub extern "C" fn host_alloc(size: usize) -> Ref {
    let words = size.div_ceil(WORD).max(1);
    let buf = vec![0usize; words].into_boxed_slice();
    Box::leak(buf).as_mut_ptr().cast()
}

/// Host implementation of the trace primitive.
pub extern "C" fn host_trace(message: *const c_char, value: Ref) {
    let message = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    tracing::trace!(target: "lambdac::runtime", value = ?value, "{message}");
}

/// A program compiled into executable memory.
pub struct JitProgram {
    module: Option<JITModule>,
    entry: UnitFn,
    lowered: LoweredProgram,
    tag_width: u32,
}

impl JitProgram {
    /// Compile `program` for the host.
    ///
    /// `symbols` resolves foreign bindings: each entry maps a symbol to a function
    /// with the [`UnitFn`] signature.
    pub fn compile(
        program: &Program,
        config: &CodegenConfig,
        symbols: &[(&str, *const u8)],
    ) -> Result<Self, CompileError> {
        let isa = build_isa(None, false)?;
        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        builder.symbol(config.alloc_symbol.as_str(), host_alloc as *const u8);
        builder.symbol(config.trace_symbol.as_str(), host_trace as *const u8);
        for (name, addr) in symbols {
            builder.symbol(*name, *addr);
        }
        let mut module = JITModule::new(builder);

        let lowered = lower_program(&mut module, program, config)?;
        module
            .finalize_definitions()
            .map_err(|e| CompileError::codegen(format!("finalize error: {e}")))?;

        let code = module.get_finalized_function(lowered.entry);
        let entry = unsafe { std::mem::transmute::<*const u8, UnitFn>(code) };
        tracing::debug!(units = lowered.units, "jit program ready");

        Ok(Self { module: Some(module), entry, lowered, tag_width: config.tag_width })
    }

    pub fn lowered(&self) -> &LoweredProgram {
        &self.lowered
    }

    pub fn result_type(&self) -> &Type {
        &self.lowered.result_type
    }

    /// Run the entry on `input`.
    ///
    /// # Safety
    /// `input` must be a value of the main term's argument type. Results that are
    /// closures point into this program's code and must not outlive it.
    pub unsafe fn run(&self, input: Ref) -> Ref {
        unsafe { (self.entry)(input) }
    }

    /// # Safety
    /// `payload` must be a valid Reference.
    pub unsafe fn make_sum(&self, tag: u32, payload: Ref) -> Ref {
        unsafe { alloc_sum(self.tag_width, tag, payload) }
    }

    /// # Safety
    /// `record` must be a sum record built with this program's tag width.
    pub unsafe fn sum_parts(&self, record: Ref) -> (u32, Ref) {
        unsafe { read_sum(self.tag_width, record) }
    }

    /// Build the runtime form of a first-order value. `None` if it contains a closure.
    pub fn write_value(&self, value: &Value) -> Option<Ref> {
        Some(match value {
            Value::Word(n) => box_word(*n as usize),
            Value::Product(fields) => {
                let record = alloc_product(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    let field = self.write_value(field)?;
                    unsafe { write_field(record, i, field) };
                }
                record
            }
            Value::Sum { tag, payload } => {
                let payload = self.write_value(payload)?;
                unsafe { alloc_sum(self.tag_width, *tag, payload) }
            }
            Value::Closure(_) => return None,
        })
    }

    /// Read back a first-order value of type `ty`. `None` if `ty` contains a function.
    ///
    /// # Safety
    /// `r` must be a value of type `ty` produced by this program or [`Self::write_value`].
    pub unsafe fn read_value(&self, ty: &Type, r: Ref) -> Option<Value> {
        unsafe {
            Some(match ty {
                Type::Primitive { .. } => Value::Word(unbox_word(r) as u64),
                Type::Product { fields, .. } => {
                    let mut values = Vec::with_capacity(fields.len());
                    for (i, field) in fields.iter().enumerate() {
                        values.push(self.read_value(field, read_field(r, i))?);
                    }
                    Value::product(values)
                }
                Type::Sum { variants } => {
                    let (tag, payload) = read_sum(self.tag_width, r);
                    let variant = variants.get(tag as usize)?;
                    Value::sum(tag, self.read_value(&variant.payload, payload)?)
                }
                Type::Function { .. } => return None,
            })
        }
    }
}

impl Drop for JitProgram {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            unsafe { module.free_memory() };
        }
    }
}

/// Box a machine word as a primitive value.
pub fn box_word(n: usize) -> Ref {
    let r = host_alloc(WORD);
    unsafe { ptr::write(r.cast::<usize>(), n) };
    r
}

/// # Safety
/// `r` must be a boxed word.
pub unsafe fn unbox_word(r: Ref) -> usize {
    unsafe { ptr::read(r.cast::<usize>()) }
}

pub fn alloc_product(fields: usize) -> Ref {
    host_alloc(fields * WORD)
}

/// # Safety
/// `record` must be a product record with more than `index` fields.
pub unsafe fn read_field(record: Ref, index: usize) -> Ref {
    unsafe { ptr::read(record.add(index * WORD).cast::<Ref>()) }
}

/// # Safety
/// `record` must be a product record with more than `index` fields.
pub unsafe fn write_field(record: Ref, index: usize, value: Ref) {
    unsafe { ptr::write(record.add(index * WORD).cast::<Ref>(), value) }
}

/// # Safety
/// `tag` must fit in `tag_width` bits.
pub unsafe fn alloc_sum(tag_width: u32, tag: u32, payload: Ref) -> Ref {
    let record = host_alloc(2 * WORD);
    unsafe {
        match tag_width {
            8 => ptr::write(record.cast::<u8>(), tag as u8),
            16 => ptr::write(record.cast::<u16>(), tag as u16),
            _ => ptr::write(record.cast::<u32>(), tag),
        }
        ptr::write(record.add(WORD).cast::<Ref>(), payload);
    }
    record
}

/// Split a sum record into `(tag, payload)`.
///
/// # Safety
/// `record` must be a sum record written with the same `tag_width`.
pub unsafe fn read_sum(tag_width: u32, record: Ref) -> (u32, Ref) {
    unsafe {
        let tag = match tag_width {
            8 => ptr::read(record.cast::<u8>()) as u32,
            16 => ptr::read(record.cast::<u16>()) as u32,
            _ => ptr::read(record.cast::<u32>()),
        };
        (tag, ptr::read(record.add(WORD).cast::<Ref>()))
    }
}

/// Apply a runtime closure to `arg`, exactly as generated application code does.
///
/// # Safety
/// `closure` must be a live closure whose code is still mapped, and `arg` a value
/// of its argument type. The argument is written into the closure's captured stack.
pub unsafe fn apply_closure(closure: Ref, arg: Ref) -> Ref {
    unsafe {
        let entry = ptr::read(closure.cast::<UnitFn>());
        let stack = ptr::read(closure.add(WORD).cast::<Ref>());
        ptr::write(stack.cast::<Ref>(), arg);
        entry(stack.add(WORD))
    }
}

/// The argument a foreign unit receives, one word below its stack position.
///
/// # Safety
/// `stack` must be the stack position passed to a foreign unit.
pub unsafe fn foreign_arg(stack: Ref) -> Ref {
    unsafe { ptr::read(stack.sub(WORD).cast::<Ref>()) }
}
