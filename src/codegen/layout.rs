//! Runtime value layout and the emission helpers that encapsulate it.
//!
//! Every runtime value is reached through one pointer-sized Reference:
//!
//! ```text
//! product record   [field 0][field 1] ... [field N-1]        N words
//! sum record       [tag (tag width, padded)][payload]        2 words
//! closure          [entry point][captured stack]             2 words
//! stack            ... [binding][binding] ^ stack position
//! ```
//!
//! Lowering rules only talk to records through [`Emitter`]; the offsets below are
//! the single place the layout is spelled out.

use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Signature, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataId, FuncId, Module};

use super::runtime::{RuntimeRegistry, TracePoint};

const CLOSURE_ENTRY: i32 = 0;
const SUM_TAG: i32 = 0;

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    /// Pointer type of the target; the type of every Reference and stack position.
    pub ptr: types::Type,
    /// Size of a pointer in bytes. All slots are pointer-sized.
    pub word: i32,
    /// Storage type of a sum's tag.
    pub tag: types::Type,
}

impl Layout {
    pub fn new(ptr: types::Type, tag_width: u32) -> Self {
        let tag = match tag_width {
            8 => types::I8,
            16 => types::I16,
            _ => types::I32,
        };
        Self { ptr, word: ptr.bytes() as i32, tag }
    }

    pub fn word_bytes(&self) -> i64 {
        self.word as i64
    }

    pub fn product_bytes(&self, fields: usize) -> i64 {
        fields as i64 * self.word_bytes()
    }

    pub fn sum_bytes(&self) -> i64 {
        2 * self.word_bytes()
    }

    pub fn closure_bytes(&self) -> i64 {
        2 * self.word_bytes()
    }

    fn field_offset(&self, index: usize) -> i32 {
        index as i32 * self.word
    }

    fn payload_offset(&self) -> i32 {
        self.word
    }

    fn captured_stack_offset(&self) -> i32 {
        self.word
    }
}

/// Builds the body of one code unit `(stack position) -> Reference`.
pub struct Emitter<'a, M: Module> {
    pub builder: FunctionBuilder<'a>,
    pub(super) module: &'a mut M,
    pub(super) runtime: &'a RuntimeRegistry,
    pub(super) layout: &'a Layout,
    pub(super) unit_sig: &'a Signature,
}

impl<'a, M: Module> Emitter<'a, M> {
    pub fn null(&mut self) -> Value {
        self.builder.ins().iconst(self.layout.ptr, 0)
    }

    pub fn load_word(&mut self, addr: Value, offset: i32) -> Value {
        self.builder.ins().load(self.layout.ptr, MemFlags::new(), addr, offset)
    }

    pub fn store_word(&mut self, value: Value, addr: Value, offset: i32) {
        self.builder.ins().store(MemFlags::new(), value, addr, offset);
    }

    /// Load the binding `displacement` bytes away from `stack` (negative = below).
    pub fn stack_slot(&mut self, stack: Value, displacement: i64) -> Value {
        self.load_word(stack, displacement as i32)
    }

    /// Store `value` at `stack` and return the advanced stack position.
    pub fn push(&mut self, stack: Value, value: Value) -> Value {
        self.store_word(value, stack, 0);
        self.builder.ins().iadd_imm(stack, self.layout.word_bytes())
    }

    /// Step `stack` back one slot; returns `(new stack, popped value)`.
    pub fn pop(&mut self, stack: Value) -> (Value, Value) {
        let stack = self.builder.ins().iadd_imm(stack, -self.layout.word_bytes());
        let value = self.load_word(stack, 0);
        (stack, value)
    }

    pub fn alloc(&mut self, bytes: i64) -> Value {
        let size = self.builder.ins().iconst(self.layout.ptr, bytes);
        let func_ref = self.module.declare_func_in_func(self.runtime.get("alloc"), self.builder.func);
        let call = self.builder.ins().call(func_ref, &[size]);
        let ptr = self.builder.inst_results(call)[0];
        self.trace(TracePoint::Alloc, ptr);
        ptr
    }

    /// Invoke a known unit at `stack`.
    pub fn call_unit(&mut self, unit: FuncId, stack: Value) -> Value {
        let func_ref = self.module.declare_func_in_func(unit, self.builder.func);
        let call = self.builder.ins().call(func_ref, &[stack]);
        let result = self.builder.inst_results(call)[0];
        self.trace(TracePoint::Eval, result);
        result
    }

    /// Invoke a unit through its code address, as loaded from a closure or jump table.
    pub fn call_entry(&mut self, entry: Value, stack: Value) -> Value {
        let sig_ref = self.builder.import_signature(self.unit_sig.clone());
        let call = self.builder.ins().call_indirect(sig_ref, entry, &[stack]);
        let result = self.builder.inst_results(call)[0];
        self.trace(TracePoint::Eval, result);
        result
    }

    pub fn unit_address(&mut self, unit: FuncId) -> Value {
        let func_ref = self.module.declare_func_in_func(unit, self.builder.func);
        self.builder.ins().func_addr(self.layout.ptr, func_ref)
    }

    pub fn data_address(&mut self, data: DataId) -> Value {
        let gv = self.module.declare_data_in_func(data, self.builder.func);
        self.builder.ins().global_value(self.layout.ptr, gv)
    }

    pub fn make_closure(&mut self, unit: FuncId, stack: Value) -> Value {
        let closure = self.alloc(self.layout.closure_bytes());
        let entry = self.unit_address(unit);
        self.store_word(entry, closure, CLOSURE_ENTRY);
        self.store_word(stack, closure, self.layout.captured_stack_offset());
        self.trace(TracePoint::Closure, closure);
        closure
    }

    /// Split a closure into `(entry point, captured stack)`.
    pub fn unpack_closure(&mut self, closure: Value) -> (Value, Value) {
        self.trace(TracePoint::Declosure, closure);
        let entry = self.load_word(closure, CLOSURE_ENTRY);
        let stack = self.load_word(closure, self.layout.captured_stack_offset());
        (entry, stack)
    }

    pub fn alloc_product(&mut self, fields: usize) -> Value {
        self.alloc(self.layout.product_bytes(fields))
    }

    pub fn read_field(&mut self, record: Value, index: usize) -> Value {
        self.load_word(record, self.layout.field_offset(index))
    }

    pub fn write_field(&mut self, record: Value, index: usize, value: Value) {
        self.store_word(value, record, self.layout.field_offset(index));
    }

    pub fn alloc_sum(&mut self, tag: u32, payload: Value) -> Value {
        let record = self.alloc(self.layout.sum_bytes());
        let tag = self.builder.ins().iconst(self.layout.tag, tag as i64);
        self.builder.ins().store(MemFlags::new(), tag, record, SUM_TAG);
        self.store_word(payload, record, self.layout.payload_offset());
        record
    }

    /// Read a sum's tag, widened to pointer width.
    pub fn read_tag(&mut self, record: Value) -> Value {
        let tag = self.builder.ins().load(self.layout.tag, MemFlags::new(), record, SUM_TAG);
        let tag = if self.layout.tag == self.layout.ptr {
            tag
        } else {
            self.builder.ins().uextend(self.layout.ptr, tag)
        };
        self.trace(TracePoint::Dispatch, tag);
        tag
    }

    pub fn read_payload(&mut self, record: Value) -> Value {
        self.load_word(record, self.layout.payload_offset())
    }

    /// Load entry `index` of a table of code addresses.
    pub fn table_entry(&mut self, table: DataId, index: Value) -> Value {
        let base = self.data_address(table);
        let offset = self.builder.ins().imul_imm(index, self.layout.word_bytes());
        let addr = self.builder.ins().iadd(base, offset);
        self.load_word(addr, 0)
    }

    fn trace(&mut self, point: TracePoint, value: Value) {
        if !self.runtime.tracing() {
            return;
        }
        let Some(message) = self.runtime.trace_message(point) else {
            return;
        };
        let msg = self.data_address(message);
        let func_ref = self.module.declare_func_in_func(self.runtime.get("trace"), self.builder.func);
        self.builder.ins().call(func_ref, &[msg, value]);
    }
}
