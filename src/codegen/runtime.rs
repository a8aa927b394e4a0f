use std::collections::HashMap;

use cranelift_codegen::ir::{types, AbiParam};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use crate::config::CodegenConfig;
use crate::diagnostics::CompileError;

/// Points in generated code that report to the trace primitive when tracing is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TracePoint {
    Alloc,
    Closure,
    Declosure,
    Eval,
    Dispatch,
}

impl TracePoint {
    const ALL: [TracePoint; 5] = [
        TracePoint::Alloc,
        TracePoint::Closure,
        TracePoint::Declosure,
        TracePoint::Eval,
        TracePoint::Dispatch,
    ];

    pub fn message(self) -> &'static str {
        match self {
            TracePoint::Alloc => "alloc",
            TracePoint::Closure => "closure",
            TracePoint::Declosure => "declosure",
            TracePoint::Eval => "eval",
            TracePoint::Dispatch => "dispatch tag",
        }
    }
}

/// External primitives the generated code calls, declared once per module.
pub struct RuntimeRegistry {
    ids: HashMap<&'static str, FuncId>,
    trace_messages: HashMap<TracePoint, DataId>,
}

impl RuntimeRegistry {
    pub fn new<M: Module>(module: &mut M, config: &CodegenConfig) -> Result<Self, CompileError> {
        let ptr = module.target_config().pointer_type();
        let mut reg = RuntimeRegistry {
            ids: HashMap::new(),
            trace_messages: HashMap::new(),
        };

        // alloc(size) -> Reference; never freed
        reg.declare(module, "alloc", &config.alloc_symbol, &[ptr], &[ptr])?;

        if config.trace {
            // trace(const char *message, Reference value)
            reg.declare(module, "trace", &config.trace_symbol, &[ptr, ptr], &[])?;
            for point in TracePoint::ALL {
                let id = declare_c_string(module, point.message())?;
                reg.trace_messages.insert(point, id);
            }
        }

        Ok(reg)
    }

    /// Look up a runtime function by its role ("alloc", "trace").
    pub fn get(&self, role: &str) -> FuncId {
        self.ids[role]
    }

    pub fn tracing(&self) -> bool {
        self.ids.contains_key("trace")
    }

    pub fn trace_message(&self, point: TracePoint) -> Option<DataId> {
        self.trace_messages.get(&point).copied()
    }

    fn declare<M: Module>(
        &mut self,
        module: &mut M,
        role: &'static str,
        symbol: &str,
        params: &[types::Type],
        returns: &[types::Type],
    ) -> Result<(), CompileError> {
        let mut sig = module.make_signature();
        for &p in params {
            sig.params.push(AbiParam::new(p));
        }
        for &r in returns {
            sig.returns.push(AbiParam::new(r));
        }
        let id = module
            .declare_function(symbol, Linkage::Import, &sig)
            .map_err(|e| CompileError::codegen(format!("declare {symbol} error: {e}")))?;
        self.ids.insert(role, id);
        Ok(())
    }
}

/// Create a null-terminated string in the data section.
fn declare_c_string<M: Module>(module: &mut M, s: &str) -> Result<DataId, CompileError> {
    let mut data_desc = DataDescription::new();
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    data_desc.define(bytes.into_boxed_slice());

    let data_id = module
        .declare_anonymous_data(false, false)
        .map_err(|e| CompileError::codegen(format!("declare data error: {e}")))?;
    module
        .define_data(data_id, &data_desc)
        .map_err(|e| CompileError::codegen(format!("define data error: {e}")))?;
    Ok(data_id)
}
