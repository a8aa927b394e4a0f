pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod interp;
pub mod jit;

pub use ast::{ForeignDecl, Program, Term, Type};
pub use codegen::{check_program, compile_to_object, LoweredProgram};
pub use config::CodegenConfig;
pub use diagnostics::CompileError;
pub use jit::JitProgram;

/// Parse a program from its JSON form.
pub fn parse_program(json: &str) -> Result<Program, serde_json::Error> {
    serde_json::from_str(json)
}
