use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostics::CompileError;

/// Code generation settings, loadable from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodegenConfig {
    /// Target triple for object output. `None` selects the host.
    pub target: Option<String>,
    /// Width in bits of the tag stored in sum records: 8, 16 or 32.
    pub tag_width: u32,
    /// Lower bound on the entry stack buffer, in bytes.
    pub min_stack_bytes: u32,
    /// Emit calls to the trace primitive around allocations, closures and calls.
    pub trace: bool,
    pub entry_symbol: String,
    pub alloc_symbol: String,
    pub trace_symbol: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            target: None,
            tag_width: 32,
            min_stack_bytes: 4096,
            trace: false,
            entry_symbol: "lambdac_main".to_string(),
            alloc_symbol: "__lambdac_alloc".to_string(),
            trace_symbol: "__lambdac_trace".to_string(),
        }
    }
}

impl CodegenConfig {
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::config(format!("cannot read config: {e}"), path.to_path_buf()))?;
        let config: CodegenConfig = toml::from_str(&text)
            .map_err(|e| CompileError::config(format!("invalid config: {e}"), path.to_path_buf()))?;
        config
            .validate()
            .map_err(|msg| CompileError::config(msg, path.to_path_buf()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.tag_width, 8 | 16 | 32) {
            return Err(format!("tag_width must be 8, 16 or 32, got {}", self.tag_width));
        }
        for (key, value) in [
            ("entry_symbol", &self.entry_symbol),
            ("alloc_symbol", &self.alloc_symbol),
            ("trace_symbol", &self.trace_symbol),
        ] {
            if value.is_empty() {
                return Err(format!("{key} must not be empty"));
            }
        }
        Ok(())
    }

    /// Largest number of variants a sum declaration may have.
    pub fn max_variants(&self) -> u64 {
        1u64 << self.tag_width
    }
}
