// Backend configuration
//
// Loaded from a TOML file; every field has a default so partial files work.
// Command-line flags are applied on top by the driver binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::backend::codegen::CodeEncoding;
use crate::backend::error::BackendError;
use crate::backend::{Engine, Target};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub target: Target,
    pub engine: Engine,
    pub dedup_strings: bool,
    /// Prefix the chunked image with a header older loaders understand
    pub legacy_header: bool,
    /// Chunked output with the compressed code encoding
    pub compress_code: bool,
    pub named_scripts: bool,
    pub optimize: bool,
    pub static_floor: u32,
    pub stack_pointer_index: Option<u32>,
    pub addressable_array_index: Option<u32>,
    pub script_number_start: i32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            target: Target::Chunked,
            engine: Engine::ZDoom,
            dedup_strings: true,
            legacy_header: false,
            compress_code: false,
            named_scripts: true,
            optimize: true,
            static_floor: 0,
            stack_pointer_index: None,
            addressable_array_index: None,
            script_number_start: 1,
        }
    }
}

impl BackendConfig {
    pub fn for_target(target: Target) -> Self {
        BackendConfig {
            target,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, BackendError> {
        toml::from_str(text).map_err(|e| BackendError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let text = fs::read_to_string(path).map_err(|e| {
            BackendError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Reject combinations the selected engine cannot load
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.engine == Engine::Hexen && self.target != Target::Flat {
            return Err(BackendError::Config(format!(
                "engine {} only loads the {} format, not {}",
                self.engine,
                Target::Flat,
                self.target
            )));
        }
        if self.script_number_start < 0 {
            return Err(BackendError::Config(
                "script_number_start must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Code encoding used by the binary formats
    pub fn code_encoding(&self) -> CodeEncoding {
        if self.target == Target::Chunked && self.compress_code {
            CodeEncoding::Compressed
        } else {
            CodeEncoding::Flat
        }
    }

    /// Named scripts are usable only when enabled and supported by the engine
    pub fn allows_named_scripts(&self) -> bool {
        self.named_scripts && self.engine.supports_named_scripts()
    }
}
