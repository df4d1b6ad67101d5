// Script Backend Module
// Expression graph, storage allocation and the four output formats

pub mod allocate;
pub mod archive;
pub mod codegen;
pub mod codegen_chunked;
pub mod codegen_flat;
pub mod codegen_text;
pub mod codegen_tokens;
pub mod config;
pub mod encode;
pub mod error;
pub mod expr;
pub mod opcodes;
pub mod optimize;
pub mod program;
pub mod resolve;
pub mod storage;
pub mod strings;
pub mod symbols;
pub mod types;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use config::BackendConfig;
pub use error::{BackendError, SourcePos};
pub use program::Context;

use allocate::StringAddressing;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Legacy flat image with a trailing directory
    Flat,
    /// Code followed by tagged chunks
    Chunked,
    /// Self-describing token stream for a later linker
    Tokens,
    /// Textual object listing
    Text,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Flat => write!(f, "flat"),
            Target::Chunked => write!(f, "chunked"),
            Target::Tokens => write!(f, "tokens"),
            Target::Text => write!(f, "text"),
        }
    }
}

impl FromStr for Target {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" | "a" => Ok(Target::Flat),
            "chunked" | "b" => Ok(Target::Chunked),
            "tokens" | "c" => Ok(Target::Tokens),
            "text" | "d" => Ok(Target::Text),
            _ => Err(BackendError::Config(format!("unknown target '{}'", s))),
        }
    }
}

/// Engine that will load the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    ZDoom,
    Zandronum,
    Eternity,
    Hexen,
}

impl Engine {
    pub fn supports_named_scripts(self) -> bool {
        matches!(self, Engine::ZDoom | Engine::Zandronum)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Engine::ZDoom => write!(f, "zdoom"),
            Engine::Zandronum => write!(f, "zandronum"),
            Engine::Eternity => write!(f, "eternity"),
            Engine::Hexen => write!(f, "hexen"),
        }
    }
}

impl FromStr for Engine {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zdoom" => Ok(Engine::ZDoom),
            "zandronum" => Ok(Engine::Zandronum),
            "eternity" => Ok(Engine::Eternity),
            "hexen" => Ok(Engine::Hexen),
            _ => Err(BackendError::Config(format!("unknown engine '{}'", s))),
        }
    }
}

/// Backend driver: optimize, allocate, emit
pub struct Backend {
    config: BackendConfig,
}

impl Default for Backend {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        Backend { config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Compile a finished context into the configured output format.
    /// The caller's context is left untouched.
    pub fn compile(&self, ctx: &Context) -> Result<Vec<u8>, BackendError> {
        self.config.validate()?;
        let target = self.config.target;
        log::info!(
            "Compiling {} instructions for {} ({})",
            ctx.code.len(),
            target,
            self.config.engine
        );

        // Phase 1: Peephole optimization
        let mut ctx = ctx.clone();
        if self.config.optimize {
            optimize::optimize(&mut ctx, &self.config)?;
        }

        // Phase 2: Allocation (the token stream leaves numbering to the linker)
        match target {
            Target::Tokens => {}
            Target::Text => allocate::allocate(&mut ctx, &self.config, StringAddressing::ByteAddress)?,
            Target::Flat | Target::Chunked => {
                allocate::allocate(&mut ctx, &self.config, StringAddressing::Index)?
            }
        }

        // Phase 3: Emission
        let output = match target {
            Target::Flat => codegen_flat::emit(&mut ctx)?,
            Target::Chunked => codegen_chunked::emit(&mut ctx, &self.config)?,
            Target::Tokens => codegen_tokens::emit(&ctx)?,
            Target::Text => codegen_text::emit(&ctx)?,
        };

        log::info!("Emitted {} bytes of {} output", output.len(), target);
        Ok(output)
    }
}
