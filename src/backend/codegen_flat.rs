// Format A: flat image
//
// "ACS\0", directory offset, flat code from offset 8, then the script directory
// and the string directory. Every multi-byte value is little-endian.

use crate::backend::codegen::{layout, resolve_symbol_word, CodeEncoding, CodeGen};
use crate::backend::error::BackendError;
use crate::backend::program::{Context, ScriptRecord};

pub const MAGIC: &[u8; 4] = b"ACS\0";
pub const HEADER_SIZE: u32 = 8;

/// Directory number of a script: number plus kind in the thousands
fn directory_number(script: &ScriptRecord) -> Result<u32, BackendError> {
    let number = script.number.unwrap_or(0);
    (script.kind as i32)
        .checked_mul(1000)
        .and_then(|base| base.checked_add(number))
        .map(|n| n as u32)
        .ok_or_else(|| {
            BackendError::Unsupported(format!(
                "{}: script '{}' number {} with kind {} overflows the directory",
                script.pos, script.name, number, script.kind
            ))
        })
}

pub fn emit(ctx: &mut Context) -> Result<Vec<u8>, BackendError> {
    if let Some(script) = ctx.scripts.values().find(|s| s.named) {
        return Err(BackendError::Unsupported(format!(
            "{}: script '{}' is name-addressed, which the flat format cannot express",
            script.pos, script.name
        )));
    }
    for table in ctx.storage.tables() {
        if table.iter().any(|r| r.init.is_some()) {
            log::warn!("{}: initializers are dropped by the flat format", table.key);
        }
    }

    log::info!("Emitting flat image");
    layout(ctx, CodeEncoding::Flat, HEADER_SIZE)?;

    let mut gen = CodeGen::new();
    gen.write_bytes(MAGIC);
    gen.write_u32(0); // directory offset, patched below
    gen.write_code(ctx, CodeEncoding::Flat)?;

    let directory = gen.position();
    gen.patch_u32(4, directory);
    log::debug!("Flat directory at 0x{:08x}", directory);

    let scripts: Vec<_> = ctx.defined_scripts().collect();
    gen.write_u32(scripts.len() as u32);
    for script in scripts {
        let entry = resolve_symbol_word(ctx, &script.entry, &script.pos)?;
        gen.write_u32(directory_number(script)?);
        gen.write_u32(entry);
        gen.write_u32(script.params);
    }

    gen.write_string_directory(ctx);
    Ok(gen.data)
}

impl CodeGen {
    /// Count, absolute offsets, NUL-terminated strings
    pub fn write_string_directory(&mut self, ctx: &Context) {
        let count = ctx.strings.len() as u32;
        self.write_u32(count);
        let mut offset = self.position() + 4 * count;
        for (_, value) in ctx.strings.iter() {
            self.write_u32(offset);
            offset += value.len() as u32 + 1;
        }
        for (_, value) in ctx.strings.iter() {
            self.write_cstr(value);
        }
    }
}
