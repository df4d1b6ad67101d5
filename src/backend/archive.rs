// Compilation unit archive
//
// A front end saves its finished `Context` here; the driver loads it and runs the
// backend. Layout: "SFAR", u32 little-endian version, bincode body.

use std::fs;
use std::path::Path;

use crate::backend::error::BackendError;
use crate::backend::program::Context;

pub const MAGIC: &[u8; 4] = b"SFAR";
pub const VERSION: u32 = 1;

pub fn to_bytes(ctx: &Context) -> Result<Vec<u8>, BackendError> {
    let body = bincode::serialize(ctx)
        .map_err(|e| BackendError::Archive(format!("failed to serialize context: {e}")))?;
    let mut data = Vec::with_capacity(8 + body.len());
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&VERSION.to_le_bytes());
    data.extend_from_slice(&body);
    Ok(data)
}

pub fn from_bytes(data: &[u8]) -> Result<Context, BackendError> {
    if data.len() < 8 || &data[0..4] != MAGIC {
        return Err(BackendError::Archive(
            "not a compilation unit archive (missing SFAR header)".to_string(),
        ));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != VERSION {
        return Err(BackendError::Archive(format!(
            "unsupported archive version {} (expected {})",
            version, VERSION
        )));
    }
    bincode::deserialize(&data[8..])
        .map_err(|e| BackendError::Archive(format!("failed to deserialize context: {e}")))
}

pub fn save(ctx: &Context, path: &Path) -> Result<(), BackendError> {
    let data = to_bytes(ctx)?;
    fs::write(path, &data)?;
    log::info!("Saved archive {} ({} bytes)", path.display(), data.len());
    Ok(())
}

pub fn load(path: &Path) -> Result<Context, BackendError> {
    let data = fs::read(path)?;
    let ctx = from_bytes(&data)?;
    log::info!(
        "Loaded archive {}: {} instructions, {} symbols",
        path.display(),
        ctx.code.len(),
        ctx.symbols.len()
    );
    Ok(ctx)
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
