// Format B: chunked image
//
// Header and code as in the flat format, followed by tagged chunks instead of a
// fixed directory. Each chunk is a 4-byte ASCII tag, a u32 payload length and the
// payload; chunks without records are left out. The optional legacy header keeps
// loaders that only know the flat format working: they find an empty directory.

use std::io::{Cursor, Seek, SeekFrom, Write};

use crate::backend::codegen::{layout, resolve_symbol_word, CodeEncoding, CodeGen};
use crate::backend::config::BackendConfig;
use crate::backend::error::{BackendError, SourcePos};
use crate::backend::program::Context;
use crate::backend::storage::{Domain, Scope, StorageRecord, TableKey};

pub const MAGIC: &[u8; 4] = b"ACSE";
pub const MAGIC_COMPRESSED: &[u8; 4] = b"ACSe";
pub const LEGACY_MAGIC: &[u8; 4] = b"ACS\0";
pub const HEADER_SIZE: u32 = 8;

/// Scripts with more locals than this need an `SVCT` entry
pub const DEFAULT_SCRIPT_LOCALS: u32 = 20;

/// `MEXP` holds one name slot per map index, so exports stay below this
pub const MAX_EXPORT_INDEX: i64 = 0x1_0000;

/// Narrow a count to its field width, or fail naming the record
fn fit<T: TryFrom<u32>>(
    value: u32,
    field: &str,
    owner: &str,
    pos: &SourcePos,
) -> Result<T, BackendError> {
    T::try_from(value).map_err(|_| {
        BackendError::Unsupported(format!(
            "{}: {} of '{}' ({}) does not fit the chunked format",
            pos, field, owner, value
        ))
    })
}

/// One tagged chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

/// Chunks in emission order; empty payloads are never added
#[derive(Debug, Default)]
pub struct ChunkList {
    pub chunks: Vec<Chunk>,
}

impl ChunkList {
    pub fn add(&mut self, tag: &[u8; 4], data: Vec<u8>) {
        if data.is_empty() {
            log::trace!("chunk {} omitted", String::from_utf8_lossy(tag));
            return;
        }
        log::debug!(
            "chunk {}: {} bytes",
            String::from_utf8_lossy(tag),
            data.len()
        );
        self.chunks.push(Chunk { tag: *tag, data });
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), BackendError> {
        for chunk in &self.chunks {
            out.write_all(&chunk.tag)?;
            out.write_all(&(chunk.data.len() as u32).to_le_bytes())?;
            out.write_all(&chunk.data)?;
        }
        Ok(())
    }
}

/// u32 count, u32 offsets from the payload start, NUL-terminated names
pub fn name_list(names: &[&str]) -> Vec<u8> {
    if names.is_empty() {
        return Vec::new();
    }
    let mut gen = CodeGen::new();
    gen.write_u32(names.len() as u32);
    let mut offset = 4 + 4 * names.len() as u32;
    for name in names {
        gen.write_u32(offset);
        offset += name.len() as u32 + 1;
    }
    for name in names {
        gen.write_cstr(name);
    }
    gen.data
}

pub fn emit(ctx: &mut Context, config: &BackendConfig) -> Result<Vec<u8>, BackendError> {
    let encoding = config.code_encoding();
    log::info!(
        "Emitting chunked image ({:?} code{})",
        encoding,
        if config.legacy_header { ", legacy header" } else { "" }
    );

    layout(ctx, encoding, HEADER_SIZE)?;
    let mut code = CodeGen::new();
    code.write_code(ctx, encoding)?;
    let chunks = build_chunks(ctx)?;

    let magic = if config.legacy_header {
        LEGACY_MAGIC
    } else if encoding == CodeEncoding::Compressed {
        MAGIC_COMPRESSED
    } else {
        MAGIC
    };

    let mut out = Cursor::new(Vec::new());
    out.write_all(magic)?;
    out.write_all(&0u32.to_le_bytes())?;
    out.write_all(&code.data)?;
    let chunk_area = out.position() as u32;
    chunks.write_to(&mut out)?;

    let pointer = if config.legacy_header {
        // trailer: chunk-area offset, real magic, empty script and string directories
        let trailer = out.position() as u32;
        out.write_all(&chunk_area.to_le_bytes())?;
        out.write_all(if encoding == CodeEncoding::Compressed {
            MAGIC_COMPRESSED
        } else {
            MAGIC
        })?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        trailer + 8
    } else {
        chunk_area
    };

    out.seek(SeekFrom::Start(4))?;
    out.write_all(&pointer.to_le_bytes())?;
    log::debug!(
        "Chunk area at 0x{:08x}, header pointer 0x{:08x}",
        chunk_area,
        pointer
    );
    Ok(out.into_inner())
}

fn map_records(ctx: &Context, domain: Domain) -> Vec<&StorageRecord> {
    ctx.storage
        .records(&TableKey::new(domain, Scope::Map))
        .collect()
}

fn init_chunk(ctx: &Context, record: &StorageRecord) -> Result<Vec<u8>, BackendError> {
    let mut gen = CodeGen::new();
    if let Some(init) = record.init {
        let words = ctx
            .resolver()
            .resolve_words(init)
            .map_err(|e| e.at(&record.pos))?;
        gen.write_u32(record.address as u32);
        for word in words {
            gen.write_u32(word);
        }
    }
    Ok(gen.data)
}

/// Assemble every chunk in loader order
pub fn build_chunks(ctx: &Context) -> Result<ChunkList, BackendError> {
    let mut chunks = ChunkList::default();
    let arrays = map_records(ctx, Domain::Array);
    let registers = map_records(ctx, Domain::Register);

    // ARAY
    let mut gen = CodeGen::new();
    for array in arrays.iter().filter(|a| !a.external) {
        gen.write_u32(array.address as u32);
        gen.write_u32(array.size);
    }
    chunks.add(b"ARAY", gen.data);

    // AINI
    for array in arrays.iter().filter(|a| !a.external && a.init.is_some()) {
        chunks.add(b"AINI", init_chunk(ctx, array)?);
    }

    // AIMP
    let imported: Vec<_> = arrays.iter().filter(|a| a.external).collect();
    let mut gen = CodeGen::new();
    if !imported.is_empty() {
        gen.write_u32(imported.len() as u32);
        for array in imported {
            gen.write_u32(array.address as u32);
            gen.write_u32(array.size);
            gen.write_cstr(&array.name);
        }
    }
    chunks.add(b"AIMP", gen.data);

    // FUNC, FNAM
    let mut functions: Vec<_> = ctx.functions.values().collect();
    functions.sort_by_key(|f| f.index.unwrap_or(u32::MAX));
    let mut gen = CodeGen::new();
    let mut names = Vec::with_capacity(functions.len());
    let mut next_index = 0u32;
    for function in &functions {
        let index = function.index.ok_or_else(|| {
            BackendError::AllocationConflict(format!("function '{}' has no index", function.name))
        })?;
        // unused indices get empty slots
        while next_index < index {
            gen.write_bytes(&[0, 0, 0, 0]);
            gen.write_u32(0);
            names.push("");
            next_index += 1;
        }
        let address = if function.external {
            0
        } else {
            resolve_symbol_word(ctx, &function.entry, &function.pos)?
        };
        let locals = ctx.frame_size(&function.name, function.params);
        gen.write_u8(fit(function.params, "parameter count", &function.name, &function.pos)?);
        gen.write_u8(fit(locals, "frame size", &function.name, &function.pos)?);
        gen.write_u8(function.returns as u8);
        gen.write_u8(0);
        gen.write_u32(address);
        names.push(function.name.as_str());
        next_index += 1;
    }
    chunks.add(b"FUNC", gen.data);
    chunks.add(b"FNAM", name_list(&names));

    // LOAD
    let mut gen = CodeGen::new();
    for library in &ctx.imports {
        gen.write_cstr(library);
    }
    chunks.add(b"LOAD", gen.data);

    // MIMP
    let mut gen = CodeGen::new();
    for register in registers.iter().filter(|r| r.external) {
        gen.write_u32(register.address as u32);
        gen.write_cstr(&register.name);
    }
    chunks.add(b"MIMP", gen.data);

    // MEXP: slot per map index up to the highest exported one
    let exported: Vec<&StorageRecord> = registers
        .iter()
        .chain(arrays.iter())
        .filter(|r| !r.external && r.linkage.is_external())
        .copied()
        .collect();
    if let Some(record) = exported.iter().find(|r| r.address >= MAX_EXPORT_INDEX) {
        return Err(BackendError::Unsupported(format!(
            "{}: exported '{}' at map index {} is beyond the export table",
            record.pos, record.name, record.address
        )));
    }
    let slots = exported
        .iter()
        .map(|r| r.address as usize + 1)
        .max()
        .unwrap_or(0);
    let mut export_names = vec![""; slots];
    for record in &exported {
        export_names[record.address as usize] = record.name.as_str();
    }
    chunks.add(b"MEXP", name_list(&export_names));

    // MINI
    for register in registers.iter().filter(|r| !r.external && r.init.is_some()) {
        chunks.add(b"MINI", init_chunk(ctx, register)?);
    }

    // SPTR, SFLG, SNAM, SVCT
    let scripts: Vec<_> = ctx.defined_scripts().collect();
    let mut sptr = CodeGen::new();
    let mut sflg = CodeGen::new();
    let mut svct = CodeGen::new();
    for script in &scripts {
        let number = script.number.ok_or_else(|| {
            BackendError::AllocationConflict(format!("script '{}' has no number", script.name))
        })?;
        let number = i16::try_from(number).map_err(|_| {
            BackendError::Unsupported(format!(
                "{}: script number {} does not fit the chunked format",
                script.pos, number
            ))
        })?;
        let address = resolve_symbol_word(ctx, &script.entry, &script.pos)?;
        sptr.write_i16(number);
        sptr.write_u16(script.kind);
        sptr.write_u32(address);
        sptr.write_u32(script.params);

        if script.flags != 0 {
            sflg.write_i16(number);
            sflg.write_u16(script.flags);
        }

        let locals = ctx.frame_size(&script.name, script.params);
        if locals > DEFAULT_SCRIPT_LOCALS {
            svct.write_i16(number);
            svct.write_u16(fit(locals, "frame size", &script.name, &script.pos)?);
        }
    }
    chunks.add(b"SPTR", sptr.data);
    chunks.add(b"SFLG", sflg.data);

    // named scripts -1, -2, ... map to name slots 0, 1, ...
    let mut named: Vec<_> = scripts.iter().filter(|s| s.named).collect();
    named.sort_by_key(|s| std::cmp::Reverse(s.number.unwrap_or(0)));
    let script_names: Vec<&str> = named.iter().map(|s| s.name.as_str()).collect();
    chunks.add(b"SNAM", name_list(&script_names));

    chunks.add(b"STRL", string_chunk(ctx));
    chunks.add(b"SVCT", svct.data);
    Ok(chunks)
}

/// u32 0, u32 count, u32 0, offsets from the payload start, NUL-terminated strings
pub fn string_chunk(ctx: &Context) -> Vec<u8> {
    if ctx.strings.is_empty() {
        return Vec::new();
    }
    let count = ctx.strings.len() as u32;
    let mut gen = CodeGen::new();
    gen.write_u32(0);
    gen.write_u32(count);
    gen.write_u32(0);
    let mut offset = 12 + 4 * count;
    for (_, value) in ctx.strings.iter() {
        gen.write_u32(offset);
        offset += value.len() as u32 + 1;
    }
    for (_, value) in ctx.strings.iter() {
        gen.write_cstr(value);
    }
    gen.data
}
