// Shared Code Generation
//
// Instruction layout and encoding used by the binary emitters. Layout is a first
// pass over the instruction list that binds every label to its byte address; the
// second pass encodes opcodes and resolves arguments now that all labels are known.

use crate::backend::error::{BackendError, SourcePos};
use crate::backend::expr::{ExprId, Literal};
use crate::backend::opcodes::Opcode;
use crate::backend::program::{Context, Instruction};
use crate::backend::types::Width;

/// How opcodes and arguments are laid out in the code section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeEncoding {
    /// 32-bit opcode, 32-bit arguments
    Flat,
    /// 1-2 byte opcode, per-opcode argument widths
    Compressed,
}

/// Encoded size of one instruction in bytes
pub fn instruction_size(inst: &Instruction, encoding: CodeEncoding) -> usize {
    match encoding {
        CodeEncoding::Flat => 4 + 4 * inst.args.len(),
        CodeEncoding::Compressed => {
            let info = inst.opcode.info();
            inst.opcode.compressed_opcode_size()
                + info.compressed_args.iter().map(|&w| w as usize).sum::<usize>()
        }
    }
}

/// Bind every label to its byte address, code starting at `base`.
/// Labels left pending after the last instruction mark the end of code.
/// Returns the address one past the last instruction.
pub fn layout(ctx: &mut Context, encoding: CodeEncoding, base: u32) -> Result<u32, BackendError> {
    let mut address = base;
    let mut bindings: Vec<(String, u32, SourcePos)> = Vec::new();
    for inst in &ctx.code {
        for label in &inst.labels {
            bindings.push((label.clone(), address, inst.pos.clone()));
        }
        address += instruction_size(inst, encoding) as u32;
    }
    for label in &ctx.pending_labels {
        bindings.push((label.clone(), address, SourcePos::default()));
    }

    log::debug!(
        "Code layout: {} instructions, {} labels, 0x{:08x}..0x{:08x}",
        ctx.code.len(),
        bindings.len(),
        base,
        address
    );
    for (label, value, pos) in bindings {
        bind_label(ctx, &label, value, &pos)?;
    }
    Ok(address)
}

fn bind_label(ctx: &mut Context, label: &str, address: u32, pos: &SourcePos) -> Result<(), BackendError> {
    log::trace!("label {} = 0x{:08x}", label, address);
    let value = ctx.exprs.literal(Literal::Uns(address as u128, Width::W32));
    ctx.symbols.bind(label, value).map_err(|e| e.at(pos))
}

/// Low word of a constant argument
pub fn resolve_word(ctx: &Context, id: ExprId, pos: &SourcePos) -> Result<u32, BackendError> {
    ctx.resolver().resolve_binary(id, 0).map_err(|e| e.at(pos))
}

/// Low word of the value a named symbol is bound to
pub fn resolve_symbol_word(ctx: &Context, name: &str, pos: &SourcePos) -> Result<u32, BackendError> {
    let expr = ctx
        .symbols
        .get(name)
        .and_then(|entry| entry.expr)
        .ok_or_else(|| BackendError::UnknownSymbol(name.to_string(), pos.clone()))?;
    resolve_word(ctx, expr, pos)
}

/// Check that `value` survives truncation to `bytes` as either a signed or unsigned quantity
fn fits(value: u32, bytes: u8) -> bool {
    if bytes >= 4 {
        return true;
    }
    let bits = bytes as u32 * 8;
    let unsigned_max = (1u32 << bits) - 1;
    let signed = value as i32;
    value <= unsigned_max || signed >= -(1i32 << (bits - 1))
}

/// Growable output image with little-endian writers
#[derive(Debug, Default)]
pub struct CodeGen {
    pub data: Vec<u8>,
}

impl CodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// NUL-terminated string
    pub fn write_cstr(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    /// Overwrite a previously written 32-bit value
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Encode the whole instruction sequence; labels must already be laid out
    pub fn write_code(&mut self, ctx: &Context, encoding: CodeEncoding) -> Result<(), BackendError> {
        for inst in &ctx.code {
            let start = self.data.len();
            self.write_instruction(ctx, inst, encoding)?;
            debug_assert_eq!(self.data.len() - start, instruction_size(inst, encoding));
        }
        Ok(())
    }

    fn write_instruction(
        &mut self,
        ctx: &Context,
        inst: &Instruction,
        encoding: CodeEncoding,
    ) -> Result<(), BackendError> {
        match encoding {
            CodeEncoding::Flat => {
                self.write_u32(inst.opcode.code());
                for &arg in &inst.args {
                    let value = resolve_word(ctx, arg, &inst.pos)?;
                    self.write_u32(value);
                }
            }
            CodeEncoding::Compressed => {
                self.write_compressed_opcode(inst.opcode);
                let widths = inst.opcode.info().compressed_args;
                for (&arg, &bytes) in inst.args.iter().zip(widths) {
                    let value = resolve_word(ctx, arg, &inst.pos)?;
                    if !fits(value, bytes) {
                        return Err(BackendError::Unsupported(format!(
                            "{}: argument 0x{:x} of {} does not fit in {} byte(s)",
                            inst.pos, value, inst.opcode, bytes
                        )));
                    }
                    match bytes {
                        1 => self.write_u8(value as u8),
                        2 => self.write_u16(value as u16),
                        _ => self.write_u32(value),
                    }
                }
            }
        }
        Ok(())
    }

    fn write_compressed_opcode(&mut self, opcode: Opcode) {
        let code = opcode.code();
        if code < 240 {
            self.write_u8(code as u8);
        } else {
            self.write_u8((240 + (code - 240) / 256) as u8);
            self.write_u8(((code - 240) % 256) as u8);
        }
    }
}

#[cfg(test)]
#[path = "codegen_tests.rs"]
mod tests;
