// Format D: text listing
//
// One statement per line; every token is followed by a NUL and the statement by
// a newline. Numbers are written as lowercase hex with a 0x prefix. Labels stay
// symbolic: the consumer assembles the listing and places them itself.

use crate::backend::allocate::packed_string_size;
use crate::backend::codegen::resolve_word;
use crate::backend::encode::pack_bytes;
use crate::backend::error::BackendError;
use crate::backend::expr::{Expr, ExprId};
use crate::backend::program::{Context, Instruction};
use crate::backend::storage::Domain;

fn hex(value: u32) -> String {
    format!("0x{:x}", value)
}

/// Accumulates statements
#[derive(Debug, Default)]
pub struct Listing {
    pub data: Vec<u8>,
}

impl Listing {
    pub fn statement<S: AsRef<str>>(&mut self, tokens: &[S]) {
        for token in tokens {
            self.data.extend_from_slice(token.as_ref().as_bytes());
            self.data.push(0);
        }
        self.data.push(b'\n');
    }

    pub fn define(&mut self, name: &str, value: u32) {
        let value = hex(value);
        self.statement(&["define", name, value.as_str()]);
    }

    pub fn data_block(&mut self, name: &str, address: u32, words: &[u32]) {
        let mut tokens = vec![
            "data".to_string(),
            name.to_string(),
            hex(address),
            hex(words.len() as u32),
        ];
        tokens.extend(words.iter().map(|&w| hex(w)));
        self.statement(&tokens);
    }
}

pub fn emit(ctx: &Context) -> Result<Vec<u8>, BackendError> {
    log::info!("Emitting text listing");
    let mut out = Listing::default();

    // strings: word-packed region starting at byte 0
    let mut byte_address = 0usize;
    for (name, value) in ctx.strings.iter() {
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(packed_string_size(value), 0);
        let words = pack_bytes(&bytes);
        out.data_block(&format!("{}$data", name), (byte_address / 4) as u32, &words);
        out.define(name, byte_address as u32);
        byte_address += bytes.len();
    }

    for table in ctx.storage.tables() {
        for record in table.iter() {
            match (table.key.domain, record.init) {
                (Domain::Static, Some(init)) => {
                    let words = ctx
                        .resolver()
                        .resolve_words(init)
                        .map_err(|e| e.at(&record.pos))?;
                    out.data_block(&record.name, record.address as u32, &words);
                }
                _ => out.define(&table.key.symbol_name(&record.name), record.address as u32),
            }
        }
    }

    for script in ctx.scripts.values() {
        out.define(&script.name, script.number.unwrap_or(0) as u32);
    }

    for function in ctx.functions.values().filter(|f| !f.external) {
        let locals = ctx.frame_size(&function.name, function.params);
        out.statement(&[
            "function".to_string(),
            function.name.clone(),
            function.entry.clone(),
            hex(function.params),
            hex(locals),
        ]);
    }

    for inst in &ctx.code {
        write_instruction(ctx, &mut out, inst)?;
    }
    for label in &ctx.pending_labels {
        out.statement(&["label", label.as_str()]);
    }

    log::debug!("Text listing: {} bytes", out.data.len());
    Ok(out.data)
}

fn write_instruction(ctx: &Context, out: &mut Listing, inst: &Instruction) -> Result<(), BackendError> {
    for label in &inst.labels {
        out.statement(&["label", label.as_str()]);
    }
    let mnemonic = inst
        .opcode
        .text_mnemonic()
        .ok_or_else(|| BackendError::UnknownOpcode(inst.opcode.to_string(), inst.pos.clone()))?;

    let mut tokens = vec![mnemonic.to_string()];
    for &arg in &inst.args {
        tokens.push(argument(ctx, arg, inst)?);
    }
    log::trace!("{:?}", tokens);
    out.statement(&tokens);
    Ok(())
}

/// Resolved value, or the name of a bare reference to a still unbound symbol
fn argument(ctx: &Context, arg: ExprId, inst: &Instruction) -> Result<String, BackendError> {
    if ctx.resolver().can_resolve(arg) {
        return resolve_word(ctx, arg, &inst.pos).map(hex);
    }
    match ctx.exprs.get(arg)? {
        Expr::Symbol { name, .. } if ctx.symbols.contains(name) && !ctx.symbols.is_bound(name) => {
            Ok(name.clone())
        }
        _ => resolve_word(ctx, arg, &inst.pos).map(hex),
    }
}
