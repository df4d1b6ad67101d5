// Format C: token stream
//
// A self-describing stream for a later linking step. No allocation has run, so
// records keep their declared (possibly unassigned) addresses and labels stay
// symbolic. Each token is {u32 tag, u32 payload length, payload}; payloads are
// NUL-padded to a multiple of 4 and the length includes the padding.

use crate::backend::codegen::CodeGen;
use crate::backend::error::BackendError;
use crate::backend::expr::{BinaryOp, BranchOp, Expr, ExprId, UnaryOp};
use crate::backend::program::{Context, FunctionRecord, Instruction, ScriptRecord};
use crate::backend::storage::{StorageRecord, TableKey};

pub const VERSION: u32 = 1;

/// Token tags
pub mod tag {
    pub const END: u32 = 0x0000;
    pub const HEADER: u32 = 0x0001;
    pub const IMPORT: u32 = 0x0002;
    pub const STRING: u32 = 0x0003;
    pub const STORAGE: u32 = 0x0004;
    pub const FUNCTION: u32 = 0x0005;
    pub const SCRIPT: u32 = 0x0006;
    pub const CODE: u32 = 0x0007;
    pub const LABEL: u32 = 0x0008;
    pub const INSTRUCTION: u32 = 0x0009;

    pub const LITERAL: u32 = 0x0100;
    pub const SYMBOL: u32 = 0x0101;
    pub const UNARY: u32 = 0x0102;
    pub const BINARY: u32 = 0x0103;
    pub const BRANCH: u32 = 0x0104;
    pub const TERNARY: u32 = 0x0105;
    pub const CAST: u32 = 0x0106;
    pub const PART: u32 = 0x0107;
    pub const AGGREGATE: u32 = 0x0108;
    pub const STR: u32 = 0x0109;
}

/// Marks an unassigned address, index or number
const NONE: u32 = 0xFFFF_FFFF;

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn token(out: &mut CodeGen, tag: u32, payload: &[u8]) {
    let len = padded_len(payload.len());
    out.write_u32(tag);
    out.write_u32(len as u32);
    out.write_bytes(payload);
    for _ in payload.len()..len {
        out.write_u8(0);
    }
}

fn unary_code(op: UnaryOp) -> u32 {
    match op {
        UnaryOp::Neg => 0,
        UnaryOp::BitNot => 1,
        UnaryOp::LogNot => 2,
        UnaryOp::Identity => 3,
    }
}

fn binary_code(op: BinaryOp) -> u32 {
    match op {
        BinaryOp::Add => 0,
        BinaryOp::Sub => 1,
        BinaryOp::Mul => 2,
        BinaryOp::Div => 3,
        BinaryOp::Mod => 4,
        BinaryOp::And => 5,
        BinaryOp::Or => 6,
        BinaryOp::Xor => 7,
        BinaryOp::Shl => 8,
        BinaryOp::Shr => 9,
        BinaryOp::Eq => 10,
        BinaryOp::Ne => 11,
        BinaryOp::Lt => 12,
        BinaryOp::Le => 13,
        BinaryOp::Gt => 14,
        BinaryOp::Ge => 15,
    }
}

fn branch_code(op: BranchOp) -> u32 {
    match op {
        BranchOp::And => 0,
        BranchOp::Or => 1,
        BranchOp::Xor => 2,
    }
}

pub fn emit(ctx: &Context) -> Result<Vec<u8>, BackendError> {
    log::info!("Emitting token stream");
    let writer = TokenWriter { ctx };
    let mut out = CodeGen::new();

    token(&mut out, tag::HEADER, &VERSION.to_le_bytes());

    for library in &ctx.imports {
        let mut payload = CodeGen::new();
        payload.write_cstr(library);
        token(&mut out, tag::IMPORT, &payload.data);
    }

    for (name, value) in ctx.strings.iter() {
        let mut payload = CodeGen::new();
        payload.write_cstr(name);
        payload.write_cstr(value);
        token(&mut out, tag::STRING, &payload.data);
    }

    for table in ctx.storage.tables() {
        for record in table.iter() {
            let payload = writer.storage(&table.key, record)?;
            token(&mut out, tag::STORAGE, &payload);
        }
    }

    for function in ctx.functions.values() {
        token(&mut out, tag::FUNCTION, &writer.function(function));
    }

    for script in ctx.scripts.values() {
        token(&mut out, tag::SCRIPT, &writer.script(script));
    }

    let mut code = CodeGen::new();
    for inst in &ctx.code {
        writer.instruction(&mut code, inst)?;
    }
    for label in &ctx.pending_labels {
        let mut payload = CodeGen::new();
        payload.write_cstr(label);
        token(&mut code, tag::LABEL, &payload.data);
    }
    token(&mut out, tag::CODE, &code.data);

    token(&mut out, tag::END, &[]);
    log::debug!("Token stream: {} bytes", out.data.len());
    Ok(out.data)
}

struct TokenWriter<'a> {
    ctx: &'a Context,
}

impl<'a> TokenWriter<'a> {
    fn storage(&self, key: &TableKey, record: &StorageRecord) -> Result<Vec<u8>, BackendError> {
        let mut payload = CodeGen::new();
        payload.write_u32(key.domain.code());
        payload.write_u32(key.scope.code());
        payload.write_cstr(&key.owner);
        payload.write_cstr(&record.name);
        payload.write_u32(if record.is_assigned() {
            record.address as u32
        } else {
            NONE
        });
        payload.write_u32(record.size);
        payload.write_u32(record.linkage.code());
        payload.write_u32(record.external as u32);
        match record.init {
            Some(init) => {
                payload.write_u32(1);
                self.expr(&mut payload, init)
                    .map_err(|e| e.at(&record.pos))?;
            }
            None => payload.write_u32(0),
        }
        Ok(payload.data)
    }

    fn function(&self, function: &FunctionRecord) -> Vec<u8> {
        let mut payload = CodeGen::new();
        payload.write_cstr(&function.name);
        payload.write_cstr(&function.entry);
        payload.write_u32(function.index.unwrap_or(NONE));
        payload.write_u32(function.params);
        payload.write_u32(self.ctx.frame_size(&function.name, function.params));
        payload.write_u32(function.returns as u32);
        payload.write_u32(function.linkage.code());
        payload.write_u32(function.external as u32);
        payload.data
    }

    fn script(&self, script: &ScriptRecord) -> Vec<u8> {
        let mut payload = CodeGen::new();
        payload.write_cstr(&script.name);
        payload.write_cstr(&script.entry);
        match script.number {
            Some(number) => {
                payload.write_u32(1);
                payload.write_u32(number as u32);
            }
            None => {
                payload.write_u32(0);
                payload.write_u32(NONE);
            }
        }
        payload.write_u32(script.named as u32);
        payload.write_u16(script.kind);
        payload.write_u16(script.flags);
        payload.write_u32(script.params);
        payload.write_u32(self.ctx.frame_size(&script.name, script.params));
        payload.write_u32(script.external as u32);
        payload.data
    }

    fn instruction(&self, out: &mut CodeGen, inst: &Instruction) -> Result<(), BackendError> {
        for label in &inst.labels {
            let mut payload = CodeGen::new();
            payload.write_cstr(label);
            token(out, tag::LABEL, &payload.data);
        }
        let mut payload = CodeGen::new();
        payload.write_u32(inst.opcode.code());
        payload.write_u32(inst.args.len() as u32);
        for &arg in &inst.args {
            self.expr(&mut payload, arg).map_err(|e| e.at(&inst.pos))?;
        }
        log::trace!("token {} with {} args", inst.opcode, inst.args.len());
        token(out, tag::INSTRUCTION, &payload.data);
        Ok(())
    }

    /// True when `id` can be written as a single literal token
    fn is_literal(&self, id: ExprId) -> Result<bool, BackendError> {
        let resolver = self.ctx.resolver();
        if !resolver.can_resolve(id) {
            return Ok(false);
        }
        Ok(match self.ctx.exprs.get(id)? {
            Expr::Str(_) => false,
            Expr::Aggregate { members } => {
                for (_, member) in members {
                    if !self.is_literal(*member)? {
                        return Ok(false);
                    }
                }
                true
            }
            other => other.ty().scalar().is_some(),
        })
    }

    fn expr(&self, out: &mut CodeGen, id: ExprId) -> Result<(), BackendError> {
        let expr = self.ctx.exprs.get(id)?;
        if self.is_literal(id)? {
            let words = self.ctx.resolver().resolve_words(id)?;
            let mut payload = CodeGen::new();
            payload.write_u32(expr.ty().code());
            payload.write_u32(words.len() as u32);
            for word in words {
                payload.write_u32(word);
            }
            token(out, tag::LITERAL, &payload.data);
            return Ok(());
        }

        let mut payload = CodeGen::new();
        let kind = match expr {
            Expr::Value(_) => {
                // a literal leaf is always resolvable
                return Err(BackendError::BadExpression(format!(
                    "literal {} could not be encoded",
                    id
                )));
            }
            Expr::Str(value) => {
                payload.write_cstr(value);
                tag::STR
            }
            Expr::Symbol { name, ty } => {
                payload.write_u32(ty.code());
                payload.write_cstr(name);
                tag::SYMBOL
            }
            Expr::Unary { op, ty, operand } => {
                payload.write_u32(unary_code(*op));
                payload.write_u32(ty.code());
                self.expr(&mut payload, *operand)?;
                tag::UNARY
            }
            Expr::Binary { op, ty, lhs, rhs } => {
                payload.write_u32(binary_code(*op));
                payload.write_u32(ty.code());
                self.expr(&mut payload, *lhs)?;
                self.expr(&mut payload, *rhs)?;
                tag::BINARY
            }
            Expr::Branch { op, lhs, rhs } => {
                payload.write_u32(branch_code(*op));
                self.expr(&mut payload, *lhs)?;
                self.expr(&mut payload, *rhs)?;
                tag::BRANCH
            }
            Expr::Ternary {
                ty,
                cond,
                then,
                otherwise,
            } => {
                payload.write_u32(ty.code());
                self.expr(&mut payload, *cond)?;
                self.expr(&mut payload, *then)?;
                self.expr(&mut payload, *otherwise)?;
                tag::TERNARY
            }
            Expr::Cast { from, to, operand } => {
                payload.write_u32(from.code());
                payload.write_u32(to.code());
                self.expr(&mut payload, *operand)?;
                tag::CAST
            }
            Expr::Part { part, operand } => {
                payload.write_u32(*part);
                self.expr(&mut payload, *operand)?;
                tag::PART
            }
            Expr::Aggregate { members } => {
                payload.write_u32(members.len() as u32);
                for (name, member) in members {
                    payload.write_cstr(name.as_deref().unwrap_or(""));
                    self.expr(&mut payload, *member)?;
                }
                tag::AGGREGATE
            }
        };
        token(out, kind, &payload.data);
        Ok(())
    }
}
