// Instruction sequence optimization
//
// Runs before allocation, so only arguments that are already constant can be
// inspected. Labels are never lost: a removed instruction hands its labels to
// the instruction that follows it.

use crate::backend::codegen::CodeEncoding;
use crate::backend::config::BackendConfig;
use crate::backend::error::BackendError;
use crate::backend::opcodes::Opcode;
use crate::backend::program::{Context, Instruction};

pub fn optimize(ctx: &mut Context, config: &BackendConfig) -> Result<(), BackendError> {
    let before = ctx.code.len();
    remove_nops(ctx);
    remove_dropped_pushes(ctx);
    let narrowed = if config.code_encoding() == CodeEncoding::Compressed {
        narrow_pushes(ctx)
    } else {
        0
    };
    log::info!(
        "Optimized {} -> {} instructions ({} pushes narrowed)",
        before,
        ctx.code.len(),
        narrowed
    );
    Ok(())
}

/// Drop `Nop`s, moving their labels onto the next instruction (or the end of code)
pub fn remove_nops(ctx: &mut Context) {
    let mut code = Vec::with_capacity(ctx.code.len());
    let mut carried: Vec<String> = Vec::new();
    for mut inst in std::mem::take(&mut ctx.code) {
        if inst.opcode == Opcode::Nop {
            carried.append(&mut inst.labels);
            continue;
        }
        if !carried.is_empty() {
            carried.append(&mut inst.labels);
            inst.labels = std::mem::take(&mut carried);
        }
        code.push(inst);
    }
    if !carried.is_empty() {
        carried.append(&mut ctx.pending_labels);
        ctx.pending_labels = carried;
    }
    ctx.code = code;
}

/// Remove a push immediately discarded by a drop, when nothing jumps between them
pub fn remove_dropped_pushes(ctx: &mut Context) {
    let mut code: Vec<Instruction> = Vec::with_capacity(ctx.code.len());
    for inst in std::mem::take(&mut ctx.code) {
        let pair = inst.opcode == Opcode::Drop
            && inst.labels.is_empty()
            && code
                .last()
                .map(|prev| prev.opcode == Opcode::PushNumber && prev.labels.is_empty())
                .unwrap_or(false);
        if pair {
            code.pop();
            log::trace!("removed push/drop pair at {}", inst.pos);
            continue;
        }
        code.push(inst);
    }
    ctx.code = code;
}

/// Rewrite constant `PushNumber` 0..=255 to the one-byte `PushByte`
pub fn narrow_pushes(ctx: &mut Context) -> usize {
    let resolver = ctx.resolver();
    let narrow: Vec<usize> = ctx
        .code
        .iter()
        .enumerate()
        .filter(|(_, inst)| inst.opcode == Opcode::PushNumber)
        .filter(|(_, inst)| {
            inst.args.first().map_or(false, |&arg| {
                resolver.can_resolve(arg)
                    && matches!(resolver.resolve_binary(arg, 0), Ok(value) if value <= 0xFF)
            })
        })
        .map(|(i, _)| i)
        .collect();
    for &i in &narrow {
        ctx.code[i].opcode = Opcode::PushByte;
    }
    narrow.len()
}

#[cfg(test)]
#[path = "optimize_tests.rs"]
mod tests;
