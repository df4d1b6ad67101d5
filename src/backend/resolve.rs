// Expression resolution
//
// Evaluates expression nodes against the current symbol table. Every node is
// evaluated in the domain of its own declared type; requests for another domain
// are checked against that type first. INT and UNS substitute for each other.

use crate::backend::encode::{
    fixed_to_raw, raw_to_fixed, scalar_bits, word, wrap_int, wrap_uns,
};
use crate::backend::error::{BackendError, SourcePos};
use crate::backend::expr::{BinaryOp, BranchOp, Expr, ExprArena, ExprId, UnaryOp};
use crate::backend::symbols::{SymbolEntry, SymbolTable};
use crate::backend::types::{ScalarKind, Type, Width};

/// Symbol chains longer than this are treated as cycles
const MAX_DEPTH: u32 = 256;

/// A resolved scalar in its evaluation domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Fixed(f64),
    Float(f64),
    Int(i128),
    Uns(u128),
}

fn cannot(what: &'static str, ty: Type) -> BackendError {
    BackendError::CannotResolve(what, ty, SourcePos::default())
}

fn domain_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Fixed => "fixed",
        ScalarKind::Float => "float",
        ScalarKind::Int => "int",
        ScalarKind::Uns => "uns",
    }
}

/// Read-only view used by every pass that needs constant values
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    exprs: &'a ExprArena,
    symbols: &'a SymbolTable,
}

impl<'a> Resolver<'a> {
    pub fn new(exprs: &'a ExprArena, symbols: &'a SymbolTable) -> Self {
        Resolver { exprs, symbols }
    }

    pub fn ty(&self, id: ExprId) -> Result<Type, BackendError> {
        self.exprs.ty(id)
    }

    /// True iff every symbol reachable from `id` is bound to a resolvable expression
    pub fn can_resolve(&self, id: ExprId) -> bool {
        self.can_resolve_at(id, 0)
    }

    fn can_resolve_at(&self, id: ExprId, depth: u32) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        let expr = match self.exprs.get(id) {
            Ok(expr) => expr,
            Err(_) => return false,
        };
        let next = depth + 1;
        match expr {
            Expr::Value(_) | Expr::Str(_) => true,
            Expr::Symbol { name, .. } => match self.symbols.get(name) {
                Some(SymbolEntry {
                    expr: Some(target), ..
                }) => self.can_resolve_at(*target, next),
                _ => false,
            },
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } | Expr::Part { operand, .. } => {
                self.can_resolve_at(*operand, next)
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.can_resolve_at(*lhs, next) && self.can_resolve_at(*rhs, next)
            }
            Expr::Branch { op, lhs, rhs } => {
                if !self.can_resolve_at(*lhs, next) {
                    return false;
                }
                match (op, self.truth(*lhs, next)) {
                    (BranchOp::And, Ok(false)) | (BranchOp::Or, Ok(true)) => true,
                    (_, Ok(_)) => self.can_resolve_at(*rhs, next),
                    (_, Err(_)) => false,
                }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => {
                if !self.can_resolve_at(*cond, next) {
                    return false;
                }
                match self.truth(*cond, next) {
                    Ok(true) => self.can_resolve_at(*then, next),
                    Ok(false) => self.can_resolve_at(*otherwise, next),
                    Err(_) => false,
                }
            }
            Expr::Aggregate { members } => members
                .iter()
                .all(|(_, member)| self.can_resolve_at(*member, next)),
        }
    }

    pub fn resolve_fixed(&self, id: ExprId) -> Result<f64, BackendError> {
        match self.resolve_as(id, ScalarKind::Fixed)? {
            Scalar::Fixed(v) => Ok(v),
            _ => Err(cannot("fixed", self.ty(id)?)),
        }
    }

    pub fn resolve_float(&self, id: ExprId) -> Result<f64, BackendError> {
        match self.resolve_as(id, ScalarKind::Float)? {
            Scalar::Float(v) => Ok(v),
            _ => Err(cannot("float", self.ty(id)?)),
        }
    }

    pub fn resolve_int(&self, id: ExprId) -> Result<i128, BackendError> {
        match self.resolve_as(id, ScalarKind::Int)? {
            Scalar::Int(v) => Ok(v),
            Scalar::Uns(v) => Ok(v as i128),
            _ => Err(cannot("int", self.ty(id)?)),
        }
    }

    pub fn resolve_uns(&self, id: ExprId) -> Result<u128, BackendError> {
        match self.resolve_as(id, ScalarKind::Uns)? {
            Scalar::Uns(v) => Ok(v),
            Scalar::Int(v) => Ok(v as u128),
            _ => Err(cannot("uns", self.ty(id)?)),
        }
    }

    /// Word `part` of the value's little-endian 32-bit word sequence
    pub fn resolve_binary(&self, id: ExprId, part: u32) -> Result<u32, BackendError> {
        self.binary_at(id, part, 0)
    }

    /// All words of the value, least significant first
    pub fn resolve_words(&self, id: ExprId) -> Result<Vec<u32>, BackendError> {
        let count = self.word_count(id)?;
        (0..count as u32)
            .map(|part| self.resolve_binary(id, part))
            .collect()
    }

    pub fn word_count(&self, id: ExprId) -> Result<usize, BackendError> {
        self.word_count_at(id, 0)
    }

    pub fn resolve_string(&self, id: ExprId) -> Result<String, BackendError> {
        let mut current = id;
        for _ in 0..MAX_DEPTH {
            match self.exprs.get(current)? {
                Expr::Str(s) => return Ok(s.clone()),
                Expr::Symbol { name, ty: Type::Str } => current = self.bound(name)?,
                other => return Err(cannot("string", other.ty())),
            }
        }
        Err(BackendError::CircularReference(format!("{}", id)))
    }

    pub fn resolve_symbol(&self, id: ExprId) -> Result<String, BackendError> {
        match self.exprs.get(id)? {
            Expr::Symbol { name, .. } => Ok(name.clone()),
            other => Err(cannot("symbol", other.ty())),
        }
    }

    /// Integer-like truth value, as used by branch and ternary nodes
    pub fn resolve_bool(&self, id: ExprId) -> Result<bool, BackendError> {
        self.truth(id, 0)
    }

    /// Evaluate `id` in its own domain
    pub fn eval(&self, id: ExprId) -> Result<Scalar, BackendError> {
        self.eval_at(id, 0)
    }

    fn resolve_as(&self, id: ExprId, want: ScalarKind) -> Result<Scalar, BackendError> {
        let ty = self.ty(id)?;
        match ty.kind() {
            Some(kind) if kind.compatible_with(want) => self.eval_at(id, 0),
            _ => Err(cannot(domain_name(want), ty)),
        }
    }

    fn bound(&self, name: &str) -> Result<ExprId, BackendError> {
        match self.symbols.get(name) {
            None => Err(BackendError::UnknownSymbol(
                name.to_string(),
                SourcePos::default(),
            )),
            Some(SymbolEntry { expr: None, .. }) => {
                Err(BackendError::NotResolvable(name.to_string()))
            }
            Some(SymbolEntry {
                expr: Some(target), ..
            }) => Ok(*target),
        }
    }

    fn guard(&self, id: ExprId, depth: u32) -> Result<(), BackendError> {
        if depth > MAX_DEPTH {
            let name = match self.exprs.get(id) {
                Ok(Expr::Symbol { name, .. }) => name.clone(),
                _ => format!("{}", id),
            };
            return Err(BackendError::CircularReference(name));
        }
        Ok(())
    }

    fn eval_at(&self, id: ExprId, depth: u32) -> Result<Scalar, BackendError> {
        self.guard(id, depth)?;
        let next = depth + 1;
        match self.exprs.get(id)? {
            Expr::Value(lit) => Ok(match *lit {
                crate::backend::expr::Literal::Fixed(v, _) => Scalar::Fixed(v),
                crate::backend::expr::Literal::Float(v, _) => Scalar::Float(v),
                crate::backend::expr::Literal::Int(v, w) => Scalar::Int(wrap_int(v, w)),
                crate::backend::expr::Literal::Uns(v, w) => Scalar::Uns(wrap_uns(v, w)),
            }),
            Expr::Str(_) => Err(cannot("scalar", Type::Str)),
            Expr::Aggregate { .. } => Err(cannot("scalar", Type::Aggregate)),
            Expr::Symbol { name, ty } => {
                let target = self.bound(name)?;
                self.eval_in(target, *ty, next)
            }
            Expr::Unary { op, ty, operand } => match op {
                UnaryOp::LogNot => Ok(Scalar::Int(!self.truth(*operand, next)? as i128)),
                _ => {
                    let value = self.eval_in(*operand, *ty, next)?;
                    apply_unary(*op, *ty, value)
                }
            },
            Expr::Binary { op, ty, lhs, rhs } => {
                if let Some(cmp) = op.cmp_fn() {
                    let lhs_ty = self.ty(*lhs)?;
                    let a = self.eval_in(*lhs, lhs_ty, next)?;
                    let b = self.eval_in(*rhs, lhs_ty, next)?;
                    let result = match compare(a, b) {
                        Some(ordering) => cmp(ordering),
                        None => *op == BinaryOp::Ne,
                    };
                    return Ok(Scalar::Int(result as i128));
                }
                let a = self.eval_in(*lhs, *ty, next)?;
                let b = self.eval_in(*rhs, *ty, next)?;
                apply_binary(*op, *ty, a, b)
            }
            Expr::Branch { op, lhs, rhs } => {
                let left = self.truth(*lhs, next)?;
                let result = match op {
                    BranchOp::And => left && self.truth(*rhs, next)?,
                    BranchOp::Or => left || self.truth(*rhs, next)?,
                    BranchOp::Xor => left != self.truth(*rhs, next)?,
                };
                Ok(Scalar::Int(result as i128))
            }
            Expr::Ternary {
                ty,
                cond,
                then,
                otherwise,
            } => {
                if self.truth(*cond, next)? {
                    self.eval_in(*then, *ty, next)
                } else {
                    self.eval_in(*otherwise, *ty, next)
                }
            }
            Expr::Cast { from, to, operand } => {
                let value = self.eval_in(*operand, *from, next)?;
                convert(value, *to)
            }
            Expr::Part { part, operand } => {
                Ok(Scalar::Uns(self.binary_at(*operand, *part, next)? as u128))
            }
        }
    }

    /// Evaluate `id` and coerce the result into the domain of `want`
    fn eval_in(&self, id: ExprId, want: Type, depth: u32) -> Result<Scalar, BackendError> {
        let own = self.ty(id)?;
        let (want_kind, width) = want.scalar().ok_or_else(|| cannot("scalar", want))?;
        match own.kind() {
            Some(kind) if kind.compatible_with(want_kind) => {}
            _ => return Err(cannot(domain_name(want_kind), own)),
        }
        let value = self.eval_at(id, depth)?;
        Ok(match (want_kind, value) {
            (ScalarKind::Int, Scalar::Int(v)) => Scalar::Int(wrap_int(v, width)),
            (ScalarKind::Int, Scalar::Uns(v)) => Scalar::Int(wrap_int(v as i128, width)),
            (ScalarKind::Uns, Scalar::Int(v)) => Scalar::Uns(wrap_uns(v as u128, width)),
            (ScalarKind::Uns, Scalar::Uns(v)) => Scalar::Uns(wrap_uns(v, width)),
            (_, other) => other,
        })
    }

    fn truth(&self, id: ExprId, depth: u32) -> Result<bool, BackendError> {
        Ok(match self.eval_at(id, depth)? {
            Scalar::Int(v) => v != 0,
            Scalar::Uns(v) => v != 0,
            Scalar::Fixed(v) | Scalar::Float(v) => v != 0.0,
        })
    }

    fn binary_at(&self, id: ExprId, part: u32, depth: u32) -> Result<u32, BackendError> {
        self.guard(id, depth)?;
        let next = depth + 1;
        let expr = self.exprs.get(id)?;
        match expr {
            Expr::Aggregate { members } => {
                let mut remaining = part as usize;
                for (_, member) in members {
                    let count = self.word_count_at(*member, next)?;
                    if remaining < count {
                        return self.binary_at(*member, remaining as u32, next);
                    }
                    remaining -= count;
                }
                Err(cannot("binary word beyond width", Type::Aggregate))
            }
            Expr::Symbol {
                name,
                ty: Type::Aggregate,
            } => {
                let target = self.bound(name)?;
                self.binary_at(target, part, next)
            }
            Expr::Str(_) => Err(cannot("binary", Type::Str)),
            other => {
                let ty = other.ty();
                let (kind, width) = ty.scalar().ok_or_else(|| cannot("binary", ty))?;
                let value = self.eval_in(id, ty, depth)?;
                word(scalar_bits(kind, width, &value), ty, part)
            }
        }
    }

    fn word_count_at(&self, id: ExprId, depth: u32) -> Result<usize, BackendError> {
        self.guard(id, depth)?;
        match self.exprs.get(id)? {
            Expr::Aggregate { members } => {
                let mut total = 0;
                for (_, member) in members {
                    total += self.word_count_at(*member, depth + 1)?;
                }
                Ok(total)
            }
            Expr::Symbol {
                name,
                ty: Type::Aggregate,
            } => {
                let target = self.bound(name)?;
                self.word_count_at(target, depth + 1)
            }
            other => other
                .ty()
                .scalar_words()
                .ok_or_else(|| cannot("binary", other.ty())),
        }
    }
}

fn scalar_parts(ty: Type) -> Result<(ScalarKind, Width), BackendError> {
    ty.scalar().ok_or_else(|| cannot("scalar", ty))
}

fn apply_unary(op: UnaryOp, ty: Type, value: Scalar) -> Result<Scalar, BackendError> {
    let (_, width) = scalar_parts(ty)?;
    Ok(match (op, value) {
        (UnaryOp::Identity, v) => v,
        (UnaryOp::Neg, Scalar::Int(v)) => Scalar::Int(wrap_int(v.wrapping_neg(), width)),
        (UnaryOp::Neg, Scalar::Uns(v)) => Scalar::Uns(wrap_uns(v.wrapping_neg(), width)),
        (UnaryOp::Neg, Scalar::Fixed(v)) => Scalar::Fixed(-v),
        (UnaryOp::Neg, Scalar::Float(v)) => Scalar::Float(-v),
        (UnaryOp::BitNot, Scalar::Int(v)) => Scalar::Int(wrap_int(!v, width)),
        (UnaryOp::BitNot, Scalar::Uns(v)) => Scalar::Uns(wrap_uns(!v, width)),
        (UnaryOp::BitNot, Scalar::Fixed(v)) => {
            Scalar::Fixed(raw_to_fixed(!fixed_to_raw(v, width), width))
        }
        (UnaryOp::BitNot, Scalar::Float(_)) => return Err(cannot("bitwise", ty)),
        (UnaryOp::LogNot, _) => return Err(cannot("logical not", ty)),
    })
}

fn apply_binary(op: BinaryOp, ty: Type, a: Scalar, b: Scalar) -> Result<Scalar, BackendError> {
    let (_, width) = scalar_parts(ty)?;
    let div_zero = || BackendError::DivisionByZero(SourcePos::default());
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => {
            let result = (op.int_fn())(x, y).ok_or_else(div_zero)?;
            Ok(Scalar::Int(wrap_int(result, width)))
        }
        (Scalar::Uns(x), Scalar::Uns(y)) => {
            let result = match op {
                BinaryOp::Div => x.checked_div(y).ok_or_else(div_zero)?,
                BinaryOp::Mod => x.checked_rem(y).ok_or_else(div_zero)?,
                BinaryOp::Shr => x.wrapping_shr((y & 0x7F) as u32),
                _ => (op.int_fn())(x as i128, y as i128).ok_or_else(div_zero)? as u128,
            };
            Ok(Scalar::Uns(wrap_uns(result, width)))
        }
        (Scalar::Fixed(x), Scalar::Fixed(y)) => {
            if op.is_bitwise() {
                let raw_y = match op {
                    BinaryOp::Shl | BinaryOp::Shr => y.trunc() as i128,
                    _ => fixed_to_raw(y, width),
                };
                let raw = (op.int_fn())(fixed_to_raw(x, width), raw_y).ok_or_else(div_zero)?;
                return Ok(Scalar::Fixed(raw_to_fixed(raw, width)));
            }
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) && y == 0.0 {
                return Err(div_zero());
            }
            let f = op.float_fn().ok_or_else(|| cannot("fixed", ty))?;
            Ok(Scalar::Fixed(f(x, y)))
        }
        (Scalar::Float(x), Scalar::Float(y)) => {
            let f = op.float_fn().ok_or_else(|| cannot("bitwise", ty))?;
            Ok(Scalar::Float(f(x, y)))
        }
        _ => Err(cannot("mixed operands", ty)),
    }
}

fn compare(a: Scalar, b: Scalar) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => Some(x.cmp(&y)),
        (Scalar::Uns(x), Scalar::Uns(y)) => Some(x.cmp(&y)),
        (Scalar::Int(x), Scalar::Uns(y)) => Some(x.cmp(&(y as i128))),
        (Scalar::Uns(x), Scalar::Int(y)) => Some((x as i128).cmp(&y)),
        (Scalar::Fixed(x), Scalar::Fixed(y)) | (Scalar::Float(x), Scalar::Float(y)) => {
            x.partial_cmp(&y)
        }
        _ => None,
    }
}

/// Value conversion performed by cast nodes
fn convert(value: Scalar, to: Type) -> Result<Scalar, BackendError> {
    let (kind, width) = scalar_parts(to)?;
    Ok(match (value, kind) {
        (Scalar::Fixed(v) | Scalar::Float(v), ScalarKind::Int) => {
            Scalar::Int(wrap_int(v.trunc() as i128, width))
        }
        (Scalar::Fixed(v) | Scalar::Float(v), ScalarKind::Uns) => {
            Scalar::Uns(wrap_uns(v.trunc() as i128 as u128, width))
        }
        (Scalar::Fixed(v) | Scalar::Float(v), ScalarKind::Fixed) => Scalar::Fixed(v),
        (Scalar::Fixed(v) | Scalar::Float(v), ScalarKind::Float) => Scalar::Float(v),
        (Scalar::Int(v), ScalarKind::Fixed) => Scalar::Fixed(v as f64),
        (Scalar::Int(v), ScalarKind::Float) => Scalar::Float(v as f64),
        (Scalar::Uns(v), ScalarKind::Fixed) => Scalar::Fixed(v as f64),
        (Scalar::Uns(v), ScalarKind::Float) => Scalar::Float(v as f64),
        (Scalar::Int(v), ScalarKind::Int) => Scalar::Int(wrap_int(v, width)),
        (Scalar::Uns(v), ScalarKind::Int) => Scalar::Int(wrap_int(v as i128, width)),
        (Scalar::Int(v), ScalarKind::Uns) => Scalar::Uns(wrap_uns(v as u128, width)),
        (Scalar::Uns(v), ScalarKind::Uns) => Scalar::Uns(wrap_uns(v, width)),
    })
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
