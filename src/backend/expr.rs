// Expression graph
//
// Nodes are immutable once pushed into the arena and are addressed by `ExprId`.
// Resolution never touches the arena; see resolve.rs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::error::BackendError;
use crate::backend::types::{ScalarKind, Type, Width};

/// Index of a node in the `ExprArena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Literal scalar values as written in the program
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Fixed(f64, Width),
    Float(f64, Width),
    Int(i128, Width),
    Uns(u128, Width),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match *self {
            Literal::Fixed(_, w) => Type::Scalar(ScalarKind::Fixed, w),
            Literal::Float(_, w) => Type::Scalar(ScalarKind::Float, w),
            Literal::Int(_, w) => Type::Scalar(ScalarKind::Int, w),
            Literal::Uns(_, w) => Type::Scalar(ScalarKind::Uns, w),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    BitNot,
    LogNot,
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuit logical operators; operands are tested as booleans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchOp {
    And,
    Or,
    Xor,
}

type IntFn = fn(i128, i128) -> Option<i128>;
type FloatFn = fn(f64, f64) -> f64;
type CmpFn = fn(std::cmp::Ordering) -> bool;

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    /// Integer evaluator; `None` means division by zero
    pub fn int_fn(self) -> IntFn {
        match self {
            BinaryOp::Add => |a, b| Some(a.wrapping_add(b)),
            BinaryOp::Sub => |a, b| Some(a.wrapping_sub(b)),
            BinaryOp::Mul => |a, b| Some(a.wrapping_mul(b)),
            BinaryOp::Div => |a, b| if b == 0 { None } else { Some(a.wrapping_div(b)) },
            BinaryOp::Mod => |a, b| if b == 0 { None } else { Some(a.wrapping_rem(b)) },
            BinaryOp::And => |a, b| Some(a & b),
            BinaryOp::Or => |a, b| Some(a | b),
            BinaryOp::Xor => |a, b| Some(a ^ b),
            BinaryOp::Shl => |a, b| Some(a.wrapping_shl((b & 0x7F) as u32)),
            BinaryOp::Shr => |a, b| Some(a.wrapping_shr((b & 0x7F) as u32)),
            // comparisons go through cmp_fn
            _ => |_, _| Some(0),
        }
    }

    /// Real-number evaluator for the arithmetic subset
    pub fn float_fn(self) -> Option<FloatFn> {
        match self {
            BinaryOp::Add => Some(|a, b| a + b),
            BinaryOp::Sub => Some(|a, b| a - b),
            BinaryOp::Mul => Some(|a, b| a * b),
            BinaryOp::Div => Some(|a, b| a / b),
            BinaryOp::Mod => Some(|a, b| a % b),
            _ => None,
        }
    }

    pub fn cmp_fn(self) -> Option<CmpFn> {
        use std::cmp::Ordering;
        match self {
            BinaryOp::Eq => Some(|o| o == Ordering::Equal),
            BinaryOp::Ne => Some(|o| o != Ordering::Equal),
            BinaryOp::Lt => Some(|o| o == Ordering::Less),
            BinaryOp::Le => Some(|o| o != Ordering::Greater),
            BinaryOp::Gt => Some(|o| o == Ordering::Greater),
            BinaryOp::Ge => Some(|o| o != Ordering::Less),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Value(Literal),
    Str(String),
    Symbol {
        name: String,
        ty: Type,
    },
    Unary {
        op: UnaryOp,
        ty: Type,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        ty: Type,
        lhs: ExprId,
        rhs: ExprId,
    },
    Branch {
        op: BranchOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Ternary {
        ty: Type,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
    },
    Cast {
        from: Type,
        to: Type,
        operand: ExprId,
    },
    /// One 32-bit word of the operand's binary encoding
    Part {
        part: u32,
        operand: ExprId,
    },
    Aggregate {
        members: Vec<(Option<String>, ExprId)>,
    },
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::Value(lit) => lit.ty(),
            Expr::Str(_) => Type::Str,
            Expr::Symbol { ty, .. } => *ty,
            Expr::Unary { ty, .. } => *ty,
            Expr::Binary { ty, .. } => *ty,
            Expr::Branch { .. } => Type::INT32,
            Expr::Ternary { ty, .. } => *ty,
            Expr::Cast { to, .. } => *to,
            Expr::Part { .. } => Type::UNS32,
            Expr::Aggregate { .. } => Type::Aggregate,
        }
    }
}

/// Append-only store of expression nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ExprId) -> Result<&Expr, BackendError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| BackendError::BadExpression(format!("dangling expression {}", id)))
    }

    pub fn ty(&self, id: ExprId) -> Result<Type, BackendError> {
        Ok(self.get(id)?.ty())
    }

    fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        log::trace!("expr {} = {:?}", id, expr);
        self.nodes.push(expr);
        id
    }

    fn check(&self, id: ExprId) -> Result<Type, BackendError> {
        self.ty(id)
    }

    pub fn literal(&mut self, lit: Literal) -> ExprId {
        self.push(Expr::Value(lit))
    }

    pub fn int(&mut self, value: i128) -> ExprId {
        self.literal(Literal::Int(value, Width::W32))
    }

    pub fn uns(&mut self, value: u128) -> ExprId {
        self.literal(Literal::Uns(value, Width::W32))
    }

    pub fn fixed(&mut self, value: f64) -> ExprId {
        self.literal(Literal::Fixed(value, Width::W32))
    }

    pub fn float(&mut self, value: f64, width: Width) -> ExprId {
        self.literal(Literal::Float(value, width))
    }

    pub fn string(&mut self, value: &str) -> ExprId {
        self.push(Expr::Str(value.to_string()))
    }

    pub fn symbol(&mut self, name: &str, ty: Type) -> ExprId {
        self.push(Expr::Symbol {
            name: name.to_string(),
            ty,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> Result<ExprId, BackendError> {
        let operand_ty = self.check(operand)?;
        let ty = match op {
            UnaryOp::LogNot => Type::INT32,
            _ => operand_ty,
        };
        if operand_ty.scalar().is_none() {
            return Err(BackendError::BadExpression(format!(
                "unary {:?} applied to {}",
                op, operand_ty
            )));
        }
        Ok(self.push(Expr::Unary { op, ty, operand }))
    }

    /// Arithmetic results take the left operand's type; comparisons yield int32.
    /// Operand types are not cross-checked here; a mismatch surfaces when the node
    /// is resolved.
    pub fn binary(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<ExprId, BackendError> {
        let lhs_ty = self.check(lhs)?;
        let rhs_ty = self.check(rhs)?;
        if lhs_ty.scalar().is_none() || rhs_ty.scalar().is_none() {
            return Err(BackendError::BadExpression(format!(
                "{} applied to {} and {}",
                op.name(),
                lhs_ty,
                rhs_ty
            )));
        }
        let ty = if op.is_comparison() { Type::INT32 } else { lhs_ty };
        Ok(self.push(Expr::Binary { op, ty, lhs, rhs }))
    }

    pub fn branch(&mut self, op: BranchOp, lhs: ExprId, rhs: ExprId) -> Result<ExprId, BackendError> {
        self.check(lhs)?;
        self.check(rhs)?;
        Ok(self.push(Expr::Branch { op, lhs, rhs }))
    }

    pub fn ternary(
        &mut self,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
    ) -> Result<ExprId, BackendError> {
        self.check(cond)?;
        let ty = self.check(then)?;
        self.check(otherwise)?;
        Ok(self.push(Expr::Ternary {
            ty,
            cond,
            then,
            otherwise,
        }))
    }

    pub fn cast(&mut self, to: Type, operand: ExprId) -> Result<ExprId, BackendError> {
        let from = self.check(operand)?;
        if from.scalar().is_none() || to.scalar().is_none() {
            return Err(BackendError::BadExpression(format!(
                "cast from {} to {}",
                from, to
            )));
        }
        Ok(self.push(Expr::Cast { from, to, operand }))
    }

    pub fn part(&mut self, operand: ExprId, part: u32) -> Result<ExprId, BackendError> {
        let ty = self.check(operand)?;
        if let Some(words) = ty.scalar_words() {
            if part as usize >= words {
                return Err(BackendError::BadExpression(format!(
                    "word {} of {} (has {} words)",
                    part, ty, words
                )));
            }
        }
        Ok(self.push(Expr::Part { part, operand }))
    }

    pub fn aggregate(
        &mut self,
        members: Vec<(Option<String>, ExprId)>,
    ) -> Result<ExprId, BackendError> {
        for (_, member) in &members {
            self.check(*member)?;
        }
        Ok(self.push(Expr::Aggregate { members }))
    }

    /// Aggregate of unnamed members, as used for array initializers
    pub fn array(&mut self, members: &[ExprId]) -> Result<ExprId, BackendError> {
        self.aggregate(members.iter().map(|&id| (None, id)).collect())
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
