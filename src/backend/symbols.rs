// Symbol table
//
// Maps names to a declared type and, once known, the expression defining them.
// A declared type never changes and a binding happens at most once.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::backend::error::{BackendError, SourcePos};
use crate::backend::expr::ExprId;
use crate::backend::types::Type;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub ty: Type,
    pub expr: Option<ExprId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    entries: IndexMap<String, SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|entry| entry.expr.is_some())
            .unwrap_or(false)
    }

    /// Declare `name` with `ty`; redeclaring with the same type is a no-op
    pub fn declare(&mut self, name: &str, ty: Type) -> Result<(), BackendError> {
        match self.entries.get(name) {
            Some(entry) if entry.ty != ty => Err(BackendError::BadDeclaration(
                format!(
                    "symbol '{}' redeclared as {} (was {})",
                    name, ty, entry.ty
                ),
                SourcePos::default(),
            )),
            Some(_) => Ok(()),
            None => {
                self.entries
                    .insert(name.to_string(), SymbolEntry { ty, expr: None });
                Ok(())
            }
        }
    }

    /// Bind a declared symbol to its defining expression
    pub fn bind(&mut self, name: &str, expr: ExprId) -> Result<(), BackendError> {
        let entry = self.entries.get_mut(name).ok_or_else(|| {
            BackendError::UnknownSymbol(name.to_string(), SourcePos::default())
        })?;
        if let Some(existing) = entry.expr {
            return Err(BackendError::BadDeclaration(
                format!("symbol '{}' already defined as {}", name, existing),
                SourcePos::default(),
            ));
        }
        log::trace!("bind {} -> {}", name, expr);
        entry.expr = Some(expr);
        Ok(())
    }

    /// Declare and bind in one step
    pub fn define(&mut self, name: &str, ty: Type, expr: ExprId) -> Result<(), BackendError> {
        self.declare(name, ty)?;
        self.bind(name, expr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SymbolEntry)> {
        self.entries.iter()
    }

    /// Names declared but still waiting for a definition
    pub fn unbound(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.expr.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{ScalarKind, Width};

    #[test]
    fn test_declared_type_never_changes() {
        let mut table = SymbolTable::new();
        table.declare("x", Type::INT32).unwrap();
        assert!(table.declare("x", Type::INT32).is_ok());
        assert!(table
            .declare("x", Type::Scalar(ScalarKind::Int, Width::W64))
            .is_err());
    }

    #[test]
    fn test_bind_happens_once() {
        let mut table = SymbolTable::new();
        table.declare("x", Type::INT32).unwrap();
        assert_eq!(table.unbound(), vec!["x"]);

        table.bind("x", ExprId(0)).unwrap();
        assert!(table.is_bound("x"));
        assert!(table.unbound().is_empty());
        assert!(matches!(
            table.bind("x", ExprId(1)),
            Err(BackendError::BadDeclaration(..))
        ));
        assert!(matches!(
            table.bind("y", ExprId(1)),
            Err(BackendError::UnknownSymbol(..))
        ));
    }
}
