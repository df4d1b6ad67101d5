// Storage records and tables
//
// One table per (domain, scope, owner). Records are created on first declaration
// and merged on redeclaration; addresses are assigned later by allocate.rs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::error::{BackendError, SourcePos};
use crate::backend::expr::ExprId;

/// Address of a record that has not been allocated yet
pub const UNASSIGNED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    Internal,
    ExternAcs,
    ExternC,
    ExternCpp,
    ExternDs,
}

impl Linkage {
    pub fn is_external(self) -> bool {
        self != Linkage::Internal
    }

    pub fn code(self) -> u32 {
        match self {
            Linkage::Internal => 0,
            Linkage::ExternAcs => 1,
            Linkage::ExternC => 2,
            Linkage::ExternCpp => 3,
            Linkage::ExternDs => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Register,
    Array,
    ArrayVariable,
    Static,
    Auto,
}

impl Domain {
    pub fn code(self) -> u32 {
        match self {
            Domain::Register => 0,
            Domain::Array => 1,
            Domain::ArrayVariable => 2,
            Domain::Static => 3,
            Domain::Auto => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Map,
    World,
    Global,
    Local,
}

impl Scope {
    pub fn code(self) -> u32 {
        match self {
            Scope::Map => 0,
            Scope::World => 1,
            Scope::Global => 2,
            Scope::Local => 3,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scope::Map => write!(f, "map"),
            Scope::World => write!(f, "world"),
            Scope::Global => write!(f, "global"),
            Scope::Local => write!(f, "local"),
        }
    }
}

/// Identifies one allocation table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub domain: Domain,
    pub scope: Scope,
    /// Function/script for `Auto`, array for `ArrayVariable`, empty otherwise
    pub owner: String,
}

impl TableKey {
    pub fn new(domain: Domain, scope: Scope) -> Self {
        TableKey {
            domain,
            scope,
            owner: String::new(),
        }
    }

    pub fn owned(domain: Domain, scope: Scope, owner: &str) -> Self {
        TableKey {
            domain,
            scope,
            owner: owner.to_string(),
        }
    }

    /// Symbol a record of this table is bound under: frame locals and array
    /// variables live in their owner's name space (`owner::name`)
    pub fn symbol_name(&self, name: &str) -> String {
        match self.domain {
            Domain::Auto | Domain::ArrayVariable => format!("{}::{}", self.owner, name),
            _ => name.to_string(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.owner.is_empty() {
            write!(f, "{} {:?}", self.scope, self.domain)
        } else {
            write!(f, "{} {:?} of {}", self.scope, self.domain, self.owner)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub name: String,
    pub address: i64,
    pub size: u32,
    pub linkage: Linkage,
    /// Forward reference waiting for a definition elsewhere
    pub external: bool,
    pub init: Option<ExprId>,
    pub pos: SourcePos,
}

impl StorageRecord {
    pub fn new(name: &str, size: u32) -> Self {
        StorageRecord {
            name: name.to_string(),
            address: UNASSIGNED,
            size,
            linkage: Linkage::Internal,
            external: false,
            init: None,
            pos: SourcePos::default(),
        }
    }

    pub fn at(mut self, address: u32) -> Self {
        self.address = address as i64;
        self
    }

    pub fn extern_decl(mut self) -> Self {
        self.external = true;
        self
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn with_init(mut self, init: ExprId) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_pos(mut self, pos: SourcePos) -> Self {
        self.pos = pos;
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.address >= 0
    }

    /// Half-open address range; zero-sized records still occupy one slot
    pub fn range(&self) -> (i64, i64) {
        (self.address, self.address + self.size.max(1) as i64)
    }
}

/// Outcome of merging a redeclaration into an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Inserted,
    Merged,
    Defined,
    Ignored,
}

/// Apply the redeclaration rules shared by every record kind
///
/// extern → extern fills unset fields, extern → concrete overwrites, concrete →
/// extern is ignored and concrete → concrete is an error.
pub fn merge_rule(
    name: &str,
    existing_external: bool,
    new_external: bool,
    pos: &SourcePos,
) -> Result<Merge, BackendError> {
    match (existing_external, new_external) {
        (true, true) => Ok(Merge::Merged),
        (true, false) => Ok(Merge::Defined),
        (false, true) => Ok(Merge::Ignored),
        (false, false) => Err(BackendError::BadDeclaration(
            format!("'{}' is already defined", name),
            pos.clone(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTable {
    pub key: TableKey,
    records: IndexMap<String, StorageRecord>,
}

impl StorageTable {
    pub fn new(key: TableKey) -> Self {
        StorageTable {
            key,
            records: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StorageRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StorageRecord> {
        self.records.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageRecord> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StorageRecord> {
        self.records.values_mut()
    }

    pub fn declare(&mut self, record: StorageRecord) -> Result<Merge, BackendError> {
        let Some(existing) = self.records.get_mut(&record.name) else {
            log::debug!("{}: declare '{}' size {}", self.key, record.name, record.size);
            self.records.insert(record.name.clone(), record);
            return Ok(Merge::Inserted);
        };

        let outcome = merge_rule(&record.name, existing.external, record.external, &record.pos)?;
        match outcome {
            Merge::Merged => {
                if existing.address == UNASSIGNED {
                    existing.address = record.address;
                }
                if existing.size == 0 {
                    existing.size = record.size;
                }
                if existing.init.is_none() {
                    existing.init = record.init;
                }
            }
            Merge::Defined => {
                if record.address != UNASSIGNED {
                    existing.address = record.address;
                }
                existing.size = record.size;
                existing.init = record.init;
                existing.linkage = record.linkage;
                existing.pos = record.pos;
                existing.external = false;
            }
            Merge::Ignored | Merge::Inserted => {}
        }
        log::debug!("{}: redeclare '{}' -> {:?}", self.key, existing.name, outcome);
        Ok(outcome)
    }

    /// Address one past the highest assigned record
    pub fn extent(&self) -> i64 {
        self.records
            .values()
            .filter(|r| r.is_assigned())
            .map(|r| r.range().1)
            .max()
            .unwrap_or(0)
    }
}

/// All storage tables of a compilation unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    tables: IndexMap<TableKey, StorageTable>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, key: TableKey, record: StorageRecord) -> Result<Merge, BackendError> {
        self.table_mut(key).declare(record)
    }

    pub fn table(&self, key: &TableKey) -> Option<&StorageTable> {
        self.tables.get(key)
    }

    pub fn table_mut(&mut self, key: TableKey) -> &mut StorageTable {
        self.tables
            .entry(key.clone())
            .or_insert_with(|| StorageTable::new(key))
    }

    pub fn tables(&self) -> impl Iterator<Item = &StorageTable> {
        self.tables.values()
    }

    pub fn keys(&self) -> Vec<TableKey> {
        self.tables.keys().cloned().collect()
    }

    /// Keys of `domain` tables, in declaration order
    pub fn keys_of(&self, domain: Domain) -> Vec<TableKey> {
        self.tables
            .keys()
            .filter(|k| k.domain == domain)
            .cloned()
            .collect()
    }

    pub fn records(&self, key: &TableKey) -> impl Iterator<Item = &StorageRecord> {
        self.tables.get(key).into_iter().flat_map(|t| t.iter())
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
