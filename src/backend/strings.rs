// String table
//
// String literals become named entries; code refers to them through a symbol
// whose value is assigned during allocation. Auto-named entries are deduplicated
// by value when enabled.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::backend::error::{BackendError, SourcePos};

const AUTO_PREFIX: &str = "__str";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringTable {
    entries: IndexMap<String, String>, // name -> value
    by_value: IndexMap<String, String>, // value -> first auto name
    dedup: bool,
    next_auto: u32,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    pub fn new() -> Self {
        StringTable {
            entries: IndexMap::new(),
            by_value: IndexMap::new(),
            dedup: true,
            next_auto: 0,
        }
    }

    pub fn set_dedup(&mut self, dedup: bool) {
        self.dedup = dedup;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `value` under a generated name, reusing an existing entry with the same value
    pub fn add_auto(&mut self, value: &str) -> String {
        if self.dedup {
            if let Some(name) = self.by_value.get(value) {
                log::trace!("string {:?} reuses {}", value, name);
                return name.clone();
            }
        }
        let mut name = format!("{}{}", AUTO_PREFIX, self.next_auto);
        while self.entries.contains_key(&name) {
            self.next_auto += 1;
            name = format!("{}{}", AUTO_PREFIX, self.next_auto);
        }
        self.next_auto += 1;
        self.entries.insert(name.clone(), value.to_string());
        self.by_value
            .entry(value.to_string())
            .or_insert_with(|| name.clone());
        log::debug!("string {} = {:?}", name, value);
        name
    }

    pub fn add_named(&mut self, name: &str, value: &str) -> Result<(), BackendError> {
        if let Some(existing) = self.entries.get(name) {
            if existing != value {
                return Err(BackendError::BadDeclaration(
                    format!("string '{}' already defined", name),
                    SourcePos::default(),
                ));
            }
            return Ok(());
        }
        self.entries.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }

    /// Position of `name` in the emitted string directory
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
