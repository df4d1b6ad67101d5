// Compilation context
//
// Bundles everything a compilation unit owns: the expression arena, the symbol
// table, storage tables, script/function records, strings, library imports and
// the instruction sequence. Front ends fill it through the declare/emit methods;
// the backend passes consume a clone of it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::backend::config::BackendConfig;
use crate::backend::error::{BackendError, SourcePos};
use crate::backend::expr::{ExprArena, ExprId};
use crate::backend::opcodes::Opcode;
use crate::backend::resolve::Resolver;
use crate::backend::storage::{
    merge_rule, Domain, Linkage, Merge, Scope, Storage, StorageRecord, TableKey,
};
use crate::backend::strings::StringTable;
use crate::backend::symbols::SymbolTable;
use crate::backend::types::Type;

/// One emitted operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub args: Vec<ExprId>,
    pub labels: Vec<String>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub name: String,
    /// Explicit or allocated number; negative for name-addressed scripts
    pub number: Option<i32>,
    pub named: bool,
    pub kind: u16,
    pub flags: u16,
    pub params: u32,
    /// Label of the first instruction
    pub entry: String,
    pub external: bool,
    pub pos: SourcePos,
}

impl ScriptRecord {
    pub fn new(name: &str, entry: &str) -> Self {
        ScriptRecord {
            name: name.to_string(),
            number: None,
            named: false,
            kind: 0,
            flags: 0,
            params: 0,
            entry: entry.to_string(),
            external: false,
            pos: SourcePos::default(),
        }
    }

    pub fn numbered(mut self, number: i32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn by_name(mut self) -> Self {
        self.named = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub index: Option<u32>,
    pub params: u32,
    pub returns: bool,
    pub linkage: Linkage,
    pub entry: String,
    pub external: bool,
    pub pos: SourcePos,
}

impl FunctionRecord {
    pub fn new(name: &str, entry: &str) -> Self {
        FunctionRecord {
            name: name.to_string(),
            index: None,
            params: 0,
            returns: false,
            linkage: Linkage::Internal,
            entry: entry.to_string(),
            external: false,
            pos: SourcePos::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub exprs: ExprArena,
    pub symbols: SymbolTable,
    pub storage: Storage,
    pub scripts: IndexMap<String, ScriptRecord>,
    pub functions: IndexMap<String, FunctionRecord>,
    pub strings: StringTable,
    pub imports: Vec<String>,
    pub code: Vec<Instruction>,
    /// Labels waiting for the next instruction (or the end of code)
    pub pending_labels: Vec<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty context honouring the string settings of `config`
    pub fn configured(config: &BackendConfig) -> Self {
        let mut ctx = Self::default();
        ctx.set_string_dedup(config.dedup_strings);
        ctx
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.exprs, &self.symbols)
    }

    pub fn set_string_dedup(&mut self, dedup: bool) {
        self.strings.set_dedup(dedup);
    }

    /// Declare a storage record; its name becomes an `uns32` symbol bound at allocation
    ///
    /// Frame locals and array variables are bound as `owner::name`, see
    /// [`TableKey::symbol_name`].
    pub fn declare_storage(
        &mut self,
        key: TableKey,
        record: StorageRecord,
    ) -> Result<Merge, BackendError> {
        let pos = record.pos.clone();
        self.symbols
            .declare(&key.symbol_name(&record.name), Type::UNS32)
            .map_err(|e| e.at(&pos))?;
        self.storage.declare(key, record).map_err(|e| e.at(&pos))
    }

    pub fn declare_register(
        &mut self,
        scope: Scope,
        record: StorageRecord,
    ) -> Result<Merge, BackendError> {
        self.declare_storage(TableKey::new(Domain::Register, scope), record)
    }

    pub fn declare_array(&mut self, scope: Scope, record: StorageRecord) -> Result<Merge, BackendError> {
        self.declare_storage(TableKey::new(Domain::Array, scope), record)
    }

    /// Variable stored inside the addressable array `array`
    pub fn declare_array_variable(
        &mut self,
        scope: Scope,
        array: &str,
        record: StorageRecord,
    ) -> Result<Merge, BackendError> {
        self.declare_storage(TableKey::owned(Domain::ArrayVariable, scope, array), record)
    }

    pub fn declare_static(&mut self, record: StorageRecord) -> Result<Merge, BackendError> {
        self.declare_storage(TableKey::new(Domain::Static, Scope::Map), record)
    }

    /// Frame-local of a function or script, referenced as `owner::name`
    pub fn declare_auto(&mut self, owner: &str, record: StorageRecord) -> Result<Merge, BackendError> {
        self.declare_storage(TableKey::owned(Domain::Auto, Scope::Local, owner), record)
    }

    /// Reference to a named storage record, function, string, or label
    pub fn address_of(&mut self, name: &str) -> ExprId {
        self.exprs.symbol(name, Type::UNS32)
    }

    /// Reference to a frame-local declared with [`Context::declare_auto`]
    pub fn local_of(&mut self, owner: &str, name: &str) -> ExprId {
        let key = TableKey::owned(Domain::Auto, Scope::Local, owner);
        self.exprs.symbol(&key.symbol_name(name), Type::UNS32)
    }

    /// Add a string literal and return the reference code should use
    pub fn string_ref(&mut self, value: &str) -> Result<ExprId, BackendError> {
        let name = self.strings.add_auto(value);
        self.symbols.declare(&name, Type::UNS32)?;
        Ok(self.exprs.symbol(&name, Type::UNS32))
    }

    pub fn add_named_string(&mut self, name: &str, value: &str) -> Result<(), BackendError> {
        self.strings.add_named(name, value)?;
        self.symbols.declare(name, Type::UNS32)
    }

    pub fn add_script(&mut self, script: ScriptRecord) -> Result<Merge, BackendError> {
        let pos = script.pos.clone();
        self.symbols
            .declare(&script.name, Type::INT32)
            .map_err(|e| e.at(&pos))?;
        self.symbols
            .declare(&script.entry, Type::UNS32)
            .map_err(|e| e.at(&pos))?;

        let Some(existing) = self.scripts.get_mut(&script.name) else {
            log::debug!("script '{}' declared", script.name);
            self.scripts.insert(script.name.clone(), script);
            return Ok(Merge::Inserted);
        };
        let outcome = merge_rule(&script.name, existing.external, script.external, &pos)?;
        match outcome {
            Merge::Merged => {
                if existing.number.is_none() {
                    existing.number = script.number;
                }
            }
            Merge::Defined => *existing = script,
            Merge::Ignored | Merge::Inserted => {}
        }
        Ok(outcome)
    }

    pub fn add_function(&mut self, function: FunctionRecord) -> Result<Merge, BackendError> {
        let pos = function.pos.clone();
        self.symbols
            .declare(&function.name, Type::UNS32)
            .map_err(|e| e.at(&pos))?;
        if !function.external {
            self.symbols
                .declare(&function.entry, Type::UNS32)
                .map_err(|e| e.at(&pos))?;
        }

        let Some(existing) = self.functions.get_mut(&function.name) else {
            log::debug!("function '{}' declared", function.name);
            self.functions.insert(function.name.clone(), function);
            return Ok(Merge::Inserted);
        };
        let outcome = merge_rule(&function.name, existing.external, function.external, &pos)?;
        match outcome {
            Merge::Merged => {
                if existing.index.is_none() {
                    existing.index = function.index;
                }
            }
            Merge::Defined => *existing = function,
            Merge::Ignored | Merge::Inserted => {}
        }
        Ok(outcome)
    }

    pub fn add_import(&mut self, library: &str) {
        if !self.imports.iter().any(|lib| lib == library) {
            self.imports.push(library.to_string());
        }
    }

    /// Bind a named constant to an expression
    pub fn define_constant(&mut self, name: &str, expr: ExprId) -> Result<(), BackendError> {
        let ty = self.exprs.ty(expr)?;
        self.symbols.define(name, ty, expr)
    }

    /// Attach `name` to the next emitted instruction
    pub fn label(&mut self, name: &str) -> Result<(), BackendError> {
        self.symbols.declare(name, Type::UNS32)?;
        self.pending_labels.push(name.to_string());
        Ok(())
    }

    pub fn emit(
        &mut self,
        opcode: Opcode,
        args: Vec<ExprId>,
        pos: SourcePos,
    ) -> Result<(), BackendError> {
        if args.len() != opcode.arity() {
            return Err(BackendError::ArityMismatch(
                opcode.name().to_string(),
                opcode.arity(),
                args.len(),
                pos,
            ));
        }
        for &arg in &args {
            self.exprs.get(arg).map_err(|e| e.at(&pos))?;
        }
        let labels = std::mem::take(&mut self.pending_labels);
        self.code.push(Instruction {
            opcode,
            args,
            labels,
            pos,
        });
        Ok(())
    }

    /// Emit by opcode name, for front ends that work from mnemonics
    pub fn emit_named(
        &mut self,
        name: &str,
        args: Vec<ExprId>,
        pos: SourcePos,
    ) -> Result<(), BackendError> {
        let opcode = Opcode::from_name(name)
            .ok_or_else(|| BackendError::UnknownOpcode(name.to_string(), pos.clone()))?;
        self.emit(opcode, args, pos)
    }

    /// Frame size of a function or script: parameters plus allocated locals
    pub fn frame_size(&self, owner: &str, params: u32) -> u32 {
        let key = TableKey::owned(Domain::Auto, Scope::Local, owner);
        let extent = self
            .storage
            .table(&key)
            .map(|table| table.extent())
            .unwrap_or(0);
        (extent.max(0) as u32).max(params)
    }

    /// Scripts with a body in this unit
    pub fn defined_scripts(&self) -> impl Iterator<Item = &ScriptRecord> {
        self.scripts.values().filter(|s| !s.external)
    }
}
