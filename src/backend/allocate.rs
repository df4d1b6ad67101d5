// Storage allocation
//
// Assigns final numbers to every record that does not have one yet and injects
// the results into the symbol table as constants. Order matters: registers first,
// then array variables (which size their arrays), arrays (map arrays share the
// map register index space), static memory, frame locals, functions, scripts and
// finally strings.

use indexmap::IndexSet;

use crate::backend::config::BackendConfig;
use crate::backend::error::{BackendError, SourcePos};
use crate::backend::expr::Literal;
use crate::backend::program::Context;
use crate::backend::storage::{Domain, Scope, StorageTable, TableKey, UNASSIGNED};
use crate::backend::types::{Type, Width};

/// How string symbols are numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringAddressing {
    /// Position in the string directory
    Index,
    /// Byte offset of the packed string in a word-aligned data region
    ByteAddress,
}

fn overlaps(a: (i64, i64), b: (i64, i64)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// First-fit placement of every unassigned record in `table`
///
/// `occupied` holds ranges owned by something outside the table (reserved
/// indices, or registers sharing the index space).
pub fn allocate_table(
    table: &mut StorageTable,
    floor: i64,
    occupied: &[(i64, i64)],
) -> Result<(), BackendError> {
    let pending: Vec<String> = table
        .iter()
        .filter(|r| r.address == UNASSIGNED)
        .map(|r| r.name.clone())
        .collect();

    for name in pending {
        let size = table.get(&name).map(|r| r.size.max(1) as i64).unwrap_or(1);
        let mut candidate = floor;
        'scan: loop {
            let wanted = (candidate, candidate + size);
            for other in table.iter().filter(|r| r.is_assigned()) {
                if overlaps(wanted, other.range()) {
                    candidate = other.range().1;
                    continue 'scan;
                }
            }
            for &range in occupied {
                if overlaps(wanted, range) {
                    candidate = range.1;
                    continue 'scan;
                }
            }
            break;
        }

        if let Some(record) = table.get_mut(&name) {
            record.address = candidate;
        }
        log::debug!("{}: '{}' -> {} (size {})", table.key, name, candidate, size);
    }
    Ok(())
}

/// Check that no two assigned records overlap each other or an occupied range
pub fn verify_table(table: &StorageTable, occupied: &[(i64, i64)]) -> Result<(), BackendError> {
    let assigned: Vec<_> = table.iter().filter(|r| r.is_assigned()).collect();
    for (i, a) in assigned.iter().enumerate() {
        for b in &assigned[i + 1..] {
            if overlaps(a.range(), b.range()) {
                return Err(BackendError::AllocationConflict(format!(
                    "{}: '{}' [{}, {}) overlaps '{}' [{}, {})",
                    table.key,
                    a.name,
                    a.range().0,
                    a.range().1,
                    b.name,
                    b.range().0,
                    b.range().1
                )));
            }
        }
        for &range in occupied {
            if overlaps(a.range(), range) {
                return Err(BackendError::AllocationConflict(format!(
                    "{}: '{}' overlaps reserved range [{}, {})",
                    table.key, a.name, range.0, range.1
                )));
            }
        }
    }
    Ok(())
}

fn reserved(index: Option<u32>) -> Vec<(i64, i64)> {
    index
        .map(|i| vec![(i as i64, i as i64 + 1)])
        .unwrap_or_default()
}

/// Run every allocation pass over `ctx`
pub fn allocate(
    ctx: &mut Context,
    config: &BackendConfig,
    strings: StringAddressing,
) -> Result<(), BackendError> {
    log::info!("Allocating storage");

    allocate_registers(ctx, config)?;
    allocate_array_variables(ctx)?;
    allocate_arrays(ctx, config)?;
    allocate_statics(ctx, config)?;
    allocate_autos(ctx)?;
    inject_storage(ctx)?;
    allocate_functions(ctx)?;
    allocate_scripts(ctx, config)?;
    allocate_strings(ctx, strings)?;

    log::info!(
        "Allocation complete: {} tables, {} functions, {} scripts, {} strings",
        ctx.storage.keys().len(),
        ctx.functions.len(),
        ctx.scripts.len(),
        ctx.strings.len()
    );
    Ok(())
}

fn allocate_registers(ctx: &mut Context, config: &BackendConfig) -> Result<(), BackendError> {
    for key in ctx.storage.keys_of(Domain::Register) {
        let occupied = match key.scope {
            Scope::World => reserved(config.stack_pointer_index),
            _ => Vec::new(),
        };
        let table = ctx.storage.table_mut(key);
        allocate_table(table, 0, &occupied)?;
        verify_table(table, &occupied)?;
    }
    Ok(())
}

fn allocate_array_variables(ctx: &mut Context) -> Result<(), BackendError> {
    for key in ctx.storage.keys_of(Domain::ArrayVariable) {
        let table = ctx.storage.table_mut(key.clone());
        allocate_table(table, 0, &[])?;
        verify_table(table, &[])?;
        let extent = table.extent();

        let array_key = TableKey::new(Domain::Array, key.scope);
        let array = ctx
            .storage
            .table_mut(array_key)
            .get_mut(&key.owner)
            .ok_or_else(|| {
                BackendError::BadDeclaration(
                    format!("variables placed in undeclared array '{}'", key.owner),
                    SourcePos::default(),
                )
            })?;
        if array.size == 0 {
            array.size = extent as u32;
            log::debug!("array '{}' sized to {} by its variables", array.name, extent);
        } else if (array.size as i64) < extent {
            return Err(BackendError::BadDeclaration(
                format!(
                    "array '{}' has size {} but its variables need {}",
                    array.name, array.size, extent
                ),
                array.pos.clone(),
            ));
        }
    }
    Ok(())
}

fn allocate_arrays(ctx: &mut Context, config: &BackendConfig) -> Result<(), BackendError> {
    for key in ctx.storage.keys_of(Domain::Array) {
        let occupied: Vec<(i64, i64)> = match key.scope {
            // map arrays are numbered in the map register space
            Scope::Map => ctx
                .storage
                .records(&TableKey::new(Domain::Register, Scope::Map))
                .filter(|r| r.is_assigned())
                .map(|r| r.range())
                .collect(),
            Scope::Global => reserved(config.addressable_array_index),
            _ => Vec::new(),
        };
        let table = ctx.storage.table_mut(key);
        // each array takes one index no matter how many elements it has
        let sizes: Vec<(String, u32)> = table.iter().map(|r| (r.name.clone(), r.size)).collect();
        for record in table.iter_mut() {
            record.size = 1;
        }
        let result = allocate_table(table, 0, &occupied).and_then(|_| verify_table(table, &occupied));
        for (name, size) in sizes {
            if let Some(record) = table.get_mut(&name) {
                record.size = size;
            }
        }
        result?;
    }
    Ok(())
}

fn allocate_statics(ctx: &mut Context, config: &BackendConfig) -> Result<(), BackendError> {
    for key in ctx.storage.keys_of(Domain::Static) {
        let table = ctx.storage.table_mut(key);
        allocate_table(table, config.static_floor as i64, &[])?;
        verify_table(table, &[])?;
    }
    Ok(())
}

fn allocate_autos(ctx: &mut Context) -> Result<(), BackendError> {
    for key in ctx.storage.keys_of(Domain::Auto) {
        let params = ctx
            .functions
            .get(&key.owner)
            .map(|f| f.params)
            .or_else(|| ctx.scripts.get(&key.owner).map(|s| s.params))
            .unwrap_or(0);
        let table = ctx.storage.table_mut(key);
        allocate_table(table, params as i64, &[])?;
        verify_table(table, &[])?;
    }
    Ok(())
}

fn bind_constant(
    ctx: &mut Context,
    name: &str,
    literal: Literal,
    pos: &SourcePos,
) -> Result<(), BackendError> {
    let ty = literal.ty();
    if ctx.symbols.is_bound(name) {
        return Err(BackendError::BadDeclaration(
            format!("'{}' is both a constant and allocated storage", name),
            pos.clone(),
        ));
    }
    let value = ctx.exprs.literal(literal);
    ctx.symbols.declare(name, ty).map_err(|e| e.at(pos))?;
    ctx.symbols.bind(name, value).map_err(|e| e.at(pos))
}

fn inject_storage(ctx: &mut Context) -> Result<(), BackendError> {
    let mut bindings = Vec::new();
    for table in ctx.storage.tables() {
        for record in table.iter() {
            if !record.is_assigned() {
                return Err(BackendError::AllocationConflict(format!(
                    "{}: '{}' left unassigned",
                    table.key, record.name
                )));
            }
            bindings.push((
                table.key.symbol_name(&record.name),
                record.address as u128,
                record.pos.clone(),
            ));
        }
    }
    for (name, address, pos) in bindings {
        bind_constant(ctx, &name, Literal::Uns(address, Width::W32), &pos)?;
    }
    Ok(())
}

fn allocate_functions(ctx: &mut Context) -> Result<(), BackendError> {
    let mut used: IndexSet<u32> = IndexSet::new();
    for function in ctx.functions.values() {
        if let Some(index) = function.index {
            if !used.insert(index) {
                return Err(BackendError::BadDeclaration(
                    format!("function index {} assigned twice", index),
                    function.pos.clone(),
                ));
            }
        }
    }

    let mut next = 0u32;
    for function in ctx.functions.values_mut() {
        if function.index.is_none() {
            while used.contains(&next) {
                next += 1;
            }
            used.insert(next);
            function.index = Some(next);
            log::debug!("function '{}' -> index {}", function.name, next);
        }
    }

    let bindings: Vec<_> = ctx
        .functions
        .values()
        .map(|f| (f.name.clone(), f.index.unwrap_or(0), f.pos.clone()))
        .collect();
    for (name, index, pos) in bindings {
        bind_constant(ctx, &name, Literal::Uns(index as u128, Width::W32), &pos)?;
    }
    Ok(())
}

/// Number scripts: numbered ones scan up from the configured start, name-addressed
/// ones count down from -1
pub fn allocate_scripts(ctx: &mut Context, config: &BackendConfig) -> Result<(), BackendError> {
    let mut used: IndexSet<i32> = IndexSet::new();
    for script in ctx.scripts.values() {
        if script.named && !config.allows_named_scripts() {
            return Err(BackendError::Unsupported(format!(
                "script '{}' is name-addressed but engine {} with these settings cannot load named scripts",
                script.name, config.engine
            )));
        }
        if let Some(number) = script.number {
            if !used.insert(number) {
                return Err(BackendError::BadDeclaration(
                    format!("script number {} used twice", number),
                    script.pos.clone(),
                ));
            }
        }
    }

    let mut next_numbered = config.script_number_start;
    let mut next_named = -1;
    for script in ctx.scripts.values_mut() {
        if script.number.is_some() {
            continue;
        }
        let number = if script.named {
            while used.contains(&next_named) {
                next_named -= 1;
            }
            next_named
        } else {
            while used.contains(&next_numbered) {
                next_numbered += 1;
            }
            next_numbered
        };
        used.insert(number);
        script.number = Some(number);
        log::debug!("script '{}' -> {}", script.name, number);
    }

    let bindings: Vec<_> = ctx
        .scripts
        .values()
        .map(|s| (s.name.clone(), s.number.unwrap_or(0), s.pos.clone()))
        .collect();
    for (name, number, pos) in bindings {
        bind_constant(ctx, &name, Literal::Int(number as i128, Width::W32), &pos)?;
    }
    Ok(())
}

/// Padded size of a string in a word-aligned data region, terminator included
pub fn packed_string_size(value: &str) -> usize {
    (value.len() + 1 + 3) & !3
}

fn allocate_strings(ctx: &mut Context, mode: StringAddressing) -> Result<(), BackendError> {
    let mut bindings = Vec::with_capacity(ctx.strings.len());
    let mut offset = 0usize;
    for (index, (name, value)) in ctx.strings.iter().enumerate() {
        let address = match mode {
            StringAddressing::Index => index,
            StringAddressing::ByteAddress => offset,
        };
        offset += packed_string_size(value);
        bindings.push((name.to_string(), address as u128));
    }
    for (name, address) in bindings {
        if !ctx.symbols.contains(&name) {
            ctx.symbols.declare(&name, Type::UNS32)?;
        }
        bind_constant(ctx, &name, Literal::Uns(address, Width::W32), &SourcePos::default())?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "allocate_tests.rs"]
mod tests;
