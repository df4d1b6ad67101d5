//! Allocation passes over small compilation units

use super::*;
use crate::backend::program::{FunctionRecord, ScriptRecord};
use crate::backend::storage::StorageRecord;
use crate::backend::Engine;
use test_log::test;

fn address(ctx: &mut Context, name: &str) -> u128 {
    let id = ctx.address_of(name);
    ctx.resolver().resolve_uns(id).unwrap()
}

fn script_number(ctx: &mut Context, name: &str) -> i128 {
    let id = ctx.exprs.symbol(name, Type::INT32);
    ctx.resolver().resolve_int(id).unwrap()
}

fn array_size(ctx: &Context, scope: Scope, name: &str) -> u32 {
    ctx.storage
        .table(&TableKey::new(Domain::Array, scope))
        .and_then(|t| t.get(name))
        .map(|r| r.size)
        .unwrap()
}

#[cfg(test)]
mod register_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_first_fit_in_declaration_order() {
        let mut ctx = Context::new();
        ctx.declare_register(Scope::Map, StorageRecord::new("small", 1))
            .unwrap();
        ctx.declare_register(Scope::Map, StorageRecord::new("large", 3))
            .unwrap();
        ctx.declare_register(Scope::Map, StorageRecord::new("next", 1))
            .unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "small"), 0);
        assert_eq!(address(&mut ctx, "large"), 1);
        assert_eq!(address(&mut ctx, "next"), 4);
    }

    #[test]
    fn test_fills_gap_left_by_explicit_address() {
        let mut ctx = Context::new();
        ctx.declare_register(Scope::Map, StorageRecord::new("fixed", 1).at(2))
            .unwrap();
        ctx.declare_register(Scope::Map, StorageRecord::new("pair", 2))
            .unwrap();
        ctx.declare_register(Scope::Map, StorageRecord::new("single", 1))
            .unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "pair"), 0);
        assert_eq!(address(&mut ctx, "single"), 3);
    }

    #[test]
    fn test_world_registers_skip_stack_pointer() {
        let mut ctx = Context::new();
        ctx.declare_register(Scope::World, StorageRecord::new("w", 1))
            .unwrap();
        let config = BackendConfig {
            stack_pointer_index: Some(0),
            ..BackendConfig::default()
        };

        allocate(&mut ctx, &config, StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "w"), 1);
    }

    #[test]
    fn test_explicit_overlap_is_a_conflict() {
        let mut ctx = Context::new();
        ctx.declare_register(Scope::Map, StorageRecord::new("a", 2).at(0))
            .unwrap();
        ctx.declare_register(Scope::Map, StorageRecord::new("b", 1).at(1))
            .unwrap();

        let err = allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index)
            .unwrap_err();
        assert!(matches!(err, BackendError::AllocationConflict(_)));
    }

    #[test]
    fn test_verify_against_reserved_range() {
        let mut table = StorageTable::new(TableKey::new(Domain::Register, Scope::World));
        table.declare(StorageRecord::new("sp", 1).at(5)).unwrap();
        assert!(verify_table(&table, &[(5, 6)]).is_err());
        assert!(verify_table(&table, &[(6, 7)]).is_ok());
    }
}

#[cfg(test)]
mod array_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_map_arrays_avoid_map_registers() {
        let mut ctx = Context::new();
        ctx.declare_register(Scope::Map, StorageRecord::new("r", 2))
            .unwrap();
        ctx.declare_array(Scope::Map, StorageRecord::new("arr", 100))
            .unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "r"), 0);
        assert_eq!(address(&mut ctx, "arr"), 2);
        // numbering took one index, the element count is kept
        assert_eq!(array_size(&ctx, Scope::Map, "arr"), 100);
    }

    #[test]
    fn test_arrays_take_one_index_each() {
        let mut ctx = Context::new();
        ctx.declare_array(Scope::World, StorageRecord::new("a", 10))
            .unwrap();
        ctx.declare_array(Scope::World, StorageRecord::new("b", 10))
            .unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "a"), 0);
        assert_eq!(address(&mut ctx, "b"), 1);
    }

    #[test]
    fn test_global_arrays_skip_addressable_alias() {
        let mut ctx = Context::new();
        ctx.declare_array(Scope::Global, StorageRecord::new("g", 4))
            .unwrap();
        let config = BackendConfig {
            addressable_array_index: Some(0),
            ..BackendConfig::default()
        };

        allocate(&mut ctx, &config, StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "g"), 1);
    }

    #[test]
    fn test_array_variables_size_their_array() {
        let mut ctx = Context::new();
        ctx.declare_array(Scope::World, StorageRecord::new("mem", 0))
            .unwrap();
        ctx.declare_array_variable(Scope::World, "mem", StorageRecord::new("x", 1))
            .unwrap();
        ctx.declare_array_variable(Scope::World, "mem", StorageRecord::new("buf", 4))
            .unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "mem::x"), 0);
        assert_eq!(address(&mut ctx, "mem::buf"), 1);
        assert_eq!(array_size(&ctx, Scope::World, "mem"), 5);
    }

    #[test]
    fn test_array_too_small_for_its_variables() {
        let mut ctx = Context::new();
        ctx.declare_array(Scope::World, StorageRecord::new("mem", 2))
            .unwrap();
        ctx.declare_array_variable(Scope::World, "mem", StorageRecord::new("buf", 3))
            .unwrap();

        let err = allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index)
            .unwrap_err();
        assert!(matches!(err, BackendError::BadDeclaration(..)));
    }

    #[test]
    fn test_variables_in_undeclared_array() {
        let mut ctx = Context::new();
        ctx.declare_array_variable(Scope::Map, "ghost", StorageRecord::new("v", 1))
            .unwrap();

        assert!(allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).is_err());
    }
}

#[cfg(test)]
mod frame_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_statics_start_at_floor() {
        let mut ctx = Context::new();
        ctx.declare_static(StorageRecord::new("s", 4)).unwrap();
        ctx.declare_static(StorageRecord::new("t", 1)).unwrap();
        let config = BackendConfig {
            static_floor: 16,
            ..BackendConfig::default()
        };

        allocate(&mut ctx, &config, StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "s"), 16);
        assert_eq!(address(&mut ctx, "t"), 20);
    }

    #[test]
    fn test_autos_start_after_parameters() {
        let mut ctx = Context::new();
        let mut function = FunctionRecord::new("add3", "add3_entry");
        function.params = 3;
        ctx.add_function(function).unwrap();
        ctx.declare_auto("add3", StorageRecord::new("tmp", 1)).unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "add3::tmp"), 3);
        assert_eq!(ctx.frame_size("add3", 3), 4);
    }

    #[test]
    fn test_same_local_name_in_two_functions() {
        let mut ctx = Context::new();
        let mut f = FunctionRecord::new("f", "f_entry");
        f.params = 1;
        ctx.add_function(f).unwrap();
        ctx.add_function(FunctionRecord::new("g", "g_entry")).unwrap();
        ctx.declare_auto("f", StorageRecord::new("i", 1)).unwrap();
        ctx.declare_auto("g", StorageRecord::new("i", 1)).unwrap();
        ctx.declare_auto("g", StorageRecord::new("j", 2)).unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        let in_f = ctx.local_of("f", "i");
        let in_g = ctx.local_of("g", "i");
        assert_eq!(ctx.resolver().resolve_uns(in_f).unwrap(), 1);
        assert_eq!(ctx.resolver().resolve_uns(in_g).unwrap(), 0);
        assert_eq!(address(&mut ctx, "g::j"), 1);
        assert!(!ctx.symbols.contains("i"));
    }
}

#[cfg(test)]
mod numbering_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_function_indices_skip_explicit_ones() {
        let mut ctx = Context::new();
        let mut pinned = FunctionRecord::new("pinned", "pinned_entry");
        pinned.index = Some(0);
        ctx.add_function(FunctionRecord::new("free", "free_entry"))
            .unwrap();
        ctx.add_function(pinned).unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(ctx.functions["pinned"].index, Some(0));
        assert_eq!(ctx.functions["free"].index, Some(1));
        assert_eq!(address(&mut ctx, "free"), 1);
    }

    #[test]
    fn test_duplicate_function_index() {
        let mut ctx = Context::new();
        for name in ["f", "g"] {
            let mut function = FunctionRecord::new(name, &format!("{}_entry", name));
            function.index = Some(2);
            ctx.add_function(function).unwrap();
        }

        assert!(matches!(
            allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index),
            Err(BackendError::BadDeclaration(..))
        ));
    }

    #[test]
    fn test_scripts_numbered_and_named() {
        let mut ctx = Context::new();
        ctx.add_script(ScriptRecord::new("open", "open_entry").numbered(1))
            .unwrap();
        ctx.add_script(ScriptRecord::new("next", "next_entry"))
            .unwrap();
        ctx.add_script(ScriptRecord::new("door", "door_entry").by_name())
            .unwrap();
        ctx.add_script(ScriptRecord::new("lift", "lift_entry").by_name())
            .unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(script_number(&mut ctx, "open"), 1);
        assert_eq!(script_number(&mut ctx, "next"), 2);
        assert_eq!(script_number(&mut ctx, "door"), -1);
        assert_eq!(script_number(&mut ctx, "lift"), -2);
    }

    #[test]
    fn test_named_scripts_need_engine_support() {
        let mut ctx = Context::new();
        ctx.add_script(ScriptRecord::new("door", "door_entry").by_name())
            .unwrap();
        let config = BackendConfig {
            engine: Engine::Eternity,
            ..BackendConfig::default()
        };

        assert!(matches!(
            allocate_scripts(&mut ctx, &config),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_duplicate_script_number() {
        let mut ctx = Context::new();
        ctx.add_script(ScriptRecord::new("a", "a_entry").numbered(5))
            .unwrap();
        ctx.add_script(ScriptRecord::new("b", "b_entry").numbered(5))
            .unwrap();

        assert!(allocate_scripts(&mut ctx, &BackendConfig::default()).is_err());
    }
}

#[cfg(test)]
mod string_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_strings_by_index() {
        let mut ctx = Context::new();
        ctx.string_ref("hello").unwrap();
        ctx.string_ref("world").unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index).unwrap();
        assert_eq!(address(&mut ctx, "__str0"), 0);
        assert_eq!(address(&mut ctx, "__str1"), 1);
    }

    #[test]
    fn test_strings_by_byte_address() {
        let mut ctx = Context::new();
        ctx.string_ref("hello").unwrap();
        ctx.string_ref("abc").unwrap();
        ctx.string_ref("z").unwrap();

        allocate(&mut ctx, &BackendConfig::default(), StringAddressing::ByteAddress).unwrap();
        assert_eq!(address(&mut ctx, "__str0"), 0);
        assert_eq!(address(&mut ctx, "__str1"), 8);
        assert_eq!(address(&mut ctx, "__str2"), 12);
        assert_eq!(packed_string_size("abc"), 4);
    }

    #[test]
    fn test_storage_name_clashing_with_constant() {
        let mut ctx = Context::new();
        ctx.declare_register(Scope::Map, StorageRecord::new("dup", 1))
            .unwrap();
        let seven = ctx.exprs.uns(7);
        ctx.symbols.bind("dup", seven).unwrap();

        assert!(matches!(
            allocate(&mut ctx, &BackendConfig::default(), StringAddressing::Index),
            Err(BackendError::BadDeclaration(..))
        ));
    }
}

#[test]
fn test_allocation_is_deterministic() {
    let build = || {
        let mut ctx = Context::new();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            ctx.declare_register(Scope::Map, StorageRecord::new(name, i as u32 + 1))
                .unwrap();
        }
        ctx.declare_array(Scope::Map, StorageRecord::new("arr", 8))
            .unwrap();
        ctx.string_ref("text").unwrap();
        ctx
    };

    let mut first = build();
    let mut second = build();
    allocate(&mut first, &BackendConfig::default(), StringAddressing::Index).unwrap();
    allocate(&mut second, &BackendConfig::default(), StringAddressing::Index).unwrap();
    assert_eq!(first, second);
}
