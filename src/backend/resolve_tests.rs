//! Resolution of expression trees against the symbol table
//!
//! Covers domain substitution (INT/UNS), deferred symbols, width wrapping,
//! short-circuit evaluation and the binary word view.

use super::*;
use crate::backend::expr::{BinaryOp, BranchOp, ExprArena, Literal, UnaryOp};
use crate::backend::symbols::SymbolTable;
use crate::backend::types::{ScalarKind, Type, Width};
use test_log::test;

fn tables() -> (ExprArena, SymbolTable) {
    (ExprArena::new(), SymbolTable::new())
}

#[cfg(test)]
mod arithmetic_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_int_and_uns_are_substitutable() {
        let (mut exprs, symbols) = tables();
        let three = exprs.int(3);
        let four = exprs.int(4);
        let sum = exprs.binary(BinaryOp::Add, three, four).unwrap();
        let two = exprs.int(2);
        let product = exprs.binary(BinaryOp::Mul, sum, two).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_int(product).unwrap(), 14);
        assert_eq!(resolver.resolve_uns(product).unwrap(), 14);
    }

    #[test]
    fn test_uns_subtraction_wraps_to_width() {
        let (mut exprs, symbols) = tables();
        let zero = exprs.uns(0);
        let one = exprs.uns(1);
        let diff = exprs.binary(BinaryOp::Sub, zero, one).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_uns(diff).unwrap(), 0xFFFF_FFFF);
        assert_eq!(resolver.resolve_binary(diff, 0).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_int8_addition_wraps() {
        let (mut exprs, symbols) = tables();
        let a = exprs.literal(Literal::Int(127, Width::W8));
        let b = exprs.literal(Literal::Int(1, Width::W8));
        let sum = exprs.binary(BinaryOp::Add, a, b).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_int(sum).unwrap(), -128);
        assert_eq!(resolver.resolve_binary(sum, 0).unwrap(), 0x80);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let (mut exprs, symbols) = tables();
        let one = exprs.int(1);
        let zero = exprs.int(0);
        let div = exprs.binary(BinaryOp::Div, one, zero).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert!(matches!(
            resolver.resolve_int(div),
            Err(BackendError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_comparison_yields_int32() {
        let (mut exprs, symbols) = tables();
        let a = exprs.int(3);
        let b = exprs.int(5);
        let lt = exprs.binary(BinaryOp::Lt, a, b).unwrap();
        let ge = exprs.binary(BinaryOp::Ge, a, b).unwrap();

        assert_eq!(exprs.ty(lt).unwrap(), Type::INT32);
        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_int(lt).unwrap(), 1);
        assert_eq!(resolver.resolve_int(ge).unwrap(), 0);
    }

    #[test]
    fn test_negate_and_bitwise_not() {
        let (mut exprs, symbols) = tables();
        let five = exprs.int(5);
        let neg = exprs.unary(UnaryOp::Neg, five).unwrap();
        let not = exprs.unary(UnaryOp::BitNot, five).unwrap();
        let lnot = exprs.unary(UnaryOp::LogNot, five).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_int(neg).unwrap(), -5);
        assert_eq!(resolver.resolve_int(not).unwrap(), -6);
        assert_eq!(resolver.resolve_int(lnot).unwrap(), 0);
    }
}

#[cfg(test)]
mod real_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_fixed_literal_binary_word() {
        let (mut exprs, symbols) = tables();
        let value = exprs.fixed(1.5);

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_binary(value, 0).unwrap(), 0x0001_8000);
        assert_eq!(resolver.resolve_fixed(value).unwrap(), 1.5);
    }

    #[test]
    fn test_fixed_bitwise_uses_raw_encoding() {
        let (mut exprs, symbols) = tables();
        let a = exprs.fixed(1.5);
        let b = exprs.fixed(1.0);
        let and = exprs.binary(BinaryOp::And, a, b).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_fixed(and).unwrap(), 1.0);
    }

    #[test]
    fn test_float_bitwise_is_incompatible() {
        let (mut exprs, symbols) = tables();
        let a = exprs.float(1.0, Width::W32);
        let b = exprs.float(2.0, Width::W32);
        let and = exprs.binary(BinaryOp::And, a, b).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert!(matches!(
            resolver.resolve_float(and),
            Err(BackendError::CannotResolve(..))
        ));
    }

    #[test]
    fn test_cast_truncates_toward_zero() {
        let (mut exprs, symbols) = tables();
        let value = exprs.float(-2.7, Width::W64);
        let cast = exprs.cast(Type::INT32, value).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_int(cast).unwrap(), -2);
    }

    #[test]
    fn test_requesting_fixed_from_int_fails() {
        let (mut exprs, symbols) = tables();
        let value = exprs.int(1);

        let resolver = Resolver::new(&exprs, &symbols);
        let err = resolver.resolve_fixed(value).unwrap_err();
        assert!(err.to_string().contains("cannot resolve fixed for type int32"));
    }

    #[test]
    fn test_double_words_and_out_of_range_part() {
        let (mut exprs, symbols) = tables();
        let value = exprs.float(1.0, Width::W64);

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_binary(value, 0).unwrap(), 0);
        assert_eq!(resolver.resolve_binary(value, 1).unwrap(), 0x3FF0_0000);
        assert!(matches!(
            resolver.resolve_binary(value, 2),
            Err(BackendError::CannotResolve(..))
        ));
    }
}

#[cfg(test)]
mod symbol_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_unknown_symbol() {
        let (mut exprs, symbols) = tables();
        let missing = exprs.symbol("missing", Type::INT32);

        let resolver = Resolver::new(&exprs, &symbols);
        assert!(!resolver.can_resolve(missing));
        assert!(matches!(
            resolver.resolve_int(missing),
            Err(BackendError::UnknownSymbol(..))
        ));
    }

    #[test]
    fn test_deferred_symbol_becomes_resolvable() {
        let (mut exprs, mut symbols) = tables();
        symbols.declare("later", Type::INT32).unwrap();
        let reference = exprs.symbol("later", Type::INT32);
        let one = exprs.int(1);
        let sum = exprs.binary(BinaryOp::Add, reference, one).unwrap();

        {
            let resolver = Resolver::new(&exprs, &symbols);
            assert!(!resolver.can_resolve(sum));
            assert!(resolver.resolve_int(sum).unwrap_err().is_not_resolvable());
        }

        let value = exprs.int(41);
        symbols.bind("later", value).unwrap();
        let resolver = Resolver::new(&exprs, &symbols);
        assert!(resolver.can_resolve(sum));
        assert_eq!(resolver.resolve_int(sum).unwrap(), 42);
    }

    #[test]
    fn test_circular_reference_is_reported() {
        let (mut exprs, mut symbols) = tables();
        let a = exprs.symbol("a", Type::INT32);
        let b = exprs.symbol("b", Type::INT32);
        symbols.define("a", Type::INT32, b).unwrap();
        symbols.define("b", Type::INT32, a).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert!(!resolver.can_resolve(a));
        assert!(matches!(
            resolver.resolve_int(a),
            Err(BackendError::CircularReference(_))
        ));
    }

    #[test]
    fn test_string_through_symbol() {
        let (mut exprs, mut symbols) = tables();
        let text = exprs.string("hello");
        symbols.define("greeting", Type::Str, text).unwrap();
        let reference = exprs.symbol("greeting", Type::Str);

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_string(reference).unwrap(), "hello");
        assert_eq!(resolver.resolve_symbol(reference).unwrap(), "greeting");
        assert!(resolver.resolve_int(reference).is_err());
    }
}

#[cfg(test)]
mod branch_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_and_short_circuits_unbound_rhs() {
        let (mut exprs, mut symbols) = tables();
        symbols.declare("unknown_yet", Type::INT32).unwrap();
        let zero = exprs.int(0);
        let deferred = exprs.symbol("unknown_yet", Type::INT32);
        let and = exprs.branch(BranchOp::And, zero, deferred).unwrap();
        let one = exprs.int(1);
        let or = exprs.branch(BranchOp::Or, one, deferred).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert!(resolver.can_resolve(and));
        assert_eq!(resolver.resolve_int(and).unwrap(), 0);
        assert_eq!(resolver.resolve_int(or).unwrap(), 1);
    }

    #[test]
    fn test_ternary_resolves_only_selected_side() {
        let (mut exprs, symbols) = tables();
        let cond = exprs.int(1);
        let then = exprs.int(10);
        let broken = exprs.symbol("never_declared", Type::INT32);
        let pick = exprs.ternary(cond, then, broken).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert!(resolver.can_resolve(pick));
        assert_eq!(resolver.resolve_int(pick).unwrap(), 10);
        assert!(resolver.resolve_bool(cond).unwrap());
    }
}

#[cfg(test)]
mod aggregate_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_aggregate_concatenates_member_words() {
        let (mut exprs, symbols) = tables();
        let a = exprs.int(7);
        let b = exprs.literal(Literal::Uns(0x1_0000_0002, Width::W64));
        let c = exprs.fixed(0.5);
        let agg = exprs.array(&[a, b, c]).unwrap();

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.word_count(agg).unwrap(), 4);
        assert_eq!(
            resolver.resolve_words(agg).unwrap(),
            vec![7, 2, 1, 0x8000]
        );
        assert!(resolver.resolve_binary(agg, 4).is_err());
    }

    #[test]
    fn test_part_selects_one_word() {
        let (mut exprs, symbols) = tables();
        let wide = exprs.literal(Literal::Int(-1, Width::W64));
        let high = exprs.part(wide, 1).unwrap();
        assert!(exprs.part(wide, 2).is_err());

        let resolver = Resolver::new(&exprs, &symbols);
        assert_eq!(resolver.resolve_uns(high).unwrap(), 0xFFFF_FFFF);
        assert_eq!(
            exprs.ty(high).unwrap(),
            Type::Scalar(ScalarKind::Uns, Width::W32)
        );
    }
}
