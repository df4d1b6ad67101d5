//! Two-pass layout and instruction encoding

use super::*;
use test_log::test;

fn push(ctx: &mut Context, value: i128) {
    let arg = ctx.exprs.int(value);
    ctx.emit(Opcode::PushNumber, vec![arg], SourcePos::default())
        .unwrap();
}

fn op(ctx: &mut Context, opcode: Opcode) {
    ctx.emit(opcode, vec![], SourcePos::default()).unwrap();
}

fn label_value(ctx: &mut Context, name: &str) -> u32 {
    resolve_symbol_word(ctx, name, &SourcePos::default()).unwrap()
}

/// start: push 5; mid: terminate; end:
fn sample() -> Context {
    let mut ctx = Context::new();
    ctx.label("start").unwrap();
    push(&mut ctx, 5);
    ctx.label("mid").unwrap();
    op(&mut ctx, Opcode::Terminate);
    ctx.label("end").unwrap();
    ctx
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_instruction_sizes() {
        let ctx = sample();
        assert_eq!(instruction_size(&ctx.code[0], CodeEncoding::Flat), 8);
        assert_eq!(instruction_size(&ctx.code[1], CodeEncoding::Flat), 4);
        assert_eq!(instruction_size(&ctx.code[0], CodeEncoding::Compressed), 5);
        assert_eq!(instruction_size(&ctx.code[1], CodeEncoding::Compressed), 1);
    }

    #[test]
    fn test_flat_layout_binds_labels() {
        let mut ctx = sample();
        let end = layout(&mut ctx, CodeEncoding::Flat, 8).unwrap();

        assert_eq!(end, 20);
        assert_eq!(label_value(&mut ctx, "start"), 8);
        assert_eq!(label_value(&mut ctx, "mid"), 16);
        assert_eq!(label_value(&mut ctx, "end"), 20);
    }

    #[test]
    fn test_compressed_layout_binds_labels() {
        let mut ctx = sample();
        let end = layout(&mut ctx, CodeEncoding::Compressed, 8).unwrap();

        assert_eq!(end, 14);
        assert_eq!(label_value(&mut ctx, "mid"), 13);
    }

    #[test]
    fn test_layout_runs_once_per_context() {
        let mut ctx = sample();
        layout(&mut ctx, CodeEncoding::Flat, 0).unwrap();
        assert!(matches!(
            layout(&mut ctx, CodeEncoding::Flat, 0),
            Err(BackendError::BadDeclaration(..))
        ));
    }

    #[test]
    fn test_unlaid_label_is_unknown() {
        let ctx = sample();
        assert!(matches!(
            resolve_symbol_word(&ctx, "start", &SourcePos::default()),
            Err(BackendError::UnknownSymbol(..))
        ));
    }
}

#[cfg(test)]
mod encoding_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_flat_encoding() {
        let mut ctx = sample();
        layout(&mut ctx, CodeEncoding::Flat, 0).unwrap();
        let mut gen = CodeGen::new();
        gen.write_code(&ctx, CodeEncoding::Flat).unwrap();

        assert_eq!(gen.data, vec![3, 0, 0, 0, 5, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_compressed_jump_to_label() {
        let mut ctx = Context::new();
        ctx.label("loop").unwrap();
        let target = ctx.address_of("loop");
        ctx.emit(Opcode::Goto, vec![target], SourcePos::default())
            .unwrap();
        layout(&mut ctx, CodeEncoding::Compressed, 8).unwrap();

        let mut gen = CodeGen::new();
        gen.write_code(&ctx, CodeEncoding::Compressed).unwrap();
        assert_eq!(gen.data, vec![40, 8, 0, 0, 0]);
    }

    #[test]
    fn test_two_byte_compressed_opcode() {
        let mut gen = CodeGen::new();
        gen.write_compressed_opcode(Opcode::StrLen);
        gen.write_compressed_opcode(Opcode::Dup);
        assert_eq!(gen.data, vec![240, 18, 56]);
    }

    #[test]
    fn test_narrow_argument_overflow() {
        let mut ctx = Context::new();
        let big = ctx.exprs.int(300);
        ctx.emit(Opcode::PushByte, vec![big], SourcePos::default())
            .unwrap();
        layout(&mut ctx, CodeEncoding::Compressed, 0).unwrap();

        let mut gen = CodeGen::new();
        assert!(matches!(
            gen.write_code(&ctx, CodeEncoding::Compressed),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_negative_byte_argument_fits() {
        assert!(fits(0xFFFF_FFFF, 1));
        assert!(fits(0xFF, 1));
        assert!(!fits(0x100, 1));
        assert!(!fits(0xFFFF_7FFF, 2));
    }

    #[test]
    fn test_writers_and_patch() {
        let mut gen = CodeGen::new();
        gen.write_u32(0);
        gen.write_cstr("hi");
        gen.write_i16(-2);
        gen.patch_u32(0, 0xAABBCCDD);

        assert_eq!(gen.position(), 9);
        assert_eq!(gen.data, vec![0xDD, 0xCC, 0xBB, 0xAA, b'h', b'i', 0, 0xFE, 0xFF]);
    }
}
