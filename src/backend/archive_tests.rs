//! Archive framing

use super::*;
use crate::backend::opcodes::Opcode;
use crate::backend::error::SourcePos;
use test_log::test;

fn unit() -> Context {
    let mut ctx = Context::new();
    ctx.label("main").unwrap();
    let text = ctx.string_ref("hello").unwrap();
    ctx.emit(Opcode::PushNumber, vec![text], SourcePos::new("a.acs", 3, 1))
        .unwrap();
    ctx.emit(Opcode::Terminate, vec![], SourcePos::default())
        .unwrap();
    ctx
}

#[test]
fn test_round_trip_preserves_context() {
    let ctx = unit();
    let data = to_bytes(&ctx).unwrap();
    assert_eq!(&data[0..4], MAGIC);
    assert_eq!(from_bytes(&data).unwrap(), ctx);
}

#[test]
fn test_rejects_foreign_data() {
    assert!(matches!(
        from_bytes(b"ACSE\0\0\0\0"),
        Err(BackendError::Archive(_))
    ));
    assert!(from_bytes(b"SF").is_err());
}

#[test]
fn test_rejects_other_versions() {
    let mut data = to_bytes(&unit()).unwrap();
    data[4] = 99;
    let err = from_bytes(&data).unwrap_err();
    assert!(err.to_string().contains("unsupported archive version 99"));
}

#[test]
fn test_save_and_load_file() {
    let path = std::env::temp_dir().join(format!("sforge_archive_{}.sfar", std::process::id()));
    let ctx = unit();
    save(&ctx, &path).unwrap();
    let loaded = load(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded, ctx);
}
