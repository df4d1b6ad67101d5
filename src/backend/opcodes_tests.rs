//! Opcode table lookups and compressed sizes

use super::*;
use test_log::test;

#[cfg(test)]
mod table_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_lookup_by_name_and_code() {
        assert_eq!(Opcode::from_name("push_number"), Some(Opcode::PushNumber));
        assert_eq!(Opcode::from_code(40), Some(Opcode::Goto));
        assert_eq!(Opcode::from_code(257), Some(Opcode::PrintBold));
        assert_eq!(Opcode::from_name("no_such_op"), None);
        assert_eq!(Opcode::from_code(9999), None);
    }

    #[test]
    fn test_codes_and_names_are_unique() {
        let mut codes: Vec<u32> = Opcode::ALL.iter().map(|op| op.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), Opcode::ALL.len());

        for op in Opcode::ALL.iter() {
            assert_eq!(Opcode::from_name(op.name()), Some(*op));
        }
    }

    #[test]
    fn test_arity_follows_argument_widths() {
        assert_eq!(Opcode::Nop.arity(), 0);
        assert_eq!(Opcode::PushNumber.arity(), 1);
        assert_eq!(Opcode::CaseGoto.arity(), 2);
        assert_eq!(Opcode::CallFunc.info().compressed_args, &[1, 2]);
    }

    #[test]
    fn test_compressed_opcode_size() {
        assert_eq!(Opcode::Goto.compressed_opcode_size(), 1);
        assert_eq!(Opcode::StrLen.compressed_opcode_size(), 2);
    }

    #[test]
    fn test_text_mnemonics() {
        assert_eq!(Opcode::Drop.text_mnemonic(), Some("Drop_Nul"));
        assert_eq!(Opcode::Goto.text_mnemonic(), Some("Jump"));
        assert_eq!(Opcode::PushByte.text_mnemonic(), None);
        assert_eq!(format!("{}", Opcode::PushMapVar), "push_map_var");
    }
}
