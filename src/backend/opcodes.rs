//! Target opcode table
//!
//! Each opcode has a fixed numeric code, a fixed argument count, and per-argument
//! byte widths for the compressed code encoding. Opcodes with a text mnemonic can
//! be translated to the text listing; the rest have no textual counterpart.
//!
//! # Code numbering
//!
//! Codes below 240 encode as one byte in compressed code; higher codes take two
//! bytes (`240 + (code - 240) / 256`, `(code - 240) % 256`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Nop,
    Terminate,
    Suspend,
    PushNumber,
    Drop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    AndBitwise,
    OrBitwise,
    XorBitwise,
    LShift,
    RShift,
    Negate,
    NotLogical,
    NotBitwise,
    AndLogical,
    OrLogical,
    PushScriptVar,
    AssignScriptVar,
    PushMapVar,
    AssignMapVar,
    PushWorldVar,
    AssignWorldVar,
    PushGlobalVar,
    AssignGlobalVar,
    PushMapArray,
    AssignMapArray,
    PushWorldArray,
    AssignWorldArray,
    PushGlobalArray,
    AssignGlobalArray,
    Goto,
    IfGoto,
    IfNotGoto,
    CaseGoto,
    Call,
    CallDiscard,
    ReturnVoid,
    ReturnVal,
    Delay,
    DelayDirect,
    BeginPrint,
    PrintString,
    PrintNumber,
    EndPrint,
    TagString,
    PushByte,
    Dup,
    Swap,
    CallFunc,
    PushFunction,
    CallStack,
    Random,
    FixedMul,
    FixedDiv,
    PushMemory,
    AssignMemory,
    PrintBold,
    StrLen,
}

/// Static description of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub code: u32,
    pub name: &'static str,
    /// Byte width of each argument in compressed code; the length is the arity
    pub compressed_args: &'static [u8],
    pub text: Option<&'static str>,
}

const fn op(
    code: u32,
    name: &'static str,
    compressed_args: &'static [u8],
    text: Option<&'static str>,
) -> OpcodeInfo {
    OpcodeInfo {
        code,
        name,
        compressed_args,
        text,
    }
}

impl Opcode {
    pub const ALL: &'static [Opcode] = &[
        Opcode::Nop,
        Opcode::Terminate,
        Opcode::Suspend,
        Opcode::PushNumber,
        Opcode::Drop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Lt,
        Opcode::Gt,
        Opcode::Le,
        Opcode::Ge,
        Opcode::AndBitwise,
        Opcode::OrBitwise,
        Opcode::XorBitwise,
        Opcode::LShift,
        Opcode::RShift,
        Opcode::Negate,
        Opcode::NotLogical,
        Opcode::NotBitwise,
        Opcode::AndLogical,
        Opcode::OrLogical,
        Opcode::PushScriptVar,
        Opcode::AssignScriptVar,
        Opcode::PushMapVar,
        Opcode::AssignMapVar,
        Opcode::PushWorldVar,
        Opcode::AssignWorldVar,
        Opcode::PushGlobalVar,
        Opcode::AssignGlobalVar,
        Opcode::PushMapArray,
        Opcode::AssignMapArray,
        Opcode::PushWorldArray,
        Opcode::AssignWorldArray,
        Opcode::PushGlobalArray,
        Opcode::AssignGlobalArray,
        Opcode::Goto,
        Opcode::IfGoto,
        Opcode::IfNotGoto,
        Opcode::CaseGoto,
        Opcode::Call,
        Opcode::CallDiscard,
        Opcode::ReturnVoid,
        Opcode::ReturnVal,
        Opcode::Delay,
        Opcode::DelayDirect,
        Opcode::BeginPrint,
        Opcode::PrintString,
        Opcode::PrintNumber,
        Opcode::EndPrint,
        Opcode::TagString,
        Opcode::PushByte,
        Opcode::Dup,
        Opcode::Swap,
        Opcode::CallFunc,
        Opcode::PushFunction,
        Opcode::CallStack,
        Opcode::Random,
        Opcode::FixedMul,
        Opcode::FixedDiv,
        Opcode::PushMemory,
        Opcode::AssignMemory,
        Opcode::PrintBold,
        Opcode::StrLen,
    ];

    pub fn info(self) -> OpcodeInfo {
        match self {
            Opcode::Nop => op(0, "nop", &[], Some("Nop")),
            Opcode::Terminate => op(1, "terminate", &[], Some("Term")),
            Opcode::Suspend => op(2, "suspend", &[], None),
            Opcode::PushNumber => op(3, "push_number", &[4], Some("Push_Lit")),
            Opcode::Drop => op(4, "drop", &[], Some("Drop_Nul")),
            Opcode::Add => op(5, "add", &[], Some("AddI")),
            Opcode::Sub => op(6, "sub", &[], Some("SubI")),
            Opcode::Mul => op(7, "mul", &[], Some("MulI")),
            Opcode::Div => op(8, "div", &[], Some("DivI")),
            Opcode::Mod => op(9, "mod", &[], Some("ModI")),
            Opcode::Eq => op(10, "eq", &[], Some("CmpI_EQ")),
            Opcode::Ne => op(11, "ne", &[], Some("CmpI_NE")),
            Opcode::Lt => op(12, "lt", &[], Some("CmpI_LT")),
            Opcode::Gt => op(13, "gt", &[], Some("CmpI_GT")),
            Opcode::Le => op(14, "le", &[], Some("CmpI_LE")),
            Opcode::Ge => op(15, "ge", &[], Some("CmpI_GE")),
            Opcode::AndBitwise => op(16, "and_bitwise", &[], Some("BAnd")),
            Opcode::OrBitwise => op(17, "or_bitwise", &[], Some("BOrI")),
            Opcode::XorBitwise => op(18, "xor_bitwise", &[], Some("BOrX")),
            Opcode::LShift => op(19, "lshift", &[], Some("ShLU")),
            Opcode::RShift => op(20, "rshift", &[], Some("ShRI")),
            Opcode::Negate => op(21, "negate", &[], Some("NegI")),
            Opcode::NotLogical => op(22, "not_logical", &[], Some("LNot")),
            Opcode::NotBitwise => op(23, "not_bitwise", &[], Some("BNot")),
            Opcode::AndLogical => op(24, "and_logical", &[], Some("LAnd")),
            Opcode::OrLogical => op(25, "or_logical", &[], Some("LOrI")),
            Opcode::PushScriptVar => op(26, "push_script_var", &[1], Some("Push_Loc")),
            Opcode::AssignScriptVar => op(27, "assign_script_var", &[1], Some("Move_Loc")),
            Opcode::PushMapVar => op(28, "push_map_var", &[1], Some("Push_Reg")),
            Opcode::AssignMapVar => op(29, "assign_map_var", &[1], Some("Move_Reg")),
            Opcode::PushWorldVar => op(30, "push_world_var", &[1], Some("Push_WldReg")),
            Opcode::AssignWorldVar => op(31, "assign_world_var", &[1], Some("Move_WldReg")),
            Opcode::PushGlobalVar => op(32, "push_global_var", &[1], Some("Push_GblReg")),
            Opcode::AssignGlobalVar => op(33, "assign_global_var", &[1], Some("Move_GblReg")),
            Opcode::PushMapArray => op(34, "push_map_array", &[1], Some("Push_Arr")),
            Opcode::AssignMapArray => op(35, "assign_map_array", &[1], Some("Move_Arr")),
            Opcode::PushWorldArray => op(36, "push_world_array", &[1], Some("Push_WldArr")),
            Opcode::AssignWorldArray => op(37, "assign_world_array", &[1], Some("Move_WldArr")),
            Opcode::PushGlobalArray => op(38, "push_global_array", &[1], Some("Push_GblArr")),
            Opcode::AssignGlobalArray => op(39, "assign_global_array", &[1], Some("Move_GblArr")),
            Opcode::Goto => op(40, "goto", &[4], Some("Jump")),
            Opcode::IfGoto => op(41, "if_goto", &[4], Some("Cjmp_Tru")),
            Opcode::IfNotGoto => op(42, "if_not_goto", &[4], Some("Cjmp_Nil")),
            Opcode::CaseGoto => op(43, "case_goto", &[4, 4], Some("Jcnd_Lit")),
            Opcode::Call => op(44, "call", &[1], Some("Call")),
            Opcode::CallDiscard => op(45, "call_discard", &[1], Some("Call_Nul")),
            Opcode::ReturnVoid => op(46, "return_void", &[], Some("Retn")),
            Opcode::ReturnVal => op(47, "return_val", &[], Some("Retn_Val")),
            Opcode::Delay => op(48, "delay", &[], None),
            Opcode::DelayDirect => op(49, "delay_direct", &[4], None),
            Opcode::BeginPrint => op(50, "begin_print", &[], None),
            Opcode::PrintString => op(51, "print_string", &[], None),
            Opcode::PrintNumber => op(52, "print_number", &[], None),
            Opcode::EndPrint => op(53, "end_print", &[], None),
            Opcode::TagString => op(54, "tag_string", &[], None),
            Opcode::PushByte => op(55, "push_byte", &[1], None),
            Opcode::Dup => op(56, "dup", &[], Some("Copy")),
            Opcode::Swap => op(57, "swap", &[], Some("Swap")),
            Opcode::CallFunc => op(58, "call_func", &[1, 2], Some("Cnat")),
            Opcode::PushFunction => op(59, "push_function", &[4], Some("Push_Fn")),
            Opcode::CallStack => op(60, "call_stack", &[], Some("Call_Stk")),
            Opcode::Random => op(61, "random", &[], None),
            Opcode::FixedMul => op(62, "fixed_mul", &[], Some("MulX")),
            Opcode::FixedDiv => op(63, "fixed_div", &[], Some("DivX")),
            Opcode::PushMemory => op(64, "push_memory", &[4], Some("Push_Mem")),
            Opcode::AssignMemory => op(65, "assign_memory", &[4], Some("Move_Mem")),
            Opcode::PrintBold => op(257, "print_bold", &[], None),
            Opcode::StrLen => op(258, "strlen", &[], Some("Str_Len")),
        }
    }

    pub fn code(self) -> u32 {
        self.info().code
    }

    pub fn arity(self) -> usize {
        self.info().compressed_args.len()
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn text_mnemonic(self) -> Option<&'static str> {
        self.info().text
    }

    /// Bytes taken by the opcode itself in compressed code
    pub fn compressed_opcode_size(self) -> usize {
        if self.code() < 240 {
            1
        } else {
            2
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        OPCODES_BY_NAME.get(name).copied()
    }

    pub fn from_code(code: u32) -> Option<Opcode> {
        OPCODES_BY_CODE.get(&code).copied()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

lazy_static! {
    static ref OPCODES_BY_NAME: IndexMap<&'static str, Opcode> =
        Opcode::ALL.iter().map(|&op| (op.name(), op)).collect();
    static ref OPCODES_BY_CODE: IndexMap<u32, Opcode> =
        Opcode::ALL.iter().map(|&op| (op.code(), op)).collect();
}

#[cfg(test)]
#[path = "opcodes_tests.rs"]
mod tests;
