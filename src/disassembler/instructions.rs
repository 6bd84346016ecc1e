//! Opcode table for the supported CIL subset.
//!
//! Only instructions that can occur in an expression-shaped body have an entry. Everything
//! else is rejected by the decoder with [`crate::Error::UnsupportedInstruction`], named by
//! mnemonic when it appears in [`UNSUPPORTED`] and by hex value otherwise.

use std::{collections::HashMap, sync::OnceLock};

use crate::{
    disassembler::instruction::{FlowType, Implicit, OpKind, OperandType},
    metadata::TypeSignature,
};

/// Static description of one opcode.
#[derive(Debug, Clone, PartialEq)]
pub struct OpCodeInfo {
    /// Instruction mnemonic
    pub mnemonic: &'static str,
    /// `0xFE` for two-byte opcodes, `0` otherwise
    pub prefix: u8,
    /// Opcode byte
    pub code: u8,
    /// Normalised operation
    pub kind: OpKind,
    /// Inline operand encoding
    pub op_type: OperandType,
    /// Control flow effect
    pub flow: FlowType,
    /// Operand implied by the opcode
    pub implicit: Implicit,
}

macro_rules! op {
    ($mn:literal, $prefix:literal, $code:literal, $kind:ident, $op:ident, $flow:ident) => {
        op!($mn, $prefix, $code, $kind, $op, $flow, Implicit::None)
    };
    ($mn:literal, $prefix:literal, $code:literal, $kind:ident, $op:ident, $flow:ident, $imp:expr) => {
        OpCodeInfo {
            mnemonic: $mn,
            prefix: $prefix,
            code: $code,
            kind: OpKind::$kind,
            op_type: OperandType::$op,
            flow: FlowType::$flow,
            implicit: $imp,
        }
    };
}

/// All supported opcodes.
pub static OPCODES: &[OpCodeInfo] = &[
    op!("nop", 0x00, 0x00, Nop, None, Sequential),
    op!("ldarg.0", 0x00, 0x02, Ldarg, None, Sequential, Implicit::Index(0)),
    op!("ldarg.1", 0x00, 0x03, Ldarg, None, Sequential, Implicit::Index(1)),
    op!("ldarg.2", 0x00, 0x04, Ldarg, None, Sequential, Implicit::Index(2)),
    op!("ldarg.3", 0x00, 0x05, Ldarg, None, Sequential, Implicit::Index(3)),
    op!("ldloc.0", 0x00, 0x06, Ldloc, None, Sequential, Implicit::Index(0)),
    op!("ldloc.1", 0x00, 0x07, Ldloc, None, Sequential, Implicit::Index(1)),
    op!("ldloc.2", 0x00, 0x08, Ldloc, None, Sequential, Implicit::Index(2)),
    op!("ldloc.3", 0x00, 0x09, Ldloc, None, Sequential, Implicit::Index(3)),
    op!("stloc.0", 0x00, 0x0A, Stloc, None, Sequential, Implicit::Index(0)),
    op!("stloc.1", 0x00, 0x0B, Stloc, None, Sequential, Implicit::Index(1)),
    op!("stloc.2", 0x00, 0x0C, Stloc, None, Sequential, Implicit::Index(2)),
    op!("stloc.3", 0x00, 0x0D, Stloc, None, Sequential, Implicit::Index(3)),
    op!("ldarg.s", 0x00, 0x0E, Ldarg, UInt8, Sequential),
    op!("ldarga.s", 0x00, 0x0F, Ldarga, UInt8, Sequential),
    op!("ldloc.s", 0x00, 0x11, Ldloc, UInt8, Sequential),
    op!("ldloca.s", 0x00, 0x12, Ldloca, UInt8, Sequential),
    op!("stloc.s", 0x00, 0x13, Stloc, UInt8, Sequential),
    op!("ldnull", 0x00, 0x14, Ldnull, None, Sequential),
    op!("ldc.i4.m1", 0x00, 0x15, LdcI4, None, Sequential, Implicit::Int(-1)),
    op!("ldc.i4.0", 0x00, 0x16, LdcI4, None, Sequential, Implicit::Int(0)),
    op!("ldc.i4.1", 0x00, 0x17, LdcI4, None, Sequential, Implicit::Int(1)),
    op!("ldc.i4.2", 0x00, 0x18, LdcI4, None, Sequential, Implicit::Int(2)),
    op!("ldc.i4.3", 0x00, 0x19, LdcI4, None, Sequential, Implicit::Int(3)),
    op!("ldc.i4.4", 0x00, 0x1A, LdcI4, None, Sequential, Implicit::Int(4)),
    op!("ldc.i4.5", 0x00, 0x1B, LdcI4, None, Sequential, Implicit::Int(5)),
    op!("ldc.i4.6", 0x00, 0x1C, LdcI4, None, Sequential, Implicit::Int(6)),
    op!("ldc.i4.7", 0x00, 0x1D, LdcI4, None, Sequential, Implicit::Int(7)),
    op!("ldc.i4.8", 0x00, 0x1E, LdcI4, None, Sequential, Implicit::Int(8)),
    op!("ldc.i4.s", 0x00, 0x1F, LdcI4, Int8, Sequential),
    op!("ldc.i4", 0x00, 0x20, LdcI4, Int32, Sequential),
    op!("ldc.i8", 0x00, 0x21, LdcI8, Int64, Sequential),
    op!("ldc.r4", 0x00, 0x22, LdcR4, Float32, Sequential),
    op!("ldc.r8", 0x00, 0x23, LdcR8, Float64, Sequential),
    op!("dup", 0x00, 0x25, Dup, None, Sequential),
    op!("pop", 0x00, 0x26, Pop, None, Sequential),
    op!("call", 0x00, 0x28, Call, Token, Call),
    op!("ret", 0x00, 0x2A, Ret, None, Return),
    op!("br.s", 0x00, 0x2B, Br, Int8, UnconditionalBranch),
    op!("brfalse.s", 0x00, 0x2C, Brfalse, Int8, ConditionalBranch),
    op!("brtrue.s", 0x00, 0x2D, Brtrue, Int8, ConditionalBranch),
    op!("beq.s", 0x00, 0x2E, Beq, Int8, ConditionalBranch),
    op!("bge.s", 0x00, 0x2F, Bge, Int8, ConditionalBranch),
    op!("bgt.s", 0x00, 0x30, Bgt, Int8, ConditionalBranch),
    op!("ble.s", 0x00, 0x31, Ble, Int8, ConditionalBranch),
    op!("blt.s", 0x00, 0x32, Blt, Int8, ConditionalBranch),
    op!("bne.un.s", 0x00, 0x33, BneUn, Int8, ConditionalBranch),
    op!("bge.un.s", 0x00, 0x34, BgeUn, Int8, ConditionalBranch),
    op!("bgt.un.s", 0x00, 0x35, BgtUn, Int8, ConditionalBranch),
    op!("ble.un.s", 0x00, 0x36, BleUn, Int8, ConditionalBranch),
    op!("blt.un.s", 0x00, 0x37, BltUn, Int8, ConditionalBranch),
    op!("br", 0x00, 0x38, Br, Int32, UnconditionalBranch),
    op!("brfalse", 0x00, 0x39, Brfalse, Int32, ConditionalBranch),
    op!("brtrue", 0x00, 0x3A, Brtrue, Int32, ConditionalBranch),
    op!("beq", 0x00, 0x3B, Beq, Int32, ConditionalBranch),
    op!("bge", 0x00, 0x3C, Bge, Int32, ConditionalBranch),
    op!("bgt", 0x00, 0x3D, Bgt, Int32, ConditionalBranch),
    op!("ble", 0x00, 0x3E, Ble, Int32, ConditionalBranch),
    op!("blt", 0x00, 0x3F, Blt, Int32, ConditionalBranch),
    op!("bne.un", 0x00, 0x40, BneUn, Int32, ConditionalBranch),
    op!("bge.un", 0x00, 0x41, BgeUn, Int32, ConditionalBranch),
    op!("bgt.un", 0x00, 0x42, BgtUn, Int32, ConditionalBranch),
    op!("ble.un", 0x00, 0x43, BleUn, Int32, ConditionalBranch),
    op!("blt.un", 0x00, 0x44, BltUn, Int32, ConditionalBranch),
    op!("add", 0x00, 0x58, Add, None, Sequential),
    op!("sub", 0x00, 0x59, Sub, None, Sequential),
    op!("mul", 0x00, 0x5A, Mul, None, Sequential),
    op!("div", 0x00, 0x5B, Div, None, Sequential),
    op!("div.un", 0x00, 0x5C, DivUn, None, Sequential),
    op!("rem", 0x00, 0x5D, Rem, None, Sequential),
    op!("rem.un", 0x00, 0x5E, RemUn, None, Sequential),
    op!("and", 0x00, 0x5F, And, None, Sequential),
    op!("or", 0x00, 0x60, Or, None, Sequential),
    op!("xor", 0x00, 0x61, Xor, None, Sequential),
    op!("shl", 0x00, 0x62, Shl, None, Sequential),
    op!("shr", 0x00, 0x63, Shr, None, Sequential),
    op!("shr.un", 0x00, 0x64, ShrUn, None, Sequential),
    op!("neg", 0x00, 0x65, Neg, None, Sequential),
    op!("not", 0x00, 0x66, Not, None, Sequential),
    op!("conv.i1", 0x00, 0x67, Conv, None, Sequential, Implicit::Type(TypeSignature::I1)),
    op!("conv.i2", 0x00, 0x68, Conv, None, Sequential, Implicit::Type(TypeSignature::I2)),
    op!("conv.i4", 0x00, 0x69, Conv, None, Sequential, Implicit::Type(TypeSignature::I4)),
    op!("conv.i8", 0x00, 0x6A, Conv, None, Sequential, Implicit::Type(TypeSignature::I8)),
    op!("conv.r4", 0x00, 0x6B, Conv, None, Sequential, Implicit::Type(TypeSignature::R4)),
    op!("conv.r8", 0x00, 0x6C, Conv, None, Sequential, Implicit::Type(TypeSignature::R8)),
    op!("conv.u4", 0x00, 0x6D, Conv, None, Sequential, Implicit::Type(TypeSignature::U4)),
    op!("conv.u8", 0x00, 0x6E, Conv, None, Sequential, Implicit::Type(TypeSignature::U8)),
    op!("callvirt", 0x00, 0x6F, Callvirt, Token, Call),
    op!("ldstr", 0x00, 0x72, Ldstr, Token, Sequential),
    op!("castclass", 0x00, 0x74, Castclass, Token, Sequential),
    op!("conv.r.un", 0x00, 0x76, Conv, None, Sequential, Implicit::Type(TypeSignature::R8)),
    op!("ldfld", 0x00, 0x7B, Ldfld, Token, Sequential),
    op!("ldflda", 0x00, 0x7C, Ldflda, Token, Sequential),
    op!("ldsfld", 0x00, 0x7E, Ldsfld, Token, Sequential),
    op!("ldsflda", 0x00, 0x7F, Ldsflda, Token, Sequential),
    op!("box", 0x00, 0x8C, Box, Token, Sequential),
    op!("newarr", 0x00, 0x8D, Newarr, Token, Sequential),
    op!("stelem.ref", 0x00, 0xA2, StelemRef, None, Sequential),
    op!("unbox.any", 0x00, 0xA5, UnboxAny, Token, Sequential),
    op!("conv.u2", 0x00, 0xD1, Conv, None, Sequential, Implicit::Type(TypeSignature::U2)),
    op!("conv.u1", 0x00, 0xD2, Conv, None, Sequential, Implicit::Type(TypeSignature::U1)),
    op!("ceq", 0xFE, 0x01, Ceq, None, Sequential),
    op!("cgt", 0xFE, 0x02, Cgt, None, Sequential),
    op!("cgt.un", 0xFE, 0x03, CgtUn, None, Sequential),
    op!("clt", 0xFE, 0x04, Clt, None, Sequential),
    op!("clt.un", 0xFE, 0x05, CltUn, None, Sequential),
    op!("ldarg", 0xFE, 0x09, Ldarg, UInt16, Sequential),
    op!("ldarga", 0xFE, 0x0A, Ldarga, UInt16, Sequential),
    op!("ldloc", 0xFE, 0x0C, Ldloc, UInt16, Sequential),
    op!("ldloca", 0xFE, 0x0D, Ldloca, UInt16, Sequential),
    op!("stloc", 0xFE, 0x0E, Stloc, UInt16, Sequential),
    op!("constrained.", 0xFE, 0x16, Constrained, Token, Sequential),
];

/// Recognised opcodes outside the supported subset: `(prefix, code, mnemonic)`.
///
/// Stores, object construction, exception handling, switch tables and indirect calls all
/// mean the body is not a single expression.
pub static UNSUPPORTED: &[(u8, u8, &str)] = &[
    (0x00, 0x01, "break"),
    (0x00, 0x10, "starg.s"),
    (0x00, 0x27, "jmp"),
    (0x00, 0x29, "calli"),
    (0x00, 0x45, "switch"),
    (0x00, 0x73, "newobj"),
    (0x00, 0x75, "isinst"),
    (0x00, 0x79, "unbox"),
    (0x00, 0x7A, "throw"),
    (0x00, 0x7D, "stfld"),
    (0x00, 0x80, "stsfld"),
    (0x00, 0x81, "stobj"),
    (0x00, 0x8E, "ldlen"),
    (0x00, 0xA3, "ldelem"),
    (0x00, 0xA4, "stelem"),
    (0x00, 0xD3, "conv.i"),
    (0x00, 0xDC, "endfinally"),
    (0x00, 0xDD, "leave"),
    (0x00, 0xDE, "leave.s"),
    (0x00, 0xE0, "conv.u"),
    (0xFE, 0x06, "ldftn"),
    (0xFE, 0x07, "ldvirtftn"),
    (0xFE, 0x0B, "starg"),
    (0xFE, 0x13, "volatile."),
    (0xFE, 0x14, "tail."),
    (0xFE, 0x15, "initobj"),
    (0xFE, 0x1A, "rethrow"),
    (0xFE, 0x1C, "sizeof"),
];

/// Finds the table entry for an opcode.
#[must_use]
pub fn lookup(prefix: u8, code: u8) -> Option<&'static OpCodeInfo> {
    OPCODES
        .iter()
        .find(|info| info.prefix == prefix && info.code == code)
}

/// Name of an opcode with no entry in [`OPCODES`]: its mnemonic if known, else its hex bytes.
#[must_use]
pub fn unsupported_name(prefix: u8, code: u8) -> String {
    UNSUPPORTED
        .iter()
        .find(|(p, c, _)| *p == prefix && *c == code)
        .map_or_else(
            || {
                if prefix == 0 {
                    format!("0x{code:02X}")
                } else {
                    format!("0x{prefix:02X} 0x{code:02X}")
                }
            },
            |(_, _, mnemonic)| (*mnemonic).to_string(),
        )
}

static MNEMONIC_TO_OPCODE: OnceLock<HashMap<&'static str, &'static OpCodeInfo>> = OnceLock::new();

/// Finds the table entry for a mnemonic.
#[must_use]
pub fn lookup_mnemonic(mnemonic: &str) -> Option<&'static OpCodeInfo> {
    MNEMONIC_TO_OPCODE
        .get_or_init(|| OPCODES.iter().map(|info| (info.mnemonic, info)).collect())
        .get(mnemonic)
        .copied()
}
