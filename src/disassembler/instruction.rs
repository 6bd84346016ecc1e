//! Instruction representations at the two levels the reader produces.
//!
//! [`RawInstruction`] is what the decoder reads straight out of the byte stream: opcode bytes,
//! mnemonic, an unresolved [`Operand`] and absolute branch targets. [`Instruction`] is what the
//! interpreter consumes: a normalised [`OpKind`] (short forms folded into their long form) and
//! a [`ResolvedOperand`] with every token replaced by the member, type or string it names.

use std::{fmt, sync::Arc};

use strum::{Display, EnumIter, IntoStaticStr};

use crate::metadata::{FieldRc, MethodRc, Token, TypeSignature};

/// Encoding of an instruction's inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
}

impl OperandType {
    /// Returns the size in bytes of this operand type.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            OperandType::None => 0,
            OperandType::Int8 | OperandType::UInt8 => 1,
            OperandType::UInt16 => 2,
            OperandType::Int32 | OperandType::Float32 | OperandType::Token => 4,
            OperandType::Int64 | OperandType::Float64 => 8,
        }
    }
}

/// An immediate value read from the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate
    Int8(i8),
    /// Unsigned 8-bit immediate
    UInt8(u8),
    /// Unsigned 16-bit immediate
    UInt16(u16),
    /// Signed 32-bit immediate
    Int32(i32),
    /// Signed 64-bit immediate
    Int64(i64),
    /// 32-bit floating point immediate
    Float32(f32),
    /// 64-bit floating point immediate
    Float64(f64),
}

impl Immediate {
    /// Sign-extends integer immediates; floats yield `None`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Immediate::Int8(v) => Some(i64::from(v)),
            Immediate::UInt8(v) => Some(i64::from(v)),
            Immediate::UInt16(v) => Some(i64::from(v)),
            Immediate::Int32(v) => Some(i64::from(v)),
            Immediate::Int64(v) => Some(v),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }
}

/// Unresolved operand of a [`RawInstruction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Inline immediate (also branch displacements)
    Immediate(Immediate),
    /// Metadata token
    Token(Token),
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
}

/// Semantic operation of an instruction, with short and long encodings folded together.
///
/// The names render as the long-form mnemonic (`Ldarg` is both `ldarg.0` and `ldarg.s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum OpKind {
    Nop,
    Ldarg,
    Ldarga,
    Ldloc,
    Ldloca,
    Stloc,
    Ldnull,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    Ldstr,
    Dup,
    Pop,
    Call,
    Callvirt,
    Ret,
    Br,
    Brfalse,
    Brtrue,
    Beq,
    Bge,
    Bgt,
    Ble,
    Blt,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "bge.un")]
    BgeUn,
    #[strum(serialize = "bgt.un")]
    BgtUn,
    #[strum(serialize = "ble.un")]
    BleUn,
    #[strum(serialize = "blt.un")]
    BltUn,
    Add,
    Sub,
    Mul,
    Div,
    #[strum(serialize = "div.un")]
    DivUn,
    Rem,
    #[strum(serialize = "rem.un")]
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    #[strum(serialize = "shr.un")]
    ShrUn,
    Neg,
    Not,
    Ceq,
    Cgt,
    #[strum(serialize = "cgt.un")]
    CgtUn,
    Clt,
    #[strum(serialize = "clt.un")]
    CltUn,
    Conv,
    Box,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    Castclass,
    Ldfld,
    Ldflda,
    Ldsfld,
    Ldsflda,
    Newarr,
    #[strum(serialize = "stelem.ref")]
    StelemRef,
    #[strum(serialize = "constrained.")]
    Constrained,
}

/// Implicit operand carried by the opcode itself rather than the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Implicit {
    /// Nothing implied
    None,
    /// Argument or local slot (`ldarg.1`, `stloc.0`)
    Index(u16),
    /// Integer constant (`ldc.i4.m1` .. `ldc.i4.8`)
    Int(i32),
    /// Conversion target (`conv.i2`, `conv.r8`)
    Type(TypeSignature),
}

/// A decoded, unresolved instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstruction {
    /// Offset of the first opcode byte within the method body
    pub offset: u32,
    /// Encoded size including prefix and operand
    pub size: u32,
    /// Opcode byte (second byte for `0xFE` opcodes)
    pub opcode: u8,
    /// `0xFE` for two-byte opcodes, `0` otherwise
    pub prefix: u8,
    /// Instruction mnemonic
    pub mnemonic: &'static str,
    /// Normalised operation
    pub kind: OpKind,
    /// Control flow effect
    pub flow_type: FlowType,
    /// Inline operand
    pub operand: Operand,
    /// Operand implied by the opcode
    pub implicit: Implicit,
    /// Absolute branch targets
    pub branch_targets: Vec<u32>,
}

/// Operand of an [`Instruction`] after metadata resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOperand {
    /// No operand
    None,
    /// Argument or local slot
    Index(u16),
    /// 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit float constant
    Float32(f32),
    /// 64-bit float constant
    Float64(f64),
    /// String literal
    String(Arc<str>),
    /// Field reference
    Field(FieldRc),
    /// Method reference
    Method(MethodRc),
    /// Type reference or conversion target
    Type(TypeSignature),
    /// Absolute branch target
    Target(u32),
}

/// A fully resolved instruction: offset, operation and operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset within the method body
    pub offset: u32,
    /// Encoded size
    pub size: u32,
    /// Operation
    pub kind: OpKind,
    /// Resolved operand
    pub operand: ResolvedOperand,
}

impl Instruction {
    /// Offset of the instruction that follows in the stream.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Branch target, for branch instructions.
    #[must_use]
    pub fn target(&self) -> Option<u32> {
        match self.operand {
            ResolvedOperand::Target(target) => Some(target),
            _ => None,
        }
    }

    /// `true` for `br`.
    #[must_use]
    pub fn is_unconditional_branch(&self) -> bool {
        self.kind == OpKind::Br
    }

    /// `true` for every branch that may fall through.
    #[must_use]
    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self.kind,
            OpKind::Brtrue
                | OpKind::Brfalse
                | OpKind::Beq
                | OpKind::Bge
                | OpKind::Bgt
                | OpKind::Ble
                | OpKind::Blt
                | OpKind::BneUn
                | OpKind::BgeUn
                | OpKind::BgtUn
                | OpKind::BleUn
                | OpKind::BltUn
        )
    }

    /// `true` if no instruction executes after this one in its block.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        self.kind == OpKind::Ret || self.is_unconditional_branch() || self.is_conditional_branch()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.kind)?;
        match &self.operand {
            ResolvedOperand::None => Ok(()),
            ResolvedOperand::Index(index) => write!(f, " {index}"),
            ResolvedOperand::Int32(value) => write!(f, " {value}"),
            ResolvedOperand::Int64(value) => write!(f, " {value}"),
            ResolvedOperand::Float32(value) => write!(f, " {value}"),
            ResolvedOperand::Float64(value) => write!(f, " {value}"),
            ResolvedOperand::String(value) => write!(f, " \"{value}\""),
            ResolvedOperand::Field(field) => {
                write!(f, " {}::{}", field.declaring_type, field.name)
            }
            ResolvedOperand::Method(method) => write!(f, " {}", method.id()),
            ResolvedOperand::Type(ty) => write!(f, " {ty}"),
            ResolvedOperand::Target(target) => write!(f, " IL_{target:04x}"),
        }
    }
}
