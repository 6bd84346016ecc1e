//! CIL bytecode reading for the supported instruction subset.
//!
//! Reading a method body happens in two steps. The decoder turns bytes into
//! [`RawInstruction`]s with their mnemonic, unresolved operand and absolute branch targets.
//! [`read_method`] then resolves every token through a [`crate::metadata::MetadataResolver`]
//! and folds short forms into one [`OpKind`] per operation, which is what the decompiler
//! consumes. [`InstructionEncoder`] goes the other way.
//!
//! # Key Types
//! - [`Instruction`] - A resolved instruction
//! - [`RawInstruction`] - A decoded, unresolved instruction
//! - [`OpKind`] - Normalised operation
//! - [`ResolvedOperand`] - Operand after token resolution
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_stream`] - Decode a sequence of instructions
//! - [`read_method`] - Decode and resolve a method body
//!
//! # Example
//! ```rust
//! use dotinline::disassembler::decode_instruction;
//! use dotinline::Parser;
//! let bytecode = &[0x00, 0x2A]; // nop, ret
//! let mut parser = Parser::new(bytecode);
//! let instruction = decode_instruction(&mut parser)?;
//! assert_eq!(instruction.mnemonic, "nop");
//! # Ok::<(), dotinline::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
mod instructions;
mod reader;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::InstructionEncoder;
pub use instruction::{
    FlowType, Immediate, Implicit, Instruction, OpKind, Operand, OperandType, RawInstruction,
    ResolvedOperand,
};
pub use instructions::{lookup, lookup_mnemonic, unsupported_name, OpCodeInfo, OPCODES, UNSUPPORTED};
pub use reader::read_method;
