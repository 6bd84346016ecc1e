//! # dotinline Prelude
//!
//! The types most hosts need to decompile computed members and splice them into queries.
//! Import this module to get them in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotinline operations
pub use crate::Error;

/// The result type used throughout dotinline
pub use crate::Result;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing operands
pub use crate::metadata::Token;

/// Member references and their identity
pub use crate::metadata::{FieldRef, MemberId, MethodFlags, MethodRc, MethodRef};

/// Types of fields, parameters and locals
pub use crate::metadata::TypeSignature;

/// Seams to the reflection layer and the in-memory implementation
pub use crate::metadata::{MetadataResolver, MetadataTable, MethodBody, MethodBodyProvider};

// ================================================================================================
// Bytecode
// ================================================================================================

/// Resolved instructions and the reader producing them
pub use crate::disassembler::{read_method, Instruction};

/// Bytecode construction by mnemonic
pub use crate::disassembler::InstructionEncoder;

// ================================================================================================
// Expression Trees
// ================================================================================================

/// Tree nodes and their building blocks
pub use crate::expression::{BinaryOp, ConstValue, Expr, ParameterExpr, UnaryOp};

/// Bottom-up rewriting
pub use crate::expression::ExprRewriter;

/// Query operator chains
pub use crate::expression::Query;

// ================================================================================================
// Decompilation and Splicing
// ================================================================================================

/// Decompiler entry point and its configuration
pub use crate::decompiler::{Decompiler, DecompilerOptions};

/// Decompiled members and where they are kept
pub use crate::decompiler::{DecompiledCache, DecompiledEntry};

/// Eligibility of members and marker methods
pub use crate::decompiler::{EligibilityRegistry, MarkerKind};

/// Query tree rewriting
pub use crate::splicer::{SpliceMode, SpliceOptions, Splicer};
