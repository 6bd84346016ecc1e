use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! control_flow_error {
    ($offset:expr, $($arg:tt)*) => {
        crate::Error::UnsupportedControlFlow {
            offset: $offset,
            reason: format!($($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure raised while reading, decompiling or splicing a member is scoped to that one
/// member. Shared state (the decompiled-entry cache, the eligibility registry) is never left
/// half-written by an error, so a caller may always decide between propagating the error and
/// degrading the call site to an opaque call.
///
/// # Error Categories
///
/// ## Bytecode Errors
/// - [`Error::UnsupportedInstruction`] - Opcode with no expression-level meaning
/// - [`Error::Malformed`] - Truncated or corrupted instruction stream
/// - [`Error::OutOfBounds`] - Attempted to read beyond the instruction stream
///
/// ## Decompilation Errors
/// - [`Error::UnsupportedControlFlow`] - Branch shape outside the recognized idioms
/// - [`Error::DecompilationCycle`] - Inlining revisited a member on the active path
/// - [`Error::RecursionLimit`] - Maximum inlining depth exceeded
/// - [`Error::StackUnderflow`] - Instruction popped more values than the stack held
///
/// ## Metadata Errors
/// - [`Error::AmbiguousMemberResolution`] - Call site resolved to several members
/// - [`Error::UnresolvedToken`] - Token unknown to the metadata resolver
/// - [`Error::NotDecompilable`] - No body available for the requested member
///
/// # Examples
///
/// ```rust,no_run
/// use dotinline::Error;
///
/// fn report(result: dotinline::Result<()>) {
///     match result {
///         Ok(()) => {}
///         Err(Error::UnsupportedInstruction { opcode, offset }) => {
///             eprintln!("cannot decompile '{}' at IL_{:04x}", opcode, offset);
///         }
///         Err(Error::DecompilationCycle { member, path }) => {
///             eprintln!("{} recurses through {}", member, path.join(" -> "));
///         }
///         Err(e) => eprintln!("other error: {}", e),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The instruction stream is damaged.
    ///
    /// Raised when an operand is truncated, a branch target falls outside the method body,
    /// or the encoder is handed inconsistent input.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the instruction stream.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The bytecode reader encountered an instruction with no semantic mapping.
    ///
    /// Only the subset of CIL needed for expression-shaped bodies is supported. Stores to
    /// fields or arguments, object construction, exception handling and switch tables all
    /// end up here.
    #[error("Unsupported instruction '{opcode}' at IL_{offset:04x}")]
    UnsupportedInstruction {
        /// Mnemonic of the instruction, or its hex encoding when unknown
        opcode: String,
        /// Offset of the instruction in the method body
        offset: u32,
    },

    /// A branch shape did not match any recognized expression idiom.
    ///
    /// Loops, multi-statement bodies and assignments produce this error.
    #[error("Unsupported control flow at IL_{offset:04x}: {reason}")]
    UnsupportedControlFlow {
        /// Offset of the instruction that introduced the shape
        offset: u32,
        /// Why the shape was rejected
        reason: String,
    },

    /// Recursive inlining revisited a member already on the active path.
    #[error("Decompilation cycle detected for {member} (path: {})", .path.join(" -> "))]
    DecompilationCycle {
        /// The member that was revisited
        member: String,
        /// Members on the active path, outermost first
        path: Vec<String>,
    },

    /// Metadata resolution at a call site yielded no unique target.
    #[error("Ambiguous member resolution for {member}: {} candidates", .candidates.len())]
    AmbiguousMemberResolution {
        /// The reference that was being resolved
        member: String,
        /// All members that matched the reference
        candidates: Vec<String>,
    },

    /// A metadata token could not be resolved.
    #[error("Unresolved token - {0}")]
    UnresolvedToken(Token),

    /// An instruction popped more values than the symbolic stack held.
    #[error("Stack underflow at IL_{offset:04x}")]
    StackUnderflow {
        /// Offset of the offending instruction
        offset: u32,
    },

    /// Reach the maximum recursion level allowed.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The member has no body the decompiler could read.
    #[error("Member is not decompilable - {0}")]
    NotDecompilable(String),

    /// A member-scoped failure, annotated with the member it happened in.
    #[error("Failed to decompile {member}: {source}")]
    Decompilation {
        /// Identity of the member whose body failed
        member: String,
        /// The underlying failure
        source: Box<Error>,
    },

    /// The encoder was asked for a mnemonic it does not know.
    #[error("Invalid mnemonic - {0}")]
    InvalidMnemonic(String),

    /// An operand did not match the operand type of its instruction.
    #[error("Wrong operand type - expected {expected}")]
    WrongOperandType {
        /// The operand type the instruction requires
        expected: String,
    },

    /// A branch referenced a label that was never defined.
    #[error("Undefined label - {0}")]
    UndefinedLabel(String),

    /// A label was defined twice.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(String),
}

impl Error {
    /// Returns the innermost error, looking through [`Error::Decompilation`] wrappers.
    ///
    /// Inlining nests member-scoped failures; callers matching on the taxonomy usually
    /// want the original cause.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Decompilation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_members() {
        let inner = Error::UnsupportedInstruction {
            opcode: "stfld".to_string(),
            offset: 3,
        };
        let wrapped = Error::Decompilation {
            member: "Employee::get_A".to_string(),
            source: Box::new(Error::Decompilation {
                member: "Employee::get_B".to_string(),
                source: Box::new(inner.clone()),
            }),
        };

        assert_eq!(wrapped.root_cause(), &inner);
    }

    #[test]
    fn test_display_messages() {
        let err = Error::DecompilationCycle {
            member: "A::get_X".to_string(),
            path: vec!["A::get_X".to_string(), "A::get_Y".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Decompilation cycle detected for A::get_X (path: A::get_X -> A::get_Y)"
        );

        let err = Error::UnsupportedInstruction {
            opcode: "newobj".to_string(),
            offset: 0x1a,
        };
        assert_eq!(err.to_string(), "Unsupported instruction 'newobj' at IL_001a");

        let malformed = malformed_error!("bad branch {}", 7);
        assert!(matches!(malformed, Error::Malformed { .. }));
    }
}
