use std::sync::Arc;

use crate::metadata::{member::MethodRc, signature::TypeSignature};

/// The raw body of a method as supplied by the reflection layer.
///
/// `code` holds the CIL instruction bytes only (no method header), `locals` the types of
/// the local variable slots in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// The method this body belongs to
    pub method: MethodRc,
    /// CIL instruction bytes
    pub code: Vec<u8>,
    /// Local variable slot types
    pub locals: Vec<TypeSignature>,
    /// Maximum evaluation stack depth declared in the method header
    pub max_stack: u16,
}

impl MethodBody {
    /// Creates a body with no locals.
    #[must_use]
    pub fn new(method: MethodRc, code: Vec<u8>) -> Self {
        MethodBody {
            method,
            code,
            locals: Vec::new(),
            max_stack: 8,
        }
    }

    /// Sets the local variable slot types.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<TypeSignature>) -> Self {
        self.locals = locals;
        self
    }

    /// Sets the declared maximum stack depth.
    #[must_use]
    pub fn with_max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }
}

/// Shared reference to a method body
pub type MethodBodyRc = Arc<MethodBody>;
