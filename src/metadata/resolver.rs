use std::sync::Arc;

use crate::{
    metadata::{
        body::MethodBodyRc,
        member::{FieldRc, MethodRc, MethodRef},
        signature::TypeSignature,
        token::Token,
    },
    Result,
};

/// Resolves the metadata tokens found in instruction operands.
///
/// This is the seam to the runtime reflection layer. Implementations must be shareable
/// across threads since the decompiler may run concurrently for different members.
pub trait MetadataResolver: Send + Sync {
    /// Resolves the operand of `ldfld`, `ldflda`, `ldsfld` and `ldsflda`.
    ///
    /// # Errors
    /// [`crate::Error::UnresolvedToken`] when the token is unknown.
    fn resolve_field(&self, token: Token) -> Result<FieldRc>;

    /// Resolves the operand of `call` and `callvirt`.
    ///
    /// # Errors
    /// [`crate::Error::UnresolvedToken`] when the token is unknown,
    /// [`crate::Error::AmbiguousMemberResolution`] when it matches several methods.
    fn resolve_method(&self, token: Token) -> Result<MethodRc>;

    /// Resolves the operand of `box`, `unbox.any`, `castclass`, `newarr` and `constrained.`.
    ///
    /// # Errors
    /// [`crate::Error::UnresolvedToken`] when the token is unknown.
    fn resolve_type(&self, token: Token) -> Result<TypeSignature>;

    /// Resolves the operand of `ldstr`.
    ///
    /// # Errors
    /// [`crate::Error::UnresolvedToken`] when the token is unknown.
    fn resolve_string(&self, token: Token) -> Result<Arc<str>>;
}

/// Supplies method bodies for decompilation.
pub trait MethodBodyProvider: Send + Sync {
    /// Returns the body of `method`, or `None` when no IL is available (abstract, extern or
    /// foreign members).
    fn method_body(&self, method: &MethodRef) -> Option<MethodBodyRc>;
}
