use std::{collections::HashMap, fmt};

use crate::{
    expression::{Expr, ParameterExpr, ParameterId},
    metadata::{MemberId, MethodRc},
    Result,
};

/// The decompiled form of one member: its formals and the expression its body computes.
///
/// Entries are immutable once built and shared through the
/// [`crate::decompiler::DecompiledCache`]. Splicing never modifies an entry; it substitutes
/// into a copy of [`DecompiledEntry::body`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecompiledEntry {
    /// Identity of the member
    pub member: MemberId,
    /// The member itself
    pub method: MethodRc,
    /// Formals in argument order, `this` first for instance members
    pub params: Vec<ParameterExpr>,
    /// Expression computed by the body, in terms of `params`
    pub body: Expr,
}

impl DecompiledEntry {
    /// Pairs each formal with an argument.
    ///
    /// # Errors
    /// [`crate::Error::Malformed`] when the argument count differs from the number of
    /// formals.
    pub fn bindings(&self, args: &[Expr]) -> Result<HashMap<ParameterId, Expr>> {
        if args.len() != self.params.len() {
            return Err(malformed_error!(
                "{} takes {} arguments, {} supplied",
                self.member,
                self.params.len(),
                args.len()
            ));
        }

        Ok(self
            .params
            .iter()
            .map(|param| param.id)
            .zip(args.iter().cloned())
            .collect())
    }

    /// The body with every formal replaced by the matching argument.
    ///
    /// # Errors
    /// See [`DecompiledEntry::bindings`].
    pub fn bind(&self, args: &[Expr]) -> Result<Expr> {
        Ok(self.body.substitute(&self.bindings(args)?))
    }

    /// The entry as a lambda over its formals.
    #[must_use]
    pub fn as_lambda(&self) -> Expr {
        Expr::lambda(self.params.clone(), self.body.clone())
    }
}

impl fmt::Display for DecompiledEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_lambda())
    }
}
