use std::collections::HashMap;

use crate::{
    expression::{Expr, ParameterId},
    metadata::MemberId,
    Error, Result,
};

/// Transient state of one splice pass.
///
/// Every inlined member opens a scope holding its member identity and the bindings of its
/// formals to the call site's receiver and arguments. Scopes nest the way inlining does;
/// the chain of open scopes is the active path used for cycle and depth checks.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    path: Vec<MemberId>,
    scopes: Vec<HashMap<ParameterId, Expr>>,
    max_depth: usize,
}

impl RewriteContext {
    /// Creates a context allowing at most `max_depth` nested inlinings.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        RewriteContext {
            path: Vec::new(),
            scopes: Vec::new(),
            max_depth,
        }
    }

    /// Fails if `member` may not be inlined from the current position.
    ///
    /// # Errors
    /// [`Error::DecompilationCycle`] when `member` is already being inlined,
    /// [`Error::RecursionLimit`] when the path is at its maximum length.
    pub fn check(&self, member: &MemberId) -> Result<()> {
        if self.path.contains(member) {
            return Err(Error::DecompilationCycle {
                member: member.to_string(),
                path: self.path.iter().map(ToString::to_string).collect(),
            });
        }
        if self.path.len() >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        Ok(())
    }

    /// Opens the scope of `member` with its formal bindings.
    ///
    /// # Errors
    /// See [`RewriteContext::check`].
    pub fn enter(&mut self, member: MemberId, bindings: HashMap<ParameterId, Expr>) -> Result<()> {
        self.check(&member)?;
        self.path.push(member);
        self.scopes.push(bindings);
        Ok(())
    }

    /// Closes the innermost scope.
    pub fn leave(&mut self) {
        self.path.pop();
        self.scopes.pop();
    }

    /// The expression bound to `param` in the innermost scope.
    #[must_use]
    pub fn lookup(&self, param: ParameterId) -> Option<&Expr> {
        self.scopes.last().and_then(|scope| scope.get(&param))
    }

    /// Bindings of the innermost scope, if any scope is open.
    #[must_use]
    pub fn bindings(&self) -> Option<&HashMap<ParameterId, Expr>> {
        self.scopes.last()
    }

    /// Members being inlined, outermost first.
    #[must_use]
    pub fn path(&self) -> &[MemberId] {
        &self.path
    }

    /// Number of open scopes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}
