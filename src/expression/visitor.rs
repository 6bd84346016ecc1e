use crate::{expression::node::Expr, Result};

/// Bottom-up tree rewriting.
///
/// The default [`ExprRewriter::rewrite`] rebuilds a node from its rewritten children and then
/// hands the rebuilt node to [`ExprRewriter::rewrite_node`], so an implementation only decides
/// what to do with one node whose subtrees are already final. Overriding `rewrite` itself
/// allows a rewriter to act before descending (to stop at a boundary, for instance).
pub trait ExprRewriter {
    /// Rewrites `expr` and everything below it.
    ///
    /// # Errors
    /// Propagates the first error raised by [`ExprRewriter::rewrite_node`].
    fn rewrite(&mut self, expr: &Expr) -> Result<Expr> {
        let rebuilt = expr.try_map_children(|child| self.rewrite(child))?;
        self.rewrite_node(rebuilt)
    }

    /// Rewrites one node whose children have already been rewritten.
    ///
    /// # Errors
    /// Implementation specific.
    fn rewrite_node(&mut self, expr: Expr) -> Result<Expr>;
}
