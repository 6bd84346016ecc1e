//! Expression trees: the value both the decompiler produces and the splicer rewrites.
//!
//! # Key Types
//! - [`Expr`] - A tree node
//! - [`ConstValue`] - Typed constants
//! - [`ParameterExpr`] - Formal parameters with a process-unique [`ParameterId`]
//! - [`BinaryOp`] / [`UnaryOp`] - Operators
//! - [`ExprRewriter`] - Bottom-up rewriting
//! - [`Query`] - Query operator chains
//!
//! Every tree has a canonical textual form through [`std::fmt::Display`], and two trees are
//! equivalent when their forms are equal.

mod display;
mod node;
mod ops;
mod query;
mod visitor;

pub use node::{ConstValue, Expr, Member, ParameterExpr, ParameterId};
pub use ops::{BinaryOp, UnaryOp};
pub use query::Query;
pub use visitor::ExprRewriter;
