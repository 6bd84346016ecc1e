//! Inlining of computed members into query expression trees.
//!
//! The [`Splicer`] walks a caller's tree bottom-up. Every property read or call whose member is
//! registered with the [`crate::decompiler::EligibilityRegistry`] is replaced by the member's
//! decompiled body, with the body's formals bound to the node's receiver and arguments. The
//! substituted body is itself spliced, so computed members that use other computed members
//! are expanded transitively, up to the configured depth.
//!
//! Nothing else in the tree changes: query operator calls, lambdas and captured values are
//! rebuilt with the same shape, so an ordering or projection clause stays exactly where it
//! was.
//!
//! # Markers
//!
//! Two marker methods steer splicing from inside a query (see
//! [`crate::decompiler::MarkerKind`]):
//! - an opaque marker is stripped and its argument kept as written, so a computed member inside
//!   it stays a plain member access
//! - a computed marker is stripped and its argument expanded even when the member is not
//!   registered, as long as a body is available
//!
//! # Failures
//!
//! In [`SpliceMode::Strict`] the first member that cannot be decompiled fails the whole splice
//! with [`crate::Error::Decompilation`] naming the member. In [`SpliceMode::Permissive`] (the
//! default) that call site is left unexpanded, a warning is logged, and splicing continues.
//! Either way a call site is expanded completely or not at all.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotinline::{
//!     decompiler::{Decompiler, EligibilityRegistry},
//!     disassembler::InstructionEncoder,
//!     expression::{BinaryOp, Expr, ParameterExpr, Query},
//!     metadata::{FieldRef, MetadataTable, MethodRef, TypeSignature},
//!     splicer::Splicer,
//! };
//!
//! let employee = TypeSignature::class("Employee");
//! let mut table = MetadataTable::new();
//! let id = table.add_field(FieldRef::new(employee.clone(), "Id", TypeSignature::I4));
//! let next = table.add_method(MethodRef::getter(employee.clone(), "NextId", TypeSignature::I4));
//!
//! let mut il = InstructionEncoder::new();
//! il.emit_ldarg(0)?;
//! il.emit_token("ldfld", id.token)?;
//! il.emit_ldc_i4(1)?;
//! il.emit_instruction("add", None)?;
//! il.emit_instruction("ret", None)?;
//! table.set_body(&next, il.finalize()?, Vec::new());
//!
//! let decompiler = Decompiler::for_table(
//!     Arc::new(table),
//!     EligibilityRegistry::new().with(next.clone()),
//! );
//!
//! let e = ParameterExpr::new("e", employee.clone());
//! let query = Query::source(employee).filter(
//!     e.clone(),
//!     Expr::binary(BinaryOp::GreaterThan, Expr::property(Some(e.expr()), next), Expr::int(5)),
//! );
//!
//! let spliced = Splicer::new(&decompiler).splice_query(&query)?;
//! assert_eq!(
//!     spliced.to_string(),
//!     "value(EnumerableQuery<Employee>).Where(e => ((e.Id + 1) > 5))"
//! );
//! # Ok::<(), dotinline::Error>(())
//! ```

mod context;

pub use context::RewriteContext;

use crate::{
    decompiler::{Decompiler, MarkerKind},
    expression::{Expr, ExprRewriter, Member, Query},
    metadata::MethodRc,
    Error, Result,
};

/// How a member that cannot be decompiled is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum SpliceMode {
    /// Fail the splice
    Strict,
    /// Keep the call site unexpanded and continue
    #[default]
    Permissive,
}

/// Tuning of a [`Splicer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceOptions {
    /// Failure handling
    pub mode: SpliceMode,
    /// Maximum number of nested member expansions
    pub max_depth: usize,
}

impl Default for SpliceOptions {
    fn default() -> Self {
        SpliceOptions {
            mode: SpliceMode::Permissive,
            max_depth: 32,
        }
    }
}

impl SpliceOptions {
    /// Default options in strict mode.
    #[must_use]
    pub fn strict() -> Self {
        Self::default().with_mode(SpliceMode::Strict)
    }

    /// Sets the failure handling.
    #[must_use]
    pub fn with_mode(mut self, mode: SpliceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the maximum expansion depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Rewrites expression trees, replacing computed members with their bodies.
#[derive(Debug, Clone, Copy)]
pub struct Splicer<'a> {
    decompiler: &'a Decompiler,
    options: SpliceOptions,
}

impl<'a> Splicer<'a> {
    /// Creates a splicer with default options.
    #[must_use]
    pub fn new(decompiler: &'a Decompiler) -> Self {
        Self::with_options(decompiler, SpliceOptions::default())
    }

    /// Creates a splicer with explicit options.
    #[must_use]
    pub fn with_options(decompiler: &'a Decompiler, options: SpliceOptions) -> Self {
        Splicer {
            decompiler,
            options,
        }
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> SpliceOptions {
        self.options
    }

    /// Returns a copy of `expr` with every eligible member reference expanded.
    ///
    /// `expr` itself is never modified.
    ///
    /// # Errors
    /// In strict mode, [`Error::Decompilation`] for the first member that could not be
    /// expanded. Permissive mode does not fail on member errors.
    pub fn splice(&self, expr: &Expr) -> Result<Expr> {
        log::trace!("Splicing {}", expr);
        let mut pass = SplicePass {
            decompiler: self.decompiler,
            mode: self.options.mode,
            context: RewriteContext::new(self.options.max_depth),
        };
        pass.rewrite(expr)
    }

    /// [`Splicer::splice`] over a query, keeping its element type.
    ///
    /// # Errors
    /// See [`Splicer::splice`].
    pub fn splice_query(&self, query: &Query) -> Result<Query> {
        Ok(Query::from_expr(
            self.splice(query.expr())?,
            query.element().clone(),
        ))
    }
}

struct SplicePass<'a> {
    decompiler: &'a Decompiler,
    mode: SpliceMode,
    context: RewriteContext,
}

impl SplicePass<'_> {
    /// Expands `original`, whose children are already spliced, into the body of `method`.
    fn splice_member(&mut self, original: Expr, method: &MethodRc) -> Result<Expr> {
        let member = method.id();
        match self.inline(method, call_arguments(&original)) {
            Ok(body) => {
                log::debug!("Spliced {} at depth {}", member, self.context.depth());
                Ok(body)
            }
            Err(err) => match self.mode {
                SpliceMode::Strict => Err(Error::Decompilation {
                    member: member.to_string(),
                    source: Box::new(err),
                }),
                SpliceMode::Permissive => {
                    log::warn!("Leaving {} unexpanded: {}", member, err);
                    Ok(original)
                }
            },
        }
    }

    fn inline(&mut self, method: &MethodRc, args: Vec<Expr>) -> Result<Expr> {
        let member = method.id();
        self.context.check(&member)?;

        let entry = self
            .decompiler
            .decompile_on_path(method, self.context.path())?;
        let bindings = entry.bindings(&args)?;

        self.context.enter(member, bindings)?;
        let body = self.rewrite(&entry.body);
        self.context.leave();
        body
    }

    /// The argument of an opaque marker: formals are bound, nothing is expanded.
    fn bind_only(&self, inner: &Expr) -> Expr {
        match self.context.bindings() {
            Some(bindings) => inner.substitute(bindings),
            None => inner.clone(),
        }
    }

    /// The argument of a computed marker, expanded whenever a body exists.
    fn force(&mut self, inner: &Expr) -> Result<Expr> {
        if member_of(inner).is_none() {
            return self.rewrite(inner);
        }

        let rebuilt = inner.try_map_children(|child| self.rewrite(child))?;
        match member_of(&rebuilt) {
            Some(method) if self.decompiler.has_body(&method) => {
                self.splice_member(rebuilt, &method)
            }
            _ => self.rewrite_node(rebuilt),
        }
    }
}

impl ExprRewriter for SplicePass<'_> {
    fn rewrite(&mut self, expr: &Expr) -> Result<Expr> {
        match expr {
            Expr::Parameter(param) => {
                if let Some(bound) = self.context.lookup(param.id) {
                    return Ok(bound.clone());
                }
            }
            Expr::Call {
                target: None,
                method,
                args,
            } => match (self.decompiler.registry().marker(method), args.as_slice()) {
                (Some(MarkerKind::Opaque), [inner]) => return Ok(self.bind_only(inner)),
                (Some(MarkerKind::Computed), [inner]) => return self.force(inner),
                _ => {}
            },
            _ => {}
        }

        let rebuilt = expr.try_map_children(|child| self.rewrite(child))?;
        self.rewrite_node(rebuilt)
    }

    fn rewrite_node(&mut self, expr: Expr) -> Result<Expr> {
        match member_of(&expr) {
            Some(method) if self.decompiler.registry().is_decompilable(&method) => {
                self.splice_member(expr, &method)
            }
            _ => Ok(expr),
        }
    }
}

/// The method behind a property read or call node.
fn member_of(expr: &Expr) -> Option<MethodRc> {
    match expr {
        Expr::MemberAccess {
            member: Member::Property(getter),
            ..
        } => Some(getter.clone()),
        Expr::Call { method, .. } => Some(method.clone()),
        _ => None,
    }
}

/// Receiver (when present) followed by the arguments of a property read or call node.
fn call_arguments(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::MemberAccess { target, .. } => target.iter().map(|t| (**t).clone()).collect(),
        Expr::Call { target, args, .. } => target
            .iter()
            .map(|t| (**t).clone())
            .chain(args.iter().cloned())
            .collect(),
        _ => Vec::new(),
    }
}
