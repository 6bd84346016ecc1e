//! Decompilation of member bodies into expression trees.
//!
//! The decompiler reads a member's CIL through the [`crate::disassembler`], interprets it
//! symbolically, and stores the resulting [`DecompiledEntry`] in a shared
//! [`DecompiledCache`]. Calls to other registered members are expanded while the body is
//! read, so an entry is already free of eligible calls when it is stored.
//!
//! # Key Types
//! - [`Decompiler`] - Entry point, owns the collaborators and the cache
//! - [`DecompilerOptions`] - Depth limit and failure caching
//! - [`DecompiledEntry`] - Formals and body of one member
//! - [`DecompiledCache`] - Concurrent write-once entry store
//! - [`EligibilityRegistry`] - Registered members and marker methods
//! - [`Interpreter`] / [`Idiom`] - Symbolic execution and branch idioms
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotinline::{
//!     decompiler::{Decompiler, EligibilityRegistry},
//!     disassembler::InstructionEncoder,
//!     metadata::{FieldRef, MetadataTable, MethodFlags, MethodRef, TypeSignature},
//! };
//!
//! let employee = TypeSignature::class("Employee");
//! let mut table = MetadataTable::new();
//! let first = table.add_field(FieldRef::new(employee.clone(), "FirstName", TypeSignature::String));
//! let last = table.add_field(FieldRef::new(employee.clone(), "LastName", TypeSignature::String));
//! let space = table.add_string(" ");
//! let concat = table.add_method(
//!     MethodRef::new(TypeSignature::String, "Concat")
//!         .param("a", TypeSignature::String)
//!         .param("b", TypeSignature::String)
//!         .param("c", TypeSignature::String)
//!         .returns(TypeSignature::String)
//!         .with_flags(MethodFlags::STATIC),
//! );
//! let full_name = table.add_method(MethodRef::getter(employee, "FullName", TypeSignature::String));
//!
//! let mut il = InstructionEncoder::new();
//! il.emit_ldarg(0)?;
//! il.emit_token("ldfld", first.token)?;
//! il.emit_token("ldstr", space)?;
//! il.emit_ldarg(0)?;
//! il.emit_token("ldfld", last.token)?;
//! il.emit_token("call", concat.token)?;
//! il.emit_instruction("ret", None)?;
//! table.set_body(&full_name, il.finalize()?, Vec::new());
//!
//! let registry = EligibilityRegistry::new().with(full_name.clone());
//! let decompiler = Decompiler::for_table(Arc::new(table), registry);
//!
//! let entry = decompiler.decompile(&full_name)?;
//! assert_eq!(entry.body.to_string(), "((this.FirstName + \" \") + this.LastName)");
//! # Ok::<(), dotinline::Error>(())
//! ```

mod cache;
mod entry;
mod flow;
mod frame;
mod idioms;
mod interpreter;
mod registry;

pub use cache::DecompiledCache;
pub use entry::DecompiledEntry;
pub use flow::{BasicBlock, ControlFlow};
pub use frame::SymbolicFrame;
pub use idioms::{coerce_to, negate, reconstruct, Arms, Guard, Idiom};
pub use interpreter::{formals, interpret, CallInliner, Interpreter, NoInlining};
pub use registry::{EligibilityRegistry, MarkerKind};

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    disassembler::read_method,
    expression::Expr,
    metadata::{MemberId, MetadataResolver, MetadataTable, MethodBodyProvider, MethodRc, MethodRef},
    Error, Result,
};

/// Tuning of a [`Decompiler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompilerOptions {
    /// Maximum number of members on one inlining path
    pub max_depth: usize,
    /// Store failed decompilations in the cache instead of retrying them
    pub cache_failures: bool,
}

impl Default for DecompilerOptions {
    fn default() -> Self {
        DecompilerOptions {
            max_depth: 32,
            cache_failures: false,
        }
    }
}

impl DecompilerOptions {
    /// Sets the maximum inlining depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enables or disables caching of failures.
    #[must_use]
    pub fn with_cache_failures(mut self, cache_failures: bool) -> Self {
        self.cache_failures = cache_failures;
        self
    }
}

/// Decompiles members and caches the result.
///
/// A `Decompiler` is `Send + Sync`; one instance (or several sharing a cache through
/// [`Decompiler::with_shared_cache`]) can serve concurrent callers.
pub struct Decompiler {
    resolver: Arc<dyn MetadataResolver>,
    bodies: Arc<dyn MethodBodyProvider>,
    registry: Arc<EligibilityRegistry>,
    cache: Arc<DecompiledCache>,
    options: DecompilerOptions,
}

impl Decompiler {
    /// Creates a decompiler with default options and a private cache.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        bodies: Arc<dyn MethodBodyProvider>,
        registry: EligibilityRegistry,
    ) -> Self {
        Self::with_options(resolver, bodies, registry, DecompilerOptions::default())
    }

    /// Creates a decompiler with explicit options and a private cache.
    #[must_use]
    pub fn with_options(
        resolver: Arc<dyn MetadataResolver>,
        bodies: Arc<dyn MethodBodyProvider>,
        registry: EligibilityRegistry,
        options: DecompilerOptions,
    ) -> Self {
        let cache = if options.cache_failures {
            DecompiledCache::with_failures()
        } else {
            DecompiledCache::new()
        };
        Self::with_shared_cache(resolver, bodies, Arc::new(registry), Arc::new(cache), options)
    }

    /// Creates a decompiler over an existing registry and cache.
    #[must_use]
    pub fn with_shared_cache(
        resolver: Arc<dyn MetadataResolver>,
        bodies: Arc<dyn MethodBodyProvider>,
        registry: Arc<EligibilityRegistry>,
        cache: Arc<DecompiledCache>,
        options: DecompilerOptions,
    ) -> Self {
        Decompiler {
            resolver,
            bodies,
            registry,
            cache,
            options,
        }
    }

    /// Creates a decompiler whose metadata and bodies both come from `table`.
    #[must_use]
    pub fn for_table(table: Arc<MetadataTable>, registry: EligibilityRegistry) -> Self {
        Self::new(table.clone(), table, registry)
    }

    /// The registry of eligible members and markers.
    #[must_use]
    pub fn registry(&self) -> &EligibilityRegistry {
        &self.registry
    }

    /// The entry cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<DecompiledCache> {
        &self.cache
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> DecompilerOptions {
        self.options
    }

    /// `true` if a body is available for `method`.
    #[must_use]
    pub fn has_body(&self, method: &MethodRef) -> bool {
        self.bodies.method_body(method).is_some()
    }

    /// Returns the decompiled form of `method`, decompiling it on first use.
    ///
    /// # Errors
    /// - [`Error::NotDecompilable`] when no body is available
    /// - [`Error::UnsupportedInstruction`] / [`Error::UnsupportedControlFlow`] for bodies that
    ///   are not a single expression
    /// - [`Error::DecompilationCycle`] / [`Error::RecursionLimit`] for recursive members
    pub fn decompile(&self, method: &MethodRef) -> Result<Arc<DecompiledEntry>> {
        self.decompile_on_path(method, &[])
    }

    /// Decompiles `method` as part of an inlining chain whose active members are `path`,
    /// outermost first.
    ///
    /// # Errors
    /// See [`Decompiler::decompile`]. Fails with [`Error::DecompilationCycle`] when `method`
    /// is already on `path` and with [`Error::RecursionLimit`] when `path` is as long as the
    /// configured maximum depth.
    pub fn decompile_on_path(
        &self,
        method: &MethodRef,
        path: &[MemberId],
    ) -> Result<Arc<DecompiledEntry>> {
        let member = method.id();
        if path.contains(&member) {
            return Err(Error::DecompilationCycle {
                member: member.to_string(),
                path: path.iter().map(ToString::to_string).collect(),
            });
        }
        if path.len() >= self.options.max_depth {
            return Err(Error::RecursionLimit(self.options.max_depth));
        }

        self.cache
            .get_or_create(&member, || self.build(method, &member, path))
    }

    fn build(&self, method: &MethodRef, member: &MemberId, path: &[MemberId]) -> Result<DecompiledEntry> {
        log::debug!("Decompiling {}", member);

        let body = self
            .bodies
            .method_body(method)
            .ok_or_else(|| Error::NotDecompilable(member.to_string()))?;
        let instructions = read_method(&body.code, self.resolver.as_ref())?;
        let params = formals(method);

        let mut inner_path = path.to_vec();
        inner_path.push(member.clone());
        let inliner = PathInliner {
            decompiler: self,
            path: inner_path,
        };
        let expr = interpret(&instructions, method, &params, &body.locals, &inliner)?;

        log::debug!("Decompiled {} to {}", member, expr);
        Ok(DecompiledEntry {
            member: member.clone(),
            method: self.shared(method),
            params,
            body: expr,
        })
    }

    /// The registered `Arc` for `method`, or a fresh one.
    fn shared(&self, method: &MethodRef) -> MethodRc {
        self.registry
            .get(&method.id())
            .cloned()
            .unwrap_or_else(|| Arc::new(method.clone()))
    }

    /// Decompiles every registered member in parallel, filling the cache.
    ///
    /// Returns the members that failed, with their errors. Warming is idempotent: members
    /// already cached are not decompiled again.
    #[must_use]
    pub fn warm(&self) -> Vec<(MemberId, Error)> {
        let members = self.registry.members().cloned().collect::<Vec<_>>();
        let mut failures = members
            .par_iter()
            .filter_map(|method| match self.decompile(method) {
                Ok(_) => None,
                Err(err) => Some((method.id(), err)),
            })
            .collect::<Vec<_>>();
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        failures
    }
}

impl std::fmt::Debug for Decompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompiler")
            .field("registered", &self.registry.len())
            .field("cached", &self.cache.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Inlines registered callees while a body is being interpreted, tracking the inlining path.
struct PathInliner<'a> {
    decompiler: &'a Decompiler,
    path: Vec<MemberId>,
}

impl CallInliner for PathInliner<'_> {
    fn try_inline(&self, method: &MethodRc, args: &[Expr]) -> Result<Option<Expr>> {
        if !self.decompiler.registry.is_decompilable(method) {
            return Ok(None);
        }

        let entry = self.decompiler.decompile_on_path(method, &self.path)?;
        log::trace!("Inlining {} into {:?}", entry.member, self.path.last());
        entry.bind(args).map(Some)
    }
}
