//! Which members the splicer may expand.
//!
//! The registry is the explicit opt-in list: a member is decompiled and spliced only when it
//! is registered here. It also names the marker methods hosts use to steer splicing from
//! inside a query: an opaque marker stops expansion of its argument, a computed marker forces
//! expansion of a member that is not registered.

use std::collections::HashMap;

use crate::metadata::{MemberId, MethodRc, MethodRef, TypeSignature};

/// Role of a marker method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum MarkerKind {
    /// The argument is left as written: an inlining boundary
    Opaque,
    /// The argument is expanded even if its member is not registered
    Computed,
}

/// Members eligible for decompilation and the marker methods in use.
#[derive(Debug, Clone, Default)]
pub struct EligibilityRegistry {
    members: HashMap<MemberId, MethodRc>,
    markers: HashMap<(String, String), MarkerKind>,
}

impl EligibilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `method` as decompilable. Registering a member twice has no further effect.
    pub fn register(&mut self, method: MethodRc) {
        self.members.entry(method.id()).or_insert(method);
    }

    /// Builder form of [`EligibilityRegistry::register`].
    #[must_use]
    pub fn with(mut self, method: MethodRc) -> Self {
        self.register(method);
        self
    }

    /// `true` if `method` may be decompiled and spliced.
    #[must_use]
    pub fn is_decompilable(&self, method: &MethodRef) -> bool {
        self.members.contains_key(&method.id())
    }

    /// The registered method with identity `id`.
    #[must_use]
    pub fn get(&self, id: &MemberId) -> Option<&MethodRc> {
        self.members.get(id)
    }

    /// All registered methods.
    pub fn members(&self) -> impl Iterator<Item = &MethodRc> {
        self.members.values()
    }

    /// Number of registered members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Declares the static method `declaring_type::name` a marker of the given kind.
    pub fn register_marker(&mut self, declaring_type: &TypeSignature, name: &str, kind: MarkerKind) {
        self.markers
            .insert((declaring_type.name(), name.to_string()), kind);
    }

    /// The marker role of `method`, if it is a marker.
    #[must_use]
    pub fn marker(&self, method: &MethodRef) -> Option<MarkerKind> {
        self.markers
            .get(&(method.declaring_type.name(), method.name.clone()))
            .copied()
    }
}
