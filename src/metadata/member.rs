//! Resolved member references.
//!
//! These are the values the bytecode reader substitutes for field and method tokens, and the
//! values a query tree carries in its `MemberAccess` and `Call` nodes. They are shared behind
//! [`Arc`] so that expression trees can be cloned and rebuilt without copying metadata.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::metadata::{signature::TypeSignature, token::Token};

bitflags! {
    /// Attributes of a method relevant to decompilation and splicing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u16 {
        /// No implicit receiver
        const STATIC = 0x0001;
        /// Dispatched through `callvirt`
        const VIRTUAL = 0x0002;
        /// Compiler-named (`get_X`, `op_Equality`, ...)
        const SPECIAL_NAME = 0x0004;
        /// Property getter, rendered as a member access
        const GETTER = 0x0008;
        /// Extension method; the first parameter is the logical receiver
        const EXTENSION = 0x0010;
    }
}

/// Shared reference to a resolved field
pub type FieldRc = Arc<FieldRef>;
/// Shared reference to a resolved method
pub type MethodRc = Arc<MethodRef>;

/// A resolved field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Metadata token of the field
    pub token: Token,
    /// Type declaring the field
    pub declaring_type: TypeSignature,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSignature,
    /// `true` for static fields
    pub is_static: bool,
}

impl FieldRef {
    /// Creates an instance field. The token is assigned when the field is registered with a
    /// [`crate::metadata::MetadataTable`].
    #[must_use]
    pub fn new(declaring_type: TypeSignature, name: &str, field_type: TypeSignature) -> Self {
        FieldRef {
            token: Token::new(0),
            declaring_type,
            name: name.to_string(),
            field_type,
            is_static: false,
        }
    }

    /// Marks the field static.
    #[must_use]
    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// One declared parameter of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    /// Parameter name from metadata
    pub name: String,
    /// Parameter type
    pub param_type: TypeSignature,
}

impl ParamInfo {
    /// Creates a parameter description.
    #[must_use]
    pub fn new(name: &str, param_type: TypeSignature) -> Self {
        ParamInfo {
            name: name.to_string(),
            param_type,
        }
    }
}

/// A resolved method (including property getters and operators).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Metadata token of the method
    pub token: Token,
    /// Type declaring the method
    pub declaring_type: TypeSignature,
    /// Method name as stored in metadata (`get_FullName`, `Concat`, ...)
    pub name: String,
    /// Declared parameters, not counting the implicit receiver
    pub params: Vec<ParamInfo>,
    /// Return type
    pub return_type: TypeSignature,
    /// Method attributes
    pub flags: MethodFlags,
}

impl MethodRef {
    /// Creates an instance method returning `void` with no parameters. Use the builder
    /// methods to fill in the rest.
    #[must_use]
    pub fn new(declaring_type: TypeSignature, name: &str) -> Self {
        MethodRef {
            token: Token::new(0),
            declaring_type,
            name: name.to_string(),
            params: Vec::new(),
            return_type: TypeSignature::Void,
            flags: MethodFlags::empty(),
        }
    }

    /// Creates a property getter named `get_{property}`.
    #[must_use]
    pub fn getter(declaring_type: TypeSignature, property: &str, ty: TypeSignature) -> Self {
        MethodRef::new(declaring_type, &format!("get_{property}"))
            .returns(ty)
            .with_flags(MethodFlags::GETTER | MethodFlags::SPECIAL_NAME)
    }

    /// Sets the return type.
    #[must_use]
    pub fn returns(mut self, ty: TypeSignature) -> Self {
        self.return_type = ty;
        self
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, name: &str, ty: TypeSignature) -> Self {
        self.params.push(ParamInfo::new(name, ty));
        self
    }

    /// Adds method flags.
    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// `true` if the method has no implicit receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// `true` for instance methods, which take `this` as argument 0.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.is_static()
    }

    /// Name of the property this method reads, if it is a getter.
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        if self.flags.contains(MethodFlags::GETTER) {
            self.name.strip_prefix("get_")
        } else {
            None
        }
    }

    /// Identity used for caching and cycle detection.
    #[must_use]
    pub fn id(&self) -> MemberId {
        MemberId::of(self)
    }

    /// Type of the argument at `index`, counting the receiver as index 0 for instance
    /// methods.
    #[must_use]
    pub fn arg_type(&self, index: usize) -> Option<TypeSignature> {
        if self.has_this() {
            if index == 0 {
                return Some(self.declaring_type.clone());
            }
            self.params.get(index - 1).map(|p| p.param_type.clone())
        } else {
            self.params.get(index).map(|p| p.param_type.clone())
        }
    }
}

/// Identity of a member: declaring type, name and signature.
///
/// Two references to the same overload compare equal even when they come from different
/// tokens (a `MethodDef` and a `MemberRef`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId {
    /// Display name of the declaring type
    pub declaring_type: String,
    /// Member name
    pub name: String,
    /// Parameter and return types, `(Int32,String)String`
    pub signature: String,
}

impl MemberId {
    /// Computes the identity of a method.
    #[must_use]
    pub fn of(method: &MethodRef) -> Self {
        let params = method
            .params
            .iter()
            .map(|p| p.param_type.name())
            .collect::<Vec<_>>()
            .join(",");
        MemberId {
            declaring_type: method.declaring_type.name(),
            name: method.name.clone(),
            signature: format!("({params}){}", method.return_type),
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}{}", self.declaring_type, self.name, self.signature)
    }
}
