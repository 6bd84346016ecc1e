//! Metadata collaborators: tokens, type signatures, resolved members and method bodies.
//!
//! The decompiler never scans assemblies itself. Everything it knows about a member arrives
//! through two traits:
//!
//! - [`MetadataResolver`] turns operand tokens into [`FieldRef`], [`MethodRef`],
//!   [`TypeSignature`] and string values
//! - [`MethodBodyProvider`] hands out the raw [`MethodBody`] of a method
//!
//! [`MetadataTable`] implements both over in-memory data.

pub(crate) mod body;
pub(crate) mod member;
pub(crate) mod resolver;
pub(crate) mod signature;
pub(crate) mod table;
pub mod token;

pub use body::{MethodBody, MethodBodyRc};
pub use member::{FieldRc, FieldRef, MemberId, MethodFlags, MethodRc, MethodRef, ParamInfo};
pub use resolver::{MetadataResolver, MethodBodyProvider};
pub use signature::TypeSignature;
pub use table::MetadataTable;
pub use token::Token;
