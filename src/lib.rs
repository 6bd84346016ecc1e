// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotinline
//!
//! Inlining of computed .NET members into query expression trees.
//!
//! A computed member is a property getter, instance method or extension method whose body is a
//! single expression over fields and arguments (`FirstName + " " + LastName`). Query providers
//! cannot translate a call to such a member, but they can translate its body. `dotinline` reads
//! the member's CIL, reconstructs the body as an expression tree, and substitutes it at every
//! call site of a query, so the provider sees the same tree it would have seen had the query
//! been written against the fields directly.
//!
//! ## Features
//!
//! - **Bytecode reading** - CIL decoding with resolved field, method, type and string operands
//! - **Symbolic interpretation** - Stack simulation producing one expression per member
//! - **Idiom recovery** - Short-circuit booleans, ternaries and null coalescing from branches
//! - **Concurrent caching** - Write-once decompilation cache shared across threads
//! - **Capture-correct splicing** - Bottom-up substitution that leaves query structure intact
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dotinline::prelude::*;
//!
//! let employee = TypeSignature::class("Employee");
//! let mut table = MetadataTable::new();
//! let active = table.add_field(FieldRef::new(employee.clone(), "Active", TypeSignature::Boolean));
//! let is_active = table.add_method(MethodRef::getter(
//!     employee.clone(),
//!     "IsActive",
//!     TypeSignature::Boolean,
//! ));
//!
//! let mut il = InstructionEncoder::new();
//! il.emit_ldarg(0)?;
//! il.emit_token("ldfld", active.token)?;
//! il.emit_instruction("ret", None)?;
//! table.set_body(&is_active, il.finalize()?, Vec::new());
//!
//! let decompiler = Decompiler::for_table(
//!     Arc::new(table),
//!     EligibilityRegistry::new().with(is_active.clone()),
//! );
//!
//! let e = ParameterExpr::new("e", employee.clone());
//! let query = Query::source(employee).filter(e.clone(), Expr::property(Some(e.expr()), is_active));
//! let spliced = Splicer::new(&decompiler).splice_query(&query)?;
//!
//! assert_eq!(
//!     spliced.to_string(),
//!     "value(EnumerableQuery<Employee>).Where(e => e.Active)"
//! );
//! # Ok::<(), dotinline::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Tokens, member references, type signatures and the resolver seams
//! - [`disassembler`] - CIL decoding, resolution and encoding
//! - [`expression`] - Expression trees and their canonical textual form
//! - [`decompiler`] - Symbolic interpretation, idioms, cache and eligibility registry
//! - [`splicer`] - Rewriting of query trees
//! - [`prelude`] - Convenient re-exports
//!
//! The reflection layer that supplies bytecode is abstracted behind
//! [`metadata::MetadataResolver`] and [`metadata::MethodBodyProvider`];
//! [`metadata::MetadataTable`] is an in-memory implementation of both.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Failures are scoped to one member: a body
//! that is not a single expression fails with [`Error::UnsupportedInstruction`] or
//! [`Error::UnsupportedControlFlow`], recursive members with [`Error::DecompilationCycle`].
//!
//! ```rust
//! use dotinline::Error;
//!
//! fn describe(err: &Error) -> &'static str {
//!     match err.root_cause() {
//!         Error::UnsupportedInstruction { .. } => "statement or side effect",
//!         Error::UnsupportedControlFlow { .. } => "branches that are not an expression",
//!         Error::DecompilationCycle { .. } => "recursive member",
//!         _ => "other",
//!     }
//! }
//! # assert_eq!(describe(&Error::RecursionLimit(1)), "other");
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and installs no logger.
//! Decompilation and cache activity is logged at `debug`, per-instruction interpretation at
//! `trace`, and call sites left unexpanded by permissive splicing at `warn`.

#[macro_use]
pub(crate) mod error;
pub(crate) mod stream;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotinline::prelude::*;
///
/// let options = SpliceOptions::default();
/// assert_eq!(options.mode, SpliceMode::Permissive);
/// ```
pub mod prelude;

/// Metadata seen by the decompiler: tokens, signatures and member references.
///
/// # Key Types
///
/// - [`metadata::Token`] - Metadata token of an operand
/// - [`metadata::TypeSignature`] - Types of fields, parameters and locals
/// - [`metadata::MethodRef`] / [`metadata::FieldRef`] - Resolved members
/// - [`metadata::MemberId`] - Identity of a member, keying the cache and registry
/// - [`metadata::MetadataTable`] - In-memory resolver and body provider
pub mod metadata;

/// Instructions, disassembler and encoder based on ECMA-335
///
/// # Main Functions
///
/// - [`disassembler::decode_instruction`] - Decode a single raw instruction
/// - [`disassembler::decode_stream`] - Decode a whole body
/// - [`disassembler::read_method`] - Decode and resolve a body for interpretation
///
/// # Examples
///
/// ```rust
/// use dotinline::{disassembler::decode_instruction, Parser};
///
/// let bytecode = &[0x02, 0x2A]; // ldarg.0, ret
/// let mut parser = Parser::new(bytecode);
/// let instruction = decode_instruction(&mut parser)?;
///
/// assert_eq!(instruction.mnemonic, "ldarg.0");
/// # Ok::<(), dotinline::Error>(())
/// ```
pub mod disassembler;

/// Expression trees and their canonical textual form.
pub mod expression;

/// Decompilation of member bodies into expression trees.
pub mod decompiler;

/// Inlining of computed members into query trees.
pub mod splicer;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotinline` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Bounds-checked cursor over a byte slice, used to decode instruction streams.
pub use stream::parser::Parser;
