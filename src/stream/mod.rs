//! Byte-level access to method bodies.
//!
//! - [`parser::Parser`] - cursor with bounds-checked reads
//! - [`io::CilIO`] - little-endian decoding of primitive operand types

pub(crate) mod io;
pub(crate) mod parser;
