//! Metadata tokens as they appear in CIL operands.
//!
//! A token is a 32-bit value: the high byte names the metadata table, the low 24 bits the
//! row. `ldfld`, `call`, `box` and `ldstr` all carry one, and the bytecode reader hands each
//! to the [`crate::metadata::MetadataResolver`] by table kind.

use std::fmt;

/// A metadata token referencing a row of a metadata table (or the user-string heap).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// `TypeRef` table
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table, resolved by name and arity against definitions
    pub const MEMBER_REF: u8 = 0x0A;
    /// `TypeSpec` table
    pub const TYPE_SPEC: u8 = 0x1B;
    /// User-string heap, the operand of `ldstr`
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table id and a 1-based row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// `true` for the nil token
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// `true` if the token names a type (`TypeRef`, `TypeDef` or `TypeSpec`).
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(
            self.table(),
            Self::TYPE_REF | Self::TYPE_DEF | Self::TYPE_SPEC
        )
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
