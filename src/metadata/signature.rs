use std::fmt;

/// The type of a value flowing through a decompiled expression.
///
/// Variant naming follows the ECMA-335 element types. Named types carry their display name
/// rather than a token, since the expression tree only ever needs to render and compare them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    /// Type not known to the interpreter
    #[default]
    Unknown,
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// A named value type (struct or enum)
    ValueType(String),
    /// A named reference type
    Class(String),
    /// `Nullable<T>` over the given underlying value type
    Nullable(Box<TypeSignature>),
    /// Single-dimensional zero-based array
    SzArray(Box<TypeSignature>),
}

impl TypeSignature {
    /// Shorthand for a named reference type.
    #[must_use]
    pub fn class(name: &str) -> Self {
        TypeSignature::Class(name.to_string())
    }

    /// Shorthand for a named value type.
    #[must_use]
    pub fn value_type(name: &str) -> Self {
        TypeSignature::ValueType(name.to_string())
    }

    /// Shorthand for `Nullable<inner>`.
    #[must_use]
    pub fn nullable(inner: TypeSignature) -> Self {
        TypeSignature::Nullable(Box::new(inner))
    }

    /// `true` for `bool`.
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        matches!(self, TypeSignature::Boolean)
    }

    /// `true` for `Nullable<T>`.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeSignature::Nullable(_))
    }

    /// The `T` of `Nullable<T>`.
    #[must_use]
    pub fn nullable_underlying(&self) -> Option<&TypeSignature> {
        match self {
            TypeSignature::Nullable(inner) => Some(inner),
            _ => None,
        }
    }

    /// `true` for the integer element types, `char` included.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeSignature::Char
                | TypeSignature::I1
                | TypeSignature::U1
                | TypeSignature::I2
                | TypeSignature::U2
                | TypeSignature::I4
                | TypeSignature::U4
                | TypeSignature::I8
                | TypeSignature::U8
        )
    }

    /// `true` when values of this type live on the stack by value.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                TypeSignature::Boolean
                    | TypeSignature::R4
                    | TypeSignature::R8
                    | TypeSignature::ValueType(_)
                    | TypeSignature::Nullable(_)
            )
    }

    /// Name used when the type appears in a member identity or in the canonical form.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Unknown => write!(f, "?"),
            TypeSignature::Void => write!(f, "Void"),
            TypeSignature::Boolean => write!(f, "Boolean"),
            TypeSignature::Char => write!(f, "Char"),
            TypeSignature::I1 => write!(f, "SByte"),
            TypeSignature::U1 => write!(f, "Byte"),
            TypeSignature::I2 => write!(f, "Int16"),
            TypeSignature::U2 => write!(f, "UInt16"),
            TypeSignature::I4 => write!(f, "Int32"),
            TypeSignature::U4 => write!(f, "UInt32"),
            TypeSignature::I8 => write!(f, "Int64"),
            TypeSignature::U8 => write!(f, "UInt64"),
            TypeSignature::R4 => write!(f, "Single"),
            TypeSignature::R8 => write!(f, "Double"),
            TypeSignature::String => write!(f, "String"),
            TypeSignature::Object => write!(f, "Object"),
            TypeSignature::ValueType(name) | TypeSignature::Class(name) => write!(f, "{name}"),
            TypeSignature::Nullable(inner) => write!(f, "Nullable<{inner}>"),
            TypeSignature::SzArray(inner) => write!(f, "{inner}[]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(TypeSignature::I2.to_string(), "Int16");
        assert_eq!(
            TypeSignature::nullable(TypeSignature::value_type("DateTime")).to_string(),
            "Nullable<DateTime>"
        );
        assert_eq!(
            TypeSignature::SzArray(Box::new(TypeSignature::String)).to_string(),
            "String[]"
        );
    }

    #[test]
    fn test_classification() {
        assert!(TypeSignature::Char.is_integer());
        assert!(!TypeSignature::R8.is_integer());
        assert!(TypeSignature::nullable(TypeSignature::I4).is_value_type());
        assert!(!TypeSignature::class("Employee").is_value_type());
        assert_eq!(
            TypeSignature::nullable(TypeSignature::I2).nullable_underlying(),
            Some(&TypeSignature::I2)
        );
    }
}
