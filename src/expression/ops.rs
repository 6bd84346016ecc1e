//! Operators of [`crate::expression::Expr`] nodes.
//!
//! Binary operators render as they appear in the canonical textual form: symbols for
//! arithmetic and comparison, words for the short-circuit connectives.

use strum::{Display, EnumIter, IntoStaticStr};

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum BinaryOp {
    /// Addition, also string concatenation
    #[strum(serialize = "+")]
    Add,
    /// Subtraction
    #[strum(serialize = "-")]
    Subtract,
    /// Multiplication
    #[strum(serialize = "*")]
    Multiply,
    /// Division
    #[strum(serialize = "/")]
    Divide,
    /// Remainder
    #[strum(serialize = "%")]
    Modulo,
    /// Bitwise or non-short-circuit logical AND
    #[strum(serialize = "&")]
    And,
    /// Bitwise or non-short-circuit logical OR
    #[strum(serialize = "|")]
    Or,
    /// Exclusive OR
    #[strum(serialize = "^")]
    ExclusiveOr,
    /// Left shift
    #[strum(serialize = "<<")]
    LeftShift,
    /// Right shift
    #[strum(serialize = ">>")]
    RightShift,
    /// Short-circuit AND
    #[strum(serialize = "AndAlso")]
    AndAlso,
    /// Short-circuit OR
    #[strum(serialize = "OrElse")]
    OrElse,
    /// Equality
    #[strum(serialize = "==")]
    Equal,
    /// Inequality
    #[strum(serialize = "!=")]
    NotEqual,
    /// Less than
    #[strum(serialize = "<")]
    LessThan,
    /// Less than or equal
    #[strum(serialize = "<=")]
    LessThanOrEqual,
    /// Greater than
    #[strum(serialize = ">")]
    GreaterThan,
    /// Greater than or equal
    #[strum(serialize = ">=")]
    GreaterThanOrEqual,
}

impl BinaryOp {
    /// Checks if this operator compares its operands.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
        )
    }

    /// Checks if this operator always yields a boolean.
    #[must_use]
    pub const fn is_boolean(self) -> bool {
        self.is_comparison() || matches!(self, Self::AndAlso | Self::OrElse)
    }

    /// Returns the comparison with the opposite outcome (`<` becomes `>=`).
    ///
    /// For floating point operands this is only exact when neither side is NaN, which
    /// matches how compilers lower negated float comparisons to the unordered branch forms.
    #[must_use]
    pub const fn inverted(self) -> Option<Self> {
        match self {
            Self::Equal => Some(Self::NotEqual),
            Self::NotEqual => Some(Self::Equal),
            Self::LessThan => Some(Self::GreaterThanOrEqual),
            Self::LessThanOrEqual => Some(Self::GreaterThan),
            Self::GreaterThan => Some(Self::LessThanOrEqual),
            Self::GreaterThanOrEqual => Some(Self::LessThan),
            _ => None,
        }
    }

    /// Maps a compiler-generated operator method name (`op_Equality`) to its operator.
    #[must_use]
    pub fn from_operator_method(name: &str) -> Option<Self> {
        Some(match name {
            "op_Addition" => Self::Add,
            "op_Subtraction" => Self::Subtract,
            "op_Multiply" => Self::Multiply,
            "op_Division" => Self::Divide,
            "op_Modulus" => Self::Modulo,
            "op_Equality" => Self::Equal,
            "op_Inequality" => Self::NotEqual,
            "op_LessThan" => Self::LessThan,
            "op_LessThanOrEqual" => Self::LessThanOrEqual,
            "op_GreaterThan" => Self::GreaterThan,
            "op_GreaterThanOrEqual" => Self::GreaterThanOrEqual,
            _ => return None,
        })
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum UnaryOp {
    /// Logical or bitwise negation, rendered `Not(x)`
    Not,
    /// Arithmetic negation, rendered `-x`
    Negate,
}
