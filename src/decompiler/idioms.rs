//! Reconstruction of expression idioms from two-armed branches.
//!
//! Compilers lower `&&`, `||`, `?:` and `??` to a conditional branch whose arms produce one
//! value each. Once the interpreter has evaluated both arms symbolically, the shapes are
//! matched here in a fixed order: short-circuit connectives first, then ternaries, then
//! coalescing. A branch no idiom accepts is reported as unsupported control flow.
//!
//! Arms are oriented the way compilers lay out `c ? a : b`: the branch jumps to the consequence
//! when its condition holds, so the jump arm is the true arm and the condition is kept as
//! written. When the complement of that condition carries fewer negations (the layout of an
//! `if` statement, which jumps to its `else`), the arms are swapped instead.

use strum::{EnumIter, IntoEnumIterator};

use crate::{
    expression::{BinaryOp, ConstValue, Expr, Member, UnaryOp},
    metadata::{MethodRef, TypeSignature},
    Result,
};

/// The test of a conditional branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    /// Value the branch inspects; for `beq`-style branches, the comparison itself
    pub value: Expr,
    /// `true` when the branch is taken if `value` holds
    pub jump_when: bool,
    /// Offset of the branch instruction
    pub offset: u32,
}

impl Guard {
    /// The branch's value as a boolean test: references compare against `null`, integers
    /// against zero.
    #[must_use]
    pub fn test(&self) -> Expr {
        let ty = self.value.ty();
        if ty.is_boolean() || matches!(ty, TypeSignature::Unknown) {
            self.value.clone()
        } else if ty.is_integer() {
            let zero = ConstValue::default_for(&ty).unwrap_or(ConstValue::I32(0));
            Expr::binary(BinaryOp::NotEqual, self.value.clone(), Expr::constant(zero))
        } else {
            Expr::binary(BinaryOp::NotEqual, self.value.clone(), Expr::null())
        }
    }

    /// The condition under which the branch is taken.
    #[must_use]
    pub fn condition(&self) -> Expr {
        if self.jump_when {
            self.test()
        } else {
            negate(self.test())
        }
    }

    /// Of the two arms, the one executed when [`Guard::test`] holds.
    fn arm_when_true<'a>(&self, jump: &'a Expr, fall: &'a Expr) -> (&'a Expr, &'a Expr) {
        if self.jump_when {
            (jump, fall)
        } else {
            (fall, jump)
        }
    }
}

/// The recognized branch idioms, in matching order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, EnumIter)]
pub enum Idiom {
    /// `a && b`, `a || b` and their negated forms
    ShortCircuit,
    /// `c ? a : b`
    Ternary,
    /// `a ?? b` over references and `Nullable<T>`
    Coalesce,
}

/// Operands of an idiom match.
#[derive(Debug, Clone, Copy)]
pub struct Arms<'a> {
    /// The branch test
    pub guard: &'a Guard,
    /// Value produced by the arm reached by jumping
    pub jump: &'a Expr,
    /// Value produced by the fall-through arm
    pub fall: &'a Expr,
}

impl Idiom {
    /// Tries to read `arms` as this idiom.
    #[must_use]
    pub fn try_match(self, arms: Arms<'_>) -> Option<Expr> {
        match self {
            Idiom::ShortCircuit => short_circuit(arms),
            Idiom::Ternary => ternary(arms),
            Idiom::Coalesce => coalesce(arms),
        }
    }
}

/// Combines the two arm values of a branch into one expression.
///
/// `hint` is the type the combined value flows into (the return type, or a local's type);
/// `int` constants in the arms are read at that type first.
///
/// # Errors
/// [`crate::Error::UnsupportedControlFlow`] when no idiom matches.
pub fn reconstruct(
    guard: &Guard,
    jump: Expr,
    fall: Expr,
    hint: Option<&TypeSignature>,
) -> Result<Expr> {
    let (jump, fall) = normalise_arms(jump, fall, hint);
    let arms = Arms {
        guard,
        jump: &jump,
        fall: &fall,
    };

    for idiom in Idiom::iter() {
        if let Some(expr) = idiom.try_match(arms) {
            log::trace!("IL_{:04x}: matched {}", guard.offset, idiom);
            return Ok(expr);
        }
    }

    Err(control_flow_error!(
        guard.offset,
        "branch on {} with arms {} and {} matches no expression idiom",
        guard.value,
        jump,
        fall
    ))
}

fn normalise_arms(jump: Expr, fall: Expr, hint: Option<&TypeSignature>) -> (Expr, Expr) {
    if let Some(ty) = hint {
        return (coerce_to(jump, ty), coerce_to(fall, ty));
    }

    if fall.ty().is_boolean() {
        (coerce_to(jump, &TypeSignature::Boolean), fall)
    } else if jump.ty().is_boolean() {
        let fall = coerce_to(fall, &TypeSignature::Boolean);
        (jump, fall)
    } else {
        (jump, fall)
    }
}

/// Reads `int32` stack constants in `expr` at the declared type `ty`, looking through the
/// arms of conditionals and the fallback of coalesce nodes.
#[must_use]
pub fn coerce_to(expr: Expr, ty: &TypeSignature) -> Expr {
    match expr {
        Expr::Constant(ref value) => value.coerce(ty).map_or(expr, Expr::Constant),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => Expr::Conditional {
            test,
            if_true: Box::new(coerce_to(*if_true, ty)),
            if_false: Box::new(coerce_to(*if_false, ty)),
        },
        Expr::Coalesce { left, right } => {
            let right = coerce_to(*right, ty);
            Expr::Coalesce {
                left,
                right: Box::new(right),
            }
        }
        other => other,
    }
}

/// Logical negation that folds double negation and flips comparisons.
#[must_use]
pub fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } if operand.ty().is_boolean() => *operand,
        Expr::Constant(ConstValue::Bool(value)) => Expr::bool(!value),
        Expr::Binary { op, left, right } if op.inverted().is_some() => Expr::Binary {
            op: op.inverted().unwrap_or(op),
            left,
            right,
        },
        other => Expr::not(other),
    }
}

/// Logical complement that also pushes through `AndAlso` and `OrElse`.
#[must_use]
pub(crate) fn invert(expr: Expr) -> Expr {
    match expr {
        Expr::Binary {
            op: BinaryOp::AndAlso,
            left,
            right,
        } => Expr::binary(BinaryOp::OrElse, invert(*left), invert(*right)),
        Expr::Binary {
            op: BinaryOp::OrElse,
            left,
            right,
        } => Expr::binary(BinaryOp::AndAlso, invert(*left), invert(*right)),
        other => negate(other),
    }
}

/// `Not` nodes in the boolean skeleton of a condition.
fn negations(expr: &Expr) -> usize {
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => 1 + negations(operand),
        Expr::Binary {
            op: BinaryOp::AndAlso | BinaryOp::OrElse,
            left,
            right,
        } => negations(left) + negations(right),
        _ => 0,
    }
}

/// Builds `left op right` for a short-circuit connective, keeping chains left-associated.
pub(crate) fn connective(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    match right {
        Expr::Binary {
            op: inner,
            left: inner_left,
            right: inner_right,
        } if inner == op => connective(op, connective(op, left, *inner_left), *inner_right),
        right => Expr::binary(op, left, right),
    }
}

fn short_circuit(arms: Arms<'_>) -> Option<Expr> {
    let condition = arms.guard.condition();
    let on_true = arms.jump.clone();
    let on_false = arms.fall.clone();

    if !on_true.ty().is_boolean() || !on_false.ty().is_boolean() {
        return None;
    }

    Some(match (on_true.as_bool(), on_false.as_bool()) {
        (Some(true), Some(false)) => condition,
        (Some(false), Some(true)) => invert(condition),
        (_, Some(false)) => connective(BinaryOp::AndAlso, condition, on_true),
        (Some(true), _) => connective(BinaryOp::OrElse, condition, on_false),
        (Some(false), _) => connective(BinaryOp::AndAlso, invert(condition), on_false),
        (_, Some(true)) => connective(BinaryOp::OrElse, invert(condition), on_true),
        (None, None) => return None,
    })
}

/// The test and the true and false arms of a conditional.
fn orient(arms: Arms<'_>) -> (Expr, Expr, Expr) {
    let test = arms.guard.condition();
    let inverse = invert(test.clone());
    if negations(&inverse) < negations(&test) {
        (inverse, arms.fall.clone(), arms.jump.clone())
    } else {
        (test, arms.jump.clone(), arms.fall.clone())
    }
}

fn ternary(arms: Arms<'_>) -> Option<Expr> {
    if reference_coalesce(arms).is_some() {
        return None;
    }
    if let Some((nullable, _)) = has_value_guard(arms.guard) {
        let (when_true, _) = arms.guard.arm_when_true(arms.jump, arms.fall);
        if is_value_of(when_true, &nullable) || is_coalesce_of(when_true, &nullable) {
            return None;
        }
    }

    let (test, on_true, on_false) = orient(arms);
    if !compatible(&on_true.ty(), &on_false.ty(), &on_true, &on_false) {
        return None;
    }

    // c1 ? (c2 ? x : y) : y  and  c1 ? x : (c2 ? x : y)
    if let Expr::Conditional {
        test: inner,
        if_true,
        if_false,
    } = &on_true
    {
        if **if_false == on_false {
            return Some(Expr::conditional(
                connective(BinaryOp::AndAlso, test, (**inner).clone()),
                (**if_true).clone(),
                on_false,
            ));
        }
    }
    if let Expr::Conditional {
        test: inner,
        if_true,
        if_false,
    } = &on_false
    {
        if **if_true == on_true {
            return Some(Expr::conditional(
                connective(BinaryOp::OrElse, test, (**inner).clone()),
                on_true,
                (**if_false).clone(),
            ));
        }
    }

    Some(Expr::conditional(test, on_true, on_false))
}

/// Whether two arm values can be the branches of one conditional.
fn compatible(a: &TypeSignature, b: &TypeSignature, left: &Expr, right: &Expr) -> bool {
    let is_null = |e: &Expr| matches!(e, Expr::Constant(ConstValue::Null));
    a == b
        || matches!(a, TypeSignature::Unknown | TypeSignature::Object)
        || matches!(b, TypeSignature::Unknown | TypeSignature::Object)
        || (a.is_integer() && b.is_integer())
        || (is_null(left) && !b.is_value_type())
        || (is_null(right) && !a.is_value_type())
}

fn coalesce(arms: Arms<'_>) -> Option<Expr> {
    if let Some(expr) = reference_coalesce(arms) {
        return Some(expr);
    }

    let (nullable, has_value) = has_value_guard(arms.guard)?;
    let (when_true, when_false) = arms.guard.arm_when_true(arms.jump, arms.fall);

    if is_coalesce_of(when_true, &nullable) {
        if when_false.is_constant() {
            return Some(Expr::coalesce(nullable, when_false.clone()));
        }
        return Some(Expr::conditional(
            has_value,
            value_of(&nullable),
            when_false.clone(),
        ));
    }

    if is_value_of(when_true, &nullable) {
        return Some(Expr::conditional(
            has_value,
            when_true.clone(),
            when_false.clone(),
        ));
    }

    None
}

/// `dup ; brtrue L ; pop ; <fallback> ; L:` leaves the tested value itself on the jump arm.
fn reference_coalesce(arms: Arms<'_>) -> Option<Expr> {
    let guard = arms.guard;
    let ty = guard.value.ty();
    if guard.jump_when && *arms.jump == guard.value && !ty.is_boolean() && !ty.is_integer() {
        Some(Expr::coalesce(guard.value.clone(), arms.fall.clone()))
    } else {
        None
    }
}

/// Splits a `n.HasValue` guard into `n` and the `HasValue` access.
fn has_value_guard(guard: &Guard) -> Option<(Expr, Expr)> {
    match &guard.value {
        Expr::MemberAccess {
            target: Some(target),
            member: Member::Property(getter),
        } if getter.name == "get_HasValue" && target.ty().is_nullable() => {
            Some(((**target).clone(), guard.value.clone()))
        }
        _ => None,
    }
}

fn is_value_of(expr: &Expr, nullable: &Expr) -> bool {
    matches!(
        expr,
        Expr::MemberAccess { target: Some(target), member: Member::Property(getter) }
            if getter.name == "get_Value" && **target == *nullable
    )
}

fn is_coalesce_of(expr: &Expr, nullable: &Expr) -> bool {
    matches!(expr, Expr::Coalesce { left, .. } if **left == *nullable)
}

/// `n.Value` for a `Nullable<T>` expression.
pub(crate) fn value_of(nullable: &Expr) -> Expr {
    let ty = nullable.ty();
    let underlying = ty.nullable_underlying().cloned().unwrap_or_default();
    let getter = MethodRef::getter(ty, "Value", underlying);
    Expr::property(Some(nullable.clone()), std::sync::Arc::new(getter))
}
