//! Expression tree nodes.
//!
//! [`Expr`] is the value descriptor both halves of the crate share: the interpreter builds
//! it from bytecode, the splicer rewrites it, and hosts construct it for their queries.
//! Nodes are plain owned values; rewriting always produces a new tree.

use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    expression::ops::{BinaryOp, UnaryOp},
    metadata::{FieldRc, MethodRc, TypeSignature},
};

static NEXT_PARAMETER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`ParameterExpr`].
///
/// Two parameters with the same name and type are still distinct binders, which is what keeps
/// substitution capture-free when the same member body is spliced at several call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(u64);

impl ParameterId {
    /// Allocates a new identity.
    #[must_use]
    pub fn fresh() -> Self {
        ParameterId(NEXT_PARAMETER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A formal parameter: a lambda binder or a decompiled member's argument (`this` included).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterExpr {
    /// Binder identity
    pub id: ParameterId,
    /// Display name
    pub name: String,
    /// Parameter type
    pub ty: TypeSignature,
}

impl ParameterExpr {
    /// Creates a parameter with a fresh identity.
    #[must_use]
    pub fn new(name: &str, ty: TypeSignature) -> Self {
        ParameterExpr {
            id: ParameterId::fresh(),
            name: name.to_string(),
            ty,
        }
    }

    /// A reference to this parameter.
    #[must_use]
    pub fn expr(&self) -> Expr {
        Expr::Parameter(self.clone())
    }
}

impl fmt::Display for ParameterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A typed constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// Null reference, or an empty `Nullable<T>`
    Null,
    /// `bool`
    Bool(bool),
    /// `char`
    Char(char),
    /// `sbyte`
    I8(i8),
    /// `byte`
    U8(u8),
    /// `short`
    I16(i16),
    /// `ushort`
    U16(u16),
    /// `int`
    I32(i32),
    /// `uint`
    U32(u32),
    /// `long`
    I64(i64),
    /// `ulong`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// String literal
    String(Arc<str>),
    /// A captured object (query source, closure instance), rendered `value(Type)`
    Object(TypeSignature),
}

impl ConstValue {
    /// The type of this constant.
    #[must_use]
    pub fn ty(&self) -> TypeSignature {
        match self {
            ConstValue::Null => TypeSignature::Object,
            ConstValue::Bool(_) => TypeSignature::Boolean,
            ConstValue::Char(_) => TypeSignature::Char,
            ConstValue::I8(_) => TypeSignature::I1,
            ConstValue::U8(_) => TypeSignature::U1,
            ConstValue::I16(_) => TypeSignature::I2,
            ConstValue::U16(_) => TypeSignature::U2,
            ConstValue::I32(_) => TypeSignature::I4,
            ConstValue::U32(_) => TypeSignature::U4,
            ConstValue::I64(_) => TypeSignature::I8,
            ConstValue::U64(_) => TypeSignature::U8,
            ConstValue::F32(_) => TypeSignature::R4,
            ConstValue::F64(_) => TypeSignature::R8,
            ConstValue::String(_) => TypeSignature::String,
            ConstValue::Object(ty) => ty.clone(),
        }
    }

    /// The `default(T)` value, for the types that have a literal one.
    #[must_use]
    pub fn default_for(ty: &TypeSignature) -> Option<ConstValue> {
        Some(match ty {
            TypeSignature::Boolean => ConstValue::Bool(false),
            TypeSignature::Char => ConstValue::Char('\0'),
            TypeSignature::I1 => ConstValue::I8(0),
            TypeSignature::U1 => ConstValue::U8(0),
            TypeSignature::I2 => ConstValue::I16(0),
            TypeSignature::U2 => ConstValue::U16(0),
            TypeSignature::I4 => ConstValue::I32(0),
            TypeSignature::U4 => ConstValue::U32(0),
            TypeSignature::I8 => ConstValue::I64(0),
            TypeSignature::U8 => ConstValue::U64(0),
            TypeSignature::R4 => ConstValue::F32(0.0),
            TypeSignature::R8 => ConstValue::F64(0.0),
            TypeSignature::String
            | TypeSignature::Object
            | TypeSignature::Class(_)
            | TypeSignature::Nullable(_)
            | TypeSignature::SzArray(_) => ConstValue::Null,
            TypeSignature::Unknown | TypeSignature::Void | TypeSignature::ValueType(_) => {
                return None
            }
        })
    }

    /// Reinterprets an `int32` stack constant at a narrower declared type.
    ///
    /// The evaluation stack has no `bool`, `char` or `short`; compilers load those as `int32`
    /// and rely on the declared type of the slot they flow into. Returns `None` when the value
    /// is not an `int32` or does not fit.
    #[must_use]
    pub fn coerce(&self, ty: &TypeSignature) -> Option<ConstValue> {
        let ConstValue::I32(value) = *self else {
            return None;
        };

        match ty {
            TypeSignature::Boolean => match value {
                0 => Some(ConstValue::Bool(false)),
                1 => Some(ConstValue::Bool(true)),
                _ => None,
            },
            TypeSignature::Char => u32::try_from(value)
                .ok()
                .and_then(char::from_u32)
                .map(ConstValue::Char),
            TypeSignature::I1 => i8::try_from(value).ok().map(ConstValue::I8),
            TypeSignature::U1 => u8::try_from(value).ok().map(ConstValue::U8),
            TypeSignature::I2 => i16::try_from(value).ok().map(ConstValue::I16),
            TypeSignature::U2 => u16::try_from(value).ok().map(ConstValue::U16),
            TypeSignature::U4 => u32::try_from(value).ok().map(ConstValue::U32),
            TypeSignature::Nullable(inner) => self.coerce(inner),
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => write!(f, "null"),
            ConstValue::Bool(true) => write!(f, "True"),
            ConstValue::Bool(false) => write!(f, "False"),
            ConstValue::Char(v) => write!(f, "{v}"),
            ConstValue::I8(v) => write!(f, "{v}"),
            ConstValue::U8(v) => write!(f, "{v}"),
            ConstValue::I16(v) => write!(f, "{v}"),
            ConstValue::U16(v) => write!(f, "{v}"),
            ConstValue::I32(v) => write!(f, "{v}"),
            ConstValue::U32(v) => write!(f, "{v}"),
            ConstValue::I64(v) => write!(f, "{v}"),
            ConstValue::U64(v) => write!(f, "{v}"),
            ConstValue::F32(v) => write!(f, "{v}"),
            ConstValue::F64(v) => write!(f, "{v}"),
            ConstValue::String(v) => write!(f, "\"{v}\""),
            ConstValue::Object(ty) => write!(f, "value({ty})"),
        }
    }
}

/// The member read by a [`Expr::MemberAccess`].
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// A field
    Field(FieldRc),
    /// A property, identified by its getter
    Property(MethodRc),
}

impl Member {
    /// Member name as written in source (`FullName`, not `get_FullName`).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Member::Field(field) => &field.name,
            Member::Property(getter) => getter.property_name().unwrap_or(&getter.name),
        }
    }

    /// Type declaring the member.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeSignature {
        match self {
            Member::Field(field) => &field.declaring_type,
            Member::Property(getter) => &getter.declaring_type,
        }
    }

    /// Type of the member's value.
    #[must_use]
    pub fn ty(&self) -> TypeSignature {
        match self {
            Member::Field(field) => field.field_type.clone(),
            Member::Property(getter) => getter.return_type.clone(),
        }
    }
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal or captured value
    Constant(ConstValue),
    /// A reference to a formal parameter
    Parameter(ParameterExpr),
    /// Field or property read; `target` is `None` for static members
    MemberAccess {
        /// Receiver
        target: Option<Box<Expr>>,
        /// Member read
        member: Member,
    },
    /// Method call; `target` is `None` for static and extension methods
    Call {
        /// Receiver
        target: Option<Box<Expr>>,
        /// Called method
        method: MethodRc,
        /// Arguments in declaration order
        args: Vec<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Explicit conversion, boxing or cast
    Convert {
        /// Converted value
        operand: Box<Expr>,
        /// Target type
        ty: TypeSignature,
    },
    /// `test ? if_true : if_false`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Value when the condition holds
        if_true: Box<Expr>,
        /// Value otherwise
        if_false: Box<Expr>,
    },
    /// `left ?? right`
    Coalesce {
        /// Value tested for null
        left: Box<Expr>,
        /// Fallback
        right: Box<Expr>,
    },
    /// `params => body`
    Lambda {
        /// Binders
        params: Vec<ParameterExpr>,
        /// Body
        body: Box<Expr>,
    },
    /// Single-dimensional array initializer
    NewArray {
        /// Element type
        element_type: TypeSignature,
        /// Elements
        items: Vec<Expr>,
    },
}

impl Expr {
    /// Creates a constant node.
    #[must_use]
    pub fn constant(value: ConstValue) -> Self {
        Expr::Constant(value)
    }

    /// Creates a string literal.
    #[must_use]
    pub fn string(value: &str) -> Self {
        Expr::Constant(ConstValue::String(Arc::from(value)))
    }

    /// Creates a `bool` literal.
    #[must_use]
    pub fn bool(value: bool) -> Self {
        Expr::Constant(ConstValue::Bool(value))
    }

    /// Creates an `int` literal.
    #[must_use]
    pub fn int(value: i32) -> Self {
        Expr::Constant(ConstValue::I32(value))
    }

    /// Creates the null literal.
    #[must_use]
    pub fn null() -> Self {
        Expr::Constant(ConstValue::Null)
    }

    /// Reads `field` from `target` (`None` for static fields).
    #[must_use]
    pub fn field(target: Option<Expr>, field: FieldRc) -> Self {
        Expr::MemberAccess {
            target: target.map(Box::new),
            member: Member::Field(field),
        }
    }

    /// Reads the property whose getter is `getter`.
    #[must_use]
    pub fn property(target: Option<Expr>, getter: MethodRc) -> Self {
        Expr::MemberAccess {
            target: target.map(Box::new),
            member: Member::Property(getter),
        }
    }

    /// Calls `method`.
    #[must_use]
    pub fn call(target: Option<Expr>, method: MethodRc, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: target.map(Box::new),
            method,
            args,
        }
    }

    /// Creates a binary node.
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Creates a unary node.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Creates `Not(operand)`.
    #[must_use]
    pub fn not(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Not, operand)
    }

    /// Creates a conversion to `ty`.
    #[must_use]
    pub fn convert(operand: Expr, ty: TypeSignature) -> Self {
        Expr::Convert {
            operand: Box::new(operand),
            ty,
        }
    }

    /// Creates `test ? if_true : if_false`.
    #[must_use]
    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Creates `left ?? right`.
    #[must_use]
    pub fn coalesce(left: Expr, right: Expr) -> Self {
        Expr::Coalesce {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Creates a lambda.
    #[must_use]
    pub fn lambda(params: Vec<ParameterExpr>, body: Expr) -> Self {
        Expr::Lambda {
            params,
            body: Box::new(body),
        }
    }

    /// The boolean this node denotes, if it is a `bool` literal.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Constant(ConstValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// `true` for literal nodes.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant(_))
    }

    /// The static type of the value this node produces.
    #[must_use]
    pub fn ty(&self) -> TypeSignature {
        match self {
            Expr::Constant(value) => value.ty(),
            Expr::Parameter(param) => param.ty.clone(),
            Expr::MemberAccess { member, .. } => member.ty(),
            Expr::Call { method, .. } => method.return_type.clone(),
            Expr::Binary { op, left, right } => {
                if op.is_boolean() {
                    TypeSignature::Boolean
                } else if *op == BinaryOp::Add
                    && (left.ty() == TypeSignature::String || right.ty() == TypeSignature::String)
                {
                    TypeSignature::String
                } else {
                    left.ty()
                }
            }
            Expr::Unary { operand, .. } => operand.ty(),
            Expr::Convert { ty, .. } => ty.clone(),
            Expr::Conditional {
                if_true, if_false, ..
            } => match if_true.ty() {
                TypeSignature::Unknown => if_false.ty(),
                TypeSignature::Object if matches!(**if_true, Expr::Constant(ConstValue::Null)) => {
                    if_false.ty()
                }
                ty => ty,
            },
            Expr::Coalesce { left, right } => match left.ty() {
                TypeSignature::Nullable(inner) if !right.ty().is_nullable() => *inner,
                ty => ty,
            },
            Expr::Lambda { body, .. } => body.ty(),
            Expr::NewArray { element_type, .. } => {
                TypeSignature::SzArray(Box::new(element_type.clone()))
            }
        }
    }

    /// Rebuilds this node with every direct child replaced by `f(child)`.
    ///
    /// Lambda binders are kept as they are; only the body is passed to `f`.
    ///
    /// # Errors
    /// Returns the first error produced by `f`.
    pub fn try_map_children<E>(
        &self,
        mut f: impl FnMut(&Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        let mut boxed = |e: &Expr| f(e).map(Box::new);

        Ok(match self {
            Expr::Constant(_) | Expr::Parameter(_) => self.clone(),
            Expr::MemberAccess { target, member } => Expr::MemberAccess {
                target: match target {
                    Some(target) => Some(boxed(target)?),
                    None => None,
                },
                member: member.clone(),
            },
            Expr::Call {
                target,
                method,
                args,
            } => {
                let target = match target {
                    Some(target) => Some(boxed(target)?),
                    None => None,
                };
                let args = args
                    .iter()
                    .map(|arg| boxed(arg).map(|b| *b))
                    .collect::<Result<Vec<_>, E>>()?;
                Expr::Call {
                    target,
                    method: method.clone(),
                    args,
                }
            }
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: boxed(left)?,
                right: boxed(right)?,
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: boxed(operand)?,
            },
            Expr::Convert { operand, ty } => Expr::Convert {
                operand: boxed(operand)?,
                ty: ty.clone(),
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: boxed(test)?,
                if_true: boxed(if_true)?,
                if_false: boxed(if_false)?,
            },
            Expr::Coalesce { left, right } => Expr::Coalesce {
                left: boxed(left)?,
                right: boxed(right)?,
            },
            Expr::Lambda { params, body } => Expr::Lambda {
                params: params.clone(),
                body: boxed(body)?,
            },
            Expr::NewArray {
                element_type,
                items,
            } => Expr::NewArray {
                element_type: element_type.clone(),
                items: items
                    .iter()
                    .map(|item| boxed(item).map(|b| *b))
                    .collect::<Result<Vec<_>, E>>()?,
            },
        })
    }

    /// Returns a copy of this tree with every parameter in `bindings` replaced by its bound
    /// expression.
    ///
    /// Bound expressions are inserted as they are and not searched again, so a binding that
    /// mentions another formal is never substituted twice.
    #[must_use]
    pub fn substitute(&self, bindings: &HashMap<ParameterId, Expr>) -> Expr {
        if let Expr::Parameter(param) = self {
            return bindings
                .get(&param.id)
                .cloned()
                .unwrap_or_else(|| self.clone());
        }

        match self.try_map_children(|child| Ok::<_, Infallible>(child.substitute(bindings))) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// `true` if `param` occurs anywhere in this tree.
    #[must_use]
    pub fn references(&self, param: ParameterId) -> bool {
        let mut found = false;
        let _ = self.try_map_children(|child| {
            found |= child.references(param);
            Ok::<_, Infallible>(child.clone())
        });
        found || matches!(self, Expr::Parameter(p) if p.id == param)
    }
}

impl From<ConstValue> for Expr {
    fn from(value: ConstValue) -> Self {
        Expr::Constant(value)
    }
}

impl From<ParameterExpr> for Expr {
    fn from(param: ParameterExpr) -> Self {
        Expr::Parameter(param)
    }
}
