//! Canonical textual form of expression trees.
//!
//! Two trees are considered equivalent exactly when they render to the same string, so the
//! rendering is deliberately lossless about structure: every binary node is parenthesised,
//! conversions are spelled out, and conditionals keep their operand order.
//!
//! | Node | Rendering |
//! |---|---|
//! | `Binary` | `(left op right)` |
//! | `Unary` | `Not(x)`, `-x` |
//! | `Convert` | `Convert(x, Type)` |
//! | `Conditional` | `IIF(test, a, b)` |
//! | `Coalesce` | `(a ?? b)` |
//! | `MemberAccess` | `target.Member`, `Type.Member` |
//! | `Call` | `target.Method(args)`, `Type.Method(args)` |
//! | `Lambda` | `p => body`, `(a, b) => body` |
//! | `NewArray` | `new T[] {a, b}` |

use std::fmt;

use crate::{
    expression::{
        node::{Expr, Member},
        ops::UnaryOp,
    },
    metadata::MethodFlags,
};

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => write!(f, "{value}"),
            Expr::Parameter(param) => write!(f, "{param}"),
            Expr::MemberAccess { target, member } => match target {
                Some(target) => write!(f, "{target}.{}", member.name()),
                None => write!(f, "{}.{}", member.declaring_type(), member.name()),
            },
            Expr::Call {
                target,
                method,
                args,
            } => {
                if let Some(target) = target {
                    write!(f, "{target}.{}(", method.name)?;
                    write_list(f, args)?;
                } else if let (true, Some((receiver, rest))) = (
                    method.flags.contains(MethodFlags::EXTENSION),
                    args.split_first(),
                ) {
                    write!(f, "{receiver}.{}(", method.name)?;
                    write_list(f, rest)?;
                } else {
                    write!(f, "{}.{}(", method.declaring_type, method.name)?;
                    write_list(f, args)?;
                }
                write!(f, ")")
            }
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "Not({operand})"),
                UnaryOp::Negate => write!(f, "-{operand}"),
            },
            Expr::Convert { operand, ty } => write!(f, "Convert({operand}, {ty})"),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "IIF({test}, {if_true}, {if_false})"),
            Expr::Coalesce { left, right } => write!(f, "({left} ?? {right})"),
            Expr::Lambda { params, body } => {
                if let [single] = params.as_slice() {
                    write!(f, "{single} => {body}")
                } else {
                    write!(f, "(")?;
                    for (index, param) in params.iter().enumerate() {
                        if index > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{param}")?;
                    }
                    write!(f, ") => {body}")
                }
            }
            Expr::NewArray {
                element_type,
                items,
            } => {
                write!(f, "new {element_type}[] {{")?;
                write_list(f, items)?;
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type(), self.name())
    }
}
