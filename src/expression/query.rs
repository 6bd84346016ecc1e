//! Query operator call chains.
//!
//! A query is a chain of static `Queryable` extension calls over a source constant, each
//! operator taking the previous chain as its first argument and a lambda as its second. The
//! splicer treats these calls like any other node, which is exactly what keeps an ordering or
//! projection clause where it was.
//!
//! # Examples
//!
//! ```rust
//! use dotinline::{
//!     expression::{BinaryOp, Expr, ParameterExpr, Query},
//!     metadata::TypeSignature,
//! };
//!
//! let employee = TypeSignature::class("Employee");
//! let e = ParameterExpr::new("e", employee.clone());
//! let query = Query::source(employee)
//!     .filter(e.clone(), Expr::bool(true))
//!     .then_by(e.clone(), Expr::bool(true));
//!
//! assert_eq!(
//!     query.to_string(),
//!     "value(EnumerableQuery<Employee>).Where(e => True).ThenBy(e => True)"
//! );
//! ```

use std::{fmt, sync::Arc};

use crate::{
    expression::node::{ConstValue, Expr, ParameterExpr},
    metadata::{MethodFlags, MethodRef, TypeSignature},
};

/// A query under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expr: Expr,
    element: TypeSignature,
}

impl Query {
    /// Starts a query over an in-memory sequence of `element`.
    #[must_use]
    pub fn source(element: TypeSignature) -> Self {
        let source = TypeSignature::class(&format!("EnumerableQuery<{element}>"));
        Query {
            expr: Expr::constant(ConstValue::Object(source)),
            element,
        }
    }

    /// Wraps an existing query expression whose elements are `element`.
    #[must_use]
    pub fn from_expr(expr: Expr, element: TypeSignature) -> Self {
        Query { expr, element }
    }

    /// Appends `Where(param => predicate)`.
    #[must_use]
    pub fn filter(self, param: ParameterExpr, predicate: Expr) -> Self {
        let element = self.element.clone();
        self.apply("Where", param, predicate, element)
    }

    /// Appends `OrderBy(param => key)`.
    #[must_use]
    pub fn order_by(self, param: ParameterExpr, key: Expr) -> Self {
        let element = self.element.clone();
        self.apply("OrderBy", param, key, element)
    }

    /// Appends `OrderByDescending(param => key)`.
    #[must_use]
    pub fn order_by_descending(self, param: ParameterExpr, key: Expr) -> Self {
        let element = self.element.clone();
        self.apply("OrderByDescending", param, key, element)
    }

    /// Appends `ThenBy(param => key)`.
    #[must_use]
    pub fn then_by(self, param: ParameterExpr, key: Expr) -> Self {
        let element = self.element.clone();
        self.apply("ThenBy", param, key, element)
    }

    /// Appends `ThenByDescending(param => key)`.
    #[must_use]
    pub fn then_by_descending(self, param: ParameterExpr, key: Expr) -> Self {
        let element = self.element.clone();
        self.apply("ThenByDescending", param, key, element)
    }

    /// Appends `Select(param => projection)`; the query's elements become the projection's
    /// type.
    #[must_use]
    pub fn select(self, param: ParameterExpr, projection: Expr) -> Self {
        let element = projection.ty();
        self.apply("Select", param, projection, element)
    }

    /// The query expression.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Consumes the query, returning its expression.
    #[must_use]
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Element type of the sequence the query produces.
    #[must_use]
    pub fn element(&self) -> &TypeSignature {
        &self.element
    }

    fn apply(self, operator: &str, param: ParameterExpr, body: Expr, result: TypeSignature) -> Self {
        let source = queryable(&self.element);
        let method = MethodRef::new(TypeSignature::class("Queryable"), operator)
            .param("source", source)
            .param("selector", TypeSignature::Object)
            .returns(queryable(&result))
            .with_flags(MethodFlags::STATIC | MethodFlags::EXTENSION);

        Query {
            expr: Expr::call(
                None,
                Arc::new(method),
                vec![self.expr, Expr::lambda(vec![param], body)],
            ),
            element: result,
        }
    }
}

fn queryable(element: &TypeSignature) -> TypeSignature {
    TypeSignature::class(&format!("IQueryable<{element}>"))
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}
