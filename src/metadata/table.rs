//! In-memory metadata store.
//!
//! [`MetadataTable`] plays the role of the reflection layer for hosts that already hold
//! resolved metadata and for tests. Members are registered once, receive sequential tokens in
//! their table, and are afterwards served through [`MetadataResolver`] and
//! [`MethodBodyProvider`].

use std::{collections::HashMap, sync::Arc};

use crate::{
    metadata::{
        body::{MethodBody, MethodBodyRc},
        member::{FieldRc, FieldRef, MemberId, MethodRc, MethodRef},
        resolver::{MetadataResolver, MethodBodyProvider},
        signature::TypeSignature,
        token::Token,
    },
    Error, Result,
};

/// A `MemberRef` row: a method named by declaring type, name and (optionally) arity.
#[derive(Debug, Clone)]
struct MemberReference {
    declaring_type: TypeSignature,
    name: String,
    arity: Option<usize>,
}

/// Metadata for a set of types, fields and methods, with their bodies.
///
/// # Examples
///
/// ```rust
/// use dotinline::metadata::{FieldRef, MetadataResolver, MetadataTable, MethodRef, TypeSignature};
///
/// let mut table = MetadataTable::new();
/// let employee = TypeSignature::class("Employee");
/// let first = table.add_field(FieldRef::new(employee.clone(), "FirstName", TypeSignature::String));
/// let getter = table.add_method(MethodRef::getter(employee, "Name", TypeSignature::String));
///
/// assert_eq!(table.resolve_field(first.token)?.name, "FirstName");
/// assert_eq!(table.resolve_method(getter.token)?.name, "get_Name");
/// # Ok::<(), dotinline::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MetadataTable {
    fields: Vec<FieldRc>,
    methods: Vec<MethodRc>,
    types: Vec<TypeSignature>,
    strings: Vec<Arc<str>>,
    member_refs: Vec<MemberReference>,
    bodies: HashMap<MemberId, MethodBodyRc>,
}

impl MetadataTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field and assigns its `Field` token.
    pub fn add_field(&mut self, mut field: FieldRef) -> FieldRc {
        field.token = Token::from_parts(Token::FIELD, next_row(self.fields.len()));
        let field = Arc::new(field);
        self.fields.push(field.clone());
        field
    }

    /// Registers a method and assigns its `MethodDef` token.
    pub fn add_method(&mut self, mut method: MethodRef) -> MethodRc {
        method.token = Token::from_parts(Token::METHOD_DEF, next_row(self.methods.len()));
        let method = Arc::new(method);
        self.methods.push(method.clone());
        method
    }

    /// Registers a type and returns its `TypeRef` token. Registering the same type twice
    /// returns the existing token.
    pub fn add_type(&mut self, ty: TypeSignature) -> Token {
        if let Some(index) = self.types.iter().position(|t| *t == ty) {
            return Token::from_parts(Token::TYPE_REF, next_row(index));
        }
        self.types.push(ty);
        Token::from_parts(Token::TYPE_REF, next_row(self.types.len() - 1))
    }

    /// Registers a string literal and returns its user-string token.
    pub fn add_string(&mut self, value: &str) -> Token {
        if let Some(index) = self.strings.iter().position(|s| &**s == value) {
            return Token::from_parts(Token::USER_STRING, next_row(index));
        }
        self.strings.push(Arc::from(value));
        Token::from_parts(Token::USER_STRING, next_row(self.strings.len() - 1))
    }

    /// Registers a `MemberRef` row naming a method by declaring type and name.
    ///
    /// With `arity` set, only definitions with that many declared parameters match. The
    /// reference is resolved lazily, so definitions may be added afterwards.
    pub fn add_member_ref(
        &mut self,
        declaring_type: TypeSignature,
        name: &str,
        arity: Option<usize>,
    ) -> Token {
        self.member_refs.push(MemberReference {
            declaring_type,
            name: name.to_string(),
            arity,
        });
        Token::from_parts(Token::MEMBER_REF, next_row(self.member_refs.len() - 1))
    }

    /// Attaches an instruction stream (and local slot types) to a registered method.
    pub fn set_body(&mut self, method: &MethodRc, code: Vec<u8>, locals: Vec<TypeSignature>) {
        let body = MethodBody::new(method.clone(), code).with_locals(locals);
        self.bodies.insert(method.id(), Arc::new(body));
    }

    /// Looks up a registered method by declaring type and name. Returns the first match.
    #[must_use]
    pub fn find_method(&self, declaring_type: &TypeSignature, name: &str) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|m| m.declaring_type == *declaring_type && m.name == name)
            .cloned()
    }

    /// All registered methods, in token order.
    #[must_use]
    pub fn methods(&self) -> &[MethodRc] {
        &self.methods
    }

    fn resolve_member_ref(&self, token: Token, reference: &MemberReference) -> Result<MethodRc> {
        let candidates = self
            .methods
            .iter()
            .filter(|m| m.declaring_type == reference.declaring_type && m.name == reference.name)
            .filter(|m| reference.arity.map_or(true, |arity| m.params.len() == arity))
            .collect::<Vec<_>>();

        match candidates.as_slice() {
            [] => Err(Error::UnresolvedToken(token)),
            [single] => Ok((*single).clone()),
            many => Err(Error::AmbiguousMemberResolution {
                member: format!("{}::{}", reference.declaring_type, reference.name),
                candidates: many.iter().map(|m| m.id().to_string()).collect(),
            }),
        }
    }
}

fn next_row(len: usize) -> u32 {
    u32::try_from(len + 1).unwrap_or(0x00FF_FFFF)
}

fn row_index(token: Token) -> Option<usize> {
    (token.row() as usize).checked_sub(1)
}

impl MetadataResolver for MetadataTable {
    fn resolve_field(&self, token: Token) -> Result<FieldRc> {
        if token.table() != Token::FIELD {
            return Err(Error::UnresolvedToken(token));
        }
        row_index(token)
            .and_then(|index| self.fields.get(index))
            .cloned()
            .ok_or(Error::UnresolvedToken(token))
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRc> {
        let index = row_index(token).ok_or(Error::UnresolvedToken(token))?;
        match token.table() {
            Token::METHOD_DEF => self
                .methods
                .get(index)
                .cloned()
                .ok_or(Error::UnresolvedToken(token)),
            Token::MEMBER_REF => {
                let reference = self
                    .member_refs
                    .get(index)
                    .ok_or(Error::UnresolvedToken(token))?;
                self.resolve_member_ref(token, reference)
            }
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_type(&self, token: Token) -> Result<TypeSignature> {
        if !token.is_type() {
            return Err(Error::UnresolvedToken(token));
        }
        row_index(token)
            .and_then(|index| self.types.get(index))
            .cloned()
            .ok_or(Error::UnresolvedToken(token))
    }

    fn resolve_string(&self, token: Token) -> Result<Arc<str>> {
        if token.table() != Token::USER_STRING {
            return Err(Error::UnresolvedToken(token));
        }
        row_index(token)
            .and_then(|index| self.strings.get(index))
            .cloned()
            .ok_or(Error::UnresolvedToken(token))
    }
}

impl MethodBodyProvider for MetadataTable {
    fn method_body(&self, method: &MethodRef) -> Option<MethodBodyRc> {
        self.bodies.get(&method.id()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> TypeSignature {
        TypeSignature::class("Employee")
    }

    #[test]
    fn test_tokens_are_sequential_per_table() {
        let mut table = MetadataTable::new();
        let a = table.add_field(FieldRef::new(employee(), "A", TypeSignature::I4));
        let b = table.add_field(FieldRef::new(employee(), "B", TypeSignature::I4));
        let m = table.add_method(MethodRef::new(employee(), "M"));

        assert_eq!(a.token, Token(0x0400_0001));
        assert_eq!(b.token, Token(0x0400_0002));
        assert_eq!(m.token, Token(0x0600_0001));
        assert_eq!(table.add_string(" "), Token(0x7000_0001));
        assert_eq!(table.add_string(" "), Token(0x7000_0001));
        assert_eq!(table.add_type(TypeSignature::I4), Token(0x0100_0001));
    }

    #[test]
    fn test_resolve_wrong_table() {
        let mut table = MetadataTable::new();
        let field = table.add_field(FieldRef::new(employee(), "A", TypeSignature::I4));

        assert_eq!(
            table.resolve_method(field.token),
            Err(Error::UnresolvedToken(field.token))
        );
        assert!(table.resolve_field(Token(0x0400_0009)).is_err());
        assert!(table.resolve_string(Token(0x7000_0000)).is_err());
    }

    #[test]
    fn test_member_ref_resolution() {
        let mut table = MetadataTable::new();
        let one = table.add_method(
            MethodRef::new(employee(), "FullNameMethod").param("prefix", TypeSignature::String),
        );
        table.add_method(
            MethodRef::new(employee(), "FullNameMethod")
                .param("prefix", TypeSignature::String)
                .param("postfix", TypeSignature::String),
        );

        let exact = table.add_member_ref(employee(), "FullNameMethod", Some(1));
        assert_eq!(table.resolve_method(exact).unwrap(), one);

        let loose = table.add_member_ref(employee(), "FullNameMethod", None);
        match table.resolve_method(loose) {
            Err(Error::AmbiguousMemberResolution { candidates, .. }) => {
                assert_eq!(candidates.len(), 2)
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }

        let missing = table.add_member_ref(employee(), "Nope", None);
        assert_eq!(
            table.resolve_method(missing),
            Err(Error::UnresolvedToken(missing))
        );
    }

    #[test]
    fn test_bodies_keyed_by_identity() {
        let mut table = MetadataTable::new();
        let getter = table.add_method(MethodRef::getter(employee(), "X", TypeSignature::I4));
        table.set_body(&getter, vec![0x17, 0x2A], Vec::new());

        let body = table.method_body(&getter).unwrap();
        assert_eq!(body.code, vec![0x17, 0x2A]);
        assert!(table
            .method_body(&MethodRef::getter(employee(), "Y", TypeSignature::I4))
            .is_none());
    }
}
