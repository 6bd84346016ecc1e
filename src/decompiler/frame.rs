//! Symbolic evaluation state.

use std::collections::BTreeMap;

use crate::{expression::Expr, Error, Result};

/// Operand stack and local slots of one interpretation path.
///
/// Values are expression trees rather than runtime values. A frame is cloned when
/// interpretation splits at a conditional branch and merged again where the arms join; it
/// never outlives the interpretation of one method body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolicFrame {
    stack: Vec<Expr>,
    locals: BTreeMap<u16, Expr>,
}

impl SymbolicFrame {
    /// Creates an empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a value.
    pub fn push(&mut self, value: Expr) {
        self.stack.push(value);
    }

    /// Pops the top value.
    ///
    /// # Errors
    /// [`Error::StackUnderflow`] naming `offset` when the stack is empty.
    pub fn pop(&mut self, offset: u32) -> Result<Expr> {
        self.stack.pop().ok_or(Error::StackUnderflow { offset })
    }

    /// Pops `count` values, returned in push order.
    ///
    /// # Errors
    /// [`Error::StackUnderflow`] naming `offset` when fewer than `count` values are present.
    pub fn pop_n(&mut self, count: usize, offset: u32) -> Result<Vec<Expr>> {
        if count > self.stack.len() {
            return Err(Error::StackUnderflow { offset });
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Returns the top value.
    ///
    /// # Errors
    /// [`Error::StackUnderflow`] naming `offset` when the stack is empty.
    pub fn peek(&self, offset: u32) -> Result<&Expr> {
        self.stack.last().ok_or(Error::StackUnderflow { offset })
    }

    /// Returns the top value mutably.
    ///
    /// # Errors
    /// [`Error::StackUnderflow`] naming `offset` when the stack is empty.
    pub fn peek_mut(&mut self, offset: u32) -> Result<&mut Expr> {
        self.stack.last_mut().ok_or(Error::StackUnderflow { offset })
    }

    /// Number of values on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Stack contents, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[Expr] {
        &self.stack
    }

    /// Assigns a local slot.
    pub fn store(&mut self, slot: u16, value: Expr) {
        self.locals.insert(slot, value);
    }

    /// Reads a local slot.
    ///
    /// # Errors
    /// [`Error::UnsupportedControlFlow`] when the slot has no value on every path reaching
    /// `offset`.
    pub fn load(&self, slot: u16, offset: u32) -> Result<Expr> {
        self.locals.get(&slot).cloned().ok_or_else(|| {
            control_flow_error!(
                offset,
                "local {} is read without a value assigned on every path",
                slot
            )
        })
    }

    /// Local slots with a value, by slot number.
    #[must_use]
    pub fn locals(&self) -> &BTreeMap<u16, Expr> {
        &self.locals
    }

    /// Replaces stack and locals wholesale; used when two paths are joined.
    pub(crate) fn from_parts(stack: Vec<Expr>, locals: BTreeMap<u16, Expr>) -> Self {
        SymbolicFrame { stack, locals }
    }
}
