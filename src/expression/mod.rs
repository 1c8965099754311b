//! Arithmetic expression engine.
//!
//! An [`Expression`] is created from source text, initialized once (tokenize, normalize
//! precedence, build the tree) and then evaluated any number of times against different
//! variable bindings.

pub mod lexer;
pub mod precedence;
pub mod tree;

use std::collections::HashMap;

use crate::errors::ProtocolError;

pub use lexer::{Operator, Token};
pub use tree::{ExpressionTree, NodeId, NodeKind};

/// Source of variable values for one evaluation.
pub trait Bindings {
    fn value_of(&self, name: &str) -> Option<f64>;
}

impl Bindings for HashMap<String, f64> {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Bindings for [(&str, f64)] {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.iter().rev().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone)]
pub struct Expression {
    source: Option<String>,
    tree: Option<ExpressionTree>,
}

impl Expression {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            tree: None,
        }
    }

    /// An expression with no source text; initializing it fails.
    pub fn absent() -> Self {
        Self {
            source: None,
            tree: None,
        }
    }

    /// Tokenizes, normalizes and builds the tree. Whitespace is ignored.
    pub fn initialize(&mut self) -> Result<(), ProtocolError> {
        let source: String = self
            .source
            .as_deref()
            .ok_or_else(ProtocolError::empty_expression)?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if source.is_empty() {
            return Err(ProtocolError::empty_expression());
        }

        let mut tokens = lexer::tokenize(&source)?;
        precedence::normalize(&mut tokens)?;
        self.tree = Some(ExpressionTree::build(&tokens)?);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.tree.is_some()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn evaluate<B>(&self, bindings: &B) -> Result<f64, ProtocolError>
    where
        B: Bindings + ?Sized,
    {
        self.tree
            .as_ref()
            .ok_or_else(ProtocolError::not_initialized)?
            .evaluate(bindings)
    }

    /// Shorthand for [`Expression::new`] followed by [`Expression::initialize`].
    pub fn parse(source: &str) -> Result<Self, ProtocolError> {
        let mut expression = Self::new(source);
        expression.initialize()?;
        Ok(expression)
    }
}
