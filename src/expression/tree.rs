//! Arena-backed expression tree.
//!
//! Nodes live in one `Vec` and refer to each other by index. A child is always
//! allocated after its parent, so walking the arena backwards visits every child before
//! its parent; evaluation relies on that instead of recursing.

use super::lexer::{Operator, Token};
use super::Bindings;
use crate::errors::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// No value yet; once the tree is complete, a grouping node with one left child.
    Group,
    Number(f64),
    Variable(String),
    Operator(Operator),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

impl Node {
    fn empty(parent: Option<NodeId>) -> Self {
        Self {
            kind: NodeKind::Group,
            parent,
            left: None,
            right: None,
        }
    }

    fn is_blank(&self) -> bool {
        self.kind == NodeKind::Group && self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ExpressionTree {
    nodes: Vec<Node>,
}

impl ExpressionTree {
    /// Builds the tree from a normalized token list with a single cursor descent.
    pub fn build(tokens: &[Token]) -> Result<Self, ProtocolError> {
        let mut tree = Self {
            nodes: vec![Node::empty(None)],
        };
        let mut cursor = Some(NodeId::ROOT);

        for token in tokens {
            let current = cursor.ok_or_else(ProtocolError::malformed_expression)?;
            cursor = match token {
                Token::LParen => {
                    if !tree.node(current).is_blank() {
                        return Err(ProtocolError::malformed_expression());
                    }
                    let child = tree.alloc(current);
                    tree.node_mut(current).left = Some(child);
                    Some(child)
                }
                Token::RParen => tree.node(current).parent,
                Token::Operator(op) => {
                    let node = tree.node(current);
                    if node.kind != NodeKind::Group || node.right.is_some() {
                        return Err(ProtocolError::malformed_expression());
                    }
                    let child = tree.alloc(current);
                    let node = tree.node_mut(current);
                    node.kind = NodeKind::Operator(*op);
                    node.right = Some(child);
                    Some(child)
                }
                Token::Number(value) => tree.set_leaf(current, NodeKind::Number(*value))?,
                Token::Variable(name) => {
                    tree.set_leaf(current, NodeKind::Variable(name.clone()))?
                }
            };
        }

        tree.check_complete()?;
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> (Option<NodeId>, Option<NodeId>) {
        let node = self.node(id);
        (node.left, node.right)
    }

    /// Evaluates the whole tree against `bindings`.
    ///
    /// Absent operator children count as `0`. Non-finite results are returned as NaN
    /// and left for the caller to filter.
    pub fn evaluate<B>(&self, bindings: &B) -> Result<f64, ProtocolError>
    where
        B: Bindings + ?Sized,
    {
        let mut values = vec![0.0_f64; self.nodes.len()];
        let value_of = |values: &[f64], id: Option<NodeId>| id.map_or(0.0, |id| values[id.0]);

        for index in (0..self.nodes.len()).rev() {
            let node = &self.nodes[index];
            values[index] = match &node.kind {
                NodeKind::Number(value) => *value,
                NodeKind::Variable(name) => bindings
                    .value_of(name)
                    .ok_or_else(|| ProtocolError::unknown_variable(name))?,
                NodeKind::Group => value_of(&values, node.left),
                NodeKind::Operator(op) => {
                    op.apply(value_of(&values, node.left), value_of(&values, node.right))
                }
            };
        }

        Ok(values[NodeId::ROOT.0])
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn alloc(&mut self, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::empty(Some(parent)));
        id
    }

    fn set_leaf(&mut self, id: NodeId, kind: NodeKind) -> Result<Option<NodeId>, ProtocolError> {
        let node = self.node_mut(id);
        if !node.is_blank() {
            return Err(ProtocolError::malformed_expression());
        }
        node.kind = kind;
        Ok(node.parent)
    }

    fn check_complete(&self) -> Result<(), ProtocolError> {
        let dangling = self.nodes.iter().any(|node| {
            node.kind == NodeKind::Group && (node.left.is_none() || node.right.is_some())
        });
        if dangling {
            Err(ProtocolError::malformed_expression())
        } else {
            Ok(())
        }
    }
}
