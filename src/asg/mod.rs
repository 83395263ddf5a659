//! ASG: the abstract semantic graph that traced computations are recorded into.
//!
//! Nodes are appended only, and every operand of a node is created before the
//! node itself, so node ids are already a valid topological order. Passes that
//! need an order (autograd, execution) rely on that.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Node identifier (index into [`Asg::nodes`]).
pub type NodeId = usize;
/// Graph identifier.
pub type AsgId = usize;
/// Tensor shape.
pub type Shape = Vec<usize>;

/// Runtime tensor value. Parameters and buffers hold these; scalars are 0-d.
pub type Value = ArrayD<f32>;

pub type AsgResult<T> = std::result::Result<T, AsgError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsgError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {node} refers to operand {operand} that does not precede it")]
    ForwardReference { node: NodeId, operand: NodeId },
    #[error("graph has no output")]
    NoOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeType {
    // Leaves
    Input { name: String },
    Parameter { name: String },
    Buffer { name: String },
    Literal(Value),

    // Binary, broadcasting
    Add(NodeId, NodeId),
    Subtract(NodeId, NodeId),
    Multiply(NodeId, NodeId),
    Divide(NodeId, NodeId),
    /// Exponent must evaluate to a scalar.
    Power(NodeId, NodeId),
    GreaterThan(NodeId, NodeId),
    MatrixMultiply(NodeId, NodeId),

    // Unary
    Negate(NodeId),
    Exp(NodeId),
    Log(NodeId),
    Sqrt(NodeId),
    Tanh(NodeId),
    ReLU(NodeId),
    Sigmoid(NodeId),

    // Reductions (to a 0-d scalar)
    Sum(NodeId),
    Mean(NodeId),
    /// Element count of the operand as a 0-d scalar; not differentiable.
    Numel(NodeId),

    // Shape
    Transpose(NodeId, usize, usize),
    /// Broadcast the first operand to the runtime shape of the second.
    Broadcast(NodeId, NodeId),
    /// Sum the first operand down to the runtime shape of the second.
    ReduceSumTo(NodeId, NodeId),
}

impl NodeType {
    /// Operands in evaluation order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            NodeType::Input { .. }
            | NodeType::Parameter { .. }
            | NodeType::Buffer { .. }
            | NodeType::Literal(_) => vec![],

            NodeType::Add(a, b)
            | NodeType::Subtract(a, b)
            | NodeType::Multiply(a, b)
            | NodeType::Divide(a, b)
            | NodeType::Power(a, b)
            | NodeType::GreaterThan(a, b)
            | NodeType::MatrixMultiply(a, b)
            | NodeType::Broadcast(a, b)
            | NodeType::ReduceSumTo(a, b) => vec![*a, *b],

            NodeType::Negate(x)
            | NodeType::Exp(x)
            | NodeType::Log(x)
            | NodeType::Sqrt(x)
            | NodeType::Tanh(x)
            | NodeType::ReLU(x)
            | NodeType::Sigmoid(x)
            | NodeType::Sum(x)
            | NodeType::Mean(x)
            | NodeType::Numel(x)
            | NodeType::Transpose(x, _, _) => vec![*x],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asg {
    pub id: AsgId,
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
}

impl Asg {
    pub fn new(id: AsgId, name: Option<String>) -> Self {
        Self { id, name, nodes: vec![], inputs: vec![], outputs: vec![] }
    }

    pub fn add_node(&mut self, name: Option<String>, node_type: NodeType) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { id, name, node_type });
        id
    }

    pub fn set_inputs(&mut self, inputs: Vec<NodeId>) {
        self.inputs = inputs;
    }

    pub fn set_outputs(&mut self, outputs: Vec<NodeId>) {
        self.outputs = outputs;
    }

    /// Shortcut for single-output graphs.
    pub fn set_output(&mut self, output: NodeId) {
        self.set_outputs(vec![output]);
    }

    pub fn get_node(&self, id: NodeId) -> AsgResult<&Node> {
        self.nodes.get(id).ok_or(AsgError::NodeNotFound(id))
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> AsgResult<&mut Node> {
        self.nodes.get_mut(id).ok_or(AsgError::NodeNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks that every operand precedes its user, which is what makes id
    /// order topological.
    pub fn validate(&self) -> AsgResult<()> {
        for node in &self.nodes {
            for operand in node.node_type.operands() {
                if operand >= node.id {
                    return Err(AsgError::ForwardReference { node: node.id, operand });
                }
            }
        }
        Ok(())
    }

    /// Nodes needed to compute `roots`, in topological order.
    pub fn ancestors(&self, roots: &[NodeId]) -> AsgResult<Vec<NodeId>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.get_node(id)?.node_type.operands());
        }
        let mut order: Vec<NodeId> = seen.into_iter().collect();
        order.sort_unstable();
        Ok(order)
    }

    /// Nodes whose value depends on any of `leaves` (the leaves included).
    pub fn dependents(&self, leaves: &[NodeId]) -> HashSet<NodeId> {
        let mut reached: HashSet<NodeId> = leaves.iter().copied().collect();
        for node in &self.nodes {
            if node.node_type.operands().iter().any(|op| reached.contains(op)) {
                reached.insert(node.id);
            }
        }
        reached
    }
}
