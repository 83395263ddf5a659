//! Autograd: reverse-mode construction of d(loss)/d(leaf) nodes.
//!
//! Algorithm:
//!  - find the nodes whose value depends on the requested leaves;
//!  - walk the graph in reverse id order (ids are topological, see `asg`);
//!  - for every node that has an incoming gradient, add contribution nodes
//!    for those operands that depend on a leaf, and accumulate (sum) them.
//!
//! Gradient nodes are appended to the same graph as the forward pass and
//! refer to forward nodes directly, so one execution of the graph yields the
//! objective and all gradients together.
//!
//! Broadcasting binary ops reduce their gradients back to the operand's
//! runtime shape with `ReduceSumTo`; reductions spread them back with
//! `Broadcast`. Leaves that the loss does not reach get a zero gradient of
//! their own shape.

use crate::asg::{Asg, AsgError, NodeId, NodeType};
use ndarray::arr0;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutogradError {
    #[error("graph: {0}")]
    Asg(#[from] AsgError),
    #[error("node {0} is not a leaf and cannot be differentiated against")]
    NotALeaf(NodeId),
}

pub type AutogradResult<T> = Result<T, AutogradError>;

/// Builds gradient nodes into an existing graph.
pub struct Gradients<'a> {
    graph: &'a mut Asg,
    /// forward node -> accumulated gradient node
    gmap: HashMap<NodeId, NodeId>,
    /// forward nodes that depend on at least one requested leaf
    needs: HashSet<NodeId>,
}

impl<'a> Gradients<'a> {
    pub fn new(graph: &'a mut Asg) -> Self {
        Self { graph, gmap: HashMap::new(), needs: HashSet::new() }
    }

    /// Appends d(`loss_id`)/d(`wrt[i]`) for every leaf in `wrt` and returns
    /// the gradient node ids in the same order. The seed is a scalar 1.0.
    pub fn build(mut self, loss_id: NodeId, wrt: &[NodeId]) -> AutogradResult<Vec<NodeId>> {
        for &leaf in wrt {
            match self.graph.get_node(leaf)?.node_type {
                NodeType::Input { .. } | NodeType::Parameter { .. } | NodeType::Buffer { .. } => {}
                _ => return Err(AutogradError::NotALeaf(leaf)),
            }
        }
        self.graph.get_node(loss_id)?;
        self.needs = self.graph.dependents(wrt);
        let forward_len = self.graph.len();

        if self.needs.contains(&loss_id) {
            let seed = self.lit_scalar(1.0);
            self.gmap.insert(loss_id, seed);
        }

        for id in (0..=loss_id).rev() {
            let Some(g_out) = self.gmap.get(&id).copied() else {
                continue;
            };
            let node_type = self.graph.get_node(id)?.node_type.clone();
            self.backprop(id, &node_type, g_out);
        }

        let mut grads = Vec::with_capacity(wrt.len());
        for &leaf in wrt {
            let g = match self.gmap.get(&leaf).copied() {
                Some(g) => g,
                None => {
                    let zero = self.lit_scalar(0.0);
                    self.add_node(NodeType::Broadcast(zero, leaf))
                }
            };
            grads.push(g);
        }
        debug!(
            forward_nodes = forward_len,
            gradient_nodes = self.graph.len() - forward_len,
            leaves = wrt.len(),
            "built gradient graph"
        );
        Ok(grads)
    }

    fn backprop(&mut self, y: NodeId, node_type: &NodeType, g: NodeId) {
        match *node_type {
            // Leaves: the accumulated gradient is the answer.
            NodeType::Input { .. }
            | NodeType::Parameter { .. }
            | NodeType::Buffer { .. }
            | NodeType::Literal(_) => {}

            // -------- Binary --------
            NodeType::Add(a, b) => {
                self.acc_reduced(a, g);
                self.acc_reduced(b, g);
            }
            NodeType::Subtract(a, b) => {
                self.acc_reduced(a, g);
                if self.needs.contains(&b) {
                    let neg = self.add_node(NodeType::Negate(g));
                    self.acc_reduced(b, neg);
                }
            }
            NodeType::Multiply(a, b) => {
                if self.needs.contains(&a) {
                    let g_a = self.add_node(NodeType::Multiply(g, b));
                    self.acc_reduced(a, g_a);
                }
                if self.needs.contains(&b) {
                    let g_b = self.add_node(NodeType::Multiply(g, a));
                    self.acc_reduced(b, g_b);
                }
            }
            NodeType::Divide(a, b) => {
                if self.needs.contains(&a) {
                    let g_a = self.add_node(NodeType::Divide(g, b));
                    self.acc_reduced(a, g_a);
                }
                if self.needs.contains(&b) {
                    // d(a/b)/db = -(a/b)/b = -y/b
                    let gy = self.add_node(NodeType::Multiply(g, y));
                    let q = self.add_node(NodeType::Divide(gy, b));
                    let g_b = self.add_node(NodeType::Negate(q));
                    self.acc_reduced(b, g_b);
                }
            }
            NodeType::Power(a, p) => {
                if self.needs.contains(&a) {
                    // p * a^(p-1)
                    let one = self.lit_scalar(1.0);
                    let p_minus_one = self.add_node(NodeType::Subtract(p, one));
                    let a_pow = self.add_node(NodeType::Power(a, p_minus_one));
                    let term = self.add_node(NodeType::Multiply(p, a_pow));
                    let g_a = self.add_node(NodeType::Multiply(g, term));
                    self.acc_reduced(a, g_a);
                }
                if self.needs.contains(&p) {
                    // a^p * ln(a)
                    let ln_a = self.add_node(NodeType::Log(a));
                    let term = self.add_node(NodeType::Multiply(y, ln_a));
                    let g_p = self.add_node(NodeType::Multiply(g, term));
                    self.acc_reduced(p, g_p);
                }
            }
            NodeType::MatrixMultiply(a, b) => {
                if self.needs.contains(&a) {
                    let bt = self.add_node(NodeType::Transpose(b, 0, 1));
                    let g_a = self.add_node(NodeType::MatrixMultiply(g, bt));
                    self.acc(a, g_a);
                }
                if self.needs.contains(&b) {
                    let at = self.add_node(NodeType::Transpose(a, 0, 1));
                    let g_b = self.add_node(NodeType::MatrixMultiply(at, g));
                    self.acc(b, g_b);
                }
            }
            // Comparisons are piecewise constant.
            NodeType::GreaterThan(_, _) => {}

            // -------- Unary --------
            NodeType::Negate(x) => {
                let g_x = self.add_node(NodeType::Negate(g));
                self.acc(x, g_x);
            }
            NodeType::Exp(x) => {
                let g_x = self.add_node(NodeType::Multiply(g, y));
                self.acc(x, g_x);
            }
            NodeType::Log(x) => {
                let g_x = self.add_node(NodeType::Divide(g, x));
                self.acc(x, g_x);
            }
            NodeType::Sqrt(x) => {
                let two = self.lit_scalar(2.0);
                let denom = self.add_node(NodeType::Multiply(two, y));
                let g_x = self.add_node(NodeType::Divide(g, denom));
                self.acc(x, g_x);
            }
            NodeType::Tanh(x) => {
                let one = self.lit_scalar(1.0);
                let y2 = self.add_node(NodeType::Multiply(y, y));
                let term = self.add_node(NodeType::Subtract(one, y2));
                let g_x = self.add_node(NodeType::Multiply(g, term));
                self.acc(x, g_x);
            }
            NodeType::ReLU(x) => {
                let zero = self.lit_scalar(0.0);
                let mask = self.add_node(NodeType::GreaterThan(x, zero));
                let g_x = self.add_node(NodeType::Multiply(g, mask));
                self.acc(x, g_x);
            }
            NodeType::Sigmoid(x) => {
                let one = self.lit_scalar(1.0);
                let one_minus = self.add_node(NodeType::Subtract(one, y));
                let term = self.add_node(NodeType::Multiply(y, one_minus));
                let g_x = self.add_node(NodeType::Multiply(g, term));
                self.acc(x, g_x);
            }

            // -------- Reductions --------
            NodeType::Sum(x) => {
                let g_x = self.add_node(NodeType::Broadcast(g, x));
                self.acc(x, g_x);
            }
            NodeType::Mean(x) => {
                let n = self.add_node(NodeType::Numel(x));
                let scaled = self.add_node(NodeType::Divide(g, n));
                let g_x = self.add_node(NodeType::Broadcast(scaled, x));
                self.acc(x, g_x);
            }
            NodeType::Numel(_) => {}

            // -------- Shape --------
            NodeType::Transpose(x, a1, a2) => {
                let g_x = self.add_node(NodeType::Transpose(g, a1, a2));
                self.acc(x, g_x);
            }
            NodeType::Broadcast(x, _target) => {
                let g_x = self.add_node(NodeType::ReduceSumTo(g, x));
                self.acc(x, g_x);
            }
            NodeType::ReduceSumTo(x, _target) => {
                let g_x = self.add_node(NodeType::Broadcast(g, x));
                self.acc(x, g_x);
            }
        }
    }

    fn add_node(&mut self, node_type: NodeType) -> NodeId {
        self.graph.add_node(None, node_type)
    }

    fn lit_scalar(&mut self, v: f32) -> NodeId {
        self.graph.add_node(None, NodeType::Literal(arr0(v).into_dyn()))
    }

    /// dL/d(target) += contrib, only for targets on a path to a leaf.
    fn acc(&mut self, target: NodeId, contrib: NodeId) {
        if !self.needs.contains(&target) {
            return;
        }
        let total = match self.gmap.get(&target).copied() {
            Some(prev) => self.add_node(NodeType::Add(prev, contrib)),
            None => contrib,
        };
        self.gmap.insert(target, total);
    }

    /// Like `acc`, but first sums `contrib` down to the target's shape,
    /// undoing any broadcasting the forward op performed.
    fn acc_reduced(&mut self, target: NodeId, contrib: NodeId) {
        if !self.needs.contains(&target) {
            return;
        }
        let reduced = self.add_node(NodeType::ReduceSumTo(contrib, target));
        self.acc(target, reduced);
    }
}
