//! `Tensor` and `GraphContext`.
//!
//! `Tensor` holds no data. It is a lightweight handle to a node of the graph
//! that is being traced; every operation on it appends a node instead of
//! computing anything. Forward implementations of modules are written
//! against this type, so the same code is both the "trace" and, after
//! compilation, the computation that runs on a backend.

use crate::asg::{Asg, NodeId, NodeType, Value};
use ndarray::arr0;
use std::cell::RefCell;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

/// Owns the graph a trace is recorded into.
///
/// Shared between tensor handles through `Rc<RefCell<_>>`.
#[derive(Debug, Clone)]
pub struct GraphContext {
    main_graph: Asg,
}

impl GraphContext {
    pub fn new() -> Self {
        Self { main_graph: Asg::new(0, Some("main".to_string())) }
    }

    pub fn main_graph_mut(&mut self) -> &mut Asg {
        &mut self.main_graph
    }

    pub fn main_graph(&self) -> &Asg {
        &self.main_graph
    }

    /// Fresh shared context, the form every constructor below expects.
    pub fn shared() -> Rc<RefCell<GraphContext>> {
        Rc::new(RefCell::new(Self::new()))
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbolic handle to a node of the graph being traced.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub node_id: NodeId,
    pub context: Rc<RefCell<GraphContext>>,
}

impl Tensor {
    /// Graph input; bound to real data on every run.
    pub fn new_input(context: &Rc<RefCell<GraphContext>>, name: &str) -> Self {
        let mut ctx = context.borrow_mut();
        let graph = ctx.main_graph_mut();
        let node_id = graph.add_node(Some(name.to_string()), NodeType::Input { name: name.to_string() });
        graph.inputs.push(node_id);
        Self { node_id, context: Rc::clone(context) }
    }

    /// Trainable parameter, addressed by its flattened path.
    pub fn new_parameter(context: &Rc<RefCell<GraphContext>>, name: &str) -> Self {
        let node_id = context
            .borrow_mut()
            .main_graph_mut()
            .add_node(Some(name.to_string()), NodeType::Parameter { name: name.to_string() });
        Self { node_id, context: Rc::clone(context) }
    }

    /// Non-trainable buffer, addressed by its flattened path.
    pub fn new_buffer(context: &Rc<RefCell<GraphContext>>, name: &str) -> Self {
        let node_id = context
            .borrow_mut()
            .main_graph_mut()
            .add_node(Some(name.to_string()), NodeType::Buffer { name: name.to_string() });
        Self { node_id, context: Rc::clone(context) }
    }

    /// Constant embedded into the graph.
    pub fn new_literal(context: &Rc<RefCell<GraphContext>>, data: Value, name: &str) -> Self {
        let node_id = context
            .borrow_mut()
            .main_graph_mut()
            .add_node(Some(name.to_string()), NodeType::Literal(data));
        Self { node_id, context: Rc::clone(context) }
    }

    /// Scalar constant in the same graph as `self`.
    pub fn scalar(&self, value: f32) -> Tensor {
        self.push(NodeType::Literal(arr0(value).into_dyn()))
    }

    fn push(&self, node_type: NodeType) -> Tensor {
        let node_id = self.context.borrow_mut().main_graph_mut().add_node(None, node_type);
        Tensor { node_id, context: Rc::clone(&self.context) }
    }

    fn binary(&self, rhs: &Tensor, op: fn(NodeId, NodeId) -> NodeType) -> Tensor {
        debug_assert!(
            Rc::ptr_eq(&self.context, &rhs.context),
            "tensors from different graphs cannot be combined"
        );
        self.push(op(self.node_id, rhs.node_id))
    }

    // --- Math ---

    pub fn pow(&self, power: &Tensor) -> Tensor {
        self.binary(power, NodeType::Power)
    }

    pub fn powf(&self, power: f32) -> Tensor {
        let p = self.scalar(power);
        self.pow(&p)
    }

    pub fn dot(&self, other: &Tensor) -> Tensor {
        self.binary(other, NodeType::MatrixMultiply)
    }

    pub fn greater_than(&self, other: &Tensor) -> Tensor {
        self.binary(other, NodeType::GreaterThan)
    }

    pub fn scale(&self, factor: f32) -> Tensor {
        let f = self.scalar(factor);
        self * &f
    }

    pub fn add_scalar(&self, value: f32) -> Tensor {
        let v = self.scalar(value);
        self + &v
    }

    pub fn exp(&self) -> Tensor {
        self.push(NodeType::Exp(self.node_id))
    }

    pub fn log(&self) -> Tensor {
        self.push(NodeType::Log(self.node_id))
    }

    pub fn sqrt(&self) -> Tensor {
        self.push(NodeType::Sqrt(self.node_id))
    }

    // --- Activations ---

    pub fn relu(&self) -> Tensor {
        self.push(NodeType::ReLU(self.node_id))
    }

    pub fn sigmoid(&self) -> Tensor {
        self.push(NodeType::Sigmoid(self.node_id))
    }

    pub fn tanh(&self) -> Tensor {
        self.push(NodeType::Tanh(self.node_id))
    }

    // --- Reductions ---

    pub fn sum(&self) -> Tensor {
        self.push(NodeType::Sum(self.node_id))
    }

    pub fn mean(&self) -> Tensor {
        self.push(NodeType::Mean(self.node_id))
    }

    // --- Shape ---

    pub fn transpose(&self, axis1: usize, axis2: usize) -> Tensor {
        self.push(NodeType::Transpose(self.node_id, axis1, axis2))
    }

    pub fn broadcast_like(&self, target: &Tensor) -> Tensor {
        self.binary(target, NodeType::Broadcast)
    }
}

// Operators for `a + b` syntax, on references and owned handles alike.
macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $node:ident) => {
        impl $trait<&Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                self.binary(rhs, NodeType::$node)
            }
        }

        impl $trait<Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                (&self).binary(&rhs, NodeType::$node)
            }
        }

        impl $trait<&Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                (&self).binary(rhs, NodeType::$node)
            }
        }

        impl $trait<Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                self.binary(&rhs, NodeType::$node)
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Subtract);
impl_binary_op!(Mul, mul, Multiply);
impl_binary_op!(Div, div, Divide);

impl Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        self.push(NodeType::Negate(self.node_id))
    }
}

impl Neg for Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_append_nodes() {
        let ctx = GraphContext::shared();
        let x = Tensor::new_input(&ctx, "x");
        let w = Tensor::new_parameter(&ctx, "w");
        let y = (&x * &w).sum();

        let graph = ctx.borrow();
        let graph = graph.main_graph();
        assert_eq!(graph.inputs, vec![x.node_id]);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.nodes[y.node_id].node_type, NodeType::Sum(y.node_id - 1));
    }

    #[test]
    fn owned_and_borrowed_operators_agree() {
        let ctx = GraphContext::shared();
        let a = Tensor::new_input(&ctx, "a");
        let b = Tensor::new_input(&ctx, "b");
        let by_ref = &a - &b;
        let owned = a.clone() - b.clone();
        let graph = ctx.borrow();
        assert_eq!(
            graph.main_graph().nodes[by_ref.node_id].node_type,
            graph.main_graph().nodes[owned.node_id].node_type
        );
    }
}
