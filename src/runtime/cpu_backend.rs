//! Backend that executes an ASG on the CPU.
//!
//! Walks the nodes required by the graph outputs in topological order and
//! evaluates each with `ndarray`. Binary element-wise ops broadcast both
//! operands to their common shape (numpy rules); shape mismatches surface as
//! `RuntimeError::ShapeError` rather than panics.

use super::backend::{Backend, Memo, RuntimeError};
use crate::asg::{Asg, NodeId, NodeType, Value};
use ndarray::{arr0, ArrayD, Axis, Ix2, IxDyn, Zip};
use std::collections::HashMap;
use tracing::trace;

/// Execution state for one run of one graph.
struct ExecutionContext<'a> {
    graph: &'a Asg,
    memo: Memo<Value>,
}

impl<'a> ExecutionContext<'a> {
    fn new(graph: &'a Asg, initial_memo: Memo<Value>) -> Self {
        Self { graph, memo: initial_memo }
    }

    fn operand(&self, id: NodeId) -> Result<&Value, RuntimeError> {
        self.memo.get(&id).ok_or(RuntimeError::NodeNotFound(id))
    }

    /// Evaluates `node_id`, assuming its operands are already in the memo.
    fn evaluate_node(&mut self, node_id: NodeId) -> Result<(), RuntimeError> {
        if self.memo.contains_key(&node_id) {
            return Ok(());
        }
        let graph = self.graph;
        let node = graph.nodes.get(node_id).ok_or(RuntimeError::NodeNotFound(node_id))?;

        let result = match &node.node_type {
            NodeType::Input { name } => {
                return Err(RuntimeError::MissingInput(name.clone(), node.id));
            }
            NodeType::Parameter { name } => {
                return Err(RuntimeError::MissingParameter(name.clone(), node.id));
            }
            NodeType::Buffer { name } => {
                return Err(RuntimeError::MissingBuffer(name.clone(), node.id));
            }
            NodeType::Literal(value) => value.clone(),

            NodeType::Add(l, r) => zip_broadcast(self.operand(*l)?, self.operand(*r)?, |a, b| a + b)?,
            NodeType::Subtract(l, r) => zip_broadcast(self.operand(*l)?, self.operand(*r)?, |a, b| a - b)?,
            NodeType::Multiply(l, r) => zip_broadcast(self.operand(*l)?, self.operand(*r)?, |a, b| a * b)?,
            NodeType::Divide(l, r) => zip_broadcast(self.operand(*l)?, self.operand(*r)?, |a, b| a / b)?,
            NodeType::GreaterThan(l, r) => zip_broadcast(self.operand(*l)?, self.operand(*r)?, |a, b| {
                if a > b {
                    1.0
                } else {
                    0.0
                }
            })?,
            NodeType::Power(base, power) => op_power(self.operand(*base)?, self.operand(*power)?)?,
            NodeType::MatrixMultiply(l, r) => op_matmul(self.operand(*l)?, self.operand(*r)?)?,

            NodeType::Negate(x) => self.operand(*x)?.mapv(|v| -v),
            NodeType::Exp(x) => self.operand(*x)?.mapv(f32::exp),
            NodeType::Log(x) => self.operand(*x)?.mapv(f32::ln),
            NodeType::Sqrt(x) => self.operand(*x)?.mapv(f32::sqrt),
            NodeType::Tanh(x) => self.operand(*x)?.mapv(f32::tanh),
            NodeType::ReLU(x) => self.operand(*x)?.mapv(|v| v.max(0.0)),
            NodeType::Sigmoid(x) => self.operand(*x)?.mapv(|v| 1.0 / (1.0 + (-v).exp())),

            NodeType::Sum(x) => arr0(self.operand(*x)?.sum()).into_dyn(),
            NodeType::Mean(x) => op_mean(self.operand(*x)?)?,
            NodeType::Numel(x) => arr0(self.operand(*x)?.len() as f32).into_dyn(),

            NodeType::Transpose(x, a1, a2) => op_transpose(self.operand(*x)?, *a1, *a2)?,
            NodeType::Broadcast(x, target) => op_broadcast(self.operand(*x)?, self.operand(*target)?)?,
            NodeType::ReduceSumTo(x, target) => {
                op_reduce_sum_to(self.operand(*x)?, self.operand(*target)?)?
            }
        };

        self.memo.insert(node_id, result);
        Ok(())
    }
}

pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    type DeviceData = Value;

    fn load_data(
        &self,
        data: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Self::DeviceData>, RuntimeError> {
        Ok(data.clone())
    }

    fn run(
        &self,
        main_asg: &Asg,
        initial_memo: Memo<Self::DeviceData>,
    ) -> Result<(Vec<Self::DeviceData>, Memo<Self::DeviceData>), RuntimeError> {
        let order = main_asg
            .ancestors(&main_asg.outputs)
            .map_err(|e| RuntimeError::InvalidGraph(e.to_string()))?;
        trace!(graph = main_asg.id, nodes = order.len(), "cpu run");

        let mut context = ExecutionContext::new(main_asg, initial_memo);
        for node_id in order {
            context.evaluate_node(node_id)?;
        }

        let mut results = Vec::with_capacity(main_asg.outputs.len());
        for output in &main_asg.outputs {
            results.push(context.operand(*output)?.clone());
        }
        Ok((results, context.memo))
    }

    fn retrieve_data(&self, device_data: &[Self::DeviceData]) -> Result<Vec<Value>, RuntimeError> {
        Ok(device_data.to_vec())
    }
}

/// Common shape of two operands under numpy broadcasting rules.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, RuntimeError> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(RuntimeError::ShapeError(format!(
                    "cannot broadcast {a:?} with {b:?}"
                )))
            }
        };
    }
    Ok(out)
}

fn zip_broadcast(
    lhs: &Value,
    rhs: &Value,
    f: impl Fn(f32, f32) -> f32,
) -> Result<Value, RuntimeError> {
    if lhs.shape() == rhs.shape() {
        return Ok(Zip::from(lhs).and(rhs).map_collect(|&a, &b| f(a, b)));
    }
    let shape = broadcast_shape(lhs.shape(), rhs.shape())?;
    let shape_err = || RuntimeError::ShapeError(format!("cannot broadcast {:?} with {:?}", lhs.shape(), rhs.shape()));
    let a = lhs.broadcast(IxDyn(&shape)).ok_or_else(shape_err)?;
    let b = rhs.broadcast(IxDyn(&shape)).ok_or_else(shape_err)?;
    Ok(Zip::from(&a).and(&b).map_collect(|&x, &y| f(x, y)))
}

fn scalar_of(value: &Value, what: &str) -> Result<f32, RuntimeError> {
    if value.len() != 1 {
        return Err(RuntimeError::TypeError {
            expected: format!("scalar {what}"),
            actual: format!("tensor of shape {:?}", value.shape()),
        });
    }
    value
        .first()
        .copied()
        .ok_or_else(|| RuntimeError::ShapeError(format!("empty {what}")))
}

fn op_power(base: &Value, power: &Value) -> Result<Value, RuntimeError> {
    let p = scalar_of(power, "exponent")?;
    Ok(base.mapv(|v| v.powf(p)))
}

fn op_mean(operand: &Value) -> Result<Value, RuntimeError> {
    let mean = operand
        .mean()
        .ok_or_else(|| RuntimeError::ShapeError("mean of an empty tensor".to_string()))?;
    Ok(arr0(mean).into_dyn())
}

fn op_matmul(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    if lhs.ndim() == 0 || rhs.ndim() == 0 {
        return zip_broadcast(lhs, rhs, |a, b| a * b);
    }
    let a = lhs.view().into_dimensionality::<Ix2>().map_err(|e| {
        RuntimeError::ShapeError(format!("matmul lhs {:?} is not a matrix: {e}", lhs.shape()))
    })?;
    let b = rhs.view().into_dimensionality::<Ix2>().map_err(|e| {
        RuntimeError::ShapeError(format!("matmul rhs {:?} is not a matrix: {e}", rhs.shape()))
    })?;
    if a.ncols() != b.nrows() {
        return Err(RuntimeError::ShapeError(format!(
            "incompatible matmul shapes: {:?} and {:?}",
            lhs.shape(),
            rhs.shape()
        )));
    }
    Ok(a.dot(&b).into_dyn())
}

fn op_transpose(operand: &Value, axis1: usize, axis2: usize) -> Result<Value, RuntimeError> {
    let rank = operand.ndim();
    // Vectors and scalars are their own transpose.
    if rank < 2 {
        return Ok(operand.clone());
    }
    if axis1 >= rank || axis2 >= rank {
        return Err(RuntimeError::ShapeError(format!(
            "invalid transpose axes ({axis1}, {axis2}) for rank {rank}"
        )));
    }
    let mut view = operand.view();
    view.swap_axes(axis1, axis2);
    Ok(view.as_standard_layout().into_owned())
}

fn op_broadcast(source: &Value, target: &Value) -> Result<Value, RuntimeError> {
    let view = source.broadcast(target.raw_dim()).ok_or_else(|| {
        RuntimeError::ShapeError(format!(
            "cannot broadcast {:?} to {:?}",
            source.shape(),
            target.shape()
        ))
    })?;
    Ok(view.to_owned())
}

/// Inverse of broadcasting: sums `source` down to the shape of `target`.
fn op_reduce_sum_to(source: &Value, target: &Value) -> Result<Value, RuntimeError> {
    let target_shape = target.shape();
    let mut reduced: ArrayD<f32> = source.clone();

    while reduced.ndim() > target_shape.len() {
        reduced = reduced.sum_axis(Axis(0));
    }
    for (axis, &dim) in target_shape.iter().enumerate() {
        if axis < reduced.ndim() && dim == 1 && reduced.shape()[axis] != 1 {
            reduced = reduced.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
    }
    if reduced.shape() != target_shape {
        // A lower-rank gradient (e.g. a scalar) spreads over the target.
        return op_broadcast(&reduced, target);
    }
    Ok(reduced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, ArrayD};

    fn dyn2(rows: Vec<Vec<f32>>) -> ArrayD<f32> {
        let n = rows.len();
        let m = rows[0].len();
        ArrayD::from_shape_vec(IxDyn(&[n, m]), rows.into_iter().flatten().collect()).unwrap()
    }

    #[test]
    fn broadcast_shape_follows_numpy() {
        assert_eq!(broadcast_shape(&[4, 3], &[3]).unwrap(), vec![4, 3]);
        assert_eq!(broadcast_shape(&[4, 1], &[1, 5]).unwrap(), vec![4, 5]);
        assert_eq!(broadcast_shape(&[], &[2, 2]).unwrap(), vec![2, 2]);
        assert!(broadcast_shape(&[4, 3], &[2]).is_err());
    }

    #[test]
    fn add_broadcasts_row_vector() {
        let a = dyn2(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = array![10.0f32, 20.0].into_dyn();
        let r = zip_broadcast(&a, &b, |x, y| x + y).unwrap();
        assert_eq!(r, dyn2(vec![vec![11.0, 22.0], vec![13.0, 24.0]]));
    }

    #[test]
    fn incompatible_shapes_are_errors_not_panics() {
        let a = dyn2(vec![vec![1.0, 2.0, 3.0]]);
        let b = array![1.0f32, 2.0].into_dyn();
        assert!(matches!(zip_broadcast(&a, &b, |x, y| x + y), Err(RuntimeError::ShapeError(_))));
    }

    #[test]
    fn reduce_sum_to_undoes_broadcast() {
        let g = dyn2(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        let bias = array![0.0f32, 0.0].into_dyn();
        assert_eq!(op_reduce_sum_to(&g, &bias).unwrap(), array![9.0f32, 12.0].into_dyn());

        let column = dyn2(vec![vec![0.0], vec![0.0], vec![0.0]]);
        assert_eq!(op_reduce_sum_to(&g, &column).unwrap(), dyn2(vec![vec![3.0], vec![7.0], vec![11.0]]));
    }

    #[test]
    fn run_evaluates_only_what_outputs_need() {
        let mut g = Asg::new(0, None);
        let x = g.add_node(None, NodeType::Input { name: "x".into() });
        let unbound = g.add_node(None, NodeType::Input { name: "unused".into() });
        let _dead = g.add_node(None, NodeType::Exp(unbound));
        let y = g.add_node(None, NodeType::Sum(x));
        g.set_output(y);

        let mut memo = Memo::new();
        memo.insert(x, array![1.0f32, 2.0, 3.0].into_dyn());
        let (out, _) = CpuBackend::new().run(&g, memo).unwrap();
        assert_eq!(out[0], arr0(6.0f32).into_dyn());
    }

    #[test]
    fn unbound_parameter_is_reported_by_name() {
        let mut g = Asg::new(0, None);
        let w = g.add_node(None, NodeType::Parameter { name: "layer.w".into() });
        g.set_output(w);
        let err = CpuBackend::new().run(&g, Memo::new()).unwrap_err();
        assert_eq!(err, RuntimeError::MissingParameter("layer.w".into(), w));
    }
}
