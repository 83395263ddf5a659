//! Abstract interface (trait) for execution backends.

use crate::asg::{Asg, NodeId, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while executing a graph. Shared by all backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("node {0} not found in the graph being executed")]
    NodeNotFound(NodeId),

    #[error("type mismatch: operation expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    #[error("shape error: {0}")]
    ShapeError(String),

    #[error("no value bound for input '{0}' (node {1})")]
    MissingInput(String, NodeId),

    #[error("no value bound for parameter '{0}' (node {1}); is it still a placeholder?")]
    MissingParameter(String, NodeId),

    #[error("no value bound for buffer '{0}' (node {1}); is it absent?")]
    MissingBuffer(String, NodeId),

    #[error("operation '{0}' is not implemented by this backend")]
    UnimplementedOperation(String),

    #[error("graph is malformed: {0}")]
    InvalidGraph(String),
}

/// Values already computed (or bound up front) for graph nodes.
pub type Memo<T> = HashMap<NodeId, T>;

/// Common interface of an execution environment.
///
/// A backend takes a graph plus the values bound to its leaves and computes
/// the graph outputs.
pub trait Backend {
    /// Device-side representation of a tensor.
    type DeviceData: std::fmt::Debug + Clone;

    /// Moves host values to the device.
    fn load_data(
        &self,
        data: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Self::DeviceData>, RuntimeError>;

    /// Executes `main_asg`.
    ///
    /// `initial_memo` carries the values bound to leaf nodes. Returns the
    /// graph outputs in order together with the final memo.
    fn run(
        &self,
        main_asg: &Asg,
        initial_memo: Memo<Self::DeviceData>,
    ) -> Result<(Vec<Self::DeviceData>, Memo<Self::DeviceData>), RuntimeError>;

    /// Brings device values back to the host.
    fn retrieve_data(&self, device_data: &[Self::DeviceData]) -> Result<Vec<Value>, RuntimeError>;
}
