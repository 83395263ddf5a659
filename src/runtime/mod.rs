//! Execution environments (backends) for ASG graphs.
//!
//! A backend binds values to the leaves of a traced graph and computes its
//! outputs. `CpuBackend` is the reference implementation.

pub mod backend;
pub mod cpu_backend;

pub use backend::{Backend, Memo, RuntimeError};
pub use cpu_backend::CpuBackend;
