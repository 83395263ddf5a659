//! # dvitch: module trees over a traced, differentiable graph engine
//!
//! Components ("modules") form a tree. Each owns learnable parameters,
//! non-learnable buffers and named children in ordered registries. The tree
//! is resolved by dotted path, flattened into ordered `name -> value`
//! mappings, and invoked through a graph that is traced once per component
//! instance and re-executed with the current values on every call.
//!
//! ## Usage Example
//!
//! ```no_run
//! use dvitch::losses::mse_mean_objective;
//! use dvitch::nn::{Linear, ModuleExt, Sequential, Tanh};
//! use dvitch::optimizers::{Optimizer, Sgd};
//! use ndarray::array;
//!
//! let model = Sequential::new()
//!     .with(Linear::new(1, 8)?)?
//!     .with(Tanh::new())?
//!     .with(Linear::new(8, 1)?)?;
//!
//! let x = array![[0.0f32], [0.5], [1.0]].into_dyn();
//! let y = array![[0.0f32], [0.25], [1.0]].into_dyn();
//!
//! let mut sgd = Sgd::new(0.1);
//! for _ in 0..100 {
//!     let step = model.gradient(mse_mean_objective, &x, &[y.clone()])?;
//!     sgd.step(&model, &step.grads)?;
//! }
//! # Ok::<(), dvitch::nn::ModuleError>(())
//! ```
//!
//! ## Layout
//!
//! - [`asg`]: graph IR; [`tensor`]: symbolic tensors that record into it
//! - [`autograd`]: reverse-mode gradient construction
//! - [`runtime`]: backends that execute graphs
//! - [`jit`]: tracing and the per-instance compile cache
//! - [`nn`]: the module tree and built-in layers
//! - [`losses`], [`optimizers`], [`config`]

pub mod asg;
pub mod autograd;
pub mod config;
pub mod jit;
pub mod losses;
pub mod nn;
pub mod optimizers;
pub mod runtime;
pub mod tensor;
