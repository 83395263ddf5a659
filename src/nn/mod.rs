//! # Module tree
//!
//! Components ("modules") own learnable parameters, non-learnable buffers
//! and child components in three ordered registries. The tree can be
//! resolved by dotted path, flattened into ordered name→value mappings, and
//! invoked either directly or through a compiled, differentiable graph.
//!
//! ## Building blocks
//!
//! - [`Module`] / [`ModuleCore`]: the trait and the state every component embeds
//! - [`ModuleExt`]: path resolution, traversal, `invoke`, `gradient`
//! - [`Parameter`]: shared, identity-preserving value box
//! - Layers: [`Linear`], [`ReLU`], [`Sigmoid`], [`Tanh`], [`Standardize`],
//!   [`Sequential`], [`Container`]
//!
//! ## Example
//!
//! ```no_run
//! use dvitch::nn::{Linear, ModuleExt, ReLU, Sequential};
//! use ndarray::array;
//!
//! let model = Sequential::new()
//!     .with(Linear::new(2, 4)?)?
//!     .with(ReLU::new())?
//!     .with(Linear::new(4, 1)?)?;
//!
//! let y = model.invoke(&array![[0.5f32, -1.0]].into_dyn())?;
//! for (name, p) in model.named_parameters("", true) {
//!     println!("{name}: {p:?}");
//! }
//! # Ok::<(), dvitch::nn::ModuleError>(())
//! ```

pub mod activations;
pub mod container;
pub mod error;
pub mod linear;
pub mod module;
pub mod norm;
pub mod parameter;
pub mod sequential;
pub mod traverse;

pub use activations::{ReLU, Sigmoid, Tanh};
pub use container::Container;
pub use error::{ModuleError, ModuleResult};
pub use linear::Linear;
pub use module::{
    AsModule, Attr, AttrRef, Attribute, Module, ModuleCore, ModuleExt, NamedGrads, NamedTensors, NamedValues, Tier,
    ValueAndGrad, SEPARATOR,
};
pub use norm::Standardize;
pub use parameter::Parameter;
pub use sequential::Sequential;
pub use traverse::{decompose, NamedModules};
