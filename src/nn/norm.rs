//! Feature standardization driven by buffers.

use super::error::{ModuleError, ModuleResult};
use super::module::{Attr, Module, ModuleCore, NamedTensors, Tier};
use super::traverse::member;
use crate::asg::Value;
use crate::tensor::Tensor;
use ndarray::{Array, Axis, IxDyn};

/// `(x - mean) / (std + eps)` over the last axis.
///
/// `mean` and `std` are buffers of shape `[features]`: state that travels
/// with the module but is never differentiated. They start at zero and one
/// and are estimated from data with [`Standardize::fit`].
pub struct Standardize {
    core: ModuleCore,
    features: usize,
    eps: f32,
}

impl Standardize {
    pub fn new(features: usize) -> ModuleResult<Self> {
        Self::with_eps(features, 1e-5)
    }

    pub fn with_eps(features: usize, eps: f32) -> ModuleResult<Self> {
        let mut core = ModuleCore::new("Standardize", Tier::UsesBuffers);
        core.register_buffer("mean", Some(Array::zeros(IxDyn(&[features]))))?;
        core.register_buffer("std", Some(Array::ones(IxDyn(&[features]))))?;
        Ok(Self { core, features, eps })
    }

    pub fn features(&self) -> usize {
        self.features
    }

    /// Estimates the buffers from `data` of shape `[samples, features]`.
    pub fn fit(&mut self, data: &Value) -> ModuleResult<()> {
        if data.ndim() != 2 || data.shape()[1] != self.features {
            return Err(ModuleError::Usage(format!(
                "Standardize.fit expects data of shape [samples, {}], got {:?}",
                self.features,
                data.shape()
            )));
        }
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| ModuleError::Usage("Standardize.fit needs at least one sample".to_string()))?;
        let std = data.std_axis(Axis(0), 0.0);
        self.core.set_attr("mean", Attr::Tensor(Some(mean)))?;
        self.core.set_attr("std", Attr::Tensor(Some(std)))?;
        Ok(())
    }
}

impl Module for Standardize {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn forward_np(&self, buffers: &NamedTensors, inputs: &Tensor) -> ModuleResult<Tensor> {
        let mean = member(buffers, "Buffer", "mean")?;
        let std = member(buffers, "Buffer", "std")?;
        let centered = inputs - mean;
        Ok(&centered / &std.add_scalar(self.eps))
    }
}
