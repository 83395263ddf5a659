//! Optimizers that update parameters from computed gradients.
//!
//! Optimizers work on real values (`Value`) on the host. They resolve every
//! gradient's flattened name back to its [`Parameter`] box and update the
//! box in place, so the module tree keeps the same parameter identities
//! across training steps.

use crate::asg::Value;
use crate::nn::{Module, ModuleExt, ModuleResult, NamedGrads, Parameter};
use crate::runtime::RuntimeError;
use indexmap::IndexMap;
use tracing::trace;

/// Common interface of all optimizers.
pub trait Optimizer {
    /// Applies one update to the parameters of `module` named in `gradients`
    /// (flattened names, as returned by `gradient`). `None` entries are
    /// skipped. Every entry is checked before any parameter changes.
    fn step(&mut self, module: &dyn Module, gradients: &NamedGrads) -> ModuleResult<()>;
}

fn check_shape(name: &str, parameter: &Parameter, gradient: &Value) -> ModuleResult<()> {
    match parameter.shape() {
        Some(shape) if shape == gradient.shape() => Ok(()),
        shape => Err(RuntimeError::ShapeError(format!(
            "gradient for '{name}' has shape {:?}, parameter has {:?}",
            gradient.shape(),
            shape
        ))
        .into()),
    }
}

/// Stochastic gradient descent, optionally with momentum.
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocity: IndexMap<String, Value>,
}

impl Sgd {
    pub fn new(lr: f32) -> Self {
        Self::with_momentum(lr, 0.0)
    }

    pub fn with_momentum(lr: f32, momentum: f32) -> Self {
        Self { lr, momentum, velocity: IndexMap::new() }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, module: &dyn Module, gradients: &NamedGrads) -> ModuleResult<()> {
        let mut updates = Vec::with_capacity(gradients.len());
        for (name, grad) in gradients {
            let Some(grad) = grad else { continue };
            let parameter = module.get_parameter(name)?;
            check_shape(name, parameter, grad)?;
            updates.push((name, parameter, grad));
        }

        let lr = self.lr;
        for (name, parameter, grad) in updates {
            if self.momentum == 0.0 {
                parameter.update(|p| ndarray::azip!((p in p, &g in grad) *p -= lr * g));
                continue;
            }

            let momentum = self.momentum;
            let v = self
                .velocity
                .entry(name.clone())
                .or_insert_with(|| Value::zeros(grad.raw_dim()));
            if v.shape() != grad.shape() {
                *v = Value::zeros(grad.raw_dim());
            }
            ndarray::azip!((v in &mut *v, &g in grad) *v = momentum * *v + g);
            parameter.update(|p| ndarray::azip!((p in p, &v in &*v) *p -= lr * v));
        }
        trace!(count = gradients.len(), lr = self.lr, "sgd step");
        Ok(())
    }
}
