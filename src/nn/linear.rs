//! Fully connected layer.

use super::error::ModuleResult;
use super::module::{Module, ModuleCore, NamedTensors, Tier};
use super::traverse::member;
use crate::asg::Value;
use crate::tensor::Tensor;
use ndarray::{Array, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `y = x · weight + bias`.
///
/// `weight` has shape `[in_features, out_features]`, `bias` has shape
/// `[out_features]`. Without a bias the `bias` slot is registered as a
/// placeholder and skipped by the forward.
pub struct Linear {
    core: ModuleCore,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> ModuleResult<Self> {
        Self::with_options(in_features, out_features, true, rand::random())
    }

    /// Xavier-uniform weights drawn from a generator seeded with `seed`;
    /// the bias starts at zero.
    pub fn with_options(in_features: usize, out_features: usize, bias: bool, seed: u64) -> ModuleResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let limit = (6.0 / (in_features + out_features).max(1) as f32).sqrt();
        let weight = Array::random_using(
            IxDyn(&[in_features, out_features]),
            Uniform::new_inclusive(-limit, limit),
            &mut rng,
        );

        let mut core = ModuleCore::new("Linear", Tier::UsesParams);
        core.register_parameter("weight", weight)?;
        let bias: Option<Value> = bias.then(|| Array::zeros(IxDyn(&[out_features])));
        core.register_parameter("bias", bias)?;
        Ok(Self { core, in_features, out_features })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn forward_nb(&self, params: &NamedTensors, inputs: &Tensor) -> ModuleResult<Tensor> {
        let weight = member(params, "Parameter", "weight")?;
        let y = inputs.dot(weight);
        Ok(match params.get("bias") {
            Some(bias) => &y + bias,
            None => y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::ModuleExt;
    use ndarray::array;

    #[test]
    fn registers_weight_then_bias() {
        let layer = Linear::with_options(3, 2, true, 7).unwrap();
        let names: Vec<String> = layer.named_parameters("", true).map(|(n, _)| n).collect();
        assert_eq!(names, vec!["weight", "bias"]);
        assert_eq!(layer.get_parameter("weight").unwrap().shape(), Some(vec![3, 2]));
        assert_eq!(layer.num_parameters(), 8);
    }

    #[test]
    fn same_seed_same_weights() {
        let a = Linear::with_options(4, 4, true, 42).unwrap();
        let b = Linear::with_options(4, 4, true, 42).unwrap();
        assert_eq!(a.parameter_values(), b.parameter_values());
    }

    #[test]
    fn computes_affine_map() {
        let layer = Linear::with_options(2, 1, true, 0).unwrap();
        layer.get_parameter("weight").unwrap().set(Some(array![[2.0f32], [3.0]].into_dyn()));
        layer.get_parameter("bias").unwrap().set(Some(array![1.0f32].into_dyn()));
        let y = layer.invoke(&array![[1.0f32, 1.0], [0.0, 2.0]].into_dyn()).unwrap();
        assert_eq!(y, array![[6.0f32], [7.0]].into_dyn());
    }

    #[test]
    fn without_bias_the_slot_is_a_placeholder() {
        let layer = Linear::with_options(2, 2, false, 1).unwrap();
        assert!(!layer.get_parameter("bias").unwrap().is_initialized());
        assert_eq!(layer.parameter_values().len(), 1);
        let y = layer.invoke(&array![[0.0f32, 0.0]].into_dyn()).unwrap();
        assert_eq!(y, array![[0.0f32, 0.0]].into_dyn());
    }
}
