//! Element-wise activations. None of them own any state.

use super::error::ModuleResult;
use super::module::{Module, ModuleCore, Tier};
use crate::tensor::Tensor;

macro_rules! activation {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        pub struct $name {
            core: ModuleCore,
        }

        impl $name {
            pub fn new() -> Self {
                Self { core: ModuleCore::new(stringify!($name), Tier::Stateless) }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Module for $name {
            fn core(&self) -> &ModuleCore {
                &self.core
            }

            fn core_mut(&mut self) -> &mut ModuleCore {
                &mut self.core
            }

            fn forward_nm(&self, inputs: &Tensor) -> ModuleResult<Tensor> {
                Ok(inputs.$op())
            }
        }
    };
}

activation!(
    /// `max(0, x)`.
    ReLU,
    relu
);

activation!(
    /// `1 / (1 + e^-x)`.
    Sigmoid,
    sigmoid
);

activation!(Tanh, tanh);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::ModuleExt;
    use ndarray::array;

    #[test]
    fn relu_clamps_negatives() {
        let y = ReLU::new().invoke(&array![-1.0f32, 0.0, 2.5].into_dyn()).unwrap();
        assert_eq!(y, array![0.0f32, 0.0, 2.5].into_dyn());
    }

    #[test]
    fn sigmoid_and_tanh_at_zero() {
        let x = array![0.0f32].into_dyn();
        assert_eq!(Sigmoid::new().invoke(&x).unwrap(), array![0.5f32].into_dyn());
        assert_eq!(Tanh::new().invoke(&x).unwrap(), array![0.0f32].into_dyn());
    }

    #[test]
    fn activations_have_no_members() {
        let relu = ReLU::new();
        assert_eq!(relu.class_name(), "ReLU");
        assert_eq!(relu.named_parameters("", true).count(), 0);
        assert_eq!(relu.named_buffers("", true).count(), 0);
    }
}
