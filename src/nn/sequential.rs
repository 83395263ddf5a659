//! Chains of components.

use super::error::ModuleResult;
use super::module::{Module, ModuleCore, NamedTensors, Tier};
use super::traverse::decompose;
use crate::tensor::Tensor;

/// Feeds the output of each child into the next, in registration order.
///
/// Children added with [`Sequential::push`] are named `"0"`, `"1"`, ...;
/// named children can be attached with `add_module` as well. An absent
/// child slot is skipped.
pub struct Sequential {
    core: ModuleCore,
}

impl Sequential {
    pub fn new() -> Self {
        Self { core: ModuleCore::new("Sequential", Tier::UsesBoth) }
    }

    /// Appends `module` under one past the largest numeric child name.
    pub fn push<M: Module + 'static>(&mut self, module: M) -> ModuleResult<()> {
        let next = self
            .core
            .children()
            .filter_map(|(name, _)| name.parse::<usize>().ok())
            .max()
            .map_or(0, |last| last + 1);
        self.core.add_child(&next.to_string(), module)
    }

    /// Builder form of [`Sequential::push`].
    pub fn with<M: Module + 'static>(mut self, module: M) -> ModuleResult<Self> {
        self.push(module)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.core.children().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sequential {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn forward(&self, params: &NamedTensors, buffers: &NamedTensors, inputs: &Tensor) -> ModuleResult<Tensor> {
        let mut x = inputs.clone();
        for (name, child) in self.core.children() {
            let Some(child) = child else { continue };
            x = child.forward(&decompose(params, name), &decompose(buffers, name), &x)?;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Linear, ModuleExt, ReLU};
    use ndarray::array;

    #[test]
    fn children_are_numbered() {
        let seq = Sequential::new()
            .with(Linear::with_options(2, 3, true, 0).unwrap())
            .unwrap()
            .with(ReLU::new())
            .unwrap()
            .with(Linear::with_options(3, 1, true, 1).unwrap())
            .unwrap();
        assert_eq!(seq.len(), 3);
        let names: Vec<String> = seq.named_parameters("", true).map(|(n, _)| n).collect();
        assert_eq!(names, vec!["0.weight", "0.bias", "2.weight", "2.bias"]);
    }

    #[test]
    fn absent_slot_is_identity() {
        let mut seq = Sequential::new();
        seq.add_module("skip", None).unwrap();
        seq.push(ReLU::new()).unwrap();
        let y = seq.invoke(&array![-1.0f32, 2.0].into_dyn()).unwrap();
        assert_eq!(y, array![0.0f32, 2.0].into_dyn());
    }

    #[test]
    fn empty_chain_returns_its_input() {
        let x = array![[1.0f32, 2.0]].into_dyn();
        assert_eq!(Sequential::new().invoke(&x).unwrap(), x);
    }

    #[test]
    fn push_after_pop_takes_a_fresh_index() {
        let mut seq = Sequential::new().with(ReLU::new()).unwrap().with(ReLU::new()).unwrap();
        seq.pop_module("0").unwrap();
        seq.push(ReLU::new()).unwrap();
        let names: Vec<&str> = seq.core().children().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["1", "2"]);
    }
}
