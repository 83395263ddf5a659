//! A component with no computation of its own.

use super::module::{Module, ModuleCore, Tier};

/// Groups parameters, buffers and children under one name.
///
/// Useful as the root of a tree that is only traversed or resolved, and as
/// the target of the configuration layer's generic `Container` kind.
/// Calling `forward` on it reports `NotImplemented`.
pub struct Container {
    core: ModuleCore,
}

impl Container {
    pub fn new() -> Self {
        Self { core: ModuleCore::new("Container", Tier::UsesBoth) }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Container {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }
}
