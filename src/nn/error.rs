//! Errors of the module tree and its dispatch protocol.

use crate::asg::AsgError;
use crate::autograd::AutogradError;
use crate::runtime::RuntimeError;
use thiserror::Error;

pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    /// Malformed construction arguments.
    #[error("{0}")]
    Usage(String),

    #[error("{owner} object has no attribute '{name}'")]
    AttributeNotFound { owner: String, name: String },

    #[error("'{0}' is not a Module")]
    NotAComponent(String),

    #[error("attribute '{0}' is not a Parameter")]
    NotAParameter(String),

    #[error("{kind} named '{name}' already exists")]
    NameConflict { kind: &'static str, name: String },

    #[error("invalid name '{0}': names must be non-empty and must not contain '.'")]
    InvalidName(String),

    #[error("cannot assign {actual} to {owner} {slot} '{name}'")]
    TypeKind {
        owner: String,
        slot: &'static str,
        name: String,
        actual: &'static str,
    },

    #[error("cannot assign {kind} to {owner} before it has been initialized")]
    NotInitialized { kind: &'static str, owner: String },

    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },

    /// A forward tier that the component does not provide.
    #[error("{owner}.{tier} is not implemented")]
    NotImplemented { owner: String, tier: &'static str },

    #[error("objective must be a scalar, got a tensor of shape {0:?}")]
    NotScalar(Vec<usize>),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Autograd(#[from] AutogradError),

    #[error(transparent)]
    Graph(#[from] AsgError),
}
