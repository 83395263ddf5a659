//! Declarative module trees.
//!
//! A tree is described in JSON and built through a [`Registry`] of kinds:
//!
//! ```json
//! {
//!   "kind": "Sequential",
//!   "children": {
//!     "0": { "kind": "Linear", "kwargs": { "in_features": 2, "out_features": 8 } },
//!     "1": { "kind": "Tanh" },
//!     "2": { "kind": "Linear", "kwargs": { "in_features": 8, "out_features": 1 } }
//!   }
//! }
//! ```
//!
//! Components accept keyword arguments only. Positional `args` and unknown
//! keywords are rejected with [`ModuleError::Usage`]. A child given as
//! `null` becomes an absent slot.

use crate::nn::{Container, Linear, Module, ModuleError, ModuleExt, ModuleResult, ReLU, Sequential, Sigmoid, Standardize, Tanh};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown module kind '{0}'")]
    UnknownKind(String),
    #[error(transparent)]
    Module(#[from] ModuleError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// One node of a declarative tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Json>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub kwargs: IndexMap<String, Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<bool>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, Option<ModuleConfig>>,
}

impl ModuleConfig {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            args: Vec::new(),
            kwargs: IndexMap::new(),
            training: None,
            children: IndexMap::new(),
        }
    }

    pub fn kwarg(mut self, key: &str, value: impl Into<Json>) -> Self {
        self.kwargs.insert(key.to_string(), value.into());
        self
    }

    pub fn child(mut self, name: &str, child: Option<ModuleConfig>) -> Self {
        self.children.insert(name.to_string(), child);
        self
    }

    pub fn from_json(text: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Keyword arguments of one construction, consumed by the builder.
pub struct ConstructArgs {
    kind: String,
    kwargs: IndexMap<String, Json>,
}

impl ConstructArgs {
    /// Fails if any positional argument was given.
    pub fn new(config: &ModuleConfig) -> ModuleResult<Self> {
        if !config.args.is_empty() {
            return Err(ModuleError::Usage(format!(
                "{}() takes keyword arguments only, got {} positional argument(s)",
                config.kind,
                config.args.len()
            )));
        }
        Ok(Self { kind: config.kind.clone(), kwargs: config.kwargs.clone() })
    }

    fn invalid(&self, key: &str, expected: &str) -> ModuleError {
        ModuleError::Usage(format!("{}(): argument '{key}' must be {expected}", self.kind))
    }

    fn take(&mut self, key: &str) -> Option<Json> {
        self.kwargs.shift_remove(key)
    }

    pub fn usize(&mut self, key: &str) -> ModuleResult<usize> {
        match self.take(key) {
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| self.invalid(key, "a non-negative integer")),
            None => Err(ModuleError::Usage(format!(
                "{}() missing required keyword argument '{key}'",
                self.kind
            ))),
        }
    }

    pub fn u64_opt(&mut self, key: &str) -> ModuleResult<Option<u64>> {
        match self.take(key) {
            Some(v) => v.as_u64().map(Some).ok_or_else(|| self.invalid(key, "a non-negative integer")),
            None => Ok(None),
        }
    }

    pub fn f32_or(&mut self, key: &str, default: f32) -> ModuleResult<f32> {
        match self.take(key) {
            Some(v) => v.as_f64().map(|x| x as f32).ok_or_else(|| self.invalid(key, "a number")),
            None => Ok(default),
        }
    }

    pub fn bool_or(&mut self, key: &str, default: bool) -> ModuleResult<bool> {
        match self.take(key) {
            Some(v) => v.as_bool().ok_or_else(|| self.invalid(key, "a boolean")),
            None => Ok(default),
        }
    }

    /// Fails if any keyword argument was not consumed.
    pub fn finish(self) -> ModuleResult<()> {
        match self.kwargs.keys().next() {
            Some(key) => Err(ModuleError::Usage(format!(
                "{}() got an unexpected keyword argument '{key}'",
                self.kind
            ))),
            None => Ok(()),
        }
    }
}

pub type Builder = fn(&mut ConstructArgs) -> ModuleResult<Box<dyn Module>>;

fn build_default<M: Module + Default + 'static>(_: &mut ConstructArgs) -> ModuleResult<Box<dyn Module>> {
    Ok(Box::new(M::default()))
}

fn build_linear(args: &mut ConstructArgs) -> ModuleResult<Box<dyn Module>> {
    let in_features = args.usize("in_features")?;
    let out_features = args.usize("out_features")?;
    let bias = args.bool_or("bias", true)?;
    let seed = args.u64_opt("seed")?.unwrap_or_else(rand::random);
    Ok(Box::new(Linear::with_options(in_features, out_features, bias, seed)?))
}

fn build_standardize(args: &mut ConstructArgs) -> ModuleResult<Box<dyn Module>> {
    let features = args.usize("features")?;
    let eps = args.f32_or("eps", 1e-5)?;
    Ok(Box::new(Standardize::with_eps(features, eps)?))
}

/// Kind name -> builder.
#[derive(Default)]
pub struct Registry {
    builders: IndexMap<String, Builder>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in layers.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("Container", build_default::<Container>);
        registry.register("Sequential", build_default::<Sequential>);
        registry.register("ReLU", build_default::<ReLU>);
        registry.register("Sigmoid", build_default::<Sigmoid>);
        registry.register("Tanh", build_default::<Tanh>);
        registry.register("Linear", build_linear);
        registry.register("Standardize", build_standardize);
        registry
    }

    /// Adds or replaces a kind.
    pub fn register(&mut self, kind: &str, builder: Builder) {
        self.builders.insert(kind.to_string(), builder);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Builds the tree described by `config`, children in document order.
    pub fn build(&self, config: &ModuleConfig) -> ConfigResult<Box<dyn Module>> {
        let builder = self
            .builders
            .get(&config.kind)
            .ok_or_else(|| ConfigError::UnknownKind(config.kind.clone()))?;
        let mut args = ConstructArgs::new(config)?;
        let mut module = builder(&mut args)?;
        args.finish()?;

        for (name, child) in &config.children {
            let child = child.as_ref().map(|c| self.build(c)).transpose()?;
            module.add_module(name, child)?;
        }
        if let Some(mode) = config.training {
            module.set_training(mode);
        }
        debug!(kind = %config.kind, children = config.children.len(), "built module");
        Ok(module)
    }

    pub fn build_json(&self, text: &str) -> ConfigResult<Box<dyn Module>> {
        self.build(&ModuleConfig::from_json(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree_in_document_order() {
        let registry = Registry::standard();
        let model = registry
            .build_json(
                r#"{
                    "kind": "Sequential",
                    "children": {
                        "0": { "kind": "Linear", "kwargs": { "in_features": 2, "out_features": 3, "seed": 1 } },
                        "1": { "kind": "Tanh" },
                        "gap": null,
                        "2": { "kind": "Linear", "kwargs": { "in_features": 3, "out_features": 1, "bias": false } }
                    }
                }"#,
            )
            .unwrap();
        let names: Vec<String> = model.named_modules("", false, true).map(|(n, _)| n).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
        let params: Vec<String> = model.named_parameters("", true).map(|(n, _)| n).collect();
        assert_eq!(params, vec!["0.weight", "0.bias", "2.weight", "2.bias"]);
        assert!(matches!(model.get_module("gap"), Err(ModuleError::NotAComponent(_))));
    }

    #[test]
    fn positional_arguments_are_a_usage_error() {
        let mut config = ModuleConfig::new("Linear").kwarg("in_features", 2).kwarg("out_features", 2);
        config.args.push(Json::from(3));
        let err = Registry::standard().build(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Module(ModuleError::Usage(_))));
    }

    #[test]
    fn unexpected_keyword_is_a_usage_error() {
        let config = ModuleConfig::new("ReLU").kwarg("inplace", true);
        match Registry::standard().build(&config) {
            Err(ConfigError::Module(ModuleError::Usage(message))) => assert!(message.contains("inplace")),
            other => panic!("unexpected {:?}", other.map(|m| m.class_name().to_string())),
        }
    }

    #[test]
    fn unknown_kind() {
        let err = Registry::standard().build(&ModuleConfig::new("Conv9d")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind(kind) if kind == "Conv9d"));
    }

    #[test]
    fn training_flag_cascades() {
        let mut config = ModuleConfig::new("Container")
            .child("inner", Some(ModuleConfig::new("Sequential").child("act", Some(ModuleConfig::new("ReLU")))));
        config.training = Some(true);
        let model = Registry::standard().build(&config).unwrap();
        assert!(model.named_modules("", true, true).all(|(_, m)| m.training()));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ModuleConfig::new("Standardize").kwarg("features", 4);
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(ModuleConfig::from_json(&text).unwrap(), config);
    }
}
