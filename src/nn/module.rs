//! The `Module` trait and the registry core every component embeds.
//!
//! A component is any type that implements [`Module`] by exposing a
//! [`ModuleCore`]. The core owns three ordered registries (parameters,
//! child components, buffers), a map of ordinary attributes, the training
//! flag, and the per-instance cache of compiled graphs.
//!
//! All tree mutation goes through explicit registration calls; reads go
//! through [`ModuleCore::get_attr`] or the path helpers of [`ModuleExt`].
//! The object graph is the only source of truth: flattened name→value
//! mappings are rebuilt from it on every call.

use super::error::{ModuleError, ModuleResult};
use super::parameter::Parameter;
use super::traverse::{self, NamedModules};
use crate::asg::{AsgError, Value};
use crate::jit::{self, CacheKey, CompileCache};
use crate::runtime::{Backend, CpuBackend};
use crate::tensor::Tensor;
use indexmap::IndexMap;
use std::any::TypeId;
use std::fmt;
use std::mem;
use std::rc::Rc;
use tracing::{debug, trace};

/// Path separator for nested names (`"encoder.layer0.weight"`).
pub const SEPARATOR: char = '.';

/// Symbolic mapping passed to `forward`: flattened name -> traced tensor.
pub type NamedTensors = IndexMap<String, Tensor>;
/// Concrete mapping: flattened name -> value.
pub type NamedValues = IndexMap<String, Value>;
/// Gradients by flattened parameter name; `None` for placeholders.
pub type NamedGrads = IndexMap<String, Option<Value>>;

/// Which explicit state a component's computation reads.
///
/// Fixed at construction; the default `forward` dispatches on it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Pure function of the inputs: `forward_nm`.
    Stateless,
    /// Reads buffers only: `forward_np`.
    UsesBuffers,
    /// Reads parameters only: `forward_nb`.
    UsesParams,
    /// Reads both; the component overrides `forward` itself.
    UsesBoth,
}

/// Ordinary (non-registry) attribute stored on a component.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Tensor(Option<Value>),
    Value(serde_json::Value),
}

/// A value assigned through [`ModuleCore::set_attr`]; the variant decides
/// which registry receives it.
pub enum Attr {
    Parameter(Parameter),
    Module(Option<Box<dyn Module>>),
    Tensor(Option<Value>),
    Value(serde_json::Value),
}

/// Result of [`ModuleCore::get_attr`].
#[derive(Debug)]
pub enum AttrRef<'a> {
    Parameter(&'a Parameter),
    Module(Option<&'a dyn Module>),
    Buffer(Option<&'a Value>),
    Attribute(&'a Attribute),
}

#[derive(Default)]
struct Registries {
    parameters: IndexMap<String, Parameter>,
    children: IndexMap<String, Option<Box<dyn Module>>>,
    buffers: IndexMap<String, Option<Value>>,
}

/// State shared by every component.
pub struct ModuleCore {
    class: &'static str,
    tier: Tier,
    registries: Option<Registries>,
    attributes: IndexMap<String, Attribute>,
    training: bool,
    cache: CompileCache,
}

impl ModuleCore {
    /// Core with empty registries. `class` names the component in errors.
    pub fn new(class: &'static str, tier: Tier) -> Self {
        Self {
            class,
            tier,
            registries: Some(Registries::default()),
            attributes: IndexMap::new(),
            training: false,
            cache: CompileCache::default(),
        }
    }

    /// Core whose registries do not exist yet; every registration fails with
    /// `NotInitialized` until [`ModuleCore::init`] runs.
    pub fn uninit(class: &'static str, tier: Tier) -> Self {
        Self { registries: None, ..Self::new(class, tier) }
    }

    /// Creates the registries if they are missing. Existing entries are kept.
    pub fn init(&mut self) {
        self.registries.get_or_insert_with(Registries::default);
    }

    pub fn is_initialized(&self) -> bool {
        self.registries.is_some()
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn training(&self) -> bool {
        self.training
    }

    /// Sets the mode on this component and on every descendant.
    pub fn set_training(&mut self, mode: bool) {
        self.training = mode;
        if let Some(registries) = self.registries.as_mut() {
            for child in registries.children.values_mut().flatten() {
                child.core_mut().set_training(mode);
            }
        }
    }

    pub(crate) fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// Number of compiled graphs cached for this instance.
    pub fn compiled_count(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached graph; the next call traces again.
    pub fn clear_compiled(&self) {
        self.cache.clear();
    }

    // --- Registration ---

    fn check_name(name: &str) -> ModuleResult<()> {
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(ModuleError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Which registry (if any) already holds `name`.
    fn occupant(&self, name: &str) -> Option<&'static str> {
        if let Some(r) = &self.registries {
            if r.parameters.contains_key(name) {
                return Some("Parameter");
            }
            if r.children.contains_key(name) {
                return Some("Module");
            }
            if r.buffers.contains_key(name) {
                return Some("Buffer");
            }
        }
        self.attributes.contains_key(name).then_some("Attribute")
    }

    fn prepare(&mut self, kind: &'static str, name: &str) -> ModuleResult<&mut Registries> {
        Self::check_name(name)?;
        if self.registries.is_none() {
            return Err(ModuleError::NotInitialized { kind, owner: self.class.to_string() });
        }
        if let Some(existing) = self.occupant(name) {
            return Err(ModuleError::NameConflict { kind: existing, name: name.to_string() });
        }
        self.registries
            .as_mut()
            .ok_or_else(|| ModuleError::NotInitialized { kind, owner: self.class.to_string() })
    }

    /// Registers a parameter. Bare values are wrapped in a new box;
    /// `None` registers a placeholder.
    pub fn register_parameter(&mut self, name: &str, parameter: impl Into<Parameter>) -> ModuleResult<()> {
        let class = self.class;
        self.prepare("Parameter", name)?
            .parameters
            .insert(name.to_string(), parameter.into());
        debug!(owner = class, name, "registered parameter");
        Ok(())
    }

    pub fn register_buffer(&mut self, name: &str, buffer: Option<Value>) -> ModuleResult<()> {
        let class = self.class;
        self.prepare("Buffer", name)?.buffers.insert(name.to_string(), buffer);
        debug!(owner = class, name, "registered buffer");
        Ok(())
    }

    /// Adds a child slot; `None` reserves the name without a component.
    pub fn add_module(&mut self, name: &str, module: Option<Box<dyn Module>>) -> ModuleResult<()> {
        let class = self.class;
        self.prepare("Module", name)?.children.insert(name.to_string(), module);
        debug!(owner = class, name, "added module");
        Ok(())
    }

    /// Shorthand for `add_module(name, Some(Box::new(module)))`.
    pub fn add_child<M: Module + 'static>(&mut self, name: &str, module: M) -> ModuleResult<()> {
        self.add_module(name, Some(Box::new(module)))
    }

    pub fn deregister_parameter(&mut self, name: &str) -> ModuleResult<Parameter> {
        let removed = self.registries.as_mut().and_then(|r| r.parameters.shift_remove(name));
        debug!(owner = self.class, name, found = removed.is_some(), "deregister parameter");
        removed.ok_or_else(|| not_found("Parameter", name))
    }

    pub fn deregister_buffer(&mut self, name: &str) -> ModuleResult<Option<Value>> {
        let removed = self.registries.as_mut().and_then(|r| r.buffers.shift_remove(name));
        debug!(owner = self.class, name, found = removed.is_some(), "deregister buffer");
        removed.ok_or_else(|| not_found("Buffer", name))
    }

    pub fn pop_module(&mut self, name: &str) -> ModuleResult<Option<Box<dyn Module>>> {
        let removed = self.registries.as_mut().and_then(|r| r.children.shift_remove(name));
        debug!(owner = self.class, name, found = removed.is_some(), "pop module");
        removed.ok_or_else(|| not_found("Module", name))
    }

    // --- Attribute layer ---

    /// Routes `value` by its variant:
    /// a parameter updates an existing parameter box in place or registers
    /// a new one; a module becomes a child; a tensor replaces a buffer of
    /// the same name or is stored as an ordinary attribute; any other value
    /// is stored as an ordinary attribute, unless the name is a buffer.
    pub fn set_attr(&mut self, name: &str, value: Attr) -> ModuleResult<()> {
        match value {
            Attr::Parameter(parameter) => {
                if let Some(existing) = self.registries.as_ref().and_then(|r| r.parameters.get(name)) {
                    existing.set(parameter.value());
                    return Ok(());
                }
                self.register_parameter(name, parameter)
            }
            Attr::Module(module) => self.add_module(name, module),
            Attr::Tensor(tensor) => {
                if let Some(slot) = self.registries.as_mut().and_then(|r| r.buffers.get_mut(name)) {
                    *slot = tensor;
                    return Ok(());
                }
                self.set_plain(name, Attribute::Tensor(tensor), "a tensor")
            }
            Attr::Value(value) => self.set_plain(name, Attribute::Value(value), "a plain value"),
        }
    }

    fn set_plain(&mut self, name: &str, attribute: Attribute, actual: &'static str) -> ModuleResult<()> {
        Self::check_name(name)?;
        let slot = match self.occupant(name) {
            Some("Parameter") => Some("parameter"),
            Some("Module") => Some("module"),
            Some("Buffer") => Some("buffer"),
            _ => None,
        };
        if let Some(slot) = slot {
            return Err(ModuleError::TypeKind {
                owner: self.class.to_string(),
                slot,
                name: name.to_string(),
                actual,
            });
        }
        self.attributes.insert(name.to_string(), attribute);
        Ok(())
    }

    /// Looks `name` up in parameters, children, buffers, then ordinary
    /// attributes.
    pub fn get_attr(&self, name: &str) -> ModuleResult<AttrRef<'_>> {
        if let Some(r) = &self.registries {
            if let Some(parameter) = r.parameters.get(name) {
                return Ok(AttrRef::Parameter(parameter));
            }
            if let Some(child) = r.children.get(name) {
                return Ok(AttrRef::Module(child.as_deref()));
            }
            if let Some(buffer) = r.buffers.get(name) {
                return Ok(AttrRef::Buffer(buffer.as_ref()));
            }
        }
        self.attributes.get(name).map(AttrRef::Attribute).ok_or_else(|| {
            ModuleError::AttributeNotFound { owner: self.class.to_string(), name: name.to_string() }
        })
    }

    /// Mutable access to a child component, with the resolver's error rules.
    pub(crate) fn child_mut_checked(&mut self, name: &str) -> ModuleResult<&mut dyn Module> {
        let class = self.class;
        if self.occupant(name).is_none() {
            return Err(ModuleError::AttributeNotFound { owner: class.to_string(), name: name.to_string() });
        }
        match self.registries.as_mut().and_then(|r| r.children.get_mut(name)) {
            Some(Some(child)) => Ok(child.as_mut()),
            _ => Err(ModuleError::NotAComponent(name.to_string())),
        }
    }

    // --- Direct registry access ---

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.registries.as_ref()?.parameters.get(name)
    }

    pub fn buffer(&self, name: &str) -> Option<&Value> {
        self.registries.as_ref()?.buffers.get(name)?.as_ref()
    }

    pub fn child(&self, name: &str) -> Option<&dyn Module> {
        self.registries.as_ref()?.children.get(name)?.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn parameter_entries(&self) -> impl Iterator<Item = (&str, &Parameter)> + '_ {
        self.registries
            .iter()
            .flat_map(|r| r.parameters.iter())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn buffer_entries(&self) -> impl Iterator<Item = (&str, Option<&Value>)> + '_ {
        self.registries
            .iter()
            .flat_map(|r| r.buffers.iter())
            .map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Direct children in registration order; absent slots yield `None`.
    pub fn children(&self) -> impl Iterator<Item = (&str, Option<&dyn Module>)> + '_ {
        self.registries
            .iter()
            .flat_map(|r| r.children.iter())
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

fn not_found(kind: &'static str, name: &str) -> ModuleError {
    ModuleError::NotFound { kind, name: name.to_string() }
}

fn not_implemented(owner: &str, tier: &'static str) -> ModuleError {
    ModuleError::NotImplemented { owner: owner.to_string(), tier }
}

/// Upcast helper so default methods can hand out `&dyn Module`.
pub trait AsModule {
    fn as_module(&self) -> &dyn Module;
    fn as_module_mut(&mut self) -> &mut dyn Module;
}

impl<T: Module> AsModule for T {
    fn as_module(&self) -> &dyn Module {
        self
    }

    fn as_module_mut(&mut self) -> &mut dyn Module {
        self
    }
}

/// A node of the module tree.
///
/// Implementors embed a [`ModuleCore`] and describe their computation by
/// overriding the forward method matching the core's [`Tier`]. Forward
/// methods receive the flattened parameter/buffer mappings of *this*
/// component (names relative to it) and compute on traced [`Tensor`]s; they
/// must not read state through `self` other than configuration, because the
/// traced graph is reused with new values on every call.
pub trait Module: AsModule {
    fn core(&self) -> &ModuleCore;
    fn core_mut(&mut self) -> &mut ModuleCore;

    fn class_name(&self) -> &str {
        self.core().class()
    }

    /// Full functional form. The default dispatches on the tier.
    fn forward(&self, params: &NamedTensors, buffers: &NamedTensors, inputs: &Tensor) -> ModuleResult<Tensor> {
        match self.core().tier() {
            Tier::UsesParams => self.forward_nb(params, inputs),
            Tier::UsesBuffers => self.forward_np(buffers, inputs),
            Tier::Stateless => self.forward_nm(inputs),
            Tier::UsesBoth => Err(not_implemented(self.class_name(), "forward")),
        }
    }

    /// Parameters only ("no buffers").
    fn forward_nb(&self, _params: &NamedTensors, _inputs: &Tensor) -> ModuleResult<Tensor> {
        Err(not_implemented(self.class_name(), "forward_nb"))
    }

    /// Buffers only ("no parameters").
    fn forward_np(&self, _buffers: &NamedTensors, _inputs: &Tensor) -> ModuleResult<Tensor> {
        Err(not_implemented(self.class_name(), "forward_np"))
    }

    /// Inputs only ("no members").
    fn forward_nm(&self, _inputs: &Tensor) -> ModuleResult<Tensor> {
        Err(not_implemented(self.class_name(), "forward_nm"))
    }
}

impl fmt::Debug for dyn Module + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<&str> = self.core().children().map(|(name, _)| name).collect();
        f.debug_struct(self.class_name())
            .field("training", &self.core().training())
            .field("children", &children)
            .finish()
    }
}

/// `loss(prediction, extra)` and its gradient with respect to every
/// parameter, keyed by flattened name in `named_parameters` order.
/// Placeholders keep their key with a `None` gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueAndGrad {
    pub value: f32,
    pub grads: NamedGrads,
}

/// Tree operations available on every component, including `dyn Module`.
pub trait ModuleExt: Module {
    // --- Registration (delegates to the core) ---

    fn register_parameter(&mut self, name: &str, parameter: impl Into<Parameter>) -> ModuleResult<()> {
        self.core_mut().register_parameter(name, parameter)
    }

    fn deregister_parameter(&mut self, name: &str) -> ModuleResult<Parameter> {
        self.core_mut().deregister_parameter(name)
    }

    fn register_buffer(&mut self, name: &str, buffer: Option<Value>) -> ModuleResult<()> {
        self.core_mut().register_buffer(name, buffer)
    }

    fn deregister_buffer(&mut self, name: &str) -> ModuleResult<Option<Value>> {
        self.core_mut().deregister_buffer(name)
    }

    fn add_module(&mut self, name: &str, module: Option<Box<dyn Module>>) -> ModuleResult<()> {
        self.core_mut().add_module(name, module)
    }

    fn pop_module(&mut self, name: &str) -> ModuleResult<Option<Box<dyn Module>>> {
        self.core_mut().pop_module(name)
    }

    fn set_attr(&mut self, name: &str, value: Attr) -> ModuleResult<()> {
        self.core_mut().set_attr(name, value)
    }

    fn get_attr(&self, name: &str) -> ModuleResult<AttrRef<'_>> {
        self.core().get_attr(name)
    }

    // --- Path resolution ---

    /// Resolves `"a.b.c"` child by child.
    fn get_module(&self, path: &str) -> ModuleResult<&dyn Module> {
        let mut atom: &dyn Module = self.as_module();
        for bar in path.split(SEPARATOR) {
            atom = match atom.core().get_attr(bar)? {
                AttrRef::Module(Some(module)) => module,
                _ => return Err(ModuleError::NotAComponent(bar.to_string())),
            };
        }
        Ok(atom)
    }

    fn get_module_mut(&mut self, path: &str) -> ModuleResult<&mut dyn Module> {
        let mut atom: &mut dyn Module = self.as_module_mut();
        for bar in path.split(SEPARATOR) {
            atom = atom.core_mut().child_mut_checked(bar)?;
        }
        Ok(atom)
    }

    /// Resolves `"a.b.w"` to the parameter `w` of component `a.b`. A bare
    /// name resolves against `self`.
    fn get_parameter(&self, path: &str) -> ModuleResult<&Parameter> {
        let (module, name) = match path.rsplit_once(SEPARATOR) {
            Some((prefix, name)) => (self.get_module(prefix)?, name),
            None => (self.as_module(), path),
        };
        match module.core().get_attr(name)? {
            AttrRef::Parameter(parameter) => Ok(parameter),
            _ => Err(ModuleError::NotAParameter(name.to_string())),
        }
    }

    // --- Traversal ---

    /// Depth-first `(path, component)` pairs in registration order.
    fn named_modules(&self, prefix: &str, include_self: bool, include_children: bool) -> NamedModules<'_> {
        NamedModules::new(self.as_module(), prefix, include_self, include_children)
    }

    /// Descendants (not `self`); only direct children unless `include_children`.
    fn modules(&self, include_children: bool) -> impl Iterator<Item = &dyn Module> {
        self.named_modules("", false, include_children).map(|(_, module)| module)
    }

    fn named_parameters(&self, prefix: &str, recursive: bool) -> impl Iterator<Item = (String, &Parameter)> {
        traverse::named_members(self.as_module(), prefix, recursive, |core| core.parameter_entries())
    }

    /// Like `named_parameters`, but each distinct box is yielded once, at
    /// its first path.
    fn named_parameters_dedup(&self, prefix: &str, recursive: bool) -> impl Iterator<Item = (String, &Parameter)> {
        traverse::dedup_by_identity(self.named_parameters(prefix, recursive))
    }

    fn parameters(&self, recursive: bool) -> impl Iterator<Item = &Parameter> {
        self.named_parameters("", recursive).map(|(_, parameter)| parameter)
    }

    fn named_buffers(&self, prefix: &str, recursive: bool) -> impl Iterator<Item = (String, Option<&Value>)> {
        traverse::named_members(self.as_module(), prefix, recursive, |core| core.buffer_entries())
    }

    fn buffers(&self, recursive: bool) -> impl Iterator<Item = Option<&Value>> {
        self.named_buffers("", recursive).map(|(_, buffer)| buffer)
    }

    /// Total scalar count over all initialized parameters of the tree.
    fn num_parameters(&self) -> usize {
        self.parameters(true).map(Parameter::numel).sum()
    }

    // --- Training mode ---

    fn training(&self) -> bool {
        self.core().training()
    }

    fn set_training(&mut self, mode: bool) {
        self.core_mut().set_training(mode);
    }

    fn train(&mut self) {
        self.set_training(true);
    }

    fn eval(&mut self) {
        self.set_training(false);
    }

    // --- Functional dispatch ---

    /// Flattened values of all initialized parameters.
    fn parameter_values(&self) -> NamedValues {
        self.named_parameters("", true)
            .filter_map(|(name, parameter)| parameter.value().map(|v| (name, v)))
            .collect()
    }

    /// Flattened values of all present buffers.
    fn buffer_values(&self) -> NamedValues {
        self.named_buffers("", true)
            .filter_map(|(name, buffer)| buffer.map(|v| (name, v.clone())))
            .collect()
    }

    /// Calls the compiled forward on the CPU backend.
    fn invoke(&self, inputs: &Value) -> ModuleResult<Value> {
        self.invoke_on(&CpuBackend::new(), inputs)
    }

    /// Flattens the current state and runs the compiled forward on
    /// `backend`. The graph is traced once per instance (and training mode
    /// and parameter/buffer layout) and reused afterwards.
    fn invoke_on<B: Backend>(&self, backend: &B, inputs: &Value) -> ModuleResult<Value> {
        let module = self.as_module();
        let params = self.parameter_values();
        let buffers = self.buffer_values();
        let key = CacheKey::forward(module.core().training(), &params, &buffers);
        let compiled = module
            .core()
            .cache()
            .get_or_compile(key, || jit::compile_forward(module, &params, &buffers))?;
        trace!(owner = module.class_name(), params = params.len(), "invoke");
        let mut outputs = compiled.run(backend, &params, &buffers, std::slice::from_ref(inputs))?;
        outputs.pop().ok_or(ModuleError::Graph(AsgError::NoOutput))
    }

    /// Traces and runs `forward` without touching the compile cache.
    fn forward_eager(&self, inputs: &Value) -> ModuleResult<Value> {
        let module = self.as_module();
        let params = self.parameter_values();
        let buffers = self.buffer_values();
        let compiled = jit::compile_forward(module, &params, &buffers)?;
        let mut outputs = compiled.run(&CpuBackend::new(), &params, &buffers, std::slice::from_ref(inputs))?;
        outputs.pop().ok_or(ModuleError::Graph(AsgError::NoOutput))
    }

    /// `gradient_on` with the CPU backend.
    fn gradient<F>(&self, loss: F, inputs: &Value, extra: &[Value]) -> ModuleResult<ValueAndGrad>
    where
        F: Fn(&Tensor, &[Tensor]) -> Tensor + 'static,
    {
        self.gradient_on(&CpuBackend::new(), loss, inputs, extra)
    }

    /// Value of `loss(forward(inputs), extra)` and its gradient with respect
    /// to the flattened parameters. Buffers and inputs are constants.
    ///
    /// The compiled graph is cached only when `loss` is a zero-sized type
    /// (a `fn` item or a closure without captures), whose type alone fixes
    /// the computation. Function pointers and capturing closures are traced
    /// on every call.
    fn gradient_on<B, F>(&self, backend: &B, loss: F, inputs: &Value, extra: &[Value]) -> ModuleResult<ValueAndGrad>
    where
        B: Backend,
        F: Fn(&Tensor, &[Tensor]) -> Tensor + 'static,
    {
        let module = self.as_module();
        let params = self.parameter_values();
        let buffers = self.buffer_values();
        let compile = || jit::compile_gradient(module, &params, &buffers, &loss, extra.len());
        let compiled = if mem::size_of::<F>() == 0 {
            let key = CacheKey::gradient(
                module.core().training(),
                TypeId::of::<F>(),
                extra.len(),
                &params,
                &buffers,
            );
            module.core().cache().get_or_compile(key, compile)?
        } else {
            Rc::new(compile()?)
        };
        trace!(owner = module.class_name(), params = params.len(), "gradient");

        let mut run_inputs = Vec::with_capacity(1 + extra.len());
        run_inputs.push(inputs.clone());
        run_inputs.extend_from_slice(extra);
        let outputs = compiled.run(backend, &params, &buffers, &run_inputs)?;

        let (objective, grads) = outputs.split_first().ok_or(ModuleError::Graph(AsgError::NoOutput))?;
        if objective.len() != 1 {
            return Err(ModuleError::NotScalar(objective.shape().to_vec()));
        }
        let value = objective.iter().copied().next().unwrap_or_default();
        let mut computed: NamedValues = compiled
            .gradient_names()
            .iter()
            .cloned()
            .zip(grads.iter().cloned())
            .collect();
        let grads = self
            .named_parameters("", true)
            .map(|(name, _)| {
                let grad = computed.shift_remove(&name);
                (name, grad)
            })
            .collect();
        Ok(ValueAndGrad { value, grads })
    }
}

impl<M: Module + ?Sized> ModuleExt for M {}
