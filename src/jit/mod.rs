//! Tracing compiler for module forwards.
//!
//! A component's `forward` is run once on symbolic tensors: every flattened
//! parameter and buffer becomes a named leaf of a fresh graph, the inputs
//! become graph inputs, and whatever the forward computes is recorded. The
//! resulting [`Compiled`] artifact is re-executed on a backend with the
//! current values on every call.
//!
//! Gradient artifacts additionally record a loss on top of the prediction
//! and the autograd nodes for every parameter leaf, so one execution
//! returns the objective followed by all gradients.

use crate::asg::{Asg, NodeId, Value};
use crate::autograd::Gradients;
use crate::nn::{Module, ModuleResult, NamedTensors, NamedValues};
use crate::runtime::{Backend, Memo, RuntimeError};
use crate::tensor::{GraphContext, Tensor};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use tracing::debug;

/// A traced, reusable computation.
#[derive(Debug, Clone)]
pub struct Compiled {
    graph: Asg,
    params: Vec<(String, NodeId)>,
    buffers: Vec<(String, NodeId)>,
    inputs: Vec<NodeId>,
    grads: Vec<String>,
}

impl Compiled {
    pub fn graph(&self) -> &Asg {
        &self.graph
    }

    /// Parameter names whose gradients follow the objective in the outputs.
    pub fn gradient_names(&self) -> &[String] {
        &self.grads
    }

    /// Binds `params`, `buffers` and `inputs` to the graph leaves and runs
    /// it on `backend`. Leaves without a value stay unbound; the backend
    /// reports them if the computation reaches them.
    pub fn run<B: Backend>(
        &self,
        backend: &B,
        params: &NamedValues,
        buffers: &NamedValues,
        inputs: &[Value],
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut host = HashMap::new();
        let mut slots = Vec::new();
        let mut bind = |key: String, node: NodeId, value: Option<&Value>| {
            if let Some(value) = value {
                host.insert(key.clone(), value.clone());
                slots.push((key, node));
            }
        };
        for (name, node) in &self.params {
            bind(format!("param:{name}"), *node, params.get(name));
        }
        for (name, node) in &self.buffers {
            bind(format!("buffer:{name}"), *node, buffers.get(name));
        }
        for (i, node) in self.inputs.iter().enumerate() {
            bind(format!("input:{i}"), *node, inputs.get(i));
        }

        let device = backend.load_data(&host)?;
        let mut memo = Memo::new();
        for (key, node) in slots {
            if let Some(data) = device.get(&key) {
                memo.insert(node, data.clone());
            }
        }
        let (outputs, _) = backend.run(&self.graph, memo)?;
        backend.retrieve_data(&outputs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Forward,
    Gradient { loss: TypeId, extras: usize },
}

/// Identifies one compiled artifact of a component instance.
///
/// `layout` fingerprints the flattened parameter and buffer names: a graph
/// traced for one set of leaves is not reused after the tree changes shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: Kind,
    training: bool,
    layout: u64,
}

impl CacheKey {
    pub fn forward(training: bool, params: &NamedValues, buffers: &NamedValues) -> Self {
        Self { kind: Kind::Forward, training, layout: layout(params, buffers) }
    }

    pub fn gradient(
        training: bool,
        loss: TypeId,
        extras: usize,
        params: &NamedValues,
        buffers: &NamedValues,
    ) -> Self {
        Self { kind: Kind::Gradient { loss, extras }, training, layout: layout(params, buffers) }
    }
}

fn layout(params: &NamedValues, buffers: &NamedValues) -> u64 {
    let mut hasher = DefaultHasher::new();
    for name in params.keys() {
        name.hash(&mut hasher);
    }
    0xffu8.hash(&mut hasher);
    for name in buffers.keys() {
        name.hash(&mut hasher);
    }
    hasher.finish()
}

/// Per-instance store of compiled artifacts.
#[derive(Default)]
pub struct CompileCache {
    entries: RefCell<HashMap<CacheKey, Rc<Compiled>>>,
}

impl CompileCache {
    /// Cached artifact for `key`, tracing it with `build` on a miss.
    pub fn get_or_compile(
        &self,
        key: CacheKey,
        build: impl FnOnce() -> ModuleResult<Compiled>,
    ) -> ModuleResult<Rc<Compiled>> {
        if let Some(hit) = self.entries.borrow().get(&key) {
            return Ok(Rc::clone(hit));
        }
        let compiled = Rc::new(build()?);
        self.entries.borrow_mut().insert(key, Rc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

struct Trace {
    context: Rc<RefCell<GraphContext>>,
    params: NamedTensors,
    buffers: NamedTensors,
}

impl Trace {
    fn new(params: &NamedValues, buffers: &NamedValues) -> Self {
        let context = GraphContext::shared();
        let params = params
            .keys()
            .map(|name| (name.clone(), Tensor::new_parameter(&context, name)))
            .collect();
        let buffers = buffers
            .keys()
            .map(|name| (name.clone(), Tensor::new_buffer(&context, name)))
            .collect();
        Self { context, params, buffers }
    }

    fn slots(tensors: &NamedTensors) -> Vec<(String, NodeId)> {
        tensors.iter().map(|(name, t)| (name.clone(), t.node_id)).collect()
    }

    fn finish(self, outputs: Vec<NodeId>, grads: Vec<String>) -> ModuleResult<Compiled> {
        let mut graph = self.context.borrow().main_graph().clone();
        graph.set_outputs(outputs);
        graph.validate()?;
        Ok(Compiled {
            inputs: graph.inputs.clone(),
            params: Self::slots(&self.params),
            buffers: Self::slots(&self.buffers),
            graph,
            grads,
        })
    }
}

/// Traces `module.forward` with one graph input.
pub fn compile_forward(module: &dyn Module, params: &NamedValues, buffers: &NamedValues) -> ModuleResult<Compiled> {
    let trace = Trace::new(params, buffers);
    let inputs = Tensor::new_input(&trace.context, "inputs");
    let prediction = module.forward(&trace.params, &trace.buffers, &inputs)?;
    let compiled = trace.finish(vec![prediction.node_id], Vec::new())?;
    debug!(owner = module.class_name(), nodes = compiled.graph.len(), "compiled forward");
    Ok(compiled)
}

/// Traces `loss(module.forward(inputs), extra)` plus its gradient with
/// respect to every parameter leaf. Graph inputs are `inputs` followed by
/// `extras` extra arguments; outputs are the objective then one gradient
/// per parameter, in flattened order.
pub fn compile_gradient<F>(
    module: &dyn Module,
    params: &NamedValues,
    buffers: &NamedValues,
    loss: &F,
    extras: usize,
) -> ModuleResult<Compiled>
where
    F: Fn(&Tensor, &[Tensor]) -> Tensor,
{
    let trace = Trace::new(params, buffers);
    let inputs = Tensor::new_input(&trace.context, "inputs");
    let extra: Vec<Tensor> = (0..extras)
        .map(|i| Tensor::new_input(&trace.context, &format!("extra.{i}")))
        .collect();
    let prediction = module.forward(&trace.params, &trace.buffers, &inputs)?;
    let objective = loss(&prediction, &extra);

    let wrt: Vec<NodeId> = trace.params.values().map(|t| t.node_id).collect();
    let grad_ids = {
        let mut ctx = trace.context.borrow_mut();
        Gradients::new(ctx.main_graph_mut()).build(objective.node_id, &wrt)?
    };

    let mut outputs = Vec::with_capacity(1 + grad_ids.len());
    outputs.push(objective.node_id);
    outputs.extend(grad_ids);
    let names = trace.params.keys().cloned().collect();
    let compiled = trace.finish(outputs, names)?;
    debug!(owner = module.class_name(), nodes = compiled.graph.len(), "compiled gradient");
    Ok(compiled)
}
