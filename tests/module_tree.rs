//! Registration, path resolution and traversal of module trees.

use dvitch::config::{ConfigError, ConstructArgs, ModuleConfig, Registry};
use dvitch::nn::{
    Attr, AttrRef, Container, Linear, Module, ModuleCore, ModuleError, ModuleExt, ModuleResult, Parameter, ReLU,
    Sequential, Tier,
};
use ndarray::{arr0, array};
use serde_json::json;
use std::collections::HashSet;

fn scalar(v: f32) -> dvitch::asg::Value {
    arr0(v).into_dyn()
}

/// `R { w: 2.0, C { w2: 3.0 } }`
fn scenario() -> Container {
    let mut c = Container::new();
    c.register_parameter("w2", scalar(3.0)).unwrap();
    let mut r = Container::new();
    r.register_parameter("w", scalar(2.0)).unwrap();
    r.add_module("C", Some(Box::new(c))).unwrap();
    r
}

fn build_r(_: &mut ConstructArgs) -> ModuleResult<Box<dyn Module>> {
    Ok(Box::new(scenario()))
}

#[test]
fn scenario_flattens_in_registration_order() {
    let r = scenario();
    let flat: Vec<(String, f32)> = r
        .named_parameters("", true)
        .map(|(name, p)| (name, p.value().unwrap().iter().copied().next().unwrap()))
        .collect();
    assert_eq!(flat, vec![("w".to_string(), 2.0), ("C.w2".to_string(), 3.0)]);

    let w2 = r.get_parameter("C.w2").unwrap();
    assert_eq!(w2.value(), Some(scalar(3.0)));
    let inner = r.get_module("C").unwrap().core().parameter("w2").unwrap();
    assert!(w2.ptr_eq(inner));
}

#[test]
fn scenario_rejects_positional_construction() {
    let mut registry = Registry::standard();
    registry.register("R", build_r);

    assert!(registry.build(&ModuleConfig::new("R")).is_ok());

    let mut config = ModuleConfig::new("R");
    config.args.push(json!(1));
    match registry.build(&config) {
        Err(ConfigError::Module(ModuleError::Usage(_))) => {}
        other => panic!("expected a usage error, got {:?}", other.err()),
    }
}

#[test]
fn prefix_applies_to_every_name() {
    let r = scenario();
    let names: Vec<String> = r.named_parameters("model", true).map(|(n, _)| n).collect();
    assert_eq!(names, vec!["model.w", "model.C.w2"]);
    let local: Vec<String> = r.named_parameters("", false).map(|(n, _)| n).collect();
    assert_eq!(local, vec!["w"]);
}

fn deep_tree() -> Container {
    // root
    // ├── a
    // │   ├── b (Linear 2->2)
    // │   └── empty (absent)
    // └── seq (Sequential: Linear, ReLU)
    let mut a = Container::new();
    a.add_module("b", Some(Box::new(Linear::with_options(2, 2, true, 0).unwrap()))).unwrap();
    a.add_module("empty", None).unwrap();
    let seq = Sequential::new()
        .with(Linear::with_options(2, 1, true, 1).unwrap())
        .unwrap()
        .with(ReLU::new())
        .unwrap();
    let mut root = Container::new();
    root.add_module("a", Some(Box::new(a))).unwrap();
    root.add_module("seq", Some(Box::new(seq))).unwrap();
    root
}

#[test]
fn named_modules_is_preorder_without_repeats() {
    let root = deep_tree();
    let paths: Vec<String> = root.named_modules("", true, true).map(|(p, _)| p).collect();
    assert_eq!(paths, vec!["", "a", "a.b", "seq", "seq.0", "seq.1"]);

    let unique: HashSet<&String> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len());

    let (first, module) = root.named_modules("", true, true).next().unwrap();
    assert_eq!(first, "");
    assert_eq!(module.class_name(), "Container");
}

#[test]
fn modules_excludes_self_and_can_stop_at_children() {
    let root = deep_tree();
    assert_eq!(root.modules(true).count(), 5);
    let direct: Vec<&str> = root.modules(false).map(|m| m.class_name()).collect();
    assert_eq!(direct, vec!["Container", "Sequential"]);
    let direct_named: Vec<String> = root.named_modules("", false, false).map(|(p, _)| p).collect();
    assert_eq!(direct_named, vec!["a", "seq"]);
}

#[test]
fn path_resolution_errors() {
    let root = deep_tree();
    assert_eq!(root.get_module("a.b").unwrap().class_name(), "Linear");
    assert!(root.get_parameter("a.b.weight").is_ok());
    assert!(root.get_parameter("seq.0.bias").is_ok());

    assert_eq!(
        root.get_module("a.missing").unwrap_err(),
        ModuleError::AttributeNotFound { owner: "Container".into(), name: "missing".into() }
    );
    assert_eq!(root.get_module("a.empty").unwrap_err(), ModuleError::NotAComponent("empty".into()));
    assert_eq!(
        root.get_module("a.b.weight").unwrap_err(),
        ModuleError::NotAComponent("weight".into())
    );
    assert_eq!(
        root.get_parameter("a.b").unwrap_err(),
        ModuleError::NotAParameter("b".into())
    );
    assert!(matches!(
        root.get_parameter("a.b.nothing"),
        Err(ModuleError::AttributeNotFound { .. })
    ));
}

#[test]
fn mutable_resolution_reaches_nested_components() {
    let mut root = deep_tree();
    root.get_module_mut("a.b")
        .unwrap()
        .register_buffer("counter", Some(scalar(0.0)))
        .unwrap();
    let buffers: Vec<String> = root.named_buffers("", true).map(|(n, _)| n).collect();
    assert_eq!(buffers, vec!["a.b.counter"]);
    assert!(matches!(root.get_module_mut("a.empty"), Err(ModuleError::NotAComponent(_))));
}

#[test]
fn set_training_reaches_every_descendant() {
    let mut root = deep_tree();
    assert!(root.named_modules("", true, true).all(|(_, m)| !m.training()));
    root.train();
    assert!(root.named_modules("", true, true).all(|(_, m)| m.training()));
    root.get_module_mut("seq").unwrap().eval();
    assert!(root.training());
    assert!(!root.get_module("seq.0").unwrap().training());
    assert!(root.get_module("a.b").unwrap().training());
}

#[test]
fn parameter_count_and_dedup() {
    let root = deep_tree();
    // a.b: 2*2 + 2, seq.0: 2*1 + 1
    assert_eq!(root.num_parameters(), 9);

    let mut shared = Container::new();
    let p = Parameter::new(array![1.0f32, 2.0].into_dyn());
    shared.register_parameter("first", p.clone()).unwrap();
    shared.register_parameter("second", p).unwrap();
    assert_eq!(shared.named_parameters("", true).count(), 2);
    let dedup: Vec<String> = shared.named_parameters_dedup("", true).map(|(n, _)| n).collect();
    assert_eq!(dedup, vec!["first"]);
}

#[test]
fn attribute_layer_routes_by_variant() {
    let mut m = Container::new();
    m.set_attr("child", Attr::Module(Some(Box::new(ReLU::new())))).unwrap();
    m.set_attr("w", Attr::Parameter(scalar(1.0).into())).unwrap();
    m.register_buffer("stat", None).unwrap();
    m.set_attr("stat", Attr::Tensor(Some(scalar(5.0)))).unwrap();
    m.set_attr("note", Attr::Value(json!("hello"))).unwrap();

    assert!(matches!(m.get_attr("child").unwrap(), AttrRef::Module(Some(_))));
    assert!(matches!(m.get_attr("w").unwrap(), AttrRef::Parameter(_)));
    assert!(matches!(m.get_attr("stat").unwrap(), AttrRef::Buffer(Some(_))));
    assert!(matches!(m.get_attr("note").unwrap(), AttrRef::Attribute(_)));

    // ordinary attributes are not part of any registry
    assert_eq!(m.named_buffers("", true).count(), 1);
    assert_eq!(m.named_parameters("", true).count(), 1);
    assert_eq!(m.modules(true).count(), 1);
}

#[test]
fn deregistration_removes_from_traversal() {
    let mut root = scenario();
    let popped = root.pop_module("C").unwrap().unwrap();
    assert_eq!(popped.core().parameter("w2").unwrap().value(), Some(scalar(3.0)));
    let names: Vec<String> = root.named_parameters("", true).map(|(n, _)| n).collect();
    assert_eq!(names, vec!["w"]);
    assert!(matches!(root.get_module("C"), Err(ModuleError::AttributeNotFound { .. })));
}

struct Deferred {
    core: ModuleCore,
}

impl Module for Deferred {
    fn core(&self) -> &ModuleCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }
}

#[test]
fn registration_before_init_fails() {
    let mut m = Deferred { core: ModuleCore::uninit("Deferred", Tier::Stateless) };
    assert!(matches!(
        m.register_buffer("b", None),
        Err(ModuleError::NotInitialized { kind: "Buffer", .. })
    ));
    assert_eq!(m.named_modules("", true, true).count(), 1);
    m.core_mut().init();
    m.register_buffer("b", None).unwrap();
    let buffers: Vec<(String, bool)> = m.named_buffers("", true).map(|(n, b)| (n, b.is_some())).collect();
    assert_eq!(buffers, vec![("b".to_string(), false)]);
}
