//! Shared fakes for the external collaborators, used by both the scenario
//! tests and the invariant tests.

use rustc_hash::FxHashMap;

use incopt::external::{
    BodyOptimizer, CallRegistrar, ClassDef, ClassInfo, Emitter, EmittedIr, MethodDef, MethodInfo,
    OptimizerHints, TreeSupplier,
};
use incopt::MethodKey;

/// A tree supplier keyed by class/trait-impl name, version-bumped each time
/// `set` is called so `fetch_tree` correctly reports "changed".
#[derive(Default)]
pub struct FakeTrees {
    bodies: FxHashMap<String, (Vec<MethodDef>, u32)>,
}

impl FakeTrees {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, owner: &str, methods: &[(&str, &str)]) {
        let entry = self.bodies.entry(owner.to_string()).or_insert((Vec::new(), 0));
        entry.0 = methods.iter().map(|(n, b)| MethodDef { name: n.to_string(), body: b.to_string() }).collect();
        entry.1 += 1;
    }
}

impl TreeSupplier for FakeTrees {
    fn fetch_tree(&mut self, name: &str, last_version: Option<&str>) -> Option<(ClassDef, Option<String>)> {
        let (methods, version) = self.bodies.get(name)?;
        let version_str = version.to_string();
        if last_version == Some(version_str.as_str()) {
            return None;
        }
        Some((ClassDef { methods: methods.clone() }, Some(version_str)))
    }
}

/// A body optimizer driven by a tiny textual convention so tests can assert
/// on call-graph registration: a line `static:Class.method` issues a
/// `static_call`, `dynamic:Interface.method` a `dynamic_call`,
/// `traitimpl:Impl.method` a `trait_impl_call`. Any other line is inert.
pub struct ScriptedOptimizer;

impl BodyOptimizer for ScriptedOptimizer {
    fn optimize(&mut self, registrar: &mut dyn CallRegistrar, def: &MethodDef) -> MethodDef {
        for line in def.body.lines() {
            if let Some(rest) = line.strip_prefix("static:") {
                let (class, method) = rest.split_once('.').expect("static:Class.method");
                registrar.static_call(class, method);
            } else if let Some(rest) = line.strip_prefix("dynamic:") {
                let (iface, method) = rest.split_once('.').expect("dynamic:Interface.method");
                registrar.dynamic_call(iface, method);
            } else if let Some(rest) = line.strip_prefix("traitimpl:") {
                let (ti, method) = rest.split_once('.').expect("traitimpl:Impl.method");
                registrar.trait_impl_call(ti, method);
            }
        }
        def.clone()
    }
}

pub struct JoiningEmitter;

impl Emitter for JoiningEmitter {
    fn emit(&mut self, key: &MethodKey, def: &MethodDef) -> EmittedIr {
        EmittedIr(format!("{key}:{}", def.body))
    }
}

pub fn method_info(name: &str) -> MethodInfo {
    MethodInfo {
        encoded_name: name.to_string(),
        is_reachable: true,
        is_abstract: false,
        optimizer_hints: OptimizerHints::default(),
    }
}

pub fn class_info(
    name: &str,
    super_class: Option<&str>,
    ancestors: &[&str],
    is_instantiated: bool,
    methods: &[&str],
) -> ClassInfo {
    ClassInfo {
        encoded_name: name.to_string(),
        super_class: super_class.map(|s| s.to_string()),
        ancestors: ancestors.iter().map(|s| s.to_string()).collect(),
        ancestor_count: ancestors.len(),
        is_needed_at_all: true,
        has_instantiation: is_instantiated,
        is_any_subclass_instantiated: is_instantiated,
        is_instantiated,
        is_impl_class: false,
        methods: methods.iter().map(|m| method_info(m)).collect(),
    }
}

/// A `MethodInfo` carrying an explicit `cost_hint`, for tests that need to
/// pin a method on a particular side of an `InlineabilityPolicy` threshold.
pub fn method_info_with_cost(name: &str, cost_hint: u32) -> MethodInfo {
    MethodInfo {
        encoded_name: name.to_string(),
        is_reachable: true,
        is_abstract: false,
        optimizer_hints: OptimizerHints { cost_hint, ..Default::default() },
    }
}

pub fn trait_impl_info(name: &str, methods: &[&str]) -> ClassInfo {
    trait_impl_info_with_methods(name, methods.iter().map(|m| method_info(m)).collect())
}

pub fn trait_impl_info_with_methods(name: &str, methods: Vec<MethodInfo>) -> ClassInfo {
    ClassInfo {
        encoded_name: name.to_string(),
        super_class: None,
        ancestors: Vec::new(),
        ancestor_count: 0,
        is_needed_at_all: true,
        has_instantiation: false,
        is_any_subclass_instantiated: false,
        is_instantiated: false,
        is_impl_class: true,
        methods,
    }
}
