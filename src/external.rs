//! Interfaces to the external collaborators this engine drives: the
//! reachability analyzer, the lazy tree supplier, the method-body optimizer,
//! and the emitter. Only the registration hooks and read models are
//! specified here; the actual analysis, inlining, constant folding and
//! lowering live outside this crate.

use crate::ids::MethodKey;

/// Optimizer-relevant hints the analyzer attaches to a method, independent
/// of its IR body. Used only to decide whether a method is a candidate for
/// inlining (see `InlineabilityPolicy`); the body optimizer is free to
/// ignore `cost_hint` entirely.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptimizerHints {
    pub force_inline: bool,
    pub never_inline: bool,
    pub cost_hint: u32,
}

/// One method body as reported by the tree supplier.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    /// Opaque IR payload. Equality on this (plus `OptimizerHints`) is the
    /// only thing `MethodImpl::apply_update` uses to detect a real change.
    pub body: String,
}

/// A class tree as served by `fetch_tree`: the method bodies present in the
/// source, independent of which are currently reachable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDef {
    pub methods: Vec<MethodDef>,
}

/// Per-method metadata from the reachability analyzer.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub encoded_name: String,
    pub is_reachable: bool,
    pub is_abstract: bool,
    pub optimizer_hints: OptimizerHints,
}

/// Per-class metadata from the reachability analyzer.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub encoded_name: String,
    pub super_class: Option<String>,
    /// Encoded names of every ancestor interface/class, including this
    /// class's own name.
    pub ancestors: Vec<String>,
    pub ancestor_count: usize,
    pub is_needed_at_all: bool,
    pub has_instantiation: bool,
    pub is_any_subclass_instantiated: bool,
    pub is_instantiated: bool,
    pub is_impl_class: bool,
    pub methods: Vec<MethodInfo>,
}

/// Lazy source of class trees. `fetch_tree` returns `None` when the caller's
/// `last_version` is already current; the tolerated "no version yet, no
/// tree" case is also a `None` return when `last_version` is `None`.
pub trait TreeSupplier {
    fn fetch_tree(
        &mut self,
        encoded_name: &str,
        last_version: Option<&str>,
    ) -> Option<(ClassDef, Option<String>)>;
}

/// Callbacks the body optimizer invokes while processing one method. Every
/// call registers the method currently being processed as a caller and
/// resolves the call site against the live graph.
pub trait CallRegistrar {
    /// Registers as a dynamic caller of `(interface_name, method_name)` and
    /// returns the resolved implementation for every currently-instantiated
    /// class implementing `interface_name`.
    fn dynamic_call(&mut self, interface_name: &str, method_name: &str) -> Vec<MethodKey>;

    /// Registers as a static caller on `class_name`'s own interface and
    /// resolves `method_name` up the parent chain starting at `class_name`.
    fn static_call(&mut self, class_name: &str, method_name: &str) -> Option<MethodKey>;

    /// Registers as a static caller on the trait impl's interface and
    /// returns its direct entry for `method_name`.
    fn trait_impl_call(&mut self, trait_impl_name: &str, method_name: &str) -> Option<MethodKey>;
}

/// The method-body optimizer: inliner, constant folder, whatever the build
/// wires in. Out of scope for this crate beyond this call shape.
pub trait BodyOptimizer {
    fn optimize(&mut self, registrar: &mut dyn CallRegistrar, def: &MethodDef) -> MethodDef;
}

/// Target-lowered output for one method. Opaque to the invalidation engine;
/// handed back to the orchestrating build tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmittedIr(pub String);

/// The code emitter / IR-to-target lowering step. Out of scope beyond this
/// call shape.
pub trait Emitter {
    fn emit(&mut self, key: &MethodKey, def: &MethodDef) -> EmittedIr;
}

/// Decides whether a method counts as inlineable from its hints. Recomputing
/// this on every update is what drives change propagation to callers: a body
/// optimizer is free to judge inlineability however it likes, but this
/// engine needs one small tunable rule of its own, the way `fastforth_optimizer`'s
/// `InlineOptimizer::new` and `WholeProgramOptimizer::new` derive their
/// thresholds from an `OptimizationLevel`.
#[derive(Debug, Clone, Copy)]
pub struct InlineabilityPolicy {
    pub max_inline_cost: u32,
}

impl Default for InlineabilityPolicy {
    fn default() -> Self {
        Self { max_inline_cost: 20 }
    }
}

impl InlineabilityPolicy {
    pub fn is_inlineable(&self, hints: &OptimizerHints) -> bool {
        !hints.never_inline && (hints.force_inline || hints.cost_hint <= self.max_inline_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_inline_wins_over_force_inline() {
        let policy = InlineabilityPolicy::default();
        let hints = OptimizerHints { force_inline: true, never_inline: true, cost_hint: 0 };
        assert!(!policy.is_inlineable(&hints));
    }

    #[test]
    fn cost_hint_threshold() {
        let policy = InlineabilityPolicy { max_inline_cost: 10 };
        assert!(policy.is_inlineable(&OptimizerHints { cost_hint: 10, ..Default::default() }));
        assert!(!policy.is_inlineable(&OptimizerHints { cost_hint: 11, ..Default::default() }));
    }
}
