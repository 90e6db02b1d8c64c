//! MethodImpl — the unit of optimization.
//!
//! Owns its last-known source form, its optimizer hints, whether it is
//! inlineable, and which interfaces it has registered itself with as a
//! caller. Registration/tag/delete side effects that require touching
//! *other* structures (interfaces, the work queue) live on `IncOptimizer`
//! instead of here: a `MethodImpl` never holds a reference back into the
//! graph it was called from, since that graph is cyclic and nothing in it
//! owns its neighbors.

use rustc_hash::FxHashSet;

use crate::external::{EmittedIr, InlineabilityPolicy, MethodDef, OptimizerHints};
use crate::ids::ContainerId;

/// What `apply_update` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The stored hints/IR actually differ from what was given. Whenever
    /// this is true the method must be tagged for reprocessing, regardless
    /// of `notify`.
    pub differs: bool,
    /// `was_inlineable || is_inlineable_now`. Only meaningful when `differs`
    /// is true. This is what `MethodContainer::reconcile` uses to decide
    /// whether an *existing* method belongs in its `changed` set, because
    /// only an inlineable-relevant edit is worth propagating to callers and
    /// descendants as a change worth retagging over.
    pub notify: bool,
}

#[derive(Debug, Clone)]
pub struct MethodImpl {
    pub owner: ContainerId,
    pub name: String,
    hints: Option<OptimizerHints>,
    original_def: Option<MethodDef>,
    desugared_def: Option<MethodDef>,
    emitted: Option<EmittedIr>,
    inlineable: bool,
    /// Interfaces this method has registered itself with as a caller
    /// (dynamic or static, any method name). Driver-maintained; see
    /// `IncOptimizer::tag_method` / `teardown_removed_method`.
    pub registered_to: FxHashSet<String>,
}

impl MethodImpl {
    pub fn new(owner: ContainerId, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            hints: None,
            original_def: None,
            desugared_def: None,
            emitted: None,
            inlineable: false,
            registered_to: FxHashSet::default(),
        }
    }

    pub fn is_inlineable(&self) -> bool {
        self.inlineable
    }

    pub fn original_def(&self) -> Option<&MethodDef> {
        self.original_def.as_ref()
    }

    pub fn desugared_def(&self) -> Option<&MethodDef> {
        self.desugared_def.as_ref()
    }

    pub fn emitted(&self) -> Option<&EmittedIr> {
        self.emitted.as_ref()
    }

    /// Called when the container is ingesting a (possibly) new class tree.
    /// If hints or IR differ from the stored ones, replaces them and
    /// recomputes `inlineable`. Does *not* tag or touch interfaces — the
    /// caller (`MethodContainerState::reconcile`, ultimately
    /// `IncOptimizer`) is responsible for that, since tagging means
    /// unregistering from the global interface map.
    pub fn apply_update(
        &mut self,
        hints: OptimizerHints,
        def: MethodDef,
        policy: &InlineabilityPolicy,
    ) -> UpdateOutcome {
        let unchanged = self.hints.as_ref() == Some(&hints) && self.original_def.as_ref() == Some(&def);
        if unchanged {
            return UpdateOutcome { differs: false, notify: false };
        }

        let was_inlineable = self.inlineable;
        self.inlineable = policy.is_inlineable(&hints);
        self.hints = Some(hints);
        self.original_def = Some(def);

        UpdateOutcome { differs: true, notify: was_inlineable || self.inlineable }
    }

    pub(crate) fn set_optimized(&mut self, desugared: MethodDef, emitted: EmittedIr) {
        self.desugared_def = Some(desugared);
        self.emitted = Some(emitted);
    }
}
