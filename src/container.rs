//! MethodContainer — common substrate for `Class` and `TraitImpl`.
//!
//! Holds the method-name -> `MethodImpl` map and the last-seen version token
//! of the containing class tree, plus the reconciliation algorithm that both
//! containers share. Composition, not a trait object: `Class` and
//! `TraitImpl` each embed a `MethodContainerState` field rather than
//! implementing a shared trait, since the only thing they share is this
//! state and the one algorithm below.

use rustc_hash::FxHashSet;

use crate::external::{ClassDef, InlineabilityPolicy, MethodInfo, TreeSupplier};
use crate::ids::ContainerId;
use crate::method_impl::MethodImpl;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct MethodContainerState {
    pub methods: FxHashMap<String, MethodImpl>,
    pub last_version: Option<String>,
}

/// What one `reconcile` call found. `to_tag` is every method name
/// (freshly-added or edited) that must go through `IncOptimizer::tag_method`
/// — a superset of `added ∪ changed`, since a body edit that doesn't flip
/// `inlineable` is still a real edit that must be reprocessed, even though
/// it is not `childChanges`-worthy.
#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub removed: Vec<(String, MethodImpl)>,
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub to_tag: Vec<String>,
}

impl MethodContainerState {
    pub fn lookup(&self, name: &str) -> Option<&MethodImpl> {
        self.methods.get(name)
    }

    /// Reconciles this container's methods against the analyzer's current
    /// reachability and (lazily) the tree supplier's current body for each
    /// reachable method.
    pub fn reconcile(
        &mut self,
        owner: &ContainerId,
        method_infos: &[MethodInfo],
        tree_supplier: &mut dyn TreeSupplier,
        policy: &InlineabilityPolicy,
    ) -> ReconcileResult {
        let mut result = ReconcileResult::default();

        let info_by_name: FxHashMap<&str, &MethodInfo> =
            method_infos.iter().map(|i| (i.encoded_name.as_str(), i)).collect();
        let reachable: FxHashSet<&str> = info_by_name
            .values()
            .filter(|i| i.is_reachable && !i.is_abstract)
            .map(|i| i.encoded_name.as_str())
            .collect();

        let stored: Vec<String> = self.methods.keys().cloned().collect();
        let stored_set: FxHashSet<&str> = stored.iter().map(String::as_str).collect();

        if stored_set != reachable {
            for name in &stored {
                if !reachable.contains(name.as_str()) {
                    if let Some(m) = self.methods.remove(name) {
                        result.removed.push((name.clone(), m));
                    }
                }
            }
            let any_new = reachable.iter().any(|n| !self.methods.contains_key(*n));
            if any_new {
                self.last_version = None;
            }
        }

        let fetched = tree_supplier.fetch_tree(owner.name(), self.last_version.as_deref());
        let defs = match fetched {
            None if self.last_version.is_some() => return result,
            // Tree supplier refusal with no prior version: tolerate as an
            // empty class rather than fail.
            None => ClassDef::default(),
            Some((def, version)) => {
                self.last_version = version;
                def
            }
        };

        for def in defs.methods {
            if !reachable.contains(def.name.as_str()) {
                continue;
            }
            let Some(info) = info_by_name.get(def.name.as_str()) else { continue };

            if self.methods.contains_key(&def.name) {
                let m = self.methods.get_mut(&def.name).unwrap();
                let outcome = m.apply_update(info.optimizer_hints.clone(), def.clone(), policy);
                if outcome.differs {
                    result.to_tag.push(def.name.clone());
                    if outcome.notify {
                        result.changed.push(def.name.clone());
                    }
                }
            } else {
                let mut m = MethodImpl::new(owner.clone(), def.name.clone());
                m.apply_update(info.optimizer_hints.clone(), def.clone(), policy);
                result.added.push(def.name.clone());
                result.to_tag.push(def.name.clone());
                self.methods.insert(def.name.clone(), m);
            }
        }

        result
    }
}
