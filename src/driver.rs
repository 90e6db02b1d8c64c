//! IncOptimizer — the driver.
//!
//! Owns every global index (classes, trait impls, interfaces, the pending
//! work queue) and the single public operation, `update`. Single-threaded,
//! synchronous, and not re-entrant: `update` mutates the whole graph in
//! place and must run to completion before another call.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::class::Class;
use crate::error::{OptimizerError, Result};
use crate::external::{
    BodyOptimizer, CallRegistrar, ClassInfo, Emitter, InlineabilityPolicy, TreeSupplier,
};
use crate::ids::{ContainerId, MethodKey};
use crate::interface_type::InterfaceType;
use crate::method_impl::MethodImpl;
use crate::trait_impl::TraitImpl;

/// Per-`update()` counters, logged at `info!` on completion and otherwise
/// free for a caller to surface however it likes.
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    pub batch: bool,
    pub classes_added: usize,
    pub classes_removed: usize,
    pub classes_changed: usize,
    pub trait_impls_added: usize,
    pub trait_impls_removed: usize,
    pub methods_tagged: usize,
    pub methods_processed: usize,
}

#[derive(Debug)]
pub struct IncOptimizer {
    classes: FxHashMap<String, Class>,
    trait_impls: FxHashMap<String, TraitImpl>,
    interfaces: FxHashMap<String, InterfaceType>,
    object_class: Option<String>,
    methods_to_process: FxHashSet<MethodKey>,
    policy: InlineabilityPolicy,
}

impl Default for IncOptimizer {
    fn default() -> Self {
        Self::new(InlineabilityPolicy::default())
    }
}

impl IncOptimizer {
    pub fn new(policy: InlineabilityPolicy) -> Self {
        Self {
            classes: FxHashMap::default(),
            trait_impls: FxHashMap::default(),
            interfaces: FxHashMap::default(),
            object_class: None,
            methods_to_process: FxHashSet::default(),
            policy,
        }
    }

    pub fn is_batch_mode(&self) -> bool {
        self.object_class.is_none()
    }

    pub fn object_class_name(&self) -> Option<&str> {
        self.object_class.as_deref()
    }

    pub fn classes(&self) -> &FxHashMap<String, Class> {
        &self.classes
    }

    pub fn trait_impls(&self) -> &FxHashMap<String, TraitImpl> {
        &self.trait_impls
    }

    pub fn interfaces(&self) -> &FxHashMap<String, InterfaceType> {
        &self.interfaces
    }

    pub fn pending(&self) -> &FxHashSet<MethodKey> {
        &self.methods_to_process
    }

    pub fn method(&self, key: &MethodKey) -> Option<&MethodImpl> {
        match &key.owner {
            ContainerId::Class(n) => self.classes.get(n)?.base.methods.get(&key.name),
            ContainerId::TraitImpl(n) => self.trait_impls.get(n)?.base.methods.get(&key.name),
        }
    }

    fn method_mut(&mut self, key: &MethodKey) -> Option<&mut MethodImpl> {
        match &key.owner {
            ContainerId::Class(n) => self.classes.get_mut(n)?.base.methods.get_mut(&key.name),
            ContainerId::TraitImpl(n) => self.trait_impls.get_mut(n)?.base.methods.get_mut(&key.name),
        }
    }

    fn get_interface_mut(&mut self, name: &str) -> &mut InterfaceType {
        self.interfaces.entry(name.to_string()).or_insert_with(|| InterfaceType::new(name))
    }

    /// Enqueues a method for reprocessing and unregisters it from every
    /// interface it previously registered with — the tagged method will
    /// re-register fresh dependencies once it is reprocessed, so its old
    /// registrations are stale the instant it's tagged.
    fn tag_method(&mut self, key: &MethodKey) {
        let registered: Vec<String> = match self.method(key) {
            Some(m) => m.registered_to.iter().cloned().collect(),
            None => {
                debug_assert!(false, "tag of a method not present in the graph: {key}");
                return;
            }
        };
        for iface_name in &registered {
            if let Some(iface) = self.interfaces.get_mut(iface_name) {
                iface.unregister_caller(key);
            }
        }
        if let Some(m) = self.method_mut(key) {
            m.registered_to.clear();
        }
        tracing::trace!(%key, "tagging method for reprocessing");
        self.methods_to_process.insert(key.clone());
    }

    fn tag_dynamic_callers_of(&mut self, iface_name: &str, method_name: &str) {
        let callers = match self.interfaces.get_mut(iface_name) {
            Some(iface) => iface.take_dynamic_callers_of(method_name),
            None => return,
        };
        for caller in callers {
            self.tag_method(&caller);
        }
    }

    fn tag_static_callers_of(&mut self, iface_name: &str, method_name: &str) {
        let callers = match self.interfaces.get_mut(iface_name) {
            Some(iface) => iface.take_static_callers_of(method_name),
            None => return,
        };
        for caller in callers {
            self.tag_method(&caller);
        }
    }

    /// Landing point for a method already detached from its owning
    /// container's map. Unregisters from every interface it had registered
    /// with and dequeues it if it was pending reprocessing.
    fn teardown_removed_method(&mut self, key: &MethodKey, method: MethodImpl) {
        for iface_name in &method.registered_to {
            if let Some(iface) = self.interfaces.get_mut(iface_name) {
                iface.unregister_caller(key);
            }
        }
        self.methods_to_process.remove(key);
    }

    // ---- Class hierarchy maintenance ------------------------------------

    fn delete_subtree(&mut self, name: &str, summary: &mut UpdateSummary) {
        let children = self.classes.get(name).map(|c| c.subclasses.clone()).unwrap_or_default();
        for child in children {
            self.delete_subtree(&child, summary);
        }
        let Some(class) = self.classes.remove(name) else { return };

        for (method_name, method) in class.base.methods {
            let key = MethodKey::new(ContainerId::Class(name.to_string()), method_name);
            self.teardown_removed_method(&key, method);
        }
        for iface_name in &class.interfaces {
            if let Some(iface) = self.interfaces.get_mut(iface_name) {
                iface.instantiated_subclasses.remove(name);
            }
        }
        if let Some(parent_name) = &class.superclass {
            if let Some(parent) = self.classes.get_mut(parent_name) {
                parent.subclasses.retain(|c| c != name);
            }
        }
        summary.classes_removed += 1;
        tracing::debug!(class = name, "deleted class subtree");
    }

    /// A class that used to be instantiated no longer is. A dynamic dispatch
    /// that previously could resolve to it may now resolve elsewhere (or not
    /// at all), so every dynamic caller of every name it could have served
    /// must be retagged.
    fn not_instantiated_anymore(&mut self, name: &str) {
        match self.classes.get_mut(name) {
            Some(c) => c.is_instantiated = false,
            None => return,
        }

        let interfaces: Vec<String> = self.classes[name].interfaces.iter().cloned().collect();
        for iface_name in &interfaces {
            if let Some(iface) = self.interfaces.get_mut(iface_name) {
                iface.instantiated_subclasses.remove(name);
            }
        }

        let method_names: Vec<String> = self.classes[name].all_methods(&self.classes).into_keys().collect();
        for iface_name in &interfaces {
            for method_name in &method_names {
                self.tag_dynamic_callers_of(iface_name, method_name);
            }
        }
        tracing::debug!(class = name, "no longer instantiated");
    }

    /// Top-down deletion walk. A class is deleted (cascading to its whole
    /// subtree) when it is no longer reported, or when its reported
    /// superclass no longer matches the stored one (a move, which this
    /// engine treats as a delete-then-readd so the additions phase can
    /// rebuild the correct parent chain). A class that survives has its
    /// `ClassInfo` moved into `surviving` for `walk_for_changes` to consume;
    /// a deleted-by-mismatch class keeps its entry in `needed` so the
    /// additions phase reconstructs it.
    fn walk_for_deletions(
        &mut self,
        node: &str,
        needed: &mut FxHashMap<String, ClassInfo>,
        surviving: &mut FxHashMap<String, ClassInfo>,
        summary: &mut UpdateSummary,
    ) -> bool {
        let is_root = self.object_class.as_deref() == Some(node);

        let matches = match needed.get(node) {
            None => false,
            Some(info) => {
                let stored_super = self.classes.get(node).and_then(|c| c.superclass.clone());
                info.super_class == stored_super
            }
        };

        if !matches {
            assert!(!is_root, "root class must never be deleted");
            self.delete_subtree(node, summary);
            return false;
        }

        let info = needed.remove(node).expect("matched lookup must be present");
        let children = self.classes.get(node).map(|c| c.subclasses.clone()).unwrap_or_default();
        let mut retained = Vec::with_capacity(children.len());
        for child in children {
            if self.walk_for_deletions(&child, needed, surviving, summary) {
                retained.push(child);
            }
        }
        if let Some(c) = self.classes.get_mut(node) {
            c.subclasses = retained;
        }

        let was_instantiated = self.classes.get(node).is_some_and(|c| c.is_instantiated);
        if was_instantiated && !info.is_instantiated {
            self.not_instantiated_anymore(node);
        }

        surviving.insert(node.to_string(), info);
        true
    }

    /// Top-down change walk over whatever survived deletion.
    fn walk_for_changes(
        &mut self,
        node: &str,
        surviving: &mut FxHashMap<String, ClassInfo>,
        tree_supplier: &mut dyn TreeSupplier,
        parent_changes: &FxHashSet<String>,
        summary: &mut UpdateSummary,
    ) {
        let info = surviving
            .remove(node)
            .unwrap_or_else(|| panic!("walk_for_changes: no surviving info for {node}"));

        let owner = ContainerId::Class(node.to_string());
        let reconcile = {
            let class = self.classes.get_mut(node).expect("surviving class must exist");
            class.base.reconcile(&owner, &info.methods, tree_supplier, &self.policy)
        };

        let removed_names: FxHashSet<String> = reconcile.removed.iter().map(|(n, _)| n.clone()).collect();
        for (name, method) in reconcile.removed {
            let key = MethodKey::new(owner.clone(), name);
            self.teardown_removed_method(&key, method);
        }
        for name in &reconcile.to_tag {
            self.tag_method(&MethodKey::new(owner.clone(), name.clone()));
        }

        let overridden_locally: FxHashSet<String> = self.classes[node].base.methods.keys().cloned().collect();
        let mut child_changes: FxHashSet<String> = parent_changes
            .iter()
            .filter(|m| !overridden_locally.contains(*m))
            .cloned()
            .collect();
        for name in reconcile.added.iter().chain(reconcile.changed.iter()).chain(removed_names.iter()) {
            child_changes.insert(name.clone());
        }

        let new_interfaces: FxHashSet<String> = info.ancestors.iter().cloned().collect();
        let old_interfaces: FxHashSet<String> = self.classes[node].interfaces.clone();

        let was_instantiated = self.classes[node].is_instantiated;
        assert!(
            !(was_instantiated && !info.is_instantiated),
            "walk_for_changes: class {node} was instantiated and no longer is — \
             the deletion walk must have already handled this"
        );
        self.classes.get_mut(node).unwrap().is_instantiated = info.is_instantiated;

        if was_instantiated && info.is_instantiated {
            for iface in old_interfaces.intersection(&new_interfaces) {
                for name in &child_changes {
                    self.tag_dynamic_callers_of(iface, name);
                }
            }
            if old_interfaces != new_interfaces {
                let symmetric_difference: Vec<String> =
                    old_interfaces.symmetric_difference(&new_interfaces).cloned().collect();
                let all_method_names: Vec<String> =
                    self.classes[node].all_methods(&self.classes).into_keys().collect();
                for iface in &symmetric_difference {
                    if new_interfaces.contains(iface) {
                        self.get_interface_mut(iface).instantiated_subclasses.insert(node.to_string());
                    } else if let Some(i) = self.interfaces.get_mut(iface) {
                        i.instantiated_subclasses.remove(node);
                    }
                    for name in &all_method_names {
                        self.tag_dynamic_callers_of(iface, name);
                    }
                }
            }
        } else if !was_instantiated && info.is_instantiated {
            let all_method_names: Vec<String> = self.classes[node].all_methods(&self.classes).into_keys().collect();
            for iface in &new_interfaces {
                self.get_interface_mut(iface).instantiated_subclasses.insert(node.to_string());
            }
            for iface in &new_interfaces {
                for name in &all_method_names {
                    self.tag_dynamic_callers_of(iface, name);
                }
            }
        }

        self.classes.get_mut(node).unwrap().interfaces = new_interfaces;

        let my_interface = self.classes[node].my_interface.clone();
        for name in &child_changes {
            self.tag_static_callers_of(&my_interface, name);
        }

        summary.classes_changed += 1;

        let children: Vec<String> = self.classes[node].subclasses.clone();
        for child in children {
            self.walk_for_changes(&child, surviving, tree_supplier, &child_changes, summary);
        }
    }

    /// Constructs every class still left over in `needed` after deletions
    /// and changes, parents before children (ascending ancestor count).
    fn process_additions(
        &mut self,
        mut needed: FxHashMap<String, ClassInfo>,
        tree_supplier: &mut dyn TreeSupplier,
        batch_mode: bool,
        summary: &mut UpdateSummary,
    ) -> Result<()> {
        let mut remaining: Vec<ClassInfo> = needed.drain().map(|(_, v)| v).collect();
        remaining.sort_by_key(|info| info.ancestor_count);

        for info in remaining {
            let name = info.encoded_name.clone();
            let super_name = info.super_class.clone().ok_or_else(|| {
                OptimizerError::InvariantViolation(format!(
                    "class {name} has no superclass but is not the root"
                ))
            })?;
            if !self.classes.contains_key(&super_name) {
                return Err(OptimizerError::MissingSuperclass { class: name, superclass: super_name });
            }

            let mut class = Class::new_child(name.clone(), super_name.clone());
            class.interfaces = info.ancestors.iter().cloned().collect();
            class.is_instantiated = info.is_instantiated;
            self.classes.get_mut(&super_name).unwrap().subclasses.push(name.clone());
            self.classes.insert(name.clone(), class);

            let owner = ContainerId::Class(name.clone());
            let reconcile = {
                let class = self.classes.get_mut(&name).unwrap();
                class.base.reconcile(&owner, &info.methods, tree_supplier, &self.policy)
            };
            for (removed_name, method) in reconcile.removed {
                let key = MethodKey::new(owner.clone(), removed_name);
                self.teardown_removed_method(&key, method);
            }
            for method_name in &reconcile.to_tag {
                self.tag_method(&MethodKey::new(owner.clone(), method_name.clone()));
            }

            if info.is_instantiated {
                for iface in &info.ancestors {
                    self.get_interface_mut(iface).instantiated_subclasses.insert(name.clone());
                }
                if !batch_mode {
                    let all_method_names: Vec<String> =
                        self.classes[&name].all_methods(&self.classes).into_keys().collect();
                    for iface in &info.ancestors {
                        for mname in &all_method_names {
                            self.tag_dynamic_callers_of(iface, mname);
                        }
                    }
                }
            }

            if !batch_mode {
                // This may be a move: something out there may have
                // statically referenced this name before it disappeared.
                let my_interface = self.classes[&name].my_interface.clone();
                let all_method_names: Vec<String> =
                    self.classes[&name].all_methods(&self.classes).into_keys().collect();
                for mname in &all_method_names {
                    self.tag_static_callers_of(&my_interface, mname);
                }
            }

            summary.classes_added += 1;
            tracing::debug!(class = %name, "added class");
        }

        Ok(())
    }

    // ---- Trait impls -----------------------------------------------------

    fn reconcile_trait_impls(
        &mut self,
        needed: &FxHashMap<String, ClassInfo>,
        tree_supplier: &mut dyn TreeSupplier,
        summary: &mut UpdateSummary,
    ) {
        let stored: Vec<String> = self.trait_impls.keys().cloned().collect();

        for name in &stored {
            if needed.contains_key(name) {
                continue;
            }
            if let Some(trait_impl) = self.trait_impls.remove(name) {
                for (method_name, method) in trait_impl.base.methods {
                    let key = MethodKey::new(ContainerId::TraitImpl(name.clone()), method_name);
                    self.teardown_removed_method(&key, method);
                }
                summary.trait_impls_removed += 1;
                tracing::debug!(trait_impl = %name, "deleted trait impl");
            }
        }

        for name in &stored {
            let Some(info) = needed.get(name) else { continue };
            if !self.trait_impls.contains_key(name) {
                continue;
            }
            let owner = ContainerId::TraitImpl(name.clone());
            let reconcile = {
                let trait_impl = self.trait_impls.get_mut(name).unwrap();
                trait_impl.base.reconcile(&owner, &info.methods, tree_supplier, &self.policy)
            };
            let interface = self.trait_impls[name].interface.clone();
            for (removed_name, method) in reconcile.removed {
                let key = MethodKey::new(owner.clone(), removed_name);
                self.teardown_removed_method(&key, method);
            }
            for method_name in &reconcile.changed {
                self.tag_static_callers_of(&interface, method_name);
            }
            for method_name in &reconcile.to_tag {
                self.tag_method(&MethodKey::new(owner.clone(), method_name.clone()));
            }
        }

        for (name, info) in needed {
            if self.trait_impls.contains_key(name) {
                continue;
            }
            let owner = ContainerId::TraitImpl(name.clone());
            let mut trait_impl = TraitImpl::new(name.clone(), name.clone());
            let reconcile = trait_impl.base.reconcile(&owner, &info.methods, tree_supplier, &self.policy);
            self.trait_impls.insert(name.clone(), trait_impl);
            for method_name in &reconcile.to_tag {
                self.tag_method(&MethodKey::new(owner.clone(), method_name.clone()));
            }
            summary.trait_impls_added += 1;
            tracing::debug!(trait_impl = %name, "added trait impl");
        }
    }

    // ---- Drain -------------------------------------------------------------

    fn process_method(&mut self, key: &MethodKey, body_optimizer: &mut dyn BodyOptimizer, emitter: &mut dyn Emitter) {
        let Some(def) = self.method(key).and_then(|m| m.original_def().cloned()) else {
            return; // degenerate empty class: nothing to optimize yet.
        };

        let optimized = {
            let mut registrar = Registrar { driver: self, caller: key.clone() };
            body_optimizer.optimize(&mut registrar, &def)
        };
        let emitted = emitter.emit(key, &optimized);

        if let Some(m) = self.method_mut(key) {
            m.set_optimized(optimized, emitted);
        }
    }

    fn process_all_tagged(&mut self, body_optimizer: &mut dyn BodyOptimizer, emitter: &mut dyn Emitter) -> usize {
        let mut processed = 0;
        while let Some(key) = self.methods_to_process.iter().next().cloned() {
            self.methods_to_process.remove(&key);
            if self.method(&key).is_none() {
                continue; // deleted before being drained.
            }
            self.process_method(&key, body_optimizer, emitter);
            processed += 1;
        }
        processed
    }

    // ---- The one public operation -----------------------------------------

    pub fn update(
        &mut self,
        analyzer: &FxHashMap<String, ClassInfo>,
        tree_supplier: &mut dyn TreeSupplier,
        body_optimizer: &mut dyn BodyOptimizer,
        emitter: &mut dyn Emitter,
    ) -> Result<UpdateSummary> {
        let batch_mode = self.object_class.is_none();
        let mut summary = UpdateSummary { batch: batch_mode, ..Default::default() };

        let mut needed_classes: FxHashMap<String, ClassInfo> = FxHashMap::default();
        let mut needed_trait_impls: FxHashMap<String, ClassInfo> = FxHashMap::default();
        for info in analyzer.values() {
            if info.is_impl_class {
                needed_trait_impls.insert(info.encoded_name.clone(), info.clone());
            } else if info.is_needed_at_all {
                needed_classes.insert(info.encoded_name.clone(), info.clone());
            }
        }

        if !batch_mode {
            self.reconcile_trait_impls(&needed_trait_impls, tree_supplier, &mut summary);
        }

        if batch_mode {
            let root_name = needed_classes
                .values()
                .find(|info| info.super_class.is_none())
                .map(|info| info.encoded_name.clone())
                .ok_or_else(|| OptimizerError::InvariantViolation("no root class reported on batch run".into()))?;
            let root_info = needed_classes.remove(&root_name).unwrap();

            let mut root = Class::new_root(root_name.clone());
            root.interfaces = root_info.ancestors.iter().cloned().collect();
            root.is_instantiated = root_info.is_instantiated;
            self.classes.insert(root_name.clone(), root);
            self.object_class = Some(root_name.clone());

            let owner = ContainerId::Class(root_name.clone());
            let reconcile = {
                let class = self.classes.get_mut(&root_name).unwrap();
                class.base.reconcile(&owner, &root_info.methods, tree_supplier, &self.policy)
            };
            for name in &reconcile.to_tag {
                self.tag_method(&MethodKey::new(owner.clone(), name.clone()));
            }
            if root_info.is_instantiated {
                for iface in &root_info.ancestors {
                    self.get_interface_mut(iface).instantiated_subclasses.insert(root_name.clone());
                }
            }
            summary.classes_added += 1;
        } else {
            let object_class = self.object_class.clone().expect("non-batch run requires an existing root");
            let mut surviving: FxHashMap<String, ClassInfo> = FxHashMap::default();
            self.walk_for_deletions(&object_class, &mut needed_classes, &mut surviving, &mut summary);
            self.walk_for_changes(&object_class, &mut surviving, tree_supplier, &FxHashSet::default(), &mut summary);
        }

        self.process_additions(needed_classes, tree_supplier, batch_mode, &mut summary)?;

        summary.methods_tagged = self.methods_to_process.len();
        summary.methods_processed = self.process_all_tagged(body_optimizer, emitter);

        tracing::info!(
            batch = summary.batch,
            classes_added = summary.classes_added,
            classes_removed = summary.classes_removed,
            classes_changed = summary.classes_changed,
            trait_impls_added = summary.trait_impls_added,
            trait_impls_removed = summary.trait_impls_removed,
            methods_tagged = summary.methods_tagged,
            methods_processed = summary.methods_processed,
            "incremental update complete"
        );

        Ok(summary)
    }
}

/// The callbacks the body optimizer invokes while processing one method.
/// Constructed fresh for each `process_method` call and dropped the instant
/// it returns, so it never outlives the borrow of the driver it wraps.
struct Registrar<'a> {
    driver: &'a mut IncOptimizer,
    caller: MethodKey,
}

impl CallRegistrar for Registrar<'_> {
    fn dynamic_call(&mut self, interface_name: &str, method_name: &str) -> Vec<MethodKey> {
        self.driver
            .get_interface_mut(interface_name)
            .register_dynamic_caller(method_name, self.caller.clone());
        if let Some(m) = self.driver.method_mut(&self.caller) {
            m.registered_to.insert(interface_name.to_string());
        }

        let classes: Vec<String> = self
            .driver
            .interfaces
            .get(interface_name)
            .map(|iface| iface.instantiated_subclasses.iter().cloned().collect())
            .unwrap_or_default();

        classes
            .iter()
            .filter_map(|class_name| {
                let class = self.driver.classes.get(class_name)?;
                let found = class.lookup_method(method_name, &self.driver.classes)?;
                Some(MethodKey::new(found.owner.clone(), found.name.clone()))
            })
            .collect()
    }

    fn static_call(&mut self, class_name: &str, method_name: &str) -> Option<MethodKey> {
        let my_interface = self.driver.classes.get(class_name)?.my_interface.clone();
        self.driver.get_interface_mut(&my_interface).register_static_caller(method_name, self.caller.clone());
        if let Some(m) = self.driver.method_mut(&self.caller) {
            m.registered_to.insert(my_interface);
        }

        let class = self.driver.classes.get(class_name)?;
        let found = class.lookup_method(method_name, &self.driver.classes)?;
        Some(MethodKey::new(found.owner.clone(), found.name.clone()))
    }

    fn trait_impl_call(&mut self, trait_impl_name: &str, method_name: &str) -> Option<MethodKey> {
        let interface = self.driver.trait_impls.get(trait_impl_name)?.interface.clone();
        self.driver.get_interface_mut(&interface).register_static_caller(method_name, self.caller.clone());
        if let Some(m) = self.driver.method_mut(&self.caller) {
            m.registered_to.insert(interface);
        }

        self.driver
            .trait_impls
            .get(trait_impl_name)?
            .base
            .lookup(method_name)
            .map(|m| MethodKey::new(m.owner.clone(), m.name.clone()))
    }
}
