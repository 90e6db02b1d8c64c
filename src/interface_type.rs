//! InterfaceType — the dependency ledger.
//!
//! Pure bookkeeping: which methods consulted a given `(interface, method
//! name)` pair during their last optimization. Never destroyed, even after
//! the class/interface it names has been deleted, so stale caller
//! registrations can still be torn down through it (see Design Notes, "Lazy
//! interface creation").

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ids::MethodKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CallerKind {
    Dynamic,
    Static,
}

#[derive(Debug, Default)]
pub struct InterfaceType {
    name: String,
    dynamic_callers: FxHashMap<String, FxHashSet<MethodKey>>,
    static_callers: FxHashMap<String, FxHashSet<MethodKey>>,
    /// Reverse index: for each caller registered anywhere in this interface,
    /// which `(kind, method_name)` buckets it sits in. Makes
    /// `unregister_caller` O(registrations of that caller in this
    /// interface) instead of O(every method name ever registered).
    registrations: FxHashMap<MethodKey, FxHashSet<(CallerKind, String)>>,
    pub instantiated_subclasses: FxHashSet<String>,
}

impl InterfaceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register_dynamic_caller(&mut self, method_name: &str, caller: MethodKey) {
        self.dynamic_callers
            .entry(method_name.to_string())
            .or_default()
            .insert(caller.clone());
        self.registrations
            .entry(caller)
            .or_default()
            .insert((CallerKind::Dynamic, method_name.to_string()));
    }

    pub fn register_static_caller(&mut self, method_name: &str, caller: MethodKey) {
        self.static_callers
            .entry(method_name.to_string())
            .or_default()
            .insert(caller.clone());
        self.registrations
            .entry(caller)
            .or_default()
            .insert((CallerKind::Static, method_name.to_string()));
    }

    /// Removes `caller` from every caller set, dynamic and static, all
    /// method names.
    pub fn unregister_caller(&mut self, caller: &MethodKey) {
        let Some(regs) = self.registrations.remove(caller) else { return };
        for (kind, method_name) in regs {
            let map = match kind {
                CallerKind::Dynamic => &mut self.dynamic_callers,
                CallerKind::Static => &mut self.static_callers,
            };
            if let Some(set) = map.get_mut(&method_name) {
                set.remove(caller);
                if set.is_empty() {
                    map.remove(&method_name);
                }
            }
        }
    }

    /// Removes and returns the whole dynamic-caller set for `method_name`.
    /// Removal, not mere iteration, is essential: the returned callers will
    /// re-register themselves once re-optimized, so the pre-existing set is
    /// stale the instant it's handed back.
    #[must_use]
    pub fn take_dynamic_callers_of(&mut self, method_name: &str) -> FxHashSet<MethodKey> {
        let callers = self.dynamic_callers.remove(method_name).unwrap_or_default();
        self.drop_stale_registrations(&callers, CallerKind::Dynamic, method_name);
        callers
    }

    /// Symmetric to `take_dynamic_callers_of`, for static callers.
    #[must_use]
    pub fn take_static_callers_of(&mut self, method_name: &str) -> FxHashSet<MethodKey> {
        let callers = self.static_callers.remove(method_name).unwrap_or_default();
        self.drop_stale_registrations(&callers, CallerKind::Static, method_name);
        callers
    }

    fn drop_stale_registrations(
        &mut self,
        callers: &FxHashSet<MethodKey>,
        kind: CallerKind,
        method_name: &str,
    ) {
        for caller in callers {
            if let Some(regs) = self.registrations.get_mut(caller) {
                regs.remove(&(kind, method_name.to_string()));
                if regs.is_empty() {
                    self.registrations.remove(caller);
                }
            }
        }
    }

    pub fn has_dynamic_caller(&self, method_name: &str, caller: &MethodKey) -> bool {
        self.dynamic_callers.get(method_name).is_some_and(|set| set.contains(caller))
    }

    pub fn has_static_caller(&self, method_name: &str, caller: &MethodKey) -> bool {
        self.static_callers.get(method_name).is_some_and(|set| set.contains(caller))
    }

    /// Whether `caller` is registered in any caller set of this interface at
    /// all, dynamic or static, any method name (I4).
    pub fn is_caller(&self, caller: &MethodKey) -> bool {
        self.registrations.contains_key(caller)
    }

    #[cfg(test)]
    fn dynamic_caller_count(&self, method_name: &str) -> usize {
        self.dynamic_callers.get(method_name).map_or(0, FxHashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ContainerId;

    fn key(n: &str) -> MethodKey {
        MethodKey::new(ContainerId::Class(n.to_string()), "m")
    }

    #[test]
    fn register_is_idempotent() {
        let mut iface = InterfaceType::new("I");
        iface.register_dynamic_caller("foo", key("A"));
        iface.register_dynamic_caller("foo", key("A"));
        assert_eq!(iface.dynamic_caller_count("foo"), 1);
    }

    #[test]
    fn unregister_removes_from_every_set() {
        let mut iface = InterfaceType::new("I");
        iface.register_dynamic_caller("foo", key("A"));
        iface.register_static_caller("bar", key("A"));
        iface.unregister_caller(&key("A"));
        assert_eq!(iface.dynamic_caller_count("foo"), 0);
        assert!(iface.static_callers.get("bar").is_none());
        assert!(iface.registrations.is_empty());
    }

    #[test]
    fn take_dynamic_callers_removes_the_set() {
        let mut iface = InterfaceType::new("I");
        iface.register_dynamic_caller("foo", key("A"));
        iface.register_dynamic_caller("foo", key("B"));

        let taken = iface.take_dynamic_callers_of("foo");
        assert_eq!(taken.len(), 2);
        assert_eq!(iface.dynamic_caller_count("foo"), 0);
        // Subsequent unregister of one of those callers must be a no-op,
        // not a panic: the bucket is already gone.
        iface.unregister_caller(&key("A"));
    }

    #[test]
    fn take_static_callers_is_symmetric() {
        let mut iface = InterfaceType::new("I");
        iface.register_static_caller("foo", key("A"));
        let taken = iface.take_static_callers_of("foo");
        assert_eq!(taken.len(), 1);
        assert!(iface.static_callers.get("foo").is_none());
    }
}
