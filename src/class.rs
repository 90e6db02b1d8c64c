//! Class — hierarchy maintenance.
//!
//! Participates in the class hierarchy tree via parent/child *names*, not
//! owning references: the graph is cyclic (a class's children point back at
//! it and vice versa), so nothing here holds an owning pointer to a sibling.
//! The tree-walk algorithms that mutate more than one class at once
//! (`walk_for_deletions`, `walk_for_changes`, `not_instantiated_anymore`)
//! live on `IncOptimizer`, which owns the `classes` map they walk; what's
//! here is the per-class data plus the two read-only chain walks that only
//! ever need shared access to that map (`lookup_method`, `all_methods`).

use rustc_hash::{FxHashMap, FxHashSet};

use crate::container::MethodContainerState;
use crate::method_impl::MethodImpl;

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub superclass: Option<String>,
    pub subclasses: Vec<String>,
    /// InterfaceTypes of the ancestors reported by the last analysis for
    /// this class, including this class's own name — `myInterface` is
    /// always trivially one of its own ancestors.
    pub interfaces: FxHashSet<String>,
    /// This class's own InterfaceType, used to target it with static calls
    /// and to re-resolve it after a move to a different superclass.
    pub my_interface: String,
    pub is_instantiated: bool,
    pub base: MethodContainerState,
}

impl Class {
    pub fn new_root(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            my_interface: name.clone(),
            name,
            superclass: None,
            subclasses: Vec::new(),
            interfaces: FxHashSet::default(),
            is_instantiated: false,
            base: MethodContainerState::default(),
        }
    }

    pub fn new_child(name: impl Into<String>, superclass: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            my_interface: name.clone(),
            name,
            superclass: Some(superclass.into()),
            subclasses: Vec::new(),
            interfaces: FxHashSet::default(),
            is_instantiated: false,
            base: MethodContainerState::default(),
        }
    }

    /// Walks the parent chain from this class upward, returning the first
    /// concrete definition of `name`. Neither this nor `all_methods` caches
    /// its result.
    pub fn lookup_method<'a>(
        &'a self,
        name: &str,
        classes: &'a FxHashMap<String, Class>,
    ) -> Option<&'a MethodImpl> {
        let mut current = self;
        loop {
            if let Some(m) = current.base.lookup(name) {
                return Some(m);
            }
            current = classes.get(current.superclass.as_deref()?)?;
        }
    }

    /// Flattens the reverse parent chain into a name -> impl map, children
    /// overriding parents.
    pub fn all_methods<'a>(
        &'a self,
        classes: &'a FxHashMap<String, Class>,
    ) -> FxHashMap<String, &'a MethodImpl> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent_name) = &current.superclass {
            match classes.get(parent_name) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
        }

        let mut result = FxHashMap::default();
        for c in chain.into_iter().rev() {
            for (name, m) in &c.base.methods {
                result.insert(name.clone(), m);
            }
        }
        result
    }
}
