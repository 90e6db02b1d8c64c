//! TraitImpl — a flat bag of static methods attached to a single
//! InterfaceType. Referenced statically, never dispatched dynamically, so
//! it carries no hierarchy of its own.

use crate::container::MethodContainerState;

#[derive(Debug)]
pub struct TraitImpl {
    pub name: String,
    pub interface: String,
    pub base: MethodContainerState,
}

impl TraitImpl {
    pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self { name: name.into(), interface: interface.into(), base: MethodContainerState::default() }
    }
}
