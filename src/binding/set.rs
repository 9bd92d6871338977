//! BindingSet - the owner side of a group of bindings
//!
//! An owner exposes its bindings when it comes alive and destroys them as a
//! group when it goes away. Dropping the set destroys whatever is left.

use std::rc::Rc;

use crate::registry::ReferenceRegistry;

use super::data_binding::{Binding, BindingState};

/// Type-erased view of a binding, for owners holding several value types
pub trait BindingHandle {
    fn id(&self) -> &str;
    fn state(&self) -> BindingState;
    fn dispose(&self);
}

impl<T> BindingHandle for Binding<T> {
    fn id(&self) -> &str {
        Binding::id(self)
    }

    fn state(&self) -> BindingState {
        Binding::state(self)
    }

    fn dispose(&self) {
        Binding::dispose(self)
    }
}

pub struct BindingSet {
    registry: ReferenceRegistry,
    bindings: Vec<Rc<dyn BindingHandle>>,
}

impl BindingSet {
    pub fn new(registry: &ReferenceRegistry) -> Self {
        Self {
            registry: registry.clone(),
            bindings: Vec::new(),
        }
    }

    /// Register `binding` and keep it until `destroy`
    pub fn expose<T: 'static>(&mut self, binding: Rc<Binding<T>>) -> Rc<Binding<T>> {
        binding.register(&self.registry);
        self.bindings.push(Rc::clone(&binding) as Rc<dyn BindingHandle>);
        binding
    }

    /// Dispose every binding, most recently exposed first
    pub fn destroy(&mut self) {
        while let Some(binding) = self.bindings.pop() {
            binding.dispose();
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Drop for BindingSet {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSet").field("ids", &self.ids()).finish()
    }
}
