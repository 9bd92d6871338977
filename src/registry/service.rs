//! ReferenceRegistry - id- and type-keyed directory of live objects
//!
//! An explicit service object rather than global state: construct one per
//! process (or per test) and hand clones to producers and consumers.
//! Single-threaded; clones share the same directory.

use std::any::{self, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::error::StepError;
use crate::event_log::{EventKind, EventLog};
use crate::log;
use crate::task::Suspension;

use super::dynamic_ref::DynamicRef;
use super::entry::RegistryEntry;

#[derive(Default)]
struct Directory {
    by_id: HashMap<Arc<str>, RegistryEntry>,
    by_type: HashMap<TypeId, Vec<RegistryEntry>>,
}

#[derive(Clone, Default)]
pub struct ReferenceRegistry {
    directory: Rc<RefCell<Directory>>,
    journal: Option<EventLog>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that records register/unregister in `journal`
    pub fn with_journal(journal: EventLog) -> Self {
        Self {
            directory: Rc::default(),
            journal: Some(journal),
        }
    }

    pub fn journal(&self) -> Option<&EventLog> {
        self.journal.as_ref()
    }

    /// Insert under the entry's id (last registration wins) and add it to
    /// its type's set
    pub fn register(&self, entry: &RegistryEntry) {
        {
            let mut dir = self.directory.borrow_mut();
            if let Some(id) = entry.id_arc() {
                if let Some(previous) = dir.by_id.insert(id, entry.clone()) {
                    if previous.key() != entry.key() {
                        debug!(id = ?entry.id(), "registration replaced an existing id entry");
                    }
                }
            }

            let set = dir.by_type.entry(entry.type_id()).or_default();
            if !set.iter().any(|e| e.key() == entry.key()) {
                set.push(entry.clone());
            }
        }

        debug!(id = ?entry.id(), type_name = entry.type_name(), "reference registered");
        self.emit(EventKind::EntryRegistered {
            id: entry.id_arc(),
            type_name: entry.type_name().into(),
        });
    }

    /// Remove the id entry if it still is this entry, and drop this entry
    /// from its type's set
    pub fn unregister(&self, entry: &RegistryEntry) {
        {
            let mut dir = self.directory.borrow_mut();
            if let Some(id) = entry.id() {
                if dir.by_id.get(id).is_some_and(|e| e.key() == entry.key()) {
                    dir.by_id.remove(id);
                }
            }

            if let Some(set) = dir.by_type.get_mut(&entry.type_id()) {
                set.retain(|e| e.key() != entry.key());
                if set.is_empty() {
                    dir.by_type.remove(&entry.type_id());
                }
            }
        }

        debug!(id = ?entry.id(), type_name = entry.type_name(), "reference unregistered");
        self.emit(EventKind::EntryUnregistered {
            id: entry.id_arc(),
            type_name: entry.type_name().into(),
        });
    }

    /// Exact lookup by id.
    ///
    /// A stored target of another type is an integrity error, not a miss.
    pub fn get_by_id<T: Any>(&self, id: &str) -> Result<Option<Rc<T>>, StepError> {
        let entry = self.directory.borrow().by_id.get(id).cloned();
        let Some(entry) = entry else {
            return Ok(None);
        };

        let Some(target) = entry.target() else {
            self.purge_stale(&entry);
            return Ok(None);
        };

        target
            .downcast::<T>()
            .map(Some)
            .map_err(|_| StepError::RegistryCast {
                id: id.to_string(),
                expected: any::type_name::<T>(),
                actual: entry.type_name(),
            })
    }

    /// Singleton lookup by concrete type. More than one live entry of the
    /// type is an integrity error.
    pub fn get_by_type<T: Any>(&self) -> Result<Option<Rc<T>>, StepError> {
        let entries = self
            .directory
            .borrow()
            .by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_default();

        let mut live = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.target() {
                Some(target) => live.push((entry, target)),
                None => self.purge_stale(&entry),
            }
        }

        if live.len() > 1 {
            return Err(StepError::RegistryAmbiguous {
                type_name: any::type_name::<T>(),
                count: live.len(),
            });
        }

        let Some((entry, target)) = live.pop() else {
            return Ok(None);
        };
        target
            .downcast::<T>()
            .map(Some)
            .map_err(|_| StepError::RegistryCast {
                id: entry.id().unwrap_or("<type>").to_string(),
                expected: any::type_name::<T>(),
                actual: entry.type_name(),
            })
    }

    /// Suspension that resolves once `id` is registered (or the lookup
    /// fails its integrity check). Never times out.
    pub fn wait_for_id<T: Any>(&self, id: &str) -> Suspension {
        DynamicRef::<T>::by_id(self, id).wait()
    }

    /// Suspension that resolves once one `T` is registered. Never times out.
    pub fn wait_for_type<T: Any>(&self) -> Suspension {
        DynamicRef::<T>::by_type(self).wait()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.directory.borrow().by_id.contains_key(id)
    }

    /// Number of distinct registered entries
    pub fn len(&self) -> usize {
        self.directory.borrow().by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A target dropped without unregistering can never come back; drop the
    /// entry and report it once.
    fn purge_stale(&self, entry: &RegistryEntry) {
        log::logger().warning(&format!(
            "registered {} '{}' was dropped without unregistering",
            entry.type_name(),
            entry.id().unwrap_or("<by type>"),
        ));
        self.unregister_quiet(entry);
        self.emit(EventKind::StaleEntry {
            id: entry.id_arc(),
            type_name: entry.type_name().into(),
        });
    }

    fn unregister_quiet(&self, entry: &RegistryEntry) {
        let mut dir = self.directory.borrow_mut();
        if let Some(id) = entry.id() {
            if dir.by_id.get(id).is_some_and(|e| e.key() == entry.key()) {
                dir.by_id.remove(id);
            }
        }
        if let Some(set) = dir.by_type.get_mut(&entry.type_id()) {
            set.retain(|e| e.key() != entry.key());
        }
    }

    fn emit(&self, kind: EventKind) {
        if let Some(journal) = &self.journal {
            journal.emit(kind);
        }
    }
}

impl std::fmt::Debug for ReferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct ViewModel {
        name: &'static str,
    }

    #[test]
    fn register_then_get_by_id() {
        let registry = ReferenceRegistry::new();
        let vm = Rc::new(ViewModel { name: "main" });
        let entry = RegistryEntry::with_id("vm", &vm);

        registry.register(&entry);
        let found = registry.get_by_id::<ViewModel>("vm").unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &vm));

        registry.unregister(&entry);
        assert!(registry.get_by_id::<ViewModel>("vm").unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn wrong_type_is_cast_error() {
        let registry = ReferenceRegistry::new();
        let vm = Rc::new(ViewModel { name: "main" });
        registry.register(&RegistryEntry::with_id("vm", &vm));

        let err = registry.get_by_id::<String>("vm").unwrap_err();
        assert!(matches!(err, StepError::RegistryCast { ref id, .. } if id == "vm"));
    }

    #[test]
    fn last_registration_wins_and_old_unregister_keeps_new() {
        let registry = ReferenceRegistry::new();
        let first = Rc::new(ViewModel { name: "first" });
        let second = Rc::new(ViewModel { name: "second" });
        let old = RegistryEntry::with_id("vm", &first);
        let new = RegistryEntry::with_id("vm", &second);

        registry.register(&old);
        registry.register(&new);
        assert_eq!(registry.get_by_id::<ViewModel>("vm").unwrap().unwrap().name, "second");

        registry.unregister(&old);
        assert_eq!(registry.get_by_id::<ViewModel>("vm").unwrap().unwrap().name, "second");
    }

    #[test]
    fn get_by_type_singleton_and_ambiguity() {
        let registry = ReferenceRegistry::new();
        let a = Rc::new(ViewModel { name: "a" });
        let b = Rc::new(ViewModel { name: "b" });
        let entry_a = RegistryEntry::of_type(&a);

        assert!(registry.get_by_type::<ViewModel>().unwrap().is_none());

        registry.register(&entry_a);
        assert_eq!(registry.get_by_type::<ViewModel>().unwrap().unwrap().name, "a");

        registry.register(&RegistryEntry::of_type(&b));
        let err = registry.get_by_type::<ViewModel>().unwrap_err();
        assert!(matches!(err, StepError::RegistryAmbiguous { count: 2, .. }));
    }

    #[test]
    fn registering_twice_does_not_duplicate_type_set() {
        let registry = ReferenceRegistry::new();
        let a = Rc::new(ViewModel { name: "a" });
        let entry = RegistryEntry::with_id("a", &a);

        registry.register(&entry);
        registry.register(&entry);
        assert_eq!(registry.len(), 1);
        assert!(registry.get_by_type::<ViewModel>().is_ok());
    }

    #[test]
    fn dropped_target_is_reported_and_purged() {
        let journal = EventLog::new();
        let registry = ReferenceRegistry::with_journal(journal.clone());
        let vm = Rc::new(ViewModel { name: "gone" });
        registry.register(&RegistryEntry::with_id("vm", &vm));
        drop(vm);

        assert!(registry.get_by_id::<ViewModel>("vm").unwrap().is_none());
        assert!(!registry.contains_id("vm"));
        assert!(registry.is_empty());

        let stale = journal
            .events()
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::StaleEntry { .. }))
            .count();
        assert_eq!(stale, 1);
    }
}
