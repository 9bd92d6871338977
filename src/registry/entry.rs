//! Registry entries - non-owning references with identity

use std::any::{self, Any, TypeId};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ENTRY_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a registry entry (two entries with the same id are still
/// distinct entries)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey(u64);

/// A reference the registry can hand out by id and/or by type.
///
/// The entry does not keep its target alive; the owner must unregister it
/// before dropping the target.
#[derive(Clone)]
pub struct RegistryEntry {
    key: EntryKey,
    id: Option<Arc<str>>,
    type_id: TypeId,
    type_name: &'static str,
    target: Weak<dyn Any>,
}

impl RegistryEntry {
    /// Entry for `target`, keyed by `id` when given (an empty id means none)
    pub fn new<T: Any>(id: Option<&str>, target: &Rc<T>) -> Self {
        let erased: Rc<dyn Any> = Rc::clone(target) as Rc<dyn Any>;
        Self {
            key: EntryKey(NEXT_ENTRY_KEY.fetch_add(1, Ordering::Relaxed)),
            id: id.filter(|id| !id.is_empty()).map(Arc::from),
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
            target: Rc::downgrade(&erased),
        }
    }

    pub fn with_id<T: Any>(id: &str, target: &Rc<T>) -> Self {
        Self::new(Some(id), target)
    }

    /// Type-only entry
    pub fn of_type<T: Any>(target: &Rc<T>) -> Self {
        Self::new(None, target)
    }

    pub fn key(&self) -> EntryKey {
        self.key
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn id_arc(&self) -> Option<Arc<str>> {
        self.id.clone()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// False once the owner dropped the target
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    pub(crate) fn target(&self) -> Option<Rc<dyn Any>> {
        self.target.upgrade()
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("type", &self.type_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_means_type_only() {
        let target = Rc::new(5u32);
        let entry = RegistryEntry::new(Some(""), &target);
        assert_eq!(entry.id(), None);
        assert_eq!(entry.type_id(), TypeId::of::<u32>());
    }

    #[test]
    fn entry_does_not_own_target() {
        let target = Rc::new(String::from("view model"));
        let entry = RegistryEntry::with_id("vm", &target);

        assert!(entry.is_alive());
        assert_eq!(Rc::strong_count(&target), 1);

        drop(target);
        assert!(!entry.is_alive());
        assert!(entry.target().is_none());
    }

    #[test]
    fn keys_are_unique() {
        let target = Rc::new(1u8);
        let a = RegistryEntry::with_id("x", &target);
        let b = RegistryEntry::with_id("x", &target);
        assert_ne!(a.key(), b.key());
        assert_eq!(a.clone().key(), a.key());
    }
}
