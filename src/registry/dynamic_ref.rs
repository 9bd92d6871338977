//! DynamicRef - late-binding handle to a registry reference
//!
//! Created before the target exists; resolves on every access, so it tracks
//! registrations and unregistrations as they happen.

use std::any::{self, Any};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::StepError;
use crate::task::Suspension;

use super::service::ReferenceRegistry;

#[derive(Clone)]
enum Lookup {
    Id(Arc<str>),
    Type,
}

pub struct DynamicRef<T> {
    registry: ReferenceRegistry,
    lookup: Lookup,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for DynamicRef<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            lookup: self.lookup.clone(),
            _target: PhantomData,
        }
    }
}

impl<T: Any> DynamicRef<T> {
    /// Search by id
    pub fn by_id(registry: &ReferenceRegistry, id: &str) -> Self {
        Self {
            registry: registry.clone(),
            lookup: Lookup::Id(id.into()),
            _target: PhantomData,
        }
    }

    /// Search by type (singleton)
    pub fn by_type(registry: &ReferenceRegistry) -> Self {
        Self {
            registry: registry.clone(),
            lookup: Lookup::Type,
            _target: PhantomData,
        }
    }

    /// What is being searched for, for messages
    pub fn key(&self) -> String {
        match &self.lookup {
            Lookup::Id(id) => id.to_string(),
            Lookup::Type => any::type_name::<T>().to_string(),
        }
    }

    /// Current value, if registered
    pub fn value(&self) -> Result<Option<Rc<T>>, StepError> {
        match &self.lookup {
            Lookup::Id(id) => self.registry.get_by_id::<T>(id),
            Lookup::Type => self.registry.get_by_type::<T>(),
        }
    }

    pub fn has_value(&self) -> Result<bool, StepError> {
        self.value().map(|v| v.is_some())
    }

    /// Current value, or `NotFound`
    pub fn get(&self) -> Result<Rc<T>, StepError> {
        self.value()?.ok_or_else(|| StepError::NotFound { key: self.key() })
    }

    /// Suspension re-checked every tick until the lookup succeeds.
    ///
    /// An integrity error also ends the wait so the caller's next lookup
    /// raises it. There is no timeout.
    pub fn wait(&self) -> Suspension {
        let handle = self.clone();
        Suspension::until(move || !matches!(handle.value(), Ok(None)))
    }
}

impl<T> fmt::Debug for DynamicRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match &self.lookup {
            Lookup::Id(id) => format!("id:{id}"),
            Lookup::Type => format!("type:{}", any::type_name::<T>()),
        };
        f.debug_struct("DynamicRef").field("lookup", &key).finish()
    }
}
