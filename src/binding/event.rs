//! Event - ordered set of listener callbacks
//!
//! Listeners are identified by their `Rc` allocation, so the same handle that
//! was added is the one that removes it. Delivery works on a snapshot:
//! listeners may add or remove listeners while being called.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type Listener = Rc<dyn Fn()>;

/// Wrap a closure as a listener handle
pub fn listener<F>(f: F) -> Listener
where
    F: Fn() + 'static,
{
    Rc::new(f)
}

#[derive(Clone, Default)]
pub struct Event {
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; returns false if it was already present
    pub fn add(&self, listener: Listener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        if listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener; returns false if it was not present
    pub fn remove(&self, listener: &Listener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| !Rc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn contains(&self, listener: &Listener) -> bool {
        self.listeners.borrow().iter().any(|l| Rc::ptr_eq(l, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    /// Call every listener in subscription order; returns how many ran
    pub fn emit(&self) -> usize {
        let snapshot: Vec<Listener> = self.listeners.borrow().clone();
        for listener in &snapshot {
            listener();
        }
        snapshot.len()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("listeners", &self.len()).finish()
    }
}
