//! Binding<T> - one data source exposed to any number of consumers
//!
//! A binding pairs a getter and a setter (both asynchronous) with an
//! invalidation signal. The owner creates it, registers it under its id and
//! disposes it when done; consumers find it through the registry, subscribe
//! to invalidations and pull fresh values with `get`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::InvalidationPolicy;
use crate::event_log::{EventKind, EventLog};
use crate::log;
use crate::registry::{ReferenceRegistry, RegistryEntry};
use crate::task::{AsyncTask, TaskWatch};

use super::builder::BindingBuilder;
use super::event::{Event, Listener};

pub type Getter<T> = Box<dyn Fn() -> AsyncTask<T>>;
pub type Setter<T> = Box<dyn Fn(T) -> AsyncTask<()>>;

/// Receives the binding's invalidation listener (attach at creation, detach
/// at dispose)
pub type Hook = Box<dyn FnOnce(Listener)>;

/// Lifecycle of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Created,
    Registered,
    Invalidated,
    Refreshing,
    Disposed,
}

impl BindingState {
    fn is_live(self) -> bool {
        !matches!(self, BindingState::Created | BindingState::Disposed)
    }
}

struct Registration {
    registry: ReferenceRegistry,
    entry: RegistryEntry,
}

pub struct Binding<T> {
    id: Arc<str>,
    getter: Getter<T>,
    setter: Setter<T>,
    invalidated: Event,
    handler: Listener,
    detach: RefCell<Option<Hook>>,
    registration: RefCell<Option<Registration>>,
    state: Cell<BindingState>,
    policy: InvalidationPolicy,
    delivering: Cell<bool>,
    pending: Cell<bool>,
    refresh: RefCell<Option<TaskWatch>>,
}

impl<T: 'static> Binding<T> {
    /// Create a binding. `attach` immediately receives the invalidation
    /// listener; `detach` receives the same listener on dispose.
    pub fn create<G, S>(
        id: &str,
        getter: G,
        setter: S,
        attach: Option<Hook>,
        detach: Option<Hook>,
    ) -> Rc<Self>
    where
        G: Fn() -> AsyncTask<T> + 'static,
        S: Fn(T) -> AsyncTask<()> + 'static,
    {
        Self::assemble(
            id,
            Box::new(getter),
            Box::new(setter),
            attach,
            detach,
            InvalidationPolicy::default(),
        )
    }

    pub fn builder(id: &str) -> BindingBuilder<T> {
        BindingBuilder::new(id)
    }

    pub(crate) fn assemble(
        id: &str,
        getter: Getter<T>,
        setter: Setter<T>,
        attach: Option<Hook>,
        detach: Option<Hook>,
        policy: InvalidationPolicy,
    ) -> Rc<Self> {
        let binding = Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let handler: Listener = Rc::new(move || {
                if let Some(binding) = weak.upgrade() {
                    binding.invalidate();
                }
            });

            Self {
                id: id.into(),
                getter,
                setter,
                invalidated: Event::new(),
                handler,
                detach: RefCell::new(detach),
                registration: RefCell::new(None),
                state: Cell::new(BindingState::Created),
                policy,
                delivering: Cell::new(false),
                pending: Cell::new(false),
                refresh: RefCell::new(None),
            }
        });

        if let Some(attach) = attach {
            attach(binding.invalidation_handler());
        }
        binding
    }

    /// Publish under the binding's id
    pub fn register(self: &Rc<Self>, registry: &ReferenceRegistry) {
        if self.state.get() == BindingState::Disposed {
            log::logger().warning(&format!("register called on disposed binding '{}'", self.id));
            return;
        }

        let entry = RegistryEntry::with_id(&self.id, self);
        registry.register(&entry);
        let previous = self.registration.replace(Some(Registration {
            registry: registry.clone(),
            entry,
        }));
        if let Some(previous) = previous {
            previous.registry.unregister(&previous.entry);
        }

        if self.state.get() == BindingState::Created {
            self.state.set(BindingState::Registered);
        }
        debug!(binding = %self.id, "binding registered");
    }
}

impl<T> Binding<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    /// Listener that invalidates this binding when called. Holds the binding
    /// weakly.
    pub fn invalidation_handler(&self) -> Listener {
        Rc::clone(&self.handler)
    }

    pub fn state(&self) -> BindingState {
        let state = self.state.get();
        if state == BindingState::Refreshing {
            let settled = self
                .refresh
                .borrow()
                .as_ref()
                .map_or(true, TaskWatch::is_terminal);
            if settled {
                self.state.set(BindingState::Registered);
                return BindingState::Registered;
            }
        }
        state
    }

    pub fn is_disposed(&self) -> bool {
        self.state.get() == BindingState::Disposed
    }

    pub fn subscriber_count(&self) -> usize {
        self.invalidated.len()
    }

    /// Add a consumer listener; returns false if it was already subscribed
    pub fn subscribe(&self, listener: Listener) -> bool {
        if self.is_disposed() {
            log::logger().warning(&format!("subscribed to disposed binding '{}'", self.id));
        }
        self.invalidated.add(listener)
    }

    pub fn unsubscribe(&self, listener: &Listener) -> bool {
        self.invalidated.remove(listener)
    }

    /// Fetch the current value
    pub fn get(&self) -> AsyncTask<T> {
        let task = (self.getter)();
        if self.state.get().is_live() {
            *self.refresh.borrow_mut() = Some(task.watch());
            self.state.set(BindingState::Refreshing);
        }
        task
    }

    /// Push a new value to the source
    pub fn set(&self, value: T) -> AsyncTask<()> {
        (self.setter)(value)
    }

    /// Tell every subscriber, in subscription order, that the value changed.
    ///
    /// Delivery is synchronous. Under `Coalesce`, invalidations raised while a
    /// pass is running are folded into one more pass.
    pub fn invalidate(&self) {
        if self.policy == InvalidationPolicy::Coalesce && self.delivering.get() {
            self.pending.set(true);
            return;
        }

        let outer = self.delivering.replace(true);
        loop {
            log::logger().info(&format!("binding '{}' invalidated", self.id));
            if self.state.get().is_live() {
                self.state.set(BindingState::Invalidated);
            }

            let subscribers = self.invalidated.emit();
            self.emit(EventKind::BindingInvalidated {
                binding_id: Arc::clone(&self.id),
                subscribers,
            });

            if !self.pending.replace(false) {
                break;
            }
        }
        self.delivering.set(outer);
    }

    /// Unregister, detach from the source and stop being live.
    ///
    /// Disposing twice is a caller error; the second call only warns.
    pub fn dispose(&self) {
        if self.is_disposed() {
            log::logger().warning(&format!("binding '{}' disposed twice", self.id));
            return;
        }

        let registration = self.registration.borrow_mut().take();
        if let Some(registration) = &registration {
            registration.registry.unregister(&registration.entry);
        }

        let detach = self.detach.borrow_mut().take();
        if let Some(detach) = detach {
            detach(self.invalidation_handler());
        }

        self.state.set(BindingState::Disposed);
        self.refresh.borrow_mut().take();
        debug!(binding = %self.id, "binding disposed");

        if let Some(journal) = registration.as_ref().and_then(|r| r.registry.journal()) {
            journal.emit(EventKind::BindingDisposed {
                binding_id: Arc::clone(&self.id),
            });
        }
    }

    fn journal(&self) -> Option<EventLog> {
        self.registration
            .borrow()
            .as_ref()
            .and_then(|r| r.registry.journal().cloned())
    }

    fn emit(&self, kind: EventKind) {
        if let Some(journal) = self.journal() {
            journal.emit(kind);
        }
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("subscribers", &self.subscriber_count())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::event::listener;

    fn constant(id: &str, value: i32) -> Rc<Binding<i32>> {
        Binding::create(id, move || AsyncTask::wrap(value), |_| AsyncTask::wrap(()), None, None)
    }

    #[test]
    fn attach_and_detach_receive_the_same_listener() {
        let source = Event::new();
        let (on, off) = (source.clone(), source.clone());

        let binding = Binding::create(
            "counter",
            || AsyncTask::wrap(1),
            |_: i32| AsyncTask::wrap(()),
            Some(Box::new(move |l: Listener| {
                on.add(l);
            })),
            Some(Box::new(move |l: Listener| {
                off.remove(&l);
            })),
        );
        assert_eq!(source.len(), 1);
        assert!(source.contains(&binding.invalidation_handler()));

        binding.dispose();
        assert!(source.is_empty());
    }

    #[test]
    fn source_event_reaches_subscribers() {
        let source = Event::new();
        let on = source.clone();
        let binding = Binding::create(
            "text",
            || AsyncTask::wrap(String::from("hi")),
            |_| AsyncTask::wrap(()),
            Some(Box::new(move |l: Listener| {
                on.add(l);
            })),
            None,
        );

        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        binding.subscribe(listener(move || counter.set(counter.get() + 1)));

        source.emit();
        source.emit();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn lifecycle_states() {
        let registry = ReferenceRegistry::new();
        let binding = constant("n", 7);
        assert_eq!(binding.state(), BindingState::Created);

        binding.register(&registry);
        assert_eq!(binding.state(), BindingState::Registered);

        binding.invalidate();
        assert_eq!(binding.state(), BindingState::Invalidated);

        // Immediate getter task is already terminal
        let task = binding.get();
        assert_eq!(task.result().unwrap(), 7);
        assert_eq!(binding.state(), BindingState::Registered);

        binding.dispose();
        assert_eq!(binding.state(), BindingState::Disposed);
        assert!(registry.get_by_id::<Binding<i32>>("n").unwrap().is_none());
    }

    #[test]
    fn double_dispose_is_ignored() {
        let registry = ReferenceRegistry::new();
        let binding = constant("n", 1);
        binding.register(&registry);

        binding.dispose();
        binding.dispose();
        assert!(binding.is_disposed());
    }

    #[test]
    fn reentrant_policy_nests_delivery() {
        let binding = constant("n", 1);
        let order = Rc::new(RefCell::new(Vec::new()));
        let depth = Rc::new(Cell::new(0));

        let (weak, log, d) = (Rc::downgrade(&binding), Rc::clone(&order), Rc::clone(&depth));
        binding.subscribe(listener(move || {
            d.set(d.get() + 1);
            log.borrow_mut().push(format!("a{}", d.get()));
            if d.get() == 1 {
                if let Some(b) = weak.upgrade() {
                    b.invalidate();
                }
            }
        }));
        let log = Rc::clone(&order);
        binding.subscribe(listener(move || log.borrow_mut().push("b".to_string())));

        binding.invalidate();
        assert_eq!(*order.borrow(), vec!["a1", "a2", "b", "b"]);
    }

    #[test]
    fn coalesce_policy_folds_nested_invalidations() {
        let binding: Rc<Binding<i32>> = Binding::builder("n")
            .getter(|| AsyncTask::wrap(1))
            .setter(|_| AsyncTask::wrap(()))
            .policy(InvalidationPolicy::Coalesce)
            .build()
            .unwrap();

        let order = Rc::new(RefCell::new(Vec::new()));
        let passes = Rc::new(Cell::new(0));

        let (weak, log, p) = (Rc::downgrade(&binding), Rc::clone(&order), Rc::clone(&passes));
        binding.subscribe(listener(move || {
            p.set(p.get() + 1);
            log.borrow_mut().push(format!("a{}", p.get()));
            if p.get() == 1 {
                if let Some(b) = weak.upgrade() {
                    b.invalidate();
                    b.invalidate();
                }
            }
        }));
        let log = Rc::clone(&order);
        binding.subscribe(listener(move || log.borrow_mut().push("b".to_string())));

        binding.invalidate();
        assert_eq!(*order.borrow(), vec!["a1", "b", "a2", "b"]);
    }

    #[test]
    fn invalidation_is_journaled_once_registered() {
        let journal = EventLog::new();
        let registry = ReferenceRegistry::with_journal(journal.clone());
        let binding = constant("n", 1);
        binding.subscribe(listener(|| {}));

        binding.register(&registry);
        binding.invalidate();
        binding.dispose();

        let events = journal.filter_binding("n");
        assert!(matches!(
            events[0].kind,
            EventKind::BindingInvalidated { subscribers: 1, .. }
        ));
        assert!(matches!(events[1].kind, EventKind::BindingDisposed { .. }));
    }
}
