//! DataBinder<T> - consumer side of a binding
//!
//! Finds a binding by id (waiting for it to be registered), subscribes to
//! its invalidations and refreshes on each one: wait for the binding, call
//! the getter, wait for the task, hand the value to `on_value`. A faulted
//! fetch goes to `on_fault` instead and delivers no value.
//!
//! A refresh is requested once right after subscribing, so the consumer
//! starts with the current value. Refreshes may overlap when the getter is
//! slow; a refresh that finishes after a newer one has delivered is dropped,
//! so the consumer never moves back to an older value.
//!
//! Every wait the consumer starts also ends on teardown, so a torn-down
//! consumer leaves nothing running on the scheduler.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::debug;

use crate::error::StepError;
use crate::registry::{DynamicRef, ReferenceRegistry};
use crate::scheduler::TickScheduler;
use crate::task::{AsyncTask, Script, Suspension, Yielded};

use super::data_binding::Binding;
use super::event::Listener;

type ValueHook<T> = Box<dyn Fn(T)>;
type FaultHook = Box<dyn Fn(&StepError)>;
type NotifyHook = Box<dyn Fn()>;

/// Callbacks a consumer reacts with
pub struct BinderHooks<T> {
    on_value: Option<ValueHook<T>>,
    on_fault: Option<FaultHook>,
    on_invalidated: Option<NotifyHook>,
}

impl<T> Default for BinderHooks<T> {
    fn default() -> Self {
        Self {
            on_value: None,
            on_fault: None,
            on_invalidated: None,
        }
    }
}

impl<T> BinderHooks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_value<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + 'static,
    {
        self.on_value = Some(Box::new(f));
        self
    }

    /// Called with the error of a failed fetch or set
    pub fn on_fault<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepError) + 'static,
    {
        self.on_fault = Some(Box::new(f));
        self
    }

    /// Called first on every invalidation, before the refresh starts
    pub fn on_invalidated<F>(mut self, f: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_invalidated = Some(Box::new(f));
        self
    }
}

struct BinderCore<T> {
    id: Arc<str>,
    scheduler: TickScheduler,
    reference: DynamicRef<Binding<T>>,
    hooks: BinderHooks<T>,
    handler: RefCell<Option<Listener>>,
    subscribed: RefCell<Option<Weak<Binding<T>>>>,
    torn_down: Cell<bool>,
    /// Sequence number of the last refresh started
    issued: Cell<u64>,
    /// Sequence number of the newest refresh that delivered
    delivered: Cell<u64>,
}

impl<T> BinderCore<T> {
    fn deliver(&self, value: T) {
        if self.torn_down.get() {
            return;
        }
        if let Some(on_value) = &self.hooks.on_value {
            on_value(value);
        }
    }

    fn report(&self, err: &StepError) {
        if self.torn_down.get() {
            return;
        }
        debug!(binding = %self.id, error = %err, "binder fault");
        if let Some(on_fault) = &self.hooks.on_fault {
            on_fault(err);
        }
    }

    /// False for a refresh overtaken by a newer one
    fn accept(&self, seq: u64) -> bool {
        if seq < self.delivered.get() {
            debug!(binding = %self.id, seq, "superseded refresh dropped");
            return false;
        }
        self.delivered.set(seq);
        true
    }

    /// The live binding, or why it cannot be used
    fn resolve(&self) -> Result<Rc<Binding<T>>, StepError>
    where
        T: 'static,
    {
        let binding = self.reference.get()?;
        if binding.is_disposed() {
            return Err(StepError::BindingDisposed {
                id: self.id.to_string(),
            });
        }
        Ok(binding)
    }
}

impl<T: 'static> BinderCore<T> {
    /// Until the binding is registered or the consumer is torn down
    fn wait_for_binding(self: &Rc<Self>) -> Suspension {
        let core = Rc::clone(self);
        Suspension::until(move || {
            core.torn_down.get() || !matches!(core.reference.value(), Ok(None))
        })
    }

    /// Until `task` finishes or the consumer is torn down
    fn wait_for_task<R>(self: &Rc<Self>, task: &AsyncTask<R>) -> Suspension {
        let core = Rc::clone(self);
        let watch = task.watch();
        Suspension::until(move || core.torn_down.get() || watch.is_terminal())
    }
}

/// Consumer handle. Dropping it tears the subscription down.
pub struct DataBinder<T> {
    core: Rc<BinderCore<T>>,
    started: AsyncTask,
}

impl<T: Clone + 'static> DataBinder<T> {
    /// Begin consuming the binding registered under `id`
    pub fn start(
        scheduler: &TickScheduler,
        registry: &ReferenceRegistry,
        id: &str,
        hooks: BinderHooks<T>,
    ) -> Self {
        let core = Rc::new(BinderCore {
            id: id.into(),
            scheduler: scheduler.clone(),
            reference: DynamicRef::by_id(registry, id),
            hooks,
            handler: RefCell::new(None),
            subscribed: RefCell::new(None),
            torn_down: Cell::new(false),
            issued: Cell::new(0),
            delivered: Cell::new(0),
        });

        let weak = Rc::downgrade(&core);
        let handler: Listener = Rc::new(move || {
            if let Some(core) = weak.upgrade() {
                Self::refresh(&core);
            }
        });
        *core.handler.borrow_mut() = Some(Rc::clone(&handler));

        let attach = Rc::clone(&core);
        let label = format!("binder:{id}:start");
        let started = AsyncTask::start_named(
            scheduler,
            &label,
            Script::new()
                .wait(core.wait_for_binding())
                .run(move || {
                    if attach.torn_down.get() {
                        return Ok(());
                    }
                    let binding = match attach.resolve() {
                        Ok(binding) => binding,
                        Err(err) => {
                            attach.report(&err);
                            return Err(err.into());
                        }
                    };
                    binding.subscribe(Rc::clone(&handler));
                    *attach.subscribed.borrow_mut() = Some(Rc::downgrade(&binding));
                    debug!(binding = %attach.id, "binder subscribed");
                    Self::refresh(&attach);
                    Ok(())
                }),
        );

        Self { core, started }
    }

    /// Push `value` through the binding's setter
    pub fn set(&self, value: T) -> AsyncTask {
        let core = Rc::clone(&self.core);
        let pending: Rc<RefCell<Option<AsyncTask>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&pending);

        let label = format!("binder:{}:set", self.core.id);
        AsyncTask::start_named(
            &self.core.scheduler,
            &label,
            Script::new()
                .wait(self.core.wait_for_binding())
                .then({
                    let core = Rc::clone(&core);
                    move || {
                        if core.torn_down.get() {
                            return Ok(None);
                        }
                        let binding = core.resolve().inspect_err(|err| core.report(err))?;
                        let task = binding.set(value);
                        let wait = (!task.is_completed()).then(|| core.wait_for_task(&task));
                        *slot.borrow_mut() = Some(task);
                        Ok(wait.map(Yielded::Suspend))
                    }
                })
                .run(move || {
                    let Some(task) = pending.borrow_mut().take() else {
                        return Ok(());
                    };
                    if let Err(err) = task.throw_if_faulted() {
                        core.report(&err);
                    }
                    Ok(())
                }),
        )
    }

    /// Fire `on_invalidated`, then fetch and deliver in a new task
    fn refresh(core: &Rc<BinderCore<T>>) {
        if core.torn_down.get() {
            return;
        }
        if let Some(on_invalidated) = &core.hooks.on_invalidated {
            on_invalidated();
        }

        let seq = core.issued.get() + 1;
        core.issued.set(seq);

        let fetched: Rc<RefCell<Option<AsyncTask<T>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&fetched);
        let (fetcher, receiver) = (Rc::clone(core), Rc::clone(core));

        let label = format!("binder:{}:refresh", core.id);
        AsyncTask::start_named(
            &core.scheduler,
            &label,
            Script::new()
                .wait(core.wait_for_binding())
                .then(move || {
                    if fetcher.torn_down.get() {
                        return Ok(None);
                    }
                    let binding = fetcher.resolve().inspect_err(|err| fetcher.report(err))?;
                    let task = binding.get();
                    let wait = (!task.is_completed()).then(|| fetcher.wait_for_task(&task));
                    *slot.borrow_mut() = Some(task);
                    Ok(wait.map(Yielded::Suspend))
                })
                .run(move || {
                    let Some(task) = fetched.borrow_mut().take() else {
                        return Ok(());
                    };
                    if receiver.torn_down.get() || !receiver.accept(seq) {
                        return Ok(());
                    }
                    match task.result() {
                        Ok(value) => receiver.deliver(value),
                        Err(err) => receiver.report(&err),
                    }
                    Ok(())
                }),
        );
    }
}

impl<T> DataBinder<T> {
    pub fn id(&self) -> &str {
        &self.core.id
    }

    /// The task that resolves the binding and subscribes
    pub fn started(&self) -> &AsyncTask {
        &self.started
    }

    /// True once subscribed to a binding that is still alive
    pub fn is_subscribed(&self) -> bool {
        self.core
            .subscribed
            .borrow()
            .as_ref()
            .is_some_and(|b| b.strong_count() > 0)
    }

    /// Unsubscribe and stop delivering. Safe to call more than once.
    pub fn teardown(&self) {
        if self.core.torn_down.replace(true) {
            return;
        }

        let binding = self.core.subscribed.borrow_mut().take();
        let handler = self.core.handler.borrow_mut().take();
        if let (Some(binding), Some(handler)) = (binding.and_then(|b| b.upgrade()), handler) {
            binding.unsubscribe(&handler);
            debug!(binding = %self.core.id, "binder unsubscribed");
        }
    }
}

impl<T> Drop for DataBinder<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<T> fmt::Debug for DataBinder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBinder")
            .field("id", &self.core.id)
            .field("subscribed", &self.is_subscribed())
            .field("torn_down", &self.core.torn_down.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::event::Event;

    fn recorder<T: 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(T) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |v: T| sink.borrow_mut().push(v))
    }

    #[test]
    fn initial_value_is_delivered_once() {
        let scheduler = TickScheduler::default();
        let registry = ReferenceRegistry::new();
        let binding = Binding::create(
            "answer",
            || AsyncTask::wrap(42),
            |_| AsyncTask::wrap(()),
            None,
            None,
        );
        binding.register(&registry);

        let (seen, sink) = recorder::<i32>();
        let binder = DataBinder::start(&scheduler, &registry, "answer", BinderHooks::new().on_value(sink));
        scheduler.run_until_idle();

        assert_eq!(*seen.borrow(), vec![42]);
        assert!(binder.is_subscribed());
        assert_eq!(binding.subscriber_count(), 1);
    }

    #[test]
    fn waits_for_late_registration() {
        let scheduler = TickScheduler::default();
        let registry = ReferenceRegistry::new();
        let (seen, sink) = recorder::<char>();
        let _binder =
            DataBinder::start(&scheduler, &registry, "late", BinderHooks::new().on_value(sink));

        scheduler.run_ticks(5);
        assert!(seen.borrow().is_empty());

        let binding = Binding::create("late", || AsyncTask::wrap('x'), |_| AsyncTask::wrap(()), None, None);
        binding.register(&registry);
        scheduler.run_until_idle();

        assert_eq!(*seen.borrow(), vec!['x']);
    }

    #[test]
    fn every_invalidation_refreshes() {
        let scheduler = TickScheduler::default();
        let registry = ReferenceRegistry::new();
        let updated = Event::new();
        let counter = Rc::new(Cell::new(0));
        let source = Rc::clone(&counter);

        let binding = Binding::builder("count")
            .getter(move || AsyncTask::wrap(source.get()))
            .setter(|_| AsyncTask::wrap(()))
            .invalidated_by(&updated)
            .build()
            .unwrap();
        binding.register(&registry);

        let (seen, sink) = recorder::<i32>();
        let notified = Rc::new(Cell::new(0));
        let n = Rc::clone(&notified);
        let _binder = DataBinder::start(
            &scheduler,
            &registry,
            "count",
            BinderHooks::new()
                .on_value(sink)
                .on_invalidated(move || n.set(n.get() + 1)),
        );
        scheduler.run_until_idle();

        counter.set(5);
        updated.emit();
        scheduler.run_until_idle();

        assert_eq!(*seen.borrow(), vec![0, 5]);
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn teardown_stops_delivery_and_unsubscribes() {
        let scheduler = TickScheduler::default();
        let registry = ReferenceRegistry::new();
        let binding = Binding::create("n", || AsyncTask::wrap(1), |_| AsyncTask::wrap(()), None, None);
        binding.register(&registry);

        let (seen, sink) = recorder::<i32>();
        let binder = DataBinder::start(&scheduler, &registry, "n", BinderHooks::new().on_value(sink));
        scheduler.run_until_idle();

        binder.teardown();
        binder.teardown();
        assert_eq!(binding.subscriber_count(), 0);

        binding.invalidate();
        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn dropped_binder_stops_waiting_for_a_missing_binding() {
        let scheduler = TickScheduler::default();
        let registry = ReferenceRegistry::new();
        let binder = DataBinder::<i32>::start(&scheduler, &registry, "never", BinderHooks::new());
        let set = binder.set(1);
        let started = binder.started().clone();

        scheduler.run_ticks(3);
        assert_eq!(scheduler.pending(), 2);

        drop(binder);
        let report = scheduler.run_until_idle();
        assert!(report.is_idle());
        assert!(started.is_completed());
        assert!(set.is_completed());
        assert!(!set.is_faulted());
    }

    #[test]
    fn set_fault_goes_to_on_fault() {
        let scheduler = TickScheduler::default();
        let registry = ReferenceRegistry::new();
        let failing = scheduler.clone();
        let binding = Binding::create(
            "n",
            || AsyncTask::wrap(1),
            move |_: i32| {
                AsyncTask::start(
                    &failing,
                    crate::task::from_fn(|| Err(anyhow::anyhow!("read only"))),
                )
            },
            None,
            None,
        );
        binding.register(&registry);

        let (faults, sink) = recorder::<String>();
        let binder = DataBinder::start(
            &scheduler,
            &registry,
            "n",
            BinderHooks::new().on_fault(move |err: &StepError| sink(err.to_string())),
        );
        let set = binder.set(9);
        scheduler.run_until_idle();

        assert!(set.is_completed());
        assert!(!set.is_faulted());
        assert_eq!(faults.borrow().len(), 1);
        assert!(faults.borrow()[0].contains("read only"));
    }
}
