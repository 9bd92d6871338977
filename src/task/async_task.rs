//! AsyncTask - uniform "done / failed / result" view over a step sequence
//!
//! Three construction paths share one handle type:
//! - `wrap(value)`: Immediate, completed from creation
//! - `start(scheduler, seq)`: Running, result is `()`
//! - `start_typed(scheduler, |resolver| seq)`: TypedRunning, the sequence
//!   hands its value to the resolver before finishing
//!
//! Handles are cheap to clone and share the same task, which is what makes
//! cached requests work.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Fault, StepError};
use crate::scheduler::TickScheduler;

use super::driver::TaskDriver;
use super::sequence::StepSequence;
use super::suspension::TaskWatch;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Construction path of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Immediate,
    Running,
    TypedRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Completed,
    Faulted,
}

/// Non-generic half of a task, shared with its driver and with watchers
pub(crate) struct TaskStatus {
    id: TaskId,
    label: Option<Arc<str>>,
    phase: Cell<Phase>,
    fault: RefCell<Option<Fault>>,
}

impl TaskStatus {
    fn new(label: Option<Arc<str>>, phase: Phase) -> Rc<Self> {
        Rc::new(Self {
            id: TaskId::next(),
            label,
            phase: Cell::new(phase),
            fault: RefCell::new(None),
        })
    }

    pub(crate) fn running(label: Option<Arc<str>>) -> Rc<Self> {
        Self::new(label, Phase::Running)
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn label(&self) -> Option<Arc<str>> {
        self.label.clone()
    }

    /// Label if present, else the id
    pub(crate) fn name(&self) -> String {
        match &self.label {
            Some(label) => label.to_string(),
            None => self.id.to_string(),
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.phase.get() != Phase::Running
    }

    pub(crate) fn is_faulted(&self) -> bool {
        self.phase.get() == Phase::Faulted
    }

    /// Record the fault. Only the first one sticks; returns whether this call
    /// recorded it.
    pub(crate) fn fault_with(&self, fault: Fault) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self.fault.borrow_mut() = Some(fault);
        self.phase.set(Phase::Faulted);
        true
    }

    pub(crate) fn complete(&self) {
        if self.phase.get() == Phase::Running {
            self.phase.set(Phase::Completed);
        }
    }

    fn fault(&self) -> Option<Fault> {
        self.fault.borrow().clone()
    }
}

/// Handle given to a typed sequence for publishing its value
pub struct Resolver<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Resolver<T> {
    /// Set (or overwrite) the task's result
    pub fn set(&self, value: T) {
        *self.slot.borrow_mut() = Some(value);
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

/// Asynchronous request with fault capture and a typed result
pub struct AsyncTask<T = ()> {
    status: Rc<TaskStatus>,
    kind: TaskKind,
    value: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for AsyncTask<T> {
    fn clone(&self) -> Self {
        Self {
            status: Rc::clone(&self.status),
            kind: self.kind,
            value: Rc::clone(&self.value),
        }
    }
}

impl AsyncTask<()> {
    /// Start driving `sequence`; the scheduler takes the first step next tick
    pub fn start(scheduler: &TickScheduler, sequence: impl StepSequence + 'static) -> Self {
        Self::launch(scheduler, None, TaskKind::Running, Some(()), sequence)
    }

    pub fn start_named(
        scheduler: &TickScheduler,
        label: &str,
        sequence: impl StepSequence + 'static,
    ) -> Self {
        Self::launch(scheduler, Some(label.into()), TaskKind::Running, Some(()), sequence)
    }
}

impl<T: 'static> AsyncTask<T> {
    /// Already-completed task holding `value`
    pub fn wrap(value: T) -> Self {
        Self {
            status: TaskStatus::new(None, Phase::Completed),
            kind: TaskKind::Immediate,
            value: Rc::new(RefCell::new(Some(value))),
        }
    }

    /// Start a value-producing sequence. `routine` receives the resolver the
    /// sequence must call before it finishes.
    pub fn start_typed<S, F>(scheduler: &TickScheduler, routine: F) -> Self
    where
        S: StepSequence + 'static,
        F: FnOnce(Resolver<T>) -> S,
    {
        Self::launch_typed(scheduler, None, routine)
    }

    pub fn start_typed_named<S, F>(scheduler: &TickScheduler, label: &str, routine: F) -> Self
    where
        S: StepSequence + 'static,
        F: FnOnce(Resolver<T>) -> S,
    {
        Self::launch_typed(scheduler, Some(label.into()), routine)
    }

    fn launch_typed<S, F>(scheduler: &TickScheduler, label: Option<Arc<str>>, routine: F) -> Self
    where
        S: StepSequence + 'static,
        F: FnOnce(Resolver<T>) -> S,
    {
        let value = Rc::new(RefCell::new(None));
        let resolver = Resolver {
            slot: Rc::clone(&value),
        };
        let sequence = routine(resolver);
        let status = TaskStatus::running(label);
        scheduler.spawn(Box::new(TaskDriver::new(Rc::clone(&status), Box::new(sequence))));
        Self {
            status,
            kind: TaskKind::TypedRunning,
            value,
        }
    }

    fn launch(
        scheduler: &TickScheduler,
        label: Option<Arc<str>>,
        kind: TaskKind,
        initial: Option<T>,
        sequence: impl StepSequence + 'static,
    ) -> Self {
        let status = TaskStatus::running(label);
        scheduler.spawn(Box::new(TaskDriver::new(Rc::clone(&status), Box::new(sequence))));
        Self {
            status,
            kind,
            value: Rc::new(RefCell::new(initial)),
        }
    }
}

impl<T> AsyncTask<T> {
    pub fn id(&self) -> TaskId {
        self.status.id()
    }

    pub fn label(&self) -> Option<Arc<str>> {
        self.status.label()
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// True once a fault was captured; never resets
    pub fn is_faulted(&self) -> bool {
        self.status.is_faulted()
    }

    /// True once the sequence finished or faulted
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        !self.status.is_terminal()
    }

    /// The captured fault, if any
    pub fn fault(&self) -> Option<Fault> {
        self.status.fault()
    }

    /// Fail with the fault if faulted, or `NotReady` if still running
    pub fn throw_if_faulted(&self) -> Result<(), StepError> {
        if let Some(fault) = self.status.fault() {
            return Err(StepError::Faulted {
                task: self.status.name(),
                source: fault,
            });
        }
        if !self.status.is_terminal() {
            return Err(StepError::NotReady {
                task: self.status.name(),
            });
        }
        Ok(())
    }

    /// Read the result.
    ///
    /// Fails with `NotReady` before completion and re-raises the fault after
    /// one, never handing out a stale value.
    pub fn result(&self) -> Result<T, StepError>
    where
        T: Clone,
    {
        self.throw_if_faulted()?;
        self.value
            .borrow()
            .clone()
            .ok_or_else(|| StepError::ResultNeverSet {
                task: self.status.name(),
            })
    }

    /// Watch handle for `Suspension::Task`
    pub fn watch(&self) -> TaskWatch {
        TaskWatch::new(Rc::clone(&self.status))
    }
}

impl<T> fmt::Debug for AsyncTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("task", &self.status.name())
            .field("kind", &self.kind)
            .field("completed", &self.is_completed())
            .field("faulted", &self.is_faulted())
            .finish()
    }
}
