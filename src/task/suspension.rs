//! Suspension tokens - what a sequence asks the scheduler to wait for

use std::fmt;
use std::rc::Rc;

use super::async_task::{AsyncTask, TaskStatus};

/// Wait condition yielded by a step sequence.
///
/// Opaque to the task; interpreted by the scheduler.
pub enum Suspension {
    /// Resume on the next tick
    NextTick,
    /// Resume after this many ticks (0 behaves like `NextTick`)
    Ticks(u32),
    /// Resume once the watched task is completed or faulted
    Task(TaskWatch),
    /// Re-check every tick; resume once the predicate holds
    Until(Box<dyn FnMut() -> bool>),
}

impl Suspension {
    /// Wait for another task to reach a terminal state
    pub fn task<T>(task: &AsyncTask<T>) -> Self {
        Suspension::Task(task.watch())
    }

    pub fn until<F>(predicate: F) -> Self
    where
        F: FnMut() -> bool + 'static,
    {
        Suspension::Until(Box::new(predicate))
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspension::NextTick => f.write_str("NextTick"),
            Suspension::Ticks(n) => f.debug_tuple("Ticks").field(n).finish(),
            Suspension::Task(watch) => f.debug_tuple("Task").field(watch).finish(),
            Suspension::Until(_) => f.write_str("Until(..)"),
        }
    }
}

/// Type-erased view of a task's terminal state
#[derive(Clone)]
pub struct TaskWatch {
    status: Rc<TaskStatus>,
}

impl TaskWatch {
    pub(crate) fn new(status: Rc<TaskStatus>) -> Self {
        Self { status }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl fmt::Debug for TaskWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWatch")
            .field("task", &self.status.name())
            .field("terminal", &self.is_terminal())
            .finish()
    }
}
