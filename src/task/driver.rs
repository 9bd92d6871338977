//! Task driver - recursive fault capture over a tree of sequences
//!
//! The driver keeps the active chain: the root sequence plus at most one
//! active child per level. Every resume steps the deepest sequence, so a
//! parent never advances past a child that has not finished. The task's
//! status is the single fault slot for the whole tree.

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Fault;
use crate::event_log::{EventKind, EventLog};
use crate::log::{self, Logger};

use super::async_task::{TaskId, TaskStatus};
use super::sequence::{BoxSequence, Step, Yielded};
use super::suspension::Suspension;

/// What a resume hands back to the scheduler
#[derive(Debug)]
pub enum DriveOutcome {
    /// Wait for this before resuming again
    Suspended(Suspension),
    /// Completed or faulted; never resume again
    Finished,
}

/// Collaborators a driver reports to while resuming
pub struct DriveContext<'a> {
    pub logger: &'a dyn Logger,
    pub journal: Option<&'a EventLog>,
}

/// Anything the scheduler can resume
pub trait Drive {
    fn task_id(&self) -> TaskId;

    fn label(&self) -> Option<Arc<str>> {
        None
    }

    /// Advance until the next suspension or the end
    fn resume(&mut self, ctx: &DriveContext<'_>) -> DriveOutcome;
}

pub(crate) struct TaskDriver {
    status: Rc<TaskStatus>,
    chain: Vec<BoxSequence>,
    steps: u64,
}

impl TaskDriver {
    pub(crate) fn new(status: Rc<TaskStatus>, root: BoxSequence) -> Self {
        Self {
            status,
            chain: vec![root],
            steps: 0,
        }
    }

    fn fail(&mut self, error: anyhow::Error, ctx: &DriveContext<'_>) -> DriveOutcome {
        let depth = self.chain.len().saturating_sub(1);
        // Nothing in the tree runs after a fault
        self.chain.clear();

        let fault = Fault::new(error);
        if self.status.fault_with(fault.clone()) {
            log::report_fault(ctx.logger, &fault);
            if let Some(journal) = ctx.journal {
                journal.emit(EventKind::TaskFaulted {
                    task_id: self.status.id().0,
                    error: fault.to_string(),
                    depth,
                });
            }
        }
        DriveOutcome::Finished
    }

    fn finish(&mut self, ctx: &DriveContext<'_>) -> DriveOutcome {
        self.status.complete();
        debug!(task = %self.status.name(), steps = self.steps, "task completed");
        if let Some(journal) = ctx.journal {
            journal.emit(EventKind::TaskCompleted {
                task_id: self.status.id().0,
                steps: self.steps,
            });
        }
        DriveOutcome::Finished
    }
}

impl Drive for TaskDriver {
    fn task_id(&self) -> TaskId {
        self.status.id()
    }

    fn label(&self) -> Option<Arc<str>> {
        self.status.label()
    }

    fn resume(&mut self, ctx: &DriveContext<'_>) -> DriveOutcome {
        if self.status.is_terminal() {
            return DriveOutcome::Finished;
        }

        loop {
            let Some(current) = self.chain.last_mut() else {
                return self.finish(ctx);
            };
            let step = current.step();
            self.steps += 1;

            match step {
                Err(error) => return self.fail(error, ctx),
                Ok(Step::Done) => {
                    // Child finished: its parent continues in this same resume
                    self.chain.pop();
                }
                Ok(Step::Yield(Yielded::Nested(child))) => {
                    trace!(task = %self.status.name(), depth = self.chain.len(), "entering nested sequence");
                    self.chain.push(child);
                }
                Ok(Step::Yield(Yielded::Suspend(suspension))) => {
                    return DriveOutcome::Suspended(suspension);
                }
            }
        }
    }
}
