//! TickScheduler - single-threaded, step-driven host loop
//!
//! Owns the drivers of started tasks and resumes them once per tick when
//! their suspension is satisfied. Tasks started during a tick take their
//! first step on the following tick. All state lives behind `Rc`, so the
//! scheduler, its tasks and everything they touch stay on one thread.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;
use crate::event_log::{EventKind, EventLog};
use crate::log::{self, Logger};
use crate::task::{Drive, DriveContext, DriveOutcome, Suspension, TaskId, TaskWatch};

/// Summary of a bounded run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Ticks executed by this run
    pub ticks: u64,
    /// Tasks still pending when the run stopped
    pub pending: usize,
}

impl RunReport {
    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }
}

enum Wait {
    Ready,
    UntilTick(u64),
    Task(TaskWatch),
    Until(Box<dyn FnMut() -> bool>),
}

impl Wait {
    fn from_suspension(suspension: Suspension, now: u64) -> Self {
        match suspension {
            Suspension::NextTick => Wait::UntilTick(now + 1),
            Suspension::Ticks(n) => Wait::UntilTick(now + u64::from(n.max(1))),
            Suspension::Task(watch) => Wait::Task(watch),
            Suspension::Until(predicate) => Wait::Until(predicate),
        }
    }

    fn is_satisfied(&mut self, now: u64) -> bool {
        match self {
            Wait::Ready => true,
            Wait::UntilTick(at) => now >= *at,
            Wait::Task(watch) => watch.is_terminal(),
            Wait::Until(predicate) => predicate(),
        }
    }
}

struct Job {
    driver: Box<dyn Drive>,
    wait: Wait,
}

struct Inner {
    config: RuntimeConfig,
    logger: Arc<dyn Logger>,
    journal: Option<EventLog>,
    tick: Cell<u64>,
    /// Jobs eligible on the current tick, in start order
    jobs: RefCell<Vec<Job>>,
    /// Jobs spawned since the last tick began
    incoming: RefCell<Vec<Job>>,
}

/// Cheap-to-clone handle to the host step loop
#[derive(Clone)]
pub struct TickScheduler {
    inner: Rc<Inner>,
}

impl TickScheduler {
    /// Scheduler reporting faults to the process-wide logger
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_logger(config, log::logger())
    }

    pub fn with_logger(config: RuntimeConfig, logger: Arc<dyn Logger>) -> Self {
        let journal = config.journal.then(EventLog::new);
        Self {
            inner: Rc::new(Inner {
                config,
                logger,
                journal,
                tick: Cell::new(0),
                jobs: RefCell::new(Vec::new()),
                incoming: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        Arc::clone(&self.inner.logger)
    }

    /// Journal, when enabled in the config
    pub fn journal(&self) -> Option<&EventLog> {
        self.inner.journal.as_ref()
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.tick.get()
    }

    /// Tasks not yet finished
    pub fn pending(&self) -> usize {
        self.inner.jobs.borrow().len() + self.inner.incoming.borrow().len()
    }

    /// Hand a driver to the loop; it is first resumed on the next tick
    pub fn spawn(&self, driver: Box<dyn Drive>) -> TaskId {
        let id = driver.task_id();
        if let Some(journal) = &self.inner.journal {
            journal.emit(EventKind::TaskStarted {
                task_id: id.0,
                label: driver.label(),
            });
        }
        trace!(task = %id, "task spawned");
        self.inner.incoming.borrow_mut().push(Job {
            driver,
            wait: Wait::Ready,
        });
        id
    }

    /// Advance one tick; returns how many tasks were resumed
    pub fn tick(&self) -> usize {
        let now = self.inner.tick.get() + 1;
        self.inner.tick.set(now);
        if let Some(journal) = &self.inner.journal {
            journal.set_tick(now);
        }

        // Take the queues so drivers can spawn while we iterate
        let mut jobs = mem::take(&mut *self.inner.jobs.borrow_mut());
        jobs.append(&mut self.inner.incoming.borrow_mut());

        let ctx = DriveContext {
            logger: self.inner.logger.as_ref(),
            journal: self.inner.journal.as_ref(),
        };

        let mut kept = Vec::with_capacity(jobs.len());
        let mut resumed = 0;
        for mut job in jobs {
            if !job.wait.is_satisfied(now) {
                kept.push(job);
                continue;
            }
            resumed += 1;
            match job.driver.resume(&ctx) {
                DriveOutcome::Suspended(suspension) => {
                    job.wait = Wait::from_suspension(suspension, now);
                    kept.push(job);
                }
                DriveOutcome::Finished => {}
            }
        }

        let mut slot = self.inner.jobs.borrow_mut();
        // A nested tick() from inside a driver may have left jobs behind
        kept.append(&mut slot);
        *slot = kept;
        resumed
    }

    /// Run exactly `n` ticks
    pub fn run_ticks(&self, n: u64) -> RunReport {
        for _ in 0..n {
            self.tick();
        }
        RunReport {
            ticks: n,
            pending: self.pending(),
        }
    }

    /// Tick until `done` holds or `max_ticks` ticks have run. Returns whether
    /// `done` held.
    pub fn run_until<F>(&self, mut done: F, max_ticks: u64) -> bool
    where
        F: FnMut() -> bool,
    {
        for _ in 0..max_ticks {
            if done() {
                return true;
            }
            self.tick();
        }
        done()
    }

    /// Tick until no task is pending, bounded by `config.max_ticks`
    pub fn run_until_idle(&self) -> RunReport {
        let max = self.inner.config.max_ticks;
        let mut ticks = 0;
        while self.pending() > 0 && ticks < max {
            self.tick();
            ticks += 1;
        }
        let report = RunReport {
            ticks,
            pending: self.pending(),
        };
        if report.is_idle() {
            debug!(ticks, "scheduler idle");
        } else {
            warn!(ticks, pending = report.pending, "tick budget exhausted with tasks pending");
        }
        report
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("tick", &self.current_tick())
            .field("pending", &self.pending())
            .finish()
    }
}
