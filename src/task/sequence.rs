//! Step sequences - resumable computations advanced one step at a time
//!
//! A sequence is the unit the scheduler drives. Each `step` either yields
//! (a nested sequence to run to completion first, or a suspension the
//! scheduler waits on), reports `Done`, or fails with an error that becomes
//! the task's fault.

use std::collections::VecDeque;
use std::fmt;

use super::suspension::Suspension;

/// Boxed sequence, as stored in a task's active chain
pub type BoxSequence = Box<dyn StepSequence>;

/// What a step hands back to the driver besides completion
pub enum Yielded {
    /// Run this sequence to completion (depth-first) before resuming the parent
    Nested(BoxSequence),
    /// Forward to the scheduler and resume once it is satisfied
    Suspend(Suspension),
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yielded::Nested(_) => f.write_str("Nested(..)"),
            Yielded::Suspend(s) => f.debug_tuple("Suspend").field(s).finish(),
        }
    }
}

impl From<Suspension> for Yielded {
    fn from(suspension: Suspension) -> Self {
        Yielded::Suspend(suspension)
    }
}

/// Outcome of advancing a sequence once
#[derive(Debug)]
pub enum Step {
    Yield(Yielded),
    Done,
}

impl Step {
    pub fn done() -> Self {
        Step::Done
    }

    pub fn wait(suspension: Suspension) -> Self {
        Step::Yield(Yielded::Suspend(suspension))
    }

    pub fn next_tick() -> Self {
        Self::wait(Suspension::NextTick)
    }

    pub fn nested(sequence: impl StepSequence + 'static) -> Self {
        Step::Yield(Yielded::Nested(Box::new(sequence)))
    }
}

/// A resumable computation
pub trait StepSequence {
    /// Advance once. Errors are terminal for the owning task.
    fn step(&mut self) -> anyhow::Result<Step>;
}

/// Sequence backed by a closure that keeps its own state
pub struct FnSequence<F> {
    f: F,
}

impl<F> StepSequence for FnSequence<F>
where
    F: FnMut() -> anyhow::Result<Step>,
{
    fn step(&mut self) -> anyhow::Result<Step> {
        (self.f)()
    }
}

/// Build a sequence from a closure called once per step
pub fn from_fn<F>(f: F) -> FnSequence<F>
where
    F: FnMut() -> anyhow::Result<Step>,
{
    FnSequence { f }
}

type Stage = Box<dyn FnOnce() -> anyhow::Result<Option<Yielded>>>;

/// Ordered list of stages, each run exactly once.
///
/// A stage returning `Ok(Some(y))` yields `y`; `Ok(None)` falls through to
/// the next stage within the same step. The script is done once every stage
/// has run.
#[derive(Default)]
pub struct Script {
    stages: VecDeque<Stage>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn then<F>(mut self, stage: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Option<Yielded>> + 'static,
    {
        self.stages.push_back(Box::new(stage));
        self
    }

    /// Append a stage that only suspends
    pub fn wait(self, suspension: Suspension) -> Self {
        self.then(move || Ok(Some(Yielded::Suspend(suspension))))
    }

    /// Append a nested sequence
    pub fn nest(self, sequence: impl StepSequence + 'static) -> Self {
        self.then(move || Ok(Some(Yielded::Nested(Box::new(sequence)))))
    }

    /// Append a stage that runs `f` and does not yield
    pub fn run<F>(self, f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.then(move || f().map(|()| None))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl StepSequence for Script {
    fn step(&mut self) -> anyhow::Result<Step> {
        while let Some(stage) = self.stages.pop_front() {
            if let Some(yielded) = stage()? {
                return Ok(Step::Yield(yielded));
            }
        }
        Ok(Step::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn from_fn_counts_down() {
        let mut left = 2;
        let mut seq = from_fn(move || {
            if left == 0 {
                return Ok(Step::done());
            }
            left -= 1;
            Ok(Step::next_tick())
        });

        assert!(matches!(seq.step().unwrap(), Step::Yield(_)));
        assert!(matches!(seq.step().unwrap(), Step::Yield(_)));
        assert!(matches!(seq.step().unwrap(), Step::Done));
    }

    #[test]
    fn script_falls_through_non_yielding_stages() {
        let hits = Rc::new(Cell::new(0));
        let (a, b) = (Rc::clone(&hits), Rc::clone(&hits));

        let mut script = Script::new()
            .run(move || {
                a.set(a.get() + 1);
                Ok(())
            })
            .wait(Suspension::Ticks(2))
            .run(move || {
                b.set(b.get() + 10);
                Ok(())
            });
        assert_eq!(script.len(), 3);

        match script.step().unwrap() {
            Step::Yield(Yielded::Suspend(Suspension::Ticks(2))) => {}
            other => panic!("unexpected step: {other:?}"),
        }
        assert_eq!(hits.get(), 1);

        assert!(matches!(script.step().unwrap(), Step::Done));
        assert_eq!(hits.get(), 11);
        assert!(script.is_empty());
    }

    #[test]
    fn script_stage_error_propagates() {
        let mut script = Script::new().run(|| Err(anyhow::anyhow!("stage failed")));
        let err = script.step().unwrap_err();
        assert_eq!(err.to_string(), "stage failed");
    }
}
