//! Task Module - cooperative asynchronous requests
//!
//! - `sequence`: the `StepSequence` trait plus `from_fn` / `Script` builders
//! - `suspension`: wait conditions handed to the scheduler
//! - `async_task`: `AsyncTask<T>` handle (Immediate / Running / TypedRunning)
//! - `driver`: recursive fault capture over a tree of nested sequences
//!
//! Data flow:
//! ```text
//! StepSequence ──start──▶ TaskDriver (owned by scheduler)
//!                              │ resume each tick
//!                              ▼
//!                   TaskStatus (shared fault slot) ◀── AsyncTask handle(s)
//! ```

mod async_task;
mod driver;
mod sequence;
mod suspension;

pub use async_task::{AsyncTask, Resolver, TaskId, TaskKind};
pub use driver::{Drive, DriveContext, DriveOutcome};
pub use sequence::{from_fn, BoxSequence, FnSequence, Script, Step, StepSequence, Yielded};
pub use suspension::{Suspension, TaskWatch};
