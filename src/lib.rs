//! stepbind - cooperative async requests, late-binding references and data
//! bindings driven by a tick scheduler

pub mod binding;
pub mod config;
pub mod demo;
pub mod error;
pub mod event_log;
pub mod log;
pub mod registry;
pub mod scheduler;
pub mod task;

pub use binding::{BinderHooks, Binding, BindingSet, BindingState, DataBinder, Event, Listener};
pub use config::{InvalidationPolicy, RuntimeConfig};
pub use error::{Fault, FixSuggestion, StepError};
pub use event_log::{EventKind, EventLog};
pub use log::{Logger, MemoryLogger, TracingLogger};
pub use registry::{DynamicRef, ReferenceRegistry, RegistryEntry};
pub use scheduler::{RunReport, TickScheduler};
pub use task::{AsyncTask, Script, Step, StepSequence, Suspension, TaskId, TaskKind};
