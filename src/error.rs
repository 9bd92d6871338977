//! Error types with fix suggestions
//!
//! `StepError` covers the three subsystems (tasks, registry, bindings) plus the
//! ambient config/IO layer. `Fault` is the captured error of a failed task.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// The first error raised inside a driven step sequence.
///
/// Cloning shares the original error, so identity survives being re-raised
/// from any number of `result()` reads.
#[derive(Clone)]
pub struct Fault(Arc<anyhow::Error>);

impl Fault {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The original error as raised by the sequence
    pub fn cause(&self) -> &anyhow::Error {
        &self.0
    }

    /// Downcast the original error to a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True when both faults carry the very same captured error
    pub fn ptr_eq(&self, other: &Fault) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fault").field(&self.0).finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Error, Debug)]
pub enum StepError {
    // ─────────────────────────────────────────────────────────────
    // Task errors (STEP-010 to STEP-012)
    // ─────────────────────────────────────────────────────────────

    #[error("STEP-010: Result of task '{task}' read before the task completed")]
    NotReady { task: String },

    #[error("STEP-011: Task '{task}' is faulted: {source}")]
    Faulted {
        task: String,
        #[source]
        source: Fault,
    },

    #[error("STEP-012: Task '{task}' completed without setting a result")]
    ResultNeverSet { task: String },

    // ─────────────────────────────────────────────────────────────
    // Registry integrity errors (STEP-020 to STEP-022)
    // ─────────────────────────────────────────────────────────────

    #[error("STEP-020: Reference '{id}' is a {actual}, not a {expected}")]
    RegistryCast {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("STEP-021: {count} references registered for type {type_name}, expected at most one")]
    RegistryAmbiguous { type_name: &'static str, count: usize },

    #[error("STEP-022: No reference registered for '{key}'")]
    NotFound { key: String },

    // ─────────────────────────────────────────────────────────────
    // Binding errors (STEP-030 to STEP-031)
    // ─────────────────────────────────────────────────────────────

    #[error("STEP-030: Binding '{id}' was disposed")]
    BindingDisposed { id: String },

    #[error("STEP-031: Binding '{id}' has no {missing}")]
    IncompleteBinding { id: String, missing: &'static str },

    // ─────────────────────────────────────────────────────────────
    // Ambient errors
    // ─────────────────────────────────────────────────────────────

    #[error("Config error: {0}")]
    Config(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    /// The captured fault, when this error re-raises one
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            StepError::Faulted { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl FixSuggestion for StepError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            StepError::NotReady { .. } => {
                Some("Wait on the task (Suspension::task) or check is_completed() before reading")
            }
            StepError::Faulted { .. } => Some("Check is_faulted() and start a new task to retry"),
            StepError::ResultNeverSet { .. } => {
                Some("Call the resolver exactly once before the sequence finishes")
            }
            StepError::RegistryCast { .. } => {
                Some("Register the target under a distinct id or request the registered type")
            }
            StepError::RegistryAmbiguous { .. } => {
                Some("Look the reference up by id, or register a single instance of the type")
            }
            StepError::NotFound { .. } => {
                Some("Wait for the reference (DynamicRef::wait) before reading it")
            }
            StepError::BindingDisposed { .. } => {
                Some("Tear consumers down before the binding owner disposes it")
            }
            StepError::IncompleteBinding { .. } => {
                Some("Give the builder both a getter and a setter before build()")
            }
            StepError::Config(_) => Some("Check the config values (max_ticks must be > 0)"),
            StepError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            StepError::Json(_) => Some("Check that journal events are serializable"),
            StepError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
