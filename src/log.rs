//! Logger proxy so embedders can swap logging backends
//!
//! The core reports through this facade; the default backend forwards to
//! `tracing`. A scheduler carries its own `Arc<dyn Logger>` (taken from the
//! process-wide slot unless injected), so tests can capture output without
//! touching global state.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::error::Fault;

/// Logging collaborator.
///
/// Captured faults go to `log_exception`; registry and binding warnings go
/// to `warning` and invalidations to `info`.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
    fn log_exception(&self, fault: &Fault);
}

/// Default backend: forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn log_exception(&self, fault: &Fault) {
        tracing::error!(error = ?fault.cause(), "{fault}");
    }
}

/// In-memory backend, mostly for tests and the demo journal
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded lines, prefixed with their level
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of faults reported through `log_exception`
    pub fn exception_count(&self) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.starts_with("exception: "))
            .count()
    }
}

impl Logger for MemoryLogger {
    fn info(&self, message: &str) {
        self.lines.lock().push(format!("info: {message}"));
    }

    fn warning(&self, message: &str) {
        self.lines.lock().push(format!("warning: {message}"));
    }

    fn error(&self, message: &str) {
        self.lines.lock().push(format!("error: {message}"));
    }

    fn log_exception(&self, fault: &Fault) {
        self.lines.lock().push(format!("exception: {fault}"));
    }
}

static LOGGER: Lazy<RwLock<Arc<dyn Logger>>> = Lazy::new(|| RwLock::new(Arc::new(TracingLogger)));

/// Current process-wide logger
pub fn logger() -> Arc<dyn Logger> {
    Arc::clone(&LOGGER.read())
}

/// Replace the process-wide logger
pub fn set_logger(logger: Arc<dyn Logger>) {
    *LOGGER.write() = logger;
}

/// Restore the `tracing` backend
pub fn reset_logger() {
    set_logger(Arc::new(TracingLogger));
}

/// Report a captured fault. A panicking backend is contained here so the
/// fault path never raises a second error.
pub(crate) fn report_fault(logger: &dyn Logger, fault: &Fault) {
    if panic::catch_unwind(AssertUnwindSafe(|| logger.log_exception(fault))).is_err() {
        tracing::warn!("logger panicked while reporting a fault");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingLogger;

    impl Logger for PanickingLogger {
        fn info(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn log_exception(&self, _: &Fault) {
            panic!("backend unavailable");
        }
    }

    #[test]
    fn report_fault_contains_backend_panics() {
        let fault = Fault::new(anyhow::anyhow!("boom"));
        report_fault(&PanickingLogger, &fault);
    }

    #[test]
    fn swapped_logger_receives_core_warnings() {
        use crate::binding::Binding;
        use crate::registry::{ReferenceRegistry, RegistryEntry};
        use crate::task::AsyncTask;
        use std::rc::Rc;

        let memory = Arc::new(MemoryLogger::new());
        set_logger(memory.clone());

        let binding = Binding::create(
            "swapped-logger",
            || AsyncTask::wrap(0),
            |_| AsyncTask::wrap(()),
            None,
            None,
        );
        binding.invalidate();
        binding.dispose();
        binding.dispose();

        let registry = ReferenceRegistry::new();
        {
            let gone = Rc::new(5u8);
            registry.register(&RegistryEntry::with_id("swapped-stale", &gone));
        }
        assert!(registry.get_by_id::<u8>("swapped-stale").unwrap().is_none());
        reset_logger();

        let lines = memory.lines();
        assert!(lines.contains(&"info: binding 'swapped-logger' invalidated".to_string()));
        assert!(lines.contains(&"warning: binding 'swapped-logger' disposed twice".to_string()));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("warning: ") && l.contains("'swapped-stale' was dropped")));
    }

    #[test]
    fn memory_logger_counts_exceptions() {
        let logger = MemoryLogger::new();
        logger.info("hello");
        logger.log_exception(&Fault::new(anyhow::anyhow!("boom")));
        logger.warning("careful");

        assert_eq!(logger.exception_count(), 1);
        assert_eq!(logger.lines()[1], "exception: boom");
    }
}
