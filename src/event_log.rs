//! Runtime journal
//!
//! Append-only record of task, registry and binding lifecycle events.
//! - Event: envelope with id + tick + kind
//! - EventKind: task / registry / binding variants
//! - EventLog: cheap-to-clone shared log, stamped with the scheduler tick

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Scheduler tick the event happened on
    pub tick: u64,
    /// Event type and data
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // TASKS
    // ═══════════════════════════════════════════
    TaskStarted {
        task_id: u64,
        label: Option<Arc<str>>,
    },
    TaskCompleted {
        task_id: u64,
        steps: u64,
    },
    /// Recorded once per task, however deep the failing sequence was
    TaskFaulted {
        task_id: u64,
        error: String,
        depth: usize,
    },

    // ═══════════════════════════════════════════
    // REGISTRY
    // ═══════════════════════════════════════════
    EntryRegistered {
        id: Option<Arc<str>>,
        type_name: Arc<str>,
    },
    EntryUnregistered {
        id: Option<Arc<str>>,
        type_name: Arc<str>,
    },
    /// Target dropped while still registered
    StaleEntry {
        id: Option<Arc<str>>,
        type_name: Arc<str>,
    },

    // ═══════════════════════════════════════════
    // BINDINGS
    // ═══════════════════════════════════════════
    BindingInvalidated {
        binding_id: Arc<str>,
        subscribers: usize,
    },
    BindingDisposed {
        binding_id: Arc<str>,
    },
}

impl EventKind {
    /// Extract the task id if the event is task-related
    pub fn task_id(&self) -> Option<u64> {
        match self {
            Self::TaskStarted { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFaulted { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }

    /// Extract the binding id if the event is binding-related
    pub fn binding_id(&self) -> Option<&str> {
        match self {
            Self::BindingInvalidated { binding_id, .. } | Self::BindingDisposed { binding_id } => {
                Some(binding_id)
            }
            _ => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::TaskFaulted { .. })
    }
}

/// Shared, append-only journal
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    next_id: Arc<AtomicU64>,
    tick: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event (returns its ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            tick: self.tick.load(Ordering::SeqCst),
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Stamp subsequent events with `tick`
    pub fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::SeqCst);
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events for a single task
    pub fn filter_task(&self, task_id: u64) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .collect()
    }

    /// Events for a single binding
    pub fn filter_binding(&self, binding_id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.binding_id() == Some(binding_id))
            .collect()
    }

    /// Number of faults recorded so far
    pub fn fault_count(&self) -> usize {
        self.events.read().iter().filter(|e| e.kind.is_fault()).count()
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eventkind_ids() {
        let started = EventKind::TaskStarted {
            task_id: 7,
            label: Some("load".into()),
        };
        assert_eq!(started.task_id(), Some(7));
        assert_eq!(started.binding_id(), None);

        let disposed = EventKind::BindingDisposed {
            binding_id: "BoundString".into(),
        };
        assert_eq!(disposed.binding_id(), Some("BoundString"));
        assert_eq!(disposed.task_id(), None);
    }

    #[test]
    fn eventkind_serializes_with_type_tag() {
        let kind = EventKind::TaskFaulted {
            task_id: 3,
            error: "example error".into(),
            depth: 2,
        };

        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "task_faulted");
        assert_eq!(json["task_id"], 3);
        assert_eq!(json["depth"], 2);
    }

    #[test]
    fn eventkind_deserializes_from_tagged_json() {
        let json = json!({
            "type": "entry_registered",
            "id": "BoundString",
            "type_name": "Binding<String>"
        });

        let kind: EventKind = serde_json::from_value(json).unwrap();
        assert_eq!(
            kind,
            EventKind::EntryRegistered {
                id: Some("BoundString".into()),
                type_name: "Binding<String>".into(),
            }
        );
    }

    #[test]
    fn emit_returns_monotonic_ids_and_stamps_tick() {
        let log = EventLog::new();

        let first = log.emit(EventKind::TaskStarted { task_id: 0, label: None });
        log.set_tick(4);
        let second = log.emit(EventKind::TaskCompleted { task_id: 0, steps: 2 });

        assert_eq!((first, second), (0, 1));
        let events = log.events();
        assert_eq!(events[0].tick, 0);
        assert_eq!(events[1].tick, 4);
    }

    #[test]
    fn filters_by_task_and_counts_faults() {
        let log = EventLog::new();
        log.emit(EventKind::TaskStarted { task_id: 1, label: None });
        log.emit(EventKind::TaskStarted { task_id: 2, label: None });
        log.emit(EventKind::TaskFaulted {
            task_id: 1,
            error: "boom".into(),
            depth: 0,
        });

        assert_eq!(log.filter_task(1).len(), 2);
        assert_eq!(log.filter_task(2).len(), 1);
        assert_eq!(log.fault_count(), 1);
    }

    #[test]
    fn clones_share_storage() {
        let log = EventLog::new();
        let cloned = log.clone();

        log.emit(EventKind::BindingInvalidated {
            binding_id: "x".into(),
            subscribers: 2,
        });
        assert_eq!(cloned.len(), 1);
        assert_eq!(cloned.filter_binding("x").len(), 1);
        assert!(cloned.to_json().is_array());
    }
}
