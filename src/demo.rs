//! Demo scenarios run by the `stepbind` CLI
//!
//! `ExampleModel` plays the owner of some data: slow getters and setters,
//! a cached request, a request that fails, and a bound string exposed to
//! consumers. Each scenario drives a fresh scheduler and registry and
//! returns what it observed as plain lines.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::binding::{BinderHooks, Binding, BindingSet, DataBinder, Event};
use crate::config::RuntimeConfig;
use crate::error::StepError;
use crate::registry::{DynamicRef, ReferenceRegistry, RegistryEntry};
use crate::scheduler::{RunReport, TickScheduler};
use crate::task::{AsyncTask, Script, Suspension};

/// Id the example string binding is registered under
pub const BOUND_STRING: &str = "BoundString";

/// Ticks the example's slow operations take
const SLOW_TICKS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Owner exposes a bound string; a consumer reads and writes it
    Binding,
    /// A request that faults after one step
    Fault,
    /// Id and type lookups, including the integrity errors
    Registry,
    /// Slow typed request next to a cached one
    Cached,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Binding => "binding",
            Scenario::Fault => "fault",
            Scenario::Registry => "registry",
            Scenario::Cached => "cached",
        };
        f.write_str(name)
    }
}

/// What a scenario printed and how the scheduler ended up
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub lines: Vec<String>,
    pub report: RunReport,
    pub journal: Option<Value>,
}

/// Data owner used by every scenario
pub struct ExampleModel {
    scheduler: TickScheduler,
    text: Rc<RefCell<String>>,
    text_updated: Event,
    cached: RefCell<Option<AsyncTask<i32>>>,
}

impl ExampleModel {
    pub fn new(scheduler: &TickScheduler, text: &str) -> Rc<Self> {
        Rc::new(Self {
            scheduler: scheduler.clone(),
            text: Rc::new(RefCell::new(text.to_string())),
            text_updated: Event::new(),
            cached: RefCell::new(None),
        })
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    /// Fires after `set_string` changed the text
    pub fn text_updated(&self) -> &Event {
        &self.text_updated
    }

    pub fn get_int(&self) -> AsyncTask<i32> {
        AsyncTask::start_typed_named(&self.scheduler, "get_int", |resolver| {
            Script::new().wait(Suspension::Ticks(SLOW_TICKS)).run(move || {
                resolver.set(123);
                Ok(())
            })
        })
    }

    pub fn set_int(&self, value: i32) -> AsyncTask {
        AsyncTask::start_named(
            &self.scheduler,
            "set_int",
            Script::new().wait(Suspension::Ticks(SLOW_TICKS)).run(move || {
                tracing::debug!(value, "set_int stored");
                Ok(())
            }),
        )
    }

    /// Every call hands out the same task
    pub fn cached_get_int(&self) -> AsyncTask<i32> {
        self.cached
            .borrow_mut()
            .get_or_insert_with(|| AsyncTask::wrap(123))
            .clone()
    }

    /// Steps once, then fails
    pub fn get_error(&self) -> AsyncTask<String> {
        AsyncTask::start_typed_named(&self.scheduler, "get_error", |_resolver| {
            Script::new()
                .wait(Suspension::NextTick)
                .run(|| Err(anyhow::anyhow!("example error")))
        })
    }

    pub fn get_string(&self) -> AsyncTask<String> {
        AsyncTask::wrap(self.text())
    }

    /// Store `value` on the next tick and announce the change
    pub fn set_string(&self, value: String) -> AsyncTask {
        let text = Rc::clone(&self.text);
        let updated = self.text_updated.clone();
        AsyncTask::start_named(
            &self.scheduler,
            "set_string",
            Script::new().wait(Suspension::NextTick).run(move || {
                *text.borrow_mut() = value;
                updated.emit();
                Ok(())
            }),
        )
    }

    /// Expose the bound string through `set`
    pub fn expose_bindings(self: &Rc<Self>, set: &mut BindingSet) -> Result<(), StepError> {
        let (getter, setter) = (Rc::clone(self), Rc::clone(self));
        let binding = Binding::builder(BOUND_STRING)
            .getter(move || getter.get_string())
            .setter(move |value| setter.set_string(value))
            .invalidated_by(&self.text_updated)
            .policy_from(self.scheduler.config())
            .build()?;
        set.expose(binding);
        Ok(())
    }
}

impl fmt::Debug for ExampleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExampleModel")
            .field("text", &self.text())
            .finish()
    }
}

type Lines = Rc<RefCell<Vec<String>>>;

fn push(lines: &Lines, line: impl Into<String>) {
    lines.borrow_mut().push(line.into());
}

/// Run `scenario` on a fresh scheduler and registry
pub fn run(scenario: Scenario, config: RuntimeConfig) -> Result<ScenarioOutcome, StepError> {
    config.validate()?;
    let scheduler = TickScheduler::new(config);
    let registry = match scheduler.journal() {
        Some(journal) => ReferenceRegistry::with_journal(journal.clone()),
        None => ReferenceRegistry::new(),
    };
    let lines: Lines = Rc::default();

    tracing::info!(%scenario, "running scenario");
    let report = match scenario {
        Scenario::Binding => binding(&scheduler, &registry, &lines)?,
        Scenario::Fault => fault(&scheduler, &registry, &lines),
        Scenario::Registry => registry_lookups(&scheduler, &registry, &lines),
        Scenario::Cached => cached(&scheduler, &lines)?,
    };

    let lines = lines.borrow().clone();
    Ok(ScenarioOutcome {
        lines,
        report,
        journal: scheduler.journal().map(|j| j.to_json()),
    })
}

/// Consumer starts before the owner exposes anything, reads the initial
/// value, writes a new one and sees it come back through invalidation
fn binding(
    scheduler: &TickScheduler,
    registry: &ReferenceRegistry,
    lines: &Lines,
) -> Result<RunReport, StepError> {
    let (values, faults) = (Rc::clone(lines), Rc::clone(lines));
    let binder = DataBinder::<String>::start(
        scheduler,
        registry,
        BOUND_STRING,
        BinderHooks::new()
            .on_value(move |value| push(&values, format!("{BOUND_STRING} = {value}")))
            .on_fault(move |err| push(&faults, format!("{BOUND_STRING} fault: {err}"))),
    );

    let model = ExampleModel::new(scheduler, "hello");
    let mut bindings = BindingSet::new(registry);
    model.expose_bindings(&mut bindings)?;
    let mut report = scheduler.run_until_idle();

    binder.set("world".to_string());
    let second = scheduler.run_until_idle();
    report.ticks += second.ticks;
    report.pending = second.pending;

    binder.teardown();
    bindings.destroy();
    push(lines, format!("model text = {}", model.text()));
    push(lines, format!("registry empty after destroy: {}", registry.is_empty()));
    Ok(report)
}

/// Find the model by type, run its failing request and report the fault
fn fault(scheduler: &TickScheduler, registry: &ReferenceRegistry, lines: &Lines) -> RunReport {
    let model = ExampleModel::new(scheduler, "hello");
    let entry = RegistryEntry::of_type(&model);
    let lookup = DynamicRef::<ExampleModel>::by_type(registry);

    let request: Rc<RefCell<Option<AsyncTask<String>>>> = Rc::default();
    let (slot, out) = (Rc::clone(&request), Rc::clone(lines));
    AsyncTask::start_named(
        scheduler,
        "example_usage",
        Script::new()
            .wait(lookup.wait())
            .then(move || {
                let model = lookup.get()?;
                let task = model.get_error();
                let wait = Suspension::task(&task);
                *slot.borrow_mut() = Some(task);
                Ok(Some(wait.into()))
            })
            .run(move || {
                if let Some(task) = request.borrow().as_ref() {
                    push(&out, format!("was error: {}", task.is_faulted()));
                    if let Err(err) = task.result() {
                        push(&out, format!("result: {err}"));
                    }
                }
                Ok(())
            }),
    );

    // The consumer is already waiting when the owner shows up
    scheduler.run_ticks(2);
    registry.register(&entry);
    let report = scheduler.run_until_idle();
    registry.unregister(&entry);
    report
}

fn registry_lookups(
    scheduler: &TickScheduler,
    registry: &ReferenceRegistry,
    lines: &Lines,
) -> RunReport {
    let describe = |found: Result<Option<Rc<ExampleModel>>, StepError>| match found {
        Ok(Some(model)) => model.text(),
        Ok(None) => "not found".to_string(),
        Err(err) => err.to_string(),
    };

    let first = ExampleModel::new(scheduler, "first");
    let second = ExampleModel::new(scheduler, "second");
    let old = RegistryEntry::with_id("main", &first);
    let new = RegistryEntry::with_id("main", &second);

    registry.register(&old);
    push(lines, format!("by id: {}", describe(registry.get_by_id("main"))));

    registry.register(&new);
    push(lines, format!("by id after re-register: {}", describe(registry.get_by_id("main"))));
    push(lines, format!("by type: {}", describe(registry.get_by_type())));

    registry.unregister(&old);
    push(lines, format!("by id after old unregister: {}", describe(registry.get_by_id("main"))));
    push(lines, format!("by type: {}", describe(registry.get_by_type())));

    if let Err(err) = registry.get_by_id::<String>("main") {
        push(lines, format!("as string: {err}"));
    }

    let temporary = ExampleModel::new(scheduler, "temporary");
    registry.register(&RegistryEntry::with_id("temporary", &temporary));
    drop(temporary);
    push(lines, format!("dropped target: {}", describe(registry.get_by_id("temporary"))));

    registry.unregister(&new);
    push(lines, format!("entries left: {}", registry.len()));
    scheduler.run_until_idle()
}

/// A slow typed request, then the cached one twice
fn cached(scheduler: &TickScheduler, lines: &Lines) -> Result<RunReport, StepError> {
    let model = ExampleModel::new(scheduler, "hello");

    let slow = model.get_int();
    let report = scheduler.run_until_idle();
    push(lines, format!("get_int = {} after {} ticks", slow.result()?, report.ticks));

    let first = model.cached_get_int();
    let second = model.cached_get_int();
    push(lines, format!("cached_get_int = {}", first.result()?));
    push(lines, format!("same task: {}", first.id() == second.id()));

    let set = model.set_int(7);
    let after = scheduler.run_until_idle();
    push(lines, format!("set_int completed: {}", set.is_completed()));

    Ok(RunReport {
        ticks: report.ticks + after.ticks,
        pending: after.pending,
    })
}
