//! Fluent construction of bindings wired to source events

use std::rc::Rc;

use crate::config::{InvalidationPolicy, RuntimeConfig};
use crate::error::StepError;
use crate::task::AsyncTask;

use super::data_binding::{Binding, Getter, Hook, Setter};
use super::event::{Event, Listener};

/// Builder for [`Binding`].
///
/// ```ignore
/// let binding = Binding::builder("BoundString")
///     .getter(move || model.get_string())
///     .setter(move |s| model.set_string(s))
///     .invalidated_by(&model.on_string_updated)
///     .build()?;
/// ```
pub struct BindingBuilder<T> {
    id: String,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
    sources: Vec<Event>,
    policy: InvalidationPolicy,
}

impl<T: 'static> BindingBuilder<T> {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            getter: None,
            setter: None,
            sources: Vec::new(),
            policy: InvalidationPolicy::default(),
        }
    }

    pub fn getter<G>(mut self, getter: G) -> Self
    where
        G: Fn() -> AsyncTask<T> + 'static,
    {
        self.getter = Some(Box::new(getter));
        self
    }

    pub fn setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(T) -> AsyncTask<()> + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Invalidate whenever `source` fires. May be given more than once.
    pub fn invalidated_by(mut self, source: &Event) -> Self {
        self.sources.push(source.clone());
        self
    }

    pub fn policy(mut self, policy: InvalidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Take the policy from `config`
    pub fn policy_from(self, config: &RuntimeConfig) -> Self {
        self.policy(config.invalidation)
    }

    pub fn build(self) -> Result<Rc<Binding<T>>, StepError> {
        let getter = self.getter.ok_or_else(|| StepError::IncompleteBinding {
            id: self.id.clone(),
            missing: "getter",
        })?;
        let setter = self.setter.ok_or_else(|| StepError::IncompleteBinding {
            id: self.id.clone(),
            missing: "setter",
        })?;

        let (attach, detach) = if self.sources.is_empty() {
            (None, None)
        } else {
            let attached = self.sources.clone();
            let detached = self.sources;
            let attach: Hook = Box::new(move |listener: Listener| {
                for source in &attached {
                    source.add(Rc::clone(&listener));
                }
            });
            let detach: Hook = Box::new(move |listener: Listener| {
                for source in &detached {
                    source.remove(&listener);
                }
            });
            (Some(attach), Some(detach))
        };

        Ok(Binding::assemble(
            &self.id,
            getter,
            setter,
            attach,
            detach,
            self.policy,
        ))
    }
}
