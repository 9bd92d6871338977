//! Binding Module - data sources shared with late-arriving consumers
//!
//! - `event`: `Event`, an ordered identity-based listener set
//! - `data_binding`: `Binding<T>`, getter/setter/invalidation for one source
//! - `builder`: `BindingBuilder`, fluent construction wired to source events
//! - `set`: `BindingSet`, owner-side expose/destroy of a group of bindings
//! - `consumer`: `DataBinder<T>`, the consumer protocol
//!
//! Data flow:
//! ```text
//! owner: Binding::builder(id) → BindingSet::expose → registry[id]
//!                                                        ↓
//! consumer: DataBinder::start(id) → wait for registry[id] → subscribe
//!                                                        ↓
//! source event → Binding::invalidate → DataBinder refresh
//!                                        → getter task → on_value / on_fault
//! ```

mod builder;
mod consumer;
mod data_binding;
mod event;
mod set;

pub use builder::BindingBuilder;
pub use consumer::{BinderHooks, DataBinder};
pub use data_binding::{Binding, BindingState, Getter, Hook, Setter};
pub use event::{listener, Event, Listener};
pub use set::{BindingHandle, BindingSet};
