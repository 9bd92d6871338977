//! Registry Module - late-binding references
//!
//! - `entry`: `RegistryEntry`, a non-owning reference with identity
//! - `service`: `ReferenceRegistry`, the id/type directory
//! - `dynamic_ref`: `DynamicRef<T>`, a handle that resolves on access and
//!   can be waited on before its target exists

mod dynamic_ref;
mod entry;
mod service;

pub use dynamic_ref::DynamicRef;
pub use entry::{EntryKey, RegistryEntry};
pub use service::ReferenceRegistry;
