//! Entity store boundary.
//!
//! The authorization layer consumes this abstraction for durable storage of
//! roles, abilities and the relations between authorities and them. Only an
//! in-memory implementation ships here; database-backed stores implement the
//! same trait.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEntityStore;
pub use r#trait::{EntityStore, Owner, Relation, RelationEntry, SyncChanges};
