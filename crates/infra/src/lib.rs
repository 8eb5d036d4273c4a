//! Infrastructure layer: entity storage for roles, abilities and their relations.

pub mod entity_store;

pub use entity_store::{
    EntityStore, InMemoryEntityStore, Owner, Relation, RelationEntry, SyncChanges,
};
