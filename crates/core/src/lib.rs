//! `bouncer-core`: authorization domain building blocks.
//!
//! Identifiers, roles, abilities and the error model. No storage and no
//! decision logic live here.

pub mod entity;
pub mod error;
pub mod id;
pub mod model;

pub use entity::Model;
pub use error::{BouncerError, BouncerResult, StoreError, StoreResult};
pub use id::{AbilityId, ModelKey, RoleId};
pub use model::{Ability, AbilityKey, AbilityScope, Role, Target, WILDCARD};
