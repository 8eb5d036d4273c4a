//! `bouncer-auth`: role-and-ability authorization.
//!
//! Decision logic only: storage is an [`EntityStore`](bouncer_infra::EntityStore)
//! collaborator and nothing here knows about HTTP.

pub mod authorize;
pub mod bouncer;
pub mod cache;
pub mod config;
pub mod grants;
pub mod reference;
pub mod registry;
mod roles;

pub use authorize::{Explanation, MatchedGrant, Verdict};
pub use bouncer::{Bouncer, Gate, RoleCheck};
pub use cache::DecisionCache;
pub use config::{BouncerConfig, ConfigError, Precedence};
pub use grants::{Assignment, Grants, Retraction, SyncGrants};
pub use reference::{AbilityRef, AuthorityRef, RoleRef};
pub use registry::AbilityRegistry;
