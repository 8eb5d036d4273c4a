use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bouncer_core::{Ability, AbilityId, AbilityKey, ModelKey, Role, RoleId, StoreResult};

/// Something that owns relation rows: a subject or a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Owner {
    Subject(ModelKey),
    Role(RoleId),
}

impl core::fmt::Display for Owner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Owner::Subject(key) => write!(f, "subject {key}"),
            Owner::Role(id) => write!(f, "role {id}"),
        }
    }
}

/// Relation sets held by an owner.
///
/// Row targets are raw ids: role ids for [`Relation::Roles`], ability ids
/// otherwise.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Subject → Role assignments. Not defined for role owners.
    Roles,
    /// Allowed abilities.
    Abilities,
    /// Forbidden abilities.
    ForbiddenAbilities,
}

/// One stored relation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEntry {
    pub target: u64,
    pub attached_at: DateTime<Utc>,
}

/// Outcome of a relation sync: which targets were attached and detached.
///
/// Targets present before and after are not listed and their rows are left
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChanges {
    pub attached: Vec<u64>,
    pub detached: Vec<u64>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Durable storage for roles, abilities and relation sets.
///
/// ## Uniqueness
///
/// `create_role` and `create_ability` must enforce uniqueness of the role name
/// and of the ability key and report a duplicate with
/// [`StoreError::Conflict`](bouncer_core::StoreError::Conflict). Callers
/// resolve lookup-or-create races by retrying the lookup on conflict, so the
/// constraint has to live in the store (processes share the store, not memory).
///
/// ## Relation writes
///
/// `attach`, `detach` and `sync_relation` are each atomic: a reader never
/// observes a partially applied batch, and a failing call leaves the previous
/// set intact. `attach` of an already present target keeps the existing row.
///
/// Implementations must reject relation targets that do not exist and the
/// `Roles` relation on role owners with
/// [`StoreError::InvalidRelation`](bouncer_core::StoreError::InvalidRelation).
pub trait EntityStore: Send + Sync {
    fn find_role(&self, id: RoleId) -> StoreResult<Option<Role>>;

    fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    fn create_role(&self, name: &str, title: Option<&str>) -> StoreResult<Role>;

    fn find_ability(&self, id: AbilityId) -> StoreResult<Option<Ability>>;

    fn find_ability_by_key(&self, key: &AbilityKey) -> StoreResult<Option<Ability>>;

    fn create_ability(&self, key: &AbilityKey, title: Option<&str>) -> StoreResult<Ability>;

    /// Current rows of one relation set, ordered by target id.
    fn related(&self, owner: &Owner, relation: Relation) -> StoreResult<Vec<RelationEntry>>;

    /// Add targets to a relation set; returns how many rows were new.
    fn attach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize>;

    /// Remove targets from a relation set; returns how many rows existed.
    fn detach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize>;

    /// Replace a relation set with exactly `targets` in one transaction.
    fn sync_relation(
        &self,
        owner: &Owner,
        relation: Relation,
        targets: &BTreeSet<u64>,
    ) -> StoreResult<SyncChanges>;

    /// Subjects currently assigned `role`.
    fn subjects_with_role(&self, role: RoleId) -> StoreResult<Vec<ModelKey>>;
}

impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    fn find_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        (**self).find_role(id)
    }

    fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        (**self).find_role_by_name(name)
    }

    fn create_role(&self, name: &str, title: Option<&str>) -> StoreResult<Role> {
        (**self).create_role(name, title)
    }

    fn find_ability(&self, id: AbilityId) -> StoreResult<Option<Ability>> {
        (**self).find_ability(id)
    }

    fn find_ability_by_key(&self, key: &AbilityKey) -> StoreResult<Option<Ability>> {
        (**self).find_ability_by_key(key)
    }

    fn create_ability(&self, key: &AbilityKey, title: Option<&str>) -> StoreResult<Ability> {
        (**self).create_ability(key, title)
    }

    fn related(&self, owner: &Owner, relation: Relation) -> StoreResult<Vec<RelationEntry>> {
        (**self).related(owner, relation)
    }

    fn attach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize> {
        (**self).attach(owner, relation, targets)
    }

    fn detach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize> {
        (**self).detach(owner, relation, targets)
    }

    fn sync_relation(
        &self,
        owner: &Owner,
        relation: Relation,
        targets: &BTreeSet<u64>,
    ) -> StoreResult<SyncChanges> {
        (**self).sync_relation(owner, relation, targets)
    }

    fn subjects_with_role(&self, role: RoleId) -> StoreResult<Vec<ModelKey>> {
        (**self).subjects_with_role(role)
    }
}
