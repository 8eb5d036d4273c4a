use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use bouncer_core::{Ability, AbilityId, AbilityKey, ModelKey, Role, RoleId, StoreError, StoreResult};

use super::r#trait::{EntityStore, Owner, Relation, RelationEntry, SyncChanges};

#[derive(Debug, Default)]
struct State {
    last_role_id: u64,
    last_ability_id: u64,
    roles: BTreeMap<RoleId, Role>,
    role_names: HashMap<String, RoleId>,
    abilities: BTreeMap<AbilityId, Ability>,
    ability_keys: HashMap<AbilityKey, AbilityId>,
    relations: HashMap<(Owner, Relation), BTreeMap<u64, DateTime<Utc>>>,
}

impl State {
    fn check_relation(&self, owner: &Owner, relation: Relation) -> StoreResult<()> {
        let checked = match (owner, relation) {
            (Owner::Role(_), Relation::Roles) => Err(StoreError::InvalidRelation(
                "roles cannot be assigned to a role".to_string(),
            )),
            (Owner::Role(id), _) if !self.roles.contains_key(id) => {
                Err(StoreError::InvalidRelation(format!("unknown role owner {id}")))
            }
            _ => Ok(()),
        };
        if let Err(err) = &checked {
            debug!(%owner, ?relation, %err, "relation rejected");
        }
        checked
    }

    fn check_target(&self, relation: Relation, target: u64) -> StoreResult<()> {
        let exists = match relation {
            Relation::Roles => self.roles.contains_key(&RoleId::new(target)),
            Relation::Abilities | Relation::ForbiddenAbilities => {
                self.abilities.contains_key(&AbilityId::new(target))
            }
        };
        if exists {
            Ok(())
        } else {
            Err(StoreError::InvalidRelation(format!(
                "unknown {relation:?} target {target}"
            )))
        }
    }
}

/// In-memory entity store.
///
/// Intended for tests/dev and single-process embedding. Every write holds the
/// single write guard for its whole duration, which makes each call one
/// transaction.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: RwLock<State>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::unavailable("lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::unavailable("lock poisoned"))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn find_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let state = self.read()?;
        Ok(state
            .role_names
            .get(name)
            .and_then(|id| state.roles.get(id))
            .cloned())
    }

    fn create_role(&self, name: &str, title: Option<&str>) -> StoreResult<Role> {
        let mut state = self.write()?;
        if state.role_names.contains_key(name) {
            debug!(role = %name, "role name already taken");
            return Err(StoreError::conflict(format!("role '{name}' already exists")));
        }

        state.last_role_id += 1;
        let role = Role {
            id: RoleId::new(state.last_role_id),
            name: name.to_string(),
            title: title.map(str::to_string),
            created_at: Utc::now(),
        };
        state.role_names.insert(role.name.clone(), role.id);
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn find_ability(&self, id: AbilityId) -> StoreResult<Option<Ability>> {
        Ok(self.read()?.abilities.get(&id).cloned())
    }

    fn find_ability_by_key(&self, key: &AbilityKey) -> StoreResult<Option<Ability>> {
        let state = self.read()?;
        Ok(state
            .ability_keys
            .get(key)
            .and_then(|id| state.abilities.get(id))
            .cloned())
    }

    fn create_ability(&self, key: &AbilityKey, title: Option<&str>) -> StoreResult<Ability> {
        let mut state = self.write()?;
        if state.ability_keys.contains_key(key) {
            debug!(ability = %key, "ability key already taken");
            return Err(StoreError::conflict(format!(
                "ability '{key}' already exists"
            )));
        }

        state.last_ability_id += 1;
        let ability = Ability {
            id: AbilityId::new(state.last_ability_id),
            name: key.name.clone(),
            scope: key.scope.clone(),
            title: title.map(str::to_string),
            created_at: Utc::now(),
        };
        state.ability_keys.insert(key.clone(), ability.id);
        state.abilities.insert(ability.id, ability.clone());
        Ok(ability)
    }

    fn related(&self, owner: &Owner, relation: Relation) -> StoreResult<Vec<RelationEntry>> {
        let state = self.read()?;
        state.check_relation(owner, relation)?;

        Ok(state
            .relations
            .get(&(owner.clone(), relation))
            .map(|rows| {
                rows.iter()
                    .map(|(target, attached_at)| RelationEntry {
                        target: *target,
                        attached_at: *attached_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn attach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize> {
        let mut state = self.write()?;
        state.check_relation(owner, relation)?;
        for target in targets {
            if let Err(err) = state.check_target(relation, *target) {
                warn!(%owner, ?relation, rejected = *target, "attach rejected");
                return Err(err);
            }
        }

        let now = Utc::now();
        let rows = state.relations.entry((owner.clone(), relation)).or_default();
        let mut added = 0;
        for target in targets {
            if !rows.contains_key(target) {
                rows.insert(*target, now);
                added += 1;
            }
        }
        Ok(added)
    }

    fn detach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize> {
        let mut state = self.write()?;
        state.check_relation(owner, relation)?;

        let key = (owner.clone(), relation);
        let Some(rows) = state.relations.get_mut(&key) else {
            return Ok(0);
        };
        let removed = targets
            .iter()
            .filter(|target| rows.remove(*target).is_some())
            .count();
        if rows.is_empty() {
            state.relations.remove(&key);
        }
        Ok(removed)
    }

    fn sync_relation(
        &self,
        owner: &Owner,
        relation: Relation,
        targets: &BTreeSet<u64>,
    ) -> StoreResult<SyncChanges> {
        let mut state = self.write()?;
        state.check_relation(owner, relation)?;
        for target in targets {
            if let Err(err) = state.check_target(relation, *target) {
                warn!(%owner, ?relation, rejected = *target, "sync rejected");
                return Err(err);
            }
        }

        let key = (owner.clone(), relation);
        let now = Utc::now();
        let rows = state.relations.entry(key.clone()).or_default();

        let detached: Vec<u64> = rows
            .keys()
            .filter(|target| !targets.contains(*target))
            .copied()
            .collect();
        for target in &detached {
            rows.remove(target);
        }

        let mut attached = Vec::new();
        for target in targets {
            if !rows.contains_key(target) {
                rows.insert(*target, now);
                attached.push(*target);
            }
        }
        if rows.is_empty() {
            state.relations.remove(&key);
        }

        Ok(SyncChanges { attached, detached })
    }

    fn subjects_with_role(&self, role: RoleId) -> StoreResult<Vec<ModelKey>> {
        let state = self.read()?;
        let mut subjects: Vec<ModelKey> = state
            .relations
            .iter()
            .filter_map(|((owner, relation), rows)| match owner {
                Owner::Subject(key)
                    if *relation == Relation::Roles && rows.contains_key(&role.get()) =>
                {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}
