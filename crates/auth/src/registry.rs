//! Ability registry: resolves ability references to stored abilities.

use tracing::{debug, info, warn};

use bouncer_core::{Ability, AbilityKey, AbilityScope, BouncerError, BouncerResult};
use bouncer_infra::EntityStore;

use crate::AbilityRef;

/// Resolves [`AbilityRef`]s against an entity store, creating abilities on
/// demand.
pub struct AbilityRegistry<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> AbilityRegistry<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolve one reference.
    ///
    /// - `Entity` is returned as-is
    /// - `Id` must exist (`NotFound` otherwise)
    /// - `Name` and `Scoped` are looked up by key and created if absent
    pub fn resolve(&self, reference: &AbilityRef) -> BouncerResult<Ability> {
        match reference {
            AbilityRef::Entity(ability) => Ok(ability.clone()),
            AbilityRef::Id(id) => self
                .store
                .find_ability(*id)?
                .ok_or_else(|| BouncerError::not_found(format!("ability #{id}"))),
            AbilityRef::Name(name) => {
                self.find_or_create(&AbilityKey::unscoped(name.as_str()), None)
            }
            AbilityRef::Scoped { name, target } => {
                self.find_or_create(&AbilityKey::new(name.as_str(), target.clone().into()), None)
            }
        }
    }

    /// Resolve every reference, failing on the first unresolvable one.
    ///
    /// Abilities created before a later failure stay in the store; they are
    /// not granted to anyone.
    pub fn resolve_all(&self, references: &[AbilityRef]) -> BouncerResult<Vec<Ability>> {
        references.iter().map(|r| self.resolve(r)).collect()
    }

    /// Resolve without creating. Unknown names resolve to `None`; unknown ids
    /// are still `NotFound`.
    pub fn find(&self, reference: &AbilityRef) -> BouncerResult<Option<Ability>> {
        match reference {
            AbilityRef::Entity(ability) => Ok(Some(ability.clone())),
            AbilityRef::Id(_) => self.resolve(reference).map(Some),
            AbilityRef::Name(name) => Ok(self
                .store
                .find_ability_by_key(&AbilityKey::unscoped(name.as_str()))?),
            AbilityRef::Scoped { name, target } => Ok(self
                .store
                .find_ability_by_key(&AbilityKey::new(name.as_str(), target.clone().into()))?),
        }
    }

    /// The reserved "everything" ability.
    pub fn everything(&self) -> BouncerResult<Ability> {
        self.find_or_create(&AbilityKey::everything(), None)
    }

    /// Lookup-or-create by natural key.
    ///
    /// Creation relies on the store's uniqueness constraint: when another
    /// writer wins the race the store reports a conflict and the row it
    /// created is read back instead.
    pub fn find_or_create(&self, key: &AbilityKey, title: Option<&str>) -> BouncerResult<Ability> {
        if let Some(existing) = self.store.find_ability_by_key(key)? {
            return Ok(existing);
        }
        if key.scope == AbilityScope::Everything && key.name != bouncer_core::WILDCARD {
            return Err(BouncerError::invalid_reference(format!(
                "'{}' cannot use the everything scope",
                key.name
            )));
        }

        match self.store.create_ability(key, title) {
            Ok(created) => {
                info!(ability = %key, id = %created.id, "ability created");
                Ok(created)
            }
            Err(err) if err.is_conflict() => {
                warn!(ability = %key, "concurrent ability creation; reading back");
                self.store
                    .find_ability_by_key(key)?
                    .ok_or_else(|| {
                        BouncerError::ambiguous(format!(
                            "ability '{key}' conflicted on create but cannot be found"
                        ))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create an ability with a display title, or return the existing one.
    pub fn create_with_title(&self, key: &AbilityKey, title: &str) -> BouncerResult<Ability> {
        let ability = self.find_or_create(key, Some(title))?;
        if ability.title.as_deref() != Some(title) {
            debug!(ability = %key, "ability already existed; title left unchanged");
        }
        Ok(ability)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bouncer_core::{AbilityId, ModelKey, Role, RoleId, StoreResult, Target};
    use bouncer_infra::{InMemoryEntityStore, Owner, Relation, RelationEntry, SyncChanges};

    use super::*;

    #[test]
    fn names_are_created_once() {
        let store = InMemoryEntityStore::new();
        let registry = AbilityRegistry::new(&store);

        let first = registry.resolve(&"edit-site".into()).unwrap();
        let second = registry.resolve(&"edit-site".into()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.scope, AbilityScope::Unscoped);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = InMemoryEntityStore::new();
        let registry = AbilityRegistry::new(&store);

        let err = registry.resolve(&AbilityId::new(41).into()).unwrap_err();
        assert_eq!(err, BouncerError::NotFound("ability #41".to_string()));
    }

    #[test]
    fn scoped_references_resolve_to_class_and_instance_abilities() {
        let store = InMemoryEntityStore::new();
        let registry = AbilityRegistry::new(&store);
        let user = ModelKey::new("User", "1");

        let class = registry
            .resolve(&("create", Target::Class("Account".into())).into())
            .unwrap();
        let instance = registry.resolve(&("view", &user).into()).unwrap();
        let bare = registry.resolve(&"view".into()).unwrap();

        assert_eq!(class.scope, AbilityScope::Class { kind: "Account".into() });
        assert_eq!(instance.scope, AbilityScope::Instance { model: user });
        assert_ne!(instance.id, bare.id);
    }

    #[test]
    fn everything_scope_is_reserved() {
        let store = InMemoryEntityStore::new();
        let registry = AbilityRegistry::new(&store);

        let everything = registry.everything().unwrap();
        assert!(everything.is_everything());

        let err = registry
            .find_or_create(&AbilityKey::new("edit", AbilityScope::Everything), None)
            .unwrap_err();
        assert!(matches!(err, BouncerError::InvalidReference(_)));
    }

    #[test]
    fn titles_are_stored_on_creation() {
        let store = InMemoryEntityStore::new();
        let registry = AbilityRegistry::new(&store);
        let key = AbilityKey::unscoped("ban-users");

        let created = registry.create_with_title(&key, "Ban users").unwrap();
        let again = registry.create_with_title(&key, "Ban people").unwrap();

        assert_eq!(created.title.as_deref(), Some("Ban users"));
        assert_eq!(again, created);
    }

    /// Store whose first key lookup misses even though another writer has
    /// already inserted the row, as a concurrent process would.
    struct RacingStore {
        inner: InMemoryEntityStore,
        raced: AtomicBool,
    }

    impl EntityStore for RacingStore {
        fn find_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
            self.inner.find_role(id)
        }
        fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
            self.inner.find_role_by_name(name)
        }
        fn create_role(&self, name: &str, title: Option<&str>) -> StoreResult<Role> {
            self.inner.create_role(name, title)
        }
        fn find_ability(&self, id: AbilityId) -> StoreResult<Option<Ability>> {
            self.inner.find_ability(id)
        }
        fn find_ability_by_key(&self, key: &AbilityKey) -> StoreResult<Option<Ability>> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.create_ability(key, Some("other writer"))?;
                return Ok(None);
            }
            self.inner.find_ability_by_key(key)
        }
        fn create_ability(&self, key: &AbilityKey, title: Option<&str>) -> StoreResult<Ability> {
            self.inner.create_ability(key, title)
        }
        fn related(&self, owner: &Owner, relation: Relation) -> StoreResult<Vec<RelationEntry>> {
            self.inner.related(owner, relation)
        }
        fn attach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize> {
            self.inner.attach(owner, relation, targets)
        }
        fn detach(&self, owner: &Owner, relation: Relation, targets: &[u64]) -> StoreResult<usize> {
            self.inner.detach(owner, relation, targets)
        }
        fn sync_relation(
            &self,
            owner: &Owner,
            relation: Relation,
            targets: &BTreeSet<u64>,
        ) -> StoreResult<SyncChanges> {
            self.inner.sync_relation(owner, relation, targets)
        }
        fn subjects_with_role(&self, role: RoleId) -> StoreResult<Vec<ModelKey>> {
            self.inner.subjects_with_role(role)
        }
    }

    #[test]
    fn creation_conflict_reads_back_the_winner() {
        let store = RacingStore {
            inner: InMemoryEntityStore::new(),
            raced: AtomicBool::new(false),
        };
        let registry = AbilityRegistry::new(&store);

        let ability = registry.resolve(&"edit-site".into()).unwrap();

        assert_eq!(ability.title.as_deref(), Some("other writer"));
        assert_eq!(ability.id, AbilityId::new(1));
    }

    #[test]
    fn concurrent_resolution_creates_a_single_row() {
        let store = Arc::new(InMemoryEntityStore::new());

        let ids: Vec<AbilityId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        AbilityRegistry::new(&*store)
                            .resolve(&"access-dashboard".into())
                            .map(|a| a.id)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        let again = AbilityRegistry::new(&*store)
            .resolve(&"other".into())
            .unwrap();
        assert_eq!(again.id, AbilityId::new(2));
    }
}
