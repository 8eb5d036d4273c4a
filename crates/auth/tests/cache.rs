use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use bouncer_auth::Bouncer;
use bouncer_core::{Ability, AbilityId, AbilityKey, ModelKey, Role, RoleId, StoreResult};
use bouncer_infra::{EntityStore, InMemoryEntityStore, Owner, Relation, RelationEntry, SyncChanges};

type Hook = Box<dyn FnOnce() + Send>;

/// In-memory store that runs a one-shot hook right after a subject's allowed
/// abilities have been read, i.e. while a decision is being computed.
#[derive(Default)]
struct InterleavingStore {
    inner: InMemoryEntityStore,
    after_abilities_read: Mutex<Option<Hook>>,
}

impl InterleavingStore {
    fn arm(&self, hook: Hook) {
        if let Ok(mut slot) = self.after_abilities_read.lock() {
            *slot = Some(hook);
        }
    }
}

impl EntityStore for InterleavingStore {
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
        self.inner.find_ability_by_key(key)
    }
    fn create_ability(&self, key: &AbilityKey, title: Option<&str>) -> StoreResult<Ability> {
        self.inner.create_ability(key, title)
    }
    fn related(&self, owner: &Owner, relation: Relation) -> StoreResult<Vec<RelationEntry>> {
        let rows = self.inner.related(owner, relation)?;
        if matches!(owner, Owner::Subject(_)) && relation == Relation::Abilities {
            let hook = self
                .after_abilities_read
                .lock()
                .ok()
                .and_then(|mut slot| slot.take());
            if let Some(hook) = hook {
                hook();
            }
        }
        Ok(rows)
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
fn grants_landing_mid_check_are_not_shadowed_by_the_cache() -> anyhow::Result<()> {
    bouncer_observability::tracing::init_for_tests();
    let store = Arc::new(InterleavingStore::default());
    let reader = Bouncer::from_shared(Arc::clone(&store));
    let alice = ModelKey::new("User", "alice");

    let writer = reader.clone();
    let subject = alice.clone();
    store.arm(Box::new(move || {
        writer
            .allow(&subject)
            .to(["edit-site"])
            .expect("concurrent grant");
    }));

    let first = reader.check(&alice).allows("edit-site")?;
    assert!(!first);
    assert!(reader.cache().is_empty());

    assert!(reader.check(&alice).allows("edit-site")?);
    assert_eq!(reader.cache().len(), 1);
    Ok(())
}

#[test]
fn reads_without_interleaved_writes_are_cached() -> anyhow::Result<()> {
    let store = Arc::new(InterleavingStore::default());
    let bouncer = Bouncer::from_shared(Arc::clone(&store));
    let alice = ModelKey::new("User", "alice");

    bouncer.allow(&alice).to(["edit-site"])?;
    assert!(bouncer.check(&alice).allows("edit-site")?);
    assert_eq!(bouncer.cache().len(), 1);
    Ok(())
}
