//! Grant engine: builders for every mutation of roles and ability grants.
//!
//! Each entry method on [`Bouncer`] returns a builder exposing only the verbs
//! that may follow it, e.g. `bouncer.allow(&user).to(["edit-site"])`.

use std::collections::BTreeSet;

use tracing::debug;

use bouncer_core::{
    Ability, AbilityKey, AbilityScope, BouncerError, BouncerResult, ModelKey, Target, WILDCARD,
};
use bouncer_infra::{EntityStore, Owner, Relation, SyncChanges};

use crate::{AbilityRef, AuthorityRef, Bouncer, RoleRef, roles};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum GrantMode {
    Allow,
    Forbid,
    Disallow,
    Unforbid,
}

impl GrantMode {
    fn relation(self) -> Relation {
        match self {
            GrantMode::Allow | GrantMode::Disallow => Relation::Abilities,
            GrantMode::Forbid | GrantMode::Unforbid => Relation::ForbiddenAbilities,
        }
    }

    fn attaches(self) -> bool {
        matches!(self, GrantMode::Allow | GrantMode::Forbid)
    }
}

/// Returned by `allow`, `forbid`, `disallow` and `unforbid`.
#[must_use = "grants are applied by calling `to`, `everything` or `to_manage`"]
pub struct Grants<'a, S: ?Sized> {
    bouncer: &'a Bouncer<S>,
    authority: AuthorityRef,
    mode: GrantMode,
}

impl<'a, S> Grants<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub(crate) fn new(bouncer: &'a Bouncer<S>, authority: AuthorityRef, mode: GrantMode) -> Self {
        Self {
            bouncer,
            authority,
            mode,
        }
    }

    /// Apply to the given abilities.
    ///
    /// Allow/forbid create abilities named by unknown names or `(name, target)`
    /// pairs. Disallow/unforbid never create: unknown names are skipped.
    #[tracing::instrument(skip_all, fields(authority = %self.authority, mode = ?self.mode))]
    pub fn to<I, R>(self, abilities: I) -> BouncerResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<AbilityRef>,
    {
        let references: Vec<AbilityRef> = abilities.into_iter().map(Into::into).collect();
        let registry = self.bouncer.registry();

        let resolved = if self.mode.attaches() {
            registry.resolve_all(&references)?
        } else {
            let mut found = Vec::with_capacity(references.len());
            for reference in &references {
                if let Some(ability) = registry.find(reference)? {
                    found.push(ability);
                }
            }
            found
        };
        self.apply(&resolved)
    }

    /// Apply to the reserved "everything" ability.
    pub fn everything(self) -> BouncerResult<()> {
        let key = AbilityKey::everything();
        self.apply_key(&key)
    }

    /// Apply to every ability on a model class or instance (`*` on that target).
    pub fn to_manage(self, target: impl Into<Target>) -> BouncerResult<()> {
        let target: Target = target.into();
        let key = AbilityKey::new(WILDCARD, AbilityScope::from(target));
        self.apply_key(&key)
    }

    fn apply_key(self, key: &AbilityKey) -> BouncerResult<()> {
        let registry = self.bouncer.registry();
        let ability = if self.mode.attaches() {
            Some(registry.find_or_create(key, None)?)
        } else {
            self.bouncer.store().find_ability_by_key(key)?
        };
        match ability {
            Some(ability) => self.apply(&[ability]),
            None => Ok(()),
        }
    }

    fn apply(&self, abilities: &[Ability]) -> BouncerResult<()> {
        let owner = if self.mode.attaches() {
            self.bouncer.owner(&self.authority)?
        } else {
            self.bouncer.existing_owner(&self.authority)?
        };
        let ids: Vec<u64> = abilities.iter().map(|a| a.id.get()).collect();
        let relation = self.mode.relation();

        let store = self.bouncer.store();
        let changed = if self.mode.attaches() {
            store.attach(&owner, relation, &ids)?
        } else {
            store.detach(&owner, relation, &ids)?
        };
        debug!(%owner, ?relation, requested = ids.len(), changed, "grants updated");

        self.bouncer.invalidate(&owner)
    }
}

/// Returned by `assign`.
#[must_use = "roles are assigned by calling `to`"]
pub struct Assignment<'a, S: ?Sized> {
    bouncer: &'a Bouncer<S>,
    roles: Vec<RoleRef>,
}

impl<'a, S> Assignment<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub(crate) fn new(bouncer: &'a Bouncer<S>, roles: Vec<RoleRef>) -> Self {
        Self { bouncer, roles }
    }

    /// Assign the roles to `subject`.
    ///
    /// Role ids must exist. Unknown names are created unless
    /// `create_missing_roles` is off, in which case they are `NotFound`.
    #[tracing::instrument(skip_all, fields(subject = %subject))]
    pub fn to(self, subject: &ModelKey) -> BouncerResult<()> {
        let store = self.bouncer.store();
        let create = self.bouncer.config().create_missing_roles;
        let ids = self
            .roles
            .iter()
            .map(|r| roles::resolve(store, r, create).map(|role| role.id.get()))
            .collect::<BouncerResult<Vec<u64>>>()?;

        let owner = Owner::Subject(subject.clone());
        let added = store.attach(&owner, Relation::Roles, &ids)?;
        debug!(requested = ids.len(), added, "roles assigned");

        self.bouncer.invalidate(&owner)
    }
}

/// Returned by `retract`.
#[must_use = "roles are retracted by calling `from`"]
pub struct Retraction<'a, S: ?Sized> {
    bouncer: &'a Bouncer<S>,
    roles: Vec<RoleRef>,
}

impl<'a, S> Retraction<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub(crate) fn new(bouncer: &'a Bouncer<S>, roles: Vec<RoleRef>) -> Self {
        Self { bouncer, roles }
    }

    /// Remove the roles from `subject`; roles that do not exist are skipped.
    #[tracing::instrument(skip_all, fields(subject = %subject))]
    pub fn from(self, subject: &ModelKey) -> BouncerResult<()> {
        let store = self.bouncer.store();
        let mut ids = Vec::with_capacity(self.roles.len());
        for reference in &self.roles {
            if let Some(role) = roles::find(store, reference)? {
                ids.push(role.id.get());
            }
        }

        let owner = Owner::Subject(subject.clone());
        let removed = store.detach(&owner, Relation::Roles, &ids)?;
        debug!(requested = ids.len(), removed, "roles retracted");

        self.bouncer.invalidate(&owner)
    }
}

/// Returned by `sync`: wholesale replacement of one relation set.
#[must_use = "a sync is applied by calling `roles`, `abilities` or `forbidden_abilities`"]
pub struct SyncGrants<'a, S: ?Sized> {
    bouncer: &'a Bouncer<S>,
    authority: AuthorityRef,
}

impl<'a, S> SyncGrants<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub(crate) fn new(bouncer: &'a Bouncer<S>, authority: AuthorityRef) -> Self {
        Self { bouncer, authority }
    }

    /// Replace the subject's roles with exactly `roles`.
    ///
    /// Roles are never created here: an unknown id or name fails with
    /// `NotFound` and the previous assignments stay as they were.
    #[tracing::instrument(skip_all, fields(authority = %self.authority))]
    pub fn roles<I, R>(self, references: I) -> BouncerResult<SyncChanges>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let AuthorityRef::Subject(subject) = &self.authority else {
            return Err(BouncerError::invalid_reference(format!(
                "{} cannot hold roles",
                self.authority
            )));
        };

        let store = self.bouncer.store();
        let ids = references
            .into_iter()
            .map(|r| roles::existing(store, &r.into()).map(|role| role.id.get()))
            .collect::<BouncerResult<BTreeSet<u64>>>()?;

        self.replace(&Owner::Subject(subject.clone()), Relation::Roles, &ids)
    }

    /// Replace the allowed abilities with exactly `abilities`, creating any
    /// named ability that does not exist yet.
    #[tracing::instrument(skip_all, fields(authority = %self.authority))]
    pub fn abilities<I, R>(self, abilities: I) -> BouncerResult<SyncChanges>
    where
        I: IntoIterator<Item = R>,
        R: Into<AbilityRef>,
    {
        self.sync_abilities(Relation::Abilities, abilities)
    }

    /// Replace the forbidden abilities with exactly `abilities`.
    #[tracing::instrument(skip_all, fields(authority = %self.authority))]
    pub fn forbidden_abilities<I, R>(self, abilities: I) -> BouncerResult<SyncChanges>
    where
        I: IntoIterator<Item = R>,
        R: Into<AbilityRef>,
    {
        self.sync_abilities(Relation::ForbiddenAbilities, abilities)
    }

    fn sync_abilities<I, R>(self, relation: Relation, abilities: I) -> BouncerResult<SyncChanges>
    where
        I: IntoIterator<Item = R>,
        R: Into<AbilityRef>,
    {
        let references: Vec<AbilityRef> = abilities.into_iter().map(Into::into).collect();
        let ids: BTreeSet<u64> = self
            .bouncer
            .registry()
            .resolve_all(&references)?
            .iter()
            .map(|a| a.id.get())
            .collect();

        let owner = self.bouncer.owner(&self.authority)?;
        self.replace(&owner, relation, &ids)
    }

    fn replace(
        &self,
        owner: &Owner,
        relation: Relation,
        ids: &BTreeSet<u64>,
    ) -> BouncerResult<SyncChanges> {
        let changes = self.bouncer.store().sync_relation(owner, relation, ids)?;
        debug!(
            %owner,
            ?relation,
            attached = changes.attached.len(),
            detached = changes.detached.len(),
            "relation synced"
        );

        self.bouncer.invalidate(owner)?;
        Ok(changes)
    }
}
