//! The `Bouncer` facade: entry point for grants, checks and queries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use bouncer_core::{Ability, AbilityId, AbilityKey, BouncerResult, ModelKey, Role, RoleId, Target};
use bouncer_infra::{EntityStore, Owner, Relation};

use crate::authorize::{self, Explanation};
use crate::grants::{Assignment, GrantMode, Grants, Retraction, SyncGrants};
use crate::{AbilityRegistry, AuthorityRef, BouncerConfig, DecisionCache, RoleRef, roles};

/// Role-and-ability authorization over an [`EntityStore`].
///
/// Clones share the store and the decision cache; configuration (including
/// the cache bypass set by [`dont_cache`](Self::dont_cache)) is per instance.
/// Cached decisions are keyed by precedence, so clones configured with
/// different precedences never see each other's decisions.
///
/// ```ignore
/// let bouncer = Bouncer::new(InMemoryEntityStore::new());
/// bouncer.allow(&user).everything()?;
/// bouncer.forbid(&user).to(["edit-site"])?;
///
/// let gate = bouncer.check(&user);
/// assert!(gate.denies("edit-site")?);
/// assert!(gate.allows("access-dashboard")?);
/// ```
pub struct Bouncer<S: ?Sized> {
    store: Arc<S>,
    cache: Arc<DecisionCache>,
    config: BouncerConfig,
}

impl<S: ?Sized> Clone for Bouncer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
        }
    }
}

impl<S: EntityStore> Bouncer<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }
}

impl<S> Bouncer<S>
where
    S: EntityStore + ?Sized,
{
    /// Build over a store that is shared with other owners.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            cache: Arc::new(DecisionCache::new()),
            config: BouncerConfig::default(),
        }
    }

    /// Replace the configuration; the cache stays shared with clones.
    pub fn with_config(mut self, config: BouncerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `cache` instead of the current one, e.g. one built with
    /// [`DecisionCache::with_capacity`].
    pub fn with_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Bypass the decision cache for checks made through this instance.
    ///
    /// Mutations still invalidate the shared cache for other instances.
    pub fn dont_cache(mut self) -> Self {
        self.config.caching = false;
        self
    }

    pub fn config(&self) -> &BouncerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    pub fn registry(&self) -> AbilityRegistry<'_, S> {
        AbilityRegistry::new(&*self.store)
    }

    /// Find or create a bare ability.
    pub fn ability(&self, name: &str) -> BouncerResult<Ability> {
        self.registry().find_or_create(&AbilityKey::unscoped(name), None)
    }

    /// Find or create an ability scoped to a model class or instance.
    pub fn ability_for(&self, name: &str, target: impl Into<Target>) -> BouncerResult<Ability> {
        let target: Target = target.into();
        self.registry()
            .find_or_create(&AbilityKey::new(name, target.into()), None)
    }

    /// Find or create a role by name.
    pub fn role(&self, name: &str) -> BouncerResult<Role> {
        roles::find_or_create(&*self.store, name, None)
    }

    /// Find or create a role with a display title.
    pub fn role_titled(&self, name: &str, title: &str) -> BouncerResult<Role> {
        roles::find_or_create(&*self.store, name, Some(title))
    }

    // ── grants ───────────────────────────────────────────────────────────────

    pub fn allow(&self, authority: impl Into<AuthorityRef>) -> Grants<'_, S> {
        Grants::new(self, authority.into(), GrantMode::Allow)
    }

    pub fn forbid(&self, authority: impl Into<AuthorityRef>) -> Grants<'_, S> {
        Grants::new(self, authority.into(), GrantMode::Forbid)
    }

    /// Remove allow grants.
    pub fn disallow(&self, authority: impl Into<AuthorityRef>) -> Grants<'_, S> {
        Grants::new(self, authority.into(), GrantMode::Disallow)
    }

    /// Remove forbid grants.
    pub fn unforbid(&self, authority: impl Into<AuthorityRef>) -> Grants<'_, S> {
        Grants::new(self, authority.into(), GrantMode::Unforbid)
    }

    pub fn assign<I, R>(&self, roles: I) -> Assignment<'_, S>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        Assignment::new(self, roles.into_iter().map(Into::into).collect())
    }

    /// Unassign roles.
    pub fn retract<I, R>(&self, roles: I) -> Retraction<'_, S>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        Retraction::new(self, roles.into_iter().map(Into::into).collect())
    }

    pub fn sync(&self, authority: impl Into<AuthorityRef>) -> SyncGrants<'_, S> {
        SyncGrants::new(self, authority.into())
    }

    // ── checks ───────────────────────────────────────────────────────────────

    /// Ability checks on behalf of `subject`.
    pub fn check(&self, subject: &ModelKey) -> Gate<'_, S> {
        Gate {
            bouncer: self,
            subject: subject.clone(),
        }
    }

    /// Role membership checks for `subject`.
    pub fn is(&self, subject: &ModelKey) -> RoleCheck<'_, S> {
        RoleCheck {
            bouncer: self,
            subject: subject.clone(),
        }
    }

    /// Whether `subject` may perform `ability` on `target`.
    pub fn decide(
        &self,
        subject: &ModelKey,
        ability: &str,
        target: Option<&Target>,
    ) -> BouncerResult<bool> {
        let precedence = self.config.precedence;
        let seen = if self.config.caching {
            let seen = self.cache.generation();
            if let Some(allowed) = self.cache.get(subject, ability, target, precedence) {
                debug!(%subject, ability, allowed, "decision cache hit");
                return Ok(allowed);
            }
            Some(seen)
        } else {
            None
        };

        let holdings = authorize::holdings(&*self.store, subject)?;
        let allowed = authorize::decide(&holdings, ability, target, precedence).is_granted();

        if let Some(seen) = seen {
            self.cache.put(subject, ability, target, precedence, allowed, seen);
        }
        Ok(allowed)
    }

    /// Decide and report why. Never cached.
    pub fn explain(
        &self,
        subject: &ModelKey,
        ability: &str,
        target: Option<&Target>,
    ) -> BouncerResult<Explanation> {
        let holdings = authorize::holdings(&*self.store, subject)?;
        let explanation =
            authorize::explain(&holdings, subject, ability, target, self.config.precedence);
        debug!(explanation = %explanation.to_json(), "authorization explained");
        Ok(explanation)
    }

    // ── queries ──────────────────────────────────────────────────────────────

    /// Roles assigned to `subject`, ordered by id.
    pub fn roles_of(&self, subject: &ModelKey) -> BouncerResult<Vec<Role>> {
        Ok(authorize::holdings(&*self.store, subject)?.roles)
    }

    /// Abilities granted to `subject` directly or through roles, minus those
    /// the same abilities forbid. Wildcards are listed as granted, not expanded.
    pub fn abilities_of(&self, subject: &ModelKey) -> BouncerResult<Vec<Ability>> {
        let holdings = authorize::holdings(&*self.store, subject)?;
        let forbidden: BTreeSet<AbilityId> =
            holdings.forbidden_abilities().map(|a| a.id).collect();
        Ok(unique(
            holdings
                .allowed_abilities()
                .filter(|a| !forbidden.contains(&a.id)),
        ))
    }

    /// Abilities forbidden to `subject` directly or through roles.
    pub fn forbidden_abilities_of(&self, subject: &ModelKey) -> BouncerResult<Vec<Ability>> {
        let holdings = authorize::holdings(&*self.store, subject)?;
        Ok(unique(holdings.forbidden_abilities()))
    }

    // ── cache ────────────────────────────────────────────────────────────────

    /// Drop every cached decision.
    pub fn refresh(&self) {
        self.cache.clear();
    }

    /// Drop the cached decisions of one subject.
    pub fn refresh_for(&self, subject: &ModelKey) {
        self.cache.forget(subject);
    }

    // ── internals ────────────────────────────────────────────────────────────

    /// Resolve an authority for writing, creating a role named by an unknown
    /// name when configured to.
    pub(crate) fn owner(&self, authority: &AuthorityRef) -> BouncerResult<Owner> {
        Ok(match authority {
            AuthorityRef::Subject(key) => Owner::Subject(key.clone()),
            AuthorityRef::Role(role) => Owner::Role(
                roles::resolve(&*self.store, role, self.config.create_missing_roles)?.id,
            ),
        })
    }

    /// Resolve an authority that must already exist.
    pub(crate) fn existing_owner(&self, authority: &AuthorityRef) -> BouncerResult<Owner> {
        Ok(match authority {
            AuthorityRef::Subject(key) => Owner::Subject(key.clone()),
            AuthorityRef::Role(role) => Owner::Role(roles::existing(&*self.store, role)?.id),
        })
    }

    /// Forget cached decisions of every subject affected by a change to `owner`.
    pub(crate) fn invalidate(&self, owner: &Owner) -> BouncerResult<()> {
        match owner {
            Owner::Subject(key) => self.cache.forget(key),
            Owner::Role(id) => {
                for subject in self.store.subjects_with_role(*id)? {
                    self.cache.forget(&subject);
                }
            }
        }
        Ok(())
    }
}

fn unique<'a>(abilities: impl Iterator<Item = &'a Ability>) -> Vec<Ability> {
    abilities
        .map(|a| (a.id, a.clone()))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}

/// Ability checks bound to one subject.
pub struct Gate<'a, S: ?Sized> {
    bouncer: &'a Bouncer<S>,
    subject: ModelKey,
}

impl<'a, S> Gate<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub fn allows(&self, ability: &str) -> BouncerResult<bool> {
        self.bouncer.decide(&self.subject, ability, None)
    }

    pub fn denies(&self, ability: &str) -> BouncerResult<bool> {
        Ok(!self.allows(ability)?)
    }

    pub fn allows_on(&self, ability: &str, target: impl Into<Target>) -> BouncerResult<bool> {
        self.bouncer
            .decide(&self.subject, ability, Some(&target.into()))
    }

    pub fn denies_on(&self, ability: &str, target: impl Into<Target>) -> BouncerResult<bool> {
        Ok(!self.allows_on(ability, target)?)
    }

    pub fn explain(&self, ability: &str, target: Option<Target>) -> BouncerResult<Explanation> {
        self.bouncer.explain(&self.subject, ability, target.as_ref())
    }
}

/// Role membership checks bound to one subject.
///
/// Roles that do not exist are simply not held.
pub struct RoleCheck<'a, S: ?Sized> {
    bouncer: &'a Bouncer<S>,
    subject: ModelKey,
}

impl<'a, S> RoleCheck<'a, S>
where
    S: EntityStore + ?Sized,
{
    fn assigned(&self) -> BouncerResult<BTreeSet<RoleId>> {
        Ok(self
            .bouncer
            .store()
            .related(&Owner::Subject(self.subject.clone()), Relation::Roles)?
            .into_iter()
            .map(|entry| RoleId::new(entry.target))
            .collect())
    }

    fn holds(&self, assigned: &BTreeSet<RoleId>, role: &RoleRef) -> BouncerResult<bool> {
        let id = match role {
            RoleRef::Id(id) => Some(*id),
            RoleRef::Entity(role) => Some(role.id),
            RoleRef::Name(_) => roles::find(self.bouncer.store(), role)?.map(|r| r.id),
        };
        Ok(id.is_some_and(|id| assigned.contains(&id)))
    }

    pub fn a(&self, role: impl Into<RoleRef>) -> BouncerResult<bool> {
        let assigned = self.assigned()?;
        self.holds(&assigned, &role.into())
    }

    pub fn an(&self, role: impl Into<RoleRef>) -> BouncerResult<bool> {
        self.a(role)
    }

    pub fn not_a(&self, role: impl Into<RoleRef>) -> BouncerResult<bool> {
        Ok(!self.a(role)?)
    }

    pub fn not_an(&self, role: impl Into<RoleRef>) -> BouncerResult<bool> {
        self.not_a(role)
    }

    /// Holds every one of `roles`.
    pub fn all<I, R>(&self, roles: I) -> BouncerResult<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let assigned = self.assigned()?;
        for role in roles {
            if !self.holds(&assigned, &role.into())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Holds at least one of `roles`.
    pub fn any<I, R>(&self, roles: I) -> BouncerResult<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleRef>,
    {
        let assigned = self.assigned()?;
        for role in roles {
            if self.holds(&assigned, &role.into())? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
