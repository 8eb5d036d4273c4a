//! Role lookup and on-demand creation.

use tracing::{info, warn};

use bouncer_core::{BouncerError, BouncerResult, Role};
use bouncer_infra::EntityStore;

use crate::RoleRef;

/// Look a role up without creating it.
pub(crate) fn find<S>(store: &S, reference: &RoleRef) -> BouncerResult<Option<Role>>
where
    S: EntityStore + ?Sized,
{
    Ok(match reference {
        RoleRef::Entity(role) => Some(role.clone()),
        RoleRef::Id(id) => store.find_role(*id)?,
        RoleRef::Name(name) => store.find_role_by_name(name)?,
    })
}

/// Resolve a role that must already exist.
pub(crate) fn existing<S>(store: &S, reference: &RoleRef) -> BouncerResult<Role>
where
    S: EntityStore + ?Sized,
{
    find(store, reference)?.ok_or_else(|| BouncerError::not_found(reference.to_string()))
}

/// Resolve a role, creating it when referenced by an unknown name and
/// `create_missing` is set. Ids are never created.
pub(crate) fn resolve<S>(
    store: &S,
    reference: &RoleRef,
    create_missing: bool,
) -> BouncerResult<Role>
where
    S: EntityStore + ?Sized,
{
    match reference {
        RoleRef::Name(name) if create_missing => find_or_create(store, name, None),
        _ => existing(store, reference),
    }
}

/// Lookup-or-create by unique name, retrying the lookup on a uniqueness
/// conflict.
pub(crate) fn find_or_create<S>(store: &S, name: &str, title: Option<&str>) -> BouncerResult<Role>
where
    S: EntityStore + ?Sized,
{
    if let Some(role) = store.find_role_by_name(name)? {
        return Ok(role);
    }

    match store.create_role(name, title) {
        Ok(role) => {
            info!(role = %role.name, id = %role.id, "role created");
            Ok(role)
        }
        Err(err) if err.is_conflict() => {
            warn!(role = %name, "concurrent role creation; reading back");
            store.find_role_by_name(name)?.ok_or_else(|| {
                BouncerError::ambiguous(format!(
                    "role '{name}' conflicted on create but cannot be found"
                ))
            })
        }
        Err(err) => Err(err.into()),
    }
}
