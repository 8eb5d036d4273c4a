//! References accepted wherever a role, an ability or an authority is expected.
//!
//! Callers can pass ids, names, loaded entities or `(name, target)` pairs
//! interchangeably; each is converted into one of the tagged unions below and
//! resolved through a single dispatch function.

use bouncer_core::{Ability, AbilityId, ModelKey, Role, RoleId, Target};

/// Reference to an ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbilityRef {
    /// Lookup by id; never creates.
    Id(AbilityId),
    /// Bare ability by name; created if absent.
    Name(String),
    /// Ability scoped to a model class or instance; created if absent.
    Scoped { name: String, target: Target },
    /// Already loaded; used as-is.
    Entity(Ability),
}

impl From<AbilityId> for AbilityRef {
    fn from(id: AbilityId) -> Self {
        AbilityRef::Id(id)
    }
}

impl From<&str> for AbilityRef {
    fn from(name: &str) -> Self {
        AbilityRef::Name(name.to_string())
    }
}

impl From<String> for AbilityRef {
    fn from(name: String) -> Self {
        AbilityRef::Name(name)
    }
}

impl From<Ability> for AbilityRef {
    fn from(ability: Ability) -> Self {
        AbilityRef::Entity(ability)
    }
}

impl From<&Ability> for AbilityRef {
    fn from(ability: &Ability) -> Self {
        AbilityRef::Entity(ability.clone())
    }
}

impl From<(&str, Target)> for AbilityRef {
    fn from((name, target): (&str, Target)) -> Self {
        AbilityRef::Scoped {
            name: name.to_string(),
            target,
        }
    }
}

impl From<(&str, &ModelKey)> for AbilityRef {
    fn from((name, model): (&str, &ModelKey)) -> Self {
        AbilityRef::Scoped {
            name: name.to_string(),
            target: Target::Instance(model.clone()),
        }
    }
}

impl core::fmt::Display for AbilityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AbilityRef::Id(id) => write!(f, "ability #{id}"),
            AbilityRef::Name(name) => write!(f, "ability '{name}'"),
            AbilityRef::Scoped { name, target } => match target {
                Target::Class(kind) => write!(f, "ability '{name}' on {kind}"),
                Target::Instance(model) => write!(f, "ability '{name}' on {model}"),
            },
            AbilityRef::Entity(ability) => write!(f, "ability '{}'", ability.key()),
        }
    }
}

/// Reference to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    Id(RoleId),
    Name(String),
    Entity(Role),
}

impl From<RoleId> for RoleRef {
    fn from(id: RoleId) -> Self {
        RoleRef::Id(id)
    }
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        RoleRef::Name(name.to_string())
    }
}

impl From<String> for RoleRef {
    fn from(name: String) -> Self {
        RoleRef::Name(name)
    }
}

impl From<Role> for RoleRef {
    fn from(role: Role) -> Self {
        RoleRef::Entity(role)
    }
}

impl From<&Role> for RoleRef {
    fn from(role: &Role) -> Self {
        RoleRef::Entity(role.clone())
    }
}

impl core::fmt::Display for RoleRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RoleRef::Id(id) => write!(f, "role #{id}"),
            RoleRef::Name(name) => write!(f, "role '{name}'"),
            RoleRef::Entity(role) => write!(f, "role '{}'", role.name),
        }
    }
}

/// Anything that can hold ability grants: a subject or a role.
///
/// Strings name roles, mirroring `allow("admin")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityRef {
    Subject(ModelKey),
    Role(RoleRef),
}

impl From<&ModelKey> for AuthorityRef {
    fn from(subject: &ModelKey) -> Self {
        AuthorityRef::Subject(subject.clone())
    }
}

impl From<ModelKey> for AuthorityRef {
    fn from(subject: ModelKey) -> Self {
        AuthorityRef::Subject(subject)
    }
}

impl From<RoleRef> for AuthorityRef {
    fn from(role: RoleRef) -> Self {
        AuthorityRef::Role(role)
    }
}

macro_rules! authority_from_role {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AuthorityRef {
                fn from(role: $t) -> Self {
                    AuthorityRef::Role(role.into())
                }
            }
        )*
    };
}

authority_from_role!(RoleId, &str, String, Role, &Role);

impl core::fmt::Display for AuthorityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AuthorityRef::Subject(key) => write!(f, "subject {key}"),
            AuthorityRef::Role(role) => core::fmt::Display::fmt(role, f),
        }
    }
}
