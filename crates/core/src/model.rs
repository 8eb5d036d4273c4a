//! Roles, abilities and ability targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AbilityId, Model, ModelKey, RoleId};

/// Reserved ability name meaning "any ability".
pub const WILDCARD: &str = "*";

/// A named, shared bundle of ability grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What an ability applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbilityScope {
    /// A bare named capability, not tied to any model.
    Unscoped,
    /// Every instance of a model class.
    Class { kind: String },
    /// A single model instance.
    Instance { model: ModelKey },
    /// Anything at all. Only the reserved "everything" ability uses this.
    Everything,
}

impl AbilityScope {
    /// Whether an ability with this scope applies to a request on `target`.
    pub fn covers(&self, target: Option<&Target>) -> bool {
        match (self, target) {
            (AbilityScope::Everything, _) => true,
            (AbilityScope::Unscoped, None) => true,
            (AbilityScope::Class { kind }, Some(t)) => t.kind() == kind,
            (AbilityScope::Instance { model }, Some(Target::Instance(m))) => model == m,
            _ => false,
        }
    }

    /// Coarse-to-fine rank used for precedence between grants.
    pub fn rank(&self) -> u8 {
        match self {
            AbilityScope::Everything => 0,
            AbilityScope::Unscoped | AbilityScope::Class { .. } => 1,
            AbilityScope::Instance { .. } => 2,
        }
    }
}

impl From<Target> for AbilityScope {
    fn from(target: Target) -> Self {
        match target {
            Target::Class(kind) => AbilityScope::Class { kind },
            Target::Instance(model) => AbilityScope::Instance { model },
        }
    }
}

/// A permission unit.
///
/// `(name, scope)` is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    pub id: AbilityId,
    pub name: String,
    pub scope: AbilityScope,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Ability {
    pub fn key(&self) -> AbilityKey {
        AbilityKey {
            name: self.name.clone(),
            scope: self.scope.clone(),
        }
    }

    pub fn is_everything(&self) -> bool {
        self.name == WILDCARD && self.scope == AbilityScope::Everything
    }

    /// Whether this ability grants/forbids `name` on `target`.
    pub fn matches(&self, name: &str, target: Option<&Target>) -> bool {
        (self.name == name || self.name == WILDCARD) && self.scope.covers(target)
    }

    /// `(scope rank, exact name)`; larger is more specific.
    pub fn specificity(&self) -> (u8, bool) {
        (self.scope.rank(), self.name != WILDCARD)
    }
}

/// Natural key of an ability: `(name, target type, target id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbilityKey {
    pub name: String,
    pub scope: AbilityScope,
}

impl AbilityKey {
    pub fn new(name: impl Into<String>, scope: AbilityScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    pub fn unscoped(name: impl Into<String>) -> Self {
        Self::new(name, AbilityScope::Unscoped)
    }

    pub fn everything() -> Self {
        Self::new(WILDCARD, AbilityScope::Everything)
    }
}

impl core::fmt::Display for AbilityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.scope {
            AbilityScope::Unscoped => write!(f, "{}", self.name),
            AbilityScope::Class { kind } => write!(f, "{} on {}", self.name, kind),
            AbilityScope::Instance { model } => write!(f, "{} on {}", self.name, model),
            AbilityScope::Everything => f.write_str("everything"),
        }
    }
}

/// The thing an ability check is about: a model class or one model instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Target {
    Class(String),
    Instance(ModelKey),
}

impl Target {
    /// Target the whole class of `M`.
    pub fn class<M: Model>() -> Self {
        Target::Class(M::model_kind().to_string())
    }

    /// Target one instance.
    pub fn of<M: Model>(model: &M) -> Self {
        Target::Instance(model.model_key())
    }

    pub fn kind(&self) -> &str {
        match self {
            Target::Class(kind) => kind,
            Target::Instance(model) => &model.kind,
        }
    }
}

impl From<ModelKey> for Target {
    fn from(model: ModelKey) -> Self {
        Target::Instance(model)
    }
}

impl From<&ModelKey> for Target {
    fn from(model: &ModelKey) -> Self {
        Target::Instance(model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ability(name: &str, scope: AbilityScope) -> Ability {
        Ability {
            id: AbilityId::new(1),
            name: name.to_string(),
            scope,
            title: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn class_scope_covers_instances_but_not_the_reverse() {
        let user = ModelKey::new("User", "1");
        let class = ability("view", AbilityScope::Class { kind: "User".into() });
        let instance = ability("view", AbilityScope::Instance { model: user.clone() });

        assert!(class.matches("view", Some(&Target::Instance(user.clone()))));
        assert!(class.matches("view", Some(&Target::Class("User".into()))));
        assert!(instance.matches("view", Some(&Target::Instance(user))));
        assert!(!instance.matches("view", Some(&Target::Class("User".into()))));
        assert!(!class.matches("view", None));
    }

    #[test]
    fn everything_matches_any_request() {
        let everything = ability(WILDCARD, AbilityScope::Everything);
        assert!(everything.is_everything());
        assert!(everything.matches("ban-users", None));
        assert!(everything.matches("delete", Some(&Target::Class("Post".into()))));
        assert_eq!(everything.specificity(), (0, false));
    }

    #[test]
    fn unscoped_ability_ignores_targeted_requests() {
        let bare = ability("edit-site", AbilityScope::Unscoped);
        assert!(bare.matches("edit-site", None));
        assert!(!bare.matches("edit-site", Some(&Target::Class("Site".into()))));
        assert!(!bare.matches("ban-users", None));
    }

    #[test]
    fn keys_render_readably() {
        assert_eq!(AbilityKey::everything().to_string(), "everything");
        let key = AbilityKey::new("create", Target::Class("Account".into()).into());
        assert_eq!(key.to_string(), "create on Account");
    }
}
