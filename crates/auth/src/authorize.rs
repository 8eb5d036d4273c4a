//! Authorization evaluator.
//!
//! Combines a subject's own grants with those of its roles, weighs allows
//! against forbids and produces a decision, optionally with an explanation.

use serde::Serialize;

use bouncer_core::{Ability, AbilityId, AbilityKey, BouncerResult, ModelKey, Role, RoleId, Target};
use bouncer_infra::{EntityStore, Owner, Relation};

use crate::Precedence;

/// A grant row with its ability loaded.
#[derive(Debug, Clone)]
struct Grant {
    authority: Owner,
    ability: Ability,
}

/// Everything a subject holds, directly or through roles.
#[derive(Debug, Clone, Default)]
pub(crate) struct Holdings {
    pub roles: Vec<Role>,
    allowed: Vec<Grant>,
    forbidden: Vec<Grant>,
}

impl Holdings {
    pub fn allowed_abilities(&self) -> impl Iterator<Item = &Ability> {
        self.allowed.iter().map(|g| &g.ability)
    }

    pub fn forbidden_abilities(&self) -> impl Iterator<Item = &Ability> {
        self.forbidden.iter().map(|g| &g.ability)
    }
}

/// Outcome of weighing matched grants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Granted,
    /// No allow matched.
    NoGrant,
    /// An allow matched but a forbid that it does not override also matched.
    Forbidden,
}

impl Verdict {
    pub fn is_granted(self) -> bool {
        self == Verdict::Granted
    }
}

/// Load the subject's roles and every grant held by the subject or those roles.
pub(crate) fn holdings<S>(store: &S, subject: &ModelKey) -> BouncerResult<Holdings>
where
    S: EntityStore + ?Sized,
{
    let owner = Owner::Subject(subject.clone());
    let mut roles = Vec::new();
    for entry in store.related(&owner, Relation::Roles)? {
        if let Some(role) = store.find_role(RoleId::new(entry.target))? {
            roles.push(role);
        }
    }

    let mut authorities = vec![owner];
    authorities.extend(roles.iter().map(|r| Owner::Role(r.id)));

    let mut holdings = Holdings {
        roles,
        ..Holdings::default()
    };
    for authority in authorities {
        holdings
            .allowed
            .extend(load_grants(store, &authority, Relation::Abilities)?);
        holdings
            .forbidden
            .extend(load_grants(store, &authority, Relation::ForbiddenAbilities)?);
    }
    Ok(holdings)
}

fn load_grants<S>(store: &S, authority: &Owner, relation: Relation) -> BouncerResult<Vec<Grant>>
where
    S: EntityStore + ?Sized,
{
    let mut grants = Vec::new();
    for entry in store.related(authority, relation)? {
        if let Some(ability) = store.find_ability(AbilityId::new(entry.target))? {
            grants.push(Grant {
                authority: authority.clone(),
                ability,
            });
        }
    }
    Ok(grants)
}

/// Whether some allow in `allowed` overrides `forbid`.
///
/// An allow overrides a forbid when it is strictly more specific. A forbid on
/// everything is only overridden by an allow of the same authority: a role's
/// grant never lifts a subject-wide ban, and the other way round.
fn overridden(forbid: &Grant, allowed: &[&Grant]) -> bool {
    let floor = forbid.ability.specificity();
    allowed.iter().any(|allow| {
        allow.ability.specificity() > floor
            && (!forbid.ability.is_everything() || allow.authority == forbid.authority)
    })
}

fn weigh(allowed: &[&Grant], forbidden: &[&Grant], precedence: Precedence) -> Verdict {
    if allowed.is_empty() {
        return Verdict::NoGrant;
    }
    let denied = match precedence {
        Precedence::ForbidWins => !forbidden.is_empty(),
        Precedence::MostSpecific => forbidden.iter().any(|f| !overridden(f, allowed)),
    };
    if denied {
        Verdict::Forbidden
    } else {
        Verdict::Granted
    }
}

/// Decide whether `holdings` permit `ability` on `target`.
pub(crate) fn decide(
    holdings: &Holdings,
    ability: &str,
    target: Option<&Target>,
    precedence: Precedence,
) -> Verdict {
    weigh(
        &matching(&holdings.allowed, ability, target),
        &matching(&holdings.forbidden, ability, target),
        precedence,
    )
}

fn matching<'a>(grants: &'a [Grant], ability: &str, target: Option<&Target>) -> Vec<&'a Grant> {
    grants
        .iter()
        .filter(|g| g.ability.matches(ability, target))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub subject: ModelKey,
    pub ability: String,
    pub target: Option<Target>,
    pub verdict: Verdict,
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// Names of the roles the subject holds.
    pub roles: Vec<String>,

    /// Matching allow grants and where they come from.
    pub allowed_by: Vec<MatchedGrant>,

    /// Matching forbid grants and where they come from.
    pub forbidden_by: Vec<MatchedGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedGrant {
    pub authority: Owner,
    pub ability: AbilityKey,
}

impl Explanation {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

pub(crate) fn explain(
    holdings: &Holdings,
    subject: &ModelKey,
    ability: &str,
    target: Option<&Target>,
    precedence: Precedence,
) -> Explanation {
    let matched = |grants: &[Grant]| -> Vec<MatchedGrant> {
        grants
            .iter()
            .filter(|g| g.ability.matches(ability, target))
            .map(|g| MatchedGrant {
                authority: g.authority.clone(),
                ability: g.ability.key(),
            })
            .collect()
    };
    let allowed_by = matched(&holdings.allowed);
    let forbidden_by = matched(&holdings.forbidden);
    let verdict = decide(holdings, ability, target, precedence);

    let describe = |grants: &[MatchedGrant]| -> String {
        grants
            .iter()
            .map(|g| format!("'{}' via {}", g.ability, g.authority))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let reason = match verdict {
        Verdict::Granted => format!("allowed by {}", describe(&allowed_by)),
        Verdict::NoGrant => format!("no grant matches '{ability}'"),
        Verdict::Forbidden => format!(
            "forbidden by {} (overrides {})",
            describe(&forbidden_by),
            describe(&allowed_by)
        ),
    };

    Explanation {
        subject: subject.clone(),
        ability: ability.to_string(),
        target: target.cloned(),
        verdict,
        granted: verdict.is_granted(),
        reason,
        roles: holdings.roles.iter().map(|r| r.name.clone()).collect(),
        allowed_by,
        forbidden_by,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use bouncer_core::{AbilityScope, WILDCARD};

    use super::*;

    fn ability(id: u64, name: &str, scope: AbilityScope) -> Ability {
        Ability {
            id: AbilityId::new(id),
            name: name.to_string(),
            scope,
            title: None,
            created_at: Utc::now(),
        }
    }

    fn grant(ability: Ability) -> Grant {
        Grant {
            authority: Owner::Subject(ModelKey::new("User", "1")),
            ability,
        }
    }

    fn role_grant(ability: Ability) -> Grant {
        Grant {
            authority: Owner::Role(RoleId::new(1)),
            ability,
        }
    }

    fn everything() -> Ability {
        ability(1, WILDCARD, AbilityScope::Everything)
    }

    fn holdings(allowed: Vec<Ability>, forbidden: Vec<Ability>) -> Holdings {
        Holdings {
            roles: Vec::new(),
            allowed: allowed.into_iter().map(grant).collect(),
            forbidden: forbidden.into_iter().map(grant).collect(),
        }
    }

    #[test]
    fn forbid_overrides_everything() {
        let edit = ability(2, "edit-site", AbilityScope::Unscoped);
        let h = holdings(vec![everything()], vec![edit]);

        assert_eq!(
            decide(&h, "edit-site", None, Precedence::MostSpecific),
            Verdict::Forbidden
        );
        assert_eq!(
            decide(&h, "access-dashboard", None, Precedence::MostSpecific),
            Verdict::Granted
        );
    }

    #[test]
    fn forbid_wins_at_equal_specificity() {
        let edit = ability(2, "edit-site", AbilityScope::Unscoped);
        let h = holdings(vec![edit.clone()], vec![edit]);
        assert_eq!(decide(&h, "edit-site", None, Precedence::MostSpecific), Verdict::Forbidden);
    }

    #[test]
    fn specific_allow_beats_forbidden_everything_unless_forbid_wins() {
        let edit = ability(2, "edit-site", AbilityScope::Unscoped);
        let h = holdings(vec![edit], vec![everything()]);

        assert_eq!(decide(&h, "edit-site", None, Precedence::MostSpecific), Verdict::Granted);
        assert_eq!(decide(&h, "edit-site", None, Precedence::ForbidWins), Verdict::Forbidden);
        assert_eq!(decide(&h, "ban-users", None, Precedence::MostSpecific), Verdict::NoGrant);
    }

    #[test]
    fn forbidden_everything_is_only_lifted_by_the_same_authority() {
        let edit = ability(2, "edit-site", AbilityScope::Unscoped);

        let banned_subject = Holdings {
            roles: Vec::new(),
            allowed: vec![role_grant(edit.clone())],
            forbidden: vec![grant(everything())],
        };
        assert_eq!(
            decide(&banned_subject, "edit-site", None, Precedence::MostSpecific),
            Verdict::Forbidden
        );

        let banned_role = Holdings {
            roles: Vec::new(),
            allowed: vec![grant(edit)],
            forbidden: vec![role_grant(everything())],
        };
        assert_eq!(
            decide(&banned_role, "edit-site", None, Precedence::MostSpecific),
            Verdict::Forbidden
        );
    }

    #[test]
    fn finer_allows_lift_scoped_forbids_across_authorities() {
        let post = ModelKey::new("Post", "9");
        let class_forbid = ability(2, "edit", AbilityScope::Class { kind: "Post".into() });
        let instance_allow = ability(3, "edit", AbilityScope::Instance { model: post.clone() });
        let h = Holdings {
            roles: Vec::new(),
            allowed: vec![grant(instance_allow)],
            forbidden: vec![role_grant(class_forbid)],
        };

        let on_post = Target::Instance(post);
        assert!(decide(&h, "edit", Some(&on_post), Precedence::MostSpecific).is_granted());
    }

    #[test]
    fn instance_allow_beats_class_forbid() {
        let post = ModelKey::new("Post", "9");
        let class_forbid = ability(2, "edit", AbilityScope::Class { kind: "Post".into() });
        let instance_allow = ability(3, "edit", AbilityScope::Instance { model: post.clone() });
        let h = holdings(vec![instance_allow], vec![class_forbid]);

        let on_post = Target::Instance(post);
        let on_other = Target::Instance(ModelKey::new("Post", "10"));
        assert!(decide(&h, "edit", Some(&on_post), Precedence::MostSpecific).is_granted());
        assert_eq!(
            decide(&h, "edit", Some(&on_other), Precedence::MostSpecific),
            Verdict::NoGrant
        );
    }

    #[test]
    fn explanation_lists_matching_grants() {
        let edit = ability(2, "edit-site", AbilityScope::Unscoped);
        let h = holdings(vec![everything()], vec![edit]);
        let user = ModelKey::new("User", "1");

        let explanation = explain(&h, &user, "edit-site", None, Precedence::MostSpecific);

        assert!(!explanation.granted);
        assert_eq!(explanation.allowed_by.len(), 1);
        assert_eq!(explanation.forbidden_by[0].ability, AbilityKey::unscoped("edit-site"));
        assert!(explanation.reason.starts_with("forbidden by 'edit-site' via subject User#1"));

        let json = explanation.to_json();
        assert_eq!(json["verdict"], "forbidden");
        assert_eq!(json["ability"], "edit-site");
    }
}
