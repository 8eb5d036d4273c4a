use std::collections::BTreeSet;

use proptest::prelude::*;

use bouncer_auth::Bouncer;
use bouncer_core::ModelKey;
use bouncer_infra::InMemoryEntityStore;

const NAMES: [&str; 6] = [
    "admin",
    "editor",
    "reviewer",
    "subscriber",
    "moderator",
    "guest",
];

fn name_set() -> impl Strategy<Value = BTreeSet<&'static str>> {
    prop::collection::btree_set(prop::sample::select(NAMES.to_vec()), 0..NAMES.len())
}

fn fresh() -> (Bouncer<InMemoryEntityStore>, ModelKey) {
    let bouncer = Bouncer::new(InMemoryEntityStore::new());
    (bouncer, ModelKey::new("User", "1"))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    /// Syncing roles leaves exactly the synced set assigned.
    #[test]
    fn synced_roles_are_exactly_held(before in name_set(), after in name_set()) {
        let (bouncer, user) = fresh();
        for name in NAMES {
            bouncer.role(name).unwrap();
        }

        bouncer.assign(before.iter().copied()).to(&user).unwrap();
        bouncer.sync(&user).roles(after.iter().copied()).unwrap();

        let is = bouncer.is(&user);
        prop_assert!(is.all(after.iter().copied()).unwrap());
        for name in NAMES.iter().filter(|n| !after.contains(*n)) {
            prop_assert!(is.not_an(*name).unwrap());
        }
    }

    /// Ability sync replaces the allowed set rather than merging into it.
    #[test]
    fn ability_sync_replaces(granted in name_set(), synced in name_set()) {
        let (bouncer, user) = fresh();
        let gate = bouncer.check(&user);

        bouncer.allow(&user).to(granted.iter().copied()).unwrap();
        for name in &granted {
            prop_assert!(gate.allows(name).unwrap());
        }

        bouncer.sync(&user).abilities(synced.iter().copied()).unwrap();
        for name in NAMES {
            prop_assert_eq!(gate.allows(name).unwrap(), synced.contains(name));
        }
    }

    /// Under a wildcard allow, exactly the synced forbids are denied.
    #[test]
    fn forbid_sync_narrows_overrides(forbidden in name_set(), synced in name_set()) {
        let (bouncer, user) = fresh();
        let gate = bouncer.check(&user);

        bouncer.allow(&user).everything().unwrap();
        bouncer.forbid(&user).to(forbidden.iter().copied()).unwrap();
        bouncer.sync(&user).forbidden_abilities(synced.iter().copied()).unwrap();

        for name in NAMES {
            prop_assert_eq!(gate.denies(name).unwrap(), synced.contains(name));
        }
    }

    /// Role grants reach every holder and follow role-level syncs.
    #[test]
    fn role_grants_are_transitive(first in name_set(), second in name_set()) {
        let (bouncer, user) = fresh();
        let gate = bouncer.check(&user);

        bouncer.assign(["staff"]).to(&user).unwrap();
        bouncer.allow("staff").to(first.iter().copied()).unwrap();
        for name in NAMES {
            prop_assert_eq!(gate.allows(name).unwrap(), first.contains(name));
        }

        bouncer.sync("staff").abilities(second.iter().copied()).unwrap();
        for name in NAMES {
            prop_assert_eq!(gate.allows(name).unwrap(), second.contains(name));
        }
    }
}
