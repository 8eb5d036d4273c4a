//! Per-subject memoization of authorization decisions.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use bouncer_core::{ModelKey, Target};

use crate::Precedence;

/// Decisions kept before the cache starts over.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    ability: String,
    target: Option<Target>,
    precedence: Precedence,
}

impl DecisionKey {
    fn new(ability: &str, target: Option<&Target>, precedence: Precedence) -> Self {
        Self {
            ability: ability.to_string(),
            target: target.cloned(),
            precedence,
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    /// Bumped by every invalidation.
    generation: u64,
    len: usize,
    subjects: HashMap<ModelKey, HashMap<DecisionKey, bool>>,
}

/// Decision cache keyed by `(subject, ability name, target, precedence)`.
///
/// Mutations forget every affected subject after the store commits. A decision is stored only
/// if no invalidation happened since [`generation`](Self::generation) was read
/// before computing it, so a mutation that lands while a decision is being
/// computed cannot leave that stale decision behind. A check that starts
/// before such a mutation commits may still return the old answer once;
/// callers that need read-after-write consistency bypass the cache
/// (`Bouncer::dont_cache`).
///
/// At most `capacity` decisions are kept; storing one more drops them all.
/// A poisoned lock behaves like an empty cache.
#[derive(Debug)]
pub struct DecisionCache {
    capacity: usize,
    entries: RwLock<Entries>,
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(
        &self,
        subject: &ModelKey,
        ability: &str,
        target: Option<&Target>,
        precedence: Precedence,
    ) -> Option<bool> {
        let entries = self.entries.read().ok()?;
        entries
            .subjects
            .get(subject)?
            .get(&DecisionKey::new(ability, target, precedence))
            .copied()
    }

    /// Invalidation counter to read before computing a decision and hand
    /// back to [`put`](Self::put).
    pub fn generation(&self) -> u64 {
        self.entries.read().map(|e| e.generation).unwrap_or_default()
    }

    /// Store a decision computed after `seen` was read from
    /// [`generation`](Self::generation). Returns whether it was kept.
    pub fn put(
        &self,
        subject: &ModelKey,
        ability: &str,
        target: Option<&Target>,
        precedence: Precedence,
        allowed: bool,
        seen: u64,
    ) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if entries.generation != seen {
            debug!(%subject, ability, "decision invalidated while computed; not cached");
            return false;
        }
        if self.capacity == 0 {
            return false;
        }
        let key = DecisionKey::new(ability, target, precedence);
        let present = entries
            .subjects
            .get(subject)
            .is_some_and(|decisions| decisions.contains_key(&key));
        if !present && entries.len >= self.capacity {
            debug!(capacity = self.capacity, "decision cache full; starting over");
            entries.subjects.clear();
            entries.len = 0;
        }

        let previous = entries
            .subjects
            .entry(subject.clone())
            .or_default()
            .insert(key, allowed);
        if previous.is_none() {
            entries.len += 1;
        }
        true
    }

    /// Drop every decision cached for `subject`.
    pub fn forget(&self, subject: &ModelKey) {
        if let Ok(mut entries) = self.entries.write() {
            entries.generation += 1;
            if let Some(dropped) = entries.subjects.remove(subject) {
                entries.len -= dropped.len();
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.generation += 1;
            entries.subjects.clear();
            entries.len = 0;
        }
    }

    /// Number of cached decisions across all subjects.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
