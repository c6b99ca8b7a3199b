//! Vector clocks.
//!
//! A vector clock maps each actor to the number of events this node knows
//! that actor to have originated. Clocks form a lattice under the pointwise
//! order: `descends` is the lattice order, `merged` the join and `glb` the
//! meet. The strict order (`dominates`) gates causal delivery; the meet over
//! all peers' latest observations yields the stable version vector.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::FromIterator;

use serde::{Deserialize, Serialize};

/// A vector clock: per-actor event counters capturing causal knowledge.
///
/// Absent actors read as zero, and zero counters are never stored, so the
/// derived equality and hash agree with the pointwise semantics. The wire
/// form is the sorted sequence of `(actor, counter)` pairs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VClock<N: Ord> {
    entries: BTreeMap<N, u64>,
}

impl<N: Ord> VClock<N> {
    /// Returns the empty clock.
    pub fn new() -> Self {
        VClock {
            entries: BTreeMap::new(),
        }
    }

    /// The counter for `id`. Absent actors read as zero.
    pub fn get(&self, id: &N) -> u64 {
        self.entries.get(id).cloned().unwrap_or(0)
    }

    /// Returns `true` if no actor has a positive counter.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of actors with a positive counter.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over `(actor, counter)` pairs in actor order.
    pub fn iter(&self) -> impl Iterator<Item = (&N, &u64)> {
        self.entries.iter()
    }

    /// Returns `true` if this clock is pointwise at least `other`.
    pub fn descends(&self, other: &Self) -> bool {
        other.entries.iter().all(|(id, &c)| self.get(id) >= c)
    }

    /// Returns `true` if this clock strictly dominates `other`: it descends
    /// from `other` and differs in at least one component.
    pub fn dominates(&self, other: &Self) -> bool {
        self.descends(other) && self != other
    }
}

impl<N: Ord + Clone> VClock<N> {
    /// Advances the counter of `id` by one and returns its new value.
    pub fn increment(&mut self, id: &N) -> u64 {
        let counter = self.entries.entry(id.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Returns a copy of this clock with the counter of `id` advanced by one.
    pub fn incremented(&self, id: &N) -> Self {
        let mut next = self.clone();
        next.increment(id);
        next
    }

    /// Merges `other` into this clock, taking the pointwise maximum.
    pub fn merge_from(&mut self, other: &Self) {
        for (id, &c) in &other.entries {
            let counter = self.entries.entry(id.clone()).or_insert(0);
            if c > *counter {
                *counter = c;
            }
        }
    }

    /// Returns the pointwise maximum (join) of the two clocks.
    pub fn merged(&self, other: &Self) -> Self {
        let mut join = self.clone();
        join.merge_from(other);
        join
    }

    /// Returns the pointwise minimum (meet) of the two clocks: the greatest
    /// clock both descend from. Only actors positive in both survive.
    pub fn glb(&self, other: &Self) -> Self {
        let entries = self
            .entries
            .iter()
            .filter_map(|(id, &c)| {
                let min = c.min(other.get(id));
                if min > 0 {
                    Some((id.clone(), min))
                } else {
                    None
                }
            })
            .collect();
        VClock { entries }
    }
}

impl<N: Ord> Default for VClock<N> {
    fn default() -> Self {
        VClock::new()
    }
}

impl<N: Ord + Clone> FromIterator<(N, u64)> for VClock<N> {
    fn from_iter<I: IntoIterator<Item = (N, u64)>>(iter: I) -> Self {
        VClock {
            entries: iter.into_iter().filter(|&(_, c)| c > 0).collect(),
        }
    }
}

impl<N: Ord + fmt::Debug> fmt::Debug for VClock<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (id, counter)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}:{}", id, counter)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::VClock;

    fn vc(entries: &[(u8, u64)]) -> VClock<u8> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn absent_actors_read_as_zero() {
        let clock = vc(&[(0, 2)]);
        assert_eq!(clock.get(&0), 2);
        assert_eq!(clock.get(&7), 0);
    }

    #[test]
    fn zero_counters_are_not_stored() {
        assert_eq!(vc(&[(0, 1), (1, 0)]), vc(&[(0, 1)]));
        assert_eq!(vc(&[(0, 1), (1, 0)]).len(), 1);
    }

    #[test]
    fn increment_strictly_dominates() {
        let clock = vc(&[(0, 1), (1, 3)]);
        let next = clock.incremented(&1);
        assert_eq!(next.get(&1), 4);
        assert!(next.dominates(&clock));
        assert!(!clock.descends(&next));
    }

    #[test]
    fn merge_is_the_join() {
        let a = vc(&[(0, 2), (1, 1)]);
        let b = vc(&[(1, 3), (2, 1)]);
        let join = a.merged(&b);
        assert_eq!(join, vc(&[(0, 2), (1, 3), (2, 1)]));
        assert!(join.descends(&a));
        assert!(join.descends(&b));
        assert_eq!(a.merged(&b), b.merged(&a));
        assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn merge_absorbs_increment() {
        let clock = vc(&[(0, 1)]);
        let next = clock.incremented(&0);
        assert_eq!(clock.merged(&next), next);
    }

    #[test]
    fn glb_is_the_meet() {
        let a = vc(&[(0, 2), (1, 1)]);
        let b = vc(&[(0, 1), (2, 4)]);
        let meet = a.glb(&b);
        assert_eq!(meet, vc(&[(0, 1)]));
        assert!(a.descends(&meet));
        assert!(b.descends(&meet));
        assert_eq!(a.glb(&VClock::new()), VClock::new());
    }

    #[test]
    fn concurrent_clocks_do_not_descend() {
        let a = vc(&[(0, 1)]);
        let b = vc(&[(1, 1)]);
        assert!(!a.descends(&b));
        assert!(!b.descends(&a));
        assert!(!a.dominates(&b));
    }

    #[test]
    fn dominates_is_strict() {
        let clock = vc(&[(0, 1)]);
        assert!(clock.descends(&clock));
        assert!(!clock.dominates(&clock));
        assert!(clock.dominates(&VClock::new()));
    }
}
