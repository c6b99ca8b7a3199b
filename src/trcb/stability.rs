use std::collections::{BTreeMap, BTreeSet};

use crate::vclock::VClock;
use crate::NodeIdT;

/// Tracks, per origin actor, the most recent timestamp this node has
/// observed, and derives the stable version vector (SVV): the pointwise
/// minimum over the rows of all current members and ourselves.
///
/// Every timestamp the SVV descends from has been observed by the whole
/// membership and is safe to garbage-collect downstream. A member without a
/// row counts as the empty clock, which conservatively pins the SVV down
/// until the member's observations catch up.
#[derive(Clone, Debug)]
pub struct TimestampMatrix<N: Ord> {
    /// Most recent observed timestamp, by origin.
    rows: BTreeMap<N, VClock<N>>,
    /// The actors the SVV ranges over: current members plus ourselves.
    scope: BTreeSet<N>,
    /// Cached pointwise minimum over the rows of `scope`.
    svv: VClock<N>,
}

impl<N: NodeIdT> TimestampMatrix<N> {
    /// Returns a new matrix scoped to `members` plus `our_id`, with all rows
    /// empty.
    pub fn new(our_id: N, members: &BTreeSet<N>) -> Self {
        let mut scope = members.clone();
        scope.insert(our_id);
        let rows = scope
            .iter()
            .map(|id| (id.clone(), VClock::new()))
            .collect();
        TimestampMatrix {
            rows,
            scope,
            svv: VClock::new(),
        }
    }

    /// Records `ts` as observed from `origin` and refreshes the SVV.
    pub fn observe(&mut self, origin: &N, ts: &VClock<N>) {
        self.rows
            .entry(origin.clone())
            .or_insert_with(VClock::new)
            .merge_from(ts);
        if self.scope.contains(origin) {
            self.recompute();
        }
    }

    /// Replaces the membership scope. Rows of departed actors are dropped,
    /// so a member that never returns cannot pin the SVV; joiners start with
    /// an empty row.
    pub fn update_scope(&mut self, scope: BTreeSet<N>) {
        self.rows.retain(|id, _| scope.contains(id));
        for id in &scope {
            self.rows.entry(id.clone()).or_insert_with(VClock::new);
        }
        self.scope = scope;
        self.recompute();
    }

    /// The stable version vector.
    pub fn svv(&self) -> &VClock<N> {
        &self.svv
    }

    /// The row recorded for `origin`, if any.
    pub fn row(&self, origin: &N) -> Option<&VClock<N>> {
        self.rows.get(origin)
    }

    fn recompute(&mut self) {
        let mut rows = self.scope.iter().filter_map(|id| self.rows.get(id));
        self.svv = match rows.next() {
            None => VClock::new(),
            Some(first) => rows.fold(first.clone(), |min, row| min.glb(row)),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::TimestampMatrix;
    use crate::vclock::VClock;

    fn vc(entries: &[(u8, u64)]) -> VClock<u8> {
        entries.iter().cloned().collect()
    }

    fn members(ids: &[u8]) -> BTreeSet<u8> {
        ids.iter().cloned().collect()
    }

    #[test]
    fn svv_is_the_minimum_over_all_rows() {
        let mut matrix = TimestampMatrix::new(0, &members(&[1, 2]));
        assert_eq!(*matrix.svv(), VClock::new());

        matrix.observe(&0, &vc(&[(0, 1)]));
        matrix.observe(&1, &vc(&[(0, 1), (1, 1)]));
        // Node 2 has not been observed yet; the SVV stays empty.
        assert_eq!(*matrix.svv(), VClock::new());

        matrix.observe(&2, &vc(&[(0, 1), (1, 1), (2, 1)]));
        assert_eq!(*matrix.svv(), vc(&[(0, 1)]));
    }

    #[test]
    fn departing_member_releases_the_svv() {
        let mut matrix = TimestampMatrix::new(0, &members(&[1, 2]));
        matrix.observe(&0, &vc(&[(0, 2)]));
        matrix.observe(&1, &vc(&[(0, 2), (1, 1)]));
        // Node 2's empty row pins the SVV down.
        assert_eq!(*matrix.svv(), VClock::new());

        matrix.update_scope(members(&[0, 1]));
        assert_eq!(*matrix.svv(), vc(&[(0, 2)]));
    }

    #[test]
    fn joining_member_starts_with_an_empty_row() {
        let mut matrix = TimestampMatrix::new(0, &members(&[1]));
        matrix.observe(&0, &vc(&[(0, 1)]));
        matrix.observe(&1, &vc(&[(0, 1), (1, 1)]));
        assert_eq!(*matrix.svv(), vc(&[(0, 1)]));

        matrix.update_scope(members(&[0, 1, 2]));
        assert_eq!(*matrix.svv(), VClock::new());
        assert_eq!(*matrix.row(&2).expect("row for joiner"), VClock::new());
    }

    #[test]
    fn observations_from_outside_the_scope_are_kept_but_ignored() {
        let mut matrix = TimestampMatrix::new(0, &members(&[1]));
        matrix.observe(&0, &vc(&[(0, 1)]));
        matrix.observe(&1, &vc(&[(0, 1)]));
        let svv = matrix.svv().clone();
        matrix.observe(&9, &vc(&[(9, 4)]));
        assert_eq!(*matrix.svv(), svv);
        assert_eq!(*matrix.row(&9).expect("row"), vc(&[(9, 4)]));
    }
}
