//! Property tests for the vector-clock laws the broadcast engine relies on.

use proptest::collection::btree_map;
use proptest::prelude::*;

use trcb::VClock;

fn arb_vclock() -> impl Strategy<Value = VClock<u8>> {
    btree_map(0u8..8, 1u64..8, 0..5).prop_map(|map| map.into_iter().collect())
}

proptest! {
    #[test]
    fn merge_is_commutative(a in arb_vclock(), b in arb_vclock()) {
        prop_assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_associative(a in arb_vclock(), b in arb_vclock(), c in arb_vclock()) {
        prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }

    #[test]
    fn merge_is_idempotent(a in arb_vclock()) {
        prop_assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn merge_descends_both_arguments(a in arb_vclock(), b in arb_vclock()) {
        let join = a.merged(&b);
        prop_assert!(join.descends(&a));
        prop_assert!(join.descends(&b));
    }

    #[test]
    fn increment_strictly_dominates(a in arb_vclock(), id in 0u8..8) {
        let next = a.incremented(&id);
        prop_assert!(next.dominates(&a));
        prop_assert!(next.descends(&a));
        prop_assert!(!a.descends(&next));
    }

    #[test]
    fn merge_absorbs_increment(a in arb_vclock(), id in 0u8..8) {
        // merge(vc, increment(a, vc)) = increment(a, vc)
        let next = a.incremented(&id);
        prop_assert_eq!(a.merged(&next), next);
    }

    #[test]
    fn descends_is_reflexive_and_antisymmetric(a in arb_vclock(), b in arb_vclock()) {
        prop_assert!(a.descends(&a));
        prop_assert!(!a.dominates(&a));
        if a.descends(&b) && b.descends(&a) {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn descends_is_transitive(a in arb_vclock(), b in arb_vclock(), c in arb_vclock()) {
        // Build a guaranteed chain c <= bc <= abc via merging.
        let bc = b.merged(&c);
        let abc = a.merged(&bc);
        prop_assert!(bc.descends(&c));
        prop_assert!(abc.descends(&bc));
        prop_assert!(abc.descends(&c));
    }

    #[test]
    fn glb_is_descended_by_both_arguments(a in arb_vclock(), b in arb_vclock()) {
        let meet = a.glb(&b);
        prop_assert!(a.descends(&meet));
        prop_assert!(b.descends(&meet));
    }

    #[test]
    fn glb_is_the_greatest_lower_bound(a in arb_vclock(), b in arb_vclock(), c in arb_vclock()) {
        if a.descends(&c) && b.descends(&c) {
            prop_assert!(a.glb(&b).descends(&c));
        }
    }
}
