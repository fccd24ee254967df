//! Property-Based Tests for the record merge
//!
//! ## Properties Verified
//!
//! - Merge is associative: (a ⊕ b) ⊕ c and a ⊕ (b ⊕ c) both fail or agree
//! - Merge is commutative up to key order
//! - The empty record is an identity
//! - Disjoint merges keep every leaf of both operands
//! - A failed absorb leaves the receiver unchanged

use steplog_core::{merge, Record};
use steplog_testkit::strategies::{arb_disjoint_pair, arb_record, proptest};
use proptest::prelude::*;

proptest! {
    /// Property: merge is associative, including which groupings fail
    #[test]
    fn prop_merge_associative(a in arb_record(), b in arb_record(), c in arb_record()) {
        let left = a.merge(&b).and_then(|ab| ab.merge(&c));
        let right = b.merge(&c).and_then(|bc| a.merge(&bc));

        match (left, right) {
            (Ok(left), Ok(right)) => prop_assert_eq!(left, right),
            (Err(_), Err(_)) => {}
            (left, right) => prop_assert!(
                false,
                "groupings disagree: {:?} vs {:?}",
                left.map(|r| r.to_string()),
                right.map(|r| r.to_string())
            ),
        }
    }

    /// Property: merge is commutative up to insertion order
    #[test]
    fn prop_merge_commutative(a in arb_record(), b in arb_record()) {
        let ab = a.merge(&b);
        let ba = b.merge(&a);

        prop_assert_eq!(ab.is_ok(), ba.is_ok());
        if let (Ok(ab), Ok(ba)) = (ab, ba) {
            prop_assert_eq!(ab, ba);
        }
    }

    /// Property: the empty record is a two-sided identity
    #[test]
    fn prop_empty_record_is_identity(a in arb_record()) {
        let empty = Record::new();
        prop_assert_eq!(&a.merge(&empty).unwrap(), &a);
        prop_assert_eq!(&empty.merge(&a).unwrap(), &a);
    }

    /// Property: disjoint records always merge and keep every leaf
    #[test]
    fn prop_disjoint_merge_keeps_all_leaves((a, b) in arb_disjoint_pair()) {
        let merged = merge([&a, &b]).unwrap();

        let mut expected: Vec<String> = a
            .flatten()
            .into_iter()
            .chain(b.flatten())
            .map(|(path, _)| path)
            .collect();
        let mut actual: Vec<String> = merged.flatten().into_iter().map(|(path, _)| path).collect();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    /// Property: absorb either succeeds like merge or leaves the receiver untouched
    #[test]
    fn prop_absorb_is_all_or_nothing(a in arb_record(), b in arb_record()) {
        let mut receiver = a.clone();
        match (receiver.absorb(b.clone()), a.merge(&b)) {
            (Ok(()), Ok(merged)) => prop_assert_eq!(receiver, merged),
            (Err(absorb_err), Err(merge_err)) => {
                prop_assert_eq!(receiver, a);
                prop_assert!(absorb_err.is_duplicate_key());
                prop_assert!(merge_err.is_duplicate_key());
            }
            (absorbed, merged) => prop_assert!(
                false,
                "absorb and merge disagree: {:?} vs {:?}",
                absorbed,
                merged.map(|r| r.to_string())
            ),
        }
    }
}
