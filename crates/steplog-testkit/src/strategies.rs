//! Property test strategies for steplog records
//!
//! Keys are drawn from a small alphabet so that independently generated
//! records collide often, which is where the merge has something to check.

use proptest::prelude::*;

// Re-export proptest for convenience
pub use proptest;

use steplog_core::{Record, Value};

const KEYS: [&str; 5] = ["a", "b", "c", "d", "e"];

/// Strategy for record keys
pub fn arb_key() -> impl Strategy<Value = String> {
    prop::sample::select(KEYS.to_vec()).prop_map(str::to_owned)
}

/// Strategy for non-record values
pub fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Int),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        prop::sample::select(vec!["idle", "active", "saturated"])
            .prop_map(|text| Value::Text(text.to_owned())),
        prop::collection::vec((-100i64..100).prop_map(Value::Int), 0..4).prop_map(Value::List),
    ]
}

fn record_from_entries(entries: std::collections::BTreeMap<String, Value>) -> Record {
    // BTreeMap keys are unique, so no insertion can conflict
    Record::try_from_pairs(entries).unwrap()
}

/// Strategy for records nested up to three levels deep
pub fn arb_record() -> impl Strategy<Value = Record> {
    let leaf_record =
        prop::collection::btree_map(arb_key(), arb_leaf(), 0..4).prop_map(record_from_entries);
    leaf_record.prop_recursive(3, 24, 4, |inner| {
        let value = prop_oneof![
            2 => arb_leaf(),
            1 => inner.prop_map(Value::Record),
        ];
        prop::collection::btree_map(arb_key(), value, 0..4).prop_map(record_from_entries)
    })
}

/// Strategy for two records whose top-level keys do not overlap
pub fn arb_disjoint_pair() -> impl Strategy<Value = (Record, Record)> {
    prop::collection::btree_map(
        arb_key(),
        (any::<bool>(), prop_oneof![arb_leaf(), arb_record().prop_map(Value::Record)]),
        0..5,
    )
    .prop_map(|entries| {
        let mut left = Record::new();
        let mut right = Record::new();
        for (key, (goes_left, value)) in entries {
            let side = if goes_left { &mut left } else { &mut right };
            side.set(key, value).unwrap();
        }
        (left, right)
    })
}
