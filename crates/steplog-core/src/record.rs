//! Hierarchical records and the conflict-checked merge.
//!
//! A [`Record`] is an insertion-ordered map from key to [`Value`]. Keys are
//! written at most once: [`Record::set`] refuses to overwrite, and the merge
//! only combines two values under the same key when both are nested records,
//! in which case it recurses. Any other overlap is a
//! [`RecordError::DuplicateKey`] naming the dotted path of the conflict.
//!
//! Merging never mutates its operands. [`Record::absorb`] is the in-place
//! form used while accumulating; it checks the whole incoming record for
//! conflicts before touching the receiver, so a failed absorb leaves the
//! receiver exactly as it was.

use crate::errors::{RecordError, Result};
use crate::value::Value;
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Separator used by [`Record::get_path`] and [`Record::flatten`].
pub const PATH_SEPARATOR: char = '.';

/// Ordered, collision-checked mapping from name to value or nested record.
///
/// Equality is structural and ignores insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    entries: IndexMap<String, Value>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from key/value pairs, failing on the first repeated key
    pub fn try_from_pairs<K, V, I>(pairs: I) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut record = Self::new();
        for (key, value) in pairs {
            record.set(key, value)?;
        }
        Ok(record)
    }

    /// Builder form of [`Record::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Add a new key. Fails with [`RecordError::DuplicateKey`] if the key is
    /// already present; existing values are never overwritten.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        match self.entries.entry(key) {
            Entry::Occupied(slot) => {
                tracing::warn!(key = %slot.key(), "record key written twice");
                Err(RecordError::duplicate_key(slot.key().clone()))
            }
            Entry::Vacant(slot) => {
                slot.insert(value.into());
                Ok(())
            }
        }
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a top-level key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a top-level key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Look up a nested value by dotted path, e.g. `"controller.torque"`.
    ///
    /// Returns `Ok(None)` when the path does not exist and an error when the
    /// path itself is malformed (empty segment).
    pub fn get_path(&self, path: &str) -> Result<Option<&Value>> {
        let mut segments = path.split(PATH_SEPARATOR);
        let first = segments.next().unwrap_or_default();
        validate_segment(path, first)?;

        let mut current = match self.entries.get(first) {
            Some(value) => value,
            None => return Ok(None),
        };
        for segment in segments {
            validate_segment(path, segment)?;
            current = match current.as_record().and_then(|record| record.get(segment)) {
                Some(value) => value,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    /// Iterate over top-level entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Top-level keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every leaf value with its dotted path, depth first in insertion order.
    /// Empty nested records contribute nothing.
    pub fn flatten(&self) -> Vec<(String, &Value)> {
        let mut leaves = Vec::new();
        self.collect_leaves(None, &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, prefix: Option<&str>, out: &mut Vec<(String, &'a Value)>) {
        for (key, value) in &self.entries {
            let path = match prefix {
                Some(prefix) => format!("{prefix}{PATH_SEPARATOR}{key}"),
                None => key.clone(),
            };
            match value {
                Value::Record(nested) => nested.collect_leaves(Some(&path), out),
                leaf => out.push((path, leaf)),
            }
        }
    }

    /// Merge two records into a new one.
    ///
    /// Keys present in one operand are copied through. Keys present in both
    /// recurse when both values are records and fail with
    /// [`RecordError::DuplicateKey`] otherwise.
    pub fn merge(&self, other: &Record) -> Result<Record> {
        let mut merged = self.clone();
        merged.absorb(other.clone())?;
        Ok(merged)
    }

    /// Left-fold [`Record::merge`] over any number of records, starting from
    /// the empty record.
    pub fn merge_all<'a, I>(records: I) -> Result<Record>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut merged = Record::new();
        for record in records {
            merged.absorb(record.clone())?;
        }
        Ok(merged)
    }

    /// Merge `other` into `self` in place.
    ///
    /// Conflicts are detected before any key is moved, so on error `self` is
    /// unchanged.
    pub fn absorb(&mut self, other: Record) -> Result<()> {
        let mut path = Vec::new();
        if let Err(err) = self.check_mergeable(&other, &mut path) {
            tracing::warn!(error = %err, "record merge conflict");
            return Err(err);
        }
        tracing::debug!(incoming = other.len(), existing = self.len(), "merging record");
        self.absorb_checked(other);
        Ok(())
    }

    /// Merge `other` under the sub-key `key`.
    ///
    /// The sub-key is created when absent and merged into recursively when it
    /// already holds a record, so several sibling calls can accumulate under
    /// one branch. A leaf already stored under `key` is a conflict.
    pub fn absorb_under(&mut self, key: impl Into<String>, other: Record) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        let mut branch = Record::new();
        branch.entries.insert(key, Value::Record(other));
        self.absorb(branch)
    }

    fn check_mergeable(&self, other: &Record, path: &mut Vec<String>) -> Result<()> {
        for (key, incoming) in &other.entries {
            let Some(existing) = self.entries.get(key) else {
                continue;
            };
            path.push(key.clone());
            match (existing, incoming) {
                (Value::Record(existing), Value::Record(incoming)) => {
                    existing.check_mergeable(incoming, path)?;
                }
                _ => {
                    let separator = PATH_SEPARATOR.to_string();
                    return Err(RecordError::duplicate_key(path.join(&separator)));
                }
            }
            path.pop();
        }
        Ok(())
    }

    // Only called after check_mergeable succeeded on the same pair.
    fn absorb_checked(&mut self, other: Record) {
        for (key, incoming) in other.entries {
            match self.entries.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                Entry::Occupied(mut slot) => {
                    if let (Value::Record(existing), Value::Record(nested)) =
                        (slot.get_mut(), incoming)
                    {
                        existing.absorb_checked(nested);
                    }
                }
            }
        }
    }

    /// Convert to a `serde_json::Value` for inspection
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Merge any number of records left to right.
///
/// Free-function spelling of [`Record::merge_all`].
pub fn merge<'a, I>(records: I) -> Result<Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    Record::merge_all(records)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(RecordError::invalid_key(key, "keys must not be empty"));
    }
    Ok(())
}

fn validate_segment(path: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(RecordError::invalid_key(path, "path contains an empty segment"));
    }
    Ok(())
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

// Deserialized entries go through `Record::set`, so a document with a repeated
// or empty key is rejected instead of silently keeping the last value.
impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of record keys to values")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Record, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut record = Record::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    record.set(key, value).map_err(de::Error::custom)?;
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, f64)]) -> Record {
        Record::try_from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn set_refuses_to_overwrite() {
        let mut rec = record(&[("y", 6.0)]);
        let err = rec.set("y", 7.0).unwrap_err();
        assert_eq!(err, RecordError::duplicate_key("y"));
        assert_eq!(rec.get("y"), Some(&Value::Float(6.0)));
    }

    #[test]
    fn empty_keys_are_rejected() {
        let err = Record::new().set("", 1.0).unwrap_err();
        assert!(matches!(err, RecordError::InvalidKey { .. }));
    }

    #[test]
    fn merge_copies_disjoint_keys() {
        let merged = record(&[("a", 1.0)]).merge(&record(&[("b", 2.0)])).unwrap();
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn merge_recurses_into_nested_records() {
        let a = Record::new().with("sub", record(&[("x", 1.0)])).unwrap();
        let b = Record::new().with("sub", record(&[("y", 2.0)])).unwrap();

        let merged = a.merge(&b).unwrap();
        let sub = merged.get("sub").and_then(Value::as_record).unwrap();
        assert_eq!(sub, &record(&[("x", 1.0), ("y", 2.0)]));
    }

    #[test]
    fn merge_conflict_names_the_nested_path() {
        let a = Record::new().with("sub", record(&[("x", 1.0)])).unwrap();
        let b = Record::new().with("sub", record(&[("x", 2.0)])).unwrap();

        assert_eq!(a.merge(&b).unwrap_err(), RecordError::duplicate_key("sub.x"));
    }

    #[test]
    fn leaf_and_record_under_one_key_conflict() {
        let a = record(&[("sub", 1.0)]);
        let b = Record::new().with("sub", record(&[("x", 2.0)])).unwrap();

        assert!(a.merge(&b).unwrap_err().is_duplicate_key());
        assert!(b.merge(&a).unwrap_err().is_duplicate_key());
    }

    #[test]
    fn failed_absorb_leaves_receiver_untouched() {
        let mut target = record(&[("a", 1.0), ("b", 2.0)]);
        let before = target.clone();

        // `c` would be new, but `b` conflicts, so nothing is taken
        let err = target.absorb(record(&[("c", 3.0), ("b", 4.0)])).unwrap_err();
        assert_eq!(err, RecordError::duplicate_key("b"));
        assert_eq!(target, before);
    }

    #[test]
    fn absorb_under_accumulates_siblings() {
        let mut target = Record::new();
        target.absorb_under("sub", record(&[("a", 1.0)])).unwrap();
        target.absorb_under("sub", record(&[("b", 2.0)])).unwrap();

        assert_eq!(
            target.get_path("sub.b").unwrap(),
            Some(&Value::Float(2.0))
        );
        assert_eq!(
            target.absorb_under("sub", record(&[("a", 9.0)])).unwrap_err(),
            RecordError::duplicate_key("sub.a")
        );
    }

    #[test]
    fn merge_all_of_nothing_is_empty() {
        assert!(merge(std::iter::empty()).unwrap().is_empty());
    }

    #[test]
    fn equality_ignores_insertion_order() {
        assert_eq!(record(&[("a", 1.0), ("b", 2.0)]), record(&[("b", 2.0), ("a", 1.0)]));
    }

    #[test]
    fn get_path_rejects_empty_segments() {
        let rec = record(&[("a", 1.0)]);
        assert!(rec.get_path("a..b").is_err());
        assert_eq!(rec.get_path("missing.b").unwrap(), None);
        assert_eq!(rec.get_path("a.b").unwrap(), None);
    }

    #[test]
    fn flatten_lists_leaves_with_paths() {
        let rec = Record::new()
            .with("t", 0.5)
            .unwrap()
            .with("controller", record(&[("torque", -1.0)]))
            .unwrap();

        let paths: Vec<String> = rec.flatten().into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["t", "controller.torque"]);
        assert_eq!(rec.to_string(), "{t: 0.5, controller: {torque: -1}}");
    }

    #[test]
    fn json_view_is_a_plain_object() {
        let rec = Record::new().with("sub", record(&[("y", 6.0)])).unwrap();
        assert_eq!(rec.to_json().unwrap(), serde_json::json!({"sub": {"y": 6.0}}));
    }

    #[test]
    fn deserializing_keeps_keys_write_once() {
        let rec: Record = serde_json::from_str(r#"{"a": 1, "sub": {"y": 6.0}}"#).unwrap();
        assert_eq!(rec.get("a"), Some(&Value::Int(1)));
        assert_eq!(rec.get_path("sub.y").unwrap(), Some(&Value::Float(6.0)));

        let err = serde_json::from_str::<Record>(r#"{"a": 1, "a": 2}"#).unwrap_err();
        assert!(err.to_string().contains("duplicate record key `a`"));

        assert!(serde_json::from_str::<Record>(r#"{"": 3}"#).is_err());
        assert!(serde_json::from_str::<Record>(r#"{"sub": {"y": 1, "y": 2}}"#).is_err());
    }
}
