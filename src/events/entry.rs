//! Raw log entries as delivered by the event log.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Identifier of an entry, totally ordered within a stream.
///
/// Redis-style `<millis>-<seq>` IDs compare numerically; anything else
/// compares lexically and sorts after well-formed IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an ID from its two numeric parts.
    pub fn from_parts(millis: u64, seq: u64) -> Self {
        Self(format!("{millis}-{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric `(millis, seq)` parts, when the ID is well formed.
    pub fn parts(&self) -> Option<(u64, u64)> {
        let (millis, seq) = self.0.split_once('-')?;
        Some((millis.parse().ok()?, seq.parse().ok()?))
    }
}

impl Ord for EntryId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.parts(), other.parts()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EntryId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One immutable entry of an append-only stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: EntryId,
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(id: impl Into<EntryId>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build an entry from `(key, value)` pairs.
    pub fn from_pairs<K, V>(id: impl Into<EntryId>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            id,
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        )
    }

    /// Field value, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![
            EntryId::new("10-0"),
            EntryId::new("9-5"),
            EntryId::new("10-1"),
            EntryId::new("9-10"),
        ];
        ids.sort();
        let sorted: Vec<_> = ids.iter().map(EntryId::as_str).collect();
        assert_eq!(sorted, vec!["9-5", "9-10", "10-0", "10-1"]);
    }

    #[test]
    fn malformed_ids_sort_last() {
        assert!(EntryId::new("1-0") < EntryId::new("abc"));
        assert!(EntryId::new("abc") < EntryId::new("abd"));
        assert_eq!(EntryId::new("x").parts(), None);
        assert_eq!(EntryId::from_parts(5, 2).parts(), Some((5, 2)));
    }

    #[test]
    fn field_lookup() {
        let entry = LogEntry::from_pairs("1-0", [("operation", "thing.remove"), ("id", "t1")]);
        assert_eq!(entry.field("id"), Some("t1"));
        assert_eq!(entry.field("name"), None);
    }
}
