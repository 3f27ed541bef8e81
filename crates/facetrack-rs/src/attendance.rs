use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

/// One confirmed identity and the time it was first confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub first_seen: DateTime<Utc>,
}

/// At-most-once record of the identities confirmed during a session.
///
/// Records are kept in insertion order and are never removed.
#[derive(Debug, Clone, Default)]
pub struct AttendanceRegistry {
    records: IndexMap<String, DateTime<Utc>>,
}

impl AttendanceRegistry {
    pub fn new() -> AttendanceRegistry {
        AttendanceRegistry::default()
    }

    /// Record `name` as present at `timestamp`.
    ///
    /// # Returns
    ///
    /// `true` the first time `name` is recorded. Later calls leave the original timestamp in place and return `false`.
    pub fn record(&mut self, name: &str, timestamp: DateTime<Utc>) -> bool {
        if self.records.contains_key(name) {
            return false;
        }

        self.records.insert(name.to_string(), timestamp);
        info!(name, first_seen = %timestamp, "attendance recorded");
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Returns the first-seen timestamp of `name`
    pub fn get(&self, name: &str) -> Option<DateTime<Utc>> {
        self.records.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns every record in insertion order
    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.records
            .iter()
            .map(|(name, first_seen)| AttendanceRecord {
                name: name.clone(),
                first_seen: *first_seen,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn record_is_idempotent() {
        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let t2 = t1 + Duration::seconds(30);

        let mut registry = AttendanceRegistry::new();
        assert!(registry.record("Alice", t1));
        assert!(!registry.record("Alice", t2));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Alice"), Some(t1));
    }

    #[test]
    fn records_in_insertion_order() {
        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut registry = AttendanceRegistry::new();
        registry.record("Zoe", t1);
        registry.record("Alice", t1 + Duration::seconds(1));
        registry.record("Zoe", t1 + Duration::seconds(2));

        let names = registry
            .records()
            .into_iter()
            .map(|record| record.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Zoe".to_string(), "Alice".to_string()]);
        assert!(registry.contains("Alice"));
        assert!(!registry.contains("Bob"));
    }
}
