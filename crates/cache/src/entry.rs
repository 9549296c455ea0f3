//! Persisted record layout shared by cache entries and component state

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradecost_core::Timestamp;

/// Stored value with its timing and schema stamps
///
/// Serialized as `{ value, storedAt, expiresAt?, schemaVersion }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T = serde_json::Value> {
    pub value: T,
    pub stored_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    pub schema_version: String,
}

impl<T> CacheEntry<T> {
    /// Creates an entry stamped at `now`, expiring after `ttl` if given
    pub fn new(
        value: T,
        now: Timestamp,
        ttl: Option<Duration>,
        schema_version: impl Into<String>,
    ) -> Self {
        Self {
            value,
            stored_at: now,
            expires_at: ttl.map(|ttl| now.saturating_add(ttl)),
            schema_version: schema_version.into(),
        }
    }

    /// Expired strictly after `expires_at`; entries without one never expire
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Returns true if the entry was written under `schema_version`
    pub fn matches_version(&self, schema_version: &str) -> bool {
        self.schema_version == schema_version
    }

    /// Returns true if the entry may be served as-is
    pub fn is_fresh(&self, now: Timestamp, schema_version: &str) -> bool {
        self.matches_version(schema_version) && !self.is_expired(now)
    }

    /// Replaces the value, keeping the stamps
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            stored_at: self.stored_at,
            expires_at: self.expires_at,
            schema_version: self.schema_version,
        }
    }
}

impl<T: Serialize> CacheEntry<T> {
    /// Serializes the record for a `KeyValueStore`
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    /// Parses a stored record
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Parses a stored record, discarding it on a schema mismatch or
    /// malformed content
    pub fn decode_current(raw: &str, schema_version: &str) -> Option<Self> {
        match Self::decode(raw) {
            Ok(entry) if entry.matches_version(schema_version) => Some(entry),
            Ok(entry) => {
                log::warn!(
                    "Discarding record with schema version {} (running {})",
                    entry.schema_version,
                    schema_version
                );
                None
            }
            Err(e) => {
                log::warn!("Discarding undecodable record: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiry_is_strictly_after() {
        let entry = CacheEntry::new(1, Timestamp::from_millis(0), Some(Duration::from_millis(1000)), "1");

        assert!(!entry.is_expired(Timestamp::from_millis(999)));
        assert!(!entry.is_expired(Timestamp::from_millis(1000)));
        assert!(entry.is_expired(Timestamp::from_millis(1001)));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let entry = CacheEntry::new("v", Timestamp::from_millis(0), None, "1");
        assert!(!entry.is_expired(Timestamp::from_millis(i64::MAX)));
        assert!(entry.is_fresh(Timestamp::from_millis(i64::MAX), "1"));
        assert!(!entry.is_fresh(Timestamp::from_millis(0), "2"));
    }

    #[test]
    fn test_field_names() {
        let entry = CacheEntry::new(
            json!({"fee": 1.5}),
            Timestamp::from_millis(10),
            Some(Duration::from_millis(5)),
            "1",
        );
        let value: serde_json::Value = serde_json::from_str(&entry.encode().unwrap()).unwrap();

        assert_eq!(value["value"]["fee"], 1.5);
        assert_eq!(value["storedAt"], 10);
        assert_eq!(value["expiresAt"], 15);
        assert_eq!(value["schemaVersion"], "1");
    }

    #[test]
    fn test_missing_expiry_omitted() {
        let entry = CacheEntry::new(true, Timestamp::from_millis(10), None, "1");
        let raw = entry.encode().unwrap();
        assert!(!raw.contains("expiresAt"));

        let back: CacheEntry<bool> = CacheEntry::decode(&raw).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_decode_current_rejects_other_versions() {
        let raw = CacheEntry::new(5, Timestamp::from_millis(0), None, "1")
            .encode()
            .unwrap();

        assert!(CacheEntry::<i32>::decode_current(&raw, "1").is_some());
        assert!(CacheEntry::<i32>::decode_current(&raw, "2").is_none());
        assert!(CacheEntry::<i32>::decode_current("{broken", "1").is_none());
    }
}
