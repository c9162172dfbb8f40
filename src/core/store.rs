// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Persistent host/topic store, backed by `sled`.
//!
//! Namespacing mirrors the Redis key layout this was grounded on
//! (`hds/hosts`, `hds/topic/{topic}/hosts`, `hds/host/{host}/state/{key}`,
//! …) but each namespace gets its own `sled::Tree` instead of a single
//! keyspace of string-prefixed keys, and state entries are `bincode`-encoded
//! [`StateRecord`]/[`TopicMembership`] values rather than `:`-joined
//! strings — a signature or value containing `:` would otherwise corrupt
//! the stored tuple.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::types::{
    now_ms, StateRecord, TopicMembership, HOST_KEY, TOMBSTONE_KEY, STATE_STORAGE_LIMIT,
};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The on-disk database could not be opened.
    #[error("db open")]
    DbOpen,
    /// A read or write against the database failed.
    #[error("db io")]
    DbIo,
    /// A stored record failed to decode.
    #[error("corrupt record")]
    Corrupt,
    /// No host identifier matches the given prefix.
    #[error("no matching host")]
    HostsNone,
    /// More than one host identifier matches the given prefix.
    #[error("ambiguous host prefix")]
    HostsConflict,
    /// The host has been tombstoned; writes are permanently refused.
    #[error("host tombstoned")]
    Tombstoned,
}

/// How a caller wants a subtopic path matched against stored subtopics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtopicMatch {
    /// `s_i` is a substring of the stored subtopic at position `i`, for every `i`.
    PositionalSubstring,
    /// The supplied path must equal the stored subtopics exactly.
    Exact,
}

/// Liveness of a host's `hds.host` entry, as seen by admission checks that
/// must distinguish an unknown host from one whose identity has lapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostStatus {
    /// No `hds.host` entry has ever been stored for this identifier.
    Missing,
    /// A `hds.host` entry exists but its TTL has lapsed.
    Expired,
    /// A `hds.host` entry exists and is within its TTL.
    Live,
}

/// One host's entry in a topic membership query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicHost {
    /// Base64-encoded signature from the topic payload.
    pub signature: String,
    /// Ordered subtopics this host registered under the topic.
    pub subtopics: Vec<String>,
}

/// A host's full expanded state, as returned by [`Store::get_host_state`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostState {
    /// key → record, for every stored (non-deleted) key.
    pub entries: BTreeMap<String, StateRecord>,
    /// Keys from `entries` whose TTL has lapsed as of the read.
    pub expired: Vec<String>,
}

/// Persistent host/topic store.
#[derive(Clone)]
pub struct Store {
    /// host identifier -> () (membership list)
    hosts: sled::Tree,
    /// topic name -> () (membership list)
    topics: sled::Tree,
    /// "{topic}\0{host}" -> bincode(TopicMembership)
    topic_hosts: sled::Tree,
    /// "{host}\0{key}" -> bincode(StateRecord)
    host_state: sled::Tree,
    /// "{host}\0{key}" -> () (ordered key listing per host)
    host_state_keys: sled::Tree,
}

impl Store {
    /// Open (or create) the store at the given directory path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        Ok(Self {
            hosts: db.open_tree("hds_hosts").map_err(|_| StoreError::DbOpen)?,
            topics: db.open_tree("hds_topics").map_err(|_| StoreError::DbOpen)?,
            topic_hosts: db
                .open_tree("hds_topic_hosts")
                .map_err(|_| StoreError::DbOpen)?,
            host_state: db
                .open_tree("hds_host_state")
                .map_err(|_| StoreError::DbOpen)?,
            host_state_keys: db
                .open_tree("hds_host_state_keys")
                .map_err(|_| StoreError::DbOpen)?,
        })
    }

    fn composite(a: &str, b: &str) -> Vec<u8> {
        let mut v = Vec::with_capacity(a.len() + b.len() + 1);
        v.extend_from_slice(a.as_bytes());
        v.push(0);
        v.extend_from_slice(b.as_bytes());
        v
    }

    /// All known topic names.
    pub fn get_topics(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for item in self.topics.iter() {
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            out.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(out)
    }

    /// Hosts registered under `topic`, optionally filtered by an ordered
    /// subtopic path, per I4 (live, non-tombstoned `hds.host` required).
    pub fn get_topic_hosts(
        &self,
        topic: &str,
        subtopics: Option<&[String]>,
        match_mode: SubtopicMatch,
    ) -> Result<BTreeMap<String, TopicHost>, StoreError> {
        let prefix = Self::composite(topic, "");
        let mut out = BTreeMap::new();
        for item in self.topic_hosts.scan_prefix(&prefix) {
            let (k, v) = item.map_err(|_| StoreError::DbIo)?;
            let host = String::from_utf8_lossy(&k[prefix.len()..]).into_owned();
            if self.has_host_expired(&host)? || self.is_host_tombstoned(&host)? {
                continue;
            }
            let membership: TopicMembership =
                bincode::deserialize(&v).map_err(|_| StoreError::Corrupt)?;
            if let Some(path) = subtopics {
                if !subtopics_match(&membership.subtopics, path, match_mode) {
                    continue;
                }
            }
            out.insert(
                host,
                TopicHost {
                    signature: membership.signature,
                    subtopics: membership.subtopics,
                },
            );
        }
        Ok(out)
    }

    /// Record `host`'s membership (and subtopics) under `topic`.
    pub fn store_host_topic(
        &self,
        host: &str,
        topic: &str,
        subtopics: Vec<String>,
        signature: String,
    ) -> Result<(), StoreError> {
        if self.is_host_tombstoned(host)? {
            return Err(StoreError::Tombstoned);
        }
        self.topics
            .insert(topic.as_bytes(), &[])
            .map_err(|_| StoreError::DbIo)?;
        self.hosts
            .insert(host.as_bytes(), &[])
            .map_err(|_| StoreError::DbIo)?;
        let membership = TopicMembership {
            subtopics,
            signature,
        };
        let encoded = bincode::serialize(&membership).map_err(|_| StoreError::Corrupt)?;
        self.topic_hosts
            .insert(Self::composite(topic, host), encoded)
            .map_err(|_| StoreError::DbIo)?;
        Ok(())
    }

    /// A host's full expanded state: every stored key plus the virtual
    /// `hds.expired` list. `host_prefix` may be a leading substring of the
    /// full identifier; it is resolved via [`Store::find_host`] first.
    pub fn get_host_state(&self, host_prefix: &str) -> Result<HostState, StoreError> {
        let host = self.find_host(host_prefix)?;
        let prefix = Self::composite(&host, "");
        let now = now_ms();
        let mut state = HostState::default();
        for item in self.host_state_keys.scan_prefix(&prefix) {
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            let key = String::from_utf8_lossy(&k[prefix.len()..]).into_owned();
            let raw = self
                .host_state
                .get(Self::composite(&host, &key))
                .map_err(|_| StoreError::DbIo)?;
            let Some(raw) = raw else { continue };
            let record: StateRecord = bincode::deserialize(&raw).map_err(|_| StoreError::Corrupt)?;
            if record.is_expired_at(now) {
                state.expired.push(key.clone());
            }
            state.entries.insert(key, record);
        }
        Ok(state)
    }

    /// Write one (host, key) state entry, applying I5 (overwrite semantics)
    /// and the I3 capacity cap. Returns the number of entries evicted by the
    /// cap as a side effect of this write (usually `0`).
    #[allow(clippy::too_many_arguments)]
    pub fn store_host_state(
        &self,
        host: &str,
        key: &str,
        value: &str,
        ttl: i64,
        signature: &str,
        last_updated_ms: Option<i64>,
    ) -> Result<usize, StoreError> {
        if self.is_host_tombstoned(host)? {
            return Err(StoreError::Tombstoned);
        }
        let record = StateRecord {
            signature: signature.to_string(),
            ttl,
            last_updated_ms: last_updated_ms.unwrap_or_else(now_ms),
            value: value.to_string(),
        };
        let encoded = bincode::serialize(&record).map_err(|_| StoreError::Corrupt)?;

        self.hosts
            .insert(host.as_bytes(), &[])
            .map_err(|_| StoreError::DbIo)?;
        self.host_state_keys
            .insert(Self::composite(host, key), &[])
            .map_err(|_| StoreError::DbIo)?;
        self.host_state
            .insert(Self::composite(host, key), encoded)
            .map_err(|_| StoreError::DbIo)?;

        self.evict_over_cap(host)
    }

    /// Enforce I3: while `host` holds more than `STATE_STORAGE_LIMIT`
    /// non-protected keys, drop the one with the smallest `last_updated_ms`.
    /// Returns the number of entries evicted.
    fn evict_over_cap(&self, host: &str) -> Result<usize, StoreError> {
        let mut evicted = 0;
        loop {
            let prefix = Self::composite(host, "");
            let mut candidates: Vec<(String, i64)> = Vec::new();
            for item in self.host_state_keys.scan_prefix(&prefix) {
                let (k, _) = item.map_err(|_| StoreError::DbIo)?;
                let key = String::from_utf8_lossy(&k[prefix.len()..]).into_owned();
                if key == HOST_KEY || key == TOMBSTONE_KEY {
                    continue;
                }
                let raw = self
                    .host_state
                    .get(Self::composite(host, &key))
                    .map_err(|_| StoreError::DbIo)?;
                let Some(raw) = raw else { continue };
                let record: StateRecord =
                    bincode::deserialize(&raw).map_err(|_| StoreError::Corrupt)?;
                candidates.push((key, record.last_updated_ms));
            }
            if candidates.len() <= STATE_STORAGE_LIMIT {
                return Ok(evicted);
            }
            let Some((oldest, _)) = candidates.into_iter().min_by_key(|(_, ts)| *ts) else {
                return Ok(evicted);
            };
            self.host_state_keys
                .remove(Self::composite(host, &oldest))
                .map_err(|_| StoreError::DbIo)?;
            self.host_state
                .remove(Self::composite(host, &oldest))
                .map_err(|_| StoreError::DbIo)?;
            evicted += 1;
        }
    }

    /// This host's `hds.host` liveness: missing, expired, or live.
    pub fn host_status(&self, host: &str) -> Result<HostStatus, StoreError> {
        let raw = self
            .host_state
            .get(Self::composite(host, HOST_KEY))
            .map_err(|_| StoreError::DbIo)?;
        let Some(raw) = raw else { return Ok(HostStatus::Missing) };
        let record: StateRecord = bincode::deserialize(&raw).map_err(|_| StoreError::Corrupt)?;
        if record.is_expired_at(now_ms()) {
            Ok(HostStatus::Expired)
        } else {
            Ok(HostStatus::Live)
        }
    }

    /// Whether `host`'s `hds.host` entry is absent or past its TTL.
    pub fn has_host_expired(&self, host: &str) -> Result<bool, StoreError> {
        Ok(!matches!(self.host_status(host)?, HostStatus::Live))
    }

    /// Number of distinct hosts with any stored entry, known to this directory.
    pub fn host_count(&self) -> Result<usize, StoreError> {
        Ok(self.hosts.len())
    }

    /// Whether `host` carries a terminal `hds.tombstone` entry.
    pub fn is_host_tombstoned(&self, host: &str) -> Result<bool, StoreError> {
        Ok(self
            .host_state
            .contains_key(Self::composite(host, TOMBSTONE_KEY))
            .map_err(|_| StoreError::DbIo)?)
    }

    /// Resolve a (possibly partial) identifier to the unique full identifier
    /// it is a prefix of.
    pub fn find_host(&self, prefix: &str) -> Result<String, StoreError> {
        let mut matches = Vec::new();
        for item in self.hosts.iter() {
            let (k, _) = item.map_err(|_| StoreError::DbIo)?;
            let host = String::from_utf8_lossy(&k).into_owned();
            if host.starts_with(prefix) {
                matches.push(host);
            }
        }
        match matches.len() {
            0 => Err(StoreError::HostsNone),
            1 => Ok(matches.remove(0)),
            _ => Err(StoreError::HostsConflict),
        }
    }
}

fn subtopics_match(stored: &[String], path: &[String], mode: SubtopicMatch) -> bool {
    match mode {
        SubtopicMatch::Exact => stored == path,
        SubtopicMatch::PositionalSubstring => {
            if path.len() > stored.len() {
                return false;
            }
            path.iter()
                .zip(stored.iter())
                .all(|(wanted, got)| got.contains(wanted.as_str()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[test]
    fn unknown_host_is_expired_and_not_tombstoned() {
        let (store, _dir) = open_tmp();
        assert!(store.has_host_expired("h1").unwrap());
        assert!(!store.is_host_tombstoned("h1").unwrap());
    }

    #[test]
    fn store_and_read_state_roundtrips() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("h1", HOST_KEY, "v1", 3600, "sig1", Some(1_000))
            .unwrap();
        let state = store.get_host_state("h1").unwrap();
        assert_eq!(state.entries.get(HOST_KEY).unwrap().value, "v1");
        assert!(state.expired.is_empty());
    }

    #[test]
    fn expired_key_is_listed_but_retrievable() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("h1", HOST_KEY, "v1", 3600, "sig1", Some(now_ms()))
            .unwrap();
        store
            .store_host_state("h1", "hds.name", "stale", 1, "sig2", Some(0))
            .unwrap();
        let state = store.get_host_state("h1").unwrap();
        assert_eq!(state.expired, vec!["hds.name".to_string()]);
        assert!(state.entries.contains_key("hds.name"));
    }

    #[test]
    fn overwrite_updates_in_place() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("h1", "k", "v1", 3600, "sig1", Some(1))
            .unwrap();
        store
            .store_host_state("h1", "k", "v2", 3600, "sig2", Some(2))
            .unwrap();
        let state = store.get_host_state("h1").unwrap();
        let rec = state.entries.get("k").unwrap();
        assert_eq!(rec.value, "v2");
        assert_eq!(rec.last_updated_ms, 2);
    }

    #[test]
    fn tombstoned_host_rejects_writes() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("h1", HOST_KEY, "v1", 3600, "sig1", Some(1))
            .unwrap();
        store
            .store_host_state("h1", TOMBSTONE_KEY, "gone", 3600, "sig2", Some(2))
            .unwrap();
        let err = store
            .store_host_state("h1", "hds.name", "v", 3600, "sig3", Some(3))
            .unwrap_err();
        assert!(matches!(err, StoreError::Tombstoned));
    }

    #[test]
    fn find_host_prefix_resolution() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("abc123", HOST_KEY, "v", 3600, "sig", Some(1))
            .unwrap();
        assert_eq!(store.find_host("abc").unwrap(), "abc123");
        assert!(matches!(
            store.find_host("zzz").unwrap_err(),
            StoreError::HostsNone
        ));

        store
            .store_host_state("abcxyz", HOST_KEY, "v", 3600, "sig", Some(1))
            .unwrap();
        assert!(matches!(
            store.find_host("abc").unwrap_err(),
            StoreError::HostsConflict
        ));
    }

    #[test]
    fn eviction_keeps_cap_and_protects_host_key() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("h1", HOST_KEY, "v", 3600, "sig", Some(0))
            .unwrap();
        let mut total_evicted = 0;
        for i in 0..(STATE_STORAGE_LIMIT + 1) {
            total_evicted += store
                .store_host_state(
                    "h1",
                    &format!("hds.test.{i}"),
                    "v",
                    3600,
                    "sig",
                    Some((i + 1) as i64),
                )
                .unwrap();
        }
        let state = store.get_host_state("h1").unwrap();
        assert!(state.entries.contains_key(HOST_KEY));
        assert!(!state.entries.contains_key("hds.test.0"));
        assert_eq!(state.entries.len(), STATE_STORAGE_LIMIT + 1);
        assert_eq!(total_evicted, 1);
    }

    #[test]
    fn host_status_distinguishes_missing_expired_live() {
        let (store, _dir) = open_tmp();
        assert_eq!(store.host_status("ghost").unwrap(), HostStatus::Missing);

        store
            .store_host_state("h1", HOST_KEY, "v", 1, "sig", Some(0))
            .unwrap();
        assert_eq!(store.host_status("h1").unwrap(), HostStatus::Expired);

        store
            .store_host_state("h1", HOST_KEY, "v", 3600, "sig", Some(now_ms()))
            .unwrap();
        assert_eq!(store.host_status("h1").unwrap(), HostStatus::Live);
    }

    #[test]
    fn host_count_tracks_distinct_hosts() {
        let (store, _dir) = open_tmp();
        assert_eq!(store.host_count().unwrap(), 0);
        store
            .store_host_state("h1", HOST_KEY, "v", 3600, "sig", Some(now_ms()))
            .unwrap();
        store
            .store_host_state("h2", HOST_KEY, "v", 3600, "sig", Some(now_ms()))
            .unwrap();
        assert_eq!(store.host_count().unwrap(), 2);
    }

    #[test]
    fn topic_membership_filters_expired_and_tombstoned_hosts() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("live", HOST_KEY, "v", 3600, "sig", Some(now_ms()))
            .unwrap();
        store
            .store_host_topic("live", "t", vec![], "sig".into())
            .unwrap();

        store
            .store_host_state("dead", HOST_KEY, "v", 1, "sig", Some(0))
            .unwrap();
        store
            .store_host_topic("dead", "t", vec![], "sig".into())
            .unwrap();

        let hosts = store
            .get_topic_hosts("t", None, SubtopicMatch::PositionalSubstring)
            .unwrap();
        assert!(hosts.contains_key("live"));
        assert!(!hosts.contains_key("dead"));
    }

    #[test]
    fn positional_substring_subtopic_match() {
        let (store, _dir) = open_tmp();
        store
            .store_host_state("h1", HOST_KEY, "v", 3600, "sig", Some(now_ms()))
            .unwrap();
        store
            .store_host_topic(
                "h1",
                "t",
                vec!["production-eu".into(), "v2".into()],
                "sig".into(),
            )
            .unwrap();

        let path = vec!["prod".to_string()];
        let hosts = store
            .get_topic_hosts("t", Some(&path), SubtopicMatch::PositionalSubstring)
            .unwrap();
        assert!(hosts.contains_key("h1"));

        let hosts = store
            .get_topic_hosts("t", Some(&path), SubtopicMatch::Exact)
            .unwrap();
        assert!(!hosts.contains_key("h1"));
    }
}
