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

//! Deterministic core types and canonical encoding helpers.
//!
//! `serde_json::Map` is a `BTreeMap` unless the `preserve_order` feature is
//! enabled, which this crate never turns on. Serializing a payload therefore
//! already yields keys in sorted order; [`canonical_json`] only has to strip
//! insignificant whitespace, which `serde_json::to_vec` does by default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A signed payload: a flat mapping of field name to JSON value.
pub type Payload = Map<String, Value>;

/// The `hds.signature` field name, excluded from the signed bytes.
pub const SIGNATURE_FIELD: &str = "hds.signature";

/// The `hds.ttl` field name.
pub const TTL_FIELD: &str = "hds.ttl";

/// State key marking a host as retired. Its presence blocks further writes.
pub const TOMBSTONE_KEY: &str = "hds.tombstone";

/// State key carrying a host's own identity claim.
pub const HOST_KEY: &str = "hds.host";

/// Well-known topic under which directory peers advertise each other.
pub const DIRECTORY_TOPIC: &str = "hds.directory";

/// Minimum accepted TTL, in seconds (1 hour).
pub const MIN_TTL_SEC: i64 = 60 * 60;

/// Maximum accepted TTL, in seconds (3 days).
pub const MAX_TTL_SEC: i64 = 60 * 60 * 24 * 3;

/// Maximum length of a state key or topic name, in bytes.
pub const MAX_KEY_SIZE: usize = 1024;

/// Minimum length of a state key or topic name, in bytes.
pub const MIN_KEY_SIZE: usize = 3;

/// Maximum length of a state value, in bytes.
pub const MAX_VALUE_SIZE: usize = 1024 * 64;

/// Maximum number of state keys retained per host (excludes `hds.expired`).
pub const STATE_STORAGE_LIMIT: usize = 255;

/// Canonical JSON encoding error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("serialization")]
    Serialize,
}

/// Produce the deterministic byte encoding of a JSON value: keys sorted,
/// no insignificant whitespace, UTF-8.
///
/// This is the exact byte sequence a publisher signs and a verifier must
/// reconstruct from stored fields, independent of in-memory map order.
pub fn canonical_json<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(v).map_err(|_| CodecError::Serialize)
}

/// Returns a clone of `payload` with `hds.signature` removed, ready for
/// canonicalization and signing/verification.
pub fn payload_without_signature(payload: &Payload) -> Payload {
    let mut copy = payload.clone();
    copy.remove(SIGNATURE_FIELD);
    copy
}

/// A single stored state entry for one (host, key) pair.
///
/// Encoded with `bincode` rather than a colon-joined `signature:ttl:last_updated:value`
/// string, so a signature or value containing `:` round-trips byte-exact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Base64-encoded signature from the originating payload.
    pub signature: String,
    /// TTL in seconds.
    pub ttl: i64,
    /// Wall-clock write time, milliseconds since the UNIX epoch.
    pub last_updated_ms: i64,
    /// The stored string value.
    pub value: String,
}

impl StateRecord {
    /// True iff `now_ms - last_updated_ms > ttl_sec * 1000`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.last_updated_ms) > self.ttl.saturating_mul(1000)
    }
}

/// A topic membership for one (topic, host) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMembership {
    /// Ordered subtopic strings (may be empty).
    pub subtopics: Vec<String>,
    /// Base64-encoded signature from the topic payload.
    pub signature: String,
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_and_strips_whitespace() {
        let payload: Payload = match json!({"b": 1, "a": "x", "hds.ttl": 60}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let bytes = canonical_json(&payload).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"a":"x","b":1,"hds.ttl":60}"#);
    }

    #[test]
    fn payload_without_signature_removes_only_signature() {
        let payload: Payload = match json!({"hds.ttl": 60, "hds.signature": "abc", "k": "v"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let stripped = payload_without_signature(&payload);
        assert!(!stripped.contains_key(SIGNATURE_FIELD));
        assert_eq!(stripped.get("k").unwrap(), "v");
    }

    #[test]
    fn state_record_expiry_boundary() {
        let rec = StateRecord {
            signature: "sig".into(),
            ttl: 10,
            last_updated_ms: 0,
            value: "v".into(),
        };
        assert!(!rec.is_expired_at(10_000));
        assert!(rec.is_expired_at(10_001));
    }
}
